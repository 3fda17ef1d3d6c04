//! A seeded demo game: an authoritative table, a mirror fed only through
//! packets, and a driver that makes players fire, churn, and provoke pillboxes.

use bolo_config::{Config, SenderType, SerializerType};
use bolo_core::{EntityRef, ObjectTable, Reference, RegistryError, SchemaError, TableError, Variant};
use bolo_simulation::{builtin_registry, Base, Pillbox, Tank};
use bolo_transport::{
    BinarySerializer, FileSender, JsonSerializer, NullSender, Outbox, ReceiveError, Receiver, Sender, Serializer,
    StdioSender, TableSummary, TransportController, TransportError,
};
use log::{debug, info, warn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use thiserror::Error;

/// Chance per tick that a player toggles its trigger.
const TRIGGER_CHANCE: f64 = 0.05;
/// Chance per tick that a player leaves and a fresh one joins.
const CHURN_CHANCE: f64 = 0.01;
const PROVOKE_CHANCE: f64 = 0.02;

#[derive(Error, Debug)]
pub enum RunnerError {
    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Table(#[from] TableError),

    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("mirror rejected a packet: {0}")]
    Receive(#[from] ReceiveError),

    #[error("mirror diverged from the authority at tick {tick}")]
    Diverged { tick: u64 },
}

/// Per-tick numbers for the runner's log.
#[derive(Debug, Clone, Copy, Default)]
pub struct StepReport {
    pub tick: u64,
    pub entities: usize,
    pub players: usize,
    pub packet_len: usize,
    pub messages: usize,
}

pub struct Scenario {
    authority: ObjectTable,
    outbox: Outbox,
    mirror: ObjectTable,
    receiver: Receiver,
    controller: TransportController,
    rng: StdRng,
    map_size: u16,
    verify_frequency: u32,
}

fn create_serializer(kind: SerializerType) -> Box<dyn Serializer> {
    match kind {
        SerializerType::Json => Box::new(JsonSerializer),
        SerializerType::Binary => Box::new(BinarySerializer),
    }
}

fn create_sender(config: &Config) -> Result<Box<dyn Sender>, TransportError> {
    let sender: Box<dyn Sender> = match config.transport.sender {
        SenderType::Stdio => Box::new(StdioSender::new()),
        SenderType::File => {
            let path = config.transport.output_path.as_deref().unwrap_or("bolo-packets.log");
            Box::new(FileSender::new(path)?)
        }
        SenderType::Null => Box::new(NullSender),
    };
    Ok(sender)
}

impl Scenario {
    pub fn from_config(config: &Config) -> Result<Self, RunnerError> {
        let controller = TransportController::new(
            create_serializer(config.transport.serializer),
            create_sender(config)?,
        )
        .with_summary_frequency(config.transport.summary_frequency);
        Self::with_controller(config, controller)
    }

    pub fn with_controller(config: &Config, controller: TransportController) -> Result<Self, RunnerError> {
        let outbox = Outbox::new();
        let mut authority = ObjectTable::new();
        authority.set_bridge(Box::new(outbox.clone()));

        let mut scenario = Scenario {
            authority,
            outbox,
            mirror: ObjectTable::new(),
            receiver: Receiver::new(builtin_registry()?),
            controller,
            rng: StdRng::seed_from_u64(config.simulation.seed),
            map_size: config.world.map_size,
            verify_frequency: config.transport.verify_frequency,
        };
        scenario.populate(config)?;
        Ok(scenario)
    }

    pub fn authority(&self) -> &ObjectTable {
        &self.authority
    }

    pub fn mirror(&self) -> &ObjectTable {
        &self.mirror
    }

    pub fn controller(&self) -> &TransportController {
        &self.controller
    }

    fn random_spot(&mut self) -> (i32, i32) {
        let size = self.map_size as i32;
        (self.rng.gen_range(0..size), self.rng.gen_range(0..size))
    }

    fn join_player(&mut self) -> Result<EntityRef, RunnerError> {
        let (x, y) = self.random_spot();
        let direction = self.rng.gen();
        let tank = self.authority.spawn(Tank::new(x, y, direction));
        let slot = self.authority.add_player(&tank)?;
        info!("player {} joined at ({}, {})", slot, x, y);
        Ok(tank)
    }

    fn random_owner(&mut self) -> Reference {
        let players = self.authority.players();
        if players.is_empty() || self.rng.gen_bool(0.5) {
            return Reference::None;
        }
        let pick = self.rng.gen_range(0..players.len());
        Reference::to(&players[pick])
    }

    fn populate(&mut self, config: &Config) -> Result<(), RunnerError> {
        for _ in 0..config.world.players {
            self.join_player()?;
        }
        for _ in 0..config.world.pillboxes {
            let (x, y) = self.random_spot();
            let owner = self.random_owner();
            self.authority.spawn(Pillbox::new(x, y, owner));
        }
        for _ in 0..config.world.bases {
            let (x, y) = self.random_spot();
            let owner = self.random_owner();
            self.authority.spawn(Base::new(x, y, owner));
        }
        info!(
            "world populated: {} entities, {} players",
            self.authority.len(),
            self.authority.players().len()
        );
        self.replicate()?;
        Ok(())
    }

    /// Random player input and map events for the coming tick.
    fn drive(&mut self) -> Result<(), RunnerError> {
        let players = self.authority.players().to_vec();
        for player in &players {
            if self.rng.gen_bool(TRIGGER_CHANCE) {
                if let Some(mut tank) = player.downcast_mut::<Tank>() {
                    tank.firing = !tank.firing;
                    tank.direction = self.rng.gen();
                }
            }
        }

        if !players.is_empty() && self.rng.gen_bool(CHURN_CHANCE) {
            let leaving = &players[self.rng.gen_range(0..players.len())];
            info!("player {:?} leaves", leaving);
            self.authority.destroy(leaving)?;
            self.join_player()?;
        }

        for entity in self.authority.iter() {
            if entity.type_tag() != Pillbox::TAG || !self.rng.gen_bool(PROVOKE_CHANCE) {
                continue;
            }
            if let Some(mut pillbox) = entity.downcast_mut::<Pillbox>() {
                pillbox.have_target = !pillbox.have_target;
                if pillbox.have_target {
                    pillbox.provoke();
                }
            }
        }
        Ok(())
    }

    /// Ships pending changes plus a full update to the mirror and the sender.
    fn replicate(&mut self) -> Result<(usize, usize), RunnerError> {
        let packet = self.outbox.flush_tick(&self.authority)?;
        let messages = self.receiver.apply(&mut self.mirror, &packet)?;
        self.controller.send_packet(&packet)?;
        Ok((packet.len(), messages))
    }

    pub fn verify(&self) -> Result<(), RunnerError> {
        let authority = TableSummary::capture(&self.authority)?;
        let mirror = TableSummary::capture(&self.mirror)?;
        if !authority.same_world(&mirror) {
            warn!("authority: {:?}", authority);
            warn!("mirror:    {:?}", mirror);
            return Err(RunnerError::Diverged { tick: authority.tick });
        }
        Ok(())
    }

    pub fn step(&mut self) -> Result<StepReport, RunnerError> {
        self.drive()?;
        self.authority.tick();
        let (packet_len, messages) = self.replicate()?;

        let tick = self.authority.tick_count();
        if self.verify_frequency > 0 && tick % self.verify_frequency as u64 == 0 {
            self.verify()?;
        }
        let summary = TableSummary::capture(&self.authority)?;
        self.controller.send_summary(&summary)?;

        let report = StepReport {
            tick,
            entities: self.authority.len(),
            players: self.authority.players().len(),
            packet_len,
            messages,
        };
        debug!("{:?}", report);
        Ok(report)
    }

    pub fn finish(&mut self) -> Result<(), RunnerError> {
        self.controller.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(seed: u64) -> Config {
        let mut config = Config::default();
        config.simulation.seed = seed;
        config.world.players = 3;
        config.world.pillboxes = 4;
        config.world.bases = 2;
        config
    }

    #[test]
    fn mirror_tracks_authority_for_many_ticks() {
        let mut scenario = Scenario::from_config(&config(7)).unwrap();
        assert_eq!(scenario.mirror().len(), 9);

        for _ in 0..300 {
            scenario.step().unwrap();
        }
        scenario.verify().unwrap();
        assert_eq!(scenario.authority().tick_count(), 300);
        assert_eq!(scenario.mirror().players().len(), 3);
        assert_eq!(scenario.mirror().tick_count(), 0);
    }

    #[test]
    fn same_seed_same_world() {
        let mut first = Scenario::from_config(&config(11)).unwrap();
        let mut second = Scenario::from_config(&config(11)).unwrap();
        for _ in 0..50 {
            first.step().unwrap();
            second.step().unwrap();
        }
        let a = TableSummary::capture(first.authority()).unwrap();
        let b = TableSummary::capture(second.authority()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn reports_count_packet_bytes() {
        let mut scenario = Scenario::from_config(&config(3)).unwrap();
        let report = scenario.step().unwrap();
        assert_eq!(report.tick, 1);
        assert!(report.packet_len >= 3);
        assert!(report.messages >= 1);
        assert!(scenario.controller().bytes_sent() >= report.packet_len as u64);
    }
}
