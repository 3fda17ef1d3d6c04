use bolo_core::prelude::*;
use log::{debug, error};
use once_cell::sync::Lazy;

use crate::munitions::Shell;

pub const MAX_ARMOUR: u8 = 40;
pub const MAX_SHELLS: u8 = 40;
pub const MAX_MINES: u8 = 40;
/// Ticks between two shots.
pub const RELOAD_TICKS: u8 = 13;

/// A player-controlled tank.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Tank {
    base: EntityBase,
    pub direction: u8,
    pub speed: u8,
    pub armour: u8,
    pub shells: u8,
    pub mines: u8,
    pub reload: u8,
    pub on_boat: bool,
    pub firing: bool,
}

static TANK_SCHEMA: Lazy<Schema<Tank>> = Lazy::new(|| {
    Schema::<Tank>::builder()
        .scalar("direction", Scalar::U8, |t| t.direction as i64, |t, v| t.direction = v as u8)
        .scalar("speed", Scalar::U8, |t| t.speed as i64, |t, v| t.speed = v as u8)
        .scalar("armour", Scalar::U8, |t| t.armour as i64, |t, v| t.armour = v as u8)
        .scalar("shells", Scalar::U8, |t| t.shells as i64, |t, v| t.shells = v as u8)
        .scalar("mines", Scalar::U8, |t| t.mines as i64, |t, v| t.mines = v as u8)
        .flag("on_boat", |t| t.on_boat, |t, v| t.on_boat = v)
        .scalar("reload", Scalar::U8, |t| t.reload as i64, |t, v| t.reload = v as u8)
        .flag("firing", |t| t.firing, |t, v| t.firing = v)
        .build()
});

impl Tank {
    /// A fully stocked tank at `(x, y)`, starting on a boat.
    pub fn new(x: i32, y: i32, direction: u8) -> Self {
        Tank {
            base: EntityBase::at(x, y),
            direction,
            speed: 0,
            armour: MAX_ARMOUR,
            shells: MAX_SHELLS,
            mines: 0,
            reload: 0,
            on_boat: true,
            firing: false,
        }
    }

    pub fn is_dead(&self) -> bool {
        self.armour == 0
    }

    fn fire(&mut self, ctx: &mut Context<'_>) {
        self.shells -= 1;
        self.reload = RELOAD_TICKS;
        let owner = if ctx.this().tank_index().is_some() {
            Reference::to(ctx.this())
        } else {
            Reference::None
        };
        let shell = ctx.spawn(Shell::new(self.base.x, self.base.y, self.direction, owner));
        debug!("{:?} fired {:?}, {} shells left", ctx.this(), shell, self.shells);
    }
}

impl Entity for Tank {
    entity_plumbing!();

    fn update(&mut self, ctx: &mut Context<'_>) {
        if !ctx.is_live() || self.is_dead() {
            return;
        }
        self.reload = self.reload.saturating_sub(1);
        if self.firing && self.reload == 0 && self.shells > 0 {
            self.fire(ctx);
        }
    }

    fn pre_remove(&mut self, ctx: &mut Context<'_>) {
        let this = ctx.this().clone();
        if this.tank_index().is_some() {
            if let Err(err) = ctx.table().remove_player(&this) {
                error!("could not retire player {:?}: {}", this, err);
            }
        }
    }
}

impl Variant for Tank {
    const TAG: TypeTag = TypeTag::new(b'T');
    const NAME: &'static str = "tank";

    fn blank() -> Self {
        Tank::default()
    }

    fn field_schema() -> &'static Schema<Self> {
        &TANK_SCHEMA
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bolo_core::ObjectTable;

    #[test]
    fn flags_trail_the_record() {
        let schema = Tank::field_schema();
        assert_eq!(schema.specifier(), "HHBBBBBBff");

        let mut tank = Tank::new(3, 4, 64);
        tank.firing = true;
        let bytes = schema.encode(&tank).unwrap();
        assert_eq!(bytes.len(), schema.encoded_len());
        assert_eq!(&bytes[..4], &[0, 3, 0, 4]);
        assert_eq!(bytes.last(), Some(&0b1100_0000));
    }

    #[test]
    fn firing_tank_spawns_shell_owned_by_player() {
        let mut table = ObjectTable::new();
        let mut tank = Tank::new(10, 10, 0);
        tank.firing = true;
        let tank = table.spawn(tank);
        table.add_player(&tank).unwrap();

        table.tick();
        assert_eq!(table.len(), 2);
        let shell = table.get(1).unwrap().downcast::<Shell>().unwrap();
        assert!(shell.owner.get().unwrap().ptr_eq(&tank));

        let state = tank.downcast::<Tank>().unwrap();
        assert_eq!(state.shells, MAX_SHELLS - 1);
        assert_eq!(state.reload, RELOAD_TICKS);
    }

    #[test]
    fn reload_gates_the_rate_of_fire() {
        let mut table = ObjectTable::new();
        let mut tank = Tank::new(10, 10, 0);
        tank.firing = true;
        let tank = table.spawn(tank);

        for _ in 0..RELOAD_TICKS {
            table.tick();
        }
        let shells = tank.downcast::<Tank>().unwrap().shells;
        assert_eq!(shells, MAX_SHELLS - 1);
        table.tick();
        assert_eq!(tank.downcast::<Tank>().unwrap().shells, MAX_SHELLS - 2);
    }

    #[test]
    fn destroying_a_player_tank_frees_its_slot() {
        let mut table = ObjectTable::new();
        let first = table.spawn(Tank::new(0, 0, 0));
        let second = table.spawn(Tank::new(1, 1, 0));
        table.add_player(&first).unwrap();
        table.add_player(&second).unwrap();

        table.destroy(&first).unwrap();
        assert_eq!(table.players().len(), 1);
        assert_eq!(second.tank_index(), Some(0));
        assert_eq!(first.tank_index(), None);
        assert_eq!(second.index(), 0);
    }
}
