//! The authoritative list of live entities and active players.
//!
//! Both arrays are dense: an entity's `index` (and a player's `tank_index`)
//! always equals its position, and removal shifts every later element down
//! by one.

use log::{debug, error, warn};
use thiserror::Error;

use crate::entity::{Entity, EntityRef, Lifecycle};
use crate::schema::SchemaError;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TableError {
    #[error("{entity} claims index {index} but that slot holds another entity (table has {len})")]
    StaleIndex { entity: String, index: usize, len: usize },

    #[error("{0} was never registered in a table")]
    NotInTable(String),

    #[error("{0} is already an active player")]
    AlreadyPlayer(String),

    #[error("{0} is not an active player")]
    NotAPlayer(String),
}

/// Receives creation and removal notices for replication.
pub trait NetworkBridge {
    fn on_created(&mut self, entity: &EntityRef);

    /// `index` is the position the entity occupied before removal.
    fn on_destroyed(&mut self, entity: &EntityRef, index: usize);

    fn on_player_added(&mut self, _player: &EntityRef) {}

    /// `tank_index` is the slot the player occupied before leaving.
    fn on_player_removed(&mut self, _player: &EntityRef, _tank_index: usize) {}
}

/// Receives requests to redraw a world location.
pub trait RenderSink {
    fn invalidate(&mut self, x: i32, y: i32);
}

/// Caller-supplied teardown that replaces [`Entity::destroy`].
pub type Destructor = Box<dyn FnOnce(&mut dyn Entity, &mut Context<'_>)>;

/// What a hook sees of the world: the owning table and its own handle.
pub struct Context<'a> {
    table: &'a mut ObjectTable,
    this: &'a EntityRef,
}

impl<'a> Context<'a> {
    fn new(table: &'a mut ObjectTable, this: &'a EntityRef) -> Self {
        Self { table, this }
    }

    pub fn table(&mut self) -> &mut ObjectTable {
        self.table
    }

    pub fn this(&self) -> &EntityRef {
        self.this
    }

    /// False once the entity was destroyed, e.g. when a stale tick snapshot
    /// still visits it.
    pub fn is_live(&self) -> bool {
        self.this.is_live()
    }

    pub fn players(&self) -> &[EntityRef] {
        self.table.players()
    }

    pub fn spawn<E: Entity>(&mut self, entity: E) -> EntityRef {
        self.table.spawn(entity)
    }

    pub fn invalidate(&mut self, x: i32, y: i32) {
        self.table.invalidate(x, y);
    }

    /// Removes this entity. Completes as soon as the running hook returns.
    pub fn destroy_self(&mut self) {
        let this = self.this.clone();
        if let Err(err) = self.table.destroy(&this) {
            error!("{:?} failed to destroy itself: {}", this, err);
        }
    }
}

struct PendingRemoval {
    entity: EntityRef,
    destructor: Option<Destructor>,
}

#[derive(Default)]
pub struct ObjectTable {
    entities: Vec<EntityRef>,
    players: Vec<EntityRef>,
    bridge: Option<Box<dyn NetworkBridge>>,
    render_sink: Option<Box<dyn RenderSink>>,
    pending_removals: Vec<PendingRemoval>,
    references_dirty: bool,
    ticks: u64,
}

impl ObjectTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_bridge(&mut self, bridge: Box<dyn NetworkBridge>) {
        self.bridge = Some(bridge);
    }

    pub fn set_render_sink(&mut self, sink: Box<dyn RenderSink>) {
        self.render_sink = Some(sink);
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&EntityRef> {
        self.entities.get(index)
    }

    pub fn entities(&self) -> &[EntityRef] {
        &self.entities
    }

    pub fn iter(&self) -> impl Iterator<Item = &EntityRef> {
        self.entities.iter()
    }

    pub fn players(&self) -> &[EntityRef] {
        &self.players
    }

    pub fn player(&self, tank_index: usize) -> Option<&EntityRef> {
        self.players.get(tank_index)
    }

    pub fn tick_count(&self) -> u64 {
        self.ticks
    }

    /// Forwards a redraw request to the render sink, if one is attached.
    pub fn invalidate(&mut self, x: i32, y: i32) {
        if let Some(sink) = self.render_sink.as_mut() {
            sink.invalidate(x, y);
        }
    }

    /// Registers a locally constructed entity and announces it to the bridge.
    pub fn spawn<E: Entity>(&mut self, entity: E) -> EntityRef {
        let entity = self.insert(Box::new(entity));
        if let Some(bridge) = self.bridge.as_mut() {
            bridge.on_created(&entity);
        }
        self.settle();
        entity
    }

    /// Registers an entity reconstructed from network data. The bridge is not
    /// notified; the entity already exists on the other side.
    pub fn adopt(&mut self, entity: Box<dyn Entity>) -> EntityRef {
        let entity = self.insert(entity);
        self.settle();
        entity
    }

    fn insert(&mut self, body: Box<dyn Entity>) -> EntityRef {
        let entity = EntityRef::new(body);
        entity.set_index(self.entities.len());
        self.entities.push(entity.clone());
        entity.set_lifecycle(Lifecycle::Active);
        debug!("inserted {:?}", entity);
        self.run_hook(&entity, |body, ctx| body.post_initialize(ctx));
        entity
    }

    /// Applies a remote state update to an active entity and fires
    /// `post_net_update`. Returns the bytes consumed.
    pub fn apply_net_update(&mut self, entity: &EntityRef, bytes: &[u8], offset: usize) -> Result<usize, SchemaError> {
        let consumed = entity.load_state(bytes, offset, &self.players)?;
        self.run_hook(entity, |body, ctx| body.post_net_update(ctx));
        self.settle();
        Ok(consumed)
    }

    pub fn destroy(&mut self, entity: &EntityRef) -> Result<(), TableError> {
        self.remove(entity, None)
    }

    /// Like [`destroy`](Self::destroy) but runs `destructor` instead of the
    /// entity's own `destroy` hook.
    pub fn destroy_with<F>(&mut self, entity: &EntityRef, destructor: F) -> Result<(), TableError>
    where
        F: FnOnce(&mut dyn Entity, &mut Context<'_>) + 'static,
    {
        self.remove(entity, Some(Box::new(destructor)))
    }

    fn remove(&mut self, entity: &EntityRef, destructor: Option<Destructor>) -> Result<(), TableError> {
        match entity.lifecycle() {
            Lifecycle::Removing | Lifecycle::Destroyed => {
                debug!("{:?} is already being removed", entity);
                return Ok(());
            }
            Lifecycle::Constructed => return Err(TableError::NotInTable(format!("{:?}", entity))),
            Lifecycle::Active => {}
        }
        self.check_slot(entity)?;

        if entity.is_busy() {
            if !self.pending_removals.iter().any(|p| p.entity.ptr_eq(entity)) {
                debug!("{:?} is running a hook; removal deferred until it returns", entity);
                self.pending_removals.push(PendingRemoval {
                    entity: entity.clone(),
                    destructor,
                });
            }
            return Ok(());
        }

        self.teardown(entity.clone(), destructor);
        self.settle();
        Ok(())
    }

    fn check_slot(&self, entity: &EntityRef) -> Result<(), TableError> {
        let index = entity.index();
        match self.entities.get(index) {
            Some(found) if found.ptr_eq(entity) => Ok(()),
            _ => {
                error!(
                    "index invariant violated: {:?} is not at position {} of {}",
                    entity,
                    index,
                    self.entities.len()
                );
                Err(TableError::StaleIndex {
                    entity: format!("{:?}", entity),
                    index,
                    len: self.entities.len(),
                })
            }
        }
    }

    fn teardown(&mut self, entity: EntityRef, destructor: Option<Destructor>) {
        entity.set_lifecycle(Lifecycle::Removing);
        self.run_hook(&entity, move |body, ctx| {
            body.pre_remove(ctx);
            match destructor {
                Some(destructor) => destructor(body, ctx),
                None => body.destroy(ctx),
            }
        });

        // Hooks may have removed other entities, so read the index again.
        let index = entity.index();
        if !self.entities.get(index).is_some_and(|found| found.ptr_eq(&entity)) {
            error!("{:?} moved during its teardown; leaving table untouched", entity);
            return;
        }
        self.entities.remove(index);
        for later in &self.entities[index..] {
            later.set_index(later.index() - 1);
        }
        entity.set_lifecycle(Lifecycle::Destroyed);
        debug!("destroyed {:?} from position {}", entity, index);

        if let Some(bridge) = self.bridge.as_mut() {
            bridge.on_destroyed(&entity, index);
        }
    }

    /// Completes removals and reference resolution that had to wait for a
    /// running hook.
    fn settle(&mut self) {
        while let Some(position) = self.pending_removals.iter().position(|p| !p.entity.is_busy()) {
            let PendingRemoval { entity, destructor } = self.pending_removals.remove(position);
            if entity.is_live() {
                self.teardown(entity, destructor);
            }
        }
        if self.references_dirty {
            self.resolve_references();
        }
    }

    fn run_hook<F>(&mut self, entity: &EntityRef, hook: F)
    where
        F: FnOnce(&mut dyn Entity, &mut Context<'_>),
    {
        match entity.try_borrow_mut() {
            Some(mut body) => {
                let mut ctx = Context::new(self, entity);
                hook(&mut *body, &mut ctx);
            }
            None => warn!("{:?} is already inside a hook; nested hook skipped", entity),
        }
    }

    /// Runs one simulation step over a snapshot of the current entities.
    ///
    /// Entities spawned during the pass wait for the next tick. Entities
    /// destroyed during the pass are still visited; their hook context
    /// reports `is_live() == false`.
    pub fn tick(&mut self) {
        self.ticks += 1;
        let snapshot = self.entities.clone();
        for entity in &snapshot {
            self.run_hook(entity, |body, ctx| body.update(ctx));
            self.settle();
        }
    }

    pub fn add_player(&mut self, player: &EntityRef) -> Result<usize, TableError> {
        if player.tank_index().is_some() {
            return Err(TableError::AlreadyPlayer(format!("{:?}", player)));
        }
        let tank_index = self.players.len();
        player.set_tank_index(Some(tank_index));
        self.players.push(player.clone());
        debug!("{:?} joined as player {}", player, tank_index);
        if let Some(bridge) = self.bridge.as_mut() {
            bridge.on_player_added(player);
        }
        self.resolve_references();
        Ok(tank_index)
    }

    pub fn remove_player(&mut self, player: &EntityRef) -> Result<(), TableError> {
        let Some(tank_index) = player.tank_index() else {
            return Err(TableError::NotAPlayer(format!("{:?}", player)));
        };
        if !self.players.get(tank_index).is_some_and(|found| found.ptr_eq(player)) {
            error!("player invariant violated: {:?} is not at position {}", player, tank_index);
            return Err(TableError::StaleIndex {
                entity: format!("{:?}", player),
                index: tank_index,
                len: self.players.len(),
            });
        }
        self.players.remove(tank_index);
        for later in &self.players[tank_index..] {
            later.set_tank_index(later.tank_index().map(|index| index - 1));
        }
        player.set_tank_index(None);
        debug!("{:?} left player slot {}", player, tank_index);
        if let Some(bridge) = self.bridge.as_mut() {
            bridge.on_player_removed(player, tank_index);
        }
        self.resolve_references();
        Ok(())
    }

    /// Rebinds every reference field to the live player it names and asks the
    /// render sink to redraw each affected entity.
    pub fn resolve_references(&mut self) {
        self.references_dirty = false;
        for entity in &self.entities {
            let Some(mut body) = entity.try_borrow_mut() else {
                // Picked up by `settle` once the running hook returns.
                self.references_dirty = true;
                continue;
            };
            let schema = body.schema();
            if !schema.has_references() {
                continue;
            }
            if let Err(err) = schema.resolve_dyn(&mut *body, &self.players) {
                error!("could not resolve references of {:?}: {}", entity, err);
                continue;
            }
            let base = *body.base();
            if base.is_placed() {
                if let Some(sink) = self.render_sink.as_mut() {
                    sink.invalidate(base.x, base.y);
                }
            }
        }
    }
}
