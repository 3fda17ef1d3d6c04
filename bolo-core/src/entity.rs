use std::any::Any;
use std::cell::{Cell, Ref, RefCell, RefMut};
use std::fmt;
use std::rc::Rc;

use crate::schema::{ErasedSchema, Schema, SchemaError};
use crate::table::Context;

/// Coordinate sentinel for an entity that is not placed in the world.
pub const UNPLACED: i32 = -1;

/// One-byte network discriminator of an entity variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeTag(u8);

impl TypeTag {
    pub const fn new(code: u8) -> Self {
        TypeTag(code)
    }

    pub fn code(self) -> u8 {
        self.0
    }

    pub fn as_char(self) -> char {
        self.0 as char
    }
}

impl From<u8> for TypeTag {
    fn from(code: u8) -> Self {
        TypeTag(code)
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_ascii_graphic() {
            write!(f, "'{}'", self.as_char())
        } else {
            write!(f, "#{}", self.0)
        }
    }
}

/// Anything a type tag can be looked up by: the tag itself, its character, or its code.
pub trait AsTypeTag: fmt::Debug {
    fn as_type_tag(&self) -> Option<TypeTag>;
}

impl AsTypeTag for TypeTag {
    fn as_type_tag(&self) -> Option<TypeTag> {
        Some(*self)
    }
}

impl AsTypeTag for u8 {
    fn as_type_tag(&self) -> Option<TypeTag> {
        Some(TypeTag(*self))
    }
}

impl AsTypeTag for char {
    fn as_type_tag(&self) -> Option<TypeTag> {
        self.is_ascii().then(|| TypeTag(*self as u8))
    }
}

/// How an external renderer should treat an entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DrawKind {
    #[default]
    NotDrawn,
    PlainTile,
    StyledTile,
}

/// State every entity carries: its world position.
///
/// Placed coordinates travel as 16 bits and must lie in `0..=65534`;
/// encoding anything else fails rather than colliding with [`UNPLACED`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntityBase {
    pub x: i32,
    pub y: i32,
}

impl EntityBase {
    pub fn at(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    pub fn is_placed(&self) -> bool {
        self.x != UNPLACED && self.y != UNPLACED
    }

    pub fn unplace(&mut self) {
        self.x = UNPLACED;
        self.y = UNPLACED;
    }
}

impl Default for EntityBase {
    fn default() -> Self {
        Self {
            x: UNPLACED,
            y: UNPLACED,
        }
    }
}

/// The polymorphic contract of every simulation-tracked object.
///
/// Hooks receive a [`Context`] that gives access to the owning table and to
/// the entity's own handle. The table, not the entity, owns the storage.
pub trait Entity: Any {
    fn type_tag(&self) -> TypeTag;
    fn schema(&self) -> &'static dyn ErasedSchema;
    fn base(&self) -> &EntityBase;
    fn base_mut(&mut self) -> &mut EntityBase;
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;

    fn draw_kind(&self) -> DrawKind {
        DrawKind::NotDrawn
    }

    /// Tile sheet coordinates for the renderer, if the entity is drawn.
    fn tile(&self) -> Option<(u16, u16)> {
        None
    }

    /// Fires once after the entity is registered in a table.
    fn post_initialize(&mut self, _ctx: &mut Context<'_>) {}

    /// Fires once per tick.
    fn update(&mut self, _ctx: &mut Context<'_>) {}

    /// Fires after a remote state update was applied to an active entity.
    fn post_net_update(&mut self, _ctx: &mut Context<'_>) {}

    fn pre_remove(&mut self, _ctx: &mut Context<'_>) {}

    fn destroy(&mut self, _ctx: &mut Context<'_>) {}
}

/// A concrete, registrable entity variant.
pub trait Variant: Entity + Sized {
    const TAG: TypeTag;
    const NAME: &'static str;

    /// Blank constructor used when reconstructing from network data.
    fn blank() -> Self;

    fn field_schema() -> &'static Schema<Self>;
}

/// Implements the bookkeeping half of [`Entity`] for a [`Variant`] with a `base` field.
#[macro_export]
macro_rules! entity_plumbing {
    () => {
        fn type_tag(&self) -> $crate::TypeTag {
            <Self as $crate::Variant>::TAG
        }

        fn schema(&self) -> &'static dyn $crate::ErasedSchema {
            <Self as $crate::Variant>::field_schema()
        }

        fn base(&self) -> &$crate::EntityBase {
            &self.base
        }

        fn base_mut(&mut self) -> &mut $crate::EntityBase {
            &mut self.base
        }

        fn as_any(&self) -> &dyn ::std::any::Any {
            self
        }

        fn as_any_mut(&mut self) -> &mut dyn ::std::any::Any {
            self
        }
    };
}

/// Encodes an entity's persistent fields.
pub fn serialize_state(entity: &dyn Entity) -> Result<Vec<u8>, SchemaError> {
    entity.schema().encode_dyn(entity)
}

/// Decodes persistent fields into `entity` from `bytes[offset..]`, returning bytes consumed.
pub fn load_state(
    entity: &mut dyn Entity,
    bytes: &[u8],
    offset: usize,
    players: &[EntityRef],
) -> Result<usize, SchemaError> {
    let schema = entity.schema();
    schema.decode_dyn(entity, bytes, offset, players)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    Constructed,
    Active,
    Removing,
    Destroyed,
}

struct Slot {
    tag: TypeTag,
    index: Cell<usize>,
    tank_index: Cell<Option<usize>>,
    lifecycle: Cell<Lifecycle>,
    body: RefCell<Box<dyn Entity>>,
}

/// Shared handle to an entity owned by an [`ObjectTable`](crate::ObjectTable).
///
/// Index bookkeeping lives outside the entity body so the table can shift
/// indices while an entity is in the middle of one of its own hooks.
#[derive(Clone)]
pub struct EntityRef(Rc<Slot>);

impl EntityRef {
    pub(crate) fn new(body: Box<dyn Entity>) -> Self {
        EntityRef(Rc::new(Slot {
            tag: body.type_tag(),
            index: Cell::new(0),
            tank_index: Cell::new(None),
            lifecycle: Cell::new(Lifecycle::Constructed),
            body: RefCell::new(body),
        }))
    }

    pub fn type_tag(&self) -> TypeTag {
        self.0.tag
    }

    /// Position in the owning table's entity array. Stale once destroyed.
    pub fn index(&self) -> usize {
        self.0.index.get()
    }

    pub(crate) fn set_index(&self, index: usize) {
        self.0.index.set(index);
    }

    /// Position in the active-players array, if this entity is an active player.
    pub fn tank_index(&self) -> Option<usize> {
        self.0.tank_index.get()
    }

    pub(crate) fn set_tank_index(&self, index: Option<usize>) {
        self.0.tank_index.set(index);
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.0.lifecycle.get()
    }

    pub(crate) fn set_lifecycle(&self, lifecycle: Lifecycle) {
        self.0.lifecycle.set(lifecycle);
    }

    pub fn is_live(&self) -> bool {
        self.lifecycle() == Lifecycle::Active
    }

    /// True while one of the entity's hooks is running.
    pub(crate) fn is_busy(&self) -> bool {
        self.0.body.try_borrow_mut().is_err()
    }

    pub fn ptr_eq(&self, other: &EntityRef) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    pub fn borrow(&self) -> Ref<'_, dyn Entity> {
        Ref::map(self.0.body.borrow(), |body| &**body)
    }

    pub fn borrow_mut(&self) -> RefMut<'_, dyn Entity> {
        RefMut::map(self.0.body.borrow_mut(), |body| &mut **body)
    }

    pub(crate) fn try_borrow(&self) -> Option<Ref<'_, dyn Entity>> {
        self.0.body.try_borrow().ok().map(|body| Ref::map(body, |body| &**body))
    }

    pub(crate) fn try_borrow_mut(&self) -> Option<RefMut<'_, dyn Entity>> {
        self.0
            .body
            .try_borrow_mut()
            .ok()
            .map(|body| RefMut::map(body, |body| &mut **body))
    }

    pub fn downcast<T: Entity>(&self) -> Option<Ref<'_, T>> {
        Ref::filter_map(self.borrow(), |entity| entity.as_any().downcast_ref::<T>()).ok()
    }

    pub fn downcast_mut<T: Entity>(&self) -> Option<RefMut<'_, T>> {
        RefMut::filter_map(self.borrow_mut(), |entity| entity.as_any_mut().downcast_mut::<T>()).ok()
    }

    pub fn position(&self) -> (i32, i32) {
        let body = self.borrow();
        (body.base().x, body.base().y)
    }

    /// Fails with [`SchemaError::EntityBusy`] while the entity's body is
    /// mutably borrowed, e.g. from inside its own hook.
    pub fn serialize_state(&self) -> Result<Vec<u8>, SchemaError> {
        let body = self.try_borrow().ok_or_else(|| SchemaError::EntityBusy(format!("{:?}", self)))?;
        serialize_state(&*body)
    }

    /// Fails with [`SchemaError::EntityBusy`] while the entity is running a hook.
    pub fn load_state(&self, bytes: &[u8], offset: usize, players: &[EntityRef]) -> Result<usize, SchemaError> {
        let mut body = self
            .try_borrow_mut()
            .ok_or_else(|| SchemaError::EntityBusy(format!("{:?}", self)))?;
        load_state(&mut *body, bytes, offset, players)
    }
}

impl PartialEq for EntityRef {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for EntityRef {}

impl fmt::Debug for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.type_tag(), self.index())?;
        if let Some(tank) = self.tank_index() {
            write!(f, "/tank{}", tank)?;
        }
        if !self.is_live() {
            write!(f, " ({:?})", self.lifecycle())?;
        }
        Ok(())
    }
}
