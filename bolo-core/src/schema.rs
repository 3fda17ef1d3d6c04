//! Declarative persistent-field lists.
//!
//! Each variant builds one [`Schema`] listing its persistent fields in
//! declaration order. The same list drives encoding, decoding and reference
//! resolution, so the three traversals can never disagree on field order.
//!
//! Record layout: scalars and references in declaration order, followed by
//! every flag in declaration order. Flags therefore share bytes at the end of
//! the record no matter where they were declared.

use std::fmt;

use log::warn;
use thiserror::Error;

use crate::codec::{self, CodecError, Value};
use crate::entity::{Entity, EntityRef, UNPLACED};

/// Wire value of a reference field that points at nobody.
pub const NO_REFERENCE: u16 = u16::MAX;

/// Wire value of an unplaced coordinate. Placed coordinates stay below it.
const UNPLACED_WIRE: i64 = u16::MAX as i64;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SchemaError {
    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error("schema of {expected} applied to a different variant")]
    VariantMismatch { expected: &'static str },

    #[error("decoded value for field '{field}' has the wrong kind")]
    CorruptValue { field: &'static str },

    #[error("{0} is running a hook and cannot be encoded or decoded")]
    EntityBusy(String),
}

/// Fixed-width integer encodings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scalar {
    U8,
    U16,
    U32,
    I8,
    I16,
    I32,
}

impl Scalar {
    pub fn bits(self) -> u8 {
        match self {
            Scalar::U8 | Scalar::I8 => 8,
            Scalar::U16 | Scalar::I16 => 16,
            Scalar::U32 | Scalar::I32 => 32,
        }
    }

    pub fn is_signed(self) -> bool {
        matches!(self, Scalar::I8 | Scalar::I16 | Scalar::I32)
    }

    fn specifier(self) -> char {
        match self {
            Scalar::U8 => 'B',
            Scalar::U16 => 'H',
            Scalar::U32 => 'I',
            Scalar::I8 => 'b',
            Scalar::I16 => 'h',
            Scalar::I32 => 'i',
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Scalar(Scalar),
    Flag,
    Reference,
}

/// A persistent link to an active player, carried on the wire as its tank index.
#[derive(Clone, Default)]
pub enum Reference {
    #[default]
    None,
    Bound(EntityRef),
    /// A decoded index with no live player behind it yet. Reads as "nobody".
    Unresolved(u16),
}

impl Reference {
    pub fn to(player: &EntityRef) -> Self {
        Reference::Bound(player.clone())
    }

    pub fn get(&self) -> Option<&EntityRef> {
        match self {
            Reference::Bound(player) => Some(player),
            Reference::None | Reference::Unresolved(_) => None,
        }
    }

    pub fn is_some(&self) -> bool {
        self.get().is_some()
    }

    fn wire_index(&self) -> u16 {
        match self {
            Reference::None => NO_REFERENCE,
            Reference::Bound(player) => player
                .tank_index()
                .and_then(|index| u16::try_from(index).ok())
                .unwrap_or(NO_REFERENCE),
            Reference::Unresolved(index) => *index,
        }
    }

    fn from_wire(index: u16, players: &[EntityRef]) -> Self {
        if index == NO_REFERENCE {
            return Reference::None;
        }
        match players.get(index as usize) {
            Some(player) => Reference::Bound(player.clone()),
            None => {
                warn!(
                    "reference to player {} but only {} players are active; leaving unresolved",
                    index,
                    players.len()
                );
                Reference::Unresolved(index)
            }
        }
    }

    /// Rebinds to the live player, dropping players that have left.
    fn resolve(&mut self, players: &[EntityRef]) {
        let resolved = match self {
            Reference::None => Reference::None,
            Reference::Bound(player) => {
                let still_active = player
                    .tank_index()
                    .and_then(|index| players.get(index))
                    .is_some_and(|found| found.ptr_eq(player));
                if still_active {
                    Reference::Bound(player.clone())
                } else {
                    Reference::None
                }
            }
            Reference::Unresolved(index) => match players.get(*index as usize) {
                Some(player) => Reference::Bound(player.clone()),
                None => Reference::Unresolved(*index),
            },
        };
        *self = resolved;
    }
}

impl PartialEq for Reference {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Reference::None, Reference::None) => true,
            (Reference::Bound(a), Reference::Bound(b)) => a.ptr_eq(b),
            (Reference::Unresolved(a), Reference::Unresolved(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Debug for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reference::None => write!(f, "None"),
            Reference::Bound(player) => write!(f, "Bound({:?})", player),
            Reference::Unresolved(index) => write!(f, "Unresolved({})", index),
        }
    }
}

enum Access<E> {
    /// A base coordinate: 16 bits on the wire with `0xFFFF` meaning unplaced.
    Coordinate {
        get: fn(&E) -> i32,
        set: fn(&mut E, i32),
    },
    Scalar {
        kind: Scalar,
        get: fn(&E) -> i64,
        set: fn(&mut E, i64),
    },
    Flag {
        get: fn(&E) -> bool,
        set: fn(&mut E, bool),
    },
    Reference {
        get: fn(&E) -> &Reference,
        get_mut: fn(&mut E) -> &mut Reference,
    },
}

struct Field<E> {
    name: &'static str,
    access: Access<E>,
}

impl<E> Field<E> {
    fn kind(&self) -> FieldKind {
        match &self.access {
            Access::Coordinate { .. } => FieldKind::Scalar(Scalar::U16),
            Access::Scalar { kind, .. } => FieldKind::Scalar(*kind),
            Access::Flag { .. } => FieldKind::Flag,
            Access::Reference { .. } => FieldKind::Reference,
        }
    }
}

fn coord_to_wire(coord: i32) -> Result<i64, CodecError> {
    if coord == UNPLACED {
        return Ok(UNPLACED_WIRE);
    }
    let value = coord as i64;
    if !(0..UNPLACED_WIRE).contains(&value) {
        return Err(CodecError::ValueOutOfRange { spec: 'H', value });
    }
    Ok(value)
}

fn coord_from_wire(value: i64) -> i32 {
    if value == UNPLACED_WIRE {
        UNPLACED
    } else {
        value as i32
    }
}

/// Builds a [`Schema`]. The base coordinates `x`, `y` are always declared first.
pub struct SchemaBuilder<E> {
    fields: Vec<Field<E>>,
}

impl<E: Entity> SchemaBuilder<E> {
    fn new() -> Self {
        SchemaBuilder { fields: Vec::new() }
            .coordinate("x", |e: &E| e.base().x, |e: &mut E, v| e.base_mut().x = v)
            .coordinate("y", |e: &E| e.base().y, |e: &mut E, v| e.base_mut().y = v)
    }

    fn coordinate(mut self, name: &'static str, get: fn(&E) -> i32, set: fn(&mut E, i32)) -> Self {
        self.fields.push(Field {
            name,
            access: Access::Coordinate { get, set },
        });
        self
    }

    pub fn scalar(mut self, name: &'static str, kind: Scalar, get: fn(&E) -> i64, set: fn(&mut E, i64)) -> Self {
        self.fields.push(Field {
            name,
            access: Access::Scalar { kind, get, set },
        });
        self
    }

    pub fn flag(mut self, name: &'static str, get: fn(&E) -> bool, set: fn(&mut E, bool)) -> Self {
        self.fields.push(Field {
            name,
            access: Access::Flag { get, set },
        });
        self
    }

    pub fn reference(
        mut self,
        name: &'static str,
        get: fn(&E) -> &Reference,
        get_mut: fn(&mut E) -> &mut Reference,
    ) -> Self {
        self.fields.push(Field {
            name,
            access: Access::Reference { get, get_mut },
        });
        self
    }

    pub fn build(self) -> Schema<E> {
        // Literal specifiers in declaration order, flags counted and appended.
        let mut specifier = String::with_capacity(self.fields.len());
        let mut encoded_len = 0;
        let mut flags = 0;
        let mut has_references = false;
        for field in &self.fields {
            match field.kind() {
                FieldKind::Scalar(kind) => {
                    specifier.push(kind.specifier());
                    encoded_len += kind.bits() as usize / 8;
                }
                FieldKind::Reference => {
                    specifier.push('H');
                    encoded_len += 2;
                    has_references = true;
                }
                FieldKind::Flag => flags += 1,
            }
        }
        specifier.extend(std::iter::repeat('f').take(flags));
        encoded_len += flags.div_ceil(8);

        Schema {
            fields: self.fields,
            specifier,
            encoded_len,
            flags,
            has_references,
        }
    }
}

/// The ordered persistent fields of one variant.
pub struct Schema<E> {
    fields: Vec<Field<E>>,
    specifier: String,
    encoded_len: usize,
    flags: usize,
    has_references: bool,
}

/// One decoded field value, validated before anything is written.
enum Assign {
    Int(i64),
    Flag(bool),
    Reference(Reference),
}

impl<E: Entity> Schema<E> {
    pub fn builder() -> SchemaBuilder<E> {
        SchemaBuilder::new()
    }

    /// Codec specifier string of a full record.
    pub fn specifier(&self) -> &str {
        &self.specifier
    }

    /// Size of an encoded record in bytes.
    pub fn encoded_len(&self) -> usize {
        self.encoded_len
    }

    pub fn has_references(&self) -> bool {
        self.has_references
    }

    /// Field names and kinds in declaration order.
    pub fn fields(&self) -> impl Iterator<Item = (&'static str, FieldKind)> + '_ {
        self.fields.iter().map(|field| (field.name, field.kind()))
    }

    pub fn encode(&self, entity: &E) -> Result<Vec<u8>, SchemaError> {
        let mut values = Vec::with_capacity(self.fields.len());
        let mut flags = Vec::with_capacity(self.flags);
        for field in &self.fields {
            match &field.access {
                Access::Coordinate { get, .. } => values.push(Value::Int(coord_to_wire(get(entity))?)),
                Access::Scalar { get, .. } => values.push(Value::Int(get(entity))),
                Access::Reference { get, .. } => values.push(Value::Int(get(entity).wire_index() as i64)),
                Access::Flag { get, .. } => flags.push(Value::Flag(get(entity))),
            }
        }
        values.extend(flags);
        Ok(codec::pack(&self.specifier, &values)?)
    }

    /// Decodes one record into `entity`. Nothing is written unless the whole
    /// record decoded.
    pub fn decode(&self, entity: &mut E, bytes: &[u8], offset: usize, players: &[EntityRef]) -> Result<usize, SchemaError> {
        let (values, consumed) = codec::unpack(&self.specifier, bytes, offset)?;

        let (inline, deferred) = values.split_at(values.len() - self.flags);
        let mut inline = inline.iter();
        let mut deferred = deferred.iter();
        let mut assigns = Vec::with_capacity(self.fields.len());
        for field in &self.fields {
            let corrupt = || SchemaError::CorruptValue { field: field.name };
            let assign = match &field.access {
                Access::Coordinate { .. } | Access::Scalar { .. } => {
                    Assign::Int(inline.next().and_then(Value::as_int).ok_or_else(corrupt)?)
                }
                Access::Reference { .. } => {
                    let index = inline.next().and_then(Value::as_int).ok_or_else(corrupt)?;
                    let index = u16::try_from(index).map_err(|_| corrupt())?;
                    Assign::Reference(Reference::from_wire(index, players))
                }
                Access::Flag { .. } => Assign::Flag(deferred.next().and_then(Value::as_flag).ok_or_else(corrupt)?),
            };
            assigns.push(assign);
        }

        for (field, assign) in self.fields.iter().zip(assigns) {
            match (&field.access, assign) {
                (Access::Coordinate { set, .. }, Assign::Int(value)) => set(entity, coord_from_wire(value)),
                (Access::Scalar { set, .. }, Assign::Int(value)) => set(entity, value),
                (Access::Flag { set, .. }, Assign::Flag(value)) => set(entity, value),
                (Access::Reference { get_mut, .. }, Assign::Reference(value)) => *get_mut(entity) = value,
                _ => unreachable!("assignments are built from the same field list"),
            }
        }

        Ok(consumed)
    }

    pub fn resolve(&self, entity: &mut E, players: &[EntityRef]) {
        for field in &self.fields {
            if let Access::Reference { get_mut, .. } = &field.access {
                get_mut(entity).resolve(players);
            }
        }
    }
}

/// Object-safe view of a [`Schema`], reachable from `dyn Entity`.
pub trait ErasedSchema: Send + Sync {
    fn specifier(&self) -> &str;
    fn encoded_len(&self) -> usize;
    fn has_references(&self) -> bool;
    fn encode_dyn(&self, entity: &dyn Entity) -> Result<Vec<u8>, SchemaError>;
    fn decode_dyn(
        &self,
        entity: &mut dyn Entity,
        bytes: &[u8],
        offset: usize,
        players: &[EntityRef],
    ) -> Result<usize, SchemaError>;
    fn resolve_dyn(&self, entity: &mut dyn Entity, players: &[EntityRef]) -> Result<(), SchemaError>;
}

impl<E: Entity> ErasedSchema for Schema<E> {
    fn specifier(&self) -> &str {
        Schema::specifier(self)
    }

    fn encoded_len(&self) -> usize {
        Schema::encoded_len(self)
    }

    fn has_references(&self) -> bool {
        Schema::has_references(self)
    }

    fn encode_dyn(&self, entity: &dyn Entity) -> Result<Vec<u8>, SchemaError> {
        let entity = entity.as_any().downcast_ref::<E>().ok_or(SchemaError::VariantMismatch {
            expected: std::any::type_name::<E>(),
        })?;
        self.encode(entity)
    }

    fn decode_dyn(
        &self,
        entity: &mut dyn Entity,
        bytes: &[u8],
        offset: usize,
        players: &[EntityRef],
    ) -> Result<usize, SchemaError> {
        let entity = entity.as_any_mut().downcast_mut::<E>().ok_or(SchemaError::VariantMismatch {
            expected: std::any::type_name::<E>(),
        })?;
        self.decode(entity, bytes, offset, players)
    }

    fn resolve_dyn(&self, entity: &mut dyn Entity, players: &[EntityRef]) -> Result<(), SchemaError> {
        let entity = entity.as_any_mut().downcast_mut::<E>().ok_or(SchemaError::VariantMismatch {
            expected: std::any::type_name::<E>(),
        })?;
        self.resolve(entity, players);
        Ok(())
    }
}
