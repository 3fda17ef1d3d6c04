//! World-object bookkeeping and replication primitives.
//!
//! An [`ObjectTable`] owns every live entity under a dense index, entity
//! variants describe their persistent fields once through a [`Schema`], and
//! the [`codec`] module packs those fields into the wire format shared with
//! remote observers.

pub mod codec;
pub mod entity;
pub mod registry;
pub mod schema;
pub mod table;

pub use codec::{CodecError, Value};
pub use entity::{
    load_state, serialize_state, AsTypeTag, DrawKind, Entity, EntityBase, EntityRef, Lifecycle, TypeTag, Variant,
    UNPLACED,
};
pub use registry::{RegistryError, TypeRegistry, VariantDescriptor};
pub use schema::{ErasedSchema, FieldKind, Reference, Scalar, Schema, SchemaBuilder, SchemaError, NO_REFERENCE};
pub use table::{Context, Destructor, NetworkBridge, ObjectTable, RenderSink, TableError};

pub mod prelude {
    pub use crate::entity_plumbing;
    pub use crate::{
        Context, DrawKind, Entity, EntityBase, EntityRef, Reference, Scalar, Schema, TypeTag, Variant,
    };
}
