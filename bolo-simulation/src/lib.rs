//! Built-in world objects and their registration.

use bolo_core::{RegistryError, TypeRegistry, Variant, VariantDescriptor};
use log::info;

pub mod munitions;
pub mod structures;
pub mod tank;

pub use munitions::{Explosion, Shell};
pub use structures::{Base, Pillbox};
pub use tank::Tank;

/// Descriptors of every built-in variant, in registration order.
pub fn builtin_variants() -> [VariantDescriptor; 5] {
    [
        VariantDescriptor::of::<Tank>(),
        VariantDescriptor::of::<Shell>(),
        VariantDescriptor::of::<Explosion>(),
        VariantDescriptor::of::<Pillbox>(),
        VariantDescriptor::of::<Base>(),
    ]
}

pub fn register_builtin(registry: &mut TypeRegistry) -> Result<(), RegistryError> {
    for descriptor in builtin_variants() {
        registry.register(descriptor)?;
    }
    info!("registered {} built-in entity variants", registry.len());
    Ok(())
}

/// A registry holding exactly the built-in variants.
pub fn builtin_registry() -> Result<TypeRegistry, RegistryError> {
    let mut registry = TypeRegistry::new();
    register_builtin(&mut registry)?;
    Ok(registry)
}

/// Record size in bytes of a variant's encoded state.
pub fn record_len<E: Variant>() -> usize {
    E::field_schema().encoded_len()
}
