use std::any::TypeId;
use std::collections::HashMap;

use log::debug;
use thiserror::Error;

use crate::entity::{AsTypeTag, Entity, TypeTag, Variant};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("no entity variant is registered under {0}")]
    UnknownTag(String),

    #[error("type tag {tag} already belongs to '{existing}', cannot register '{attempted}'")]
    DuplicateTag {
        tag: TypeTag,
        existing: &'static str,
        attempted: &'static str,
    },
}

fn blank_of<E: Variant>() -> Box<dyn Entity> {
    Box::new(E::blank())
}

/// Everything needed to rebuild a variant from a wire type tag.
#[derive(Debug, Clone, Copy)]
pub struct VariantDescriptor {
    tag: TypeTag,
    name: &'static str,
    type_id: TypeId,
    blank: fn() -> Box<dyn Entity>,
}

impl VariantDescriptor {
    pub fn of<E: Variant>() -> Self {
        Self {
            tag: E::TAG,
            name: E::NAME,
            type_id: TypeId::of::<E>(),
            blank: blank_of::<E>,
        }
    }

    pub fn tag(&self) -> TypeTag {
        self.tag
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn is<E: Variant>(&self) -> bool {
        self.type_id == TypeId::of::<E>()
    }

    /// Blank-constructs the variant, ready for `load_state`.
    pub fn construct(&self) -> Box<dyn Entity> {
        (self.blank)()
    }
}

impl PartialEq for VariantDescriptor {
    fn eq(&self, other: &Self) -> bool {
        self.tag == other.tag && self.type_id == other.type_id
    }
}

/// Maps wire type tags to entity variants. Filled once at startup.
#[derive(Debug, Default)]
pub struct TypeRegistry {
    variants: HashMap<TypeTag, VariantDescriptor>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, descriptor: VariantDescriptor) -> Result<(), RegistryError> {
        if let Some(existing) = self.variants.get(&descriptor.tag) {
            if existing.type_id == descriptor.type_id {
                return Ok(());
            }
            return Err(RegistryError::DuplicateTag {
                tag: descriptor.tag,
                existing: existing.name,
                attempted: descriptor.name,
            });
        }
        debug!("registered entity variant '{}' as {}", descriptor.name, descriptor.tag);
        self.variants.insert(descriptor.tag, descriptor);
        Ok(())
    }

    pub fn register_variant<E: Variant>(&mut self) -> Result<(), RegistryError> {
        self.register(VariantDescriptor::of::<E>())
    }

    /// Looks a variant up by tag, tag character, or tag code.
    pub fn lookup<K: AsTypeTag>(&self, key: K) -> Result<&VariantDescriptor, RegistryError> {
        key.as_type_tag()
            .and_then(|tag| self.variants.get(&tag))
            .ok_or_else(|| RegistryError::UnknownTag(format!("{:?}", key)))
    }

    pub fn construct<K: AsTypeTag>(&self, key: K) -> Result<Box<dyn Entity>, RegistryError> {
        Ok(self.lookup(key)?.construct())
    }

    pub fn len(&self) -> usize {
        self.variants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.variants.is_empty()
    }

    /// Registered tags in ascending order.
    pub fn tags(&self) -> Vec<TypeTag> {
        let mut tags: Vec<_> = self.variants.keys().copied().collect();
        tags.sort();
        tags
    }
}
