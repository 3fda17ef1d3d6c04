//! Diagnostic encodings of table summaries.
//!
//! Packets carry the compact wire state; summaries go through a
//! [`Serializer`] picked from configuration so operators can read them as
//! JSON or keep them small with bincode.

use bolo_core::{ObjectTable, SchemaError};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A summary could not be encoded.
#[derive(Error, Debug)]
pub enum SerializationError {
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Binary serialization error: {0}")]
    Binary(#[from] bincode::Error),
}

/// Object-safe summary encoder, chosen at startup from `transport.serializer`.
pub trait Serializer {
    fn serialize_to_bytes(&self, data: &dyn SerializeObject) -> Result<Vec<u8>, SerializationError>;
}

/// Anything a [`Serializer`] can encode; every `serde` type qualifies.
pub trait SerializeObject {
    fn to_json(&self) -> Result<Vec<u8>, SerializationError>;
    fn to_binary(&self) -> Result<Vec<u8>, SerializationError>;
}

impl<T: Serialize + ?Sized> SerializeObject for T {
    fn to_json(&self) -> Result<Vec<u8>, SerializationError> {
        Ok(serde_json::to_vec(self)?)
    }

    fn to_binary(&self) -> Result<Vec<u8>, SerializationError> {
        Ok(bincode::serialize(self)?)
    }
}

/// Human-readable summaries for logs and stdio inspection.
pub struct JsonSerializer;

impl Serializer for JsonSerializer {
    fn serialize_to_bytes(&self, data: &dyn SerializeObject) -> Result<Vec<u8>, SerializationError> {
        data.to_json()
    }
}

/// Compact bincode summaries, decodable back into [`TableSummary`].
pub struct BinarySerializer;

impl Serializer for BinarySerializer {
    fn serialize_to_bytes(&self, data: &dyn SerializeObject) -> Result<Vec<u8>, SerializationError> {
        data.to_binary()
    }
}

/// One entity as seen by diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntitySummary {
    pub index: usize,
    pub tag: char,
    pub x: i32,
    pub y: i32,
    pub tank_index: Option<usize>,
    /// The encoded wire state.
    pub state: Vec<u8>,
}

/// Diagnostic snapshot of a table, comparable across authority and mirror.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSummary {
    pub tick: u64,
    pub players: usize,
    pub entities: Vec<EntitySummary>,
}

impl TableSummary {
    pub fn capture(table: &ObjectTable) -> Result<Self, SchemaError> {
        let entities = table
            .iter()
            .map(|entity| {
                let (x, y) = entity.position();
                Ok(EntitySummary {
                    index: entity.index(),
                    tag: entity.type_tag().as_char(),
                    x,
                    y,
                    tank_index: entity.tank_index(),
                    state: entity.serialize_state()?,
                })
            })
            .collect::<Result<Vec<_>, SchemaError>>()?;
        Ok(TableSummary {
            tick: table.tick_count(),
            players: table.players().len(),
            entities,
        })
    }

    /// True when both tables hold the same entities in the same state,
    /// ignoring how many ticks each has run.
    pub fn same_world(&self, other: &TableSummary) -> bool {
        self.players == other.players && self.entities == other.entities
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bolo_simulation::{Base, Tank};
    use bolo_core::Reference;

    fn sample_table() -> ObjectTable {
        let mut table = ObjectTable::new();
        let tank = table.spawn(Tank::new(10, 20, 0));
        table.add_player(&tank).unwrap();
        table.spawn(Base::new(5, 5, Reference::to(&tank)));
        table
    }

    #[test]
    fn json_summary_lists_entities() {
        let summary = TableSummary::capture(&sample_table()).unwrap();
        let json = JsonSerializer.serialize_to_bytes(&summary).unwrap();
        let text = String::from_utf8(json).unwrap();
        assert!(text.contains(r#""tag":"T""#));
        assert!(text.contains(r#""tank_index":0"#));
        assert!(text.contains(r#""players":1"#));
    }

    #[test]
    fn binary_summary_decodes() {
        let summary = TableSummary::capture(&sample_table()).unwrap();
        let bytes = BinarySerializer.serialize_to_bytes(&summary).unwrap();
        let decoded: TableSummary = bincode::deserialize(&bytes).unwrap();
        assert_eq!(decoded, summary);
        assert_eq!(decoded.entities[1].tag, 'b');
    }
}
