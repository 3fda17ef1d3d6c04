use bolo_core::{load_state, ObjectTable, RegistryError, SchemaError, TableError, TypeRegistry};
use bytes::Buf;
use log::{debug, warn};
use thiserror::Error;

use crate::packet::{CREATE, DESTROY, PLAYER_JOIN, PLAYER_LEAVE, UPDATE};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReceiveError {
    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error(transparent)]
    Table(#[from] TableError),

    #[error("unknown message kind {kind:#04x} at offset {offset}")]
    UnknownMessage { kind: u8, offset: usize },

    #[error("packet ends inside a message header at offset {offset}")]
    Truncated { offset: usize },

    #[error("index {index} out of range, only {len} present")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("update carries {actual} entities but the table holds {expected}")]
    CountMismatch { expected: usize, actual: usize },
}

/// Applies packets from an authoritative table to a mirror table.
#[derive(Debug)]
pub struct Receiver {
    registry: TypeRegistry,
}

impl Receiver {
    pub fn new(registry: TypeRegistry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &TypeRegistry {
        &self.registry
    }

    /// Applies every message in `packet` in order, returning how many were
    /// applied. Stops at the first bad message; earlier messages stay applied.
    pub fn apply(&self, table: &mut ObjectTable, packet: &[u8]) -> Result<usize, ReceiveError> {
        let mut offset = 0;
        let mut applied = 0;
        while offset < packet.len() {
            let kind = packet[offset];
            let start = offset;
            offset += 1;
            offset += match kind {
                CREATE => self.apply_create(table, packet, offset)?,
                DESTROY => {
                    let index = read_u16(packet, offset)? as usize;
                    let entity = table
                        .get(index)
                        .cloned()
                        .ok_or(ReceiveError::IndexOutOfRange { index, len: table.len() })?;
                    table.destroy(&entity)?;
                    2
                }
                UPDATE => apply_update(table, packet, offset)?,
                PLAYER_JOIN => {
                    let index = read_u16(packet, offset)? as usize;
                    let entity = table
                        .get(index)
                        .cloned()
                        .ok_or(ReceiveError::IndexOutOfRange { index, len: table.len() })?;
                    table.add_player(&entity)?;
                    2
                }
                PLAYER_LEAVE => {
                    let tank_index = read_u16(packet, offset)? as usize;
                    let player = table.player(tank_index).cloned().ok_or(ReceiveError::IndexOutOfRange {
                        index: tank_index,
                        len: table.players().len(),
                    })?;
                    table.remove_player(&player)?;
                    2
                }
                other => {
                    warn!("dropping rest of packet: unknown message kind {:#04x} at {}", other, start);
                    return Err(ReceiveError::UnknownMessage { kind: other, offset: start });
                }
            };
            applied += 1;
        }
        Ok(applied)
    }

    /// Rebuilds an entity from its tag and state. The state is loaded into the
    /// blank instance before it joins the table, so a bad record adds nothing.
    fn apply_create(&self, table: &mut ObjectTable, packet: &[u8], offset: usize) -> Result<usize, ReceiveError> {
        let tag = *packet.get(offset).ok_or(ReceiveError::Truncated { offset })?;
        let descriptor = self.registry.lookup(tag)?;
        let mut entity = descriptor.construct();
        let consumed = load_state(&mut *entity, packet, offset + 1, table.players())?;
        let entity = table.adopt(entity);
        debug!("mirrored new {} as {:?}", descriptor.name(), entity);
        Ok(1 + consumed)
    }
}

fn read_u16(packet: &[u8], offset: usize) -> Result<u16, ReceiveError> {
    match packet.get(offset..offset + 2) {
        Some(mut bytes) => Ok(bytes.get_u16()),
        None => Err(ReceiveError::Truncated { offset }),
    }
}

fn apply_update(table: &mut ObjectTable, packet: &[u8], offset: usize) -> Result<usize, ReceiveError> {
    let count = read_u16(packet, offset)? as usize;
    if count != table.len() {
        return Err(ReceiveError::CountMismatch {
            expected: table.len(),
            actual: count,
        });
    }
    let mut at = offset + 2;
    for index in 0..count {
        let entity = table
            .get(index)
            .cloned()
            .ok_or(ReceiveError::IndexOutOfRange { index, len: table.len() })?;
        at += table.apply_net_update(&entity, packet, at)?;
    }
    Ok(at - offset)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bolo_simulation::builtin_registry;

    fn receiver() -> Receiver {
        Receiver::new(builtin_registry().unwrap())
    }

    #[test]
    fn unknown_tag_is_rejected_without_mutation() {
        let mut mirror = ObjectTable::new();
        let err = receiver().apply(&mut mirror, &[CREATE, b'Z', 0, 0, 0, 0]).unwrap_err();
        assert!(matches!(err, ReceiveError::Registry(RegistryError::UnknownTag(_))));
        assert!(mirror.is_empty());
    }

    #[test]
    fn short_create_adds_nothing() {
        let mut mirror = ObjectTable::new();
        let err = receiver().apply(&mut mirror, &[CREATE, b'X', 0, 1, 0]).unwrap_err();
        assert!(matches!(err, ReceiveError::Schema(SchemaError::Codec(_))));
        assert!(mirror.is_empty());
    }

    #[test]
    fn unknown_message_kind() {
        let mut mirror = ObjectTable::new();
        let err = receiver().apply(&mut mirror, &[b'!']).unwrap_err();
        assert_eq!(err, ReceiveError::UnknownMessage { kind: b'!', offset: 0 });
    }

    #[test]
    fn destroy_of_missing_index() {
        let mut mirror = ObjectTable::new();
        let err = receiver().apply(&mut mirror, &[DESTROY, 0, 4]).unwrap_err();
        assert_eq!(err, ReceiveError::IndexOutOfRange { index: 4, len: 0 });

        let err = receiver().apply(&mut mirror, &[DESTROY, 0]).unwrap_err();
        assert_eq!(err, ReceiveError::Truncated { offset: 1 });
    }

    #[test]
    fn update_count_must_match() {
        let mut mirror = ObjectTable::new();
        let applied = receiver()
            .apply(&mut mirror, &[CREATE, b'X', 0, 1, 0, 2, 5])
            .unwrap();
        assert_eq!(applied, 1);

        let err = receiver().apply(&mut mirror, &[UPDATE, 0, 2]).unwrap_err();
        assert_eq!(err, ReceiveError::CountMismatch { expected: 1, actual: 2 });
    }
}
