//! Packet framing.
//!
//! A packet is a sequence of messages, each a kind byte followed by its
//! payload:
//!
//! | kind | payload |
//! |------|---------|
//! | `C`  | `[type tag][state]`: an entity was created |
//! | `D`  | `[u16 index]`: the entity at `index` was destroyed |
//! | `U`  | `[u16 count][state]*`: full state of every entity in table order |
//! | `P`  | `[u16 index]`: the entity at `index` joined as a player |
//! | `Q`  | `[u16 tank index]`: the player in that slot left |
//!
//! Integers are big-endian. States carry no tag inside `U`; sender and
//! receiver tables hold the same variants in the same order.

use bolo_core::{EntityRef, ObjectTable};
use bytes::BufMut;

use crate::TransportError;

pub const CREATE: u8 = b'C';
pub const DESTROY: u8 = b'D';
pub const UPDATE: u8 = b'U';
pub const PLAYER_JOIN: u8 = b'P';
pub const PLAYER_LEAVE: u8 = b'Q';

fn wire_index(index: usize) -> Result<u16, TransportError> {
    u16::try_from(index).map_err(|_| TransportError::IndexOverflow(index))
}

/// Accumulates messages into one packet.
#[derive(Debug, Default, Clone)]
pub struct PacketWriter {
    buf: Vec<u8>,
    messages: usize,
}

impl PacketWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// Number of messages written since the last [`finish`](Self::finish).
    pub fn message_count(&self) -> usize {
        self.messages
    }

    pub fn create(&mut self, entity: &EntityRef) -> Result<(), TransportError> {
        let state = entity.serialize_state()?;
        self.buf.put_u8(CREATE);
        self.buf.put_u8(entity.type_tag().code());
        self.buf.put_slice(&state);
        self.messages += 1;
        Ok(())
    }

    pub fn destroy(&mut self, index: usize) -> Result<(), TransportError> {
        let index = wire_index(index)?;
        self.buf.put_u8(DESTROY);
        self.buf.put_u16(index);
        self.messages += 1;
        Ok(())
    }

    pub fn player_join(&mut self, player: &EntityRef) -> Result<(), TransportError> {
        let index = wire_index(player.index())?;
        self.buf.put_u8(PLAYER_JOIN);
        self.buf.put_u16(index);
        self.messages += 1;
        Ok(())
    }

    pub fn player_leave(&mut self, tank_index: usize) -> Result<(), TransportError> {
        let tank_index = wire_index(tank_index)?;
        self.buf.put_u8(PLAYER_LEAVE);
        self.buf.put_u16(tank_index);
        self.messages += 1;
        Ok(())
    }

    /// Writes the full state of every entity. Nothing is written if any
    /// entity fails to encode.
    pub fn update(&mut self, table: &ObjectTable) -> Result<(), TransportError> {
        let count = wire_index(table.len())?;
        let mut states = Vec::new();
        for entity in table.iter() {
            states.extend(entity.serialize_state()?);
        }
        self.buf.put_u8(UPDATE);
        self.buf.put_u16(count);
        self.buf.put_slice(&states);
        self.messages += 1;
        Ok(())
    }

    /// Takes the packet built so far, leaving the writer empty.
    pub fn finish(&mut self) -> Vec<u8> {
        self.messages = 0;
        std::mem::take(&mut self.buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn small_messages_are_big_endian() {
        let mut writer = PacketWriter::new();
        writer.destroy(0x0102).unwrap();
        writer.player_leave(3).unwrap();
        assert_eq!(writer.message_count(), 2);
        assert_eq!(writer.finish(), vec![DESTROY, 0x01, 0x02, PLAYER_LEAVE, 0, 3]);
        assert!(writer.is_empty());
        assert_eq!(writer.message_count(), 0);
    }

    #[test]
    fn oversized_index_is_rejected() {
        let mut writer = PacketWriter::new();
        let err = writer.destroy(70_000).unwrap_err();
        assert!(matches!(err, TransportError::IndexOverflow(70_000)));
        assert!(writer.is_empty());
    }

    #[test]
    fn empty_table_update_is_just_a_header() {
        let mut writer = PacketWriter::new();
        writer.update(&ObjectTable::new()).unwrap();
        assert_eq!(writer.finish(), vec![UPDATE, 0, 0]);
    }
}
