use std::cell::RefCell;
use std::rc::Rc;

use bolo_core::{EntityRef, NetworkBridge, ObjectTable};
use log::{debug, error};

use crate::packet::PacketWriter;
use crate::TransportError;

/// Collects the authoritative table's changes into outgoing packets.
///
/// Clones share one pending packet: install one clone as the table's
/// [`NetworkBridge`] and keep another to drain packets from.
#[derive(Debug, Clone, Default)]
pub struct Outbox {
    pending: Rc<RefCell<PacketWriter>>,
    failures: Rc<RefCell<usize>>,
}

impl Outbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.borrow().is_empty()
    }

    /// Messages the bridge could not encode since the outbox was created.
    pub fn failures(&self) -> usize {
        *self.failures.borrow()
    }

    /// Appends a full state update of `table` and takes the packet.
    pub fn flush_tick(&self, table: &ObjectTable) -> Result<Vec<u8>, TransportError> {
        let mut pending = self.pending.borrow_mut();
        pending.update(table)?;
        debug!("flushing packet of {} messages, {} bytes", pending.message_count(), pending.len());
        Ok(pending.finish())
    }

    /// Takes whatever is pending without appending an update.
    pub fn take(&self) -> Vec<u8> {
        self.pending.borrow_mut().finish()
    }

    fn record(&self, what: &str, result: Result<(), TransportError>) {
        if let Err(err) = result {
            *self.failures.borrow_mut() += 1;
            error!("could not queue {} message: {}", what, err);
        }
    }
}

impl NetworkBridge for Outbox {
    fn on_created(&mut self, entity: &EntityRef) {
        let result = self.pending.borrow_mut().create(entity);
        self.record("create", result);
    }

    fn on_destroyed(&mut self, _entity: &EntityRef, index: usize) {
        let result = self.pending.borrow_mut().destroy(index);
        self.record("destroy", result);
    }

    fn on_player_added(&mut self, player: &EntityRef) {
        let result = self.pending.borrow_mut().player_join(player);
        self.record("player join", result);
    }

    fn on_player_removed(&mut self, _player: &EntityRef, tank_index: usize) {
        let result = self.pending.borrow_mut().player_leave(tank_index);
        self.record("player leave", result);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::{CREATE, DESTROY, PLAYER_JOIN, UPDATE};
    use bolo_simulation::{Explosion, Tank};

    #[test]
    fn table_changes_are_queued_in_order() {
        let outbox = Outbox::new();
        let mut table = ObjectTable::new();
        table.set_bridge(Box::new(outbox.clone()));

        let tank = table.spawn(Tank::new(1, 2, 0));
        table.add_player(&tank).unwrap();
        let blast = table.spawn(Explosion::new(7, 8));
        table.destroy(&blast).unwrap();

        let packet = outbox.flush_tick(&table).unwrap();
        let tank_len = tank.serialize_state().unwrap().len();
        let blast_len = 2 + 2 + 1;

        let mut at = 0;
        assert_eq!(packet[at], CREATE);
        assert_eq!(packet[at + 1], b'T');
        at += 2 + tank_len;
        assert_eq!(&packet[at..at + 3], &[PLAYER_JOIN, 0, 0]);
        at += 3;
        assert_eq!(&packet[at..at + 2], &[CREATE, b'X']);
        assert_eq!(&packet[at + 2..at + 6], &[0, 7, 0, 8]);
        at += 2 + blast_len;
        assert_eq!(&packet[at..at + 3], &[DESTROY, 0, 1]);
        at += 3;
        assert_eq!(&packet[at..at + 3], &[UPDATE, 0, 1]);
        at += 3 + tank_len;
        assert_eq!(at, packet.len());

        assert!(outbox.is_empty());
        assert_eq!(outbox.failures(), 0);
    }
}
