//! Replication of an authoritative object table to remote mirrors.
//!
//! The [`Outbox`] listens to the authoritative table and frames its changes
//! into packets, the [`Receiver`] applies those packets to a mirror table,
//! and [`Sender`]s carry packets and diagnostic summaries out of process.

mod outbox;
pub mod packet;
mod receiver;
mod sender;
mod serializer;

use log::info;

pub use self::outbox::Outbox;
pub use self::packet::PacketWriter;
pub use self::receiver::{ReceiveError, Receiver};
pub use self::sender::{FileSender, NullSender, Sender, StdioSender, TransportError};
pub use self::serializer::{
    BinarySerializer, EntitySummary, JsonSerializer, SerializationError, SerializeObject, Serializer, TableSummary,
};

/// Pairs a serializer with a sender, optionally thinning out summaries.
pub struct TransportController {
    serializer: Box<dyn Serializer>,
    sender: Box<dyn Sender>,
    summary_frequency: Option<u32>,
    frames: u64,
    bytes_sent: u64,
}

impl TransportController {
    pub fn new(serializer: Box<dyn Serializer>, sender: Box<dyn Sender>) -> Self {
        Self {
            serializer,
            sender,
            summary_frequency: None,
            frames: 0,
            bytes_sent: 0,
        }
    }

    /// Only every `frequency`-th call to [`send_summary`](Self::send_summary) is sent.
    pub fn with_summary_frequency(mut self, frequency: u32) -> Self {
        self.summary_frequency = Some(frequency.max(1));
        self
    }

    pub fn send_packet(&mut self, packet: &[u8]) -> Result<(), TransportError> {
        if packet.is_empty() {
            return Ok(());
        }
        self.sender.send(packet)?;
        self.bytes_sent += packet.len() as u64;
        Ok(())
    }

    /// Returns whether the summary was sent this frame.
    pub fn send_summary(&mut self, summary: &TableSummary) -> Result<bool, TransportError> {
        self.frames += 1;
        if let Some(frequency) = self.summary_frequency {
            if self.frames % frequency as u64 != 0 {
                return Ok(false);
            }
        }
        let data = self.serializer.serialize_to_bytes(summary)?;
        self.sender.send(&data)?;
        self.bytes_sent += data.len() as u64;
        Ok(true)
    }

    pub fn bytes_sent(&self) -> u64 {
        self.bytes_sent
    }

    pub fn flush(&mut self) -> Result<(), TransportError> {
        self.sender.flush()?;
        info!("transport flushed, {} bytes sent in total", self.bytes_sent);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bolo_core::ObjectTable;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[derive(Default, Clone)]
    struct Capture(Rc<RefCell<Vec<Vec<u8>>>>);

    impl Sender for Capture {
        fn send(&mut self, data: &[u8]) -> Result<(), TransportError> {
            self.0.borrow_mut().push(data.to_vec());
            Ok(())
        }
    }

    #[test]
    fn summaries_respect_frequency() {
        let capture = Capture::default();
        let mut controller =
            TransportController::new(Box::new(JsonSerializer), Box::new(capture.clone())).with_summary_frequency(3);
        let summary = TableSummary::capture(&ObjectTable::new()).unwrap();

        let sent: Vec<bool> = (0..6).map(|_| controller.send_summary(&summary).unwrap()).collect();
        assert_eq!(sent, vec![false, false, true, false, false, true]);
        assert_eq!(capture.0.borrow().len(), 2);
    }

    #[test]
    fn empty_packets_are_skipped() {
        let capture = Capture::default();
        let mut controller = TransportController::new(Box::new(BinarySerializer), Box::new(capture.clone()));
        controller.send_packet(&[]).unwrap();
        controller.send_packet(&[1, 2, 3]).unwrap();
        assert_eq!(capture.0.borrow().len(), 1);
        assert_eq!(controller.bytes_sent(), 3);
    }
}
