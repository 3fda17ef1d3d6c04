//! Destinations for outgoing packets and summaries.
//!
//! Binary payloads are base64-encoded, one per line, so every sender produces
//! line-oriented text that survives pipes and log files.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use bolo_core::SchemaError;
use log::info;
use thiserror::Error;

use crate::serializer::SerializationError;

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] SerializationError),

    #[error("could not encode entity state: {0}")]
    Encode(#[from] SchemaError),

    #[error("index {0} does not fit a 16-bit wire field")]
    IndexOverflow(usize),
}

pub trait Sender {
    fn send(&mut self, data: &[u8]) -> Result<(), TransportError>;

    fn flush(&mut self) -> Result<(), TransportError> {
        Ok(())
    }
}

/// Writes each payload to standard output as one base64 line.
pub struct StdioSender {
    stdout: io::Stdout,
}

impl StdioSender {
    pub fn new() -> Self {
        StdioSender { stdout: io::stdout() }
    }
}

impl Default for StdioSender {
    fn default() -> Self {
        Self::new()
    }
}

impl Sender for StdioSender {
    fn send(&mut self, data: &[u8]) -> Result<(), TransportError> {
        let mut out = self.stdout.lock();
        out.write_all(base64::encode(data).as_bytes())?;
        out.write_all(b"\n")?;
        out.flush()?;
        Ok(())
    }
}

/// Appends each payload to a file as one base64 line.
pub struct FileSender {
    file: BufWriter<File>,
}

impl FileSender {
    /// Creates or truncates the file at `path`.
    pub fn new(path: impl AsRef<Path>) -> Result<Self, TransportError> {
        let file = File::create(path.as_ref())?;
        info!("writing packets to {}", path.as_ref().display());
        Ok(FileSender {
            file: BufWriter::new(file),
        })
    }
}

impl Sender for FileSender {
    fn send(&mut self, data: &[u8]) -> Result<(), TransportError> {
        self.file.write_all(base64::encode(data).as_bytes())?;
        self.file.write_all(b"\n")?;
        Ok(())
    }

    fn flush(&mut self) -> Result<(), TransportError> {
        self.file.flush()?;
        Ok(())
    }
}

/// Discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSender;

impl Sender for NullSender {
    fn send(&mut self, _data: &[u8]) -> Result<(), TransportError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::NamedTempFile;

    #[test]
    fn file_sender_writes_base64_lines() {
        let file = NamedTempFile::new().unwrap();
        let mut sender = FileSender::new(file.path()).unwrap();
        sender.send(&[0x43, 0x54, 0xFF]).unwrap();
        sender.send(&[]).unwrap();
        sender.flush().unwrap();

        let written = fs::read_to_string(file.path()).unwrap();
        let lines: Vec<_> = written.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(base64::decode(lines[0]).unwrap(), vec![0x43, 0x54, 0xFF]);
        assert!(lines[1].is_empty());
    }

    #[test]
    fn null_sender_accepts_anything() {
        let mut sender = NullSender;
        sender.send(b"ignored").unwrap();
        sender.flush().unwrap();
    }
}
