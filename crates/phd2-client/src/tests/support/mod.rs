//! Shared doubles for unit and behaviour tests.

pub(crate) mod fake_server;

use std::sync::mpsc::{Receiver, Sender};

use crate::errors::TransportError;
use crate::transport::{LineSink, LineSource};

/// Forwards every written line to a channel.
pub(crate) struct RecordingSink {
    pub(crate) lines: Sender<String>,
}

impl LineSink for RecordingSink {
    fn send_line(&mut self, line: &str) -> Result<(), TransportError> {
        self.lines
            .send(line.to_owned())
            .map_err(|_| TransportError::Closed)
    }
}

/// Yields lines pushed by the test; reports `Closed` once the sender drops.
pub(crate) struct ChannelSource {
    pub(crate) lines: Receiver<Result<Vec<u8>, TransportError>>,
}

impl LineSource for ChannelSource {
    fn read_line(&mut self) -> Result<Vec<u8>, TransportError> {
        self.lines.recv().unwrap_or(Err(TransportError::Closed))
    }
}
