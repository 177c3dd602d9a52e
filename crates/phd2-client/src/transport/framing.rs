//! Splitting of the inbound byte stream into protocol lines.

/// Accumulates raw bytes and yields complete lines.
///
/// Lines end at `\r` or `\n`. Runs of terminators collapse, so `\r\n` and
/// blank lines never produce empty frames. Bytes after the last terminator
/// stay buffered until more data arrives, which makes the output independent
/// of how the stream was chunked.
#[derive(Debug, Default)]
pub(crate) struct LineBuffer {
    pending: Vec<u8>,
}

const fn is_terminator(byte: u8) -> bool {
    matches!(byte, b'\r' | b'\n')
}

impl LineBuffer {
    pub(crate) fn push(&mut self, bytes: &[u8]) {
        self.pending.extend_from_slice(bytes);
    }

    pub(crate) fn next_line(&mut self) -> Option<Vec<u8>> {
        let start = self
            .pending
            .iter()
            .position(|byte| !is_terminator(*byte))
            .unwrap_or(self.pending.len());
        self.pending.drain(..start);

        let end = self.pending.iter().position(|byte| is_terminator(*byte))?;
        let mut line: Vec<u8> = self.pending.drain(..=end).collect();
        line.pop();
        Some(line)
    }

    #[cfg(test)]
    pub(crate) fn buffered(&self) -> &[u8] {
        &self.pending
    }
}
