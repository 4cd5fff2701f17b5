//! The line-reversal application that runs on top of an LRCP session.
//!
//! Bytes accumulate until a newline completes a line; each completed
//! line is emitted with its characters reversed and the newline kept
//! last. Anything past the final newline stays buffered.

#[derive(Debug, Default)]
pub struct LineReverser {
    pending: Vec<u8>,
}

impl LineReverser {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds newly-arrived bytes through the reverser, returning any
    /// output produced by lines that are now complete.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<u8> {
        self.pending.extend_from_slice(chunk);

        let mut output = Vec::new();
        let mut consumed = 0;
        let mut line_start = 0;

        for (i, &byte) in self.pending.iter().enumerate() {
            if byte == b'\n' {
                let line = &self.pending[line_start..i];
                output.extend(line.iter().rev());
                output.push(b'\n');
                line_start = i + 1;
                consumed = line_start;
            }
        }

        self.pending.drain(..consumed);
        output
    }
}
