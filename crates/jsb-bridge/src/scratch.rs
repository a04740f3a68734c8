//! Scratch buffer for transient conversions.

use tracing::trace;

/// Growable byte buffer reused across calls.
///
/// Contents belong to the caller only until the next `get`.
#[derive(Debug, Default)]
pub struct ScratchBuffer {
    buf: Vec<u8>,
}

impl ScratchBuffer {
    pub fn with_capacity(len: usize) -> Self {
        Self { buf: vec![0; len] }
    }

    /// A buffer of `len` bytes. Reallocates only when `len` exceeds the
    /// current capacity; old contents are not preserved.
    pub fn get(&mut self, len: usize) -> &mut [u8] {
        if self.buf.len() < len {
            trace!(from = self.buf.len(), to = len, "Growing scratch buffer");
            self.buf = vec![0; len];
        }
        &mut self.buf[..len]
    }

    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    /// Write `s` as NUL-terminated little-endian UTF-16. Returns the byte
    /// length written, terminator included.
    pub fn encode_utf16(&mut self, s: &str) -> usize {
        let units = s.encode_utf16().count();
        let len = (units + 1) * 2;
        let buf = self.get(len);

        for (chunk, unit) in buf.chunks_exact_mut(2).zip(s.encode_utf16()) {
            chunk.copy_from_slice(&unit.to_le_bytes());
        }
        buf[len - 2..].fill(0);
        len
    }

    /// First `len` bytes of the last conversion.
    pub fn bytes(&self, len: usize) -> &[u8] {
        &self.buf[..len.min(self.buf.len())]
    }
}
