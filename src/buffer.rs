//! A growable byte buffer for assembled machine code.
//!
//! This is the destination of every byte the [`Assembler`](crate::assembler::Assembler)
//! emits before it is copied into executable memory. It has no notion of
//! instructions, labels, or relocations — those live one layer up — it only
//! knows how to append, patch, and grow.

/// An offset into a [`CodeBuffer`], in bytes from the start of the buffer.
pub type CodeOffset = u32;

/// Growth step once the buffer passes [`GROWTH_STEP_THRESHOLD`] bytes.
const GROWTH_STEP: usize = 64 * 1024;

/// Below this size the buffer doubles on every grow; at or above it, it
/// grows by fixed [`GROWTH_STEP`] increments (spec §4.2: "growth doubles
/// until 64 KiB then steps by 64 KiB").
const GROWTH_STEP_THRESHOLD: usize = 64 * 1024;

/// A contiguous, growable buffer of assembled bytes.
#[derive(Clone, Debug, Default)]
pub struct CodeBuffer {
    data: Vec<u8>,
}

impl CodeBuffer {
    /// Creates an empty buffer with no preallocated capacity.
    pub fn new() -> Self {
        Self { data: Vec::new() }
    }

    /// Creates an empty buffer with room for at least `capacity` bytes.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            data: Vec::with_capacity(capacity),
        }
    }

    /// The number of bytes written so far; doubles as "current offset".
    pub fn len(&self) -> CodeOffset {
        self.data.len() as CodeOffset
    }

    /// True if nothing has been written.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Ensures there is room for at least `additional` more bytes without
    /// reallocating on every single-byte append, growing in the stepped
    /// fashion described in spec §4.2.
    pub fn ensure_space(&mut self, additional: usize) {
        let required = self.data.len() + additional;
        if required <= self.data.capacity() {
            return;
        }
        let mut new_cap = self.data.capacity().max(16);
        while new_cap < required {
            if new_cap < GROWTH_STEP_THRESHOLD {
                new_cap *= 2;
            } else {
                new_cap += GROWTH_STEP;
            }
        }
        log::trace!("code buffer growing {} -> {} bytes", self.data.capacity(), new_cap);
        self.data.reserve(new_cap - self.data.len());
    }

    /// Appends a single byte.
    pub fn put1(&mut self, byte: u8) {
        self.ensure_space(1);
        self.data.push(byte);
    }

    /// Appends a little-endian 16-bit word.
    pub fn put2(&mut self, value: u16) {
        self.ensure_space(2);
        self.data.extend_from_slice(&value.to_le_bytes());
    }

    /// Appends a little-endian 32-bit dword.
    pub fn put4(&mut self, value: u32) {
        self.ensure_space(4);
        self.data.extend_from_slice(&value.to_le_bytes());
    }

    /// Appends a little-endian 64-bit qword.
    pub fn put8(&mut self, value: u64) {
        self.ensure_space(8);
        self.data.extend_from_slice(&value.to_le_bytes());
    }

    /// Appends raw bytes verbatim (used for `embed`).
    pub fn put_bytes(&mut self, bytes: &[u8]) {
        self.ensure_space(bytes.len());
        self.data.extend_from_slice(bytes);
    }

    /// Appends `count` copies of `byte`.
    pub fn put_fill(&mut self, byte: u8, count: usize) {
        self.ensure_space(count);
        self.data.resize(self.data.len() + count, byte);
    }

    /// Reads the 32-bit little-endian word at `offset`. Used to decode a
    /// displacement-chain link (spec §3).
    pub fn read4(&self, offset: CodeOffset) -> u32 {
        let i = offset as usize;
        u32::from_le_bytes([self.data[i], self.data[i + 1], self.data[i + 2], self.data[i + 3]])
    }

    /// Overwrites 4 bytes at `offset` with a little-endian value. Used both
    /// for relocation patches and for writing displacement-chain links.
    pub fn patch4(&mut self, offset: CodeOffset, value: u32) {
        let i = offset as usize;
        self.data[i..i + 4].copy_from_slice(&value.to_le_bytes());
    }

    /// Overwrites a single byte at `offset` (used by short-jump relaxation
    /// to rewrite an opcode in place).
    pub fn patch1(&mut self, offset: CodeOffset, value: u8) {
        self.data[offset as usize] = value;
    }

    /// Borrows the buffer contents so far.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Transfers ownership of the underlying bytes out of this buffer,
    /// leaving it empty (spec §4.2 "take").
    pub fn take(&mut self) -> Vec<u8> {
        core::mem::take(&mut self.data)
    }

    /// Resets the length to zero while keeping the allocated capacity
    /// (spec §4.2 "clear").
    pub fn clear(&mut self) {
        self.data.clear();
    }

    /// Truncates the buffer back to `len` bytes. Used when a generic
    /// encoding is replaced in place by a shorter relaxed form.
    pub fn truncate(&mut self, len: CodeOffset) {
        self.data.truncate(len as usize);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_and_len() {
        let mut buf = CodeBuffer::new();
        buf.put1(0x90);
        buf.put4(0xdead_beef);
        assert_eq!(buf.len(), 5);
        assert_eq!(buf.data(), &[0x90, 0xef, 0xbe, 0xad, 0xde]);
    }

    #[test]
    fn patch_roundtrip() {
        let mut buf = CodeBuffer::new();
        buf.put4(0);
        buf.patch4(0, 0x1234_5678);
        assert_eq!(buf.read4(0), 0x1234_5678);
    }

    #[test]
    fn growth_steps_past_threshold() {
        let mut buf = CodeBuffer::new();
        buf.put_fill(0xcc, GROWTH_STEP_THRESHOLD + 1);
        assert_eq!(buf.len() as usize, GROWTH_STEP_THRESHOLD + 1);
    }

    #[test]
    fn take_leaves_buffer_empty() {
        let mut buf = CodeBuffer::new();
        buf.put1(1);
        let taken = buf.take();
        assert_eq!(taken, vec![1]);
        assert!(buf.is_empty());
    }
}
