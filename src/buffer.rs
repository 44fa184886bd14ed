//! Scratch storage for the token currently being scanned.
//!
//! The lexer appends one byte at a time and hands the finished token to the
//! interning table, which copies it. The backing allocation is reused from
//! token to token and only grows, starting at [`MIN_CAPACITY`] bytes and
//! doubling whenever it fills up.

use std::time::Duration;

/// Smallest allocation made on the first append.
pub const MIN_CAPACITY: usize = 256;

/// How long a dying process waits after reporting memory exhaustion.
const EXHAUSTION_PAUSE: Duration = Duration::from_secs(5);

/// Report that memory is exhausted and abort the process.
///
/// Allocation failure is never surfaced as a read error: the whole process
/// goes down after the message has had a moment to reach the terminal.
#[cold]
pub(crate) fn memory_exhausted(what: &str, bytes: usize) -> ! {
    log::error!("memory exhausted allocating {bytes} bytes for {what}");
    eprintln!("Memory exhausted!");
    std::thread::sleep(EXHAUSTION_PAUSE);
    std::process::abort()
}

/// Reserve room for `additional` more elements or die trying.
pub(crate) fn reserve_or_die<T>(vec: &mut Vec<T>, additional: usize, what: &str) {
    if vec.try_reserve(additional).is_err() {
        memory_exhausted(what, additional.saturating_mul(size_of::<T>()));
    }
}

/// Growable byte buffer for one token at a time.
#[derive(Debug, Default)]
pub struct TokenBuffer {
    bytes: Vec<u8>,
    /// Set by `finish`; the bytes are discarded on the next append.
    finished: bool,
}

impl TokenBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one byte, growing the allocation geometrically when full.
    pub fn append(&mut self, byte: u8) {
        if self.finished {
            self.bytes.clear();
            self.finished = false;
        }
        if self.bytes.len() == self.bytes.capacity() {
            let target = (self.bytes.capacity() * 2).max(MIN_CAPACITY);
            if self
                .bytes
                .try_reserve_exact(target - self.bytes.len())
                .is_err()
            {
                memory_exhausted("token buffer", target);
            }
        }
        self.bytes.push(byte);
    }

    /// Append a run of bytes.
    pub fn extend(&mut self, bytes: &[u8]) {
        for &byte in bytes {
            self.append(byte);
        }
    }

    /// Bytes accumulated since the last [`finish`](Self::finish).
    pub fn pending(&self) -> &[u8] {
        if self.finished { &[] } else { &self.bytes }
    }

    /// Hand out the finished token and reset for the next one.
    ///
    /// The returned slice is only valid until the next append, so callers
    /// intern or copy it straight away.
    pub fn finish(&mut self) -> &[u8] {
        if self.finished {
            self.bytes.clear();
        }
        self.finished = true;
        &self.bytes
    }

    /// Drop any partial token, keeping the allocation.
    pub fn reset(&mut self) {
        self.bytes.clear();
        self.finished = false;
    }

    /// Allocated capacity in bytes.
    pub fn capacity(&self) -> usize {
        self.bytes.capacity()
    }

    /// Free the backing allocation entirely.
    pub fn release(&mut self) {
        self.bytes = Vec::new();
        self.finished = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_growth_policy() {
        let mut buffer = TokenBuffer::new();
        assert_eq!(buffer.capacity(), 0);

        buffer.append(b'a');
        assert!(buffer.capacity() >= MIN_CAPACITY);

        let first = buffer.capacity();
        buffer.extend(&vec![b'x'; first]);
        assert!(buffer.capacity() >= first * 2);
        assert_eq!(buffer.pending().len(), first + 1);
    }

    #[test]
    fn test_finish_resets_length_but_keeps_allocation() {
        let mut buffer = TokenBuffer::new();
        buffer.extend(b"hello");
        assert_eq!(buffer.finish(), b"hello");
        assert_eq!(buffer.pending(), b"");

        let capacity = buffer.capacity();
        buffer.extend(b"hi");
        assert_eq!(buffer.finish(), b"hi");
        assert_eq!(buffer.capacity(), capacity);
    }

    #[test]
    fn test_finish_twice_yields_empty_token() {
        let mut buffer = TokenBuffer::new();
        buffer.extend(b"abc");
        assert_eq!(buffer.finish(), b"abc");
        assert_eq!(buffer.finish(), b"");
    }

    #[test]
    fn test_reset_discards_partial_token() {
        let mut buffer = TokenBuffer::new();
        buffer.extend(b"half a tok");
        buffer.reset();
        buffer.extend(b"en");
        assert_eq!(buffer.finish(), b"en");
    }

    #[test]
    fn test_release() {
        let mut buffer = TokenBuffer::new();
        buffer.extend(b"abc");
        buffer.release();
        assert_eq!(buffer.capacity(), 0);
        assert_eq!(buffer.pending(), b"");
        buffer.append(b'z');
        assert_eq!(buffer.finish(), b"z");
    }
}
