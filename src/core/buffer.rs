//! Append-only byte queue with front trim.
//!
//! Each connection owns one of these for its receive side: bytes are appended
//! as they arrive from the socket and trimmed from the front once a complete
//! frame has been dispatched. Rather than shifting on every trim, a consumed
//! offset is advanced and the storage is compacted once the dead prefix grows
//! past a threshold.

/// Compact once this many consumed bytes sit at the front of the storage.
const COMPACT_THRESHOLD: usize = 4096;

/// Growable byte sequence with an explicit consumed offset.
#[derive(Debug, Default)]
pub struct ByteQueue {
    buf: Vec<u8>,
    start: usize,
}

impl ByteQueue {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty queue with pre-allocated capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity),
            start: 0,
        }
    }

    /// Append bytes to the back of the queue.
    pub fn append(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// View of all unread bytes.
    pub fn unread(&self) -> &[u8] {
        &self.buf[self.start..]
    }

    /// Number of unread bytes.
    pub fn len(&self) -> usize {
        self.buf.len() - self.start
    }

    /// Whether no unread bytes remain.
    pub fn is_empty(&self) -> bool {
        self.start == self.buf.len()
    }

    /// Trim `n` bytes from the front of the queue.
    ///
    /// # Panics
    ///
    /// Panics if `n` exceeds the unread length; the caller computed a frame
    /// length that the buffer never held, which is an internal logic error.
    pub fn consume(&mut self, n: usize) {
        assert!(n <= self.len(), "consumed past end of byte queue");
        self.start += n;

        if self.start == self.buf.len() {
            self.buf.clear();
            self.start = 0;
        } else if self.start >= COMPACT_THRESHOLD && self.start > self.buf.len() / 2 {
            self.buf.drain(..self.start);
            self.start = 0;
        }
    }

    /// Drop all content, retaining capacity.
    pub fn clear(&mut self) {
        self.buf.clear();
        self.start = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_consume() {
        let mut q = ByteQueue::new();
        q.append(b"hello");
        q.append(b" world");
        assert_eq!(q.unread(), b"hello world");

        q.consume(6);
        assert_eq!(q.unread(), b"world");
        assert_eq!(q.len(), 5);

        q.consume(5);
        assert!(q.is_empty());
        assert_eq!(q.unread(), b"");
    }

    #[test]
    fn test_interleaved_append() {
        let mut q = ByteQueue::new();
        q.append(&[1, 2, 3]);
        q.consume(2);
        q.append(&[4, 5]);
        assert_eq!(q.unread(), &[3, 4, 5]);
    }

    #[test]
    fn test_compaction_preserves_content() {
        let mut q = ByteQueue::new();
        let chunk = vec![0xAB; 1024];
        for _ in 0..8 {
            q.append(&chunk);
        }
        q.consume(7 * 1024);
        q.append(&[0xCD; 16]);

        assert_eq!(q.len(), 1024 + 16);
        assert_eq!(q.unread()[..1024], vec![0xAB; 1024][..]);
        assert_eq!(q.unread()[1024..], [0xCD; 16]);
    }

    #[test]
    #[should_panic(expected = "consumed past end")]
    fn test_overconsume_panics() {
        let mut q = ByteQueue::new();
        q.append(&[1, 2]);
        q.consume(3);
    }
}
