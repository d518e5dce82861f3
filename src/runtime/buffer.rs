//! Per-connection byte buffer.
//!
//! Data is appended at the tail and consumed from the head. Consuming only
//! moves the head offset; the occupied bytes are shifted back to the start
//! of the region when an append would run off the end, so a long pipeline
//! of small frames costs amortized O(1) per byte instead of O(n) per frame.

/// Growable byte buffer with an occupied window `start..end` inside `region`.
///
/// Invariant: `start <= end <= region.len()`.
#[derive(Debug, Default)]
pub struct Buffer {
    region: Vec<u8>,
    start: usize,
    end: usize,
}

impl Buffer {
    /// Create an empty buffer that allocates on first append.
    pub fn new() -> Self {
        Self::default()
    }

    /// Occupied bytes.
    pub fn data(&self) -> &[u8] {
        &self.region[self.start..self.end]
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// Append bytes at the tail.
    pub fn append(&mut self, data: &[u8]) {
        if self.region.len() - self.end < data.len() {
            self.make_room(data.len());
        }
        self.region[self.end..self.end + data.len()].copy_from_slice(data);
        self.end += data.len();
    }

    /// Compact the occupied bytes to the start of the region, growing the
    /// region first if compaction alone cannot fit `additional` more bytes.
    fn make_room(&mut self, additional: usize) {
        let len = self.len();
        let needed = len + additional;

        if needed <= self.region.len() {
            self.region.copy_within(self.start..self.end, 0);
        } else {
            let mut region = vec![0u8; needed.max(self.region.len() * 2)];
            region[..len].copy_from_slice(self.data());
            self.region = region;
        }
        self.start = 0;
        self.end = len;
    }

    /// Drop `n` bytes from the head. Consuming more than is occupied
    /// empties the buffer.
    pub fn consume(&mut self, n: usize) {
        if n > self.len() {
            self.clear();
            return;
        }
        self.start += n;
        if self.start == self.end {
            self.clear();
        }
    }

    /// Discard all occupied bytes, keeping the allocation.
    pub fn clear(&mut self) {
        self.start = 0;
        self.end = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_region(size: usize) -> Buffer {
        Buffer {
            region: vec![0u8; size],
            start: 0,
            end: 0,
        }
    }

    fn assert_invariant(buf: &Buffer) {
        assert!(buf.start <= buf.end);
        assert!(buf.end <= buf.region.len());
    }

    #[test]
    fn test_append_and_consume() {
        let mut buf = Buffer::new();
        assert!(buf.is_empty());

        buf.append(b"hello ");
        buf.append(b"world");
        assert_eq!(buf.data(), b"hello world");
        assert_eq!(buf.len(), 11);

        buf.consume(6);
        assert_eq!(buf.data(), b"world");
        assert_invariant(&buf);
    }

    #[test]
    fn test_consume_to_empty_resets_offsets() {
        let mut buf = with_region(16);
        buf.append(b"abcdef");
        buf.consume(2);
        buf.consume(4);

        assert!(buf.is_empty());
        assert_eq!(buf.start, 0);
        assert_eq!(buf.end, 0);
        assert_eq!(buf.region.len(), 16);
    }

    #[test]
    fn test_over_consume_clears() {
        let mut buf = Buffer::new();
        buf.append(b"abc");
        buf.consume(1);
        buf.consume(100);

        assert!(buf.is_empty());
        assert_eq!(buf.data(), b"");
        assert_invariant(&buf);

        // Still usable afterwards.
        buf.append(b"xyz");
        assert_eq!(buf.data(), b"xyz");
    }

    #[test]
    fn test_append_compacts_without_growing() {
        let mut buf = with_region(8);
        buf.append(b"abcdef");
        buf.consume(4);

        // 2 occupied + 5 new fits in 8 only after compaction.
        buf.append(b"ghijk");
        assert_eq!(buf.data(), b"efghijk");
        assert_eq!(buf.region.len(), 8);
        assert_eq!(buf.start, 0);
        assert_invariant(&buf);
    }

    #[test]
    fn test_append_grows_and_compacts() {
        let mut buf = with_region(4);
        buf.append(b"abcd");
        buf.consume(1);
        buf.append(b"efgh");

        assert_eq!(buf.data(), b"bcdefgh");
        assert_eq!(buf.start, 0);
        assert!(buf.region.len() >= 8);
        assert_invariant(&buf);
    }

    #[test]
    fn test_growth_is_amortized() {
        let mut buf = Buffer::new();
        let mut reallocations = 0;
        let mut capacity = buf.region.len();
        for i in 0..10_000u32 {
            buf.append(&i.to_le_bytes());
            if buf.region.len() != capacity {
                reallocations += 1;
                capacity = buf.region.len();
            }
        }
        assert_eq!(buf.len(), 40_000);
        assert!(reallocations < 20, "reallocated {} times", reallocations);
    }
}
