// crates/spinnaker-scp/src/sequence.rs
//! Wrapping 16-bit sequence numbers for correlating replies with requests.

/// Issues sequence numbers, wrapping at 65536.
///
/// Uniqueness among in-flight requests relies on the outstanding window
/// (at most [`MAX_WINDOW_SIZE`](crate::types::MAX_WINDOW_SIZE)) being far
/// smaller than the sequence space. The engine checks each freshly issued
/// number against its outstanding map and fails the request if it collides.
#[derive(Debug, Clone, Default)]
pub struct SequenceAllocator {
    next: u16,
}

impl SequenceAllocator {
    /// Creates an allocator whose first number is `start`.
    pub const fn starting_at(start: u16) -> Self {
        Self { next: start }
    }

    /// Returns the current number and advances the counter.
    #[allow(clippy::should_implement_trait)]
    pub fn next(&mut self) -> u16 {
        let seq = self.next;
        self.next = self.next.wrapping_add(1);
        seq
    }

    /// The number the next call to [`next`](Self::next) will return.
    pub const fn peek(&self) -> u16 {
        self.next
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequence_increments_from_zero() {
        let mut seq = SequenceAllocator::default();
        assert_eq!(seq.next(), 0);
        assert_eq!(seq.next(), 1);
        assert_eq!(seq.peek(), 2);
    }

    #[test]
    fn test_sequence_wraps() {
        let mut seq = SequenceAllocator::starting_at(0xFFFE);
        assert_eq!(seq.next(), 0xFFFE);
        assert_eq!(seq.next(), 0xFFFF);
        assert_eq!(seq.next(), 0x0000);
    }

    #[test]
    fn test_window_of_numbers_is_distinct_across_wrap() {
        let mut seq = SequenceAllocator::starting_at(0xFFE0);
        let window: alloc::vec::Vec<u16> = (0..64).map(|_| seq.next()).collect();
        let mut sorted = window.clone();
        sorted.sort_unstable();
        sorted.dedup();
        assert_eq!(sorted.len(), window.len());
    }
}
