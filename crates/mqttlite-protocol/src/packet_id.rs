//! Packet identifier allocation. Identifiers are 16-bit, non-zero, and
//! wrap; uniqueness among in-flight requests is enforced by the session,
//! which skips identifiers still awaiting acknowledgement.

use std::sync::atomic::{AtomicU16, Ordering};

#[derive(Debug)]
pub struct PacketIdGenerator {
    next: AtomicU16,
}

impl Default for PacketIdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl PacketIdGenerator {
    #[must_use]
    pub fn new() -> Self {
        Self {
            next: AtomicU16::new(1),
        }
    }

    /// Returns the next candidate identifier, never zero.
    pub fn next(&self) -> u16 {
        loop {
            let id = self.next.fetch_add(1, Ordering::Relaxed);
            if id != 0 {
                return id;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_start_at_one() {
        let generator = PacketIdGenerator::new();
        assert_eq!(generator.next(), 1);
        assert_eq!(generator.next(), 2);
    }

    #[test]
    fn test_wraps_past_zero() {
        let generator = PacketIdGenerator::new();
        generator.next.store(u16::MAX, Ordering::Relaxed);
        assert_eq!(generator.next(), u16::MAX);
        assert_ne!(generator.next(), 0);
    }

    #[test]
    fn test_no_zero_over_full_cycle() {
        let generator = PacketIdGenerator::new();
        for _ in 0..=u32::from(u16::MAX) + 10 {
            assert_ne!(generator.next(), 0);
        }
    }
}
