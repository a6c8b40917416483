// Licensed under the Apache-2.0 license

use chaos_error::{ChaosError, ChaosResult};

/// Index arithmetic for a power-of-two ring.
///
/// Cursors count modulo `2 * capacity`. The low bits select the slot, and
/// the next bit tells a full ring apart from an empty one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RingGeometry {
    capacity: u64,
}

impl RingGeometry {
    /// # Arguments
    ///
    /// * `capacity` - Number of slots; must be a non-zero power of two
    pub fn new(capacity: u64) -> ChaosResult<Self> {
        if capacity == 0 || !capacity.is_power_of_two() || capacity > (1 << 62) {
            return Err(ChaosError::DRIVER_MAILBOX_INVALID_CAPACITY);
        }
        Ok(Self { capacity })
    }

    #[inline]
    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    /// Slot that a cursor refers to
    #[inline]
    pub fn slot(&self, cursor: u64) -> u64 {
        cursor & (self.capacity - 1)
    }

    /// Next cursor value
    #[inline]
    pub fn advance(&self, cursor: u64) -> u64 {
        cursor.wrapping_add(1) & ((self.capacity << 1) - 1)
    }

    #[inline]
    pub fn is_empty(&self, head: u64, tail: u64) -> bool {
        head == tail
    }

    #[inline]
    pub fn is_full(&self, head: u64, tail: u64) -> bool {
        (head ^ tail) == self.capacity
    }

    /// Number of occupied slots
    #[inline]
    pub fn occupancy(&self, head: u64, tail: u64) -> u64 {
        tail.wrapping_sub(head) & ((self.capacity << 1) - 1)
    }

    /// Returns true if `tail` is a cursor this ring could have produced
    /// starting from `head`
    #[inline]
    pub fn is_consistent(&self, head: u64, tail: u64) -> bool {
        tail < (self.capacity << 1) && self.occupancy(head, tail) <= self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_rejects_bad_capacity() {
        assert_eq!(
            RingGeometry::new(0),
            Err(ChaosError::DRIVER_MAILBOX_INVALID_CAPACITY)
        );
        assert_eq!(
            RingGeometry::new(12),
            Err(ChaosError::DRIVER_MAILBOX_INVALID_CAPACITY)
        );
        assert!(RingGeometry::new(1).is_ok());
        assert!(RingGeometry::new(512).is_ok());
    }

    #[test]
    fn test_wraps_at_twice_capacity() {
        let ring = RingGeometry::new(4).unwrap();
        let mut cursor = 0;
        let mut slots = Vec::new();
        for _ in 0..9 {
            slots.push(ring.slot(cursor));
            cursor = ring.advance(cursor);
        }
        assert_eq!(slots, [0, 1, 2, 3, 0, 1, 2, 3, 0]);
        assert_eq!(cursor, 1);
        assert!(ring.is_full(0, 4));
        assert!(ring.is_full(6, 2));
        assert!(!ring.is_full(1, 4));
        assert_eq!(ring.occupancy(6, 2), 4);
    }

    #[test]
    fn test_consistent_cursors() {
        let ring = RingGeometry::new(4).unwrap();
        assert!(ring.is_consistent(0, 0));
        assert!(ring.is_consistent(6, 2));
        assert!(ring.is_consistent(3, 7));
        assert!(!ring.is_consistent(0, 8));
        assert!(!ring.is_consistent(4, 9));
        assert!(!ring.is_consistent(0, 5));
        assert!(!ring.is_consistent(7, 4));
    }

    #[derive(Debug, Clone)]
    enum Op {
        Push,
        Pop,
    }

    fn ops() -> impl Strategy<Value = Vec<Op>> {
        prop::collection::vec(prop_oneof![Just(Op::Push), Just(Op::Pop)], 0..4096)
    }

    proptest! {
        #[test]
        fn test_full_exactly_at_capacity(shift in 0u32..11, ops in ops()) {
            let ring = RingGeometry::new(1 << shift).unwrap();
            let (mut head, mut tail, mut outstanding) = (0u64, 0u64, 0u64);
            for op in ops {
                prop_assert_eq!(ring.is_full(head, tail), outstanding == ring.capacity());
                prop_assert_eq!(ring.is_empty(head, tail), outstanding == 0);
                prop_assert_eq!(ring.occupancy(head, tail), outstanding);
                match op {
                    Op::Push if !ring.is_full(head, tail) => {
                        tail = ring.advance(tail);
                        outstanding += 1;
                    }
                    Op::Pop if !ring.is_empty(head, tail) => {
                        head = ring.advance(head);
                        outstanding -= 1;
                    }
                    _ => {}
                }
                prop_assert!(outstanding <= ring.capacity());
                prop_assert!(ring.is_consistent(head, tail));
                prop_assert!(ring.slot(tail) < ring.capacity());
            }
        }
    }
}
