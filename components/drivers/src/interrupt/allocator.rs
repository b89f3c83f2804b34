//! Interrupt bit allocation
//!
//! Every interrupt source on the GPIO device is identified by one bit of the
//! poll event mask: the driver ORs a source's bit into the mask it reports
//! when that source fires. Bits that poll always reports (`ERR`, `HUP`,
//! `NVAL`) would wake every poller and are never handed out.

use static_assertions::const_assert;
use thiserror::Error;

use crate::EventMask;

// The driver stores masks as 32-bit unsigned integers
const_assert!(EventMask::WIDTH <= u32::BITS);

/// One interrupt bit position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BitPosition(u8);

impl BitPosition {
    /// Bit index, also used as the interrupt source id
    pub fn index(self) -> u32 {
        u32::from(self.0)
    }

    /// Mask operand sent with the GPIO init command
    pub fn mask(self) -> u32 {
        1 << self.0
    }

    /// Poll events to wait for
    pub fn events(self) -> EventMask {
        EventMask::from_bits_retain(1 << self.0)
    }
}

/// All interrupt bit positions are taken
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("All {capacity} interrupt bit positions are in use")]
pub struct BitmaskExhausted {
    pub capacity: u32,
}

/// Bounded allocator over the usable poll event bits
#[derive(Debug, Clone)]
pub struct BitmaskAllocator {
    usable: u16,
    in_use: u16,
}

impl BitmaskAllocator {
    pub fn new() -> Self {
        Self {
            usable: !EventMask::ALWAYS_REPORTED.bits(),
            in_use: 0,
        }
    }

    /// Number of positions the allocator can hand out
    pub fn capacity(&self) -> u32 {
        self.usable.count_ones()
    }

    /// Number of positions currently allocated
    pub fn in_use(&self) -> u32 {
        self.in_use.count_ones()
    }

    /// Reserve the lowest free position
    ///
    /// # Errors
    /// Returns `BitmaskExhausted` once every position is taken
    pub fn allocate(&mut self) -> Result<BitPosition, BitmaskExhausted> {
        let free = self.usable & !self.in_use;
        if free == 0 {
            return Err(BitmaskExhausted {
                capacity: self.capacity(),
            });
        }

        let index = free.trailing_zeros() as u8;
        self.in_use |= 1 << index;
        Ok(BitPosition(index))
    }

    /// Return a position to the pool
    pub fn release(&mut self, bit: BitPosition) {
        self.in_use &= !(1u16 << bit.0);
    }

    pub fn is_allocated(&self, bit: BitPosition) -> bool {
        self.in_use & (1 << bit.0) != 0
    }
}

impl Default for BitmaskAllocator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capacity_excludes_always_reported_bits() {
        let allocator = BitmaskAllocator::new();
        assert_eq!(allocator.capacity(), 13);
    }

    #[test]
    fn test_positions_are_unique() {
        let mut allocator = BitmaskAllocator::new();
        let mut masks = 0u32;

        for _ in 0..allocator.capacity() {
            let bit = allocator.allocate().unwrap();
            assert_eq!(masks & bit.mask(), 0);
            assert!(!bit.events().intersects(EventMask::ALWAYS_REPORTED));
            masks |= bit.mask();
        }

        assert_eq!(masks.count_ones(), 13);
    }

    #[test]
    fn test_exhaustion() {
        let mut allocator = BitmaskAllocator::new();
        for _ in 0..13 {
            allocator.allocate().unwrap();
        }

        assert_eq!(
            allocator.allocate(),
            Err(BitmaskExhausted { capacity: 13 })
        );
    }

    #[test]
    fn test_release_and_reuse() {
        let mut allocator = BitmaskAllocator::new();
        let first = allocator.allocate().unwrap();
        let second = allocator.allocate().unwrap();
        assert_eq!(first.index(), 0);
        assert_eq!(second.index(), 1);

        allocator.release(first);
        assert!(!allocator.is_allocated(first));
        assert_eq!(allocator.in_use(), 1);

        assert_eq!(allocator.allocate().unwrap(), first);
    }

    #[test]
    fn test_skips_error_bits() {
        let mut allocator = BitmaskAllocator::new();
        let indices: Vec<u32> = (0..5).map(|_| allocator.allocate().unwrap().index()).collect();
        // 0x08, 0x10 and 0x20 are ERR, HUP and NVAL
        assert_eq!(indices, vec![0, 1, 2, 6, 7]);
    }
}
