//! Provides `PrioBitmap`, a bit array supporting constant-time lookup of the
//! lowest set bit.
use std::fmt;

/// The maximum number of priority levels supported by [`PrioBitmap`].
pub const PRIO_BITMAP_MAX_LEN: usize = u64::BITS as usize;

/// A bit array storing up to [`PRIO_BITMAP_MAX_LEN`] entries.
///
/// Bit `i` is set iff the ready queue has at least one task of priority `i`.
#[derive(Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct PrioBitmap {
    bits: u64,
}

impl fmt::Debug for PrioBitmap {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_list()
            .entries((0..PRIO_BITMAP_MAX_LEN).filter(|&i| self.get(i)))
            .finish()
    }
}

impl PrioBitmap {
    pub(crate) fn get(&self, i: usize) -> bool {
        debug_assert!(i < PRIO_BITMAP_MAX_LEN);
        self.bits & (1 << i) != 0
    }

    pub(crate) fn clear(&mut self, i: usize) {
        debug_assert!(i < PRIO_BITMAP_MAX_LEN);
        self.bits &= !(1 << i);
    }

    pub(crate) fn set(&mut self, i: usize) {
        debug_assert!(i < PRIO_BITMAP_MAX_LEN);
        self.bits |= 1 << i;
    }

    /// Get the position of the least significant set bit.
    pub(crate) fn find_set(&self) -> Option<usize> {
        if self.bits == 0 {
            None
        } else {
            Some(self.bits.trailing_zeros() as usize)
        }
    }
}
