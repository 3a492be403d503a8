//! Collision chains encoded as 4-bit relative jumps.
//!
//! Every bucket has one tail code next to it:
//!
//! ```text
//! 0        EMPTY   bucket unused
//! 1        SOLO    bucket used, last (or only) member of its chain
//! 2..=6    jump 1..=5 buckets forward to the next chain member
//! 7..=15   jump 8, 13, 21, 34, 55, 89, 144, 233, 377 buckets forward
//! ```
//!
//! Jumps wrap around the bucket array through the power-of-two mask, so a
//! chain is rebuilt from its home bucket without storing any index.

use crate::error::{Error, Result};
use crate::nibble_array::NibbleArray;

pub const EMPTY: u8 = 0;
pub const SOLO: u8 = 1;
pub const FIRST_JUMP_CODE: u8 = 2;
pub const LAST_JUMP_CODE: u8 = 15;

/// Jump distance for each code, indexed by code. The first two entries belong
/// to the reserved codes and are never read.
const JUMP_DISTANCES: [usize; 16] = [0, 0, 1, 2, 3, 4, 5, 8, 13, 21, 34, 55, 89, 144, 233, 377];

/// Returns how far `code` jumps, or `InvalidTailValue` for `EMPTY`, `SOLO`
/// and anything that doesn't fit in a nibble.
#[inline]
pub fn jump_distance(code: u8) -> Result<usize> {
    if (FIRST_JUMP_CODE..=LAST_JUMP_CODE).contains(&code) {
        Ok(JUMP_DISTANCES[code as usize])
    } else {
        Err(Error::InvalidTailValue { code })
    }
}

/// Smallest jump code that moves `offset` buckets forward once wrapped by
/// `mask`, if any. `offset` is itself taken modulo `mask + 1`.
#[inline]
pub fn code_for_offset(offset: usize, mask: usize) -> Option<u8> {
    let offset = offset & mask;
    if offset == 0 {
        return None;
    }
    (FIRST_JUMP_CODE..=LAST_JUMP_CODE).find(|&code| JUMP_DISTANCES[code as usize] & mask == offset)
}

/// Jump distances in code order, the probe sequence used when extending a
/// chain.
#[inline]
pub fn jump_codes() -> impl Iterator<Item = (u8, usize)> {
    (FIRST_JUMP_CODE..=LAST_JUMP_CODE).map(|code| (code, JUMP_DISTANCES[code as usize]))
}

#[derive(Clone, PartialEq, Eq)]
pub struct Tails {
    nibbles: NibbleArray,
    mask: usize,
}

impl Tails {
    /// Creates `len` EMPTY tails. `len` must be a power of two.
    pub fn new(len: usize) -> Self {
        assert!(len.is_power_of_two(), "tails length {len} is not a power of two");
        Self {
            nibbles: NibbleArray::new(len),
            mask: len - 1,
        }
    }

    #[inline(always)]
    pub fn len(&self) -> usize {
        self.nibbles.len()
    }

    #[inline(always)]
    pub fn get(&self, index: usize) -> u8 {
        debug_assert!(index <= self.mask);
        // Safety: masked index is below len, which is mask + 1.
        unsafe { self.nibbles.get_unchecked(index & self.mask) }
    }

    #[inline(always)]
    fn set(&mut self, index: usize, code: u8) {
        debug_assert!(index <= self.mask);
        // Safety: masked index is below len; every code written here is <= 15.
        unsafe { self.nibbles.set_unchecked(index & self.mask, code) }
    }

    #[inline(always)]
    pub fn is_empty(&self, index: usize) -> bool {
        self.get(index) == EMPTY
    }

    #[inline(always)]
    pub fn is_solo(&self, index: usize) -> bool {
        self.get(index) == SOLO
    }

    #[inline(always)]
    pub fn is_solo_or_empty(&self, index: usize) -> bool {
        self.get(index) <= SOLO
    }

    #[inline(always)]
    pub fn set_solo(&mut self, index: usize) {
        self.set(index, SOLO);
    }

    #[inline(always)]
    pub fn set_empty(&mut self, index: usize) {
        self.set(index, EMPTY);
    }

    /// Links `index` to the chain member `code` buckets away.
    #[inline(always)]
    pub fn set_jump(&mut self, index: usize, code: u8) {
        debug_assert!(
            (FIRST_JUMP_CODE..=LAST_JUMP_CODE).contains(&code),
            "{code} is not a jump code"
        );
        self.set(index, code);
    }

    /// Copies the code of `from` onto `to`.
    #[inline(always)]
    pub fn copy(&mut self, from: usize, to: usize) {
        let code = self.get(from);
        self.set(to, code);
    }

    /// Index of the next chain member after `entry_index`.
    #[inline]
    pub fn tail_index(&self, entry_index: usize, wrap_around_mask: usize) -> Result<usize> {
        let distance = jump_distance(self.get(entry_index))?;
        Ok((entry_index + distance) & wrap_around_mask)
    }

    /// Moves `entry_index` to the next chain member. Returns `false` and
    /// leaves it alone if the bucket is SOLO or EMPTY.
    #[inline(always)]
    pub fn try_continue_with_tail(&self, entry_index: &mut usize, wrap_around_mask: usize) -> bool {
        let code = self.get(*entry_index);
        if code <= SOLO {
            return false;
        }
        *entry_index = (*entry_index + JUMP_DISTANCES[code as usize]) & wrap_around_mask;
        true
    }

    /// The chain member whose code jumps onto `entry_index`, if any. Chains
    /// never merge, so there is at most one.
    pub fn predecessor(&self, entry_index: usize, wrap_around_mask: usize) -> Option<usize> {
        jump_codes().find_map(|(code, distance)| {
            let from = entry_index.wrapping_sub(distance) & wrap_around_mask;
            (from != entry_index && self.get(from) == code).then_some(from)
        })
    }

    /// Marks every bucket EMPTY.
    pub fn reset(&mut self) {
        self.nibbles.clear();
    }

    pub fn occupied(&self) -> usize {
        (0..self.len()).filter(|&i| !self.is_empty(i)).count()
    }
}

impl std::fmt::Debug for Tails {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Tails").field(&self.nibbles).finish()
    }
}
