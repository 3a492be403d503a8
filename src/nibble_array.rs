//! A packed array of 4-bit values, two per byte.
//!
//! Logical index `i` lives in byte `i >> 1`: the low nibble for even `i`, the
//! high nibble for odd `i`.

use cfg_if::cfg_if;

use crate::error::{Error, Result};

#[derive(Clone, PartialEq, Eq)]
pub struct NibbleArray {
    bytes: Box<[u8]>,
    len: usize,
}

/// Largest value a nibble can hold.
pub const NIBBLE_MAX: u8 = 0x0F;

#[inline(always)]
fn shift(index: usize) -> u32 {
    ((index & 1) << 2) as u32
}

impl NibbleArray {
    /// Creates a zeroed array with `len` nibbles.
    pub fn new(len: usize) -> Self {
        Self {
            bytes: vec![0u8; len.div_ceil(2)].into_boxed_slice(),
            len,
        }
    }

    #[inline(always)]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Backing bytes, `ceil(len / 2)` of them.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn get(&self, index: usize) -> Result<u8> {
        if index >= self.len {
            return Err(Error::IndexOutOfRange { index, len: self.len });
        }
        // Safety: bounds checked above.
        Ok(unsafe { self.get_unchecked(index) })
    }

    /// Stores the low four bits of `value` at `index`.
    pub fn set(&mut self, index: usize, value: u8) -> Result<()> {
        if index >= self.len {
            return Err(Error::IndexOutOfRange { index, len: self.len });
        }
        // Safety: bounds checked above.
        unsafe { self.set_unchecked(index, value & NIBBLE_MAX) };
        Ok(())
    }

    /// Safety: `index < self.len()`.
    #[inline(always)]
    pub unsafe fn get_unchecked(&self, index: usize) -> u8 {
        let byte = unsafe { self.byte(index) };
        (byte >> shift(index)) & NIBBLE_MAX
    }

    /// Safety: `index < self.len()` and `value <= NIBBLE_MAX`.
    #[inline(always)]
    pub unsafe fn set_unchecked(&mut self, index: usize, value: u8) {
        debug_assert!(value <= NIBBLE_MAX, "nibble value {value} does not fit in 4 bits");
        let shift = shift(index);
        let byte = unsafe { self.byte_mut(index) };
        *byte = (*byte & !(NIBBLE_MAX << shift)) | ((value & NIBBLE_MAX) << shift);
    }

    /// Zeroes every nibble.
    pub fn clear(&mut self) {
        self.bytes.fill(0);
    }

    cfg_if! {
        if #[cfg(debug_assertions)] {
            #[inline(always)]
            unsafe fn byte(&self, index: usize) -> u8 {
                assert!(index < self.len, "nibble index {index} out of range ({})", self.len);
                self.bytes[index >> 1]
            }

            #[inline(always)]
            unsafe fn byte_mut(&mut self, index: usize) -> &mut u8 {
                assert!(index < self.len, "nibble index {index} out of range ({})", self.len);
                &mut self.bytes[index >> 1]
            }
        } else {
            #[inline(always)]
            unsafe fn byte(&self, index: usize) -> u8 {
                unsafe { *self.bytes.get_unchecked(index >> 1) }
            }

            #[inline(always)]
            unsafe fn byte_mut(&mut self, index: usize) -> &mut u8 {
                unsafe { self.bytes.get_unchecked_mut(index >> 1) }
            }
        }
    }
}

impl std::fmt::Debug for NibbleArray {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Safety: every index in 0..len is in bounds.
        f.debug_list()
            .entries((0..self.len).map(|i| unsafe { self.get_unchecked(i) }))
            .finish()
    }
}
