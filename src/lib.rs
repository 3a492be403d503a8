//! Memory-compact hash tables.
//!
//! [`CompactMap`] and [`CompactSet`] use open addressing with collision
//! chains. Instead of a pointer or index per entry, every bucket carries a
//! 4-bit tail code: EMPTY, SOLO (end of chain) or one of fourteen jump
//! distances to the next member of its chain. The whole per-bucket overhead
//! is half a byte, and lookups touch only the buckets of one chain.
//!
//! ```
//! use compact_table::CompactMap;
//!
//! let mut ages = CompactMap::new();
//! ages.insert("ada", 36);
//! ages.insert("alan", 41);
//! *ages.get_or_insert_with("grace", || 0) += 85;
//!
//! assert_eq!(ages.get(&"grace"), Some(&85));
//! assert_eq!(ages.len(), 3);
//! ```
//!
//! Keys are compared through an [`Equality`] strategy, either the key's own
//! `PartialEq` ([`NativeEq`], the default) or a field list declared with
//! [`fieldwise_eq!`].

pub mod equality;
pub mod error;
pub mod map;
pub mod nibble_array;
pub mod raw;
pub mod set;
pub mod tails;
mod uunwrap;

#[cfg(test)]
mod proptests;

pub use equality::{Equality, FieldwiseEq, Fieldwise, NativeEq};
pub use error::{Error, Result};
pub use map::CompactMap;
pub use raw::ProbeStats;
pub use set::CompactSet;
