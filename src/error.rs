use std::fmt;

/// Errors reported by the compact tables and their side arrays.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Indexed lookup of a key that is not in the table. Holds the key's
    /// `Debug` rendering.
    KeyNotFound(String),
    /// `add` of a key that is already in the table.
    DuplicateKey(String),
    /// A reserved tail code (`EMPTY` or `SOLO`) was used as a jump code.
    /// Only reachable through corrupted chain state.
    InvalidTailValue { code: u8 },
    /// The table was structurally modified after a cursor was created.
    ConcurrentModification { expected: u64, found: u64 },
    /// Checked nibble access past the end of the array.
    IndexOutOfRange { index: usize, len: usize },
}

impl Error {
    pub(crate) fn key_not_found<K: fmt::Debug>(key: &K) -> Self {
        Error::KeyNotFound(format!("{key:?}"))
    }

    pub(crate) fn duplicate_key<K: fmt::Debug>(key: &K) -> Self {
        Error::DuplicateKey(format!("{key:?}"))
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::KeyNotFound(key) => write!(f, "key not found: {key}"),
            Error::DuplicateKey(key) => write!(f, "an entry with key {key} already exists"),
            Error::InvalidTailValue { code } => {
                let name = match code {
                    0 => "EMPTY",
                    1 => "SOLO",
                    _ => "out-of-range",
                };
                write!(f, "tail code {code} ({name}) has no jump distance")
            }
            Error::ConcurrentModification { expected, found } => write!(
                f,
                "table was modified during enumeration (version {expected}, now {found})"
            ),
            Error::IndexOutOfRange { index, len } => {
                write!(f, "index {index} out of range for nibble array of length {len}")
            }
        }
    }
}

impl std::error::Error for Error {}

/// Result type for fallible table operations.
pub type Result<T> = std::result::Result<T, Error>;
