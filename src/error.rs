use std::fmt;

/// Errors reported by the reclamation engine and by list integrity checks.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Error {
    /// The process-wide engine was already running or configured when
    /// [`configure`](crate::configure) was called.
    AlreadyConfigured,
    /// The supplied [`Config`](crate::Config) is not usable.
    InvalidConfig(&'static str),
    /// A link of an [`OrderedList`](crate::OrderedList) violates the list invariants.
    CorruptedLink {
        /// Zero-based index of the offending node in traversal order.
        position: usize,
        /// The violated invariant.
        reason: &'static str,
    },
}

/// [`InsertError`] is returned by [`OrderedList::insert`](crate::OrderedList::insert); the key and
/// the value are handed back to the caller.
#[derive(Clone, Eq, PartialEq)]
pub enum InsertError<K, V> {
    /// A live entry with an equal key is present.
    Occupied {
        /// The rejected key.
        key: K,
        /// The rejected value.
        value: V,
    },
    /// Memory for a new node could not be allocated.
    AllocFailed {
        /// The rejected key.
        key: K,
        /// The rejected value.
        value: V,
    },
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::AlreadyConfigured => f.write_str("the reclamation engine is already running"),
            Error::InvalidConfig(reason) => write!(f, "invalid configuration: {reason}"),
            Error::CorruptedLink { position, reason } => {
                write!(f, "corrupted link at position {position}: {reason}")
            }
        }
    }
}

impl std::error::Error for Error {}

impl<K, V> InsertError<K, V> {
    /// Returns the key and the value that could not be inserted.
    #[inline]
    pub fn into_inner(self) -> (K, V) {
        match self {
            InsertError::Occupied { key, value } | InsertError::AllocFailed { key, value } => {
                (key, value)
            }
        }
    }
}

impl<K, V> fmt::Debug for InsertError<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InsertError::Occupied { .. } => f.write_str("Occupied { .. }"),
            InsertError::AllocFailed { .. } => f.write_str("AllocFailed { .. }"),
        }
    }
}

impl<K, V> fmt::Display for InsertError<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InsertError::Occupied { .. } => f.write_str("the key is already present"),
            InsertError::AllocFailed { .. } => f.write_str("failed to allocate a list node"),
        }
    }
}

impl<K, V> std::error::Error for InsertError<K, V> {}
