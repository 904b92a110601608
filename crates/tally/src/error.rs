use crate::store::StoreError;

/// A result type defaulting to the crate's [`Error`].
pub type Result<T, E = Error> = core::result::Result<T, E>;

/// All errors an [`IncrementGenerator`] can surface to its caller.
///
/// Store failures are never swallowed: the underlying [`StoreError`] is kept
/// as the error source so callers can inspect what the store reported.
///
/// [`IncrementGenerator`]: crate::IncrementGenerator
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// The backing store could not be reached, or rejected the increment.
    ///
    /// Raised by every failed increment, and by initialization when the
    /// connection itself fails. The generator's cached value is unchanged.
    #[error("data store error for counter `{key}`: {source}")]
    StoreUnavailable {
        /// Sequence key the operation was issued for.
        key: String,
        /// What the store reported.
        #[source]
        source: StoreError,
    },

    /// Creating the counter table or seeding the counter row failed.
    ///
    /// The generator stays uninitialized; the next call retries the whole
    /// initialization protocol.
    #[error("failed to initialize counter `{key}`: {source}")]
    InitializationFailed {
        /// Sequence key the initialization was attempted for.
        key: String,
        /// What the store reported.
        #[source]
        source: StoreError,
    },

    /// `current()` was called before this instance produced any value.
    #[error("no value has been generated yet")]
    NoValueYet,

    /// The initialization lock was poisoned by a panicking thread.
    ///
    /// When the `parking-lot` feature is enabled, mutexes do **not** poison,
    /// so this variant is not available.
    #[cfg(not(feature = "parking-lot"))]
    #[error("initialization lock poisoned")]
    LockPoisoned,
}

#[cfg(not(feature = "parking-lot"))]
use crate::generator::{MutexGuard, PoisonError};
#[cfg(not(feature = "parking-lot"))]
impl<T> From<PoisonError<MutexGuard<'_, T>>> for Error {
    fn from(_: PoisonError<MutexGuard<'_, T>>) -> Self {
        Self::LockPoisoned
    }
}
