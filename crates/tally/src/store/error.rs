/// Boxed cause of a connectivity failure.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors reported by a counter store backend.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum StoreError {
    /// The store could not be reached (connect, transport or timeout).
    #[error("store unreachable: {0}")]
    Unavailable(#[source] BoxError),

    /// `create_table` was asked for a table that already exists.
    #[error("table `{0}` already exists")]
    TableExists(String),

    /// The table does not exist.
    #[error("table `{0}` not found")]
    TableNotFound(String),

    /// The column family is not part of the table's schema.
    #[error("column family `{family}` does not exist in table `{table}`")]
    NoSuchFamily { table: String, family: String },

    /// The cell holds something other than an 8-byte counter.
    #[error("cell is not a counter: {0}")]
    NotACounter(String),

    /// Incrementing would overflow the 64-bit counter.
    #[error("counter overflow")]
    Overflow,

    /// Any other failure reported by the store itself.
    #[error("store backend error: {0}")]
    Backend(String),
}

impl StoreError {
    /// Wraps a connectivity failure.
    pub fn unavailable(cause: impl Into<BoxError>) -> Self {
        Self::Unavailable(cause.into())
    }

    /// Returns `true` when the store could not be reached at all, as opposed
    /// to the store answering with an error.
    pub const fn is_unavailable(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}
