//! Error types shared by the counter store service and its clients.
//!
//! The server reports failures with [`Error`], which converts into a
//! [`tonic::Status`] with an appropriate code. Because several store errors
//! share a status code, the server also tags each status with a
//! [`ERROR_KIND_KEY`] metadata entry; [`store_error`] uses that tag on the
//! client side to rebuild the matching [`StoreError`].

use tally::StoreError;
use tonic::{Code, Status, metadata::MetadataValue};

pub type Result<T> = core::result::Result<T, Error>;

/// Metadata key carrying the store error kind on error statuses.
pub const ERROR_KIND_KEY: &str = "tally-error";

const TABLE_EXISTS: &str = "table-exists";
const TABLE_NOT_FOUND: &str = "table-not-found";
const NO_SUCH_FAMILY: &str = "no-such-family";
const NOT_A_COUNTER: &str = "not-a-counter";
const OVERFLOW: &str = "overflow";

/// Unified error type for the counter store service.
#[derive(Clone, thiserror::Error, Debug, PartialEq, Eq)]
pub enum Error {
    #[error("table `{table}` already exists")]
    TableExists { table: String },

    #[error("table `{table}` not found")]
    TableNotFound { table: String },

    #[error("column family `{family}` does not exist in table `{table}`")]
    NoSuchFamily { table: String, family: String },

    /// The cell holds something other than an 8-byte counter.
    #[error("cell is not a counter: {reason}")]
    NotACounter { reason: String },

    #[error("counter overflow")]
    Overflow,

    /// The client request was malformed.
    #[error("Invalid request: {reason}")]
    InvalidRequest { reason: String },

    /// The storage engine failed.
    #[error("Storage error: {context}")]
    Storage { context: String },

    /// The service is in the process of shutting down.
    #[error("Service is shutting down")]
    ServiceShutdown,
}

impl Error {
    const fn kind(&self) -> Option<&'static str> {
        match self {
            Self::TableExists { .. } => Some(TABLE_EXISTS),
            Self::TableNotFound { .. } => Some(TABLE_NOT_FOUND),
            Self::NoSuchFamily { .. } => Some(NO_SUCH_FAMILY),
            Self::NotACounter { .. } => Some(NOT_A_COUNTER),
            Self::Overflow => Some(OVERFLOW),
            Self::InvalidRequest { .. } | Self::Storage { .. } | Self::ServiceShutdown => None,
        }
    }
}

impl From<Error> for Status {
    fn from(err: Error) -> Self {
        let message = err.to_string();
        let kind = err.kind();
        let mut status = match err {
            Error::TableExists { .. } => Status::already_exists(message),
            Error::TableNotFound { .. } => Status::not_found(message),
            Error::NoSuchFamily { .. } | Error::InvalidRequest { .. } => {
                Status::invalid_argument(message)
            }
            Error::NotACounter { .. } => Status::failed_precondition(message),
            Error::Overflow => Status::out_of_range(message),
            Error::Storage { .. } => Status::internal(message),
            Error::ServiceShutdown => Status::unavailable(message),
        };
        if let Some(kind) = kind {
            status
                .metadata_mut()
                .insert(ERROR_KIND_KEY, MetadataValue::from_static(kind));
        }
        status
    }
}

impl From<StoreError> for Error {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::TableExists(table) => Self::TableExists { table },
            StoreError::TableNotFound(table) => Self::TableNotFound { table },
            StoreError::NoSuchFamily { table, family } => Self::NoSuchFamily { table, family },
            StoreError::NotACounter(reason) => Self::NotACounter { reason },
            StoreError::Overflow => Self::Overflow,
            StoreError::Backend(context) => Self::Storage { context },
            other => Self::Storage {
                context: other.to_string(),
            },
        }
    }
}

/// Where a failed request was aimed, used to fill in [`StoreError`] fields.
#[derive(Clone, Copy, Debug)]
pub struct RequestTarget<'a> {
    pub table: &'a str,
    pub family: Option<&'a str>,
}

/// Converts a status returned by the counter store into a [`StoreError`].
///
/// Statuses that mean the request may not have reached the store
/// (`UNAVAILABLE`, `DEADLINE_EXCEEDED`, `CANCELLED`, `UNKNOWN`) become
/// [`StoreError::Unavailable`] with the status as its source.
pub fn store_error(status: Status, target: RequestTarget<'_>) -> StoreError {
    let kind = status
        .metadata()
        .get(ERROR_KIND_KEY)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned);

    match kind.as_deref() {
        Some(TABLE_EXISTS) => return StoreError::TableExists(target.table.to_string()),
        Some(TABLE_NOT_FOUND) => return StoreError::TableNotFound(target.table.to_string()),
        Some(NO_SUCH_FAMILY) => {
            return StoreError::NoSuchFamily {
                table: target.table.to_string(),
                family: target.family.unwrap_or_default().to_string(),
            };
        }
        Some(NOT_A_COUNTER) => return StoreError::NotACounter(status.message().to_string()),
        Some(OVERFLOW) => return StoreError::Overflow,
        _ => {}
    }

    match status.code() {
        Code::Unavailable | Code::DeadlineExceeded | Code::Cancelled | Code::Unknown => {
            StoreError::unavailable(status)
        }
        _ => StoreError::Backend(format!("{:?}: {}", status.code(), status.message())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TARGET: RequestTarget<'static> = RequestTarget {
        table: "IncrementTable",
        family: Some("increment"),
    };

    #[test]
    fn store_errors_survive_the_wire() {
        let cases = [
            (
                Error::TableExists {
                    table: "IncrementTable".into(),
                },
                Code::AlreadyExists,
            ),
            (
                Error::TableNotFound {
                    table: "IncrementTable".into(),
                },
                Code::NotFound,
            ),
            (
                Error::NoSuchFamily {
                    table: "IncrementTable".into(),
                    family: "increment".into(),
                },
                Code::InvalidArgument,
            ),
            (
                Error::NotACounter {
                    reason: "expected 8 bytes, found 3".into(),
                },
                Code::FailedPrecondition,
            ),
            (Error::Overflow, Code::OutOfRange),
        ];

        for (err, code) in cases {
            let status = Status::from(err.clone());
            assert_eq!(status.code(), code, "{err}");
            let store = store_error(status, TARGET);
            match (&err, &store) {
                (Error::TableExists { .. }, StoreError::TableExists(t))
                | (Error::TableNotFound { .. }, StoreError::TableNotFound(t)) => {
                    assert_eq!(t, "IncrementTable");
                }
                (Error::NoSuchFamily { .. }, StoreError::NoSuchFamily { table, family }) => {
                    assert_eq!(table, "IncrementTable");
                    assert_eq!(family, "increment");
                }
                (Error::NotACounter { .. }, StoreError::NotACounter(msg)) => {
                    assert!(msg.contains("expected 8 bytes"));
                }
                (Error::Overflow, StoreError::Overflow) => {}
                other => panic!("unexpected mapping: {other:?}"),
            }
        }
    }

    #[test]
    fn connectivity_statuses_are_unavailable() {
        for status in [
            Status::unavailable("connection refused"),
            Status::deadline_exceeded("timeout"),
            Status::cancelled("reset"),
            Status::unknown("transport error"),
        ] {
            assert!(store_error(status, TARGET).is_unavailable());
        }
    }

    #[test]
    fn other_statuses_are_backend_errors() {
        let status = Status::from(Error::Storage {
            context: "disk full".into(),
        });
        assert_eq!(status.code(), Code::Internal);
        assert!(status.metadata().get(ERROR_KIND_KEY).is_none());
        assert!(matches!(
            store_error(status, TARGET),
            StoreError::Backend(msg) if msg.contains("disk full")
        ));
    }

    #[test]
    fn store_errors_convert_to_service_errors() {
        assert_eq!(
            Error::from(StoreError::NotACounter("expected 8 bytes, found 2".into())),
            Error::NotACounter {
                reason: "expected 8 bytes, found 2".into()
            }
        );
        assert_eq!(Error::from(StoreError::Overflow), Error::Overflow);
        assert!(matches!(
            Error::from(StoreError::unavailable("io")),
            Error::Storage { context } if context.contains("io")
        ));
    }

    #[test]
    fn shutdown_is_reported_as_unavailable() {
        let status = Status::from(Error::ServiceShutdown);
        assert_eq!(status.code(), Code::Unavailable);
        assert!(store_error(status, TARGET).is_unavailable());
    }
}
