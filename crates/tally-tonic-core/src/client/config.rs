use core::time::Duration;

/// Environment variable holding the store endpoint URI.
pub const ENDPOINT_ENV: &str = "TALLY_STORE_ENDPOINT";
/// Environment variable holding the connect timeout in milliseconds.
pub const CONNECT_TIMEOUT_ENV: &str = "TALLY_CONNECT_TIMEOUT_MS";
/// Environment variable holding the per-request timeout in milliseconds.
pub const REQUEST_TIMEOUT_ENV: &str = "TALLY_REQUEST_TIMEOUT_MS";

pub const DEFAULT_ENDPOINT: &str = "http://127.0.0.1:50051";
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value `{value}` for {var}: {source}")]
    InvalidNumber {
        var: &'static str,
        value: String,
        #[source]
        source: core::num::ParseIntError,
    },
}

/// Connection settings for [`RemoteConnector`](crate::RemoteConnector).
///
/// Generators do not take endpoints or credentials directly; they come from
/// the deployment environment through [`ClientConfig::from_env`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// URI of the counter store, e.g. `http://127.0.0.1:50051`.
    pub endpoint: String,
    pub connect_timeout: Duration,
    /// Deadline for each request. `None` waits until the store answers or the
    /// connection fails.
    pub request_timeout: Option<Duration>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            request_timeout: None,
        }
    }
}

impl ClientConfig {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            ..Self::default()
        }
    }

    /// Reads the configuration from `TALLY_STORE_ENDPOINT`,
    /// `TALLY_CONNECT_TIMEOUT_MS` and `TALLY_REQUEST_TIMEOUT_MS`, using the
    /// defaults for unset variables.
    ///
    /// # Errors
    /// - [`ConfigError::InvalidNumber`] if a timeout is not a number of
    ///   milliseconds.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    fn from_lookup(lookup: impl Fn(&'static str) -> Option<String>) -> Result<Self, ConfigError> {
        let millis = |var: &'static str| -> Result<Option<Duration>, ConfigError> {
            lookup(var)
                .map(|value| {
                    value
                        .trim()
                        .parse::<u64>()
                        .map(Duration::from_millis)
                        .map_err(|source| ConfigError::InvalidNumber { var, value, source })
                })
                .transpose()
        };

        Ok(Self {
            endpoint: lookup(ENDPOINT_ENV).unwrap_or_else(|| DEFAULT_ENDPOINT.to_string()),
            connect_timeout: millis(CONNECT_TIMEOUT_ENV)?.unwrap_or(DEFAULT_CONNECT_TIMEOUT),
            request_timeout: millis(REQUEST_TIMEOUT_ENV)?,
        })
    }

    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }
}
