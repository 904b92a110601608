//! Blocking gRPC client for the counter store.
//!
//! Generators call the store from ordinary threads and expect each call to
//! block until the store answers. Each connection therefore owns a
//! current-thread tokio runtime and drives one unary RPC per trait call with
//! [`Runtime::block_on`]. A current-thread runtime spawns no worker threads:
//! the connection's I/O only makes progress while a caller is blocked on it.

use core::future::Future;
use std::sync::Arc;

use tally::{Column, Connector, CounterTable, StoreAdmin, StoreError, TableDescriptor};
use tokio::runtime::{Builder, Runtime};
use tonic::{
    Response, Status,
    transport::{Channel, Endpoint},
};

use crate::{
    ClientConfig, ConfigError, RequestTarget,
    proto::{
        CheckAndPutRequest, CreateTableRequest, GetRequest, IncrementRequest, RowExistsRequest,
        TableExistsRequest, counter_store_client::CounterStoreClient,
    },
    store_error,
};

/// Opens blocking gRPC connections to a `tally-tonic-server`.
///
/// ```no_run
/// use tally::{GeneratorProperties, IncrementGenerator};
/// use tally_tonic_core::RemoteConnector;
///
/// let connector = RemoteConnector::from_env()?;
/// let generator = IncrementGenerator::new("orders", &GeneratorProperties::new(), connector);
/// let id = generator.next()?;
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
#[derive(Debug, Clone, Default)]
pub struct RemoteConnector {
    config: ClientConfig,
}

impl RemoteConnector {
    pub const fn new(config: ClientConfig) -> Self {
        Self { config }
    }

    /// Builds a connector from the `TALLY_*` environment variables.
    ///
    /// # Errors
    /// - [`ConfigError`] if a variable holds a malformed value.
    pub fn from_env() -> Result<Self, ConfigError> {
        ClientConfig::from_env().map(Self::new)
    }

    pub const fn config(&self) -> &ClientConfig {
        &self.config
    }
}

impl Connector for RemoteConnector {
    type Admin = RemoteStore;

    #[cfg_attr(feature = "tracing", tracing::instrument(skip(self), fields(endpoint = %self.config.endpoint)))]
    fn connect(&self) -> Result<Self::Admin, StoreError> {
        let runtime = Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(StoreError::unavailable)?;

        let mut endpoint = Endpoint::from_shared(self.config.endpoint.clone())
            .map_err(StoreError::unavailable)?
            .connect_timeout(self.config.connect_timeout);
        if let Some(timeout) = self.config.request_timeout {
            endpoint = endpoint.timeout(timeout);
        }

        let channel = runtime
            .block_on(endpoint.connect())
            .map_err(StoreError::unavailable)?;

        #[cfg(feature = "tracing")]
        tracing::debug!("connected to counter store");

        Ok(RemoteStore {
            inner: Arc::new(Remote {
                runtime,
                client: CounterStoreClient::new(channel),
            }),
        })
    }
}

struct Remote {
    runtime: Runtime,
    client: CounterStoreClient<Channel>,
}

/// An open connection to the counter store.
///
/// Cloning is cheap; clones share the connection.
#[derive(Clone)]
pub struct RemoteStore {
    inner: Arc<Remote>,
}

impl core::fmt::Debug for RemoteStore {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("RemoteStore").finish_non_exhaustive()
    }
}

impl RemoteStore {
    fn call<T, F, Fut>(&self, target: RequestTarget<'_>, request: F) -> Result<T, StoreError>
    where
        F: FnOnce(CounterStoreClient<Channel>) -> Fut,
        Fut: Future<Output = Result<Response<T>, Status>>,
    {
        let client = self.inner.client.clone();
        self.inner
            .runtime
            .block_on(request(client))
            .map(Response::into_inner)
            .map_err(|status| {
                #[cfg(feature = "tracing")]
                tracing::debug!(code = ?status.code(), message = status.message(), "counter store request failed");
                store_error(status, target)
            })
    }
}

impl StoreAdmin for RemoteStore {
    type Table = RemoteTable;

    fn table_exists(&self, name: &str) -> Result<bool, StoreError> {
        let req = TableExistsRequest {
            table: name.to_string(),
        };
        let target = RequestTarget {
            table: name,
            family: None,
        };
        self.call(target, |mut c| async move { c.table_exists(req).await })
            .map(|resp| resp.exists)
    }

    fn create_table(&self, descriptor: &TableDescriptor) -> Result<(), StoreError> {
        let req = CreateTableRequest {
            descriptor: Some(descriptor.into()),
        };
        let target = RequestTarget {
            table: &descriptor.name,
            family: None,
        };
        self.call(target, |mut c| async move { c.create_table(req).await })
            .map(drop)
    }

    fn open_table(&self, name: &str) -> Result<Self::Table, StoreError> {
        if !self.table_exists(name)? {
            return Err(StoreError::TableNotFound(name.to_string()));
        }
        Ok(RemoteTable {
            name: name.to_string(),
            store: self.clone(),
        })
    }
}

/// A handle to one table of a [`RemoteStore`].
#[derive(Clone, Debug)]
pub struct RemoteTable {
    name: String,
    store: RemoteStore,
}

impl RemoteTable {
    fn target<'a>(&'a self, column: Option<Column<'a>>) -> RequestTarget<'a> {
        RequestTarget {
            table: &self.name,
            family: column.map(|c| c.family),
        }
    }
}

impl CounterTable for RemoteTable {
    fn name(&self) -> &str {
        &self.name
    }

    fn row_exists(&self, row: &[u8]) -> Result<bool, StoreError> {
        let req = RowExistsRequest {
            table: self.name.clone(),
            row: row.to_vec(),
        };
        self.store
            .call(self.target(None), |mut c| async move { c.row_exists(req).await })
            .map(|resp| resp.exists)
    }

    fn get(&self, row: &[u8], column: Column<'_>) -> Result<Option<Vec<u8>>, StoreError> {
        let req = GetRequest {
            table: self.name.clone(),
            row: row.to_vec(),
            family: column.family.to_string(),
            qualifier: column.qualifier.to_string(),
        };
        self.store
            .call(self.target(Some(column)), |mut c| async move { c.get(req).await })
            .map(|resp| resp.value)
    }

    fn check_and_put(
        &self,
        row: &[u8],
        column: Column<'_>,
        expected: Option<&[u8]>,
        value: &[u8],
    ) -> Result<bool, StoreError> {
        let req = CheckAndPutRequest {
            table: self.name.clone(),
            row: row.to_vec(),
            family: column.family.to_string(),
            qualifier: column.qualifier.to_string(),
            expected: expected.map(<[u8]>::to_vec),
            value: value.to_vec(),
        };
        self.store
            .call(self.target(Some(column)), |mut c| async move {
                c.check_and_put(req).await
            })
            .map(|resp| resp.applied)
    }

    fn increment(&self, row: &[u8], column: Column<'_>, amount: i64) -> Result<i64, StoreError> {
        let req = IncrementRequest {
            table: self.name.clone(),
            row: row.to_vec(),
            family: column.family.to_string(),
            qualifier: column.qualifier.to_string(),
            amount,
        };
        self.store
            .call(self.target(Some(column)), |mut c| async move {
                c.increment(req).await
            })
            .map(|resp| resp.value)
    }
}
