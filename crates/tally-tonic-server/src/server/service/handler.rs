//! gRPC service implementation for the counter store.
//!
//! [`StoreService`] implements the [`CounterStore`] service from
//! `proto/tally.proto` on top of [`Storage`]. Each request is validated,
//! executed against sled, and, when `sync_writes` is on, flushed to disk
//! before the response is sent. A value is therefore never acknowledged to a
//! generator unless a restarted store would remember it.

use crate::server::{
    config::ServerConfig,
    storage::{CellRef, Storage},
    telemetry::{
        increment_counter_increments, increment_request_errors, increment_requests,
        record_request_duration,
    },
};
use core::future::Future;
use portable_atomic::{AtomicBool, Ordering};
use std::{sync::Arc, time::Instant};
use tally_tonic_core::{
    Error, convert,
    proto::{
        CheckAndPutRequest, CheckAndPutResponse, CreateTableRequest, CreateTableResponse,
        GetRequest, GetResponse, IncrementRequest, IncrementResponse, RowExistsRequest,
        RowExistsResponse, TableExistsRequest, TableExistsResponse,
        counter_store_server::CounterStore,
    },
};
use tonic::{Request, Response, Status};

/// gRPC front end of the persistent counter store.
#[derive(Clone)]
pub struct StoreService {
    storage: Storage,
    sync_writes: bool,
    shutting_down: Arc<AtomicBool>,
}

impl StoreService {
    /// Opens the database and builds the service.
    ///
    /// # Errors
    /// - [`Error::Storage`] if the database cannot be opened.
    pub fn new(config: &ServerConfig) -> Result<Self, Error> {
        Ok(Self {
            storage: Storage::open(config)?,
            sync_writes: config.sync_writes,
            shutting_down: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Stops accepting requests and flushes the database.
    ///
    /// Requests arriving afterwards fail with [`Error::ServiceShutdown`].
    pub async fn shutdown(&self) -> Result<(), Error> {
        self.shutting_down.store(true, Ordering::Release);
        self.storage.flush().await
    }

    fn ensure_running(&self) -> Result<(), Error> {
        if self.shutting_down.load(Ordering::Acquire) {
            return Err(Error::ServiceShutdown);
        }
        Ok(())
    }

    async fn persist(&self) -> Result<(), Error> {
        if self.sync_writes {
            self.storage.flush().await?;
        }
        Ok(())
    }
}

/// Runs a request, recording metrics and converting the outcome.
async fn observe<T>(
    method: &'static str,
    fut: impl Future<Output = Result<T, Error>>,
) -> Result<Response<T>, Status> {
    let start = Instant::now();
    increment_requests(method);

    let result = fut.await;
    record_request_duration(method, start.elapsed().as_secs_f64() * 1000.0);

    match result {
        Ok(message) => Ok(Response::new(message)),
        Err(err) => {
            increment_request_errors(method);
            #[cfg(feature = "tracing")]
            tracing::warn!(method, error = %err, "request failed");
            Err(err.into())
        }
    }
}

fn require_table(table: &str) -> Result<(), Error> {
    if table.is_empty() {
        return Err(Error::InvalidRequest {
            reason: "table name must not be empty".to_string(),
        });
    }
    Ok(())
}

fn require_row(row: &[u8]) -> Result<(), Error> {
    if row.is_empty() {
        return Err(Error::InvalidRequest {
            reason: "row key must not be empty".to_string(),
        });
    }
    Ok(())
}

fn cell<'a>(
    table: &str,
    row: &'a [u8],
    family: &'a str,
    qualifier: &'a str,
) -> Result<CellRef<'a>, Error> {
    require_table(table)?;
    require_row(row)?;
    if family.is_empty() {
        return Err(Error::InvalidRequest {
            reason: "column family must not be empty".to_string(),
        });
    }
    Ok(CellRef {
        row,
        family,
        qualifier,
    })
}

#[tonic::async_trait]
impl CounterStore for StoreService {
    #[cfg_attr(feature = "tracing", tracing::instrument(skip_all, fields(table = %req.get_ref().table)))]
    async fn table_exists(
        &self,
        req: Request<TableExistsRequest>,
    ) -> Result<Response<TableExistsResponse>, Status> {
        let req = req.into_inner();
        observe("table_exists", async {
            self.ensure_running()?;
            require_table(&req.table)?;
            let exists = self.storage.table_exists(&req.table)?;
            Ok::<_, Error>(TableExistsResponse { exists })
        })
        .await
    }

    #[cfg_attr(feature = "tracing", tracing::instrument(skip_all))]
    async fn create_table(
        &self,
        req: Request<CreateTableRequest>,
    ) -> Result<Response<CreateTableResponse>, Status> {
        let req = req.into_inner();
        observe("create_table", async {
            self.ensure_running()?;
            let descriptor = req.descriptor.ok_or_else(|| Error::InvalidRequest {
                reason: "missing table descriptor".to_string(),
            })?;
            let descriptor = convert::table_descriptor(descriptor)?;
            if descriptor.families.is_empty() {
                return Err(Error::InvalidRequest {
                    reason: format!("table `{}` needs at least one column family", descriptor.name),
                });
            }
            self.storage.create_table(&descriptor)?;
            self.persist().await?;

            #[cfg(feature = "tracing")]
            tracing::info!(table = %descriptor.name, "created table");
            Ok::<_, Error>(CreateTableResponse {})
        })
        .await
    }

    #[cfg_attr(feature = "tracing", tracing::instrument(skip_all, fields(table = %req.get_ref().table)))]
    async fn row_exists(
        &self,
        req: Request<RowExistsRequest>,
    ) -> Result<Response<RowExistsResponse>, Status> {
        let req = req.into_inner();
        observe("row_exists", async {
            self.ensure_running()?;
            require_table(&req.table)?;
            require_row(&req.row)?;
            let exists = self.storage.row_exists(&req.table, &req.row)?;
            Ok::<_, Error>(RowExistsResponse { exists })
        })
        .await
    }

    #[cfg_attr(feature = "tracing", tracing::instrument(skip_all, fields(table = %req.get_ref().table)))]
    async fn get(&self, req: Request<GetRequest>) -> Result<Response<GetResponse>, Status> {
        let req = req.into_inner();
        observe("get", async {
            self.ensure_running()?;
            let cell = cell(&req.table, &req.row, &req.family, &req.qualifier)?;
            let value = self.storage.get(&req.table, cell)?;
            Ok::<_, Error>(GetResponse {
                value: value.map(|v| v.to_vec()),
            })
        })
        .await
    }

    #[cfg_attr(feature = "tracing", tracing::instrument(skip_all, fields(table = %req.get_ref().table)))]
    async fn check_and_put(
        &self,
        req: Request<CheckAndPutRequest>,
    ) -> Result<Response<CheckAndPutResponse>, Status> {
        let req = req.into_inner();
        observe("check_and_put", async {
            self.ensure_running()?;
            let cell = cell(&req.table, &req.row, &req.family, &req.qualifier)?;
            let applied = self.storage.check_and_put(
                &req.table,
                cell,
                req.expected.as_deref(),
                &req.value,
            )?;
            if applied {
                self.persist().await?;
            }
            Ok::<_, Error>(CheckAndPutResponse { applied })
        })
        .await
    }

    #[cfg_attr(feature = "tracing", tracing::instrument(skip_all, fields(table = %req.get_ref().table, amount = req.get_ref().amount)))]
    async fn increment(
        &self,
        req: Request<IncrementRequest>,
    ) -> Result<Response<IncrementResponse>, Status> {
        let req = req.into_inner();
        observe("increment", async {
            self.ensure_running()?;
            let cell = cell(&req.table, &req.row, &req.family, &req.qualifier)?;
            let value = self.storage.increment(&req.table, cell, req.amount)?;
            self.persist().await?;
            increment_counter_increments();
            Ok::<_, Error>(IncrementResponse { value })
        })
        .await
    }
}
