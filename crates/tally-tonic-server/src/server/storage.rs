//! Persistent table storage on top of sled.
//!
//! ## Layout
//!
//! - Tree `__tables__` maps a table name to its prost-encoded
//!   `TableDescriptor`. A table exists if and only if it has an entry here.
//! - Tree `table/<name>` holds the table's cells. A cell key is
//!   `u32 BE row length ‖ row ‖ u16 BE family length ‖ family ‖ qualifier`,
//!   so all cells of a row share a prefix and the encoding is unambiguous.
//! - Counter cells hold an 8-byte big-endian signed integer.
//!
//! Every mutation of a single cell is atomic: increments go through
//! [`sled::Tree::update_and_fetch`] and conditional puts through
//! [`sled::Tree::compare_and_swap`].
//!
//! Tables are never dropped, so an opened table (decoded schema plus cell
//! tree) is cached for the lifetime of the [`Storage`].

use crate::server::config::ServerConfig;
use parking_lot::RwLock;
use prost::Message;
use sled::{Db, IVec, Tree};
use std::{collections::HashMap, sync::Arc};
use tally_tonic_core::{
    Error, convert, proto,
    tally::{TableDescriptor, decode_counter, encode_counter},
};

const SCHEMA_TREE: &str = "__tables__";
const TABLE_TREE_PREFIX: &str = "table/";

fn storage(err: sled::Error) -> Error {
    Error::Storage {
        context: err.to_string(),
    }
}

/// Addresses one cell of a table.
#[derive(Clone, Copy, Debug)]
pub struct CellRef<'a> {
    pub row: &'a [u8],
    pub family: &'a str,
    pub qualifier: &'a str,
}

fn row_prefix(row: &[u8]) -> Result<Vec<u8>, Error> {
    let len = u32::try_from(row.len()).map_err(|_| Error::InvalidRequest {
        reason: format!("row key of {} bytes is too long", row.len()),
    })?;
    let mut key = Vec::with_capacity(4 + row.len());
    key.extend_from_slice(&len.to_be_bytes());
    key.extend_from_slice(row);
    Ok(key)
}

fn cell_key(cell: CellRef<'_>) -> Result<Vec<u8>, Error> {
    let family_len = u16::try_from(cell.family.len()).map_err(|_| Error::InvalidRequest {
        reason: format!("column family name of {} bytes is too long", cell.family.len()),
    })?;
    let mut key = row_prefix(cell.row)?;
    key.reserve(2 + cell.family.len() + cell.qualifier.len());
    key.extend_from_slice(&family_len.to_be_bytes());
    key.extend_from_slice(cell.family.as_bytes());
    key.extend_from_slice(cell.qualifier.as_bytes());
    Ok(key)
}

/// An opened table: its schema and its cell tree.
struct Table {
    descriptor: TableDescriptor,
    cells: Tree,
}

impl Table {
    fn key(&self, cell: CellRef<'_>) -> Result<Vec<u8>, Error> {
        if self.descriptor.family(cell.family).is_none() {
            return Err(Error::NoSuchFamily {
                table: self.descriptor.name.clone(),
                family: cell.family.to_string(),
            });
        }
        cell_key(cell)
    }
}

/// sled-backed store of tables and counter cells.
#[derive(Clone)]
pub struct Storage {
    db: Db,
    schemas: Tree,
    tables: Arc<RwLock<HashMap<String, Arc<Table>>>>,
}

impl Storage {
    /// Opens (or creates) the database described by `config`.
    ///
    /// # Errors
    /// - [`Error::Storage`] if sled cannot open the database.
    pub fn open(config: &ServerConfig) -> Result<Self, Error> {
        let mut builder = sled::Config::new()
            .temporary(config.temporary)
            .flush_every_ms(config.flush_every_ms)
            .cache_capacity(config.cache_capacity);
        if !config.temporary {
            builder = builder.path(&config.data_dir);
        }
        let db = builder.open().map_err(storage)?;
        let schemas = db.open_tree(SCHEMA_TREE).map_err(storage)?;
        Ok(Self {
            db,
            schemas,
            tables: Arc::default(),
        })
    }

    pub fn table_exists(&self, name: &str) -> Result<bool, Error> {
        self.schemas.contains_key(name).map_err(storage)
    }

    /// Records the table's schema and creates its cell tree.
    ///
    /// # Errors
    /// - [`Error::TableExists`] if a table with that name is already present.
    /// - [`Error::Storage`] on sled failures.
    pub fn create_table(&self, descriptor: &TableDescriptor) -> Result<(), Error> {
        let encoded = proto::TableDescriptor::from(descriptor).encode_to_vec();
        self.schemas
            .compare_and_swap(&descriptor.name, None::<&[u8]>, Some(encoded))
            .map_err(storage)?
            .map_err(|_| Error::TableExists {
                table: descriptor.name.clone(),
            })?;
        self.db
            .open_tree(format!("{TABLE_TREE_PREFIX}{}", descriptor.name))
            .map_err(storage)?;
        Ok(())
    }

    fn table(&self, name: &str) -> Result<Arc<Table>, Error> {
        if let Some(table) = self.tables.read().get(name) {
            return Ok(Arc::clone(table));
        }

        let encoded = self
            .schemas
            .get(name)
            .map_err(storage)?
            .ok_or_else(|| Error::TableNotFound {
                table: name.to_string(),
            })?;
        let wire = proto::TableDescriptor::decode(encoded.as_ref()).map_err(|err| {
            Error::Storage {
                context: format!("corrupt schema for table `{name}`: {err}"),
            }
        })?;
        let descriptor = convert::table_descriptor(wire)?;
        let cells = self
            .db
            .open_tree(format!("{TABLE_TREE_PREFIX}{name}"))
            .map_err(storage)?;
        let table = Arc::new(Table { descriptor, cells });
        Ok(Arc::clone(
            self.tables
                .write()
                .entry(name.to_string())
                .or_insert(table),
        ))
    }

    /// Returns `true` if any cell of the row exists.
    pub fn row_exists(&self, table: &str, row: &[u8]) -> Result<bool, Error> {
        let table = self.table(table)?;
        let prefix = row_prefix(row)?;
        Ok(table
            .cells
            .scan_prefix(prefix)
            .next()
            .transpose()
            .map_err(storage)?
            .is_some())
    }

    pub fn get(&self, table: &str, cell: CellRef<'_>) -> Result<Option<IVec>, Error> {
        let table = self.table(table)?;
        let key = table.key(cell)?;
        table.cells.get(key).map_err(storage)
    }

    /// Writes `value` if the cell currently holds `expected`, where `None`
    /// means the cell must be absent. Returns whether the write applied.
    pub fn check_and_put(
        &self,
        table: &str,
        cell: CellRef<'_>,
        expected: Option<&[u8]>,
        value: &[u8],
    ) -> Result<bool, Error> {
        let table = self.table(table)?;
        let key = table.key(cell)?;
        let outcome = table
            .cells
            .compare_and_swap(key, expected, Some(value))
            .map_err(storage)?;
        Ok(outcome.is_ok())
    }

    /// Adds `amount` to a counter cell and returns the new value. A missing
    /// cell counts as zero.
    ///
    /// # Errors
    /// - [`Error::NotACounter`] if the cell does not hold 8 bytes.
    /// - [`Error::Overflow`] if the result does not fit in an `i64`.
    pub fn increment(&self, table: &str, cell: CellRef<'_>, amount: i64) -> Result<i64, Error> {
        let table = self.table(table)?;
        let key = table.key(cell)?;

        // sled may run the closure several times under contention; only the
        // outcome of the final run counts.
        let mut outcome = Err(Error::Overflow);
        table
            .cells
            .update_and_fetch(key, |old| {
                let current = match old.map(decode_counter).transpose() {
                    Ok(value) => value.unwrap_or(0),
                    Err(err) => {
                        outcome = Err(err.into());
                        return old.map(IVec::from);
                    }
                };
                match current.checked_add(amount) {
                    Some(next) => {
                        outcome = Ok(next);
                        Some(IVec::from(&encode_counter(next)[..]))
                    }
                    None => {
                        outcome = Err(Error::Overflow);
                        old.map(IVec::from)
                    }
                }
            })
            .map_err(storage)?;
        outcome
    }

    /// Flushes all dirty pages to disk.
    pub async fn flush(&self) -> Result<(), Error> {
        self.db.flush_async().await.map(drop).map_err(storage)
    }
}
