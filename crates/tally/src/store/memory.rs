use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use crate::generator::Mutex;
use crate::store::{
    Column, Connector, CounterTable, StoreAdmin, StoreError, TableDescriptor, decode_counter,
    encode_counter,
};

type CellKey = (Vec<u8>, String, String);

#[derive(Default)]
struct MemoryTableData {
    descriptor: Option<TableDescriptor>,
    cells: BTreeMap<CellKey, Vec<u8>>,
}

#[derive(Default)]
struct Tables {
    tables: HashMap<String, MemoryTableData>,
}

/// An in-process counter store.
///
/// Clones share the same tables, so several generators built on clones of one
/// `MemoryStore` observe each other's counters exactly like separate processes
/// sharing a remote store. Every operation runs under one lock, which makes
/// increments linearizable.
///
/// ```
/// use tally::{GeneratorProperties, IncrementGenerator, MemoryStore};
///
/// let store = MemoryStore::new();
/// let generator = IncrementGenerator::new("orders", &GeneratorProperties::new(), store);
/// assert_eq!(generator.next().unwrap(), 1);
/// assert_eq!(generator.next().unwrap(), 2);
/// ```
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<Tables>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_tables<T>(
        &self,
        f: impl FnOnce(&mut Tables) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        #[cfg(feature = "parking-lot")]
        let mut tables = self.inner.lock();
        #[cfg(not(feature = "parking-lot"))]
        let mut tables = self
            .inner
            .lock()
            .map_err(|_| StoreError::Backend("memory store lock poisoned".to_string()))?;
        f(&mut tables)
    }

    /// Returns the schema a table was created with.
    pub fn table_descriptor(&self, name: &str) -> Result<Option<TableDescriptor>, StoreError> {
        self.with_tables(|t| Ok(t.tables.get(name).and_then(|d| d.descriptor.clone())))
    }
}

impl Connector for MemoryStore {
    type Admin = Self;

    fn connect(&self) -> Result<Self::Admin, StoreError> {
        Ok(self.clone())
    }
}

impl StoreAdmin for MemoryStore {
    type Table = MemoryTable;

    fn table_exists(&self, name: &str) -> Result<bool, StoreError> {
        self.with_tables(|t| Ok(t.tables.contains_key(name)))
    }

    fn create_table(&self, descriptor: &TableDescriptor) -> Result<(), StoreError> {
        self.with_tables(|t| {
            if t.tables.contains_key(&descriptor.name) {
                return Err(StoreError::TableExists(descriptor.name.clone()));
            }
            t.tables.insert(
                descriptor.name.clone(),
                MemoryTableData {
                    descriptor: Some(descriptor.clone()),
                    cells: BTreeMap::new(),
                },
            );
            Ok(())
        })
    }

    fn open_table(&self, name: &str) -> Result<Self::Table, StoreError> {
        if !self.table_exists(name)? {
            return Err(StoreError::TableNotFound(name.to_string()));
        }
        Ok(MemoryTable {
            name: name.to_string(),
            store: self.clone(),
        })
    }
}

/// A handle to one table of a [`MemoryStore`].
#[derive(Clone)]
pub struct MemoryTable {
    name: String,
    store: MemoryStore,
}

impl MemoryTable {
    fn with_data<T>(
        &self,
        column: Option<Column<'_>>,
        f: impl FnOnce(&mut BTreeMap<CellKey, Vec<u8>>) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        self.store.with_tables(|t| {
            let data = t
                .tables
                .get_mut(&self.name)
                .ok_or_else(|| StoreError::TableNotFound(self.name.clone()))?;
            if let Some(column) = column {
                let known = data
                    .descriptor
                    .as_ref()
                    .is_some_and(|d| d.family(column.family).is_some());
                if !known {
                    return Err(StoreError::NoSuchFamily {
                        table: self.name.clone(),
                        family: column.family.to_string(),
                    });
                }
            }
            f(&mut data.cells)
        })
    }
}

fn cell_key(row: &[u8], column: Column<'_>) -> CellKey {
    (
        row.to_vec(),
        column.family.to_string(),
        column.qualifier.to_string(),
    )
}

impl CounterTable for MemoryTable {
    fn name(&self) -> &str {
        &self.name
    }

    fn row_exists(&self, row: &[u8]) -> Result<bool, StoreError> {
        self.with_data(None, |cells| {
            Ok(cells
                .range((row.to_vec(), String::new(), String::new())..)
                .next()
                .is_some_and(|((r, _, _), _)| r.as_slice() == row))
        })
    }

    fn get(&self, row: &[u8], column: Column<'_>) -> Result<Option<Vec<u8>>, StoreError> {
        self.with_data(Some(column), |cells| {
            Ok(cells.get(&cell_key(row, column)).cloned())
        })
    }

    fn check_and_put(
        &self,
        row: &[u8],
        column: Column<'_>,
        expected: Option<&[u8]>,
        value: &[u8],
    ) -> Result<bool, StoreError> {
        self.with_data(Some(column), |cells| {
            let key = cell_key(row, column);
            if cells.get(&key).map(Vec::as_slice) != expected {
                return Ok(false);
            }
            cells.insert(key, value.to_vec());
            Ok(true)
        })
    }

    fn increment(&self, row: &[u8], column: Column<'_>, amount: i64) -> Result<i64, StoreError> {
        self.with_data(Some(column), |cells| {
            let key = cell_key(row, column);
            let current = cells.get(&key).map(|v| decode_counter(v)).transpose()?;
            let next = current
                .unwrap_or(0)
                .checked_add(amount)
                .ok_or(StoreError::Overflow)?;
            cells.insert(key, encode_counter(next).to_vec());
            Ok(next)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{COUNTER_COLUMN, COUNTER_TABLE};

    fn counter_table(store: &MemoryStore) -> MemoryTable {
        store.create_table(&TableDescriptor::counter_table()).unwrap();
        store.open_table(COUNTER_TABLE).unwrap()
    }

    #[test]
    fn create_table_twice_reports_table_exists() {
        let store = MemoryStore::new();
        store.create_table(&TableDescriptor::counter_table()).unwrap();
        let err = store
            .create_table(&TableDescriptor::counter_table())
            .unwrap_err();
        assert!(matches!(err, StoreError::TableExists(name) if name == COUNTER_TABLE));
    }

    #[test]
    fn open_missing_table_fails() {
        let store = MemoryStore::new();
        assert!(matches!(
            store.open_table("nope"),
            Err(StoreError::TableNotFound(_))
        ));
    }

    #[test]
    fn increment_treats_missing_cell_as_zero() {
        let table = counter_table(&MemoryStore::new());
        assert_eq!(table.increment(b"k", COUNTER_COLUMN, 1).unwrap(), 1);
        assert_eq!(table.increment(b"k", COUNTER_COLUMN, 5).unwrap(), 6);
        assert_eq!(
            table.get(b"k", COUNTER_COLUMN).unwrap(),
            Some(encode_counter(6).to_vec())
        );
    }

    #[test]
    fn increment_rejects_non_counter_cell() {
        let table = counter_table(&MemoryStore::new());
        assert!(table.check_and_put(b"k", COUNTER_COLUMN, None, b"abc").unwrap());
        assert!(matches!(
            table.increment(b"k", COUNTER_COLUMN, 1),
            Err(StoreError::NotACounter(_))
        ));
    }

    #[test]
    fn increment_detects_overflow() {
        let table = counter_table(&MemoryStore::new());
        assert!(
            table
                .check_and_put(b"k", COUNTER_COLUMN, None, &encode_counter(i64::MAX))
                .unwrap()
        );
        assert!(matches!(
            table.increment(b"k", COUNTER_COLUMN, 1),
            Err(StoreError::Overflow)
        ));
    }

    #[test]
    fn unknown_family_is_rejected() {
        let table = counter_table(&MemoryStore::new());
        let err = table
            .increment(b"k", Column::new("other", "q"), 1)
            .unwrap_err();
        assert!(matches!(err, StoreError::NoSuchFamily { family, .. } if family == "other"));
    }

    #[test]
    fn check_and_put_only_applies_when_expectation_holds() {
        let table = counter_table(&MemoryStore::new());
        assert!(!table.row_exists(b"k").unwrap());
        let zero = encode_counter(0);
        let seven = encode_counter(7);
        assert!(table.check_and_put(b"k", COUNTER_COLUMN, None, &zero).unwrap());
        assert!(table.row_exists(b"k").unwrap());
        assert!(!table.check_and_put(b"k", COUNTER_COLUMN, None, &seven).unwrap());
        assert!(
            table
                .check_and_put(b"k", COUNTER_COLUMN, Some(&zero[..]), &seven)
                .unwrap()
        );
        assert_eq!(table.increment(b"k", COUNTER_COLUMN, 1).unwrap(), 8);
    }

    #[test]
    fn row_exists_does_not_match_prefixes() {
        let table = counter_table(&MemoryStore::new());
        table.increment(b"key-long", COUNTER_COLUMN, 1).unwrap();
        assert!(!table.row_exists(b"key").unwrap());
        assert!(table.row_exists(b"key-long").unwrap());
    }

    #[test]
    fn clones_share_tables() {
        let store = MemoryStore::new();
        let other = store.clone();
        let table = counter_table(&store);
        table.increment(b"k", COUNTER_COLUMN, 3).unwrap();
        assert!(other.table_exists(COUNTER_TABLE).unwrap());
        let table = other.open_table(COUNTER_TABLE).unwrap();
        assert_eq!(table.increment(b"k", COUNTER_COLUMN, 1).unwrap(), 4);
    }
}
