use crate::store::{Column, StoreError, TableDescriptor};

/// Opens connections to a counter store.
///
/// Implementations discover endpoints and credentials from their own
/// configuration; the generator only asks for a connection when it
/// initializes, and asks again after a failed initialization.
pub trait Connector: Send + Sync {
    type Admin: StoreAdmin;

    /// Establishes a new administrative connection to the store.
    fn connect(&self) -> Result<Self::Admin, StoreError>;
}

/// Administrative handle: table lookup and creation.
pub trait StoreAdmin: Send + Sync {
    type Table: CounterTable;

    fn table_exists(&self, name: &str) -> Result<bool, StoreError>;

    /// Creates a table. Fails with [`StoreError::TableExists`] if a table with
    /// the same name already exists.
    fn create_table(&self, descriptor: &TableDescriptor) -> Result<(), StoreError>;

    /// Returns a handle for data operations on an existing table.
    fn open_table(&self, name: &str) -> Result<Self::Table, StoreError>;
}

/// Data operations on a single table.
pub trait CounterTable: Send + Sync {
    fn name(&self) -> &str;

    /// Returns `true` if any cell exists for `row`.
    fn row_exists(&self, row: &[u8]) -> Result<bool, StoreError>;

    /// Reads the latest value of one cell.
    fn get(&self, row: &[u8], column: Column<'_>) -> Result<Option<Vec<u8>>, StoreError>;

    /// Atomically writes `value` if the cell currently equals `expected`
    /// (`None` meaning the cell is absent). Returns whether the write was
    /// applied.
    fn check_and_put(
        &self,
        row: &[u8],
        column: Column<'_>,
        expected: Option<&[u8]>,
        value: &[u8],
    ) -> Result<bool, StoreError>;

    /// Atomically adds `amount` to a counter cell and returns the new value.
    ///
    /// A missing cell counts as zero. Increments on the same cell are
    /// linearizable across every client of the store.
    fn increment(&self, row: &[u8], column: Column<'_>, amount: i64) -> Result<i64, StoreError>;
}
