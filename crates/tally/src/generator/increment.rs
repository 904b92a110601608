use std::sync::Arc;

use portable_atomic::{AtomicI64, Ordering};
#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::{
    Error, GeneratorProperties, Result,
    generator::{Mutex, ValueGenerator},
    store::{
        COUNTER_COLUMN, COUNTER_TABLE, Connector, CounterTable, SEED_VALUE, StoreAdmin,
        StoreError, TableDescriptor, encode_counter,
    },
};

/// Cache value meaning "no value generated yet". An increment can never
/// produce it, since the smallest post-increment value is `i64::MIN + 1`.
const UNSET: i64 = i64::MIN;

type TableOf<C> = <<C as Connector>::Admin as StoreAdmin>::Table;

enum State<T> {
    Uninitialized,
    Ready(Arc<T>),
}

/// A generator of strictly increasing values backed by a counter store.
///
/// Every call to [`next`](Self::next) performs one atomic increment of the
/// counter cell for this generator's key and returns the post-increment
/// value. Ordering is delegated entirely to the store: two calls on the same
/// key, from any thread or process, always observe distinct and increasing
/// values.
///
/// The connection, the shared counter table and the counter row are set up
/// lazily on first use. Initialization runs at most once per instance;
/// concurrent first callers wait for it. If it fails, the error is returned
/// and the next call starts over.
///
/// ## Features
/// - ✅ Thread-safe
/// - ✅ Durable across restarts (as durable as the store)
/// - ✅ Safe across processes sharing one store
///
/// # Example
/// ```
/// use tally::{FIELD_NAME, GeneratorProperties, IncrementGenerator, MemoryStore};
///
/// let props = GeneratorProperties::new().with(FIELD_NAME, "order_id");
/// let generator = IncrementGenerator::new("orders", &props, MemoryStore::new());
///
/// assert_eq!(generator.key(), "order_id");
/// let first = generator.next().unwrap();
/// let second = generator.next().unwrap();
/// assert!(second > first);
/// assert_eq!(generator.current().unwrap(), second);
/// ```
pub struct IncrementGenerator<C>
where
    C: Connector,
{
    name: String,
    key: String,
    connector: C,
    state: Mutex<State<TableOf<C>>>,
    current: AtomicI64,
}

impl<C> IncrementGenerator<C>
where
    C: Connector,
{
    /// Creates a generator named `name`.
    ///
    /// The counter key is the `field-name` property, or `name` when the
    /// property is missing. No store access happens until the first call.
    pub fn new(name: impl Into<String>, properties: &GeneratorProperties, connector: C) -> Self {
        let name = name.into();
        let key = properties.sequence_key(&name);
        Self {
            name,
            key,
            connector,
            state: Mutex::new(State::Uninitialized),
            current: AtomicI64::new(UNSET),
        }
    }

    /// Symbolic name of this generator.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Row key of the counter this generator draws from.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Returns `true` once the table and counter row have been set up by this
    /// instance.
    pub fn is_initialized(&self) -> Result<bool> {
        let state = {
            #[cfg(feature = "parking-lot")]
            {
                self.state.lock()
            }
            #[cfg(not(feature = "parking-lot"))]
            {
                self.state.lock()?
            }
        };
        Ok(matches!(*state, State::Ready(_)))
    }

    /// Atomically increments the counter and returns the new value.
    ///
    /// Always performs a round-trip to the store, initializing first if
    /// needed. On failure the cached [`current`](Self::current) value is left
    /// untouched.
    ///
    /// # Errors
    /// - [`Error::StoreUnavailable`] if the store cannot be reached or
    ///   rejects the increment.
    /// - [`Error::InitializationFailed`] if the counter table or row could not
    ///   be set up.
    #[cfg_attr(feature = "tracing", instrument(level = "trace", skip(self), fields(key = %self.key)))]
    pub fn next(&self) -> Result<i64> {
        let table = self.table()?;
        let value = table
            .increment(self.key.as_bytes(), COUNTER_COLUMN, 1)
            .map_err(|source| {
                #[cfg(feature = "tracing")]
                tracing::error!(key = %self.key, error = %source, "error incrementing generated value");
                Error::StoreUnavailable {
                    key: self.key.clone(),
                    source,
                }
            })?;
        self.current.fetch_max(value, Ordering::AcqRel);
        Ok(value)
    }

    /// Returns the last value this instance handed out, without contacting
    /// the store.
    ///
    /// This is a process-local view: other instances or processes may have
    /// advanced the counter since.
    ///
    /// # Errors
    /// - [`Error::NoValueYet`] if [`next`](Self::next) has not succeeded yet.
    pub fn current(&self) -> Result<i64> {
        match self.current.load(Ordering::Acquire) {
            UNSET => Err(Error::NoValueYet),
            value => Ok(value),
        }
    }

    /// Ensures the generator is initialized.
    ///
    /// Values are not reserved ahead of time: every [`next`](Self::next) is
    /// still one atomic increment, so `count` is only a hint.
    pub fn allocate(&self, _count: usize) -> Result<()> {
        self.table().map(drop)
    }

    fn table(&self) -> Result<Arc<TableOf<C>>> {
        let mut state = {
            #[cfg(feature = "parking-lot")]
            {
                self.state.lock()
            }
            #[cfg(not(feature = "parking-lot"))]
            {
                self.state.lock()?
            }
        };

        if let State::Ready(table) = &*state {
            return Ok(Arc::clone(table));
        }

        let table = Arc::new(self.initialize()?);
        *state = State::Ready(Arc::clone(&table));
        Ok(table)
    }

    #[cold]
    #[inline(never)]
    #[cfg_attr(feature = "tracing", instrument(level = "debug", skip(self), fields(key = %self.key)))]
    fn initialize(&self) -> Result<TableOf<C>> {
        let fail = |source: StoreError| {
            #[cfg(feature = "tracing")]
            tracing::error!(key = %self.key, error = %source, "error instantiating increment generator");
            if source.is_unavailable() {
                Error::StoreUnavailable {
                    key: self.key.clone(),
                    source,
                }
            } else {
                Error::InitializationFailed {
                    key: self.key.clone(),
                    source,
                }
            }
        };

        let admin = self.connector.connect().map_err(fail)?;

        #[cfg(feature = "tracing")]
        tracing::info!(table = COUNTER_TABLE, "checking whether counter table exists");
        if !admin.table_exists(COUNTER_TABLE).map_err(fail)? {
            #[cfg(feature = "tracing")]
            tracing::info!(table = COUNTER_TABLE, "creating counter table");
            match admin.create_table(&TableDescriptor::counter_table()) {
                // Another process created it between the check and the create.
                Ok(()) | Err(StoreError::TableExists(_)) => {}
                Err(e) => return Err(fail(e)),
            }
        }

        let table = admin.open_table(COUNTER_TABLE).map_err(fail)?;

        let row = self.key.as_bytes();
        if !table.row_exists(row).map_err(fail)? {
            #[cfg(feature = "tracing")]
            tracing::info!(table = COUNTER_TABLE, key = %self.key, "seeding counter row");
            let _seeded = table
                .check_and_put(row, COUNTER_COLUMN, None, &encode_counter(SEED_VALUE))
                .map_err(fail)?;
            #[cfg(feature = "tracing")]
            {
                if !_seeded {
                    tracing::debug!(key = %self.key, "counter row was seeded concurrently");
                }
            }
        }

        Ok(table)
    }
}

impl<C> ValueGenerator for IncrementGenerator<C>
where
    C: Connector,
{
    fn name(&self) -> &str {
        self.name()
    }

    fn next(&self) -> Result<i64> {
        self.next()
    }

    fn current(&self) -> Result<i64> {
        self.current()
    }

    fn allocate(&self, count: usize) -> Result<()> {
        self.allocate(count)
    }
}
