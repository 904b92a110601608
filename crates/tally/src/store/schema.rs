/// Name of the table hosting every counter.
pub const COUNTER_TABLE: &str = "IncrementTable";

/// Column family and qualifier holding a counter value.
pub const COUNTER_COLUMN: Column<'static> = Column::new("increment", "increment");

/// Value written when a counter row is seeded.
pub const SEED_VALUE: i64 = 0;

/// Compression applied to a column family's stored cells.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Compression {
    /// Cells are stored as written.
    #[default]
    None,
}

/// Schema of one column family.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct FamilyDescriptor {
    pub name: String,
    pub compression: Compression,
    /// Number of cell versions retained. Counters only need the latest.
    pub max_versions: u32,
}

impl FamilyDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            compression: Compression::None,
            max_versions: 1,
        }
    }

    #[must_use]
    pub fn with_compression(mut self, compression: Compression) -> Self {
        self.compression = compression;
        self
    }

    #[must_use]
    pub fn with_max_versions(mut self, max_versions: u32) -> Self {
        self.max_versions = max_versions;
        self
    }
}

/// Schema of a table: its name and its column families.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct TableDescriptor {
    pub name: String,
    pub families: Vec<FamilyDescriptor>,
}

impl TableDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            families: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_family(mut self, family: FamilyDescriptor) -> Self {
        self.families.push(family);
        self
    }

    pub fn family(&self, name: &str) -> Option<&FamilyDescriptor> {
        self.families.iter().find(|f| f.name == name)
    }

    /// The schema of the shared counter table: one uncompressed family that
    /// keeps a single version per cell.
    pub fn counter_table() -> Self {
        Self::new(COUNTER_TABLE).with_family(
            FamilyDescriptor::new(COUNTER_COLUMN.family)
                .with_compression(Compression::None)
                .with_max_versions(1),
        )
    }
}

/// Address of a cell within a row.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Column<'a> {
    pub family: &'a str,
    pub qualifier: &'a str,
}

impl<'a> Column<'a> {
    pub const fn new(family: &'a str, qualifier: &'a str) -> Self {
        Self { family, qualifier }
    }
}

/// Decodes a stored counter cell (8-byte big-endian signed integer).
pub fn decode_counter(bytes: &[u8]) -> Result<i64, crate::StoreError> {
    let raw: [u8; 8] = bytes.try_into().map_err(|_| {
        crate::StoreError::NotACounter(format!("expected 8 bytes, found {}", bytes.len()))
    })?;
    Ok(i64::from_be_bytes(raw))
}

/// Encodes a counter value the way it is stored in a cell.
pub const fn encode_counter(value: i64) -> [u8; 8] {
    value.to_be_bytes()
}
