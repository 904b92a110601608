use crate::Result;

/// A minimal interface for generators that hand out field values.
pub trait ValueGenerator {
    /// Symbolic name of the generator.
    fn name(&self) -> &str;

    /// Returns the next value.
    fn next(&self) -> Result<i64>;

    /// Returns the last value handed out by this instance.
    fn current(&self) -> Result<i64>;

    /// Prepares the generator to hand out `count` more values.
    fn allocate(&self, count: usize) -> Result<()>;
}
