//! Properties a persistence framework hands to a value generator.
//!
//! The framework describes the field being populated (class, table, column,
//! ...). The generator only needs one of them, `field-name`, to pick which
//! counter to draw from; the others are kept so callers can inspect them.

use std::collections::BTreeMap;

/// Name of the class whose object is being inserted.
pub const CLASS_NAME: &str = "class-name";
/// Name of the root class of the inheritance tree.
pub const ROOT_CLASS_NAME: &str = "root-class-name";
/// Name of the field populated by the generator.
pub const FIELD_NAME: &str = "field-name";
pub const CATALOG_NAME: &str = "catalog-name";
pub const SCHEMA_NAME: &str = "schema-name";
/// Root table of the inheritance tree containing the field.
pub const TABLE_NAME: &str = "table-name";
pub const COLUMN_NAME: &str = "column-name";
/// Sequence name, when the mapping declares one.
pub const SEQUENCE_NAME: &str = "sequence-name";

/// String properties controlling a generator, keyed by property name.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct GeneratorProperties {
    values: BTreeMap<String, String>,
}

impl GeneratorProperties {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a property, returning `self` for chaining.
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.set(name, value);
        self
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.values.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }

    pub fn class_name(&self) -> Option<&str> {
        self.get(CLASS_NAME)
    }

    pub fn root_class_name(&self) -> Option<&str> {
        self.get(ROOT_CLASS_NAME)
    }

    pub fn field_name(&self) -> Option<&str> {
        self.get(FIELD_NAME)
    }

    pub fn catalog_name(&self) -> Option<&str> {
        self.get(CATALOG_NAME)
    }

    pub fn schema_name(&self) -> Option<&str> {
        self.get(SCHEMA_NAME)
    }

    pub fn table_name(&self) -> Option<&str> {
        self.get(TABLE_NAME)
    }

    pub fn column_name(&self) -> Option<&str> {
        self.get(COLUMN_NAME)
    }

    pub fn sequence_name(&self) -> Option<&str> {
        self.get(SEQUENCE_NAME)
    }

    /// Derives the counter key: the field name when present, otherwise the
    /// generator's symbolic name.
    pub fn sequence_key(&self, generator_name: &str) -> String {
        self.field_name().unwrap_or(generator_name).to_string()
    }
}

impl<K, V> FromIterator<(K, V)> for GeneratorProperties
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            values: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_prefers_field_name() {
        let props = GeneratorProperties::new()
            .with(CLASS_NAME, "org.example.Order")
            .with(FIELD_NAME, "id");
        assert_eq!(props.sequence_key("orders"), "id");
    }

    #[test]
    fn key_falls_back_to_generator_name() {
        let props = GeneratorProperties::new().with(COLUMN_NAME, "ID");
        assert_eq!(props.sequence_key("orders"), "orders");
    }

    #[test]
    fn typed_accessors_read_framework_properties() {
        let props: GeneratorProperties = [
            (TABLE_NAME, "ORDERS"),
            (SEQUENCE_NAME, "order_seq"),
            (ROOT_CLASS_NAME, "org.example.Entity"),
        ]
        .into_iter()
        .collect();
        assert_eq!(props.table_name(), Some("ORDERS"));
        assert_eq!(props.sequence_name(), Some("order_seq"));
        assert_eq!(props.root_class_name(), Some("org.example.Entity"));
        assert_eq!(props.catalog_name(), None);
    }
}
