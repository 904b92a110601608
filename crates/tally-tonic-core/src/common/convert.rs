//! Conversions between `tally` schema types and their protobuf messages.

use crate::{Error, proto};
use tally::{Compression, FamilyDescriptor, TableDescriptor};

impl From<Compression> for proto::Compression {
    fn from(value: Compression) -> Self {
        match value {
            Compression::None => Self::None,
        }
    }
}

impl From<proto::Compression> for Compression {
    fn from(value: proto::Compression) -> Self {
        match value {
            proto::Compression::None => Self::None,
        }
    }
}

impl From<&TableDescriptor> for proto::TableDescriptor {
    fn from(value: &TableDescriptor) -> Self {
        Self {
            name: value.name.clone(),
            families: value
                .families
                .iter()
                .map(|f| proto::FamilyDescriptor {
                    name: f.name.clone(),
                    compression: proto::Compression::from(f.compression) as i32,
                    max_versions: f.max_versions,
                })
                .collect(),
        }
    }
}

/// Validates a table descriptor received over the wire.
///
/// # Errors
/// - [`Error::InvalidRequest`] if the table or a family has no name, a family
///   is declared twice, retains zero versions, or uses an unknown compression.
pub fn table_descriptor(value: proto::TableDescriptor) -> Result<TableDescriptor, Error> {
    if value.name.is_empty() {
        return Err(Error::InvalidRequest {
            reason: "table name must not be empty".to_string(),
        });
    }

    let mut descriptor = TableDescriptor::new(value.name);
    for family in value.families {
        if family.name.is_empty() {
            return Err(Error::InvalidRequest {
                reason: "column family name must not be empty".to_string(),
            });
        }
        if descriptor.family(&family.name).is_some() {
            return Err(Error::InvalidRequest {
                reason: format!("column family `{}` declared twice", family.name),
            });
        }
        if family.max_versions == 0 {
            return Err(Error::InvalidRequest {
                reason: format!("column family `{}` must keep at least one version", family.name),
            });
        }
        let compression = proto::Compression::try_from(family.compression).map_err(|_| {
            Error::InvalidRequest {
                reason: format!("unknown compression {}", family.compression),
            }
        })?;
        descriptor = descriptor.with_family(
            FamilyDescriptor::new(family.name)
                .with_compression(compression.into())
                .with_max_versions(family.max_versions),
        );
    }
    Ok(descriptor)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counter_table_descriptor_round_trips() {
        let descriptor = TableDescriptor::counter_table();
        let wire = proto::TableDescriptor::from(&descriptor);
        assert_eq!(wire.families.len(), 1);
        assert_eq!(wire.families[0].max_versions, 1);
        assert_eq!(table_descriptor(wire).unwrap(), descriptor);
    }

    #[test]
    fn invalid_descriptors_are_rejected() {
        let family = |name: &str, max_versions, compression| proto::FamilyDescriptor {
            name: name.to_string(),
            compression,
            max_versions,
        };
        let table = |families| proto::TableDescriptor {
            name: "t".to_string(),
            families,
        };

        let cases = [
            proto::TableDescriptor {
                name: String::new(),
                families: vec![],
            },
            table(vec![family("", 1, 0)]),
            table(vec![family("f", 1, 0), family("f", 1, 0)]),
            table(vec![family("f", 0, 0)]),
            table(vec![family("f", 1, 42)]),
        ];
        for case in cases {
            assert!(matches!(
                table_descriptor(case),
                Err(Error::InvalidRequest { .. })
            ));
        }
    }
}
