//! Common types used throughout Solidafy positions
//!
//! This module contains the position data model (partitions, offsets and
//! the table mapping one to the other) plus small shared enums.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;

// ============================================================================
// Type Aliases
// ============================================================================

/// Generic key-value map with string keys and values
pub type StringMap = BTreeMap<String, String>;

/// Mapping of every tracked partition to its latest known offset
pub type PositionTable = HashMap<Partition, Offset>;

// ============================================================================
// Partition / Offset
// ============================================================================

macro_rules! string_map_newtype {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(StringMap);

        impl $name {
            /// Create an empty value
            pub fn new() -> Self {
                Self::default()
            }

            /// Add an attribute, consuming and returning self
            #[must_use]
            pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
                self.0.insert(key.into(), value.into());
                self
            }

            /// Get an attribute value
            pub fn get(&self, key: &str) -> Option<&str> {
                self.0.get(key).map(String::as_str)
            }

            /// Iterate attributes in key order
            pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
                self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
            }

            /// Number of attributes
            pub fn len(&self) -> usize {
                self.0.len()
            }

            /// Whether there are no attributes
            pub fn is_empty(&self) -> bool {
                self.0.is_empty()
            }

            /// Borrow the underlying map
            pub fn as_map(&self) -> &StringMap {
                &self.0
            }
        }

        impl From<StringMap> for $name {
            fn from(map: StringMap) -> Self {
                Self(map)
            }
        }

        impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for $name {
            fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
                Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("{")?;
                for (i, (k, v)) in self.0.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{k}={v}")?;
                }
                f.write_str("}")
            }
        }
    };
}

string_map_newtype!(
    /// Identity of a tracked source resource (e.g. `{filename=/data/a.log}`).
    ///
    /// Equality and hashing are structural over the attribute set.
    Partition
);

string_map_newtype!(
    /// Resumable read position within a partition (e.g. `{next_position=120}`).
    Offset
);

// ============================================================================
// Table Serialization
// ============================================================================

/// Serde adapter encoding a [`PositionTable`] as a list of entries.
///
/// JSON object keys must be strings, so each entry is written as
/// `{"partition": {...}, "offset": {...}}`. Use with
/// `#[serde(with = "crate::types::table_entries")]`.
pub mod table_entries {
    use super::{Offset, Partition, PositionTable};
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    #[derive(Serialize)]
    struct EntryRef<'a> {
        partition: &'a Partition,
        offset: &'a Offset,
    }

    #[derive(Deserialize)]
    struct Entry {
        partition: Partition,
        offset: Offset,
    }

    pub fn serialize<S: Serializer>(table: &PositionTable, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(
            table
                .iter()
                .map(|(partition, offset)| EntryRef { partition, offset }),
        )
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<PositionTable, D::Error> {
        let entries = Vec::<Entry>::deserialize(deserializer)?;
        Ok(entries
            .into_iter()
            .map(|entry| (entry.partition, entry.offset))
            .collect())
    }
}

// ============================================================================
// Backoff Type
// ============================================================================

/// Type of backoff for retries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffType {
    /// Constant delay between retries
    Constant,
    /// Linear increase in delay
    Linear,
    /// Exponential increase in delay
    #[default]
    Exponential,
}
