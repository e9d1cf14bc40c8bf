//! Sharding directory: which replica group owns which key of which table.

pub mod directory;
pub mod mapping;
pub mod pruner;
pub mod range;
pub mod router;

pub use directory::ShardDirectory;
pub use mapping::{ShardMapping, ShardMappingCatalog};
pub use pruner::{PartitionOutcome, PruneReport, ShardPruner};
pub use range::{RangePartition, RangePartitionCatalog};
pub use router::{GroupRouting, KeyRouter, ServerEntry};

use std::fmt;
use std::str::FromStr;

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::core::{Result, ShardingError, Value};

/// How a table's keys are spread over groups.
///
/// Only `Range` is routable; `Hash` is stored and listed but has no resolver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PartitionType {
    Range,
    Hash,
}

impl PartitionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Range => "RANGE",
            Self::Hash => "HASH",
        }
    }
}

impl fmt::Display for PartitionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PartitionType {
    type Err = ShardingError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "RANGE" => Ok(Self::Range),
            "HASH" => Ok(Self::Hash),
            _ => Err(ShardingError::UnknownPartitionType(s.to_string())),
        }
    }
}

const MAX_NAME_LEN: usize = 64;

lazy_static! {
    static ref IDENTIFIER: Regex =
        Regex::new(r"^[A-Za-z_][A-Za-z0-9_]{0,63}$").expect("identifier pattern compiles");
    static ref TABLE_NAME: Regex =
        Regex::new(r"^[A-Za-z_][A-Za-z0-9_]{0,63}(\.[A-Za-z_][A-Za-z0-9_]{0,63})?$")
            .expect("table name pattern compiles");
}

/// `table` or `database.table`. These names end up in SQL text.
pub(crate) fn validate_table_name(name: &str) -> Result<()> {
    if TABLE_NAME.is_match(name) {
        Ok(())
    } else {
        Err(ShardingError::InvalidIdentifier(name.to_string()))
    }
}

/// A bare column name. Also ends up in SQL text.
pub(crate) fn validate_column_name(name: &str) -> Result<()> {
    if IDENTIFIER.is_match(name) {
        Ok(())
    } else {
        Err(ShardingError::InvalidIdentifier(name.to_string()))
    }
}

/// Scheme names and group ids only travel as bound parameters; they just have
/// to fit the VARCHAR(64) catalog columns.
pub(crate) fn validate_name(name: &str) -> Result<()> {
    if name.trim().is_empty() || name.len() > MAX_NAME_LEN {
        Err(ShardingError::InvalidIdentifier(name.to_string()))
    } else {
        Ok(())
    }
}

pub(crate) fn text_at(row: &[Value], idx: usize, what: &str) -> Result<String> {
    match row.get(idx) {
        Some(Value::Text(s)) => Ok(s.clone()),
        other => Err(ShardingError::MalformedRow(format!(
            "expected text {} at column {}, got {:?}",
            what, idx, other
        ))),
    }
}

pub(crate) fn int_at(row: &[Value], idx: usize, what: &str) -> Result<i64> {
    match row.get(idx) {
        Some(Value::Integer(i)) => Ok(*i),
        other => Err(ShardingError::MalformedRow(format!(
            "expected integer {} at column {}, got {:?}",
            what, idx, other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partition_type_round_trip() {
        assert_eq!("RANGE".parse::<PartitionType>().unwrap(), PartitionType::Range);
        assert_eq!("hash".parse::<PartitionType>().unwrap(), PartitionType::Hash);
        assert_eq!(PartitionType::Range.to_string(), "RANGE");
        assert!(matches!(
            "LIST".parse::<PartitionType>(),
            Err(ShardingError::UnknownPartitionType(_))
        ));
        assert_eq!(
            serde_json::to_string(&PartitionType::Hash).unwrap(),
            "\"HASH\""
        );
    }

    #[test]
    fn test_identifier_validation() {
        assert!(validate_table_name("db1.t1").is_ok());
        assert!(validate_table_name("t1").is_ok());
        assert!(validate_table_name("db1.t1; DROP TABLE x").is_err());
        assert!(validate_table_name("a.b.c").is_err());
        assert!(validate_table_name("").is_err());

        assert!(validate_column_name("userID").is_ok());
        assert!(validate_column_name("user id").is_err());
        assert!(validate_column_name("1abc").is_err());

        assert!(validate_name("first").is_ok());
        assert!(validate_name("   ").is_err());
        assert!(validate_name(&"x".repeat(65)).is_err());
    }
}
