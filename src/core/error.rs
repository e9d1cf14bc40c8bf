use thiserror::Error;

use crate::sharding::PartitionType;

/// Failures raised by the metadata store adapter and by server connections.
///
/// These are opaque transport/SQL failures; the sharding layer wraps them
/// without translating.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Table '{0}' already exists")]
    TableExists(String),

    #[error("Table '{0}' not found")]
    TableNotFound(String),

    #[error("Column '{0}' not found in table '{1}'")]
    ColumnNotFound(String, String),

    #[error("Type mismatch: {0}")]
    TypeMismatch(String),

    #[error("Duplicate key: {0}")]
    DuplicateKey(String),

    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),

    #[error("Execution error: {0}")]
    Execution(String),

    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    #[error("Lock error: {0}")]
    Lock(String),

    #[error("Connection failure: {0}")]
    ConnectionFailure(String),

    #[error("Operation canceled")]
    Canceled,

    #[error("Deadline exceeded")]
    DeadlineExceeded,
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

impl<T> From<std::sync::PoisonError<T>> for StoreError {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        Self::Lock(err.to_string())
    }
}

/// Errors surfaced by the shard catalogs, the key router and the pruner.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ShardingError {
    #[error("Table '{0}' is not mapped to a sharding scheme")]
    TableNotMapped(String),

    #[error("Sharding scheme '{0}' has no partitions")]
    SchemeNotFound(String),

    #[error("No partition of scheme '{scheme}' covers key {key}")]
    NoPartitionForKey { scheme: String, key: i64 },

    #[error("Unknown partition type '{0}'")]
    UnknownPartitionType(String),

    #[error("No shard mappings of partition type {0}")]
    NoMappingsForType(PartitionType),

    #[error("Partition type {0} is not supported for routing")]
    UnsupportedPartitionType(PartitionType),

    #[error("Group '{0}' not found")]
    GroupNotFound(String),

    #[error("Server '{0}' not found")]
    ServerNotFound(String),

    #[error("Group '{0}' has no primary")]
    NoPrimary(String),

    #[error("Invalid range [{lower}, {upper}]: lower bound exceeds upper bound")]
    InvalidRange { lower: i64, upper: i64 },

    #[error(
        "Range [{lower}, {upper}] overlaps [{existing_lower}, {existing_upper}] in scheme '{scheme}'"
    )]
    OverlappingRange {
        scheme: String,
        lower: i64,
        upper: i64,
        existing_lower: i64,
        existing_upper: i64,
    },

    #[error("Invalid identifier '{0}'")]
    InvalidIdentifier(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Malformed catalog row: {0}")]
    MalformedRow(String),

    #[error("Pruning of '{table}' incomplete: {failed} of {total} partitions failed")]
    IncompletePrune {
        table: String,
        failed: usize,
        total: usize,
    },

    #[error(transparent)]
    Store(#[from] StoreError),
}

pub type Result<T> = std::result::Result<T, ShardingError>;

impl ShardingError {
    /// True for every "nothing matched" outcome of a catalog read.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::TableNotMapped(_)
                | Self::SchemeNotFound(_)
                | Self::NoPartitionForKey { .. }
                | Self::UnknownPartitionType(_)
                | Self::NoMappingsForType(_)
                | Self::GroupNotFound(_)
                | Self::ServerNotFound(_)
        )
    }

    pub fn is_duplicate_key(&self) -> bool {
        matches!(self, Self::Store(StoreError::DuplicateKey(_)))
    }
}
