//! Everything an embedding service needs to route and prune.
//!
//! ```no_run
//! use hub_sharding::prelude::*;
//! ```

pub use crate::config::{PrunerConfig, ShardingConfig, StoreConfig};
pub use crate::context::{CallContext, CancelHandle};
pub use crate::core::{Result, ShardingError, StoreError, StoreResult, Value};
pub use crate::sharding::{
    GroupRouting, PartitionType, PruneReport, RangePartition, ShardDirectory, ShardMapping,
    ServerEntry,
};
pub use crate::store::{MemoryStore, MetadataStore, QueryResult, Statement};
pub use crate::topology::{Group, InMemoryTopology, Server, Topology};
