// ============================================================================
// hub-sharding: sharding directory and key routing for a MySQL fleet
// ============================================================================

//! Maps sharded tables to range partitions, routes keys to the replica
//! groups that own them, and prunes out-of-range rows from freshly copied
//! shards.
//!
//! # Examples
//!
//! ```
//! use std::sync::Arc;
//! use hub_sharding::prelude::*;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> hub_sharding::Result<()> {
//! let ctx = CallContext::background();
//! let topology = InMemoryTopology::new();
//! topology.add_group("G1").await?;
//! let s1 = topology.add_server("G1", "10.0.0.1:3306").await?;
//! topology.set_master("G1", Some(s1.as_str())).await?;
//!
//! let directory = ShardDirectory::new(
//!     Arc::new(MemoryStore::new()),
//!     Arc::new(topology),
//!     ShardingConfig::default(),
//! )?;
//! directory.install(&ctx).await?;
//! directory
//!     .mappings()
//!     .add(&ctx, "db1.t1", "userID", PartitionType::Range, "first")
//!     .await?;
//! directory.partitions().add(&ctx, "first", 0, 1000, "G1").await?;
//!
//! let servers = directory.router().lookup(&ctx, "db1.t1", 500).await?;
//! assert_eq!(servers.len(), 1);
//! assert!(servers[0].is_master);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod context;
pub mod core;
pub mod evaluator;
pub mod parser;
pub mod plugins;
pub mod prelude;
pub mod sharding;
pub mod store;
pub mod topology;

pub use crate::config::{PrunerConfig, ShardingConfig, StoreConfig};
pub use context::{CallContext, CancelHandle};
pub use crate::core::{Result, ShardingError, StoreError, StoreResult, Value};
pub use sharding::{
    KeyRouter, PartitionType, PruneReport, RangePartition, RangePartitionCatalog, ServerEntry,
    ShardDirectory, ShardMapping, ShardMappingCatalog, ShardPruner,
};
pub use store::{MemoryStore, MetadataStore, QueryResult, Statement, StoreTransaction};
pub use topology::{InMemoryTopology, ServerConnection, Topology};
