use std::sync::Arc;

use tracing::{Level, event};

use super::{KeyRouter, RangePartitionCatalog, ShardMappingCatalog, ShardPruner};
use crate::config::ShardingConfig;
use crate::context::CallContext;
use crate::core::Result;
use crate::store::MetadataStore;
use crate::topology::Topology;

/// Both catalogs, the router and the pruner, wired to one store and one
/// topology.
#[derive(Clone)]
pub struct ShardDirectory {
    mappings: ShardMappingCatalog,
    partitions: RangePartitionCatalog,
    router: KeyRouter,
    pruner: ShardPruner,
    config: ShardingConfig,
}

impl ShardDirectory {
    pub fn new(
        store: Arc<dyn MetadataStore>,
        topology: Arc<dyn Topology>,
        config: ShardingConfig,
    ) -> Result<Self> {
        config.validate()?;

        let mappings = ShardMappingCatalog::new(store.clone());
        let partitions =
            RangePartitionCatalog::new(store).with_overlap_check(config.enforce_non_overlap);
        let router = KeyRouter::new(mappings.clone(), partitions.clone(), topology.clone());
        let pruner = ShardPruner::new(
            mappings.clone(),
            partitions.clone(),
            topology,
            config.pruner.clone(),
        );

        Ok(Self {
            mappings,
            partitions,
            router,
            pruner,
            config,
        })
    }

    /// Creates the catalog tables, and the group foreign key if configured.
    pub async fn install(&self, ctx: &CallContext) -> Result<()> {
        self.mappings.create_schema(ctx).await?;
        self.partitions.create_schema(ctx).await?;
        if self.config.group_foreign_key {
            self.partitions.add_foreign_key(ctx).await?;
        }
        event!(
            Level::INFO,
            store = %self.config.store.redacted_url(),
            group_foreign_key = self.config.group_foreign_key,
            "sharding catalogs installed"
        );
        Ok(())
    }

    /// Drops what [`install`](Self::install) created, in reverse order.
    pub async fn uninstall(&self, ctx: &CallContext) -> Result<()> {
        if self.config.group_foreign_key {
            self.partitions.drop_foreign_key(ctx).await?;
        }
        self.partitions.drop_schema(ctx).await?;
        self.mappings.drop_schema(ctx).await?;
        event!(Level::INFO, "sharding catalogs removed");
        Ok(())
    }

    pub fn mappings(&self) -> &ShardMappingCatalog {
        &self.mappings
    }

    pub fn partitions(&self) -> &RangePartitionCatalog {
        &self.partitions
    }

    pub fn router(&self) -> &KeyRouter {
        &self.router
    }

    pub fn pruner(&self) -> &ShardPruner {
        &self.pruner
    }

    pub fn config(&self) -> &ShardingConfig {
        &self.config
    }
}
