use std::sync::Arc;

use tracing::{Instrument, Level, event, info_span};

use super::{
    RangePartition, RangePartitionCatalog, ShardMapping, ShardMappingCatalog,
    validate_column_name, validate_table_name,
};
use crate::config::PrunerConfig;
use crate::context::CallContext;
use crate::core::{Result, ShardingError};
use crate::store::Statement;
use crate::topology::Topology;

/// What happened to one partition during a prune.
#[derive(Debug, Clone, PartialEq)]
pub struct PartitionOutcome {
    pub partition: RangePartition,
    /// Rows deleted on the partition's primary, or why it could not be pruned.
    pub result: std::result::Result<u64, ShardingError>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PruneReport {
    pub table_name: String,
    pub outcomes: Vec<PartitionOutcome>,
    /// Partitions never attempted because an earlier one failed with
    /// `stop_on_error` set.
    pub skipped: Vec<RangePartition>,
}

impl PruneReport {
    pub fn is_complete(&self) -> bool {
        self.skipped.is_empty() && self.outcomes.iter().all(|o| o.result.is_ok())
    }

    pub fn rows_deleted(&self) -> u64 {
        self.outcomes
            .iter()
            .filter_map(|o| o.result.as_ref().ok())
            .sum()
    }

    /// Partitions to retry: the failed ones and the skipped ones.
    pub fn failed(&self) -> Vec<&RangePartition> {
        self.outcomes
            .iter()
            .filter(|o| o.result.is_err())
            .map(|o| &o.partition)
            .chain(self.skipped.iter())
            .collect()
    }

    pub fn into_result(self) -> Result<u64> {
        if self.is_complete() {
            return Ok(self.rows_deleted());
        }
        Err(ShardingError::IncompletePrune {
            failed: self.failed().len(),
            total: self.outcomes.len() + self.skipped.len(),
            table: self.table_name,
        })
    }
}

/// Deletes, on every partition's primary, the rows of a table that fall
/// outside that partition's range.
///
/// Partitions are pruned one after another against different servers; there
/// is no cross-partition transaction. Deleting out-of-range rows is
/// idempotent, so a partial run can simply be retried.
#[derive(Clone)]
pub struct ShardPruner {
    mappings: ShardMappingCatalog,
    partitions: RangePartitionCatalog,
    topology: Arc<dyn Topology>,
    config: PrunerConfig,
}

impl ShardPruner {
    pub fn new(
        mappings: ShardMappingCatalog,
        partitions: RangePartitionCatalog,
        topology: Arc<dyn Topology>,
        config: PrunerConfig,
    ) -> Self {
        Self {
            mappings,
            partitions,
            topology,
            config,
        }
    }

    /// Catalog failures abort; per-partition failures are recorded in the
    /// report.
    pub async fn prune_shard(&self, ctx: &CallContext, table_name: &str) -> Result<PruneReport> {
        let span = info_span!("sharding.prune_shard", table = %table_name);
        self.prune_all(ctx, table_name).instrument(span).await
    }

    async fn prune_all(&self, ctx: &CallContext, table_name: &str) -> Result<PruneReport> {
        let mapping = self.mappings.fetch(ctx, table_name).await?;
        let partitions = self.partitions.fetch(ctx, &mapping.scheme_name).await?;

        let mut report = PruneReport {
            table_name: table_name.to_string(),
            outcomes: Vec::with_capacity(partitions.len()),
            skipped: Vec::new(),
        };

        let mut remaining = partitions.into_iter();
        while let Some(partition) = remaining.next() {
            let result = self.prune_partition(ctx, &mapping, &partition).await;
            let failed = result.is_err();
            if let Err(err) = &result {
                event!(
                    Level::ERROR,
                    group = %partition.group_id,
                    lower_bound = partition.lower_bound,
                    upper_bound = partition.upper_bound,
                    error = %err,
                    "partition prune failed"
                );
            }
            report.outcomes.push(PartitionOutcome { partition, result });

            // a canceled or expired context fails every later partition too
            if failed && (self.config.stop_on_error || ctx.check().is_err()) {
                report.skipped.extend(remaining.by_ref());
                break;
            }
        }

        event!(
            Level::INFO,
            partitions = report.outcomes.len() + report.skipped.len(),
            failed = report.failed().len(),
            rows_deleted = report.rows_deleted(),
            "prune finished"
        );
        Ok(report)
    }

    /// Prunes a single partition and returns the number of rows deleted.
    pub async fn prune_partition(
        &self,
        ctx: &CallContext,
        mapping: &ShardMapping,
        partition: &RangePartition,
    ) -> Result<u64> {
        let stmt = prune_statement(mapping, partition)?;

        let group = self
            .topology
            .fetch_group(ctx, &partition.group_id)
            .await?
            .ok_or_else(|| ShardingError::GroupNotFound(partition.group_id.clone()))?;
        let master = group
            .master
            .clone()
            .ok_or_else(|| ShardingError::NoPrimary(group.group_id.clone()))?;
        self.topology
            .fetch_server(ctx, &master)
            .await?
            .ok_or_else(|| ShardingError::ServerNotFound(master.clone()))?;

        let connect_ctx = ctx.clone().timeout(self.config.connect_timeout);
        let mut conn = self.topology.connect_as_primary(&connect_ctx, &master).await?;

        let executed = conn.execute(ctx, &stmt).await;
        // release on both paths
        let closed = conn.close().await;
        let result = executed?;
        closed?;

        event!(
            Level::DEBUG,
            server = %master,
            lower_bound = partition.lower_bound,
            upper_bound = partition.upper_bound,
            deleted = result.rows_affected,
            "partition pruned"
        );
        Ok(result.rows_affected)
    }
}

/// `DELETE FROM <table> WHERE <column> NOT BETWEEN $1 AND $2`, with the
/// identifiers checked and the bounds bound.
fn prune_statement(mapping: &ShardMapping, partition: &RangePartition) -> Result<Statement> {
    validate_table_name(&mapping.table_name)?;
    validate_column_name(&mapping.column_name)?;

    let sql = format!(
        "DELETE FROM {} WHERE {} NOT BETWEEN $1 AND $2",
        mapping.table_name, mapping.column_name
    );
    Ok(Statement::command(sql)
        .bind(partition.lower_bound)
        .bind(partition.upper_bound))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{StoreError, Value};
    use crate::sharding::PartitionType;

    fn partition(lower: i64, upper: i64) -> RangePartition {
        RangePartition {
            scheme_name: "first".into(),
            lower_bound: lower,
            upper_bound: upper,
            group_id: format!("G{}", lower),
        }
    }

    #[test]
    fn test_prune_statement_binds_bounds() {
        let mapping = ShardMapping {
            table_name: "db1.t1".into(),
            column_name: "userID".into(),
            partition_type: PartitionType::Range,
            scheme_name: "first".into(),
        };
        let stmt = prune_statement(&mapping, &partition(0, 1000)).unwrap();
        assert_eq!(
            stmt.sql,
            "DELETE FROM db1.t1 WHERE userID NOT BETWEEN $1 AND $2"
        );
        assert_eq!(stmt.params, vec![Value::Integer(0), Value::Integer(1000)]);

        let hostile = ShardMapping {
            column_name: "userID OR 1=1".into(),
            ..mapping
        };
        assert!(matches!(
            prune_statement(&hostile, &partition(0, 1)),
            Err(ShardingError::InvalidIdentifier(_))
        ));
    }

    #[test]
    fn test_report_accounting() {
        let report = PruneReport {
            table_name: "db1.t1".into(),
            outcomes: vec![
                PartitionOutcome {
                    partition: partition(0, 10),
                    result: Ok(3),
                },
                PartitionOutcome {
                    partition: partition(11, 20),
                    result: Err(StoreError::ConnectionFailure("down".into()).into()),
                },
            ],
            skipped: vec![partition(21, 30)],
        };

        assert!(!report.is_complete());
        assert_eq!(report.rows_deleted(), 3);
        let failed: Vec<_> = report.failed().iter().map(|p| p.lower_bound).collect();
        assert_eq!(failed, vec![11, 21]);
        assert_eq!(
            report.into_result().unwrap_err(),
            ShardingError::IncompletePrune {
                table: "db1.t1".into(),
                failed: 2,
                total: 3,
            }
        );
    }
}
