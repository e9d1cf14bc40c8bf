use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{Level, event};

use super::{int_at, text_at, validate_name};
use crate::context::CallContext;
use crate::core::{Result, ShardingError, Value};
use crate::store::{MetadataStore, Statement};

const CREATE_RANGE_SPECIFICATION: &str = "CREATE TABLE range_sharding_specification (\
     name VARCHAR(64) NOT NULL, \
     lower_bound INT, \
     upper_bound INT, \
     group_id VARCHAR(64))";
const CREATE_NAME_INDEX: &str =
    "CREATE INDEX range_sharding_name ON range_sharding_specification (name)";
const CREATE_BOUNDS_INDEX: &str = "CREATE INDEX range_sharding_bounds \
     ON range_sharding_specification (lower_bound, upper_bound)";
const DROP_RANGE_SPECIFICATION: &str = "DROP TABLE range_sharding_specification";
const ADD_GROUP_FOREIGN_KEY: &str = "ALTER TABLE range_sharding_specification \
     ADD CONSTRAINT fk_group_id_sharding_spec FOREIGN KEY(group_id) REFERENCES groups(group_id)";
const DROP_GROUP_FOREIGN_KEY: &str =
    "ALTER TABLE range_sharding_specification DROP FOREIGN KEY fk_group_id_sharding_spec";
const INSERT_RANGE: &str = "INSERT INTO range_sharding_specification \
     (name, lower_bound, upper_bound, group_id) VALUES ($1, $2, $3, $4)";
const DELETE_RANGE: &str = "DELETE FROM range_sharding_specification \
     WHERE name = $1 AND lower_bound = $2 AND upper_bound = $3";
const SELECT_RANGES: &str = "SELECT name, lower_bound, upper_bound, group_id \
     FROM range_sharding_specification WHERE name = $1 ORDER BY lower_bound";
// overlapping rows resolve to the lowest lower bound
const LOOKUP_KEY: &str = "SELECT name, lower_bound, upper_bound, group_id \
     FROM range_sharding_specification \
     WHERE name = $1 AND lower_bound <= $2 AND $2 <= upper_bound \
     ORDER BY lower_bound LIMIT 1";
const SELECT_OVERLAP: &str = "SELECT name, lower_bound, upper_bound, group_id \
     FROM range_sharding_specification \
     WHERE name = $1 AND lower_bound <= $3 AND $2 <= upper_bound \
     ORDER BY lower_bound LIMIT 1";

/// One `[lower_bound, upper_bound]` key range of a scheme, owned by a group.
/// Both bounds are inclusive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RangePartition {
    pub scheme_name: String,
    pub lower_bound: i64,
    pub upper_bound: i64,
    pub group_id: String,
}

impl RangePartition {
    pub fn contains(&self, key: i64) -> bool {
        self.lower_bound <= key && key <= self.upper_bound
    }

    pub fn overlaps(&self, lower_bound: i64, upper_bound: i64) -> bool {
        self.lower_bound <= upper_bound && lower_bound <= self.upper_bound
    }

    fn from_row(row: &[Value]) -> Result<Self> {
        Ok(Self {
            scheme_name: text_at(row, 0, "name")?,
            lower_bound: int_at(row, 1, "lower_bound")?,
            upper_bound: int_at(row, 2, "upper_bound")?,
            group_id: text_at(row, 3, "group_id")?,
        })
    }
}

/// The `range_sharding_specification` catalog table.
#[derive(Clone)]
pub struct RangePartitionCatalog {
    store: Arc<dyn MetadataStore>,
    enforce_non_overlap: bool,
}

impl RangePartitionCatalog {
    pub fn new(store: Arc<dyn MetadataStore>) -> Self {
        Self {
            store,
            enforce_non_overlap: true,
        }
    }

    /// With the check off, overlapping ranges are stored as given and
    /// lookups pick the lowest lower bound.
    pub fn with_overlap_check(mut self, enforce: bool) -> Self {
        self.enforce_non_overlap = enforce;
        self
    }

    /// Table plus both indexes in one transaction.
    pub async fn create_schema(&self, ctx: &CallContext) -> Result<()> {
        let mut tx = self.store.begin(ctx).await?;
        for sql in [CREATE_RANGE_SPECIFICATION, CREATE_NAME_INDEX, CREATE_BOUNDS_INDEX] {
            tx.execute(ctx, &Statement::command(sql)).await?;
        }
        tx.commit(ctx).await?;
        Ok(())
    }

    pub async fn drop_schema(&self, ctx: &CallContext) -> Result<()> {
        self.store
            .execute(ctx, &Statement::command(DROP_RANGE_SPECIFICATION))
            .await?;
        Ok(())
    }

    /// Binds `group_id` to the registry's `groups(group_id)`.
    pub async fn add_foreign_key(&self, ctx: &CallContext) -> Result<()> {
        self.store
            .execute(ctx, &Statement::command(ADD_GROUP_FOREIGN_KEY))
            .await?;
        Ok(())
    }

    pub async fn drop_foreign_key(&self, ctx: &CallContext) -> Result<()> {
        self.store
            .execute(ctx, &Statement::command(DROP_GROUP_FOREIGN_KEY))
            .await?;
        Ok(())
    }

    pub async fn add(
        &self,
        ctx: &CallContext,
        scheme_name: &str,
        lower_bound: i64,
        upper_bound: i64,
        group_id: &str,
    ) -> Result<RangePartition> {
        validate_name(scheme_name)?;
        validate_name(group_id)?;
        if lower_bound > upper_bound {
            return Err(ShardingError::InvalidRange {
                lower: lower_bound,
                upper: upper_bound,
            });
        }

        // check and insert see the same snapshot; dropping `tx` on error rolls back
        let mut tx = self.store.begin(ctx).await?;

        if self.enforce_non_overlap {
            let stmt = Statement::query(SELECT_OVERLAP)
                .bind(scheme_name)
                .bind(lower_bound)
                .bind(upper_bound);
            let result = tx.execute(ctx, &stmt).await?;
            if let Some(row) = result.rows.first() {
                let existing = RangePartition::from_row(row)?;
                return Err(ShardingError::OverlappingRange {
                    scheme: scheme_name.to_string(),
                    lower: lower_bound,
                    upper: upper_bound,
                    existing_lower: existing.lower_bound,
                    existing_upper: existing.upper_bound,
                });
            }
        }

        let stmt = Statement::command(INSERT_RANGE)
            .bind(scheme_name)
            .bind(lower_bound)
            .bind(upper_bound)
            .bind(group_id);
        tx.execute(ctx, &stmt).await?;
        tx.commit(ctx).await?;

        event!(
            Level::INFO,
            scheme = %scheme_name,
            lower_bound,
            upper_bound,
            group = %group_id,
            "range partition added"
        );

        Ok(RangePartition {
            scheme_name: scheme_name.to_string(),
            lower_bound,
            upper_bound,
            group_id: group_id.to_string(),
        })
    }

    /// Deletes the exact `(scheme, lower, upper)` row.
    pub async fn remove(&self, ctx: &CallContext, partition: &RangePartition) -> Result<()> {
        let stmt = Statement::command(DELETE_RANGE)
            .bind(partition.scheme_name.as_str())
            .bind(partition.lower_bound)
            .bind(partition.upper_bound);
        let result = self.store.execute(ctx, &stmt).await?;

        event!(
            Level::INFO,
            scheme = %partition.scheme_name,
            lower_bound = partition.lower_bound,
            upper_bound = partition.upper_bound,
            removed = result.rows_affected,
            "range partition removed"
        );
        Ok(())
    }

    /// Every partition of `scheme_name`, ordered by lower bound.
    pub async fn fetch(&self, ctx: &CallContext, scheme_name: &str) -> Result<Vec<RangePartition>> {
        let stmt = Statement::query(SELECT_RANGES).bind(scheme_name);
        let result = self.store.execute(ctx, &stmt).await?;

        if result.is_empty() {
            return Err(ShardingError::SchemeNotFound(scheme_name.to_string()));
        }
        result
            .rows
            .iter()
            .map(|row| RangePartition::from_row(row))
            .collect()
    }

    /// The partition of `scheme_name` whose inclusive range holds `key`.
    pub async fn lookup_by_key(
        &self,
        ctx: &CallContext,
        key: i64,
        scheme_name: &str,
    ) -> Result<RangePartition> {
        let stmt = Statement::query(LOOKUP_KEY).bind(scheme_name).bind(key);
        let result = self.store.execute(ctx, &stmt).await?;

        match result.rows.first() {
            Some(row) => RangePartition::from_row(row),
            None => Err(ShardingError::NoPartitionForKey {
                scheme: scheme_name.to_string(),
                key,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    async fn catalog(enforce: bool) -> RangePartitionCatalog {
        let catalog =
            RangePartitionCatalog::new(Arc::new(MemoryStore::new())).with_overlap_check(enforce);
        catalog
            .create_schema(&CallContext::background())
            .await
            .unwrap();
        catalog
    }

    #[test]
    fn test_contains_and_overlaps() {
        let partition = RangePartition {
            scheme_name: "first".into(),
            lower_bound: 0,
            upper_bound: 1000,
            group_id: "G1".into(),
        };
        assert!(partition.contains(0));
        assert!(partition.contains(1000));
        assert!(!partition.contains(1001));
        assert!(partition.overlaps(1000, 2000));
        assert!(!partition.overlaps(1001, 2000));
    }

    #[tokio::test]
    async fn test_rejects_inverted_range() {
        let catalog = catalog(true).await;
        let err = catalog
            .add(&CallContext::background(), "first", 10, 5, "G1")
            .await
            .unwrap_err();
        assert_eq!(err, ShardingError::InvalidRange { lower: 10, upper: 5 });
    }

    #[tokio::test]
    async fn test_rejects_overlap_in_same_scheme_only() {
        let catalog = catalog(true).await;
        let ctx = CallContext::background();
        catalog.add(&ctx, "first", 0, 1000, "G1").await.unwrap();

        let err = catalog.add(&ctx, "first", 1000, 2000, "G2").await.unwrap_err();
        assert_eq!(
            err,
            ShardingError::OverlappingRange {
                scheme: "first".into(),
                lower: 1000,
                upper: 2000,
                existing_lower: 0,
                existing_upper: 1000,
            }
        );

        catalog.add(&ctx, "second", 500, 1500, "G2").await.unwrap();
        assert_eq!(catalog.fetch(&ctx, "first").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_overlap_tie_break_without_check() {
        let catalog = catalog(false).await;
        let ctx = CallContext::background();
        catalog.add(&ctx, "first", 100, 300, "G2").await.unwrap();
        catalog.add(&ctx, "first", 0, 200, "G1").await.unwrap();

        let hit = catalog.lookup_by_key(&ctx, 150, "first").await.unwrap();
        assert_eq!(hit.group_id, "G1");

        let all = catalog.fetch(&ctx, "first").await.unwrap();
        assert_eq!(all[0].lower_bound, 0);
        assert_eq!(all[1].lower_bound, 100);
    }

    #[tokio::test]
    async fn test_remove_is_exact() {
        let catalog = catalog(true).await;
        let ctx = CallContext::background();
        let kept = catalog.add(&ctx, "first", 0, 10, "G1").await.unwrap();
        let gone = catalog.add(&ctx, "first", 11, 20, "G2").await.unwrap();

        catalog.remove(&ctx, &gone).await.unwrap();
        // removing again is not an error
        catalog.remove(&ctx, &gone).await.unwrap();

        assert_eq!(catalog.fetch(&ctx, "first").await.unwrap(), vec![kept]);
    }
}
