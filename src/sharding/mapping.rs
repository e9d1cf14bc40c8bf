use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{Level, event};

use super::{PartitionType, text_at, validate_column_name, validate_name, validate_table_name};
use crate::context::CallContext;
use crate::core::{Result, ShardingError, Value};
use crate::store::{MetadataStore, Statement};

const CREATE_SHARD_MAPPING: &str = "CREATE TABLE shard_mapping (\
     table_name VARCHAR(64) NOT NULL PRIMARY KEY, \
     column_name VARCHAR(64) NOT NULL, \
     type_name VARCHAR(64) NOT NULL, \
     sharding_specification VARCHAR(64) NOT NULL)";
const CREATE_TYPE_INDEX: &str =
    "CREATE INDEX shard_mapping_type_name ON shard_mapping (type_name)";
const DROP_SHARD_MAPPING: &str = "DROP TABLE shard_mapping";
const INSERT_SHARD_MAPPING: &str = "INSERT INTO shard_mapping \
     (table_name, column_name, type_name, sharding_specification) VALUES ($1, $2, $3, $4)";
const SELECT_SHARD_MAPPING: &str =
    "SELECT table_name, column_name, type_name, sharding_specification \
     FROM shard_mapping WHERE table_name = $1";
const SELECT_SHARD_MAPPINGS: &str =
    "SELECT table_name, column_name, type_name, sharding_specification \
     FROM shard_mapping WHERE type_name = $1 ORDER BY table_name";
const DELETE_SHARD_MAPPING: &str = "DELETE FROM shard_mapping WHERE table_name = $1";

/// How one logical table is partitioned. Immutable once stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShardMapping {
    pub table_name: String,
    pub column_name: String,
    pub partition_type: PartitionType,
    pub scheme_name: String,
}

impl ShardMapping {
    fn from_row(row: &[Value]) -> Result<Self> {
        Ok(Self {
            table_name: text_at(row, 0, "table_name")?,
            column_name: text_at(row, 1, "column_name")?,
            partition_type: text_at(row, 2, "type_name")?.parse()?,
            scheme_name: text_at(row, 3, "sharding_specification")?,
        })
    }
}

/// The `shard_mapping` catalog table: logical table to scheme.
#[derive(Clone)]
pub struct ShardMappingCatalog {
    store: Arc<dyn MetadataStore>,
}

impl ShardMappingCatalog {
    pub fn new(store: Arc<dyn MetadataStore>) -> Self {
        Self { store }
    }

    /// Fails if the table already exists. Table and index land together or
    /// not at all.
    pub async fn create_schema(&self, ctx: &CallContext) -> Result<()> {
        let mut tx = self.store.begin(ctx).await?;
        for sql in [CREATE_SHARD_MAPPING, CREATE_TYPE_INDEX] {
            tx.execute(ctx, &Statement::command(sql)).await?;
        }
        tx.commit(ctx).await?;
        Ok(())
    }

    pub async fn drop_schema(&self, ctx: &CallContext) -> Result<()> {
        self.store
            .execute(ctx, &Statement::command(DROP_SHARD_MAPPING))
            .await?;
        Ok(())
    }

    /// Maps `table_name` to a scheme. A second mapping for the same table
    /// fails with the store's duplicate-key error.
    pub async fn add(
        &self,
        ctx: &CallContext,
        table_name: &str,
        column_name: &str,
        partition_type: PartitionType,
        scheme_name: &str,
    ) -> Result<ShardMapping> {
        validate_table_name(table_name)?;
        validate_column_name(column_name)?;
        validate_name(scheme_name)?;

        let stmt = Statement::command(INSERT_SHARD_MAPPING)
            .bind(table_name)
            .bind(column_name)
            .bind(partition_type.as_str())
            .bind(scheme_name);
        self.store.execute(ctx, &stmt).await?;

        event!(
            Level::INFO,
            table = %table_name,
            column = %column_name,
            partition_type = %partition_type,
            scheme = %scheme_name,
            "shard mapping added"
        );

        Ok(ShardMapping {
            table_name: table_name.to_string(),
            column_name: column_name.to_string(),
            partition_type,
            scheme_name: scheme_name.to_string(),
        })
    }

    pub async fn fetch(&self, ctx: &CallContext, table_name: &str) -> Result<ShardMapping> {
        let stmt = Statement::query(SELECT_SHARD_MAPPING).bind(table_name);
        let result = self.store.execute(ctx, &stmt).await?;

        match result.rows.first() {
            Some(row) => ShardMapping::from_row(row),
            None => Err(ShardingError::TableNotMapped(table_name.to_string())),
        }
    }

    /// All mappings of one partition type, ordered by table name.
    pub async fn list(
        &self,
        ctx: &CallContext,
        partition_type: PartitionType,
    ) -> Result<Vec<ShardMapping>> {
        let stmt = Statement::query(SELECT_SHARD_MAPPINGS).bind(partition_type.as_str());
        let result = self.store.execute(ctx, &stmt).await?;

        if result.is_empty() {
            return Err(ShardingError::NoMappingsForType(partition_type));
        }
        result
            .rows
            .iter()
            .map(|row| ShardMapping::from_row(row))
            .collect()
    }

    /// Like [`list`](Self::list), for a type given by name (`"RANGE"`).
    pub async fn list_by_type_name(
        &self,
        ctx: &CallContext,
        type_name: &str,
    ) -> Result<Vec<ShardMapping>> {
        let partition_type = type_name.parse()?;
        self.list(ctx, partition_type).await
    }

    /// Deletes the mapping row only. Succeeds even if nothing was mapped.
    pub async fn remove(&self, ctx: &CallContext, mapping: &ShardMapping) -> Result<()> {
        let stmt = Statement::command(DELETE_SHARD_MAPPING).bind(mapping.table_name.as_str());
        let result = self.store.execute(ctx, &stmt).await?;

        event!(
            Level::INFO,
            table = %mapping.table_name,
            removed = result.rows_affected,
            "shard mapping removed"
        );
        Ok(())
    }
}
