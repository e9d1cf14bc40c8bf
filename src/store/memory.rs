use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{Level, event};

use crate::config::StoreConfig;
use crate::context::CallContext;
use crate::core::{StoreError, StoreResult};
use crate::parser::SqlParserAdapter;

use super::engine::{Database, ExecutionContext, ExecutorPipeline};
use super::{MetadataStore, QueryResult, Statement, StoreTransaction};

/// In-memory transactional SQL store.
///
/// Each autocommit statement runs against a copy-on-write snapshot that is
/// published only on success. A transaction holds the store exclusively until
/// it commits or is dropped.
#[derive(Clone)]
pub struct MemoryStore {
    inner: Arc<Inner>,
}

struct Inner {
    name: String,
    config: StoreConfig,
    parser: SqlParserAdapter,
    pipeline: ExecutorPipeline,
    db: Arc<Mutex<Database>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_config("memory", StoreConfig::default())
    }

    pub fn with_config(name: impl Into<String>, config: StoreConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                name: name.into(),
                config,
                parser: SqlParserAdapter::new(),
                pipeline: ExecutorPipeline::with_default_executors(),
                db: Arc::new(Mutex::new(Database::new())),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn config(&self) -> &StoreConfig {
        &self.inner.config
    }

    pub async fn table_names(&self) -> Vec<String> {
        self.inner.db.lock().await.table_names()
    }

    /// Caller deadline tightened by the configured per-statement timeout.
    fn statement_context(&self, ctx: &CallContext) -> CallContext {
        match self.inner.config.query_timeout {
            Some(timeout) => ctx.clone().timeout(timeout),
            None => ctx.clone(),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryStore")
            .field("name", &self.inner.name)
            .field("url", &self.inner.config.redacted_url())
            .finish()
    }
}

impl Inner {
    /// Parse and run `stmt` on `db`, leaving `db` untouched on failure.
    fn apply(&self, db: &mut Database, stmt: &Statement) -> StoreResult<QueryResult> {
        let parsed = self.parser.parse(&stmt.sql)?;
        let mut working = db.clone();
        let ctx = ExecutionContext {
            params: &stmt.params,
        };

        let result = self
            .pipeline
            .execute(&parsed, &mut working, &ctx)
            .inspect_err(|err| {
                event!(Level::DEBUG, store = %self.name, sql = %stmt.sql, error = %err, "statement failed");
            })?;

        *db = working;
        Ok(if stmt.returns_rows {
            result
        } else {
            result.without_rows()
        })
    }
}

#[async_trait]
impl MetadataStore for MemoryStore {
    async fn execute(&self, ctx: &CallContext, stmt: &Statement) -> StoreResult<QueryResult> {
        event!(Level::TRACE, store = %self.inner.name, sql = %stmt.sql, "execute");
        let ctx = self.statement_context(ctx);

        ctx.run(async {
            let mut db = self.inner.db.lock().await;
            self.inner.apply(&mut db, stmt)
        })
        .await
    }

    async fn begin(&self, ctx: &CallContext) -> StoreResult<Box<dyn StoreTransaction>> {
        let guard = ctx
            .run::<_, StoreError, _>(async { Ok(self.inner.db.clone().lock_owned().await) })
            .await?;
        let working = (*guard).clone();

        event!(Level::TRACE, store = %self.inner.name, "transaction started");
        Ok(Box::new(MemoryTransaction {
            store: self.clone(),
            guard,
            working,
        }))
    }
}

/// Exclusive transaction over a [`MemoryStore`].
pub struct MemoryTransaction {
    store: MemoryStore,
    guard: OwnedMutexGuard<Database>,
    working: Database,
}

#[async_trait]
impl StoreTransaction for MemoryTransaction {
    async fn execute(&mut self, ctx: &CallContext, stmt: &Statement) -> StoreResult<QueryResult> {
        event!(Level::TRACE, store = %self.store.inner.name, sql = %stmt.sql, "execute in transaction");
        let ctx = self.store.statement_context(ctx);
        ctx.check()?;
        self.store.inner.apply(&mut self.working, stmt)
    }

    async fn commit(self: Box<Self>, ctx: &CallContext) -> StoreResult<()> {
        ctx.check()?;
        let MemoryTransaction {
            store,
            mut guard,
            working,
        } = *self;
        *guard = working;
        event!(Level::TRACE, store = %store.inner.name, "transaction committed");
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> StoreResult<()> {
        event!(Level::TRACE, store = %self.store.inner.name, "transaction rolled back");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Value;
    use std::time::Duration;

    async fn store_with_table() -> MemoryStore {
        let store = MemoryStore::new();
        let ctx = CallContext::background();
        store
            .execute(
                &ctx,
                &Statement::command("CREATE TABLE t (k INT NOT NULL PRIMARY KEY, v VARCHAR(16))"),
            )
            .await
            .unwrap();
        store
    }

    #[tokio::test]
    async fn test_failed_insert_leaves_no_rows() {
        let store = store_with_table().await;
        let ctx = CallContext::background();

        // the second row collides with the first; neither may land
        let err = store
            .execute(
                &ctx,
                &Statement::command("INSERT INTO t VALUES (1, 'a'), (1, 'b')"),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::DuplicateKey(_)));

        let rows = store
            .execute(&ctx, &Statement::query("SELECT * FROM t"))
            .await
            .unwrap();
        assert!(rows.is_empty());
    }

    #[tokio::test]
    async fn test_command_drops_rows() {
        let store = store_with_table().await;
        let ctx = CallContext::background();
        store
            .execute(&ctx, &Statement::command("INSERT INTO t VALUES (1, 'a')"))
            .await
            .unwrap();

        let result = store
            .execute(&ctx, &Statement::command("SELECT * FROM t"))
            .await
            .unwrap();
        assert!(result.rows.is_empty());
        assert_eq!(result.rows_affected, 1);
    }

    #[tokio::test]
    async fn test_dropped_transaction_rolls_back() {
        let store = store_with_table().await;
        let ctx = CallContext::background();

        {
            let mut tx = store.begin(&ctx).await.unwrap();
            tx.execute(
                &ctx,
                &Statement::command("INSERT INTO t VALUES ($1, $2)")
                    .bind(7i64)
                    .bind("x"),
            )
            .await
            .unwrap();
        }

        let rows = store
            .execute(&ctx, &Statement::query("SELECT k FROM t"))
            .await
            .unwrap();
        assert!(rows.is_empty());

        let mut tx = store.begin(&ctx).await.unwrap();
        tx.execute(&ctx, &Statement::command("INSERT INTO t VALUES (8, 'y')"))
            .await
            .unwrap();
        tx.commit(&ctx).await.unwrap();

        let rows = store
            .execute(&ctx, &Statement::query("SELECT k FROM t"))
            .await
            .unwrap();
        assert_eq!(rows.rows, vec![vec![Value::Integer(8)]]);
    }

    #[tokio::test]
    async fn test_open_transaction_blocks_until_deadline() {
        let store = store_with_table().await;
        let ctx = CallContext::background();
        let _tx = store.begin(&ctx).await.unwrap();

        let short = CallContext::with_timeout(Duration::from_millis(20));
        let err = store
            .execute(&short, &Statement::query("SELECT * FROM t"))
            .await
            .unwrap_err();
        assert_eq!(err, StoreError::DeadlineExceeded);
    }

    #[tokio::test]
    async fn test_query_timeout_from_config() {
        let store = MemoryStore::with_config(
            "catalog",
            StoreConfig::default().query_timeout(Duration::from_millis(20)),
        );
        let ctx = CallContext::background();
        store
            .execute(&ctx, &Statement::command("CREATE TABLE t (k INT)"))
            .await
            .unwrap();

        let _tx = store.begin(&ctx).await.unwrap();
        let err = store
            .execute(&ctx, &Statement::query("SELECT * FROM t"))
            .await
            .unwrap_err();
        assert_eq!(err, StoreError::DeadlineExceeded);
    }
}
