//! Metadata Store Adapter.
//!
//! A thin statement-execution contract over a transactional relational
//! store. The sharding catalogs speak only this interface.

pub mod engine;
pub mod executors;
pub mod memory;
pub mod result;
pub mod table;

pub use engine::Database;
pub use memory::{MemoryStore, MemoryTransaction};
pub use result::QueryResult;
pub use table::Table;

use async_trait::async_trait;

use crate::context::CallContext;
use crate::core::{StoreResult, Value};

/// One SQL statement with its positional (`$1`, `$2`, ...) parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub sql: String,
    pub params: Vec<Value>,
    pub returns_rows: bool,
}

impl Statement {
    /// A statement whose result rows the caller wants back.
    pub fn query(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            params: Vec::new(),
            returns_rows: true,
        }
    }

    /// A statement executed for its effect only.
    pub fn command(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            params: Vec::new(),
            returns_rows: false,
        }
    }

    pub fn bind(mut self, value: impl Into<Value>) -> Self {
        self.params.push(value.into());
        self
    }
}

#[async_trait]
pub trait MetadataStore: Send + Sync {
    /// Run one statement in its own transaction.
    async fn execute(&self, ctx: &CallContext, stmt: &Statement) -> StoreResult<QueryResult>;

    /// Open an explicit transaction. Dropping it without `commit` rolls back.
    async fn begin(&self, ctx: &CallContext) -> StoreResult<Box<dyn StoreTransaction>>;
}

#[async_trait]
pub trait StoreTransaction: Send {
    async fn execute(&mut self, ctx: &CallContext, stmt: &Statement) -> StoreResult<QueryResult>;

    async fn commit(self: Box<Self>, ctx: &CallContext) -> StoreResult<()>;

    async fn rollback(self: Box<Self>) -> StoreResult<()>;
}
