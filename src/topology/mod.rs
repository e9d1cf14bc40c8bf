//! Replica-group / server registry, consumed only through a narrow capability.
//!
//! The sharding core reads group composition and opens primary connections;
//! it never creates, elects or repairs anything here.

pub mod memory;

pub use memory::{InMemoryTopology, MemoryConnection, TopologyStats};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::context::CallContext;
use crate::core::StoreResult;
use crate::store::{QueryResult, Statement};

/// A replica set: at most one master and any number of members.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    pub group_id: String,
    pub master: Option<String>,
    pub servers: Vec<String>,
}

impl Group {
    pub fn new(group_id: impl Into<String>) -> Self {
        Self {
            group_id: group_id.into(),
            master: None,
            servers: Vec::new(),
        }
    }

    pub fn is_master(&self, server_uuid: &str) -> bool {
        self.master.as_deref() == Some(server_uuid)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Server {
    pub uuid: String,
    pub address: String,
    pub group_id: Option<String>,
}

#[async_trait]
pub trait Topology: Send + Sync {
    async fn fetch_group(&self, ctx: &CallContext, group_id: &str) -> StoreResult<Option<Group>>;

    async fn fetch_server(&self, ctx: &CallContext, server_uuid: &str)
    -> StoreResult<Option<Server>>;

    /// Open a read-write connection to `server_uuid`.
    async fn connect_as_primary(
        &self,
        ctx: &CallContext,
        server_uuid: &str,
    ) -> StoreResult<Box<dyn ServerConnection>>;
}

/// A live connection to one server. `close` releases it; so does drop.
#[async_trait]
pub trait ServerConnection: Send {
    fn server_uuid(&self) -> &str;

    async fn execute(&mut self, ctx: &CallContext, stmt: &Statement) -> StoreResult<QueryResult>;

    async fn close(self: Box<Self>) -> StoreResult<()>;
}
