use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::{Level, event};
use uuid::Uuid;

use super::{Group, Server, ServerConnection, Topology};
use crate::context::CallContext;
use crate::core::{StoreError, StoreResult};
use crate::store::{MemoryStore, MetadataStore, QueryResult, Statement};

/// Registry fake backed by process memory.
///
/// Every server owns a [`MemoryStore`] holding its physical shard data, so a
/// pruned shard can be inspected directly. Calls are counted in
/// [`TopologyStats`].
#[derive(Clone, Default)]
pub struct InMemoryTopology {
    state: Arc<RwLock<State>>,
    counters: Arc<Counters>,
}

#[derive(Default)]
struct State {
    groups: BTreeMap<String, Group>,
    servers: BTreeMap<String, ServerSlot>,
}

struct ServerSlot {
    server: Server,
    store: MemoryStore,
    reachable: bool,
    connect_latency: Option<Duration>,
}

#[derive(Default)]
struct Counters {
    group_fetches: AtomicUsize,
    server_fetches: AtomicUsize,
    connects: AtomicUsize,
    open_connections: AtomicUsize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TopologyStats {
    pub group_fetches: usize,
    pub server_fetches: usize,
    pub connects: usize,
    pub open_connections: usize,
}

impl TopologyStats {
    /// Group plus server lookups.
    pub fn registry_calls(&self) -> usize {
        self.group_fetches + self.server_fetches
    }
}

impl InMemoryTopology {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_group(&self, group_id: impl Into<String>) -> StoreResult<()> {
        let group_id = group_id.into();
        if group_id.trim().is_empty() {
            return Err(StoreError::ConstraintViolation(
                "group id must not be empty".into(),
            ));
        }

        let mut state = self.state.write().await;
        if state.groups.contains_key(&group_id) {
            return Err(StoreError::DuplicateKey(format!(
                "Group '{}' already exists",
                group_id
            )));
        }
        state.groups.insert(group_id.clone(), Group::new(group_id));
        Ok(())
    }

    pub async fn remove_group(&self, group_id: &str) -> StoreResult<()> {
        let mut state = self.state.write().await;
        let group = state
            .groups
            .remove(group_id)
            .ok_or_else(|| StoreError::Execution(format!("Group '{}' not found", group_id)))?;
        for uuid in &group.servers {
            if let Some(slot) = state.servers.get_mut(uuid) {
                slot.server.group_id = None;
            }
        }
        Ok(())
    }

    /// Registers a server under a fresh UUID and returns the UUID.
    pub async fn add_server(&self, group_id: &str, address: &str) -> StoreResult<String> {
        let uuid = Uuid::new_v4().to_string();
        self.add_server_with_id(group_id, &uuid, address).await?;
        Ok(uuid)
    }

    pub async fn add_server_with_id(
        &self,
        group_id: &str,
        uuid: &str,
        address: &str,
    ) -> StoreResult<()> {
        let mut state = self.state.write().await;
        if state.servers.contains_key(uuid) {
            return Err(StoreError::DuplicateKey(format!(
                "Server '{}' already exists",
                uuid
            )));
        }
        let group = state.groups.get_mut(group_id).ok_or_else(|| {
            StoreError::ConstraintViolation(format!("Group '{}' not found", group_id))
        })?;
        group.servers.push(uuid.to_string());

        let server = Server {
            uuid: uuid.to_string(),
            address: address.to_string(),
            group_id: Some(group_id.to_string()),
        };
        let store = MemoryStore::with_config(address, Default::default());
        state.servers.insert(
            uuid.to_string(),
            ServerSlot {
                server,
                store,
                reachable: true,
                connect_latency: None,
            },
        );
        Ok(())
    }

    /// Drops a server from the registry while its group still lists it.
    pub async fn forget_server(&self, uuid: &str) -> StoreResult<()> {
        let mut state = self.state.write().await;
        state
            .servers
            .remove(uuid)
            .map(|_| ())
            .ok_or_else(|| StoreError::Execution(format!("Server '{}' not found", uuid)))
    }

    /// Makes `uuid` the master of its group; `None` demotes the current one.
    pub async fn set_master(&self, group_id: &str, uuid: Option<&str>) -> StoreResult<()> {
        let mut state = self.state.write().await;
        let group = state.groups.get_mut(group_id).ok_or_else(|| {
            StoreError::ConstraintViolation(format!("Group '{}' not found", group_id))
        })?;

        if let Some(uuid) = uuid
            && !group.servers.iter().any(|s| s == uuid)
        {
            return Err(StoreError::ConstraintViolation(format!(
                "Server '{}' is not a member of group '{}'",
                uuid, group_id
            )));
        }
        group.master = uuid.map(str::to_string);
        Ok(())
    }

    pub async fn set_reachable(&self, uuid: &str, reachable: bool) -> StoreResult<()> {
        let mut state = self.state.write().await;
        let slot = slot_mut(&mut state, uuid)?;
        slot.reachable = reachable;
        Ok(())
    }

    /// Delay applied before every connect to `uuid`.
    pub async fn set_connect_latency(&self, uuid: &str, latency: Duration) -> StoreResult<()> {
        let mut state = self.state.write().await;
        let slot = slot_mut(&mut state, uuid)?;
        slot.connect_latency = Some(latency);
        Ok(())
    }

    /// The store holding `uuid`'s data, for seeding and inspection.
    pub async fn server_store(&self, uuid: &str) -> Option<MemoryStore> {
        let state = self.state.read().await;
        state.servers.get(uuid).map(|slot| slot.store.clone())
    }

    pub fn stats(&self) -> TopologyStats {
        TopologyStats {
            group_fetches: self.counters.group_fetches.load(Ordering::SeqCst),
            server_fetches: self.counters.server_fetches.load(Ordering::SeqCst),
            connects: self.counters.connects.load(Ordering::SeqCst),
            open_connections: self.counters.open_connections.load(Ordering::SeqCst),
        }
    }
}

fn slot_mut<'a>(state: &'a mut State, uuid: &str) -> StoreResult<&'a mut ServerSlot> {
    state
        .servers
        .get_mut(uuid)
        .ok_or_else(|| StoreError::Execution(format!("Server '{}' not found", uuid)))
}

#[async_trait]
impl Topology for InMemoryTopology {
    async fn fetch_group(&self, ctx: &CallContext, group_id: &str) -> StoreResult<Option<Group>> {
        self.counters.group_fetches.fetch_add(1, Ordering::SeqCst);
        ctx.run(async {
            let state = self.state.read().await;
            Ok(state.groups.get(group_id).cloned())
        })
        .await
    }

    async fn fetch_server(
        &self,
        ctx: &CallContext,
        server_uuid: &str,
    ) -> StoreResult<Option<Server>> {
        self.counters.server_fetches.fetch_add(1, Ordering::SeqCst);
        ctx.run(async {
            let state = self.state.read().await;
            Ok(state.servers.get(server_uuid).map(|slot| slot.server.clone()))
        })
        .await
    }

    async fn connect_as_primary(
        &self,
        ctx: &CallContext,
        server_uuid: &str,
    ) -> StoreResult<Box<dyn ServerConnection>> {
        self.counters.connects.fetch_add(1, Ordering::SeqCst);

        let connection = ctx
            .run::<_, StoreError, _>(async {
                let (store, reachable, latency, address) = {
                    let state = self.state.read().await;
                    let slot = state.servers.get(server_uuid).ok_or_else(|| {
                        StoreError::ConnectionFailure(format!("Unknown server '{}'", server_uuid))
                    })?;
                    (
                        slot.store.clone(),
                        slot.reachable,
                        slot.connect_latency,
                        slot.server.address.clone(),
                    )
                };

                if let Some(latency) = latency {
                    tokio::time::sleep(latency).await;
                }
                if !reachable {
                    return Err(StoreError::ConnectionFailure(format!(
                        "Can't connect to server at '{}'",
                        address
                    )));
                }

                Ok(MemoryConnection::open(
                    server_uuid.to_string(),
                    store,
                    self.counters.clone(),
                ))
            })
            .await?;

        event!(Level::DEBUG, server = %server_uuid, "primary connection opened");
        Ok(Box::new(connection))
    }
}

/// Connection handed out by [`InMemoryTopology`].
pub struct MemoryConnection {
    server_uuid: String,
    store: MemoryStore,
    counters: Arc<Counters>,
}

impl MemoryConnection {
    fn open(server_uuid: String, store: MemoryStore, counters: Arc<Counters>) -> Self {
        counters.open_connections.fetch_add(1, Ordering::SeqCst);
        Self {
            server_uuid,
            store,
            counters,
        }
    }
}

impl Drop for MemoryConnection {
    fn drop(&mut self) {
        self.counters.open_connections.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl ServerConnection for MemoryConnection {
    fn server_uuid(&self) -> &str {
        &self.server_uuid
    }

    async fn execute(&mut self, ctx: &CallContext, stmt: &Statement) -> StoreResult<QueryResult> {
        self.store.execute(ctx, stmt).await
    }

    async fn close(self: Box<Self>) -> StoreResult<()> {
        event!(Level::DEBUG, server = %self.server_uuid, "primary connection closed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_register_and_fetch() {
        let topology = InMemoryTopology::new();
        let ctx = CallContext::background();
        topology.add_group("G1").await.unwrap();
        let s1 = topology.add_server("G1", "127.0.0.1:3306").await.unwrap();
        let s2 = topology.add_server("G1", "127.0.0.1:3307").await.unwrap();
        topology.set_master("G1", Some(s1.as_str())).await.unwrap();

        assert!(Uuid::parse_str(&s1).is_ok());
        let group = topology.fetch_group(&ctx, "G1").await.unwrap().unwrap();
        assert_eq!(group.servers, vec![s1.clone(), s2.clone()]);
        assert!(group.is_master(&s1));
        assert!(!group.is_master(&s2));

        let server = topology.fetch_server(&ctx, &s2).await.unwrap().unwrap();
        assert_eq!(server.address, "127.0.0.1:3307");
        assert_eq!(server.group_id.as_deref(), Some("G1"));

        assert!(topology.fetch_group(&ctx, "G9").await.unwrap().is_none());
        assert_eq!(topology.stats().group_fetches, 2);
        assert_eq!(topology.stats().server_fetches, 1);
    }

    #[tokio::test]
    async fn test_master_must_be_member() {
        let topology = InMemoryTopology::new();
        topology.add_group("G1").await.unwrap();
        topology.add_group("G2").await.unwrap();
        let s2 = topology.add_server("G2", "h2:3306").await.unwrap();

        assert!(topology.set_master("G1", Some(s2.as_str())).await.is_err());
        assert!(topology.add_group("G1").await.is_err());
        assert!(topology.add_server("G3", "h3:3306").await.is_err());
    }

    #[tokio::test]
    async fn test_unreachable_server() {
        let topology = InMemoryTopology::new();
        let ctx = CallContext::background();
        topology.add_group("G1").await.unwrap();
        let s1 = topology.add_server("G1", "h1:3306").await.unwrap();
        topology.set_reachable(&s1, false).await.unwrap();

        let err = topology.connect_as_primary(&ctx, &s1).await.err().unwrap();
        assert!(matches!(err, StoreError::ConnectionFailure(_)));
        assert_eq!(topology.stats().open_connections, 0);
    }

    #[tokio::test]
    async fn test_connection_accounting() {
        let topology = InMemoryTopology::new();
        let ctx = CallContext::background();
        topology.add_group("G1").await.unwrap();
        let s1 = topology.add_server("G1", "h1:3306").await.unwrap();

        let first = topology.connect_as_primary(&ctx, &s1).await.unwrap();
        let second = topology.connect_as_primary(&ctx, &s1).await.unwrap();
        assert_eq!(topology.stats().open_connections, 2);

        first.close().await.unwrap();
        drop(second);
        let stats = topology.stats();
        assert_eq!(stats.open_connections, 0);
        assert_eq!(stats.connects, 2);
    }
}
