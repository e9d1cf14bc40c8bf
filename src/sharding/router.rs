use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use futures::future::try_join_all;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use tracing::{Instrument, Level, event, info_span};

use super::{PartitionType, RangePartitionCatalog, ShardMapping, ShardMappingCatalog};
use crate::context::CallContext;
use crate::core::{Result, ShardingError};
use crate::topology::{Group, Topology};

/// One member of a group in a routing answer.
///
/// On the wire this is the array `[server_uuid, address, is_master]`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ServerEntry {
    pub server_uuid: String,
    pub address: String,
    pub is_master: bool,
}

impl Serialize for ServerEntry {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        (&self.server_uuid, &self.address, self.is_master).serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for ServerEntry {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let (server_uuid, address, is_master) = <(String, String, bool)>::deserialize(deserializer)?;
        Ok(Self {
            server_uuid,
            address,
            is_master,
        })
    }
}

/// Group id to that group's members.
pub type GroupRouting = BTreeMap<String, Vec<ServerEntry>>;

/// Resolves tables and keys to the servers that hold them.
///
/// Stateless: every call re-reads both catalogs and the topology.
#[derive(Clone)]
pub struct KeyRouter {
    mappings: ShardMappingCatalog,
    partitions: RangePartitionCatalog,
    topology: Arc<dyn Topology>,
}

impl KeyRouter {
    pub fn new(
        mappings: ShardMappingCatalog,
        partitions: RangePartitionCatalog,
        topology: Arc<dyn Topology>,
    ) -> Self {
        Self {
            mappings,
            partitions,
            topology,
        }
    }

    /// Members of the group owning `key` in `table_name`.
    pub async fn lookup(
        &self,
        ctx: &CallContext,
        table_name: &str,
        key: i64,
    ) -> Result<Vec<ServerEntry>> {
        let span = info_span!("sharding.lookup", table = %table_name, key);
        self.route_key(ctx, table_name, key).instrument(span).await
    }

    /// Members of every group that owns at least one partition of
    /// `table_name`'s scheme.
    ///
    /// Groups missing from the registry are left out of the answer, so it
    /// does not necessarily cover every partition.
    pub async fn go_fish_lookup(&self, ctx: &CallContext, table_name: &str) -> Result<GroupRouting> {
        let span = info_span!("sharding.go_fish_lookup", table = %table_name);
        self.route_all(ctx, table_name).instrument(span).await
    }

    async fn route_key(&self, ctx: &CallContext, table_name: &str, key: i64) -> Result<Vec<ServerEntry>> {
        let mapping = self.mappings.fetch(ctx, table_name).await?;
        require_range(&mapping)?;

        let partition = self
            .partitions
            .lookup_by_key(ctx, key, &mapping.scheme_name)
            .await?;

        let group = self
            .topology
            .fetch_group(ctx, &partition.group_id)
            .await?
            .ok_or_else(|| ShardingError::GroupNotFound(partition.group_id.clone()))?;

        let entries = self.members(ctx, &group).await?;
        event!(
            Level::DEBUG,
            group = %group.group_id,
            servers = entries.len(),
            "key routed"
        );
        Ok(entries)
    }

    async fn route_all(&self, ctx: &CallContext, table_name: &str) -> Result<GroupRouting> {
        let mapping = self.mappings.fetch(ctx, table_name).await?;
        require_range(&mapping)?;

        let partitions = self.partitions.fetch(ctx, &mapping.scheme_name).await?;
        let group_ids: BTreeSet<&str> = partitions.iter().map(|p| p.group_id.as_str()).collect();

        let resolved = try_join_all(
            group_ids
                .into_iter()
                .map(|group_id| self.resolve_group(ctx, group_id)),
        )
        .await?;

        let routing: GroupRouting = resolved.into_iter().flatten().collect();
        event!(
            Level::DEBUG,
            partitions = partitions.len(),
            groups = routing.len(),
            "scatter routed"
        );
        Ok(routing)
    }

    async fn resolve_group(
        &self,
        ctx: &CallContext,
        group_id: &str,
    ) -> Result<Option<(String, Vec<ServerEntry>)>> {
        match self.topology.fetch_group(ctx, group_id).await? {
            Some(group) => {
                let entries = self.members(ctx, &group).await?;
                Ok(Some((group.group_id, entries)))
            }
            None => {
                event!(Level::WARN, group = %group_id, "skipping unresolvable group");
                Ok(None)
            }
        }
    }

    async fn members(&self, ctx: &CallContext, group: &Group) -> Result<Vec<ServerEntry>> {
        try_join_all(group.servers.iter().map(|uuid| async move {
            let server = self
                .topology
                .fetch_server(ctx, uuid)
                .await?
                .ok_or_else(|| ShardingError::ServerNotFound(uuid.clone()))?;
            Ok::<_, ShardingError>(ServerEntry {
                is_master: group.is_master(&server.uuid),
                server_uuid: server.uuid,
                address: server.address,
            })
        }))
        .await
    }
}

fn require_range(mapping: &ShardMapping) -> Result<()> {
    match mapping.partition_type {
        PartitionType::Range => Ok(()),
        other => Err(ShardingError::UnsupportedPartitionType(other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_entry_wire_format() {
        let entry = ServerEntry {
            server_uuid: "5ca1ab1e-0000-4000-8000-000000000001".into(),
            address: "127.0.0.1:3306".into(),
            is_master: true,
        };

        let json = serde_json::to_string(&entry).unwrap();
        assert_eq!(
            json,
            r#"["5ca1ab1e-0000-4000-8000-000000000001","127.0.0.1:3306",true]"#
        );
        let back: ServerEntry = serde_json::from_str(&json).unwrap();
        assert_eq!(back, entry);
    }

    #[test]
    fn test_group_routing_wire_format() {
        let mut routing = GroupRouting::new();
        routing.insert(
            "G1".into(),
            vec![ServerEntry {
                server_uuid: "s1".into(),
                address: "h1:3306".into(),
                is_master: false,
            }],
        );
        assert_eq!(
            serde_json::to_value(&routing).unwrap(),
            serde_json::json!({ "G1": [["s1", "h1:3306", false]] })
        );
    }
}
