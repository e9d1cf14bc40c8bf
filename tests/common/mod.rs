#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::Arc;

use hub_sharding::prelude::*;

/// Three groups (master + replica each) behind a sharded `db1.t1`:
/// `[0,1000] -> G1`, `[1001,2000] -> G2`, `[2001,3000] -> G3` in scheme `first`.
pub struct Fleet {
    pub ctx: CallContext,
    pub store: MemoryStore,
    pub topology: InMemoryTopology,
    pub directory: ShardDirectory,
    pub masters: BTreeMap<String, String>,
    pub replicas: BTreeMap<String, String>,
}

pub const GROUPS: [&str; 3] = ["G1", "G2", "G3"];

pub async fn empty_fleet(config: ShardingConfig) -> Result<Fleet> {
    let ctx = CallContext::background();
    let store = MemoryStore::new();
    let topology = InMemoryTopology::new();

    let mut masters = BTreeMap::new();
    let mut replicas = BTreeMap::new();
    for (i, group) in GROUPS.iter().enumerate() {
        topology.add_group(*group).await?;
        let master = topology
            .add_server(group, &format!("10.0.{}.1:3306", i + 1))
            .await?;
        let replica = topology
            .add_server(group, &format!("10.0.{}.2:3306", i + 1))
            .await?;
        topology.set_master(group, Some(master.as_str())).await?;
        masters.insert(group.to_string(), master);
        replicas.insert(group.to_string(), replica);
    }

    let directory = ShardDirectory::new(
        Arc::new(store.clone()),
        Arc::new(topology.clone()),
        config,
    )?;
    directory.install(&ctx).await?;

    Ok(Fleet {
        ctx,
        store,
        topology,
        directory,
        masters,
        replicas,
    })
}

pub async fn fleet_with_config(config: ShardingConfig) -> Result<Fleet> {
    let fleet = empty_fleet(config).await?;
    let ctx = &fleet.ctx;

    fleet
        .directory
        .mappings()
        .add(ctx, "db1.t1", "userID", PartitionType::Range, "first")
        .await?;
    for (i, group) in GROUPS.iter().enumerate() {
        let i = i as i64;
        let lower = if i == 0 { 0 } else { i * 1000 + 1 };
        fleet
            .directory
            .partitions()
            .add(ctx, "first", lower, (i + 1) * 1000, group)
            .await?;
    }
    Ok(fleet)
}

pub async fn fleet() -> Result<Fleet> {
    fleet_with_config(ShardingConfig::default()).await
}

/// Copies the full key set into `db1.t1` on every master, as a bulk copy would.
pub async fn seed_masters(fleet: &Fleet, keys: &[i64]) -> Result<()> {
    for master in fleet.masters.values() {
        let store = fleet
            .topology
            .server_store(master)
            .await
            .expect("master has a store");
        store
            .execute(
                &fleet.ctx,
                &Statement::command("CREATE TABLE db1.t1 (userID INT NOT NULL, payload VARCHAR(32))"),
            )
            .await?;
        for key in keys {
            store
                .execute(
                    &fleet.ctx,
                    &Statement::command("INSERT INTO db1.t1 VALUES ($1, $2)")
                        .bind(*key)
                        .bind(format!("row-{}", key)),
                )
                .await?;
        }
    }
    Ok(())
}

/// Keys left in `db1.t1` on `server`, ascending.
pub async fn keys_on(fleet: &Fleet, server: &str) -> Result<Vec<i64>> {
    let store = fleet
        .topology
        .server_store(server)
        .await
        .expect("server has a store");
    let result = store
        .execute(
            &fleet.ctx,
            &Statement::query("SELECT userID FROM db1.t1 ORDER BY userID"),
        )
        .await?;
    Ok(result
        .rows
        .iter()
        .filter_map(|row| row[0].as_i64())
        .collect())
}
