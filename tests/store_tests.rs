use std::time::Duration;

use hub_sharding::prelude::*;
use hub_sharding::StoreTransaction;

async fn store_with_rows() -> StoreResult<(MemoryStore, CallContext)> {
    let ctx = CallContext::background();
    let store = MemoryStore::new();
    store
        .execute(
            &ctx,
            &Statement::command("CREATE TABLE db1.t1 (userID INT NOT NULL, name VARCHAR(16))"),
        )
        .await?;
    for (key, name) in [(5, "e"), (1, "a"), (3, "c"), (2, "b"), (4, "d")] {
        store
            .execute(
                &ctx,
                &Statement::command("INSERT INTO db1.t1 (userID, name) VALUES ($1, $2)")
                    .bind(key as i64)
                    .bind(name),
            )
            .await?;
    }
    Ok((store, ctx))
}

fn ints(result: &QueryResult) -> Vec<i64> {
    result.rows.iter().filter_map(|r| r[0].as_i64()).collect()
}

#[tokio::test]
async fn test_select_order_limit() -> StoreResult<()> {
    let (store, ctx) = store_with_rows().await?;

    let result = store
        .execute(
            &ctx,
            &Statement::query("SELECT userID, name AS label FROM db1.t1 ORDER BY userID DESC LIMIT 2"),
        )
        .await?;
    assert_eq!(result.columns, vec!["userID".to_string(), "label".to_string()]);
    assert_eq!(ints(&result), vec![5, 4]);
    assert_eq!(result.get(1, "label"), Some(&Value::from("d")));
    Ok(())
}

#[tokio::test]
async fn test_delete_not_between() -> StoreResult<()> {
    let (store, ctx) = store_with_rows().await?;

    let deleted = store
        .execute(
            &ctx,
            &Statement::command("DELETE FROM db1.t1 WHERE userID NOT BETWEEN $1 AND $2")
                .bind(2i64)
                .bind(4i64),
        )
        .await?;
    assert_eq!(deleted.rows_affected, 2);

    let rest = store
        .execute(&ctx, &Statement::query("SELECT userID FROM db1.t1 ORDER BY userID"))
        .await?;
    assert_eq!(ints(&rest), vec![2, 3, 4]);
    Ok(())
}

#[tokio::test]
async fn test_errors_are_typed() -> StoreResult<()> {
    let (store, ctx) = store_with_rows().await?;

    let cases = [
        ("CREATE TABLE db1.t1 (x INT)", "exists"),
        ("SELECT * FROM nope", "missing"),
        ("SELECT nope FROM db1.t1", "column"),
        ("INSERT INTO db1.t1 VALUES ('x', 'y')", "type"),
        ("INSERT INTO db1.t1 (name) VALUES ('y')", "not null"),
        ("SELEC 1", "parse"),
        ("UPDATE db1.t1 SET name = 'z'", "unsupported"),
    ];
    for (sql, what) in cases {
        let err = store.execute(&ctx, &Statement::command(sql)).await.unwrap_err();
        let ok = match what {
            "exists" => matches!(err, StoreError::TableExists(_)),
            "missing" => matches!(err, StoreError::TableNotFound(_)),
            "column" => matches!(err, StoreError::ColumnNotFound(_, _)),
            "type" => matches!(err, StoreError::TypeMismatch(_)),
            "not null" => matches!(err, StoreError::ConstraintViolation(_)),
            "parse" => matches!(err, StoreError::Parse(_)),
            _ => matches!(err, StoreError::Unsupported(_)),
        };
        assert!(ok, "{}: unexpected {:?}", sql, err);
    }
    Ok(())
}

#[tokio::test]
async fn test_transaction_rollback_and_commit() -> StoreResult<()> {
    let (store, ctx) = store_with_rows().await?;

    let mut tx = store.begin(&ctx).await?;
    tx.execute(&ctx, &Statement::command("DELETE FROM db1.t1")).await?;
    let inside = tx
        .execute(&ctx, &Statement::query("SELECT userID FROM db1.t1"))
        .await?;
    assert!(inside.is_empty());
    tx.rollback().await?;

    let count = store
        .execute(&ctx, &Statement::query("SELECT userID FROM db1.t1"))
        .await?
        .row_count();
    assert_eq!(count, 5);

    let mut tx: Box<dyn StoreTransaction> = store.begin(&ctx).await?;
    tx.execute(&ctx, &Statement::command("DELETE FROM db1.t1 WHERE userID > $1").bind(3i64))
        .await?;
    tx.commit(&ctx).await?;

    let rest = store
        .execute(&ctx, &Statement::query("SELECT userID FROM db1.t1 ORDER BY userID"))
        .await?;
    assert_eq!(ints(&rest), vec![1, 2, 3]);
    Ok(())
}

#[tokio::test]
async fn test_canceled_context() -> StoreResult<()> {
    let (store, ctx) = store_with_rows().await?;
    let (canceled, handle) = ctx.cancellable();
    handle.cancel();

    let err = store
        .execute(&canceled, &Statement::query("SELECT * FROM db1.t1"))
        .await
        .unwrap_err();
    assert_eq!(err, StoreError::Canceled);
    Ok(())
}

#[tokio::test]
async fn test_expired_deadline() -> StoreResult<()> {
    let (store, _) = store_with_rows().await?;
    let ctx = CallContext::with_timeout(Duration::from_millis(1));
    tokio::time::sleep(Duration::from_millis(5)).await;

    let err = store
        .execute(&ctx, &Statement::query("SELECT * FROM db1.t1"))
        .await
        .unwrap_err();
    assert_eq!(err, StoreError::DeadlineExceeded);
    Ok(())
}
