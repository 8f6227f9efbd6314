//! Query executor behaviour on the memory backend.

mod common;

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use common::*;
use permitdesk_db_memory::MemoryOptions;
use permitdesk_storage::{DbError, QueryExecutor, QueryMode, QueryResult, Statement};
use serde_json::json;

fn insert_permit(holder: &str, kind: &str) -> Statement {
    Statement::mutate(INSERT_PERMIT, vec![json!(holder), json!(kind)])
}

#[tokio::test]
async fn test_single_row_found() {
    let db = permits_db();
    let executor = executor(&db);

    let row = executor
        .fetch_one(SELECT_USER, vec![json!("u1")])
        .await
        .unwrap()
        .expect("u1 exists");

    assert_eq!(row.get_str("name"), Some("Ana"));
    assert_eq!(row.get_str("role"), Some("admin"));
}

#[tokio::test]
async fn test_single_row_missing_is_a_miss() {
    let db = permits_db();
    let executor = executor(&db);

    let result = executor
        .execute(&Statement::new(
            SELECT_USER,
            vec![json!("missing")],
            QueryMode::SingleRow,
        ))
        .await
        .unwrap();

    assert_eq!(result, QueryResult::Row(None));
}

#[tokio::test]
async fn test_all_rows_in_order() {
    let db = permits_db();
    let executor = executor(&db);

    let rows = executor.fetch_all(SELECT_USERS, vec![]).await.unwrap();
    let codes: Vec<_> = rows.iter().filter_map(|r| r.get_str("code")).collect();

    assert_eq!(codes, vec!["u1", "u2"]);
}

#[tokio::test]
async fn test_insert_returns_id_and_update_returns_count() {
    let db = permits_db();
    let executor = executor(&db);

    let first = executor.execute(&insert_permit("u1", "hot-work")).await.unwrap();
    let second = executor.execute(&insert_permit("u2", "confined-space")).await.unwrap();
    assert_eq!(first, QueryResult::InsertId(1));
    assert_eq!(second, QueryResult::InsertId(2));

    let updated = executor
        .mutate(UPDATE_PHONE, vec![json!("555-0100"), json!("u2")])
        .await
        .unwrap();
    assert_eq!(updated, QueryResult::Affected(1));

    let none = executor
        .mutate(UPDATE_PHONE, vec![json!("555-0100"), json!("nobody")])
        .await
        .unwrap();
    assert_eq!(none, QueryResult::Affected(0));

    let u2 = db
        .table("users")
        .into_iter()
        .find(|r| r.get_str("code") == Some("u2"))
        .unwrap();
    assert_eq!(u2.get_str("phone"), Some("555-0100"));
}

#[tokio::test]
async fn test_failed_mutation_rolls_back_and_surfaces() {
    let db = permits_db();
    let executor = executor(&db);

    let err = executor.execute(&insert_permit("u1", "")).await.unwrap_err();

    match err {
        DbError::StatementFailed { code, .. } => assert_eq!(code.as_deref(), Some("23502")),
        other => panic!("expected StatementFailed, got {other:?}"),
    }
    assert!(db.table("permits").is_empty());
    assert_eq!(db.active_sessions(), 0);
}

#[tokio::test]
async fn test_atomic_batch_failure_persists_nothing() {
    let db = permits_db();
    let executor = executor(&db);

    let batch = [
        insert_permit("u1", "hot-work"),
        insert_permit("u1", ""),
        insert_permit("u2", "excavation"),
    ];
    let err = executor.execute_batch(&batch, true).await.unwrap_err();

    match &err {
        DbError::TransactionAborted { index, source } => {
            assert_eq!(*index, 1);
            assert!(matches!(**source, DbError::StatementFailed { .. }));
        }
        other => panic!("expected TransactionAborted, got {other:?}"),
    }
    assert!(db.table("permits").is_empty());
    // The third statement never ran.
    assert_eq!(db.executions(INSERT_PERMIT), 2);
    assert_eq!(db.active_sessions(), 0);
}

#[tokio::test]
async fn test_atomic_batch_results_in_input_order() {
    let db = permits_db();
    let executor = executor(&db);

    let batch = [
        insert_permit("u1", "hot-work"),
        Statement::fetch_all(SELECT_PERMITS, vec![]),
        insert_permit("u2", "excavation"),
        Statement::fetch_one(SELECT_USER, vec![json!("u2")]),
    ];
    let results = executor.execute_batch(&batch, true).await.unwrap();

    assert_eq!(results.len(), 4);
    assert_eq!(results[0], QueryResult::InsertId(1));
    // Reads inside the batch see the batch's own writes.
    assert_eq!(results[1].rows().len(), 1);
    assert_eq!(results[2], QueryResult::InsertId(2));
    assert_eq!(
        results[3].clone().into_row().and_then(|r| r.get_str("name").map(String::from)),
        Some("Bo".to_string())
    );
    assert_eq!(db.table("permits").len(), 2);
}

#[tokio::test]
async fn test_non_atomic_batch_keeps_earlier_statements() {
    let db = permits_db();
    let executor = executor(&db);

    let batch = [
        insert_permit("u1", "hot-work"),
        insert_permit("u1", ""),
        insert_permit("u2", "excavation"),
    ];
    let err = executor.execute_batch(&batch, false).await.unwrap_err();

    assert!(matches!(err, DbError::StatementFailed { .. }));
    assert_eq!(db.table("permits").len(), 1);
    assert_eq!(db.executions(INSERT_PERMIT), 2);
}

#[tokio::test]
async fn test_empty_batch_acquires_nothing() {
    let db = permits_db();
    let executor = executor(&db);

    assert!(executor.execute_batch(&[], true).await.unwrap().is_empty());
    assert_eq!(db.pool_creations(), 0);
}

#[tokio::test]
async fn test_unknown_statement_is_statement_failed() {
    let db = permits_db();
    let executor = executor(&db);

    let err = executor
        .fetch_all("SELECT * FROM nowhere", vec![])
        .await
        .unwrap_err();

    assert!(matches!(err, DbError::StatementFailed { .. }));
    assert!(!err.is_infrastructure());
}

#[tokio::test]
async fn test_connection_released_when_task_is_cancelled() {
    let db = permits_db();
    let pool = manager(&db);

    let task = {
        let pool = Arc::clone(&pool);
        tokio::spawn(async move {
            let mut conn = pool.acquire().await.into_result().unwrap();
            conn.begin().await.unwrap();
            conn.execute(INSERT_PERMIT, &[json!("u1"), json!("hot-work")])
                .await
                .unwrap();
            std::future::pending::<()>().await;
        })
    };

    while db.active_sessions() == 0 || db.executions(INSERT_PERMIT) == 0 {
        tokio::task::yield_now().await;
    }
    task.abort();
    assert!(task.await.unwrap_err().is_cancelled());

    assert_eq!(db.active_sessions(), 0);
    assert!(db.table("permits").is_empty());
    assert_eq!(pool.status().pool.unwrap().active(), 0);
}

#[tokio::test]
async fn test_pool_creation_failure_falls_back_to_direct() {
    let db = permits_db();
    db.faults.fail_pool_creation.store(true, Ordering::SeqCst);
    let executor = executor(&db);

    let rows = executor.fetch_all(SELECT_USERS, vec![]).await.unwrap();

    assert_eq!(rows.len(), 2);
    assert_eq!(db.direct_connections(), 1);
    let status = executor.pool().status();
    assert!(!status.initialized);
    assert_eq!(status.direct_acquires, 1);
}

#[tokio::test(start_paused = true)]
async fn test_exhausted_pool_falls_back_to_direct() {
    let db = permits_db();
    let pool = manager_with(
        &db,
        MemoryOptions {
            max_size: 1,
            acquire_timeout: Duration::from_millis(50),
        },
    );
    let executor = QueryExecutor::new(Arc::clone(&pool));

    let held = pool.acquire().await.into_result().unwrap();
    let rows = executor.fetch_all(SELECT_USERS, vec![]).await.unwrap();
    drop(held);

    assert_eq!(rows.len(), 2);
    assert_eq!(db.direct_connections(), 1);
    assert_eq!(pool.status().pooled_acquires, 1);
}

#[tokio::test]
async fn test_no_connection_at_all() {
    let db = permits_db();
    db.faults.fail_pool_creation.store(true, Ordering::SeqCst);
    db.faults.fail_direct.store(true, Ordering::SeqCst);
    let executor = executor(&db);

    let err = executor.fetch_all(SELECT_USERS, vec![]).await.unwrap_err();
    assert!(matches!(err, DbError::PoolUnavailable { .. }));

    let err = executor
        .execute_direct(&Statement::fetch_all(SELECT_USERS, vec![]))
        .await
        .unwrap_err();
    assert!(matches!(err, DbError::ConnectionUnavailable { .. }));
}

#[tokio::test]
async fn test_broken_pooled_read_retried_on_direct() {
    let db = permits_db();
    db.faults.break_pooled_sessions.store(true, Ordering::SeqCst);
    let executor = executor(&db);

    let result = executor
        .execute_or_direct(&Statement::fetch_one(SELECT_USER, vec![json!("u2")]))
        .await
        .unwrap();

    assert_eq!(result.into_row().unwrap().get_str("name"), Some("Bo"));
    assert_eq!(db.direct_connections(), 1);
}

#[tokio::test]
async fn test_broken_pooled_write_is_not_retried() {
    let db = permits_db();
    db.faults.break_pooled_sessions.store(true, Ordering::SeqCst);
    let executor = executor(&db);

    let err = executor
        .execute_or_direct(&insert_permit("u1", "hot-work"))
        .await
        .unwrap_err();

    assert!(matches!(err, DbError::ConnectionUnavailable { .. }));
    assert_eq!(db.direct_connections(), 0);
    assert!(db.table("permits").is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_first_use_builds_one_pool() {
    let db = permits_db();
    db.set_pool_creation_delay(Duration::from_millis(20));
    let executor = executor(&db);

    let handles: Vec<_> = (0..16)
        .map(|i| {
            let executor = executor.clone();
            tokio::spawn(async move {
                let code = if i % 2 == 0 { "u1" } else { "u2" };
                executor.fetch_one(SELECT_USER, vec![json!(code)]).await
            })
        })
        .collect();

    for handle in handles {
        assert!(handle.await.unwrap().unwrap().is_some());
    }

    assert_eq!(db.pool_creations(), 1);
    assert_eq!(db.direct_connections(), 0);
    assert_eq!(db.active_sessions(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_mutations_are_all_committed() {
    const INCREMENT: &str = "UPDATE counters SET n = n + 1 WHERE id = ?";

    let db = permits_db();
    db.seed(
        "counters",
        (0..8).map(|id| permitdesk_storage::Row::new().with("id", id).with("n", 0)),
    );
    db.on(INCREMENT, |tables, params| {
        let mut updated = 0;
        for row in tables.entry("counters".into()).or_default() {
            if row.get("id") == params.first() {
                let n = row.get_i64("n").unwrap_or(0);
                row.insert("n", n + 1);
                updated += 1;
            }
        }
        Ok(permitdesk_db_memory::MemoryOutput::affected(updated))
    });
    let executor = executor(&db);

    let handles: Vec<_> = (0..8)
        .map(|id| {
            let executor = executor.clone();
            tokio::spawn(async move {
                for _ in 0..200 {
                    let result = executor.mutate(INCREMENT, vec![json!(id)]).await.unwrap();
                    assert_eq!(result, QueryResult::Affected(1));
                }
            })
        })
        .collect();
    for handle in handles {
        handle.await.unwrap();
    }

    let total: i64 = db
        .table("counters")
        .iter()
        .filter_map(|row| row.get_i64("n"))
        .sum();
    assert_eq!(total, 8 * 200);
    assert_eq!(db.active_sessions(), 0);
}

#[tokio::test]
async fn test_closed_manager_rejects_work() {
    let db = permits_db();
    let executor = executor(&db);
    assert!(executor.pool().test_connection().await);

    executor.pool().close().await;

    let err = executor.fetch_all(SELECT_USERS, vec![]).await.unwrap_err();
    assert!(matches!(err, DbError::PoolUnavailable { .. }));
}
