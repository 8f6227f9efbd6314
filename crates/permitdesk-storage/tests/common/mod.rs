//! Shared fixtures: a small users/permits schema on the memory backend.

#![allow(dead_code)]

use std::sync::Arc;

use permitdesk_db_memory::{MemoryConnector, MemoryDatabase, MemoryOptions, MemoryOutput};
use permitdesk_storage::{DbError, PoolManager, QueryExecutor, Row};
use serde_json::Value;

pub const SELECT_USER: &str = "SELECT * FROM users WHERE code = ?";
pub const SELECT_USERS: &str = "SELECT code, name, role FROM users ORDER BY code";
pub const SELECT_USERS_BY_ROLE: &str = "SELECT code, name, role FROM users WHERE role = ?";
pub const UPDATE_PHONE: &str = "UPDATE users SET phone = ? WHERE code = ?";
pub const INSERT_PERMIT: &str = "INSERT INTO permits (holder, kind) VALUES (?, ?)";
pub const SELECT_PERMITS: &str = "SELECT id, holder, kind FROM permits";

pub fn user(code: &str, name: &str, role: &str) -> Row {
    Row::new()
        .with("code", code)
        .with("name", name)
        .with("role", role)
        .with("phone", Value::Null)
}

/// Seeds two users and registers every statement the tests use.
///
/// `INSERT_PERMIT` rejects an empty `kind` with a not-null violation.
pub fn permits_db() -> Arc<MemoryDatabase> {
    let db = MemoryDatabase::new();
    db.seed(
        "users",
        [user("u1", "Ana", "admin"), user("u2", "Bo", "inspector")],
    );

    db.on(SELECT_USER, |tables, params| {
        let found = tables
            .get("users")
            .into_iter()
            .flatten()
            .filter(|row| row.get("code") == params.first())
            .cloned();
        Ok(MemoryOutput::rows(found))
    });
    db.on(SELECT_USERS, |tables, _| {
        Ok(MemoryOutput::rows(
            tables.get("users").cloned().unwrap_or_default(),
        ))
    });
    db.on(SELECT_USERS_BY_ROLE, |tables, params| {
        let found = tables
            .get("users")
            .into_iter()
            .flatten()
            .filter(|row| row.get("role") == params.first())
            .cloned();
        Ok(MemoryOutput::rows(found))
    });
    db.on(UPDATE_PHONE, |tables, params| {
        let mut updated = 0;
        for row in tables.entry("users".into()).or_default() {
            if row.get("code") == params.get(1) {
                row.insert("phone", params[0].clone());
                updated += 1;
            }
        }
        Ok(MemoryOutput::affected(updated))
    });
    db.on(INSERT_PERMIT, |tables, params| {
        if params.get(1).and_then(Value::as_str).is_none_or(str::is_empty) {
            return Err(DbError::statement_failed_with_code(
                "null value in column \"kind\" violates not-null constraint",
                "23502",
            ));
        }
        let permits = tables.entry("permits".into()).or_default();
        let id = permits.len() as i64 + 1;
        permits.push(
            Row::new()
                .with("id", id)
                .with("holder", params[0].clone())
                .with("kind", params[1].clone()),
        );
        Ok(MemoryOutput::inserted(id))
    });
    db.on(SELECT_PERMITS, |tables, _| {
        Ok(MemoryOutput::rows(
            tables.get("permits").cloned().unwrap_or_default(),
        ))
    });

    db
}

pub fn manager(db: &Arc<MemoryDatabase>) -> Arc<PoolManager> {
    Arc::new(PoolManager::new(Arc::new(MemoryConnector::new(Arc::clone(
        db,
    )))))
}

pub fn manager_with(db: &Arc<MemoryDatabase>, options: MemoryOptions) -> Arc<PoolManager> {
    Arc::new(PoolManager::new(Arc::new(MemoryConnector::with_options(
        Arc::clone(db),
        options,
    ))))
}

pub fn executor(db: &Arc<MemoryDatabase>) -> QueryExecutor {
    QueryExecutor::new(manager(db))
}
