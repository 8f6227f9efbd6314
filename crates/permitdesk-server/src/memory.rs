//! The `users` schema on the in-memory backend.
//!
//! Registers a handler for every statement the server issues and seeds the
//! table from configuration, so `storage.backend = "memory"` runs without a
//! database server.

use std::sync::Arc;

use permitdesk_auth::PRINCIPAL_BY_CODE;
use permitdesk_core::Principal;
use permitdesk_db_memory::{MemoryDatabase, MemoryOutput, Tables};
use permitdesk_storage::Row;
use serde_json::Value;

use crate::users::{LIST_USERS, UPDATE_PHONE, USERS_BY_ROLE};

const PRINCIPAL_COLUMNS: [&str; 6] = ["code", "name", "role", "phone", "position", "email"];

pub fn users_database(users: &[Principal]) -> Arc<MemoryDatabase> {
    let db = MemoryDatabase::new();
    db.seed("users", users.iter().filter_map(principal_row));

    db.on(PRINCIPAL_BY_CODE, |tables, params| {
        Ok(MemoryOutput::rows(select(tables, |row| {
            row.get("code") == params.first()
        })))
    });
    db.on(LIST_USERS, |tables, _| {
        Ok(MemoryOutput::rows(select(tables, |_| true)))
    });
    db.on(USERS_BY_ROLE, |tables, params| {
        Ok(MemoryOutput::rows(select(tables, |row| {
            row.get("role") == params.first()
        })))
    });
    db.on(UPDATE_PHONE, |tables, params| {
        let (phone, code) = (
            params.first().cloned().unwrap_or(Value::Null),
            params.get(1),
        );
        let mut affected = 0;
        for row in tables.entry("users".into()).or_default() {
            if row.get("code") == code {
                row.insert("phone", phone.clone());
                affected += 1;
            }
        }
        Ok(MemoryOutput::affected(affected))
    });

    db
}

fn principal_row(principal: &Principal) -> Option<Row> {
    match serde_json::to_value(principal) {
        Ok(Value::Object(map)) => Some(Row::from(map)),
        _ => None,
    }
}

/// Matching users, ordered by name, projected to the principal columns.
fn select(tables: &Tables, keep: impl Fn(&Row) -> bool) -> Vec<Row> {
    let mut rows: Vec<Row> = tables
        .get("users")
        .into_iter()
        .flatten()
        .filter(|row| keep(*row))
        .map(|row| {
            PRINCIPAL_COLUMNS
                .into_iter()
                .filter_map(|col| row.get(col).map(|v| (col, v.clone())))
                .collect::<Row>()
        })
        .collect();
    rows.sort_by(|a, b| a.get_str("name").cmp(&b.get_str("name")));
    rows
}
