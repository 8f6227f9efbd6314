//! User statements and their query-cache names.

use permitdesk_core::cache_key;
use permitdesk_storage::Statement;
use serde_json::json;

/// Every user listing is cached under this prefix, so one
/// `invalidate_matching` call drops them all.
pub const USERS_GROUP: &str = "users:";

pub const LIST_USERS: &str =
    "SELECT code, name, role, phone, position, email FROM users ORDER BY name";

pub const USERS_BY_ROLE: &str =
    "SELECT code, name, role, phone, position, email FROM users WHERE role = ? ORDER BY name";

pub const UPDATE_PHONE: &str = "UPDATE users SET phone = ? WHERE code = ?";

/// Cache name and statement for the full listing.
pub fn list_users() -> (String, Statement) {
    (
        cache_key("users", "list"),
        Statement::fetch_all(LIST_USERS, vec![]),
    )
}

/// Cache name and statement for the listing of one role.
pub fn users_by_role(role: &str) -> (String, Statement) {
    (
        cache_key("users:role", role),
        Statement::fetch_all(USERS_BY_ROLE, vec![json!(role)]),
    )
}

pub fn update_phone(code: &str, phone: &str) -> Statement {
    Statement::mutate(UPDATE_PHONE, vec![json!(phone), json!(code)])
}
