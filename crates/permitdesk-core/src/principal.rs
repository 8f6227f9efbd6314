use serde::{Deserialize, Serialize};

/// Role value granting administrative access.
pub const ROLE_ADMIN: &str = "admin";

/// An authenticated user, as stored in the `users` table.
///
/// Credentials are never part of this record, so a cached principal cannot
/// leak a password.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    /// Unique user code (the token subject).
    pub code: String,
    /// Display name.
    pub name: String,
    pub role: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    /// Job title.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

impl Principal {
    pub fn new(code: impl Into<String>, name: impl Into<String>, role: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            name: name.into(),
            role: role.into(),
            phone: None,
            position: None,
            email: None,
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role.eq_ignore_ascii_case(ROLE_ADMIN)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_ignores_unknown_columns() {
        let principal: Principal = serde_json::from_value(serde_json::json!({
            "code": "u42",
            "name": "Ana",
            "role": "employee",
            "password": "secret",
            "phone": null
        }))
        .unwrap();

        assert_eq!(principal.code, "u42");
        assert_eq!(principal.phone, None);
        assert!(!principal.is_admin());
        assert!(!serde_json::to_string(&principal).unwrap().contains("secret"));
    }

    #[test]
    fn test_is_admin() {
        assert!(Principal::new("a1", "Admin", "admin").is_admin());
        assert!(Principal::new("a2", "Admin", "ADMIN").is_admin());
        assert!(!Principal::new("e1", "Emp", "employee").is_admin());
    }
}
