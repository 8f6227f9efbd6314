//! Statement and result types shared by every backend.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Positional statement parameters, bound in order to `?` placeholders.
pub type Params = Vec<Value>;

/// One result row: column name to value, in the order the backend returned
/// the columns.
///
/// Backends decode each column into the closest JSON value (text, integer,
/// float, boolean, JSON, or `null`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Row(Map<String, Value>);

impl Row {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a column value, returning the row for chaining.
    #[must_use]
    pub fn with(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(column.into(), value.into());
        self
    }

    pub fn insert(&mut self, column: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(column.into(), value.into());
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.0.get(column)
    }

    pub fn get_str(&self, column: &str) -> Option<&str> {
        self.0.get(column).and_then(Value::as_str)
    }

    pub fn get_i64(&self, column: &str) -> Option<i64> {
        self.0.get(column).and_then(Value::as_i64)
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Decodes the row into a typed record by column name.
    ///
    /// # Errors
    ///
    /// Returns an error if a required column is missing or has the wrong type.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        T::deserialize(Value::Object(self.0.clone()))
    }

    #[must_use]
    pub fn into_map(self) -> Map<String, Value> {
        self.0
    }
}

impl From<Map<String, Value>> for Row {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Row {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

/// How a statement's result is shaped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryMode {
    /// Return the first row, or a miss when there is none.
    SingleRow,
    /// Return every row in order.
    AllRows,
    /// Run inside a transaction and report the insert id or affected rows.
    Mutating,
}

impl QueryMode {
    /// Returns `true` for modes that only read.
    #[must_use]
    pub fn is_read(self) -> bool {
        !matches!(self, Self::Mutating)
    }
}

/// A parameterized statement together with its result mode.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub sql: String,
    pub params: Params,
    pub mode: QueryMode,
}

impl Statement {
    pub fn new(sql: impl Into<String>, params: Params, mode: QueryMode) -> Self {
        Self {
            sql: sql.into(),
            params,
            mode,
        }
    }

    /// A single-row read.
    pub fn fetch_one(sql: impl Into<String>, params: Params) -> Self {
        Self::new(sql, params, QueryMode::SingleRow)
    }

    /// A multi-row read.
    pub fn fetch_all(sql: impl Into<String>, params: Params) -> Self {
        Self::new(sql, params, QueryMode::AllRows)
    }

    /// A write.
    pub fn mutate(sql: impl Into<String>, params: Params) -> Self {
        Self::new(sql, params, QueryMode::Mutating)
    }

    /// Returns `true` if the statement is an `INSERT`.
    #[must_use]
    pub fn is_insert(&self) -> bool {
        is_insert_sql(&self.sql)
    }
}

/// Returns `true` if `sql` starts with the `INSERT` keyword.
pub fn is_insert_sql(sql: &str) -> bool {
    sql.trim_start()
        .get(..6)
        .is_some_and(|head| head.eq_ignore_ascii_case("insert"))
}

/// Raw outcome of a write, as reported by a backend session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecOutcome {
    pub rows_affected: u64,
    /// Identifier generated by an insert, when the backend reports one.
    pub last_insert_id: Option<i64>,
}

/// Result of one executed statement, shaped by its [`QueryMode`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum QueryResult {
    /// Single-row read; `None` is a miss, not an error.
    Row(Option<Row>),
    /// Multi-row read.
    Rows(Vec<Row>),
    /// Insert that reported a generated identifier.
    InsertId(i64),
    /// Write reporting the number of affected rows.
    Affected(u64),
}

impl QueryResult {
    /// Shapes a write outcome: inserts with an id report the id, everything
    /// else reports the affected-row count.
    #[must_use]
    pub fn from_outcome(statement: &Statement, outcome: ExecOutcome) -> Self {
        match outcome.last_insert_id {
            Some(id) if statement.is_insert() => Self::InsertId(id),
            _ => Self::Affected(outcome.rows_affected),
        }
    }

    /// Returns the single row of a `Row` result (or the first row of `Rows`).
    #[must_use]
    pub fn into_row(self) -> Option<Row> {
        match self {
            Self::Row(row) => row,
            Self::Rows(rows) => rows.into_iter().next(),
            _ => None,
        }
    }

    /// Returns all rows of a read result; writes yield no rows.
    #[must_use]
    pub fn into_rows(self) -> Vec<Row> {
        match self {
            Self::Row(row) => row.into_iter().collect(),
            Self::Rows(rows) => rows,
            _ => Vec::new(),
        }
    }

    pub fn rows(&self) -> &[Row] {
        match self {
            Self::Row(Some(row)) => std::slice::from_ref(row),
            Self::Rows(rows) => rows,
            _ => &[],
        }
    }

    pub fn insert_id(&self) -> Option<i64> {
        match self {
            Self::InsertId(id) => Some(*id),
            _ => None,
        }
    }

    pub fn rows_affected(&self) -> Option<u64> {
        match self {
            Self::Affected(n) => Some(*n),
            Self::InsertId(_) => Some(1),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_row_field_access() {
        let row = Row::new()
            .with("code", "u42")
            .with("age", 37)
            .with("phone", Value::Null);

        assert_eq!(row.get_str("code"), Some("u42"));
        assert_eq!(row.get_i64("age"), Some(37));
        assert_eq!(row.get("phone"), Some(&Value::Null));
        assert_eq!(row.get("missing"), None);
        assert_eq!(row.len(), 3);
    }

    #[test]
    fn test_row_keeps_column_order() {
        let row = Row::new()
            .with("name", "Ana")
            .with("code", "u1")
            .with("role", "admin");

        assert_eq!(row.columns().collect::<Vec<_>>(), ["name", "code", "role"]);
        assert_eq!(
            serde_json::to_string(&row).unwrap(),
            r#"{"name":"Ana","code":"u1","role":"admin"}"#
        );
    }

    #[test]
    fn test_row_decode() {
        #[derive(Deserialize)]
        struct User {
            code: String,
            name: String,
        }

        let row: Row = [("code", json!("u1")), ("name", json!("Ana")), ("extra", json!(1))]
            .into_iter()
            .collect();
        let user: User = row.decode().unwrap();
        assert_eq!(user.code, "u1");
        assert_eq!(user.name, "Ana");

        let incomplete = Row::new().with("code", "u1");
        assert!(incomplete.decode::<User>().is_err());
    }

    #[test]
    fn test_is_insert_sql() {
        assert!(is_insert_sql("INSERT INTO users VALUES (?)"));
        assert!(is_insert_sql("  insert into users values (?)"));
        assert!(!is_insert_sql("UPDATE users SET name = ?"));
        assert!(!is_insert_sql("ins"));
    }

    #[test]
    fn test_result_shape_from_outcome() {
        let insert = Statement::mutate("INSERT INTO permits (code) VALUES (?)", vec![json!("u1")]);
        let update = Statement::mutate("UPDATE users SET phone = ?", vec![json!("555")]);
        let outcome = ExecOutcome {
            rows_affected: 1,
            last_insert_id: Some(7),
        };

        assert_eq!(QueryResult::from_outcome(&insert, outcome), QueryResult::InsertId(7));
        assert_eq!(QueryResult::from_outcome(&update, outcome), QueryResult::Affected(1));
        assert_eq!(
            QueryResult::from_outcome(&insert, ExecOutcome::default()),
            QueryResult::Affected(0)
        );
    }

    #[test]
    fn test_result_accessors() {
        let row = Row::new().with("code", "u1");
        assert_eq!(QueryResult::Row(Some(row.clone())).into_row(), Some(row.clone()));
        assert_eq!(QueryResult::Row(None).into_rows(), Vec::<Row>::new());
        assert_eq!(QueryResult::Rows(vec![row.clone()]).rows().len(), 1);
        assert_eq!(QueryResult::InsertId(3).insert_id(), Some(3));
        assert_eq!(QueryResult::Affected(2).rows_affected(), Some(2));
        assert_eq!(QueryResult::Rows(vec![]).rows_affected(), None);
    }
}
