//! SQL values and rows as they travel from the source to the target.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime};
use uuid::Uuid;

use super::identifier::quote_literal;

/// A single column value read from the source.
///
/// Types without a dedicated variant (numeric, json, enums, arrays, ...) are
/// carried in their PostgreSQL text form and cast back on write.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Bool(bool),
    I16(i16),
    I32(i32),
    I64(i64),
    F32(f32),
    F64(f64),
    Text(String),
    Bytes(Vec<u8>),
    Uuid(Uuid),
    DateTime(NaiveDateTime),
    DateTimeOffset(DateTime<FixedOffset>),
    Date(NaiveDate),
    Time(NaiveTime),
}

impl SqlValue {
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null)
    }

    /// Integer view of the value, used for sequence arithmetic.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            SqlValue::I16(n) => Some(i64::from(*n)),
            SqlValue::I32(n) => Some(i64::from(*n)),
            SqlValue::I64(n) => Some(*n),
            SqlValue::Text(s) => s.parse().ok(),
            _ => None,
        }
    }

    /// Render the value as a SQL literal for use inside a WHERE clause.
    pub fn to_sql_literal(&self) -> String {
        match self {
            SqlValue::Null => "NULL".to_string(),
            SqlValue::Bool(b) => if *b { "TRUE" } else { "FALSE" }.to_string(),
            SqlValue::I16(n) => n.to_string(),
            SqlValue::I32(n) => n.to_string(),
            SqlValue::I64(n) => n.to_string(),
            SqlValue::F32(n) => format!("'{}'::real", n),
            SqlValue::F64(n) => format!("'{}'::double precision", n),
            SqlValue::Text(s) => quote_literal(s),
            SqlValue::Bytes(b) => format!("'\\x{}'::bytea", hex::encode(b)),
            SqlValue::Uuid(u) => format!("'{}'::uuid", u),
            SqlValue::DateTime(dt) => {
                format!("'{}'::timestamp", dt.format("%Y-%m-%d %H:%M:%S%.6f"))
            }
            SqlValue::DateTimeOffset(dt) => format!("'{}'::timestamptz", dt.to_rfc3339()),
            SqlValue::Date(d) => format!("'{}'::date", d),
            SqlValue::Time(t) => format!("'{}'::time", t),
        }
    }

    /// Render the value in PostgreSQL text input format for a bound parameter.
    ///
    /// Every parameter is sent as text and cast to the column type server side.
    pub fn to_text_param(&self) -> Option<String> {
        match self {
            SqlValue::Null => None,
            SqlValue::Bool(b) => Some(if *b { "t" } else { "f" }.to_string()),
            SqlValue::I16(n) => Some(n.to_string()),
            SqlValue::I32(n) => Some(n.to_string()),
            SqlValue::I64(n) => Some(n.to_string()),
            SqlValue::F32(n) => Some(n.to_string()),
            SqlValue::F64(n) => Some(n.to_string()),
            SqlValue::Text(s) => Some(s.clone()),
            SqlValue::Bytes(b) => Some(format!("\\x{}", hex::encode(b))),
            SqlValue::Uuid(u) => Some(u.to_string()),
            SqlValue::DateTime(dt) => Some(dt.format("%Y-%m-%d %H:%M:%S%.6f").to_string()),
            SqlValue::DateTimeOffset(dt) => Some(dt.to_rfc3339()),
            SqlValue::Date(d) => Some(d.to_string()),
            SqlValue::Time(t) => Some(t.to_string()),
        }
    }
}

impl fmt::Display for SqlValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_sql_literal())
    }
}

impl From<bool> for SqlValue {
    fn from(v: bool) -> Self {
        SqlValue::Bool(v)
    }
}

impl From<i32> for SqlValue {
    fn from(v: i32) -> Self {
        SqlValue::I32(v)
    }
}

impl From<i64> for SqlValue {
    fn from(v: i64) -> Self {
        SqlValue::I64(v)
    }
}

impl From<&str> for SqlValue {
    fn from(v: &str) -> Self {
        SqlValue::Text(v.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(v: String) -> Self {
        SqlValue::Text(v)
    }
}

impl From<Uuid> for SqlValue {
    fn from(v: Uuid) -> Self {
        SqlValue::Uuid(v)
    }
}

impl<T: Into<SqlValue>> From<Option<T>> for SqlValue {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(SqlValue::Null)
    }
}

/// One row read from one table: column names shared across a page, values
/// positionally aligned with them.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    columns: Arc<[String]>,
    values: Vec<SqlValue>,
}

impl Row {
    pub fn new(columns: Arc<[String]>, values: Vec<SqlValue>) -> Self {
        debug_assert_eq!(columns.len(), values.len());
        Self { columns, values }
    }

    /// Build a row from `(column, value)` pairs.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<SqlValue>,
    {
        let (columns, values): (Vec<String>, Vec<SqlValue>) = pairs
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .unzip();
        Self {
            columns: columns.into(),
            values,
        }
    }

    /// Value of a column, `None` if the row has no such column.
    pub fn get(&self, column: &str) -> Option<&SqlValue> {
        self.columns
            .iter()
            .position(|c| c == column)
            .map(|idx| &self.values[idx])
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn values(&self) -> &[SqlValue] {
        &self.values
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &SqlValue)> {
        self.columns
            .iter()
            .map(String::as_str)
            .zip(self.values.iter())
    }
}

/// Identity of a row across a run: table name plus primary-key values sorted
/// by column name. Two rows with equal identity are the same row no matter
/// what their other columns hold.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RowIdentity {
    pub table: String,
    pub key: Vec<(String, String)>,
}

impl RowIdentity {
    /// Compute the identity of `row` keyed by `key_columns`.
    ///
    /// An empty key list means the table has no primary key; every column
    /// then takes part in the identity.
    pub fn of(table: &str, key_columns: &[String], row: &Row) -> Self {
        let mut key: Vec<(String, String)> = if key_columns.is_empty() {
            row.iter()
                .map(|(c, v)| (c.to_string(), v.to_sql_literal()))
                .collect()
        } else {
            key_columns
                .iter()
                .map(|c| {
                    let literal = row
                        .get(c)
                        .map(SqlValue::to_sql_literal)
                        .unwrap_or_else(|| "NULL".to_string());
                    (c.clone(), literal)
                })
                .collect()
        };
        key.sort();

        Self {
            table: table.to_string(),
            key,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_literals() {
        assert_eq!(SqlValue::I64(5).to_sql_literal(), "5");
        assert_eq!(SqlValue::from("it's").to_sql_literal(), "'it''s'");
        assert_eq!(SqlValue::Null.to_sql_literal(), "NULL");
        assert_eq!(
            SqlValue::Bytes(vec![0xde, 0xad]).to_sql_literal(),
            "'\\xdead'::bytea"
        );
    }

    #[test]
    fn test_text_params() {
        assert_eq!(SqlValue::Bool(true).to_text_param().as_deref(), Some("t"));
        assert_eq!(SqlValue::Null.to_text_param(), None);
        assert_eq!(
            SqlValue::Bytes(vec![1, 2]).to_text_param().as_deref(),
            Some("\\x0102")
        );
    }

    #[test]
    fn test_row_lookup() {
        let row = Row::from_pairs([("id", SqlValue::I64(1)), ("name", "ada".into())]);
        assert_eq!(row.get("id"), Some(&SqlValue::I64(1)));
        assert_eq!(row.get("missing"), None);
        assert_eq!(row.columns(), &["id".to_string(), "name".to_string()]);
    }

    #[test]
    fn test_identity_ignores_non_key_columns() {
        let key = vec!["id".to_string()];
        let a = Row::from_pairs([("id", SqlValue::I64(1)), ("name", "a".into())]);
        let b = Row::from_pairs([("id", SqlValue::I64(1)), ("name", "b".into())]);
        assert_eq!(
            RowIdentity::of("users", &key, &a),
            RowIdentity::of("users", &key, &b)
        );
        assert_ne!(
            RowIdentity::of("users", &key, &a),
            RowIdentity::of("admins", &key, &a)
        );
    }

    #[test]
    fn test_identity_is_column_order_independent() {
        let key = vec!["b".to_string(), "a".to_string()];
        let row = Row::from_pairs([("a", SqlValue::I32(1)), ("b", SqlValue::I32(2))]);
        let identity = RowIdentity::of("pairs", &key, &row);
        assert_eq!(identity.key[0].0, "a");
        assert_eq!(identity.key[1].0, "b");
    }

    #[test]
    fn test_identity_without_primary_key_uses_all_columns() {
        let a = Row::from_pairs([("x", SqlValue::I32(1)), ("y", SqlValue::I32(2))]);
        let b = Row::from_pairs([("x", SqlValue::I32(1)), ("y", SqlValue::I32(3))]);
        assert_ne!(RowIdentity::of("t", &[], &a), RowIdentity::of("t", &[], &b));
    }
}
