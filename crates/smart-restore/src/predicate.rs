//! Row predicates and table expressions.
//!
//! A [`Predicate`] is rendered into the WHERE clause of a source query. User
//! predicates arrive as raw SQL fragments from `table:where` expressions;
//! the resolver and fanout build structured ones from row values so the
//! in-memory test sources can evaluate them without parsing SQL.

use std::collections::HashSet;
use std::fmt;

use crate::core::identifier::{quote_ident, validate_identifier};
use crate::core::{Row, SqlValue};
use crate::error::Result;

/// Filter applied to one table scan.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    /// Every row.
    All,

    /// Raw SQL fragment, evaluated by the source database as-is.
    Raw(String),

    /// `column IN (values)`.
    In { column: String, values: Vec<SqlValue> },

    /// Disjunction of conjunctions: a row matches when, for some entry, every
    /// `(column, value)` pair is equal.
    AnyOf(Vec<Vec<(String, SqlValue)>>),
}

impl Predicate {
    /// Build a predicate matching rows whose `filter` columns equal the `source`
    /// columns of any of `rows`.
    ///
    /// `pairs` holds `(filter column, row column)`. Rows where any row column is
    /// NULL or missing can never match and are dropped; duplicate tuples are
    /// collapsed. A single pair produces an `In` list, several pairs an `AnyOf`.
    pub fn matching(pairs: &[(String, String)], rows: &[Row]) -> Self {
        let mut seen = HashSet::new();
        let mut tuples: Vec<Vec<SqlValue>> = Vec::new();

        'rows: for row in rows {
            let mut tuple = Vec::with_capacity(pairs.len());
            for (_, row_column) in pairs {
                match row.get(row_column) {
                    Some(value) if !value.is_null() => tuple.push(value.clone()),
                    _ => continue 'rows,
                }
            }
            let key: Vec<String> = tuple.iter().map(SqlValue::to_sql_literal).collect();
            if seen.insert(key) {
                tuples.push(tuple);
            }
        }

        if let [(column, _)] = pairs {
            return Predicate::In {
                column: column.clone(),
                values: tuples.into_iter().flatten().collect(),
            };
        }

        Predicate::AnyOf(
            tuples
                .into_iter()
                .map(|tuple| {
                    pairs
                        .iter()
                        .map(|(column, _)| column.clone())
                        .zip(tuple)
                        .collect()
                })
                .collect(),
        )
    }

    /// True when the predicate can be decided as matching nothing without a query.
    pub fn is_empty(&self) -> bool {
        match self {
            Predicate::In { values, .. } => values.is_empty(),
            Predicate::AnyOf(tuples) => tuples.is_empty(),
            Predicate::All | Predicate::Raw(_) => false,
        }
    }

    /// Render as a SQL boolean expression.
    pub fn to_sql(&self) -> String {
        match self {
            Predicate::All => "TRUE".to_string(),
            Predicate::Raw(fragment) => format!("({})", fragment),
            Predicate::In { values, .. } if values.is_empty() => "FALSE".to_string(),
            Predicate::In { column, values } => {
                let list: Vec<String> = values.iter().map(SqlValue::to_sql_literal).collect();
                format!("{} IN ({})", quote_ident(column), list.join(", "))
            }
            Predicate::AnyOf(tuples) if tuples.is_empty() => "FALSE".to_string(),
            Predicate::AnyOf(tuples) => tuples
                .iter()
                .map(|tuple| {
                    let terms: Vec<String> = tuple
                        .iter()
                        .map(|(column, value)| {
                            format!("{} = {}", quote_ident(column), value.to_sql_literal())
                        })
                        .collect();
                    format!("({})", terms.join(" AND "))
                })
                .collect::<Vec<_>>()
                .join(" OR "),
        }
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_sql())
    }
}

/// A `table[:where-fragment]` expression from the command line.
#[derive(Debug, Clone, PartialEq)]
pub struct TableExpr {
    pub table: String,
    pub predicate: Predicate,
}

impl TableExpr {
    /// Parse `table[:where]`, splitting on the first `:`.
    ///
    /// A missing or blank fragment selects every row.
    pub fn parse(expr: &str) -> Result<Self> {
        let (table, fragment) = match expr.split_once(':') {
            Some((table, fragment)) => (table.trim(), fragment.trim()),
            None => (expr.trim(), ""),
        };
        validate_identifier(table)?;

        let predicate = if fragment.is_empty() {
            Predicate::All
        } else {
            Predicate::Raw(fragment.to_string())
        };

        Ok(Self {
            table: table.to_string(),
            predicate,
        })
    }
}

impl fmt::Display for TableExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.predicate {
            Predicate::All => write!(f, "{}", self.table),
            predicate => write!(f, "{}:{}", self.table, predicate),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pair(filter: &str, row: &str) -> (String, String) {
        (filter.to_string(), row.to_string())
    }

    #[test]
    fn test_parse_table_only() {
        let expr = TableExpr::parse("orders").unwrap();
        assert_eq!(expr.table, "orders");
        assert_eq!(expr.predicate, Predicate::All);
    }

    #[test]
    fn test_parse_splits_on_first_colon() {
        let expr = TableExpr::parse("events:created_at > '2024-01-01 10:00:00'").unwrap();
        assert_eq!(expr.table, "events");
        assert_eq!(
            expr.predicate,
            Predicate::Raw("created_at > '2024-01-01 10:00:00'".to_string())
        );
    }

    #[test]
    fn test_parse_blank_fragment_selects_all() {
        assert_eq!(TableExpr::parse("orders:  ").unwrap().predicate, Predicate::All);
        assert!(TableExpr::parse(":id = 1").is_err());
    }

    #[test]
    fn test_matching_single_column_dedups_and_skips_nulls() {
        let rows = vec![
            Row::from_pairs([("customer_id", SqlValue::I32(5))]),
            Row::from_pairs([("customer_id", SqlValue::I32(5))]),
            Row::from_pairs([("customer_id", SqlValue::Null)]),
            Row::from_pairs([("customer_id", SqlValue::I32(6))]),
        ];
        let predicate = Predicate::matching(&[pair("id", "customer_id")], &rows);
        assert_eq!(
            predicate,
            Predicate::In {
                column: "id".to_string(),
                values: vec![SqlValue::I32(5), SqlValue::I32(6)],
            }
        );
        assert_eq!(predicate.to_sql(), "\"id\" IN (5, 6)");
    }

    #[test]
    fn test_matching_composite_is_conjunction() {
        let rows = vec![
            Row::from_pairs([("order_id", SqlValue::I32(1)), ("line_no", SqlValue::I32(2))]),
            Row::from_pairs([("order_id", SqlValue::I32(3)), ("line_no", SqlValue::Null)]),
        ];
        let predicate = Predicate::matching(
            &[pair("order_id", "order_id"), pair("line_no", "line_no")],
            &rows,
        );
        assert_eq!(predicate.to_sql(), "(\"order_id\" = 1 AND \"line_no\" = 2)");
    }

    #[test]
    fn test_empty_predicates_render_false() {
        let predicate = Predicate::matching(&[pair("id", "customer_id")], &[]);
        assert!(predicate.is_empty());
        assert_eq!(predicate.to_sql(), "FALSE");
        assert_eq!(Predicate::AnyOf(vec![]).to_sql(), "FALSE");
        assert_eq!(Predicate::All.to_sql(), "TRUE");
        assert_eq!(Predicate::Raw("id = 1 OR id = 2".into()).to_sql(), "(id = 1 OR id = 2)");
    }
}
