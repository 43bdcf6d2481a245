//! Units of work passed between the resolver, the orchestrator and the writer.

use std::collections::BTreeSet;

use super::value::Row;

/// One element of a write plan: rows of a single table, written together.
#[derive(Debug, Clone, PartialEq)]
pub struct WriteBatch {
    pub table: String,
    pub rows: Vec<Row>,
}

impl WriteBatch {
    pub fn new(table: impl Into<String>, rows: Vec<Row>) -> Self {
        Self {
            table: table.into(),
            rows,
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Tables still eligible as fanout targets along one recursion branch.
///
/// Sets are values: [`FanoutSet::without`] returns a new set for the
/// recursive call and leaves the caller's set untouched, so sibling branches
/// never see each other's removals.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FanoutSet(BTreeSet<String>);

impl FanoutSet {
    pub fn new<I, S>(tables: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(tables.into_iter().map(Into::into).collect())
    }

    pub fn contains(&self, table: &str) -> bool {
        self.0.contains(table)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Copy of this set with `table` removed.
    #[must_use]
    pub fn without(&self, table: &str) -> Self {
        let mut next = self.0.clone();
        next.remove(table);
        Self(next)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

impl<S: Into<String>> FromIterator<S> for FanoutSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self::new(iter)
    }
}
