use std::collections::BTreeMap;

use grantshift_core::{AppError, AppResult};
use serde::{Deserialize, Serialize};

/// One row returned by a metadata query.
///
/// Column names are lower-cased on insert and SQL `NULL` values are omitted,
/// so `get` returning `None` covers both a missing column and a null cell.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataRow {
    values: BTreeMap<String, String>,
}

impl MetadataRow {
    /// Creates an empty row.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a row from column/value pairs.
    #[must_use]
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let mut row = Self::new();
        for (column, value) in pairs {
            row.insert(column.as_ref(), value);
        }

        row
    }

    /// Sets a column value.
    pub fn insert(&mut self, column: &str, value: impl Into<String>) {
        self.values.insert(column.to_lowercase(), value.into());
    }

    /// Returns a column value.
    #[must_use]
    pub fn get(&self, column: &str) -> Option<&str> {
        self.values.get(&column.to_lowercase()).map(String::as_str)
    }

    /// Returns a column value or a validation error naming the missing column.
    pub fn require(&self, column: &str) -> AppResult<&str> {
        self.get(column).ok_or_else(|| {
            AppError::Validation(format!("metadata row is missing column '{column}'"))
        })
    }

    /// Iterates columns in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values
            .iter()
            .map(|(column, value)| (column.as_str(), value.as_str()))
    }

    /// Returns the number of non-null columns.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns true when the row has no non-null columns.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
