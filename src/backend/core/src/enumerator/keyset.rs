//! Keyset (seek) query fragments for SQL-backed [`PagedSource`](super::PagedSource)s.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::cursor::{self, CursorValue};
use crate::error::{ErrorCode, ResumableError, Result};

// ═══════════════════════════════════════════════════════════════════════════════
// Sort Direction
// ═══════════════════════════════════════════════════════════════════════════════

/// Key order of a paged source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    /// Ascending order (oldest first).
    #[default]
    Asc,
    /// Descending order (newest first).
    Desc,
}

impl SortDirection {
    /// Get the SQL keyword for this direction.
    pub fn sql_keyword(&self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }

    /// Get the comparison operator for "after" queries.
    pub fn after_operator(&self) -> &'static str {
        match self {
            Self::Asc => ">",
            Self::Desc => "<",
        }
    }
}

impl fmt::Display for SortDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Asc => write!(f, "asc"),
            Self::Desc => write!(f, "desc"),
        }
    }
}

/// A column used for ordering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortField {
    pub name: String,
    pub direction: SortDirection,
}

impl SortField {
    pub fn new(name: impl Into<String>, direction: SortDirection) -> Self {
        Self {
            name: name.into(),
            direction,
        }
    }

    pub fn order_by_clause(&self) -> String {
        format!("{} {}", self.name, self.direction.sql_keyword())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Keyset Query
// ═══════════════════════════════════════════════════════════════════════════════

/// Builds `ORDER BY` and seek predicates from an ordering-key cursor.
///
/// A single-column key uses a scalar cursor; a composite key uses a list
/// cursor with one element per column. The seek uses the first column's
/// direction for the whole tuple, so composite keys should share one direction.
#[derive(Debug, Clone, Default)]
pub struct KeysetQuery {
    fields: Vec<SortField>,
}

impl KeysetQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn asc(mut self, name: impl Into<String>) -> Self {
        self.fields.push(SortField::new(name, SortDirection::Asc));
        self
    }

    pub fn desc(mut self, name: impl Into<String>) -> Self {
        self.fields.push(SortField::new(name, SortDirection::Desc));
        self
    }

    pub fn fields(&self) -> &[SortField] {
        &self.fields
    }

    /// Generate the ORDER BY clause.
    pub fn order_by_clause(&self) -> String {
        self.fields
            .iter()
            .map(SortField::order_by_clause)
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Split a cursor into one value per key column.
    pub fn key_values(&self, cursor: &CursorValue) -> Result<Vec<CursorValue>> {
        let values = match (self.fields.len(), cursor) {
            (1, CursorValue::List(items)) if items.len() == 1 => items.clone(),
            (1, scalar) if !matches!(scalar, CursorValue::List(_) | CursorValue::Map(_)) => {
                vec![scalar.clone()]
            }
            (n, CursorValue::List(items)) if items.len() == n => items.clone(),
            (n, other) => {
                return Err(ResumableError::invalid_cursor(
                    "keyset query",
                    &format!("a key with {} column(s)", n),
                    other.type_name(),
                ))
            }
        };
        Ok(values)
    }

    /// Generate a WHERE predicate for seeking strictly after `cursor`.
    ///
    /// Placeholders are numbered from `params_offset + 1`.
    pub fn seek_predicate(
        &self,
        cursor: &CursorValue,
        params_offset: usize,
    ) -> Result<(String, Vec<CursorValue>)> {
        let first = self.fields.first().ok_or_else(|| {
            ResumableError::new(ErrorCode::InvalidArgument, "Keyset query has no key columns")
        })?;
        let values = self.key_values(cursor)?;
        let operator = first.direction.after_operator();

        let placeholders: Vec<String> = (0..values.len())
            .map(|i| format!("${}", params_offset + i + 1))
            .collect();

        if values.len() == 1 {
            return Ok((format!("{} {} {}", first.name, operator, placeholders[0]), values));
        }

        let names: Vec<&str> = self.fields.iter().map(|f| f.name.as_str()).collect();
        let clause = format!(
            "({}) {} ({})",
            names.join(", "),
            operator,
            placeholders.join(", ")
        );
        Ok((clause, values))
    }

    /// Build a full page query against `table`.
    pub fn page_sql(
        &self,
        table: &str,
        after: Option<&CursorValue>,
        limit: usize,
    ) -> Result<(String, Vec<CursorValue>)> {
        let (predicate, values) = match after {
            Some(cursor) if !cursor.is_null() => {
                let (clause, values) = self.seek_predicate(cursor, 0)?;
                (format!(" WHERE {}", clause), values)
            }
            _ => (String::new(), Vec::new()),
        };

        let sql = format!(
            "SELECT * FROM {}{} ORDER BY {} LIMIT {}",
            table,
            predicate,
            self.order_by_clause(),
            limit
        );
        Ok((sql, values))
    }

    /// Extract the ordering key of a serializable record.
    pub fn key_for<T: Serialize>(&self, record: &T) -> Result<CursorValue> {
        let json = serde_json::to_value(record)?;
        let mut values = Vec::with_capacity(self.fields.len());

        for field in &self.fields {
            let value = json.get(&field.name).ok_or_else(|| {
                ResumableError::new(
                    ErrorCode::SerializationError,
                    format!("Record has no key column '{}'", field.name),
                )
            })?;
            values.push(cursor::from_json(value)?);
        }

        if values.len() == 1 {
            Ok(values.remove(0))
        } else {
            Ok(CursorValue::List(values))
        }
    }
}
