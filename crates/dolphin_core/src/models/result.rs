//! Query result models.

use std::time::Duration;

use crate::error::DolphinError;

/// Text stored in a [`Row`] field when the server returned SQL NULL.
///
/// Rows hold every value as text, so NULL is a sentinel rather than an absent
/// value. Check [`Row::is_null`] before converting a field.
pub const NULL_SENTINEL: &str = "NULL";

/// Conversion from a field's text to a typed value.
///
/// Returns `None` when the text does not parse; never panics.
pub trait FromField: Sized {
    /// Parse the field text.
    fn from_field(text: &str) -> Option<Self>;
}

macro_rules! from_field_via_parse {
    ($($ty:ty),*) => {
        $(
            impl FromField for $ty {
                fn from_field(text: &str) -> Option<Self> {
                    text.trim().parse().ok()
                }
            }
        )*
    };
}

from_field_via_parse!(i32, i64, u32, u64, f32, f64);

impl FromField for bool {
    fn from_field(text: &str) -> Option<Self> {
        Some(matches!(text, "1" | "true" | "TRUE"))
    }
}

impl FromField for String {
    fn from_field(text: &str) -> Option<Self> {
        Some(text.to_string())
    }
}

/// A single result row. Field order matches the result's columns.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Row {
    /// Field values as text, [`NULL_SENTINEL`] for SQL NULL
    pub fields: Vec<String>,
}

impl Row {
    /// Create a row from its field values.
    pub fn new(fields: Vec<String>) -> Self {
        Self { fields }
    }

    /// Number of fields.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Check if the row has no fields.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Raw text of a field, including the NULL sentinel.
    pub fn raw(&self, index: usize) -> Option<&str> {
        self.fields.get(index).map(String::as_str)
    }

    /// Check if a field holds the NULL sentinel.
    pub fn is_null(&self, index: usize) -> bool {
        self.raw(index) == Some(NULL_SENTINEL)
    }

    /// Typed value of a field.
    ///
    /// `None` if the index is out of range, the field is NULL, or the text
    /// does not parse as `T`.
    pub fn get<T: FromField>(&self, index: usize) -> Option<T> {
        match self.raw(index) {
            Some(NULL_SENTINEL) | None => None,
            Some(text) => T::from_field(text),
        }
    }
}

/// Outcome of executing one statement.
///
/// `success == true` implies `error_message` is empty. When `success` is false
/// the rows may be empty or partial and should not be trusted.
#[derive(Debug, Clone, Default)]
pub struct QueryResult {
    /// Column names in server order (not necessarily unique)
    pub columns: Vec<String>,
    /// Result rows
    pub rows: Vec<Row>,
    /// Rows affected, or rows returned for queries
    pub affected_rows: u64,
    /// Whether the statement succeeded
    pub success: bool,
    /// Error description, empty on success
    pub error_message: String,
    /// Time spent executing
    pub execution_time: Duration,
}

impl QueryResult {
    /// Create a failed result with the given message.
    pub fn failure(message: impl Into<String>) -> Self {
        Self { success: false, error_message: message.into(), ..Self::default() }
    }

    /// Get the number of rows returned.
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Get the number of columns.
    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    /// Check if the result is empty.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Index of the first column with the given name.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Check if a column with the given name exists.
    pub fn has_column(&self, name: &str) -> bool {
        self.column_index(name).is_some()
    }

    /// Typed value at `row`, looked up by column name.
    pub fn value<T: FromField>(&self, row: usize, column: &str) -> Option<T> {
        let index = self.column_index(column)?;
        self.rows.get(row)?.get(index)
    }

    /// Get execution time in milliseconds.
    pub fn execution_time_ms(&self) -> u64 {
        self.execution_time.as_millis() as u64
    }

    /// Turn a failed result into an error, keeping successful ones.
    pub fn into_result(self) -> Result<Self, DolphinError> {
        if self.success {
            Ok(self)
        } else {
            Err(DolphinError::query(self.error_message))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> QueryResult {
        QueryResult {
            columns: vec!["id".into(), "price".into(), "active".into(), "note".into()],
            rows: vec![Row::new(vec!["7".into(), "19.5".into(), "1".into(), NULL_SENTINEL.into()])],
            affected_rows: 1,
            success: true,
            ..QueryResult::default()
        }
    }

    #[test]
    fn test_typed_extraction() {
        let result = sample();
        assert_eq!(result.value::<i64>(0, "id"), Some(7));
        assert_eq!(result.value::<f64>(0, "price"), Some(19.5));
        assert_eq!(result.value::<bool>(0, "active"), Some(true));
        assert_eq!(result.value::<String>(0, "id").as_deref(), Some("7"));
    }

    #[test]
    fn test_null_sentinel_and_parse_failure_yield_none() {
        let result = sample();
        let row = &result.rows[0];
        assert!(row.is_null(3));
        assert_eq!(row.get::<String>(3), None);
        assert_eq!(row.raw(3), Some("NULL"));
        assert_eq!(row.get::<i32>(1), None);
        assert_eq!(row.get::<i32>(42), None);
        assert_eq!(result.value::<i32>(0, "missing"), None);
    }

    #[test]
    fn test_column_lookup_returns_first_duplicate() {
        let result = QueryResult {
            columns: vec!["a".into(), "b".into(), "a".into()],
            ..QueryResult::default()
        };
        assert_eq!(result.column_index("a"), Some(0));
        assert!(result.has_column("b"));
        assert!(!result.has_column("c"));
        assert_eq!(result.column_count(), 3);
    }

    #[test]
    fn test_into_result() {
        assert!(sample().into_result().is_ok());
        let err = QueryResult::failure("Query error: boom").into_result().unwrap_err();
        assert_eq!(err.to_string(), "Query error: boom");
    }
}
