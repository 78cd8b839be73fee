//! Schema introspection models.
//!
//! Typed views over the rows MySQL returns for `DESCRIBE` and `SHOW INDEX`.

use serde::{Deserialize, Serialize};

use crate::models::QueryResult;

/// A table column as reported by `DESCRIBE`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDetail {
    /// Column name.
    pub name: String,
    /// Data type (e.g., "int", "varchar(255)").
    pub data_type: String,
    /// Whether the column allows NULL values.
    pub is_nullable: bool,
    /// Whether this column is part of the primary key.
    pub is_primary_key: bool,
    /// Default value expression, if any.
    pub default_value: Option<String>,
    /// Extra attributes (e.g., "auto_increment").
    pub extra: String,
    /// Column position (1-based ordinal).
    pub ordinal_position: usize,
}

impl ColumnDetail {
    /// Build column details from a `DESCRIBE` result.
    ///
    /// Rows without a `Field` value are skipped.
    pub fn from_describe(result: &QueryResult) -> Vec<Self> {
        (0..result.row_count())
            .filter_map(|row| {
                let name = result.value::<String>(row, "Field")?;
                Some(Self {
                    name,
                    data_type: result.value(row, "Type").unwrap_or_default(),
                    is_nullable: result.value::<String>(row, "Null").as_deref() == Some("YES"),
                    is_primary_key: result.value::<String>(row, "Key").as_deref() == Some("PRI"),
                    default_value: result.value(row, "Default"),
                    extra: result.value(row, "Extra").unwrap_or_default(),
                    ordinal_position: row + 1,
                })
            })
            .collect()
    }
}

/// One column of an index as reported by `SHOW INDEX`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexDetail {
    /// Index name ("PRIMARY" for the primary key).
    pub name: String,
    /// Indexed column.
    pub column: String,
    /// Position of the column within the index (1-based).
    pub sequence: u32,
    /// Whether the index enforces uniqueness.
    pub is_unique: bool,
    /// Index structure (e.g., "BTREE").
    pub index_type: String,
}

impl IndexDetail {
    /// Build index details from a `SHOW INDEX` result.
    pub fn from_show_index(result: &QueryResult) -> Vec<Self> {
        (0..result.row_count())
            .filter_map(|row| {
                Some(Self {
                    name: result.value(row, "Key_name")?,
                    column: result.value(row, "Column_name")?,
                    sequence: result.value(row, "Seq_in_index").unwrap_or(1),
                    is_unique: result.value::<u32>(row, "Non_unique") == Some(0),
                    index_type: result.value(row, "Index_type").unwrap_or_default(),
                })
            })
            .collect()
    }

    /// Check if this is part of the primary key.
    pub fn is_primary(&self) -> bool {
        self.name == "PRIMARY"
    }
}
