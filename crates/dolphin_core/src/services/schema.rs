//! Schema introspection.
//!
//! Convenience queries over fixed SQL. Names interpolated into the statement
//! text are checked with [`SqlSanitizer::is_valid_identifier`] first, since
//! identifiers cannot be bound as parameters.

use crate::driver::Connector;
use crate::error::DolphinError;
use crate::models::schema::{ColumnDetail, IndexDetail};
use crate::models::QueryResult;
use crate::sanitizer::SqlSanitizer;
use crate::services::ConnectionWrapper;

impl<C: Connector> ConnectionWrapper<C> {
    /// List the schemas visible to the current user.
    pub fn databases(&self) -> Result<Vec<String>, DolphinError> {
        let result = self.query("SHOW DATABASES").into_result()?;
        Ok(first_column(result))
    }

    /// List tables in `database`, or in the current schema when `None`.
    pub fn tables(&self, database: Option<&str>) -> Result<Vec<String>, DolphinError> {
        let sql = match database {
            Some(database) => {
                self.ensure_identifier(database)?;
                format!("SHOW TABLES FROM `{database}`")
            }
            None => "SHOW TABLES".to_string(),
        };
        let result = self.query(&sql).into_result()?;
        Ok(first_column(result))
    }

    /// Raw `DESCRIBE` output for a table.
    pub fn table_structure(&self, table: &str) -> Result<QueryResult, DolphinError> {
        self.ensure_identifier(table)?;
        self.query(&format!("DESCRIBE `{table}`")).into_result()
    }

    /// Raw `SHOW INDEX` output for a table.
    pub fn table_indexes(&self, table: &str) -> Result<QueryResult, DolphinError> {
        self.ensure_identifier(table)?;
        self.query(&format!("SHOW INDEX FROM `{table}`")).into_result()
    }

    /// Typed column list for a table.
    pub fn table_columns(&self, table: &str) -> Result<Vec<ColumnDetail>, DolphinError> {
        let result = self.table_structure(table)?;
        Ok(ColumnDetail::from_describe(&result))
    }

    /// Typed index list for a table.
    pub fn table_index_details(&self, table: &str) -> Result<Vec<IndexDetail>, DolphinError> {
        let result = self.table_indexes(table)?;
        Ok(IndexDetail::from_show_index(&result))
    }

    /// Server version string, e.g. "8.0.36".
    pub fn server_version(&self) -> Result<String, DolphinError> {
        self.scalar("SELECT VERSION()")?
            .ok_or_else(|| DolphinError::query("Failed to read server version"))
    }

    /// Schema selected on the connection, `None` if there is none.
    pub fn current_database(&self) -> Result<Option<String>, DolphinError> {
        self.scalar("SELECT DATABASE()")
    }

    /// First field of the first row; `None` for no rows or SQL NULL.
    fn scalar(&self, sql: &str) -> Result<Option<String>, DolphinError> {
        let result = self.query(sql).into_result()?;
        Ok(result.rows.first().and_then(|row| row.get::<String>(0)))
    }

    fn ensure_identifier(&self, name: &str) -> Result<(), DolphinError> {
        if SqlSanitizer::is_valid_identifier(name) {
            return Ok(());
        }
        let err = DolphinError::validation(format!("Invalid identifier '{name}'"));
        self.log_error(&err.to_string());
        Err(err)
    }
}

fn first_column(result: QueryResult) -> Vec<String> {
    result
        .rows
        .into_iter()
        .filter_map(|row| row.fields.into_iter().next())
        .collect()
}
