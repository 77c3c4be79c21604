//! Table layout and SQL text for the weather table
//!
//! Column names and order come from [`Column::ALL`]. Timestamps are stored
//! as naive UTC.

use wxetl_core::{Column, ColumnKind, TableRef};

/// SQL flavour of a backend
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    MySql,
    Sqlite,
}

impl Dialect {
    pub fn quote(&self, ident: &str) -> String {
        match self {
            Dialect::MySql => format!("`{}`", ident),
            Dialect::Sqlite => format!("\"{}\"", ident),
        }
    }

    /// Schema-qualified, quoted table name
    pub fn qualified(&self, table: &TableRef) -> String {
        match table.schema() {
            Some(schema) => format!("{}.{}", self.quote(schema), self.quote(table.name())),
            None => self.quote(table.name()),
        }
    }

    pub fn column_type(&self, column: Column) -> &'static str {
        match (self, column.kind()) {
            (Dialect::MySql, ColumnKind::Text) => "VARCHAR(255)",
            (Dialect::MySql, ColumnKind::Timestamp) => "DATETIME",
            (Dialect::MySql, ColumnKind::Float) => "DOUBLE",
            (Dialect::Sqlite, ColumnKind::Text) => "TEXT",
            (Dialect::Sqlite, ColumnKind::Timestamp) => "DATETIME",
            (Dialect::Sqlite, ColumnKind::Float) => "REAL",
        }
    }

    pub fn create_table_sql(&self, table: &TableRef) -> String {
        let columns: Vec<String> = Column::ALL
            .iter()
            .map(|c| {
                let null = if c.is_nullable() { "NULL" } else { "NOT NULL" };
                format!("{} {} {}", self.quote(c.name()), self.column_type(*c), null)
            })
            .collect();
        format!(
            "CREATE TABLE IF NOT EXISTS {} ({})",
            self.qualified(table),
            columns.join(", ")
        )
    }

    /// `INSERT INTO t (cols) ` prefix; values are appended by the query builder
    pub fn insert_prefix(&self, table: &TableRef) -> String {
        let columns: Vec<String> = Column::ALL.iter().map(|c| self.quote(c.name())).collect();
        format!(
            "INSERT INTO {} ({}) ",
            self.qualified(table),
            columns.join(", ")
        )
    }

    pub fn select_keys_sql(&self, table: &TableRef) -> String {
        format!(
            "SELECT {}, {} FROM {}",
            self.quote(Column::City.name()),
            self.quote(Column::Timestamp.name()),
            self.qualified(table)
        )
    }

    pub fn delete_key_sql(&self, table: &TableRef) -> String {
        format!(
            "DELETE FROM {} WHERE {} = ? AND {} = ?",
            self.qualified(table),
            self.quote(Column::City.name()),
            self.quote(Column::Timestamp.name())
        )
    }

    pub fn drop_table_sql(&self, table: &TableRef) -> String {
        format!("DROP TABLE IF EXISTS {}", self.qualified(table))
    }
}
