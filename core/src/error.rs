//! Error types for descriptor construction and validation.
//!
//! All descriptor problems are reported at construction time, never deferred
//! to first use against a live database.

use thiserror::Error;

/// Errors raised while building or validating table descriptors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DescriptorError {
    /// A table declares the same column name twice.
    #[error("table `{table}` declares duplicate column `{column}`")]
    DuplicateColumn { table: String, column: String },

    /// A table declares more than one primary-key column.
    #[error("table `{table}` declares more than one primary key column")]
    MultiplePrimaryKeys { table: String },

    /// A table declares more than one autoincrement column.
    #[error("table `{table}` declares more than one autoincrement column")]
    MultipleAutoIncrement { table: String },

    /// An autoincrement column is not also the primary key.
    #[error("column `{column}` in table `{table}` is autoincrement but not the primary key")]
    AutoIncrementWithoutPrimaryKey { table: String, column: String },

    /// An autoincrement column does not resolve to the INTEGER type.
    #[error("column `{column}` in table `{table}` is autoincrement but not INTEGER")]
    AutoIncrementNotInteger { table: String, column: String },

    /// Two descriptors in the same database set share a table name.
    #[error("duplicate table name `{0}` in database set")]
    DuplicateTable(String),

    /// A foreign key references a table that is not in the database set.
    #[error("column `{column}` in table `{table}` references unknown table `{target}`")]
    UnknownForeignKeyTable {
        table: String,
        column: String,
        target: String,
    },

    /// A foreign key references a column its target table does not declare.
    #[error(
        "column `{column}` in table `{table}` references unknown column \
         `{target_table}`.`{target_column}`"
    )]
    UnknownForeignKeyColumn {
        table: String,
        column: String,
        target_table: String,
        target_column: String,
    },

    /// A foreign key's target column is neither a primary key nor unique.
    #[error(
        "foreign key target `{target_table}`.`{target_column}` is neither a \
         primary key nor unique"
    )]
    ForeignKeyTargetNotUnique {
        target_table: String,
        target_column: String,
    },
}

/// Convenience alias for results with [`DescriptorError`].
pub type Result<T> = std::result::Result<T, DescriptorError>;
