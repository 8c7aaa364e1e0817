//! Structural validation for descriptors and descriptor sets.
//!
//! Per-table checks run when a [`TableDescriptor`] is built; set-level checks
//! ([`validate_database`]) run when a database assembles its full table set,
//! before anything touches the engine. Both fail hard: an invalid declaration
//! is a programmer error, not a runtime condition.

use crate::error::{DescriptorError, Result};
use crate::types::{ColumnSpec, SqlType, TableDescriptor};

/// Validates a single table's column declarations.
///
/// Enforced invariants:
/// - no duplicate column names;
/// - at most one primary-key column;
/// - zero or one autoincrement column, which must also be the primary key
///   and must resolve to INTEGER.
pub(crate) fn validate_columns(table: &str, columns: &[ColumnSpec]) -> Result<()> {
    let mut seen = std::collections::HashSet::new();
    for col in columns {
        if !seen.insert(col.name.as_str()) {
            return Err(DescriptorError::DuplicateColumn {
                table: table.to_string(),
                column: col.name.clone(),
            });
        }
    }

    if columns.iter().filter(|c| c.primary_key).count() > 1 {
        return Err(DescriptorError::MultiplePrimaryKeys {
            table: table.to_string(),
        });
    }

    let auto: Vec<&ColumnSpec> = columns.iter().filter(|c| c.autoincrement).collect();
    if auto.len() > 1 {
        return Err(DescriptorError::MultipleAutoIncrement {
            table: table.to_string(),
        });
    }
    if let Some(col) = auto.first() {
        if !col.primary_key {
            return Err(DescriptorError::AutoIncrementWithoutPrimaryKey {
                table: table.to_string(),
                column: col.name.clone(),
            });
        }
        if col.sql_type() != SqlType::Integer {
            return Err(DescriptorError::AutoIncrementNotInteger {
                table: table.to_string(),
                column: col.name.clone(),
            });
        }
    }

    Ok(())
}

/// Validates a full descriptor set before it is bound to a database.
///
/// Checks that no two descriptors share a table name and that every foreign
/// key points at a table in the set whose target column is declared either
/// `primary_key` or `unique`.
///
/// # Errors
///
/// Returns the first [`DescriptorError`] found; the set is checked in
/// declaration order.
///
/// # Examples
///
/// ```
/// use rowmap_core::{ColumnSpec, FieldKind, ForeignKeySpec, TableDescriptor, validate_database};
///
/// let users = TableDescriptor::builder("users")
///     .column(ColumnSpec::new("id", FieldKind::Int64).primary_key())
///     .build()
///     .unwrap();
/// let posts = TableDescriptor::builder("posts")
///     .column(ColumnSpec::new("id", FieldKind::Int64).primary_key())
///     .column(ColumnSpec::new("author_id", FieldKind::Int64)
///         .references(ForeignKeySpec::to("users", "id")))
///     .build()
///     .unwrap();
///
/// assert!(validate_database(&[users, posts]).is_ok());
/// ```
pub fn validate_database(descriptors: &[TableDescriptor]) -> Result<()> {
    let mut names = std::collections::HashSet::new();
    for desc in descriptors {
        if !names.insert(desc.table.as_str()) {
            return Err(DescriptorError::DuplicateTable(desc.table.clone()));
        }
    }

    for desc in descriptors {
        for col in &desc.columns {
            let Some(fk) = &col.foreign_key else {
                continue;
            };
            let Some(target) = descriptors.iter().find(|d| d.table == fk.target_table) else {
                return Err(DescriptorError::UnknownForeignKeyTable {
                    table: desc.table.clone(),
                    column: col.name.clone(),
                    target: fk.target_table.clone(),
                });
            };
            let Some(target_col) = target.column(&fk.target_column) else {
                return Err(DescriptorError::UnknownForeignKeyColumn {
                    table: desc.table.clone(),
                    column: col.name.clone(),
                    target_table: fk.target_table.clone(),
                    target_column: fk.target_column.clone(),
                });
            };
            if !target_col.primary_key && !target_col.unique {
                return Err(DescriptorError::ForeignKeyTargetNotUnique {
                    target_table: fk.target_table.clone(),
                    target_column: fk.target_column.clone(),
                });
            }
        }
    }

    Ok(())
}
