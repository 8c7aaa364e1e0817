//! Descriptor type definitions for declared tables.
//!
//! This module defines the data model a code-generation front end produces
//! once per entity type: column specifications, foreign keys, reconciliation
//! policy flags, and the [`TableDescriptor`] that bundles them. The types are
//! designed for serialization with [`serde`] so descriptors can round-trip
//! through JSON for tooling and diagnostics.

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::validate::validate_columns;

/// Native column type classes of the target engine.
///
/// # Examples
///
/// ```
/// use rowmap_core::SqlType;
///
/// assert_eq!(SqlType::Integer.keyword(), "INTEGER");
/// assert_eq!(SqlType::Blob.keyword(), "BLOB");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SqlType {
    /// UTF-8 text.
    Text,
    /// 64-bit signed integer.
    Integer,
    /// 64-bit IEEE float.
    Real,
    /// Opaque byte string.
    Blob,
}

impl SqlType {
    /// Returns the DDL keyword for this type.
    pub fn keyword(self) -> &'static str {
        match self {
            SqlType::Text => "TEXT",
            SqlType::Integer => "INTEGER",
            SqlType::Real => "REAL",
            SqlType::Blob => "BLOB",
        }
    }
}

/// Semantic type of an entity field, driving the fixed type-inference table.
///
/// Booleans, integers of every width, and dates store as INTEGER; floats as
/// REAL; strings as TEXT; raw bytes and arbitrary serialized values as BLOB.
///
/// # Examples
///
/// ```
/// use rowmap_core::{FieldKind, SqlType};
///
/// assert_eq!(FieldKind::Bool.sql_type(), SqlType::Integer);
/// assert_eq!(FieldKind::Date.sql_type(), SqlType::Integer);
/// assert_eq!(FieldKind::Float64.sql_type(), SqlType::Real);
/// assert_eq!(FieldKind::Serialized.sql_type(), SqlType::Blob);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldKind {
    /// Boolean, stored as a nonzero INTEGER.
    Bool,
    /// 16-bit integer.
    Int16,
    /// 32-bit integer.
    Int32,
    /// 64-bit integer.
    Int64,
    /// 32-bit float.
    Float32,
    /// 64-bit float.
    Float64,
    /// UTF-8 string.
    Text,
    /// Timestamp, stored as epoch seconds.
    Date,
    /// Raw byte string.
    Bytes,
    /// Arbitrary value encoded through the generic serialization fallback.
    Serialized,
}

impl FieldKind {
    /// Resolves this field kind to its native column type.
    pub fn sql_type(self) -> SqlType {
        match self {
            FieldKind::Bool
            | FieldKind::Int16
            | FieldKind::Int32
            | FieldKind::Int64
            | FieldKind::Date => SqlType::Integer,
            FieldKind::Float32 | FieldKind::Float64 => SqlType::Real,
            FieldKind::Text => SqlType::Text,
            FieldKind::Bytes | FieldKind::Serialized => SqlType::Blob,
        }
    }
}

/// Foreign-key declaration on a column.
///
/// The target column must be declared `primary_key` or `unique` in the target
/// table; this is checked by [`validate_database`](crate::validate_database)
/// when the descriptor set is assembled.
///
/// # Examples
///
/// ```
/// use rowmap_core::ForeignKeySpec;
///
/// let fk = ForeignKeySpec::to("users", "id").cascade_on_delete();
/// assert_eq!(fk.target_table, "users");
/// assert!(fk.cascade_on_delete);
/// assert!(!fk.cascade_on_update);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForeignKeySpec {
    /// Table the key points at.
    pub target_table: String,
    /// Column in the target table.
    pub target_column: String,
    /// Delete child rows when the referenced row is deleted.
    pub cascade_on_delete: bool,
    /// Rewrite child rows when the referenced key changes.
    pub cascade_on_update: bool,
}

impl ForeignKeySpec {
    /// Creates a foreign key pointing at `table`.`column`.
    pub fn to(table: &str, column: &str) -> Self {
        Self {
            target_table: table.to_string(),
            target_column: column.to_string(),
            cascade_on_delete: false,
            cascade_on_update: false,
        }
    }

    /// Enables `ON DELETE CASCADE`.
    pub fn cascade_on_delete(mut self) -> Self {
        self.cascade_on_delete = true;
        self
    }

    /// Enables `ON UPDATE CASCADE`.
    pub fn cascade_on_update(mut self) -> Self {
        self.cascade_on_update = true;
        self
    }
}

/// Declared shape of one column.
///
/// Built with the chaining constructors; the resolved column type is the
/// explicit override when present, else the inference table keyed on
/// [`FieldKind`].
///
/// # Examples
///
/// ```
/// use rowmap_core::{ColumnSpec, FieldKind, SqlType};
///
/// let id = ColumnSpec::new("id", FieldKind::Int64).primary_key().autoincrement();
/// assert!(id.primary_key);
/// assert_eq!(id.sql_type(), SqlType::Integer);
///
/// let tag = ColumnSpec::new("tag", FieldKind::Serialized).with_type(SqlType::Text);
/// assert_eq!(tag.sql_type(), SqlType::Text);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnSpec {
    /// Declared column name.
    pub name: String,
    /// Semantic field type.
    pub kind: FieldKind,
    /// Explicit column-type override; wins over the inference table.
    pub type_override: Option<SqlType>,
    /// Whether this column is the primary key.
    pub primary_key: bool,
    /// Whether the engine assigns values on insert. Only meaningful with
    /// `primary_key`.
    pub autoincrement: bool,
    /// `UNIQUE` constraint.
    pub unique: bool,
    /// `NOT NULL` constraint.
    pub not_null: bool,
    /// Foreign-key declaration, if any.
    pub foreign_key: Option<ForeignKeySpec>,
}

impl ColumnSpec {
    /// Creates a column with the given name and field kind.
    pub fn new(name: &str, kind: FieldKind) -> Self {
        Self {
            name: name.to_string(),
            kind,
            type_override: None,
            primary_key: false,
            autoincrement: false,
            unique: false,
            not_null: false,
            foreign_key: None,
        }
    }

    /// Creates a column whose name is namespaced under a related table.
    ///
    /// Used when a column is inherited through a same-named base table and
    /// would otherwise collide: the resulting name is
    /// `<related>_ptr_<field>`.
    ///
    /// # Examples
    ///
    /// ```
    /// use rowmap_core::{ColumnSpec, FieldKind};
    ///
    /// let col = ColumnSpec::namespaced("accounts", "owner", FieldKind::Int64);
    /// assert_eq!(col.name, "accounts_ptr_owner");
    /// ```
    pub fn namespaced(related_table: &str, field: &str, kind: FieldKind) -> Self {
        Self::new(&format!("{related_table}_ptr_{field}"), kind)
    }

    /// Overrides the inferred column type.
    pub fn with_type(mut self, sql_type: SqlType) -> Self {
        self.type_override = Some(sql_type);
        self
    }

    /// Marks this column as the primary key.
    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self
    }

    /// Marks this column as engine-assigned on insert.
    pub fn autoincrement(mut self) -> Self {
        self.autoincrement = true;
        self
    }

    /// Adds a `UNIQUE` constraint.
    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    /// Adds a `NOT NULL` constraint.
    pub fn not_null(mut self) -> Self {
        self.not_null = true;
        self
    }

    /// Declares a foreign key on this column.
    pub fn references(mut self, fk: ForeignKeySpec) -> Self {
        self.foreign_key = Some(fk);
        self
    }

    /// Returns the resolved column type: the explicit override when present,
    /// else the inference table.
    pub fn sql_type(&self) -> SqlType {
        self.type_override.unwrap_or_else(|| self.kind.sql_type())
    }
}

/// Reconciliation policy flags for one table.
///
/// The default is fully managed: create the table when absent, add missing
/// columns, and drop undeclared ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TablePolicy {
    /// Create the table on first open when it does not exist.
    pub auto_create: bool,
    /// Add declared columns missing from the live table.
    pub auto_add_columns: bool,
    /// Drop live columns that are no longer declared.
    pub auto_delete_columns: bool,
}

impl Default for TablePolicy {
    fn default() -> Self {
        Self {
            auto_create: true,
            auto_add_columns: true,
            auto_delete_columns: true,
        }
    }
}

/// Immutable declared shape of one table.
///
/// Produced once per entity type, typically by a code-generation front end,
/// and consumed by the schema reconciler and the entity mapper. Column order
/// is significant for generated `CREATE TABLE` text but not for correctness.
///
/// # Examples
///
/// ```
/// use rowmap_core::{ColumnSpec, FieldKind, TableDescriptor};
///
/// let users = TableDescriptor::builder("users")
///     .column(ColumnSpec::new("id", FieldKind::Int64).primary_key().autoincrement())
///     .column(ColumnSpec::new("name", FieldKind::Text).not_null())
///     .build()
///     .unwrap();
///
/// assert_eq!(users.table, "users");
/// assert_eq!(users.primary_key().unwrap().name, "id");
/// assert!(!users.has_foreign_keys());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableDescriptor {
    /// Table name.
    pub table: String,
    /// Ordered column declarations.
    pub columns: Vec<ColumnSpec>,
    /// Reconciliation policy flags.
    pub policy: TablePolicy,
}

impl TableDescriptor {
    /// Starts building a descriptor for `table`.
    pub fn builder(table: &str) -> TableDescriptorBuilder {
        TableDescriptorBuilder {
            table: table.to_string(),
            columns: Vec::new(),
            policy: TablePolicy::default(),
        }
    }

    /// Returns the primary-key column, if one is declared.
    pub fn primary_key(&self) -> Option<&ColumnSpec> {
        self.columns.iter().find(|c| c.primary_key)
    }

    /// Looks up a column by name.
    pub fn column(&self, name: &str) -> Option<&ColumnSpec> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Returns `true` if any column declares a foreign key.
    pub fn has_foreign_keys(&self) -> bool {
        self.columns.iter().any(|c| c.foreign_key.is_some())
    }

    /// Returns declared column names in declaration order.
    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }
}

/// Builder for [`TableDescriptor`].
///
/// [`build`](Self::build) validates the declaration and fails hard on
/// structural errors; an invalid descriptor never reaches the database.
#[derive(Debug, Clone)]
pub struct TableDescriptorBuilder {
    table: String,
    columns: Vec<ColumnSpec>,
    policy: TablePolicy,
}

impl TableDescriptorBuilder {
    /// Appends a column declaration.
    pub fn column(mut self, column: ColumnSpec) -> Self {
        self.columns.push(column);
        self
    }

    /// Replaces the policy flags wholesale.
    pub fn policy(mut self, policy: TablePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Sets the auto-create flag.
    pub fn auto_create(mut self, enabled: bool) -> Self {
        self.policy.auto_create = enabled;
        self
    }

    /// Sets the auto-add-columns flag.
    pub fn auto_add_columns(mut self, enabled: bool) -> Self {
        self.policy.auto_add_columns = enabled;
        self
    }

    /// Sets the auto-delete-columns flag.
    pub fn auto_delete_columns(mut self, enabled: bool) -> Self {
        self.policy.auto_delete_columns = enabled;
        self
    }

    /// Validates the declaration and produces the descriptor.
    ///
    /// # Errors
    ///
    /// Returns a [`DescriptorError`](crate::DescriptorError) for duplicate
    /// column names, multiple primary keys, multiple autoincrement columns,
    /// autoincrement without primary key, or autoincrement on a non-INTEGER
    /// column.
    pub fn build(self) -> Result<TableDescriptor> {
        validate_columns(&self.table, &self.columns)?;
        Ok(TableDescriptor {
            table: self.table,
            columns: self.columns,
            policy: self.policy,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_inference_table() {
        assert_eq!(FieldKind::Bool.sql_type(), SqlType::Integer);
        assert_eq!(FieldKind::Int16.sql_type(), SqlType::Integer);
        assert_eq!(FieldKind::Int32.sql_type(), SqlType::Integer);
        assert_eq!(FieldKind::Int64.sql_type(), SqlType::Integer);
        assert_eq!(FieldKind::Date.sql_type(), SqlType::Integer);
        assert_eq!(FieldKind::Float32.sql_type(), SqlType::Real);
        assert_eq!(FieldKind::Float64.sql_type(), SqlType::Real);
        assert_eq!(FieldKind::Text.sql_type(), SqlType::Text);
        assert_eq!(FieldKind::Bytes.sql_type(), SqlType::Blob);
        assert_eq!(FieldKind::Serialized.sql_type(), SqlType::Blob);
    }

    #[test]
    fn test_type_override_wins() {
        let col = ColumnSpec::new("payload", FieldKind::Serialized).with_type(SqlType::Text);
        assert_eq!(col.sql_type(), SqlType::Text);
    }

    #[test]
    fn test_namespaced_column_name() {
        let col = ColumnSpec::namespaced("accounts", "owner", FieldKind::Int64);
        assert_eq!(col.name, "accounts_ptr_owner");
    }

    #[test]
    fn test_builder_produces_descriptor() {
        let desc = TableDescriptor::builder("users")
            .column(ColumnSpec::new("id", FieldKind::Int64).primary_key().autoincrement())
            .column(ColumnSpec::new("name", FieldKind::Text).not_null())
            .auto_delete_columns(false)
            .build()
            .unwrap();

        assert_eq!(desc.table, "users");
        assert_eq!(desc.column_names(), vec!["id", "name"]);
        assert_eq!(desc.primary_key().unwrap().name, "id");
        assert!(desc.policy.auto_create);
        assert!(!desc.policy.auto_delete_columns);
    }

    #[test]
    fn test_descriptor_json_round_trip() {
        let desc = TableDescriptor::builder("posts")
            .column(ColumnSpec::new("id", FieldKind::Int64).primary_key())
            .column(
                ColumnSpec::new("author_id", FieldKind::Int64)
                    .references(ForeignKeySpec::to("users", "id").cascade_on_delete()),
            )
            .build()
            .unwrap();

        let json = serde_json::to_string(&desc).unwrap();
        let restored: TableDescriptor = serde_json::from_str(&json).unwrap();
        assert_eq!(desc, restored);
    }
}
