//! Core descriptor types and native value model for rowmap.
//!
//! This crate defines the engine-independent half of rowmap:
//!
//! - [`TableDescriptor`] — the declared shape of one table: columns, types,
//!   constraints, foreign keys, and reconciliation policy flags.
//! - [`ColumnSpec`] — a single column with its semantic [`FieldKind`],
//!   optional [`SqlType`] override, and constraints.
//! - [`Value`] — the native column value exchanged with the engine (NULL,
//!   INTEGER, REAL, TEXT, BLOB) plus the scalar encodings (bool as nonzero
//!   integer, timestamps as epoch seconds).
//! - [`validate_database`] — set-level validation run before a descriptor
//!   set is bound to a live database.
//!
//! Descriptors are immutable once built; a code-generation front end
//! produces one per entity type and the runtime crate consumes them.
//!
//! # Example
//!
//! ```
//! use rowmap_core::*;
//!
//! let users = TableDescriptor::builder("users")
//!     .column(ColumnSpec::new("id", FieldKind::Int64).primary_key().autoincrement())
//!     .column(ColumnSpec::new("name", FieldKind::Text).not_null())
//!     .column(ColumnSpec::new("joined", FieldKind::Date))
//!     .build()
//!     .unwrap();
//!
//! let posts = TableDescriptor::builder("posts")
//!     .column(ColumnSpec::new("id", FieldKind::Int64).primary_key().autoincrement())
//!     .column(ColumnSpec::new("author_id", FieldKind::Int64)
//!         .references(ForeignKeySpec::to("users", "id").cascade_on_delete()))
//!     .build()
//!     .unwrap();
//!
//! assert!(validate_database(&[users, posts]).is_ok());
//! ```

mod error;
mod types;
mod validate;
mod value;

pub use error::{DescriptorError, Result};
pub use types::{
    ColumnSpec, FieldKind, ForeignKeySpec, SqlType, TableDescriptor, TableDescriptorBuilder,
    TablePolicy,
};
pub use validate::validate_database;
pub use value::Value;
