//! Error types for the SQLite runtime.
//!
//! Provides a unified error type covering engine access, descriptor
//! validation, schema parsing, lifecycle, and mapping failures. Engine
//! errors (including unique/not-null/foreign-key constraint violations)
//! pass through wrapped but otherwise untouched, so callers can still
//! distinguish them from this crate's own error kinds.

use rowmap_core::DescriptorError;
use thiserror::Error;

/// Errors that can occur in the SQLite runtime.
#[derive(Debug, Error)]
pub enum StoreError {
    /// SQLite operation failure, constraint violations included.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Descriptor construction or set validation failure.
    #[error("descriptor error: {0}")]
    Descriptor(#[from] DescriptorError),

    /// A live `CREATE TABLE` statement could not be parsed.
    #[error("cannot parse schema for table `{table}`: {detail}")]
    SchemaParse { table: String, detail: String },

    /// A BLOB field's value could not be serialized.
    #[error("cannot serialize column `{column}`: {detail}")]
    Serialization { column: String, detail: String },

    /// A stored column value could not be decoded into the field's type.
    #[error("cannot decode column `{column}`: {detail}")]
    Deserialization { column: String, detail: String },

    /// An entity type was used against a database that never registered it.
    #[error("table `{0}` is not registered with this database")]
    UnregisteredEntity(String),

    /// A write was issued against a declared table that was never created
    /// because its policy disables auto-create.
    #[error("table `{0}` does not exist and auto-create is disabled")]
    TableNotCreated(String),

    /// An operation that needs a primary key ran against a table without one.
    #[error("table `{0}` declares no primary key")]
    MissingPrimaryKey(String),

    /// The stored schema version is newer than the declared one.
    #[error("stored schema version {stored} is newer than declared version {declared}")]
    VersionDowngrade { stored: i32, declared: i32 },

    /// The declared schema version is not a positive integer.
    #[error("declared schema version must be >= 1, got {0}")]
    InvalidVersion(i32),

    /// A lifecycle hook reported a failure.
    #[error("lifecycle hook failed: {0}")]
    Hook(String),
}

/// Convenience alias for results with [`StoreError`].
pub type Result<T> = std::result::Result<T, StoreError>;
