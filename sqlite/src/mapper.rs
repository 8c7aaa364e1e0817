//! Entity mapping between typed objects and native rows.
//!
//! The [`Entity`] trait is the contract generated data-access code
//! implements: a static [`TableDescriptor`], field encoding into a [`Row`],
//! scalar decoding from a [`RowView`], and relationship resolution through
//! [`Link`] slots. Dispatch is fully static — a database resolves mappers
//! through the descriptor set it was opened with, never by runtime name
//! lookup.
//!
//! [`Dao`] provides the per-table operations: `save` (insert-or-update
//! decided by a `COUNT(*)` probe on the primary key), `fetch`/`find_where`
//! (row reconstruction through the identity cache), `delete`, and bulk
//! by-predicate variants that bypass the per-instance path. Queries pass
//! through verbatim; nothing here rewrites SQL.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::LazyLock;
//! use rowmap_core::{ColumnSpec, FieldKind, TableDescriptor, Value};
//! use rowmap_sqlite::{Database, DatabaseConfig, Entity, NoHooks, Result, Row, RowView};
//!
//! struct User {
//!     id: Option<i64>,
//!     name: String,
//! }
//!
//! static USERS: LazyLock<TableDescriptor> = LazyLock::new(|| {
//!     TableDescriptor::builder("users")
//!         .column(ColumnSpec::new("id", FieldKind::Int64).primary_key().autoincrement())
//!         .column(ColumnSpec::new("name", FieldKind::Text).not_null())
//!         .build()
//!         .expect("static descriptor is valid")
//! });
//!
//! impl Entity for User {
//!     fn descriptor() -> &'static TableDescriptor {
//!         &USERS
//!     }
//!     fn primary_key(&self) -> Option<Value> {
//!         self.id.map(Value::from)
//!     }
//!     fn to_row(&self) -> Result<Row> {
//!         let mut row = Row::new();
//!         if let Some(id) = self.id {
//!             row.set("id", id);
//!         }
//!         row.set("name", self.name.clone());
//!         Ok(row)
//!     }
//!     fn from_row(row: &RowView) -> Result<Self> {
//!         Ok(Self {
//!             id: row.get("id")?,
//!             name: row.get("name")?,
//!         })
//!     }
//! }
//!
//! let db = Database::open(
//!     DatabaseConfig::in_memory("app", 1),
//!     vec![User::descriptor().clone()],
//!     &NoHooks,
//! ).unwrap();
//! let users = db.dao::<User>().unwrap();
//! users.save(&User { id: None, name: "ada".into() }).unwrap();
//! ```

use std::fmt;
use std::marker::PhantomData;
use std::sync::{Arc, OnceLock};

use chrono::{DateTime, Utc};
use rowmap_core::{TableDescriptor, Value};
use rusqlite::Connection;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::warn;

use crate::cache::CacheKey;
use crate::ddl::quote_ident;
use crate::error::{Result, StoreError};
use crate::lifecycle::Database;

/// Converts a native value into the engine binding's value type.
pub(crate) fn to_sql_value(value: &Value) -> rusqlite::types::Value {
    match value {
        Value::Null => rusqlite::types::Value::Null,
        Value::Integer(i) => rusqlite::types::Value::Integer(*i),
        Value::Real(f) => rusqlite::types::Value::Real(*f),
        Value::Text(s) => rusqlite::types::Value::Text(s.clone()),
        Value::Blob(b) => rusqlite::types::Value::Blob(b.clone()),
    }
}

fn from_sql_value(value: rusqlite::types::Value) -> Value {
    match value {
        rusqlite::types::Value::Null => Value::Null,
        rusqlite::types::Value::Integer(i) => Value::Integer(i),
        rusqlite::types::Value::Real(f) => Value::Real(f),
        rusqlite::types::Value::Text(s) => Value::Text(s),
        rusqlite::types::Value::Blob(b) => Value::Blob(b),
    }
}

/// Runs a query and materializes every result row.
pub(crate) fn run_query(conn: &Connection, sql: &str, params: &[Value]) -> Result<Vec<RowView>> {
    let mut stmt = conn.prepare(sql)?;
    let columns: Vec<String> = stmt.column_names().iter().map(|s| s.to_string()).collect();
    let mut rows = stmt.query(rusqlite::params_from_iter(params.iter().map(to_sql_value)))?;
    let mut out = Vec::new();
    while let Some(row) = rows.next()? {
        let mut values = Vec::with_capacity(columns.len());
        for i in 0..columns.len() {
            values.push(from_sql_value(row.get::<_, rusqlite::types::Value>(i)?));
        }
        out.push(RowView {
            columns: columns.clone(),
            values,
        });
    }
    Ok(out)
}

/// Executes a statement and returns the affected row count.
pub(crate) fn run_execute(conn: &Connection, sql: &str, params: &[Value]) -> Result<usize> {
    let mut stmt = conn.prepare(sql)?;
    Ok(stmt.execute(rusqlite::params_from_iter(params.iter().map(to_sql_value)))?)
}

/// Column-to-value map produced by [`Entity::to_row`].
///
/// Columns a row never sets are omitted from the generated statement
/// entirely — an absent relationship reference, for instance, contributes
/// no value rather than an explicit NULL.
#[derive(Debug, Clone, Default)]
pub struct Row {
    values: Vec<(String, Value)>,
}

impl Row {
    /// Creates an empty row.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a column value, replacing any earlier value for the column.
    pub fn set(&mut self, column: impl Into<String>, value: impl Into<Value>) {
        let column = column.into();
        let value = value.into();
        if let Some(slot) = self.values.iter_mut().find(|(c, _)| *c == column) {
            slot.1 = value;
        } else {
            self.values.push((column, value));
        }
    }

    /// Returns the value for a column, if set.
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.values
            .iter()
            .find(|(c, _)| c == column)
            .map(|(_, v)| v)
    }

    /// Number of set columns.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns `true` when no column is set.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Decodes a native [`Value`] into a typed field.
///
/// Mirrors the storage encodings: booleans from nonzero INTEGER, timestamps
/// from epoch-seconds INTEGER, `Option<T>` from NULL.
pub trait FromValue: Sized {
    /// Storage-class label used in decode diagnostics.
    const EXPECTED: &'static str;

    /// Attempts the conversion; `None` means a storage-class mismatch.
    fn from_value(value: &Value) -> Option<Self>;
}

impl FromValue for i64 {
    const EXPECTED: &'static str = "INTEGER";
    fn from_value(value: &Value) -> Option<Self> {
        value.as_integer()
    }
}

impl FromValue for i32 {
    const EXPECTED: &'static str = "INTEGER";
    fn from_value(value: &Value) -> Option<Self> {
        value.as_integer().and_then(|i| i32::try_from(i).ok())
    }
}

impl FromValue for i16 {
    const EXPECTED: &'static str = "INTEGER";
    fn from_value(value: &Value) -> Option<Self> {
        value.as_integer().and_then(|i| i16::try_from(i).ok())
    }
}

impl FromValue for bool {
    const EXPECTED: &'static str = "INTEGER";
    fn from_value(value: &Value) -> Option<Self> {
        value.as_integer().map(|i| i != 0)
    }
}

impl FromValue for f64 {
    const EXPECTED: &'static str = "REAL";
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Real(f) => Some(*f),
            Value::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }
}

impl FromValue for f32 {
    const EXPECTED: &'static str = "REAL";
    fn from_value(value: &Value) -> Option<Self> {
        f64::from_value(value).map(|f| f as f32)
    }
}

impl FromValue for String {
    const EXPECTED: &'static str = "TEXT";
    fn from_value(value: &Value) -> Option<Self> {
        value.as_text().map(str::to_string)
    }
}

impl FromValue for Vec<u8> {
    const EXPECTED: &'static str = "BLOB";
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Blob(b) => Some(b.clone()),
            _ => None,
        }
    }
}

impl FromValue for DateTime<Utc> {
    const EXPECTED: &'static str = "INTEGER";
    fn from_value(value: &Value) -> Option<Self> {
        value.as_datetime()
    }
}

impl<T: FromValue> FromValue for Option<T> {
    const EXPECTED: &'static str = T::EXPECTED;
    fn from_value(value: &Value) -> Option<Self> {
        if value.is_null() {
            Some(None)
        } else {
            T::from_value(value).map(Some)
        }
    }
}

/// One materialized result row with typed accessors.
#[derive(Debug, Clone)]
pub struct RowView {
    pub(crate) columns: Vec<String>,
    pub(crate) values: Vec<Value>,
}

impl RowView {
    /// Returns the raw value for a column (identifiers compare
    /// case-insensitively), or `None` when the result set lacks it.
    pub fn raw(&self, column: &str) -> Option<&Value> {
        self.columns
            .iter()
            .position(|c| c.eq_ignore_ascii_case(column))
            .map(|i| &self.values[i])
    }

    /// Decodes a column into a typed field.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Deserialization`] when the column is missing
    /// from the result set or its storage class does not match.
    pub fn get<T: FromValue>(&self, column: &str) -> Result<T> {
        let value = self.raw(column).ok_or_else(|| StoreError::Deserialization {
            column: column.to_string(),
            detail: "column missing from result row".to_string(),
        })?;
        T::from_value(value).ok_or_else(|| StoreError::Deserialization {
            column: column.to_string(),
            detail: format!("expected {}, found {}", T::EXPECTED, value.type_name()),
        })
    }

    /// Decodes a BLOB column through the generic serialization fallback.
    pub fn decode_blob<T: DeserializeOwned>(&self, column: &str) -> Result<T> {
        let bytes: Vec<u8> = self.get(column)?;
        rmp_serde::from_slice(&bytes).map_err(|e| StoreError::Deserialization {
            column: column.to_string(),
            detail: e.to_string(),
        })
    }

    /// Like [`decode_blob`](Self::decode_blob), but NULL decodes to `None`.
    pub fn decode_blob_opt<T: DeserializeOwned>(&self, column: &str) -> Result<Option<T>> {
        match self.raw(column) {
            None | Some(Value::Null) => Ok(None),
            Some(_) => self.decode_blob(column).map(Some),
        }
    }

    /// Result-set column names in statement order.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }
}

/// Encodes an arbitrary serializable field for a BLOB column.
///
/// # Errors
///
/// Returns [`StoreError::Serialization`] when the value cannot be encoded;
/// the error is fatal for the record being written and propagates to the
/// caller of `save`.
pub fn encode_blob<T: Serialize>(column: &str, value: &T) -> Result<Value> {
    rmp_serde::to_vec(value)
        .map(Value::Blob)
        .map_err(|e| StoreError::Serialization {
            column: column.to_string(),
            detail: e.to_string(),
        })
}

/// The contract generated data-access code implements per entity type.
pub trait Entity: Send + Sync + 'static {
    /// The entity's declared table shape.
    fn descriptor() -> &'static TableDescriptor;

    /// The entity's current primary-key value, if it has one. Freshly
    /// constructed autoincrement entities return `None` until fetched back.
    fn primary_key(&self) -> Option<Value>;

    /// Encodes the entity's fields into native column values.
    fn to_row(&self) -> Result<Row>;

    /// Decodes scalar columns into a new instance. Relationship slots stay
    /// unresolved; [`resolve_links`](Self::resolve_links) fills them after
    /// the instance is registered with the identity cache.
    fn from_row(row: &RowView) -> Result<Self>
    where
        Self: Sized;

    /// Resolves relationship slots against related tables.
    fn resolve_links(&self, resolver: &LinkResolver<'_>) -> Result<()> {
        let _ = resolver;
        Ok(())
    }
}

/// Lazily resolved reference to a related entity.
///
/// After scalar decode a link holds only the raw foreign-key value; the
/// mapper resolves it at most once into a shared instance, consulting the
/// identity cache first so a back-reference lands on the instance already
/// under construction instead of recursing.
pub struct Link<T> {
    key: OnceLock<Value>,
    target: OnceLock<Arc<T>>,
}

impl<T: Entity> Link<T> {
    /// An absent reference.
    pub fn none() -> Self {
        Self {
            key: OnceLock::new(),
            target: OnceLock::new(),
        }
    }

    /// A reference already resolved to an instance.
    pub fn to(target: Arc<T>) -> Self {
        let link = Self::none();
        if let Some(pk) = target.primary_key() {
            let _ = link.key.set(pk);
        }
        let _ = link.target.set(target);
        link
    }

    /// A reference known only by its foreign-key value.
    pub fn unresolved(key: Value) -> Self {
        let link = Self::none();
        let _ = link.key.set(key);
        link
    }

    /// Returns the resolved instance, if any.
    pub fn get(&self) -> Option<Arc<T>> {
        self.target.get().cloned()
    }

    /// Returns the referenced column value: the resolved instance's primary
    /// key when available, else the stored raw key.
    pub fn key_value(&self) -> Option<Value> {
        if let Some(target) = self.target.get() {
            if let Some(pk) = target.primary_key() {
                return Some(pk);
            }
        }
        self.key.get().cloned()
    }

    /// Returns `true` when the reference is absent entirely.
    pub fn is_none(&self) -> bool {
        self.target.get().is_none() && self.key.get().is_none()
    }

    /// Resolves the reference by primary key, at most once.
    pub fn resolve(&self, resolver: &LinkResolver<'_>) -> Result<()> {
        if self.target.get().is_some() {
            return Ok(());
        }
        let Some(key) = self.key.get() else {
            return Ok(());
        };
        if let Some(found) = resolver.fetch::<T>(key.clone())? {
            let _ = self.target.set(found);
        }
        Ok(())
    }

    /// Resolves the reference through a unique column other than the
    /// primary key.
    pub fn resolve_via(&self, resolver: &LinkResolver<'_>, column: &str) -> Result<()> {
        if self.target.get().is_some() {
            return Ok(());
        }
        let Some(key) = self.key.get() else {
            return Ok(());
        };
        if let Some(found) = resolver.fetch_by::<T>(column, key)? {
            let _ = self.target.set(found);
        }
        Ok(())
    }
}

impl<T> fmt::Debug for Link<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.target.get().is_some(), self.key.get()) {
            (true, _) => f.write_str("Link(resolved)"),
            (false, Some(key)) => write!(f, "Link(key = {key:?})"),
            (false, None) => f.write_str("Link(none)"),
        }
    }
}

/// Scoped access to related tables during relationship resolution.
pub struct LinkResolver<'db> {
    db: &'db Database,
}

impl<'db> LinkResolver<'db> {
    pub(crate) fn new(db: &'db Database) -> Self {
        Self { db }
    }

    /// Fetches a related entity by primary key, through its identity cache.
    pub fn fetch<E: Entity>(&self, key: Value) -> Result<Option<Arc<E>>> {
        self.db.dao::<E>()?.fetch_value(&key)
    }

    /// Fetches a related entity by a unique column value.
    pub fn fetch_by<E: Entity>(&self, column: &str, key: &Value) -> Result<Option<Arc<E>>> {
        let dao = self.db.dao::<E>()?;
        let mut found = dao.find_where(&format!("{} = ?", quote_ident(column)), std::slice::from_ref(key))?;
        Ok(if found.is_empty() {
            None
        } else {
            Some(found.remove(0))
        })
    }
}

/// Per-table data-access operations for one entity type.
///
/// Obtained from [`Database::dao`]; construction fails immediately when the
/// entity's table was never registered with the database.
pub struct Dao<'db, E: Entity> {
    db: &'db Database,
    _entity: PhantomData<fn() -> E>,
}

impl<'db, E: Entity> fmt::Debug for Dao<'db, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dao")
            .field("entity", &std::any::type_name::<E>())
            .finish_non_exhaustive()
    }
}

impl<'db, E: Entity> Dao<'db, E> {
    pub(crate) fn new(db: &'db Database) -> Self {
        Self {
            db,
            _entity: PhantomData,
        }
    }

    /// Inserts or updates an entity, returning the affected row count.
    ///
    /// Insert-vs-update is decided by probing the table for the entity's
    /// primary-key value, not by in-memory state — an instance constructed
    /// fresh with an explicit key updates the existing row. The table's
    /// identity cache is cleared first, since a write invalidates cached
    /// field values. The autoincrement primary-key column is always omitted
    /// on insert.
    pub fn save(&self, entity: &E) -> Result<usize> {
        let desc = E::descriptor();
        self.db.check_table_writable(&desc.table)?;
        self.db.cache().clear(&desc.table);

        let pk_col = desc
            .primary_key()
            .ok_or_else(|| StoreError::MissingPrimaryKey(desc.table.clone()))?;
        let row = entity.to_row()?;
        let pk_value = entity.primary_key().filter(|v| !v.is_null());

        if let Some(pk) = &pk_value {
            let exists = {
                let sql = format!(
                    "SELECT COUNT(*) FROM {} WHERE {} = ?1",
                    quote_ident(&desc.table),
                    quote_ident(&pk_col.name),
                );
                let conn = self.db.connection();
                let count: i64 =
                    conn.query_row(&sql, [to_sql_value(pk)], |r| r.get(0))?;
                count > 0
            };
            if exists {
                return self.update_row(&row, &pk_col.name, pk);
            }
        }
        self.insert_row(&row)
    }

    fn insert_row(&self, row: &Row) -> Result<usize> {
        let desc = E::descriptor();
        let mut cols = Vec::new();
        let mut vals = Vec::new();
        for col in &desc.columns {
            if col.autoincrement {
                continue;
            }
            let Some(value) = row.get(&col.name) else {
                continue;
            };
            cols.push(quote_ident(&col.name));
            vals.push(value.clone());
        }

        let sql = if cols.is_empty() {
            format!("INSERT INTO {} DEFAULT VALUES", quote_ident(&desc.table))
        } else {
            let placeholders = vec!["?"; vals.len()].join(", ");
            format!(
                "INSERT INTO {} ({}) VALUES ({placeholders})",
                quote_ident(&desc.table),
                cols.join(", "),
            )
        };
        let conn = self.db.connection();
        run_execute(&conn, &sql, &vals)
    }

    fn update_row(&self, row: &Row, pk_name: &str, pk: &Value) -> Result<usize> {
        let desc = E::descriptor();
        let mut assigns = Vec::new();
        let mut vals = Vec::new();
        for col in &desc.columns {
            if col.primary_key {
                continue;
            }
            let Some(value) = row.get(&col.name) else {
                continue;
            };
            assigns.push(format!("{} = ?", quote_ident(&col.name)));
            vals.push(value.clone());
        }
        if assigns.is_empty() {
            return Ok(0);
        }
        vals.push(pk.clone());
        let sql = format!(
            "UPDATE {} SET {} WHERE {} = ?",
            quote_ident(&desc.table),
            assigns.join(", "),
            quote_ident(pk_name),
        );
        let conn = self.db.connection();
        run_execute(&conn, &sql, &vals)
    }

    /// Fetches one entity by primary key.
    ///
    /// Consults the identity cache first; a hit within the TTL returns the
    /// same shared instance without touching the database. A decode failure
    /// in this single-result case aborts the call.
    pub fn fetch(&self, key: impl Into<Value>) -> Result<Option<Arc<E>>> {
        self.fetch_value(&key.into())
    }

    pub(crate) fn fetch_value(&self, key: &Value) -> Result<Option<Arc<E>>> {
        let desc = E::descriptor();
        let pk_col = desc
            .primary_key()
            .ok_or_else(|| StoreError::MissingPrimaryKey(desc.table.clone()))?;

        if let Some(ck) = CacheKey::from_value(key) {
            if let Some(hit) = self.db.cache().get::<E>(&desc.table, &ck) {
                return Ok(Some(hit));
            }
        }

        let sql = format!(
            "SELECT * FROM {} WHERE {} = ?",
            quote_ident(&desc.table),
            quote_ident(&pk_col.name),
        );
        let rows = {
            let conn = self.db.connection();
            run_query(&conn, &sql, std::slice::from_ref(key))?
        };
        match rows.into_iter().next() {
            Some(row) => self.decode_row(&row).map(Some),
            None => Ok(None),
        }
    }

    /// Fetches every row of the table.
    pub fn fetch_all(&self) -> Result<Vec<Arc<E>>> {
        let sql = format!("SELECT * FROM {}", quote_ident(&E::descriptor().table));
        self.fetch_with(&sql, &[])
    }

    /// Fetches rows matching a caller-supplied predicate.
    ///
    /// The clause passes through verbatim with `?` placeholders; nothing is
    /// rewritten or planned here.
    pub fn find_where(&self, clause: &str, params: &[Value]) -> Result<Vec<Arc<E>>> {
        let sql = format!(
            "SELECT * FROM {} WHERE {clause}",
            quote_ident(&E::descriptor().table),
        );
        self.fetch_with(&sql, params)
    }

    fn fetch_with(&self, sql: &str, params: &[Value]) -> Result<Vec<Arc<E>>> {
        let rows = {
            let conn = self.db.connection();
            run_query(&conn, sql, params)?
        };
        let mut out = Vec::with_capacity(rows.len());
        for row in &rows {
            match self.decode_row(row) {
                Ok(entity) => out.push(entity),
                // Fatal for the single record involved, not the result set.
                Err(err @ StoreError::Deserialization { .. }) => {
                    warn!(table = %E::descriptor().table, error = %err, "skipping undecodable row");
                }
                Err(err) => return Err(err),
            }
        }
        Ok(out)
    }

    /// Reconstructs one entity, registering it with the identity cache
    /// before its relationships resolve so back-references short-circuit.
    fn decode_row(&self, row: &RowView) -> Result<Arc<E>> {
        let desc = E::descriptor();
        let cache_key = desc
            .primary_key()
            .and_then(|pk| row.raw(&pk.name))
            .and_then(CacheKey::from_value);

        if let Some(key) = &cache_key {
            if let Some(hit) = self.db.cache().get::<E>(&desc.table, key) {
                return Ok(hit);
            }
        }

        let entity = Arc::new(E::from_row(row)?);
        if let Some(key) = cache_key {
            self.db
                .cache()
                .insert(&desc.table, key, Arc::clone(&entity));
        }
        entity.resolve_links(&LinkResolver::new(self.db))?;
        Ok(entity)
    }

    /// Deletes an entity by its primary-key value, returning the affected
    /// row count. An entity with no key deletes nothing.
    pub fn delete(&self, entity: &E) -> Result<usize> {
        let desc = E::descriptor();
        self.db.check_table_writable(&desc.table)?;
        self.db.cache().clear(&desc.table);

        let pk_col = desc
            .primary_key()
            .ok_or_else(|| StoreError::MissingPrimaryKey(desc.table.clone()))?;
        let Some(pk) = entity.primary_key().filter(|v| !v.is_null()) else {
            return Ok(0);
        };
        let sql = format!(
            "DELETE FROM {} WHERE {} = ?",
            quote_ident(&desc.table),
            quote_ident(&pk_col.name),
        );
        let conn = self.db.connection();
        run_execute(&conn, &sql, &[pk])
    }

    /// Bulk update by predicate, bypassing the per-instance path.
    pub fn update_where(
        &self,
        assignments: &[(&str, Value)],
        clause: &str,
        params: &[Value],
    ) -> Result<usize> {
        let desc = E::descriptor();
        self.db.check_table_writable(&desc.table)?;
        self.db.cache().clear(&desc.table);

        if assignments.is_empty() {
            return Ok(0);
        }
        let set = assignments
            .iter()
            .map(|(col, _)| format!("{} = ?", quote_ident(col)))
            .collect::<Vec<_>>()
            .join(", ");
        let mut vals: Vec<Value> = assignments.iter().map(|(_, v)| v.clone()).collect();
        vals.extend(params.iter().cloned());

        let sql = format!(
            "UPDATE {} SET {set} WHERE {clause}",
            quote_ident(&desc.table),
        );
        let conn = self.db.connection();
        run_execute(&conn, &sql, &vals)
    }

    /// Bulk delete by predicate, bypassing the per-instance path.
    pub fn delete_where(&self, clause: &str, params: &[Value]) -> Result<usize> {
        let desc = E::descriptor();
        self.db.check_table_writable(&desc.table)?;
        self.db.cache().clear(&desc.table);

        let sql = format!(
            "DELETE FROM {} WHERE {clause}",
            quote_ident(&desc.table),
        );
        let conn = self.db.connection();
        run_execute(&conn, &sql, params)
    }

    /// Counts the table's rows.
    pub fn count(&self) -> Result<u64> {
        let sql = format!("SELECT COUNT(*) FROM {}", quote_ident(&E::descriptor().table));
        let conn = self.db.connection();
        let count: i64 = conn.query_row(&sql, [], |r| r.get(0))?;
        Ok(count as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    fn view(columns: &[&str], values: Vec<Value>) -> RowView {
        RowView {
            columns: columns.iter().map(|s| s.to_string()).collect(),
            values,
        }
    }

    #[test]
    fn test_row_set_overwrites() {
        let mut row = Row::new();
        row.set("a", 1i64);
        row.set("a", 2i64);
        assert_eq!(row.len(), 1);
        assert_eq!(row.get("a"), Some(&Value::Integer(2)));
    }

    #[test]
    fn test_typed_get_decodes_scalars() {
        let row = view(
            &["flag", "score", "name"],
            vec![Value::Integer(1), Value::Real(2.5), Value::Text("x".into())],
        );
        assert!(row.get::<bool>("flag").unwrap());
        assert_eq!(row.get::<f64>("score").unwrap(), 2.5);
        assert_eq!(row.get::<String>("name").unwrap(), "x");
    }

    #[test]
    fn test_typed_get_is_case_insensitive() {
        let row = view(&["Name"], vec![Value::Text("x".into())]);
        assert_eq!(row.get::<String>("name").unwrap(), "x");
    }

    #[test]
    fn test_option_decodes_null() {
        let row = view(&["a"], vec![Value::Null]);
        assert_eq!(row.get::<Option<i64>>("a").unwrap(), None);
    }

    #[test]
    fn test_type_mismatch_is_deserialization_error() {
        let row = view(&["a"], vec![Value::Text("nope".into())]);
        let err = row.get::<i64>("a").unwrap_err();
        assert!(matches!(err, StoreError::Deserialization { .. }));
    }

    #[test]
    fn test_missing_column_is_deserialization_error() {
        let row = view(&[], vec![]);
        assert!(matches!(
            row.get::<i64>("ghost").unwrap_err(),
            StoreError::Deserialization { .. }
        ));
    }

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Prefs {
        theme: String,
        retries: u32,
    }

    #[test]
    fn test_blob_round_trip() {
        let prefs = Prefs {
            theme: "dark".to_string(),
            retries: 3,
        };
        let encoded = encode_blob("prefs", &prefs).unwrap();
        let row = view(&["prefs"], vec![encoded]);
        assert_eq!(row.decode_blob::<Prefs>("prefs").unwrap(), prefs);
    }

    #[test]
    fn test_corrupt_blob_is_deserialization_error() {
        let row = view(&["prefs"], vec![Value::Blob(vec![0xff, 0x01, 0x02])]);
        assert!(matches!(
            row.decode_blob::<Prefs>("prefs").unwrap_err(),
            StoreError::Deserialization { .. }
        ));
    }

    #[test]
    fn test_decode_blob_opt_handles_null() {
        let row = view(&["prefs"], vec![Value::Null]);
        assert_eq!(row.decode_blob_opt::<Prefs>("prefs").unwrap(), None);
    }

    #[test]
    fn test_date_round_trip_through_value() {
        let dt = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        let row = view(&["at"], vec![Value::from(dt)]);
        assert_eq!(row.get::<DateTime<Utc>>("at").unwrap(), dt);
    }
}
