//! Database lifecycle: open, create, upgrade.
//!
//! A [`Database`] owns the connection, the descriptor set it was opened
//! with, and the identity caches. Opening runs the create/upgrade state
//! machine keyed by the engine's single stored version integer: version 0
//! means first-ever open (create path for every table), a stored version
//! below the declared one runs the upgrade path for every table in
//! declaration order, and a stored version above the declared one is a hard
//! error — migrations are forward-only.
//!
//! If any table in the set declares a foreign key, enforcement is switched
//! on before anything else touches the connection; it is a connection-level
//! global and cascades silently fail to trigger without it.
//!
//! [`OpenRegistry`] hands out one shared handle per database name: the
//! first caller constructs it, later callers receive the same `Arc`. The
//! engine serializes schema-mutating connections per file, so a second
//! independent handle to the same file would only contend.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use rowmap_core::{TableDescriptor, Value, validate_database};
use rusqlite::Connection;
use tracing::{debug, info};

use crate::cache::{IdentityCache, lock};
use crate::error::{Result, StoreError};
use crate::introspect::inspect;
use crate::mapper::{Dao, Entity, RowView, run_execute, run_query};
use crate::reconcile::{apply, reconcile};

/// Default identity-cache entry lifetime.
pub const DEFAULT_IDENTITY_TTL: Duration = Duration::from_secs(30);

/// Configuration for opening a database.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use rowmap_sqlite::DatabaseConfig;
///
/// let config = DatabaseConfig::at_path("app", "/tmp/app.db", 3)
///     .with_identity_ttl(Duration::from_secs(10));
/// assert_eq!(config.name, "app");
/// assert_eq!(config.version, 3);
/// ```
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// Logical database name; the [`OpenRegistry`] shares handles by it.
    pub name: String,
    /// Storage file, or `None` for an in-memory database.
    pub path: Option<PathBuf>,
    /// Declared schema version. Belongs to the database, not to any table.
    pub version: i32,
    /// Identity-cache entry lifetime.
    pub identity_ttl: Duration,
}

impl DatabaseConfig {
    /// Configuration for an in-memory database.
    pub fn in_memory(name: &str, version: i32) -> Self {
        Self {
            name: name.to_string(),
            path: None,
            version,
            identity_ttl: DEFAULT_IDENTITY_TTL,
        }
    }

    /// Configuration for an on-disk database.
    pub fn at_path(name: &str, path: impl Into<PathBuf>, version: i32) -> Self {
        Self {
            name: name.to_string(),
            path: Some(path.into()),
            version,
            identity_ttl: DEFAULT_IDENTITY_TTL,
        }
    }

    /// Overrides the identity-cache entry lifetime.
    pub fn with_identity_ttl(mut self, ttl: Duration) -> Self {
        self.identity_ttl = ttl;
        self
    }
}

/// User-supplied lifecycle callbacks.
///
/// Each hook runs at most once per lifecycle transition, on the connection
/// the database was opened with. The trait fixes the parameter shapes at
/// compile time.
pub trait LifecycleHooks: Send + Sync {
    /// Runs after first-ever creation of the table set.
    fn on_create(&self, conn: &Connection) -> Result<()> {
        let _ = conn;
        Ok(())
    }

    /// Runs after an upgrade pass, with the stored and declared versions.
    fn on_upgrade(&self, conn: &Connection, old_version: i32, new_version: i32) -> Result<()> {
        let _ = (conn, old_version, new_version);
        Ok(())
    }

    /// Runs on every successful open, last.
    fn on_open(&self, conn: &Connection) -> Result<()> {
        let _ = conn;
        Ok(())
    }
}

/// Hook implementation that does nothing.
pub struct NoHooks;

impl LifecycleHooks for NoHooks {}

/// An open database: connection, descriptor set, identity caches.
///
/// Mapper operations are individually blocking and may run from multiple
/// worker threads; the connection is mutex-guarded and the identity cache
/// carries its own synchronization.
pub struct Database {
    name: String,
    conn: Mutex<Connection>,
    descriptors: Vec<TableDescriptor>,
    missing: HashSet<String>,
    cache: IdentityCache,
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("name", &self.name)
            .field("descriptors", &self.descriptors)
            .field("missing", &self.missing)
            .finish_non_exhaustive()
    }
}

impl Database {
    /// Opens (and creates or upgrades) a database for a descriptor set.
    ///
    /// # Errors
    ///
    /// Fails fast on descriptor-set validation errors, a declared version
    /// below 1, or a stored version newer than the declared one. DDL
    /// failures during create/upgrade roll back the affected table and
    /// surface here.
    pub fn open(
        config: DatabaseConfig,
        descriptors: Vec<TableDescriptor>,
        hooks: &dyn LifecycleHooks,
    ) -> Result<Self> {
        if config.version < 1 {
            return Err(StoreError::InvalidVersion(config.version));
        }
        validate_database(&descriptors)?;

        let mut conn = match &config.path {
            Some(path) => Connection::open(path)?,
            None => Connection::open_in_memory()?,
        };

        if descriptors.iter().any(TableDescriptor::has_foreign_keys) {
            conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        }

        let stored: i32 = conn.query_row("PRAGMA user_version", [], |r| r.get(0))?;
        if stored > config.version {
            return Err(StoreError::VersionDowngrade {
                stored,
                declared: config.version,
            });
        }

        let mut missing = HashSet::new();
        if stored < config.version {
            if stored == 0 {
                info!(name = %config.name, version = config.version, "creating database");
            } else {
                info!(name = %config.name, from = stored, to = config.version, "upgrading database");
            }
            conform_all(&mut conn, &descriptors, &mut missing)?;
            conn.pragma_update(None, "user_version", config.version)?;
            if stored == 0 {
                hooks.on_create(&conn)?;
            } else {
                hooks.on_upgrade(&conn, stored, config.version)?;
            }
        } else {
            debug!(name = %config.name, version = stored, "opening at current version");
            scan_missing(&conn, &descriptors, &mut missing)?;
        }
        hooks.on_open(&conn)?;

        Ok(Self {
            name: config.name,
            conn: Mutex::new(conn),
            descriptors,
            missing,
            cache: IdentityCache::new(config.identity_ttl),
        })
    }

    /// The logical database name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The descriptor set this database was opened with.
    pub fn descriptors(&self) -> &[TableDescriptor] {
        &self.descriptors
    }

    /// Looks up a registered descriptor by table name.
    pub fn descriptor(&self, table: &str) -> Option<&TableDescriptor> {
        self.descriptors.iter().find(|d| d.table == table)
    }

    /// Returns the data-access object for an entity type.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::UnregisteredEntity`] when the entity's table is
    /// not part of this database's descriptor set — a programmer error,
    /// reported immediately rather than attempted.
    pub fn dao<E: Entity>(&self) -> Result<Dao<'_, E>> {
        let table = &E::descriptor().table;
        if self.descriptor(table).is_none() {
            return Err(StoreError::UnregisteredEntity(table.clone()));
        }
        Ok(Dao::new(self))
    }

    /// Executes a raw statement, passed through verbatim.
    pub fn execute(&self, sql: &str, params: &[Value]) -> Result<usize> {
        let conn = self.connection();
        run_execute(&conn, sql, params)
    }

    /// Runs a raw query, passed through verbatim.
    pub fn query(&self, sql: &str, params: &[Value]) -> Result<Vec<RowView>> {
        let conn = self.connection();
        run_query(&conn, sql, params)
    }

    pub(crate) fn connection(&self) -> MutexGuard<'_, Connection> {
        lock(&self.conn)
    }

    pub(crate) fn cache(&self) -> &IdentityCache {
        &self.cache
    }

    /// Fails writes against tables whose policy disabled auto-create and
    /// which were absent at open.
    pub(crate) fn check_table_writable(&self, table: &str) -> Result<()> {
        if self.missing.contains(table) {
            return Err(StoreError::TableNotCreated(table.to_string()));
        }
        Ok(())
    }
}

/// Runs create/upgrade reconciliation for every table in declaration order.
fn conform_all(
    conn: &mut Connection,
    descriptors: &[TableDescriptor],
    missing: &mut HashSet<String>,
) -> Result<()> {
    for desc in descriptors {
        let live = inspect(conn, &desc.table)?;
        if !live.table_exists && !desc.policy.auto_create {
            missing.insert(desc.table.clone());
        }
        let plan = reconcile(desc, &live);
        apply(conn, &plan)?;
    }
    Ok(())
}

/// Records declared-but-absent tables without mutating anything.
fn scan_missing(
    conn: &Connection,
    descriptors: &[TableDescriptor],
    missing: &mut HashSet<String>,
) -> Result<()> {
    for desc in descriptors.iter().filter(|d| !d.policy.auto_create) {
        if !inspect(conn, &desc.table)?.table_exists {
            missing.insert(desc.table.clone());
        }
    }
    Ok(())
}

/// Shared-handle registry: one [`Database`] per name for the process
/// lifetime of the registry.
///
/// Owned by the host as an ordinary value rather than a process-global, so
/// tests stay isolated; construction of a given database is serialized
/// under the registry lock.
///
/// # Examples
///
/// ```no_run
/// use rowmap_sqlite::{DatabaseConfig, NoHooks, OpenRegistry};
///
/// let registry = OpenRegistry::new();
/// let a = registry
///     .open_or_create(DatabaseConfig::at_path("app", "app.db", 1), vec![], &NoHooks)
///     .unwrap();
/// let b = registry
///     .open_or_create(DatabaseConfig::at_path("app", "app.db", 1), vec![], &NoHooks)
///     .unwrap();
/// assert!(std::sync::Arc::ptr_eq(&a, &b));
/// ```
#[derive(Default)]
pub struct OpenRegistry {
    open: Mutex<HashMap<String, Arc<Database>>>,
}

impl OpenRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the shared handle for `config.name`, constructing it on
    /// first call. Later callers get the same handle regardless of their
    /// config or descriptor arguments.
    pub fn open_or_create(
        &self,
        config: DatabaseConfig,
        descriptors: Vec<TableDescriptor>,
        hooks: &dyn LifecycleHooks,
    ) -> Result<Arc<Database>> {
        let mut open = lock(&self.open);
        if let Some(db) = open.get(&config.name) {
            return Ok(Arc::clone(db));
        }
        let db = Arc::new(Database::open(config, descriptors, hooks)?);
        open.insert(db.name().to_string(), Arc::clone(&db));
        Ok(db)
    }

    /// Returns the handle for `name` if one is open.
    pub fn get(&self, name: &str) -> Option<Arc<Database>> {
        lock(&self.open).get(name).cloned()
    }

    /// Drops the registry's handle for `name`. Outstanding clones keep the
    /// database alive until they are dropped too.
    pub fn close(&self, name: &str) -> bool {
        lock(&self.open).remove(name).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rowmap_core::{ColumnSpec, FieldKind};
    use std::sync::Mutex as StdMutex;

    fn users() -> TableDescriptor {
        TableDescriptor::builder("users")
            .column(ColumnSpec::new("id", FieldKind::Int64).primary_key().autoincrement())
            .column(ColumnSpec::new("name", FieldKind::Text))
            .build()
            .unwrap()
    }

    #[derive(Default)]
    struct RecordingHooks {
        events: StdMutex<Vec<String>>,
    }

    impl LifecycleHooks for RecordingHooks {
        fn on_create(&self, _conn: &Connection) -> Result<()> {
            self.events.lock().unwrap().push("create".to_string());
            Ok(())
        }
        fn on_upgrade(&self, _conn: &Connection, old: i32, new: i32) -> Result<()> {
            self.events.lock().unwrap().push(format!("upgrade {old}->{new}"));
            Ok(())
        }
        fn on_open(&self, _conn: &Connection) -> Result<()> {
            self.events.lock().unwrap().push("open".to_string());
            Ok(())
        }
    }

    #[test]
    fn test_first_open_creates_tables_and_sets_version() {
        let db = Database::open(DatabaseConfig::in_memory("t", 2), vec![users()], &NoHooks).unwrap();
        let version: i32 = db
            .query("PRAGMA user_version", &[])
            .unwrap()[0]
            .get("user_version")
            .unwrap();
        assert_eq!(version, 2);
        assert_eq!(db.execute("INSERT INTO users (name) VALUES ('a')", &[]).unwrap(), 1);
    }

    #[test]
    fn test_hooks_fire_in_order_on_create_and_upgrade() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.db");

        let hooks = RecordingHooks::default();
        Database::open(DatabaseConfig::at_path("app", &path, 1), vec![users()], &hooks).unwrap();
        assert_eq!(*hooks.events.lock().unwrap(), vec!["create", "open"]);

        let hooks = RecordingHooks::default();
        Database::open(DatabaseConfig::at_path("app", &path, 3), vec![users()], &hooks).unwrap();
        assert_eq!(*hooks.events.lock().unwrap(), vec!["upgrade 1->3", "open"]);

        let hooks = RecordingHooks::default();
        Database::open(DatabaseConfig::at_path("app", &path, 3), vec![users()], &hooks).unwrap();
        assert_eq!(*hooks.events.lock().unwrap(), vec!["open"]);
    }

    #[test]
    fn test_version_downgrade_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.db");

        Database::open(DatabaseConfig::at_path("app", &path, 5), vec![users()], &NoHooks).unwrap();
        let err =
            Database::open(DatabaseConfig::at_path("app", &path, 4), vec![users()], &NoHooks)
                .unwrap_err();
        assert!(matches!(
            err,
            StoreError::VersionDowngrade { stored: 5, declared: 4 }
        ));
    }

    #[test]
    fn test_version_below_one_is_rejected() {
        let err = Database::open(DatabaseConfig::in_memory("t", 0), vec![users()], &NoHooks)
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidVersion(0)));
    }

    #[test]
    fn test_duplicate_descriptors_rejected_before_touching_engine() {
        let err = Database::open(
            DatabaseConfig::in_memory("t", 1),
            vec![users(), users()],
            &NoHooks,
        )
        .unwrap_err();
        assert!(matches!(err, StoreError::Descriptor(_)));
    }

    #[test]
    fn test_upgrade_adds_declared_column() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.db");

        let v1 = TableDescriptor::builder("users")
            .column(ColumnSpec::new("id", FieldKind::Int64).primary_key().autoincrement())
            .build()
            .unwrap();
        let db = Database::open(DatabaseConfig::at_path("app", &path, 1), vec![v1], &NoHooks).unwrap();
        db.execute("INSERT INTO users (id) VALUES (9)", &[]).unwrap();
        drop(db);

        let db = Database::open(DatabaseConfig::at_path("app", &path, 2), vec![users()], &NoHooks)
            .unwrap();
        let rows = db.query("SELECT id, name FROM users", &[]).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get::<i64>("id").unwrap(), 9);
        assert_eq!(rows[0].get::<Option<String>>("name").unwrap(), None);
    }

    #[test]
    fn test_registry_shares_one_handle_per_name() {
        let registry = OpenRegistry::new();
        let a = registry
            .open_or_create(DatabaseConfig::in_memory("app", 1), vec![users()], &NoHooks)
            .unwrap();
        let b = registry
            .open_or_create(DatabaseConfig::in_memory("app", 1), vec![users()], &NoHooks)
            .unwrap();
        assert!(Arc::ptr_eq(&a, &b));

        assert!(registry.close("app"));
        assert!(!registry.close("app"));
        assert!(registry.get("app").is_none());
    }
}
