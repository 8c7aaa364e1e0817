//! SQLite runtime for rowmap.
//!
//! This crate keeps a live SQLite database's schema synchronized with a set
//! of declared [`TableDescriptor`](rowmap_core::TableDescriptor)s and maps
//! rows to and from entity instances.
//!
//! # Architecture
//!
//! The crate is organized around the two core algorithms:
//!
//! - **`introspect`** — reads a table's actual shape (stored `CREATE TABLE`
//!   text plus ordered column list) and parses the DDL into structured
//!   per-column definitions.
//! - **`reconcile`** — diffs declared vs. live shape and plans the DDL that
//!   conforms the table: native `ALTER TABLE ADD COLUMN` where possible, a
//!   transactional rebuild everywhere else, selected by the table's two
//!   auto-* policy flags.
//! - **`rebuild`** — the transactional recreate-and-copy used when native
//!   DDL cannot express a change.
//! - **`lifecycle`** — [`Database`] open/create/upgrade keyed by the stored
//!   version integer, lifecycle hooks, foreign-key enforcement, and the
//!   shared-handle [`OpenRegistry`].
//! - **`mapper`** — the [`Entity`] contract, [`Dao`] operations, and
//!   relationship resolution through the per-table identity cache.
//!
//! # Quick start
//!
//! ```no_run
//! use rowmap_core::{ColumnSpec, FieldKind, TableDescriptor};
//! use rowmap_sqlite::{Database, DatabaseConfig, NoHooks};
//!
//! let users = TableDescriptor::builder("users")
//!     .column(ColumnSpec::new("id", FieldKind::Int64).primary_key().autoincrement())
//!     .column(ColumnSpec::new("name", FieldKind::Text).not_null())
//!     .build()
//!     .unwrap();
//!
//! let db = Database::open(
//!     DatabaseConfig::at_path("app", "app.db", 1),
//!     vec![users],
//!     &NoHooks,
//! )
//! .unwrap();
//!
//! db.execute("INSERT INTO users (name) VALUES (?)", &["ada".into()]).unwrap();
//! let rows = db.query("SELECT name FROM users", &[]).unwrap();
//! assert_eq!(rows[0].get::<String>("name").unwrap(), "ada");
//! ```
//!
//! Entity mapping builds on the same handle; see the [`mapper`]
//! module-level example for a full [`Entity`] implementation in the shape
//! generated data-access code takes.
//!
//! # Concurrency
//!
//! A [`Database`] is `Send + Sync`. Open/create/upgrade is serialized by the
//! [`OpenRegistry`]; mapper operations are blocking calls safe to issue from
//! any worker thread. Rebuilds hold a write transaction for their whole
//! duration and rely on the engine's own isolation against concurrent
//! readers. No operation here supports cancellation or timeouts.

mod cache;
mod ddl;
mod error;
pub mod introspect;
mod lifecycle;
pub mod mapper;
mod rebuild;
mod reconcile;

pub use error::{Result, StoreError};
pub use introspect::{LiveColumn, LiveSchema, inspect, parse_create_table};
pub use lifecycle::{
    DEFAULT_IDENTITY_TTL, Database, DatabaseConfig, LifecycleHooks, NoHooks, OpenRegistry,
};
pub use mapper::{Dao, Entity, FromValue, Link, LinkResolver, Row, RowView, encode_blob};
pub use rebuild::{RebuildPlan, rebuild_table};
pub use reconcile::{ReconcilePlan, apply, reconcile};
