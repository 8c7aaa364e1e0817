//! Integration tests for the rowmap-sqlite crate.
//!
//! The entity impls here are hand-written in the shape a code-generation
//! front end would emit: a static descriptor per type plus mechanical
//! `to_row`/`from_row`/`resolve_links` bodies.

use std::sync::{Arc, LazyLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use rowmap_core::{ColumnSpec, FieldKind, ForeignKeySpec, TableDescriptor, Value};
use rowmap_sqlite::{
    Database, DatabaseConfig, Entity, Link, LinkResolver, NoHooks, Result, Row, RowView,
    StoreError, encode_blob,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Prefs {
    theme: String,
    retries: u32,
}

#[derive(Debug)]
struct User {
    id: Option<i64>,
    name: String,
    active: bool,
    score: f64,
    joined: DateTime<Utc>,
    prefs: Prefs,
    avatar: Option<Vec<u8>>,
    email: Option<String>,
}

static USERS: LazyLock<TableDescriptor> = LazyLock::new(|| {
    TableDescriptor::builder("users")
        .column(ColumnSpec::new("id", FieldKind::Int64).primary_key().autoincrement())
        .column(ColumnSpec::new("name", FieldKind::Text).not_null())
        .column(ColumnSpec::new("active", FieldKind::Bool))
        .column(ColumnSpec::new("score", FieldKind::Float64))
        .column(ColumnSpec::new("joined", FieldKind::Date))
        .column(ColumnSpec::new("prefs", FieldKind::Serialized))
        .column(ColumnSpec::new("avatar", FieldKind::Bytes))
        .column(ColumnSpec::new("email", FieldKind::Text).unique())
        .build()
        .expect("users descriptor is valid")
});

impl Entity for User {
    fn descriptor() -> &'static TableDescriptor {
        &USERS
    }

    fn primary_key(&self) -> Option<Value> {
        self.id.map(Value::from)
    }

    fn to_row(&self) -> Result<Row> {
        let mut row = Row::new();
        if let Some(id) = self.id {
            row.set("id", id);
        }
        row.set("name", self.name.clone());
        row.set("active", self.active);
        row.set("score", self.score);
        row.set("joined", self.joined);
        row.set("prefs", encode_blob("prefs", &self.prefs)?);
        row.set("avatar", self.avatar.clone());
        if let Some(email) = &self.email {
            row.set("email", email.clone());
        }
        Ok(row)
    }

    fn from_row(row: &RowView) -> Result<Self> {
        Ok(Self {
            id: row.get("id")?,
            name: row.get("name")?,
            active: row.get("active")?,
            score: row.get("score")?,
            joined: row.get("joined")?,
            prefs: row.decode_blob("prefs")?,
            avatar: row.get("avatar")?,
            email: row.get("email")?,
        })
    }
}

fn sample_user(name: &str) -> User {
    User {
        id: None,
        name: name.to_string(),
        active: true,
        score: 12.5,
        joined: DateTime::from_timestamp(1_700_000_000, 0).unwrap(),
        prefs: Prefs {
            theme: "dark".to_string(),
            retries: 3,
        },
        avatar: Some(vec![1, 2, 3]),
        email: None,
    }
}

#[derive(Debug)]
struct Post {
    id: Option<i64>,
    title: String,
    author: Link<User>,
}

static POSTS: LazyLock<TableDescriptor> = LazyLock::new(|| {
    TableDescriptor::builder("posts")
        .column(ColumnSpec::new("id", FieldKind::Int64).primary_key().autoincrement())
        .column(ColumnSpec::new("title", FieldKind::Text).not_null())
        .column(
            ColumnSpec::new("author_id", FieldKind::Int64)
                .references(ForeignKeySpec::to("users", "id").cascade_on_delete()),
        )
        .build()
        .expect("posts descriptor is valid")
});

impl Entity for Post {
    fn descriptor() -> &'static TableDescriptor {
        &POSTS
    }

    fn primary_key(&self) -> Option<Value> {
        self.id.map(Value::from)
    }

    fn to_row(&self) -> Result<Row> {
        let mut row = Row::new();
        if let Some(id) = self.id {
            row.set("id", id);
        }
        row.set("title", self.title.clone());
        if let Some(key) = self.author.key_value() {
            row.set("author_id", key);
        }
        Ok(row)
    }

    fn from_row(row: &RowView) -> Result<Self> {
        let author = match row.raw("author_id") {
            Some(v) if !v.is_null() => Link::unresolved(v.clone()),
            _ => Link::none(),
        };
        Ok(Self {
            id: row.get("id")?,
            title: row.get("title")?,
            author,
        })
    }

    fn resolve_links(&self, resolver: &LinkResolver<'_>) -> Result<()> {
        self.author.resolve(resolver)
    }
}

#[derive(Debug)]
struct Node {
    id: Option<i64>,
    peer: Link<Node>,
}

static NODES: LazyLock<TableDescriptor> = LazyLock::new(|| {
    TableDescriptor::builder("nodes")
        .column(ColumnSpec::new("id", FieldKind::Int64).primary_key().autoincrement())
        .column(
            ColumnSpec::new("peer_id", FieldKind::Int64)
                .references(ForeignKeySpec::to("nodes", "id")),
        )
        .build()
        .expect("nodes descriptor is valid")
});

impl Entity for Node {
    fn descriptor() -> &'static TableDescriptor {
        &NODES
    }

    fn primary_key(&self) -> Option<Value> {
        self.id.map(Value::from)
    }

    fn to_row(&self) -> Result<Row> {
        let mut row = Row::new();
        if let Some(id) = self.id {
            row.set("id", id);
        }
        if let Some(key) = self.peer.key_value() {
            row.set("peer_id", key);
        }
        Ok(row)
    }

    fn from_row(row: &RowView) -> Result<Self> {
        let peer = match row.raw("peer_id") {
            Some(v) if !v.is_null() => Link::unresolved(v.clone()),
            _ => Link::none(),
        };
        Ok(Self {
            id: row.get("id")?,
            peer,
        })
    }

    fn resolve_links(&self, resolver: &LinkResolver<'_>) -> Result<()> {
        self.peer.resolve(resolver)
    }
}

#[derive(Debug)]
struct Setting {
    key: String,
    value: String,
}

static SETTINGS: LazyLock<TableDescriptor> = LazyLock::new(|| {
    TableDescriptor::builder("settings")
        .column(ColumnSpec::new("key", FieldKind::Text).primary_key())
        .column(ColumnSpec::new("value", FieldKind::Text).not_null())
        .build()
        .expect("settings descriptor is valid")
});

impl Entity for Setting {
    fn descriptor() -> &'static TableDescriptor {
        &SETTINGS
    }

    fn primary_key(&self) -> Option<Value> {
        Some(Value::from(self.key.clone()))
    }

    fn to_row(&self) -> Result<Row> {
        let mut row = Row::new();
        row.set("key", self.key.clone());
        row.set("value", self.value.clone());
        Ok(row)
    }

    fn from_row(row: &RowView) -> Result<Self> {
        Ok(Self {
            key: row.get("key")?,
            value: row.get("value")?,
        })
    }
}

fn open_db() -> Database {
    Database::open(
        DatabaseConfig::in_memory("test", 1),
        vec![
            USERS.clone(),
            POSTS.clone(),
            NODES.clone(),
            SETTINGS.clone(),
        ],
        &NoHooks,
    )
    .expect("open test database")
}

#[test]
fn test_round_trip_all_field_kinds() {
    let db = open_db();
    let users = db.dao::<User>().unwrap();

    let mut original = sample_user("ada");
    original.email = Some("ada@example.com".to_string());
    assert_eq!(users.save(&original).unwrap(), 1);

    let fetched = users.find_where("name = ?", &["ada".into()]).unwrap();
    assert_eq!(fetched.len(), 1);
    let user = &fetched[0];
    assert!(user.id.is_some());
    assert_eq!(user.name, original.name);
    assert_eq!(user.active, original.active);
    assert_eq!(user.score, original.score);
    assert_eq!(user.joined, original.joined);
    assert_eq!(user.prefs, original.prefs);
    assert_eq!(user.avatar, original.avatar);
    assert_eq!(user.email, original.email);
}

#[test]
fn test_save_probes_for_insert_vs_update() {
    let db = open_db();
    let users = db.dao::<User>().unwrap();

    users.save(&sample_user("ada")).unwrap();
    let id = users.fetch_all().unwrap()[0].id.unwrap();

    // A freshly constructed instance with an explicit existing key must
    // update, not insert.
    let mut replacement = sample_user("lovelace");
    replacement.id = Some(id);
    assert_eq!(users.save(&replacement).unwrap(), 1);

    assert_eq!(users.count().unwrap(), 1);
    let reloaded = users.fetch(id).unwrap().unwrap();
    assert_eq!(reloaded.name, "lovelace");
}

#[test]
fn test_identity_cache_returns_same_instance() {
    let db = open_db();
    let users = db.dao::<User>().unwrap();
    users.save(&sample_user("ada")).unwrap();
    let id = users.fetch_all().unwrap()[0].id.unwrap();

    let a = users.fetch(id).unwrap().unwrap();
    let b = users.fetch(id).unwrap().unwrap();
    assert!(Arc::ptr_eq(&a, &b));
}

#[test]
fn test_save_invalidates_identity_cache() {
    let db = open_db();
    let users = db.dao::<User>().unwrap();
    users.save(&sample_user("ada")).unwrap();
    let id = users.fetch_all().unwrap()[0].id.unwrap();

    let before = users.fetch(id).unwrap().unwrap();
    users.save(&sample_user("grace")).unwrap();
    let after = users.fetch(id).unwrap().unwrap();
    assert!(!Arc::ptr_eq(&before, &after));
}

#[test]
fn test_identity_cache_expires_after_ttl() {
    let db = Database::open(
        DatabaseConfig::in_memory("test", 1).with_identity_ttl(Duration::from_millis(40)),
        vec![USERS.clone(), POSTS.clone(), NODES.clone(), SETTINGS.clone()],
        &NoHooks,
    )
    .unwrap();
    let users = db.dao::<User>().unwrap();
    users.save(&sample_user("ada")).unwrap();
    let id = users.fetch_all().unwrap()[0].id.unwrap();

    let before = users.fetch(id).unwrap().unwrap();
    std::thread::sleep(Duration::from_millis(150));
    let after = users.fetch(id).unwrap().unwrap();
    assert!(!Arc::ptr_eq(&before, &after));
}

#[test]
fn test_relationship_resolves_through_link() {
    let db = open_db();
    let users = db.dao::<User>().unwrap();
    let posts = db.dao::<Post>().unwrap();

    users.save(&sample_user("ada")).unwrap();
    let author_id = users.fetch_all().unwrap()[0].id.unwrap();

    let post = Post {
        id: None,
        title: "On the Analytical Engine".to_string(),
        author: Link::unresolved(Value::from(author_id)),
    };
    posts.save(&post).unwrap();

    let loaded = posts.fetch_all().unwrap();
    assert_eq!(loaded.len(), 1);
    let author = loaded[0].author.get().expect("author resolved");
    assert_eq!(author.id, Some(author_id));
    assert_eq!(author.name, "ada");
}

#[test]
fn test_absent_reference_is_omitted_and_stays_none() {
    let db = open_db();
    let posts = db.dao::<Post>().unwrap();

    posts
        .save(&Post {
            id: None,
            title: "anonymous".to_string(),
            author: Link::none(),
        })
        .unwrap();

    let loaded = posts.fetch_all().unwrap();
    assert!(loaded[0].author.is_none());
}

#[test]
fn test_bidirectional_references_share_instances() {
    let db = open_db();
    db.execute("INSERT INTO nodes (id, peer_id) VALUES (1, 2)", &[]).unwrap();
    db.execute("INSERT INTO nodes (id, peer_id) VALUES (2, 1)", &[]).unwrap();

    let nodes = db.dao::<Node>().unwrap();
    let one = nodes.fetch(1i64).unwrap().unwrap();
    let two = one.peer.get().expect("peer resolved");
    assert_eq!(two.id, Some(2));

    // The back-reference short-circuits through the identity cache instead
    // of recursing: it lands on the very instance under construction.
    let back = two.peer.get().expect("back reference resolved");
    assert!(Arc::ptr_eq(&back, &one));
}

#[test]
fn test_cascade_delete_removes_children() {
    let db = open_db();
    let users = db.dao::<User>().unwrap();
    let posts = db.dao::<Post>().unwrap();

    users.save(&sample_user("ada")).unwrap();
    let author_id = users.fetch_all().unwrap()[0].id.unwrap();
    posts
        .save(&Post {
            id: None,
            title: "first".to_string(),
            author: Link::unresolved(Value::from(author_id)),
        })
        .unwrap();
    assert_eq!(posts.count().unwrap(), 1);

    let stored = users.fetch(author_id).unwrap().unwrap();
    assert_eq!(users.delete(&stored).unwrap(), 1);
    assert_eq!(posts.count().unwrap(), 0);
}

#[test]
fn test_string_primary_keys_and_uniqueness_violation() {
    let db = open_db();
    let settings = db.dao::<Setting>().unwrap();

    settings
        .save(&Setting {
            key: "theme".to_string(),
            value: "dark".to_string(),
        })
        .unwrap();
    settings
        .save(&Setting {
            key: "lang".to_string(),
            value: "en".to_string(),
        })
        .unwrap();
    assert_eq!(settings.count().unwrap(), 2);

    // A raw duplicate-key insert surfaces the engine's own uniqueness
    // violation, unwrapped.
    let err = db
        .execute(
            "INSERT INTO settings (key, value) VALUES ('theme', 'light')",
            &[],
        )
        .unwrap_err();
    match err {
        StoreError::Database(rusqlite::Error::SqliteFailure(e, _)) => {
            assert_eq!(e.code, rusqlite::ErrorCode::ConstraintViolation);
        }
        other => panic!("expected constraint violation, got {other:?}"),
    }
}

#[test]
fn test_unique_column_violation_passes_through_save() {
    let db = open_db();
    let users = db.dao::<User>().unwrap();

    let mut a = sample_user("ada");
    a.email = Some("same@example.com".to_string());
    users.save(&a).unwrap();

    let mut b = sample_user("grace");
    b.email = Some("same@example.com".to_string());
    let err = users.save(&b).unwrap_err();
    assert!(matches!(err, StoreError::Database(_)));
}

#[test]
fn test_fetch_all_skips_undecodable_rows() {
    let db = open_db();
    let users = db.dao::<User>().unwrap();
    users.save(&sample_user("ada")).unwrap();

    // A row whose BLOB payload is not valid for the prefs field.
    db.execute(
        "INSERT INTO users (name, active, score, joined, prefs) VALUES ('bad', 1, 0.0, 0, ?)",
        &[Value::Blob(vec![0xc1])],
    )
    .unwrap();

    let loaded = users.fetch_all().unwrap();
    assert_eq!(loaded.len(), 1);
    assert_eq!(loaded[0].name, "ada");
}

#[test]
fn test_single_result_decode_failure_aborts_the_call() {
    let db = open_db();
    let users = db.dao::<User>().unwrap();
    db.execute(
        "INSERT INTO users (id, name, active, score, joined, prefs) VALUES (5, 'bad', 1, 0.0, 0, ?)",
        &[Value::Blob(vec![0xc1])],
    )
    .unwrap();

    let err = users.fetch(5i64).unwrap_err();
    assert!(matches!(err, StoreError::Deserialization { .. }));
}

#[test]
fn test_bulk_operations_bypass_instances_and_clear_cache() {
    let db = open_db();
    let users = db.dao::<User>().unwrap();
    users.save(&sample_user("ada")).unwrap();
    users.save(&sample_user("grace")).unwrap();
    let id = users.find_where("name = ?", &["ada".into()]).unwrap()[0]
        .id
        .unwrap();

    let cached = users.fetch(id).unwrap().unwrap();
    let changed = users
        .update_where(&[("active", false.into())], "name = ?", &["ada".into()])
        .unwrap();
    assert_eq!(changed, 1);

    let reloaded = users.fetch(id).unwrap().unwrap();
    assert!(!Arc::ptr_eq(&cached, &reloaded));
    assert!(!reloaded.active);

    assert_eq!(users.delete_where("active = ?", &[false.into()]).unwrap(), 1);
    assert_eq!(users.count().unwrap(), 1);
}

#[test]
fn test_unregistered_entity_is_reported_immediately() {
    let db = Database::open(
        DatabaseConfig::in_memory("test", 1),
        vec![USERS.clone()],
        &NoHooks,
    )
    .unwrap();

    let err = db.dao::<Setting>().unwrap_err();
    assert!(matches!(err, StoreError::UnregisteredEntity(t) if t == "settings"));
}

#[test]
fn test_auto_create_off_write_fails_descriptively() {
    let audit = TableDescriptor::builder("settings")
        .column(ColumnSpec::new("key", FieldKind::Text).primary_key())
        .column(ColumnSpec::new("value", FieldKind::Text).not_null())
        .auto_create(false)
        .build()
        .unwrap();

    let db = Database::open(DatabaseConfig::in_memory("test", 1), vec![audit], &NoHooks).unwrap();
    let settings = db.dao::<Setting>().unwrap();

    let err = settings
        .save(&Setting {
            key: "theme".to_string(),
            value: "dark".to_string(),
        })
        .unwrap_err();
    assert!(matches!(err, StoreError::TableNotCreated(t) if t == "settings"));
}

#[test]
fn test_concurrent_reads_and_writes() {
    let db = Arc::new(open_db());
    let users = db.dao::<User>().unwrap();
    users.save(&sample_user("seed")).unwrap();
    let id = users.fetch_all().unwrap()[0].id.unwrap();

    let mut handles = Vec::new();
    for i in 0..4 {
        let db = Arc::clone(&db);
        handles.push(std::thread::spawn(move || {
            let users = db.dao::<User>().unwrap();
            for _ in 0..25 {
                if i % 2 == 0 {
                    users.fetch(id).unwrap();
                } else {
                    users.save(&sample_user(&format!("worker-{i}"))).unwrap();
                }
            }
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }

    assert!(db.dao::<User>().unwrap().count().unwrap() >= 1);
}
