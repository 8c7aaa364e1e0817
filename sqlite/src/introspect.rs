//! Live schema introspection.
//!
//! Reads the engine's system catalog for a table's stored `CREATE TABLE`
//! text and its ordered column list, and parses the stored DDL into
//! structured per-column definitions. Reconciliation diffs that structured
//! form against the declared descriptor — the stored text is never patched
//! in place, so column names that are substrings of other identifiers
//! cannot misfire.
//!
//! Everything here is side-effect-free and safe to call repeatedly; a
//! [`LiveSchema`] is re-read on every reconciliation pass and never cached
//! across passes.

use std::sync::LazyLock;

use regex::Regex;
use rusqlite::Connection;

use crate::ddl::quote_ident;
use crate::error::{Result, StoreError};

/// One column of a live table: its name and the raw definition text from the
/// stored `CREATE TABLE` statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiveColumn {
    /// Column name, quoting stripped.
    pub name: String,
    /// Full definition text, e.g. `` `id` INTEGER PRIMARY KEY ``.
    pub definition: String,
}

/// Snapshot of a table's actual shape in the database.
#[derive(Debug, Clone)]
pub struct LiveSchema {
    /// Whether the table exists at all.
    pub table_exists: bool,
    /// The stored `CREATE TABLE` text (empty when the table is absent).
    pub create_sql: String,
    /// Live columns in the engine's declared order.
    pub columns: Vec<LiveColumn>,
}

impl LiveSchema {
    /// Returns live column names in order.
    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    /// Looks up a live column by name (identifiers compare case-insensitively).
    pub fn column(&self, name: &str) -> Option<&LiveColumn> {
        self.columns.iter().find(|c| c.name.eq_ignore_ascii_case(name))
    }
}

/// Reads the live shape of `table`.
///
/// Queries the system catalog for the stored `CREATE TABLE` text
/// (concatenating multi-row results, since the definition can come back
/// soft-wrapped across rows) and `PRAGMA table_info` for the ordered live
/// column list. A missing table yields `table_exists = false` and an empty
/// column list.
///
/// # Errors
///
/// Returns [`StoreError::SchemaParse`] when the stored DDL cannot be
/// parsed, or [`StoreError::Database`] on engine failure.
pub fn inspect(conn: &Connection, table: &str) -> Result<LiveSchema> {
    let mut pieces: Vec<String> = Vec::new();
    {
        let mut stmt =
            conn.prepare("SELECT sql FROM sqlite_master WHERE type = 'table' AND name = ?1")?;
        let mut rows = stmt.query([table])?;
        while let Some(row) = rows.next()? {
            let sql: Option<String> = row.get(0)?;
            if let Some(sql) = sql {
                pieces.push(sql);
            }
        }
    }

    if pieces.is_empty() {
        return Ok(LiveSchema {
            table_exists: false,
            create_sql: String::new(),
            columns: Vec::new(),
        });
    }

    let create_sql = pieces.join("\n");
    let parsed = parse_create_table(table, &create_sql)?;

    let names: Vec<String> = {
        let mut stmt = conn.prepare(&format!("PRAGMA table_info({})", quote_ident(table)))?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(1))?;
        rows.collect::<std::result::Result<Vec<_>, _>>()?
    };

    // table_info is the authoritative column list; definitions attach from
    // the parsed DDL, falling back to a bare quoted name for anything the
    // parse did not surface.
    let columns = names
        .iter()
        .map(|n| {
            parsed
                .iter()
                .find(|c| c.name.eq_ignore_ascii_case(n))
                .cloned()
                .unwrap_or_else(|| LiveColumn {
                    name: n.clone(),
                    definition: quote_ident(n),
                })
        })
        .collect();

    Ok(LiveSchema {
        table_exists: true,
        create_sql,
        columns,
    })
}

static TABLE_CLAUSE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*(constraint\b|primary\s+key\s*\(|unique\s*\(|check\s*\(|foreign\s+key\b)")
        .expect("table clause pattern is valid")
});

/// Parses the column list out of a stored `CREATE TABLE` statement.
///
/// Splits the parenthesized body on top-level commas (nested parens and
/// quoted identifiers respected), then drops table-level constraint clauses
/// (`PRIMARY KEY (...)`, `UNIQUE (...)`, `CHECK (...)`, `FOREIGN KEY ...`,
/// `CONSTRAINT ...`) so only genuine column definitions remain.
pub fn parse_create_table(table: &str, sql: &str) -> Result<Vec<LiveColumn>> {
    let open = sql.find('(').ok_or_else(|| StoreError::SchemaParse {
        table: table.to_string(),
        detail: "no column list in CREATE TABLE text".to_string(),
    })?;

    let body = {
        let mut depth = 0usize;
        let mut end = None;
        for (i, ch) in sql[open..].char_indices() {
            match ch {
                '(' => depth += 1,
                ')' => {
                    depth -= 1;
                    if depth == 0 {
                        end = Some(open + i);
                        break;
                    }
                }
                _ => {}
            }
        }
        let end = end.ok_or_else(|| StoreError::SchemaParse {
            table: table.to_string(),
            detail: "unbalanced parentheses in CREATE TABLE text".to_string(),
        })?;
        &sql[open + 1..end]
    };

    let mut columns = Vec::new();
    for entry in split_top_level(body) {
        let entry = entry.trim();
        if entry.is_empty() || TABLE_CLAUSE_RE.is_match(entry) {
            continue;
        }
        let name = leading_identifier(entry);
        if name.is_empty() {
            return Err(StoreError::SchemaParse {
                table: table.to_string(),
                detail: format!("cannot extract column name from `{entry}`"),
            });
        }
        columns.push(LiveColumn {
            name,
            definition: entry.to_string(),
        });
    }

    Ok(columns)
}

/// Splits on commas at parenthesis depth zero, outside of quoted regions.
fn split_top_level(body: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut depth = 0usize;
    let mut quote: Option<char> = None;

    for ch in body.chars() {
        if let Some(q) = quote {
            current.push(ch);
            if ch == q {
                quote = None;
            }
            continue;
        }
        match ch {
            '\'' | '"' | '`' => {
                quote = Some(ch);
                current.push(ch);
            }
            '[' => {
                quote = Some(']');
                current.push(ch);
            }
            '(' => {
                depth += 1;
                current.push(ch);
            }
            ')' => {
                depth = depth.saturating_sub(1);
                current.push(ch);
            }
            ',' if depth == 0 => {
                parts.push(std::mem::take(&mut current));
            }
            _ => current.push(ch),
        }
    }
    if !current.trim().is_empty() {
        parts.push(current);
    }
    parts
}

/// Extracts the leading identifier of a column definition, stripping any of
/// the engine's four quoting styles.
fn leading_identifier(entry: &str) -> String {
    let entry = entry.trim_start();
    let mut chars = entry.chars();
    match chars.next() {
        Some(open @ ('`' | '"' | '\'')) => chars.take_while(|&c| c != open).collect(),
        Some('[') => chars.take_while(|&c| c != ']').collect(),
        Some(first) => {
            let mut name = String::new();
            name.push(first);
            name.extend(chars.take_while(|c| !c.is_whitespace() && *c != '('));
            name
        }
        None => String::new(),
    }
}

/// Normalizes a column definition for comparison: quoting stripped, case
/// folded, whitespace collapsed.
pub(crate) fn normalize_definition(def: &str) -> String {
    let stripped: String = def
        .chars()
        .filter(|c| !matches!(c, '`' | '"' | '[' | ']'))
        .collect();
    stripped
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_ascii_lowercase()
}
