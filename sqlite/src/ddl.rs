//! DDL text generation.
//!
//! Renders declared descriptors into `CREATE TABLE`, `ALTER TABLE ... ADD
//! COLUMN`, and foreign-key clause text. Identifiers are always back-quoted;
//! the introspector's structured parser strips the same quoting, so rendered
//! definitions round-trip through the engine's stored schema text.

use rowmap_core::{ColumnSpec, TableDescriptor};

/// Back-quotes an identifier.
pub(crate) fn quote_ident(name: &str) -> String {
    format!("`{name}`")
}

/// Renders one column definition: name, resolved type, constraints.
pub(crate) fn render_column_def(col: &ColumnSpec) -> String {
    let mut def = format!("{} {}", quote_ident(&col.name), col.sql_type().keyword());
    if col.primary_key {
        def.push_str(" PRIMARY KEY");
        if col.autoincrement {
            def.push_str(" AUTOINCREMENT");
        }
    }
    if col.not_null {
        def.push_str(" NOT NULL");
    }
    if col.unique {
        def.push_str(" UNIQUE");
    }
    def
}

/// Renders the table-level foreign-key clause for a column, if it has one.
pub(crate) fn render_foreign_key_clause(col: &ColumnSpec) -> Option<String> {
    let fk = col.foreign_key.as_ref()?;
    let mut clause = format!(
        "FOREIGN KEY ({}) REFERENCES {} ({})",
        quote_ident(&col.name),
        quote_ident(&fk.target_table),
        quote_ident(&fk.target_column),
    );
    if fk.cascade_on_delete {
        clause.push_str(" ON DELETE CASCADE");
    }
    if fk.cascade_on_update {
        clause.push_str(" ON UPDATE CASCADE");
    }
    Some(clause)
}

/// Renders every foreign-key clause of a descriptor, in column order.
pub(crate) fn render_foreign_key_clauses(descriptor: &TableDescriptor) -> Vec<String> {
    descriptor
        .columns
        .iter()
        .filter_map(render_foreign_key_clause)
        .collect()
}

/// Renders a full `CREATE TABLE` statement from column definition strings
/// and table-level clauses. Foreign-key clauses come after all column
/// definitions, as the engine's DDL grammar requires.
pub(crate) fn render_create_table(
    table: &str,
    if_not_exists: bool,
    column_defs: &[String],
    table_clauses: &[String],
) -> String {
    let guard = if if_not_exists { "IF NOT EXISTS " } else { "" };
    let mut body: Vec<&str> = column_defs.iter().map(String::as_str).collect();
    body.extend(table_clauses.iter().map(String::as_str));
    format!(
        "CREATE TABLE {guard}{} ({})",
        quote_ident(table),
        body.join(", ")
    )
}

/// Renders a `CREATE TABLE` statement directly from a descriptor.
pub(crate) fn render_create_from_descriptor(
    descriptor: &TableDescriptor,
    if_not_exists: bool,
) -> String {
    let defs: Vec<String> = descriptor.columns.iter().map(render_column_def).collect();
    let clauses = render_foreign_key_clauses(descriptor);
    render_create_table(&descriptor.table, if_not_exists, &defs, &clauses)
}

/// Renders a native column addition.
///
/// `ADD COLUMN` cannot carry PRIMARY KEY or UNIQUE; the reconciler never
/// routes such columns here.
pub(crate) fn render_add_column(table: &str, col: &ColumnSpec) -> String {
    format!(
        "ALTER TABLE {} ADD COLUMN {}",
        quote_ident(table),
        render_column_def(col)
    )
}
