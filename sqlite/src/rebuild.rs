//! Transactional table rebuilds.
//!
//! The engine can only add columns natively; every other shape change drops
//! into a recreate-and-copy: create `<table>_backup` with the new declared
//! shape, copy the surviving columns across, drop the old table, rename the
//! backup into place. The whole sequence runs under one transaction — the
//! table ends the operation either fully migrated or fully unchanged.

use rusqlite::Connection;
use tracing::info;

use crate::ddl::{quote_ident, render_create_table};
use crate::error::Result;

/// A fully computed rebuild: the new shape and the columns whose data
/// survives the copy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RebuildPlan {
    /// Table being rebuilt.
    pub table: String,
    /// Rendered column definitions of the new shape, in order.
    pub column_defs: Vec<String>,
    /// Table-level foreign-key clauses, re-derived fresh from the current
    /// descriptor (they cannot be altered incrementally).
    pub fk_clauses: Vec<String>,
    /// Names of columns copied forward: the intersection of the old and new
    /// shapes. New-but-not-previously-present columns stay NULL.
    pub copy_columns: Vec<String>,
}

/// Executes a rebuild inside an already-open transaction scope.
///
/// `conn` is expected to be inside an explicit transaction; every statement
/// here joins it, so a failure at any step rolls the whole rebuild back.
pub(crate) fn execute(conn: &Connection, plan: &RebuildPlan) -> Result<()> {
    let backup = format!("{}_backup", plan.table);
    info!(table = %plan.table, copied = plan.copy_columns.len(), "rebuilding table");

    conn.execute(
        &render_create_table(&backup, false, &plan.column_defs, &plan.fk_clauses),
        [],
    )?;

    if !plan.copy_columns.is_empty() {
        let cols = plan
            .copy_columns
            .iter()
            .map(|c| quote_ident(c))
            .collect::<Vec<_>>()
            .join(", ");
        conn.execute(
            &format!(
                "INSERT INTO {} ({cols}) SELECT {cols} FROM {}",
                quote_ident(&backup),
                quote_ident(&plan.table),
            ),
            [],
        )?;
    }

    conn.execute(&format!("DROP TABLE {}", quote_ident(&plan.table)), [])?;
    conn.execute(
        &format!(
            "ALTER TABLE {} RENAME TO {}",
            quote_ident(&backup),
            quote_ident(&plan.table),
        ),
        [],
    )?;

    Ok(())
}

/// Rebuilds a table under its own transaction.
///
/// # Errors
///
/// Any engine failure aborts and rolls back; partial rebuilds never commit.
pub fn rebuild_table(conn: &mut Connection, plan: &RebuildPlan) -> Result<()> {
    let tx = conn.transaction()?;
    execute(&tx, plan)?;
    tx.commit()?;
    Ok(())
}
