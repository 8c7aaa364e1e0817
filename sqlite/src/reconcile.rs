//! Schema reconciliation.
//!
//! Diffs a declared [`TableDescriptor`] against the [`LiveSchema`] read from
//! the database and produces a [`ReconcilePlan`]: the DDL needed to bring the
//! live table into conformance. Planning is pure; [`apply`] executes a plan
//! under a single transaction.
//!
//! Drift comes in three independent classes — declared columns missing live
//! (additions), live columns no longer declared (removals), and columns whose
//! definitions differ (changes). The two auto-* policy flags select the
//! strategy:
//!
//! | auto_add | auto_delete | behavior |
//! |----------|-------------|----------|
//! | false    | false       | drift ignored entirely |
//! | true     | false       | native `ADD COLUMN` for additions; a change forces a rebuild that folds undeclared live columns in, preserving them |
//! | false    | true        | any undeclared live column forces a rebuild down to exactly the declared set |
//! | true     | true        | `ADD COLUMN` for additions; any removal or change forces a declared-set rebuild |
//!
//! Additions always go through `ALTER TABLE ADD COLUMN` first — cheap, and
//! existing rows keep their data with the new column NULL. A rebuild is only
//! escalated to for a removal or a change; an addition alone never rebuilds.

use rowmap_core::{ColumnSpec, TableDescriptor};
use rusqlite::Connection;
use tracing::debug;

use crate::ddl::{
    render_add_column, render_column_def, render_create_from_descriptor,
    render_foreign_key_clauses,
};
use crate::error::Result;
use crate::introspect::{LiveColumn, LiveSchema, normalize_definition};
use crate::rebuild::{self, RebuildPlan};

/// The DDL required to conform one live table to its descriptor.
///
/// An empty plan means the table is already conformant; running
/// reconciliation twice in a row always yields an empty second plan.
#[derive(Debug, Clone)]
pub struct ReconcilePlan {
    /// Table the plan applies to.
    pub table: String,
    /// Native statements (`CREATE TABLE`, `ALTER TABLE ... ADD COLUMN`),
    /// executed in order before any rebuild.
    pub statements: Vec<String>,
    /// Full-table rebuild, when native DDL cannot express the drift.
    pub rebuild: Option<RebuildPlan>,
}

impl ReconcilePlan {
    fn empty(table: &str) -> Self {
        Self {
            table: table.to_string(),
            statements: Vec::new(),
            rebuild: None,
        }
    }

    /// Returns `true` when no DDL is required.
    pub fn is_empty(&self) -> bool {
        self.statements.is_empty() && self.rebuild.is_none()
    }
}

/// Computes the plan that conforms `live` to `descriptor`.
///
/// Pure: consults nothing beyond its arguments and emits no DDL itself.
pub fn reconcile(descriptor: &TableDescriptor, live: &LiveSchema) -> ReconcilePlan {
    let mut plan = ReconcilePlan::empty(&descriptor.table);

    if !live.table_exists {
        if descriptor.policy.auto_create {
            plan.statements
                .push(render_create_from_descriptor(descriptor, true));
        }
        // Without auto-create the absence is intentional; the lifecycle
        // controller records the table as missing and writes fail with a
        // descriptive error instead of silently succeeding.
        return plan;
    }

    let has_live = |name: &str| live.column(name).is_some();
    let declared = |name: &str| {
        descriptor
            .columns
            .iter()
            .any(|c| c.name.eq_ignore_ascii_case(name))
    };

    let additions: Vec<&ColumnSpec> = descriptor
        .columns
        .iter()
        .filter(|c| !has_live(&c.name))
        .collect();
    let removals: Vec<&LiveColumn> = live
        .columns
        .iter()
        .filter(|c| !declared(&c.name))
        .collect();
    let changes: Vec<&ColumnSpec> = descriptor
        .columns
        .iter()
        .filter(|c| {
            live.column(&c.name).is_some_and(|lc| {
                normalize_definition(&lc.definition) != normalize_definition(&render_column_def(c))
            })
        })
        .collect();

    // ADD COLUMN cannot carry PRIMARY KEY or UNIQUE; additions that need
    // them count as shape changes.
    let (simple_adds, constrained_adds): (Vec<&ColumnSpec>, Vec<&ColumnSpec>) = additions
        .iter()
        .copied()
        .partition(|c| !c.primary_key && !c.unique);
    let has_changes = !changes.is_empty() || !constrained_adds.is_empty();

    debug!(
        table = %descriptor.table,
        additions = additions.len(),
        removals = removals.len(),
        changes = changes.len(),
        "schema drift"
    );

    let policy = descriptor.policy;
    match (policy.auto_add_columns, policy.auto_delete_columns) {
        (false, false) => {}
        (true, false) => {
            for col in &simple_adds {
                plan.statements
                    .push(render_add_column(&descriptor.table, col));
            }
            if has_changes {
                // Undeclared live columns are preserved by folding their
                // existing definition text into the rebuilt shape.
                let mut defs: Vec<String> =
                    descriptor.columns.iter().map(render_column_def).collect();
                defs.extend(removals.iter().map(|c| c.definition.clone()));

                let mut copy: Vec<String> = descriptor
                    .columns
                    .iter()
                    .filter(|c| has_live(&c.name) || in_set(&simple_adds, c))
                    .map(|c| c.name.clone())
                    .collect();
                copy.extend(removals.iter().map(|c| c.name.clone()));

                plan.rebuild = Some(RebuildPlan {
                    table: descriptor.table.clone(),
                    column_defs: defs,
                    fk_clauses: render_foreign_key_clauses(descriptor),
                    copy_columns: copy,
                });
            }
        }
        (false, true) => {
            if !removals.is_empty() {
                plan.rebuild = Some(declared_set_rebuild(descriptor, |c| has_live(&c.name)));
            }
        }
        (true, true) => {
            for col in &simple_adds {
                plan.statements
                    .push(render_add_column(&descriptor.table, col));
            }
            if !removals.is_empty() || has_changes {
                plan.rebuild = Some(declared_set_rebuild(descriptor, |c| {
                    has_live(&c.name) || in_set(&simple_adds, c)
                }));
            }
        }
    }

    plan
}

fn in_set(set: &[&ColumnSpec], col: &ColumnSpec) -> bool {
    set.iter().any(|c| c.name == col.name)
}

/// A rebuild that emits exactly the declared column set, salvaging data for
/// every declared column the `survives` predicate accepts.
fn declared_set_rebuild(
    descriptor: &TableDescriptor,
    survives: impl Fn(&ColumnSpec) -> bool,
) -> RebuildPlan {
    RebuildPlan {
        table: descriptor.table.clone(),
        column_defs: descriptor.columns.iter().map(render_column_def).collect(),
        fk_clauses: render_foreign_key_clauses(descriptor),
        copy_columns: descriptor
            .columns
            .iter()
            .filter(|c| survives(c))
            .map(|c| c.name.clone())
            .collect(),
    }
}

/// Executes a plan under a single transaction.
///
/// # Errors
///
/// Any statement failure rolls the whole transaction back; the table is left
/// in its pre-migration state and the error surfaces to the open/upgrade
/// caller.
pub fn apply(conn: &mut Connection, plan: &ReconcilePlan) -> Result<()> {
    if plan.is_empty() {
        return Ok(());
    }
    let tx = conn.transaction()?;
    for stmt in &plan.statements {
        debug!(sql = %stmt, "applying");
        tx.execute(stmt, [])?;
    }
    if let Some(rb) = &plan.rebuild {
        rebuild::execute(&tx, rb)?;
    }
    tx.commit()?;
    Ok(())
}
