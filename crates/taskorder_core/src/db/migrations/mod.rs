//! Item store migrations.
//!
//! # Responsibility
//! - Register the SQL steps that build `task_lists` and `items`.
//! - Run the steps a store has not seen yet, then check the result.
//!
//! # Invariants
//! - Step versions increase by one, starting at 1.
//! - All pending steps commit together or not at all.

use crate::db::{DbError, DbResult};
use log::{debug, info};
use rusqlite::{Connection, OptionalExtension};

/// Tables every ordering component reads or writes.
pub const ITEM_STORE_TABLES: &[&str] = &["task_lists", "items"];

struct SchemaStep {
    version: u32,
    name: &'static str,
    sql: &'static str,
}

const SCHEMA_STEPS: &[SchemaStep] = &[SchemaStep {
    version: 1,
    name: "lists_and_items",
    sql: include_str!("0001_init.sql"),
}];

/// Schema version written by this build.
pub fn latest_version() -> u32 {
    SCHEMA_STEPS.last().map_or(0, |step| step.version)
}

/// Upgrades the item store behind `conn` to [`latest_version`].
///
/// # Errors
/// - `UnsupportedSchemaVersion` when the store is newer than this build.
/// - `MissingTable` when the store reports a version but lacks a table.
pub fn apply_migrations(conn: &mut Connection) -> DbResult<()> {
    let found = stored_version(conn)?;
    let latest = latest_version();
    if found > latest {
        return Err(DbError::UnsupportedSchemaVersion {
            db_version: found,
            latest_supported: latest,
        });
    }

    if found < latest {
        let tx = conn.transaction()?;
        for step in SCHEMA_STEPS.iter().skip_while(|step| step.version <= found) {
            tx.execute_batch(step.sql)?;
            tx.pragma_update(None, "user_version", step.version)?;
            debug!(
                "event=db_migrate_step module=db status=ok version={} name={}",
                step.version, step.name
            );
        }
        tx.commit()?;
        info!("event=db_migrate module=db status=ok from_version={found} to_version={latest}");
    }

    ensure_item_tables(conn, latest)
}

fn ensure_item_tables(conn: &Connection, db_version: u32) -> DbResult<()> {
    for &table in ITEM_STORE_TABLES {
        let present = conn
            .query_row(
                "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1;",
                [table],
                |_| Ok(()),
            )
            .optional()?
            .is_some();
        if !present {
            return Err(DbError::MissingTable { table, db_version });
        }
    }
    Ok(())
}

fn stored_version(conn: &Connection) -> DbResult<u32> {
    Ok(conn.pragma_query_value(None, "user_version", |row| row.get(0))?)
}
