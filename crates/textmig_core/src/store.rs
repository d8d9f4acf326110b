use std::collections::BTreeSet;
use std::path::Path;

use anyhow::{Context, Result, bail};
use rusqlite::Connection;
use tracing::debug;

use crate::error::PersistenceError;
use crate::fields::{Entity, FieldSpec, SETTINGS_TABLE, UPDATED_ON_COLUMN, WELCOME_TEXT_SETTING};

/// One selected row of a convertible entity table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextRow {
    pub id: i64,
    pub text: String,
}

/// One row of the settings table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettingRow {
    pub id: i64,
    pub value: String,
}

/// Which entity types currently save without touching `updated_on`.
/// Passed explicitly into every save call site; never ambient state.
#[derive(Debug, Default)]
pub struct TimestampPolicy {
    suppressed: BTreeSet<Entity>,
}

impl TimestampPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_suppressed(&self, entity: Entity) -> bool {
        self.suppressed.contains(&entity)
    }

    /// Returns the previous flag so callers can restore it.
    pub fn set_suppressed(&mut self, entity: Entity, value: bool) -> bool {
        if value {
            !self.suppressed.insert(entity)
        } else {
            self.suppressed.remove(&entity)
        }
    }
}

/// Runs `body` with timestamp updates suppressed for `entity`, restoring the
/// prior flag on success and on failure alike.
pub fn with_timestamps_suppressed<T>(
    policy: &mut TimestampPolicy,
    entity: Entity,
    body: impl FnOnce(&mut TimestampPolicy) -> Result<T>,
) -> Result<T> {
    let saved = policy.set_suppressed(entity, true);
    let result = body(policy);
    policy.set_suppressed(entity, saved);
    result
}

/// Opens the content database. The file must already exist: this utility
/// migrates an application's data and never creates its schema.
pub fn open(db_path: &Path) -> Result<Connection> {
    if !db_path.exists() {
        bail!("database file not found: {}", db_path.display());
    }
    let connection = Connection::open(db_path)
        .with_context(|| format!("failed to open {}", db_path.display()))?;
    connection
        .busy_timeout(std::time::Duration::from_secs(5))
        .context("failed to set sqlite busy timeout")?;
    connection
        .pragma_update(None, "foreign_keys", "ON")
        .context("failed to enable foreign_keys pragma")?;
    Ok(connection)
}

/// Verifies every convertible table plus `settings` exists before any
/// pass runs.
pub fn ensure_convertible_tables(connection: &Connection) -> Result<()> {
    let mut missing = Vec::new();
    for field in crate::fields::TEXT_FIELDS {
        if !table_exists(connection, field.table)? {
            missing.push(field.table);
        }
    }
    if !table_exists(connection, SETTINGS_TABLE)? {
        missing.push(SETTINGS_TABLE);
    }
    if !missing.is_empty() {
        bail!(
            "database is missing expected tables: {} (not a content database?)",
            missing.join(", ")
        );
    }
    Ok(())
}

/// All rows of `field` whose text column is non-empty, ascending by id.
/// `NULL` columns compare unknown against `''` and are excluded too.
/// Rows are materialized up front so the visit order and count are fixed
/// before any UPDATE runs against the same table.
pub fn select_non_empty(connection: &Connection, field: &FieldSpec) -> Result<Vec<TextRow>> {
    let sql = format!(
        "SELECT id, {column} FROM {table} WHERE {column} != '' ORDER BY id ASC",
        column = field.column,
        table = field.table,
    );
    let mut statement = connection
        .prepare(&sql)
        .with_context(|| format!("failed to prepare query for {}", field.table))?;
    let rows = statement
        .query_map([], |row| {
            Ok(TextRow {
                id: row.get(0)?,
                text: row.get(1)?,
            })
        })
        .with_context(|| format!("failed to select from {}", field.table))?;

    let mut out = Vec::new();
    for row in rows {
        out.push(row.with_context(|| format!("failed to decode {} row", field.table))?);
    }
    Ok(out)
}

/// Visits every convertible row of `field` exactly once, in id order.
/// Prints the row count up front and traces each visit; returns the count.
pub fn for_each_text_row<F>(connection: &Connection, field: &FieldSpec, mut visit: F) -> Result<usize>
where
    F: FnMut(usize, &TextRow) -> Result<()>,
{
    let rows = select_non_empty(connection, field)?;
    println!(
        "{}#{} {} rows:",
        field.entity.name(),
        field.column,
        rows.len()
    );
    for (index, row) in rows.iter().enumerate() {
        debug!(
            entity = field.entity.name(),
            column = field.column,
            index,
            id = row.id,
            "visiting row"
        );
        visit(index, row)?;
    }
    Ok(rows.len())
}

/// Writes `text` back to one row. Unsuppressed saves also set `updated_on`
/// to the current time; suppressed saves leave it untouched.
pub fn save_text(
    connection: &Connection,
    field: &FieldSpec,
    id: i64,
    text: &str,
    policy: &TimestampPolicy,
) -> Result<()> {
    let sql = if policy.is_suppressed(field.entity) {
        format!(
            "UPDATE {table} SET {column} = ?1 WHERE id = ?2",
            table = field.table,
            column = field.column,
        )
    } else {
        format!(
            "UPDATE {table} SET {column} = ?1, {updated} = datetime('now') WHERE id = ?2",
            table = field.table,
            column = field.column,
            updated = UPDATED_ON_COLUMN,
        )
    };
    execute_save(connection, field.entity, id, &sql, text)
}

/// All settings rows named `welcome_text`, ascending by id. No emptiness
/// filter: every matching row is converted.
pub fn load_welcome_text_settings(connection: &Connection) -> Result<Vec<SettingRow>> {
    let mut statement = connection
        .prepare("SELECT id, value FROM settings WHERE name = ?1 ORDER BY id ASC")
        .context("failed to prepare settings query")?;
    let rows = statement
        .query_map([WELCOME_TEXT_SETTING], |row| {
            Ok(SettingRow {
                id: row.get(0)?,
                value: row.get(1)?,
            })
        })
        .context("failed to query settings")?;

    let mut out = Vec::new();
    for row in rows {
        out.push(row.context("failed to decode settings row")?);
    }
    Ok(out)
}

pub fn save_setting(
    connection: &Connection,
    id: i64,
    value: &str,
    policy: &TimestampPolicy,
) -> Result<()> {
    let sql = if policy.is_suppressed(Entity::Setting) {
        "UPDATE settings SET value = ?1 WHERE id = ?2".to_string()
    } else {
        format!(
            "UPDATE settings SET value = ?1, {UPDATED_ON_COLUMN} = datetime('now') WHERE id = ?2"
        )
    };
    execute_save(connection, Entity::Setting, id, &sql, value)
}

fn execute_save(
    connection: &Connection,
    entity: Entity,
    id: i64,
    sql: &str,
    text: &str,
) -> Result<()> {
    let affected = connection
        .execute(sql, rusqlite::params![text, id])
        .map_err(|source| PersistenceError { entity, id, source })?;
    if affected == 0 {
        return Err(PersistenceError {
            entity,
            id,
            source: rusqlite::Error::QueryReturnedNoRows,
        }
        .into());
    }
    Ok(())
}

fn table_exists(connection: &Connection, table_name: &str) -> Result<bool> {
    let exists: i64 = connection
        .query_row(
            "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1)",
            [table_name],
            |row| row.get(0),
        )
        .with_context(|| format!("failed to check sqlite_master for table {table_name}"))?;
    Ok(exists == 1)
}
