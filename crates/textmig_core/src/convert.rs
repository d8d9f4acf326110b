use anyhow::{Context, Result};
use rusqlite::Connection;
use serde::Serialize;

use crate::fields::{Entity, TEXT_FIELDS};
use crate::pandoc::{PandocTool, TextConverter};
use crate::store::{self, TimestampPolicy, with_timestamps_suppressed};

#[derive(Debug, Clone, Serialize)]
pub struct ConvertedField {
    pub entity: &'static str,
    pub column: &'static str,
    pub rows: usize,
}

/// Outcome of a committed conversion run.
#[derive(Debug, Clone, Serialize)]
pub struct ConversionReport {
    pub welcome_texts_converted: usize,
    pub passes: Vec<ConvertedField>,
}

impl ConversionReport {
    pub fn total_rows(&self) -> usize {
        self.passes.iter().map(|pass| pass.rows).sum()
    }
}

/// Checks the installed Pandoc, then rewrites every convertible field.
/// The version guard runs first so an unusable installation aborts before
/// any data is touched.
pub fn run_migration(connection: &mut Connection, pandoc: &PandocTool) -> Result<ConversionReport> {
    pandoc.check_required_version()?;
    convert_all(connection, pandoc)
}

/// Converts the welcome-text settings and then every entity field, inside
/// one transaction. Any failure unwinds out of the transaction and rolls
/// the whole run back; timestamps stay suppressed only for the duration of
/// each entity's pass.
pub fn convert_all(
    connection: &mut Connection,
    converter: &dyn TextConverter,
) -> Result<ConversionReport> {
    let transaction = connection
        .transaction()
        .context("failed to start conversion transaction")?;
    let mut policy = TimestampPolicy::new();

    let welcome_texts_converted = convert_welcome_texts(&transaction, converter, &mut policy)?;

    let mut passes = Vec::new();
    for field in TEXT_FIELDS {
        let rows = with_timestamps_suppressed(&mut policy, field.entity, |policy| {
            store::for_each_text_row(&transaction, field, |_, row| {
                let converted = converter.convert(&row.text)?;
                store::save_text(&transaction, field, row.id, &converted, policy)
            })
        })?;
        passes.push(ConvertedField {
            entity: field.entity.name(),
            column: field.column,
            rows,
        });
    }

    transaction
        .commit()
        .context("failed to commit conversion transaction")?;
    Ok(ConversionReport {
        welcome_texts_converted,
        passes,
    })
}

fn convert_welcome_texts(
    connection: &Connection,
    converter: &dyn TextConverter,
    policy: &mut TimestampPolicy,
) -> Result<usize> {
    with_timestamps_suppressed(policy, Entity::Setting, |policy| {
        let settings = store::load_welcome_text_settings(connection)?;
        for setting in &settings {
            let converted = converter.convert(&setting.value)?;
            store::save_setting(connection, setting.id, &converted, policy)?;
        }
        Ok(settings.len())
    })
}

#[cfg(test)]
mod tests {
    use anyhow::Result;

    use super::{convert_all, run_migration};
    use crate::error::{ConversionError, ToolVersionError};
    use crate::fields::{TEXT_FIELDS, WELCOME_TEXT_SETTING};
    use crate::pandoc::{PandocTool, TextConverter};
    use crate::store::fixtures::{
        SEED_TIMESTAMP, insert_row, insert_setting, seeded_connection, text_of, updated_on_of,
    };

    /// Deterministic stand-in for Pandoc: prefixes the source text.
    struct Stub;

    impl TextConverter for Stub {
        fn convert(&self, source: &str) -> Result<String> {
            Ok(format!("md::{source}"))
        }
    }

    /// Fails on one specific source text, succeeds on everything else.
    struct FailOn(&'static str);

    impl TextConverter for FailOn {
        fn convert(&self, source: &str) -> Result<String> {
            if source == self.0 {
                return Err(ConversionError {
                    reason: "forced failure".to_string(),
                }
                .into());
            }
            Ok(format!("md::{source}"))
        }
    }

    fn seed_one_row_per_entity(connection: &rusqlite::Connection) {
        for (offset, field) in TEXT_FIELDS.iter().enumerate() {
            insert_row(
                connection,
                field.table,
                field.column,
                offset as i64 + 1,
                &format!("textile body {}", field.table),
            );
        }
    }

    #[test]
    fn successful_run_converts_every_field_and_setting() {
        let (_temp, mut connection) = seeded_connection();
        seed_one_row_per_entity(&connection);
        insert_setting(&connection, 1, WELCOME_TEXT_SETTING, "h1. welcome");
        insert_setting(&connection, 2, "theme", "classic");

        let report = convert_all(&mut connection, &Stub).expect("convert");

        assert_eq!(report.welcome_texts_converted, 1);
        assert_eq!(report.total_rows(), TEXT_FIELDS.len());
        for (offset, field) in TEXT_FIELDS.iter().enumerate() {
            let id = offset as i64 + 1;
            assert_eq!(
                text_of(&connection, field.table, field.column, id).as_deref(),
                Some(format!("md::textile body {}", field.table).as_str())
            );
        }
        assert_eq!(
            text_of(&connection, "settings", "value", 1).as_deref(),
            Some("md::h1. welcome")
        );
        // Unrelated settings are left alone.
        assert_eq!(
            text_of(&connection, "settings", "value", 2).as_deref(),
            Some("classic")
        );
    }

    #[test]
    fn conversion_does_not_touch_modification_timestamps() {
        let (_temp, mut connection) = seeded_connection();
        seed_one_row_per_entity(&connection);
        insert_setting(&connection, 1, WELCOME_TEXT_SETTING, "h1. welcome");

        convert_all(&mut connection, &Stub).expect("convert");

        for (offset, field) in TEXT_FIELDS.iter().enumerate() {
            assert_eq!(
                updated_on_of(&connection, field.table, offset as i64 + 1),
                SEED_TIMESTAMP
            );
        }
        assert_eq!(updated_on_of(&connection, "settings", 1), SEED_TIMESTAMP);
    }

    #[test]
    fn empty_fields_are_never_visited() {
        let (_temp, mut connection) = seeded_connection();
        let field = &TEXT_FIELDS[0];
        insert_row(&connection, field.table, field.column, 1, "");
        insert_row(&connection, field.table, field.column, 2, "body");

        let report = convert_all(&mut connection, &Stub).expect("convert");

        assert_eq!(report.total_rows(), 1);
        assert_eq!(
            text_of(&connection, field.table, field.column, 1).as_deref(),
            Some("")
        );
        assert_eq!(
            text_of(&connection, field.table, field.column, 2).as_deref(),
            Some("md::body")
        );
    }

    #[test]
    fn one_failed_record_rolls_back_the_entire_run() {
        let (_temp, mut connection) = seeded_connection();
        seed_one_row_per_entity(&connection);
        insert_setting(&connection, 1, WELCOME_TEXT_SETTING, "h1. welcome");

        // Fail on the last entity pass, after every other table converted.
        let err = convert_all(&mut connection, &FailOn("textile body wiki_contents"))
            .expect_err("must fail");
        assert!(err.downcast_ref::<ConversionError>().is_some());

        for (offset, field) in TEXT_FIELDS.iter().enumerate() {
            assert_eq!(
                text_of(&connection, field.table, field.column, offset as i64 + 1).as_deref(),
                Some(format!("textile body {}", field.table).as_str())
            );
        }
        assert_eq!(
            text_of(&connection, "settings", "value", 1).as_deref(),
            Some("h1. welcome")
        );
    }

    #[test]
    fn version_guard_failure_aborts_before_any_write() {
        let (_temp, mut connection) = seeded_connection();
        seed_one_row_per_entity(&connection);

        let pandoc = PandocTool::new("/nonexistent/textmig-test-pandoc");
        let err = run_migration(&mut connection, &pandoc).expect_err("must fail");
        assert!(err.downcast_ref::<ToolVersionError>().is_some());

        for (offset, field) in TEXT_FIELDS.iter().enumerate() {
            assert_eq!(
                text_of(&connection, field.table, field.column, offset as i64 + 1).as_deref(),
                Some(format!("textile body {}", field.table).as_str())
            );
        }
    }
}
