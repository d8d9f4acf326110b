use anyhow::Result;
use rusqlite::Connection;
use serde::Serialize;
use tracing::warn;

use crate::fields::TEXT_FIELDS;
use crate::store;

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct PreTagMismatch {
    pub entity: &'static str,
    pub id: i64,
    pub column: &'static str,
    pub open_tags: usize,
    pub close_tags: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScannedField {
    pub entity: &'static str,
    pub column: &'static str,
    pub rows: usize,
}

/// Outcome of a read-only integrity scan.
#[derive(Debug, Clone, Serialize)]
pub struct CheckReport {
    pub rows_scanned: usize,
    pub passes: Vec<ScannedField>,
    pub mismatches: Vec<PreTagMismatch>,
}

/// Scans every convertible field for unbalanced `<pre>`/`</pre>` markers.
/// Purely diagnostic: mismatches are logged and collected, never raised,
/// and nothing is written.
pub fn check_all(connection: &Connection) -> Result<CheckReport> {
    let mut passes = Vec::new();
    let mut mismatches = Vec::new();
    let mut rows_scanned = 0usize;

    for field in TEXT_FIELDS {
        let rows = store::for_each_text_row(connection, field, |_, row| {
            let (open_tags, close_tags) = pre_tag_line_counts(&row.text);
            if open_tags != close_tags {
                warn!(
                    entity = field.entity.name(),
                    id = row.id,
                    column = field.column,
                    open_tags,
                    close_tags,
                    "mismatched number of <pre> and </pre> markers"
                );
                mismatches.push(PreTagMismatch {
                    entity: field.entity.name(),
                    id: row.id,
                    column: field.column,
                    open_tags,
                    close_tags,
                });
            }
            Ok(())
        })?;
        rows_scanned += rows;
        passes.push(ScannedField {
            entity: field.entity.name(),
            column: field.column,
            rows,
        });
    }

    Ok(CheckReport {
        rows_scanned,
        passes,
        mismatches,
    })
}

/// Counts lines containing an opening and a closing preformatted marker.
/// Line-based substring counts only: repeated markers on one line count
/// once, and interleaving is invisible to this scan.
fn pre_tag_line_counts(text: &str) -> (usize, usize) {
    let mut open_tags = 0usize;
    let mut close_tags = 0usize;
    for line in text.lines() {
        if line.contains("<pre>") {
            open_tags += 1;
        }
        if line.contains("</pre>") {
            close_tags += 1;
        }
    }
    (open_tags, close_tags)
}

#[cfg(test)]
mod tests {
    use super::{check_all, pre_tag_line_counts};
    use crate::fields::{Entity, TEXT_FIELDS};
    use crate::store::fixtures::{
        SEED_TIMESTAMP, insert_row, seeded_connection, text_of, updated_on_of,
    };

    #[test]
    fn line_counts_are_per_line_not_per_occurrence() {
        assert_eq!(pre_tag_line_counts(""), (0, 0));
        assert_eq!(pre_tag_line_counts("<pre>\ncode\n</pre>"), (1, 1));
        assert_eq!(pre_tag_line_counts("<pre></pre>"), (1, 1));
        assert_eq!(pre_tag_line_counts("<pre><pre>\n</pre>"), (1, 1));
        assert_eq!(pre_tag_line_counts("plain text"), (0, 0));
    }

    #[test]
    fn unbalanced_record_yields_exactly_one_mismatch() {
        let (_temp, connection) = seeded_connection();
        let field = &TEXT_FIELDS[2];
        assert_eq!(field.entity, Entity::Issue);
        insert_row(
            &connection,
            field.table,
            field.column,
            7,
            "<pre>\nfirst\n<pre>\nsecond\n</pre>",
        );
        insert_row(
            &connection,
            field.table,
            field.column,
            8,
            "<pre>\nbalanced\n</pre>",
        );

        let report = check_all(&connection).expect("check");

        assert_eq!(report.mismatches.len(), 1);
        let mismatch = &report.mismatches[0];
        assert_eq!(mismatch.entity, "Issue");
        assert_eq!(mismatch.id, 7);
        assert_eq!(mismatch.column, "description");
        assert_eq!(mismatch.open_tags, 2);
        assert_eq!(mismatch.close_tags, 1);
    }

    #[test]
    fn balanced_and_markerless_records_yield_no_mismatch() {
        let (_temp, connection) = seeded_connection();
        for (offset, field) in TEXT_FIELDS.iter().enumerate() {
            insert_row(
                &connection,
                field.table,
                field.column,
                offset as i64 + 1,
                "no markers here",
            );
        }

        let report = check_all(&connection).expect("check");

        assert_eq!(report.rows_scanned, TEXT_FIELDS.len());
        assert!(report.mismatches.is_empty());
    }

    #[test]
    fn check_never_mutates_data() {
        let (_temp, connection) = seeded_connection();
        let field = &TEXT_FIELDS[0];
        insert_row(&connection, field.table, field.column, 1, "<pre>\nbroken");

        let report = check_all(&connection).expect("check");

        assert_eq!(report.mismatches.len(), 1);
        assert_eq!(
            text_of(&connection, field.table, field.column, 1).as_deref(),
            Some("<pre>\nbroken")
        );
        assert_eq!(updated_on_of(&connection, field.table, 1), SEED_TIMESTAMP);
    }

    #[test]
    fn equal_counts_from_interleaved_markers_pass_the_scan() {
        // The heuristic compares totals only; ordering is not inspected.
        assert_eq!(pre_tag_line_counts("</pre>\n<pre>"), (1, 1));
    }
}
