use thiserror::Error;

use crate::fields::Entity;

/// Pandoc is missing, its version output is unparsable, or it is too old.
/// Raised before the conversion transaction opens, so no data is touched.
#[derive(Debug, Error)]
#[error("unusable Pandoc installation: {reason}")]
pub struct ToolVersionError {
    pub reason: String,
}

/// Pandoc could not be invoked for a given text or exited non-zero.
/// Fatal to the whole run; there is no per-record recovery.
#[derive(Debug, Error)]
#[error("text conversion failed: {reason}")]
pub struct ConversionError {
    pub reason: String,
}

/// An UPDATE against the content database failed or matched no row.
#[derive(Debug, Error)]
#[error("failed to persist {}({})", .entity.name(), .id)]
pub struct PersistenceError {
    pub entity: Entity,
    pub id: i64,
    #[source]
    pub source: rusqlite::Error,
}
