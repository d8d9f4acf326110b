use std::env;
use std::path::PathBuf;

use anyhow::{Result, bail};

use crate::pandoc::DEFAULT_PANDOC_PROGRAM;

pub const DATABASE_ENV_VAR: &str = "TEXTMIG_DATABASE";
pub const PANDOC_ENV_VAR: &str = "TEXTMIG_PANDOC";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueSource {
    Flag,
    Env,
    Default,
}

impl ValueSource {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Flag => "flag",
            Self::Env => "env",
            Self::Default => "default",
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct RuntimeOverrides {
    pub database: Option<PathBuf>,
    pub pandoc: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct ResolvedRuntime {
    pub database_path: PathBuf,
    pub pandoc_program: PathBuf,
    pub database_source: ValueSource,
    pub pandoc_source: ValueSource,
}

impl ResolvedRuntime {
    pub fn diagnostics(&self) -> String {
        format!(
            "database={} ({})\npandoc={} ({})",
            self.database_path.to_string_lossy(),
            self.database_source.as_str(),
            self.pandoc_program.to_string_lossy(),
            self.pandoc_source.as_str(),
        )
    }
}

/// Resolves the content database and the Pandoc program from flags and
/// environment. The database has no sensible default and must be given.
pub fn resolve_runtime(overrides: &RuntimeOverrides) -> Result<ResolvedRuntime> {
    resolve_runtime_with_lookup(overrides, |key| env::var(key).ok())
}

fn resolve_runtime_with_lookup<F>(
    overrides: &RuntimeOverrides,
    lookup_env: F,
) -> Result<ResolvedRuntime>
where
    F: Fn(&str) -> Option<String>,
{
    let (database_path, database_source) = if let Some(path) = overrides.database.clone() {
        (path, ValueSource::Flag)
    } else if let Some(value) = lookup_env(DATABASE_ENV_VAR) {
        (PathBuf::from(value.trim()), ValueSource::Env)
    } else {
        bail!("no content database given; pass --database <PATH> or set {DATABASE_ENV_VAR}");
    };

    let (pandoc_program, pandoc_source) = if let Some(path) = overrides.pandoc.clone() {
        (path, ValueSource::Flag)
    } else if let Some(value) = lookup_env(PANDOC_ENV_VAR) {
        (PathBuf::from(value.trim()), ValueSource::Env)
    } else {
        (PathBuf::from(DEFAULT_PANDOC_PROGRAM), ValueSource::Default)
    };

    Ok(ResolvedRuntime {
        database_path,
        pandoc_program,
        database_source,
        pandoc_source,
    })
}
