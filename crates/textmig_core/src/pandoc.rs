use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::thread;

use anyhow::Result;

use crate::error::{ConversionError, ToolVersionError};

pub const DEFAULT_PANDOC_PROGRAM: &str = "pandoc";

pub const REQUIRED_PANDOC_VERSION: ToolVersion = ToolVersion {
    major: 1,
    minor: 13,
    patch: 0,
};

/// Fixed invocation: Textile in, Markdown out with fenced code blocks and
/// loose list parsing, ATX-style headers.
const PANDOC_ARGS: &[&str] = &[
    "-f",
    "textile",
    "-t",
    "markdown+fenced_code_blocks+lists_without_preceding_blankline",
    "--atx-header",
];

/// Narrow conversion seam so tests can swap the real tool for a stub.
pub trait TextConverter {
    fn convert(&self, source: &str) -> Result<String>;
}

/// A `major.minor.patch` tool version. Components compare numerically;
/// dotted components beyond patch are ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct ToolVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl ToolVersion {
    pub fn parse(value: &str) -> Option<Self> {
        let mut parts = value.split('.');
        let major = parts.next()?.parse().ok()?;
        let minor = parts.next().unwrap_or("0").parse().ok()?;
        let patch = parts.next().unwrap_or("0").parse().ok()?;
        Some(Self {
            major,
            minor,
            patch,
        })
    }
}

impl fmt::Display for ToolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// Second whitespace-delimited token of `pandoc --version` output.
pub fn parse_version_output(output: &str) -> Option<ToolVersion> {
    let token = output.split_whitespace().nth(1)?;
    ToolVersion::parse(token)
}

/// The external Pandoc installation used for every conversion.
#[derive(Debug, Clone)]
pub struct PandocTool {
    program: PathBuf,
}

impl PandocTool {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Runs the version probe and parses the reported version.
    pub fn probe_version(&self) -> Result<ToolVersion> {
        let output = Command::new(&self.program)
            .arg("--version")
            .output()
            .map_err(|err| ToolVersionError {
                reason: format!("failed to run {} --version: {err}", self.program.display()),
            })?;
        if !output.status.success() {
            return Err(ToolVersionError {
                reason: format!(
                    "{} --version exited with {}",
                    self.program.display(),
                    output.status
                ),
            }
            .into());
        }
        let stdout = String::from_utf8_lossy(&output.stdout);
        parse_version_output(&stdout).ok_or_else(|| {
            anyhow::Error::new(ToolVersionError {
                reason: format!(
                    "could not parse version from {} --version output",
                    self.program.display()
                ),
            })
        })
    }

    /// Aborts the run before any data is touched when the installed Pandoc
    /// is older than the minimum the Textile reader requires.
    pub fn check_required_version(&self) -> Result<()> {
        let version = self.probe_version()?;
        if version < REQUIRED_PANDOC_VERSION {
            return Err(ToolVersionError {
                reason: format!("found {version}, required >= {REQUIRED_PANDOC_VERSION}"),
            }
            .into());
        }
        Ok(())
    }
}

impl TextConverter for PandocTool {
    fn convert(&self, source: &str) -> Result<String> {
        let mut child = Command::new(&self.program)
            .args(PANDOC_ARGS)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .spawn()
            .map_err(|err| ConversionError {
                reason: format!("failed to run {}: {err}", self.program.display()),
            })?;

        // Feed stdin from a separate thread so neither pipe can fill up and
        // deadlock against the child.
        let mut stdin = child.stdin.take().ok_or_else(|| {
            anyhow::Error::new(ConversionError {
                reason: "child stdin was not captured".to_string(),
            })
        })?;
        let payload = source.as_bytes().to_vec();
        let writer = thread::spawn(move || stdin.write_all(&payload));

        let output = child.wait_with_output().map_err(|err| ConversionError {
            reason: format!("failed to read {} output: {err}", self.program.display()),
        })?;
        if !output.status.success() {
            return Err(ConversionError {
                reason: format!("{} exited with {}", self.program.display(), output.status),
            }
            .into());
        }
        match writer.join() {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                return Err(ConversionError {
                    reason: format!(
                        "failed to write source text to {}: {err}",
                        self.program.display()
                    ),
                }
                .into());
            }
            Err(_) => {
                return Err(ConversionError {
                    reason: "stdin writer thread panicked".to_string(),
                }
                .into());
            }
        }

        String::from_utf8(output.stdout).map_err(|_| {
            anyhow::Error::new(ConversionError {
                reason: format!("{} produced non-UTF-8 output", self.program.display()),
            })
        })
    }
}
