//! One-shot migration of stored Textile markup to Markdown for a
//! content-management SQLite database, delegating the actual conversion to
//! an external Pandoc installation, plus a read-only scan for unbalanced
//! `<pre>` tags.

pub mod check;
pub mod convert;
pub mod error;
pub mod fields;
pub mod pandoc;
pub mod runtime;
pub mod store;
