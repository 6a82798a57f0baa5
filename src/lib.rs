//! EPUB Anatomy
//!
//! Inspect, validate and rewrite EPUB archives. The CLI lives in main.rs.
//!
//! # Modules
//!
//! - `epub`: Reading side (container, package document, table of contents)
//! - `validate`: Structural checks producing a report of issues
//! - `merge`: Concatenate several books into one
//! - `cover`: Set a cover image
//! - `rewrite`: ZIP output with the EPUB entry-order rules

pub mod config;
pub mod cover;
pub mod epub;
pub mod error;
pub mod merge;
pub mod path;
pub mod rewrite;
pub mod validate;
pub mod xml;

#[cfg(test)]
mod test_support;

pub use config::{Compression, Config};
pub use cover::{set_cover, CoverSummary};
pub use epub::{BookSummary, EpubArchive, TocEntry, TocSource};
pub use error::{EpubError, Result};
pub use merge::{merge, MergeSummary};
pub use validate::{validate, Issue, IssueCode, Report, Severity};
