//! Bulk importer for denormalized game-data extracts.
//!
//! Streams huge source files (whole-file JSON arrays, CSV) in bounded
//! chunks, deduplicates shared stat/criterion tuples into singleton
//! tables, and loads entities plus their junction rows one transaction
//! per chunk so a mid-run fault costs at most one chunk.

pub mod cli;
pub mod datasets;
pub mod extract;
pub mod importer;
pub mod mapper;
pub mod reader;
pub mod report;
pub mod schema;

pub use cli::{Cli, Commands};
pub use importer::{validate_sources, ImportOptions, Importer};
pub use report::{DatasetReport, RunSummary};
