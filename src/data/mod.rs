//! Node datasets: CSV loading and typed column access.

pub mod frame;
pub mod loader;

use std::path::PathBuf;

use thiserror::Error;

pub use frame::{Cell, Column, Dataset};
pub use loader::{DatasetSource, DbType};

/// Errors raised while loading or accessing a node dataset
#[derive(Debug, Error)]
pub enum DataError {
    /// The dataset file could not be opened
    #[error("Failed to open dataset {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Malformed CSV content
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// The same column name appears twice in the header
    #[error("Duplicate column in header: {0}")]
    DuplicateColumn(String),

    /// The source declares a database type we cannot read
    #[error("Unsupported database type: {0}")]
    UnsupportedSource(String),
}
