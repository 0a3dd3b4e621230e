//! Visual summaries of collected results

pub mod boxplot;

use std::path::PathBuf;

use thiserror::Error;

pub use boxplot::{render_boxplot, BoxSummary, PLOT_TITLE};

/// Errors raised while rendering a report
#[derive(Debug, Error)]
pub enum ReportError {
    /// The plotting backend failed
    #[error("Failed to draw {path}: {reason}")]
    Drawing { path: PathBuf, reason: String },

    /// The result does not hold the expected section
    #[error("Result has no usable '{0}' section")]
    MissingSection(String),

    #[error("Malformed result: {0}")]
    Malformed(#[from] serde_json::Error),
}
