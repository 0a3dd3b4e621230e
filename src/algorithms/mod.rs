//! Algorithms executed on the simulated nodes
//!
//! Each algorithm exposes a set of methods; the orchestrator routes a task to
//! the algorithm that provides its method.

pub mod basic_stats;
pub mod common;
pub mod kaplan_meier;
pub mod schema;
pub mod strata_fit;

use std::sync::Arc;

use crate::core::algorithm::Algorithm;

// Re-export algorithms for convenience
pub use basic_stats::BasicStats;
pub use kaplan_meier::KaplanMeier;
pub use strata_fit::StrataFitStats;

/// Every algorithm shipped with the crate
pub fn default_algorithms() -> Vec<Arc<dyn Algorithm>> {
    vec![
        Arc::new(StrataFitStats::new()),
        Arc::new(BasicStats::new()),
        Arc::new(KaplanMeier::new()),
    ]
}
