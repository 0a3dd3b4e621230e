//! Federated descriptive statistics for STRATA-FIT node datasets.
//!
//! Algorithms run against each simulated node's local CSV data and return
//! privacy-filtered partial results. The [`crate::core::orchestrator::Orchestrator`]
//! plays the part of the federation: it registers organizations, dispatches
//! task runs and keeps their results.

pub mod algorithms;
pub mod client;
pub mod config;
pub mod core;
pub mod data;
pub mod report;
pub mod stats;
pub mod web;
