//! Mock client behind `strata-fit-stats run`.

use std::path::{Path, PathBuf};

use clap::Args;
use config::ConfigError;
use log::info;
use thiserror::Error;

use crate::config::{OrganizationSettings, Settings};
use crate::core::algorithm::TaskInput;
use crate::core::orchestrator::OrchestratorError;
use crate::core::task::{TaskRecord, TaskRequest};
use crate::data::DatasetSource;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("failed to load settings: {0}")]
    Settings(#[from] ConfigError),

    #[error("invalid --kwargs: {0}")]
    Kwargs(String),

    #[error(transparent)]
    Orchestrator(#[from] OrchestratorError),
}

#[derive(Debug, Clone, Args)]
pub struct RunArgs {
    /// One organization per CSV file; defaults to the configured organizations
    #[arg(long = "data", value_name = "CSV", num_args = 1..)]
    pub data: Vec<PathBuf>,
    /// Method to run
    #[arg(long, default_value = "partial_stats")]
    pub method: String,
    /// Keyword arguments as a JSON object
    #[arg(long, default_value = "{}")]
    pub kwargs: String,
    /// Organization ids to run on; defaults to all
    #[arg(long, value_name = "ID", num_args = 1..)]
    pub organizations: Vec<u64>,
    /// Write the aggregated lab box plot of the first result to this SVG file
    #[arg(long, value_name = "SVG")]
    pub plot: Option<PathBuf>,
    /// Settings file layered over settings/strata.toml
    #[arg(long)]
    pub config: Option<PathBuf>,
}

impl RunArgs {
    /// `partial_stats` over the given CSV files
    pub fn new(data: Vec<PathBuf>) -> Self {
        Self {
            data,
            method: "partial_stats".to_string(),
            kwargs: "{}".to_string(),
            organizations: Vec::new(),
            plot: None,
            config: None,
        }
    }
}

/// A finished mock run
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub record: TaskRecord,
    /// Organization names indexed by id
    pub organization_names: Vec<String>,
    /// Runs that did not complete
    pub failed: usize,
}

/// Organization name for a CSV file: its stem
pub fn organization_name(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// One organization per CSV file
pub fn organizations_from_csv(paths: &[PathBuf]) -> Vec<OrganizationSettings> {
    paths
        .iter()
        .map(|path| OrganizationSettings {
            name: organization_name(path),
            databases: vec![DatasetSource::csv(path)],
        })
        .collect()
}

/// Keyword arguments must be a JSON object
pub fn parse_kwargs(raw: &str) -> Result<serde_json::Value, ClientError> {
    let kwargs: serde_json::Value =
        serde_json::from_str(raw).map_err(|e| ClientError::Kwargs(e.to_string()))?;
    if !kwargs.is_object() {
        return Err(ClientError::Kwargs(format!("expected a JSON object, got {}", kwargs)));
    }
    Ok(kwargs)
}

/// Register the organizations, run the task on them and collect the outcome
pub async fn run(args: &RunArgs, settings: &Settings) -> Result<RunOutcome, ClientError> {
    let kwargs = parse_kwargs(&args.kwargs)?;

    let mut settings = settings.clone();
    if !args.data.is_empty() {
        settings.organizations = organizations_from_csv(&args.data);
    }

    let orchestrator = settings.build_orchestrator()?;
    let organizations = if args.organizations.is_empty() {
        orchestrator.collaboration().organizations
    } else {
        args.organizations.clone()
    };

    let request = TaskRequest::new(TaskInput::with_kwargs(&args.method, kwargs), organizations);
    let record = orchestrator.create_task(request).await?;
    let failed = record.runs.iter().filter(|r| !r.is_success()).count();
    info!(
        "Task {} finished: {} of {} runs failed",
        record.id,
        failed,
        record.runs.len()
    );

    Ok(RunOutcome {
        organization_names: orchestrator
            .organizations()
            .iter()
            .map(|o| o.name.clone())
            .collect(),
        record,
        failed,
    })
}
