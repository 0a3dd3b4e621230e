use std::fmt::Debug;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use thiserror::Error;

use crate::core::task::RunRecord;
use crate::data::{DataError, Dataset};

/// Error type for algorithm execution on a node
#[derive(Debug, Error)]
pub enum AlgorithmError {
    /// Required columns are absent from the node dataset
    #[error("Columns {0:?} are not present in the dataset - review the data schema adherence!")]
    MissingColumns(Vec<String>),

    /// A keyword argument is missing or malformed
    #[error("Invalid parameter '{name}': {reason}")]
    InvalidParameter { name: String, reason: String },

    /// No registered algorithm exposes the requested method
    #[error("Unknown method: {0}")]
    UnknownMethod(String),

    /// The organization has no database to run against
    #[error("No dataset attached to organization {0}")]
    NoDataset(u64),

    /// A computed output violates its schema
    #[error("Output validation error in {function}: {reason}")]
    Validation { function: String, reason: String },

    /// The data is too small to release any result
    #[error("Privacy threshold not met: {0}")]
    Privacy(String),

    /// Dataset could not be read
    #[error(transparent)]
    Data(#[from] DataError),

    /// A central method could not collect partial results
    #[error("Subtask dispatch failed: {0}")]
    Dispatch(String),

    /// Output could not be converted to JSON
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl AlgorithmError {
    pub fn invalid_parameter(name: &str, reason: impl Into<String>) -> Self {
        AlgorithmError::InvalidParameter {
            name: name.to_string(),
            reason: reason.into(),
        }
    }
}

/// Method invocation sent to each organization
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskInput {
    /// Name of the algorithm method to call
    pub method: String,
    /// Keyword arguments as a JSON object
    #[serde(default = "empty_kwargs")]
    pub kwargs: serde_json::Value,
}

fn empty_kwargs() -> serde_json::Value {
    serde_json::Value::Object(Default::default())
}

impl TaskInput {
    pub fn new(method: &str) -> Self {
        Self {
            method: method.to_string(),
            kwargs: empty_kwargs(),
        }
    }

    pub fn with_kwargs(method: &str, kwargs: serde_json::Value) -> Self {
        Self {
            method: method.to_string(),
            kwargs,
        }
    }
}

/// Everything a method sees while running on one organization
#[derive(Debug, Clone)]
pub struct TaskContext {
    /// Task being executed
    pub task_id: u64,
    /// Organization the run belongs to
    pub organization_id: u64,
    /// Method and keyword arguments
    pub input: TaskInput,
    /// Databases attached to the organization
    pub datasets: Arc<Vec<Dataset>>,
    /// Counts below this value are suppressed
    pub privacy_threshold: usize,
}

impl TaskContext {
    /// First attached database; methods operate on a single dataset
    pub fn first_dataset(&self) -> Result<&Dataset, AlgorithmError> {
        self.datasets
            .first()
            .ok_or(AlgorithmError::NoDataset(self.organization_id))
    }

    /// Optional keyword argument; `null` counts as absent
    pub fn param<T: DeserializeOwned>(&self, name: &str) -> Result<Option<T>, AlgorithmError> {
        match self.input.kwargs.get(name) {
            None | Some(serde_json::Value::Null) => Ok(None),
            Some(value) => serde_json::from_value(value.clone())
                .map(Some)
                .map_err(|e| {
                    AlgorithmError::invalid_parameter(name, format!("failed to parse: {}", e))
                }),
        }
    }

    /// Required keyword argument
    pub fn required_param<T: DeserializeOwned>(&self, name: &str) -> Result<T, AlgorithmError> {
        self.param(name)?
            .ok_or_else(|| AlgorithmError::invalid_parameter(name, "required parameter not found"))
    }
}

/// Handle through which central methods fan out partial tasks
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SubtaskDispatcher: Send + Sync {
    /// Identifiers of every organization in the collaboration
    fn organization_ids(&self) -> Vec<u64>;

    /// Run `input` on `organizations` and wait for every run to finish
    async fn create_subtask(
        &self,
        parent_task_id: u64,
        input: TaskInput,
        organizations: Vec<u64>,
    ) -> Result<Vec<RunRecord>, AlgorithmError>;
}

/// A federated algorithm: a named set of methods run on node data
#[async_trait]
pub trait Algorithm: Send + Sync + Debug {
    /// Module name, e.g. `strata_fit_stats`
    fn name(&self) -> &str;

    /// Methods this algorithm can execute
    fn methods(&self) -> &[&'static str];

    /// Execute `ctx.input.method` for one organization
    async fn run(
        &self,
        ctx: &TaskContext,
        client: &dyn SubtaskDispatcher,
    ) -> Result<serde_json::Value, AlgorithmError>;

    /// Whether the algorithm exposes `method`
    fn supports(&self, method: &str) -> bool {
        self.methods().contains(&method)
    }

    /// Descriptive information for listings
    fn get_info(&self) -> serde_json::Value {
        serde_json::json!({
            "name": self.name(),
            "methods": self.methods(),
        })
    }
}
