use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use futures::future::join_all;
use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::algorithms::common::measure_execution_time;
use crate::core::algorithm::{
    Algorithm, AlgorithmError, SubtaskDispatcher, TaskContext, TaskInput,
};
use crate::core::metrics::{MetricsConfig, MetricsManager, RunMetrics};
use crate::core::task::{RunRecord, RunStatus, TaskRecord, TaskRequest, TaskStatus};
use crate::data::{DataError, Dataset, DatasetSource};
use crate::stats::PRIVACY_THRESHOLD;

/// Errors raised by the mock federation itself, as opposed to a run
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("No registered algorithm provides method '{0}'")]
    UnknownMethod(String),

    #[error("Unknown organization: {0}")]
    UnknownOrganization(u64),

    #[error("A task needs at least one organization")]
    NoOrganizations,

    #[error("Task not found: {0}")]
    TaskNotFound(u64),

    #[error(transparent)]
    Data(#[from] DataError),
}

/// Configuration for the orchestrator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Counts below this value are suppressed by every method
    pub privacy_threshold: usize,
    /// Name of the single collaboration
    pub collaboration_name: String,
    /// Metrics collection settings
    pub metrics: MetricsConfig,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            privacy_threshold: PRIVACY_THRESHOLD,
            collaboration_name: "strata-fit".to_string(),
            metrics: MetricsConfig::default(),
        }
    }
}

/// A simulated data-holding party
#[derive(Debug, Clone, Serialize)]
pub struct Organization {
    pub id: u64,
    pub name: String,
    /// Where the datasets were loaded from
    pub sources: Vec<DatasetSource>,
    #[serde(skip)]
    datasets: Arc<Vec<Dataset>>,
}

/// The collaboration grouping all organizations
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Collaboration {
    pub id: u64,
    pub name: String,
    pub organizations: Vec<u64>,
}

/// Mock federation client.
///
/// Holds the simulated organizations and their datasets, dispatches task runs
/// to the registered algorithms, and keeps task records and results in memory.
/// Registration happens through `&mut self` before the orchestrator is shared;
/// task execution only needs `&self`.
#[derive(Debug)]
pub struct Orchestrator {
    /// Registered algorithms by name
    algorithms: HashMap<String, Arc<dyn Algorithm>>,
    /// Organizations by id
    organizations: BTreeMap<u64, Organization>,
    /// Task records by id
    tasks: DashMap<u64, TaskRecord>,
    /// Next task identifier
    next_task_id: AtomicU64,
    /// Run metrics
    metrics: MetricsManager,
    config: OrchestratorConfig,
    started_at: DateTime<Utc>,
}

impl Orchestrator {
    pub fn new(config: OrchestratorConfig) -> Self {
        Self {
            algorithms: HashMap::new(),
            organizations: BTreeMap::new(),
            tasks: DashMap::new(),
            next_task_id: AtomicU64::new(1),
            metrics: MetricsManager::new(config.metrics.clone()),
            config,
            started_at: Utc::now(),
        }
    }

    /// Register an algorithm; a previous algorithm with the same name is replaced
    pub fn register_algorithm(&mut self, algorithm: Arc<dyn Algorithm>) {
        let name = algorithm.name().to_string();
        if self.algorithms.contains_key(&name) {
            warn!("Replacing existing algorithm: {}", name);
        }
        info!("Registered algorithm {} with methods {:?}", name, algorithm.methods());
        self.algorithms.insert(name, algorithm);
    }

    /// Register an organization, loading its datasets. Ids are assigned from 0.
    pub fn register_organization(
        &mut self,
        name: &str,
        sources: Vec<DatasetSource>,
    ) -> Result<u64, OrchestratorError> {
        let datasets = sources
            .iter()
            .map(DatasetSource::load)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(self.register_organization_with_data(name, sources, datasets))
    }

    /// Register an organization whose datasets are already in memory
    pub fn register_organization_with_data(
        &mut self,
        name: &str,
        sources: Vec<DatasetSource>,
        datasets: Vec<Dataset>,
    ) -> u64 {
        let id = self.organizations.len() as u64;
        info!(
            "Registered organization {} ({}) with {} dataset(s)",
            id,
            name,
            datasets.len()
        );
        self.organizations.insert(
            id,
            Organization {
                id,
                name: name.to_string(),
                sources,
                datasets: Arc::new(datasets),
            },
        );
        id
    }

    pub fn organizations(&self) -> Vec<&Organization> {
        self.organizations.values().collect()
    }

    pub fn organization(&self, id: u64) -> Option<&Organization> {
        self.organizations.get(&id)
    }

    pub fn collaboration(&self) -> Collaboration {
        Collaboration {
            id: 1,
            name: self.config.collaboration_name.clone(),
            organizations: self.organizations.keys().copied().collect(),
        }
    }

    pub fn algorithms(&self) -> Vec<serde_json::Value> {
        let mut infos: Vec<_> = self.algorithms.values().map(|a| a.get_info()).collect();
        infos.sort_by(|a, b| a["name"].as_str().cmp(&b["name"].as_str()));
        infos
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub fn metrics(&self) -> &MetricsManager {
        &self.metrics
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Create a task, run it on every listed organization and return the finished record
    pub async fn create_task(&self, request: TaskRequest) -> Result<TaskRecord, OrchestratorError> {
        self.run_task(request, None).await
    }

    /// Get a task record
    pub fn task(&self, id: u64) -> Option<TaskRecord> {
        self.tasks.get(&id).map(|entry| entry.value().clone())
    }

    /// All task records, ordered by id
    pub fn tasks(&self) -> Vec<TaskRecord> {
        let mut tasks: Vec<_> = self.tasks.iter().map(|e| e.value().clone()).collect();
        tasks.sort_by_key(|t| t.id);
        tasks
    }

    /// Run results of a task
    pub fn results(&self, task_id: u64) -> Result<Vec<RunRecord>, OrchestratorError> {
        self.tasks
            .get(&task_id)
            .map(|entry| entry.runs.clone())
            .ok_or(OrchestratorError::TaskNotFound(task_id))
    }

    fn resolve_algorithm(&self, method: &str) -> Option<Arc<dyn Algorithm>> {
        let mut names: Vec<_> = self.algorithms.keys().collect();
        names.sort();
        names
            .into_iter()
            .map(|name| &self.algorithms[name])
            .find(|algorithm| algorithm.supports(method))
            .cloned()
    }

    async fn run_task(
        &self,
        request: TaskRequest,
        parent_id: Option<u64>,
    ) -> Result<TaskRecord, OrchestratorError> {
        let algorithm = self
            .resolve_algorithm(&request.input.method)
            .ok_or_else(|| OrchestratorError::UnknownMethod(request.input.method.clone()))?;
        if request.organizations.is_empty() {
            return Err(OrchestratorError::NoOrganizations);
        }
        let organizations = request
            .organizations
            .iter()
            .map(|id| {
                self.organizations
                    .get(id)
                    .ok_or(OrchestratorError::UnknownOrganization(*id))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let id = self.next_task_id.fetch_add(1, Ordering::SeqCst);
        let name = if request.name.is_empty() {
            request.input.method.clone()
        } else {
            request.name.clone()
        };
        self.tasks.insert(
            id,
            TaskRecord {
                id,
                parent_id,
                name,
                description: request.description.clone(),
                input: request.input.clone(),
                organizations: request.organizations.clone(),
                status: TaskStatus::Pending,
                created_at: Utc::now(),
                finished_at: None,
                runs: Vec::new(),
            },
        );
        info!(
            "Created task {} ({}) for organizations {:?}",
            id, request.input.method, request.organizations
        );
        self.set_status(id, TaskStatus::Running);

        let runs = join_all(
            organizations
                .into_iter()
                .map(|organization| self.execute_run(id, &algorithm, organization, &request.input)),
        )
        .await;

        let status = TaskRecord::status_from_runs(&runs);
        let record = {
            let mut entry = self
                .tasks
                .get_mut(&id)
                .ok_or(OrchestratorError::TaskNotFound(id))?;
            entry.status = status;
            entry.finished_at = Some(Utc::now());
            entry.runs = runs;
            entry.value().clone()
        };

        match status {
            TaskStatus::Completed => info!("Task {} completed", id),
            _ => warn!("Task {} finished with status {}", id, status),
        }
        Ok(record)
    }

    fn set_status(&self, id: u64, status: TaskStatus) {
        if let Some(mut entry) = self.tasks.get_mut(&id) {
            entry.status = status;
        }
    }

    async fn execute_run(
        &self,
        task_id: u64,
        algorithm: &Arc<dyn Algorithm>,
        organization: &Organization,
        input: &TaskInput,
    ) -> RunRecord {
        let ctx = TaskContext {
            task_id,
            organization_id: organization.id,
            input: input.clone(),
            datasets: organization.datasets.clone(),
            privacy_threshold: self.config.privacy_threshold,
        };

        info!(
            "Executing {}.{} on organization {} ({})",
            algorithm.name(),
            input.method,
            organization.id,
            organization.name
        );
        let started_at = Utc::now();
        let (result, duration_ms) = measure_execution_time(algorithm.run(&ctx, self)).await;
        let finished_at = Utc::now();

        self.metrics
            .record_run(RunMetrics {
                timestamp: finished_at,
                task_id,
                organization_id: organization.id,
                method: input.method.clone(),
                duration_ms,
                success: result.is_ok(),
            })
            .await;

        let (status, result, log) = match result {
            Ok(value) => {
                info!(
                    "Organization {} finished {} in {:.2} ms",
                    organization.id, input.method, duration_ms
                );
                (RunStatus::Completed, Some(value), None)
            }
            Err(e) => {
                error!(
                    "Organization {} failed {}: {}",
                    organization.id, input.method, e
                );
                (RunStatus::Failed, None, Some(e.to_string()))
            }
        };

        RunRecord {
            id: Uuid::new_v4(),
            task_id,
            organization_id: organization.id,
            status,
            result,
            log,
            started_at,
            finished_at,
            duration_ms,
        }
    }
}

impl Default for Orchestrator {
    fn default() -> Self {
        Self::new(OrchestratorConfig::default())
    }
}

#[async_trait]
impl SubtaskDispatcher for Orchestrator {
    fn organization_ids(&self) -> Vec<u64> {
        self.organizations.keys().copied().collect()
    }

    async fn create_subtask(
        &self,
        parent_task_id: u64,
        input: TaskInput,
        organizations: Vec<u64>,
    ) -> Result<Vec<RunRecord>, AlgorithmError> {
        debug!(
            "Task {} creates subtask {} on {:?}",
            parent_task_id, input.method, organizations
        );
        let request = TaskRequest {
            name: format!("subtask-{}", input.method),
            description: format!("Subtask of task {}", parent_task_id),
            input,
            organizations,
        };
        self.run_task(request, Some(parent_task_id))
            .await
            .map(|record| record.runs)
            .map_err(|e| AlgorithmError::Dispatch(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    /// Echoes the row count, fails for organizations without data
    #[derive(Debug)]
    struct RowCount;

    #[async_trait]
    impl Algorithm for RowCount {
        fn name(&self) -> &str {
            "row_count"
        }

        fn methods(&self) -> &[&'static str] {
            &["rows", "rows_everywhere"]
        }

        async fn run(
            &self,
            ctx: &TaskContext,
            client: &dyn SubtaskDispatcher,
        ) -> Result<serde_json::Value, AlgorithmError> {
            match ctx.input.method.as_str() {
                "rows" => Ok(json!({ "rows": ctx.first_dataset()?.row_count() })),
                _ => {
                    let runs = client
                        .create_subtask(ctx.task_id, TaskInput::new("rows"), client.organization_ids())
                        .await?;
                    let total: u64 = runs
                        .iter()
                        .filter_map(|r| r.result.as_ref())
                        .filter_map(|v| v["rows"].as_u64())
                        .sum();
                    Ok(json!({ "rows": total }))
                }
            }
        }
    }

    fn orchestrator() -> Orchestrator {
        let mut orchestrator = Orchestrator::default();
        orchestrator.register_algorithm(Arc::new(RowCount));
        let a = Dataset::from_csv_str("x\n1\n2\n").unwrap();
        let b = Dataset::from_csv_str("x\n1\n2\n3\n").unwrap();
        orchestrator.register_organization_with_data("alpha", Vec::new(), vec![a]);
        orchestrator.register_organization_with_data("beta", Vec::new(), vec![b]);
        orchestrator.register_organization_with_data("empty", Vec::new(), Vec::new());
        orchestrator
    }

    #[test]
    fn test_new_orchestrator() {
        let orchestrator = Orchestrator::default();
        assert!(orchestrator.organizations().is_empty());
        assert!(orchestrator.tasks().is_empty());
        assert_eq!(orchestrator.config().privacy_threshold, PRIVACY_THRESHOLD);
    }

    #[test]
    fn test_organization_ids_are_sequential() {
        let orchestrator = orchestrator();
        assert_eq!(orchestrator.organization_ids(), vec![0, 1, 2]);
        assert_eq!(orchestrator.collaboration().organizations, vec![0, 1, 2]);
        assert_eq!(orchestrator.organization(1).unwrap().name, "beta");
    }

    #[tokio::test]
    async fn test_create_task_runs_each_organization() {
        let orchestrator = orchestrator();
        let record = orchestrator
            .create_task(TaskRequest::new(TaskInput::new("rows"), vec![0, 1]))
            .await
            .unwrap();

        assert_eq!(record.status, TaskStatus::Completed);
        assert_eq!(record.runs.len(), 2);
        assert_eq!(record.runs[0].result, Some(json!({"rows": 2})));
        assert_eq!(record.runs[1].result, Some(json!({"rows": 3})));

        let results = orchestrator.results(record.id).unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(orchestrator.metrics().summary().await.total_runs, 2);
    }

    #[tokio::test]
    async fn test_failed_run_does_not_abort_others() {
        let orchestrator = orchestrator();
        let record = orchestrator
            .create_task(TaskRequest::new(TaskInput::new("rows"), vec![2, 0]))
            .await
            .unwrap();

        assert_eq!(record.status, TaskStatus::Failed);
        assert_eq!(record.runs[0].status, RunStatus::Failed);
        assert!(record.runs[0].log.as_deref().unwrap().contains("No dataset"));
        assert_eq!(record.runs[1].status, RunStatus::Completed);
    }

    #[tokio::test]
    async fn test_task_validation() {
        let orchestrator = orchestrator();
        assert!(matches!(
            orchestrator
                .create_task(TaskRequest::new(TaskInput::new("nope"), vec![0]))
                .await,
            Err(OrchestratorError::UnknownMethod(_))
        ));
        assert!(matches!(
            orchestrator
                .create_task(TaskRequest::new(TaskInput::new("rows"), vec![]))
                .await,
            Err(OrchestratorError::NoOrganizations)
        ));
        assert!(matches!(
            orchestrator
                .create_task(TaskRequest::new(TaskInput::new("rows"), vec![9]))
                .await,
            Err(OrchestratorError::UnknownOrganization(9))
        ));
        assert!(matches!(
            orchestrator.results(42),
            Err(OrchestratorError::TaskNotFound(42))
        ));
    }

    #[tokio::test]
    async fn test_central_method_creates_subtask() {
        let orchestrator = orchestrator();
        let record = orchestrator
            .create_task(TaskRequest::new(TaskInput::new("rows_everywhere"), vec![0]))
            .await
            .unwrap();

        // the subtask fails on the organization without data, the rest still sums
        assert_eq!(record.runs[0].result, Some(json!({"rows": 5})));

        let tasks = orchestrator.tasks();
        assert_eq!(tasks.len(), 2);
        let subtask = tasks.iter().find(|t| t.parent_id == Some(record.id)).unwrap();
        assert_eq!(subtask.organizations, vec![0, 1, 2]);
        assert_eq!(subtask.status, TaskStatus::Failed);
    }
}
