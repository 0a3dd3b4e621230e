//! Federated Kaplan-Meier survival estimate.
//!
//! Each node reports an event table of time bins, each holding at least
//! `threshold` subjects; the central method merges the tables and evaluates
//! the product-limit estimator over the pooled risk sets. No subject-level
//! row leaves a node.

use async_trait::async_trait;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::algorithms::common::{enforce_output_schema, require_columns};
use crate::algorithms::schema::Validate;
use crate::core::algorithm::{
    Algorithm, AlgorithmError, SubtaskDispatcher, TaskContext, TaskInput,
};
use crate::data::Dataset;

pub const PARTIAL_METHOD: &str = "kaplan_meier_partial";
pub const CENTRAL_METHOD: &str = "kaplan_meier_central";

/// Columns that identify time, event and (optionally) subject
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SurvivalColumns {
    pub time_column_name: String,
    pub censor_column_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patient_id_column: Option<String>,
}

impl SurvivalColumns {
    pub fn from_context(ctx: &TaskContext) -> Result<Self, AlgorithmError> {
        Ok(Self {
            time_column_name: ctx.required_param("time_column_name")?,
            censor_column_name: ctx.required_param("censor_column_name")?,
            patient_id_column: ctx.param("patient_id_column")?,
        })
    }
}

/// Events and censorings in one time bin, reported at the bin's last time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventCount {
    pub time: f64,
    /// Subjects with the event at `time`
    pub observed: u64,
    /// Subjects censored at `time`
    pub censored: u64,
}

/// Event table of one node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventTable {
    pub subjects: u64,
    /// Rows in ascending time order
    pub events: Vec<EventCount>,
}

impl Validate for EventTable {
    fn validate(&self) -> Result<(), String> {
        let listed: u64 = self.events.iter().map(|e| e.observed + e.censored).sum();
        if listed != self.subjects {
            return Err(format!(
                "event table lists {} subjects, expected {}",
                listed, self.subjects
            ));
        }
        if self.events.windows(2).any(|w| w[0].time >= w[1].time) {
            return Err("event times must be strictly increasing".to_string());
        }
        Ok(())
    }
}

/// One step of the survival curve
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SurvivalPoint {
    pub time: f64,
    /// Subjects still under observation just before `time`
    pub at_risk: u64,
    pub observed: u64,
    pub censored: u64,
    /// Estimated probability of surviving past `time`
    pub survival: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KaplanMeierOutput {
    /// Organizations whose event tables were pooled
    pub organizations: Vec<u64>,
    pub total_subjects: u64,
    pub total_events: u64,
    pub curve: Vec<SurvivalPoint>,
}

impl Validate for KaplanMeierOutput {
    fn validate(&self) -> Result<(), String> {
        for point in &self.curve {
            if !(0.0..=1.0).contains(&point.survival) {
                return Err(format!(
                    "survival at {} must be within [0, 1], got {}",
                    point.time, point.survival
                ));
            }
        }
        if self.curve.windows(2).any(|w| w[1].survival > w[0].survival) {
            return Err("survival must be non-increasing".to_string());
        }
        Ok(())
    }
}

/// Binned event table over the node's subjects.
///
/// Rows without a numeric time or event are dropped. With a subject column,
/// only the first complete row of each subject counts. Sorted subjects are
/// grouped into bins of at least `threshold` subjects without splitting tied
/// times; a short trailing bin is folded into the one before it.
pub fn event_table(
    df: &Dataset,
    columns: &SurvivalColumns,
    threshold: usize,
) -> Result<EventTable, AlgorithmError> {
    info!("Executing {}", PARTIAL_METHOD);
    let mut required = vec![
        columns.time_column_name.as_str(),
        columns.censor_column_name.as_str(),
    ];
    if let Some(id) = &columns.patient_id_column {
        required.push(id.as_str());
    }
    require_columns(df, &required)?;

    let times = df.numeric(&columns.time_column_name);
    let flags = df.numeric(&columns.censor_column_name);

    let rows: Vec<usize> = match &columns.patient_id_column {
        Some(id) => df
            .group_rows(id)
            .values()
            .filter_map(|rows| {
                rows.iter()
                    .copied()
                    .find(|&r| times[r].is_some() && flags[r].is_some())
            })
            .collect(),
        None => (0..df.row_count())
            .filter(|&r| times[r].is_some() && flags[r].is_some())
            .collect(),
    };

    if rows.len() < threshold {
        return Err(AlgorithmError::Privacy(format!(
            "{} subjects with survival data, at least {} required",
            rows.len(),
            threshold
        )));
    }

    let mut subjects: Vec<(f64, bool)> = Vec::with_capacity(rows.len());
    for &r in &rows {
        let (time, flag) = match (times[r], flags[r]) {
            (Some(time), Some(flag)) => (time, flag),
            _ => continue,
        };
        let observed = if flag == 1.0 {
            true
        } else if flag == 0.0 {
            false
        } else {
            return Err(AlgorithmError::invalid_parameter(
                &columns.censor_column_name,
                format!("event indicator must be 0 or 1, got {}", flag),
            ));
        };
        subjects.push((time, observed));
    }
    subjects.sort_by(|a, b| a.0.total_cmp(&b.0));

    let mut bins: Vec<Vec<(f64, bool)>> = Vec::new();
    for subject in subjects {
        match bins.last_mut() {
            Some(bin) if bin.len() < threshold || bin.last().map(|s| s.0) == Some(subject.0) => {
                bin.push(subject)
            }
            _ => bins.push(vec![subject]),
        }
    }
    if bins.len() > 1 && bins.last().map_or(false, |bin| bin.len() < threshold) {
        if let Some(tail) = bins.pop() {
            if let Some(previous) = bins.last_mut() {
                previous.extend(tail);
            }
        }
    }

    let events: Vec<EventCount> = bins
        .iter()
        .filter_map(|bin| {
            let time = bin.last()?.0;
            let observed = bin.iter().filter(|s| s.1).count() as u64;
            Some(EventCount {
                time,
                observed,
                censored: bin.len() as u64 - observed,
            })
        })
        .collect();
    debug!("{} subjects released in {} time bins", rows.len(), events.len());

    Ok(EventTable {
        subjects: rows.len() as u64,
        events,
    })
}

/// Merge node event tables and evaluate the product-limit estimator
pub fn pooled_survival(organizations: Vec<u64>, tables: &[EventTable]) -> KaplanMeierOutput {
    let mut merged: Vec<EventCount> = tables.iter().flat_map(|t| t.events.clone()).collect();
    merged.sort_by(|a, b| a.time.total_cmp(&b.time));

    let mut pooled: Vec<EventCount> = Vec::with_capacity(merged.len());
    for event in merged {
        match pooled.last_mut() {
            Some(last) if last.time == event.time => {
                last.observed += event.observed;
                last.censored += event.censored;
            }
            _ => pooled.push(event),
        }
    }

    let total_subjects: u64 = tables.iter().map(|t| t.subjects).sum();
    let mut at_risk = total_subjects;
    let mut survival = 1.0;
    let mut total_events = 0;
    let mut curve = Vec::with_capacity(pooled.len());
    for event in pooled {
        if at_risk > 0 {
            survival *= 1.0 - event.observed as f64 / at_risk as f64;
        }
        total_events += event.observed;
        curve.push(SurvivalPoint {
            time: event.time,
            at_risk,
            observed: event.observed,
            censored: event.censored,
            survival,
        });
        at_risk = at_risk.saturating_sub(event.observed + event.censored);
    }

    KaplanMeierOutput {
        organizations,
        total_subjects,
        total_events,
        curve,
    }
}

/// The `kaplan_meier` algorithm
#[derive(Debug, Default)]
pub struct KaplanMeier;

impl KaplanMeier {
    pub fn new() -> Self {
        Self
    }

    async fn central(
        &self,
        ctx: &TaskContext,
        client: &dyn SubtaskDispatcher,
    ) -> Result<KaplanMeierOutput, AlgorithmError> {
        info!("Executing {}", CENTRAL_METHOD);
        let columns = SurvivalColumns::from_context(ctx)?;
        let organizations = ctx
            .param::<Vec<u64>>("organizations_to_include")?
            .unwrap_or_else(|| client.organization_ids());
        if organizations.is_empty() {
            return Err(AlgorithmError::invalid_parameter(
                "organizations_to_include",
                "at least one organization is required",
            ));
        }

        let input = TaskInput::with_kwargs(PARTIAL_METHOD, serde_json::to_value(&columns)?);
        let runs = client
            .create_subtask(ctx.task_id, input, organizations.clone())
            .await?;

        let mut tables = Vec::with_capacity(runs.len());
        for run in runs {
            let result = match (run.is_success(), run.result) {
                (true, Some(result)) => result,
                _ => {
                    warn!(
                        "Partial Kaplan-Meier failed on organization {}",
                        run.organization_id
                    );
                    return Err(AlgorithmError::Dispatch(format!(
                        "organization {}: {}",
                        run.organization_id,
                        run.log.unwrap_or_else(|| "no result".to_string())
                    )));
                }
            };
            tables.push(serde_json::from_value::<EventTable>(result)?);
        }

        Ok(pooled_survival(organizations, &tables))
    }
}

#[async_trait]
impl Algorithm for KaplanMeier {
    fn name(&self) -> &str {
        "kaplan_meier"
    }

    fn methods(&self) -> &[&'static str] {
        &[PARTIAL_METHOD, CENTRAL_METHOD]
    }

    async fn run(
        &self,
        ctx: &TaskContext,
        client: &dyn SubtaskDispatcher,
    ) -> Result<serde_json::Value, AlgorithmError> {
        match ctx.input.method.as_str() {
            PARTIAL_METHOD => {
                let columns = SurvivalColumns::from_context(ctx)?;
                let table = event_table(ctx.first_dataset()?, &columns, ctx.privacy_threshold)?;
                enforce_output_schema(PARTIAL_METHOD, table)
            }
            CENTRAL_METHOD => {
                let output = self.central(ctx, client).await?;
                enforce_output_schema(CENTRAL_METHOD, output)
            }
            other => Err(AlgorithmError::UnknownMethod(other.to_string())),
        }
    }
}
