//! Generic column statistics driven by keyword arguments.

use std::collections::BTreeMap;

use async_trait::async_trait;
use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::algorithms::common::{enforce_output_schema, require_columns};
use crate::algorithms::schema::Validate;
use crate::core::algorithm::{Algorithm, AlgorithmError, SubtaskDispatcher, TaskContext};
use crate::data::{Cell, Dataset};
use crate::stats::{self, defined, mask_count, privacy::masked_label, round_to, MaskedCount};

/// Statistic over a numeric column
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NumericStat {
    Count,
    Mean,
    Std,
    Median,
    Min,
    Max,
}

impl NumericStat {
    pub fn as_str(&self) -> &'static str {
        match self {
            NumericStat::Count => "count",
            NumericStat::Mean => "mean",
            NumericStat::Std => "std",
            NumericStat::Median => "median",
            NumericStat::Min => "min",
            NumericStat::Max => "max",
        }
    }

    fn compute(&self, values: &[f64]) -> f64 {
        match self {
            NumericStat::Count => values.len() as f64,
            NumericStat::Mean => stats::mean(values),
            NumericStat::Std => stats::std(values),
            NumericStat::Median => stats::median(values),
            NumericStat::Min => stats::min(values),
            NumericStat::Max => stats::max(values),
        }
    }
}

/// Statistic over a text column
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CategoricalStat {
    Count,
    Unique,
}

impl CategoricalStat {
    pub fn as_str(&self) -> &'static str {
        match self {
            CategoricalStat::Count => "count",
            CategoricalStat::Unique => "unique",
        }
    }
}

const DEFAULT_NUMERIC_STATS: [NumericStat; 4] = [
    NumericStat::Count,
    NumericStat::Mean,
    NumericStat::Std,
    NumericStat::Median,
];

const DEFAULT_CATEGORICAL_STATS: [CategoricalStat; 2] =
    [CategoricalStat::Count, CategoricalStat::Unique];

/// A reported statistic: a value, `null` when undefined, or a masked label
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StatValue {
    Masked(String),
    Value(Option<f64>),
}

/// Keyword arguments of `flexible_stats`
#[derive(Debug, Clone, PartialEq)]
pub struct FlexibleStatsParams {
    pub numeric_stats: Vec<NumericStat>,
    pub categorical_stats: Vec<CategoricalStat>,
    pub group_by: Option<String>,
}

impl Default for FlexibleStatsParams {
    fn default() -> Self {
        Self {
            numeric_stats: DEFAULT_NUMERIC_STATS.to_vec(),
            categorical_stats: DEFAULT_CATEGORICAL_STATS.to_vec(),
            group_by: None,
        }
    }
}

impl FlexibleStatsParams {
    pub fn from_context(ctx: &TaskContext) -> Result<Self, AlgorithmError> {
        let defaults = Self::default();
        Ok(Self {
            numeric_stats: ctx
                .param("numeric_stats")?
                .unwrap_or(defaults.numeric_stats),
            categorical_stats: ctx
                .param("categorical_stats")?
                .unwrap_or(defaults.categorical_stats),
            group_by: ctx.param("group_by")?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlexibleStatsOutput {
    /// Rows in the dataset
    pub rows: MaskedCount,
    /// Grouping column, when numeric stats were taken over groups
    pub group_by: Option<String>,
    /// Column name to statistic name to value
    pub numeric: BTreeMap<String, BTreeMap<String, StatValue>>,
    pub categorical: BTreeMap<String, BTreeMap<String, StatValue>>,
}

impl Validate for FlexibleStatsOutput {
    fn validate(&self) -> Result<(), String> {
        if let Some(group) = &self.group_by {
            if self.numeric.contains_key(group) || self.categorical.contains_key(group) {
                return Err(format!("grouping column '{}' must not be summarized", group));
            }
        }
        for (column, values) in self.numeric.iter().chain(&self.categorical) {
            for (stat, value) in values {
                if let StatValue::Masked(label) = value {
                    if !label.starts_with('<') {
                        return Err(format!(
                            "{}.{} holds an unexpected label '{}'",
                            column, stat, label
                        ));
                    }
                }
            }
        }
        Ok(())
    }
}

fn summarize_numeric(
    values: &[f64],
    observations: usize,
    requested: &[NumericStat],
    threshold: usize,
) -> BTreeMap<String, StatValue> {
    requested
        .iter()
        .map(|stat| {
            let value = if observations < threshold {
                StatValue::Masked(masked_label(threshold))
            } else {
                StatValue::Value(defined(round_to(stat.compute(values), 3)))
            };
            (stat.as_str().to_string(), value)
        })
        .collect()
}

/// Numeric summary with one observation per group.
///
/// `count` reports the average number of values per group; every other
/// statistic is taken over the per-group means.
fn summarize_grouped(
    dataset: &Dataset,
    column: &str,
    groups: &BTreeMap<String, Vec<usize>>,
    requested: &[NumericStat],
    threshold: usize,
) -> BTreeMap<String, StatValue> {
    let numeric = dataset.numeric(column);
    let mut counts = Vec::with_capacity(groups.len());
    let mut means = Vec::with_capacity(groups.len());
    for rows in groups.values() {
        let values: Vec<Option<f64>> = rows.iter().map(|&r| numeric[r]).collect();
        let present = stats::present(&values);
        counts.push(present.len() as f64);
        if !present.is_empty() {
            means.push(stats::mean(&present));
        }
    }

    requested
        .iter()
        .map(|stat| {
            let value = if means.len() < threshold {
                StatValue::Masked(masked_label(threshold))
            } else if *stat == NumericStat::Count {
                StatValue::Value(defined(round_to(stats::mean(&counts), 3)))
            } else {
                StatValue::Value(defined(round_to(stat.compute(&means), 3)))
            };
            (stat.as_str().to_string(), value)
        })
        .collect()
}

fn summarize_categorical(
    dataset: &Dataset,
    column: &str,
    requested: &[CategoricalStat],
    threshold: usize,
) -> BTreeMap<String, StatValue> {
    requested
        .iter()
        .map(|stat| {
            let n = match stat {
                CategoricalStat::Count => dataset
                    .column(column)
                    .map(|c| c.cells.iter().filter(|cell| !cell.is_missing()).count())
                    .unwrap_or(0),
                CategoricalStat::Unique => dataset.nunique(column),
            };
            let value = match mask_count(n, threshold) {
                MaskedCount::Count(n) => StatValue::Value(Some(n as f64)),
                MaskedCount::Masked(label) => StatValue::Masked(label),
            };
            (stat.as_str().to_string(), value)
        })
        .collect()
}

fn is_categorical_column(dataset: &Dataset, column: &str) -> bool {
    dataset
        .column(column)
        .map(|c| c.cells.iter().any(|cell| matches!(cell, Cell::Text(_))))
        .unwrap_or(false)
}

/// Summaries of every numeric and text column, optionally grouped
pub fn flexible_stats(
    dataset: &Dataset,
    params: &FlexibleStatsParams,
    threshold: usize,
) -> Result<FlexibleStatsOutput, AlgorithmError> {
    info!("Executing flexible_stats");
    debug!("flexible_stats parameters: {:?}", params);

    let groups = match &params.group_by {
        Some(column) => {
            require_columns(dataset, &[column.as_str()])?;
            Some(dataset.group_rows(column))
        }
        None => None,
    };

    let mut numeric = BTreeMap::new();
    let mut categorical = BTreeMap::new();
    for name in dataset.column_names() {
        if params.group_by.as_deref() == Some(name) {
            continue;
        }
        if dataset.is_numeric_column(name) {
            if params.numeric_stats.is_empty() {
                continue;
            }
            let summary = match &groups {
                Some(groups) => {
                    summarize_grouped(dataset, name, groups, &params.numeric_stats, threshold)
                }
                None => {
                    let values = stats::present(&dataset.numeric(name));
                    summarize_numeric(&values, values.len(), &params.numeric_stats, threshold)
                }
            };
            numeric.insert(name.to_string(), summary);
        } else if is_categorical_column(dataset, name) && !params.categorical_stats.is_empty() {
            categorical.insert(
                name.to_string(),
                summarize_categorical(dataset, name, &params.categorical_stats, threshold),
            );
        }
    }

    Ok(FlexibleStatsOutput {
        rows: mask_count(dataset.row_count(), threshold),
        group_by: params.group_by.clone(),
        numeric,
        categorical,
    })
}

/// The `basic_stats` algorithm
#[derive(Debug, Default)]
pub struct BasicStats;

impl BasicStats {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Algorithm for BasicStats {
    fn name(&self) -> &str {
        "basic_stats"
    }

    fn methods(&self) -> &[&'static str] {
        &["flexible_stats"]
    }

    async fn run(
        &self,
        ctx: &TaskContext,
        _client: &dyn SubtaskDispatcher,
    ) -> Result<serde_json::Value, AlgorithmError> {
        match ctx.input.method.as_str() {
            "flexible_stats" => {
                let params = FlexibleStatsParams::from_context(ctx)?;
                let output = flexible_stats(ctx.first_dataset()?, &params, ctx.privacy_threshold)?;
                enforce_output_schema("flexible_stats", output)
            }
            other => Err(AlgorithmError::UnknownMethod(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::algorithm::{MockSubtaskDispatcher, TaskInput};
    use serde_json::json;
    use std::sync::Arc;

    fn dataset() -> Dataset {
        Dataset::from_csv_str(
            "pat_ID,value,category\n\
             1,10,a\n\
             1,20,b\n\
             2,30,a\n\
             2,,a\n\
             3,40,b\n\
             4,50,a\n\
             5,60,c\n",
        )
        .unwrap()
    }

    fn context(kwargs: serde_json::Value) -> TaskContext {
        TaskContext {
            task_id: 1,
            organization_id: 0,
            input: TaskInput::with_kwargs("flexible_stats", kwargs),
            datasets: Arc::new(vec![dataset()]),
            privacy_threshold: 5,
        }
    }

    fn value(v: f64) -> StatValue {
        StatValue::Value(Some(v))
    }

    #[test]
    fn test_ungrouped_defaults() {
        let output = flexible_stats(&dataset(), &FlexibleStatsParams::default(), 5).unwrap();
        let summary = &output.numeric["value"];
        assert_eq!(summary["count"], value(6.0));
        assert_eq!(summary["mean"], value(35.0));
        assert_eq!(summary["std"], value(18.708));
        assert_eq!(summary["median"], value(35.0));
        assert!(!summary.contains_key("min"));

        // seven values but only three categories
        let category = &output.categorical["category"];
        assert_eq!(category["count"], value(7.0));
        assert_eq!(category["unique"], StatValue::Masked("<5".to_string()));
        assert_eq!(output.rows, MaskedCount::Count(7));
    }

    #[test]
    fn test_ungrouped_small_column_is_masked() {
        let df = Dataset::from_csv_str("age,site\n40,a\n,a\n52,b\n61,b\n").unwrap();
        let params = FlexibleStatsParams {
            numeric_stats: vec![
                NumericStat::Count,
                NumericStat::Mean,
                NumericStat::Std,
                NumericStat::Median,
                NumericStat::Min,
                NumericStat::Max,
            ],
            ..FlexibleStatsParams::default()
        };
        let output = flexible_stats(&df, &params, 5).unwrap();

        // three ages present
        let age = &output.numeric["age"];
        assert_eq!(age.len(), 6);
        assert!(age.values().all(|v| *v == StatValue::Masked("<5".to_string())));
        assert!(output.categorical["site"]
            .values()
            .all(|v| *v == StatValue::Masked("<5".to_string())));
        assert_eq!(output.rows, MaskedCount::Masked("<5".to_string()));
        assert!(output.validate().is_ok());

        // the same column is released once enough values are present
        let output = flexible_stats(&df, &params, 3).unwrap();
        assert_eq!(output.numeric["age"]["count"], value(3.0));
        assert_eq!(output.numeric["age"]["max"], value(61.0));
        assert_eq!(output.rows, MaskedCount::Count(4));
    }

    #[test]
    fn test_grouped_by_patient() {
        let params = FlexibleStatsParams {
            numeric_stats: vec![NumericStat::Count, NumericStat::Mean, NumericStat::Median],
            categorical_stats: Vec::new(),
            group_by: Some("pat_ID".to_string()),
        };
        let output = flexible_stats(&dataset(), &params, 5).unwrap();
        assert!(!output.numeric.contains_key("pat_ID"));
        assert!(output.categorical.is_empty());

        // per-patient means are 15, 30, 40, 50 and 60
        let summary = &output.numeric["value"];
        assert_eq!(summary["count"], value(1.2));
        assert_eq!(summary["mean"], value(39.0));
        assert_eq!(summary["median"], value(40.0));
        assert!(output.validate().is_ok());
    }

    #[test]
    fn test_small_groups_are_masked() {
        let params = FlexibleStatsParams {
            group_by: Some("pat_ID".to_string()),
            ..FlexibleStatsParams::default()
        };
        let output = flexible_stats(&dataset(), &params, 6).unwrap();
        assert!(output.numeric["value"]
            .values()
            .all(|v| *v == StatValue::Masked("<6".to_string())));
    }

    #[test]
    fn test_params_from_kwargs() {
        let params = FlexibleStatsParams::from_context(&context(json!({
            "numeric_stats": ["min", "max"],
            "group_by": "pat_ID"
        })))
        .unwrap();
        assert_eq!(params.numeric_stats, vec![NumericStat::Min, NumericStat::Max]);
        assert_eq!(params.categorical_stats, DEFAULT_CATEGORICAL_STATS.to_vec());
        assert_eq!(params.group_by.as_deref(), Some("pat_ID"));

        let err = FlexibleStatsParams::from_context(&context(json!({"numeric_stats": ["mode"]})))
            .unwrap_err();
        assert!(matches!(err, AlgorithmError::InvalidParameter { name, .. } if name == "numeric_stats"));
    }

    #[test]
    fn test_unknown_group_column() {
        let params = FlexibleStatsParams {
            group_by: Some("site".to_string()),
            ..FlexibleStatsParams::default()
        };
        assert!(matches!(
            flexible_stats(&dataset(), &params, 5),
            Err(AlgorithmError::MissingColumns(cols)) if cols == vec!["site"]
        ));
    }

    #[tokio::test]
    async fn test_flexible_stats_method() {
        let ctx = context(json!({"numeric_stats": ["count"], "group_by": "pat_ID"}));
        let client = MockSubtaskDispatcher::new();
        let result = BasicStats::new().run(&ctx, &client).await.unwrap();
        assert_eq!(result["group_by"], json!("pat_ID"));
        assert_eq!(result["numeric"]["value"]["count"], json!(1.2));
        assert_eq!(result["rows"], json!(7));
    }
}
