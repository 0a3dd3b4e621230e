//! STRATA-FIT descriptive statistics computed on a node's visit table.
//!
//! Each function mirrors one section of the `partial_stats` report and
//! validates its own output before returning it.

use async_trait::async_trait;
use log::info;

use crate::algorithms::common::{enforce_output_schema, require_columns, validated};
use crate::algorithms::schema::{
    DemographicsOutput, DiseaseDurationDistributionOutput, LabPanel, LabValueAggregated,
    LabValueOverall, MissingDataPerVisitOutput, PartialStatsOutput, UniquePatientsOutput,
    VisitDefinitionOutput, VisitsPerTimePeriodOutput, LAB_VARIABLES,
};
use crate::core::algorithm::{Algorithm, AlgorithmError, SubtaskDispatcher, TaskContext};
use crate::data::Dataset;
use crate::stats::{self, defined, mask_count, round_to, safe_counts_and_proportions_groupwise};

pub const PATIENT_ID: &str = "pat_ID";
pub const VISIT_MONTHS: &str = "Visit_months_from_diagnosis";
pub const AGE_DIAGNOSIS: &str = "Age_diagnosis";
pub const YEAR_DIAGNOSIS: &str = "Year_diagnosis";

/// Treatment columns compared between consecutive visits
pub const DMARD_COLUMNS: [&str; 6] = ["csDMARD1", "csDMARD2", "csDMARD3", "bDMARD", "tsDMARD", "GC"];

/// Disease-activity variables; a visit without any of them carries no assessment
pub const DISEASE_ACTIVITY_COLUMNS: [&str; 8] = [
    "DAS28",
    "ESR",
    "CRP",
    "TJC28",
    "SJC28",
    "Pat_global",
    "Ph_global",
    "Pain",
];

/// Categorical demographics reported as privacy-filtered counts
pub const CATEGORICAL_DEMOGRAPHICS: [&str; 3] = ["Sex", "RF_positivity", "anti_CCP"];

/// Number of distinct patients, masked below the privacy threshold
pub fn unique_patients(
    df: &Dataset,
    threshold: usize,
) -> Result<UniquePatientsOutput, AlgorithmError> {
    info!("Executing unique_patients");
    require_columns(df, &[PATIENT_ID])?;

    let count = df.nunique(PATIENT_ID);
    let output = UniquePatientsOutput {
        unique_patients: mask_count(count, threshold),
    };
    if output.unique_patients.is_masked() {
        info!("Privacy filter: unique patient count below {} masked", threshold);
    }
    validated("unique_patients", output)
}

/// Count follow-up visits that neither change treatment nor record disease activity
pub fn check_visit_definition(df: &Dataset) -> Result<VisitDefinitionOutput, AlgorithmError> {
    info!("Executing check_visit_definition");
    require_columns(df, &[PATIENT_ID, VISIT_MONTHS])?;

    let dmard: Vec<&str> = DMARD_COLUMNS
        .into_iter()
        .filter(|c| df.has_column(c))
        .collect();
    let activity: Vec<&str> = DISEASE_ACTIVITY_COLUMNS
        .into_iter()
        .filter(|c| df.has_column(c))
        .collect();

    let mut invalid_visits = 0;
    for rows in df.group_rows(PATIENT_ID).values() {
        let visits = df.sort_rows_by(rows, VISIT_MONTHS);
        for pair in visits.windows(2) {
            let (previous, current) = (pair[0], pair[1]);
            let treatment_unchanged = dmard
                .iter()
                .all(|col| df.cell(col, current) == df.cell(col, previous));
            let activity_missing = activity.iter().all(|col| df.cell(col, current).is_missing());
            if treatment_unchanged && activity_missing {
                invalid_visits += 1;
            }
        }
    }

    validated("check_visit_definition", VisitDefinitionOutput { invalid_visits })
}

/// Visits per month of follow-up, summarized over patients
pub fn visits_per_time_period(df: &Dataset) -> Result<VisitsPerTimePeriodOutput, AlgorithmError> {
    info!("Executing visits_per_time_period");
    require_columns(df, &[PATIENT_ID, VISIT_MONTHS])?;

    let months = df.numeric(VISIT_MONTHS);
    let rates: Vec<f64> = df
        .group_rows(PATIENT_ID)
        .values()
        .filter_map(|rows| {
            if rows.len() < 2 {
                return None;
            }
            let visit_months: Vec<Option<f64>> = rows.iter().map(|&r| months[r]).collect();
            let present = stats::present(&visit_months);
            let follow_up = stats::max(&present) - stats::min(&present);
            // NaN follow-up fails the comparison as well
            if follow_up > 0.0 {
                Some(rows.len() as f64 / follow_up)
            } else {
                None
            }
        })
        .collect();

    let output = VisitsPerTimePeriodOutput {
        visit_rate_mean: defined(round_to(stats::mean(&rates), 3)),
        visit_rate_std: defined(round_to(stats::std(&rates), 3)),
        visit_rate_median: defined(round_to(stats::median(&rates), 3)),
        total_patients: df.nunique(PATIENT_ID) as u64,
    };
    validated("visits_per_time_period", output)
}

/// Share of visits where every disease-activity variable is missing
pub fn missing_data_per_visit(df: &Dataset) -> Result<MissingDataPerVisitOutput, AlgorithmError> {
    info!("Executing missing_data_per_visit");
    require_columns(df, &DISEASE_ACTIVITY_COLUMNS)?;

    let total_visits = df.row_count();
    let count_all_missing = (0..total_visits)
        .filter(|&row| {
            DISEASE_ACTIVITY_COLUMNS
                .iter()
                .all(|col| df.cell(col, row).is_missing())
        })
        .count();
    let percent_all_missing = if total_visits > 0 {
        round_to(count_all_missing as f64 / total_visits as f64 * 100.0, 2)
    } else {
        0.0
    };

    let output = MissingDataPerVisitOutput {
        count_all_missing: count_all_missing as u64,
        total_visits: total_visits as u64,
        percent_all_missing,
    };
    validated("missing_data_per_visit", output)
}

/// Age at diagnosis and privacy-filtered categorical breakdowns
pub fn demographics_stats(
    df: &Dataset,
    threshold: usize,
) -> Result<DemographicsOutput, AlgorithmError> {
    info!("Executing demographics_stats");
    let mut required = vec![AGE_DIAGNOSIS];
    required.extend(CATEGORICAL_DEMOGRAPHICS);
    require_columns(df, &required)?;

    let ages = stats::present(&df.numeric(AGE_DIAGNOSIS));
    let (sex_counts, sex_proportions) =
        safe_counts_and_proportions_groupwise(&df.value_counts("Sex"), threshold);
    let (rf_positivity_counts, rf_positivity_proportions) =
        safe_counts_and_proportions_groupwise(&df.value_counts("RF_positivity"), threshold);
    let (anti_ccp_counts, anti_ccp_proportions) =
        safe_counts_and_proportions_groupwise(&df.value_counts("anti_CCP"), threshold);

    let output = DemographicsOutput {
        age_mean: defined(round_to(stats::mean(&ages), 2)),
        age_std: defined(round_to(stats::std(&ages), 2)),
        sex_counts,
        sex_proportions,
        rf_positivity_counts,
        rf_positivity_proportions,
        anti_ccp_counts,
        anti_ccp_proportions,
    };
    info!("Privacy-safe demographics computed");
    validated("demographics_stats", output)
}

/// Distribution of the diagnosis year, one value per patient
pub fn disease_duration_distribution(
    df: &Dataset,
) -> Result<DiseaseDurationDistributionOutput, AlgorithmError> {
    info!("Executing disease_duration_distribution");
    require_columns(df, &[YEAR_DIAGNOSIS, PATIENT_ID])?;

    // first recorded year per patient; text years are dropped after selection
    let years: Vec<f64> = df
        .group_rows(PATIENT_ID)
        .values()
        .filter_map(|rows| {
            rows.iter()
                .map(|&r| df.cell(YEAR_DIAGNOSIS, r))
                .find(|cell| !cell.is_missing())
                .and_then(|cell| cell.as_f64())
        })
        .collect();

    let output = DiseaseDurationDistributionOutput {
        year_diagnosis_mean: defined(round_to(stats::mean(&years), 2)),
        year_diagnosis_std: defined(round_to(stats::std(&years), 2)),
        year_diagnosis_skewness: defined(round_to(stats::skew(&years), 2)),
    };
    validated("disease_duration_distribution", output)
}

/// Visit-level summary of every lab variable
pub fn lab_values_stats_overall(
    df: &Dataset,
) -> Result<LabPanel<LabValueOverall>, AlgorithmError> {
    info!("Executing lab_values_stats_overall");
    require_columns(df, &LAB_VARIABLES)?;

    let panel = LabPanel::try_from_fn(|variable| {
        let values = stats::present(&df.numeric(variable));
        Ok::<_, AlgorithmError>(LabValueOverall {
            mean: defined(round_to(stats::mean(&values), 2)),
            std: defined(round_to(stats::std(&values), 2)),
            skewness: defined(round_to(stats::skew(&values), 2)),
            outlier_count: stats::iqr_outlier_count(&values) as u64,
        })
    })?;
    validated("lab_values_stats_overall", panel)
}

/// Summary of per-patient mean lab values, so no single visit is exposed
pub fn lab_values_stats_aggregated(
    df: &Dataset,
) -> Result<LabPanel<LabValueAggregated>, AlgorithmError> {
    info!("Executing lab_values_stats_aggregated");
    if !df.has_column(PATIENT_ID) {
        return Err(AlgorithmError::invalid_parameter(
            PATIENT_ID,
            "grouping requested but the column was not found",
        ));
    }
    require_columns(df, &LAB_VARIABLES)?;

    let patients = df.group_rows(PATIENT_ID);
    let panel = LabPanel::try_from_fn(|variable| {
        let column = df.numeric(variable);
        let means: Vec<f64> = patients
            .values()
            .map(|rows| {
                let values: Vec<Option<f64>> = rows.iter().map(|&r| column[r]).collect();
                stats::mean(&stats::present(&values))
            })
            .filter(|m| !m.is_nan())
            .collect();
        Ok::<_, AlgorithmError>(LabValueAggregated {
            mean: defined(round_to(stats::mean(&means), 2)),
            std: defined(round_to(stats::std(&means), 2)),
            median: defined(round_to(stats::median(&means), 2)),
            q1: defined(round_to(stats::quantile(&means, 0.25), 2)),
            q3: defined(round_to(stats::quantile(&means, 0.75), 2)),
        })
    })?;
    validated("lab_values_stats_aggregated", panel)
}

/// Every section of the report for one node
pub fn compute_partial_stats(
    df: &Dataset,
    threshold: usize,
) -> Result<PartialStatsOutput, AlgorithmError> {
    let output = PartialStatsOutput {
        unique_patients_per_center: unique_patients(df, threshold)?,
        check_visit_definition: check_visit_definition(df)?,
        visits_per_time_period: visits_per_time_period(df)?,
        missing_data_per_visit: missing_data_per_visit(df)?,
        demographics: demographics_stats(df, threshold)?,
        disease_duration_distribution: disease_duration_distribution(df)?,
        laboratory_values_overall: lab_values_stats_overall(df)?,
        laboratory_values_grouped_by_pat_id: lab_values_stats_aggregated(df)?,
    };
    validated("compute_partial_stats", output)
}

/// The `strata_fit_stats` algorithm
#[derive(Debug, Default)]
pub struct StrataFitStats;

impl StrataFitStats {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Algorithm for StrataFitStats {
    fn name(&self) -> &str {
        "strata_fit_stats"
    }

    fn methods(&self) -> &[&'static str] {
        &["partial_stats"]
    }

    async fn run(
        &self,
        ctx: &TaskContext,
        _client: &dyn SubtaskDispatcher,
    ) -> Result<serde_json::Value, AlgorithmError> {
        match ctx.input.method.as_str() {
            "partial_stats" => {
                let df = ctx.first_dataset()?;
                let output = compute_partial_stats(df, ctx.privacy_threshold)?;
                enforce_output_schema("partial_stats", output)
            }
            other => Err(AlgorithmError::UnknownMethod(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::algorithm::{MockSubtaskDispatcher, TaskInput};
    use crate::stats::{MaskedCount, MaskedProportion};
    use std::sync::Arc;

    fn csv(content: &str) -> Dataset {
        Dataset::from_csv_str(content).unwrap()
    }

    /// Header with every column the report reads
    const FULL_HEADER: &str = "pat_ID,Visit_months_from_diagnosis,Age_diagnosis,Sex,RF_positivity,anti_CCP,Year_diagnosis,csDMARD1,csDMARD2,csDMARD3,bDMARD,tsDMARD,GC,DAS28,ESR,CRP,TJC28,SJC28,Pat_global,Ph_global,Pain";

    /// Six patients with two visits and four with one; every category has at least five rows
    fn full_dataset() -> Dataset {
        let mut content = String::from(FULL_HEADER);
        for patient in 1..=6 {
            let sex = if patient % 2 == 0 { "F" } else { "M" };
            for (visit, months) in [0, 6].into_iter().enumerate() {
                let crp = patient as f64 + visit as f64;
                content.push_str(&format!(
                    "\n{p},{m},{age},{sex},1,1,{year},MTX,,,,,,3.2,20,{crp},2,1,40,30,35",
                    p = patient,
                    m = months,
                    age = 40 + patient,
                    sex = sex,
                    year = 2000 + patient,
                    crp = crp,
                ));
            }
        }
        for (patient, sex) in [(7, "F"), (8, "F"), (9, "M"), (10, "M")] {
            content.push_str(&format!(
                "\n{p},0,50,{sex},1,1,2010,MTX,,,,,,3.0,15,5,1,1,30,30,30",
                p = patient,
                sex = sex
            ));
        }
        csv(&content)
    }

    #[test]
    fn test_unique_patients_masks_small_centers() {
        let df = csv("pat_ID\n1\n1\n2\n3\n\n");
        let output = unique_patients(&df, 5).unwrap();
        assert_eq!(output.unique_patients, MaskedCount::Masked("<5".to_string()));

        let df = csv("pat_ID\n1\n2\n3\n4\n5\n5\n");
        let output = unique_patients(&df, 5).unwrap();
        assert_eq!(output.unique_patients, MaskedCount::Count(5));

        let df = csv("id\n1\n");
        assert!(matches!(
            unique_patients(&df, 5),
            Err(AlgorithmError::MissingColumns(cols)) if cols == vec!["pat_ID"]
        ));
    }

    #[test]
    fn test_check_visit_definition_sorts_visits() {
        // patient 1 in chronological order: 0 (assessed), 3 and 6 (no change, no assessment)
        let df = csv(
            "pat_ID,Visit_months_from_diagnosis,csDMARD1,GC,DAS28,CRP\n\
             1,6,MTX,,,\n\
             1,0,MTX,,3.1,\n\
             1,3,MTX,,,\n\
             2,0,MTX,,2.0,\n\
             2,6,LEF,,,\n\
             2,12,LEF,,,5\n",
        );
        let output = check_visit_definition(&df).unwrap();
        assert_eq!(output.invalid_visits, 2);
    }

    #[test]
    fn test_check_visit_definition_treatment_change_is_valid() {
        let df = csv(
            "pat_ID,Visit_months_from_diagnosis,GC,DAS28\n\
             1,0,,4.0\n\
             1,3,1,\n\
             1,6,,\n",
        );
        assert_eq!(check_visit_definition(&df).unwrap().invalid_visits, 0);
    }

    #[test]
    fn test_visits_per_time_period() {
        let df = csv(
            "pat_ID,Visit_months_from_diagnosis\n\
             1,0\n1,6\n1,12\n\
             2,0\n2,4\n\
             3,5\n\
             4,3\n4,3\n",
        );
        let output = visits_per_time_period(&df).unwrap();
        // rates are 3/12 and 2/4; single-visit and zero follow-up patients have none
        assert_eq!(output.visit_rate_mean, Some(0.375));
        assert_eq!(output.visit_rate_std, Some(0.177));
        assert_eq!(output.visit_rate_median, Some(0.375));
        assert_eq!(output.total_patients, 4);
    }

    #[test]
    fn test_visits_per_time_period_without_rates() {
        let df = csv("pat_ID,Visit_months_from_diagnosis\n1,0\n2,3\n");
        let output = visits_per_time_period(&df).unwrap();
        assert_eq!(output.visit_rate_mean, None);
        assert_eq!(output.visit_rate_std, None);
        assert_eq!(output.visit_rate_median, None);
        assert_eq!(output.total_patients, 2);
    }

    #[test]
    fn test_missing_data_per_visit() {
        let df = csv(
            "DAS28,ESR,CRP,TJC28,SJC28,Pat_global,Ph_global,Pain\n\
             3.1,,,,,,,\n\
             ,,,,,,,\n\
             ,,,,,,,4\n",
        );
        let output = missing_data_per_visit(&df).unwrap();
        assert_eq!(output.count_all_missing, 1);
        assert_eq!(output.total_visits, 3);
        assert_eq!(output.percent_all_missing, 33.33);

        let empty = csv("DAS28,ESR,CRP,TJC28,SJC28,Pat_global,Ph_global,Pain\n");
        assert_eq!(missing_data_per_visit(&empty).unwrap().percent_all_missing, 0.0);
    }

    #[test]
    fn test_missing_data_lists_every_absent_column() {
        let df = csv("DAS28,ESR,CRP\n1,2,3\n");
        match missing_data_per_visit(&df) {
            Err(AlgorithmError::MissingColumns(cols)) => {
                assert_eq!(cols, vec!["TJC28", "SJC28", "Pat_global", "Ph_global", "Pain"])
            }
            other => panic!("expected missing columns, got {:?}", other),
        }
    }

    #[test]
    fn test_demographics_stats() {
        let df = csv(
            "Age_diagnosis,Sex,RF_positivity,anti_CCP\n\
             30,F,1,1\n40,F,1,1\n50,F,1,1\n60,F,1,1\n70,F,1,1\n\
             30,F,0,0\n40,M,0,0\n50,M,0,0\n60,M,0,0\n70,M,0,\n",
        );
        let output = demographics_stats(&df, 5).unwrap();
        assert_eq!(output.age_mean, Some(50.0));
        assert_eq!(output.age_std, Some(14.91));

        // four men put every Sex group under the mask
        assert!(output.sex_counts.values().all(MaskedCount::is_masked));
        assert_eq!(
            output.sex_proportions["F"],
            MaskedProportion::Masked("masked".to_string())
        );

        assert_eq!(output.rf_positivity_counts["1"], MaskedCount::Count(5));
        assert_eq!(
            output.rf_positivity_proportions["0"],
            MaskedProportion::Proportion(0.5)
        );

        // the missing anti_CCP value forms its own group of one
        assert!(output.anti_ccp_counts.contains_key("NaN"));
        assert!(output.anti_ccp_counts.values().all(MaskedCount::is_masked));
    }

    #[test]
    fn test_demographics_requires_columns() {
        let df = csv("Age_diagnosis,Sex\n40,F\n");
        match demographics_stats(&df, 5) {
            Err(AlgorithmError::MissingColumns(cols)) => {
                assert_eq!(cols, vec!["RF_positivity", "anti_CCP"])
            }
            other => panic!("expected missing columns, got {:?}", other),
        }
    }

    #[test]
    fn test_disease_duration_uses_first_year_per_patient() {
        let df = csv(
            "pat_ID,Year_diagnosis\n\
             1,2000\n1,2001\n\
             2,\n2,2004\n\
             3,2010\n\
             4,unknown\n4,2020\n\
             ,1990\n",
        );
        let output = disease_duration_distribution(&df).unwrap();
        assert_eq!(output.year_diagnosis_mean, Some(2004.67));
        assert_eq!(output.year_diagnosis_std, Some(5.03));
        assert_eq!(output.year_diagnosis_skewness, Some(0.59));
    }

    #[test]
    fn test_disease_duration_requires_patient_id() {
        let df = csv("Year_diagnosis\n2000\n");
        assert!(matches!(
            disease_duration_distribution(&df),
            Err(AlgorithmError::MissingColumns(cols)) if cols == vec!["pat_ID"]
        ));
    }

    #[test]
    fn test_lab_values_overall() {
        let df = csv(
            "CRP,ESR,TJC28,SJC28,DAS28,Pat_global,Ph_global,Pain\n\
             1,10,0,0,3,,,\n\
             2,10,0,0,3,,,\n\
             3,10,0,0,3,,,\n\
             4,10,0,0,3,,,\n\
             100,10,0,0,3,,,\n",
        );
        let panel = lab_values_stats_overall(&df).unwrap();
        assert_eq!(panel.crp.mean, Some(22.0));
        assert_eq!(panel.crp.std, Some(43.62));
        assert_eq!(panel.crp.skewness, Some(2.23));
        assert_eq!(panel.crp.outlier_count, 1);

        assert_eq!(panel.esr.std, Some(0.0));
        assert_eq!(panel.esr.skewness, Some(0.0));
        assert_eq!(panel.esr.outlier_count, 0);

        assert_eq!(panel.pain.mean, None);
        assert_eq!(panel.pain.outlier_count, 0);
    }

    #[test]
    fn test_lab_values_aggregated_per_patient() {
        let df = csv(
            "pat_ID,CRP,ESR,TJC28,SJC28,DAS28,Pat_global,Ph_global,Pain\n\
             1,1,,,,,,,\n\
             1,3,,,,,,,\n\
             2,4,,,,,,,\n\
             3,,,,,,,,\n\
             4,6,,,,,,,\n\
             4,8,,,,,,,\n",
        );
        let panel = lab_values_stats_aggregated(&df).unwrap();
        // per-patient means are 2, 4 and 7
        assert_eq!(panel.crp.mean, Some(4.33));
        assert_eq!(panel.crp.std, Some(2.52));
        assert_eq!(panel.crp.median, Some(4.0));
        assert_eq!(panel.crp.q1, Some(3.0));
        assert_eq!(panel.crp.q3, Some(5.5));
        assert_eq!(panel.esr.mean, None);
    }

    #[test]
    fn test_lab_values_aggregated_requires_patient_id() {
        let df = csv("CRP,ESR,TJC28,SJC28,DAS28,Pat_global,Ph_global,Pain\n1,1,1,1,1,1,1,1\n");
        assert!(matches!(
            lab_values_stats_aggregated(&df),
            Err(AlgorithmError::InvalidParameter { name, .. }) if name == "pat_ID"
        ));
    }

    #[test]
    fn test_compute_partial_stats() {
        let output = compute_partial_stats(&full_dataset(), 5).unwrap();
        assert_eq!(
            output.unique_patients_per_center.unique_patients,
            MaskedCount::Count(10)
        );
        // second visits keep MTX but record disease activity
        assert_eq!(output.check_visit_definition.invalid_visits, 0);
        assert_eq!(output.visits_per_time_period.total_patients, 10);
        assert_eq!(output.visits_per_time_period.visit_rate_mean, Some(0.333));
        assert_eq!(output.missing_data_per_visit.total_visits, 16);
        assert_eq!(output.demographics.sex_counts["F"], MaskedCount::Count(8));
        assert_eq!(
            output.demographics.sex_proportions["M"],
            MaskedProportion::Proportion(0.5)
        );

        let json = serde_json::to_value(&output).unwrap();
        assert!(json["demographics"]["Age_mean"].is_number());
        assert!(json["laboratory_values_grouped_by_pat_id"]["CRP"]["Q1"].is_number());
        let back: PartialStatsOutput = serde_json::from_value(json).unwrap();
        assert_eq!(back.missing_data_per_visit, output.missing_data_per_visit);
    }

    #[tokio::test]
    async fn test_partial_stats_method() {
        let algorithm = StrataFitStats::new();
        let ctx = TaskContext {
            task_id: 1,
            organization_id: 0,
            input: TaskInput::new("partial_stats"),
            datasets: Arc::new(vec![full_dataset()]),
            privacy_threshold: 5,
        };
        let client = MockSubtaskDispatcher::new();

        let result = algorithm.run(&ctx, &client).await.unwrap();
        assert_eq!(result["unique_patients_per_center"]["unique_patients"], 10);

        let ctx = TaskContext {
            input: TaskInput::new("central"),
            ..ctx
        };
        assert!(matches!(
            algorithm.run(&ctx, &client).await,
            Err(AlgorithmError::UnknownMethod(_))
        ));
    }
}
