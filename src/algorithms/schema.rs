//! Output records of the STRATA-FIT statistics.
//!
//! Field names follow the JSON keys consumers read, hence the renames. Every
//! record implements [`Validate`], which `enforce_output_schema` runs before a
//! result leaves the node.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::stats::{MaskedCount, MaskedProportion};

/// Lab variables in reporting order
pub const LAB_VARIABLES: [&str; 8] = [
    "CRP",
    "ESR",
    "TJC28",
    "SJC28",
    "DAS28",
    "Pat_global",
    "Ph_global",
    "Pain",
];

/// Structural check run on every output
pub trait Validate {
    fn validate(&self) -> Result<(), String>;
}

fn check_non_negative(field: &str, value: Option<f64>) -> Result<(), String> {
    match value {
        Some(v) if v < 0.0 => Err(format!("{} must not be negative, got {}", field, v)),
        _ => Ok(()),
    }
}

fn check_masked_label(field: &str, count: &MaskedCount) -> Result<(), String> {
    match count {
        MaskedCount::Masked(label) if !label.starts_with('<') => {
            Err(format!("{} holds an unexpected label '{}'", field, label))
        }
        _ => Ok(()),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UniquePatientsOutput {
    /// Distinct patients, or `"<t"` below the privacy threshold
    pub unique_patients: MaskedCount,
}

impl Validate for UniquePatientsOutput {
    fn validate(&self) -> Result<(), String> {
        check_masked_label("unique_patients", &self.unique_patients)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisitDefinitionOutput {
    pub invalid_visits: u64,
}

impl Validate for VisitDefinitionOutput {
    fn validate(&self) -> Result<(), String> {
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisitsPerTimePeriodOutput {
    /// Visits per month of follow-up; `None` when no patient has a rate
    pub visit_rate_mean: Option<f64>,
    pub visit_rate_std: Option<f64>,
    pub visit_rate_median: Option<f64>,
    pub total_patients: u64,
}

impl Validate for VisitsPerTimePeriodOutput {
    fn validate(&self) -> Result<(), String> {
        check_non_negative("visit_rate_mean", self.visit_rate_mean)?;
        check_non_negative("visit_rate_std", self.visit_rate_std)?;
        check_non_negative("visit_rate_median", self.visit_rate_median)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MissingDataPerVisitOutput {
    /// Visits where every disease-activity variable is missing
    pub count_all_missing: u64,
    pub total_visits: u64,
    pub percent_all_missing: f64,
}

impl Validate for MissingDataPerVisitOutput {
    fn validate(&self) -> Result<(), String> {
        if self.count_all_missing > self.total_visits {
            return Err(format!(
                "count_all_missing ({}) exceeds total_visits ({})",
                self.count_all_missing, self.total_visits
            ));
        }
        if !(0.0..=100.0).contains(&self.percent_all_missing) {
            return Err(format!(
                "percent_all_missing must be within [0, 100], got {}",
                self.percent_all_missing
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DemographicsOutput {
    #[serde(rename = "Age_mean")]
    pub age_mean: Option<f64>,
    #[serde(rename = "Age_std")]
    pub age_std: Option<f64>,
    #[serde(rename = "Sex_counts")]
    pub sex_counts: BTreeMap<String, MaskedCount>,
    #[serde(rename = "Sex_proportions")]
    pub sex_proportions: BTreeMap<String, MaskedProportion>,
    #[serde(rename = "RF_positivity_counts")]
    pub rf_positivity_counts: BTreeMap<String, MaskedCount>,
    #[serde(rename = "RF_positivity_proportions")]
    pub rf_positivity_proportions: BTreeMap<String, MaskedProportion>,
    #[serde(rename = "anti_CCP_counts")]
    pub anti_ccp_counts: BTreeMap<String, MaskedCount>,
    #[serde(rename = "anti_CCP_proportions")]
    pub anti_ccp_proportions: BTreeMap<String, MaskedProportion>,
}

/// Counts and proportions must describe the same groups, and masking applies to all or none
fn check_categorical(
    variable: &str,
    counts: &BTreeMap<String, MaskedCount>,
    proportions: &BTreeMap<String, MaskedProportion>,
) -> Result<(), String> {
    let count_keys: BTreeSet<_> = counts.keys().collect();
    let proportion_keys: BTreeSet<_> = proportions.keys().collect();
    if count_keys != proportion_keys {
        return Err(format!(
            "{} counts and proportions describe different groups",
            variable
        ));
    }

    let masked = counts.values().filter(|c| c.is_masked()).count();
    if masked != 0 && masked != counts.len() {
        return Err(format!("{} counts are only partially masked", variable));
    }
    for (group, count) in counts {
        check_masked_label(&format!("{}_counts[{}]", variable, group), count)?;
    }

    for (group, proportion) in proportions {
        match proportion {
            MaskedProportion::Proportion(p) if !(0.0..=1.0).contains(p) => {
                return Err(format!(
                    "{}_proportions[{}] must be within [0, 1], got {}",
                    variable, group, p
                ));
            }
            MaskedProportion::Masked(_) if masked == 0 => {
                return Err(format!(
                    "{}_proportions[{}] is masked while its count is not",
                    variable, group
                ));
            }
            _ => {}
        }
    }
    Ok(())
}

impl Validate for DemographicsOutput {
    fn validate(&self) -> Result<(), String> {
        check_non_negative("Age_std", self.age_std)?;
        check_categorical("Sex", &self.sex_counts, &self.sex_proportions)?;
        check_categorical(
            "RF_positivity",
            &self.rf_positivity_counts,
            &self.rf_positivity_proportions,
        )?;
        check_categorical("anti_CCP", &self.anti_ccp_counts, &self.anti_ccp_proportions)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiseaseDurationDistributionOutput {
    #[serde(rename = "Year_diagnosis_mean")]
    pub year_diagnosis_mean: Option<f64>,
    #[serde(rename = "Year_diagnosis_std")]
    pub year_diagnosis_std: Option<f64>,
    #[serde(rename = "Year_diagnosis_skewness")]
    pub year_diagnosis_skewness: Option<f64>,
}

impl Validate for DiseaseDurationDistributionOutput {
    fn validate(&self) -> Result<(), String> {
        check_non_negative("Year_diagnosis_std", self.year_diagnosis_std)
    }
}

/// Visit-level summary of one lab variable
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabValueOverall {
    pub mean: Option<f64>,
    pub std: Option<f64>,
    pub skewness: Option<f64>,
    /// Values outside the 1.5 IQR fences
    pub outlier_count: u64,
}

impl Validate for LabValueOverall {
    fn validate(&self) -> Result<(), String> {
        check_non_negative("std", self.std)
    }
}

/// Summary of the per-patient means of one lab variable
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabValueAggregated {
    pub mean: Option<f64>,
    pub std: Option<f64>,
    pub median: Option<f64>,
    #[serde(rename = "Q1", alias = "25%")]
    pub q1: Option<f64>,
    #[serde(rename = "Q3", alias = "75%")]
    pub q3: Option<f64>,
}

impl Validate for LabValueAggregated {
    fn validate(&self) -> Result<(), String> {
        check_non_negative("std", self.std)?;
        if let (Some(q1), Some(median), Some(q3)) = (self.q1, self.median, self.q3) {
            if !(q1 <= median && median <= q3) {
                return Err(format!(
                    "quartiles out of order: Q1 {} median {} Q3 {}",
                    q1, median, q3
                ));
            }
        }
        Ok(())
    }
}

/// One entry per lab variable
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabPanel<T> {
    #[serde(rename = "CRP")]
    pub crp: T,
    #[serde(rename = "ESR")]
    pub esr: T,
    #[serde(rename = "TJC28")]
    pub tjc28: T,
    #[serde(rename = "SJC28")]
    pub sjc28: T,
    #[serde(rename = "DAS28")]
    pub das28: T,
    #[serde(rename = "Pat_global")]
    pub pat_global: T,
    #[serde(rename = "Ph_global")]
    pub ph_global: T,
    #[serde(rename = "Pain")]
    pub pain: T,
}

impl<T> LabPanel<T> {
    /// Build a panel by computing each variable in [`LAB_VARIABLES`] order
    pub fn try_from_fn<E>(mut f: impl FnMut(&'static str) -> Result<T, E>) -> Result<Self, E> {
        Ok(Self {
            crp: f("CRP")?,
            esr: f("ESR")?,
            tjc28: f("TJC28")?,
            sjc28: f("SJC28")?,
            das28: f("DAS28")?,
            pat_global: f("Pat_global")?,
            ph_global: f("Ph_global")?,
            pain: f("Pain")?,
        })
    }

    /// Variables paired with their entries, in [`LAB_VARIABLES`] order
    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &T)> {
        LAB_VARIABLES.into_iter().zip([
            &self.crp,
            &self.esr,
            &self.tjc28,
            &self.sjc28,
            &self.das28,
            &self.pat_global,
            &self.ph_global,
            &self.pain,
        ])
    }
}

impl<T: Validate> Validate for LabPanel<T> {
    fn validate(&self) -> Result<(), String> {
        for (variable, entry) in self.iter() {
            entry
                .validate()
                .map_err(|reason| format!("{}: {}", variable, reason))?;
        }
        Ok(())
    }
}

/// Everything `partial_stats` reports for one node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartialStatsOutput {
    pub unique_patients_per_center: UniquePatientsOutput,
    pub check_visit_definition: VisitDefinitionOutput,
    pub visits_per_time_period: VisitsPerTimePeriodOutput,
    pub missing_data_per_visit: MissingDataPerVisitOutput,
    pub demographics: DemographicsOutput,
    pub disease_duration_distribution: DiseaseDurationDistributionOutput,
    pub laboratory_values_overall: LabPanel<LabValueOverall>,
    pub laboratory_values_grouped_by_pat_id: LabPanel<LabValueAggregated>,
}

impl Validate for PartialStatsOutput {
    fn validate(&self) -> Result<(), String> {
        let sections: [(&str, &dyn Validate); 8] = [
            ("unique_patients_per_center", &self.unique_patients_per_center),
            ("check_visit_definition", &self.check_visit_definition),
            ("visits_per_time_period", &self.visits_per_time_period),
            ("missing_data_per_visit", &self.missing_data_per_visit),
            ("demographics", &self.demographics),
            ("disease_duration_distribution", &self.disease_duration_distribution),
            ("laboratory_values_overall", &self.laboratory_values_overall),
            (
                "laboratory_values_grouped_by_pat_id",
                &self.laboratory_values_grouped_by_pat_id,
            ),
        ];
        for (name, section) in sections {
            section
                .validate()
                .map_err(|reason| format!("{}.{}", name, reason))?;
        }
        Ok(())
    }
}
