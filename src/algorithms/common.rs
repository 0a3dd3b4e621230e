use log::info;
use serde::Serialize;

use crate::algorithms::schema::Validate;
use crate::core::algorithm::AlgorithmError;
use crate::data::Dataset;

/// Fail with every absent column listed when the dataset lacks any of `required`
pub fn require_columns(dataset: &Dataset, required: &[&str]) -> Result<(), AlgorithmError> {
    let missing = dataset.missing_columns(required);
    if missing.is_empty() {
        Ok(())
    } else {
        Err(AlgorithmError::MissingColumns(missing))
    }
}

/// Check an output against its schema before it leaves the function
pub fn validated<T: Validate>(function: &str, output: T) -> Result<T, AlgorithmError> {
    output
        .validate()
        .map_err(|reason| AlgorithmError::Validation {
            function: function.to_string(),
            reason,
        })?;
    info!("Field validation passed for {}", function);
    Ok(output)
}

/// Validate an output and convert it to the JSON returned by a run
pub fn enforce_output_schema<T: Validate + Serialize>(
    function: &str,
    output: T,
) -> Result<serde_json::Value, AlgorithmError> {
    let output = validated(function, output)?;
    Ok(serde_json::to_value(&output)?)
}

/// Helper function to measure execution time
pub async fn measure_execution_time<F, T, E>(f: F) -> (Result<T, E>, f64)
where
    F: std::future::Future<Output = Result<T, E>>,
{
    let start = std::time::Instant::now();
    let result = f.await;
    let duration_ms = start.elapsed().as_secs_f64() * 1000.0;

    (result, duration_ms)
}
