use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Health check response
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub uptime_seconds: u64,
    pub version: String,
    /// Registered organizations
    pub organizations: usize,
    /// Registered algorithms with their methods
    pub algorithms: Vec<serde_json::Value>,
    pub started_at: DateTime<Utc>,
}

/// Query parameters of the metrics endpoint
#[derive(Debug, Deserialize)]
pub struct MetricsQuery {
    /// Number of recent runs to include
    pub recent: Option<usize>,
}

/// Generic response
#[derive(Debug, Serialize, Deserialize)]
pub struct GenericResponse {
    pub success: bool,
    pub message: String,
    pub data: Option<serde_json::Value>,
}

/// Error response
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
    pub error_code: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>, error_code: &str) -> Self {
        Self {
            success: false,
            error: error.into(),
            error_code: error_code.to_string(),
        }
    }
}
