use crate::estimation::{Confidence, EstimateBasis};
use serde::Serialize;

#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct SeriesSuccessResponse {
    pub locations: Vec<LocationResponse>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub updated_at: String,
    pub timestamp: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct LocationResponse {
    pub location_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_wait_minutes: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_label: Option<String>,
    pub confidence: Confidence,
    pub points: Vec<PointResponse>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct PointResponse {
    pub label: String,
    pub estimated_minutes: f64,
    pub occupancy_count: u32,
    pub observed_at: String,
    pub basis: EstimateBasis,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct LocationSuccessResponse {
    pub location: LocationResponse,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub updated_at: String,
    pub timestamp: String,
}

#[derive(Debug, Serialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Ok,
    Degraded,
    Ko,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct HealthSuccessResponse {
    pub status: HealthStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_success: Option<String>,
    pub timestamp: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct ErrorResponse {
    pub error_code: ErrorCode,
    pub error_message: String,
    pub timestamp: String,
}

#[derive(Debug, Serialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    NoData,
    NotFound,
    InternalError,
}
