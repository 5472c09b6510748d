use crate::api::responses::{
    ErrorCode, ErrorResponse, HealthStatus, HealthSuccessResponse, LocationResponse,
    LocationSuccessResponse, PointResponse, SeriesSuccessResponse,
};
use crate::estimation::{LocationSeries, WaitTimePoint};
use crate::state::{AppState, SeriesSnapshot};
use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use std::sync::{Arc, RwLock};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tracing::error;

const INTERNAL_ERROR_MESSAGE: &str = "Internal server error";
const NO_DATA_MESSAGE: &str = "Wait time series not yet available";

pub enum ApiResponse<T> {
    Success { status: StatusCode, body: T },
    Error { status: StatusCode, body: ErrorResponse },
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        match self {
            ApiResponse::Success { status, body } => (status, Json(body)).into_response(),
            ApiResponse::Error { status, body } => (status, Json(body)).into_response(),
        }
    }
}

impl<T> ApiResponse<T> {
    fn ok(body: T) -> Self {
        ApiResponse::Success {
            status: StatusCode::OK,
            body,
        }
    }
}

pub async fn get_series(State(state): State<Arc<RwLock<AppState>>>) -> impl IntoResponse {
    build_series_response(state, OffsetDateTime::now_utc())
}

pub async fn get_location(
    State(state): State<Arc<RwLock<AppState>>>,
    Path(location_id): Path<String>,
) -> impl IntoResponse {
    build_location_response(state, &location_id, OffsetDateTime::now_utc())
}

pub async fn get_health(State(state): State<Arc<RwLock<AppState>>>) -> impl IntoResponse {
    build_health_response(state, OffsetDateTime::now_utc())
}

fn read_snapshot(state: &Arc<RwLock<AppState>>) -> Option<Arc<SeriesSnapshot>> {
    state.read().ok().map(|guard| guard.snapshot())
}

fn build_series_response(
    state: Arc<RwLock<AppState>>,
    now: OffsetDateTime,
) -> ApiResponse<SeriesSuccessResponse> {
    let Some(snapshot) = read_snapshot(&state) else {
        return internal_error("/api/series", "state lock poisoned while reading snapshot");
    };
    let Some(updated_at) = snapshot.updated_at else {
        return no_data_response("/api/series", snapshot.error.as_deref(), now);
    };

    let mut locations = Vec::with_capacity(snapshot.series.len());
    for series in snapshot.series.values() {
        match map_location(series) {
            Ok(location) => locations.push(location),
            Err(_) => return internal_error("/api/series", "timestamp formatting failure"),
        }
    }

    match (format_timestamp(updated_at), format_timestamp(now)) {
        (Ok(updated_at), Ok(timestamp)) => ApiResponse::ok(SeriesSuccessResponse {
            locations,
            error: snapshot.error.clone(),
            updated_at,
            timestamp,
        }),
        _ => internal_error("/api/series", "timestamp formatting failure"),
    }
}

fn build_location_response(
    state: Arc<RwLock<AppState>>,
    location_id: &str,
    now: OffsetDateTime,
) -> ApiResponse<LocationSuccessResponse> {
    let Some(snapshot) = read_snapshot(&state) else {
        return internal_error(
            "/api/locations",
            "state lock poisoned while reading snapshot",
        );
    };
    let Some(updated_at) = snapshot.updated_at else {
        return no_data_response("/api/locations", snapshot.error.as_deref(), now);
    };
    let Some(series) = snapshot.series.get(location_id) else {
        return not_found_response(location_id, now);
    };

    match (
        map_location(series),
        format_timestamp(updated_at),
        format_timestamp(now),
    ) {
        (Ok(location), Ok(updated_at), Ok(timestamp)) => {
            ApiResponse::ok(LocationSuccessResponse {
                location,
                error: snapshot.error.clone(),
                updated_at,
                timestamp,
            })
        }
        _ => internal_error("/api/locations", "timestamp formatting failure"),
    }
}

fn build_health_response(
    state: Arc<RwLock<AppState>>,
    now: OffsetDateTime,
) -> ApiResponse<HealthSuccessResponse> {
    let Some(snapshot) = read_snapshot(&state) else {
        return internal_error("/api/health", "state lock poisoned while reading snapshot");
    };

    let status = derive_health_status(&snapshot);
    let status_code = match status {
        HealthStatus::Ko => StatusCode::SERVICE_UNAVAILABLE,
        HealthStatus::Ok | HealthStatus::Degraded => StatusCode::OK,
    };

    let last_success = match snapshot.updated_at.map(format_timestamp).transpose() {
        Ok(formatted) => formatted,
        Err(_) => return internal_error("/api/health", "timestamp formatting failure"),
    };
    let Ok(timestamp) = format_timestamp(now) else {
        return internal_error("/api/health", "timestamp formatting failure");
    };

    ApiResponse::Success {
        status: status_code,
        body: HealthSuccessResponse {
            status,
            last_error: snapshot.error.clone(),
            last_success,
            timestamp,
        },
    }
}

fn derive_health_status(snapshot: &SeriesSnapshot) -> HealthStatus {
    match (snapshot.has_data(), snapshot.error.is_some()) {
        (true, false) => HealthStatus::Ok,
        (true, true) => HealthStatus::Degraded,
        (false, _) => HealthStatus::Ko,
    }
}

fn map_location(series: &LocationSeries) -> Result<LocationResponse, time::error::Format> {
    let summary = series.summary();
    let points = series
        .points
        .iter()
        .map(map_point)
        .collect::<Result<Vec<_>, _>>()?;

    Ok(LocationResponse {
        location_id: summary.location_id,
        current_wait_minutes: summary.current_wait_minutes,
        current_label: summary.current_label,
        confidence: summary.confidence,
        points,
    })
}

fn map_point(point: &WaitTimePoint) -> Result<PointResponse, time::error::Format> {
    Ok(PointResponse {
        label: point.label.clone(),
        estimated_minutes: point.estimated_minutes,
        occupancy_count: point.occupancy_count,
        observed_at: format_timestamp(point.observed_at)?,
        basis: point.basis,
    })
}

fn format_timestamp(timestamp: OffsetDateTime) -> Result<String, time::error::Format> {
    timestamp.format(&Rfc3339)
}

fn no_data_response<T>(route: &str, last_error: Option<&str>, now: OffsetDateTime) -> ApiResponse<T> {
    let error_message = match last_error {
        Some(err) => format!("{NO_DATA_MESSAGE}: {err}"),
        None => NO_DATA_MESSAGE.to_string(),
    };
    match format_timestamp(now) {
        Ok(timestamp) => ApiResponse::Error {
            status: StatusCode::SERVICE_UNAVAILABLE,
            body: ErrorResponse {
                error_code: ErrorCode::NoData,
                error_message,
                timestamp,
            },
        },
        Err(_) => internal_error(route, "timestamp formatting failure"),
    }
}

fn not_found_response<T>(location_id: &str, now: OffsetDateTime) -> ApiResponse<T> {
    match format_timestamp(now) {
        Ok(timestamp) => ApiResponse::Error {
            status: StatusCode::NOT_FOUND,
            body: ErrorResponse {
                error_code: ErrorCode::NotFound,
                error_message: format!("No recent data for location {location_id}"),
                timestamp,
            },
        },
        Err(_) => internal_error("/api/locations", "timestamp formatting failure"),
    }
}

fn internal_error<T>(route: &str, message: &str) -> ApiResponse<T> {
    error!(route, message, "Internal error while handling request");
    let timestamp = format_timestamp(OffsetDateTime::now_utc()).unwrap_or_else(|err| {
        error!(error = %err, "Failed to format internal error timestamp");
        "1970-01-01T00:00:00Z".to_string()
    });
    ApiResponse::Error {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        body: ErrorResponse {
            error_code: ErrorCode::InternalError,
            error_message: INTERNAL_ERROR_MESSAGE.to_string(),
            timestamp,
        },
    }
}
