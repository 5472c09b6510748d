use crate::estimation::{EstimateBasis, LocationSeries, WaitTimePoint};
use serde::Serialize;

/// Points needed before a multiplier-only estimate is trusted as `Medium`.
pub const MEDIUM_CONFIDENCE_MIN_POINTS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    High,
    Medium,
    Low,
}

impl Confidence {
    fn for_current(current: &WaitTimePoint, point_count: usize) -> Self {
        match current.basis {
            EstimateBasis::ServiceTime => Confidence::High,
            EstimateBasis::Multiplier if point_count >= MEDIUM_CONFIDENCE_MIN_POINTS => {
                Confidence::Medium
            }
            EstimateBasis::Multiplier => Confidence::Low,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LocationSummary {
    pub location_id: String,
    pub current_wait_minutes: Option<f64>,
    pub current_label: Option<String>,
    pub point_count: usize,
    pub confidence: Confidence,
}

impl LocationSummary {
    pub fn from_series(series: &LocationSeries) -> Self {
        let point_count = series.points.len();
        let current = series.current();
        Self {
            location_id: series.location_id.clone(),
            current_wait_minutes: current.map(|point| point.estimated_minutes),
            current_label: current.map(|point| point.label.clone()),
            point_count,
            confidence: current
                .map(|point| Confidence::for_current(point, point_count))
                .unwrap_or(Confidence::Low),
        }
    }
}
