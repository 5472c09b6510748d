//! Wait-time estimation for normalized occupancy events.
//!
//! Each event is converted independently with a two-branch heuristic:
//!
//! - measured service time: `occupancy * service_time_ms * scaling_factor / 60000`
//! - otherwise: `occupancy * wait_multiplier`
//!
//! Both constants differ between deployments and come from configuration.

use crate::normalize::Event;
use serde::Serialize;
use time::{OffsetDateTime, UtcOffset};

pub mod summary;

pub use summary::{Confidence, LocationSummary};

const MS_PER_MINUTE: f64 = 60_000.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EstimatorConfig {
    /// Minutes of wait per observed person when no service time was recorded.
    pub wait_multiplier: f64,
    /// Weight applied to measured service time.
    pub processing_time_scaling_factor: f64,
    /// Offset used to render point labels.
    pub label_offset: UtcOffset,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EstimateBasis {
    ServiceTime,
    Multiplier,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WaitTimePoint {
    /// `HH:MM` in the configured label offset.
    pub label: String,
    pub estimated_minutes: f64,
    pub occupancy_count: u32,
    pub observed_at: OffsetDateTime,
    pub basis: EstimateBasis,
}

/// Points for one location in the order the store returned them.
#[derive(Debug, Clone, PartialEq)]
pub struct LocationSeries {
    pub location_id: String,
    pub points: Vec<WaitTimePoint>,
}

impl LocationSeries {
    /// The most recently observed point. Store order is not chronological,
    /// so this is chosen by `observed_at`; ties go to the later position.
    pub fn current(&self) -> Option<&WaitTimePoint> {
        self.points
            .iter()
            .enumerate()
            .max_by_key(|(index, point)| (point.observed_at, *index))
            .map(|(_, point)| point)
    }

    pub fn summary(&self) -> LocationSummary {
        LocationSummary::from_series(self)
    }
}

#[derive(Debug, Clone)]
pub struct WaitTimeEstimator {
    config: EstimatorConfig,
}

impl WaitTimeEstimator {
    pub fn new(config: EstimatorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &EstimatorConfig {
        &self.config
    }

    pub fn estimate(&self, event: &Event) -> WaitTimePoint {
        let occupancy = f64::from(event.occupancy_count);
        let (raw_minutes, basis) = match event.service_time_ms {
            Some(service_time_ms) => (
                occupancy * service_time_ms * self.config.processing_time_scaling_factor
                    / MS_PER_MINUTE,
                EstimateBasis::ServiceTime,
            ),
            None => (
                occupancy * self.config.wait_multiplier,
                EstimateBasis::Multiplier,
            ),
        };

        WaitTimePoint {
            label: self.label(event.observed_at),
            estimated_minutes: round_to_tenth(raw_minutes),
            occupancy_count: event.occupancy_count,
            observed_at: event.observed_at,
            basis,
        }
    }

    pub fn estimate_series(&self, location_id: &str, events: &[Event]) -> LocationSeries {
        LocationSeries {
            location_id: location_id.to_string(),
            points: events.iter().map(|event| self.estimate(event)).collect(),
        }
    }

    fn label(&self, observed_at: OffsetDateTime) -> String {
        let local = observed_at.to_offset(self.config.label_offset);
        format!("{:02}:{:02}", local.hour(), local.minute())
    }
}

/// Rounds half away from zero to one decimal place; never returns a negative value.
pub fn round_to_tenth(minutes: f64) -> f64 {
    if !minutes.is_finite() || minutes <= 0.0 {
        return 0.0;
    }
    (minutes * 10.0).round() / 10.0
}
