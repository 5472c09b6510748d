use crate::estimation::{LocationSeries, WaitTimeEstimator};
use crate::normalize::normalize;
use crate::store::RawDocument;
use crate::window::group_and_window;
use std::collections::BTreeMap;
use std::time::Duration;
use time::OffsetDateTime;

pub type SeriesMap = BTreeMap<String, LocationSeries>;

/// Runs one full recompute: normalize, group and window, estimate.
/// Holds no state, so the same rows at the same `now` give the same result.
pub fn build_series(
    rows: &[RawDocument],
    now: OffsetDateTime,
    window: Duration,
    estimator: &WaitTimeEstimator,
) -> SeriesMap {
    let events = normalize(rows);
    group_and_window(events, now, window)
        .into_iter()
        .map(|(location_id, events)| {
            let series = estimator.estimate_series(&location_id, &events);
            (location_id, series)
        })
        .collect()
}
