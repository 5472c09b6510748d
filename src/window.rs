use crate::normalize::Event;
use std::collections::BTreeMap;
use std::time::Duration;
use time::OffsetDateTime;

/// Groups events by location, keeping only those observed at or after
/// `now - window`. Order inside a group is the order of `events`; locations
/// left without events are absent from the result.
pub fn group_and_window(
    events: Vec<Event>,
    now: OffsetDateTime,
    window: Duration,
) -> BTreeMap<String, Vec<Event>> {
    let cutoff = window_start(now, window);
    let mut groups: BTreeMap<String, Vec<Event>> = BTreeMap::new();

    for event in events {
        if event.observed_at < cutoff {
            continue;
        }
        groups
            .entry(event.location_id.clone())
            .or_default()
            .push(event);
    }

    groups
}

/// Oldest instant still inside the window. Saturates at the earliest
/// representable date for absurdly long windows.
pub fn window_start(now: OffsetDateTime, window: Duration) -> OffsetDateTime {
    time::Duration::try_from(window)
        .ok()
        .and_then(|window| now.checked_sub(window))
        .unwrap_or(time::PrimitiveDateTime::MIN.assume_utc())
}
