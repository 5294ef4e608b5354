//! Session and relay metrics
//!
//! Recorded through the `metrics` facade; the host process decides whether
//! an exporter is installed.

use metrics::{counter, describe_counter, describe_gauge, gauge};

/// Register metric descriptions with whatever recorder is installed
pub fn describe_metrics() {
    describe_gauge!(
        "callkeep_active_sessions",
        "Number of call sessions not yet disconnected"
    );
    describe_counter!(
        "callkeep_sessions_total",
        "Total number of call sessions created"
    );
    describe_counter!(
        "callkeep_events_emitted_total",
        "Total number of lifecycle events emitted"
    );
    describe_counter!(
        "callkeep_events_buffered_total",
        "Events buffered because no listener was attached"
    );
    describe_counter!(
        "callkeep_events_dropped_total",
        "Events dropped by the relay"
    );
    describe_counter!(
        "callkeep_application_wakeups_total",
        "Direct application wake-ups after a reachability timeout"
    );
}

pub fn update_active_sessions(count: usize) {
    gauge!("callkeep_active_sessions").set(count as f64);
}

pub fn record_session_created(direction: &str) {
    counter!("callkeep_sessions_total", "direction" => direction.to_string()).increment(1);
}

pub fn record_event_emitted(name: &'static str) {
    counter!("callkeep_events_emitted_total", "event" => name).increment(1);
}

pub fn record_event_buffered() {
    counter!("callkeep_events_buffered_total").increment(1);
}

pub fn record_event_dropped(reason: &'static str) {
    counter!("callkeep_events_dropped_total", "reason" => reason).increment(1);
}

pub fn record_application_wakeup() {
    counter!("callkeep_application_wakeups_total").increment(1);
}
