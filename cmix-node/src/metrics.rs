//! Metric names this crate emits through the `metrics` facade.
//!
//! Only the instrumentation points live here; which backend (Prometheus,
//! StatsD, ...) actually collects them is out of scope (spec §1's
//! "metrics collection storage backend").

use cmix_types::RoundState;

/// Gauge: number of rounds currently in each [`RoundState`] on this node.
pub const ROUNDS_IN_STATE: &str = "cmix_node_rounds_in_state";

/// Counter: phases that reached `Failed` on this node, by phase name.
pub const PHASE_FAILURES: &str = "cmix_node_phase_failures_total";

/// Histogram: wall-clock milliseconds a phase spent from `Active` to
/// its terminal state.
pub const PHASE_DURATION_MILLIS: &str = "cmix_node_phase_duration_millis";

/// Records a round entering `state`.
pub fn record_round_state(state: RoundState) {
    metrics::gauge!(ROUNDS_IN_STATE, "state" => state.to_string()).increment(1.0);
}

/// Records a phase named `phase_name` failing.
pub fn record_phase_failure(phase_name: &'static str) {
    metrics::counter!(PHASE_FAILURES, "phase" => phase_name).increment(1);
}

/// Records how long a phase took to settle.
pub fn record_phase_duration(phase_name: &'static str, millis: u64) {
    metrics::histogram!(PHASE_DURATION_MILLIS, "phase" => phase_name).record(millis as f64);
}
