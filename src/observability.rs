use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};

use crate::engine::SlotDecision;

// ── Engine metrics ──────────────────────────────────────────────

/// Counter: candidates produced by the enumerator. Labels: kind.
pub const CANDIDATES_ENUMERATED_TOTAL: &str = "hourgrid_candidates_enumerated_total";

/// Counter: candidates the resolver found occupied by a reservation.
pub const SLOTS_OCCUPIED_TOTAL: &str = "hourgrid_slots_occupied_total";

/// Counter: schedule or business-hour records skipped as malformed. Labels: record.
pub const MALFORMED_RECORDS_TOTAL: &str = "hourgrid_malformed_records_total";

/// Counter: single-slot decisions. Labels: decision.
pub const SLOT_DECISIONS_TOTAL: &str = "hourgrid_slot_decisions_total";

// ── Boundary metrics ────────────────────────────────────────────

/// Counter: per-hour booking requests sent through a gateway. Labels: status.
pub const BOOKING_REQUESTS_TOTAL: &str = "hourgrid_booking_requests_total";

/// Histogram: wall time to load a full snapshot, in seconds.
pub const SNAPSHOT_LOAD_DURATION_SECONDS: &str = "hourgrid_snapshot_load_duration_seconds";

/// Counter: snapshot parts that failed to load. Labels: part.
pub const SNAPSHOT_FETCH_FAILURES_TOTAL: &str = "hourgrid_snapshot_fetch_failures_total";

/// Install a Prometheus recorder when `enabled`. The binary renders the
/// handle once before exiting; no HTTP listener is started.
pub fn init(enabled: bool) -> Result<Option<PrometheusHandle>, BuildError> {
    if !enabled {
        return Ok(None);
    }
    let handle = PrometheusBuilder::new().install_recorder()?;
    tracing::debug!("prometheus recorder installed");
    Ok(Some(handle))
}

/// Map a SlotDecision variant to a short label for metrics.
pub fn decision_label(decision: &SlotDecision) -> &'static str {
    match decision {
        SlotDecision::Bookable { .. } => "bookable",
        SlotDecision::PendingApproval { .. } => "pending_approval",
        SlotDecision::Unavailable(_) => "unavailable",
        SlotDecision::InsufficientCredits { .. } => "insufficient_credits",
    }
}
