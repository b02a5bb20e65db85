//! Selecting hours and submitting them as one booking attempt.
//!
//! `Idle -> SlotsSelected -> Submitting -> Success | Failed`. Each selected
//! hour becomes its own create request; requests run concurrently and
//! nothing is rolled back automatically when only some of them succeed.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, Utc};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::engine::{CancelRequest, Engine, EngineError, SlotDecision, check_credits};
use crate::limits::MAX_SELECTION_HOURS;
use crate::model::*;
use crate::observability::BOOKING_REQUESTS_TOTAL;
use crate::snapshot::Snapshot;
use crate::time::hour_bounds_fixed;

/// Hours the user has picked, independent of the candidate grid.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selection {
    slots: BTreeMap<SlotKey, SlotKind>,
}

impl Selection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn contains(&self, key: &SlotKey) -> bool {
        self.slots.contains_key(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (SlotKey, SlotKind)> + '_ {
        self.slots.iter().map(|(k, v)| (*k, *v))
    }

    pub fn select(&mut self, candidate: &CandidateSlot) -> Result<(), EngineError> {
        if !candidate.is_available() {
            return Err(EngineError::SlotUnavailable(candidate.key()));
        }
        if !self.contains(&candidate.key()) && self.slots.len() >= MAX_SELECTION_HOURS {
            return Err(EngineError::LimitExceeded("selection too large"));
        }
        self.slots.insert(candidate.key(), candidate.kind);
        Ok(())
    }

    pub fn remove(&mut self, key: &SlotKey) -> bool {
        self.slots.remove(key).is_some()
    }

    /// Add the candidate, or drop it if already selected. Returns whether it
    /// is selected afterwards.
    pub fn toggle(&mut self, candidate: &CandidateSlot) -> Result<bool, EngineError> {
        if self.remove(&candidate.key()) {
            return Ok(false);
        }
        self.select(candidate)?;
        Ok(true)
    }

    pub fn clear(&mut self) {
        self.slots.clear();
    }
}

/// Create payload for one hour. Timestamps always carry an explicit offset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingRequest {
    pub space_id: SpaceId,
    pub start_time: DateTime<FixedOffset>,
    pub end_time: DateTime<FixedOffset>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayError {
    /// Server-side overlap, typically HTTP 409.
    Conflict(String),
    InsufficientCredits(String),
    Rejected { status: u16, message: String },
    Transport(String),
}

impl std::fmt::Display for GatewayError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GatewayError::Conflict(msg) => write!(f, "conflict: {msg}"),
            GatewayError::InsufficientCredits(msg) => write!(f, "insufficient credits: {msg}"),
            GatewayError::Rejected { status, message } => write!(f, "rejected ({status}): {message}"),
            GatewayError::Transport(msg) => write!(f, "transport error: {msg}"),
        }
    }
}

impl std::error::Error for GatewayError {}

/// Backend endpoints a booking attempt talks to.
#[async_trait]
pub trait ReservationGateway: Send + Sync {
    async fn create(&self, request: &BookingRequest) -> Result<Reservation, GatewayError>;
    async fn cancel(&self, request: &CancelRequest) -> Result<(), GatewayError>;
}

/// Why one hour of a batch failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "message")]
pub enum SubmitFailure {
    /// Someone else took the hour after the grid was computed.
    SlotTaken,
    InsufficientCredits,
    Rejected(String),
    Transport(String),
}

impl SubmitFailure {
    pub fn label(&self) -> &'static str {
        match self {
            SubmitFailure::SlotTaken => "slot_taken",
            SubmitFailure::InsufficientCredits => "insufficient_credits",
            SubmitFailure::Rejected(_) => "rejected",
            SubmitFailure::Transport(_) => "transport",
        }
    }
}

impl From<GatewayError> for SubmitFailure {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::Conflict(_) => SubmitFailure::SlotTaken,
            GatewayError::InsufficientCredits(_) => SubmitFailure::InsufficientCredits,
            GatewayError::Rejected { message, .. } => SubmitFailure::Rejected(message),
            GatewayError::Transport(msg) => SubmitFailure::Transport(msg),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BookedSlot {
    pub key: SlotKey,
    pub kind: SlotKind,
    pub cost: u32,
    pub reservation: Reservation,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedSlot {
    pub key: SlotKey,
    pub failure: SubmitFailure,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchReport {
    pub succeeded: Vec<BookedSlot>,
    pub failed: Vec<FailedSlot>,
}

impl BatchReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }

    /// Cancel requests that would undo the hours that did get booked,
    /// refunding what each hour cost. Sending them is the caller's call.
    pub fn rollback_requests(&self) -> Vec<CancelRequest> {
        self.succeeded
            .iter()
            .map(|slot| CancelRequest {
                reservation_id: slot.reservation.id,
                credits_to_refund: slot.cost,
            })
            .collect()
    }

    /// Created reservations as events to fold into the caller's snapshot.
    pub fn created_events(&self) -> Vec<ReservationEvent> {
        self.succeeded
            .iter()
            .map(|slot| ReservationEvent::Created(slot.reservation.clone()))
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BookingState {
    Idle,
    SlotsSelected,
    Submitting,
    Success(BatchReport),
    Failed(BatchReport),
}

impl BookingState {
    fn name(&self) -> &'static str {
        match self {
            BookingState::Idle => "idle",
            BookingState::SlotsSelected => "slots_selected",
            BookingState::Submitting => "submitting",
            BookingState::Success(_) => "succeeded",
            BookingState::Failed(_) => "failed",
        }
    }
}

#[derive(Debug, Clone)]
pub struct BookingAttempt {
    selection: Selection,
    state: BookingState,
}

impl Default for BookingAttempt {
    fn default() -> Self {
        Self::new()
    }
}

impl BookingAttempt {
    pub fn new() -> Self {
        Self {
            selection: Selection::new(),
            state: BookingState::Idle,
        }
    }

    pub fn state(&self) -> &BookingState {
        &self.state
    }

    pub fn selection(&self) -> &Selection {
        &self.selection
    }

    /// `&mut self` is held for the whole of `submit`, so finding `Submitting`
    /// here means that future was dropped before the responses came back.
    fn recover_abandoned_submit(&mut self) {
        if self.state == BookingState::Submitting {
            warn!("previous submit was abandoned; some requests may have been sent");
            self.settle_selection_state();
        }
    }

    fn ensure_editable(&mut self, action: &'static str) -> Result<(), EngineError> {
        self.recover_abandoned_submit();
        match self.state {
            BookingState::Idle | BookingState::SlotsSelected => Ok(()),
            ref other => Err(EngineError::InvalidTransition {
                from: other.name(),
                action,
            }),
        }
    }

    fn settle_selection_state(&mut self) {
        self.state = if self.selection.is_empty() {
            BookingState::Idle
        } else {
            BookingState::SlotsSelected
        };
    }

    pub fn toggle(&mut self, candidate: &CandidateSlot) -> Result<bool, EngineError> {
        self.ensure_editable("toggle")?;
        let selected = self.selection.toggle(candidate)?;
        self.settle_selection_state();
        Ok(selected)
    }

    pub fn deselect(&mut self, key: &SlotKey) -> Result<bool, EngineError> {
        self.ensure_editable("deselect")?;
        let removed = self.selection.remove(key);
        self.settle_selection_state();
        Ok(removed)
    }

    /// Start over after a finished or abandoned attempt.
    pub fn reset(&mut self) -> Result<(), EngineError> {
        self.selection.clear();
        self.state = BookingState::Idle;
        Ok(())
    }

    /// Cost of the current selection under `engine`'s pricing.
    pub fn total_cost(&self, engine: &Engine, snapshot: &Snapshot) -> Result<u32, EngineError> {
        engine.total_cost(self.selection.iter(), &snapshot.spaces)
    }

    /// Send one create per selected hour.
    ///
    /// Every selected hour is decided again against `snapshot` at `now` and
    /// repriced from the fresh kind. Validation errors leave the attempt in
    /// `SlotsSelected`. Once requests are sent the attempt ends in `Success`
    /// or `Failed`; gateway errors are reported per hour in the
    /// `BatchReport`, never as `Err`. Dropping the returned future leaves
    /// `Submitting` behind, which the next call recovers from.
    pub async fn submit<G>(
        &mut self,
        engine: &Engine,
        snapshot: &Snapshot,
        credits_held: u32,
        gateway: &G,
        now: DateTime<Utc>,
    ) -> Result<&BookingState, EngineError>
    where
        G: ReservationGateway + ?Sized,
    {
        self.recover_abandoned_submit();
        match self.state {
            BookingState::SlotsSelected => {}
            BookingState::Idle => return Err(EngineError::EmptySelection),
            ref other => {
                return Err(EngineError::InvalidTransition {
                    from: other.name(),
                    action: "submit",
                });
            }
        }
        if !snapshot.is_authoritative() {
            return Err(EngineError::FallbackSnapshot);
        }

        let tz = engine.timezone();
        let mut planned = Vec::with_capacity(self.selection.len());
        for (key, _) in self.selection.iter() {
            let (kind, cost) = match engine.decide(key, snapshot, None, now)? {
                SlotDecision::Bookable { cost } => (SlotKind::Regular, cost),
                SlotDecision::PendingApproval { cost } => (SlotKind::Special, cost),
                SlotDecision::Unavailable(_) | SlotDecision::InsufficientCredits { .. } => {
                    return Err(EngineError::SlotUnavailable(key));
                }
            };
            let (start_time, end_time) =
                hour_bounds_fixed(&tz, key.date, key.hour).ok_or(EngineError::InvalidHour(key.hour))?;
            let request = BookingRequest {
                space_id: key.space_id,
                start_time,
                end_time,
            };
            planned.push((key, kind, cost, request));
        }
        let total: u32 = planned.iter().map(|(_, _, cost, _)| cost).sum();
        check_credits(total, credits_held)?;
        for (key, kind, _, _) in &planned {
            self.selection.slots.insert(*key, *kind);
        }

        self.state = BookingState::Submitting;
        info!("submitting {} booking requests, {total} credits", planned.len());

        let outcomes = join_all(planned.iter().map(|(key, kind, cost, request)| async move {
            (*key, *kind, *cost, gateway.create(request).await)
        }))
        .await;

        let mut report = BatchReport::default();
        for (key, kind, cost, outcome) in outcomes {
            match outcome {
                Ok(reservation) => {
                    metrics::counter!(BOOKING_REQUESTS_TOTAL, "status" => "created").increment(1);
                    report.succeeded.push(BookedSlot {
                        key,
                        kind,
                        cost,
                        reservation,
                    });
                }
                Err(err) => {
                    warn!("booking {key} failed: {err}");
                    let failure = SubmitFailure::from(err);
                    metrics::counter!(BOOKING_REQUESTS_TOTAL, "status" => failure.label()).increment(1);
                    report.failed.push(FailedSlot { key, failure });
                }
            }
        }

        self.state = if report.is_complete() {
            BookingState::Success(report)
        } else {
            warn!(
                "booking batch partially failed: {} succeeded, {} failed",
                report.succeeded.len(),
                report.failed.len()
            );
            BookingState::Failed(report)
        };
        Ok(&self.state)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CancelError {
    NotCancellable(ReservationId),
    Gateway(GatewayError),
}

impl std::fmt::Display for CancelError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CancelError::NotCancellable(id) => write!(f, "reservation {id} cannot be cancelled"),
            CancelError::Gateway(err) => write!(f, "{err}"),
        }
    }
}

impl std::error::Error for CancelError {}

/// Cancel one reservation under the late-cancellation policy.
pub async fn cancel_reservation<G>(
    engine: &Engine,
    reservation: &Reservation,
    cost_credits: u32,
    gateway: &G,
    now: DateTime<Utc>,
) -> Result<CancelRequest, CancelError>
where
    G: ReservationGateway + ?Sized,
{
    let request = engine
        .cancel_request(reservation, cost_credits, now)
        .ok_or(CancelError::NotCancellable(reservation.id))?;
    gateway.cancel(&request).await.map_err(CancelError::Gateway)?;
    info!(
        "cancelled reservation {}, refunding {} credits",
        request.reservation_id, request.credits_to_refund
    );
    Ok(request)
}
