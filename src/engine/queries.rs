use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;

use crate::model::*;
use crate::observability::{SLOT_DECISIONS_TOTAL, decision_label};
use crate::snapshot::Snapshot;
use crate::time::hour_span;

use super::conflict::ReservationIndex;
use super::enumerate::EnumerationMode;
use super::window::DateWindow;
use super::{Engine, EngineError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "reason", content = "reservation_id")]
pub enum UnavailableReason {
    Past,
    Occupied(ReservationId),
    ClosedDate,
    /// Outside the envelope, or a regular hour the space does not keep.
    NotOffered,
}

/// Outcome of asking whether one `(date, hour, space)` can be booked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "decision")]
pub enum SlotDecision {
    Bookable { cost: u32 },
    PendingApproval { cost: u32 },
    Unavailable(UnavailableReason),
    InsufficientCredits { required: u32, held: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "status", content = "reservation_id")]
pub enum BoardStatus {
    Available,
    Booked(ReservationId),
    Special,
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BoardCell {
    pub space_id: SpaceId,
    pub status: BoardStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BoardRow {
    pub hour: u32,
    pub past: bool,
    pub cells: Vec<BoardCell>,
}

/// Every envelope hour of one day against every space.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DayBoard {
    pub date: NaiveDate,
    pub rows: Vec<BoardRow>,
}

impl DayBoard {
    pub fn cell(&self, hour: u32, space_id: SpaceId) -> Option<BoardStatus> {
        self.rows
            .iter()
            .find(|row| row.hour == hour)?
            .cells
            .iter()
            .find(|cell| cell.space_id == space_id)
            .map(|cell| cell.status)
    }
}

impl Engine {
    /// Enumerate then resolve: the slot grid a booking view renders.
    pub fn availability(
        &self,
        window: &DateWindow,
        snapshot: &Snapshot,
        mode: EnumerationMode,
        now: DateTime<Utc>,
    ) -> Result<Vec<CandidateSlot>, EngineError> {
        let candidates = self.enumerate(window, snapshot, mode)?;
        Ok(self.resolve(candidates, &snapshot.reservations, now))
    }

    /// Decide a single slot. `credits_held = None` skips the balance check.
    pub fn decide(
        &self,
        key: SlotKey,
        snapshot: &Snapshot,
        credits_held: Option<u32>,
        now: DateTime<Utc>,
    ) -> Result<SlotDecision, EngineError> {
        if key.hour > 23 {
            return Err(EngineError::InvalidHour(key.hour));
        }
        let space = snapshot
            .space(key.space_id)
            .ok_or(EngineError::UnknownSpace(key.space_id))?;

        let decision = self.decide_inner(key, space, snapshot, credits_held, now);
        metrics::counter!(SLOT_DECISIONS_TOTAL, "decision" => decision_label(&decision)).increment(1);
        Ok(decision)
    }

    fn decide_inner(
        &self,
        key: SlotKey,
        space: &Space,
        snapshot: &Snapshot,
        credits_held: Option<u32>,
        now: DateTime<Utc>,
    ) -> SlotDecision {
        let rules = self.compile_rules(snapshot);
        if rules.is_closed_date(key.date) {
            return SlotDecision::Unavailable(UnavailableReason::ClosedDate);
        }
        if self.local_now(now).is_past(key.date, key.hour) {
            return SlotDecision::Unavailable(UnavailableReason::Past);
        }
        let kind = match rules.classify(key.date, key.hour, key.space_id, EnumerationMode::Extended) {
            Some(kind) if self.config.envelope().contains(&key.hour) => kind,
            _ => return SlotDecision::Unavailable(UnavailableReason::NotOffered),
        };
        let Some(span) = hour_span(&self.config.timezone, key.date, key.hour) else {
            return SlotDecision::Unavailable(UnavailableReason::NotOffered);
        };
        let index = ReservationIndex::build(&snapshot.reservations);
        if let Some(id) = index.overlapping(key.space_id, &span) {
            return SlotDecision::Unavailable(UnavailableReason::Occupied(id));
        }

        let cost = self.hour_cost(space, kind);
        if let Some(held) = credits_held
            && held < cost
        {
            return SlotDecision::InsufficientCredits { required: cost, held };
        }
        match kind {
            SlotKind::Regular => SlotDecision::Bookable { cost },
            SlotKind::Special => SlotDecision::PendingApproval { cost },
        }
    }

    /// Admin board for one day. Booked cells show their reservation even
    /// when the hour has passed.
    pub fn day_board(&self, date: NaiveDate, snapshot: &Snapshot, now: DateTime<Utc>) -> DayBoard {
        let rules = self.compile_rules(snapshot);
        let index = ReservationIndex::build(&snapshot.reservations);
        let local_now = self.local_now(now);
        let closed_date = rules.is_closed_date(date);

        let rows = self
            .config
            .envelope()
            .map(|hour| {
                let span = hour_span(&self.config.timezone, date, hour);
                let cells = snapshot
                    .spaces
                    .iter()
                    .map(|space| {
                        let booked = span.and_then(|s| index.overlapping(space.id, &s));
                        let status = match booked {
                            Some(id) => BoardStatus::Booked(id),
                            None if closed_date || span.is_none() => BoardStatus::Closed,
                            None => match rules.classify(date, hour, space.id, EnumerationMode::Extended) {
                                Some(SlotKind::Regular) => BoardStatus::Available,
                                Some(SlotKind::Special) => BoardStatus::Special,
                                None => BoardStatus::Closed,
                            },
                        };
                        BoardCell { space_id: space.id, status }
                    })
                    .collect();
                BoardRow {
                    hour,
                    past: local_now.is_past(date, hour),
                    cells,
                }
            })
            .collect();

        DayBoard { date, rows }
    }
}
