use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, Utc};

use crate::model::*;
use crate::observability::SLOTS_OCCUPIED_TOTAL;
use crate::time::{hour_span, local_date_hour};

use super::Engine;

/// Blocking reservations grouped per space, each list sorted by start.
pub(crate) struct ReservationIndex {
    by_space: HashMap<SpaceId, Vec<(Span, ReservationId)>>,
}

impl ReservationIndex {
    pub(crate) fn build(reservations: &[Reservation]) -> Self {
        let mut by_space: HashMap<SpaceId, Vec<(Span, ReservationId)>> = HashMap::new();
        for r in reservations.iter().filter(|r| r.is_blocking()) {
            match r.span() {
                Some(span) => by_space.entry(r.space_id).or_default().push((span, r.id)),
                None => tracing::warn!("ignoring reservation {} with empty interval", r.id),
            }
        }
        for list in by_space.values_mut() {
            list.sort_by_key(|(span, _)| span.start);
        }
        Self { by_space }
    }

    /// First reservation on `space_id` overlapping `query`.
    /// Entries starting at or after `query.end` are skipped by binary search.
    pub(crate) fn overlapping(&self, space_id: SpaceId, query: &Span) -> Option<ReservationId> {
        let list = self.by_space.get(&space_id)?;
        let right_bound = list.partition_point(|(span, _)| span.start < query.end);
        list[..right_bound]
            .iter()
            .find(|(span, _)| span.end > query.start)
            .map(|(_, id)| *id)
    }
}

/// Where "now" falls on the local calendar.
#[derive(Debug, Clone, Copy)]
pub(crate) struct LocalNow {
    pub today: NaiveDate,
    pub hour: u32,
}

impl LocalNow {
    /// The whole current hour counts as past, minutes are not consulted.
    pub(crate) fn is_past(&self, date: NaiveDate, hour: u32) -> bool {
        date < self.today || (date == self.today && hour <= self.hour)
    }
}

impl Engine {
    pub(crate) fn local_now(&self, now: DateTime<Utc>) -> LocalNow {
        let (today, hour) = local_date_hour(&self.config.timezone, now);
        LocalNow { today, hour }
    }

    pub(crate) fn availability_of(
        &self,
        index: &ReservationIndex,
        local_now: LocalNow,
        date: NaiveDate,
        hour: u32,
        space_id: SpaceId,
    ) -> Option<Availability> {
        if local_now.is_past(date, hour) {
            return Some(Availability::Past);
        }
        let span = hour_span(&self.config.timezone, date, hour)?;
        Some(match index.overlapping(space_id, &span) {
            Some(id) => Availability::Occupied(id),
            None => Availability::Open,
        })
    }

    /// Annotate candidates with availability against `reservations`.
    ///
    /// Availability is recomputed from scratch, so resolving twice gives the
    /// same result. Candidates naming a local hour that does not exist in
    /// the configured zone are dropped.
    pub fn resolve(
        &self,
        candidates: Vec<CandidateSlot>,
        reservations: &[Reservation],
        now: DateTime<Utc>,
    ) -> Vec<CandidateSlot> {
        let index = ReservationIndex::build(reservations);
        let local_now = self.local_now(now);
        let resolved: Vec<CandidateSlot> = candidates
            .into_iter()
            .filter_map(|c| {
                let availability = self.availability_of(&index, local_now, c.date, c.hour, c.space_id)?;
                Some(c.with_availability(availability))
            })
            .collect();

        let occupied = resolved
            .iter()
            .filter(|c| matches!(c.availability, Availability::Occupied(_)))
            .count();
        metrics::counter!(SLOTS_OCCUPIED_TOTAL).increment(occupied as u64);
        resolved
    }

    /// Advisory single-slot check before submitting one booking. The server
    /// performs the authoritative check.
    pub fn is_available(
        &self,
        space_id: SpaceId,
        date: NaiveDate,
        hour: u32,
        reservations: &[Reservation],
        now: DateTime<Utc>,
    ) -> bool {
        if hour > 23 {
            return false;
        }
        let index = ReservationIndex::build(reservations);
        let local_now = self.local_now(now);
        self.availability_of(&index, local_now, date, hour, space_id) == Some(Availability::Open)
    }
}
