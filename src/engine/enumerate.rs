use std::collections::{HashMap, HashSet};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::limits::{MAX_SPACES, MAX_WINDOW_DAYS};
use crate::model::*;
use crate::observability::{CANDIDATES_ENUMERATED_TOTAL, MALFORMED_RECORDS_TOTAL};
use crate::snapshot::Snapshot;
use crate::time::{day_index, hour_span, parse_hour_window};

use super::window::DateWindow;
use super::{Engine, EngineError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnumerationMode {
    /// Only hours inside both business hours and the space's own schedule.
    RegularOnly,
    /// Also offer every other envelope hour as a special request.
    #[default]
    Extended,
}

/// Business hours, schedules and closed dates parsed once per query.
///
/// Malformed records are dropped here with a warning, so everything
/// downstream works on whole-hour windows only.
pub(crate) struct WeekRules {
    /// Indexed by 0=Sunday..6=Saturday. `None` = closed or unusable.
    business: [Option<(u32, u32)>; 7],
    /// Active schedule windows per `(space, weekday)`.
    schedules: HashMap<(SpaceId, u8), Vec<(u32, u32)>>,
    /// Weekdays with at least one active space schedule.
    scheduled_days: [bool; 7],
    closed: HashSet<NaiveDate>,
}

impl WeekRules {
    pub(crate) fn compile(snapshot: &Snapshot) -> Self {
        let mut business = [None; 7];
        let mut seen_day = [false; 7];
        for bh in &snapshot.business_hours {
            let Some(day) = valid_day(bh.day_of_week, "business_hour") else {
                continue;
            };
            // First record for a weekday wins.
            if std::mem::replace(&mut seen_day[day], true) || bh.is_closed {
                continue;
            }
            match parse_hour_window(&bh.start_time, &bh.end_time) {
                Some(window) => business[day] = Some(window),
                None => malformed("business_hour", &bh.start_time, &bh.end_time),
            }
        }

        let mut schedules: HashMap<(SpaceId, u8), Vec<(u32, u32)>> = HashMap::new();
        let mut scheduled_days = [false; 7];
        for s in snapshot.schedules.iter().filter(|s| s.is_active) {
            let Some(day) = valid_day(s.day_of_week, "space_schedule") else {
                continue;
            };
            match parse_hour_window(&s.start_time, &s.end_time) {
                Some(window) => {
                    schedules.entry((s.space_id, day as u8)).or_default().push(window);
                    scheduled_days[day] = true;
                }
                None => malformed("space_schedule", &s.start_time, &s.end_time),
            }
        }

        let closed = snapshot
            .closed_dates
            .iter()
            .filter(|cd| cd.is_active)
            .map(|cd| cd.date)
            .collect();

        Self {
            business,
            schedules,
            scheduled_days,
            closed,
        }
    }

    pub(crate) fn is_closed_date(&self, date: NaiveDate) -> bool {
        self.closed.contains(&date)
    }

    pub(crate) fn business_window(&self, date: NaiveDate) -> Option<(u32, u32)> {
        self.business[day_index(date) as usize]
    }

    fn space_open_at(&self, space_id: SpaceId, date: NaiveDate, hour: u32) -> bool {
        self.schedules
            .get(&(space_id, day_index(date)))
            .is_some_and(|windows| windows.iter().any(|&(s, e)| s <= hour && hour < e))
    }

    /// A day is selectable when it is not closed and either the business
    /// opens or some space keeps its own schedule that weekday.
    pub(crate) fn day_enabled(&self, date: NaiveDate) -> bool {
        !self.is_closed_date(date)
            && (self.business_window(date).is_some() || self.scheduled_days[day_index(date) as usize])
    }

    /// Classify one hour for one space. `None` = not offered.
    pub(crate) fn classify(
        &self,
        date: NaiveDate,
        hour: u32,
        space_id: SpaceId,
        mode: EnumerationMode,
    ) -> Option<SlotKind> {
        if self.is_closed_date(date) {
            return None;
        }
        let within_business = match self.business_window(date) {
            Some((start, end)) => start <= hour && hour < end,
            None => false,
        };
        if within_business {
            self.space_open_at(space_id, date, hour).then_some(SlotKind::Regular)
        } else {
            (mode == EnumerationMode::Extended).then_some(SlotKind::Special)
        }
    }
}

fn valid_day(day_of_week: u8, record: &'static str) -> Option<usize> {
    if day_of_week > 6 {
        warn!("ignoring {record} with day_of_week {day_of_week}");
        metrics::counter!(MALFORMED_RECORDS_TOTAL, "record" => record).increment(1);
        return None;
    }
    Some(day_of_week as usize)
}

fn malformed(record: &'static str, start: &str, end: &str) {
    warn!("ignoring {record} with unparseable window {start:?}..{end:?}");
    metrics::counter!(MALFORMED_RECORDS_TOTAL, "record" => record).increment(1);
}

impl Engine {
    pub(crate) fn compile_rules(&self, snapshot: &Snapshot) -> WeekRules {
        WeekRules::compile(snapshot)
    }

    /// Enumerate every nominally open `(date, hour, space)` in `window`.
    ///
    /// Candidates come back `Open`; run them through `resolve` to apply
    /// reservations and the past-hour rule.
    pub fn enumerate(
        &self,
        window: &DateWindow,
        snapshot: &Snapshot,
        mode: EnumerationMode,
    ) -> Result<Vec<CandidateSlot>, EngineError> {
        if window.len_days() > MAX_WINDOW_DAYS {
            return Err(EngineError::LimitExceeded("date window too wide"));
        }
        if snapshot.spaces.len() > MAX_SPACES {
            return Err(EngineError::LimitExceeded("too many spaces"));
        }
        let rules = self.compile_rules(snapshot);
        Ok(self.enumerate_with(&rules, window, snapshot, mode))
    }

    pub(crate) fn enumerate_with(
        &self,
        rules: &WeekRules,
        window: &DateWindow,
        snapshot: &Snapshot,
        mode: EnumerationMode,
    ) -> Vec<CandidateSlot> {
        let tz = &self.config.timezone;
        let mut out = Vec::new();
        for date in window.days() {
            if rules.is_closed_date(date) {
                continue;
            }
            if rules.business_window(date).is_none() && mode == EnumerationMode::RegularOnly {
                continue;
            }
            for hour in self.config.envelope() {
                if hour_span(tz, date, hour).is_none() {
                    tracing::debug!("skipping nonexistent local hour {date} {hour:02}:00");
                    continue;
                }
                for space in &snapshot.spaces {
                    if let Some(kind) = rules.classify(date, hour, space.id, mode) {
                        out.push(CandidateSlot {
                            date,
                            hour,
                            space_id: space.id,
                            kind,
                            availability: Availability::Open,
                        });
                    }
                }
            }
        }

        let special = out.iter().filter(|c| c.is_special()).count() as u64;
        metrics::counter!(CANDIDATES_ENUMERATED_TOTAL, "kind" => "regular")
            .increment(out.len() as u64 - special);
        metrics::counter!(CANDIDATES_ENUMERATED_TOTAL, "kind" => "special").increment(special);
        out
    }

    /// Whether a calendar cell for `date` should be selectable.
    pub fn day_enabled(&self, date: NaiveDate, snapshot: &Snapshot) -> bool {
        self.compile_rules(snapshot).day_enabled(date)
    }
}
