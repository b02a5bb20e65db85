use chrono::{Datelike, Days, Months, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::snapshot::Snapshot;
use crate::time::{day_index, first_of_month, last_of_month};

use super::Engine;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ViewMode {
    Week,
    Month,
}

impl ViewMode {
    /// Move `anchor` by `delta` weeks or months. Month steps clamp the day
    /// (Jan 31 + 1 month = Feb 28/29).
    pub fn step(self, anchor: NaiveDate, delta: i32) -> Option<NaiveDate> {
        let magnitude = delta.unsigned_abs();
        match (self, delta >= 0) {
            (ViewMode::Week, true) => anchor.checked_add_days(Days::new(7 * magnitude as u64)),
            (ViewMode::Week, false) => anchor.checked_sub_days(Days::new(7 * magnitude as u64)),
            (ViewMode::Month, true) => anchor.checked_add_months(Months::new(magnitude)),
            (ViewMode::Month, false) => anchor.checked_sub_months(Months::new(magnitude)),
        }
    }
}

impl std::str::FromStr for ViewMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "week" => Ok(ViewMode::Week),
            "month" => Ok(ViewMode::Month),
            other => Err(format!("unknown view mode: {other}")),
        }
    }
}

/// Inclusive calendar date range `[start, end]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateWindow {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        debug_assert!(start <= end, "DateWindow start must not be after end");
        Self { start, end }
    }

    pub fn single(date: NaiveDate) -> Self {
        Self::new(date, date)
    }

    pub fn len_days(&self) -> i64 {
        (self.end - self.start).num_days() + 1
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }

    pub fn days(&self) -> impl Iterator<Item = NaiveDate> + use<> {
        let end = self.end;
        self.start.iter_days().take_while(move |d| *d <= end)
    }
}

fn week_start(date: NaiveDate) -> NaiveDate {
    date.checked_sub_days(Days::new(day_index(date) as u64))
        .unwrap_or(date)
}

fn week_end(date: NaiveDate) -> NaiveDate {
    date.checked_add_days(Days::new(6 - day_index(date) as u64))
        .unwrap_or(date)
}

/// Date range to fetch and display for a view, aligned to Sunday-first
/// weeks so every rendered row has seven days.
pub fn window_for(mode: ViewMode, anchor: NaiveDate) -> DateWindow {
    match mode {
        ViewMode::Week => DateWindow::new(week_start(anchor), week_end(anchor)),
        ViewMode::Month => DateWindow::new(
            week_start(first_of_month(anchor)),
            week_end(last_of_month(anchor)),
        ),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CalendarDay {
    pub date: NaiveDate,
    pub in_anchor_month: bool,
    pub is_today: bool,
    pub is_past: bool,
    pub enabled: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CalendarWeek {
    pub days: Vec<CalendarDay>,
}

impl Engine {
    /// Calendar rows for a view: one entry per week, seven days each.
    pub fn calendar(
        &self,
        mode: ViewMode,
        anchor: NaiveDate,
        today: NaiveDate,
        snapshot: &Snapshot,
    ) -> Vec<CalendarWeek> {
        let window = window_for(mode, anchor);
        let rules = self.compile_rules(snapshot);
        let days: Vec<CalendarDay> = window
            .days()
            .map(|date| CalendarDay {
                date,
                in_anchor_month: date.year() == anchor.year() && date.month() == anchor.month(),
                is_today: date == today,
                is_past: date < today,
                enabled: rules.day_enabled(date),
            })
            .collect();
        days.chunks(7)
            .map(|week| CalendarWeek { days: week.to_vec() })
            .collect()
    }
}
