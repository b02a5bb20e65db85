use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Unix milliseconds. Every interval in the engine is measured in these.
pub type Ms = i64;

pub type SpaceId = u64;
pub type ReservationId = u64;

/// Half-open interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    pub start: Ms,
    pub end: Ms,
}

impl Span {
    pub fn new(start: Ms, end: Ms) -> Self {
        debug_assert!(start < end, "Span start must be before end");
        Self { start, end }
    }

    pub fn duration_ms(&self) -> Ms {
        self.end - self.start
    }

    pub fn overlaps(&self, other: &Span) -> bool {
        self.start < other.end && other.start < self.end
    }
}

/// Serde helper for calendar dates that the backend sometimes sends as full
/// timestamps (`2025-06-02T00:00:00.000Z`). Only the date part is kept.
mod calendar_date {
    use chrono::NaiveDate;
    use serde::{self, Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(date: &NaiveDate, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&date.format("%Y-%m-%d").to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<NaiveDate, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        let head = s.get(..10).unwrap_or(&s);
        NaiveDate::parse_from_str(head, "%Y-%m-%d").map_err(serde::de::Error::custom)
    }
}

fn default_true() -> bool {
    true
}

/// Organisation-wide opening window for one weekday.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusinessHour {
    /// 0=Sunday .. 6=Saturday.
    pub day_of_week: u8,
    pub start_time: String,
    pub end_time: String,
    #[serde(default)]
    pub is_closed: bool,
}

/// A single space's own bookable window for one weekday.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpaceSchedule {
    pub space_id: SpaceId,
    pub day_of_week: u8,
    pub start_time: String,
    pub end_time: String,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

/// Full-day override that blocks all booking on `date`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClosedDate {
    #[serde(with = "calendar_date")]
    pub date: NaiveDate,
    #[serde(default)]
    pub reason: String,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReservationStatus {
    Pending,
    Confirmed,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    pub id: ReservationId,
    pub space_id: SpaceId,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub status: ReservationStatus,
}

impl Reservation {
    /// Cancelled reservations never block a slot.
    pub fn is_blocking(&self) -> bool {
        self.status != ReservationStatus::Cancelled
    }

    /// `None` for zero-length or inverted records.
    pub fn span(&self) -> Option<Span> {
        let start = self.start_time.timestamp_millis();
        let end = self.end_time.timestamp_millis();
        (start < end).then(|| Span::new(start, end))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Space {
    pub id: SpaceId,
    #[serde(default)]
    pub name: String,
    pub cost_credits: u32,
}

/// Regular slots sit inside the matched business and space window;
/// special slots lie outside it and need admin approval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SlotKind {
    Regular,
    Special,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "state", content = "reservation_id")]
pub enum Availability {
    Open,
    Occupied(ReservationId),
    Past,
}

/// Identity of one bookable hour: `(date, hour, space)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SlotKey {
    pub date: NaiveDate,
    pub hour: u32,
    pub space_id: SpaceId,
}

impl SlotKey {
    pub fn new(date: NaiveDate, hour: u32, space_id: SpaceId) -> Self {
        Self { date, hour, space_id }
    }
}

impl std::fmt::Display for SlotKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {:02}:00 space {}", self.date, self.hour, self.space_id)
    }
}

/// One enumerated `(date, hour, space)` candidate. Recomputed on every
/// query, never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateSlot {
    pub date: NaiveDate,
    pub hour: u32,
    pub space_id: SpaceId,
    pub kind: SlotKind,
    pub availability: Availability,
}

impl CandidateSlot {
    pub fn key(&self) -> SlotKey {
        SlotKey::new(self.date, self.hour, self.space_id)
    }

    pub fn is_available(&self) -> bool {
        self.availability == Availability::Open
    }

    pub fn is_special(&self) -> bool {
        self.kind == SlotKind::Special
    }

    pub fn with_availability(self, availability: Availability) -> Self {
        Self { availability, ..self }
    }
}

/// Server push events about reservations, folded into a snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum ReservationEvent {
    #[serde(rename = "reservation:created")]
    Created(Reservation),
    #[serde(rename = "reservation:updated")]
    Updated(Reservation),
    #[serde(rename = "reservation:approved")]
    Approved { reservation_id: ReservationId },
    #[serde(rename = "reservation:cancelled")]
    Cancelled { reservation_id: ReservationId },
    #[serde(rename = "calendar:refresh")]
    CalendarRefresh,
}
