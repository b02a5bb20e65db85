//! The five backend inputs the engine reads, loaded together.
//!
//! A snapshot is either fetched in full or not at all: `load_snapshot`
//! joins every part and reports all failures as one error. The display
//! fallback table is kept apart by `SnapshotOrigin` so it can drive a
//! calendar but never a booking.

use std::path::PathBuf;
use std::time::Instant;

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};

use crate::engine::DateWindow;
use crate::model::*;
use crate::observability::{SNAPSHOT_FETCH_FAILURES_TOTAL, SNAPSHOT_LOAD_DURATION_SECONDS};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SnapshotOrigin {
    Fetched,
    DisplayFallback,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SnapshotPart {
    BusinessHours,
    Schedules,
    ClosedDates,
    Reservations,
    Spaces,
}

impl SnapshotPart {
    pub fn as_str(self) -> &'static str {
        match self {
            SnapshotPart::BusinessHours => "business_hours",
            SnapshotPart::Schedules => "schedules",
            SnapshotPart::ClosedDates => "closed_dates",
            SnapshotPart::Reservations => "reservations",
            SnapshotPart::Spaces => "spaces",
        }
    }
}

impl std::fmt::Display for SnapshotPart {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    Io(String),
    Decode(String),
    Transport(String),
}

impl std::fmt::Display for FetchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FetchError::Io(msg) => write!(f, "io error: {msg}"),
            FetchError::Decode(msg) => write!(f, "decode error: {msg}"),
            FetchError::Transport(msg) => write!(f, "transport error: {msg}"),
        }
    }
}

impl std::error::Error for FetchError {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartFailure {
    pub part: SnapshotPart,
    pub error: FetchError,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SnapshotError {
    /// One or more parts failed. Parts that did load are discarded.
    Partial { failed: Vec<PartFailure> },
}

impl SnapshotError {
    pub fn failed_parts(&self) -> Vec<SnapshotPart> {
        match self {
            SnapshotError::Partial { failed } => failed.iter().map(|f| f.part).collect(),
        }
    }

    /// The default table only replaces business hours and schedules. Any
    /// other missing part would make the fallback grid show taken or closed
    /// hours as open.
    pub fn allows_display_fallback(&self) -> bool {
        let parts = self.failed_parts();
        parts.contains(&SnapshotPart::BusinessHours)
            && parts
                .iter()
                .all(|p| matches!(p, SnapshotPart::BusinessHours | SnapshotPart::Schedules))
    }
}

impl std::fmt::Display for SnapshotError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SnapshotError::Partial { failed } => {
                write!(f, "snapshot incomplete:")?;
                for (i, failure) in failed.iter().enumerate() {
                    let sep = if i == 0 { " " } else { "; " };
                    write!(f, "{sep}{}: {}", failure.part, failure.error)?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for SnapshotError {}

/// Result of folding one push event into a snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reconcile {
    Applied,
    /// The event could not be applied locally; fetch a fresh snapshot.
    RefetchRequired,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub business_hours: Vec<BusinessHour>,
    pub schedules: Vec<SpaceSchedule>,
    pub closed_dates: Vec<ClosedDate>,
    pub reservations: Vec<Reservation>,
    pub spaces: Vec<Space>,
    pub origin: SnapshotOrigin,
}

impl Snapshot {
    pub fn new(
        business_hours: Vec<BusinessHour>,
        schedules: Vec<SpaceSchedule>,
        closed_dates: Vec<ClosedDate>,
        reservations: Vec<Reservation>,
        spaces: Vec<Space>,
    ) -> Self {
        Self {
            business_hours,
            schedules,
            closed_dates,
            reservations,
            spaces,
            origin: SnapshotOrigin::Fetched,
        }
    }

    /// Default table shown when business hours cannot be fetched:
    /// Monday to Friday 09:00-18:00, weekends closed, every space following
    /// the same hours. Carries no reservations, so it may only be displayed.
    pub fn display_fallback(spaces: Vec<Space>) -> Self {
        let business_hours = (0u8..7)
            .map(|day| {
                let weekday = (1..=5).contains(&day);
                BusinessHour {
                    day_of_week: day,
                    start_time: "09:00".into(),
                    end_time: "18:00".into(),
                    is_closed: !weekday,
                }
            })
            .collect();
        let schedules = spaces
            .iter()
            .flat_map(|space| {
                (1u8..=5).map(move |day| SpaceSchedule {
                    space_id: space.id,
                    day_of_week: day,
                    start_time: "09:00".into(),
                    end_time: "18:00".into(),
                    is_active: true,
                })
            })
            .collect();
        Self {
            business_hours,
            schedules,
            closed_dates: Vec::new(),
            reservations: Vec::new(),
            spaces,
            origin: SnapshotOrigin::DisplayFallback,
        }
    }

    pub fn is_authoritative(&self) -> bool {
        self.origin == SnapshotOrigin::Fetched
    }

    pub fn space(&self, id: SpaceId) -> Option<&Space> {
        self.spaces.iter().find(|s| s.id == id)
    }

    pub fn reservation(&self, id: ReservationId) -> Option<&Reservation> {
        self.reservations.iter().find(|r| r.id == id)
    }

    fn reservation_mut(&mut self, id: ReservationId) -> Option<&mut Reservation> {
        self.reservations.iter_mut().find(|r| r.id == id)
    }

    /// Fold a server push event into the reservation list.
    pub fn apply(&mut self, event: ReservationEvent) -> Reconcile {
        match event {
            ReservationEvent::Created(reservation) => {
                match self.reservation_mut(reservation.id) {
                    Some(existing) => *existing = reservation,
                    None => self.reservations.push(reservation),
                }
                Reconcile::Applied
            }
            ReservationEvent::Updated(reservation) => match self.reservation_mut(reservation.id) {
                Some(existing) => {
                    *existing = reservation;
                    Reconcile::Applied
                }
                None => {
                    debug!("update for unknown reservation {}", reservation.id);
                    Reconcile::RefetchRequired
                }
            },
            ReservationEvent::Approved { reservation_id } => match self.reservation_mut(reservation_id) {
                Some(existing) => {
                    existing.status = ReservationStatus::Confirmed;
                    Reconcile::Applied
                }
                None => Reconcile::RefetchRequired,
            },
            // Unknown ids are fine here: nothing local blocks on them.
            ReservationEvent::Cancelled { reservation_id } => {
                if let Some(existing) = self.reservation_mut(reservation_id) {
                    existing.status = ReservationStatus::Cancelled;
                }
                Reconcile::Applied
            }
            ReservationEvent::CalendarRefresh => Reconcile::RefetchRequired,
        }
    }
}

/// One fetch per snapshot input.
#[async_trait]
pub trait SnapshotSource: Send + Sync {
    async fn business_hours(&self) -> Result<Vec<BusinessHour>, FetchError>;
    async fn schedules(&self) -> Result<Vec<SpaceSchedule>, FetchError>;
    async fn closed_dates(&self, window: &DateWindow) -> Result<Vec<ClosedDate>, FetchError>;
    async fn reservations(&self, window: &DateWindow) -> Result<Vec<Reservation>, FetchError>;
    async fn spaces(&self) -> Result<Vec<Space>, FetchError>;
}

fn record<T>(
    part: SnapshotPart,
    result: Result<Vec<T>, FetchError>,
    failed: &mut Vec<PartFailure>,
) -> Vec<T> {
    match result {
        Ok(items) => items,
        Err(error) => {
            warn!("snapshot part {part} failed: {error}");
            metrics::counter!(SNAPSHOT_FETCH_FAILURES_TOTAL, "part" => part.as_str()).increment(1);
            failed.push(PartFailure { part, error });
            Vec::new()
        }
    }
}

/// Fetch all five inputs concurrently. Any failure fails the whole load.
pub async fn load_snapshot<S>(source: &S, window: &DateWindow) -> Result<Snapshot, SnapshotError>
where
    S: SnapshotSource + ?Sized,
{
    let started = Instant::now();
    let (business_hours, schedules, closed_dates, reservations, spaces) = tokio::join!(
        source.business_hours(),
        source.schedules(),
        source.closed_dates(window),
        source.reservations(window),
        source.spaces(),
    );

    let mut failed = Vec::new();
    let business_hours = record(SnapshotPart::BusinessHours, business_hours, &mut failed);
    let schedules = record(SnapshotPart::Schedules, schedules, &mut failed);
    let closed_dates = record(SnapshotPart::ClosedDates, closed_dates, &mut failed);
    let reservations = record(SnapshotPart::Reservations, reservations, &mut failed);
    let spaces = record(SnapshotPart::Spaces, spaces, &mut failed);

    metrics::histogram!(SNAPSHOT_LOAD_DURATION_SECONDS).record(started.elapsed().as_secs_f64());
    if !failed.is_empty() {
        return Err(SnapshotError::Partial { failed });
    }
    info!(
        "snapshot loaded: {} spaces, {} reservations, {} closed dates",
        spaces.len(),
        reservations.len(),
        closed_dates.len()
    );
    Ok(Snapshot::new(business_hours, schedules, closed_dates, reservations, spaces))
}

/// Decode a backend listing that may be a bare array or an object wrapping
/// the array under `key` or `data`. An object with neither decodes as empty.
pub fn decode_listing<T: DeserializeOwned>(bytes: &[u8], key: &str) -> Result<Vec<T>, FetchError> {
    let value: serde_json::Value =
        serde_json::from_slice(bytes).map_err(|e| FetchError::Decode(e.to_string()))?;
    let items = match value {
        serde_json::Value::Array(_) => value,
        serde_json::Value::Object(mut map) => match map.remove(key).or_else(|| map.remove("data")) {
            Some(inner) => inner,
            None => {
                warn!("listing object has no {key:?} or \"data\" array, treating as empty");
                return Ok(Vec::new());
            }
        },
        other => {
            return Err(FetchError::Decode(format!("expected array or object, got {other}")));
        }
    };
    serde_json::from_value(items).map_err(|e| FetchError::Decode(e.to_string()))
}

/// Reads each input from `<dir>/<part>.json`. The date window is not used
/// to filter: files hold whatever the exporter wrote.
#[derive(Debug, Clone)]
pub struct FileSnapshotSource {
    dir: PathBuf,
}

impl FileSnapshotSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    async fn read<T: DeserializeOwned>(&self, part: SnapshotPart) -> Result<Vec<T>, FetchError> {
        let path = self.dir.join(format!("{part}.json"));
        let bytes = tokio::fs::read(&path)
            .await
            .map_err(|e| FetchError::Io(format!("{}: {e}", path.display())))?;
        decode_listing(&bytes, part.as_str())
    }
}

#[async_trait]
impl SnapshotSource for FileSnapshotSource {
    async fn business_hours(&self) -> Result<Vec<BusinessHour>, FetchError> {
        self.read(SnapshotPart::BusinessHours).await
    }

    async fn schedules(&self) -> Result<Vec<SpaceSchedule>, FetchError> {
        self.read(SnapshotPart::Schedules).await
    }

    async fn closed_dates(&self, _window: &DateWindow) -> Result<Vec<ClosedDate>, FetchError> {
        self.read(SnapshotPart::ClosedDates).await
    }

    async fn reservations(&self, _window: &DateWindow) -> Result<Vec<Reservation>, FetchError> {
        self.read(SnapshotPart::Reservations).await
    }

    async fn spaces(&self) -> Result<Vec<Space>, FetchError> {
        self.read(SnapshotPart::Spaces).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, NaiveDate, Utc};

    fn ts(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    fn reservation(id: ReservationId, status: ReservationStatus) -> Reservation {
        Reservation {
            id,
            space_id: 5,
            start_time: ts("2025-06-02T20:00:00Z"),
            end_time: ts("2025-06-02T21:00:00Z"),
            status,
        }
    }

    fn space(id: SpaceId) -> Space {
        Space { id, name: String::new(), cost_credits: 6 }
    }

    struct StaticSource {
        fail: Vec<SnapshotPart>,
    }

    impl StaticSource {
        fn check<T>(&self, part: SnapshotPart, items: Vec<T>) -> Result<Vec<T>, FetchError> {
            if self.fail.contains(&part) {
                return Err(FetchError::Transport("503".into()));
            }
            Ok(items)
        }
    }

    #[async_trait]
    impl SnapshotSource for StaticSource {
        async fn business_hours(&self) -> Result<Vec<BusinessHour>, FetchError> {
            self.check(SnapshotPart::BusinessHours, Snapshot::display_fallback(vec![]).business_hours)
        }
        async fn schedules(&self) -> Result<Vec<SpaceSchedule>, FetchError> {
            self.check(SnapshotPart::Schedules, vec![])
        }
        async fn closed_dates(&self, _: &DateWindow) -> Result<Vec<ClosedDate>, FetchError> {
            self.check(SnapshotPart::ClosedDates, vec![])
        }
        async fn reservations(&self, _: &DateWindow) -> Result<Vec<Reservation>, FetchError> {
            self.check(
                SnapshotPart::Reservations,
                vec![reservation(1, ReservationStatus::Confirmed)],
            )
        }
        async fn spaces(&self) -> Result<Vec<Space>, FetchError> {
            self.check(SnapshotPart::Spaces, vec![space(5)])
        }
    }

    fn window() -> DateWindow {
        DateWindow::single(NaiveDate::from_ymd_opt(2025, 6, 2).unwrap())
    }

    #[tokio::test]
    async fn full_load_is_authoritative() {
        let snap = load_snapshot(&StaticSource { fail: vec![] }, &window()).await.unwrap();
        assert!(snap.is_authoritative());
        assert_eq!(snap.business_hours.len(), 7);
        assert_eq!(snap.reservations.len(), 1);
        assert_eq!(snap.space(5).map(|s| s.cost_credits), Some(6));
    }

    #[tokio::test]
    async fn any_failed_part_fails_the_load() {
        let source = StaticSource {
            fail: vec![SnapshotPart::Schedules, SnapshotPart::Reservations],
        };
        let err = load_snapshot(&source, &window()).await.unwrap_err();
        assert_eq!(
            err.failed_parts(),
            vec![SnapshotPart::Schedules, SnapshotPart::Reservations]
        );
        let msg = err.to_string();
        assert!(msg.contains("schedules: transport error: 503"), "{msg}");
        assert!(msg.contains("; reservations"), "{msg}");
    }

    #[tokio::test]
    async fn fallback_only_covers_missing_hours() {
        let load = |fail: Vec<SnapshotPart>| async move {
            load_snapshot(&StaticSource { fail }, &window()).await.unwrap_err()
        };
        assert!(load(vec![SnapshotPart::BusinessHours]).await.allows_display_fallback());
        assert!(
            load(vec![SnapshotPart::BusinessHours, SnapshotPart::Schedules])
                .await
                .allows_display_fallback()
        );
        assert!(!load(vec![SnapshotPart::Schedules]).await.allows_display_fallback());
        assert!(!load(vec![SnapshotPart::Reservations]).await.allows_display_fallback());
        assert!(!load(vec![SnapshotPart::ClosedDates]).await.allows_display_fallback());
        assert!(
            !load(vec![SnapshotPart::BusinessHours, SnapshotPart::Reservations])
                .await
                .allows_display_fallback()
        );
    }

    #[tokio::test]
    async fn load_through_trait_object() {
        let source: Box<dyn SnapshotSource> = Box::new(StaticSource { fail: vec![] });
        assert!(load_snapshot(source.as_ref(), &window()).await.is_ok());
    }

    #[test]
    fn fallback_table_shape() {
        let snap = Snapshot::display_fallback(vec![space(1), space(2)]);
        assert!(!snap.is_authoritative());
        let open: Vec<u8> = snap
            .business_hours
            .iter()
            .filter(|bh| !bh.is_closed)
            .map(|bh| bh.day_of_week)
            .collect();
        assert_eq!(open, vec![1, 2, 3, 4, 5]);
        assert_eq!(snap.schedules.len(), 10);
        assert!(snap.reservations.is_empty());
    }

    #[test]
    fn listing_bare_array() {
        let spaces: Vec<Space> =
            decode_listing(br#"[{"id": 1, "name": "A", "cost_credits": 6}]"#, "spaces").unwrap();
        assert_eq!(spaces.len(), 1);
    }

    #[test]
    fn listing_wrapped_under_key_or_data() {
        let by_key: Vec<Space> =
            decode_listing(br#"{"spaces": [{"id": 1, "cost_credits": 6}]}"#, "spaces").unwrap();
        assert_eq!(by_key[0].id, 1);
        let by_data: Vec<Space> =
            decode_listing(br#"{"data": [{"id": 2, "cost_credits": 6}]}"#, "spaces").unwrap();
        assert_eq!(by_data[0].id, 2);
    }

    #[test]
    fn listing_object_without_array_is_empty() {
        let schedules: Vec<SpaceSchedule> =
            decode_listing(br#"{"message": "ok"}"#, "schedules").unwrap();
        assert!(schedules.is_empty());
    }

    #[test]
    fn listing_rejects_scalars_and_bad_items() {
        assert!(matches!(decode_listing::<Space>(b"42", "spaces"), Err(FetchError::Decode(_))));
        assert!(matches!(
            decode_listing::<Space>(br#"[{"id": "x"}]"#, "spaces"),
            Err(FetchError::Decode(_))
        ));
    }

    #[test]
    fn apply_created_then_cancelled() {
        let mut snap = Snapshot::new(vec![], vec![], vec![], vec![], vec![space(5)]);
        let r = reservation(3, ReservationStatus::Pending);
        assert_eq!(snap.apply(ReservationEvent::Created(r.clone())), Reconcile::Applied);
        // Replayed create replaces rather than duplicates.
        assert_eq!(snap.apply(ReservationEvent::Created(r)), Reconcile::Applied);
        assert_eq!(snap.reservations.len(), 1);

        assert_eq!(
            snap.apply(ReservationEvent::Approved { reservation_id: 3 }),
            Reconcile::Applied
        );
        assert_eq!(snap.reservation(3).unwrap().status, ReservationStatus::Confirmed);

        assert_eq!(
            snap.apply(ReservationEvent::Cancelled { reservation_id: 3 }),
            Reconcile::Applied
        );
        assert!(!snap.reservation(3).unwrap().is_blocking());
    }

    #[test]
    fn apply_unknown_ids() {
        let mut snap = Snapshot::new(vec![], vec![], vec![], vec![], vec![]);
        assert_eq!(
            snap.apply(ReservationEvent::Updated(reservation(8, ReservationStatus::Confirmed))),
            Reconcile::RefetchRequired
        );
        assert_eq!(
            snap.apply(ReservationEvent::Approved { reservation_id: 8 }),
            Reconcile::RefetchRequired
        );
        assert_eq!(
            snap.apply(ReservationEvent::Cancelled { reservation_id: 8 }),
            Reconcile::Applied
        );
        assert_eq!(snap.apply(ReservationEvent::CalendarRefresh), Reconcile::RefetchRequired);
        assert!(snap.reservations.is_empty());
    }
}
