use chrono::{DateTime, NaiveDate, Utc};

use super::*;
use crate::config::EngineConfig;
use crate::model::*;
use crate::snapshot::Snapshot;
use crate::time::day_index;

fn engine() -> Engine {
    Engine::new(EngineConfig::new(chrono_tz::America::Mexico_City))
}

fn ts(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
}

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

// 2025-06-02 is a Monday.
fn monday() -> NaiveDate {
    date(2025, 6, 2)
}

// Friday before, so nothing under test is in the past.
fn before() -> DateTime<Utc> {
    ts("2025-05-30T15:00:00Z")
}

fn space(id: SpaceId, cost_credits: u32) -> Space {
    Space {
        id,
        name: format!("Consultorio {id}"),
        cost_credits,
    }
}

fn weekday_hours(start: &str, end: &str) -> Vec<BusinessHour> {
    (0u8..7)
        .map(|day| BusinessHour {
            day_of_week: day,
            start_time: start.into(),
            end_time: end.into(),
            is_closed: day == 0 || day == 6,
        })
        .collect()
}

fn schedule(space_id: SpaceId, day: u8, start: &str, end: &str) -> SpaceSchedule {
    SpaceSchedule {
        space_id,
        day_of_week: day,
        start_time: start.into(),
        end_time: end.into(),
        is_active: true,
    }
}

fn reservation(id: ReservationId, space_id: SpaceId, start: &str, end: &str) -> Reservation {
    Reservation {
        id,
        space_id,
        start_time: ts(start),
        end_time: ts(end),
        status: ReservationStatus::Confirmed,
    }
}

/// Monday 09-18 open, spaces 5 and 6 following the same Monday hours.
fn monday_snapshot() -> Snapshot {
    Snapshot::new(
        weekday_hours("09:00", "18:00"),
        vec![
            schedule(5, 1, "09:00", "18:00"),
            schedule(6, 1, "09:00", "18:00"),
        ],
        vec![],
        vec![],
        vec![space(5, 6), space(6, 8)],
    )
}

fn slot(slots: &[CandidateSlot], hour: u32, space_id: SpaceId) -> Option<CandidateSlot> {
    slots
        .iter()
        .find(|c| c.hour == hour && c.space_id == space_id)
        .copied()
}

// ── Scenario: book an hour, see it disappear ─────────────

#[test]
fn reservation_takes_slot_on_next_pass() {
    let e = engine();
    let mut snap = monday_snapshot();
    let window = DateWindow::single(monday());

    let grid = e
        .availability(&window, &snap, EnumerationMode::Extended, before())
        .unwrap();
    let c = slot(&grid, 14, 5).unwrap();
    assert!(c.is_available());
    assert_eq!(c.kind, SlotKind::Regular);

    // [14:00, 15:00) local
    snap.reservations
        .push(reservation(77, 5, "2025-06-02T20:00:00Z", "2025-06-02T21:00:00Z"));
    let grid = e
        .availability(&window, &snap, EnumerationMode::Extended, before())
        .unwrap();
    assert_eq!(slot(&grid, 14, 5).unwrap().availability, Availability::Occupied(77));
    assert!(slot(&grid, 13, 5).unwrap().is_available());
    assert!(slot(&grid, 15, 5).unwrap().is_available());
    assert!(slot(&grid, 14, 6).unwrap().is_available());
}

#[test]
fn created_event_blocks_slot_after_apply() {
    let e = engine();
    let mut snap = monday_snapshot();
    let window = DateWindow::single(monday());
    let event = ReservationEvent::Created(reservation(
        9,
        6,
        "2025-06-02T17:00:00Z",
        "2025-06-02T18:00:00Z",
    ));
    snap.apply(event);
    let grid = e
        .availability(&window, &snap, EnumerationMode::RegularOnly, before())
        .unwrap();
    assert_eq!(slot(&grid, 11, 6).unwrap().availability, Availability::Occupied(9));
    assert!(slot(&grid, 11, 5).unwrap().is_available());
}

#[test]
fn boundary_is_half_open() {
    let e = engine();
    let mut snap = monday_snapshot();
    // [09:00, 10:00) local
    snap.reservations
        .push(reservation(1, 5, "2025-06-02T15:00:00Z", "2025-06-02T16:00:00Z"));
    let grid = e
        .availability(&DateWindow::single(monday()), &snap, EnumerationMode::RegularOnly, before())
        .unwrap();
    assert_eq!(slot(&grid, 9, 5).unwrap().availability, Availability::Occupied(1));
    assert!(slot(&grid, 10, 5).unwrap().is_available());
}

#[test]
fn special_versus_omitted_without_schedule() {
    let e = engine();
    let mut snap = monday_snapshot();
    snap.schedules.retain(|s| s.space_id != 5);
    let grid = e
        .availability(&DateWindow::single(monday()), &snap, EnumerationMode::Extended, before())
        .unwrap();
    let early = slot(&grid, 8, 5).unwrap();
    assert!(early.is_special());
    assert!(early.is_available());
    assert!(slot(&grid, 10, 5).is_none());
}

#[test]
fn closed_date_has_no_available_candidates() {
    let e = engine();
    let mut snap = monday_snapshot();
    snap.closed_dates.push(ClosedDate {
        date: monday(),
        reason: "Día festivo".into(),
        is_active: true,
    });
    let week = window_for(ViewMode::Week, monday());
    let grid = e
        .availability(&week, &snap, EnumerationMode::Extended, before())
        .unwrap();
    assert!(!grid.iter().any(|c| c.date == monday() && c.is_available()));
    // Tuesday still offers special hours.
    assert!(grid.iter().any(|c| c.date == date(2025, 6, 3)));
}

#[test]
fn current_hour_blocked_and_resolve_is_stable() {
    let e = engine();
    let snap = monday_snapshot();
    // 14:05 local
    let now = ts("2025-06-02T20:05:00Z");
    let candidates = e
        .enumerate(&DateWindow::single(monday()), &snap, EnumerationMode::Extended)
        .unwrap();
    let once = e.resolve(candidates, &snap.reservations, now);
    for c in &once {
        if c.hour <= 14 {
            assert_eq!(c.availability, Availability::Past, "{}", c.key());
        } else {
            assert!(c.is_available(), "{}", c.key());
        }
    }
    let twice = e.resolve(once.clone(), &snap.reservations, now);
    assert_eq!(once, twice);
}

#[test]
fn month_windows_always_sunday_aligned() {
    let mut d = date(2023, 1, 1);
    while d <= date(2026, 12, 31) {
        let w = window_for(ViewMode::Month, d);
        assert_eq!(day_index(w.start), 0);
        assert_eq!(day_index(w.end), 6);
        d = d.succ_opt().unwrap();
    }
}

#[test]
fn selection_cost_matches_decisions() {
    let e = engine();
    let snap = monday_snapshot();
    let keys = [9, 10, 11].map(|h| SlotKey::new(monday(), h, 5));
    let mut slots: Vec<(SlotKey, SlotKind)> = keys.iter().map(|k| (*k, SlotKind::Regular)).collect();
    assert_eq!(e.total_cost(slots.iter().copied(), &snap.spaces), Ok(18));
    slots.push((SlotKey::new(monday(), 19, 5), SlotKind::Special));
    assert_eq!(e.total_cost(slots.iter().copied(), &snap.spaces), Ok(25));

    let sum: u32 = slots
        .iter()
        .map(|(k, _)| match e.decide(*k, &snap, None, before()).unwrap() {
            SlotDecision::Bookable { cost } | SlotDecision::PendingApproval { cost } => cost,
            other => panic!("unexpected {other:?}"),
        })
        .sum();
    assert_eq!(sum, 25);
}

// ── Single-slot decisions ────────────────────────────────

#[test]
fn decide_covers_every_outcome() {
    let e = engine();
    let mut snap = monday_snapshot();
    snap.reservations
        .push(reservation(3, 5, "2025-06-02T16:00:00Z", "2025-06-02T17:00:00Z"));
    let key = |hour| SlotKey::new(monday(), hour, 5);

    assert_eq!(
        e.decide(key(9), &snap, Some(100), before()),
        Ok(SlotDecision::Bookable { cost: 6 })
    );
    assert_eq!(
        e.decide(key(20), &snap, Some(100), before()),
        Ok(SlotDecision::PendingApproval { cost: 7 })
    );
    assert_eq!(
        e.decide(key(10), &snap, Some(100), before()),
        Ok(SlotDecision::Unavailable(UnavailableReason::Occupied(3)))
    );
    assert_eq!(
        e.decide(key(6), &snap, Some(100), before()),
        Ok(SlotDecision::Unavailable(UnavailableReason::NotOffered))
    );
    assert_eq!(
        e.decide(key(9), &snap, Some(5), before()),
        Ok(SlotDecision::InsufficientCredits { required: 6, held: 5 })
    );
    assert_eq!(
        e.decide(key(9), &snap, None, ts("2025-06-02T16:30:00Z")),
        Ok(SlotDecision::Unavailable(UnavailableReason::Past))
    );
    assert_eq!(
        e.decide(SlotKey::new(monday(), 9, 42), &snap, None, before()),
        Err(EngineError::UnknownSpace(42))
    );
    assert_eq!(e.decide(key(24), &snap, None, before()), Err(EngineError::InvalidHour(24)));

    snap.closed_dates.push(ClosedDate {
        date: monday(),
        reason: String::new(),
        is_active: true,
    });
    assert_eq!(
        e.decide(key(9), &snap, None, before()),
        Ok(SlotDecision::Unavailable(UnavailableReason::ClosedDate))
    );
}

#[test]
fn decide_agrees_with_grid() {
    let e = engine();
    let mut snap = monday_snapshot();
    snap.reservations
        .push(reservation(3, 6, "2025-06-02T18:00:00Z", "2025-06-02T20:00:00Z"));
    let now = ts("2025-06-02T16:10:00Z");
    let grid = e
        .availability(&DateWindow::single(monday()), &snap, EnumerationMode::Extended, now)
        .unwrap();
    for c in &grid {
        let decision = e.decide(c.key(), &snap, None, now).unwrap();
        let bookable = matches!(
            decision,
            SlotDecision::Bookable { .. } | SlotDecision::PendingApproval { .. }
        );
        assert_eq!(bookable, c.is_available(), "{}", c.key());
    }
}

#[test]
fn decision_serializes_tagged() {
    let json = serde_json::to_value(SlotDecision::Unavailable(UnavailableReason::Occupied(3))).unwrap();
    assert_eq!(
        json,
        serde_json::json!({"decision": "unavailable", "reason": "occupied", "reservation_id": 3})
    );
}

// ── Admin day board ──────────────────────────────────────

#[test]
fn day_board_statuses() {
    let e = engine();
    let mut snap = monday_snapshot();
    snap.schedules.retain(|s| !(s.space_id == 6 && s.start_time == "09:00"));
    snap.schedules.push(schedule(6, 1, "12:00", "18:00"));
    snap.reservations
        .push(reservation(4, 5, "2025-06-02T17:00:00Z", "2025-06-02T18:00:00Z"));
    let board = e.day_board(monday(), &snap, ts("2025-06-02T18:30:00Z"));

    assert_eq!(board.rows.len(), 15);
    assert_eq!(board.cell(11, 5), Some(BoardStatus::Booked(4)));
    assert_eq!(board.cell(13, 5), Some(BoardStatus::Available));
    assert_eq!(board.cell(7, 5), Some(BoardStatus::Special));
    assert_eq!(board.cell(10, 6), Some(BoardStatus::Closed));
    assert_eq!(board.cell(12, 6), Some(BoardStatus::Available));
    // 12:30 local: hour 12 and earlier are past
    assert!(board.rows.iter().find(|r| r.hour == 12).unwrap().past);
    assert!(!board.rows.iter().find(|r| r.hour == 13).unwrap().past);
}

#[test]
fn day_board_closed_date_keeps_bookings() {
    let e = engine();
    let mut snap = monday_snapshot();
    snap.reservations
        .push(reservation(4, 5, "2025-06-02T17:00:00Z", "2025-06-02T18:00:00Z"));
    snap.closed_dates.push(ClosedDate {
        date: monday(),
        reason: String::new(),
        is_active: true,
    });
    let board = e.day_board(monday(), &snap, before());
    assert_eq!(board.cell(11, 5), Some(BoardStatus::Booked(4)));
    assert_eq!(board.cell(12, 5), Some(BoardStatus::Closed));
    assert_eq!(board.cell(7, 6), Some(BoardStatus::Closed));
}

// ── Calendar ─────────────────────────────────────────────

#[test]
fn calendar_marks_days() {
    let e = engine();
    let mut snap = monday_snapshot();
    snap.closed_dates.push(ClosedDate {
        date: date(2025, 6, 4),
        reason: String::new(),
        is_active: true,
    });
    let weeks = e.calendar(ViewMode::Month, date(2025, 6, 15), date(2025, 6, 3), &snap);
    assert_eq!(weeks.len(), 5);
    assert!(weeks.iter().all(|w| w.days.len() == 7));

    let day = |d: NaiveDate| {
        *weeks
            .iter()
            .flat_map(|w| &w.days)
            .find(|c| c.date == d)
            .unwrap()
    };
    // Sunday: business closed and no space keeps Sunday hours.
    assert!(!day(date(2025, 6, 1)).enabled);
    assert!(day(date(2025, 6, 2)).enabled);
    assert!(day(date(2025, 6, 2)).is_past);
    assert!(day(date(2025, 6, 3)).is_today);
    assert!(!day(date(2025, 6, 4)).enabled);
    assert!(day(date(2025, 6, 5)).enabled);
    let july = day(date(2025, 7, 1));
    assert!(!july.in_anchor_month);
}

#[test]
fn fallback_snapshot_renders_weekdays() {
    let e = engine();
    let snap = Snapshot::display_fallback(vec![space(1, 5)]);
    let grid = e
        .availability(
            &window_for(ViewMode::Week, monday()),
            &snap,
            EnumerationMode::RegularOnly,
            before(),
        )
        .unwrap();
    // Five days of 09-18.
    assert_eq!(grid.len(), 45);
    assert!(grid.iter().all(|c| c.is_available()));
}
