use chrono::{NaiveDate, Utc};
use serde::Serialize;
use tracing::{info, warn};

use hourgrid::config::EngineConfig;
use hourgrid::engine::{CalendarWeek, DateWindow, Engine, EnumerationMode, ViewMode, window_for};
use hourgrid::model::CandidateSlot;
use hourgrid::snapshot::{FileSnapshotSource, Snapshot, SnapshotOrigin, SnapshotSource, load_snapshot};
use hourgrid::time::local_date_hour;

#[derive(Serialize)]
struct Report {
    view: ViewMode,
    anchor: NaiveDate,
    window: DateWindow,
    origin: SnapshotOrigin,
    calendar: Vec<CalendarWeek>,
    slots: Vec<CandidateSlot>,
}

fn parse_mode(raw: &str) -> Result<EnumerationMode, String> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "regular" | "regular_only" => Ok(EnumerationMode::RegularOnly),
        "extended" => Ok(EnumerationMode::Extended),
        other => Err(format!("unknown enumeration mode: {other}")),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt().with_writer(std::io::stderr).init();

    let metrics_enabled = std::env::var("HOURGRID_METRICS")
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false);
    let metrics = hourgrid::observability::init(metrics_enabled)?;

    let config = EngineConfig::from_env()?;
    let engine = Engine::new(config);
    let now = Utc::now();
    let (today, _) = local_date_hour(&engine.timezone(), now);

    let dir = std::env::var("HOURGRID_SNAPSHOT_DIR").unwrap_or_else(|_| "./snapshot".into());
    let view: ViewMode = std::env::var("HOURGRID_VIEW")
        .unwrap_or_else(|_| "week".into())
        .parse()?;
    let anchor = match std::env::var("HOURGRID_ANCHOR") {
        Ok(raw) => NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")?,
        Err(_) => today,
    };
    let mode = parse_mode(&std::env::var("HOURGRID_MODE").unwrap_or_else(|_| "extended".into()))?;

    let window = window_for(view, anchor);
    info!("hourgrid: {view:?} view of {anchor} ({} .. {})", window.start, window.end);
    info!("  snapshot_dir: {dir}");
    info!("  timezone: {}", engine.timezone());

    let source = FileSnapshotSource::new(&dir);
    let snapshot = match load_snapshot(&source, &window).await {
        Ok(snapshot) => snapshot,
        Err(e) if e.allows_display_fallback() => {
            // Spaces alone are enough to draw the default table.
            warn!("{e}");
            let spaces = source.spaces().await?;
            warn!("showing default business hours; booking is disabled");
            Snapshot::display_fallback(spaces)
        }
        Err(e) => return Err(e.into()),
    };

    let slots = engine.availability(&window, &snapshot, mode, now)?;
    let open = slots.iter().filter(|c| c.is_available()).count();
    info!("{} candidates, {open} open", slots.len());

    let report = Report {
        view,
        anchor,
        window,
        origin: snapshot.origin,
        calendar: engine.calendar(view, anchor, today, &snapshot),
        slots,
    };
    println!("{}", serde_json::to_string_pretty(&report)?);

    if let Some(handle) = metrics {
        eprintln!("{}", handle.render());
    }
    Ok(())
}
