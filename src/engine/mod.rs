mod conflict;
mod enumerate;
mod error;
mod policy;
mod queries;
mod window;
#[cfg(test)]
mod tests;

pub use enumerate::EnumerationMode;
pub use error::EngineError;
pub use policy::{CancelRequest, CancellationTerms, check_credits};
pub use queries::{BoardCell, BoardRow, BoardStatus, DayBoard, SlotDecision, UnavailableReason};
pub use window::{CalendarDay, CalendarWeek, DateWindow, ViewMode, window_for};

use chrono_tz::Tz;

use crate::config::EngineConfig;

/// Slot engine. Pure over its inputs: every query takes the snapshot it
/// works on, and the only state held here is configuration.
#[derive(Debug, Clone)]
pub struct Engine {
    pub(crate) config: EngineConfig,
}

impl Engine {
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn timezone(&self) -> Tz {
        self.config.timezone
    }
}
