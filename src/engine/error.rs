use crate::model::{SlotKey, SpaceId};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    UnknownSpace(SpaceId),
    InvalidHour(u32),
    LimitExceeded(&'static str),
    EmptySelection,
    SlotUnavailable(SlotKey),
    InvalidTransition {
        from: &'static str,
        action: &'static str,
    },
    /// The snapshot came from the display fallback table and cannot
    /// authorize a booking.
    FallbackSnapshot,
    CreditInsufficiency {
        required: u32,
        held: u32,
    },
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::UnknownSpace(id) => write!(f, "unknown space: {id}"),
            EngineError::InvalidHour(hour) => write!(f, "hour out of range: {hour}"),
            EngineError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
            EngineError::EmptySelection => write!(f, "no slots selected"),
            EngineError::SlotUnavailable(key) => write!(f, "slot not available: {key}"),
            EngineError::InvalidTransition { from, action } => {
                write!(f, "cannot {action} while {from}")
            }
            EngineError::FallbackSnapshot => {
                write!(f, "snapshot is a display fallback and cannot authorize bookings")
            }
            EngineError::CreditInsufficiency { required, held } => {
                write!(f, "insufficient credits: {required} required, {held} held")
            }
        }
    }
}

impl std::error::Error for EngineError {}
