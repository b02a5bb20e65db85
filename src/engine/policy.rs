use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use crate::model::*;

use super::{Engine, EngineError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CancellationTerms {
    pub can_cancel: bool,
    pub penalty: u32,
    pub credits_to_refund: u32,
}

impl CancellationTerms {
    const REFUSED: Self = Self {
        can_cancel: false,
        penalty: 0,
        credits_to_refund: 0,
    };
}

/// Payload for the cancel endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelRequest {
    pub reservation_id: ReservationId,
    pub credits_to_refund: u32,
}

/// Advisory fast-fail before submitting. The server re-checks the balance.
pub fn check_credits(required: u32, held: u32) -> Result<(), EngineError> {
    if held < required {
        return Err(EngineError::CreditInsufficiency { required, held });
    }
    Ok(())
}

impl Engine {
    /// Credits for one hour of `space`, including the special surcharge.
    pub fn hour_cost(&self, space: &Space, kind: SlotKind) -> u32 {
        match kind {
            SlotKind::Regular => space.cost_credits,
            SlotKind::Special => space.cost_credits.saturating_add(self.config.special_surcharge),
        }
    }

    /// Sum of per-hour costs over a selection.
    pub fn total_cost<I>(&self, slots: I, spaces: &[Space]) -> Result<u32, EngineError>
    where
        I: IntoIterator<Item = (SlotKey, SlotKind)>,
    {
        let mut total: u32 = 0;
        for (key, kind) in slots {
            let space = spaces
                .iter()
                .find(|s| s.id == key.space_id)
                .ok_or(EngineError::UnknownSpace(key.space_id))?;
            total = total.saturating_add(self.hour_cost(space, kind));
        }
        Ok(total)
    }

    /// What cancelling `reservation` now would cost and refund.
    ///
    /// Pending reservations and confirmed ones outside the late window get
    /// the full `cost_credits` back. Inside the window the penalty is kept.
    pub fn cancellation_terms(
        &self,
        reservation: &Reservation,
        cost_credits: u32,
        now: DateTime<Utc>,
    ) -> CancellationTerms {
        if reservation.status == ReservationStatus::Cancelled || reservation.start_time <= now {
            return CancellationTerms::REFUSED;
        }
        let late = reservation.start_time - now <= TimeDelta::hours(self.config.late_cancel_hours);
        let penalty = match reservation.status {
            ReservationStatus::Confirmed if late => self.config.late_cancel_penalty,
            _ => 0,
        };
        CancellationTerms {
            can_cancel: true,
            penalty,
            credits_to_refund: cost_credits.saturating_sub(penalty),
        }
    }

    pub fn cancel_request(
        &self,
        reservation: &Reservation,
        cost_credits: u32,
        now: DateTime<Utc>,
    ) -> Option<CancelRequest> {
        let terms = self.cancellation_terms(reservation, cost_credits, now);
        terms.can_cancel.then_some(CancelRequest {
            reservation_id: reservation.id,
            credits_to_refund: terms.credits_to_refund,
        })
    }
}
