use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::finance::PaymentStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "booking_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum BookingStatus {
    Pending,
    Confirmed,
    InProgress,
    Completed,
    Cancelled,
}

impl BookingStatus {
    pub const ALL: [BookingStatus; 5] = [
        BookingStatus::Pending,
        BookingStatus::Confirmed,
        BookingStatus::InProgress,
        BookingStatus::Completed,
        BookingStatus::Cancelled,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            BookingStatus::Pending => "pending",
            BookingStatus::Confirmed => "confirmed",
            BookingStatus::InProgress => "in_progress",
            BookingStatus::Completed => "completed",
            BookingStatus::Cancelled => "cancelled",
        }
    }

    /// Bookings in these states hold the technician's time slot.
    pub fn occupies_slot(self) -> bool {
        matches!(self, BookingStatus::Confirmed | BookingStatus::InProgress)
    }

    /// Complete transition table. Staying in the same state is always allowed.
    ///
    /// A completed booking may only be reopened as `in_progress`. A cancelled
    /// booking has released its parts and may only be re-queued as `pending`.
    pub fn can_transition_to(self, next: BookingStatus) -> bool {
        use BookingStatus::*;
        if self == next {
            return true;
        }
        match (self, next) {
            (Completed, Pending | Confirmed | Cancelled) => false,
            (Cancelled, Confirmed | InProgress | Completed) => false,
            _ => true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Booking {
    pub id: i64,
    pub customer_id: i64,
    pub technician_id: Option<i64>,
    pub detailed_service_id: i64,
    pub device_id: Option<i64>,
    pub status: BookingStatus,
    pub scheduled_time: DateTime<Utc>,
    pub is_active: bool,
    pub total_parts_cost: Decimal,
    pub payment_status: PaymentStatus,
    pub notes: String,
    pub diagnosis: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Booking {
    pub fn job_card_number(&self) -> String {
        job_card_number(self.id)
    }
}

/// Zero-padded display form of a booking id.
pub fn job_card_number(id: i64) -> String {
    format!("{:04}", id)
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct BookingPart {
    pub id: i64,
    pub booking_id: i64,
    pub part_id: i64,
    pub quantity: i32,
    pub unit_price: Decimal,
}

/// Requested part line on a booking create or update.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartRequest {
    pub part_id: i64,
    #[serde(default = "one")]
    pub quantity: i32,
}

fn one() -> i32 {
    1
}

#[derive(Debug, Serialize)]
pub struct BookingView {
    #[serde(flatten)]
    pub booking: Booking,
    pub job_card_number: String,
    pub parts_used: Vec<BookingPart>,
}

impl BookingView {
    pub fn new(booking: Booking, parts_used: Vec<BookingPart>) -> Self {
        Self {
            job_card_number: booking.job_card_number(),
            booking,
            parts_used,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use BookingStatus::*;

    #[test]
    fn completed_bookings_cannot_go_back() {
        assert!(!Completed.can_transition_to(Pending));
        assert!(!Completed.can_transition_to(Confirmed));
        assert!(!Completed.can_transition_to(Cancelled));
        assert!(Completed.can_transition_to(InProgress));
    }

    #[test]
    fn cancelled_bookings_can_only_be_requeued() {
        assert!(!Cancelled.can_transition_to(Completed));
        assert!(!Cancelled.can_transition_to(Confirmed));
        assert!(!Cancelled.can_transition_to(InProgress));
        assert!(Cancelled.can_transition_to(Pending));
    }

    #[test]
    fn forward_transitions_are_allowed() {
        for next in BookingStatus::ALL {
            assert!(Pending.can_transition_to(next));
        }
        assert!(Confirmed.can_transition_to(InProgress));
        assert!(InProgress.can_transition_to(Completed));
        assert!(InProgress.can_transition_to(Cancelled));
    }

    #[test]
    fn job_card_numbers_are_zero_padded() {
        assert_eq!(job_card_number(7), "0007");
        assert_eq!(job_card_number(12345), "12345");
    }
}
