//! Booking schedule rules: shop hours, technician availability, slot overlap and
//! status transitions. Everything here is pure; the booking store feeds it rows.

use chrono::{DateTime, Datelike, Duration, FixedOffset, NaiveTime, Timelike, Utc, Weekday};
use serde::Serialize;

use crate::models::{AvailabilityWindow, BookingStatus, WeeklyAvailability};

pub const WEEKDAYS: [&str; 7] = [
    "monday",
    "tuesday",
    "wednesday",
    "thursday",
    "friday",
    "saturday",
    "sunday",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BusinessHours {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl BusinessHours {
    /// Hour-granular, half open: 08:00–18:00 accepts 17:59 and rejects 18:00.
    pub fn contains_hour(&self, hour: u32) -> bool {
        self.start.hour() <= hour && hour < self.end.hour()
    }

    pub fn contains_window(&self, start: NaiveTime, end: NaiveTime) -> bool {
        start >= self.start && end <= self.end
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ScheduleRules {
    pub hours: BusinessHours,
    pub offset: FixedOffset,
}

/// Why a booking cannot be scheduled as requested.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ScheduleViolation {
    #[error("bookings must be between {start} and {end}")]
    OutsideBusinessHours { start: String, end: String },

    #[error("technician is not available on {day}")]
    TechnicianUnavailableDay { day: String },

    #[error("technician availability for {day} is incomplete or malformed")]
    InvalidAvailabilityData { day: String },

    #[error("technician is only available between {start} and {end} on {day}")]
    OutsideTechnicianHours {
        day: String,
        start: String,
        end: String,
    },

    #[error("technician already has booking {booking_id} at this time")]
    SlotConflict { booking_id: i64 },

    #[error("cannot change booking status from {from} to {to}")]
    InvalidStatusTransition { from: String, to: String },
}

impl ScheduleViolation {
    pub fn reason(&self) -> &'static str {
        match self {
            ScheduleViolation::OutsideBusinessHours { .. } => "outside_business_hours",
            ScheduleViolation::TechnicianUnavailableDay { .. } => "technician_unavailable_day",
            ScheduleViolation::InvalidAvailabilityData { .. } => "invalid_availability_data",
            ScheduleViolation::OutsideTechnicianHours { .. } => "outside_technician_hours",
            ScheduleViolation::SlotConflict { .. } => "slot_conflict",
            ScheduleViolation::InvalidStatusTransition { .. } => "invalid_status_transition",
        }
    }
}

pub fn weekday_name(day: Weekday) -> &'static str {
    WEEKDAYS[day.num_days_from_monday() as usize]
}

pub fn parse_clock(raw: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(raw.trim(), "%H:%M").ok()
}

/// Both ends of a stored window, if present and well formed.
pub fn parse_window(window: &AvailabilityWindow) -> Option<(NaiveTime, NaiveTime)> {
    let start = parse_clock(window.start.as_deref()?)?;
    let end = parse_clock(window.end.as_deref()?)?;
    Some((start, end))
}

impl ScheduleRules {
    pub fn local(&self, at: DateTime<Utc>) -> DateTime<FixedOffset> {
        at.with_timezone(&self.offset)
    }

    pub fn check_business_hours(&self, at: DateTime<Utc>) -> Result<(), ScheduleViolation> {
        if self.hours.contains_hour(self.local(at).hour()) {
            Ok(())
        } else {
            Err(ScheduleViolation::OutsideBusinessHours {
                start: self.hours.start.format("%H:%M").to_string(),
                end: self.hours.end.format("%H:%M").to_string(),
            })
        }
    }

    pub fn check_technician(
        &self,
        at: DateTime<Utc>,
        availability: &WeeklyAvailability,
    ) -> Result<(), ScheduleViolation> {
        let local = self.local(at);
        let day = weekday_name(local.weekday());

        let window = availability
            .get(day)
            .ok_or_else(|| ScheduleViolation::TechnicianUnavailableDay {
                day: day.to_string(),
            })?;

        let (start, end) =
            parse_window(window).ok_or_else(|| ScheduleViolation::InvalidAvailabilityData {
                day: day.to_string(),
            })?;

        let hour = local.hour();
        if start.hour() <= hour && hour < end.hour() {
            Ok(())
        } else {
            Err(ScheduleViolation::OutsideTechnicianHours {
                day: day.to_string(),
                start: start.format("%H:%M").to_string(),
                end: end.format("%H:%M").to_string(),
            })
        }
    }

    /// Business hours, then the technician's weekly window when one is assigned.
    pub fn check(
        &self,
        at: DateTime<Utc>,
        technician: Option<&WeeklyAvailability>,
    ) -> Result<(), ScheduleViolation> {
        self.check_business_hours(at)?;
        if let Some(availability) = technician {
            self.check_technician(at, availability)?;
        }
        Ok(())
    }
}

/// A booking already holding a technician's time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct Slot {
    pub booking_id: i64,
    pub scheduled_time: DateTime<Utc>,
    pub minutes: i64,
}

impl Slot {
    pub fn end(&self) -> DateTime<Utc> {
        self.scheduled_time + Duration::minutes(self.minutes)
    }
}

/// First existing slot intersecting `[start, start + minutes)`, ignoring `exclude`.
pub fn find_overlap(
    start: DateTime<Utc>,
    minutes: i64,
    existing: &[Slot],
    exclude: Option<i64>,
) -> Option<i64> {
    let end = start + Duration::minutes(minutes);
    existing
        .iter()
        .filter(|slot| Some(slot.booking_id) != exclude)
        .find(|slot| slot.scheduled_time < end && start < slot.end())
        .map(|slot| slot.booking_id)
}

pub fn check_transition(from: BookingStatus, to: BookingStatus) -> Result<(), ScheduleViolation> {
    if from.can_transition_to(to) {
        Ok(())
    } else {
        Err(ScheduleViolation::InvalidStatusTransition {
            from: from.as_str().to_string(),
            to: to.as_str().to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn rules() -> ScheduleRules {
        ScheduleRules {
            hours: BusinessHours {
                start: NaiveTime::from_hms_opt(8, 0, 0).unwrap(),
                end: NaiveTime::from_hms_opt(18, 0, 0).unwrap(),
            },
            offset: FixedOffset::east_opt(0).unwrap(),
        }
    }

    // 2025-03-10 is a Monday.
    fn monday(hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 10, hour, minute, 0).unwrap()
    }

    fn window(start: &str, end: &str) -> AvailabilityWindow {
        AvailabilityWindow {
            start: Some(start.to_string()),
            end: Some(end.to_string()),
        }
    }

    #[test]
    fn early_morning_booking_is_outside_business_hours() {
        let err = rules().check_business_hours(monday(7, 30)).unwrap_err();
        assert_eq!(err.reason(), "outside_business_hours");
        assert!(rules().check_business_hours(monday(17, 59)).is_ok());
        assert!(rules().check_business_hours(monday(18, 0)).is_err());
    }

    #[test]
    fn local_offset_is_applied_before_the_hour_check() {
        let mut shop = rules();
        shop.offset = FixedOffset::east_opt(3 * 3600).unwrap();
        // 05:30 UTC is 08:30 at +03:00.
        assert!(shop.check_business_hours(monday(5, 30)).is_ok());
        assert!(shop.check_business_hours(monday(15, 30)).is_err());
    }

    #[test]
    fn booking_after_technician_shift_is_rejected() {
        let mut availability = WeeklyAvailability::new();
        availability.insert("monday".to_string(), window("08:00", "16:00"));

        let err = rules().check(monday(17, 0), Some(&availability)).unwrap_err();
        assert_eq!(err.reason(), "outside_technician_hours");
        assert!(rules().check(monday(15, 0), Some(&availability)).is_ok());
    }

    #[test]
    fn missing_day_and_malformed_window_have_distinct_reasons() {
        let mut availability = WeeklyAvailability::new();
        availability.insert("tuesday".to_string(), window("08:00", "16:00"));
        assert_eq!(
            rules().check(monday(10, 0), Some(&availability)).unwrap_err().reason(),
            "technician_unavailable_day"
        );

        availability.insert(
            "monday".to_string(),
            AvailabilityWindow {
                start: Some("8am".to_string()),
                end: None,
            },
        );
        assert_eq!(
            rules().check(monday(10, 0), Some(&availability)).unwrap_err().reason(),
            "invalid_availability_data"
        );
    }

    #[test]
    fn overlapping_slot_is_found() {
        let existing = [Slot {
            booking_id: 1,
            scheduled_time: monday(10, 0),
            minutes: 60,
        }];
        assert_eq!(find_overlap(monday(10, 30), 60, &existing, None), Some(1));
        assert_eq!(find_overlap(monday(11, 0), 60, &existing, None), None);
        assert_eq!(find_overlap(monday(9, 0), 60, &existing, None), None);
        assert_eq!(find_overlap(monday(9, 30), 60, &existing, None), Some(1));
    }

    #[test]
    fn updated_booking_does_not_conflict_with_itself() {
        let existing = [Slot {
            booking_id: 4,
            scheduled_time: monday(10, 0),
            minutes: 90,
        }];
        assert_eq!(find_overlap(monday(10, 30), 60, &existing, Some(4)), None);
    }

    #[test]
    fn transition_gate_reports_reason() {
        let err = check_transition(BookingStatus::Completed, BookingStatus::Pending).unwrap_err();
        assert_eq!(err.reason(), "invalid_status_transition");
        assert!(check_transition(BookingStatus::Pending, BookingStatus::Confirmed).is_ok());
    }

    #[test]
    fn weekday_names_start_on_monday() {
        assert_eq!(weekday_name(Weekday::Mon), "monday");
        assert_eq!(weekday_name(Weekday::Sun), "sunday");
    }
}
