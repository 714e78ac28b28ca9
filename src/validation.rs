//! Field validation for registration and profile input.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use crate::models::WeeklyAvailability;
use crate::scheduling::{parse_window, BusinessHours, WEEKDAYS};

/// Maximum allowed length for email addresses.
pub const MAX_EMAIL_LENGTH: usize = 254;

pub const MIN_PASSWORD_LENGTH: usize = 8;

/// Field name to the messages explaining what is wrong with it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct FieldErrors(BTreeMap<String, Vec<String>>);

impl FieldErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn single(field: &str, message: impl Into<String>) -> Self {
        let mut errors = Self::new();
        errors.add(field, message);
        errors
    }

    pub fn add(&mut self, field: &str, message: impl Into<String>) {
        self.0.entry(field.to_string()).or_default().push(message.into());
    }

    /// Records the error of `result` under `field`, if any.
    pub fn check(&mut self, field: &str, result: Result<(), String>) {
        if let Err(message) = result {
            self.add(field, message);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    pub fn into_result(self) -> Result<(), FieldErrors> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

/// The form an email is stored and looked up in, locally and at the identity provider.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Basic local@domain.tld check.
pub fn validate_email(email: &str) -> Result<(), String> {
    let email = email.trim();

    if email.is_empty() {
        return Err("email cannot be empty".to_string());
    }
    if email.len() > MAX_EMAIL_LENGTH {
        return Err(format!("email is too long (max {} chars)", MAX_EMAIL_LENGTH));
    }

    let Some((local, domain)) = email.split_once('@') else {
        return Err("email must contain an @ symbol".to_string());
    };
    if local.is_empty() || domain.contains('@') {
        return Err("email must have exactly one @ and a local part".to_string());
    }
    if !domain.contains('.') || domain.starts_with('.') || domain.ends_with('.') {
        return Err("email domain is invalid".to_string());
    }
    if domain.contains("..") {
        return Err("email domain cannot contain consecutive dots".to_string());
    }

    Ok(())
}

pub fn validate_password(password: &str) -> Result<(), String> {
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(format!(
            "password must be at least {} characters long",
            MIN_PASSWORD_LENGTH
        ));
    }
    if password.chars().all(|c| c.is_ascii_digit()) {
        return Err("password cannot be entirely numeric".to_string());
    }
    if !password.chars().any(|c| c.is_ascii_digit()) {
        return Err("password must contain at least one digit".to_string());
    }
    Ok(())
}

/// `+` optional, then 9 to 15 digits (an optional leading country `1` included).
pub fn validate_phone(phone: &str) -> Result<(), String> {
    let digits = phone.strip_prefix('+').unwrap_or(phone);
    if !digits.is_empty()
        && digits.chars().all(|c| c.is_ascii_digit())
        && (9..=16).contains(&digits.len())
        && (digits.len() <= 15 || digits.starts_with('1'))
    {
        Ok(())
    } else {
        Err("phone number must be entered in the format '+999999999', 9 to 15 digits".to_string())
    }
}

pub fn validate_specializations(specializations: &[String]) -> Result<Vec<String>, String> {
    let cleaned: BTreeSet<String> = specializations
        .iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();
    if cleaned.is_empty() {
        return Err("at least one specialization is required".to_string());
    }
    Ok(cleaned.into_iter().collect())
}

/// Every day must be a weekday name with a well-formed window inside shop hours.
pub fn validate_availability(
    availability: &WeeklyAvailability,
    hours: BusinessHours,
) -> Result<(), String> {
    for (day, window) in availability {
        if !WEEKDAYS.contains(&day.as_str()) {
            return Err(format!("invalid day: {}", day));
        }
        let (start, end) =
            parse_window(window).ok_or_else(|| format!("{}: start and end must be HH:MM", day))?;
        if start >= end {
            return Err(format!("{}: start time must be before end time", day));
        }
        if !hours.contains_window(start, end) {
            return Err(format!(
                "{}: availability must be within business hours ({} - {})",
                day,
                hours.start.format("%H:%M"),
                hours.end.format("%H:%M")
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AvailabilityWindow;
    use chrono::NaiveTime;

    fn shop_hours() -> BusinessHours {
        BusinessHours {
            start: NaiveTime::from_hms_opt(8, 0, 0).unwrap(),
            end: NaiveTime::from_hms_opt(18, 0, 0).unwrap(),
        }
    }

    fn window(start: &str, end: &str) -> AvailabilityWindow {
        AvailabilityWindow {
            start: Some(start.to_string()),
            end: Some(end.to_string()),
        }
    }

    #[test]
    fn test_validate_email() {
        assert!(validate_email("jane@example.com").is_ok());
        assert!(validate_email(" jane@example.co.ke ").is_ok());
        assert!(validate_email("").is_err());
        assert!(validate_email("jane.example.com").is_err());
        assert!(validate_email("a@b@c.com").is_err());
        assert!(validate_email("jane@localhost").is_err());
        assert!(validate_email("jane@example..com").is_err());
    }

    #[test]
    fn emails_are_trimmed_and_lowercased() {
        assert_eq!(normalize_email("  Jane.Doe@Example.COM "), "jane.doe@example.com");
    }

    #[test]
    fn test_validate_password() {
        assert!(validate_password("secret123").is_ok());
        assert!(validate_password("short1").is_err());
        assert!(validate_password("12345678").is_err());
        assert!(validate_password("no-digits-here").is_err());
    }

    #[test]
    fn test_validate_phone() {
        assert!(validate_phone("+254712345678").is_ok());
        assert!(validate_phone("712345678").is_ok());
        assert!(validate_phone("12345").is_err());
        assert!(validate_phone("+2547-1234").is_err());
    }

    #[test]
    fn test_validate_specializations() {
        let tags = vec![" laptops ".to_string(), "printers".to_string(), "laptops".to_string()];
        assert_eq!(
            validate_specializations(&tags).unwrap(),
            vec!["laptops".to_string(), "printers".to_string()]
        );
        assert!(validate_specializations(&["  ".to_string()]).is_err());
    }

    #[test]
    fn test_validate_availability() {
        let mut availability = WeeklyAvailability::new();
        availability.insert("monday".to_string(), window("08:00", "16:00"));
        assert!(validate_availability(&availability, shop_hours()).is_ok());

        availability.insert("funday".to_string(), window("09:00", "10:00"));
        assert!(validate_availability(&availability, shop_hours()).is_err());
        availability.remove("funday");

        availability.insert("tuesday".to_string(), window("12:00", "09:00"));
        assert!(validate_availability(&availability, shop_hours()).is_err());

        availability.insert("tuesday".to_string(), window("07:00", "12:00"));
        assert!(validate_availability(&availability, shop_hours()).is_err());
    }

    #[test]
    fn field_errors_collect_per_field() {
        let mut errors = FieldErrors::new();
        errors.check("email", validate_email("nope"));
        errors.check("password", validate_password("secret123"));
        assert!(errors.contains("email"));
        assert!(!errors.contains("password"));
        assert!(errors.into_result().is_err());
    }
}
