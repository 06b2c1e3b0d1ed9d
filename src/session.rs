//! Session context anchoring a capture session to a meal log entry.
//!
//! The context is read once at workflow entry from page-embedded hidden
//! fields or query parameters. Its absence is a hard stop: no capture
//! workflow can exist without a record date and a time slot.

use chrono::NaiveDate;
use thiserror::Error;

/// Errors raised while establishing the session context.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SessionContextError {
    #[error("Missing session field: {0}")]
    Missing(&'static str),

    #[error("Invalid record date: {0}")]
    InvalidDate(String),

    #[error("Invalid time slot: {0}")]
    InvalidSlot(String),
}

impl SessionContextError {
    /// User-facing guidance for the hard-stop redirect.
    pub fn user_message(&self) -> &'static str {
        match self {
            SessionContextError::Missing(_) => {
                "Meal log information is missing. Please start again from the meal entry screen."
            }
            SessionContextError::InvalidDate(_) => {
                "The record date is not valid. Please start again from the meal entry screen."
            }
            SessionContextError::InvalidSlot(_) => {
                "The meal time slot is not valid. Please start again from the meal entry screen."
            }
        }
    }
}

/// Meal time slot within a record date.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeSlot {
    Morning,
    Lunch,
    Dinner,
}

impl TimeSlot {
    /// Parse the single-letter wire code.
    pub fn parse(code: &str) -> Result<Self, SessionContextError> {
        match code.trim() {
            "M" => Ok(TimeSlot::Morning),
            "L" => Ok(TimeSlot::Lunch),
            "D" => Ok(TimeSlot::Dinner),
            other => Err(SessionContextError::InvalidSlot(other.to_string())),
        }
    }

    /// Wire code sent back to the server.
    pub fn code(&self) -> &'static str {
        match self {
            TimeSlot::Morning => "M",
            TimeSlot::Lunch => "L",
            TimeSlot::Dinner => "D",
        }
    }

    /// Human-readable meal label derived for display and for backward
    /// compatibility with older server expectations.
    pub fn meal_label(&self) -> &'static str {
        match self {
            TimeSlot::Morning => "breakfast",
            TimeSlot::Lunch => "lunch",
            TimeSlot::Dinner => "dinner",
        }
    }
}

/// Immutable (record date, time slot) pair for one capture session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionContext {
    record_date: NaiveDate,
    time_slot: TimeSlot,
}

impl SessionContext {
    /// Build a context from raw field values.
    ///
    /// Accepts `YYYYMMDD`, `YYYY-MM-DD` and `YYYY/MM/DD` date spellings.
    pub fn new(record_date: &str, time_slot: &str) -> Result<Self, SessionContextError> {
        let raw = record_date.trim();
        if raw.is_empty() {
            return Err(SessionContextError::Missing("record_date"));
        }
        let slot_raw = time_slot.trim();
        if slot_raw.is_empty() {
            return Err(SessionContextError::Missing("time_slot"));
        }

        let compact: String = raw.chars().filter(|c| *c != '-' && *c != '/').collect();
        let record_date = NaiveDate::parse_from_str(&compact, "%Y%m%d")
            .map_err(|_| SessionContextError::InvalidDate(raw.to_string()))?;

        Ok(Self {
            record_date,
            time_slot: TimeSlot::parse(slot_raw)?,
        })
    }

    /// Resolve the context from query parameters with page-embedded hidden
    /// fields as fallback. Query values win when both are present.
    pub fn from_fields(
        query_date: Option<&str>,
        query_slot: Option<&str>,
        hidden_date: Option<&str>,
        hidden_slot: Option<&str>,
    ) -> Result<Self, SessionContextError> {
        let date = first_non_empty(query_date, hidden_date)
            .ok_or(SessionContextError::Missing("record_date"))?;
        let slot = first_non_empty(query_slot, hidden_slot)
            .ok_or(SessionContextError::Missing("time_slot"))?;
        Self::new(date, slot)
    }

    /// Compact `YYYYMMDD` wire form.
    pub fn record_date_compact(&self) -> String {
        self.record_date.format("%Y%m%d").to_string()
    }

    /// Derived `YYYY-MM-DD` display form.
    pub fn display_date(&self) -> String {
        self.record_date.format("%Y-%m-%d").to_string()
    }

    /// The meal time slot.
    pub fn time_slot(&self) -> TimeSlot {
        self.time_slot
    }

    /// Derived meal label for the time slot.
    pub fn meal_label(&self) -> &'static str {
        self.time_slot.meal_label()
    }
}

fn first_non_empty<'a>(primary: Option<&'a str>, fallback: Option<&'a str>) -> Option<&'a str> {
    primary
        .filter(|v| !v.trim().is_empty())
        .or_else(|| fallback.filter(|v| !v.trim().is_empty()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compact_date_roundtrip() {
        let ctx = SessionContext::new("20260102", "M").unwrap();
        assert_eq!(ctx.record_date_compact(), "20260102");
        assert_eq!(ctx.display_date(), "2026-01-02");
        assert_eq!(ctx.meal_label(), "breakfast");
    }

    #[test]
    fn test_dashed_and_slashed_dates() {
        let dashed = SessionContext::new("2026-01-02", "L").unwrap();
        let slashed = SessionContext::new("2026/01/02", "L").unwrap();
        assert_eq!(dashed, slashed);
        assert_eq!(dashed.meal_label(), "lunch");
    }

    #[test]
    fn test_missing_fields_hard_stop() {
        assert_eq!(
            SessionContext::new("", "M"),
            Err(SessionContextError::Missing("record_date"))
        );
        assert_eq!(
            SessionContext::new("20260102", "  "),
            Err(SessionContextError::Missing("time_slot"))
        );
    }

    #[test]
    fn test_invalid_date_rejected() {
        assert!(matches!(
            SessionContext::new("20261345", "D"),
            Err(SessionContextError::InvalidDate(_))
        ));
        assert!(matches!(
            SessionContext::new("not-a-date", "D"),
            Err(SessionContextError::InvalidDate(_))
        ));
    }

    #[test]
    fn test_invalid_slot_rejected() {
        assert!(matches!(
            SessionContext::new("20260102", "X"),
            Err(SessionContextError::InvalidSlot(_))
        ));
    }

    #[test]
    fn test_query_params_win_over_hidden_fields() {
        let ctx = SessionContext::from_fields(
            Some("20260301"),
            Some("D"),
            Some("20260102"),
            Some("M"),
        )
        .unwrap();
        assert_eq!(ctx.record_date_compact(), "20260301");
        assert_eq!(ctx.time_slot(), TimeSlot::Dinner);
    }

    #[test]
    fn test_hidden_fields_fill_empty_query() {
        let ctx =
            SessionContext::from_fields(Some(""), None, Some("20260102"), Some("M")).unwrap();
        assert_eq!(ctx.record_date_compact(), "20260102");
        assert_eq!(ctx.time_slot(), TimeSlot::Morning);
    }

    #[test]
    fn test_absent_everywhere_is_fatal() {
        assert_eq!(
            SessionContext::from_fields(None, Some("M"), None, Some("M")),
            Err(SessionContextError::Missing("record_date"))
        );
    }
}
