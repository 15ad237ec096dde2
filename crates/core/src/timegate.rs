use std::cmp::Ordering;

use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;

/// Decision returned by the injection-day gate.
///
/// Orders post to the POS on the calendar day of the event in the venue's
/// timezone: earlier would clutter the live order view with future orders,
/// later would resurrect stale events. The comparison is date-only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    Proceed,
    TooEarly,
    EventDayPassed,
    UnknownTimezone,
    InvalidDateFormat,
    MissingData,
}

impl GateDecision {
    /// Returns the stable reason string used in acknowledgments.
    pub fn reason(self) -> &'static str {
        match self {
            Self::Proceed => "PROCEED",
            Self::TooEarly => "TOO_EARLY",
            Self::EventDayPassed => "EVENT_DAY_PASSED",
            Self::UnknownTimezone => "UNKNOWN_TIMEZONE",
            Self::InvalidDateFormat => "INVALID_DATE_FORMAT",
            Self::MissingData => "MISSING_DATA",
        }
    }

    pub fn is_proceed(self) -> bool {
        matches!(self, Self::Proceed)
    }
}

/// Evaluates whether `now` falls on the event's calendar day.
pub fn evaluate(
    event_date: Option<&str>,
    timezone: Option<&str>,
    now: DateTime<Utc>,
) -> GateDecision {
    let Some(timezone) = timezone.map(str::trim).filter(|value| !value.is_empty()) else {
        return GateDecision::UnknownTimezone;
    };
    let Ok(tz) = timezone.parse::<Tz>() else {
        return GateDecision::UnknownTimezone;
    };
    let Some(event_date) = event_date.map(str::trim).filter(|value| !value.is_empty()) else {
        return GateDecision::MissingData;
    };
    let Some(event_day) = parse_event_date(event_date) else {
        return GateDecision::InvalidDateFormat;
    };

    let today = now.with_timezone(&tz).date_naive();
    match today.cmp(&event_day) {
        Ordering::Less => GateDecision::TooEarly,
        Ordering::Equal => GateDecision::Proceed,
        Ordering::Greater => GateDecision::EventDayPassed,
    }
}

/// Parses the platform's event date, ISO form first, then the US short form
/// seen on older events.
pub fn parse_event_date(value: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(value, "%m/%d/%Y"))
        .ok()
}
