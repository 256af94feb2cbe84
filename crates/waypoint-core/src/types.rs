//! Shared value types for request bodies and responses

use chrono::{DateTime as ChronoDateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::ops::Deref;
use utoipa::ToSchema;

/// Canonical UTC timestamp used by every crate (hit timestamps, window bounds).
pub type UtcDateTime = ChronoDateTime<Utc>;

/// ISO 8601 timestamp accepted from analysts.
///
/// Accepts:
/// - `2024-01-15T14:30:00` (naive, assumed UTC)
/// - `2024-01-15T14:30:00Z`
/// - `2024-01-15T14:30:00+02:00` (converted to UTC)
/// - `2024-01-15` (midnight UTC, or the last instant of the day via [`DateTime::parse_end`])
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, ToSchema)]
#[schema(value_type = String, example = "2024-01-15T14:30:00Z")]
pub struct DateTime(pub UtcDateTime);

impl DateTime {
    pub fn parse(s: &str) -> Option<Self> {
        Self::parse_timestamp(s).or_else(|| Self::parse_date(s, start_of_day))
    }

    /// Like [`DateTime::parse`], but a bare date resolves to the last instant of
    /// that day so an inclusive window ending on it covers the whole day.
    pub fn parse_end(s: &str) -> Option<Self> {
        Self::parse_timestamp(s).or_else(|| Self::parse_date(s, end_of_day))
    }

    fn parse_timestamp(s: &str) -> Option<Self> {
        if let Ok(dt) = s.parse::<UtcDateTime>() {
            return Some(DateTime(dt));
        }

        ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M:%S%.f"]
            .into_iter()
            .find_map(|format| NaiveDateTime::parse_from_str(s, format).ok())
            .map(|naive| DateTime(UtcDateTime::from_naive_utc_and_offset(naive, Utc)))
    }

    fn parse_date(s: &str, at: fn(NaiveDate) -> Option<NaiveDateTime>) -> Option<Self> {
        NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .ok()
            .and_then(at)
            .map(|naive| DateTime(UtcDateTime::from_naive_utc_and_offset(naive, Utc)))
    }
}

fn start_of_day(date: NaiveDate) -> Option<NaiveDateTime> {
    date.and_hms_opt(0, 0, 0)
}

fn end_of_day(date: NaiveDate) -> Option<NaiveDateTime> {
    date.and_hms_nano_opt(23, 59, 59, 999_999_999)
}

const INVALID_DATETIME: &str = "Invalid datetime format. Use ISO 8601: YYYY-MM-DDTHH:MM:SSZ";

/// `deserialize_with` helper for window end bounds, see [`DateTime::parse_end`].
pub fn deserialize_end_date<'de, D>(deserializer: D) -> Result<DateTime, D::Error>
where
    D: Deserializer<'de>,
{
    let s: String = Deserialize::deserialize(deserializer)?;
    DateTime::parse_end(&s).ok_or_else(|| serde::de::Error::custom(INVALID_DATETIME))
}

impl<'de> Deserialize<'de> for DateTime {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s: String = Deserialize::deserialize(deserializer)?;
        DateTime::parse(&s).ok_or_else(|| serde::de::Error::custom(INVALID_DATETIME))
    }
}

impl Serialize for DateTime {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.0.to_rfc3339())
    }
}

impl Deref for DateTime {
    type Target = UtcDateTime;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl From<UtcDateTime> for DateTime {
    fn from(dt: UtcDateTime) -> Self {
        DateTime(dt)
    }
}

impl From<DateTime> for UtcDateTime {
    fn from(dt: DateTime) -> Self {
        dt.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};

    #[test]
    fn test_datetime_deserialize_naive() {
        let dt: DateTime = serde_json::from_str(r#""2024-01-15T14:30:00""#).unwrap();
        assert_eq!(dt.year(), 2024);
        assert_eq!(dt.hour(), 14);
        assert_eq!(dt.minute(), 30);
    }

    #[test]
    fn test_datetime_deserialize_offset_converts_to_utc() {
        let dt: DateTime = serde_json::from_str(r#""2024-01-15T16:30:00+02:00""#).unwrap();
        assert_eq!(dt.hour(), 14);
    }

    #[test]
    fn test_datetime_deserialize_date_only() {
        let dt: DateTime = serde_json::from_str(r#""2024-03-01""#).unwrap();
        assert_eq!(dt.month(), 3);
        assert_eq!(dt.hour(), 0);
    }

    #[test]
    fn test_parse_end_resolves_date_to_end_of_day() {
        let end = DateTime::parse_end("2024-03-01").unwrap();
        assert_eq!(end.day(), 1);
        assert_eq!((end.hour(), end.minute(), end.second()), (23, 59, 59));
        assert!(end.0 < DateTime::parse("2024-03-02").unwrap().0);

        let explicit = DateTime::parse_end("2024-03-01T00:00:00Z").unwrap();
        assert_eq!(explicit.hour(), 0);
    }

    #[test]
    fn test_end_date_field_covers_whole_day() {
        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct Window {
            start_date: DateTime,
            #[serde(deserialize_with = "deserialize_end_date")]
            end_date: DateTime,
        }

        let window: Window =
            serde_json::from_str(r#"{"startDate":"2024-03-01","endDate":"2024-03-01"}"#).unwrap();
        assert_eq!(window.start_date.hour(), 0);
        assert_eq!(window.end_date.hour(), 23);
        assert!(window.start_date < window.end_date);

        let bad: Result<Window, _> =
            serde_json::from_str(r#"{"startDate":"2024-03-01","endDate":"soon"}"#);
        assert!(bad.is_err());
    }

    #[test]
    fn test_datetime_deserialize_invalid() {
        let result: Result<DateTime, _> = serde_json::from_str(r#""last tuesday""#);
        assert!(result.is_err());
    }

    #[test]
    fn test_datetime_window_in_struct() {
        #[derive(Deserialize, Serialize)]
        #[serde(rename_all = "camelCase")]
        struct Window {
            start_date: DateTime,
            end_date: DateTime,
        }

        let json = r#"{"startDate":"2024-01-15T00:00:00Z","endDate":"2024-01-16T00:00:00"}"#;
        let window: Window = serde_json::from_str(json).unwrap();
        assert!(window.start_date < window.end_date);

        let serialized = serde_json::to_string(&window).unwrap();
        assert_eq!(
            serialized,
            r#"{"startDate":"2024-01-15T00:00:00+00:00","endDate":"2024-01-16T00:00:00+00:00"}"#
        );
    }
}
