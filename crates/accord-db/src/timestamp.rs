//! RFC 3339 timestamp encoding for TEXT columns.
//!
//! All timestamps are written in UTC with microsecond precision and a `Z`
//! suffix so that lexical order in SQLite matches chronological order.

use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};

/// The current time at storage precision.
///
/// Values built from this compare equal to what is read back.
pub fn now_timestamp() -> DateTime<Utc> {
    truncate_timestamp(Utc::now())
}

/// Drops sub-microsecond precision.
pub fn truncate_timestamp(ts: DateTime<Utc>) -> DateTime<Utc> {
    ts.trunc_subsecs(6)
}

/// Encodes a timestamp for storage.
pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Decodes a stored timestamp, mapping parse failures to a rusqlite
/// conversion error for the given column index.
pub fn parse_timestamp(raw: &str, column: usize) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(
                column,
                rusqlite::types::Type::Text,
                Box::new(e),
            )
        })
}

/// Reads a nullable timestamp column.
pub fn parse_optional_timestamp(
    raw: Option<String>,
    column: usize,
) -> rusqlite::Result<Option<DateTime<Utc>>> {
    raw.map(|value| parse_timestamp(&value, column)).transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn encoding_is_lexically_ordered() {
        let early = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();
        let late = Utc.with_ymd_and_hms(2024, 11, 2, 3, 4, 5).unwrap();
        let a = format_timestamp(early);
        let b = format_timestamp(late);
        assert_eq!(a, "2024-01-02T03:04:05.000000Z");
        assert!(a < b);
    }

    #[test]
    fn parse_round_trips_and_rejects_garbage() {
        let ts = Utc.with_ymd_and_hms(2025, 6, 30, 23, 59, 59).unwrap();
        assert_eq!(parse_timestamp(&format_timestamp(ts), 0).unwrap(), ts);
        assert!(parse_timestamp("yesterday", 3).is_err());
        assert_eq!(parse_optional_timestamp(None, 1).unwrap(), None);
    }

    #[test]
    fn now_survives_storage() {
        let now = now_timestamp();
        assert_eq!(parse_timestamp(&format_timestamp(now), 0).unwrap(), now);
    }
}
