//! Timestamp parsing for snapshot fields
//!
//! All parsers return epoch milliseconds in UTC so that values can be fed
//! straight into `date` fields of the search index (default `epoch_millis`).

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};

use crate::error::{Result, SyncError};

/// Format of `versions[].created`, e.g. `Mon, 2 Apr 2007 19:18:42 GMT`
pub const GMT_CREATED_FORMAT: &str = "%a, %d %b %Y %H:%M:%S GMT";

const PLAIN_DATE_FORMAT: &str = "%Y-%m-%d";

const NAIVE_DATETIME_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

/// Parse a record's `update_date` (plain date or ISO-8601) into epoch millis.
///
/// Plain dates resolve to midnight UTC. Datetimes without an offset are
/// taken as UTC.
pub fn parse_update_date(value: &str) -> Result<i64> {
    let value = value.trim();

    if let Ok(date) = NaiveDate::parse_from_str(value, PLAIN_DATE_FORMAT) {
        if let Some(midnight) = date.and_hms_opt(0, 0, 0) {
            return Ok(Utc.from_utc_datetime(&midnight).timestamp_millis());
        }
    }

    iso_to_timestamp_ms(value)
        .map_err(|_| SyncError::VersionParse(format!("unrecognized update_date '{}'", value)))
}

/// Parse an ISO-8601 timestamp into epoch millis, assuming UTC when no
/// offset is present.
pub fn iso_to_timestamp_ms(value: &str) -> Result<i64> {
    let value = value.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Ok(dt.with_timezone(&Utc).timestamp_millis());
    }

    for format in NAIVE_DATETIME_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(value, format) {
            return Ok(Utc.from_utc_datetime(&naive).timestamp_millis());
        }
    }

    Err(SyncError::VersionParse(format!(
        "unrecognized ISO-8601 timestamp '{}'",
        value
    )))
}

/// Parse a `versions[].created` value in [`GMT_CREATED_FORMAT`] into epoch millis.
pub fn parse_gmt_timestamp(value: &str) -> Result<i64> {
    NaiveDateTime::parse_from_str(value.trim(), GMT_CREATED_FORMAT)
        .map(|naive| Utc.from_utc_datetime(&naive).timestamp_millis())
        .map_err(|e| SyncError::VersionParse(format!("'{}': {}", value, e)))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_parse_plain_date() {
        assert_eq!(parse_update_date("2008-11-13").unwrap(), 1_226_534_400_000);
    }

    #[test]
    fn test_parse_iso_update_date() {
        assert_eq!(
            parse_update_date("2008-11-13T00:00:00Z").unwrap(),
            parse_update_date("2008-11-13").unwrap()
        );
        assert_eq!(
            parse_update_date("2008-11-13T02:00:00+02:00").unwrap(),
            1_226_534_400_000
        );
    }

    #[test]
    fn test_parse_update_date_rejects_garbage() {
        let err = parse_update_date("13/11/2008").unwrap_err();
        assert!(matches!(err, SyncError::VersionParse(_)));
    }

    #[test]
    fn test_iso_without_offset_is_utc() {
        assert_eq!(
            iso_to_timestamp_ms("2024-06-30T00:51:04.153").unwrap(),
            iso_to_timestamp_ms("2024-06-30T00:51:04.153Z").unwrap()
        );
    }

    #[test]
    fn test_parse_gmt_timestamp() {
        assert_eq!(
            parse_gmt_timestamp("Mon, 2 Apr 2007 19:18:42 GMT").unwrap(),
            1_175_541_522_000
        );
    }

    #[test]
    fn test_parse_gmt_timestamp_rejects_other_formats() {
        assert!(parse_gmt_timestamp("2007-04-02 19:18:42").is_err());
        assert!(parse_gmt_timestamp("Mon, 2 Apr 2007 19:18:42 UTC").is_err());
    }

    proptest! {
        #[test]
        fn prop_plain_dates_order_like_calendar(a in 0i64..40_000, b in 0i64..40_000) {
            let base = NaiveDate::from_ymd_opt(1990, 1, 1).unwrap();
            let da = base + chrono::Duration::days(a);
            let db = base + chrono::Duration::days(b);
            let ta = parse_update_date(&da.format("%Y-%m-%d").to_string()).unwrap();
            let tb = parse_update_date(&db.format("%Y-%m-%d").to_string()).unwrap();
            prop_assert_eq!(ta.cmp(&tb), da.cmp(&db));
        }
    }
}
