//! Wall-clock helpers. Schedules are expressed in local `HH:MM`; the ledger
//! stores UTC instants.

use chrono::{DateTime, Duration, Local, NaiveDate, NaiveTime, TimeZone, Utc};
use std::sync::Arc;

use finclaw_core::error::{FinClawError, Result};

/// Source of "now" for the coordinator, sweeper and executor callbacks.
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// The real clock.
pub fn system_clock() -> Clock {
    Arc::new(Utc::now)
}

/// Parse a local `HH:MM` (or `H:MM`) time of day.
pub fn parse_time_of_day(value: &str) -> Result<NaiveTime> {
    let trimmed = value.trim();
    let (hour, minute) = trimmed
        .split_once(':')
        .ok_or_else(|| FinClawError::Config(format!("invalid time of day '{value}', expected HH:MM")))?;
    let hour: u32 = hour
        .parse()
        .map_err(|_| FinClawError::Config(format!("invalid hour in '{value}'")))?;
    let minute: u32 = minute
        .parse()
        .map_err(|_| FinClawError::Config(format!("invalid minute in '{value}'")))?;
    NaiveTime::from_hms_opt(hour, minute, 0)
        .ok_or_else(|| FinClawError::Config(format!("time of day '{value}' out of range")))
}

/// `HH:MM` rendering used for `intended_time`.
pub fn format_time_of_day(time: NaiveTime) -> String {
    time.format("%H:%M").to_string()
}

/// Local calendar date of an instant.
pub fn local_date(now: DateTime<Utc>) -> NaiveDate {
    now.with_timezone(&Local).date_naive()
}

/// UTC instant of a local date + time. A time skipped by a DST jump resolves
/// to the first valid instant after it.
pub fn local_instant(date: NaiveDate, time: NaiveTime) -> DateTime<Utc> {
    let naive = date.and_time(time);
    let mut probe = naive;
    for _ in 0..4 {
        if let Some(dt) = Local.from_local_datetime(&probe).earliest() {
            return dt.with_timezone(&Utc);
        }
        probe += Duration::minutes(30);
    }
    Utc.from_utc_datetime(&naive)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;

    #[test]
    fn test_parse_time_of_day() {
        let t = parse_time_of_day("09:05").unwrap();
        assert_eq!((t.hour(), t.minute()), (9, 5));
        let t = parse_time_of_day(" 7:30 ").unwrap();
        assert_eq!((t.hour(), t.minute()), (7, 30));
    }

    #[test]
    fn test_parse_time_of_day_rejects_garbage() {
        assert!(parse_time_of_day("9am").is_err());
        assert!(parse_time_of_day("24:00").is_err());
        assert!(parse_time_of_day("12:60").is_err());
        assert!(parse_time_of_day("").is_err());
    }

    #[test]
    fn test_local_instant_roundtrip() {
        let date = NaiveDate::from_ymd_opt(2026, 3, 2).unwrap();
        let time = NaiveTime::from_hms_opt(9, 0, 0).unwrap();
        let instant = local_instant(date, time);
        let back = instant.with_timezone(&Local);
        assert_eq!(back.date_naive(), date);
        assert_eq!(back.time(), time);
        assert_eq!(local_date(instant), date);
        assert_eq!(format_time_of_day(time), "09:00");
    }
}
