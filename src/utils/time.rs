use chrono::{DateTime, NaiveDate, NaiveTime, TimeZone, Utc};

const RECORD_FILE_EXTENSION: &str = "jsonl";
const RECORD_DATE_FORMAT: &str = "%Y-%m-%d";

/// This is the standard way of naming the record file of a day.
pub fn date_to_record_name(date: NaiveDate) -> String {
    format!("{}.{RECORD_FILE_EXTENSION}", date.format(RECORD_DATE_FORMAT))
}

/// Inverse of [date_to_record_name]. Foreign files in the record directory yield `None`.
pub fn record_name_to_date(name: &str) -> Option<NaiveDate> {
    let stem = name.strip_suffix(RECORD_FILE_EXTENSION)?.strip_suffix('.')?;
    NaiveDate::parse_from_str(stem, RECORD_DATE_FORMAT).ok()
}

/// Whole seconds elapsed between two instants, rounded down. A clock that went backwards yields
/// 0 rather than a negative duration.
pub fn whole_seconds_between(start: DateTime<Utc>, end: DateTime<Utc>) -> i64 {
    (end - start).num_seconds().max(0)
}

pub fn start_of_day(date: NaiveDate) -> DateTime<Utc> {
    Utc.from_utc_datetime(&date.and_time(NaiveTime::MIN))
}

/// Last representable instant of a UTC day, used to make date-only upper bounds inclusive.
pub fn end_of_day(date: NaiveDate) -> DateTime<Utc> {
    let last = NaiveTime::from_hms_nano_opt(23, 59, 59, 999_999_999).unwrap_or(NaiveTime::MIN);
    Utc.from_utc_datetime(&date.and_time(last))
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, NaiveDate, TimeZone, Utc};

    use super::{date_to_record_name, end_of_day, record_name_to_date, whole_seconds_between};

    #[test]
    fn record_names_round_trip() {
        let date = NaiveDate::from_ymd_opt(2024, 1, 31).unwrap();
        assert_eq!(date_to_record_name(date), "2024-01-31.jsonl");
        assert_eq!(record_name_to_date("2024-01-31.jsonl"), Some(date));
        assert_eq!(record_name_to_date("2024-01-31"), None);
        assert_eq!(record_name_to_date("notes.jsonl"), None);
    }

    #[test]
    fn durations_are_floored_and_never_negative() {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, 0).unwrap();
        assert_eq!(
            whole_seconds_between(start, start + Duration::milliseconds(2999)),
            2
        );
        assert_eq!(whole_seconds_between(start, start - Duration::seconds(5)), 0);
    }

    #[test]
    fn end_of_day_stays_inside_the_day() {
        let date = NaiveDate::from_ymd_opt(2024, 1, 31).unwrap();
        assert_eq!(end_of_day(date).date_naive(), date);
        assert_eq!(
            (end_of_day(date) + Duration::nanoseconds(1)).date_naive(),
            date.succ_opt().unwrap()
        );
    }
}
