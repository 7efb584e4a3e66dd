use chrono::{DateTime, Duration, NaiveDate, NaiveTime, TimeZone, Utc};

// DST gaps end on a quarter hour within four hours
const GAP_STEP_MINUTES: i64 = 15;
const GAP_SEARCH_STEPS: i64 = 4 * 4;

/// Half-open UTC interval `[start, end)` covering the given local day
pub fn day_bounds<T: TimeZone>(date: NaiveDate, tz: &T) -> (DateTime<Utc>, DateTime<Utc>) {
    let next = date.succ_opt().unwrap_or(NaiveDate::MAX);
    (local_midnight(date, tz), local_midnight(next, tz))
}

pub fn local_date<T: TimeZone>(timestamp: DateTime<Utc>, tz: &T) -> NaiveDate {
    timestamp.with_timezone(tz).date_naive()
}

pub fn today<T: TimeZone>(tz: &T) -> NaiveDate {
    local_date(Utc::now(), tz)
}

/// First instant of the local day. Where a DST change skips midnight the
/// day starts with the first wall-clock time that exists.
fn local_midnight<T: TimeZone>(date: NaiveDate, tz: &T) -> DateTime<Utc> {
    let midnight = date.and_time(NaiveTime::MIN);
    (0..=GAP_SEARCH_STEPS)
        .map(|step| midnight + Duration::minutes(GAP_STEP_MINUTES * step))
        .find_map(|naive| tz.from_local_datetime(&naive).earliest())
        .map(|local| local.with_timezone(&Utc))
        .unwrap_or_else(|| Utc.from_utc_datetime(&midnight))
}
