use chrono::{DateTime, Duration, NaiveDate, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;

const DAY_START_PROBE_MINUTES: i64 = 15;
const DAY_START_PROBES: i64 = 24 * 60 / DAY_START_PROBE_MINUTES;

/// Returns the UTC bounds `[start, end)` of the local calendar day containing `at`.
pub fn local_day_bounds(tz: &Tz, at: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
    let date = at.with_timezone(tz).date_naive();
    let start = start_of_local_day(tz, date);
    let end = date
        .succ_opt()
        .map(|next| start_of_local_day(tz, next))
        .unwrap_or(start + Duration::days(1));
    (start, end)
}

fn start_of_local_day(tz: &Tz, date: NaiveDate) -> DateTime<Utc> {
    let midnight = date.and_time(NaiveTime::MIN);
    // Some zones skip midnight on DST changes; the day then starts at the
    // first local time that exists.
    (0..=DAY_START_PROBES)
        .map(|step| midnight + Duration::minutes(step * DAY_START_PROBE_MINUTES))
        .find_map(|local| tz.from_local_datetime(&local).earliest())
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|| Utc.from_utc_datetime(&midnight))
}

/// Whole minutes elapsed between two instants, floored and never negative.
pub fn elapsed_minutes(from: DateTime<Utc>, to: DateTime<Utc>) -> i64 {
    (to - from).num_minutes().max(0)
}
