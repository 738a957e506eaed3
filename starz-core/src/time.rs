//! Civil time for Europe/Berlin and free-text due-time parsing.
//!
//! Berlin is UTC+1 in winter and UTC+2 between the last Sunday of March
//! 01:00 UTC and the last Sunday of October 01:00 UTC. The offset is computed
//! from those two rules alone; no timezone database is consulted.
//!
//! Wall-clock inputs ("14:02", "24.12") are converted with the offset that
//! applies on the *target* date, so a reminder set in July for a February
//! morning lands on the February (winter) instant.

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};

/// Words skipped between time expressions ("in 10 min", "am 14.02 um 11:40").
const FILLER_WORDS: &[&str] = &[
    "in", "um", "at", "am", "on", "ab", "the", "and", "und", "for", "für",
];

// ---------------------------------------------------------------------------
// Berlin offset
// ---------------------------------------------------------------------------

/// Last Sunday of `month` in `year`.
#[must_use]
pub fn last_sunday(year: i32, month: u32) -> Option<NaiveDate> {
    let first_of_next = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)?
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)?
    };
    let last_day = first_of_next.pred_opt()?;
    let back = i64::from(last_day.weekday().num_days_from_sunday());
    Some(last_day - Duration::days(back))
}

/// The `[start, end)` interval of summer time in `year`, both at 01:00 UTC.
#[must_use]
pub fn summer_time_bounds(year: i32) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
    let one_am = NaiveTime::from_hms_opt(1, 0, 0)?;
    let start = last_sunday(year, 3)?.and_time(one_am);
    let end = last_sunday(year, 10)?.and_time(one_am);
    Some((Utc.from_utc_datetime(&start), Utc.from_utc_datetime(&end)))
}

/// Offset of Berlin wall-clock time from UTC at `instant`: +2h in summer, +1h otherwise.
#[must_use]
pub fn berlin_offset(instant: DateTime<Utc>) -> Duration {
    match summer_time_bounds(instant.year()) {
        Some((start, end)) if instant >= start && instant < end => Duration::hours(2),
        _ => Duration::hours(1),
    }
}

/// Interpret a Berlin wall-clock time as a real instant, using the offset of
/// the target date itself.
///
/// The repeated autumn hour resolves to its first (summer) occurrence; the
/// skipped spring hour resolves to the instant one hour later on the clock.
#[must_use]
pub fn berlin_to_utc(local: NaiveDateTime) -> DateTime<Utc> {
    let as_utc = Utc.from_utc_datetime(&local);
    let summer = as_utc - Duration::hours(2);
    if berlin_offset(summer) == Duration::hours(2) {
        summer
    } else {
        as_utc - Duration::hours(1)
    }
}

/// Berlin wall-clock reading of `instant`.
#[must_use]
pub fn utc_to_berlin(instant: DateTime<Utc>) -> NaiveDateTime {
    (instant + berlin_offset(instant)).naive_utc()
}

/// `DD.MM.YYYY HH:MM` in Berlin time.
#[must_use]
pub fn format_berlin(instant: DateTime<Utc>) -> String {
    utc_to_berlin(instant).format("%d.%m.%Y %H:%M").to_string()
}

/// Human-readable rendering of a duration ("1h 5min", "42s").
#[must_use]
pub fn format_duration(duration: Duration) -> String {
    let total = duration.num_seconds().max(0);
    let (days, hours, minutes, seconds) = (
        total / 86_400,
        (total % 86_400) / 3_600,
        (total % 3_600) / 60,
        total % 60,
    );
    let mut parts = Vec::new();
    if days > 0 {
        parts.push(format!("{days}d"));
    }
    if hours > 0 {
        parts.push(format!("{hours}h"));
    }
    if minutes > 0 {
        parts.push(format!("{minutes}min"));
    }
    if seconds > 0 || parts.is_empty() {
        parts.push(format!("{seconds}s"));
    }
    parts.join(" ")
}

// ---------------------------------------------------------------------------
// Phrase parser
// ---------------------------------------------------------------------------

/// A due time recognised at the front of a reminder phrase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedTime {
    /// Sum of all relative parts ("1h 30min").
    pub duration: Duration,
    /// Absolute instant from a clock time and/or date, if one was given.
    pub absolute: Option<DateTime<Utc>>,
    /// When the reminder is due: `absolute` (or now) plus `duration`.
    pub due_at: DateTime<Utc>,
    /// Tokens left after the time expression, joined by single spaces.
    pub message: String,
}

#[derive(Debug, Clone, Copy)]
struct DateSpec {
    day: u32,
    month: u32,
    year: Option<i32>,
}

/// Length of one duration unit. `m` is minutes and `mo` is months.
fn unit_length(unit: &str) -> Option<Duration> {
    Some(match unit {
        "s" => Duration::seconds(1),
        "m" | "min" => Duration::minutes(1),
        "h" => Duration::hours(1),
        "d" => Duration::days(1),
        "w" => Duration::weeks(1),
        "mo" => Duration::days(30),
        "y" => Duration::days(365),
        _ => return None,
    })
}

fn scaled(amount: &str, unit: &str) -> Option<Duration> {
    let amount: i32 = amount.parse().ok()?;
    unit_length(unit)?.checked_mul(amount)
}

fn is_digits(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}

/// `10m`, `2h`, `3mo`.
fn combined_duration(token: &str) -> Option<Duration> {
    let split = token.find(|c: char| !c.is_ascii_digit())?;
    let (amount, unit) = token.split_at(split);
    if amount.is_empty() {
        return None;
    }
    scaled(amount, unit)
}

/// `14:02`.
fn clock_time(token: &str) -> Option<NaiveTime> {
    let (h, m) = token.split_once(':')?;
    if !is_digits(h) || h.len() > 2 || !is_digits(m) || m.len() != 2 {
        return None;
    }
    NaiveTime::from_hms_opt(h.parse().ok()?, m.parse().ok()?, 0)
}

/// `14.02`, `14.2.`, `14.02.27`, `14.02.2027`.
fn date_spec(token: &str) -> Option<DateSpec> {
    let mut parts = token.split('.');
    let day = parts.next().filter(|p| is_digits(p) && p.len() <= 2)?;
    let month = parts.next().filter(|p| is_digits(p) && p.len() <= 2)?;
    let year = match parts.next() {
        None | Some("") => None,
        Some(y) if is_digits(y) && y.len() == 2 => Some(2000 + y.parse::<i32>().ok()?),
        Some(y) if is_digits(y) && y.len() == 4 => Some(y.parse::<i32>().ok()?),
        Some(_) => return None,
    };
    if parts.next().is_some() {
        return None;
    }
    let spec = DateSpec {
        day: day.parse().ok()?,
        month: month.parse().ok()?,
        year,
    };
    // 2000 is a leap year, so 29.02 passes the syntax check.
    NaiveDate::from_ymd_opt(spec.year.unwrap_or(2000), spec.month, spec.day)?;
    Some(spec)
}

/// `20uhr`.
fn uhr_hour(token: &str) -> Option<NaiveTime> {
    let hour = token.strip_suffix("uhr")?;
    if !is_digits(hour) {
        return None;
    }
    NaiveTime::from_hms_opt(hour.parse().ok()?, 0, 0)
}

fn hour_only(token: &str) -> Option<NaiveTime> {
    if !is_digits(token) {
        return None;
    }
    NaiveTime::from_hms_opt(token.parse().ok()?, 0, 0)
}

/// Parse the due-time prefix of a reminder phrase.
///
/// Tokens are consumed left to right while they form time expressions
/// (durations, `HH:MM`, `D.M[.YY]`, `<n>uhr`) or filler words. The first
/// other token ends the time prefix; it and everything after it become the
/// message. Filler words that are not followed by another time expression
/// stay in the message.
///
/// Returns `None` when no time expression was recognised at all.
#[must_use]
pub fn parse_time_input<S: AsRef<str>>(tokens: &[S], now: DateTime<Utc>) -> Option<ParsedTime> {
    let lowered: Vec<String> = tokens.iter().map(|t| t.as_ref().to_lowercase()).collect();

    let mut duration = Duration::zero();
    let mut clock: Option<NaiveTime> = None;
    let mut date: Option<DateSpec> = None;
    let mut recognised = false;
    let mut consumed = 0;
    let mut i = 0;

    while i < lowered.len() {
        let token = lowered[i].as_str();
        let next = lowered.get(i + 1).map(String::as_str);

        let step = if let Some(d) = combined_duration(token) {
            duration = duration.checked_add(&d)?;
            1
        } else if let Some(d) = next.filter(|_| is_digits(token)).and_then(|unit| scaled(token, unit)) {
            duration = duration.checked_add(&d)?;
            2
        } else if let Some(t) = clock_time(token) {
            clock = Some(t);
            1
        } else if let Some(spec) = date_spec(token) {
            date = Some(spec);
            1
        } else if let Some(t) = uhr_hour(token) {
            clock = Some(t);
            1
        } else if let Some(t) = hour_only(token).filter(|_| next == Some("uhr")) {
            clock = Some(t);
            2
        } else if FILLER_WORDS.contains(&token) {
            i += 1;
            continue;
        } else {
            break;
        };

        recognised = true;
        i += step;
        consumed = i;
    }

    if !recognised {
        return None;
    }

    let absolute = if clock.is_some() || date.is_some() {
        Some(resolve_absolute(date, clock, now)?)
    } else {
        None
    };
    let due_at = absolute.unwrap_or(now).checked_add_signed(duration)?;

    Some(ParsedTime {
        duration,
        absolute,
        due_at,
        message: tokens[consumed..]
            .iter()
            .map(|t| t.as_ref())
            .collect::<Vec<&str>>()
            .join(" "),
    })
}

/// Turn a Berlin date and/or clock time into the next matching instant.
fn resolve_absolute(
    date: Option<DateSpec>,
    clock: Option<NaiveTime>,
    now: DateTime<Utc>,
) -> Option<DateTime<Utc>> {
    let time = match clock {
        Some(t) => t,
        None => NaiveTime::from_hms_opt(0, 0, 0)?,
    };
    let today = utc_to_berlin(now).date();

    let Some(spec) = date else {
        let candidate = berlin_to_utc(today.and_time(time));
        return if candidate > now {
            Some(candidate)
        } else {
            Some(berlin_to_utc(today.succ_opt()?.and_time(time)))
        };
    };

    if let Some(year) = spec.year {
        let day = NaiveDate::from_ymd_opt(year, spec.month, spec.day)?;
        return Some(berlin_to_utc(day.and_time(time)));
    }

    // Roll forward to the next year where the date exists and lies ahead.
    (today.year()..today.year() + 8).find_map(|year| {
        let day = NaiveDate::from_ymd_opt(year, spec.month, spec.day)?;
        let candidate = berlin_to_utc(day.and_time(time));
        (candidate > now).then_some(candidate)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).single().expect("valid instant")
    }

    fn words(s: &str) -> Vec<&str> {
        s.split_whitespace().collect()
    }

    #[test]
    fn last_sundays_2026() {
        assert_eq!(last_sunday(2026, 3), NaiveDate::from_ymd_opt(2026, 3, 29));
        assert_eq!(last_sunday(2026, 10), NaiveDate::from_ymd_opt(2026, 10, 25));
    }

    #[test]
    fn offset_switches_at_one_am_utc() {
        assert_eq!(berlin_offset(utc(2026, 3, 29, 0, 59)), Duration::hours(1));
        assert_eq!(berlin_offset(utc(2026, 3, 29, 1, 0)), Duration::hours(2));
        assert_eq!(berlin_offset(utc(2026, 10, 25, 0, 59)), Duration::hours(2));
        assert_eq!(berlin_offset(utc(2026, 10, 25, 1, 0)), Duration::hours(1));
        assert_eq!(berlin_offset(utc(2026, 1, 15, 12, 0)), Duration::hours(1));
    }

    #[test]
    fn wall_clock_round_trip() {
        let instant = utc(2026, 7, 1, 10, 0);
        assert_eq!(berlin_to_utc(utc_to_berlin(instant)), instant);
        assert_eq!(format_berlin(instant), "01.07.2026 12:00");
    }

    #[test]
    fn transition_day_wall_clock() {
        let spring = NaiveDate::from_ymd_opt(2026, 3, 29).expect("date");
        let autumn = NaiveDate::from_ymd_opt(2026, 10, 25).expect("date");
        let at = |day: NaiveDate, h, m| day.and_hms_opt(h, m, 0).expect("time");

        assert_eq!(berlin_to_utc(at(spring, 1, 30)), utc(2026, 3, 29, 0, 30));
        assert_eq!(berlin_to_utc(at(spring, 3, 30)), utc(2026, 3, 29, 1, 30));
        // 02:30 does not exist in spring and lands an hour later.
        assert_eq!(berlin_to_utc(at(spring, 2, 30)), utc(2026, 3, 29, 1, 30));

        assert_eq!(berlin_to_utc(at(autumn, 1, 30)), utc(2026, 10, 24, 23, 30));
        assert_eq!(berlin_to_utc(at(autumn, 2, 30)), utc(2026, 10, 25, 0, 30));
        assert_eq!(berlin_to_utc(at(autumn, 3, 30)), utc(2026, 10, 25, 2, 30));
    }

    #[test]
    fn reminder_on_autumn_switch_night() {
        let now = utc(2026, 10, 1, 12, 0);
        let parsed = parse_time_input(&words("25.10.2026 01:30 x"), now).expect("recognised");
        assert_eq!(parsed.due_at, utc(2026, 10, 24, 23, 30));
        assert_eq!(format_berlin(parsed.due_at), "25.10.2026 01:30");
    }

    #[test]
    fn combined_minutes() {
        let now = utc(2026, 7, 1, 12, 0);
        let parsed = parse_time_input(&words("10m wäsche"), now).expect("recognised");
        assert_eq!(parsed.duration, Duration::milliseconds(600_000));
        assert_eq!(parsed.due_at, now + Duration::minutes(10));
        assert_eq!(parsed.message, "wäsche");
        assert!(parsed.absolute.is_none());
    }

    #[test]
    fn month_and_minute_are_distinct() {
        let now = utc(2026, 7, 1, 12, 0);
        let months = parse_time_input(&words("1mo miete"), now).expect("recognised");
        assert_eq!(months.duration, Duration::days(30));
        let minutes = parse_time_input(&words("1m tee"), now).expect("recognised");
        assert_eq!(minutes.duration, Duration::minutes(1));
    }

    #[test]
    fn split_and_summed_durations() {
        let now = utc(2026, 7, 1, 12, 0);
        let parsed = parse_time_input(&words("in 1 h 30min pizza holen"), now).expect("recognised");
        assert_eq!(parsed.duration, Duration::minutes(90));
        assert_eq!(parsed.message, "pizza holen");
    }

    #[test]
    fn date_uses_target_regime() {
        // Now is summer (+2h); the target is in February (+1h).
        let now = utc(2026, 7, 1, 12, 0);
        let parsed = parse_time_input(&words("14.02 11:40 kaffee"), now).expect("recognised");
        assert_eq!(parsed.due_at, utc(2027, 2, 14, 10, 40));
        assert_eq!(parsed.message, "kaffee");
    }

    #[test]
    fn date_across_spring_transition() {
        let now = utc(2026, 3, 28, 12, 0);
        let parsed = parse_time_input(&words("29.03 12:00 uhren"), now).expect("recognised");
        assert_eq!(parsed.due_at, utc(2026, 3, 29, 10, 0));
    }

    #[test]
    fn past_clock_rolls_to_tomorrow() {
        // 14:30 in Berlin.
        let now = utc(2026, 7, 1, 12, 30);
        let parsed = parse_time_input(&words("14:02 essen"), now).expect("recognised");
        assert_eq!(parsed.due_at, utc(2026, 7, 2, 12, 2));
        let later = parse_time_input(&words("um 15:00 essen"), now).expect("recognised");
        assert_eq!(later.due_at, utc(2026, 7, 1, 13, 0));
    }

    #[test]
    fn explicit_year_never_rolls() {
        let now = utc(2026, 7, 1, 12, 0);
        let parsed = parse_time_input(&words("1.1.2026 x"), now).expect("recognised");
        assert_eq!(parsed.due_at, utc(2025, 12, 31, 23, 0));
    }

    #[test]
    fn uhr_forms() {
        let now = utc(2026, 1, 10, 8, 0);
        let glued = parse_time_input(&words("20uhr essen"), now).expect("recognised");
        let spaced = parse_time_input(&words("20 uhr essen"), now).expect("recognised");
        assert_eq!(glued.due_at, utc(2026, 1, 10, 19, 0));
        assert_eq!(glued, spaced);
    }

    #[test]
    fn trailing_filler_stays_in_message() {
        let now = utc(2026, 7, 1, 12, 0);
        let parsed = parse_time_input(&words("5min und dann los"), now).expect("recognised");
        assert_eq!(parsed.message, "und dann los");
    }

    #[test]
    fn no_time_expression() {
        let now = utc(2026, 7, 1, 12, 0);
        assert!(parse_time_input(&words("in wäsche"), now).is_none());
        assert!(parse_time_input(&words("hallo 10m"), now).is_none());
        assert!(parse_time_input::<&str>(&[], now).is_none());
    }

    #[test]
    fn duration_formatting() {
        assert_eq!(format_duration(Duration::seconds(3_900)), "1h 5min");
        assert_eq!(format_duration(Duration::zero()), "0s");
        assert_eq!(format_duration(Duration::seconds(42)), "42s");
    }
}
