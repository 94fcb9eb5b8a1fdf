use chrono::{DateTime, Utc};
use thiserror::Error;

const MAX_KEYPAD_DIGITS: usize = 4;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DurationError {
    #[error("duration segment '{0}' is not numeric")]
    NonNumeric(String),
    #[error("duration has {0} segments; expected 1 to 3")]
    SegmentCount(usize),
    #[error("duration '{0}' is out of range")]
    OutOfRange(String),
}

/// Parses `"ss"`, `"mm:ss"` or `"hh:mm:ss"` into a number of seconds.
pub fn parse_duration_seconds(value: &str) -> Result<i64, DurationError> {
    let segment_count = value.split(':').count();
    if segment_count > 3 {
        return Err(DurationError::SegmentCount(segment_count));
    }

    let parts = value
        .split(':')
        .map(str::trim)
        .map(|part| {
            part.parse::<i64>()
                .map_err(|_| DurationError::NonNumeric(part.to_string()))
        })
        .collect::<Result<Vec<_>, _>>()?;

    let total = match parts.as_slice() {
        [seconds] => Some(*seconds),
        [minutes, seconds] => minutes
            .checked_mul(60)
            .and_then(|total| total.checked_add(*seconds)),
        [hours, minutes, seconds] => hours
            .checked_mul(3600)
            .and_then(|total| total.checked_add(minutes.checked_mul(60)?))
            .and_then(|total| total.checked_add(*seconds)),
        other => return Err(DurationError::SegmentCount(other.len())),
    };
    total.ok_or_else(|| DurationError::OutOfRange(value.to_string()))
}

/// Formats seconds as `MM:SS`; minutes are not wrapped into hours.
pub fn format_seconds(total: i64) -> String {
    if total <= 0 {
        return "00:00".to_string();
    }
    format!("{:02}:{:02}", total / 60, total % 60)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Remaining {
    pub seconds: i64,
    pub display: String,
}

pub fn elapsed_seconds(start: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    (now - start).num_milliseconds().div_euclid(1000)
}

pub fn remaining(
    start: Option<DateTime<Utc>>,
    duration: &str,
    now: DateTime<Utc>,
) -> Result<Remaining, DurationError> {
    let total = parse_duration_seconds(duration)?;
    let seconds = match start {
        None => total,
        Some(start) => total.saturating_sub(elapsed_seconds(start, now)).max(0),
    };
    Ok(Remaining {
        seconds,
        display: format_seconds(seconds),
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const GREEN: Rgb = Rgb { r: 0, g: 255, b: 0 };
    pub const RED: Rgb = Rgb { r: 255, g: 0, b: 0 };

    pub fn to_css(self) -> String {
        format!("rgb({},{},{})", self.r, self.g, self.b)
    }

    pub fn to_hex(self) -> String {
        format!("#{:02X}{:02X}{:02X}", self.r, self.g, self.b)
    }
}

/// Green while idle, fading linearly to red as the countdown runs out.
pub fn progress_color(start: Option<DateTime<Utc>>, duration: &str, now: DateTime<Utc>) -> Rgb {
    let Some(start) = start else {
        return Rgb::GREEN;
    };
    let total = match parse_duration_seconds(duration) {
        Ok(total) if total > 0 => total,
        _ => return Rgb::RED,
    };

    let ratio = (elapsed_seconds(start, now) as f64 / total as f64).clamp(0.0, 1.0);
    Rgb {
        r: (ratio * 255.0).floor() as u8,
        g: (255.0 - ratio * 255.0).floor() as u8,
        b: 0,
    }
}

/// Turns raw keypad input into a whole-minute duration such as `"25:00"`.
pub fn duration_from_minutes_entry(input: &str) -> String {
    let digits: String = input
        .chars()
        .filter(char::is_ascii_digit)
        .take(MAX_KEYPAD_DIGITS)
        .collect();
    if digits.is_empty() {
        return "0:00".to_string();
    }
    format!("{digits}:00")
}

pub fn minutes_entry_from_duration(duration: &str) -> String {
    duration
        .split(':')
        .next()
        .map(str::trim)
        .and_then(|minutes| minutes.parse::<u32>().ok())
        .map(|minutes| minutes.to_string())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use proptest::prelude::*;

    fn fixed_time() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-03-01T10:00:00Z")
            .expect("valid datetime")
            .with_timezone(&Utc)
    }

    #[test]
    fn parse_accepts_one_two_and_three_segments() {
        assert_eq!(parse_duration_seconds("42"), Ok(42));
        assert_eq!(parse_duration_seconds("45:00"), Ok(2700));
        assert_eq!(parse_duration_seconds(" 1 : 02 : 03 "), Ok(3723));
    }

    #[test]
    fn parse_rejects_non_numeric_and_extra_segments() {
        assert_eq!(
            parse_duration_seconds("ab:10"),
            Err(DurationError::NonNumeric("ab".to_string()))
        );
        assert_eq!(
            parse_duration_seconds("1:2:3:4"),
            Err(DurationError::SegmentCount(4))
        );
        assert!(parse_duration_seconds("").is_err());
    }

    #[test]
    fn parse_reports_overflowing_durations_as_out_of_range() {
        assert_eq!(
            parse_duration_seconds("999999999999999999:00"),
            Err(DurationError::OutOfRange("999999999999999999:00".to_string()))
        );
        assert_eq!(
            parse_duration_seconds("9223372036854775807:0:0"),
            Err(DurationError::OutOfRange("9223372036854775807:0:0".to_string()))
        );
        assert_eq!(
            parse_duration_seconds("1:9223372036854775807"),
            Err(DurationError::OutOfRange("1:9223372036854775807".to_string()))
        );
        assert!(remaining(None, "999999999999999999:00", fixed_time()).is_err());
    }

    #[test]
    fn format_floors_non_positive_to_zero() {
        assert_eq!(format_seconds(0), "00:00");
        assert_eq!(format_seconds(-5), "00:00");
        assert_eq!(format_seconds(65), "01:05");
        assert_eq!(format_seconds(6000), "100:00");
    }

    #[test]
    fn remaining_for_idle_timer_is_full_duration() {
        let now = fixed_time();
        let result = remaining(None, "10:00", now).expect("valid duration");
        assert_eq!(result.seconds, 600);
        assert_eq!(result.display, "10:00");
    }

    #[test]
    fn remaining_counts_down_from_start() {
        let start = fixed_time();
        let halfway = remaining(Some(start), "10:00", start + Duration::milliseconds(300_000))
            .expect("valid duration");
        assert_eq!(halfway, Remaining { seconds: 300, display: "05:00".to_string() });

        let finished = remaining(Some(start), "10:00", start + Duration::milliseconds(600_000))
            .expect("valid duration");
        assert_eq!(finished, Remaining { seconds: 0, display: "00:00".to_string() });
    }

    #[test]
    fn remaining_floors_partial_seconds() {
        let start = fixed_time();
        let result = remaining(Some(start), "00:10", start + Duration::milliseconds(1_999))
            .expect("valid duration");
        assert_eq!(result.seconds, 9);
    }

    #[test]
    fn remaining_surfaces_parse_errors() {
        assert!(remaining(None, "soon", fixed_time()).is_err());
    }

    #[test]
    fn color_is_green_when_idle_and_red_for_bad_durations() {
        let now = fixed_time();
        assert_eq!(progress_color(None, "45:00", now), Rgb::GREEN);
        assert_eq!(progress_color(Some(now), "00:00", now), Rgb::RED);
        assert_eq!(progress_color(Some(now), "later", now), Rgb::RED);
    }

    #[test]
    fn color_interpolates_between_green_and_red() {
        let start = fixed_time();
        let halfway = progress_color(Some(start), "00:10", start + Duration::seconds(5));
        assert_eq!(halfway, Rgb { r: 127, g: 127, b: 0 });
        let overdue = progress_color(Some(start), "00:10", start + Duration::seconds(60));
        assert_eq!(overdue, Rgb::RED);
        assert_eq!(overdue.to_css(), "rgb(255,0,0)");
        assert_eq!(Rgb::GREEN.to_hex(), "#00FF00");
    }

    #[test]
    fn keypad_entry_keeps_four_digits() {
        assert_eq!(duration_from_minutes_entry("25"), "25:00");
        assert_eq!(duration_from_minutes_entry("1a2b345"), "1234:00");
        assert_eq!(duration_from_minutes_entry(""), "0:00");
        assert_eq!(minutes_entry_from_duration("45:00"), "45");
        assert_eq!(minutes_entry_from_duration("xx:00"), "");
    }

    proptest! {
        #[test]
        fn format_then_parse_roundtrips(total in 0i64..10_000_000) {
            prop_assert_eq!(parse_duration_seconds(&format_seconds(total)), Ok(total));
        }
    }

    proptest! {
        #[test]
        fn idle_color_ignores_now(offset in -1_000_000i64..1_000_000) {
            let now = fixed_time() + Duration::seconds(offset);
            prop_assert_eq!(progress_color(None, "45:00", now), Rgb::GREEN);
        }
    }
}
