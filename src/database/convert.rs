//! Text-to-value conversions shared by every result set.
//!
//! Backends hand column values over as text. These helpers turn that text
//! into numbers the way the C library parsing routines do: leading
//! whitespace is skipped, the longest valid prefix is used and anything
//! unparsable collapses to zero.

use chrono::{Datelike, Duration, Local, NaiveDate, Offset, TimeZone};

/// Minimum length of a timestamp column `to_unix_time` will look at.
pub const MIN_TIMESTAMP_LEN: usize = 14;

fn skip_space(bytes: &[u8]) -> usize {
    bytes
        .iter()
        .take_while(|b| matches!(b, b' ' | b'\t' | b'\n' | b'\r' | 0x0b | 0x0c))
        .count()
}

/// `strtol` in base 10, saturating at the `i64` bounds.
pub fn parse_long(text: &str) -> i64 {
    let bytes = text.as_bytes();
    let mut pos = skip_space(bytes);
    let negative = match bytes.get(pos) {
        Some(b'-') => {
            pos += 1;
            true
        }
        Some(b'+') => {
            pos += 1;
            false
        }
        _ => false,
    };

    let mut value: i64 = 0;
    for &b in &bytes[pos..] {
        if !b.is_ascii_digit() {
            break;
        }
        let digit = i64::from(b - b'0');
        value = if negative {
            value.saturating_mul(10).saturating_sub(digit)
        } else {
            value.saturating_mul(10).saturating_add(digit)
        };
    }
    value
}

/// Length of the longest prefix of `bytes` that `strtod` would consume.
fn float_prefix_len(bytes: &[u8]) -> usize {
    let start = skip_space(bytes);
    let mut pos = start;
    if matches!(bytes.get(pos), Some(b'+') | Some(b'-')) {
        pos += 1;
    }

    let rest = &bytes[pos..];
    for word in ["infinity", "inf", "nan"] {
        if rest.len() >= word.len() && rest[..word.len()].eq_ignore_ascii_case(word.as_bytes()) {
            return pos + word.len();
        }
    }

    let int_digits = rest.iter().take_while(|b| b.is_ascii_digit()).count();
    pos += int_digits;
    let mut frac_digits = 0;
    if bytes.get(pos) == Some(&b'.') {
        frac_digits = bytes[pos + 1..]
            .iter()
            .take_while(|b| b.is_ascii_digit())
            .count();
        if int_digits + frac_digits > 0 {
            pos += 1 + frac_digits;
        }
    }
    if int_digits + frac_digits == 0 {
        return 0;
    }

    if matches!(bytes.get(pos), Some(b'e') | Some(b'E')) {
        let mut exp = pos + 1;
        if matches!(bytes.get(exp), Some(b'+') | Some(b'-')) {
            exp += 1;
        }
        let exp_digits = bytes[exp.min(bytes.len())..]
            .iter()
            .take_while(|b| b.is_ascii_digit())
            .count();
        if exp_digits > 0 {
            pos = exp + exp_digits;
        }
    }
    pos
}

/// `strtod`: the longest numeric prefix of `text`, or zero.
pub fn parse_double(text: &str) -> f64 {
    let end = float_prefix_len(text.as_bytes());
    if end == 0 {
        return 0.0;
    }
    text[..end].trim_start().parse::<f64>().unwrap_or(0.0)
}

pub fn to_long(value: Option<&str>) -> i64 {
    value.map(parse_long).unwrap_or(0)
}

/// `atoi`: parsed as a long, then narrowed to the low 32 bits.
pub fn to_int(value: Option<&str>) -> i32 {
    to_long(value) as i32
}

pub fn to_double(value: Option<&str>) -> f64 {
    value.map(parse_double).unwrap_or(0.0)
}

/// True when the value starts with `1` or `t`.
pub fn to_bool(value: Option<&str>) -> bool {
    matches!(value.and_then(|v| v.bytes().next()), Some(b'1') | Some(b't'))
}

/// UTC offset in seconds of local standard time for `year`.
///
/// Daylight saving is never applied, so the smaller of the January and
/// July offsets is taken as the standard one.
fn standard_offset(year: i32) -> i64 {
    let offset_at = |month: u32| {
        Local
            .with_ymd_and_hms(year, month, 1, 12, 0, 0)
            .earliest()
            .map(|t| i64::from(t.offset().fix().local_minus_utc()))
    };
    match (offset_at(1), offset_at(7)) {
        (Some(jan), Some(jul)) => jan.min(jul),
        (Some(off), None) | (None, Some(off)) => off,
        (None, None) => 0,
    }
}

/// Parse a timestamp column into seconds since the epoch.
///
/// Values containing a hyphen are read as `YYYY-MM-DD HH:MM:SS`, anything
/// else as `YYYYMMDDHHMMSS`. Fields are taken from fixed offsets with plain
/// digit arithmetic and out-of-range fields roll over into the next larger
/// unit. The result is interpreted as local standard time. `None` and text
/// shorter than [`MIN_TIMESTAMP_LEN`] give zero.
pub fn parse_unix_time(text: &str) -> i64 {
    let bytes = text.as_bytes();
    if bytes.len() < MIN_TIMESTAMP_LEN {
        return 0;
    }

    let digit = |i: usize| i64::from(bytes.get(i).copied().unwrap_or(0)) - i64::from(b'0');
    let two = |i: usize| digit(i) * 10 + digit(i + 1);

    let year = digit(0) * 1000 + digit(1) * 100 + digit(2) * 10 + digit(3);
    let [month, day, hour, minute, second] = if bytes.contains(&b'-') {
        [two(5), two(8), two(11), two(14), two(17)]
    } else {
        [two(4), two(6), two(8), two(10), two(12)]
    };

    let month0 = month - 1;
    let year = year + month0.div_euclid(12);
    let month = month0.rem_euclid(12) + 1;
    let Ok(year) = i32::try_from(year) else {
        return 0;
    };
    let Some(first) = NaiveDate::from_ymd_opt(year, month as u32, 1) else {
        return 0;
    };

    let naive = first.and_hms_opt(0, 0, 0).map(|midnight| {
        midnight
            + Duration::days(day - 1)
            + Duration::hours(hour)
            + Duration::minutes(minute)
            + Duration::seconds(second)
    });
    match naive {
        Some(naive) => naive.and_utc().timestamp() - standard_offset(naive.year()),
        None => 0,
    }
}

pub fn to_unix_time(value: Option<&str>) -> i64 {
    value.map(parse_unix_time).unwrap_or(0)
}
