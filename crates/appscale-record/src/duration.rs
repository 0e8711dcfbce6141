//! Duration strings in the notation used throughout the record and the
//! engine configuration: `"300ms"`, `"30s"`, `"1m30s"`, `"1.5h"`.

use std::time::Duration;

use crate::error::{RecordError, RecordResult};

const NANOS_PER_UNIT: &[(&str, u64)] = &[
    ("ns", 1),
    ("us", 1_000),
    ("µs", 1_000),
    ("μs", 1_000),
    ("ms", 1_000_000),
    ("s", 1_000_000_000),
    ("m", 60 * 1_000_000_000),
    ("h", 3_600 * 1_000_000_000),
];

/// Parse a duration string made of one or more `<number><unit>` terms.
///
/// Numbers may carry a fractional part. A bare `"0"` is accepted; any
/// other term without a unit is an error, as is a negative duration.
pub fn parse_duration(s: &str) -> RecordResult<Duration> {
    let invalid = |why: &str| RecordError::decode(format!("invalid duration {s:?}: {why}"));

    let mut rest = s;
    if let Some(stripped) = rest.strip_prefix('+') {
        rest = stripped;
    } else if rest.starts_with('-') {
        return Err(invalid("negative durations are not allowed"));
    }
    if rest == "0" {
        return Ok(Duration::ZERO);
    }
    if rest.is_empty() {
        return Err(invalid("empty"));
    }

    let mut total: u64 = 0;
    while !rest.is_empty() {
        let int_len = rest.bytes().take_while(u8::is_ascii_digit).count();
        let (int_digits, after_int) = rest.split_at(int_len);

        let (frac_digits, after_num) = match after_int.strip_prefix('.') {
            Some(after_dot) => {
                let frac_len = after_dot.bytes().take_while(u8::is_ascii_digit).count();
                after_dot.split_at(frac_len)
            }
            None => ("", after_int),
        };
        if int_digits.is_empty() && frac_digits.is_empty() {
            return Err(invalid("expected a number"));
        }

        let unit_len = after_num
            .char_indices()
            .find(|(_, c)| c.is_ascii_digit() || *c == '.')
            .map(|(i, _)| i)
            .unwrap_or(after_num.len());
        let (unit, remainder) = after_num.split_at(unit_len);
        if unit.is_empty() {
            return Err(invalid("missing unit"));
        }
        let per_unit = NANOS_PER_UNIT
            .iter()
            .find(|(name, _)| *name == unit)
            .map(|(_, n)| *n)
            .ok_or_else(|| invalid(&format!("unknown unit {unit:?}")))?;

        let whole: u64 = if int_digits.is_empty() {
            0
        } else {
            int_digits.parse().map_err(|_| invalid("overflow"))?
        };
        let mut nanos = whole.checked_mul(per_unit).ok_or_else(|| invalid("overflow"))?;

        // Digits past the 18th cannot change the result by a whole nanosecond.
        let frac = &frac_digits[..frac_digits.len().min(18)];
        if !frac.is_empty() {
            let numerator: u128 = frac.parse().map_err(|_| invalid("bad fraction"))?;
            let scale = 10u128.pow(frac.len() as u32);
            let extra = (numerator * u128::from(per_unit) / scale) as u64;
            nanos = nanos.checked_add(extra).ok_or_else(|| invalid("overflow"))?;
        }

        total = total.checked_add(nanos).ok_or_else(|| invalid("overflow"))?;
        rest = remainder;
    }

    Ok(Duration::from_nanos(total))
}

/// Render a duration in the same notation `parse_duration` accepts,
/// e.g. `"1h0m0s"`, `"1m30s"`, `"1.5s"`, `"250ms"`.
pub fn format_duration(d: Duration) -> String {
    let nanos = d.as_nanos();
    if nanos == 0 {
        return "0s".to_string();
    }
    if nanos < 1_000 {
        return format!("{nanos}ns");
    }
    if nanos < 1_000_000 {
        return format!("{}µs", with_fraction(nanos, 3));
    }
    if nanos < 1_000_000_000 {
        return format!("{}ms", with_fraction(nanos, 6));
    }

    let secs = d.as_secs();
    let hours = secs / 3_600;
    let minutes = (secs % 3_600) / 60;
    let seconds = with_fraction(u128::from(secs % 60) * 1_000_000_000 + u128::from(d.subsec_nanos()), 9);

    if hours > 0 {
        format!("{hours}h{minutes}m{seconds}s")
    } else if minutes > 0 {
        format!("{minutes}m{seconds}s")
    } else {
        format!("{seconds}s")
    }
}

/// `value / 10^digits`, with the fractional part trimmed of trailing zeros.
fn with_fraction(value: u128, digits: u32) -> String {
    let scale = 10u128.pow(digits);
    let whole = value / scale;
    let frac = value % scale;
    if frac == 0 {
        return whole.to_string();
    }
    let frac = format!("{frac:0width$}", width = digits as usize);
    format!("{whole}.{}", frac.trim_end_matches('0'))
}

/// Serde adapter storing a `Duration` as a duration string.
pub mod serde_go {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&super::format_duration(*d))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let s = String::deserialize(deserializer)?;
        super::parse_duration(&s).map_err(serde::de::Error::custom)
    }
}
