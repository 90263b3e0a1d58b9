//! Duration syntax: `\d+(ms|s|m|h|d)` parsed to milliseconds and back to a
//! human-readable string (e.g. "1.5h").

use std::fmt;

/// Error parsing a duration string.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid duration syntax: {0}")]
pub struct DurationParseError(pub String);

/// Parse a duration string like `"30s"`, `"500ms"`, `"5m"`, `"1h"`, `"2d"`
/// into a millisecond count.
pub fn parse_duration_ms(input: &str) -> Result<u64, DurationParseError> {
    let input = input.trim();
    let split_at = input
        .find(|c: char| !c.is_ascii_digit())
        .ok_or_else(|| DurationParseError(input.to_string()))?;

    let (digits, unit) = input.split_at(split_at);
    if digits.is_empty() {
        return Err(DurationParseError(input.to_string()));
    }
    let value: u64 = digits.parse().map_err(|_| DurationParseError(input.to_string()))?;

    let multiplier: u64 = match unit {
        "ms" => 1,
        "s" => 1_000,
        "m" => 60_000,
        "h" => 3_600_000,
        "d" => 86_400_000,
        _ => return Err(DurationParseError(input.to_string())),
    };

    value
        .checked_mul(multiplier)
        .ok_or_else(|| DurationParseError(input.to_string()))
}

/// Render a millisecond count as a human-readable duration (e.g. `"1.5h"`).
///
/// Picks the largest unit that renders with at most one decimal place of
/// precision, falling back to milliseconds for sub-second durations.
pub fn render_duration(ms: u64) -> String {
    const UNITS: &[(u64, &str)] = &[
        (86_400_000, "d"),
        (3_600_000, "h"),
        (60_000, "m"),
        (1_000, "s"),
    ];

    for (factor, suffix) in UNITS {
        if ms >= *factor {
            let value = ms as f64 / *factor as f64;
            return format_trimmed(value, suffix);
        }
    }
    format!("{ms}ms")
}

fn format_trimmed(value: f64, suffix: &str) -> String {
    let rounded = (value * 10.0).round() / 10.0;
    if (rounded.fract()).abs() < f64::EPSILON {
        format!("{}{}", rounded as i64, suffix)
    } else {
        format!("{rounded:.1}{suffix}")
    }
}

impl fmt::Display for DurationParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid duration syntax: {}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_each_unit() {
        assert_eq!(parse_duration_ms("500ms").unwrap(), 500);
        assert_eq!(parse_duration_ms("30s").unwrap(), 30_000);
        assert_eq!(parse_duration_ms("5m").unwrap(), 300_000);
        assert_eq!(parse_duration_ms("1h").unwrap(), 3_600_000);
        assert_eq!(parse_duration_ms("2d").unwrap(), 172_800_000);
    }

    #[test]
    fn rejects_garbage() {
        assert!(parse_duration_ms("abc").is_err());
        assert!(parse_duration_ms("10x").is_err());
        assert!(parse_duration_ms("").is_err());
        assert!(parse_duration_ms("s10").is_err());
    }

    #[test]
    fn renders_human_readable() {
        assert_eq!(render_duration(1_500_000), "25m");
        assert_eq!(render_duration(5_400_000), "1.5h");
        assert_eq!(render_duration(500), "500ms");
        assert_eq!(render_duration(90_000), "1.5m");
    }
}
