//! # Duration Parsing
//!
//! Kubernetes-style duration strings (`10s`, `2m`, `1m30s`, `500ms`).

use anyhow::Result;
use regex::Regex;
use std::sync::LazyLock;
use std::time::Duration;

static SEGMENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?P<number>\d+)(?P<unit>ms|[smhd])")
        .expect("Failed to compile duration regex - this should never happen")
});

static FORMAT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d+(ms|[smhd]))+$")
        .expect("Failed to compile duration regex - this should never happen")
});

/// Parse a Kubernetes duration string
///
/// Segments are summed, so `1m30s` is ninety seconds. The total must be
/// greater than zero.
///
/// # Errors
///
/// Returns an error on empty input, unknown units or a zero duration.
pub fn parse_kubernetes_duration(duration_str: &str) -> Result<Duration> {
    let duration_trimmed = duration_str.trim();

    if duration_trimmed.is_empty() {
        return Err(anyhow::anyhow!("Duration string cannot be empty"));
    }

    let interval_lower = duration_trimmed.to_lowercase();
    if !FORMAT.is_match(&interval_lower) {
        return Err(anyhow::anyhow!(
            "Invalid duration format '{}'. Expected format: <number><unit> (e.g., '10s', '2m', '1m30s')",
            duration_trimmed
        ));
    }

    let mut total = Duration::ZERO;
    for captures in SEGMENT.captures_iter(&interval_lower) {
        let number: u64 = captures["number"].parse().map_err(|e| {
            anyhow::anyhow!(
                "Invalid duration number '{}' in '{}': {}",
                &captures["number"],
                duration_trimmed,
                e
            )
        })?;
        let segment = match &captures["unit"] {
            "ms" => Duration::from_millis(number),
            "s" => Duration::from_secs(number),
            "m" => Duration::from_secs(number.saturating_mul(60)),
            "h" => Duration::from_secs(number.saturating_mul(3600)),
            "d" => Duration::from_secs(number.saturating_mul(86400)),
            unit => {
                return Err(anyhow::anyhow!(
                    "Invalid unit '{}' in duration '{}'. Expected: ms, s, m, h, or d",
                    unit,
                    duration_trimmed
                ));
            }
        };
        total = total.saturating_add(segment);
    }

    if total.is_zero() {
        return Err(anyhow::anyhow!(
            "Duration must be greater than 0, got '{}'",
            duration_trimmed
        ));
    }

    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simple_units() {
        assert_eq!(parse_kubernetes_duration("10s").unwrap(), Duration::from_secs(10));
        assert_eq!(parse_kubernetes_duration("2m").unwrap(), Duration::from_secs(120));
        assert_eq!(parse_kubernetes_duration("1H").unwrap(), Duration::from_secs(3600));
        assert_eq!(parse_kubernetes_duration("500ms").unwrap(), Duration::from_millis(500));
    }

    #[test]
    fn test_compound() {
        assert_eq!(parse_kubernetes_duration("1m30s").unwrap(), Duration::from_secs(90));
        assert_eq!(
            parse_kubernetes_duration(" 1s500ms ").unwrap(),
            Duration::from_millis(1500)
        );
    }

    #[test]
    fn test_rejects_invalid() {
        assert!(parse_kubernetes_duration("").is_err());
        assert!(parse_kubernetes_duration("10").is_err());
        assert!(parse_kubernetes_duration("10x").is_err());
        assert!(parse_kubernetes_duration("s10").is_err());
        assert!(parse_kubernetes_duration("0s").is_err());
    }
}
