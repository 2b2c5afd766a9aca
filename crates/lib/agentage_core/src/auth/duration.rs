//! Parsing of human TTL strings such as `7d`, `24h` or `900`.

use chrono::Duration;

use super::TokenError;

/// Longest accepted token lifetime (ten years).
pub const MAX_TTL_SECS: i64 = 10 * 365 * 24 * 60 * 60;

/// Parse a TTL string into a duration.
///
/// Accepts a non-negative integer followed by `s`, `m`, `h`, `d` or `w`; a bare
/// integer is read as seconds.
pub fn parse_ttl(input: &str) -> Result<Duration, TokenError> {
    let s = input.trim();
    if s.is_empty() {
        return Err(TokenError::Configuration("empty token TTL".into()));
    }

    let split = s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len());
    let (digits, unit) = s.split_at(split);
    let amount: i64 = digits
        .parse()
        .map_err(|_| TokenError::Configuration(format!("invalid token TTL: {input}")))?;

    let secs = match unit.trim() {
        "" | "s" => Some(amount),
        "m" => amount.checked_mul(60),
        "h" => amount.checked_mul(60 * 60),
        "d" => amount.checked_mul(24 * 60 * 60),
        "w" => amount.checked_mul(7 * 24 * 60 * 60),
        _ => None,
    }
    .ok_or_else(|| TokenError::Configuration(format!("invalid token TTL: {input}")))?;

    if secs == 0 {
        return Err(TokenError::Configuration("token TTL must be positive".into()));
    }
    if secs > MAX_TTL_SECS {
        return Err(TokenError::Configuration(format!(
            "token TTL {input} exceeds the ten year maximum"
        )));
    }
    Duration::try_seconds(secs)
        .ok_or_else(|| TokenError::Configuration(format!("invalid token TTL: {input}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_units() {
        assert_eq!(parse_ttl("7d").unwrap(), Duration::days(7));
        assert_eq!(parse_ttl("24h").unwrap(), Duration::hours(24));
        assert_eq!(parse_ttl("30m").unwrap(), Duration::minutes(30));
        assert_eq!(parse_ttl("45s").unwrap(), Duration::seconds(45));
        assert_eq!(parse_ttl("2w").unwrap(), Duration::weeks(2));
    }

    #[test]
    fn bare_number_is_seconds() {
        assert_eq!(parse_ttl(" 3600 ").unwrap(), Duration::hours(1));
    }

    #[test]
    fn rejects_garbage_and_zero() {
        assert!(parse_ttl("").is_err());
        assert!(parse_ttl("d7").is_err());
        assert!(parse_ttl("7y").is_err());
        assert!(parse_ttl("0h").is_err());
    }

    #[test]
    fn rejects_lifetimes_beyond_the_maximum() {
        assert!(matches!(
            parse_ttl("99999999999999999"),
            Err(TokenError::Configuration(_))
        ));
        assert!(matches!(
            parse_ttl("100000000d"),
            Err(TokenError::Configuration(_))
        ));
        assert!(matches!(
            parse_ttl("99999999999999999999w"),
            Err(TokenError::Configuration(_))
        ));
        assert_eq!(
            parse_ttl(&format!("{MAX_TTL_SECS}")).unwrap(),
            Duration::seconds(MAX_TTL_SECS)
        );
    }
}
