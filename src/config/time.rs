use std::time::Duration;

use regex::Regex;

use super::ConfigError;

/// Parse a time expression such as `30`, `30s`, `5m` or `1h`.
/// Bare numbers are seconds.
///
/// `field` names the setting in the error message.
pub fn parse_time_expression(
    field: &'static str,
    expression: &str,
) -> Result<Duration, ConfigError> {
    let invalid = || ConfigError::InvalidTimeExpression {
        field,
        expression: expression.to_string(),
    };

    let pattern = Regex::new(r"^(\d+)\s*(s|m|h)?$").map_err(|_| invalid())?;
    let caps = pattern.captures(expression.trim()).ok_or_else(invalid)?;

    let value: u64 = caps[1].parse().map_err(|_| invalid())?;
    let multiplier = match caps.get(2).map(|m| m.as_str()) {
        None | Some("s") => 1,
        Some("m") => 60,
        Some("h") => 3600,
        Some(_) => return Err(invalid()),
    };

    value
        .checked_mul(multiplier)
        .map(Duration::from_secs)
        .ok_or_else(invalid)
}

/// Parse a time expression into whole seconds that fit the provider's fields
pub fn parse_seconds(field: &'static str, expression: &str) -> Result<u32, ConfigError> {
    let duration = parse_time_expression(field, expression)?;
    u32::try_from(duration.as_secs()).map_err(|_| ConfigError::InvalidTimeExpression {
        field,
        expression: expression.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_units() {
        assert_eq!(parse_time_expression("t", "30").unwrap(), Duration::from_secs(30));
        assert_eq!(parse_time_expression("t", "30s").unwrap(), Duration::from_secs(30));
        assert_eq!(parse_time_expression("t", "5m").unwrap(), Duration::from_secs(300));
        assert_eq!(parse_time_expression("t", "2h").unwrap(), Duration::from_secs(7200));
        assert_eq!(parse_time_expression("t", " 10 s ").unwrap(), Duration::from_secs(10));
        assert_eq!(parse_time_expression("t", "0s").unwrap(), Duration::ZERO);
    }

    #[test]
    fn test_invalid_expressions_are_errors() {
        for expr in ["", "s", "-5s", "1.5s", "10d", "5 minutes", "abc"] {
            let err = parse_time_expression("interval", expr).unwrap_err();
            assert!(
                matches!(err, ConfigError::InvalidTimeExpression { field: "interval", .. }),
                "expected error for {:?}",
                expr
            );
        }
    }

    #[test]
    fn test_overflow_is_an_error() {
        assert!(parse_time_expression("t", "99999999999999999999h").is_err());
        assert!(parse_seconds("t", "9999999999s").is_err());
        assert_eq!(parse_seconds("t", "1m").unwrap(), 60);
    }
}
