//! CQL identifier checks.

use thiserror::Error;

/// A keyspace or table name that cannot be used unquoted in CQL.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Invalid {kind} name '{name}': use up to 48 letters, digits or underscores, starting with a letter")]
pub struct InvalidIdentifier {
    pub kind: String,
    pub name: String,
}

/// Reject names that cannot be interpolated unquoted into CQL text.
pub fn validate_identifier(kind: &str, name: &str) -> Result<(), InvalidIdentifier> {
    let valid = name.len() <= 48
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
        && name.chars().next().is_some_and(|c| c.is_ascii_alphabetic());
    if !valid {
        return Err(InvalidIdentifier {
            kind: kind.to_string(),
            name: name.to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identifiers() {
        assert!(validate_identifier("keyspace", "air_quality").is_ok());
        assert!(validate_identifier("table", "aqi_readings2").is_ok());
        assert!(validate_identifier("table", "").is_err());
        assert!(validate_identifier("table", "2fast").is_err());
        assert!(validate_identifier("table", "aqi; DROP TABLE x").is_err());
        assert!(validate_identifier("table", "aqi-readings").is_err());
        assert!(validate_identifier("table", &"a".repeat(49)).is_err());
    }

    #[test]
    fn test_error_names_the_identifier() {
        let err = validate_identifier("table", "x.y").unwrap_err();
        assert_eq!(err.kind, "table");
        assert!(err.to_string().contains("'x.y'"));
    }
}
