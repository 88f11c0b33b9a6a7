//! Validation helpers for DTOs.

use validator::ValidationError;

/// Validates that an identifier contains something other than whitespace.
///
/// # Examples
///
/// ```ignore
/// validate_not_blank("g1")  // Ok
/// validate_not_blank("  ")  // Err - whitespace only
/// ```
pub fn validate_not_blank(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        let mut err = ValidationError::new("blank");
        err.message = Some("Value must not be blank".into());
        return Err(err);
    }

    Ok(())
}

/// Validates an optional identifier; absent and blank both mean "not provided".
pub fn validate_optional_id(value: &str) -> Result<(), ValidationError> {
    if value.len() > 128 {
        let mut err = ValidationError::new("id_length");
        err.message = Some(format!("Identifier is too long (got {})", value.len()).into());
        return Err(err);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_not_blank() {
        assert!(validate_not_blank("p1").is_ok());
        assert!(validate_not_blank(" p1 ").is_ok());
        assert!(validate_not_blank("").is_err());
        assert!(validate_not_blank(" \t").is_err());
    }

    #[test]
    fn test_validate_optional_id_length() {
        assert!(validate_optional_id("").is_ok());
        assert!(validate_optional_id(&"x".repeat(128)).is_ok());
        assert!(validate_optional_id(&"x".repeat(129)).is_err());
    }
}
