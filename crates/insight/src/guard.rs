//! Entry guards shared by every public operation.

use crate::error::{InsightError, Result};

const MAX_USER_ID_LEN: usize = 128;

/// Accept ids made of ASCII alphanumerics and `-_.:@`, up to 128 chars.
pub fn validate_user_id(user_id: &str) -> Result<&str> {
    let valid = !user_id.is_empty()
        && user_id.len() <= MAX_USER_ID_LEN
        && user_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | ':' | '@'));
    if valid {
        Ok(user_id)
    } else {
        Err(InsightError::InvalidUserId(user_id.to_string()))
    }
}

/// Reject empty or whitespace-only text; returns it trimmed.
pub fn validate_content(content: &str) -> Result<&str> {
    let trimmed = content.trim();
    if trimmed.is_empty() {
        Err(InsightError::EmptyContent)
    } else {
        Ok(trimmed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_common_id_shapes() {
        for id in ["64f1c2a9e4b0a1b2c3d4e5f6", "user-42", "auth0:abc123", "a@b.co"] {
            assert!(validate_user_id(id).is_ok(), "{id} should be valid");
        }
    }

    #[test]
    fn rejects_empty_spaced_or_oversized_ids() {
        let long = "x".repeat(129);
        for id in ["", " ", "user 42", "name\n", long.as_str(), "ñandú"] {
            let err = validate_user_id(id).unwrap_err();
            assert!(err.is_validation());
        }
    }

    #[test]
    fn content_is_trimmed_and_must_be_non_empty() {
        assert_eq!(validate_content("  hola  ").unwrap(), "hola");
        assert!(matches!(validate_content(" \t\n"), Err(InsightError::EmptyContent)));
    }
}
