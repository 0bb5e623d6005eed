//! Owner extraction from access tokens.
//!
//! Tokens have the form `<owner>:<secret>`. Only the owner id is read here; the secret is checked
//! (if at all) by whoever issues tokens.

use crate::{TidepoolError, TidepoolResult};

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Returns the owner id encoded in `token`.
pub fn parse_owner_id(token: &str) -> TidepoolResult<u64> {
    let mut parts = token.split(':');
    let (Some(owner), Some(_secret), None) = (parts.next(), parts.next(), parts.next()) else {
        return Err(TidepoolError::InvalidToken(
            "expected the form <owner>:<secret>".to_string(),
        ));
    };

    owner
        .parse()
        .map_err(|_| TidepoolError::InvalidToken(format!("owner {:?} is not a number", owner)))
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_owner_id() {
        assert_eq!(parse_owner_id("42:s3cr3t").unwrap(), 42);
        assert_eq!(parse_owner_id("7:").unwrap(), 7);
    }

    #[test]
    fn test_parse_owner_id_rejects_malformed_tokens() {
        for token in ["", "42", "42:a:b", "abc:secret", "-1:secret", ":secret"] {
            assert!(
                matches!(parse_owner_id(token), Err(TidepoolError::InvalidToken(_))),
                "{:?} should be rejected",
                token
            );
        }
    }
}
