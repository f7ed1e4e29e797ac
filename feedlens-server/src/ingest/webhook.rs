//! Webhook token pre-validation
//!
//! Syntactic checks run before any store lookup: a token that cannot possibly
//! be valid never reaches the database.

use thiserror::Error;

use crate::error::ApiError;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WebhookTokenError {
    #[error("Missing bearer token")]
    Missing,

    #[error("Malformed bearer token")]
    TooShort,
}

impl From<WebhookTokenError> for ApiError {
    fn from(err: WebhookTokenError) -> Self {
        ApiError::Unauthorized(err.to_string())
    }
}

/// Strip the `Bearer` scheme from an Authorization header value
///
/// The scheme is matched case-insensitively. Returns `None` for any other
/// scheme or an empty credential.
pub fn bearer_token(header: &str) -> Option<&str> {
    let header = header.trim();
    let (scheme, rest) = header.split_once(char::is_whitespace)?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = rest.trim();
    (!token.is_empty()).then_some(token)
}

/// Pre-validate the Authorization header of a webhook push
pub fn validate_webhook_token(
    header: Option<&str>,
    min_len: usize,
) -> Result<&str, WebhookTokenError> {
    let token = header
        .and_then(bearer_token)
        .ok_or(WebhookTokenError::Missing)?;

    if token.chars().count() < min_len {
        return Err(WebhookTokenError::TooShort);
    }

    Ok(token)
}
