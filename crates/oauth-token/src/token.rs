//! The OAuth token value object
//!
//! Holds the current credential state and its absolute expiry instant.
//! `valid_to` is always computed as `now + expires_in` at the moment the
//! token endpoint response is received, keeping a single clock base: the
//! check at use time never re-adds a relative lifetime to a deserialized
//! timestamp. Pure data and arithmetic; persistence and endpoint I/O live
//! in `store` and `endpoint`.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::endpoint::TokenResponse;

/// Current unix time in whole seconds.
pub(crate) fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

pub(crate) fn default_token_type() -> String {
    "bearer".to_string()
}

/// An issued OAuth token.
///
/// The serde shape is the persisted record: a flat mapping of
/// `{access_token, valid_to, refresh_token, token_type}` with `valid_to`
/// in integer unix seconds. Sub-second precision is not preserved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    /// Access token presented to the resource server
    pub access_token: String,
    /// Unix timestamp in seconds after which the token is stale
    pub valid_to: u64,
    /// Refresh token for obtaining new access tokens. Providers may stop
    /// returning one once consumed, so it is optional.
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Token type as reported by the provider, normally "bearer"
    #[serde(default = "default_token_type")]
    pub token_type: String,
}

impl Token {
    /// Build a token from an `expires_in` lifetime relative to `now`.
    pub fn new(
        access_token: String,
        expires_in_secs: u64,
        refresh_token: Option<String>,
        now: u64,
    ) -> Self {
        Self {
            access_token,
            valid_to: now + expires_in_secs,
            refresh_token,
            token_type: default_token_type(),
        }
    }

    /// Build a token from a token endpoint response received at `now`.
    pub fn from_response(response: TokenResponse, now: u64) -> Self {
        Self {
            access_token: response.access_token,
            valid_to: now + response.expires_in,
            refresh_token: response.refresh_token,
            token_type: response.token_type,
        }
    }

    /// Whether the token is past its expiry boundary, judged against the
    /// system clock. See [`expired_at`](Self::expired_at).
    pub fn expired(&self, buffer_secs: u64) -> bool {
        self.expired_at(unix_now(), buffer_secs)
    }

    /// Whether the token is past its expiry boundary at `now`:
    /// `now - buffer_secs > valid_to`, saturating at zero.
    pub fn expired_at(&self, now: u64, buffer_secs: u64) -> bool {
        now.saturating_sub(buffer_secs) > self.valid_to
    }

    /// Replace the credential fields after a refresh, recomputing
    /// `valid_to = now + expires_in_secs`. `token_type` is preserved.
    /// All fields change together; there is no partially-updated state.
    pub fn update(
        &mut self,
        access_token: String,
        expires_in_secs: u64,
        refresh_token: Option<String>,
        now: u64,
    ) {
        self.access_token = access_token;
        self.valid_to = now + expires_in_secs;
        self.refresh_token = refresh_token;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token_valid_until(valid_to: u64) -> Token {
        Token {
            access_token: "at_test".into(),
            valid_to,
            refresh_token: Some("rt_test".into()),
            token_type: "bearer".into(),
        }
    }

    #[test]
    fn new_computes_absolute_expiry() {
        let token = Token::new("at_abc".into(), 3600, Some("rt_def".into()), 1_000_000);
        assert_eq!(token.valid_to, 1_003_600);
        assert_eq!(token.token_type, "bearer");
    }

    #[test]
    fn just_expired_token_is_expired_with_zero_buffer() {
        let now = unix_now();
        let token = token_valid_until(now - 1);
        assert!(token.expired_at(now, 0));
    }

    #[test]
    fn fresh_token_is_not_expired_with_buffer() {
        let now = unix_now();
        let token = token_valid_until(now + 3600);
        assert!(!token.expired_at(now, 10));
    }

    #[test]
    fn buffer_delays_the_expiry_boundary() {
        let token = token_valid_until(1_000_000);
        assert!(token.expired_at(1_000_001, 0));
        assert!(!token.expired_at(1_000_001, 10));
        assert!(!token.expired_at(1_000_010, 10));
        assert!(token.expired_at(1_000_011, 10));
    }

    #[test]
    fn buffer_larger_than_now_saturates() {
        let token = token_valid_until(100);
        assert!(!token.expired_at(50, 1000));
    }

    #[test]
    fn update_replaces_credentials_and_keeps_token_type() {
        let mut token = Token {
            token_type: "mac".into(),
            ..token_valid_until(1_000)
        };
        token.update("at_new".into(), 7200, Some("rt_new".into()), 2_000);
        assert_eq!(token.access_token, "at_new");
        assert_eq!(token.refresh_token.as_deref(), Some("rt_new"));
        assert_eq!(token.valid_to, 9_200);
        assert_eq!(token.token_type, "mac");
    }

    #[test]
    fn record_round_trips() {
        let token = Token::new("at_abc".into(), 3600, Some("rt_def".into()), 1_700_000_000);
        let json = serde_json::to_string(&token).unwrap();
        let back: Token = serde_json::from_str(&json).unwrap();
        assert_eq!(back, token);
    }

    #[test]
    fn record_without_refresh_token_round_trips() {
        let token = Token::new("at_abc".into(), 60, None, 1_700_000_000);
        let json = serde_json::to_string(&token).unwrap();
        let back: Token = serde_json::from_str(&json).unwrap();
        assert_eq!(back.refresh_token, None);
        assert_eq!(back.valid_to, token.valid_to);
    }

    #[test]
    fn record_token_type_defaults_to_bearer() {
        let back: Token =
            serde_json::from_str(r#"{"access_token":"at","valid_to":123}"#).unwrap();
        assert_eq!(back.token_type, "bearer");
        assert_eq!(back.valid_to, 123);
    }
}
