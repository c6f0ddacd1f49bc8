//! OAuth2 token model
//!
//! Tokens are immutable values: refreshing or re-authenticating produces a new
//! `Token` rather than mutating the cached one. The lifecycle decision is a pure
//! function of the cached token and the current time.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// OAuth2 access credential, also the on-disk record format
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Token {
    /// The access token for API requests
    pub access_token: String,

    /// The refresh token for obtaining new access tokens
    #[serde(default)]
    pub refresh_token: Option<String>,

    /// Token type (usually "Bearer")
    #[serde(default = "default_token_type")]
    pub token_type: String,

    /// When the access token expires
    pub expiry: DateTime<Utc>,
}

fn default_token_type() -> String {
    "Bearer".to_string()
}

impl Token {
    /// Build a token from a token-endpoint response issued at `now`
    ///
    /// Returns `None` when `expires_in_secs` cannot be represented as an expiry.
    pub fn issued(
        access_token: String,
        refresh_token: Option<String>,
        token_type: Option<String>,
        expires_in_secs: i64,
        now: DateTime<Utc>,
    ) -> Option<Self> {
        let expiry = Duration::try_seconds(expires_in_secs)
            .and_then(|lifetime| now.checked_add_signed(lifetime))?;

        Some(Self {
            access_token,
            refresh_token: refresh_token.filter(|r| !r.is_empty()),
            token_type: token_type
                .filter(|t| !t.is_empty())
                .unwrap_or_else(default_token_type),
            expiry,
        })
    }

    /// A token is valid strictly before its expiry
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        now < self.expiry
    }

    pub fn is_valid(&self) -> bool {
        self.is_valid_at(Utc::now())
    }

    /// Check if we hold a usable refresh token
    pub fn can_refresh(&self) -> bool {
        self.refresh_token.as_deref().is_some_and(|r| !r.is_empty())
    }

    /// Value for an HTTP `Authorization` header
    pub fn authorization_header(&self) -> String {
        format!("{} {}", self.token_type, self.access_token)
    }

    /// Summarize this token for status output
    pub fn info_at(&self, now: DateTime<Utc>) -> TokenInfo {
        TokenInfo {
            valid: self.is_valid_at(now),
            expiry: self.expiry,
            has_refresh: self.can_refresh(),
            expires_in: self.expiry - now,
        }
    }
}

/// Diagnostic view of a cached token
#[derive(Debug, Clone, PartialEq)]
pub struct TokenInfo {
    pub valid: bool,
    pub expiry: DateTime<Utc>,
    pub has_refresh: bool,
    /// Negative once the token has expired
    pub expires_in: Duration,
}

/// What the credential manager should do with a cached token
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenAction {
    UseCached,
    Refresh,
    Authenticate,
}

/// Decide how to obtain a valid token given what is cached
pub fn next_action(cached: Option<&Token>, now: DateTime<Utc>) -> TokenAction {
    match cached {
        Some(token) if token.is_valid_at(now) => TokenAction::UseCached,
        Some(token) if token.can_refresh() => TokenAction::Refresh,
        _ => TokenAction::Authenticate,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token(expiry: DateTime<Utc>, refresh: Option<&str>) -> Token {
        Token {
            access_token: "access".to_string(),
            refresh_token: refresh.map(str::to_string),
            token_type: "Bearer".to_string(),
            expiry,
        }
    }

    #[test]
    fn test_validity_is_strict() {
        let now = Utc::now();
        assert!(token(now + Duration::seconds(1), None).is_valid_at(now));
        assert!(!token(now, None).is_valid_at(now));
        assert!(!token(now - Duration::hours(1), None).is_valid_at(now));
    }

    #[test]
    fn test_next_action() {
        let now = Utc::now();
        let fresh = token(now + Duration::hours(1), Some("r"));
        let stale = token(now - Duration::hours(1), Some("r"));
        let stale_no_refresh = token(now - Duration::hours(1), None);
        let stale_empty_refresh = token(now - Duration::hours(1), Some(""));

        assert_eq!(next_action(Some(&fresh), now), TokenAction::UseCached);
        assert_eq!(next_action(Some(&stale), now), TokenAction::Refresh);
        assert_eq!(next_action(Some(&stale_no_refresh), now), TokenAction::Authenticate);
        assert_eq!(next_action(Some(&stale_empty_refresh), now), TokenAction::Authenticate);
        assert_eq!(next_action(None, now), TokenAction::Authenticate);
    }

    #[test]
    fn test_issued_defaults() {
        let now = Utc::now();
        let t = Token::issued("a".into(), Some(String::new()), None, 3600, now).unwrap();
        assert_eq!(t.token_type, "Bearer");
        assert!(t.refresh_token.is_none());
        assert_eq!(t.expiry, now + Duration::seconds(3600));
    }

    #[test]
    fn test_issued_rejects_unrepresentable_lifetime() {
        let now = Utc::now();
        assert!(Token::issued("a".into(), None, None, i64::MAX, now).is_none());
        assert!(Token::issued("a".into(), None, None, 1_000_000_000_000_000, now).is_none());
        assert!(Token::issued("a".into(), None, None, i64::MIN, now).is_none());
    }

    #[test]
    fn test_info() {
        let now = Utc::now();
        let info = token(now + Duration::minutes(10), Some("r")).info_at(now);
        assert!(info.valid);
        assert!(info.has_refresh);
        assert_eq!(info.expires_in, Duration::minutes(10));
    }

    #[test]
    fn test_authorization_header() {
        let t = token(Utc::now(), None);
        assert_eq!(t.authorization_header(), "Bearer access");
    }

    #[test]
    fn test_record_field_names() {
        let t = token(Utc::now(), Some("refresh"));
        let json: serde_json::Value = serde_json::to_value(&t).unwrap();
        assert_eq!(json["access_token"], "access");
        assert_eq!(json["refresh_token"], "refresh");
        assert_eq!(json["token_type"], "Bearer");
        assert!(json["expiry"].is_string());
    }

    #[test]
    fn test_record_keeps_missing_refresh_token_as_null() {
        let t = token(Utc::now(), None);
        let json: serde_json::Value = serde_json::to_value(&t).unwrap();
        let record = json.as_object().unwrap();
        assert!(record.contains_key("refresh_token"));
        assert!(record["refresh_token"].is_null());

        let parsed: Token = serde_json::from_value(json).unwrap();
        assert_eq!(parsed.refresh_token, None);
    }
}
