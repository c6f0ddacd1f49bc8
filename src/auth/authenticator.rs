//! Authenticator - provider-facing half of the authorization code grant
//!
//! Builds the browser authorization URL and talks to the token endpoint for
//! code exchange and refresh. Endpoints and scopes are fixed per provider and
//! injected at construction.

use chrono::Utc;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use url::Url;
use crate::Result;
use crate::error::Error;
use super::state::AuthorizationState;
use super::token::Token;

/// Spotify OAuth2 endpoints
const SPOTIFY_AUTH_URL: &str = "https://accounts.spotify.com/authorize";
const SPOTIFY_TOKEN_URL: &str = "https://accounts.spotify.com/api/token";

/// Scopes required by the player, library and playlist views
const SPOTIFY_SCOPES: &[&str] = &[
    "user-read-playback-state",
    "user-modify-playback-state",
    "user-read-currently-playing",
    "user-library-read",
    "user-library-modify",
    "playlist-read-private",
    "playlist-read-collaborative",
    "playlist-modify-public",
    "playlist-modify-private",
    "user-read-private",
    "user-read-email",
];

/// Lifetime assumed when the token endpoint omits `expires_in`
const DEFAULT_EXPIRES_IN_SECS: i64 = 3600;

const EXPIRES_IN_OUT_OF_RANGE: &str = "malformed token response: expires_in out of range";

/// Fixed provider description: where to send the user and where to trade codes
#[derive(Debug, Clone)]
pub struct Provider {
    pub authorize_url: String,
    pub token_url: String,
    pub scopes: Vec<String>,
}

impl Provider {
    pub fn spotify() -> Self {
        Self {
            authorize_url: SPOTIFY_AUTH_URL.to_string(),
            token_url: SPOTIFY_TOKEN_URL.to_string(),
            scopes: SPOTIFY_SCOPES.iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// Token endpoint response
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    token_type: Option<String>,
}

/// Token exchange request
#[derive(Debug, Serialize)]
struct TokenExchangeRequest<'a> {
    grant_type: &'a str,
    code: &'a str,
    redirect_uri: &'a str,
    client_id: &'a str,
    client_secret: &'a str,
}

/// Token refresh request
#[derive(Debug, Serialize)]
struct RefreshRequest<'a> {
    grant_type: &'a str,
    refresh_token: &'a str,
    client_id: &'a str,
    client_secret: &'a str,
}

/// OAuth2 client bound to one provider and one redirect URI
#[derive(Debug, Clone)]
pub struct Authenticator {
    client_id: String,
    client_secret: String,
    redirect_uri: String,
    authorize_url: Url,
    token_url: String,
    scopes: Vec<String>,
    http_client: Client,
}

impl Authenticator {
    /// Create an authenticator; the redirect URI is set once the listener is bound
    pub fn new(client_id: String, client_secret: String, provider: Provider) -> Result<Self> {
        let authorize_url = Url::parse(&provider.authorize_url)
            .map_err(|e| Error::Config(format!("Invalid authorize URL: {}", e)))?;
        Url::parse(&provider.token_url)
            .map_err(|e| Error::Config(format!("Invalid token URL: {}", e)))?;

        Ok(Self {
            client_id,
            client_secret,
            redirect_uri: String::new(),
            authorize_url,
            token_url: provider.token_url,
            scopes: provider.scopes,
            http_client: Client::new(),
        })
    }

    /// Copy of this authenticator that redirects to `redirect_uri`
    pub fn with_redirect_uri(&self, redirect_uri: impl Into<String>) -> Self {
        Self {
            redirect_uri: redirect_uri.into(),
            ..self.clone()
        }
    }

    /// Use a preconfigured HTTP client (proxy, timeouts)
    pub fn with_http_client(mut self, http_client: Client) -> Self {
        self.http_client = http_client;
        self
    }

    /// Build the browser-facing authorization URL
    pub fn authorization_url(&self, state: &AuthorizationState) -> String {
        let mut url = self.authorize_url.clone();
        url.query_pairs_mut()
            .append_pair("client_id", &self.client_id)
            .append_pair("response_type", "code")
            .append_pair("redirect_uri", &self.redirect_uri)
            .append_pair("scope", &self.scopes.join(" "))
            .append_pair("state", state.as_str())
            .append_pair("access_type", "offline");
        url.to_string()
    }

    /// Exchange an authorization code for a token
    pub async fn exchange_code(&self, code: &str) -> Result<Token> {
        let request = TokenExchangeRequest {
            grant_type: "authorization_code",
            code,
            redirect_uri: &self.redirect_uri,
            client_id: &self.client_id,
            client_secret: &self.client_secret,
        };

        let response = self
            .post_token_request(&request)
            .await
            .map_err(Error::ExchangeFailed)?;

        let token = Token::issued(
            response.access_token,
            response.refresh_token,
            response.token_type,
            response.expires_in.unwrap_or(DEFAULT_EXPIRES_IN_SECS),
            Utc::now(),
        )
        .ok_or_else(|| Error::ExchangeFailed(EXPIRES_IN_OUT_OF_RANGE.to_string()))?;

        tracing::debug!("Authorization code exchanged for access token");
        Ok(token)
    }

    /// Obtain a new access token using the refresh credential of `existing`
    pub async fn refresh_token(&self, existing: &Token) -> Result<Token> {
        let refresh_token = existing
            .refresh_token
            .as_deref()
            .filter(|r| !r.is_empty())
            .ok_or_else(|| Error::RefreshFailed("token has no refresh credential".to_string()))?;

        let request = RefreshRequest {
            grant_type: "refresh_token",
            refresh_token,
            client_id: &self.client_id,
            client_secret: &self.client_secret,
        };

        let response = self
            .post_token_request(&request)
            .await
            .map_err(Error::RefreshFailed)?;

        // Preserve the refresh token if not returned in response
        let refresh = response
            .refresh_token
            .filter(|r| !r.is_empty())
            .or_else(|| Some(refresh_token.to_string()));

        let token = Token::issued(
            response.access_token,
            refresh,
            response.token_type,
            response.expires_in.unwrap_or(DEFAULT_EXPIRES_IN_SECS),
            Utc::now(),
        )
        .ok_or_else(|| Error::RefreshFailed(EXPIRES_IN_OUT_OF_RANGE.to_string()))?;

        tracing::debug!("Access token refreshed");
        Ok(token)
    }

    /// POST a form to the token endpoint; errors are reported as plain messages
    /// so each caller can wrap them in its own variant
    async fn post_token_request<T: Serialize>(
        &self,
        form: &T,
    ) -> std::result::Result<TokenResponse, String> {
        let response = self
            .http_client
            .post(&self.token_url)
            .form(form)
            .send()
            .await
            .map_err(|e| format!("request to token endpoint failed: {}", e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| format!("failed to read token response: {}", e))?;

        if !status.is_success() {
            return Err(format!("token endpoint returned {}: {}", status, body));
        }

        let parsed: TokenResponse = serde_json::from_str(&body)
            .map_err(|e| format!("malformed token response: {}", e))?;
        if parsed.access_token.is_empty() {
            return Err("token response has an empty access_token".to_string());
        }
        Ok(parsed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use serde_json::json;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_provider(base: &str) -> Provider {
        Provider {
            authorize_url: format!("{}/authorize", base),
            token_url: format!("{}/api/token", base),
            scopes: vec!["user-read-email".to_string(), "playlist-read-private".to_string()],
        }
    }

    fn authenticator(base: &str) -> Authenticator {
        Authenticator::new("client".into(), "secret".into(), test_provider(base))
            .unwrap()
            .with_http_client(Client::builder().no_proxy().build().unwrap())
            .with_redirect_uri("http://127.0.0.1:8888/callback")
    }

    fn expired_token(refresh: Option<&str>) -> Token {
        Token {
            access_token: "old".to_string(),
            refresh_token: refresh.map(str::to_string),
            token_type: "Bearer".to_string(),
            expiry: Utc::now() - Duration::hours(1),
        }
    }

    #[test]
    fn test_authorization_url() {
        let auth = authenticator("https://accounts.example.com");
        let state = AuthorizationState::generate().unwrap();
        let url = Url::parse(&auth.authorization_url(&state)).unwrap();

        assert_eq!(url.path(), "/authorize");
        let pairs: std::collections::HashMap<_, _> = url.query_pairs().into_owned().collect();
        assert_eq!(pairs["client_id"], "client");
        assert_eq!(pairs["response_type"], "code");
        assert_eq!(pairs["redirect_uri"], "http://127.0.0.1:8888/callback");
        assert_eq!(pairs["scope"], "user-read-email playlist-read-private");
        assert_eq!(pairs["state"], state.as_str());
        assert_eq!(pairs["access_type"], "offline");
    }

    #[test]
    fn test_authorization_url_is_deterministic() {
        let auth = authenticator("https://accounts.example.com");
        let state = AuthorizationState::generate().unwrap();
        assert_eq!(auth.authorization_url(&state), auth.authorization_url(&state));
    }

    #[test]
    fn test_invalid_provider_url() {
        let provider = Provider {
            authorize_url: "not a url".into(),
            ..Provider::spotify()
        };
        let result = Authenticator::new("c".into(), "s".into(), provider);
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_spotify_scopes() {
        let provider = Provider::spotify();
        assert_eq!(provider.scopes.len(), 11);
        assert!(provider.scopes.iter().any(|s| s == "user-read-playback-state"));
    }

    #[tokio::test]
    async fn test_exchange_code_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/token"))
            .and(body_string_contains("grant_type=authorization_code"))
            .and(body_string_contains("code=abc123"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "new-access",
                "refresh_token": "new-refresh",
                "token_type": "Bearer",
                "expires_in": 3600
            })))
            .expect(1)
            .mount(&server)
            .await;

        let token = authenticator(&server.uri()).exchange_code("abc123").await.unwrap();
        assert_eq!(token.access_token, "new-access");
        assert_eq!(token.refresh_token.as_deref(), Some("new-refresh"));
        assert!(token.is_valid());
    }

    #[tokio::test]
    async fn test_exchange_code_non_success_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/token"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({"error": "invalid_grant"})))
            .mount(&server)
            .await;

        let result = authenticator(&server.uri()).exchange_code("bad").await;
        match result {
            Err(Error::ExchangeFailed(msg)) => assert!(msg.contains("invalid_grant")),
            other => panic!("expected ExchangeFailed, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_exchange_code_malformed_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/token"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
            .mount(&server)
            .await;

        let result = authenticator(&server.uri()).exchange_code("abc").await;
        assert!(matches!(result, Err(Error::ExchangeFailed(_))));
    }

    async fn mount_token_response(server: &MockServer, body: serde_json::Value) {
        Mock::given(method("POST"))
            .and(path("/api/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_exchange_code_expires_in_out_of_range() {
        let server = MockServer::start().await;
        mount_token_response(
            &server,
            json!({"access_token": "a", "token_type": "Bearer", "expires_in": i64::MAX}),
        )
        .await;

        let result = authenticator(&server.uri()).exchange_code("abc").await;
        match result {
            Err(Error::ExchangeFailed(msg)) => assert!(msg.contains("expires_in")),
            other => panic!("expected ExchangeFailed, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_refresh_expires_in_out_of_range() {
        let server = MockServer::start().await;
        mount_token_response(
            &server,
            json!({"access_token": "a", "token_type": "Bearer", "expires_in": i64::MAX}),
        )
        .await;

        let result = authenticator(&server.uri())
            .refresh_token(&expired_token(Some("r")))
            .await;
        match result {
            Err(Error::RefreshFailed(msg)) => assert!(msg.contains("expires_in")),
            other => panic!("expected RefreshFailed, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_refresh_keeps_previous_refresh_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/token"))
            .and(body_string_contains("grant_type=refresh_token"))
            .and(body_string_contains("refresh_token=keep-me"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "refreshed",
                "token_type": "Bearer",
                "expires_in": 3600
            })))
            .mount(&server)
            .await;

        let token = authenticator(&server.uri())
            .refresh_token(&expired_token(Some("keep-me")))
            .await
            .unwrap();
        assert_eq!(token.access_token, "refreshed");
        assert_eq!(token.refresh_token.as_deref(), Some("keep-me"));
    }

    #[tokio::test]
    async fn test_refresh_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let result = authenticator(&server.uri())
            .refresh_token(&expired_token(Some("revoked")))
            .await;
        assert!(matches!(result, Err(Error::RefreshFailed(_))));
    }

    #[tokio::test]
    async fn test_refresh_without_refresh_token() {
        let auth = authenticator("http://127.0.0.1:1");
        let result = auth.refresh_token(&expired_token(None)).await;
        assert!(matches!(result, Err(Error::RefreshFailed(_))));
    }
}
