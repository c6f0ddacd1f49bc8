//! Test helpers: a mock provider and a scripted "browser" that follows the
//! authorization URL back to the callback listener.

use std::sync::Arc;
use std::time::Duration;
use reqwest::Client;
use serde_json::json;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use url::Url;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};
use super::authenticator::{Authenticator, Provider};
use super::flow::{AuthenticationFlow, AuthorizationPrompt, Presenter};

pub(crate) fn http() -> Client {
    Client::builder().no_proxy().build().unwrap()
}

pub(crate) fn mock_provider(server: &MockServer) -> Provider {
    Provider {
        authorize_url: format!("{}/authorize", server.uri()),
        token_url: format!("{}/api/token", server.uri()),
        scopes: vec!["user-read-private".to_string()],
    }
}

/// Token endpoint answering every POST with a fresh token
pub(crate) async fn mock_token_endpoint(server: &MockServer, expected_calls: u64) {
    Mock::given(method("POST"))
        .and(path("/api/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "mock-access",
            "refresh_token": "mock-refresh",
            "token_type": "Bearer",
            "expires_in": 3600
        })))
        .expect(expected_calls)
        .mount(server)
        .await;
}

pub(crate) fn test_flow(server: &MockServer, timeout: Duration) -> AuthenticationFlow {
    let authenticator = Authenticator::new("client".into(), "secret".into(), mock_provider(server))
        .unwrap()
        .with_http_client(http());
    AuthenticationFlow::new(authenticator, timeout)
}

/// Receives the prompt a flow would print and optionally follows it
pub(crate) struct Browser {
    prompts: mpsc::UnboundedReceiver<AuthorizationPrompt>,
}

/// Prompt as observed by the browser
pub(crate) struct SeenPrompt {
    pub prompt: AuthorizationPrompt,
    pub port: u16,
}

impl SeenPrompt {
    /// Whether the callback port can be bound again
    pub async fn port_released(&self) -> bool {
        for _ in 0..40 {
            if tokio::net::TcpListener::bind(("127.0.0.1", self.port)).await.is_ok() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
        false
    }
}

impl Browser {
    pub fn new() -> (Self, Presenter) {
        let (tx, rx) = mpsc::unbounded_channel();
        let presenter: Presenter = Arc::new(move |prompt: &AuthorizationPrompt| {
            let _ = tx.send(prompt.clone());
        });
        (Self { prompts: rx }, presenter)
    }

    /// Wait for the flow to present its prompt
    pub async fn prompt(mut self) -> SeenPrompt {
        let prompt = self.prompts.recv().await.unwrap();
        let port = Url::parse(&prompt.callback_url).unwrap().port().unwrap();
        SeenPrompt { prompt, port }
    }

    /// Redirect to the callback with the query built from the flow's state
    pub fn respond<F>(self, query: F) -> JoinHandle<SeenPrompt>
    where
        F: FnOnce(&str) -> String + Send + 'static,
    {
        tokio::spawn(async move {
            let seen = self.prompt().await;
            let auth_url = Url::parse(&seen.prompt.authorization_url).unwrap();
            let pairs: std::collections::HashMap<_, _> =
                auth_url.query_pairs().into_owned().collect();
            assert_eq!(pairs["redirect_uri"], seen.prompt.callback_url);

            let redirect = format!("{}?{}", pairs["redirect_uri"], query(&pairs["state"]));
            let response = http().get(redirect).send().await.unwrap();
            assert_eq!(response.status(), 200);
            seen
        })
    }
}
