//! Interactive authorization code flow
//!
//! Ties the state generator, callback listener and authenticator together
//! into one "get me a fresh token" operation bounded by a timeout.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use crate::Result;
use crate::error::Error;
use super::authenticator::Authenticator;
use super::callback::{CallbackListener, CallbackOutcome};
use super::state::AuthorizationState;
use super::token::Token;

/// Default time the user has to approve access in the browser
pub const DEFAULT_FLOW_TIMEOUT: Duration = Duration::from_secs(120);

/// What the user needs to see to complete the authorization
#[derive(Debug, Clone)]
pub struct AuthorizationPrompt {
    pub authorization_url: String,
    pub callback_url: String,
    pub timeout: Duration,
}

/// Displays the authorization prompt out-of-band
pub type Presenter = Arc<dyn Fn(&AuthorizationPrompt) + Send + Sync>;

/// Source of new tokens for the credential manager
#[async_trait]
pub trait TokenAcquirer: Send + Sync {
    /// Trade the refresh credential of `token` for a new token
    async fn refresh(&self, token: &Token) -> Result<Token>;

    /// Run the full interactive flow with the callback listener on `bind_addr`
    async fn authenticate(&self, bind_addr: &str) -> Result<Token>;
}

/// Orchestrates one interactive authorization per `authenticate` call
pub struct AuthenticationFlow {
    authenticator: Authenticator,
    timeout: Duration,
    cancel: CancellationToken,
    presenter: Presenter,
}

impl AuthenticationFlow {
    pub fn new(authenticator: Authenticator, timeout: Duration) -> Self {
        let timeout = if timeout.is_zero() { DEFAULT_FLOW_TIMEOUT } else { timeout };
        Self {
            authenticator,
            timeout,
            cancel: CancellationToken::new(),
            presenter: Arc::new(crate::ui::print_authorization_prompt),
        }
    }

    /// Abort any in-progress wait when `cancel` fires
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Replace how the authorization URL is shown to the user
    pub fn with_presenter(mut self, presenter: Presenter) -> Self {
        self.presenter = presenter;
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Run the complete flow and return a freshly issued token
    pub async fn authenticate(&self, bind_addr: &str) -> Result<Token> {
        let state = AuthorizationState::generate()?;

        let mut listener = CallbackListener::new(state.clone());
        let callback_url = listener.start(bind_addr).await?;

        let authenticator = self.authenticator.with_redirect_uri(callback_url.as_str());
        let prompt = AuthorizationPrompt {
            authorization_url: authenticator.authorization_url(&state),
            callback_url,
            timeout: self.timeout,
        };
        (self.presenter)(&prompt);

        let outcome = listener.await_outcome(self.timeout, &self.cancel).await;
        listener.stop();

        let code = match outcome? {
            CallbackOutcome::Code(code) => code,
            CallbackOutcome::ProviderError(err) => {
                tracing::warn!("Provider returned error on callback: {}", err);
                return Err(Error::Denied(err));
            }
            CallbackOutcome::StateMismatch => {
                tracing::warn!("Rejected callback with mismatched state");
                return Err(Error::CsrfRejected);
            }
            CallbackOutcome::MissingCode => return Err(Error::NoCode),
        };

        tracing::info!("Authorization code received, exchanging for token");
        authenticator.exchange_code(&code).await
    }

    /// Convenience forwarding to the authenticator's refresh
    pub async fn refresh_token(&self, token: &Token) -> Result<Token> {
        self.authenticator.refresh_token(token).await
    }
}

#[async_trait]
impl TokenAcquirer for AuthenticationFlow {
    async fn refresh(&self, token: &Token) -> Result<Token> {
        self.refresh_token(token).await
    }

    async fn authenticate(&self, bind_addr: &str) -> Result<Token> {
        AuthenticationFlow::authenticate(self, bind_addr).await
    }
}
