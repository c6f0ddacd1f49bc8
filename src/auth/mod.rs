//! OAuth2 authorization code authentication
//!
//! This module provides:
//! - CSRF state generation
//! - The provider-facing authenticator (authorization URL, code exchange, refresh)
//! - A loopback callback listener capturing the provider redirect
//! - The interactive authentication flow
//! - CredentialManager for token caching and lifecycle

mod authenticator;
mod callback;
mod flow;
mod manager;
mod state;
mod token;

#[cfg(test)]
mod testing;

pub use authenticator::{Authenticator, Provider};
pub use callback::{CallbackListener, CallbackOutcome, ListenerState, CALLBACK_PATH};
pub use flow::{AuthenticationFlow, AuthorizationPrompt, Presenter, TokenAcquirer, DEFAULT_FLOW_TIMEOUT};
pub use manager::CredentialManager;
pub use state::AuthorizationState;
pub use token::{next_action, Token, TokenAction, TokenInfo};
