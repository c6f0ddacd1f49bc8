//! Credential manager - token lifecycle and persistence
//!
//! The only component that touches the token file. `get_valid_token` returns
//! the cached token when still valid, otherwise refreshes it, and falls back to
//! the interactive flow when refresh is impossible or fails.

use chrono::Utc;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use crate::Result;
use crate::config::{create_private_dir, write_private_file, Config};
use crate::error::Error;
use super::authenticator::{Authenticator, Provider};
use super::flow::{AuthenticationFlow, Presenter, TokenAcquirer};
use super::token::{next_action, Token, TokenAction, TokenInfo};

/// Loads, validates, renews and stores the single local user's token
pub struct CredentialManager {
    acquirer: Arc<dyn TokenAcquirer>,
    bind_addr: String,
    token_path: PathBuf,
}

impl CredentialManager {
    pub fn new(
        acquirer: Arc<dyn TokenAcquirer>,
        bind_addr: impl Into<String>,
        token_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            acquirer,
            bind_addr: bind_addr.into(),
            token_path: token_path.into(),
        }
    }

    /// Build a manager for Spotify from the loaded configuration
    ///
    /// Credentials are not checked here so that offline commands (status,
    /// logout) work without them; call `Config::validate` before logging in.
    pub fn from_config(config: &Config, cancel: CancellationToken) -> Result<Self> {
        Self::from_config_with_presenter(
            config,
            cancel,
            Arc::new(crate::ui::print_authorization_prompt),
        )
    }

    /// Like `from_config`, but the authorization prompt goes to `presenter`
    pub fn from_config_with_presenter(
        config: &Config,
        cancel: CancellationToken,
        presenter: Presenter,
    ) -> Result<Self> {
        let authenticator = Authenticator::new(
            config.client_id.clone(),
            config.client_secret.clone(),
            Provider::spotify(),
        )?;
        let flow = AuthenticationFlow::new(authenticator, config.timeout())
            .with_cancellation(cancel)
            .with_presenter(presenter);
        Ok(Self::new(Arc::new(flow), config.bind_addr.clone(), config.token_path()))
    }

    pub fn token_path(&self) -> &Path {
        &self.token_path
    }

    /// Get a valid token, refreshing or re-authenticating as needed
    pub async fn get_valid_token(&self) -> Result<Token> {
        let cached = match self.load_token() {
            Ok(token) => Some(token),
            Err(Error::PersistenceFailed { source, .. }) if source.kind() == ErrorKind::NotFound => {
                tracing::debug!("No cached token at {:?}", self.token_path);
                None
            }
            Err(e) => {
                tracing::warn!("Ignoring unreadable token file: {}", e);
                None
            }
        };

        match (next_action(cached.as_ref(), Utc::now()), cached) {
            (TokenAction::UseCached, Some(token)) => {
                tracing::debug!("Using cached access token");
                return Ok(token);
            }
            (TokenAction::Refresh, Some(token)) => {
                tracing::info!("Access token expired, refreshing");
                match self.acquirer.refresh(&token).await {
                    Ok(refreshed) => {
                        self.persist(&refreshed);
                        return Ok(refreshed);
                    }
                    Err(e) => {
                        tracing::warn!("Token refresh failed: {}, re-authenticating", e);
                    }
                }
            }
            _ => {}
        }

        tracing::info!("No valid token found, starting authorization flow");
        let token = self.acquirer.authenticate(&self.bind_addr).await?;
        self.persist(&token);
        Ok(token)
    }

    /// Startup helper: succeed only once a valid token is available
    pub async fn ensure_authenticated(&self) -> Result<()> {
        self.get_valid_token().await.map(|_| ())
    }

    /// Whether a token file exists (not validated)
    pub fn has_cached_token(&self) -> bool {
        self.token_path.is_file()
    }

    /// Summarize the cached token
    pub fn get_token_info(&self) -> Result<TokenInfo> {
        Ok(self.load_token()?.info_at(Utc::now()))
    }

    /// Remove the cached token; a missing file is not an error
    pub fn logout(&self) -> Result<()> {
        match std::fs::remove_file(&self.token_path) {
            Ok(()) => {
                tracing::info!("Removed cached token {:?}", self.token_path);
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(source) => Err(self.persistence_error(source)),
        }
    }

    /// Write failures never fail the caller, who already holds a usable token
    fn persist(&self, token: &Token) {
        if let Err(e) = self.save_token(token) {
            tracing::warn!("Failed to save token: {}", e);
        }
    }

    fn load_token(&self) -> Result<Token> {
        let content = std::fs::read_to_string(&self.token_path)
            .map_err(|source| self.persistence_error(source))?;
        serde_json::from_str(&content).map_err(|e| {
            self.persistence_error(std::io::Error::new(ErrorKind::InvalidData, e))
        })
    }

    fn save_token(&self, token: &Token) -> Result<()> {
        if let Some(parent) = self.token_path.parent() {
            create_private_dir(parent).map_err(|source| self.persistence_error(source))?;
        }

        let content = serde_json::to_string_pretty(token)?;
        write_private_file(&self.token_path, content.as_bytes())
            .map_err(|source| self.persistence_error(source))?;

        tracing::debug!("Token saved to {:?}", self.token_path);
        Ok(())
    }

    fn persistence_error(&self, source: std::io::Error) -> Error {
        Error::PersistenceFailed {
            path: self.token_path.clone(),
            source,
        }
    }
}
