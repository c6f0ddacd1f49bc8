//! Configuration management

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use crate::Result;
use crate::error::Error;

/// Environment variables that override the stored client credentials
pub const CLIENT_ID_ENV: &str = "SPOTIFY_CLIENT_ID";
pub const CLIENT_SECRET_ENV: &str = "SPOTIFY_CLIENT_SECRET";

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Spotify application client ID
    #[serde(default)]
    pub client_id: String,

    /// Spotify application client secret
    #[serde(default)]
    pub client_secret: String,

    /// Loopback address for the OAuth callback; port 0 picks a free port
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// Seconds to wait for the user to approve access
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Where the token is cached (defaults to ~/.spotui/token.json)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_path: Option<PathBuf>,
}

fn default_bind_addr() -> String {
    "127.0.0.1:8888".to_string()
}

fn default_timeout_secs() -> u64 {
    120
}

impl Default for Config {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            client_secret: String::new(),
            bind_addr: default_bind_addr(),
            timeout_secs: default_timeout_secs(),
            token_path: None,
        }
    }
}

impl Config {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Resolved token file location
    pub fn token_path(&self) -> PathBuf {
        self.token_path
            .clone()
            .unwrap_or_else(|| config_dir().join("token.json"))
    }

    /// Apply non-empty credential overrides
    pub fn apply_overrides(&mut self, client_id: Option<String>, client_secret: Option<String>) {
        if let Some(id) = client_id.filter(|v| !v.is_empty()) {
            self.client_id = id;
        }
        if let Some(secret) = client_secret.filter(|v| !v.is_empty()) {
            self.client_secret = secret;
        }
    }

    /// Override credentials from `SPOTIFY_CLIENT_ID` / `SPOTIFY_CLIENT_SECRET`
    pub fn apply_env(&mut self) {
        self.apply_overrides(
            std::env::var(CLIENT_ID_ENV).ok(),
            std::env::var(CLIENT_SECRET_ENV).ok(),
        );
    }

    /// Check that the settings can drive an authorization flow
    pub fn validate(&self) -> Result<()> {
        if self.client_id.is_empty() {
            return Err(Error::Config(format!(
                "Missing client_id. Set {} or add it to {:?}",
                CLIENT_ID_ENV,
                config_path()
            )));
        }
        if self.client_secret.is_empty() {
            return Err(Error::Config(format!(
                "Missing client_secret. Set {} or add it to {:?}",
                CLIENT_SECRET_ENV,
                config_path()
            )));
        }
        if self.bind_addr.is_empty() {
            return Err(Error::Config("bind_addr cannot be empty".to_string()));
        }
        Ok(())
    }
}

/// Get the config directory path
pub fn config_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".spotui")
}

/// Get the config file path
pub fn config_path() -> PathBuf {
    config_dir().join("config.json")
}

/// Load configuration, falling back to defaults, then apply the environment
pub fn load() -> Result<Config> {
    let mut config = load_from(&config_path())?;
    config.apply_env();
    Ok(config)
}

/// Load configuration from `path`; a missing file yields the defaults
pub fn load_from(path: &Path) -> Result<Config> {
    if !path.exists() {
        tracing::debug!("No config at {:?}, using defaults", path);
        return Ok(Config::default());
    }

    let content = std::fs::read_to_string(path)?;
    let config: Config = serde_json::from_str(&content)?;
    Ok(config)
}

/// Save configuration to file
pub fn save(config: &Config) -> Result<()> {
    save_to(config, &config_path())
}

pub fn save_to(config: &Config, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        create_private_dir(parent)?;
    }

    // Holds the client secret
    let content = serde_json::to_string_pretty(config)?;
    write_private_file(path, content.as_bytes())?;
    Ok(())
}

/// Create `dir` and its parents, owner-only on Unix
pub(crate) fn create_private_dir(dir: &Path) -> std::io::Result<()> {
    let mut builder = std::fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(0o700);
    }
    builder.create(dir)
}

/// Replace `path` with `content`, readable by the owner only
///
/// The content goes to a `0600` temporary file in the same directory which is
/// then renamed over `path`, so the secret never sits in a file with wider
/// permissions and readers never see a partial write.
pub(crate) fn write_private_file(path: &Path, content: &[u8]) -> std::io::Result<()> {
    use std::io::Write;

    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let mut file = tempfile::Builder::new()
        .prefix(".spotui-")
        .suffix(".tmp")
        .tempfile_in(dir)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        file.as_file()
            .set_permissions(std::fs::Permissions::from_mode(0o600))?;
    }
    file.write_all(content)?;
    file.as_file().sync_all()?;
    file.persist(path).map_err(|e| e.error)?;
    Ok(())
}
