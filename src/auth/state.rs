//! CSRF state generation for the authorization redirect
//!
//! Each interactive flow gets a fresh, single-use nonce drawn from the
//! operating system's secure random source.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use rand::rngs::OsRng;
use rand::RngCore;
use std::fmt;
use crate::Result;
use crate::error::Error;

/// Number of random bytes behind each state (256 bits)
const STATE_BYTES: usize = 32;

/// Opaque nonce correlating an authorization request with its callback
#[derive(Clone, PartialEq, Eq)]
pub struct AuthorizationState(String);

impl AuthorizationState {
    /// Generate a new URL-safe state from the OS random source
    pub fn generate() -> Result<Self> {
        let mut bytes = [0u8; STATE_BYTES];
        OsRng
            .try_fill_bytes(&mut bytes)
            .map_err(|e| Error::SecureRandomUnavailable(e.to_string()))?;
        Ok(Self(URL_SAFE_NO_PAD.encode(bytes)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Compare against the `state` query parameter of a callback
    pub fn matches(&self, candidate: Option<&str>) -> bool {
        match candidate {
            Some(value) => constant_time_eq(self.0.as_bytes(), value.as_bytes()),
            None => false,
        }
    }
}

// Never print the nonce itself in logs
impl fmt::Debug for AuthorizationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AuthorizationState(..)")
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
