//! spotui - terminal Spotify client
//!
//! This library provides the authentication core: obtaining, caching,
//! refreshing and re-acquiring a Spotify access token through the OAuth2
//! authorization code flow with a local callback listener.

pub mod auth;
pub mod config;
pub mod error;
pub mod ui;

pub use error::{Error, Result};
