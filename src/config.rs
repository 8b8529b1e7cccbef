//! Runtime configuration
//!
//! Settings are read once at startup from the environment (after loading an
//! optional `.env` file) and passed explicitly to the components that need
//! them.

use std::env;
use std::str::FromStr;

use crate::error::{Error, Result};
use crate::token::{TokenSize, TokenSpec};

/// Number of insert attempts before `create` gives up on finding a free token
pub const DEFAULT_CREATE_MAX_ATTEMPTS: u32 = 20;

#[derive(Debug, Clone)]
pub struct Settings {
    /// Server port (`PORT`)
    pub port: u16,

    /// Path of the database file (`DATABASE_URL`)
    pub database_path: String,

    /// Public origin used to build absolute links (`URL`)
    pub base_url: String,

    /// Shared secret for the management API (`AUTHORIZATION`); `None` disables the check
    pub authorization: Option<String>,

    /// First path segment of the dispatch route (`PRIVATEURL_URL_NAMESPACE`)
    pub url_namespace: String,

    /// Token size used when `create` gets none (`PRIVATEURL_DEFAULT_TOKEN_SIZE`)
    pub default_token_size: TokenSize,

    /// Dash piece size used when `create` gets none (`PRIVATEURL_DEFAULT_TOKEN_DASHED_PIECE_SIZE`)
    pub default_dashed_piece_size: i64,

    /// Redirect target after a successful hit with no override (`PRIVATEURL_DEFAULT_REDIRECT`)
    pub default_redirect: String,

    /// Retry ceiling of `create` (`PRIVATEURL_CREATE_MAX_ATTEMPTS`)
    pub create_max_attempts: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            port: 8080,
            database_path: "data.db".to_string(),
            base_url: "http://localhost:8080".to_string(),
            authorization: None,
            url_namespace: "privateurl".to_string(),
            default_token_size: TokenSize::default(),
            default_dashed_piece_size: 12,
            default_redirect: "/".to_string(),
            create_max_attempts: DEFAULT_CREATE_MAX_ATTEMPTS,
        }
    }
}

impl Settings {
    /// Reads settings from environment variables, falling back to defaults.
    ///
    /// Call `dotenvy::dotenv()` first to pick up a `.env` file.
    pub fn from_env() -> Result<Self> {
        let defaults = Settings::default();

        let port = parse_var("PORT", defaults.port)?;
        let base_url = env::var("URL")
            .map(|url| url.trim_end_matches('/').to_string())
            .unwrap_or_else(|_| format!("http://localhost:{}", port));

        let settings = Self {
            port,
            database_path: env::var("DATABASE_URL").unwrap_or(defaults.database_path),
            base_url,
            authorization: env::var("AUTHORIZATION").ok().filter(|secret| !secret.is_empty()),
            url_namespace: env::var("PRIVATEURL_URL_NAMESPACE").unwrap_or(defaults.url_namespace),
            default_token_size: match env::var("PRIVATEURL_DEFAULT_TOKEN_SIZE") {
                Ok(value) => value.parse().map_err(|e| {
                    Error::Configuration(format!("PRIVATEURL_DEFAULT_TOKEN_SIZE: {}", e))
                })?,
                Err(_) => defaults.default_token_size,
            },
            default_dashed_piece_size: parse_var(
                "PRIVATEURL_DEFAULT_TOKEN_DASHED_PIECE_SIZE",
                defaults.default_dashed_piece_size,
            )?,
            default_redirect: env::var("PRIVATEURL_DEFAULT_REDIRECT")
                .unwrap_or(defaults.default_redirect),
            create_max_attempts: parse_var(
                "PRIVATEURL_CREATE_MAX_ATTEMPTS",
                defaults.create_max_attempts,
            )?,
        };

        settings.validate()?;
        Ok(settings)
    }

    /// Checks the values that cannot be expressed in the types
    pub fn validate(&self) -> Result<()> {
        let namespace_ok = !self.url_namespace.is_empty()
            && self
                .url_namespace
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_');
        if !namespace_ok || self.url_namespace == "api" {
            return Err(Error::Configuration(format!(
                "invalid url namespace {:?}",
                self.url_namespace
            )));
        }

        TokenSpec::new(self.default_token_size, self.default_dashed_piece_size)
            .map_err(|e| Error::Configuration(format!("default token settings: {}", e)))?;

        if self.create_max_attempts == 0 {
            return Err(Error::Configuration(
                "create_max_attempts must be at least 1".to_string(),
            ));
        }

        Ok(())
    }

    /// Absolute URL for a path produced by `PrivateUrlRecord::absolute_path`
    pub fn absolute_url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

fn parse_var<T: FromStr>(name: &str, default: T) -> Result<T> {
    match env::var(name) {
        Ok(value) => value
            .trim()
            .parse()
            .map_err(|_| Error::Configuration(format!("{} has an invalid value {:?}", name, value))),
        Err(_) => Ok(default),
    }
}
