//! Implementation of the facade's configuration source.
//!
//! Configuration is read once, at facade construction, from a layered
//! source: an optional TOML file overlaid by `COGNIT_`-prefixed environment
//! variables. Absence of any required key is a fatal [`ConfigError`].

use std::path::Path;

use secrecy::ExposeSecret;
use serde::Deserialize;
use serde::Serialize;
use url::Url;

use crate::error::ConfigError;

/// A string that is redacted whenever it is formatted or serialized.
///
/// Wraps [`secrecy::SecretString`]; the wrapper exists only to give us
/// control over (de)serialization so a `Config` can still be logged or
/// dumped for diagnostics without leaking `username`/`password` material.
#[derive(Clone)]
pub struct SecretString(secrecy::SecretString);

impl SecretString {
    /// Exposes the secret value.
    ///
    /// Callers must not pass the result to a logging or tracing macro.
    pub fn expose(&self) -> &str {
        self.0.expose_secret()
    }
}

impl From<String> for SecretString {
    fn from(value: String) -> Self {
        Self(value.into())
    }
}

impl From<&str> for SecretString {
    fn from(value: &str) -> Self {
        Self(value.into())
    }
}

impl std::fmt::Debug for SecretString {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SecretString(<redacted>)")
    }
}

impl Serialize for SecretString {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str("<redacted>")
    }
}

impl<'de> Deserialize<'de> for SecretString {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        Ok(Self(raw.into()))
    }
}

/// The device runtime's configuration, loaded once at facade construction.
///
/// Mirrors the three scalar keys the device carries: endpoint, username,
/// and password.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Config {
    /// Base URL of the Cognit Frontend (path prefix `/v1` is appended by
    /// the adapter).
    #[serde(rename = "cognit_frontend_engine_endpoint")]
    pub endpoint: Url,

    /// Basic-auth username.
    #[serde(rename = "cognit_frontend_engine_usr")]
    pub username: String,

    /// Basic-auth password.
    #[serde(rename = "cognit_frontend_engine_pwd")]
    pub password: SecretString,

    /// Bound of the call queue. Defaults to 50.
    #[serde(default = "default_queue_bound")]
    pub queue_bound: usize,

    /// Latency probe period, in milliseconds. Defaults to 2000.
    #[serde(default = "default_probe_period_ms")]
    pub probe_period_ms: u64,

    /// Supervisor tick interval, in milliseconds. Defaults to 50.
    #[serde(default = "default_tick_ms")]
    pub tick_ms: u64,
}

/// Default call queue bound.
const fn default_queue_bound() -> usize {
    50
}

/// Default latency probe period, in milliseconds.
const fn default_probe_period_ms() -> u64 {
    2_000
}

/// Default supervisor tick interval, in milliseconds.
const fn default_tick_ms() -> u64 {
    50
}

impl Config {
    /// Loads configuration from an optional TOML file overlaid by
    /// `COGNIT_`-prefixed environment variables.
    ///
    /// `path` need not exist; environment variables alone may supply every
    /// required key. A missing or malformed field surfaces through the
    /// underlying `config` crate's own error.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(
                config::File::from(path).required(false),
            );
        }
        let builder = builder.add_source(
            config::Environment::with_prefix("COGNIT").try_parsing(true),
        );

        let raw = builder.build()?;
        raw.try_deserialize().map_err(ConfigError::Source)
    }
}
