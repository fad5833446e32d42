//! Typed configuration from environment variables and protocol constants.
//!
//! `Config` loads once at startup, fails fast if required vars are missing.
//! Sensitive values wrapped in secrecy::SecretString to prevent log leaks.
//!
//! `Protocol` holds the constants both workers must agree on for the
//! handshake to succeed: bucket, queue name, group, target label, confidence
//! floor, page size and sentinel.

pub mod secrets;

use crate::error::{Error, Result};
use secrets::SecretString;
use serde::Deserialize;
use std::path::Path;

#[derive(Debug)]
pub struct Config {
    pub database_url: SecretString,
    pub vision_endpoint: Option<String>,
    pub vision_api_key: Option<SecretString>,
    pub otel_endpoint: Option<String>,
    pub log_level: String,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// In local dev, call `dotenvy::dotenv().ok()` before this.
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            database_url: SecretString::from(required_var("DATABASE_URL")?),
            vision_endpoint: std::env::var("VISION_ENDPOINT").ok(),
            vision_api_key: std::env::var("VISION_API_KEY").ok().map(SecretString::from),
            otel_endpoint: std::env::var("OTEL_ENDPOINT").ok(),
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
        })
    }
}

fn required_var(name: &str) -> Result<String> {
    std::env::var(name)
        .map_err(|_| Error::Config(format!("required environment variable {name} is not set")))
}

/// Constants shared by producer and consumer.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Protocol {
    pub bucket: String,
    pub queue_name: String,
    pub group_id: String,
    pub target_label: String,
    pub min_confidence: f32,
    pub page_size: usize,
    pub sentinel: String,
}

impl Default for Protocol {
    fn default() -> Self {
        Self {
            bucket: "car-images".to_string(),
            queue_name: "car_images".to_string(),
            group_id: "G1".to_string(),
            target_label: "Car".to_string(),
            min_confidence: 90.0,
            page_size: 10,
            sentinel: "-1".to_string(),
        }
    }
}

impl Protocol {
    /// Load overrides from a TOML file. Missing keys keep their defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("cannot read protocol file {}: {e}", path.display()))
        })?;
        let protocol: Protocol = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("bad protocol file {}: {e}", path.display())))?;
        protocol.validate()?;
        Ok(protocol)
    }

    /// Defaults, or the given file if any.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.queue_name.is_empty() {
            return Err(Error::Config("queue_name must not be empty".to_string()));
        }
        if self.group_id.is_empty() {
            return Err(Error::Config("group_id must not be empty".to_string()));
        }
        if self.sentinel.is_empty() {
            return Err(Error::Config("sentinel must not be empty".to_string()));
        }
        if !(0.0..=100.0).contains(&self.min_confidence) {
            return Err(Error::Config(format!(
                "min_confidence must be within 0..=100, got {}",
                self.min_confidence
            )));
        }
        if self.page_size == 0 {
            return Err(Error::Config("page_size must be positive".to_string()));
        }
        Ok(())
    }

    pub fn is_sentinel(&self, body: &str) -> bool {
        body == self.sentinel
    }
}
