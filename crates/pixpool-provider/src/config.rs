//! Provider configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ProviderError, ProviderResult};
use crate::types::AcceptedCodes;

/// One configured generation channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelConfig {
    pub name: String,
    pub api_url: String,
    pub api_key: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

/// Prompt rewrite client settings.
#[derive(Debug, Clone)]
pub struct RewriteConfig {
    /// OpenAI-compatible API base url
    pub api_url: String,
    pub api_key: String,
    pub model: String,
}

impl Default for RewriteConfig {
    fn default() -> Self {
        Self {
            api_url: "https://api.openai.com".to_string(),
            api_key: String::new(),
            model: "gpt-4o-mini".to_string(),
        }
    }
}

impl RewriteConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            api_url: std::env::var("OPENAI_API_URL").unwrap_or(defaults.api_url),
            api_key: std::env::var("OPENAI_API_KEY").unwrap_or(defaults.api_key),
            model: std::env::var("REWRITE_MODEL").unwrap_or(defaults.model),
        }
    }
}

/// Provider settings.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    /// Bound on every provider HTTP call
    pub timeout: Duration,
    pub accepted_codes: AcceptedCodes,
    pub channels: Vec<ChannelConfig>,
    pub rewrite: RewriteConfig,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(60),
            accepted_codes: AcceptedCodes::default(),
            channels: Vec::new(),
            rewrite: RewriteConfig::default(),
        }
    }
}

impl ProviderConfig {
    /// Create config from environment variables.
    ///
    /// Channels come from `GENERATION_CHANNELS` (a JSON array) or from the
    /// file named by `GENERATION_CHANNELS_FILE`.
    pub fn from_env() -> ProviderResult<Self> {
        let defaults = AcceptedCodes::default();
        let channels = match (
            std::env::var("GENERATION_CHANNELS"),
            std::env::var("GENERATION_CHANNELS_FILE"),
        ) {
            (Ok(json), _) => parse_channels(&json)?,
            (Err(_), Ok(path)) => {
                let json = std::fs::read_to_string(&path)
                    .map_err(|e| ProviderError::config(format!("{}: {}", path, e)))?;
                parse_channels(&json)?
            }
            _ => Vec::new(),
        };

        Ok(Self {
            timeout: Duration::from_secs(
                std::env::var("PROVIDER_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(60),
            ),
            accepted_codes: AcceptedCodes {
                submitted: std::env::var("PROVIDER_ACCEPT_CODE")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(defaults.submitted),
                queued: std::env::var("PROVIDER_QUEUED_CODE")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(defaults.queued),
            },
            channels,
            rewrite: RewriteConfig::from_env(),
        })
    }
}

/// Parse and validate a channel list.
pub fn parse_channels(json: &str) -> ProviderResult<Vec<ChannelConfig>> {
    let channels: Vec<ChannelConfig> = serde_json::from_str(json)
        .map_err(|e| ProviderError::config(format!("invalid channel list: {}", e)))?;

    let mut seen = std::collections::HashSet::new();
    for channel in &channels {
        if channel.name.trim().is_empty() {
            return Err(ProviderError::config("channel name must not be empty"));
        }
        if !seen.insert(channel.name.as_str()) {
            return Err(ProviderError::config(format!(
                "duplicate channel name: {}",
                channel.name
            )));
        }
    }
    Ok(channels)
}
