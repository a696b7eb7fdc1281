//! Gateway configuration resolution and the pre-start misconfiguration check.

use crate::model::GatewayConfig;
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;

/// Keys of the site's shared settings object that describe the gateway.
pub const KEY_GATEWAY_URL: &str = "whatsapp_api_url";
pub const KEY_INSTANCE: &str = "whatsapp_instance";
pub const KEY_API_KEY: &str = "whatsapp_api_key";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("gateway URL is not configured (set --gateway-url or the `whatsapp_api_url` setting)")]
    MissingGatewayUrl,
    #[error("gateway instance is not configured (set --instance or the `whatsapp_instance` setting)")]
    MissingInstance,
    #[error("gateway URL {0:?} must be an absolute http(s) URL")]
    InvalidGatewayUrl(String),
}

/// Partially known gateway settings, merged from several sources before validation.
#[derive(Debug, Clone, Default)]
pub struct GatewaySettings {
    pub base_url: Option<String>,
    pub instance: Option<String>,
    pub api_key: Option<String>,
    pub request_timeout: Option<Duration>,
}

impl GatewaySettings {
    /// Read the gateway keys out of a key/value settings map.
    pub fn from_settings_map(map: &HashMap<String, String>) -> Self {
        let get = |k: &str| map.get(k).cloned();
        Self {
            base_url: get(KEY_GATEWAY_URL),
            instance: get(KEY_INSTANCE),
            api_key: get(KEY_API_KEY),
            request_timeout: None,
        }
    }

    /// Values already set on `self` win; blanks count as unset.
    pub fn or(self, fallback: GatewaySettings) -> Self {
        fn pick(a: Option<String>, b: Option<String>) -> Option<String> {
            present(a).or_else(|| present(b))
        }
        Self {
            base_url: pick(self.base_url, fallback.base_url),
            instance: pick(self.instance, fallback.instance),
            api_key: pick(self.api_key, fallback.api_key),
            request_timeout: self.request_timeout.or(fallback.request_timeout),
        }
    }

    /// Both required fields are set, so no other source needs to be consulted.
    pub fn is_complete(&self) -> bool {
        present(self.base_url.clone()).is_some() && present(self.instance.clone()).is_some()
    }

    pub fn validate(self, user_agent: impl Into<String>) -> Result<GatewayConfig, ConfigError> {
        let base_url = present(self.base_url).ok_or(ConfigError::MissingGatewayUrl)?;
        let instance = present(self.instance).ok_or(ConfigError::MissingInstance)?;

        let parsed = url::Url::parse(&base_url)
            .map_err(|_| ConfigError::InvalidGatewayUrl(base_url.clone()))?;
        if !matches!(parsed.scheme(), "http" | "https") || parsed.cannot_be_a_base() {
            return Err(ConfigError::InvalidGatewayUrl(base_url));
        }

        Ok(GatewayConfig {
            base_url,
            instance,
            api_key: present(self.api_key),
            request_timeout: self.request_timeout,
            user_agent: user_agent.into(),
        })
    }
}

fn present(v: Option<String>) -> Option<String> {
    v.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}
