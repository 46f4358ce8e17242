//! Application configuration
//!
//! Values are read once at startup. An optional TOML file named by
//! `RELAY_CONFIG` supplies base values; environment variables override them.

use std::collections::HashMap;
use std::env;
use std::path::Path;

use serde::{Deserialize, Serialize};

pub const DEFAULT_MODEL_ID: &str = "us.amazon.nova-lite-v1:0";
pub const DEFAULT_PORT: u16 = 8501;
pub const DEFAULT_GATEWAY_PORT: u16 = 3000;

/// Conversation service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub model_id: String,
    /// Tunnel authentication token; the tunnel itself is provisioned externally
    pub tunnel_token: Option<String>,
    /// Pins the inference region at startup instead of deriving it per caller
    pub bedrock_region: Option<String>,
}

/// Gateway relay configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    pub host: String,
    pub port: u16,
    pub upstream_url: String,
    /// Caller identifier used when the inbound request carries none
    pub function_arn: String,
    pub timeout_secs: Option<u64>,
}

/// Layout of the optional TOML file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FileConfig {
    #[serde(default)]
    pub service: ServiceSection,

    #[serde(default)]
    pub gateway: GatewaySection,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServiceSection {
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub model_id: Option<String>,
    #[serde(default)]
    pub bedrock_region: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GatewaySection {
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub upstream_url: Option<String>,
    #[serde(default)]
    pub function_arn: Option<String>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

impl FileConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_str(&content)
    }

    pub fn from_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Load the file named by `RELAY_CONFIG`, or an empty base if unset
    pub fn from_env() -> Result<Self, ConfigError> {
        match env::var("RELAY_CONFIG") {
            Ok(path) => Self::from_file(Path::new(&path)),
            Err(_) => Ok(Self::default()),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let base = FileConfig::from_env()?;
        Self::resolve(base.service, |key| env::var(key).ok())
    }

    pub fn resolve(
        base: ServiceSection,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let model_id = lookup("MODEL_ID")
            .or(base.model_id)
            .unwrap_or_else(|| DEFAULT_MODEL_ID.into());
        if model_id.trim().is_empty() {
            return Err(ConfigError::Missing("MODEL_ID"));
        }

        Ok(Self {
            host: lookup("HOST")
                .or(base.host)
                .unwrap_or_else(|| "0.0.0.0".into()),
            port: parse_port(&lookup, "PORT")?
                .or(base.port)
                .unwrap_or(DEFAULT_PORT),
            model_id,
            tunnel_token: lookup("NGROK_TOKEN").filter(|t| !t.is_empty()),
            bedrock_region: lookup("BEDROCK_REGION")
                .or(base.bedrock_region)
                .filter(|r| !r.is_empty()),
        })
    }
}

impl GatewayConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let base = FileConfig::from_env()?;
        Self::resolve(base.gateway, |key| env::var(key).ok())
    }

    pub fn resolve(
        base: GatewaySection,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let upstream_url = lookup("UPSTREAM_URL")
            .or(base.upstream_url)
            .filter(|u| !u.trim().is_empty())
            .ok_or(ConfigError::Missing("UPSTREAM_URL"))?;

        let timeout_secs = match lookup("GATEWAY_TIMEOUT_SECS") {
            Some(raw) => Some(raw.parse().map_err(|_| ConfigError::Invalid {
                key: "GATEWAY_TIMEOUT_SECS",
                value: raw,
            })?),
            None => base.timeout_secs,
        };

        Ok(Self {
            host: lookup("GATEWAY_HOST")
                .or(base.host)
                .unwrap_or_else(|| "0.0.0.0".into()),
            port: parse_port(&lookup, "GATEWAY_PORT")?
                .or(base.port)
                .unwrap_or(DEFAULT_GATEWAY_PORT),
            upstream_url,
            function_arn: lookup("GATEWAY_FUNCTION_ARN")
                .or(base.function_arn)
                .unwrap_or_default(),
            timeout_secs,
        })
    }
}

fn parse_port(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
) -> Result<Option<u16>, ConfigError> {
    match lookup(key) {
        Some(raw) => raw
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::Invalid { key, value: raw }),
        None => Ok(None),
    }
}

/// Build a lookup over a fixed set of pairs
pub fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let map: HashMap<String, String> = pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    move |key| map.get(key).cloned()
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Missing required setting: {0}")]
    Missing(&'static str),

    #[error("Invalid value for {key}: {value:?}")]
    Invalid { key: &'static str, value: String },

    #[error("HTTP client setup failed: {0}")]
    HttpClient(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_CONFIG: &str = r#"
[service]
port = 9000
model_id = "us.amazon.nova-pro-v1:0"
bedrock_region = "eu-west-1"

[gateway]
upstream_url = "https://example.ngrok.app/"
function_arn = "arn:aws:lambda:ap-northeast-1:123456789012:function:relay"
timeout_secs = 30
"#;

    #[test]
    fn test_service_defaults() {
        let config = Config::resolve(ServiceSection::default(), lookup_from(&[])).unwrap();

        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 8501);
        assert_eq!(config.model_id, DEFAULT_MODEL_ID);
        assert!(config.tunnel_token.is_none());
        assert!(config.bedrock_region.is_none());
    }

    #[test]
    fn test_env_overrides_file() {
        let file = FileConfig::from_str(SAMPLE_CONFIG).unwrap();
        let config = Config::resolve(
            file.service,
            lookup_from(&[("PORT", "8080"), ("NGROK_TOKEN", "tok")]),
        )
        .unwrap();

        assert_eq!(config.port, 8080);
        assert_eq!(config.model_id, "us.amazon.nova-pro-v1:0");
        assert_eq!(config.bedrock_region.as_deref(), Some("eu-west-1"));
        assert_eq!(config.tunnel_token.as_deref(), Some("tok"));
    }

    #[test]
    fn test_empty_model_id_rejected() {
        let err = Config::resolve(ServiceSection::default(), lookup_from(&[("MODEL_ID", "")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Missing("MODEL_ID")));
    }

    #[test]
    fn test_bad_port_rejected() {
        let err = Config::resolve(ServiceSection::default(), lookup_from(&[("PORT", "http")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "PORT", .. }));
    }

    #[test]
    fn test_gateway_requires_upstream() {
        let err = GatewayConfig::resolve(GatewaySection::default(), lookup_from(&[])).unwrap_err();
        assert!(matches!(err, ConfigError::Missing("UPSTREAM_URL")));
    }

    #[test]
    fn test_gateway_from_file() {
        let file = FileConfig::from_str(SAMPLE_CONFIG).unwrap();
        let config = GatewayConfig::resolve(file.gateway, lookup_from(&[])).unwrap();

        assert_eq!(config.upstream_url, "https://example.ngrok.app/");
        assert_eq!(config.port, DEFAULT_GATEWAY_PORT);
        assert_eq!(config.timeout_secs, Some(30));
        assert!(config.function_arn.contains("ap-northeast-1"));
    }
}
