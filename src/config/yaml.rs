use serde::Deserialize;
use std::path::PathBuf;

/// Complete YAML configuration structure
///
/// All fields are optional to allow partial configuration. Values present in the
/// file take precedence over environment variables.
///
/// # Example YAML structure
/// ```yaml
/// server:
///   host: "0.0.0.0"
///   port: 3001
///   tls:
///     enabled: true
///     cert_path: "/etc/relay/cert.pem"
///     key_path: "/etc/relay/key.pem"
///
/// vendor:
///   api_key: "sk-your-dashscope-key"
///   ws_url: "wss://dashscope.aliyuncs.com/api-ws/v1/inference"
///   handshake_timeout_secs: 10
///   read_timeout_secs: 30
///   write_timeout_secs: 10
///   task_timeout_secs: 60
///   audio_channel_capacity: 256
///
/// completion:
///   base_url: "https://dashscope.aliyuncs.com/compatible-mode/v1"
///   api_key: "sk-your-completion-key"
///   model: "qwen-plus"
///
/// realtime:
///   session_ttl_secs: 1800
///
/// auth:
///   required: true
///   api_secrets:
///     - id: "client-a"
///       secret: "your-api-secret"
///
/// security:
///   cors_allowed_origins: "https://example.com"
///   rate_limit_requests_per_second: 60
///   rate_limit_burst_size: 10
///   max_websocket_connections: 1000
///   max_connections_per_ip: 100
/// ```
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct YamlConfig {
    pub server: Option<ServerYaml>,
    pub vendor: Option<VendorYaml>,
    pub completion: Option<CompletionYaml>,
    pub realtime: Option<RealtimeYaml>,
    pub auth: Option<AuthYaml>,
    pub security: Option<SecurityYaml>,
}

/// Server configuration from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct ServerYaml {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub tls: Option<TlsYaml>,
}

/// TLS configuration from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct TlsYaml {
    pub enabled: Option<bool>,
    pub cert_path: Option<String>,
    pub key_path: Option<String>,
}

/// Vendor task connection settings from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct VendorYaml {
    pub api_key: Option<String>,
    pub ws_url: Option<String>,
    pub handshake_timeout_secs: Option<u64>,
    pub read_timeout_secs: Option<u64>,
    pub write_timeout_secs: Option<u64>,
    pub task_timeout_secs: Option<u64>,
    pub audio_channel_capacity: Option<usize>,
}

/// Completion backend settings from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct CompletionYaml {
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    pub model: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct RealtimeYaml {
    pub session_ttl_secs: Option<u64>,
}

/// Authentication configuration from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AuthYaml {
    pub required: Option<bool>,
    /// Preferred multi-secret form. If non-empty, it takes precedence over api_secret.
    #[serde(default)]
    pub api_secrets: Vec<AuthApiSecretYaml>,
    /// Single-secret shorthand. Ignored when api_secrets is non-empty.
    pub api_secret: Option<String>,
}

/// API secret authentication entry in YAML
#[derive(Debug, Clone, Deserialize)]
pub struct AuthApiSecretYaml {
    pub id: String,
    pub secret: String,
}

/// Security configuration from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct SecurityYaml {
    /// CORS allowed origins (comma-separated list or "*" for all)
    pub cors_allowed_origins: Option<String>,
    /// Maximum requests per second per IP address
    pub rate_limit_requests_per_second: Option<u32>,
    /// Maximum burst size for rate limiting
    pub rate_limit_burst_size: Option<u32>,
    /// Maximum concurrent WebSocket connections
    pub max_websocket_connections: Option<usize>,
    /// Maximum connections per IP address
    pub max_connections_per_ip: Option<u32>,
}

impl YamlConfig {
    /// Load configuration from a YAML file
    ///
    /// # Errors
    /// Returns an error if:
    /// - The file cannot be read
    /// - The YAML is malformed
    /// - Required fields have invalid types
    pub fn from_file(path: &PathBuf) -> Result<Self, Box<dyn std::error::Error>> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read config file {}: {e}", path.display()))?;

        let config: YamlConfig = serde_yaml::from_str(&contents)
            .map_err(|e| format!("Failed to parse YAML config: {e}"))?;

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_yaml_config_full() {
        let yaml = r#"
server:
  host: "127.0.0.1"
  port: 8080

vendor:
  api_key: "sk-vendor"
  ws_url: "ws://localhost:9000/inference"
  task_timeout_secs: 30
  audio_channel_capacity: 64

completion:
  base_url: "http://localhost:8000/v1"
  model: "qwen-max-high"

realtime:
  session_ttl_secs: 600

auth:
  required: true
  api_secrets:
    - id: "client-a"
      secret: "secret-a"

security:
  max_connections_per_ip: 5
"#;

        let config: YamlConfig = serde_yaml::from_str(yaml).unwrap();

        let server = config.server.unwrap();
        assert_eq!(server.host.as_deref(), Some("127.0.0.1"));
        assert_eq!(server.port, Some(8080));

        let vendor = config.vendor.unwrap();
        assert_eq!(vendor.api_key.as_deref(), Some("sk-vendor"));
        assert_eq!(vendor.ws_url.as_deref(), Some("ws://localhost:9000/inference"));
        assert_eq!(vendor.task_timeout_secs, Some(30));
        assert_eq!(vendor.audio_channel_capacity, Some(64));
        assert!(vendor.read_timeout_secs.is_none());

        let completion = config.completion.unwrap();
        assert_eq!(completion.model.as_deref(), Some("qwen-max-high"));
        assert!(completion.api_key.is_none());

        assert_eq!(config.realtime.unwrap().session_ttl_secs, Some(600));

        let auth = config.auth.unwrap();
        assert_eq!(auth.required, Some(true));
        assert_eq!(auth.api_secrets.len(), 1);
        assert_eq!(auth.api_secrets[0].id, "client-a");

        let security = config.security.unwrap();
        assert_eq!(security.max_connections_per_ip, Some(5));
        assert!(security.cors_allowed_origins.is_none());
    }

    #[test]
    fn test_yaml_config_auth_single_secret() {
        let yaml = r#"
auth:
  api_secret: "legacy"
"#;
        let config: YamlConfig = serde_yaml::from_str(yaml).unwrap();
        let auth = config.auth.unwrap();
        assert!(auth.api_secrets.is_empty());
        assert_eq!(auth.api_secret.as_deref(), Some("legacy"));
    }

    #[test]
    fn test_yaml_config_empty() {
        let config: YamlConfig = serde_yaml::from_str("{}").unwrap();
        assert!(config.server.is_none());
        assert!(config.vendor.is_none());
        assert!(config.completion.is_none());
        assert!(config.auth.is_none());
    }

    #[test]
    fn test_from_file() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.yaml");

        fs::write(
            &config_path,
            "server:\n  host: \"localhost\"\n  port: 3000\n",
        )
        .unwrap();

        let config = YamlConfig::from_file(&config_path).unwrap();
        let server = config.server.unwrap();
        assert_eq!(server.host.as_deref(), Some("localhost"));
        assert_eq!(server.port, Some(3000));
    }

    #[test]
    fn test_from_file_not_found() {
        let path = PathBuf::from("/nonexistent/config.yaml");
        let result = YamlConfig::from_file(&path);

        assert!(
            result
                .unwrap_err()
                .to_string()
                .contains("Failed to read config file")
        );
    }

    #[test]
    fn test_from_file_invalid_yaml() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("invalid.yaml");

        fs::write(&config_path, "invalid: yaml: content:").unwrap();

        let result = YamlConfig::from_file(&config_path);
        assert!(
            result
                .unwrap_err()
                .to_string()
                .contains("Failed to parse YAML")
        );
    }
}
