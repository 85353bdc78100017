//! Configuration module for the realtime relay
//!
//! Configuration comes from .env files, environment variables, and an optional YAML file.
//! Priority: YAML > ENV vars > .env values > defaults.
//!
//! # Modules
//! - `yaml`: YAML configuration file loading
//! - `env`: Environment variable loading
//! - `merge`: Merging YAML and environment configurations
//! - `validation`: Configuration validation logic
//! - `utils`: Utility functions for configuration parsing
//!
//! # Example
//! ```rust,no_run
//! use realtime_relay::config::ServerConfig;
//! use std::path::PathBuf;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // Load from environment variables only
//! let config = ServerConfig::from_env()?;
//!
//! // Load from YAML file with environment variable overrides
//! let config_path = PathBuf::from("config.yaml");
//! let config = ServerConfig::from_file(&config_path)?;
//!
//! println!("Server listening on {}", config.address());
//! # Ok(())
//! # }
//! ```

use std::path::PathBuf;
use std::time::Duration;

mod env;
mod merge;
mod utils;
mod validation;
mod yaml;

pub use yaml::YamlConfig;

use crate::core::vendor::{
    DEFAULT_AUDIO_CHANNEL_CAPACITY, DEFAULT_HANDSHAKE_TIMEOUT, DEFAULT_READ_TIMEOUT,
    DEFAULT_TASK_TIMEOUT, DEFAULT_VENDOR_WS_URL, DEFAULT_WRITE_TIMEOUT, VendorConfig,
};

/// Completion model used when none is configured
pub const DEFAULT_COMPLETION_MODEL: &str = "qwen-plus";

/// Lifetime advertised in `session.expires_at` (30 minutes)
pub const DEFAULT_SESSION_TTL_SECS: u64 = 1800;

/// TLS configuration for HTTPS and WSS
#[derive(Debug, Clone)]
pub struct TlsConfig {
    /// Path to the TLS certificate file (PEM format)
    pub cert_path: PathBuf,
    /// Path to the TLS private key file (PEM format)
    pub key_path: PathBuf,
}

/// API secret authentication entry with a client identifier
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthApiSecret {
    pub id: String,
    pub secret: String,
}

/// Server configuration
///
/// Contains everything needed to run the relay:
/// - Server settings (host, port, TLS)
/// - Vendor connection settings (API key, endpoint, timeouts, audio buffering)
/// - Completion backend settings
/// - Authentication settings
/// - Security settings (CORS, rate limiting, connection limits)
#[derive(Debug, Clone)]
pub struct ServerConfig {
    // Server settings
    pub host: String,
    pub port: u16,

    // TLS configuration (optional)
    pub tls: Option<TlsConfig>,

    // Vendor settings
    /// DashScope API key presented on every vendor task connection
    pub dashscope_api_key: Option<String>,
    /// Vendor task WebSocket endpoint (`ws://` or `wss://`)
    pub vendor_ws_url: String,
    pub vendor_handshake_timeout_secs: u64,
    pub vendor_read_timeout_secs: u64,
    pub vendor_write_timeout_secs: u64,
    /// Overall bound on one task's audio and completion
    pub vendor_task_timeout_secs: u64,
    /// Buffered vendor audio frames per task before frames are dropped
    pub vendor_audio_channel_capacity: usize,

    // Completion backend
    /// OpenAI-compatible base URL; responses echo user text when unset
    pub completion_base_url: Option<String>,
    /// Defaults to the DashScope API key when unset
    pub completion_api_key: Option<String>,
    /// May carry a `-high`/`-medium`/`-low` reasoning-effort suffix
    pub completion_model: String,

    // Realtime sessions
    pub realtime_session_ttl_secs: u64,

    // Authentication configuration
    pub auth_api_secrets: Vec<AuthApiSecret>,
    pub auth_required: bool,

    // Security configuration
    /// CORS allowed origins (comma-separated list or "*" for all)
    /// Default: None (CORS disabled, same-origin only)
    pub cors_allowed_origins: Option<String>,

    // Rate limiting configuration
    /// Maximum requests per second per IP address
    /// Default: 60
    pub rate_limit_requests_per_second: u32,
    /// Maximum burst size for rate limiting
    /// Default: 10
    pub rate_limit_burst_size: u32,

    // Connection limits
    /// Maximum concurrent WebSocket connections
    /// Default: None (unlimited)
    pub max_websocket_connections: Option<usize>,
    /// Maximum connections per IP address
    /// Default: 100
    pub max_connections_per_ip: u32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3001,
            tls: None,
            dashscope_api_key: None,
            vendor_ws_url: DEFAULT_VENDOR_WS_URL.to_string(),
            vendor_handshake_timeout_secs: DEFAULT_HANDSHAKE_TIMEOUT.as_secs(),
            vendor_read_timeout_secs: DEFAULT_READ_TIMEOUT.as_secs(),
            vendor_write_timeout_secs: DEFAULT_WRITE_TIMEOUT.as_secs(),
            vendor_task_timeout_secs: DEFAULT_TASK_TIMEOUT.as_secs(),
            vendor_audio_channel_capacity: DEFAULT_AUDIO_CHANNEL_CAPACITY,
            completion_base_url: None,
            completion_api_key: None,
            completion_model: DEFAULT_COMPLETION_MODEL.to_string(),
            realtime_session_ttl_secs: DEFAULT_SESSION_TTL_SECS,
            auth_api_secrets: Vec::new(),
            auth_required: false,
            cors_allowed_origins: None,
            rate_limit_requests_per_second: 60,
            rate_limit_burst_size: 10,
            max_websocket_connections: None,
            max_connections_per_ip: 100,
        }
    }
}

/// Zeroize all secret fields when the configuration is dropped.
impl Drop for ServerConfig {
    fn drop(&mut self) {
        use zeroize::Zeroize;

        if let Some(ref mut key) = self.dashscope_api_key {
            key.zeroize();
        }
        if let Some(ref mut key) = self.completion_api_key {
            key.zeroize();
        }
        for secret in &mut self.auth_api_secrets {
            secret.secret.zeroize();
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables (and `.env`, loaded in `main`).
    ///
    /// # Errors
    /// Returns an error if a variable has an invalid format or validation fails.
    pub fn from_env() -> Result<Self, Box<dyn std::error::Error>> {
        let config = merge::merge_config(None)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a YAML file on top of the environment.
    ///
    /// Priority order (highest to lowest):
    /// 1. YAML file values
    /// 2. Environment variables (actual ENV vars override .env values)
    /// 3. .env file values
    /// 4. Default values
    ///
    /// # Errors
    /// Returns an error if:
    /// - The YAML file cannot be read or is malformed
    /// - Environment variables have invalid formats
    /// - Configuration validation fails
    pub fn from_file(path: &PathBuf) -> Result<Self, Box<dyn std::error::Error>> {
        let yaml_config = yaml::YamlConfig::from_file(path)?;
        let config = merge::merge_config(Some(yaml_config))?;
        config.validate()?;
        Ok(config)
    }

    /// Run every validation rule against the merged configuration.
    pub fn validate(&self) -> Result<(), Box<dyn std::error::Error>> {
        validation::validate_vendor_url(&self.vendor_ws_url)?;
        validation::validate_completion_url(self.completion_base_url.as_deref())?;
        validation::validate_vendor_limits(self)?;
        validation::validate_auth_api_secrets(&self.auth_api_secrets)?;
        validation::validate_auth_required(self.auth_required, &self.auth_api_secrets)?;
        Ok(())
    }

    /// Get the server address as a string
    ///
    /// Returns the address in the format "host:port"
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Check if TLS is enabled
    pub fn is_tls_enabled(&self) -> bool {
        self.tls.is_some()
    }

    /// Check if API secret authentication is configured
    pub fn has_api_secret_auth(&self) -> bool {
        !self.auth_api_secrets.is_empty()
    }

    /// Vendor connection settings for the task manager.
    pub fn vendor_config(&self) -> VendorConfig {
        VendorConfig {
            ws_url: self.vendor_ws_url.clone(),
            handshake_timeout: Duration::from_secs(self.vendor_handshake_timeout_secs),
            read_timeout: Duration::from_secs(self.vendor_read_timeout_secs),
            write_timeout: Duration::from_secs(self.vendor_write_timeout_secs),
            task_timeout: Duration::from_secs(self.vendor_task_timeout_secs),
            audio_channel_capacity: self.vendor_audio_channel_capacity,
        }
    }
}
