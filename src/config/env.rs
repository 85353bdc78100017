//! Environment variable layer of the configuration.

use super::AuthApiSecret;
use super::utils::{env_bool, env_parse, env_string};

/// Values read from the process environment. Unset variables stay `None`.
#[derive(Debug, Clone, Default)]
pub struct EnvConfig {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub tls_cert_path: Option<String>,
    pub tls_key_path: Option<String>,

    pub dashscope_api_key: Option<String>,
    pub vendor_ws_url: Option<String>,
    pub vendor_handshake_timeout_secs: Option<u64>,
    pub vendor_read_timeout_secs: Option<u64>,
    pub vendor_write_timeout_secs: Option<u64>,
    pub vendor_task_timeout_secs: Option<u64>,
    pub vendor_audio_channel_capacity: Option<usize>,

    pub completion_base_url: Option<String>,
    pub completion_api_key: Option<String>,
    pub completion_model: Option<String>,

    pub realtime_session_ttl_secs: Option<u64>,

    pub auth_required: Option<bool>,
    pub auth_api_secrets: Vec<AuthApiSecret>,

    pub cors_allowed_origins: Option<String>,
    pub rate_limit_requests_per_second: Option<u32>,
    pub rate_limit_burst_size: Option<u32>,
    pub max_websocket_connections: Option<usize>,
    pub max_connections_per_ip: Option<u32>,
}

impl EnvConfig {
    /// Read every supported variable.
    ///
    /// # Errors
    /// Returns an error when a numeric, boolean, or JSON variable cannot be parsed.
    pub fn load() -> Result<Self, Box<dyn std::error::Error>> {
        Ok(Self {
            host: env_string("HOST"),
            port: env_parse("PORT")?,
            tls_cert_path: env_string("TLS_CERT_PATH"),
            tls_key_path: env_string("TLS_KEY_PATH"),

            dashscope_api_key: env_string("DASHSCOPE_API_KEY"),
            vendor_ws_url: env_string("VENDOR_WS_URL"),
            vendor_handshake_timeout_secs: env_parse("VENDOR_HANDSHAKE_TIMEOUT_SECS")?,
            vendor_read_timeout_secs: env_parse("VENDOR_READ_TIMEOUT_SECS")?,
            vendor_write_timeout_secs: env_parse("VENDOR_WRITE_TIMEOUT_SECS")?,
            vendor_task_timeout_secs: env_parse("VENDOR_TASK_TIMEOUT_SECS")?,
            vendor_audio_channel_capacity: env_parse("VENDOR_AUDIO_CHANNEL_CAPACITY")?,

            completion_base_url: env_string("COMPLETION_BASE_URL"),
            completion_api_key: env_string("COMPLETION_API_KEY"),
            completion_model: env_string("COMPLETION_MODEL"),

            realtime_session_ttl_secs: env_parse("REALTIME_SESSION_TTL_SECS")?,

            auth_required: env_bool("AUTH_REQUIRED")?,
            auth_api_secrets: load_api_secrets()?,

            cors_allowed_origins: env_string("CORS_ALLOWED_ORIGINS"),
            rate_limit_requests_per_second: env_parse("RATE_LIMIT_REQUESTS_PER_SECOND")?,
            rate_limit_burst_size: env_parse("RATE_LIMIT_BURST_SIZE")?,
            max_websocket_connections: env_parse("MAX_WEBSOCKET_CONNECTIONS")?,
            max_connections_per_ip: env_parse("MAX_CONNECTIONS_PER_IP")?,
        })
    }
}

#[derive(serde::Deserialize)]
struct ApiSecretJson {
    id: String,
    secret: String,
}

/// `AUTH_API_SECRETS_JSON` (a JSON array of `{id, secret}`) wins over the single
/// `AUTH_API_SECRET` / `AUTH_API_SECRET_ID` pair.
fn load_api_secrets() -> Result<Vec<AuthApiSecret>, Box<dyn std::error::Error>> {
    if let Some(raw) = env_string("AUTH_API_SECRETS_JSON") {
        let entries: Vec<ApiSecretJson> = serde_json::from_str(&raw)
            .map_err(|e| format!("Invalid AUTH_API_SECRETS_JSON: {e}"))?;
        return Ok(entries
            .into_iter()
            .map(|entry| AuthApiSecret {
                id: entry.id,
                secret: entry.secret,
            })
            .collect());
    }

    Ok(env_string("AUTH_API_SECRET")
        .map(|secret| {
            vec![AuthApiSecret {
                id: env_string("AUTH_API_SECRET_ID").unwrap_or_else(|| "default".to_string()),
                secret,
            }]
        })
        .unwrap_or_default())
}
