//! Merge YAML, environment, and default values into a [`ServerConfig`].

use std::path::PathBuf;

use super::env::EnvConfig;
use super::yaml::YamlConfig;
use super::{AuthApiSecret, ServerConfig, TlsConfig};

/// Build the final configuration. YAML values win over the environment, which wins
/// over defaults.
pub fn merge_config(yaml: Option<YamlConfig>) -> Result<ServerConfig, Box<dyn std::error::Error>> {
    let env = EnvConfig::load()?;
    Ok(merge(yaml.unwrap_or_default(), env))
}

pub(super) fn merge(yaml: YamlConfig, env: EnvConfig) -> ServerConfig {
    let mut config = ServerConfig::default();

    let server = yaml.server.unwrap_or_default();
    let vendor = yaml.vendor.unwrap_or_default();
    let completion = yaml.completion.unwrap_or_default();
    let realtime = yaml.realtime.unwrap_or_default();
    let auth = yaml.auth.unwrap_or_default();
    let security = yaml.security.unwrap_or_default();

    if let Some(host) = server.host.or(env.host) {
        config.host = host;
    }
    if let Some(port) = server.port.or(env.port) {
        config.port = port;
    }
    config.tls = merge_tls(server.tls, env.tls_cert_path, env.tls_key_path);

    config.dashscope_api_key = vendor.api_key.or(env.dashscope_api_key);
    if let Some(url) = vendor.ws_url.or(env.vendor_ws_url) {
        config.vendor_ws_url = url;
    }
    if let Some(secs) = vendor
        .handshake_timeout_secs
        .or(env.vendor_handshake_timeout_secs)
    {
        config.vendor_handshake_timeout_secs = secs;
    }
    if let Some(secs) = vendor.read_timeout_secs.or(env.vendor_read_timeout_secs) {
        config.vendor_read_timeout_secs = secs;
    }
    if let Some(secs) = vendor.write_timeout_secs.or(env.vendor_write_timeout_secs) {
        config.vendor_write_timeout_secs = secs;
    }
    if let Some(secs) = vendor.task_timeout_secs.or(env.vendor_task_timeout_secs) {
        config.vendor_task_timeout_secs = secs;
    }
    if let Some(capacity) = vendor
        .audio_channel_capacity
        .or(env.vendor_audio_channel_capacity)
    {
        config.vendor_audio_channel_capacity = capacity;
    }

    config.completion_base_url = completion.base_url.or(env.completion_base_url);
    config.completion_api_key = completion.api_key.or(env.completion_api_key);
    if let Some(model) = completion.model.or(env.completion_model) {
        config.completion_model = model;
    }

    if let Some(ttl) = realtime.session_ttl_secs.or(env.realtime_session_ttl_secs) {
        config.realtime_session_ttl_secs = ttl;
    }

    config.auth_api_secrets = if !auth.api_secrets.is_empty() {
        auth.api_secrets
            .into_iter()
            .map(|entry| AuthApiSecret {
                id: entry.id,
                secret: entry.secret,
            })
            .collect()
    } else if let Some(secret) = auth.api_secret {
        vec![AuthApiSecret {
            id: "default".to_string(),
            secret,
        }]
    } else {
        env.auth_api_secrets
    };
    config.auth_required = auth.required.or(env.auth_required).unwrap_or(false);

    config.cors_allowed_origins = security.cors_allowed_origins.or(env.cors_allowed_origins);
    if let Some(rps) = security
        .rate_limit_requests_per_second
        .or(env.rate_limit_requests_per_second)
    {
        config.rate_limit_requests_per_second = rps;
    }
    if let Some(burst) = security.rate_limit_burst_size.or(env.rate_limit_burst_size) {
        config.rate_limit_burst_size = burst;
    }
    config.max_websocket_connections = security
        .max_websocket_connections
        .or(env.max_websocket_connections);
    if let Some(per_ip) = security
        .max_connections_per_ip
        .or(env.max_connections_per_ip)
    {
        config.max_connections_per_ip = per_ip;
    }

    config
}

/// TLS is configured when both paths are known. A YAML `enabled: false` turns it off.
fn merge_tls(
    yaml: Option<super::yaml::TlsYaml>,
    env_cert: Option<String>,
    env_key: Option<String>,
) -> Option<TlsConfig> {
    let yaml = yaml.unwrap_or_default();
    if yaml.enabled == Some(false) {
        return None;
    }
    let cert = yaml.cert_path.or(env_cert)?;
    let key = yaml.key_path.or(env_key)?;
    Some(TlsConfig {
        cert_path: PathBuf::from(cert),
        key_path: PathBuf::from(key),
    })
}
