use url::Url;

use super::{AuthApiSecret, ServerConfig};

pub fn validate_vendor_url(raw: &str) -> Result<(), Box<dyn std::error::Error>> {
    let url = Url::parse(raw).map_err(|e| format!("Invalid vendor WebSocket URL '{raw}': {e}"))?;
    match url.scheme() {
        "ws" | "wss" => Ok(()),
        other => Err(format!("Vendor URL must use ws or wss, got '{other}'").into()),
    }
}

pub fn validate_completion_url(raw: Option<&str>) -> Result<(), Box<dyn std::error::Error>> {
    let Some(raw) = raw else {
        return Ok(());
    };
    let url = Url::parse(raw).map_err(|e| format!("Invalid completion URL '{raw}': {e}"))?;
    match url.scheme() {
        "http" | "https" => Ok(()),
        other => Err(format!("Completion URL must use http or https, got '{other}'").into()),
    }
}

pub fn validate_vendor_limits(config: &ServerConfig) -> Result<(), Box<dyn std::error::Error>> {
    let timeouts = [
        ("vendor handshake timeout", config.vendor_handshake_timeout_secs),
        ("vendor read timeout", config.vendor_read_timeout_secs),
        ("vendor write timeout", config.vendor_write_timeout_secs),
        ("vendor task timeout", config.vendor_task_timeout_secs),
        ("realtime session TTL", config.realtime_session_ttl_secs),
    ];
    for (name, secs) in timeouts {
        if secs == 0 {
            return Err(format!("{name} must be greater than zero").into());
        }
    }
    if config.vendor_audio_channel_capacity == 0 {
        return Err("vendor audio channel capacity must be greater than zero".into());
    }
    Ok(())
}

pub fn validate_auth_api_secrets(
    secrets: &[AuthApiSecret],
) -> Result<(), Box<dyn std::error::Error>> {
    let mut seen = std::collections::HashSet::new();
    for entry in secrets {
        if entry.id.trim().is_empty() {
            return Err("API secret entries need a non-empty id".into());
        }
        if entry.secret.is_empty() {
            return Err(format!("API secret '{}' is empty", entry.id).into());
        }
        if !seen.insert(entry.id.as_str()) {
            return Err(format!("Duplicate API secret id '{}'", entry.id).into());
        }
    }
    Ok(())
}

pub fn validate_auth_required(
    auth_required: bool,
    secrets: &[AuthApiSecret],
) -> Result<(), Box<dyn std::error::Error>> {
    if auth_required && secrets.is_empty() {
        return Err(
            "Authentication is required but no API secrets are configured \
             (set AUTH_API_SECRET or auth.api_secrets)"
                .into(),
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secret(id: &str, secret: &str) -> AuthApiSecret {
        AuthApiSecret {
            id: id.to_string(),
            secret: secret.to_string(),
        }
    }

    #[test]
    fn test_vendor_url_scheme() {
        assert!(validate_vendor_url("wss://dashscope.aliyuncs.com/api-ws/v1/inference").is_ok());
        assert!(validate_vendor_url("ws://127.0.0.1:9000").is_ok());
        assert!(validate_vendor_url("http://127.0.0.1:9000").is_err());
        assert!(validate_vendor_url("not a url").is_err());
    }

    #[test]
    fn test_completion_url_scheme() {
        assert!(validate_completion_url(None).is_ok());
        assert!(validate_completion_url(Some("https://api.example.com/v1")).is_ok());
        assert!(validate_completion_url(Some("ws://api.example.com")).is_err());
    }

    #[test]
    fn test_zero_limits_rejected() {
        let mut config = ServerConfig::default();
        config.vendor_task_timeout_secs = 0;
        assert!(validate_vendor_limits(&config).is_err());

        let mut config = ServerConfig::default();
        config.vendor_audio_channel_capacity = 0;
        assert!(validate_vendor_limits(&config).is_err());
    }

    #[test]
    fn test_api_secrets() {
        assert!(validate_auth_api_secrets(&[secret("a", "x"), secret("b", "y")]).is_ok());
        assert!(validate_auth_api_secrets(&[secret("a", "x"), secret("a", "y")]).is_err());
        assert!(validate_auth_api_secrets(&[secret("", "x")]).is_err());
        assert!(validate_auth_api_secrets(&[secret("a", "")]).is_err());
    }

    #[test]
    fn test_auth_required_needs_secret() {
        assert!(validate_auth_required(true, &[]).is_err());
        assert!(validate_auth_required(true, &[secret("a", "x")]).is_ok());
        assert!(validate_auth_required(false, &[]).is_ok());
    }
}
