use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, anyhow};
use axum::Router;
use axum_server::tls_rustls::RustlsConfig;
use clap::Parser;
use http::{
    HeaderValue, Method,
    header::{AUTHORIZATION, CONTENT_TYPE, X_CONTENT_TYPE_OPTIONS, X_FRAME_OPTIONS},
};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_governor::{
    GovernorLayer, governor::GovernorConfigBuilder, key_extractor::SmartIpKeyExtractor,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::set_header::SetResponseHeaderLayer;
use tracing::{info, warn};

use realtime_relay::config::TlsConfig;
use realtime_relay::{ServerConfig, routes, state::AppState};

/// Rates at or above this disable the limiter entirely.
const RATE_LIMIT_DISABLED_AT: u32 = 100_000;

/// Realtime event API over task-based vendor speech services
#[derive(Parser, Debug)]
#[command(name = "realtime-relay")]
#[command(version, about, long_about = None)]
struct Cli {
    /// YAML configuration file; environment variables fill in anything it leaves out
    #[arg(short = 'c', long = "config", value_name = "FILE")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt::init();

    // Vendor tasks run over wss://
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow!("Failed to install the ring crypto provider"))?;

    let cli = Cli::parse();
    let config = load_config(cli.config.as_ref())?;

    if config.dashscope_api_key.is_none() {
        warn!("DASHSCOPE_API_KEY is not set; every vendor task will fail with missing_credentials");
    }

    let socket_addr: SocketAddr = config
        .address()
        .parse()
        .with_context(|| format!("Invalid listen address {}", config.address()))?;
    let tls = config.tls.clone();
    let cors = cors_layer(config.cors_allowed_origins.as_deref());
    let (per_second, burst) = (
        config.rate_limit_requests_per_second,
        config.rate_limit_burst_size,
    );

    let state = AppState::new(config).await;
    let app = with_http_layers(routes::create_app_router(state), cors, per_second, burst)?;

    match tls {
        Some(tls) => serve_tls(app, socket_addr, &tls).await,
        None => {
            info!("Listening on http://{socket_addr}");
            let listener = TcpListener::bind(socket_addr).await?;
            axum::serve(
                listener,
                app.into_make_service_with_connect_info::<SocketAddr>(),
            )
            .await?;
            Ok(())
        }
    }
}

fn load_config(path: Option<&PathBuf>) -> anyhow::Result<ServerConfig> {
    let config = match path {
        Some(path) => {
            info!(path = %path.display(), "Loading configuration file");
            ServerConfig::from_file(path)
        }
        None => ServerConfig::from_env(),
    };
    config.map_err(|e| anyhow!("Configuration error: {e}"))
}

/// `*` allows any origin, a comma list allows those origins with credentials, and no
/// setting keeps responses same-origin.
fn cors_layer(origins: Option<&str>) -> CorsLayer {
    let base = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE]);

    match origins {
        Some("*") => base.allow_origin(Any),
        Some(list) => {
            let allowed: Vec<HeaderValue> = list
                .split(',')
                .filter_map(|origin| origin.trim().parse().ok())
                .collect();
            base.allow_origin(allowed).allow_credentials(true)
        }
        None => {
            info!("CORS_ALLOWED_ORIGINS not set, cross-origin requests are refused");
            base
        }
    }
}

fn with_http_layers(
    router: Router,
    cors: CorsLayer,
    per_second: u32,
    burst: u32,
) -> anyhow::Result<Router> {
    let limiter = if per_second < RATE_LIMIT_DISABLED_AT {
        let config = GovernorConfigBuilder::default()
            .per_second(u64::from(per_second))
            .burst_size(burst)
            .key_extractor(SmartIpKeyExtractor)
            .finish()
            .ok_or_else(|| anyhow!("Invalid rate limit: {per_second}/s, burst {burst}"))?;
        Some(GovernorLayer::new(config))
    } else {
        info!(per_second, "Rate limiting disabled");
        None
    };

    let security_headers = ServiceBuilder::new()
        .layer(SetResponseHeaderLayer::overriding(
            X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            X_FRAME_OPTIONS,
            HeaderValue::from_static("DENY"),
        ));

    Ok(router
        .layer(cors)
        .layer(tower::util::option_layer(limiter))
        .layer(security_headers))
}

async fn serve_tls(app: Router, addr: SocketAddr, tls: &TlsConfig) -> anyhow::Result<()> {
    let rustls = RustlsConfig::from_pem_file(&tls.cert_path, &tls.key_path)
        .await
        .with_context(|| {
            format!(
                "Failed to load TLS material from {} and {}",
                tls.cert_path.display(),
                tls.key_path.display()
            )
        })?;

    info!("Listening on https://{addr}");
    axum_server::bind_rustls(addr, rustls)
        .serve(app.into_make_service_with_connect_info::<SocketAddr>())
        .await
        .context("TLS server stopped")
}
