//! Shared application state.

use std::net::IpAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use thiserror::Error;
use tracing::info;

use crate::config::ServerConfig;
use crate::core::completion::{CompletionBackend, EchoCompletion, HttpCompletion};
use crate::core::vendor::{VendorCredentials, VendorTaskManager};
use crate::handlers::realtime::RealtimeServices;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ConnectionLimitError {
    #[error("global WebSocket connection limit reached")]
    GlobalLimitReached,
    #[error("per-IP WebSocket connection limit reached")]
    PerIpLimitReached,
}

pub struct AppState {
    pub config: ServerConfig,
    pub vendor_manager: Arc<VendorTaskManager>,
    pub completion: Arc<dyn CompletionBackend>,
    ws_connections: AtomicUsize,
    ip_connections: DashMap<IpAddr, u32>,
}

impl AppState {
    pub async fn new(config: ServerConfig) -> Arc<Self> {
        let completion: Arc<dyn CompletionBackend> = match &config.completion_base_url {
            Some(base_url) => {
                let mut backend =
                    HttpCompletion::new(base_url.clone(), config.completion_model.clone());
                if let Some(api_key) = config
                    .completion_api_key
                    .as_ref()
                    .or(config.dashscope_api_key.as_ref())
                {
                    backend = backend.with_api_key(api_key.clone());
                }
                info!(
                    base_url = %base_url,
                    model = %config.completion_model,
                    "Using HTTP completion backend"
                );
                Arc::new(backend)
            }
            None => {
                info!("No completion endpoint configured, responses echo the latest user text");
                Arc::new(EchoCompletion)
            }
        };

        Self::with_completion(config, completion)
    }

    /// Build state around an explicit completion backend.
    pub fn with_completion(
        config: ServerConfig,
        completion: Arc<dyn CompletionBackend>,
    ) -> Arc<Self> {
        let vendor_manager = Arc::new(VendorTaskManager::new(config.vendor_config()));
        Arc::new(Self {
            config,
            vendor_manager,
            completion,
            ws_connections: AtomicUsize::new(0),
            ip_connections: DashMap::new(),
        })
    }

    pub fn vendor_credentials(&self) -> Option<VendorCredentials> {
        self.config
            .dashscope_api_key
            .as_deref()
            .filter(|key| !key.is_empty())
            .map(VendorCredentials::new)
    }

    /// Collaborators handed to each realtime connection.
    pub fn realtime_services(&self) -> RealtimeServices {
        RealtimeServices {
            manager: self.vendor_manager.clone(),
            credentials: self.vendor_credentials(),
            completion: self.completion.clone(),
            session_ttl: Duration::from_secs(self.config.realtime_session_ttl_secs),
        }
    }

    /// Reserve a WebSocket slot for `ip`, enforcing the global and per-IP limits.
    pub fn try_acquire_connection(&self, ip: IpAddr) -> Result<(), ConnectionLimitError> {
        if let Some(max) = self.config.max_websocket_connections {
            let reserved = self
                .ws_connections
                .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                    (current < max).then_some(current + 1)
                });
            if reserved.is_err() {
                return Err(ConnectionLimitError::GlobalLimitReached);
            }
        } else {
            self.ws_connections.fetch_add(1, Ordering::AcqRel);
        }

        let per_ip_limit = self.config.max_connections_per_ip;
        let mut count = self.ip_connections.entry(ip).or_insert(0);
        if *count >= per_ip_limit {
            drop(count);
            self.ws_connections.fetch_sub(1, Ordering::AcqRel);
            return Err(ConnectionLimitError::PerIpLimitReached);
        }
        *count += 1;
        Ok(())
    }

    pub fn release_connection(&self, ip: IpAddr) {
        let _ = self
            .ws_connections
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                current.checked_sub(1)
            });

        if let Entry::Occupied(mut entry) = self.ip_connections.entry(ip) {
            if *entry.get() <= 1 {
                entry.remove();
            } else {
                *entry.get_mut() -= 1;
            }
        }
    }

    pub fn ws_connection_count(&self) -> usize {
        self.ws_connections.load(Ordering::Acquire)
    }

    pub fn ip_connection_count(&self, ip: &IpAddr) -> u32 {
        self.ip_connections.get(ip).map(|count| *count).unwrap_or(0)
    }
}
