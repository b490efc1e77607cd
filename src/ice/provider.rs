//! TURN/STUN credential provider.
//!
//! Flow:
//! 1. GET the credentials endpoint (JSON array of ICE server descriptors)
//! 2. Prepend the public STUN default
//! 3. On any failure fall back to the STUN default alone
//!
//! The last known list is kept in memory so the next peer connection is
//! built from it. A server push (`ice-servers` message) replaces it.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use http_body_util::{BodyExt, Empty};
use hyper::{Method, Request};
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use log::{debug, info, warn};
use parking_lot::Mutex;

use super::{default_stun_server, with_default_stun, IceServerConfig};
use crate::error::{Result, SessionError};

/// Source of server-issued ICE credentials.
#[async_trait]
pub trait CredentialFetcher: Send + Sync {
    async fn fetch_credentials(&self) -> Result<Vec<IceServerConfig>>;
}

/// Fetches credentials with an HTTPS GET.
pub struct HttpCredentialFetcher {
    endpoint_url: String,
}

impl HttpCredentialFetcher {
    pub fn new(endpoint_url: &str) -> Self {
        Self {
            endpoint_url: endpoint_url.to_string(),
        }
    }
}

#[async_trait]
impl CredentialFetcher for HttpCredentialFetcher {
    async fn fetch_credentials(&self) -> Result<Vec<IceServerConfig>> {
        let https = hyper_rustls::HttpsConnectorBuilder::new()
            .with_webpki_roots()
            .https_or_http()
            .enable_http1()
            .build();

        let client: Client<_, Empty<Bytes>> = Client::builder(TokioExecutor::new()).build(https);

        let request = Request::builder()
            .method(Method::GET)
            .uri(&self.endpoint_url)
            .header("Accept", "application/json")
            .body(Empty::new())
            .map_err(|e| SessionError::IceFetch(format!("failed to build request: {}", e)))?;

        let response = client
            .request(request)
            .await
            .map_err(|e| SessionError::IceFetch(format!("request failed: {}", e)))?;

        let status = response.status();

        let body_bytes = response
            .into_body()
            .collect()
            .await
            .map_err(|e| SessionError::IceFetch(format!("failed to read body: {}", e)))?
            .to_bytes();

        if !status.is_success() {
            return Err(SessionError::IceFetch(format!(
                "server returned {}: {}",
                status,
                String::from_utf8_lossy(&body_bytes)
            )));
        }

        parse_credentials(&body_bytes)
    }
}

/// Parse the credentials body: a JSON array of ICE server descriptors.
pub fn parse_credentials(body: &[u8]) -> Result<Vec<IceServerConfig>> {
    serde_json::from_slice::<Vec<IceServerConfig>>(body)
        .map_err(|e| SessionError::IceFetch(format!("malformed body: {}", e)))
}

/// Keeps the ICE server list the next peer connection will use.
pub struct IceServerProvider {
    fetcher: Arc<dyn CredentialFetcher>,
    timeout: Duration,
    servers: Mutex<Vec<IceServerConfig>>,
}

impl IceServerProvider {
    pub fn new(fetcher: Arc<dyn CredentialFetcher>, timeout: Duration) -> Self {
        Self {
            fetcher,
            timeout,
            servers: Mutex::new(vec![default_stun_server()]),
        }
    }

    /// Fetch fresh credentials. Never fails and never returns an empty list:
    /// on error the result is the STUN default alone.
    pub async fn fetch(&self) -> Vec<IceServerConfig> {
        let fetched = match tokio::time::timeout(self.timeout, self.fetcher.fetch_credentials()).await {
            Ok(Ok(servers)) => {
                info!("Fetched {} ICE server(s) from credentials endpoint", servers.len());
                with_default_stun(servers)
            }
            Ok(Err(e)) => {
                warn!("ICE server fetch failed, using STUN only: {}", e);
                vec![default_stun_server()]
            }
            Err(_) => {
                warn!("ICE server fetch timed out after {:?}, using STUN only", self.timeout);
                vec![default_stun_server()]
            }
        };

        *self.servers.lock() = fetched.clone();
        fetched
    }

    /// Replace the in-memory list with a server-pushed one.
    ///
    /// Only peer connections created afterwards see the new list.
    pub fn apply_server_push(&self, servers: Vec<IceServerConfig>) {
        let merged = with_default_stun(servers);
        debug!("ICE server list replaced by server push ({} entries)", merged.len());
        *self.servers.lock() = merged;
    }

    /// The list the next peer connection should be built with.
    pub fn current(&self) -> Vec<IceServerConfig> {
        self.servers.lock().clone()
    }
}
