//! HTTP client for the tidepool control plane.

use std::time::Duration;

use reqwest::{Client, Method};
use serde::de::DeserializeOwned;
use tidepool_core::models::{SandboxInfo, SandboxRequest};
use tidepool_server::{EmptyResponse, ErrorResponse};

use crate::{TidepoolCliError, TidepoolCliResult};

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// A client for one control plane.
#[derive(Debug, Clone)]
pub struct TidepoolClient {
    base_url: String,
    http: Client,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl TidepoolClient {
    /// Creates a client for the control plane at `server`.
    ///
    /// `server` is either a `host:port` pair or a full `http://` or `https://` URL.
    pub fn new(server: &str, timeout: Duration) -> TidepoolCliResult<Self> {
        let server = server.trim().trim_end_matches('/');
        if server.is_empty() {
            return Err(TidepoolCliError::InvalidArgument(
                "empty server address".to_string(),
            ));
        }

        let base_url = if server.starts_with("http://") || server.starts_with("https://") {
            server.to_string()
        } else {
            format!("http://{}", server)
        };

        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self { base_url, http })
    }

    /// The URL requests are sent to.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Creates a sandbox.
    pub async fn create(&self, request: &SandboxRequest) -> TidepoolCliResult<SandboxInfo> {
        self.send(Method::POST, "/create", Some(request)).await
    }

    /// Removes the sandbox addressed by `request`.
    pub async fn remove(&self, request: &SandboxRequest) -> TidepoolCliResult<()> {
        let _: EmptyResponse = self.send(Method::POST, "/remove", Some(request)).await?;
        Ok(())
    }

    /// Lists the sandboxes matching the non-zero fields of `request`.
    pub async fn list(&self, request: &SandboxRequest) -> TidepoolCliResult<Vec<SandboxInfo>> {
        self.send(Method::POST, "/list", Some(request)).await
    }

    /// Purges expired sandboxes and returns the ones selected for removal.
    pub async fn purge(&self) -> TidepoolCliResult<Vec<SandboxInfo>> {
        self.send(Method::POST, "/purge", None).await
    }

    async fn send<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<&SandboxRequest>,
    ) -> TidepoolCliResult<T> {
        let url = format!("{}{}", self.base_url, path);
        tracing::debug!("> {} {}", method, url);

        let mut request = self.http.request(method, &url);
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await?;
        let status = response.status();
        tracing::debug!("< {} {}", status, url);

        if !status.is_success() {
            let message = match response.json::<ErrorResponse>().await {
                Ok(body) => body.error,
                Err(_) => status.canonical_reason().unwrap_or_default().to_string(),
            };

            return Err(TidepoolCliError::BadStatus {
                status: status.as_u16(),
                message,
            });
        }

        Ok(response.json().await?)
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{DateTime, Utc};
    use tidepool_core::{management::Lifecycle, runtime::memory::MemoryRuntime};
    use tidepool_server::{route, AppState, Config};
    use tokio::net::TcpListener;

    use super::*;

    const T0: i64 = 1_700_000_000;

    async fn start_server() -> anyhow::Result<(Arc<MemoryRuntime>, TidepoolClient)> {
        let created: DateTime<Utc> = DateTime::from_timestamp(T0, 0).unwrap();
        let runtime = Arc::new(MemoryRuntime::new(created));

        let config = Config::default();
        let lifecycle = Lifecycle::new(
            runtime.clone(),
            config.port_pool()?,
            config.lifecycle_settings(),
        );
        let app = route::create_router(AppState::new(Arc::new(config), Arc::new(lifecycle)));

        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        tokio::spawn(async move { axum::serve(listener, app).await });

        let client = TidepoolClient::new(&addr.to_string(), Duration::from_secs(5))?;
        Ok((runtime, client))
    }

    #[test]
    fn test_base_url() {
        let timeout = Duration::from_secs(1);
        let client = TidepoolClient::new("127.0.0.1:9998", timeout).unwrap();
        assert_eq!(client.base_url(), "http://127.0.0.1:9998");

        let client = TidepoolClient::new("https://pool.example.com/", timeout).unwrap();
        assert_eq!(client.base_url(), "https://pool.example.com");

        assert!(TidepoolClient::new("  ", timeout).is_err());
    }

    #[test_log::test(tokio::test)]
    async fn test_round_trip_against_server() -> anyhow::Result<()> {
        let (runtime, client) = start_server().await?;

        let mut request = SandboxRequest::new(0, "web");
        request.token = "4:secret".to_string();
        request.image = "nginx".to_string();
        request.port = 80;

        let info = client.create(&request).await?;
        assert_eq!(info.name, "tidepool_4_web_1");
        assert_eq!(info.port, 10000);

        let listed = client.list(&SandboxRequest::new(4, "")).await?;
        assert_eq!(listed, vec![info]);

        client.remove(&SandboxRequest::new(4, "web")).await?;
        assert!(runtime.names().is_empty());
        assert!(client.purge().await?.is_empty());

        Ok(())
    }

    #[test_log::test(tokio::test)]
    async fn test_error_body_becomes_bad_status() -> anyhow::Result<()> {
        let (_, client) = start_server().await?;

        match client.remove(&SandboxRequest::new(4, "missing")).await {
            Err(TidepoolCliError::BadStatus { status, message }) => {
                assert_eq!(status, 404);
                assert!(!message.is_empty());
            }
            other => panic!("expected a bad status, got {:?}", other),
        }

        Ok(())
    }
}
