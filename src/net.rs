use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{debug, info};

use crate::config::{Config, HealthEndpoint};
use crate::error::{Error, Result};
use crate::types::{
    ActionReply, Device, HealthRefreshRequest, PingReply, ReleaseRequest, ReserveRequest,
    SnapshotPayload,
};

/// The reservation backend as the client sees it.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Full device snapshot
    async fn list_devices(&self) -> Result<Vec<Device>>;

    /// `Err(Error::Rejected)` carries the server's reason
    async fn reserve(&self, request: &ReserveRequest) -> Result<()>;

    async fn release(&self, device_id: &str) -> Result<()>;

    /// Whether the device answered a liveness check
    async fn ping(&self, device_id: &str) -> Result<bool>;
}

#[derive(Debug, Clone)]
pub struct HttpBackend {
    client: Client,
    backend_url: String,
    health_endpoint: HealthEndpoint,
}

impl HttpBackend {
    pub fn new(config: &Config) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| Error::transport(&config.backend_url, e))?;
        Ok(Self::with_client(client, config))
    }

    pub fn with_client(client: Client, config: &Config) -> Self {
        Self {
            client,
            backend_url: config.backend_url.trim_end_matches('/').to_string(),
            health_endpoint: config.health_endpoint,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.backend_url, path)
    }
}

/// Parses the body whatever the status: the backend answers 4xx with a
/// `{ok: false, error}` body that has to reach the user.
async fn read_reply<T: DeserializeOwned>(url: &str, response: Response) -> Result<T> {
    let status = response.status();
    let text = response
        .text()
        .await
        .map_err(|e| Error::transport(url, e))?;
    match serde_json::from_str(&text) {
        Ok(reply) => Ok(reply),
        Err(_) if !status.is_success() => Err(Error::Status {
            url: url.to_string(),
            status: status.as_u16(),
        }),
        Err(e) => Err(Error::Decode(e)),
    }
}

#[async_trait]
impl Backend for HttpBackend {
    async fn list_devices(&self) -> Result<Vec<Device>> {
        let url = self.url("/api/devices");
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| Error::transport(&url, e))?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::Status {
                url,
                status: status.as_u16(),
            });
        }
        let text = response
            .text()
            .await
            .map_err(|e| Error::transport(&url, e))?;
        let devices = SnapshotPayload::parse(&text)?;
        debug!(count = devices.len(), "fetched device list");
        Ok(devices)
    }

    async fn reserve(&self, request: &ReserveRequest) -> Result<()> {
        let url = self.url("/api/reserve");
        let response = self
            .client
            .post(&url)
            .json(request)
            .send()
            .await
            .map_err(|e| Error::transport(&url, e))?;
        read_reply::<ActionReply>(&url, response).await?.into_result()?;
        info!(
            device_id = %request.device_id,
            owner = %request.owner,
            minutes = request.duration_minutes,
            "reservation accepted"
        );
        Ok(())
    }

    async fn release(&self, device_id: &str) -> Result<()> {
        let url = self.url("/api/release");
        let body = ReleaseRequest {
            device_id: device_id.to_string(),
        };
        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::transport(&url, e))?;
        read_reply::<ActionReply>(&url, response).await?.into_result()?;
        info!(device_id, "release accepted");
        Ok(())
    }

    async fn ping(&self, device_id: &str) -> Result<bool> {
        let (url, request) = match self.health_endpoint {
            HealthEndpoint::Ping => {
                let url = self.url("/api/ping");
                let request = self.client.get(&url).query(&[("device", device_id)]);
                (url, request)
            }
            HealthEndpoint::Refresh => {
                let url = self.url("/api/refresh_health");
                let request = self.client.post(&url).json(&HealthRefreshRequest {
                    device_id: device_id.to_string(),
                });
                (url, request)
            }
        };
        let response = request.send().await.map_err(|e| Error::transport(&url, e))?;
        let reply: PingReply = read_reply(&url, response).await?;
        if !reply.ok {
            return Err(Error::Rejected(
                reply.error.unwrap_or_else(|| "ping rejected".to_string()),
            ));
        }
        Ok(reply.is_up())
    }
}
