//! HTTP client for the Meridian daemon

use crate::error::{ClientError, Result};
use meridian_types::{
    ConfigDocument, ConfigRequest, InstanceId, InstanceKey, InstanceRecord, InstanceStatus, Lease,
    RegisterRequest, RegistrySnapshot, ServiceInstances, ServiceName, StatusUpdate,
};
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode, Url};
use serde::de::DeserializeOwned;
use std::fmt;
use std::time::Duration;

/// Basic-auth credentials
#[derive(Clone)]
pub struct ClientCredentials {
    pub username: String,
    pub password: String,
}

impl fmt::Debug for ClientCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientCredentials")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

/// HTTP client for communicating with a Meridian daemon
pub struct MeridianClient {
    client: Client,
    base_url: Url,
    credentials: Option<ClientCredentials>,
}

impl MeridianClient {
    /// Create a new client; every request is bounded by `timeout`
    pub fn new(
        endpoint: &str,
        timeout: Duration,
        credentials: Option<ClientCredentials>,
    ) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        let base_url = Url::parse(endpoint.trim_end_matches('/'))
            .map_err(|e| ClientError::InvalidUrl(format!("{}: {}", endpoint, e)))?;
        if base_url.cannot_be_a_base() {
            return Err(ClientError::InvalidUrl(endpoint.to_string()));
        }

        Ok(Self {
            client,
            base_url,
            credentials,
        })
    }

    pub fn endpoint(&self) -> &str {
        self.base_url.as_str()
    }

    // ========== Registry API ==========

    /// Register (or re-register) an instance
    pub async fn register(
        &self,
        service: &ServiceName,
        id: &InstanceId,
        body: &RegisterRequest,
    ) -> Result<()> {
        let url = self.url(&["instances", service.as_str(), id.as_str()])?;
        let response = self.request(Method::PUT, url).json(body).send().await?;
        check(response).await?;
        Ok(())
    }

    /// Renew a lease; `NotRegistered` tells the caller to register again
    pub async fn renew(&self, service: &ServiceName, id: &InstanceId) -> Result<Lease> {
        let url = self.url(&["instances", service.as_str(), id.as_str(), "renew"])?;
        let response = self.request(Method::PUT, url).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(ClientError::NotRegistered(InstanceKey::new(
                service.clone(),
                id.clone(),
            )));
        }
        json(check(response).await?).await
    }

    /// Change an instance's status
    pub async fn set_status(
        &self,
        service: &ServiceName,
        id: &InstanceId,
        status: InstanceStatus,
    ) -> Result<InstanceRecord> {
        let url = self.url(&["instances", service.as_str(), id.as_str(), "status"])?;
        let response = self
            .request(Method::PUT, url)
            .json(&StatusUpdate { status })
            .send()
            .await?;
        json(check(response).await?).await
    }

    /// Remove an instance
    pub async fn deregister(&self, service: &ServiceName, id: &InstanceId) -> Result<()> {
        let url = self.url(&["instances", service.as_str(), id.as_str()])?;
        let response = self.request(Method::DELETE, url).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(ClientError::NotRegistered(InstanceKey::new(
                service.clone(),
                id.clone(),
            )));
        }
        check(response).await?;
        Ok(())
    }

    /// Full registry snapshot; `None` when `known_version` is still current
    pub async fn instances(&self, known_version: Option<u64>) -> Result<Option<RegistrySnapshot>> {
        let url = self.url(&["instances"])?;
        self.get_versioned(url, known_version).await
    }

    /// One service's instances; `None` when `known_version` is still current
    pub async fn service_instances(
        &self,
        service: &ServiceName,
        known_version: Option<u64>,
    ) -> Result<Option<ServiceInstances>> {
        let url = self.url(&["instances", service.as_str()])?;
        self.get_versioned(url, known_version).await
    }

    // ========== Config API ==========

    /// Resolve configuration for a request
    pub async fn config(&self, request: &ConfigRequest) -> Result<ConfigDocument> {
        let profiles = if request.profiles.is_empty() {
            meridian_types::config::DEFAULT_PROFILE.to_string()
        } else {
            request.profiles.join(",")
        };

        let mut segments = vec!["config", request.application.as_str(), profiles.as_str()];
        if let Some(label) = &request.label {
            segments.push(label.as_str());
        }

        let url = self.url(&segments)?;
        let response = self.request(Method::GET, url).send().await?;
        json(check(response).await?).await
    }

    // ========== Probes ==========

    /// Daemon health
    pub async fn health(&self) -> Result<serde_json::Value> {
        let url = self.url(&["health"])?;
        let response = self.client.get(url).send().await?;
        json(check(response).await?).await
    }

    async fn get_versioned<T: DeserializeOwned>(
        &self,
        mut url: Url,
        known_version: Option<u64>,
    ) -> Result<Option<T>> {
        if let Some(version) = known_version {
            url.query_pairs_mut()
                .append_pair("known_version", &version.to_string());
        }

        let response = self.request(Method::GET, url).send().await?;
        if response.status() == StatusCode::NOT_MODIFIED {
            return Ok(None);
        }
        Ok(Some(json(check(response).await?).await?))
    }

    fn url(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| ClientError::InvalidUrl(self.base_url.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        let builder = self.client.request(method, url);
        match &self.credentials {
            Some(c) => builder.basic_auth(&c.username, Some(&c.password)),
            None => builder,
        }
    }
}

/// Map non-success statuses to errors
async fn check(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    if status == StatusCode::UNAUTHORIZED {
        return Err(ClientError::Unauthorized);
    }

    let text = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<serde_json::Value>(&text)
        .ok()
        .and_then(|v| v.get("error").and_then(|e| e.as_str()).map(str::to_string))
        .unwrap_or(text);

    Err(ClientError::Status {
        status: status.as_u16(),
        message,
    })
}

async fn json<T: DeserializeOwned>(response: Response) -> Result<T> {
    Ok(response.json::<T>().await?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(endpoint: &str) -> MeridianClient {
        MeridianClient::new(endpoint, Duration::from_secs(1), None).unwrap()
    }

    #[test]
    fn test_url_building_escapes_segments() {
        let client = client("http://registry:8761/");
        let url = client.url(&["instances", "orders", "A 1"]).unwrap();
        assert_eq!(url.as_str(), "http://registry:8761/instances/orders/A%201");
    }

    #[test]
    fn test_url_keeps_base_path() {
        let client = client("http://gateway/meridian");
        let url = client.url(&["health"]).unwrap();
        assert_eq!(url.as_str(), "http://gateway/meridian/health");
    }

    #[test]
    fn test_rejects_bad_endpoint() {
        assert!(matches!(
            MeridianClient::new("not a url", Duration::from_secs(1), None),
            Err(ClientError::InvalidUrl(_))
        ));
    }
}
