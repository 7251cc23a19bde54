//! Request/response channel to the node's HTTP API.

use std::collections::BTreeMap;

use hydra_core::{HydraError, Result, TransportError};
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde_json::Value as Json;
use tracing::{debug, warn};

use crate::config::ClientConfig;

/// Thin JSON client for the node's HTTP endpoints.
#[derive(Clone)]
pub struct HttpChannel {
    config: ClientConfig,
    client: reqwest::Client,
}

impl HttpChannel {
    pub fn new(config: &ClientConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| HydraError::Internal(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            config: config.clone(),
            client,
        })
    }

    pub async fn get(&self, path: &str) -> Result<Json> {
        let url = self.config.endpoint(path);
        self.execute(Method::GET, &url, self.client.get(&url)).await
    }

    /// POST a JSON body. Sets `Content-Type: application/json`.
    pub async fn post(&self, path: &str, body: &Json) -> Result<Json> {
        self.post_with_headers(path, body, &[]).await
    }

    /// POST a JSON body with extra request headers.
    ///
    /// A malformed header surfaces as a request failure.
    pub async fn post_with_headers(
        &self,
        path: &str,
        body: &Json,
        headers: &[(&str, &str)],
    ) -> Result<Json> {
        let url = self.config.endpoint(path);
        let request = headers
            .iter()
            .fold(self.client.post(&url).json(body), |request, (name, value)| {
                request.header(*name, *value)
            });
        self.execute(Method::POST, &url, request).await
    }

    async fn execute(&self, method: Method, url: &str, request: RequestBuilder) -> Result<Json> {
        debug!(%method, url, "HTTP request");
        let response = request.send().await.map_err(|e| {
            warn!(%method, url, error = %e, "HTTP request failed");
            TransportError::Request {
                method: method.to_string(),
                url: url.to_string(),
                message: e.to_string(),
            }
        })?;
        read_response(&method, url, response).await
    }
}

async fn read_response(method: &Method, url: &str, response: Response) -> Result<Json> {
    let status = response.status();
    let headers: BTreeMap<String, String> = response
        .headers()
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|value| (name.as_str().to_string(), value.to_string()))
        })
        .collect();
    let body = response.text().await.map_err(|e| TransportError::Request {
        method: method.to_string(),
        url: url.to_string(),
        message: format!("failed to read body: {e}"),
    })?;

    if status != StatusCode::OK && status != StatusCode::ACCEPTED {
        warn!(%method, url, status = status.as_u16(), "HTTP request rejected");
        return Err(TransportError::Status {
            status: status.as_u16(),
            body,
            headers,
        }
        .into());
    }

    if body.trim().is_empty() {
        return Ok(Json::Null);
    }
    // Some endpoints answer with bare text.
    Ok(serde_json::from_str(&body).unwrap_or(Json::String(body)))
}
