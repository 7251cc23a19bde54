//! Client configuration.

use std::time::Duration;

/// Default bound on how long `send` waits for the transport.
pub const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_secs(5);

/// Default timeout for HTTP requests.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Connection settings for one Hydra node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Base URL of the node's HTTP API.
    pub http_url: String,
    /// Explicit WebSocket base URL. Derived from `http_url` when absent.
    pub ws_url: Option<String>,
    /// Ask the node to replay its message history on connect.
    pub history: bool,
    /// Restrict the message stream to one address.
    pub address: Option<String>,
    pub send_timeout: Duration,
    pub request_timeout: Duration,
}

impl ClientConfig {
    pub fn new(http_url: impl Into<String>) -> Self {
        Self {
            http_url: http_url.into().trim_end_matches('/').to_string(),
            ws_url: None,
            history: false,
            address: None,
            send_timeout: DEFAULT_SEND_TIMEOUT,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    pub fn with_history(mut self, history: bool) -> Self {
        self.history = history;
        self
    }

    pub fn with_address(mut self, address: impl Into<String>) -> Self {
        self.address = Some(address.into());
        self
    }

    pub fn with_ws_url(mut self, ws_url: impl Into<String>) -> Self {
        self.ws_url = Some(ws_url.into().trim_end_matches('/').to_string());
        self
    }

    pub fn with_send_timeout(mut self, timeout: Duration) -> Self {
        self.send_timeout = timeout;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// URL of the node's message stream.
    pub fn websocket_url(&self) -> String {
        let base = match &self.ws_url {
            Some(ws_url) => ws_url.clone(),
            None => self
                .http_url
                .strip_prefix("http")
                .map(|rest| format!("ws{rest}"))
                .unwrap_or_else(|| self.http_url.clone()),
        };
        let history = if self.history { "yes" } else { "no" };
        match &self.address {
            Some(address) => format!("{base}/?history={history}&address={address}"),
            None => format!("{base}/?history={history}"),
        }
    }

    /// Absolute URL of an HTTP endpoint.
    pub fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.http_url, path.trim_start_matches('/'))
    }
}
