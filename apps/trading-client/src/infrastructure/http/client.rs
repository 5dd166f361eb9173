//! HTTP client for the trading server.
//!
//! One attempt per call. Retrying a place or cancel could duplicate it, so
//! that decision is left to the caller.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method};
use serde::Serialize;
use serde::de::DeserializeOwned;

use super::api_types::error_detail;
use crate::application::ports::{CommandTransport, TransportError};
use crate::domain::trading::{Instrument, Order, OrderId, OrderRequest, Portfolio, Trade};

/// Header carrying the API key.
const API_KEY_HEADER: &str = "x-api-key";

/// Connection settings for the REST API.
#[derive(Clone)]
pub struct HttpConfig {
    /// Base URL including the version prefix, e.g. `http://localhost:8000/api/v1`.
    pub base_url: String,
    /// API key sent with every request.
    pub api_key: String,
    /// Per-request timeout.
    pub timeout: Duration,
}

impl fmt::Debug for HttpConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &"[REDACTED]")
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// `reqwest`-backed [`CommandTransport`].
#[derive(Clone)]
pub struct HttpCommandTransport {
    client: Client,
    base_url: String,
    api_key: String,
}

impl fmt::Debug for HttpCommandTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpCommandTransport")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl HttpCommandTransport {
    /// Build a transport from config.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Network`] if the HTTP client cannot be built.
    pub fn new(config: &HttpConfig) -> Result<Self, TransportError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| TransportError::Network(e.to_string()))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
        })
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, TransportError> {
        self.request(Method::GET, path, None::<&()>).await
    }

    async fn post<T: DeserializeOwned, B: Serialize + Sync>(
        &self,
        path: &str,
        body: Option<&B>,
    ) -> Result<T, TransportError> {
        self.request(Method::POST, path, body).await
    }

    async fn request<T: DeserializeOwned, B: Serialize + Sync>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> Result<T, TransportError> {
        let url = format!("{}{path}", self.base_url);
        let mut request = self
            .client
            .request(method.clone(), &url)
            .header(API_KEY_HEADER, &self.api_key);
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await.map_err(|e| {
            tracing::warn!(method = %method, path, error = %e, "Request failed");
            TransportError::Network(e.to_string())
        })?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| TransportError::Network(e.to_string()))?;

        if status.is_success() {
            return serde_json::from_str(&text).map_err(|e| TransportError::Decode(e.to_string()));
        }

        let detail = error_detail(&text);
        tracing::debug!(
            method = %method,
            path,
            status = status.as_u16(),
            detail = %detail,
            "Server returned error"
        );
        Err(TransportError::Status {
            status: status.as_u16(),
            detail,
        })
    }
}

#[async_trait]
impl CommandTransport for HttpCommandTransport {
    async fn place_order(&self, request: &OrderRequest) -> Result<Order, TransportError> {
        self.post("/orders", Some(request)).await
    }

    async fn cancel_order(&self, order_id: &OrderId) -> Result<Order, TransportError> {
        self.post(&format!("/orders/{order_id}/cancel"), None::<&()>)
            .await
    }

    async fn get_order(&self, order_id: &OrderId) -> Result<Order, TransportError> {
        self.get(&format!("/orders/{order_id}")).await
    }

    async fn get_portfolio(&self) -> Result<Portfolio, TransportError> {
        self.get("/portfolio").await
    }

    async fn get_trades(&self) -> Result<Vec<Trade>, TransportError> {
        self.get("/trades").await
    }

    async fn get_instruments(&self) -> Result<Vec<Instrument>, TransportError> {
        self.get("/instruments").await
    }

    async fn get_instrument(&self, symbol: &str) -> Result<Instrument, TransportError> {
        self.get(&format!("/instruments/{symbol}")).await
    }
}
