//! Reqwest-backed implementation of the engine's outbound HTTP capability
//!
//! API nodes and smart-button actions perform their external calls through
//! this fetcher. Connection and response failures are mapped to
//! [`EngineError::ExternalApiFailure`] so the engine's local-recovery policy
//! applies uniformly.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use async_trait::async_trait;
use reqwest::{Client, Method};
use serde_json::Value;
use std::str::FromStr;
use std::time::Duration;
use tracing::debug;

use chatflow_core::{ApiRequest, EngineError, HttpFetcher};

/// An [`HttpFetcher`] backed by a shared reqwest client
#[derive(Debug, Clone)]
pub struct ReqwestFetcher {
    client: Client,
}

impl ReqwestFetcher {
    /// Create a fetcher with sensible request and connect timeouts
    pub fn new() -> Result<Self, EngineError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| EngineError::ExternalApiFailure(format!("client build failed: {}", e)))?;
        Ok(Self { client })
    }

    /// Wrap an existing client, e.g. one shared with other subsystems
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl HttpFetcher for ReqwestFetcher {
    async fn fetch(&self, request: &ApiRequest) -> Result<Value, EngineError> {
        let method = Method::from_str(&request.method).map_err(|_| {
            EngineError::ExternalApiFailure(format!("invalid HTTP method: {}", request.method))
        })?;

        debug!(method = %method, url = %request.url, "Performing external API call");

        let mut builder = self.client.request(method.clone(), &request.url);

        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }

        if method != Method::GET && method != Method::HEAD {
            if let Some(body) = &request.body {
                builder = builder.json(body);
            }
        }

        let response = builder.send().await.map_err(|e| {
            EngineError::ExternalApiFailure(format!("request failed: {}", e))
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(EngineError::ExternalApiFailure(format!(
                "unexpected status {} from {}",
                status, request.url
            )));
        }

        response.json::<Value>().await.map_err(|e| {
            EngineError::ExternalApiFailure(format!("invalid JSON response: {}", e))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chatflow_core::ApiRequestSpec;

    #[tokio::test]
    async fn test_invalid_method_rejected() {
        let fetcher = ReqwestFetcher::new().unwrap();
        let spec = ApiRequestSpec {
            url: "https://example.com".to_string(),
            method: Some("NOT A METHOD".to_string()),
            ..Default::default()
        };
        let request = ApiRequest::from_spec(&spec, spec.url.clone());

        let err = fetcher.fetch(&request).await.unwrap_err();
        match err {
            EngineError::ExternalApiFailure(msg) => assert!(msg.contains("invalid HTTP method")),
            other => panic!("Expected ExternalApiFailure, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_connection_failure_is_external_api_failure() {
        let fetcher = ReqwestFetcher::new().unwrap();
        // Nothing listens on the discard port locally
        let spec = ApiRequestSpec {
            url: "http://127.0.0.1:9/".to_string(),
            ..Default::default()
        };
        let request = ApiRequest::from_spec(&spec, spec.url.clone());

        let err = fetcher.fetch(&request).await.unwrap_err();
        assert!(matches!(err, EngineError::ExternalApiFailure(_)));
    }
}
