//! Outbound HTTP capability and API request/response mapping types
//!
//! API nodes and smart-button actions describe their external calls with an
//! [`ApiRequestSpec`]; the engine resolves the URL template into a concrete
//! [`ApiRequest`] and hands it to an injected [`HttpFetcher`], keeping the
//! engine itself off the network in tests.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

use crate::EngineError;

/// An external HTTP request as authored in node/button configuration.
///
/// The `url` may embed `{{variableName}}` placeholders resolved against the
/// session's variable bindings before the call is made.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ApiRequestSpec {
    /// URL template, possibly containing `{{name}}` placeholders
    pub url: String,

    /// HTTP method, defaults to GET
    pub method: Option<String>,

    /// Extra request headers
    pub headers: HashMap<String, String>,

    /// Optional JSON request body
    pub body: Option<Value>,
}

impl Default for ApiRequestSpec {
    fn default() -> Self {
        Self {
            url: String::new(),
            method: None,
            headers: HashMap::new(),
            body: None,
        }
    }
}

/// A fully resolved request ready to be performed
#[derive(Debug, Clone)]
pub struct ApiRequest {
    /// Concrete URL with all placeholders substituted
    pub url: String,

    /// HTTP method, uppercase
    pub method: String,

    /// Request headers
    pub headers: HashMap<String, String>,

    /// Optional JSON request body
    pub body: Option<Value>,
}

impl ApiRequest {
    /// Build a resolved request from a spec and a substituted URL
    pub fn from_spec(spec: &ApiRequestSpec, url: String) -> Self {
        Self {
            url,
            method: spec
                .method
                .as_deref()
                .unwrap_or("GET")
                .to_ascii_uppercase(),
            headers: spec.headers.clone(),
            body: spec.body.clone(),
        }
    }
}

/// How an API response is turned into an outbound message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ApiResponseKind {
    /// Send the mapped value as a text message
    #[default]
    Text,
    /// Send a media message built from named response fields
    Media,
}

/// Field mapping applied to a successful API response
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct ResponseMapping {
    /// Optional key used to narrow the response object before mapping
    pub response_key: Option<String>,

    /// Whether the mapped response becomes text or media
    pub kind: ApiResponseKind,

    /// Response field holding the media URL (media responses)
    pub media_url_field: Option<String>,

    /// Response field holding the caption (media responses)
    pub caption_field: Option<String>,
}

impl ResponseMapping {
    /// Narrow a response by the configured key, if any.
    ///
    /// A configured key that is absent from the response is a mapping
    /// failure, not a silent fallback to the whole body.
    pub fn narrow(&self, response: &Value) -> Result<Value, EngineError> {
        match &self.response_key {
            Some(key) => response.get(key).cloned().ok_or_else(|| {
                EngineError::ExternalApiFailure(format!(
                    "response key not found in payload: {}",
                    key
                ))
            }),
            None => Ok(response.clone()),
        }
    }

    /// Extract the media URL and caption from a narrowed response
    pub fn media_fields(&self, narrowed: &Value) -> Result<(String, Option<String>), EngineError> {
        let url_field = self.media_url_field.as_deref().unwrap_or("url");
        let url = narrowed
            .get(url_field)
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .ok_or_else(|| {
                EngineError::ExternalApiFailure(format!(
                    "media url field not found in response: {}",
                    url_field
                ))
            })?;

        let caption = self
            .caption_field
            .as_deref()
            .and_then(|field| narrowed.get(field))
            .and_then(|v| v.as_str())
            .map(str::to_string);

        Ok((url, caption))
    }
}

/// Capability for performing external HTTP calls
#[async_trait]
pub trait HttpFetcher: Send + Sync {
    /// Perform the request and return the JSON response body
    async fn fetch(&self, request: &ApiRequest) -> Result<Value, EngineError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_spec_defaults() {
        let spec: ApiRequestSpec = serde_json::from_value(json!({
            "url": "https://api.example.com/users/{{userId}}"
        }))
        .unwrap();

        assert_eq!(spec.url, "https://api.example.com/users/{{userId}}");
        assert_eq!(spec.method, None);
        assert!(spec.headers.is_empty());
        assert!(spec.body.is_none());

        let request = ApiRequest::from_spec(&spec, "https://api.example.com/users/42".to_string());
        assert_eq!(request.method, "GET");
        assert_eq!(request.url, "https://api.example.com/users/42");
    }

    #[test]
    fn test_method_uppercased() {
        let spec: ApiRequestSpec = serde_json::from_value(json!({
            "url": "https://api.example.com/orders",
            "method": "post"
        }))
        .unwrap();

        let request = ApiRequest::from_spec(&spec, spec.url.clone());
        assert_eq!(request.method, "POST");
    }

    #[test]
    fn test_narrow_with_key() {
        let mapping: ResponseMapping = serde_json::from_value(json!({
            "responseKey": "result"
        }))
        .unwrap();

        let narrowed = mapping
            .narrow(&json!({"result": {"message": "hello"}, "status": "ok"}))
            .unwrap();
        assert_eq!(narrowed, json!({"message": "hello"}));

        // Missing key is a mapping failure
        let err = mapping.narrow(&json!({"status": "ok"})).unwrap_err();
        match err {
            EngineError::ExternalApiFailure(msg) => assert!(msg.contains("result")),
            _ => panic!("Expected ExternalApiFailure"),
        }
    }

    #[test]
    fn test_narrow_without_key_passes_through() {
        let mapping = ResponseMapping::default();
        let body = json!({"anything": 1});
        assert_eq!(mapping.narrow(&body).unwrap(), body);
    }

    #[test]
    fn test_media_fields() {
        let mapping: ResponseMapping = serde_json::from_value(json!({
            "kind": "media",
            "mediaUrlField": "image",
            "captionField": "title"
        }))
        .unwrap();

        let (url, caption) = mapping
            .media_fields(&json!({"image": "https://cdn.example.com/a.png", "title": "A"}))
            .unwrap();
        assert_eq!(url, "https://cdn.example.com/a.png");
        assert_eq!(caption, Some("A".to_string()));

        // Caption is optional, the URL is not
        let (_, caption) = mapping
            .media_fields(&json!({"image": "https://cdn.example.com/b.png"}))
            .unwrap();
        assert_eq!(caption, None);

        let err = mapping.media_fields(&json!({"title": "no image"})).unwrap_err();
        match err {
            EngineError::ExternalApiFailure(msg) => assert!(msg.contains("image")),
            _ => panic!("Expected ExternalApiFailure"),
        }
    }
}
