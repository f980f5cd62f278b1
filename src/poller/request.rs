//! Authenticated HTTP request construction from declarative API descriptions
//!
//! One [`RequestBuilder`] wraps a shared `reqwest::Client` (fixed timeout,
//! gzip, default user-agent) and turns an [`ApiConfig`] plus the behavior's
//! current pagination parameters into a ready-to-send request.

use reqwest::{Client, Method};
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::Duration;
use url::Url;

use super::error::FetchError;
use crate::models::{ApiConfig, AuthConfig, HttpMethod};

/// Default timeout applied to every outbound request
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Builds and executes requests against polled source APIs
pub struct RequestBuilder {
    client: Client,
}

impl RequestBuilder {
    /// Create a builder with the default 30s timeout
    pub fn new() -> Result<Self, FetchError> {
        Self::with_timeout(DEFAULT_REQUEST_TIMEOUT)
    }

    /// Create a builder with a custom request timeout
    pub fn with_timeout(timeout: Duration) -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(timeout)
            .gzip(true)
            .user_agent(format!("inflow/{}", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self { client })
    }

    /// Compose a request from the API description and the pagination
    /// parameters for this page. Pagination parameters take precedence over
    /// declared query parameters on conflicting keys.
    pub fn build(
        &self,
        api: &ApiConfig,
        pagination_params: &BTreeMap<String, String>,
    ) -> Result<reqwest::RequestBuilder, FetchError> {
        let url = Url::parse(&api.endpoint)
            .map_err(|e| FetchError::InvalidUrl(format!("{}: {e}", api.endpoint)))?;

        let method = match api.method {
            HttpMethod::Get => Method::GET,
            HttpMethod::Post => Method::POST,
        };

        let mut params = api.query_params.clone();
        for (key, value) in pagination_params {
            params.insert(key.clone(), value.clone());
        }

        let mut request = self.client.request(method, url);

        if !params.is_empty() {
            request = request.query(&params.iter().collect::<Vec<_>>());
        }

        for (name, value) in &api.headers {
            request = request.header(name, value);
        }

        request = match &api.auth {
            AuthConfig::None => request,
            AuthConfig::Bearer { token } => request.bearer_auth(token),
            AuthConfig::Basic { username, password } => {
                request.basic_auth(username, Some(password))
            }
            AuthConfig::ApiKey { header, value } => request.header(header, value),
        };

        if api.method == HttpMethod::Post {
            if let Some(body) = &api.body {
                request = request.json(body);
            }
        }

        Ok(request)
    }

    /// Build, send, and parse one request as JSON
    pub async fn execute_json(
        &self,
        api: &ApiConfig,
        pagination_params: &BTreeMap<String, String>,
    ) -> Result<Value, FetchError> {
        let request = self.build(api, pagination_params)?;

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                FetchError::Timeout
            } else {
                FetchError::Http(e)
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::ServerError(status.as_u16()));
        }

        response
            .json::<Value>()
            .await
            .map_err(|e| FetchError::InvalidJson(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn api(endpoint: &str) -> ApiConfig {
        ApiConfig {
            endpoint: endpoint.to_string(),
            method: HttpMethod::Get,
            headers: BTreeMap::new(),
            query_params: BTreeMap::new(),
            body: None,
            auth: AuthConfig::None,
        }
    }

    #[test]
    fn test_invalid_url_rejected() {
        let builder = RequestBuilder::new().unwrap();
        let result = builder.build(&api("not a url"), &BTreeMap::new());
        assert!(matches!(result, Err(FetchError::InvalidUrl(_))));
    }

    #[test]
    fn test_pagination_params_take_precedence() {
        let builder = RequestBuilder::new().unwrap();
        let mut config = api("https://api.example.com/v1/feedback");
        config
            .query_params
            .insert("page".to_string(), "1".to_string());
        config
            .query_params
            .insert("status".to_string(), "open".to_string());

        let mut pagination = BTreeMap::new();
        pagination.insert("page".to_string(), "3".to_string());

        let request = builder.build(&config, &pagination).unwrap().build().unwrap();
        let pairs: BTreeMap<_, _> = request.url().query_pairs().into_owned().collect();

        assert_eq!(pairs.get("page").map(String::as_str), Some("3"));
        assert_eq!(pairs.get("status").map(String::as_str), Some("open"));
    }

    #[test]
    fn test_bearer_auth_header() {
        let builder = RequestBuilder::new().unwrap();
        let mut config = api("https://api.example.com/v1/feedback");
        config.auth = AuthConfig::Bearer {
            token: "t0k".to_string(),
        };

        let request = builder.build(&config, &BTreeMap::new()).unwrap().build().unwrap();
        let auth = request.headers().get("authorization").unwrap();
        assert_eq!(auth.to_str().unwrap(), "Bearer t0k");
    }

    #[test]
    fn test_api_key_header() {
        let builder = RequestBuilder::new().unwrap();
        let mut config = api("https://api.example.com/v1/feedback");
        config.auth = AuthConfig::ApiKey {
            header: "X-Api-Key".to_string(),
            value: "secret".to_string(),
        };

        let request = builder.build(&config, &BTreeMap::new()).unwrap().build().unwrap();
        assert_eq!(
            request.headers().get("X-Api-Key").unwrap().to_str().unwrap(),
            "secret"
        );
    }

    #[test]
    fn test_basic_auth_header() {
        let builder = RequestBuilder::new().unwrap();
        let mut config = api("https://api.example.com/v1/feedback");
        config.auth = AuthConfig::Basic {
            username: "user".to_string(),
            password: "pass".to_string(),
        };

        let request = builder.build(&config, &BTreeMap::new()).unwrap().build().unwrap();
        let auth = request.headers().get("authorization").unwrap();
        assert!(auth.to_str().unwrap().starts_with("Basic "));
    }

    #[test]
    fn test_post_body_attached() {
        let builder = RequestBuilder::new().unwrap();
        let mut config = api("https://api.example.com/v1/search");
        config.method = HttpMethod::Post;
        config.body = Some(serde_json::json!({"query": "feedback"}));

        let request = builder.build(&config, &BTreeMap::new()).unwrap().build().unwrap();
        assert_eq!(request.method(), Method::POST);
        assert!(request.body().is_some());
    }

    #[test]
    fn test_custom_headers_merged() {
        let builder = RequestBuilder::new().unwrap();
        let mut config = api("https://api.example.com/v1/feedback");
        config
            .headers
            .insert("Accept".to_string(), "application/json".to_string());

        let request = builder.build(&config, &BTreeMap::new()).unwrap().build().unwrap();
        assert_eq!(
            request.headers().get("Accept").unwrap().to_str().unwrap(),
            "application/json"
        );
    }
}
