use crate::config::{create_http_client, Config};
use crate::error::{FlairError, Result};
use crate::response::Document;
use reqwest::blocking::{Client, RequestBuilder};
use reqwest::header::{ACCEPT, AUTHORIZATION};
use reqwest::{Method, StatusCode};
use std::time::Instant;
use tracing::debug;
use url::Url;

/// Media type the API speaks
pub const JSON_API_MEDIA_TYPE: &str = "application/vnd.api+json";

/// Status and body of a completed HTTP exchange
#[derive(Debug)]
pub struct RawResponse {
    pub status: StatusCode,
    pub body: Vec<u8>,
}

impl RawResponse {
    /// Body as text, for error reporting
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).to_string()
    }
}

/// Shared HTTP plumbing for every component of a session
#[derive(Debug, Clone)]
pub struct ApiContext {
    /// HTTP client
    pub client: Client,
    /// Configuration
    pub config: Config,
    root: Url,
}

impl ApiContext {
    /// Create a context with a fresh HTTP client built from the configuration
    pub fn new(config: Config) -> Result<Self> {
        let client = create_http_client(&config)?;
        Self::with_client(client, config)
    }

    /// Create a context around an existing HTTP client
    pub fn with_client(client: Client, config: Config) -> Result<Self> {
        let root = Url::parse(&config.api_root)?;
        Ok(ApiContext { client, config, root })
    }

    /// Join a server path onto the API root
    pub fn url(&self, path: &str) -> Result<Url> {
        Ok(self.root.join(path)?)
    }

    /// Start a request for `path` with the JSON:API Accept header set
    pub fn request(&self, method: Method, path: &str) -> Result<RequestBuilder> {
        let url = self.url(path)?;
        Ok(self
            .client
            .request(method, url)
            .header(ACCEPT, JSON_API_MEDIA_TYPE))
    }

    /// Start an authenticated request for `path`
    pub fn authorized(
        &self,
        method: Method,
        path: &str,
        access_token: &str,
    ) -> Result<RequestBuilder> {
        Ok(self
            .request(method, path)?
            .header(AUTHORIZATION, format!("Bearer {}", access_token)))
    }

    /// Send a request and read the whole body, whatever the status
    pub fn send(&self, request: RequestBuilder) -> Result<RawResponse> {
        let request = request.build()?;
        let method = request.method().clone();
        // The query string may carry credentials, so only the path is logged
        let path = request.url().path().to_string();

        let start = Instant::now();
        let http_response = self.client.execute(request)?;
        let status = http_response.status();
        let body = http_response.bytes()?.to_vec();

        debug!(
            %method,
            %path,
            status = status.as_u16(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "request completed"
        );

        Ok(RawResponse { status, body })
    }

    /// Send a data request: any non-2xx status is an HTTP error and the body
    /// must be a JSON:API document
    pub fn execute(&self, request: RequestBuilder) -> Result<Document> {
        let response = self.send(request)?;
        if !response.status.is_success() {
            return Err(FlairError::http(response.status.as_u16(), response.text()));
        }
        Document::from_slice(&response.body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_url_joining() {
        let ctx = ApiContext::new(Config::new("http://localhost:8080")).unwrap();
        assert_eq!(ctx.url("/api/").unwrap().as_str(), "http://localhost:8080/api/");
        assert_eq!(ctx.url("/api/vents/7").unwrap().as_str(), "http://localhost:8080/api/vents/7");
    }

    #[test]
    fn test_context_rejects_bad_root() {
        let result = ApiContext::new(Config::new("not a url"));
        assert!(matches!(result, Err(FlairError::UrlParse(_))));
    }
}
