//! `HttpClient` over reqwest.
//!
//! `execute` makes exactly one attempt and returns whatever status the server
//! sent; callers that want backoff use `execute_with_retry` or run their own
//! loop. Downloads are exposed as an `AsyncRead` over the body stream, so
//! dropping the reader closes the connection.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use bridge_traits::{
    error::{BridgeError, Result},
    http::{HttpClient, HttpMethod, HttpRequest, HttpResponse, RetryPolicy},
};
use futures_util::TryStreamExt;
use reqwest::Client;
use tokio::io::AsyncRead;
use tokio_util::io::StreamReader;
use tracing::{debug, warn};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

pub struct ReqwestHttpClient {
    client: Client,
}

impl ReqwestHttpClient {
    pub fn new() -> Result<Self> {
        Self::with_timeout(DEFAULT_TIMEOUT)
    }

    /// `timeout` bounds each request unless the request sets its own.
    /// Streaming downloads should set a longer per-request timeout.
    pub fn with_timeout(timeout: Duration) -> Result<Self> {
        Client::builder()
            .timeout(timeout)
            .connect_timeout(CONNECT_TIMEOUT)
            .user_agent(concat!("music-aggregator/", env!("CARGO_PKG_VERSION")))
            .build()
            .map(|client| Self { client })
            .map_err(|e| BridgeError::NotAvailable(format!("HTTP client: {}", e)))
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }

    fn method(method: HttpMethod) -> reqwest::Method {
        match method {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Post => reqwest::Method::POST,
            HttpMethod::Delete => reqwest::Method::DELETE,
            HttpMethod::Head => reqwest::Method::HEAD,
        }
    }

    async fn send(&self, request: HttpRequest) -> Result<reqwest::Response> {
        let HttpRequest {
            method,
            url,
            headers,
            body,
            timeout,
        } = request;

        let mut builder = self.client.request(Self::method(method), &url);
        for (key, value) in headers {
            builder = builder.header(key, value);
        }
        if let Some(body) = body {
            builder = builder.body(body);
        }
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }

        builder.send().await.map_err(|e| {
            if e.is_timeout() {
                BridgeError::Io(std::io::Error::new(std::io::ErrorKind::TimedOut, e))
            } else {
                BridgeError::OperationFailed(format!("{}: {}", url, e))
            }
        })
    }
}

fn status_error(status: u16, url: &str) -> BridgeError {
    match status {
        404 | 410 => BridgeError::NotFound(url.to_string()),
        _ => BridgeError::OperationFailed(format!("HTTP {} for {}", status, url)),
    }
}

#[async_trait]
impl HttpClient for ReqwestHttpClient {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse> {
        debug!(url = %request.url, "HTTP request");
        let response = self.send(request).await?;
        let status = response.status().as_u16();
        let headers: HashMap<String, String> = response
            .headers()
            .iter()
            .filter_map(|(k, v)| v.to_str().ok().map(|v| (k.to_string(), v.to_string())))
            .collect();
        let body = response
            .bytes()
            .await
            .map_err(|e| BridgeError::OperationFailed(format!("reading body: {}", e)))?;

        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }

    /// Retries transport failures and 429/5xx responses. After the last
    /// attempt the final response is returned as is.
    async fn execute_with_retry(
        &self,
        request: HttpRequest,
        policy: RetryPolicy,
    ) -> Result<HttpResponse> {
        let max_attempts = policy.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            let result = self.execute(request.clone()).await;
            let retry = match &result {
                Ok(response) => response.is_retryable(),
                Err(e) => e.is_transient(),
            };
            if !retry || attempt >= max_attempts {
                return result;
            }

            let delay = policy.delay_for(attempt);
            warn!(
                url = %request.url,
                attempt,
                delay_ms = delay.as_millis() as u64,
                "Retrying HTTP request"
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }

    async fn download_stream(&self, request: HttpRequest) -> Result<Box<dyn AsyncRead + Send + Unpin>> {
        let url = request.url.clone();
        let response = self.send(request).await?;
        let status = response.status().as_u16();
        if !response.status().is_success() {
            return Err(status_error(status, &url));
        }

        let body = response.bytes_stream().map_err(std::io::Error::other);
        Ok(Box::new(StreamReader::new(body)))
    }
}
