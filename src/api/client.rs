use super::TokenSource;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::util::Delay;
use log::debug;
use reqwest::header::AUTHORIZATION;
use reqwest::{Client, Method, StatusCode};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;

/// Catalog API client. Fetches a bearer token immediately before every
/// request, maps HTTP failures onto the error taxonomy, and retries exactly
/// once after a 429 using the server-supplied retry-after delay.
///
/// It never touches the credential store; an expired session surfaces as
/// `AuthExpired` and the caller decides what to do about it.
pub struct ApiClient {
    http: Client,
    api_base: String,
    tokens: Arc<dyn TokenSource>,
    delay: Arc<dyn Delay>,
}

impl ApiClient {
    pub fn new(cfg: &Config, tokens: Arc<dyn TokenSource>, delay: Arc<dyn Delay>) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(cfg.request_timeout_secs))
            .build()?;
        Ok(Self {
            http,
            api_base: cfg.api_base.trim_end_matches('/').to_string(),
            tokens,
            delay,
        })
    }

    pub fn api_base(&self) -> &str {
        &self.api_base
    }

    /// Issue a request and decode the JSON body.
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let resp = self.request(Method::GET, path, None).await?;
        resp.json::<T>()
            .await
            .map_err(|e| Error::InvalidResponse(e.to_string()))
    }

    /// Issue a request, handling the rate-limit retry and translating any
    /// non-2xx status. Returns the raw response for the caller to decode.
    pub async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<serde_json::Value>,
    ) -> Result<reqwest::Response> {
        let url = self.resolve(path);
        let mut resp = self.send_once(&method, &url, body.as_ref()).await?;

        if resp.status() == StatusCode::TOO_MANY_REQUESTS {
            let wait = retry_after_secs(&resp).unwrap_or(1);
            debug!("429 from {}, retrying once after {}s", url, wait);
            self.delay.sleep(Duration::from_secs(wait)).await;
            resp = self.send_once(&method, &url, body.as_ref()).await?;
            if resp.status() == StatusCode::TOO_MANY_REQUESTS {
                return Err(Error::RateLimited { retry_after: retry_after_secs(&resp) });
            }
        }

        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        Err(map_status(status, resp).await)
    }

    // Page cursors arrive as absolute URLs and are used as-is; everything
    // else is resolved against the configured API base.
    fn resolve(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            path.to_string()
        } else {
            format!("{}{}", self.api_base, path)
        }
    }

    async fn send_once(
        &self,
        method: &Method,
        url: &str,
        body: Option<&serde_json::Value>,
    ) -> Result<reqwest::Response> {
        let token = self.tokens.valid_token().await.ok_or(Error::AuthExpired)?;
        let mut req = self
            .http
            .request(method.clone(), url)
            .header(AUTHORIZATION, format!("Bearer {}", token));
        if let Some(b) = body {
            req = req.json(b);
        }
        req.send()
            .await
            .map_err(|e| Error::NetworkError(e.to_string()))
    }
}

fn retry_after_secs(resp: &reqwest::Response) -> Option<u64> {
    resp.headers()
        .get("retry-after")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.parse::<u64>().ok())
}

/// Translate a non-2xx status into the domain taxonomy. Reads the body only
/// for the generic 4xx case, where the remote message is worth surfacing.
async fn map_status(status: StatusCode, resp: reqwest::Response) -> Error {
    match status.as_u16() {
        401 => Error::AuthExpired,
        403 => Error::AccessDenied,
        404 => Error::NotFound,
        s if s >= 500 => Error::RemoteServerError { status: s },
        s => {
            let text = resp.text().await.unwrap_or_default();
            let message = serde_json::from_str::<serde_json::Value>(&text)
                .ok()
                .and_then(|j| j["error"]["message"].as_str().map(|m| m.to_string()))
                .unwrap_or_else(|| "unexpected error".to_string());
            Error::RemoteRequestError { status: s, message }
        }
    }
}

/// Fixed-token source for tests and scripted use.
pub struct StaticTokenSource {
    token: String,
}

impl StaticTokenSource {
    pub fn new(token: impl Into<String>) -> Self {
        Self { token: token.into() }
    }
}

#[async_trait::async_trait]
impl TokenSource for StaticTokenSource {
    async fn valid_token(&self) -> Option<String> {
        Some(self.token.clone())
    }
}
