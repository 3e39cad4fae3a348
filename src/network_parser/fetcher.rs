//! 单页抓取：超时、固定请求头、错误分类。
//!
//! `HttpFetcher` 本身从不重试；需要重试时由调用方包一层 `RetryingFetcher`。

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::{
    ACCEPT, ACCEPT_ENCODING, ACCEPT_LANGUAGE, CONNECTION, HeaderMap, HeaderValue, USER_AGENT,
};
use thiserror::Error;
use tracing::{debug, warn};

use crate::base_system::context::Config;
use crate::base_system::retry::RetryPolicy;

#[derive(Debug, Error)]
#[error("fetch {url} failed: {cause}")]
pub struct FetchError {
    pub url: String,
    pub cause: FetchCause,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchCause {
    #[error("request timed out")]
    Timeout,
    #[error("connection failed: {0}")]
    Connect(String),
    #[error("HTTP status {0}")]
    Status(u16),
    #[error("invalid url")]
    InvalidUrl,
    #[error("{0}")]
    Other(String),
}

impl FetchError {
    pub fn new(url: impl Into<String>, cause: FetchCause) -> Self {
        Self {
            url: url.into(),
            cause,
        }
    }

    /// 超时、连接失败、429 与 5xx 视为暂时性错误。
    pub fn is_transient(&self) -> bool {
        match &self.cause {
            FetchCause::Timeout | FetchCause::Connect(_) => true,
            FetchCause::Status(code) => *code == 429 || *code >= 500,
            FetchCause::InvalidUrl | FetchCause::Other(_) => false,
        }
    }
}

/// Fetches one page and returns its raw body.
///
/// Implementations are shared by every download worker, hence `Send + Sync`.
pub trait PageFetcher: Send + Sync {
    fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError>;
}

#[derive(Debug, Clone)]
pub struct FetchPolicy {
    pub timeout: Duration,
    pub connect_timeout: Option<Duration>,
    pub user_agent: String,
    pub accept_language: String,
}

impl FetchPolicy {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            timeout: cfg.request_timeout(),
            connect_timeout: cfg.connect_timeout(),
            user_agent: cfg.user_agent.clone(),
            accept_language: cfg.accept_language.clone(),
        }
    }
}

impl Default for FetchPolicy {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(policy: &FetchPolicy) -> anyhow::Result<Self> {
        let mut headers = HeaderMap::new();
        // reqwest 未启用 gzip 解码，要求源站返回原始字节
        headers.insert(ACCEPT_ENCODING, HeaderValue::from_static("identity"));
        headers.insert(CONNECTION, HeaderValue::from_static("keep-alive"));
        headers.insert(
            ACCEPT,
            HeaderValue::from_static(
                "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
            ),
        );
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&policy.user_agent)
                .unwrap_or(HeaderValue::from_static("Mozilla/5.0")),
        );
        headers.insert(
            ACCEPT_LANGUAGE,
            HeaderValue::from_str(&policy.accept_language)
                .unwrap_or(HeaderValue::from_static("en-US,en;q=0.9")),
        );

        let mut builder = Client::builder()
            .default_headers(headers)
            .timeout(policy.timeout.max(Duration::from_millis(50)));
        if let Some(connect) = policy.connect_timeout {
            builder = builder.connect_timeout(connect.max(Duration::from_millis(50)));
        }

        Ok(Self {
            client: builder.build()?,
        })
    }
}

impl PageFetcher for HttpFetcher {
    fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        debug!(target: "fetch", url, "GET");
        let resp = self
            .client
            .get(url)
            .send()
            .map_err(|e| FetchError::new(url, classify(&e)))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::new(url, FetchCause::Status(status.as_u16())));
        }

        let bytes = resp.bytes().map_err(|e| FetchError::new(url, classify(&e)))?;
        Ok(bytes.to_vec())
    }
}

fn classify(err: &reqwest::Error) -> FetchCause {
    if err.is_timeout() {
        FetchCause::Timeout
    } else if err.is_builder() {
        FetchCause::InvalidUrl
    } else if err.is_connect() {
        FetchCause::Connect(err.to_string())
    } else if let Some(status) = err.status() {
        FetchCause::Status(status.as_u16())
    } else {
        FetchCause::Other(err.to_string())
    }
}

/// Bounded retry with exponential backoff around another fetcher.
///
/// Only transient failures are retried; a 404 is returned immediately.
pub struct RetryingFetcher<F> {
    inner: F,
    policy: RetryPolicy,
}

impl<F: PageFetcher> RetryingFetcher<F> {
    pub fn new(inner: F, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }
}

impl<F: PageFetcher> PageFetcher for RetryingFetcher<F> {
    fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let mut attempt = 0;
        loop {
            match self.inner.fetch(url) {
                Ok(body) => return Ok(body),
                Err(err) if err.is_transient() && attempt < self.policy.max_retries => {
                    let wait = self.policy.backoff(attempt);
                    warn!(
                        target: "fetch",
                        url,
                        attempt = attempt + 1,
                        wait_ms = wait.as_millis() as u64,
                        "重试: {}",
                        err.cause
                    );
                    std::thread::sleep(wait);
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

/// Serves pages that were already downloaded while resolving the chapter
/// list; each cached page is handed out once, then falls through to `inner`.
pub struct PrefetchedFetcher<'a> {
    inner: &'a dyn PageFetcher,
    pages: Mutex<HashMap<String, Vec<u8>>>,
}

impl<'a> PrefetchedFetcher<'a> {
    pub fn new(inner: &'a dyn PageFetcher, pages: HashMap<String, Vec<u8>>) -> Self {
        Self {
            inner,
            pages: Mutex::new(pages),
        }
    }

    pub fn remaining(&self) -> usize {
        self.pages.lock().map(|p| p.len()).unwrap_or(0)
    }
}

impl PageFetcher for PrefetchedFetcher<'_> {
    fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let cached = self.pages.lock().ok().and_then(|mut p| p.remove(url));
        match cached {
            Some(body) => Ok(body),
            None => self.inner.fetch(url),
        }
    }
}
