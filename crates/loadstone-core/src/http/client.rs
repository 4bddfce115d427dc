//! A single pooled, keep-alive HTTP client shared by every virtual user (§4.5,
//! §5 "the HTTP client (safe for concurrent use)").

use std::time::Duration;

use crate::error::LoadstoneError;
use crate::request_builder::{ResolvedBody, ResolvedRequest};

pub struct HttpClient {
    inner: reqwest::Client,
}

pub struct HttpClientBuilder {
    timeout: Duration,
    pool_max_idle_per_host: usize,
    pool_idle_timeout: Duration,
    user_agent: String,
    danger_accept_invalid_certs: bool,
}

impl Default for HttpClientBuilder {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            pool_max_idle_per_host: 100,
            pool_idle_timeout: Duration::from_secs(90),
            user_agent: format!("loadstone/{}", env!("CARGO_PKG_VERSION")),
            danger_accept_invalid_certs: false,
        }
    }
}

impl HttpClientBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn pool_max_idle_per_host(mut self, n: usize) -> Self {
        self.pool_max_idle_per_host = n;
        self
    }

    pub fn pool_idle_timeout(mut self, timeout: Duration) -> Self {
        self.pool_idle_timeout = timeout;
        self
    }

    pub fn danger_accept_invalid_certs(mut self, accept: bool) -> Self {
        self.danger_accept_invalid_certs = accept;
        self
    }

    pub fn build(self) -> Result<HttpClient, LoadstoneError> {
        let client = reqwest::Client::builder()
            .timeout(self.timeout)
            .pool_max_idle_per_host(self.pool_max_idle_per_host)
            .pool_idle_timeout(self.pool_idle_timeout)
            .user_agent(self.user_agent)
            .danger_accept_invalid_certs(self.danger_accept_invalid_certs)
            .gzip(true)
            .brotli(true)
            .build()?;
        Ok(HttpClient { inner: client })
    }
}

impl Default for HttpClient {
    fn default() -> Self {
        HttpClientBuilder::default()
            .build()
            .expect("default HttpClient should always build")
    }
}

/// Raw send result before outcome classification — see [`crate::http::executor`].
pub struct RawResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: String,
    pub size_bytes: u64,
}

impl HttpClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn builder() -> HttpClientBuilder {
        HttpClientBuilder::new()
    }

    pub async fn send(&self, request: &ResolvedRequest) -> Result<RawResponse, reqwest::Error> {
        let method = reqwest::Method::from_bytes(request.method.to_string().as_bytes())
            .expect("Method enum always maps to a valid reqwest::Method");

        let mut builder = self.inner.request(method, &request.url);
        for (key, value) in &request.headers {
            builder = builder.header(key, value);
        }

        if let Some(body) = &request.body {
            builder = match body {
                ResolvedBody::Raw { content_type, bytes } => {
                    builder.header("Content-Type", *content_type).body(bytes.clone())
                }
                ResolvedBody::UrlEncoded(pairs) => builder.form(pairs),
                ResolvedBody::Multipart(parts) => {
                    let mut form = reqwest::multipart::Form::new();
                    for (k, v) in parts {
                        form = form.text(k.clone(), v.clone());
                    }
                    builder.multipart(form)
                }
            };
        }

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(k, v)| v.to_str().ok().map(|v| (k.as_str().to_owned(), v.to_owned())))
            .collect();

        let body_bytes = response.bytes().await?;
        let size_bytes = body_bytes.len() as u64;
        let body = String::from_utf8_lossy(&body_bytes).into_owned();

        Ok(RawResponse {
            status,
            headers,
            body,
            size_bytes,
        })
    }
}
