use async_trait::async_trait;
use sentinel_config::{HealthCheckEndpoint, HttpMethod};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use thiserror::Error;

/// 探测请求
#[derive(Debug, Clone)]
pub struct ProbeRequest {
    pub target: String,
    pub method: HttpMethod,
    pub headers: HashMap<String, String>,
    pub body: Option<String>,
    pub timeout: Duration,
}

impl ProbeRequest {
    pub fn from_endpoint(endpoint: &HealthCheckEndpoint) -> Self {
        Self {
            target: endpoint.target.clone(),
            method: endpoint.method,
            headers: endpoint.headers.clone(),
            body: endpoint.body.clone(),
            timeout: endpoint.timeout(),
        }
    }
}

/// 探测响应
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProbeResponse {
    pub status_code: u16,
    pub latency: Duration,
}

impl ProbeResponse {
    pub fn latency_ms(&self) -> f64 {
        self.latency.as_secs_f64() * 1000.0
    }
}

/// 探测错误：没有拿到响应
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProbeError {
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("connection failed: {0}")]
    Connect(String),

    #[error("request failed: {0}")]
    Request(String),
}

/// 探测接口
#[async_trait]
pub trait Probe: Send + Sync {
    async fn probe(&self, request: &ProbeRequest) -> Result<ProbeResponse, ProbeError>;
}

/// 基于 reqwest 的 HTTP 探测
pub struct HttpProbe {
    client: reqwest::Client,
}

impl HttpProbe {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

impl Default for HttpProbe {
    fn default() -> Self {
        Self::new()
    }
}

fn to_reqwest(method: HttpMethod) -> reqwest::Method {
    match method {
        HttpMethod::Get => reqwest::Method::GET,
        HttpMethod::Head => reqwest::Method::HEAD,
        HttpMethod::Post => reqwest::Method::POST,
        HttpMethod::Put => reqwest::Method::PUT,
        HttpMethod::Delete => reqwest::Method::DELETE,
        HttpMethod::Patch => reqwest::Method::PATCH,
        HttpMethod::Options => reqwest::Method::OPTIONS,
    }
}

#[async_trait]
impl Probe for HttpProbe {
    async fn probe(&self, request: &ProbeRequest) -> Result<ProbeResponse, ProbeError> {
        let mut builder = self
            .client
            .request(to_reqwest(request.method), &request.target)
            .timeout(request.timeout);
        for (key, value) in &request.headers {
            builder = builder.header(key, value);
        }
        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }

        let started = Instant::now();
        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                ProbeError::Timeout(request.timeout)
            } else if e.is_connect() {
                ProbeError::Connect(e.to_string())
            } else {
                ProbeError::Request(e.to_string())
            }
        })?;

        Ok(ProbeResponse {
            status_code: response.status().as_u16(),
            latency: started.elapsed(),
        })
    }
}
