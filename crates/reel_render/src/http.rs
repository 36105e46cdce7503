//! HTTP client for the render API.
//!
//! Both endpoints answer with a `{type: "success", data}` or
//! `{type: "error", message}` envelope.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use reel_core::{RenderRequest, ServiceConfig};

use crate::error::{ServiceError, ServiceResult};
use crate::service::{JobHandle, ProgressReport, RenderService};

const RENDER_PATH: &str = "/api/lambda/render";
const PROGRESS_PATH: &str = "/api/lambda/progress";

/// Response envelope used by the render API.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum Envelope<T> {
    Success { data: T },
    Error { message: String },
}

impl<T> Envelope<T> {
    fn into_result(self) -> ServiceResult<T> {
        match self {
            Envelope::Success { data } => Ok(data),
            Envelope::Error { message } => Err(ServiceError::Rejected(message)),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ProgressRequest<'a> {
    id: &'a str,
    bucket_name: &'a str,
}

/// Render service reached over HTTP.
pub struct HttpRenderService {
    base_url: String,
    client: reqwest::Client,
}

impl HttpRenderService {
    /// Create a client for the given base URL with default settings.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
        }
    }

    /// Create a client from service configuration.
    pub fn from_config(config: &ServiceConfig) -> ServiceResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()?;
        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn post<B, T>(&self, path: &str, body: &B) -> ServiceResult<T>
    where
        B: Serialize + ?Sized,
        T: for<'de> Deserialize<'de>,
    {
        let url = self.endpoint(path);
        debug!("POST {}", url);

        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(map_transport_error)?;

        let status = response.status();
        let text = response.text().await.map_err(map_transport_error)?;

        match serde_json::from_str::<Envelope<T>>(&text) {
            Ok(envelope) => envelope.into_result(),
            Err(e) if status.is_success() => Err(ServiceError::InvalidResponse(e.to_string())),
            Err(_) => Err(ServiceError::InvalidResponse(format!(
                "HTTP {}: {}",
                status,
                text.chars().take(200).collect::<String>()
            ))),
        }
    }
}

fn map_transport_error(error: reqwest::Error) -> ServiceError {
    if error.is_connect() || error.is_timeout() {
        ServiceError::Unreachable(error.to_string())
    } else {
        ServiceError::Http(error)
    }
}

#[async_trait]
impl RenderService for HttpRenderService {
    async fn submit(&self, request: &RenderRequest) -> ServiceResult<JobHandle> {
        request.validate()?;
        self.post(RENDER_PATH, request).await
    }

    async fn check(&self, handle: &JobHandle) -> ServiceResult<ProgressReport> {
        let body = ProgressRequest {
            id: &handle.job_id,
            bucket_name: &handle.bucket_ref,
        };
        self.post(PROGRESS_PATH, &body).await
    }
}
