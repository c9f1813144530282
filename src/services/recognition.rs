use std::time::Duration;

use async_trait::async_trait;
use axum::body::Bytes;
use futures::{stream::BoxStream, StreamExt, TryStreamExt};
use reqwest::{header::CONTENT_TYPE, Client, Method, RequestBuilder};
use secrecy::{ExposeSecret, Secret};
use serde::{de::DeserializeOwned, Deserialize, Deserializer, Serialize};

use crate::config::Config;

const API_KEY_HEADER: &str = "X-Api-Key";
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const HEALTH_TIMEOUT: Duration = Duration::from_secs(3);

#[derive(thiserror::Error, Debug)]
pub enum RecognitionError {
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("{0}")]
    ApiError(String),

    #[error("Invalid recognition service URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
    pub left: i32,
}

/// A single recognized (or unrecognized) face from `/detect`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Detection {
    #[serde(default, deserialize_with = "optional_id")]
    pub student_id: Option<String>,
    #[serde(default)]
    pub name: String,
    pub confidence: f64,
    #[serde(default)]
    pub bbox: BoundingBox,
}

#[derive(Debug, Deserialize)]
struct DetectResponse {
    #[serde(default)]
    results: Vec<Detection>,
    mode: Option<String>,
    error: Option<String>,
}

#[derive(Debug, Serialize)]
struct CheckStudentsRequest<'a> {
    student_ids: &'a [String],
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CheckStudentsResult {
    #[serde(default)]
    pub missing: Vec<String>,
    #[serde(default)]
    pub present: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EmbedStudent {
    pub student_id: String,
    pub full_name: String,
}

#[derive(Debug, Serialize)]
struct EmbedStudentsRequest<'a> {
    students: &'a [EmbedStudent],
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EmbedFailure {
    pub id: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct EmbedResult {
    #[serde(default)]
    pub success: Vec<String>,
    #[serde(default)]
    pub failed: Vec<EmbedFailure>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct PtzMove {
    pub pan: f64,
    pub tilt: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zoom: Option<f64>,
}

/// Camera pan/tilt/zoom commands
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PtzCommand {
    Move(PtzMove),
    Home,
    PatrolStart,
    PatrolStop,
    PatrolStatus,
}

impl PtzCommand {
    fn endpoint(&self) -> (Method, &'static str) {
        match self {
            PtzCommand::Move(_) => (Method::POST, "/ptz/move"),
            PtzCommand::Home => (Method::POST, "/ptz/home"),
            PtzCommand::PatrolStart => (Method::POST, "/ptz/patrol/start"),
            PtzCommand::PatrolStop => (Method::POST, "/ptz/patrol/stop"),
            PtzCommand::PatrolStatus => (Method::GET, "/ptz/patrol/status"),
        }
    }
}

/// Live MJPEG stream relayed from `/video_feed`
pub struct VideoFeed {
    pub content_type: String,
    pub stream: BoxStream<'static, Result<Bytes, RecognitionError>>,
}

/// Capabilities of the external face-recognition service
#[async_trait]
pub trait RecognitionService: Send + Sync {
    async fn health(&self) -> Result<(), RecognitionError>;

    /// Begins camera capture
    async fn start(&self) -> Result<(), RecognitionError>;

    /// Stops camera capture
    async fn stop(&self) -> Result<(), RecognitionError>;

    /// Recognizes faces in the current frame
    async fn detect(&self) -> Result<Vec<Detection>, RecognitionError>;

    /// Reports which of the given students have no stored face embedding
    async fn check_students(
        &self,
        student_ids: &[String],
    ) -> Result<CheckStudentsResult, RecognitionError>;

    /// Downloads photos and stores face embeddings for the given students
    async fn embed_students(
        &self,
        students: &[EmbedStudent],
    ) -> Result<EmbedResult, RecognitionError>;

    async fn video_feed(&self) -> Result<VideoFeed, RecognitionError>;

    async fn ptz(&self, command: PtzCommand) -> Result<serde_json::Value, RecognitionError>;
}

/// HTTP client for the recognition service
#[derive(Clone)]
pub struct RecognitionClient {
    client: Client,
    base_url: String,
    api_key: Option<Secret<String>>,
    timeout: Duration,
    health_timeout: Duration,
}

impl RecognitionClient {
    pub fn new(
        base_url: &str,
        api_key: Option<Secret<String>>,
        timeout: Duration,
    ) -> Result<Self, RecognitionError> {
        url::Url::parse(base_url)?;

        let client = Client::builder().connect_timeout(CONNECT_TIMEOUT).build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            timeout,
            health_timeout: HEALTH_TIMEOUT.min(timeout),
        })
    }

    /// Overrides the timeout used by the health probe
    pub fn with_health_timeout(mut self, timeout: Duration) -> Self {
        self.health_timeout = timeout;
        self
    }

    pub fn from_config(config: &Config) -> Result<Self, RecognitionError> {
        Self::new(
            &config.recognition_service_url,
            config.recognition_api_key.clone(),
            Duration::from_secs(config.recognition_timeout_secs),
        )
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        let mut request = self.client.request(method, url);
        if let Some(api_key) = &self.api_key {
            request = request.header(API_KEY_HEADER, api_key.expose_secret());
        }
        request
    }

    async fn send(&self, request: RequestBuilder) -> Result<reqwest::Response, RecognitionError> {
        self.send_within(request, self.timeout).await
    }

    async fn send_within(
        &self,
        request: RequestBuilder,
        timeout: Duration,
    ) -> Result<reqwest::Response, RecognitionError> {
        let response = request.timeout(timeout).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            tracing::error!(
                status = %status,
                error = %error_text,
                "Recognition service request failed"
            );
            return Err(RecognitionError::ApiError(format!(
                "Status {}: {}",
                status, error_text
            )));
        }

        Ok(response)
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
    ) -> Result<T, RecognitionError> {
        let response = self.send(request).await?;
        response.json().await.map_err(|e| {
            RecognitionError::ApiError(format!("Failed to parse response: {}", e))
        })
    }
}

#[async_trait]
impl RecognitionService for RecognitionClient {
    async fn health(&self) -> Result<(), RecognitionError> {
        self.send_within(self.request(Method::GET, "/health"), self.health_timeout)
            .await?;
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    async fn start(&self) -> Result<(), RecognitionError> {
        self.send(self.request(Method::POST, "/start")).await?;
        tracing::debug!("Recognition capture started");
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    async fn stop(&self) -> Result<(), RecognitionError> {
        self.send(self.request(Method::POST, "/stop")).await?;
        tracing::debug!("Recognition capture stopped");
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    async fn detect(&self) -> Result<Vec<Detection>, RecognitionError> {
        let response: DetectResponse = self
            .send_json(self.request(Method::POST, "/detect"))
            .await?;

        // The service reports frame errors inside a 200 response
        if let Some(error) = response.error {
            tracing::warn!(error = %error, "Recognition service reported a detection error");
        }

        tracing::debug!(
            faces = response.results.len(),
            mode = response.mode.as_deref().unwrap_or("unknown"),
            "Detection poll completed"
        );

        Ok(response.results)
    }

    #[tracing::instrument(skip(self, student_ids), fields(count = student_ids.len()))]
    async fn check_students(
        &self,
        student_ids: &[String],
    ) -> Result<CheckStudentsResult, RecognitionError> {
        let request = self
            .request(Method::POST, "/check-students")
            .json(&CheckStudentsRequest { student_ids });

        let result: CheckStudentsResult = self.send_json(request).await?;

        tracing::info!(
            missing = result.missing.len(),
            present = result.present.len(),
            "Embedding check completed"
        );

        Ok(result)
    }

    #[tracing::instrument(skip(self, students), fields(count = students.len()))]
    async fn embed_students(
        &self,
        students: &[EmbedStudent],
    ) -> Result<EmbedResult, RecognitionError> {
        let request = self
            .request(Method::POST, "/embed-students")
            .json(&EmbedStudentsRequest { students });

        let result: EmbedResult = self.send_json(request).await?;

        tracing::info!(
            success = result.success.len(),
            failed = result.failed.len(),
            "Student embedding completed"
        );

        Ok(result)
    }

    async fn video_feed(&self) -> Result<VideoFeed, RecognitionError> {
        // No overall timeout: the feed is an endless multipart stream
        let response = self.request(Method::GET, "/video_feed").send().await?;

        if !response.status().is_success() {
            return Err(RecognitionError::ApiError(format!(
                "Video feed unavailable: HTTP {}",
                response.status()
            )));
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("multipart/x-mixed-replace; boundary=frame")
            .to_string();

        let stream = response
            .bytes_stream()
            .map_err(RecognitionError::from)
            .boxed();

        Ok(VideoFeed {
            content_type,
            stream,
        })
    }

    #[tracing::instrument(skip(self))]
    async fn ptz(&self, command: PtzCommand) -> Result<serde_json::Value, RecognitionError> {
        let (method, path) = command.endpoint();
        let mut request = self.request(method, path);
        if let PtzCommand::Move(movement) = command {
            request = request.json(&movement);
        }

        self.send_json(request).await
    }
}

/// Accepts student ids encoded as strings or numbers; blank ids become `None`
fn optional_id<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::String(s)) if !s.trim().is_empty() => Some(s),
        Some(serde_json::Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}
