//! Test doubles shared by the unit tests.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::{
    body::{Body, Bytes},
    http::{header, Method, Request, StatusCode},
    Router,
};
use futures::StreamExt;
use serde_json::Value;
use tower::ServiceExt;

use crate::api::state::AppState;
use crate::config::Config;
use crate::db::memory::MemoryStore;
use crate::services::monitor::MonitorRegistry;
use crate::services::recognition::{
    BoundingBox, CheckStudentsResult, Detection, EmbedResult, EmbedStudent, PtzCommand,
    RecognitionError, RecognitionService, VideoFeed,
};

pub fn detection(student_id: &str, confidence: f64) -> Detection {
    Detection {
        student_id: (!student_id.is_empty()).then(|| student_id.to_string()),
        name: if student_id.is_empty() {
            "Unknown".to_string()
        } else {
            format!("Student {}", student_id)
        },
        confidence,
        bbox: BoundingBox::default(),
    }
}

/// Scriptable stand-in for the recognition service
#[derive(Default)]
pub struct FakeRecognition {
    pub detections: Mutex<Vec<Detection>>,
    pub known_ids: Mutex<HashSet<String>>,
    pub embedded: Mutex<Vec<EmbedStudent>>,
    pub ptz_commands: Mutex<Vec<PtzCommand>>,
    pub unavailable: AtomicBool,
    pub starts: AtomicUsize,
    pub stops: AtomicUsize,
    pub detect_calls: AtomicUsize,
}

impl FakeRecognition {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn unavailable() -> Self {
        let fake = Self::default();
        fake.unavailable.store(true, Ordering::SeqCst);
        fake
    }

    pub fn set_detections(&self, detections: Vec<Detection>) {
        *self.detections.lock().unwrap() = detections;
    }

    fn check_available(&self) -> Result<(), RecognitionError> {
        if self.unavailable.load(Ordering::SeqCst) {
            Err(RecognitionError::ApiError("connection refused".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl RecognitionService for FakeRecognition {
    async fn health(&self) -> Result<(), RecognitionError> {
        self.check_available()
    }

    async fn start(&self) -> Result<(), RecognitionError> {
        self.starts.fetch_add(1, Ordering::SeqCst);
        self.check_available()
    }

    async fn stop(&self) -> Result<(), RecognitionError> {
        self.stops.fetch_add(1, Ordering::SeqCst);
        self.check_available()
    }

    async fn detect(&self) -> Result<Vec<Detection>, RecognitionError> {
        self.detect_calls.fetch_add(1, Ordering::SeqCst);
        self.check_available()?;
        Ok(self.detections.lock().unwrap().clone())
    }

    async fn check_students(
        &self,
        student_ids: &[String],
    ) -> Result<CheckStudentsResult, RecognitionError> {
        self.check_available()?;
        let known = self.known_ids.lock().unwrap();
        let (present, missing): (Vec<String>, Vec<String>) = student_ids
            .iter()
            .cloned()
            .partition(|id| known.contains(id));
        Ok(CheckStudentsResult { missing, present })
    }

    async fn embed_students(
        &self,
        students: &[EmbedStudent],
    ) -> Result<EmbedResult, RecognitionError> {
        self.check_available()?;
        self.embedded.lock().unwrap().extend_from_slice(students);
        Ok(EmbedResult {
            success: students.iter().map(|s| s.student_id.clone()).collect(),
            failed: Vec::new(),
        })
    }

    async fn video_feed(&self) -> Result<VideoFeed, RecognitionError> {
        self.check_available()?;
        let chunks: Vec<Result<Bytes, RecognitionError>> =
            vec![Ok(Bytes::from_static(b"--frame\r\n"))];
        Ok(VideoFeed {
            content_type: "multipart/x-mixed-replace; boundary=frame".to_string(),
            stream: futures::stream::iter(chunks).boxed(),
        })
    }

    async fn ptz(&self, command: PtzCommand) -> Result<serde_json::Value, RecognitionError> {
        self.check_available()?;
        self.ptz_commands.lock().unwrap().push(command);
        Ok(serde_json::json!({ "status": "ok" }))
    }
}

pub fn test_config() -> Config {
    Config {
        database_url: "postgres://localhost/rollcall_test".to_string(),
        host: "127.0.0.1".to_string(),
        port: 0,
        recognition_service_url: "http://localhost:5000".to_string(),
        recognition_api_key: None,
        recognition_timeout_secs: 5,
        detection_confidence_threshold: 0.5,
        detection_poll_interval_secs: 2,
        auto_detect: false,
    }
}

pub fn test_state(store: Arc<MemoryStore>, recognition: Arc<FakeRecognition>) -> AppState {
    AppState {
        store,
        recognition,
        monitors: Arc::new(MonitorRegistry::default()),
        config: test_config(),
    }
}

/// Sends one request through the router and decodes the JSON reply
pub async fn send(app: Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(json) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}
