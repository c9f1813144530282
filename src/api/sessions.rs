use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Path, Query, State,
    },
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::{check_length, required, state::AppState, SessionPath};
use crate::error::{AppError, Result};
use crate::models::{
    attendance::{Attendance, SessionAttendance},
    session::{CreateSessionData, Session},
    CLASS_MAX_LEN, SUBJECT_MAX_LEN, TEACHER_ID_MAX_LEN,
};
use crate::services::{
    attendance::{self, RecordedDetection},
    sessions,
};

// Request/Response types
#[derive(Debug, Deserialize)]
pub struct StartSessionRequest {
    #[serde(rename = "className", alias = "class_name", alias = "class")]
    pub class_name: Option<String>,
    pub subject: Option<String>,
    #[serde(alias = "teacherId")]
    pub teacher_id: Option<String>,
    pub auto_detect: Option<bool>,
}

#[derive(Debug, Serialize)]
pub struct StartSessionResponse {
    pub status: &'static str,
    pub session_id: Uuid,
    pub class: String,
    pub subject: String,
    pub started_at: DateTime<Utc>,
    pub auto_detect: bool,
}

#[derive(Debug, Serialize)]
pub struct EndSessionResponse {
    pub status: &'static str,
    pub session_id: Uuid,
    pub ended_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
pub struct SessionDetails {
    #[serde(flatten)]
    pub session: Session,
    pub monitoring: bool,
}

#[derive(Debug, Deserialize)]
pub struct ActiveSessionQuery {
    pub class: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct DetectRequest {
    pub session_id: Option<Uuid>,
}

#[derive(Debug, Serialize)]
pub struct DetectResponse {
    pub timestamp: DateTime<Utc>,
    pub session_id: Uuid,
    pub students_detected: usize,
    pub students: Vec<RecordedDetection>,
}

#[derive(Debug, Serialize)]
pub struct SessionAttendanceResponse {
    pub session_id: Uuid,
    pub attendance: Vec<SessionAttendance>,
}

#[derive(Debug, Deserialize)]
pub struct ManualAttendanceRequest {
    pub student_id: Option<String>,
    pub present: Option<bool>,
}

#[derive(Debug, Serialize)]
pub struct ManualAttendanceResponse {
    pub attendance: Attendance,
}

#[derive(Debug, Serialize)]
pub struct MonitorResponse {
    pub session_id: Uuid,
    pub monitoring: bool,
}

// Handlers

/// Start an attendance session
async fn start_session(
    State(state): State<AppState>,
    payload: std::result::Result<Json<StartSessionRequest>, JsonRejection>,
) -> Result<Json<StartSessionResponse>> {
    let Json(req) = payload?;

    let (Some(class), Some(teacher_id)) = (required(req.class_name), required(req.teacher_id))
    else {
        return Err(AppError::Validation(
            "Missing className or teacher_id".to_string(),
        ));
    };
    let subject = req.subject.unwrap_or_default().trim().to_string();

    check_length("className", &class, CLASS_MAX_LEN)?;
    check_length("subject", &subject, SUBJECT_MAX_LEN)?;
    check_length("teacher_id", &teacher_id, TEACHER_ID_MAX_LEN)?;

    let session = sessions::start_session(
        state.store.as_ref(),
        state.recognition.as_ref(),
        CreateSessionData {
            class,
            subject,
            teacher_id,
        },
    )
    .await?;

    let auto_detect = req.auto_detect.unwrap_or(state.config.auto_detect);
    if auto_detect {
        state.start_monitor(session.id);
    }

    Ok(Json(StartSessionResponse {
        status: "started",
        session_id: session.id,
        class: session.class,
        subject: session.subject,
        started_at: session.started_at,
        auto_detect,
    }))
}

/// End an attendance session
async fn end_session(
    State(state): State<AppState>,
    path: SessionPath,
) -> Result<Json<EndSessionResponse>> {
    let Path(session_id) = path?;

    state.monitors.stop(session_id);

    let session =
        sessions::end_session(state.store.as_ref(), state.recognition.as_ref(), session_id)
            .await?;

    Ok(Json(EndSessionResponse {
        status: "ended",
        session_id: session.id,
        ended_at: session.ended_at,
    }))
}

/// Get a session
async fn get_session(
    State(state): State<AppState>,
    path: SessionPath,
) -> Result<Json<SessionDetails>> {
    let Path(session_id) = path?;
    let session = attendance::load_session(state.store.as_ref(), session_id).await?;

    Ok(Json(SessionDetails {
        monitoring: state.monitors.is_running(session.id),
        session,
    }))
}

/// Most recent active session for a class
async fn active_session(
    State(state): State<AppState>,
    query: std::result::Result<Query<ActiveSessionQuery>, QueryRejection>,
) -> Result<Json<Session>> {
    let Query(params) = query?;
    let class = required(params.class)
        .ok_or_else(|| AppError::Validation("Missing class".to_string()))?;

    let session = state
        .store
        .find_active_session(&class)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("No active session for class {}", class)))?;

    Ok(Json(session))
}

/// Poll the recognition service once and record what it sees
async fn detect(
    State(state): State<AppState>,
    payload: std::result::Result<Json<DetectRequest>, JsonRejection>,
) -> Result<Json<DetectResponse>> {
    let Json(req) = payload?;
    let session_id = req
        .session_id
        .ok_or_else(|| AppError::Validation("Missing session_id".to_string()))?;

    let session = attendance::load_session(state.store.as_ref(), session_id).await?;
    attendance::ensure_active(&session)?;

    let detections = state.recognition.detect().await?;

    let students = attendance::record_detections(
        state.store.as_ref(),
        &session,
        &detections,
        state.min_confidence(),
    )
    .await?;

    Ok(Json(DetectResponse {
        timestamp: Utc::now(),
        session_id,
        students_detected: students.len(),
        students,
    }))
}

/// Attendance recorded for a session
async fn session_attendance(
    State(state): State<AppState>,
    path: SessionPath,
) -> Result<Json<SessionAttendanceResponse>> {
    let Path(session_id) = path?;
    attendance::load_session(state.store.as_ref(), session_id).await?;

    let attendance = state.store.session_attendance(session_id).await?;

    Ok(Json(SessionAttendanceResponse {
        session_id,
        attendance,
    }))
}

/// Teacher override for a single student
async fn mark_attendance(
    State(state): State<AppState>,
    path: SessionPath,
    payload: std::result::Result<Json<ManualAttendanceRequest>, JsonRejection>,
) -> Result<Json<ManualAttendanceResponse>> {
    let Path(session_id) = path?;
    let Json(req) = payload?;

    let (Some(student_id), Some(present)) = (required(req.student_id), req.present) else {
        return Err(AppError::Validation(
            "Missing student_id or present".to_string(),
        ));
    };

    let attendance =
        attendance::mark_manual(state.store.as_ref(), session_id, &student_id, present).await?;

    Ok(Json(ManualAttendanceResponse { attendance }))
}

/// Start detection polling for an active session
async fn start_monitor(
    State(state): State<AppState>,
    path: SessionPath,
) -> Result<(StatusCode, Json<MonitorResponse>)> {
    let Path(session_id) = path?;
    let session = attendance::load_session(state.store.as_ref(), session_id).await?;
    attendance::ensure_active(&session)?;

    state.start_monitor(session_id);

    Ok((
        StatusCode::ACCEPTED,
        Json(MonitorResponse {
            session_id,
            monitoring: true,
        }),
    ))
}

/// Stop detection polling for a session
async fn stop_monitor(
    State(state): State<AppState>,
    path: SessionPath,
) -> Result<Json<MonitorResponse>> {
    let Path(session_id) = path?;

    if !state.monitors.stop(session_id) {
        return Err(AppError::NotFound(format!(
            "No detection monitor for session {}",
            session_id
        )));
    }

    Ok(Json(MonitorResponse {
        session_id,
        monitoring: false,
    }))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/sessions/start", post(start_session))
        .route("/sessions/active", get(active_session))
        .route("/sessions/:id", get(get_session))
        .route("/sessions/:id/end", post(end_session))
        .route(
            "/sessions/:id/attendance",
            get(session_attendance).post(mark_attendance),
        )
        .route(
            "/sessions/:id/monitor",
            post(start_monitor).delete(stop_monitor),
        )
        .route("/detect", post(detect))
}
