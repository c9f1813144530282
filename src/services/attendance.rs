use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::db::AttendanceStore;
use crate::error::{AppError, Result};
use crate::models::{
    attendance::{Attendance, AttendanceStatus},
    fits,
    session::Session,
    STUDENT_ID_MAX_LEN,
};
use crate::services::recognition::Detection;

/// Confidence stored for a teacher marking a student present
pub const MANUAL_PRESENT_CONFIDENCE: f64 = 1.05;
/// Confidence stored for a teacher marking a student absent or excused
pub const MANUAL_ABSENT_CONFIDENCE: f64 = -1.0;

#[derive(Debug, Clone, Serialize)]
pub struct RecordedDetection {
    pub student_id: String,
    pub name: String,
    pub confidence: f64,
    pub recorded_at: DateTime<Utc>,
}

pub async fn load_session(store: &dyn AttendanceStore, session_id: Uuid) -> Result<Session> {
    store
        .find_session(session_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Session {} not found", session_id)))
}

/// Automatic recording is only allowed while the session is active
pub fn ensure_active(session: &Session) -> Result<()> {
    if session.is_active() {
        Ok(())
    } else {
        Err(AppError::Conflict(format!(
            "Session {} has ended",
            session.id
        )))
    }
}

/// Student id of a detection worth recording, if any
pub fn recordable_student(detection: &Detection, min_confidence: f64) -> Option<&str> {
    match detection.student_id.as_deref() {
        Some(id) if detection.confidence > min_confidence => Some(id),
        _ => None,
    }
}

/// Records automatic detections for an active session
///
/// Only the first recognition of a student counts: results for students who
/// already have a row (automatic or manual) are dropped, including repeats
/// within the same batch. Ids wider than the `student_id` column are skipped
/// so the rest of the batch is still recorded.
pub async fn record_detections(
    store: &dyn AttendanceStore,
    session: &Session,
    detections: &[Detection],
    min_confidence: f64,
) -> Result<Vec<RecordedDetection>> {
    ensure_active(session)?;

    let mut recorded = Vec::new();

    for detection in detections {
        let Some(student_id) = recordable_student(detection, min_confidence) else {
            continue;
        };

        if !fits(student_id, STUDENT_ID_MAX_LEN) {
            tracing::warn!(
                session_id = %session.id,
                student_id = %student_id,
                max_len = STUDENT_ID_MAX_LEN,
                "Skipping detection with over-long student id"
            );
            continue;
        }

        if let Some(attendance) = store
            .record_detection(session.id, student_id, detection.confidence)
            .await?
        {
            tracing::info!(
                session_id = %session.id,
                student_id = %student_id,
                confidence = detection.confidence,
                "Attendance recorded from detection"
            );

            recorded.push(RecordedDetection {
                student_id: attendance.student_id,
                name: detection.name.clone(),
                confidence: attendance.confidence,
                recorded_at: attendance.recorded_at,
            });
        }
    }

    Ok(recorded)
}

/// Applies a teacher's present/absent decision
///
/// Overwrites any earlier row for the pair and marks it manual, which keeps
/// later automatic detections from touching it.
pub async fn mark_manual(
    store: &dyn AttendanceStore,
    session_id: Uuid,
    student_id: &str,
    present: bool,
) -> Result<Attendance> {
    let student_id = student_id.trim();
    if student_id.is_empty() {
        return Err(AppError::Validation("Missing student_id".to_string()));
    }
    if !fits(student_id, STUDENT_ID_MAX_LEN) {
        return Err(AppError::Validation(format!(
            "student_id must be at most {} characters",
            STUDENT_ID_MAX_LEN
        )));
    }

    load_session(store, session_id).await?;

    let (status, confidence) = if present {
        (AttendanceStatus::Present, MANUAL_PRESENT_CONFIDENCE)
    } else {
        (AttendanceStatus::Absent, MANUAL_ABSENT_CONFIDENCE)
    };

    let attendance = store
        .record_manual(session_id, student_id, status, confidence)
        .await?;

    tracing::info!(
        session_id = %session_id,
        student_id = %student_id,
        status = status.as_str(),
        "Manual attendance recorded"
    );

    Ok(attendance)
}

/// Students currently counted present in a session
pub async fn present_students(
    store: &dyn AttendanceStore,
    session_id: Uuid,
) -> Result<HashSet<String>> {
    let rows = store.session_attendance(session_id).await?;
    Ok(rows
        .into_iter()
        .filter(|row| row.attendance.is_present())
        .map(|row| row.attendance.student_id)
        .collect())
}
