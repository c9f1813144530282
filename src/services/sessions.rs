use uuid::Uuid;

use crate::db::AttendanceStore;
use crate::error::{AppError, Result};
use crate::models::session::{CreateSessionData, Session};
use crate::services::recognition::RecognitionService;

/// Creates an active session and asks the recognition service to start capturing
///
/// The capture request is best-effort: a failure is logged and the session is
/// still returned.
pub async fn start_session(
    store: &dyn AttendanceStore,
    recognition: &dyn RecognitionService,
    data: CreateSessionData,
) -> Result<Session> {
    let session = store.create_session(data).await?;

    tracing::info!(
        session_id = %session.id,
        class = %session.class,
        teacher_id = %session.teacher_id,
        "Attendance session started"
    );

    if let Err(e) = recognition.start().await {
        tracing::warn!(
            session_id = %session.id,
            error = %e,
            "Could not start recognition service, continuing"
        );
    }

    Ok(session)
}

/// Marks a session ended and asks the recognition service to stop capturing
///
/// Ending an already-ended session re-applies the update and keeps the
/// original end time.
pub async fn end_session(
    store: &dyn AttendanceStore,
    recognition: &dyn RecognitionService,
    session_id: Uuid,
) -> Result<Session> {
    let session = store
        .end_session(session_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Session {} not found", session_id)))?;

    tracing::info!(session_id = %session.id, "Attendance session ended");

    if let Err(e) = recognition.stop().await {
        tracing::warn!(
            session_id = %session.id,
            error = %e,
            "Could not stop recognition service"
        );
    }

    Ok(session)
}
