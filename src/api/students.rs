use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection, QueryRejection},
        Path, Query, State,
    },
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::api::{check_length, required, state::AppState};
use crate::db::AttendanceStore;
use crate::error::{AppError, Result};
use crate::models::{
    attendance::StudentAttendance,
    student::{CreateStudentData, Student},
    CLASS_MAX_LEN, NAME_MAX_LEN, STUDENT_ID_MAX_LEN,
};
use crate::services::recognition::{CheckStudentsResult, EmbedResult, EmbedStudent};

const DEFAULT_HISTORY_LIMIT: i64 = 30;
const MAX_HISTORY_LIMIT: i64 = 500;

// Request/Response types
#[derive(Debug, Deserialize)]
pub struct EnrollStudentRequest {
    pub student_id: Option<String>,
    pub name: Option<String>,
    #[serde(rename = "className", alias = "class_name", alias = "class")]
    pub class_name: Option<String>,
    #[serde(alias = "photo")]
    pub photo_path: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateStudentRequest {
    pub name: Option<String>,
    #[serde(alias = "className")]
    pub class: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct StudentListResponse {
    pub students: Vec<Student>,
}

#[derive(Debug, Serialize)]
pub struct StudentResponse {
    pub student: Student,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<&'static str>,
}

#[derive(Debug, Serialize)]
pub struct DeleteStudentResponse {
    pub success: bool,
    pub message: &'static str,
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct StudentHistoryResponse {
    pub student_id: String,
    pub attendance: Vec<StudentAttendance>,
}

#[derive(Debug, Deserialize)]
pub struct CheckEmbeddingsRequest {
    #[serde(default, deserialize_with = "string_ids")]
    pub student_ids: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct EmbedRequest {
    #[serde(default)]
    pub students: Vec<EmbedStudent>,
    #[serde(default, deserialize_with = "string_ids")]
    pub student_ids: Vec<String>,
}

/// Student ids may arrive as strings or numbers
fn string_ids<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let values = Vec::<Value>::deserialize(deserializer)?;
    Ok(values
        .into_iter()
        .filter_map(|value| match value {
            Value::String(s) => Some(s),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
        .collect())
}

/// Builds the embedding batch, resolving names for bare ids from enrollment
async fn resolve_embed_targets(
    store: &dyn AttendanceStore,
    req: EmbedRequest,
) -> Result<Vec<EmbedStudent>> {
    let mut targets = req.students;

    for student_id in req.student_ids {
        let student_id = student_id.trim().to_string();
        if student_id.is_empty() || targets.iter().any(|t| t.student_id == student_id) {
            continue;
        }

        let full_name = store
            .find_student_by_student_id(&student_id)
            .await?
            .map(|s| s.name)
            .unwrap_or_else(|| student_id.clone());

        targets.push(EmbedStudent {
            student_id,
            full_name,
        });
    }

    Ok(targets)
}

// Handlers

/// List all students
async fn list_students(State(state): State<AppState>) -> Result<Json<StudentListResponse>> {
    let students = state.store.list_students().await?;
    Ok(Json(StudentListResponse { students }))
}

/// Enroll a new student
async fn enroll_student(
    State(state): State<AppState>,
    payload: std::result::Result<Json<EnrollStudentRequest>, JsonRejection>,
) -> Result<Json<StudentResponse>> {
    let Json(req) = payload?;

    let (Some(student_id), Some(name), Some(class)) = (
        required(req.student_id),
        required(req.name),
        required(req.class_name),
    ) else {
        return Err(AppError::Validation(
            "Missing student_id, name or className".to_string(),
        ));
    };
    check_length("student_id", &student_id, STUDENT_ID_MAX_LEN)?;
    check_length("name", &name, NAME_MAX_LEN)?;
    check_length("className", &class, CLASS_MAX_LEN)?;

    let student = state
        .store
        .create_student(CreateStudentData {
            face_encoding_id: Some(student_id.clone()),
            student_id,
            name,
            class,
            photo_path: required(req.photo_path),
        })
        .await?;

    tracing::info!(student_id = %student.student_id, class = %student.class, "Student enrolled");

    Ok(Json(StudentResponse {
        student,
        message: Some("Student enrolled successfully"),
    }))
}

async fn get_student(
    State(state): State<AppState>,
    path: std::result::Result<Path<Uuid>, PathRejection>,
) -> Result<Json<StudentResponse>> {
    let Path(id) = path?;

    let student = state
        .store
        .find_student(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Student {} not found", id)))?;

    Ok(Json(StudentResponse {
        student,
        message: None,
    }))
}

/// Update a student's name and class
async fn update_student(
    State(state): State<AppState>,
    path: std::result::Result<Path<Uuid>, PathRejection>,
    payload: std::result::Result<Json<UpdateStudentRequest>, JsonRejection>,
) -> Result<Json<StudentResponse>> {
    let Path(id) = path?;
    let Json(req) = payload?;

    let (Some(name), Some(class)) = (required(req.name), required(req.class)) else {
        return Err(AppError::Validation("Missing name or class".to_string()));
    };
    check_length("name", &name, NAME_MAX_LEN)?;
    check_length("class", &class, CLASS_MAX_LEN)?;

    let student = state
        .store
        .update_student(id, &name, &class)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Student {} not found", id)))?;

    tracing::info!(student_id = %student.student_id, "Student updated");

    Ok(Json(StudentResponse {
        student,
        message: None,
    }))
}

/// Delete a student (attendance history is kept)
async fn delete_student(
    State(state): State<AppState>,
    path: std::result::Result<Path<Uuid>, PathRejection>,
) -> Result<Json<DeleteStudentResponse>> {
    let Path(id) = path?;

    if !state.store.delete_student(id).await? {
        return Err(AppError::NotFound(format!("Student {} not found", id)));
    }

    tracing::info!(id = %id, "Student deleted");

    Ok(Json(DeleteStudentResponse {
        success: true,
        message: "Student deleted",
    }))
}

/// Attendance history for a student identifier
async fn student_history(
    State(state): State<AppState>,
    Path(student_id): Path<String>,
    query: std::result::Result<Query<HistoryQuery>, QueryRejection>,
) -> Result<Json<StudentHistoryResponse>> {
    let Query(params) = query?;
    let limit = params.limit.unwrap_or(DEFAULT_HISTORY_LIMIT);
    if !(1..=MAX_HISTORY_LIMIT).contains(&limit) {
        return Err(AppError::Validation(format!(
            "limit must be between 1 and {}",
            MAX_HISTORY_LIMIT
        )));
    }

    let attendance = state.store.student_attendance(&student_id, limit).await?;

    Ok(Json(StudentHistoryResponse {
        student_id,
        attendance,
    }))
}

/// Ask the recognition service which students lack face embeddings
async fn check_embeddings(
    State(state): State<AppState>,
    payload: std::result::Result<Json<CheckEmbeddingsRequest>, JsonRejection>,
) -> Result<Json<CheckStudentsResult>> {
    let Json(req) = payload?;

    let student_ids: Vec<String> = req
        .student_ids
        .into_iter()
        .filter_map(|id| required(Some(id)))
        .collect();

    if student_ids.is_empty() {
        return Ok(Json(CheckStudentsResult::default()));
    }

    let result = state.recognition.check_students(&student_ids).await?;
    Ok(Json(result))
}

/// Register face embeddings for students with the recognition service
async fn embed_students(
    State(state): State<AppState>,
    payload: std::result::Result<Json<EmbedRequest>, JsonRejection>,
) -> Result<Json<EmbedResult>> {
    let Json(req) = payload?;

    let targets = resolve_embed_targets(state.store.as_ref(), req).await?;
    if targets.is_empty() {
        return Err(AppError::Validation(
            "Missing students or student_ids".to_string(),
        ));
    }

    let result = state.recognition.embed_students(&targets).await?;

    for failure in &result.failed {
        tracing::warn!(student_id = %failure.id, reason = %failure.reason, "Embedding failed");
    }

    Ok(Json(result))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/students", get(list_students))
        .route("/students/enroll", post(enroll_student))
        .route("/students/check-embeddings", post(check_embeddings))
        .route("/students/embed", post(embed_students))
        .route(
            "/students/:id",
            get(get_student).put(update_student).delete(delete_student),
        )
        .route("/students/:id/attendance", get(student_history))
}
