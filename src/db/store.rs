use async_trait::async_trait;
use sqlx::PgPool;
use thiserror::Error;
use uuid::Uuid;

use crate::models::{
    attendance::{Attendance, AttendanceStatus, SessionAttendance, StudentAttendance},
    session::{CreateSessionData, Session},
    student::{CreateStudentData, Student},
};

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Duplicate record: {0}")]
    Conflict(String),

    #[error("{0}")]
    Invalid(String),

    #[error("Database error: {0}")]
    Database(sqlx::Error),
}

/// SQLSTATE for a value longer than its column
const STRING_DATA_RIGHT_TRUNCATION: &str = "22001";

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        if let Some(db_err) = err.as_database_error() {
            if db_err.is_unique_violation() {
                return StoreError::Conflict(db_err.message().to_string());
            }
            if db_err.code().as_deref() == Some(STRING_DATA_RIGHT_TRUNCATION) {
                return StoreError::Invalid(db_err.message().to_string());
            }
        }
        StoreError::Database(err)
    }
}

/// Persistence operations the attendance workflow depends on
#[async_trait]
pub trait AttendanceStore: Send + Sync {
    /// Round-trips to the backing store
    async fn ping(&self) -> Result<(), StoreError>;

    async fn create_student(&self, data: CreateStudentData) -> Result<Student, StoreError>;
    async fn find_student(&self, id: Uuid) -> Result<Option<Student>, StoreError>;
    async fn find_student_by_student_id(
        &self,
        student_id: &str,
    ) -> Result<Option<Student>, StoreError>;
    async fn list_students(&self) -> Result<Vec<Student>, StoreError>;
    async fn update_student(
        &self,
        id: Uuid,
        name: &str,
        class: &str,
    ) -> Result<Option<Student>, StoreError>;
    async fn delete_student(&self, id: Uuid) -> Result<bool, StoreError>;

    async fn create_session(&self, data: CreateSessionData) -> Result<Session, StoreError>;
    async fn find_session(&self, id: Uuid) -> Result<Option<Session>, StoreError>;
    async fn find_active_session(&self, class: &str) -> Result<Option<Session>, StoreError>;
    async fn end_session(&self, id: Uuid) -> Result<Option<Session>, StoreError>;

    /// Inserts a `present` row unless one exists for the pair
    async fn record_detection(
        &self,
        session_id: Uuid,
        student_id: &str,
        confidence: f64,
    ) -> Result<Option<Attendance>, StoreError>;

    /// Upserts a teacher override
    async fn record_manual(
        &self,
        session_id: Uuid,
        student_id: &str,
        status: AttendanceStatus,
        confidence: f64,
    ) -> Result<Attendance, StoreError>;

    async fn session_attendance(
        &self,
        session_id: Uuid,
    ) -> Result<Vec<SessionAttendance>, StoreError>;
    async fn student_attendance(
        &self,
        student_id: &str,
        limit: i64,
    ) -> Result<Vec<StudentAttendance>, StoreError>;
}

/// PostgreSQL-backed store
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AttendanceStore for PgStore {
    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn create_student(&self, data: CreateStudentData) -> Result<Student, StoreError> {
        Ok(Student::create(&self.pool, data).await?)
    }

    async fn find_student(&self, id: Uuid) -> Result<Option<Student>, StoreError> {
        Ok(Student::find_by_id(&self.pool, id).await?)
    }

    async fn find_student_by_student_id(
        &self,
        student_id: &str,
    ) -> Result<Option<Student>, StoreError> {
        Ok(Student::find_by_student_id(&self.pool, student_id).await?)
    }

    async fn list_students(&self) -> Result<Vec<Student>, StoreError> {
        Ok(Student::list_all(&self.pool).await?)
    }

    async fn update_student(
        &self,
        id: Uuid,
        name: &str,
        class: &str,
    ) -> Result<Option<Student>, StoreError> {
        Ok(Student::update(&self.pool, id, name, class).await?)
    }

    async fn delete_student(&self, id: Uuid) -> Result<bool, StoreError> {
        Ok(Student::delete(&self.pool, id).await?)
    }

    async fn create_session(&self, data: CreateSessionData) -> Result<Session, StoreError> {
        Ok(Session::create(&self.pool, data).await?)
    }

    async fn find_session(&self, id: Uuid) -> Result<Option<Session>, StoreError> {
        Ok(Session::find_by_id(&self.pool, id).await?)
    }

    async fn find_active_session(&self, class: &str) -> Result<Option<Session>, StoreError> {
        Ok(Session::find_active_by_class(&self.pool, class).await?)
    }

    async fn end_session(&self, id: Uuid) -> Result<Option<Session>, StoreError> {
        Ok(Session::end(&self.pool, id).await?)
    }

    async fn record_detection(
        &self,
        session_id: Uuid,
        student_id: &str,
        confidence: f64,
    ) -> Result<Option<Attendance>, StoreError> {
        Ok(Attendance::record_detection(&self.pool, session_id, student_id, confidence).await?)
    }

    async fn record_manual(
        &self,
        session_id: Uuid,
        student_id: &str,
        status: AttendanceStatus,
        confidence: f64,
    ) -> Result<Attendance, StoreError> {
        Ok(
            Attendance::record_manual(&self.pool, session_id, student_id, status, confidence)
                .await?,
        )
    }

    async fn session_attendance(
        &self,
        session_id: Uuid,
    ) -> Result<Vec<SessionAttendance>, StoreError> {
        Ok(Attendance::list_by_session(&self.pool, session_id).await?)
    }

    async fn student_attendance(
        &self,
        student_id: &str,
        limit: i64,
    ) -> Result<Vec<StudentAttendance>, StoreError> {
        Ok(Attendance::list_by_student(&self.pool, student_id, limit).await?)
    }
}
