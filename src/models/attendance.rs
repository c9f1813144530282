use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttendanceStatus {
    Present,
    Absent,
}

impl AttendanceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttendanceStatus::Present => "present",
            AttendanceStatus::Absent => "absent",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Attendance {
    pub id: Uuid,
    pub session_id: Uuid,
    pub student_id: String,
    pub confidence: f64,
    pub status: String, // 'present', 'absent'
    pub manual: bool,
    pub recorded_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl Attendance {
    pub fn is_present(&self) -> bool {
        self.status == AttendanceStatus::Present.as_str()
    }
}

/// Attendance row joined with the student's display name
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct SessionAttendance {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub attendance: Attendance,
    pub student_name: Option<String>,
}

/// Attendance row joined with the student's class and the session subject
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct StudentAttendance {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub attendance: Attendance,
    pub class: Option<String>,
    pub subject: Option<String>,
}

impl Attendance {
    /// Records an automatic detection
    ///
    /// Returns `None` when a row already exists for the (session, student) pair;
    /// the existing row, automatic or manual, is left untouched.
    pub async fn record_detection(
        pool: &PgPool,
        session_id: Uuid,
        student_id: &str,
        confidence: f64,
    ) -> Result<Option<Self>, sqlx::Error> {
        let attendance = sqlx::query_as::<_, Self>(
            r#"
            INSERT INTO attendance (session_id, student_id, confidence, status, manual)
            VALUES ($1, $2, $3, 'present', FALSE)
            ON CONFLICT (session_id, student_id) DO NOTHING
            RETURNING *
            "#,
        )
        .bind(session_id)
        .bind(student_id)
        .bind(confidence)
        .fetch_optional(pool)
        .await?;

        Ok(attendance)
    }

    /// Records a teacher override, replacing whatever was recorded before
    pub async fn record_manual(
        pool: &PgPool,
        session_id: Uuid,
        student_id: &str,
        status: AttendanceStatus,
        confidence: f64,
    ) -> Result<Self, sqlx::Error> {
        let attendance = sqlx::query_as::<_, Self>(
            r#"
            INSERT INTO attendance (session_id, student_id, confidence, status, manual)
            VALUES ($1, $2, $3, $4, TRUE)
            ON CONFLICT (session_id, student_id) DO UPDATE
            SET
                confidence = EXCLUDED.confidence,
                status = EXCLUDED.status,
                manual = TRUE,
                recorded_at = NOW()
            RETURNING *
            "#,
        )
        .bind(session_id)
        .bind(student_id)
        .bind(confidence)
        .bind(status.as_str())
        .fetch_one(pool)
        .await?;

        Ok(attendance)
    }

    /// Lists attendance for a session, newest first
    pub async fn list_by_session(
        pool: &PgPool,
        session_id: Uuid,
    ) -> Result<Vec<SessionAttendance>, sqlx::Error> {
        let rows = sqlx::query_as::<_, SessionAttendance>(
            r#"
            SELECT a.*, s.name AS student_name
            FROM attendance a
            LEFT JOIN students s ON a.student_id = s.student_id
            WHERE a.session_id = $1
            ORDER BY a.recorded_at DESC
            "#,
        )
        .bind(session_id)
        .fetch_all(pool)
        .await?;

        Ok(rows)
    }

    /// Lists a student's attendance history across sessions, newest first
    pub async fn list_by_student(
        pool: &PgPool,
        student_id: &str,
        limit: i64,
    ) -> Result<Vec<StudentAttendance>, sqlx::Error> {
        let rows = sqlx::query_as::<_, StudentAttendance>(
            r#"
            SELECT a.*, st.class AS class, se.subject AS subject
            FROM attendance a
            LEFT JOIN students st ON a.student_id = st.student_id
            LEFT JOIN sessions se ON a.session_id = se.id
            WHERE a.student_id = $1
            ORDER BY a.recorded_at DESC
            LIMIT $2
            "#,
        )
        .bind(student_id)
        .bind(limit)
        .fetch_all(pool)
        .await?;

        Ok(rows)
    }
}
