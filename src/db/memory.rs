//! In-memory [`AttendanceStore`] used by the unit tests.
//!
//! Mirrors the PostgreSQL constraints the workflow relies on: unique
//! `student_id`, one attendance row per (session, student) and the
//! VARCHAR column widths.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use super::store::{AttendanceStore, StoreError};
use crate::models::{
    attendance::{Attendance, AttendanceStatus, SessionAttendance, StudentAttendance},
    session::{CreateSessionData, Session, STATUS_ACTIVE, STATUS_ENDED},
    student::{CreateStudentData, Student},
    fits, CLASS_MAX_LEN, NAME_MAX_LEN, STUDENT_ID_MAX_LEN, SUBJECT_MAX_LEN, TEACHER_ID_MAX_LEN,
};

/// Rejects values wider than their PostgreSQL column
fn check_width(column: &str, value: &str, max: usize) -> Result<(), StoreError> {
    if fits(value, max) {
        Ok(())
    } else {
        Err(StoreError::Invalid(format!(
            "value too long for {} (max {} characters)",
            column, max
        )))
    }
}

#[derive(Default)]
struct Tables {
    students: Vec<Student>,
    sessions: HashMap<Uuid, Session>,
    attendance: Vec<Attendance>,
}

#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raw attendance rows for a session
    pub fn attendance_rows(&self, session_id: Uuid) -> Vec<Attendance> {
        let tables = self.tables.lock().unwrap();
        tables
            .attendance
            .iter()
            .filter(|a| a.session_id == session_id)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl AttendanceStore for MemoryStore {
    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }

    async fn create_student(&self, data: CreateStudentData) -> Result<Student, StoreError> {
        check_width("student_id", &data.student_id, STUDENT_ID_MAX_LEN)?;
        check_width("name", &data.name, NAME_MAX_LEN)?;
        check_width("class", &data.class, CLASS_MAX_LEN)?;

        let mut tables = self.tables.lock().unwrap();
        if tables.students.iter().any(|s| s.student_id == data.student_id) {
            return Err(StoreError::Conflict(format!(
                "student_id {} already exists",
                data.student_id
            )));
        }

        let now = Utc::now();
        let student = Student {
            id: Uuid::new_v4(),
            student_id: data.student_id,
            name: data.name,
            class: data.class,
            face_encoding_id: data.face_encoding_id,
            photo_path: data.photo_path,
            created_at: now,
            updated_at: now,
        };
        tables.students.push(student.clone());
        Ok(student)
    }

    async fn find_student(&self, id: Uuid) -> Result<Option<Student>, StoreError> {
        let tables = self.tables.lock().unwrap();
        Ok(tables.students.iter().find(|s| s.id == id).cloned())
    }

    async fn find_student_by_student_id(
        &self,
        student_id: &str,
    ) -> Result<Option<Student>, StoreError> {
        let tables = self.tables.lock().unwrap();
        Ok(tables
            .students
            .iter()
            .find(|s| s.student_id == student_id)
            .cloned())
    }

    async fn list_students(&self) -> Result<Vec<Student>, StoreError> {
        let tables = self.tables.lock().unwrap();
        let mut students = tables.students.clone();
        students.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(students)
    }

    async fn update_student(
        &self,
        id: Uuid,
        name: &str,
        class: &str,
    ) -> Result<Option<Student>, StoreError> {
        check_width("name", name, NAME_MAX_LEN)?;
        check_width("class", class, CLASS_MAX_LEN)?;

        let mut tables = self.tables.lock().unwrap();
        Ok(tables.students.iter_mut().find(|s| s.id == id).map(|s| {
            s.name = name.to_string();
            s.class = class.to_string();
            s.updated_at = Utc::now();
            s.clone()
        }))
    }

    async fn delete_student(&self, id: Uuid) -> Result<bool, StoreError> {
        let mut tables = self.tables.lock().unwrap();
        let before = tables.students.len();
        tables.students.retain(|s| s.id != id);
        Ok(tables.students.len() != before)
    }

    async fn create_session(&self, data: CreateSessionData) -> Result<Session, StoreError> {
        check_width("class", &data.class, CLASS_MAX_LEN)?;
        check_width("subject", &data.subject, SUBJECT_MAX_LEN)?;
        check_width("teacher_id", &data.teacher_id, TEACHER_ID_MAX_LEN)?;

        let now = Utc::now();
        let session = Session {
            id: Uuid::new_v4(),
            class: data.class,
            subject: data.subject,
            teacher_id: data.teacher_id,
            started_at: now,
            ended_at: None,
            status: STATUS_ACTIVE.to_string(),
            created_at: now,
        };
        let mut tables = self.tables.lock().unwrap();
        tables.sessions.insert(session.id, session.clone());
        Ok(session)
    }

    async fn find_session(&self, id: Uuid) -> Result<Option<Session>, StoreError> {
        let tables = self.tables.lock().unwrap();
        Ok(tables.sessions.get(&id).cloned())
    }

    async fn find_active_session(&self, class: &str) -> Result<Option<Session>, StoreError> {
        let tables = self.tables.lock().unwrap();
        Ok(tables
            .sessions
            .values()
            .filter(|s| s.class == class && s.is_active())
            .max_by_key(|s| s.started_at)
            .cloned())
    }

    async fn end_session(&self, id: Uuid) -> Result<Option<Session>, StoreError> {
        let mut tables = self.tables.lock().unwrap();
        Ok(tables.sessions.get_mut(&id).map(|s| {
            s.status = STATUS_ENDED.to_string();
            if s.ended_at.is_none() {
                s.ended_at = Some(Utc::now());
            }
            s.clone()
        }))
    }

    async fn record_detection(
        &self,
        session_id: Uuid,
        student_id: &str,
        confidence: f64,
    ) -> Result<Option<Attendance>, StoreError> {
        check_width("student_id", student_id, STUDENT_ID_MAX_LEN)?;

        let mut tables = self.tables.lock().unwrap();
        if !tables.sessions.contains_key(&session_id) {
            return Err(StoreError::Database(sqlx::Error::RowNotFound));
        }
        if tables
            .attendance
            .iter()
            .any(|a| a.session_id == session_id && a.student_id == student_id)
        {
            return Ok(None);
        }

        let now = Utc::now();
        let row = Attendance {
            id: Uuid::new_v4(),
            session_id,
            student_id: student_id.to_string(),
            confidence,
            status: AttendanceStatus::Present.as_str().to_string(),
            manual: false,
            recorded_at: now,
            created_at: now,
        };
        tables.attendance.push(row.clone());
        Ok(Some(row))
    }

    async fn record_manual(
        &self,
        session_id: Uuid,
        student_id: &str,
        status: AttendanceStatus,
        confidence: f64,
    ) -> Result<Attendance, StoreError> {
        check_width("student_id", student_id, STUDENT_ID_MAX_LEN)?;

        let mut tables = self.tables.lock().unwrap();
        if !tables.sessions.contains_key(&session_id) {
            return Err(StoreError::Database(sqlx::Error::RowNotFound));
        }

        let now = Utc::now();
        if let Some(row) = tables
            .attendance
            .iter_mut()
            .find(|a| a.session_id == session_id && a.student_id == student_id)
        {
            row.confidence = confidence;
            row.status = status.as_str().to_string();
            row.manual = true;
            row.recorded_at = now;
            return Ok(row.clone());
        }

        let row = Attendance {
            id: Uuid::new_v4(),
            session_id,
            student_id: student_id.to_string(),
            confidence,
            status: status.as_str().to_string(),
            manual: true,
            recorded_at: now,
            created_at: now,
        };
        tables.attendance.push(row.clone());
        Ok(row)
    }

    async fn session_attendance(
        &self,
        session_id: Uuid,
    ) -> Result<Vec<SessionAttendance>, StoreError> {
        let tables = self.tables.lock().unwrap();
        let mut rows: Vec<SessionAttendance> = tables
            .attendance
            .iter()
            .filter(|a| a.session_id == session_id)
            .map(|a| SessionAttendance {
                attendance: a.clone(),
                student_name: tables
                    .students
                    .iter()
                    .find(|s| s.student_id == a.student_id)
                    .map(|s| s.name.clone()),
            })
            .collect();
        rows.sort_by(|a, b| b.attendance.recorded_at.cmp(&a.attendance.recorded_at));
        Ok(rows)
    }

    async fn student_attendance(
        &self,
        student_id: &str,
        limit: i64,
    ) -> Result<Vec<StudentAttendance>, StoreError> {
        let tables = self.tables.lock().unwrap();
        let class = tables
            .students
            .iter()
            .find(|s| s.student_id == student_id)
            .map(|s| s.class.clone());
        let mut rows: Vec<StudentAttendance> = tables
            .attendance
            .iter()
            .filter(|a| a.student_id == student_id)
            .map(|a| StudentAttendance {
                attendance: a.clone(),
                class: class.clone(),
                subject: tables.sessions.get(&a.session_id).map(|s| s.subject.clone()),
            })
            .collect();
        rows.sort_by(|a, b| b.attendance.recorded_at.cmp(&a.attendance.recorded_at));
        rows.truncate(limit.max(0) as usize);
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_rejects_values_wider_than_columns() {
        let store = MemoryStore::new();
        let session = store
            .create_session(CreateSessionData {
                class: "10-A".to_string(),
                subject: "Mathematics".to_string(),
                teacher_id: "teacher-001".to_string(),
            })
            .await
            .unwrap();

        let long_id = "S".repeat(STUDENT_ID_MAX_LEN + 1);
        let result = store.record_detection(session.id, &long_id, 0.9).await;
        assert!(matches!(result, Err(StoreError::Invalid(_))));

        let result = store
            .create_session(CreateSessionData {
                class: "C".repeat(CLASS_MAX_LEN + 1),
                subject: String::new(),
                teacher_id: "teacher-001".to_string(),
            })
            .await;
        assert!(matches!(result, Err(StoreError::Invalid(_))));

        let exact = "S".repeat(STUDENT_ID_MAX_LEN);
        assert!(store
            .record_detection(session.id, &exact, 0.9)
            .await
            .unwrap()
            .is_some());
    }
}
