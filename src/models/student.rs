use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Student {
    pub id: Uuid,
    pub student_id: String,
    pub name: String,
    pub class: String,
    pub face_encoding_id: Option<String>,
    pub photo_path: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct CreateStudentData {
    pub student_id: String,
    pub name: String,
    pub class: String,
    pub face_encoding_id: Option<String>,
    pub photo_path: Option<String>,
}

impl Student {
    /// Enrolls a new student
    pub async fn create(pool: &PgPool, data: CreateStudentData) -> Result<Self, sqlx::Error> {
        let student = sqlx::query_as::<_, Self>(
            r#"
            INSERT INTO students (student_id, name, class, face_encoding_id, photo_path)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *
            "#,
        )
        .bind(&data.student_id)
        .bind(&data.name)
        .bind(&data.class)
        .bind(&data.face_encoding_id)
        .bind(&data.photo_path)
        .fetch_one(pool)
        .await?;

        Ok(student)
    }

    /// Finds a student by internal ID
    pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        let student = sqlx::query_as::<_, Self>(
            r#"
            SELECT * FROM students WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(pool)
        .await?;

        Ok(student)
    }

    /// Finds a student by the external student identifier
    pub async fn find_by_student_id(
        pool: &PgPool,
        student_id: &str,
    ) -> Result<Option<Self>, sqlx::Error> {
        let student = sqlx::query_as::<_, Self>(
            r#"
            SELECT * FROM students WHERE student_id = $1
            "#,
        )
        .bind(student_id)
        .fetch_optional(pool)
        .await?;

        Ok(student)
    }

    pub async fn list_all(pool: &PgPool) -> Result<Vec<Self>, sqlx::Error> {
        let students = sqlx::query_as::<_, Self>(
            r#"
            SELECT * FROM students ORDER BY name
            "#,
        )
        .fetch_all(pool)
        .await?;

        Ok(students)
    }

    /// Updates name and class. Returns `None` when the student does not exist.
    pub async fn update(
        pool: &PgPool,
        id: Uuid,
        name: &str,
        class: &str,
    ) -> Result<Option<Self>, sqlx::Error> {
        let student = sqlx::query_as::<_, Self>(
            r#"
            UPDATE students
            SET name = $2, class = $3, updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(name)
        .bind(class)
        .fetch_optional(pool)
        .await?;

        Ok(student)
    }

    /// Deletes a student record. Attendance rows for the student are kept.
    pub async fn delete(pool: &PgPool, id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            DELETE FROM students WHERE id = $1
            "#,
        )
        .bind(id)
        .execute(pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}
