use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

pub const STATUS_ACTIVE: &str = "active";
pub const STATUS_ENDED: &str = "ended";

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Session {
    pub id: Uuid,
    pub class: String,
    pub subject: String,
    pub teacher_id: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub status: String, // 'active', 'ended'
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct CreateSessionData {
    pub class: String,
    pub subject: String,
    pub teacher_id: String,
}

impl Session {
    /// Creates a new session in `active` status
    pub async fn create(pool: &PgPool, data: CreateSessionData) -> Result<Self, sqlx::Error> {
        let session = sqlx::query_as::<_, Self>(
            r#"
            INSERT INTO sessions (class, subject, teacher_id, status)
            VALUES ($1, $2, $3, 'active')
            RETURNING *
            "#,
        )
        .bind(&data.class)
        .bind(&data.subject)
        .bind(&data.teacher_id)
        .fetch_one(pool)
        .await?;

        Ok(session)
    }

    pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        let session = sqlx::query_as::<_, Self>(
            r#"
            SELECT * FROM sessions WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(pool)
        .await?;

        Ok(session)
    }

    /// Most recently started active session for a class
    pub async fn find_active_by_class(
        pool: &PgPool,
        class: &str,
    ) -> Result<Option<Self>, sqlx::Error> {
        let session = sqlx::query_as::<_, Self>(
            r#"
            SELECT * FROM sessions
            WHERE class = $1 AND status = 'active'
            ORDER BY started_at DESC
            LIMIT 1
            "#,
        )
        .bind(class)
        .fetch_optional(pool)
        .await?;

        Ok(session)
    }

    /// Marks a session as ended
    ///
    /// Re-ending keeps the first `ended_at`.
    pub async fn end(pool: &PgPool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        let session = sqlx::query_as::<_, Self>(
            r#"
            UPDATE sessions
            SET
                status = 'ended',
                ended_at = COALESCE(ended_at, NOW())
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .fetch_optional(pool)
        .await?;

        Ok(session)
    }

    pub fn is_active(&self) -> bool {
        self.status == STATUS_ACTIVE
    }
}
