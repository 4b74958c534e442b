/// In-app notification model and database operations
///
/// Notifications are written by the backend (saved-search alerts, account
/// events) and read by clients. Marking as read is monotonic: `read_at`
/// keeps its original timestamp when a notification is marked twice.
///
/// # Schema
///
/// ```sql
/// CREATE TABLE notifications (
///     id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
///     user_id UUID NOT NULL REFERENCES users(id) ON DELETE CASCADE,
///     notification_type VARCHAR(50) NOT NULL,
///     title VARCHAR(200) NOT NULL,
///     message TEXT NOT NULL,
///     payload JSONB NOT NULL DEFAULT '{}',
///     is_read BOOLEAN NOT NULL DEFAULT FALSE,
///     read_at TIMESTAMPTZ,
///     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
/// );
/// ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::PgPool;
use uuid::Uuid;

/// Notification model
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Notification {
    pub id: Uuid,
    pub user_id: Uuid,

    /// Free-form type tag, e.g. `saved_search_match` or `account`
    pub notification_type: String,

    pub title: String,
    pub message: String,

    /// Structured payload for client deep-linking
    pub payload: Json<serde_json::Value>,

    pub is_read: bool,
    pub read_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Input for creating a notification
#[derive(Debug, Clone)]
pub struct CreateNotification {
    pub user_id: Uuid,
    pub notification_type: String,
    pub title: String,
    pub message: String,
    pub payload: serde_json::Value,
}

const NOTIFICATION_COLUMNS: &str =
    "id, user_id, notification_type, title, message, payload, is_read, read_at, created_at";

impl Notification {
    /// Creates a notification
    pub async fn create(pool: &PgPool, data: CreateNotification) -> Result<Self, sqlx::Error> {
        let query = format!(
            r#"
            INSERT INTO notifications (user_id, notification_type, title, message, payload)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {NOTIFICATION_COLUMNS}
            "#
        );

        sqlx::query_as::<_, Notification>(&query)
            .bind(data.user_id)
            .bind(data.notification_type)
            .bind(data.title)
            .bind(data.message)
            .bind(Json(data.payload))
            .fetch_one(pool)
            .await
    }

    /// Lists a user's notifications, newest first
    ///
    /// When `unread_only` is set, read notifications are filtered out.
    pub async fn list_for_user(
        pool: &PgPool,
        user_id: Uuid,
        unread_only: bool,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Self>, sqlx::Error> {
        let query = format!(
            r#"
            SELECT {NOTIFICATION_COLUMNS} FROM notifications
            WHERE user_id = $1 AND ($2 = FALSE OR is_read = FALSE)
            ORDER BY created_at DESC
            LIMIT $3 OFFSET $4
            "#
        );

        sqlx::query_as::<_, Notification>(&query)
            .bind(user_id)
            .bind(unread_only)
            .bind(limit)
            .bind(offset)
            .fetch_all(pool)
            .await
    }

    /// Counts a user's notifications, optionally unread only
    pub async fn count_for_user(
        pool: &PgPool,
        user_id: Uuid,
        unread_only: bool,
    ) -> Result<i64, sqlx::Error> {
        let (count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM notifications \
             WHERE user_id = $1 AND ($2 = FALSE OR is_read = FALSE)",
        )
        .bind(user_id)
        .bind(unread_only)
        .fetch_one(pool)
        .await?;

        Ok(count)
    }

    /// Counts unread notifications for the badge counter
    pub async fn unread_count(pool: &PgPool, user_id: Uuid) -> Result<i64, sqlx::Error> {
        Self::count_for_user(pool, user_id, true).await
    }

    /// Marks one notification as read
    ///
    /// Idempotent: `read_at` is set only on the first call via COALESCE, so
    /// repeated marks keep the original timestamp. Returns the updated row
    /// or `None` if it does not exist or belongs to another user.
    pub async fn mark_as_read(
        pool: &PgPool,
        id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<Self>, sqlx::Error> {
        let query = format!(
            r#"
            UPDATE notifications
            SET is_read = TRUE, read_at = COALESCE(read_at, NOW())
            WHERE id = $1 AND user_id = $2
            RETURNING {NOTIFICATION_COLUMNS}
            "#
        );

        sqlx::query_as::<_, Notification>(&query)
            .bind(id)
            .bind(user_id)
            .fetch_optional(pool)
            .await
    }

    /// Marks all of a user's unread notifications as read
    ///
    /// Returns the number of rows updated.
    pub async fn mark_all_as_read(pool: &PgPool, user_id: Uuid) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE notifications SET is_read = TRUE, read_at = COALESCE(read_at, NOW()) \
             WHERE user_id = $1 AND is_read = FALSE",
        )
        .bind(user_id)
        .execute(pool)
        .await?;

        Ok(result.rows_affected())
    }

    /// Deletes a notification owned by a user
    ///
    /// Returns `true` if a row was deleted.
    pub async fn delete(pool: &PgPool, id: Uuid, user_id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM notifications WHERE id = $1 AND user_id = $2")
            .bind(id)
            .bind(user_id)
            .execute(pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_notification_serializes_payload_inline() {
        let notification = Notification {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            notification_type: "saved_search_match".to_string(),
            title: "New matches".to_string(),
            message: "3 new properties match your search".to_string(),
            payload: Json(serde_json::json!({"saved_search_id": "abc", "count": 3})),
            is_read: false,
            read_at: None,
            created_at: Utc::now(),
        };

        let value = serde_json::to_value(&notification).unwrap();
        assert_eq!(value["payload"]["count"], 3);
        assert_eq!(value["is_read"], false);
        assert!(value["read_at"].is_null());
    }
}
