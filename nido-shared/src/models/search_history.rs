/// Search history model and database operations
///
/// An append-only log of searches executed by authenticated users. Entries
/// store the raw filter JSON as submitted plus the result count, and are
/// never updated after insert.
///
/// # Schema
///
/// ```sql
/// CREATE TABLE search_history (
///     id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
///     user_id UUID NOT NULL REFERENCES users(id) ON DELETE CASCADE,
///     filters JSONB NOT NULL,
///     result_count INT NOT NULL,
///     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
/// );
/// ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::PgPool;
use uuid::Uuid;

/// One executed search
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct SearchHistoryEntry {
    pub id: Uuid,
    pub user_id: Uuid,

    /// Filter payload as submitted by the client
    pub filters: Json<serde_json::Value>,

    pub result_count: i32,
    pub created_at: DateTime<Utc>,
}

impl SearchHistoryEntry {
    /// Records an executed search
    pub async fn record(
        pool: &PgPool,
        user_id: Uuid,
        filters: serde_json::Value,
        result_count: i32,
    ) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, SearchHistoryEntry>(
            r#"
            INSERT INTO search_history (user_id, filters, result_count)
            VALUES ($1, $2, $3)
            RETURNING id, user_id, filters, result_count, created_at
            "#,
        )
        .bind(user_id)
        .bind(Json(filters))
        .bind(result_count)
        .fetch_one(pool)
        .await
    }

    /// Lists a user's search history, newest first
    pub async fn list_for_user(
        pool: &PgPool,
        user_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, SearchHistoryEntry>(
            r#"
            SELECT id, user_id, filters, result_count, created_at
            FROM search_history
            WHERE user_id = $1
            ORDER BY created_at DESC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(user_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(pool)
        .await
    }

    /// Counts a user's history entries
    pub async fn count_for_user(pool: &PgPool, user_id: Uuid) -> Result<i64, sqlx::Error> {
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM search_history WHERE user_id = $1")
                .bind(user_id)
                .fetch_one(pool)
                .await?;

        Ok(count)
    }

    /// Deletes all history entries for a user
    ///
    /// Returns the number of rows removed.
    pub async fn clear_for_user(pool: &PgPool, user_id: Uuid) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM search_history WHERE user_id = $1")
            .bind(user_id)
            .execute(pool)
            .await?;

        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_serializes_filters_inline() {
        let entry = SearchHistoryEntry {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            filters: Json(serde_json::json!({"city": "Milano", "min_price": 100000.0})),
            result_count: 42,
            created_at: Utc::now(),
        };

        let value = serde_json::to_value(&entry).unwrap();
        assert_eq!(value["filters"]["city"], "Milano");
        assert_eq!(value["result_count"], 42);
    }
}
