/// Property favorite join rows and counter maintenance
///
/// The denormalized `properties.favorites` counter is kept in step with the
/// join table inside a single transaction, so the card counts shown in
/// search results never drift from the actual rows.
///
/// # Schema
///
/// ```sql
/// CREATE TABLE property_favorites (
///     id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
///     user_id UUID NOT NULL REFERENCES users(id) ON DELETE CASCADE,
///     property_id UUID NOT NULL REFERENCES properties(id) ON DELETE CASCADE,
///     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     UNIQUE (user_id, property_id)
/// );
/// ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

/// Favorite join row
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Favorite {
    pub id: Uuid,
    pub user_id: Uuid,
    pub property_id: Uuid,
    pub created_at: DateTime<Utc>,
}

impl Favorite {
    /// Toggles a favorite for a user and property
    ///
    /// Adds the favorite if absent, removes it if present, and adjusts the
    /// property's favorite counter in the same transaction. Returns `true`
    /// when the property is favorited after the call.
    pub async fn toggle(
        pool: &PgPool,
        user_id: Uuid,
        property_id: Uuid,
    ) -> Result<bool, sqlx::Error> {
        let mut tx = pool.begin().await?;

        let deleted = sqlx::query(
            "DELETE FROM property_favorites WHERE user_id = $1 AND property_id = $2",
        )
        .bind(user_id)
        .bind(property_id)
        .execute(&mut *tx)
        .await?;

        let favorited = if deleted.rows_affected() > 0 {
            sqlx::query(
                "UPDATE properties SET favorites = GREATEST(favorites - 1, 0) WHERE id = $1",
            )
            .bind(property_id)
            .execute(&mut *tx)
            .await?;

            false
        } else {
            sqlx::query(
                "INSERT INTO property_favorites (user_id, property_id) VALUES ($1, $2)",
            )
            .bind(user_id)
            .bind(property_id)
            .execute(&mut *tx)
            .await?;

            sqlx::query("UPDATE properties SET favorites = favorites + 1 WHERE id = $1")
                .bind(property_id)
                .execute(&mut *tx)
                .await?;

            true
        };

        tx.commit().await?;

        Ok(favorited)
    }

    /// Whether a user has favorited a property
    pub async fn exists(
        pool: &PgPool,
        user_id: Uuid,
        property_id: Uuid,
    ) -> Result<bool, sqlx::Error> {
        let (exists,): (bool,) = sqlx::query_as(
            "SELECT EXISTS(SELECT 1 FROM property_favorites \
             WHERE user_id = $1 AND property_id = $2)",
        )
        .bind(user_id)
        .bind(property_id)
        .fetch_one(pool)
        .await?;

        Ok(exists)
    }

    /// Property IDs a user has favorited, newest first
    pub async fn list_property_ids(
        pool: &PgPool,
        user_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Uuid>, sqlx::Error> {
        let rows: Vec<(Uuid,)> = sqlx::query_as(
            r#"
            SELECT property_id FROM property_favorites
            WHERE user_id = $1
            ORDER BY created_at DESC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(user_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(pool)
        .await?;

        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    /// Counts a user's favorites
    pub async fn count_for_user(pool: &PgPool, user_id: Uuid) -> Result<i64, sqlx::Error> {
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM property_favorites WHERE user_id = $1")
                .bind(user_id)
                .fetch_one(pool)
                .await?;

        Ok(count)
    }
}

// Integration tests live in tests/
