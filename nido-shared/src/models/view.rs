/// Property view log with deduplication
///
/// Every public property fetch records a view, but repeat visits by the
/// same user within one hour are deduplicated so refresh loops do not
/// inflate the counter. Anonymous views are never deduplicated because
/// there is no identity to match on.
///
/// # Schema
///
/// ```sql
/// CREATE TABLE property_views (
///     id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
///     property_id UUID NOT NULL REFERENCES properties(id) ON DELETE CASCADE,
///     user_id UUID REFERENCES users(id) ON DELETE SET NULL,
///     viewed_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
/// );
/// ```

use sqlx::PgPool;
use uuid::Uuid;

/// Time window within which repeat views by the same user are dropped
pub const VIEW_DEDUP_WINDOW: &str = "1 hour";

/// Records a view of a property, bumping the denormalized counter
///
/// Returns `true` when a view was recorded, `false` when it was
/// deduplicated. The log insert and the counter bump happen in one
/// transaction.
pub async fn record_view(
    pool: &PgPool,
    property_id: Uuid,
    user_id: Option<Uuid>,
) -> Result<bool, sqlx::Error> {
    if let Some(user_id) = user_id {
        let (seen,): (bool,) = sqlx::query_as(
            "SELECT EXISTS(SELECT 1 FROM property_views \
             WHERE property_id = $1 AND user_id = $2 \
               AND viewed_at > NOW() - INTERVAL '1 hour')",
        )
        .bind(property_id)
        .bind(user_id)
        .fetch_one(pool)
        .await?;

        if seen {
            return Ok(false);
        }
    }

    let mut tx = pool.begin().await?;

    sqlx::query("INSERT INTO property_views (property_id, user_id) VALUES ($1, $2)")
        .bind(property_id)
        .bind(user_id)
        .execute(&mut *tx)
        .await?;

    sqlx::query("UPDATE properties SET views = views + 1 WHERE id = $1")
        .bind(property_id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;

    Ok(true)
}

/// Counts logged views for a property
pub async fn count_views(pool: &PgPool, property_id: Uuid) -> Result<i64, sqlx::Error> {
    let (count,): (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM property_views WHERE property_id = $1")
            .bind(property_id)
            .fetch_one(pool)
            .await?;

    Ok(count)
}

// Integration tests live in tests/
