/// Property image metadata and database operations
///
/// Each row tracks the storage keys for the original upload plus the three
/// resized variants. Variant keys are nullable because variant generation can
/// fail independently of the original upload; consumers fall back to the
/// original key when a variant is missing.
///
/// # Schema
///
/// ```sql
/// CREATE TABLE property_images (
///     id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
///     property_id UUID NOT NULL REFERENCES properties(id) ON DELETE CASCADE,
///     original_key VARCHAR(512) NOT NULL,
///     small_key VARCHAR(512),
///     medium_key VARCHAR(512),
///     large_key VARCHAR(512),
///     file_name VARCHAR(255) NOT NULL,
///     content_type VARCHAR(100) NOT NULL,
///     file_size BIGINT NOT NULL,
///     width INT NOT NULL,
///     height INT NOT NULL,
///     caption VARCHAR(255),
///     alt_text VARCHAR(255),
///     is_primary BOOLEAN NOT NULL DEFAULT FALSE,
///     display_order INT NOT NULL DEFAULT 0,
///     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
/// );
/// ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

/// Property image model
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct PropertyImage {
    pub id: Uuid,
    pub property_id: Uuid,

    /// Storage key of the original (re-encoded) upload
    pub original_key: String,

    /// Storage keys of the resized variants, when generated
    pub small_key: Option<String>,
    pub medium_key: Option<String>,
    pub large_key: Option<String>,

    pub file_name: String,
    pub content_type: String,
    pub file_size: i64,

    /// Pixel dimensions of the original upload
    pub width: i32,
    pub height: i32,

    pub caption: Option<String>,
    pub alt_text: Option<String>,

    /// At most one primary image per property, enforced transactionally
    /// in `set_primary`
    pub is_primary: bool,

    pub display_order: i32,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for creating a new image row
#[derive(Debug, Clone)]
pub struct CreatePropertyImage {
    pub property_id: Uuid,
    pub original_key: String,
    pub small_key: Option<String>,
    pub medium_key: Option<String>,
    pub large_key: Option<String>,
    pub file_name: String,
    pub content_type: String,
    pub file_size: i64,
    pub width: i32,
    pub height: i32,
    pub caption: Option<String>,
    pub alt_text: Option<String>,
    pub is_primary: bool,
    pub display_order: i32,
}

/// Input for updating image metadata
///
/// Storage keys and dimensions are immutable after upload; only the
/// presentation fields can change.
#[derive(Debug, Clone, Default)]
pub struct UpdatePropertyImage {
    /// `Some(None)` clears the caption
    pub caption: Option<Option<String>>,
    /// `Some(None)` clears the alt text
    pub alt_text: Option<Option<String>>,
    pub display_order: Option<i32>,
}

const IMAGE_COLUMNS: &str = "id, property_id, original_key, small_key, medium_key, large_key, \
     file_name, content_type, file_size, width, height, caption, alt_text, \
     is_primary, display_order, created_at, updated_at";

impl PropertyImage {
    /// Inserts a new image row
    pub async fn create(pool: &PgPool, data: CreatePropertyImage) -> Result<Self, sqlx::Error> {
        let query = format!(
            r#"
            INSERT INTO property_images (property_id, original_key, small_key, medium_key,
                                         large_key, file_name, content_type, file_size,
                                         width, height, caption, alt_text, is_primary,
                                         display_order)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            RETURNING {IMAGE_COLUMNS}
            "#
        );

        sqlx::query_as::<_, PropertyImage>(&query)
            .bind(data.property_id)
            .bind(data.original_key)
            .bind(data.small_key)
            .bind(data.medium_key)
            .bind(data.large_key)
            .bind(data.file_name)
            .bind(data.content_type)
            .bind(data.file_size)
            .bind(data.width)
            .bind(data.height)
            .bind(data.caption)
            .bind(data.alt_text)
            .bind(data.is_primary)
            .bind(data.display_order)
            .fetch_one(pool)
            .await
    }

    /// Finds an image by ID
    pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        let query = format!("SELECT {IMAGE_COLUMNS} FROM property_images WHERE id = $1");

        sqlx::query_as::<_, PropertyImage>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Lists all images for a property, ordered for display
    pub async fn list_by_property(
        pool: &PgPool,
        property_id: Uuid,
    ) -> Result<Vec<Self>, sqlx::Error> {
        let query = format!(
            r#"
            SELECT {IMAGE_COLUMNS} FROM property_images
            WHERE property_id = $1
            ORDER BY display_order ASC, created_at ASC
            "#
        );

        sqlx::query_as::<_, PropertyImage>(&query)
            .bind(property_id)
            .fetch_all(pool)
            .await
    }

    /// Counts images for a property
    pub async fn count_by_property(pool: &PgPool, property_id: Uuid) -> Result<i64, sqlx::Error> {
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM property_images WHERE property_id = $1")
                .bind(property_id)
                .fetch_one(pool)
                .await?;

        Ok(count)
    }

    /// Returns the primary image for a property, if one is flagged
    pub async fn find_primary(
        pool: &PgPool,
        property_id: Uuid,
    ) -> Result<Option<Self>, sqlx::Error> {
        let query = format!(
            "SELECT {IMAGE_COLUMNS} FROM property_images \
             WHERE property_id = $1 AND is_primary = TRUE"
        );

        sqlx::query_as::<_, PropertyImage>(&query)
            .bind(property_id)
            .fetch_optional(pool)
            .await
    }

    /// Updates image presentation metadata
    ///
    /// Builds the UPDATE dynamically so unset fields keep their values.
    /// Returns `None` if the image does not exist or belongs to another
    /// property.
    pub async fn update(
        pool: &PgPool,
        id: Uuid,
        property_id: Uuid,
        data: UpdatePropertyImage,
    ) -> Result<Option<Self>, sqlx::Error> {
        let mut query = String::from("UPDATE property_images SET updated_at = NOW()");
        let mut bind_count = 0;

        if data.caption.is_some() {
            bind_count += 1;
            query.push_str(&format!(", caption = ${bind_count}"));
        }
        if data.alt_text.is_some() {
            bind_count += 1;
            query.push_str(&format!(", alt_text = ${bind_count}"));
        }
        if data.display_order.is_some() {
            bind_count += 1;
            query.push_str(&format!(", display_order = ${bind_count}"));
        }

        query.push_str(&format!(
            " WHERE id = ${} AND property_id = ${} RETURNING {IMAGE_COLUMNS}",
            bind_count + 1,
            bind_count + 2
        ));

        let mut q = sqlx::query_as::<_, PropertyImage>(&query);

        if let Some(caption) = data.caption {
            q = q.bind(caption);
        }
        if let Some(alt_text) = data.alt_text {
            q = q.bind(alt_text);
        }
        if let Some(display_order) = data.display_order {
            q = q.bind(display_order);
        }

        q.bind(id).bind(property_id).fetch_optional(pool).await
    }

    /// Flags one image as primary and unsets all its siblings, atomically
    ///
    /// Returns the updated image, or `None` if no image with the given ID
    /// exists under the property. When the target does not match, the
    /// transaction rolls back and sibling flags are untouched.
    pub async fn set_primary(
        pool: &PgPool,
        property_id: Uuid,
        image_id: Uuid,
    ) -> Result<Option<Self>, sqlx::Error> {
        let mut tx = pool.begin().await?;

        sqlx::query(
            "UPDATE property_images SET is_primary = FALSE, updated_at = NOW() \
             WHERE property_id = $1 AND is_primary = TRUE",
        )
        .bind(property_id)
        .execute(&mut *tx)
        .await?;

        let query = format!(
            r#"
            UPDATE property_images
            SET is_primary = TRUE, updated_at = NOW()
            WHERE id = $1 AND property_id = $2
            RETURNING {IMAGE_COLUMNS}
            "#
        );

        let image = sqlx::query_as::<_, PropertyImage>(&query)
            .bind(image_id)
            .bind(property_id)
            .fetch_optional(&mut *tx)
            .await?;

        match image {
            Some(image) => {
                tx.commit().await?;
                Ok(Some(image))
            }
            None => {
                tx.rollback().await?;
                Ok(None)
            }
        }
    }

    /// Deletes an image row
    ///
    /// Returns `true` if a row was deleted. Callers remove the storage
    /// objects first, then the row, so a missing row never points at live
    /// objects.
    pub async fn delete(pool: &PgPool, id: Uuid, property_id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM property_images WHERE id = $1 AND property_id = $2")
            .bind(id)
            .bind(property_id)
            .execute(pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// All storage keys attached to this image, original first
    pub fn storage_keys(&self) -> Vec<&str> {
        let mut keys = vec![self.original_key.as_str()];
        if let Some(k) = &self.small_key {
            keys.push(k);
        }
        if let Some(k) = &self.medium_key {
            keys.push(k);
        }
        if let Some(k) = &self.large_key {
            keys.push(k);
        }
        keys
    }
}
