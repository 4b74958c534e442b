/// Saved search model and database operations
///
/// A saved search persists a user's filter set together with notification
/// settings. All reads and writes are scoped by `(id, user_id)` so a user
/// can never touch another user's searches; a wrong owner simply yields no
/// rows.
///
/// # Schema
///
/// ```sql
/// CREATE TABLE saved_searches (
///     id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
///     user_id UUID NOT NULL REFERENCES users(id) ON DELETE CASCADE,
///     name VARCHAR(100) NOT NULL,
///     city VARCHAR(100),
///     property_type property_type,
///     listing_type listing_type,
///     min_price DOUBLE PRECISION,
///     max_price DOUBLE PRECISION,
///     min_area DOUBLE PRECISION,
///     max_area DOUBLE PRECISION,
///     min_rooms INT,
///     min_bedrooms INT,
///     features JSONB NOT NULL DEFAULT '[]',
///     radius_center JSONB,
///     radius_km DOUBLE PRECISION,
///     is_notification_enabled BOOLEAN NOT NULL DEFAULT TRUE,
///     notification_frequency notification_frequency NOT NULL DEFAULT 'daily',
///     last_searched_at TIMESTAMPTZ,
///     last_notified_at TIMESTAMPTZ,
///     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
/// );
/// ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::PgPool;
use uuid::Uuid;

use crate::geo::GeoPoint;

use super::property::{ListingType, PropertyType};

/// How often saved-search alerts are delivered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "notification_frequency", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum NotificationFrequency {
    Immediate,
    Daily,
    Weekly,
}

impl NotificationFrequency {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationFrequency::Immediate => "immediate",
            NotificationFrequency::Daily => "daily",
            NotificationFrequency::Weekly => "weekly",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "immediate" => Some(NotificationFrequency::Immediate),
            "daily" => Some(NotificationFrequency::Daily),
            "weekly" => Some(NotificationFrequency::Weekly),
            _ => None,
        }
    }
}

/// Saved search model
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct SavedSearch {
    pub id: Uuid,
    pub user_id: Uuid,

    /// User-chosen label
    pub name: String,

    pub city: Option<String>,
    pub property_type: Option<PropertyType>,
    pub listing_type: Option<ListingType>,
    pub min_price: Option<f64>,
    pub max_price: Option<f64>,
    pub min_area: Option<f64>,
    pub max_area: Option<f64>,
    pub min_rooms: Option<i32>,
    pub min_bedrooms: Option<i32>,

    /// Required features, normalized lowercase
    pub features: Json<Vec<String>>,

    /// Center of a radius filter, when one is saved
    pub radius_center: Option<Json<GeoPoint>>,
    pub radius_km: Option<f64>,

    pub is_notification_enabled: bool,
    pub notification_frequency: NotificationFrequency,

    /// Last time the user executed this search
    pub last_searched_at: Option<DateTime<Utc>>,

    /// Last time an alert was sent for this search
    pub last_notified_at: Option<DateTime<Utc>>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for creating a saved search
#[derive(Debug, Clone)]
pub struct CreateSavedSearch {
    pub name: String,
    pub city: Option<String>,
    pub property_type: Option<PropertyType>,
    pub listing_type: Option<ListingType>,
    pub min_price: Option<f64>,
    pub max_price: Option<f64>,
    pub min_area: Option<f64>,
    pub max_area: Option<f64>,
    pub min_rooms: Option<i32>,
    pub min_bedrooms: Option<i32>,
    pub features: Vec<String>,
    pub radius_center: Option<GeoPoint>,
    pub radius_km: Option<f64>,
    pub is_notification_enabled: Option<bool>,
    pub notification_frequency: Option<NotificationFrequency>,
}

/// Input for updating a saved search
///
/// Filter fields use double options: `Some(None)` clears a filter,
/// `None` leaves it untouched.
#[derive(Debug, Clone, Default)]
pub struct UpdateSavedSearch {
    pub name: Option<String>,
    pub city: Option<Option<String>>,
    pub property_type: Option<Option<PropertyType>>,
    pub listing_type: Option<Option<ListingType>>,
    pub min_price: Option<Option<f64>>,
    pub max_price: Option<Option<f64>>,
    pub min_area: Option<Option<f64>>,
    pub max_area: Option<Option<f64>>,
    pub min_rooms: Option<Option<i32>>,
    pub min_bedrooms: Option<Option<i32>>,
    pub features: Option<Vec<String>>,
    pub radius_center: Option<Option<GeoPoint>>,
    pub radius_km: Option<Option<f64>>,
    pub is_notification_enabled: Option<bool>,
    pub notification_frequency: Option<NotificationFrequency>,
}

const SAVED_SEARCH_COLUMNS: &str = "id, user_id, name, city, property_type, listing_type, \
     min_price, max_price, min_area, max_area, min_rooms, min_bedrooms, features, \
     radius_center, radius_km, is_notification_enabled, notification_frequency, \
     last_searched_at, last_notified_at, created_at, updated_at";

impl SavedSearch {
    /// Creates a saved search for a user
    pub async fn create(
        pool: &PgPool,
        user_id: Uuid,
        data: CreateSavedSearch,
    ) -> Result<Self, sqlx::Error> {
        let query = format!(
            r#"
            INSERT INTO saved_searches (user_id, name, city, property_type, listing_type,
                                        min_price, max_price, min_area, max_area,
                                        min_rooms, min_bedrooms, features, radius_center,
                                        radius_km, is_notification_enabled,
                                        notification_frequency)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14,
                    COALESCE($15, TRUE), COALESCE($16, 'daily'))
            RETURNING {SAVED_SEARCH_COLUMNS}
            "#
        );

        sqlx::query_as::<_, SavedSearch>(&query)
            .bind(user_id)
            .bind(data.name)
            .bind(data.city)
            .bind(data.property_type)
            .bind(data.listing_type)
            .bind(data.min_price)
            .bind(data.max_price)
            .bind(data.min_area)
            .bind(data.max_area)
            .bind(data.min_rooms)
            .bind(data.min_bedrooms)
            .bind(Json(data.features))
            .bind(data.radius_center.map(Json))
            .bind(data.radius_km)
            .bind(data.is_notification_enabled)
            .bind(data.notification_frequency)
            .fetch_one(pool)
            .await
    }

    /// Finds a saved search owned by a user
    pub async fn find_for_user(
        pool: &PgPool,
        id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<Self>, sqlx::Error> {
        let query = format!(
            "SELECT {SAVED_SEARCH_COLUMNS} FROM saved_searches WHERE id = $1 AND user_id = $2"
        );

        sqlx::query_as::<_, SavedSearch>(&query)
            .bind(id)
            .bind(user_id)
            .fetch_optional(pool)
            .await
    }

    /// Lists a user's saved searches, newest first
    pub async fn list_for_user(
        pool: &PgPool,
        user_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Self>, sqlx::Error> {
        let query = format!(
            r#"
            SELECT {SAVED_SEARCH_COLUMNS} FROM saved_searches
            WHERE user_id = $1
            ORDER BY created_at DESC
            LIMIT $2 OFFSET $3
            "#
        );

        sqlx::query_as::<_, SavedSearch>(&query)
            .bind(user_id)
            .bind(limit)
            .bind(offset)
            .fetch_all(pool)
            .await
    }

    /// Counts a user's saved searches
    pub async fn count_for_user(pool: &PgPool, user_id: Uuid) -> Result<i64, sqlx::Error> {
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM saved_searches WHERE user_id = $1")
                .bind(user_id)
                .fetch_one(pool)
                .await?;

        Ok(count)
    }

    /// Updates a saved search owned by a user
    ///
    /// Builds the UPDATE dynamically. Returns `None` when the search does
    /// not exist or belongs to someone else.
    pub async fn update(
        pool: &PgPool,
        id: Uuid,
        user_id: Uuid,
        data: UpdateSavedSearch,
    ) -> Result<Option<Self>, sqlx::Error> {
        let mut query = String::from("UPDATE saved_searches SET updated_at = NOW()");
        let mut bind_count = 0;

        macro_rules! push_clause {
            ($field:expr, $column:literal) => {
                if $field.is_some() {
                    bind_count += 1;
                    query.push_str(&format!(concat!(", ", $column, " = ${}"), bind_count));
                }
            };
        }

        push_clause!(data.name, "name");
        push_clause!(data.city, "city");
        push_clause!(data.property_type, "property_type");
        push_clause!(data.listing_type, "listing_type");
        push_clause!(data.min_price, "min_price");
        push_clause!(data.max_price, "max_price");
        push_clause!(data.min_area, "min_area");
        push_clause!(data.max_area, "max_area");
        push_clause!(data.min_rooms, "min_rooms");
        push_clause!(data.min_bedrooms, "min_bedrooms");
        push_clause!(data.features, "features");
        push_clause!(data.radius_center, "radius_center");
        push_clause!(data.radius_km, "radius_km");
        push_clause!(data.is_notification_enabled, "is_notification_enabled");
        push_clause!(data.notification_frequency, "notification_frequency");

        query.push_str(&format!(
            " WHERE id = ${} AND user_id = ${} RETURNING {SAVED_SEARCH_COLUMNS}",
            bind_count + 1,
            bind_count + 2
        ));

        let mut q = sqlx::query_as::<_, SavedSearch>(&query);

        if let Some(name) = data.name {
            q = q.bind(name);
        }
        if let Some(city) = data.city {
            q = q.bind(city);
        }
        if let Some(property_type) = data.property_type {
            q = q.bind(property_type);
        }
        if let Some(listing_type) = data.listing_type {
            q = q.bind(listing_type);
        }
        if let Some(min_price) = data.min_price {
            q = q.bind(min_price);
        }
        if let Some(max_price) = data.max_price {
            q = q.bind(max_price);
        }
        if let Some(min_area) = data.min_area {
            q = q.bind(min_area);
        }
        if let Some(max_area) = data.max_area {
            q = q.bind(max_area);
        }
        if let Some(min_rooms) = data.min_rooms {
            q = q.bind(min_rooms);
        }
        if let Some(min_bedrooms) = data.min_bedrooms {
            q = q.bind(min_bedrooms);
        }
        if let Some(features) = data.features {
            q = q.bind(Json(features));
        }
        if let Some(radius_center) = data.radius_center {
            q = q.bind(radius_center.map(Json));
        }
        if let Some(radius_km) = data.radius_km {
            q = q.bind(radius_km);
        }
        if let Some(is_notification_enabled) = data.is_notification_enabled {
            q = q.bind(is_notification_enabled);
        }
        if let Some(notification_frequency) = data.notification_frequency {
            q = q.bind(notification_frequency);
        }

        q.bind(id).bind(user_id).fetch_optional(pool).await
    }

    /// Stamps the search as just executed
    pub async fn touch_last_searched(
        pool: &PgPool,
        id: Uuid,
        user_id: Uuid,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE saved_searches SET last_searched_at = NOW(), updated_at = NOW() \
             WHERE id = $1 AND user_id = $2",
        )
        .bind(id)
        .bind(user_id)
        .execute(pool)
        .await?;

        Ok(())
    }

    /// Deletes a saved search owned by a user
    ///
    /// Returns `true` if a row was deleted.
    pub async fn delete(pool: &PgPool, id: Uuid, user_id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM saved_searches WHERE id = $1 AND user_id = $2")
            .bind(id)
            .bind(user_id)
            .execute(pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
