/// User and notification preference models
///
/// Preference rows are created lazily: the first read for a user inserts a
/// row with defaults via `INSERT ... ON CONFLICT DO NOTHING` followed by a
/// plain select, so every user always has a row once they touch the
/// preferences API.
///
/// # Schema
///
/// ```sql
/// CREATE TABLE user_preferences (
///     user_id UUID PRIMARY KEY REFERENCES users(id) ON DELETE CASCADE,
///     language VARCHAR(10) NOT NULL DEFAULT 'it',
///     currency VARCHAR(3) NOT NULL DEFAULT 'EUR',
///     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
/// );
///
/// CREATE TABLE notification_preferences (
///     user_id UUID PRIMARY KEY REFERENCES users(id) ON DELETE CASCADE,
///     email_enabled BOOLEAN NOT NULL DEFAULT TRUE,
///     push_enabled BOOLEAN NOT NULL DEFAULT TRUE,
///     property_alerts_enabled BOOLEAN NOT NULL DEFAULT TRUE,
///     saved_search_alerts_enabled BOOLEAN NOT NULL DEFAULT TRUE,
///     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
/// );
/// ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

/// General user preferences
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct UserPreferences {
    pub user_id: Uuid,

    /// BCP 47 language tag, defaults to `it`
    pub language: String,

    /// ISO 4217 currency code, defaults to `EUR`
    pub currency: String,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for updating user preferences
#[derive(Debug, Clone, Default)]
pub struct UpdateUserPreferences {
    pub language: Option<String>,
    pub currency: Option<String>,
}

/// Notification delivery toggles
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct NotificationPreferences {
    pub user_id: Uuid,
    pub email_enabled: bool,
    pub push_enabled: bool,
    pub property_alerts_enabled: bool,
    pub saved_search_alerts_enabled: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for updating notification toggles
#[derive(Debug, Clone, Default)]
pub struct UpdateNotificationPreferences {
    pub email_enabled: Option<bool>,
    pub push_enabled: Option<bool>,
    pub property_alerts_enabled: Option<bool>,
    pub saved_search_alerts_enabled: Option<bool>,
}

impl UserPreferences {
    /// Returns the user's preferences, inserting defaults on first access
    pub async fn get_or_create(pool: &PgPool, user_id: Uuid) -> Result<Self, sqlx::Error> {
        sqlx::query("INSERT INTO user_preferences (user_id) VALUES ($1) ON CONFLICT DO NOTHING")
            .bind(user_id)
            .execute(pool)
            .await?;

        sqlx::query_as::<_, UserPreferences>(
            "SELECT user_id, language, currency, created_at, updated_at \
             FROM user_preferences WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_one(pool)
        .await
    }

    /// Updates preferences, creating the row with defaults first if needed
    pub async fn update(
        pool: &PgPool,
        user_id: Uuid,
        data: UpdateUserPreferences,
    ) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, UserPreferences>(
            r#"
            INSERT INTO user_preferences (user_id, language, currency)
            VALUES ($1, COALESCE($2, 'it'), COALESCE($3, 'EUR'))
            ON CONFLICT (user_id) DO UPDATE SET
                language = COALESCE($2, user_preferences.language),
                currency = COALESCE($3, user_preferences.currency),
                updated_at = NOW()
            RETURNING user_id, language, currency, created_at, updated_at
            "#,
        )
        .bind(user_id)
        .bind(data.language)
        .bind(data.currency)
        .fetch_one(pool)
        .await
    }
}

impl NotificationPreferences {
    /// Returns the user's notification toggles, inserting defaults on first
    /// access
    pub async fn get_or_create(pool: &PgPool, user_id: Uuid) -> Result<Self, sqlx::Error> {
        sqlx::query(
            "INSERT INTO notification_preferences (user_id) VALUES ($1) ON CONFLICT DO NOTHING",
        )
        .bind(user_id)
        .execute(pool)
        .await?;

        sqlx::query_as::<_, NotificationPreferences>(
            "SELECT user_id, email_enabled, push_enabled, property_alerts_enabled, \
             saved_search_alerts_enabled, created_at, updated_at \
             FROM notification_preferences WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_one(pool)
        .await
    }

    /// Updates notification toggles, creating the row first if needed
    pub async fn update(
        pool: &PgPool,
        user_id: Uuid,
        data: UpdateNotificationPreferences,
    ) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, NotificationPreferences>(
            r#"
            INSERT INTO notification_preferences (user_id, email_enabled, push_enabled,
                                                  property_alerts_enabled,
                                                  saved_search_alerts_enabled)
            VALUES ($1, COALESCE($2, TRUE), COALESCE($3, TRUE), COALESCE($4, TRUE),
                    COALESCE($5, TRUE))
            ON CONFLICT (user_id) DO UPDATE SET
                email_enabled = COALESCE($2, notification_preferences.email_enabled),
                push_enabled = COALESCE($3, notification_preferences.push_enabled),
                property_alerts_enabled =
                    COALESCE($4, notification_preferences.property_alerts_enabled),
                saved_search_alerts_enabled =
                    COALESCE($5, notification_preferences.saved_search_alerts_enabled),
                updated_at = NOW()
            RETURNING user_id, email_enabled, push_enabled, property_alerts_enabled,
                      saved_search_alerts_enabled, created_at, updated_at
            "#,
        )
        .bind(user_id)
        .bind(data.email_enabled)
        .bind(data.push_enabled)
        .bind(data.property_alerts_enabled)
        .bind(data.saved_search_alerts_enabled)
        .fetch_one(pool)
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_update_defaults_are_noop() {
        let prefs = UpdateUserPreferences::default();
        assert!(prefs.language.is_none());
        assert!(prefs.currency.is_none());

        let toggles = UpdateNotificationPreferences::default();
        assert!(toggles.email_enabled.is_none());
        assert!(toggles.saved_search_alerts_enabled.is_none());
    }
}
