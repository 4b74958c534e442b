/// User model and database operations
///
/// Users are never hard-deleted: deactivation flips `is_active` so that
/// listings, favorites, and history keep their author.
///
/// # Schema
///
/// ```sql
/// CREATE TYPE user_role AS ENUM ('client', 'agent', 'admin', 'owner');
///
/// CREATE TABLE users (
///     id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
///     email CITEXT NOT NULL UNIQUE,
///     password_hash VARCHAR(255) NOT NULL,
///     first_name VARCHAR(100),
///     last_name VARCHAR(100),
///     phone VARCHAR(50),
///     role user_role NOT NULL DEFAULT 'client',
///     agency_id UUID REFERENCES agencies(id),
///     is_verified BOOLEAN NOT NULL DEFAULT FALSE,
///     is_active BOOLEAN NOT NULL DEFAULT TRUE,
///     should_change_password BOOLEAN NOT NULL DEFAULT FALSE,
///     avatar_url VARCHAR(512),
///     bio TEXT,
///     license_number VARCHAR(100),
///     accepted_terms_at TIMESTAMPTZ,
///     accepted_privacy_at TIMESTAMPTZ,
///     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     last_login_at TIMESTAMPTZ
/// );
/// ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

/// User role
///
/// Roles form a privilege ladder: clients browse and save, agents manage
/// their own listings, admins provision agents inside their agency, owners
/// provision admins and agencies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "user_role", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    /// End user browsing and saving listings
    Client,

    /// Agency member managing their own listings
    Agent,

    /// Agency administrator
    Admin,

    /// Platform owner
    Owner,
}

impl UserRole {
    /// Converts role to string for database storage
    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::Client => "client",
            UserRole::Agent => "agent",
            UserRole::Admin => "admin",
            UserRole::Owner => "owner",
        }
    }

    /// Parses a role from its string form
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "client" => Some(UserRole::Client),
            "agent" => Some(UserRole::Agent),
            "admin" => Some(UserRole::Admin),
            "owner" => Some(UserRole::Owner),
            _ => None,
        }
    }

    /// Whether this role may create and manage property listings
    pub fn can_manage_listings(&self) -> bool {
        matches!(self, UserRole::Agent | UserRole::Admin | UserRole::Owner)
    }
}

/// User model representing an account
///
/// Passwords are stored as Argon2id hashes, never in plaintext.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    /// Unique user ID (UUID v4)
    pub id: Uuid,

    /// Email address (case-insensitive via CITEXT)
    pub email: String,

    /// Argon2id password hash
    #[serde(skip_serializing)]
    pub password_hash: String,

    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub phone: Option<String>,

    /// Role driving authorization decisions
    pub role: UserRole,

    /// Agency the user belongs to (agents and admins)
    pub agency_id: Option<Uuid>,

    /// Whether the account has confirmed its email
    pub is_verified: bool,

    /// Soft-delete flag; inactive users cannot log in
    pub is_active: bool,

    /// Set for provisioned accounts until the first password change
    pub should_change_password: bool,

    pub avatar_url: Option<String>,
    pub bio: Option<String>,

    /// Professional license number (agents)
    pub license_number: Option<String>,

    pub accepted_terms_at: Option<DateTime<Utc>>,
    pub accepted_privacy_at: Option<DateTime<Utc>>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_login_at: Option<DateTime<Utc>>,
}

/// Input for creating a new user
#[derive(Debug, Clone)]
pub struct CreateUser {
    pub email: String,

    /// Argon2id password hash (NOT the plaintext password)
    pub password_hash: String,

    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub phone: Option<String>,
    pub role: UserRole,
    pub agency_id: Option<Uuid>,
    pub is_verified: bool,
    pub should_change_password: bool,
    pub accepted_terms_at: Option<DateTime<Utc>>,
    pub accepted_privacy_at: Option<DateTime<Utc>>,
}

/// Input for updating an existing user
///
/// All fields are optional. Only non-None fields will be updated.
/// Double-Option fields use `Some(None)` to clear the column.
#[derive(Debug, Clone, Default)]
pub struct UpdateUser {
    pub password_hash: Option<String>,
    pub first_name: Option<Option<String>>,
    pub last_name: Option<Option<String>>,
    pub phone: Option<Option<String>>,
    pub avatar_url: Option<Option<String>>,
    pub bio: Option<Option<String>>,
    pub license_number: Option<Option<String>>,
    pub is_verified: Option<bool>,
    pub is_active: Option<bool>,
    pub should_change_password: Option<bool>,
}

const USER_COLUMNS: &str = "id, email, password_hash, first_name, last_name, phone, role, \
     agency_id, is_verified, is_active, should_change_password, avatar_url, bio, \
     license_number, accepted_terms_at, accepted_privacy_at, created_at, updated_at, \
     last_login_at";

impl User {
    /// Creates a new user in the database
    ///
    /// # Errors
    ///
    /// Returns an error if the email already exists (unique constraint) or
    /// the database is unreachable.
    pub async fn create(pool: &PgPool, data: CreateUser) -> Result<Self, sqlx::Error> {
        let query = format!(
            r#"
            INSERT INTO users (email, password_hash, first_name, last_name, phone, role,
                               agency_id, is_verified, should_change_password,
                               accepted_terms_at, accepted_privacy_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            RETURNING {USER_COLUMNS}
            "#
        );

        let user = sqlx::query_as::<_, User>(&query)
            .bind(data.email)
            .bind(data.password_hash)
            .bind(data.first_name)
            .bind(data.last_name)
            .bind(data.phone)
            .bind(data.role)
            .bind(data.agency_id)
            .bind(data.is_verified)
            .bind(data.should_change_password)
            .bind(data.accepted_terms_at)
            .bind(data.accepted_privacy_at)
            .fetch_one(pool)
            .await?;

        Ok(user)
    }

    /// Finds a user by ID
    pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        let query = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");

        sqlx::query_as::<_, User>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Finds a user by email address (case-insensitive via CITEXT)
    pub async fn find_by_email(pool: &PgPool, email: &str) -> Result<Option<Self>, sqlx::Error> {
        let query = format!("SELECT {USER_COLUMNS} FROM users WHERE email = $1");

        sqlx::query_as::<_, User>(&query)
            .bind(email)
            .fetch_optional(pool)
            .await
    }

    /// Updates an existing user
    ///
    /// Only non-None fields in `data` are written. The `updated_at` timestamp
    /// is always refreshed.
    ///
    /// # Returns
    ///
    /// The updated user if found, None if the user doesn't exist
    pub async fn update(
        pool: &PgPool,
        id: Uuid,
        data: UpdateUser,
    ) -> Result<Option<Self>, sqlx::Error> {
        // Build dynamic update query based on which fields are present
        let mut query = String::from("UPDATE users SET updated_at = NOW()");
        let mut bind_count = 1;

        if data.password_hash.is_some() {
            bind_count += 1;
            query.push_str(&format!(", password_hash = ${}", bind_count));
        }
        if data.first_name.is_some() {
            bind_count += 1;
            query.push_str(&format!(", first_name = ${}", bind_count));
        }
        if data.last_name.is_some() {
            bind_count += 1;
            query.push_str(&format!(", last_name = ${}", bind_count));
        }
        if data.phone.is_some() {
            bind_count += 1;
            query.push_str(&format!(", phone = ${}", bind_count));
        }
        if data.avatar_url.is_some() {
            bind_count += 1;
            query.push_str(&format!(", avatar_url = ${}", bind_count));
        }
        if data.bio.is_some() {
            bind_count += 1;
            query.push_str(&format!(", bio = ${}", bind_count));
        }
        if data.license_number.is_some() {
            bind_count += 1;
            query.push_str(&format!(", license_number = ${}", bind_count));
        }
        if data.is_verified.is_some() {
            bind_count += 1;
            query.push_str(&format!(", is_verified = ${}", bind_count));
        }
        if data.is_active.is_some() {
            bind_count += 1;
            query.push_str(&format!(", is_active = ${}", bind_count));
        }
        if data.should_change_password.is_some() {
            bind_count += 1;
            query.push_str(&format!(", should_change_password = ${}", bind_count));
        }

        query.push_str(&format!(" WHERE id = $1 RETURNING {USER_COLUMNS}"));

        let mut q = sqlx::query_as::<_, User>(&query).bind(id);

        if let Some(password_hash) = data.password_hash {
            q = q.bind(password_hash);
        }
        if let Some(first_name) = data.first_name {
            q = q.bind(first_name);
        }
        if let Some(last_name) = data.last_name {
            q = q.bind(last_name);
        }
        if let Some(phone) = data.phone {
            q = q.bind(phone);
        }
        if let Some(avatar_url) = data.avatar_url {
            q = q.bind(avatar_url);
        }
        if let Some(bio) = data.bio {
            q = q.bind(bio);
        }
        if let Some(license_number) = data.license_number {
            q = q.bind(license_number);
        }
        if let Some(is_verified) = data.is_verified {
            q = q.bind(is_verified);
        }
        if let Some(is_active) = data.is_active {
            q = q.bind(is_active);
        }
        if let Some(should_change) = data.should_change_password {
            q = q.bind(should_change);
        }

        q.fetch_optional(pool).await
    }

    /// Updates the last login timestamp for a user
    ///
    /// Called after successful authentication.
    pub async fn update_last_login(pool: &PgPool, id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("UPDATE users SET last_login_at = NOW() WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Lists users with a given role, paginated, newest first
    pub async fn list_by_role(
        pool: &PgPool,
        role: UserRole,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Self>, sqlx::Error> {
        let query = format!(
            r#"
            SELECT {USER_COLUMNS} FROM users
            WHERE role = $1
            ORDER BY created_at DESC
            LIMIT $2 OFFSET $3
            "#
        );

        sqlx::query_as::<_, User>(&query)
            .bind(role)
            .bind(limit)
            .bind(offset)
            .fetch_all(pool)
            .await
    }

    /// Counts users with a given role
    pub async fn count_by_role(pool: &PgPool, role: UserRole) -> Result<i64, sqlx::Error> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM users WHERE role = $1")
            .bind(role)
            .fetch_one(pool)
            .await?;

        Ok(count)
    }

    /// Display name assembled from first/last name, falling back to the email
    pub fn display_name(&self) -> String {
        match (&self.first_name, &self.last_name) {
            (Some(first), Some(last)) => format!("{} {}", first, last),
            (Some(first), None) => first.clone(),
            (None, Some(last)) => last.clone(),
            (None, None) => self.email.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_as_str() {
        assert_eq!(UserRole::Client.as_str(), "client");
        assert_eq!(UserRole::Agent.as_str(), "agent");
        assert_eq!(UserRole::Admin.as_str(), "admin");
        assert_eq!(UserRole::Owner.as_str(), "owner");
    }

    #[test]
    fn test_role_parse_roundtrip() {
        for role in [
            UserRole::Client,
            UserRole::Agent,
            UserRole::Admin,
            UserRole::Owner,
        ] {
            assert_eq!(UserRole::parse(role.as_str()), Some(role));
        }
        assert_eq!(UserRole::parse("superuser"), None);
    }

    #[test]
    fn test_role_can_manage_listings() {
        assert!(!UserRole::Client.can_manage_listings());
        assert!(UserRole::Agent.can_manage_listings());
        assert!(UserRole::Admin.can_manage_listings());
        assert!(UserRole::Owner.can_manage_listings());
    }

    #[test]
    fn test_update_user_default_is_empty() {
        let update = UpdateUser::default();
        assert!(update.password_hash.is_none());
        assert!(update.first_name.is_none());
        assert!(update.is_verified.is_none());
        assert!(update.is_active.is_none());
        assert!(update.should_change_password.is_none());
    }

    #[test]
    fn test_display_name_fallbacks() {
        let mut user = sample_user();
        assert_eq!(user.display_name(), "Ada Rossi");

        user.last_name = None;
        assert_eq!(user.display_name(), "Ada");

        user.first_name = None;
        assert_eq!(user.display_name(), "ada@example.com");
    }

    fn sample_user() -> User {
        User {
            id: Uuid::new_v4(),
            email: "ada@example.com".to_string(),
            password_hash: "$argon2id$...".to_string(),
            first_name: Some("Ada".to_string()),
            last_name: Some("Rossi".to_string()),
            phone: None,
            role: UserRole::Client,
            agency_id: None,
            is_verified: false,
            is_active: true,
            should_change_password: false,
            avatar_url: None,
            bio: None,
            license_number: None,
            accepted_terms_at: None,
            accepted_privacy_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            last_login_at: None,
        }
    }

    // Integration tests for database operations live in nido-api/tests
}
