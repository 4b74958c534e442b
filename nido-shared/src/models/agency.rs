/// Agency model and database operations
///
/// Agencies group agents and admins. An agency is always created together
/// with its first admin user in a single transaction so that a half-created
/// agency never exists (`create_with_owner`).
///
/// # Schema
///
/// ```sql
/// CREATE TABLE agencies (
///     id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
///     name VARCHAR(200) NOT NULL UNIQUE,
///     email VARCHAR(255),
///     phone VARCHAR(50),
///     website VARCHAR(255),
///     street VARCHAR(255),
///     city VARCHAR(100),
///     province VARCHAR(100),
///     zip_code VARCHAR(10),
///     country VARCHAR(100) NOT NULL DEFAULT 'Italy',
///     created_by UUID REFERENCES users(id),
///     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
/// );
/// ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

use super::user::{CreateUser, User, UserRole};

/// Agency model
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Agency {
    pub id: Uuid,

    /// Unique display name
    pub name: String,

    pub email: Option<String>,
    pub phone: Option<String>,
    pub website: Option<String>,

    pub street: Option<String>,
    pub city: Option<String>,
    pub province: Option<String>,
    pub zip_code: Option<String>,
    pub country: String,

    /// User who provisioned the agency
    pub created_by: Option<Uuid>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for creating a new agency
#[derive(Debug, Clone)]
pub struct CreateAgency {
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub website: Option<String>,
    pub street: Option<String>,
    pub city: Option<String>,
    pub province: Option<String>,
    pub zip_code: Option<String>,
    pub country: Option<String>,
    pub created_by: Option<Uuid>,
}

const AGENCY_COLUMNS: &str = "id, name, email, phone, website, street, city, province, \
     zip_code, country, created_by, created_at, updated_at";

impl Agency {
    /// Creates a new agency
    ///
    /// # Errors
    ///
    /// Returns an error if the name already exists (unique constraint) or
    /// the database is unreachable.
    pub async fn create(pool: &PgPool, data: CreateAgency) -> Result<Self, sqlx::Error> {
        let query = format!(
            r#"
            INSERT INTO agencies (name, email, phone, website, street, city, province,
                                  zip_code, country, created_by)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, COALESCE($9, 'Italy'), $10)
            RETURNING {AGENCY_COLUMNS}
            "#
        );

        sqlx::query_as::<_, Agency>(&query)
            .bind(data.name)
            .bind(data.email)
            .bind(data.phone)
            .bind(data.website)
            .bind(data.street)
            .bind(data.city)
            .bind(data.province)
            .bind(data.zip_code)
            .bind(data.country)
            .bind(data.created_by)
            .fetch_one(pool)
            .await
    }

    /// Creates an agency together with its first admin user, atomically
    ///
    /// The admin user row is inserted with `agency_id` pointing at the new
    /// agency. If either insert fails the whole transaction rolls back.
    ///
    /// # Errors
    ///
    /// Returns an error on duplicate agency name, duplicate admin email, or
    /// database failure.
    pub async fn create_with_owner(
        pool: &PgPool,
        data: CreateAgency,
        mut admin: CreateUser,
    ) -> Result<(Self, User), sqlx::Error> {
        let mut tx = pool.begin().await?;

        let agency_query = format!(
            r#"
            INSERT INTO agencies (name, email, phone, website, street, city, province,
                                  zip_code, country, created_by)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, COALESCE($9, 'Italy'), $10)
            RETURNING {AGENCY_COLUMNS}
            "#
        );

        let agency = sqlx::query_as::<_, Agency>(&agency_query)
            .bind(data.name)
            .bind(data.email)
            .bind(data.phone)
            .bind(data.website)
            .bind(data.street)
            .bind(data.city)
            .bind(data.province)
            .bind(data.zip_code)
            .bind(data.country)
            .bind(data.created_by)
            .fetch_one(&mut *tx)
            .await?;

        admin.agency_id = Some(agency.id);
        admin.role = UserRole::Admin;

        let user_query = r#"
            INSERT INTO users (email, password_hash, first_name, last_name, phone, role,
                               agency_id, is_verified, should_change_password)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING id, email, password_hash, first_name, last_name, phone, role,
                      agency_id, is_verified, is_active, should_change_password,
                      avatar_url, bio, license_number, accepted_terms_at,
                      accepted_privacy_at, created_at, updated_at, last_login_at
            "#;

        let user = sqlx::query_as::<_, User>(user_query)
            .bind(admin.email)
            .bind(admin.password_hash)
            .bind(admin.first_name)
            .bind(admin.last_name)
            .bind(admin.phone)
            .bind(admin.role)
            .bind(admin.agency_id)
            .bind(admin.is_verified)
            .bind(admin.should_change_password)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok((agency, user))
    }

    /// Finds an agency by ID
    pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        let query = format!("SELECT {AGENCY_COLUMNS} FROM agencies WHERE id = $1");

        sqlx::query_as::<_, Agency>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Finds an agency by its unique name
    pub async fn find_by_name(pool: &PgPool, name: &str) -> Result<Option<Self>, sqlx::Error> {
        let query = format!("SELECT {AGENCY_COLUMNS} FROM agencies WHERE name = $1");

        sqlx::query_as::<_, Agency>(&query)
            .bind(name)
            .fetch_optional(pool)
            .await
    }

    /// Lists agencies, paginated, newest first
    pub async fn list(pool: &PgPool, limit: i64, offset: i64) -> Result<Vec<Self>, sqlx::Error> {
        let query = format!(
            r#"
            SELECT {AGENCY_COLUMNS} FROM agencies
            ORDER BY created_at DESC
            LIMIT $1 OFFSET $2
            "#
        );

        sqlx::query_as::<_, Agency>(&query)
            .bind(limit)
            .bind(offset)
            .fetch_all(pool)
            .await
    }

    /// Counts all agencies
    pub async fn count(pool: &PgPool) -> Result<i64, sqlx::Error> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM agencies")
            .fetch_one(pool)
            .await?;

        Ok(count)
    }
}
