/// Agency endpoints
///
/// An agency is provisioned together with its first admin account in one
/// database transaction, so a half-created agency never exists. The admin
/// receives a generated temporary password, returned exactly once, and
/// must rotate it on first login.
///
/// # Endpoints
///
/// - `POST /v1/agencies` - Provision agency + admin (owner)
/// - `GET /v1/agencies/:id` - Public agency card
/// - `GET /v1/agencies/:id/storage` - Storage usage accounting (admin)

use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
};
use axum::{
    extract::{Path, State},
    Extension, Json,
};
use nido_shared::auth::middleware::AuthContext;
use nido_shared::auth::password::hash_password;
use nido_shared::auth::provider::generate_temp_password;
use nido_shared::models::agency::{Agency, CreateAgency};
use nido_shared::models::preferences::{NotificationPreferences, UserPreferences};
use nido_shared::models::user::{CreateUser, UserRole};
use nido_shared::storage::{agency_storage_usage, StorageUsage};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use super::users::UserProfile;

/// First admin account created with the agency
#[derive(Debug, Deserialize, Validate)]
pub struct AgencyAdminInput {
    #[validate(email(message = "Invalid email format"))]
    pub email: String,

    #[validate(length(max = 100, message = "First name must be at most 100 characters"))]
    pub first_name: Option<String>,

    #[validate(length(max = 100, message = "Last name must be at most 100 characters"))]
    pub last_name: Option<String>,

    #[validate(length(max = 50, message = "Phone must be at most 50 characters"))]
    pub phone: Option<String>,
}

/// Agency provisioning request
#[derive(Debug, Deserialize, Validate)]
pub struct CreateAgencyRequest {
    #[validate(length(min = 1, max = 200, message = "Name must be 1-200 characters"))]
    pub name: String,

    #[validate(email(message = "Invalid email format"))]
    pub email: Option<String>,

    #[validate(length(max = 50, message = "Phone must be at most 50 characters"))]
    pub phone: Option<String>,

    #[validate(url(message = "Invalid website URL"))]
    pub website: Option<String>,

    pub street: Option<String>,
    pub city: Option<String>,
    pub province: Option<String>,
    pub zip_code: Option<String>,
    pub country: Option<String>,

    #[validate(nested)]
    pub admin: AgencyAdminInput,
}

/// Agency provisioning response
///
/// `temporary_password` is returned exactly once.
#[derive(Debug, Serialize)]
pub struct CreateAgencyResponse {
    pub agency: Agency,
    pub admin: UserProfile,
    pub temporary_password: String,
}

/// Provision an agency together with its first admin (owner)
///
/// # Errors
///
/// - `403 Forbidden`: Caller is not the platform owner
/// - `409 Conflict`: Agency name or admin email already exists
pub async fn create_agency(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Json(req): Json<CreateAgencyRequest>,
) -> ApiResult<Json<CreateAgencyResponse>> {
    if !auth.is_owner() {
        return Err(ApiError::Forbidden(
            "Only the platform owner can provision agencies".to_string(),
        ));
    }

    req.validate()?;

    let temporary_password = generate_temp_password();
    let password_hash = hash_password(&temporary_password)?;

    let admin = CreateUser {
        email: req.admin.email,
        password_hash,
        first_name: req.admin.first_name,
        last_name: req.admin.last_name,
        phone: req.admin.phone,
        // Role and agency are overwritten inside the transaction
        role: UserRole::Admin,
        agency_id: None,
        is_verified: true,
        should_change_password: true,
        accepted_terms_at: None,
        accepted_privacy_at: None,
    };

    let (agency, admin_user) = Agency::create_with_owner(
        &state.db,
        CreateAgency {
            name: req.name,
            email: req.email,
            phone: req.phone,
            website: req.website,
            street: req.street,
            city: req.city,
            province: req.province,
            zip_code: req.zip_code,
            country: req.country,
            created_by: Some(auth.user_id),
        },
        admin,
    )
    .await?;

    UserPreferences::get_or_create(&state.db, admin_user.id).await?;
    NotificationPreferences::get_or_create(&state.db, admin_user.id).await?;

    tracing::info!(agency_id = %agency.id, admin_id = %admin_user.id, "agency provisioned");

    Ok(Json(CreateAgencyResponse {
        agency,
        admin: admin_user.into(),
        temporary_password,
    }))
}

/// Public agency card
pub async fn get_agency(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Agency>> {
    let agency = Agency::find_by_id(&state.db, id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Agency not found".to_string()))?;

    Ok(Json(agency))
}

/// Storage usage accounting for an agency
///
/// Sums the agency's object-store footprint by prefix listing, split by
/// listing type. Admins see their own agency; the owner sees any.
pub async fn storage_usage(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<StorageUsage>> {
    let allowed = auth.is_owner() || (auth.is_admin() && auth.agency_id == Some(id));
    if !allowed {
        return Err(ApiError::Forbidden(
            "Insufficient privileges for storage accounting".to_string(),
        ));
    }

    Agency::find_by_id(&state.db, id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Agency not found".to_string()))?;

    let usage = agency_storage_usage(state.store.as_ref(), id).await?;

    Ok(Json(usage))
}
