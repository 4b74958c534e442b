/// User profile, preferences, and provisioning endpoints
///
/// Preference reads follow a get-or-create pattern: the first read for a
/// user transparently persists a default row.
///
/// # Endpoints
///
/// - `GET /v1/users/profile` / `PATCH /v1/users/profile`
/// - `GET /v1/users/preferences` / `PUT /v1/users/preferences`
/// - `GET /v1/users/notification-preferences` / `PUT ...`
/// - `POST /v1/users/agents` - Provision an agent account (admin)
/// - `GET /v1/users/agents` - List agents, paged (admin)
/// - `POST /v1/users/admins` - Provision an admin account (owner)
///
/// Provisioning returns the generated temporary password exactly once; it
/// is never stored in plaintext and cannot be retrieved afterwards.

use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
};
use axum::{
    extract::{Query, State},
    Extension, Json,
};
use chrono::{DateTime, Utc};
use nido_shared::auth::middleware::AuthContext;
use nido_shared::auth::provider::ProvisionAccount;
use nido_shared::models::preferences::{
    NotificationPreferences, UpdateNotificationPreferences, UpdateUserPreferences, UserPreferences,
};
use nido_shared::models::user::{UpdateUser, User, UserRole};
use nido_shared::pagination::{Page, PageRequest};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

/// Public profile DTO
#[derive(Debug, Serialize)]
pub struct UserProfile {
    pub id: Uuid,
    pub email: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub phone: Option<String>,
    pub role: UserRole,
    pub agency_id: Option<Uuid>,
    pub is_verified: bool,
    pub should_change_password: bool,
    pub avatar_url: Option<String>,
    pub bio: Option<String>,
    pub license_number: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_login_at: Option<DateTime<Utc>>,
}

impl From<User> for UserProfile {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            email: user.email,
            first_name: user.first_name,
            last_name: user.last_name,
            phone: user.phone,
            role: user.role,
            agency_id: user.agency_id,
            is_verified: user.is_verified,
            should_change_password: user.should_change_password,
            avatar_url: user.avatar_url,
            bio: user.bio,
            license_number: user.license_number,
            created_at: user.created_at,
            last_login_at: user.last_login_at,
        }
    }
}

/// Profile patch request
///
/// Fields distinguish `null` (clear the column) from absent (keep).
#[derive(Debug, Default, Deserialize)]
pub struct UpdateProfileRequest {
    #[serde(default, deserialize_with = "super::double_option")]
    pub first_name: Option<Option<String>>,

    #[serde(default, deserialize_with = "super::double_option")]
    pub last_name: Option<Option<String>>,

    #[serde(default, deserialize_with = "super::double_option")]
    pub phone: Option<Option<String>>,

    #[serde(default, deserialize_with = "super::double_option")]
    pub avatar_url: Option<Option<String>>,

    #[serde(default, deserialize_with = "super::double_option")]
    pub bio: Option<Option<String>>,

    #[serde(default, deserialize_with = "super::double_option")]
    pub license_number: Option<Option<String>>,
}

impl UpdateProfileRequest {
    /// Manual length checks; `validator` cannot see through double options
    fn check_lengths(&self) -> Result<(), ApiError> {
        let limits: [(&str, &Option<Option<String>>, usize); 6] = [
            ("first_name", &self.first_name, 100),
            ("last_name", &self.last_name, 100),
            ("phone", &self.phone, 50),
            ("avatar_url", &self.avatar_url, 512),
            ("bio", &self.bio, 2000),
            ("license_number", &self.license_number, 100),
        ];

        for (field, value, max) in limits {
            if let Some(Some(value)) = value {
                if value.len() > max {
                    return Err(ApiError::invalid_field(
                        field,
                        format!("Must be at most {} characters", max),
                    ));
                }
            }
        }

        Ok(())
    }
}

/// Preferences update request
#[derive(Debug, Deserialize, Validate)]
pub struct UpdatePreferencesRequest {
    #[validate(length(min = 2, max = 10, message = "Invalid language tag"))]
    pub language: Option<String>,

    #[validate(length(equal = 3, message = "Currency must be a 3-letter code"))]
    pub currency: Option<String>,
}

/// Notification preferences update request
#[derive(Debug, Deserialize)]
pub struct UpdateNotificationPreferencesRequest {
    pub email_enabled: Option<bool>,
    pub push_enabled: Option<bool>,
    pub property_alerts_enabled: Option<bool>,
    pub saved_search_alerts_enabled: Option<bool>,
}

/// Agent/admin provisioning request
#[derive(Debug, Deserialize, Validate)]
pub struct ProvisionUserRequest {
    #[validate(email(message = "Invalid email format"))]
    pub email: String,

    #[validate(length(max = 100, message = "First name must be at most 100 characters"))]
    pub first_name: Option<String>,

    #[validate(length(max = 100, message = "Last name must be at most 100 characters"))]
    pub last_name: Option<String>,

    #[validate(length(max = 50, message = "Phone must be at most 50 characters"))]
    pub phone: Option<String>,

    #[validate(length(max = 100, message = "License number must be at most 100 characters"))]
    pub license_number: Option<String>,

    /// Agency to attach the account to; defaults to the caller's agency
    pub agency_id: Option<Uuid>,
}

/// Provisioning response
///
/// `temporary_password` is returned exactly once.
#[derive(Debug, Serialize)]
pub struct ProvisionedUserResponse {
    pub user: UserProfile,
    pub temporary_password: String,
}

/// Returns the caller's profile
pub async fn get_profile(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> ApiResult<Json<UserProfile>> {
    let user = User::find_by_id(&state.db, auth.user_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("User not found".to_string()))?;

    Ok(Json(user.into()))
}

/// Patches the caller's profile
pub async fn update_profile(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Json(req): Json<UpdateProfileRequest>,
) -> ApiResult<Json<UserProfile>> {
    req.check_lengths()?;

    let update = UpdateUser {
        first_name: req.first_name,
        last_name: req.last_name,
        phone: req.phone,
        avatar_url: req.avatar_url,
        bio: req.bio,
        license_number: req.license_number,
        ..Default::default()
    };

    let user = User::update(&state.db, auth.user_id, update)
        .await?
        .ok_or_else(|| ApiError::NotFound("User not found".to_string()))?;

    Ok(Json(user.into()))
}

/// Returns the caller's preferences, creating defaults on first read
pub async fn get_preferences(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> ApiResult<Json<UserPreferences>> {
    let prefs = UserPreferences::get_or_create(&state.db, auth.user_id).await?;

    Ok(Json(prefs))
}

/// Updates the caller's preferences
pub async fn update_preferences(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Json(req): Json<UpdatePreferencesRequest>,
) -> ApiResult<Json<UserPreferences>> {
    req.validate()?;

    let prefs = UserPreferences::update(
        &state.db,
        auth.user_id,
        UpdateUserPreferences {
            language: req.language,
            currency: req.currency,
        },
    )
    .await?;

    Ok(Json(prefs))
}

/// Returns the caller's notification toggles, creating defaults on first read
pub async fn get_notification_preferences(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> ApiResult<Json<NotificationPreferences>> {
    let prefs = NotificationPreferences::get_or_create(&state.db, auth.user_id).await?;

    Ok(Json(prefs))
}

/// Updates the caller's notification toggles
pub async fn update_notification_preferences(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Json(req): Json<UpdateNotificationPreferencesRequest>,
) -> ApiResult<Json<NotificationPreferences>> {
    let prefs = NotificationPreferences::update(
        &state.db,
        auth.user_id,
        UpdateNotificationPreferences {
            email_enabled: req.email_enabled,
            push_enabled: req.push_enabled,
            property_alerts_enabled: req.property_alerts_enabled,
            saved_search_alerts_enabled: req.saved_search_alerts_enabled,
        },
    )
    .await?;

    Ok(Json(prefs))
}

/// Provisions an account with a generated temporary password
///
/// The role gate runs here even though the handlers already checked it:
/// route-level checks can be bypassed by a refactor, this one cannot.
async fn provision_account(
    state: &AppState,
    auth: &AuthContext,
    required: fn(&AuthContext) -> bool,
    role: UserRole,
    req: ProvisionUserRequest,
) -> ApiResult<ProvisionedUserResponse> {
    if !required(auth) {
        return Err(ApiError::Forbidden(
            "Insufficient privileges for account provisioning".to_string(),
        ));
    }

    let agency_id = req.agency_id.or(auth.agency_id);
    if role == UserRole::Agent && agency_id.is_none() {
        return Err(ApiError::invalid_field(
            "agency_id",
            "Agents must be attached to an agency",
        ));
    }

    let (user, temporary_password) = state
        .identity
        .admin_create_user(ProvisionAccount {
            email: req.email,
            first_name: req.first_name,
            last_name: req.last_name,
            phone: req.phone,
            role,
            agency_id,
        })
        .await?;

    let user = match req.license_number {
        Some(license_number) => User::update(
            &state.db,
            user.id,
            UpdateUser {
                license_number: Some(Some(license_number)),
                ..Default::default()
            },
        )
        .await?
        .unwrap_or(user),
        None => user,
    };

    // Default preference rows so the first preferences read never races
    // with provisioning
    UserPreferences::get_or_create(&state.db, user.id).await?;
    NotificationPreferences::get_or_create(&state.db, user.id).await?;

    tracing::info!(user_id = %user.id, role = %role.as_str(), provisioned_by = %auth.user_id, "account provisioned");

    Ok(ProvisionedUserResponse {
        user: user.into(),
        temporary_password,
    })
}

/// Provision an agent account (admin)
///
/// # Errors
///
/// - `403 Forbidden`: Caller is not an admin or owner
/// - `409 Conflict`: Email already registered
pub async fn create_agent(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Json(req): Json<ProvisionUserRequest>,
) -> ApiResult<Json<ProvisionedUserResponse>> {
    if !auth.is_admin() {
        return Err(ApiError::Forbidden(
            "Only admins can provision agents".to_string(),
        ));
    }

    req.validate()?;

    let response =
        provision_account(&state, &auth, AuthContext::is_admin, UserRole::Agent, req).await?;

    Ok(Json(response))
}

/// Provision an admin account (owner)
///
/// # Errors
///
/// - `403 Forbidden`: Caller is not the platform owner
/// - `409 Conflict`: Email already registered
pub async fn create_admin(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Json(req): Json<ProvisionUserRequest>,
) -> ApiResult<Json<ProvisionedUserResponse>> {
    if !auth.is_owner() {
        return Err(ApiError::Forbidden(
            "Only the platform owner can provision admins".to_string(),
        ));
    }

    req.validate()?;

    let response =
        provision_account(&state, &auth, AuthContext::is_owner, UserRole::Admin, req).await?;

    Ok(Json(response))
}

/// List agent accounts, paged, newest first (admin)
pub async fn list_agents(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Query(page_req): Query<PageRequest>,
) -> ApiResult<Json<Page<UserProfile>>> {
    if !auth.is_admin() {
        return Err(ApiError::Forbidden(
            "Only admins can list agents".to_string(),
        ));
    }

    let agents = User::list_by_role(
        &state.db,
        UserRole::Agent,
        page_req.limit(),
        page_req.offset(),
    )
    .await?;
    let total = User::count_by_role(&state.db, UserRole::Agent).await?;

    Ok(Json(Page::new(
        agents.into_iter().map(UserProfile::from).collect(),
        total,
        page_req.page(),
        page_req.limit(),
    )))
}
