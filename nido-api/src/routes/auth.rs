/// Credential endpoints
///
/// Every handler delegates to the [`IdentityProvider`] carried in app
/// state; the HTTP layer only validates DTOs and shapes responses.
///
/// # Endpoints
///
/// - `POST /v1/auth/register` - Register a new client account
/// - `POST /v1/auth/verify-email` - Confirm an account with the emailed code
/// - `POST /v1/auth/verify-email/request` - Re-issue a verification code
/// - `POST /v1/auth/login` - Login; may answer with a challenge
/// - `POST /v1/auth/login/new-password` - Complete a forced password change
/// - `POST /v1/auth/refresh` - Exchange a refresh token
/// - `POST /v1/auth/logout` - End the session (client-side discard)
/// - `POST /v1/auth/change-password` - Rotate the password (authenticated)
/// - `POST /v1/auth/forgot-password` - Start a password reset
/// - `POST /v1/auth/forgot-password/confirm` - Finish a password reset
///
/// `register`, `verify-email/request`, and `forgot-password` answer with
/// the same generic message whether or not the account exists, so none of
/// them can be used to probe for registered emails.

use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
};
use axum::{extract::State, http::HeaderMap, Extension, Json};
use nido_shared::auth::middleware::AuthContext;
use nido_shared::auth::provider::{AuthChallenge, LoginOutcome, RegisterAccount, Tokens};
use serde::{Deserialize, Serialize};
use validator::Validate;

/// Register request
#[derive(Debug, Deserialize, Validate)]
pub struct RegisterRequest {
    /// Email address
    #[validate(email(message = "Invalid email format"))]
    pub email: String,

    /// Password (full strength policy enforced by the identity provider)
    #[validate(length(min = 8, message = "Password must be at least 8 characters"))]
    pub password: String,

    #[validate(length(max = 100, message = "First name must be at most 100 characters"))]
    pub first_name: Option<String>,

    #[validate(length(max = 100, message = "Last name must be at most 100 characters"))]
    pub last_name: Option<String>,

    #[validate(length(max = 50, message = "Phone must be at most 50 characters"))]
    pub phone: Option<String>,

    /// Must be true; the acceptance timestamp is stored with the account
    #[serde(default)]
    pub accept_terms: bool,

    /// Must be true; the acceptance timestamp is stored with the account
    #[serde(default)]
    pub accept_privacy: bool,
}

/// Register response
///
/// No tokens: the account must confirm its email before the first login.
#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub user_id: String,
    pub email: String,
    pub is_verified: bool,
    pub message: String,
}

/// Email + one-time code pair used by both verification and reset flows
#[derive(Debug, Deserialize, Validate)]
pub struct EmailCodeRequest {
    #[validate(email(message = "Invalid email format"))]
    pub email: String,

    #[validate(length(min = 4, max = 10, message = "Invalid code"))]
    pub code: String,
}

/// Request carrying only an email address
#[derive(Debug, Deserialize, Validate)]
pub struct EmailRequest {
    #[validate(email(message = "Invalid email format"))]
    pub email: String,
}

/// Login request
#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(email(message = "Invalid email format"))]
    pub email: String,

    pub password: String,
}

/// Login response: either a token pair or a challenge to complete first
///
/// Callers must branch on the presence of the `challenge` field.
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum LoginResponse {
    Tokens(Tokens),
    Challenge(AuthChallenge),
}

/// Complete-new-password request
#[derive(Debug, Deserialize, Validate)]
pub struct CompleteNewPasswordRequest {
    /// Opaque session token from the login challenge
    #[validate(length(min = 1, message = "Session is required"))]
    pub session: String,

    #[validate(length(min = 8, message = "Password must be at least 8 characters"))]
    pub new_password: String,
}

/// Refresh token request
#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

/// Change password request
#[derive(Debug, Deserialize, Validate)]
pub struct ChangePasswordRequest {
    pub current_password: String,

    #[validate(length(min = 8, message = "Password must be at least 8 characters"))]
    pub new_password: String,
}

/// Confirm forgot-password request
#[derive(Debug, Deserialize, Validate)]
pub struct ConfirmForgotPasswordRequest {
    #[validate(email(message = "Invalid email format"))]
    pub email: String,

    #[validate(length(min = 4, max = 10, message = "Invalid code"))]
    pub code: String,

    #[validate(length(min = 8, message = "Password must be at least 8 characters"))]
    pub new_password: String,
}

/// Generic acknowledgement used by flows that must not leak account state
#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

/// Register a new client account
///
/// Creates an unconfirmed account and issues the first email verification
/// code. Both consent checkboxes are required.
///
/// # Errors
///
/// - `422 Unprocessable Entity`: Validation failed or consent missing
/// - `409 Conflict`: Email already registered
pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> ApiResult<Json<RegisterResponse>> {
    req.validate()?;

    if !req.accept_terms {
        return Err(ApiError::invalid_field(
            "accept_terms",
            "Terms of service must be accepted",
        ));
    }
    if !req.accept_privacy {
        return Err(ApiError::invalid_field(
            "accept_privacy",
            "Privacy policy must be accepted",
        ));
    }

    let user = state
        .identity
        .register(RegisterAccount {
            email: req.email,
            password: req.password,
            first_name: req.first_name,
            last_name: req.last_name,
            phone: req.phone,
            accepted_terms: req.accept_terms,
            accepted_privacy: req.accept_privacy,
        })
        .await?;

    Ok(Json(RegisterResponse {
        user_id: user.id.to_string(),
        email: user.email,
        is_verified: user.is_verified,
        message: "Account created. Check your email for the verification code.".to_string(),
    }))
}

/// Confirm an account with the emailed verification code
pub async fn verify_email(
    State(state): State<AppState>,
    Json(req): Json<EmailCodeRequest>,
) -> ApiResult<Json<MessageResponse>> {
    req.validate()?;

    state.identity.confirm_email(&req.email, &req.code).await?;

    Ok(Json(MessageResponse {
        message: "Email confirmed. You can now log in.".to_string(),
    }))
}

/// Re-issue an email verification code
///
/// Always acknowledges with the same message so the endpoint cannot be
/// used to probe for registered emails.
pub async fn request_verification(
    State(state): State<AppState>,
    Json(req): Json<EmailRequest>,
) -> ApiResult<Json<MessageResponse>> {
    req.validate()?;

    state.identity.request_email_verification(&req.email).await?;

    Ok(Json(MessageResponse {
        message: "If the account exists, a verification code has been sent.".to_string(),
    }))
}

/// Login endpoint
///
/// Returns a token pair, or a `challenge` descriptor when the account must
/// set a new password before logging in.
///
/// # Errors
///
/// - `401 Unauthorized`: Invalid credentials
/// - `403 Forbidden`: Account not confirmed yet
pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> ApiResult<Json<LoginResponse>> {
    req.validate()?;

    let outcome = state.identity.login(&req.email, &req.password).await?;

    let response = match outcome {
        LoginOutcome::Tokens(tokens) => LoginResponse::Tokens(*tokens),
        LoginOutcome::Challenge(challenge) => LoginResponse::Challenge(challenge),
    };

    Ok(Json(response))
}

/// Complete a forced password change and receive tokens
pub async fn complete_new_password(
    State(state): State<AppState>,
    Json(req): Json<CompleteNewPasswordRequest>,
) -> ApiResult<Json<Tokens>> {
    req.validate()?;

    let tokens = state
        .identity
        .complete_new_password_challenge(&req.session, &req.new_password)
        .await?;

    Ok(Json(tokens))
}

/// Exchange a refresh token for a fresh token pair
pub async fn refresh(
    State(state): State<AppState>,
    Json(req): Json<RefreshRequest>,
) -> ApiResult<Json<Tokens>> {
    let tokens = state.identity.refresh(&req.refresh_token).await?;

    Ok(Json(tokens))
}

/// End the session
///
/// Tokens are stateless, so this is an acknowledgement; clients discard
/// their token pair.
pub async fn logout(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<Json<MessageResponse>> {
    let token = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .unwrap_or_default();

    state.identity.logout(token).await?;

    Ok(Json(MessageResponse {
        message: "Logged out".to_string(),
    }))
}

/// Rotate the password of the authenticated user
pub async fn change_password(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Json(req): Json<ChangePasswordRequest>,
) -> ApiResult<Json<MessageResponse>> {
    req.validate()?;

    state
        .identity
        .change_password(auth.user_id, &req.current_password, &req.new_password)
        .await?;

    Ok(Json(MessageResponse {
        message: "Password changed".to_string(),
    }))
}

/// Start a password reset
///
/// Always acknowledges with the same message whether or not the account
/// exists.
pub async fn forgot_password(
    State(state): State<AppState>,
    Json(req): Json<EmailRequest>,
) -> ApiResult<Json<MessageResponse>> {
    req.validate()?;

    state.identity.forgot_password(&req.email).await?;

    Ok(Json(MessageResponse {
        message: "If the account exists, a reset code has been sent.".to_string(),
    }))
}

/// Finish a password reset with the emailed code
pub async fn confirm_forgot_password(
    State(state): State<AppState>,
    Json(req): Json<ConfirmForgotPasswordRequest>,
) -> ApiResult<Json<MessageResponse>> {
    req.validate()?;

    state
        .identity
        .confirm_forgot_password(&req.email, &req.code, &req.new_password)
        .await?;

    Ok(Json(MessageResponse {
        message: "Password reset. You can now log in.".to_string(),
    }))
}
