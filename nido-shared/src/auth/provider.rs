/// Identity provider abstraction and local implementation
///
/// The API authenticates users through the [`IdentityProvider`] trait so the
/// handlers never care where credentials live. [`LocalIdentityProvider`] is
/// the Postgres-backed implementation: Argon2id hashes in the `users` table,
/// one-time codes in `auth_codes`, HS256 tokens signed locally.
///
/// # Flows
///
/// - **register**: create an unconfirmed account; a one-time emailed code
///   confirms the address before the first login succeeds
/// - **login**: verify credentials; unconfirmed accounts are refused,
///   accounts flagged with `should_change_password` get a
///   `NewPasswordRequired` challenge instead of tokens
/// - **refresh**: exchange a refresh token for a fresh token pair, re-reading
///   role and agency from the database so promotions take effect
/// - **forgot/confirm**: one-time numeric code with expiry, single use
/// - **provision**: admin-created accounts with a generated temporary
///   password that must be rotated on first login

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::models::user::{CreateUser, User, UserRole};

use super::jwt::{self, Claims, JwtError, TokenType};
use super::password::{hash_password, validate_password_strength, verify_password};

/// How long a forced password-change challenge session stays valid
const CHALLENGE_TTL_MINUTES: i64 = 15;

/// How long a password reset code stays valid
const RESET_CODE_TTL_MINUTES: i64 = 60;

/// Minimum gap between reset or verification codes for the same account
const CODE_COOLDOWN_SECONDS: i64 = 60;

/// How long an email verification code stays valid
const VERIFY_CODE_TTL_MINUTES: i64 = 24 * 60;

const PURPOSE_PASSWORD_RESET: &str = "password_reset";
const PURPOSE_NEW_PASSWORD: &str = "new_password";
const PURPOSE_EMAIL_VERIFY: &str = "email_verify";

/// Error type for identity operations
#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
    /// An account with this email already exists
    #[error("An account with this email already exists")]
    UserExists,

    /// Email or password is wrong, or the account cannot log in
    #[error("Invalid credentials")]
    InvalidCredentials,

    /// Account exists but has not been confirmed
    #[error("Account is not confirmed")]
    NotConfirmed,

    /// Submitted code does not match any outstanding code
    #[error("Invalid code")]
    CodeMismatch,

    /// Submitted code matched but has expired
    #[error("Code has expired")]
    CodeExpired,

    /// New password fails the account policy
    #[error("Password policy violation: {0}")]
    PasswordPolicy(String),

    /// Too many codes requested in a short window
    #[error("Too many requests, try again later")]
    RateLimited,

    /// Database or crypto failure
    #[error("Identity provider error: {0}")]
    Internal(String),
}

impl From<sqlx::Error> for IdentityError {
    fn from(e: sqlx::Error) -> Self {
        IdentityError::Internal(format!("Database error: {}", e))
    }
}

impl From<super::password::PasswordError> for IdentityError {
    fn from(e: super::password::PasswordError) -> Self {
        IdentityError::Internal(e.to_string())
    }
}

/// Token pair issued on successful authentication
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tokens {
    pub access_token: String,
    pub refresh_token: String,

    /// Access token lifetime in seconds
    pub expires_in: i64,

    /// Always "Bearer"
    pub token_type: String,
}

/// Challenge returned instead of tokens when the flow is not finished
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "challenge", rename_all = "snake_case")]
pub enum AuthChallenge {
    /// Account must set a new password before logging in
    NewPasswordRequired {
        /// Opaque session token to pass to `complete_new_password_challenge`
        session: String,
    },
}

/// Outcome of a login attempt
#[derive(Debug, Clone)]
pub enum LoginOutcome {
    /// Credentials accepted, tokens issued
    Tokens(Box<Tokens>),

    /// Further interaction required
    Challenge(AuthChallenge),
}

/// Input for self-service registration
#[derive(Debug, Clone)]
pub struct RegisterAccount {
    pub email: String,
    pub password: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub phone: Option<String>,
    pub accepted_terms: bool,
    pub accepted_privacy: bool,
}

/// Input for admin provisioning of agent and admin accounts
#[derive(Debug, Clone)]
pub struct ProvisionAccount {
    pub email: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub phone: Option<String>,
    pub role: UserRole,
    pub agency_id: Option<Uuid>,
}

/// Identity operations the API depends on
///
/// The trait keeps handlers independent of the credential backend. A hosted
/// provider would implement the same surface by delegating to its API.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Registers a new, unconfirmed client account
    ///
    /// No tokens are issued; the account must confirm its email through
    /// `confirm_email` before `login` succeeds.
    async fn register(&self, account: RegisterAccount) -> Result<User, IdentityError>;

    /// Issues a fresh email verification code
    ///
    /// Always reports success for unknown or already-confirmed emails so the
    /// endpoint cannot be used to probe accounts.
    async fn request_email_verification(&self, email: &str) -> Result<(), IdentityError>;

    /// Confirms an account with the emailed verification code
    async fn confirm_email(&self, email: &str, code: &str) -> Result<User, IdentityError>;

    /// Verifies credentials; may return a challenge instead of tokens
    async fn login(&self, email: &str, password: &str) -> Result<LoginOutcome, IdentityError>;

    /// Completes a `NewPasswordRequired` challenge and issues tokens
    async fn complete_new_password_challenge(
        &self,
        session: &str,
        new_password: &str,
    ) -> Result<Tokens, IdentityError>;

    /// Exchanges a refresh token for a fresh token pair
    async fn refresh(&self, refresh_token: &str) -> Result<Tokens, IdentityError>;

    /// Ends the session
    ///
    /// Tokens are stateless, so this is a client-side discard; the call
    /// always succeeds.
    async fn logout(&self, access_token: &str) -> Result<(), IdentityError>;

    /// Changes the password of an authenticated user
    async fn change_password(
        &self,
        user_id: Uuid,
        current_password: &str,
        new_password: &str,
    ) -> Result<(), IdentityError>;

    /// Starts a password reset
    ///
    /// Always reports success so callers cannot probe which emails exist.
    async fn forgot_password(&self, email: &str) -> Result<(), IdentityError>;

    /// Completes a password reset with the emailed code
    async fn confirm_forgot_password(
        &self,
        email: &str,
        code: &str,
        new_password: &str,
    ) -> Result<(), IdentityError>;

    /// Creates an account on behalf of an admin
    ///
    /// Returns the user together with the generated temporary password. The
    /// password is returned exactly once and never stored in plaintext.
    async fn admin_create_user(
        &self,
        account: ProvisionAccount,
    ) -> Result<(User, String), IdentityError>;
}

/// One-time code row backing challenges and password resets
#[derive(Debug, sqlx::FromRow)]
struct AuthCode {
    id: Uuid,
    user_id: Uuid,
    code: String,
    expires_at: DateTime<Utc>,
}

/// Postgres-backed identity provider
#[derive(Clone)]
pub struct LocalIdentityProvider {
    pool: PgPool,
    jwt_secret: String,
}

impl LocalIdentityProvider {
    pub fn new(pool: PgPool, jwt_secret: impl Into<String>) -> Self {
        Self {
            pool,
            jwt_secret: jwt_secret.into(),
        }
    }

    /// Issues an access/refresh token pair for a user
    fn issue_tokens(&self, user: &User) -> Result<Tokens, IdentityError> {
        let access_claims = Claims::new(user.id, user.role, user.agency_id, TokenType::Access);
        let refresh_claims = Claims::new(user.id, user.role, user.agency_id, TokenType::Refresh);

        let access_token = jwt::create_token(&access_claims, &self.jwt_secret)
            .map_err(|e| IdentityError::Internal(e.to_string()))?;
        let refresh_token = jwt::create_token(&refresh_claims, &self.jwt_secret)
            .map_err(|e| IdentityError::Internal(e.to_string()))?;

        Ok(Tokens {
            access_token,
            refresh_token,
            expires_in: TokenType::Access.default_expiration().num_seconds(),
            token_type: "Bearer".to_string(),
        })
    }

    async fn store_code(
        &self,
        user_id: Uuid,
        purpose: &str,
        code: &str,
        ttl: Duration,
    ) -> Result<(), IdentityError> {
        sqlx::query(
            "INSERT INTO auth_codes (user_id, purpose, code, expires_at) \
             VALUES ($1, $2, $3, $4)",
        )
        .bind(user_id)
        .bind(purpose)
        .bind(code)
        .bind(Utc::now() + ttl)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Whether a code of this purpose was issued within the cooldown window
    async fn recent_code_exists(&self, user_id: Uuid, purpose: &str) -> Result<bool, sqlx::Error> {
        let (recent,): (bool,) = sqlx::query_as(
            "SELECT EXISTS(SELECT 1 FROM auth_codes \
             WHERE user_id = $1 AND purpose = $2 \
               AND created_at > NOW() - make_interval(secs => $3))",
        )
        .bind(user_id)
        .bind(purpose)
        .bind(CODE_COOLDOWN_SECONDS as f64)
        .fetch_one(&self.pool)
        .await?;

        Ok(recent)
    }

    /// Looks up an unconsumed code by purpose and value
    async fn find_code(&self, purpose: &str, code: &str) -> Result<Option<AuthCode>, sqlx::Error> {
        sqlx::query_as::<_, AuthCode>(
            "SELECT id, user_id, code, expires_at FROM auth_codes \
             WHERE purpose = $1 AND code = $2 AND consumed_at IS NULL",
        )
        .bind(purpose)
        .bind(code)
        .fetch_optional(&self.pool)
        .await
    }

    async fn consume_code(&self, id: Uuid) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE auth_codes SET consumed_at = NOW() WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Applies a verified new password and clears the change flag
    async fn set_password(&self, user_id: Uuid, new_password: &str) -> Result<User, IdentityError> {
        validate_password_strength(new_password).map_err(IdentityError::PasswordPolicy)?;

        let password_hash = hash_password(new_password)?;

        let update = crate::models::user::UpdateUser {
            password_hash: Some(password_hash),
            should_change_password: Some(false),
            ..Default::default()
        };

        User::update(&self.pool, user_id, update)
            .await?
            .ok_or(IdentityError::InvalidCredentials)
    }
}

#[async_trait]
impl IdentityProvider for LocalIdentityProvider {
    async fn register(&self, account: RegisterAccount) -> Result<User, IdentityError> {
        validate_password_strength(&account.password).map_err(IdentityError::PasswordPolicy)?;

        if User::find_by_email(&self.pool, &account.email)
            .await?
            .is_some()
        {
            return Err(IdentityError::UserExists);
        }

        let password_hash = hash_password(&account.password)?;
        let now = Utc::now();

        let create = CreateUser {
            email: account.email,
            password_hash,
            first_name: account.first_name,
            last_name: account.last_name,
            phone: account.phone,
            role: UserRole::Client,
            agency_id: None,
            is_verified: false,
            should_change_password: false,
            accepted_terms_at: account.accepted_terms.then_some(now),
            accepted_privacy_at: account.accepted_privacy.then_some(now),
        };

        let user = match User::create(&self.pool, create).await {
            Ok(user) => user,
            // Concurrent registration can slip past the pre-check
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                return Err(IdentityError::UserExists);
            }
            Err(e) => return Err(e.into()),
        };

        // First verification code goes out with the registration itself
        let code = generate_numeric_code(6);
        self.store_code(
            user.id,
            PURPOSE_EMAIL_VERIFY,
            &code,
            Duration::minutes(VERIFY_CODE_TTL_MINUTES),
        )
        .await?;

        info!(user_id = %user.id, "user registered, verification pending");

        Ok(user)
    }

    async fn request_email_verification(&self, email: &str) -> Result<(), IdentityError> {
        let Some(user) = User::find_by_email(&self.pool, email).await? else {
            debug!("verification requested for unknown email");
            return Ok(());
        };

        if user.is_verified {
            debug!(user_id = %user.id, "verification requested for confirmed account");
            return Ok(());
        }

        if self.recent_code_exists(user.id, PURPOSE_EMAIL_VERIFY).await? {
            return Err(IdentityError::RateLimited);
        }

        let code = generate_numeric_code(6);
        self.store_code(
            user.id,
            PURPOSE_EMAIL_VERIFY,
            &code,
            Duration::minutes(VERIFY_CODE_TTL_MINUTES),
        )
        .await?;

        info!(user_id = %user.id, "verification code issued");

        Ok(())
    }

    async fn confirm_email(&self, email: &str, code: &str) -> Result<User, IdentityError> {
        let user = User::find_by_email(&self.pool, email)
            .await?
            .ok_or(IdentityError::CodeMismatch)?;

        let stored = self
            .find_code(PURPOSE_EMAIL_VERIFY, code)
            .await?
            .filter(|c| c.user_id == user.id)
            .ok_or(IdentityError::CodeMismatch)?;

        if stored.expires_at < Utc::now() {
            return Err(IdentityError::CodeExpired);
        }

        let update = crate::models::user::UpdateUser {
            is_verified: Some(true),
            ..Default::default()
        };

        let user = User::update(&self.pool, user.id, update)
            .await?
            .ok_or(IdentityError::CodeMismatch)?;
        self.consume_code(stored.id).await?;

        info!(user_id = %user.id, "email confirmed");

        Ok(user)
    }

    async fn login(&self, email: &str, password: &str) -> Result<LoginOutcome, IdentityError> {
        let user = User::find_by_email(&self.pool, email)
            .await?
            .ok_or(IdentityError::InvalidCredentials)?;

        if !verify_password(password, &user.password_hash)? {
            debug!(user_id = %user.id, "password mismatch");
            return Err(IdentityError::InvalidCredentials);
        }

        if !user.is_active {
            warn!(user_id = %user.id, "login attempt on deactivated account");
            return Err(IdentityError::InvalidCredentials);
        }

        if !user.is_verified {
            return Err(IdentityError::NotConfirmed);
        }

        if user.should_change_password {
            let session = generate_session_token();
            self.store_code(
                user.id,
                PURPOSE_NEW_PASSWORD,
                &session,
                Duration::minutes(CHALLENGE_TTL_MINUTES),
            )
            .await?;

            info!(user_id = %user.id, "login challenged with new password requirement");

            return Ok(LoginOutcome::Challenge(AuthChallenge::NewPasswordRequired {
                session,
            }));
        }

        User::update_last_login(&self.pool, user.id).await?;
        let tokens = self.issue_tokens(&user)?;

        info!(user_id = %user.id, "user logged in");

        Ok(LoginOutcome::Tokens(Box::new(tokens)))
    }

    async fn complete_new_password_challenge(
        &self,
        session: &str,
        new_password: &str,
    ) -> Result<Tokens, IdentityError> {
        let code = self
            .find_code(PURPOSE_NEW_PASSWORD, session)
            .await?
            .ok_or(IdentityError::CodeMismatch)?;

        if code.expires_at < Utc::now() {
            return Err(IdentityError::CodeExpired);
        }

        let user = self.set_password(code.user_id, new_password).await?;
        self.consume_code(code.id).await?;

        User::update_last_login(&self.pool, user.id).await?;
        let tokens = self.issue_tokens(&user)?;

        info!(user_id = %user.id, "new password challenge completed");

        Ok(tokens)
    }

    async fn refresh(&self, refresh_token: &str) -> Result<Tokens, IdentityError> {
        // Any validation failure, expiry included, reads as bad credentials
        let claims = jwt::validate_refresh_token(refresh_token, &self.jwt_secret)
            .map_err(|_: JwtError| IdentityError::InvalidCredentials)?;

        // Re-read the user so role or agency changes take effect here
        let user = User::find_by_id(&self.pool, claims.sub)
            .await?
            .ok_or(IdentityError::InvalidCredentials)?;

        if !user.is_active {
            return Err(IdentityError::InvalidCredentials);
        }

        self.issue_tokens(&user)
    }

    async fn logout(&self, _access_token: &str) -> Result<(), IdentityError> {
        // Stateless tokens: nothing to revoke server-side. Clients drop the
        // pair; the access token ages out within 24 hours.
        Ok(())
    }

    async fn change_password(
        &self,
        user_id: Uuid,
        current_password: &str,
        new_password: &str,
    ) -> Result<(), IdentityError> {
        let user = User::find_by_id(&self.pool, user_id)
            .await?
            .ok_or(IdentityError::InvalidCredentials)?;

        if !verify_password(current_password, &user.password_hash)? {
            return Err(IdentityError::InvalidCredentials);
        }

        self.set_password(user.id, new_password).await?;

        info!(user_id = %user.id, "password changed");

        Ok(())
    }

    async fn forgot_password(&self, email: &str) -> Result<(), IdentityError> {
        let Some(user) = User::find_by_email(&self.pool, email).await? else {
            // Report success for unknown emails so the endpoint cannot be
            // used to enumerate accounts
            debug!("password reset requested for unknown email");
            return Ok(());
        };

        if self
            .recent_code_exists(user.id, PURPOSE_PASSWORD_RESET)
            .await?
        {
            return Err(IdentityError::RateLimited);
        }

        let code = generate_numeric_code(6);
        self.store_code(
            user.id,
            PURPOSE_PASSWORD_RESET,
            &code,
            Duration::minutes(RESET_CODE_TTL_MINUTES),
        )
        .await?;

        // Delivery happens out of band through the mail worker; the code is
        // never logged
        info!(user_id = %user.id, "password reset code issued");

        Ok(())
    }

    async fn confirm_forgot_password(
        &self,
        email: &str,
        code: &str,
        new_password: &str,
    ) -> Result<(), IdentityError> {
        let user = User::find_by_email(&self.pool, email)
            .await?
            .ok_or(IdentityError::CodeMismatch)?;

        let stored = self
            .find_code(PURPOSE_PASSWORD_RESET, code)
            .await?
            .filter(|c| c.user_id == user.id)
            .ok_or(IdentityError::CodeMismatch)?;

        if stored.expires_at < Utc::now() {
            return Err(IdentityError::CodeExpired);
        }

        self.set_password(user.id, new_password).await?;
        self.consume_code(stored.id).await?;

        info!(user_id = %user.id, "password reset completed");

        Ok(())
    }

    async fn admin_create_user(
        &self,
        account: ProvisionAccount,
    ) -> Result<(User, String), IdentityError> {
        if User::find_by_email(&self.pool, &account.email)
            .await?
            .is_some()
        {
            return Err(IdentityError::UserExists);
        }

        let temp_password = generate_temp_password();
        let password_hash = hash_password(&temp_password)?;

        let create = CreateUser {
            email: account.email,
            password_hash,
            first_name: account.first_name,
            last_name: account.last_name,
            phone: account.phone,
            role: account.role,
            agency_id: account.agency_id,
            is_verified: true,
            should_change_password: true,
            accepted_terms_at: None,
            accepted_privacy_at: None,
        };

        let user = match User::create(&self.pool, create).await {
            Ok(user) => user,
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                return Err(IdentityError::UserExists);
            }
            Err(e) => return Err(e.into()),
        };

        info!(user_id = %user.id, role = %user.role.as_str(), "account provisioned");

        Ok((user, temp_password))
    }
}

/// Generates a random numeric code of the given length
fn generate_numeric_code(len: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..len).map(|_| rng.gen_range(0..10).to_string()).collect()
}

/// Generates an opaque alphanumeric session token
fn generate_session_token() -> String {
    let mut rng = rand::thread_rng();
    (0..48)
        .map(|_| rng.sample(rand::distributions::Alphanumeric) as char)
        .collect()
}

/// Generates a temporary password that satisfies the account policy
pub fn generate_temp_password() -> String {
    const UPPER: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ";
    const LOWER: &[u8] = b"abcdefghjkmnpqrstuvwxyz";
    const DIGIT: &[u8] = b"23456789";

    let mut rng = rand::thread_rng();
    let mut chars: Vec<char> = Vec::with_capacity(16);

    // One of each required class, then filler
    chars.push(UPPER[rng.gen_range(0..UPPER.len())] as char);
    chars.push(LOWER[rng.gen_range(0..LOWER.len())] as char);
    chars.push(DIGIT[rng.gen_range(0..DIGIT.len())] as char);

    let all: Vec<u8> = [UPPER, LOWER, DIGIT].concat();
    for _ in 0..13 {
        chars.push(all[rng.gen_range(0..all.len())] as char);
    }

    chars.shuffle(&mut rng);
    chars.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_numeric_code() {
        let code = generate_numeric_code(6);

        assert_eq!(code.len(), 6);
        assert!(code.chars().all(|c| c.is_ascii_digit()));
    }

    #[test]
    fn test_generate_session_token_is_opaque() {
        let a = generate_session_token();
        let b = generate_session_token();

        assert_eq!(a.len(), 48);
        assert_ne!(a, b);
        assert!(a.chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn test_temp_password_satisfies_policy() {
        for _ in 0..20 {
            let password = generate_temp_password();
            assert!(
                validate_password_strength(&password).is_ok(),
                "generated password '{}' should satisfy the policy",
                password
            );
        }
    }

    #[test]
    fn test_challenge_serialization() {
        let challenge = AuthChallenge::NewPasswordRequired {
            session: "abc123".to_string(),
        };

        let value = serde_json::to_value(&challenge).unwrap();
        assert_eq!(value["challenge"], "new_password_required");
        assert_eq!(value["session"], "abc123");
    }

    // Provider flows against a live database are covered in nido-api/tests
}
