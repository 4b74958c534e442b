/// Authentication and identity for Nido
///
/// # Modules
///
/// - [`password`]: Argon2id password hashing and policy validation
/// - [`jwt`]: JWT token generation and validation
/// - [`provider`]: The [`provider::IdentityProvider`] trait and its local
///   Postgres-backed implementation
/// - [`middleware`]: Axum middleware extracting [`middleware::AuthContext`]
///   from Bearer tokens
///
/// # Security Features
///
/// - **Password Hashing**: Argon2id with 64 MB memory, 3 iterations
/// - **JWT Tokens**: HS256 signing, access tokens 24h, refresh tokens 30d
/// - **Reset Codes**: Random one-time codes with expiry, single use
/// - **Constant-time Comparison**: Password verification never short-circuits
///
/// # Example
///
/// ```no_run
/// use nido_shared::auth::password::{hash_password, verify_password};
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let hash = hash_password("user_password")?;
/// assert!(verify_password("user_password", &hash)?);
/// # Ok(())
/// # }
/// ```

pub mod jwt;
pub mod middleware;
pub mod password;
pub mod provider;
