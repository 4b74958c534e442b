/// Authentication middleware for Axum
///
/// Validates Bearer tokens from the Authorization header and adds an
/// [`AuthContext`] to request extensions. Two variants exist:
///
/// - **required**: rejects requests without a valid access token
/// - **optional**: passes requests through either way, attaching the context
///   when a valid token is present (public listing pages use this so view
///   dedup can see who is browsing)
///
/// # Example
///
/// ```no_run
/// use axum::{Router, routing::get, middleware, Extension};
/// use nido_shared::auth::middleware::{create_auth_middleware, AuthContext};
///
/// async fn protected_handler(Extension(auth): Extension<AuthContext>) -> String {
///     format!("Hello, user {}!", auth.user_id)
/// }
///
/// let app: Router = Router::new()
///     .route("/protected", get(protected_handler))
///     .layer(middleware::from_fn(create_auth_middleware("your-jwt-secret")));
/// ```

use axum::{
    extract::Request,
    http::{header, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::user::UserRole;

use super::jwt::{validate_access_token, JwtError};

/// Authentication context added to request extensions
///
/// Carries everything authorization decisions need, read straight from the
/// validated token without a database round-trip.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthContext {
    /// Authenticated user ID
    pub user_id: Uuid,

    /// Role at token issue time
    pub role: UserRole,

    /// Agency membership, absent for clients
    pub agency_id: Option<Uuid>,
}

impl AuthContext {
    pub fn new(user_id: Uuid, role: UserRole, agency_id: Option<Uuid>) -> Self {
        Self {
            user_id,
            role,
            agency_id,
        }
    }

    /// Whether this context may create and manage property listings
    pub fn can_manage_listings(&self) -> bool {
        self.role.can_manage_listings()
    }

    /// Whether this context holds at least admin privileges
    pub fn is_admin(&self) -> bool {
        matches!(self.role, UserRole::Admin | UserRole::Owner)
    }

    /// Whether this context holds owner privileges
    pub fn is_owner(&self) -> bool {
        matches!(self.role, UserRole::Owner)
    }
}

/// Error type for authentication middleware
#[derive(Debug)]
pub enum AuthError {
    /// Missing authorization header
    MissingCredentials,

    /// Invalid authorization header format
    InvalidFormat(String),

    /// Token validation failed
    InvalidToken(String),
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        match self {
            AuthError::MissingCredentials => {
                (StatusCode::UNAUTHORIZED, "Missing credentials").into_response()
            }
            AuthError::InvalidFormat(msg) => (StatusCode::BAD_REQUEST, msg).into_response(),
            AuthError::InvalidToken(msg) => (StatusCode::UNAUTHORIZED, msg).into_response(),
        }
    }
}

/// Extracts and validates the Bearer token from a request
fn context_from_request(req: &Request, secret: &str) -> Result<AuthContext, AuthError> {
    let auth_header = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or(AuthError::MissingCredentials)?;

    let token = auth_header
        .strip_prefix("Bearer ")
        .ok_or_else(|| AuthError::InvalidFormat("Expected Bearer token".to_string()))?;

    let claims = validate_access_token(token, secret).map_err(|e| match e {
        JwtError::Expired => AuthError::InvalidToken("Token expired".to_string()),
        JwtError::InvalidIssuer { .. } => AuthError::InvalidToken("Invalid issuer".to_string()),
        _ => AuthError::InvalidToken(format!("Invalid token: {}", e)),
    })?;

    Ok(AuthContext::new(claims.sub, claims.role, claims.agency_id))
}

/// Required authentication middleware
///
/// Returns 401 Unauthorized when the Authorization header is missing, the
/// token format is invalid, or validation fails.
pub async fn auth_middleware(
    secret: String,
    mut req: Request,
    next: Next,
) -> Result<Response, AuthError> {
    let context = context_from_request(&req, &secret)?;
    req.extensions_mut().insert(context);

    Ok(next.run(req).await)
}

/// Optional authentication middleware
///
/// Attaches an [`AuthContext`] when a valid token is present and passes the
/// request through untouched otherwise. An invalid token on an optional
/// route is treated as anonymous rather than rejected.
pub async fn optional_auth_middleware(secret: String, mut req: Request, next: Next) -> Response {
    if let Ok(context) = context_from_request(&req, &secret) {
        req.extensions_mut().insert(context);
    }

    next.run(req).await
}

/// Creates a required-auth middleware closure capturing the JWT secret
pub fn create_auth_middleware(
    secret: impl Into<String>,
) -> impl Fn(
    Request,
    Next,
) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<Response, AuthError>> + Send>>
       + Clone {
    let secret = secret.into();
    move |req, next| {
        let secret = secret.clone();
        Box::pin(auth_middleware(secret, req, next))
    }
}

/// Creates an optional-auth middleware closure capturing the JWT secret
pub fn create_optional_auth_middleware(
    secret: impl Into<String>,
) -> impl Fn(Request, Next) -> std::pin::Pin<Box<dyn std::future::Future<Output = Response> + Send>>
       + Clone {
    let secret = secret.into();
    move |req, next| {
        let secret = secret.clone();
        Box::pin(optional_auth_middleware(secret, req, next))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::jwt::{create_token, Claims, TokenType};
    use axum::body::Body;

    fn request_with_auth(value: &str) -> Request {
        Request::builder()
            .header(header::AUTHORIZATION, value)
            .body(Body::empty())
            .expect("request should build")
    }

    #[test]
    fn test_auth_context_privileges() {
        let client = AuthContext::new(Uuid::new_v4(), UserRole::Client, None);
        assert!(!client.can_manage_listings());
        assert!(!client.is_admin());
        assert!(!client.is_owner());

        let admin = AuthContext::new(Uuid::new_v4(), UserRole::Admin, Some(Uuid::new_v4()));
        assert!(admin.can_manage_listings());
        assert!(admin.is_admin());
        assert!(!admin.is_owner());

        let owner = AuthContext::new(Uuid::new_v4(), UserRole::Owner, None);
        assert!(owner.is_admin());
        assert!(owner.is_owner());
    }

    #[test]
    fn test_context_from_valid_token() {
        let secret = "test-secret";
        let user_id = Uuid::new_v4();
        let agency_id = Uuid::new_v4();

        let claims = Claims::new(user_id, UserRole::Agent, Some(agency_id), TokenType::Access);
        let token = create_token(&claims, secret).unwrap();

        let req = request_with_auth(&format!("Bearer {}", token));
        let context = context_from_request(&req, secret).expect("should extract context");

        assert_eq!(context.user_id, user_id);
        assert_eq!(context.role, UserRole::Agent);
        assert_eq!(context.agency_id, Some(agency_id));
    }

    #[test]
    fn test_context_missing_header() {
        let req = Request::builder().body(Body::empty()).unwrap();
        let result = context_from_request(&req, "secret");

        assert!(matches!(result, Err(AuthError::MissingCredentials)));
    }

    #[test]
    fn test_context_rejects_non_bearer() {
        let req = request_with_auth("Basic dXNlcjpwYXNz");
        let result = context_from_request(&req, "secret");

        assert!(matches!(result, Err(AuthError::InvalidFormat(_))));
    }

    #[test]
    fn test_context_rejects_refresh_token() {
        let secret = "test-secret";
        let claims = Claims::new(Uuid::new_v4(), UserRole::Client, None, TokenType::Refresh);
        let token = create_token(&claims, secret).unwrap();

        let req = request_with_auth(&format!("Bearer {}", token));
        let result = context_from_request(&req, secret);

        assert!(matches!(result, Err(AuthError::InvalidToken(_))));
    }

    #[test]
    fn test_auth_error_into_response() {
        let response = AuthError::MissingCredentials.into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = AuthError::InvalidFormat("test".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = AuthError::InvalidToken("test".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}
