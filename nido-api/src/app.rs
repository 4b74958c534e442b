/// Application state and router builder
///
/// This module defines the shared application state and provides
/// a function to build the Axum router with all routes and middleware.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use nido_api::{app::AppState, config::Config};
/// use nido_shared::auth::provider::LocalIdentityProvider;
/// use nido_shared::storage::memory::MemoryStore;
/// use sqlx::PgPool;
///
/// # async fn example() -> anyhow::Result<()> {
/// let config = Config::from_env()?;
/// let pool = PgPool::connect(&config.database.url).await?;
/// let identity = LocalIdentityProvider::new(pool.clone(), config.jwt.secret.clone());
/// let state = AppState::new(pool, config, Arc::new(MemoryStore::new()), Arc::new(identity));
/// let app = nido_api::app::build_router(state);
/// # Ok(())
/// # }
/// ```

use crate::config::Config;
use crate::middleware::rate_limit::{self, RateLimiter};
use crate::middleware::security;
use axum::{
    extract::{DefaultBodyLimit, Request},
    http::{header, HeaderValue, Method},
    middleware::Next,
    response::Response,
    routing::{delete, get, patch, post, put},
    Router,
};
use nido_shared::auth::{jwt, middleware::AuthContext, provider::IdentityProvider};
use nido_shared::storage::ObjectStore;
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};
use tracing::Level;

/// Largest accepted image upload request (10 files within this budget)
const IMAGE_UPLOAD_BODY_LIMIT: usize = 50 * 1024 * 1024;

/// Shared application state
///
/// This is cloned for each request handler via Axum's `State` extractor.
/// Uses Arc internally for cheap cloning; the object store and identity
/// provider are trait objects so tests substitute in-memory fakes.
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool
    pub db: PgPool,

    /// Application configuration
    pub config: Arc<Config>,

    /// Object storage backend for property images
    pub store: Arc<dyn ObjectStore>,

    /// Identity provider backing the auth endpoints
    pub identity: Arc<dyn IdentityProvider>,

    /// Per-IP counter for the auth endpoints
    pub rate_limiter: Arc<RateLimiter>,
}

impl AppState {
    /// Creates new application state
    pub fn new(
        db: PgPool,
        config: Config,
        store: Arc<dyn ObjectStore>,
        identity: Arc<dyn IdentityProvider>,
    ) -> Self {
        let rate_limiter = Arc::new(RateLimiter::new(
            Duration::from_secs(config.rate_limit.window_secs),
            config.rate_limit.max_requests,
        ));

        Self {
            db,
            config: Arc::new(config),
            store,
            identity,
            rate_limiter,
        }
    }

    /// Gets JWT secret for token operations
    pub fn jwt_secret(&self) -> &str {
        &self.config.jwt.secret
    }

    /// Lifetime of presigned image URLs in seconds
    pub fn signed_url_expiry(&self) -> u64 {
        self.config.storage.signed_url_expiry_secs
    }
}

/// Builds the complete Axum router with all routes and middleware
///
/// # Architecture
///
/// ```text
/// /
/// ├── /health                        # Health check (public)
/// ├── /v1/
/// │   ├── /auth/                     # Credentials (rate limited)
/// │   ├── /properties/               # Listings, cards, images, favorites
/// │   ├── /search/                   # Filtered search, saved searches, history
/// │   ├── /users/                    # Profile, preferences, provisioning
/// │   ├── /agencies/                 # Agency provisioning and storage usage
/// │   └── /notifications/            # In-app inbox
/// ```
///
/// # Middleware Stack
///
/// Applied in order (bottom to top):
/// 1. Security headers
/// 2. CORS (tower-http CorsLayer)
/// 3. Logging (tower-http TraceLayer)
/// 4. Authentication (per-route basis)
pub fn build_router(state: AppState) -> Router {
    use crate::routes;

    // Health check (public, no auth)
    let health_routes = Router::new().route("/health", get(routes::health::health_check));

    // Credential endpoints: public, behind the per-IP rate limiter.
    // change-password additionally needs a valid access token.
    let auth_routes = Router::new()
        .route("/register", post(routes::auth::register))
        .route("/verify-email", post(routes::auth::verify_email))
        .route(
            "/verify-email/request",
            post(routes::auth::request_verification),
        )
        .route("/login", post(routes::auth::login))
        .route(
            "/login/new-password",
            post(routes::auth::complete_new_password),
        )
        .route("/refresh", post(routes::auth::refresh))
        .route("/logout", post(routes::auth::logout))
        .route("/forgot-password", post(routes::auth::forgot_password))
        .route(
            "/forgot-password/confirm",
            post(routes::auth::confirm_forgot_password),
        )
        .merge(
            Router::new()
                .route("/change-password", post(routes::auth::change_password))
                .layer(axum::middleware::from_fn_with_state(
                    state.clone(),
                    jwt_auth_layer,
                )),
        )
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            rate_limit::rate_limit_layer,
        ));

    // Listings share paths between the public surface (cards, detail) and
    // agent management, so the whole router runs behind the optional auth
    // layer; management handlers demand a caller via [`RequireAuth`].
    let property_routes = Router::new()
        .route("/", post(routes::properties::create_property))
        .route("/cards", post(routes::properties::cards))
        .route(
            "/:id",
            get(routes::properties::get_property)
                .patch(routes::properties::update_property)
                .delete(routes::properties::delete_property),
        )
        .route("/:id/favorite", put(routes::properties::toggle_favorite))
        .route(
            "/:id/images",
            post(routes::images::upload_images)
                .layer(DefaultBodyLimit::max(IMAGE_UPLOAD_BODY_LIMIT)),
        )
        .route(
            "/:id/images/:image_id",
            delete(routes::images::delete_image).patch(routes::images::update_image),
        )
        .route(
            "/:id/images/:image_id/primary",
            put(routes::images::set_primary_image),
        )
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            optional_jwt_auth_layer,
        ));

    let search_public_routes = Router::new()
        .route("/", post(routes::search::search))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            optional_jwt_auth_layer,
        ))
        .route("/suggestions", get(routes::search::suggestions));

    let search_routes = Router::new()
        .route("/history", get(routes::search::history))
        .route("/saved", get(routes::saved_searches::list_saved_searches))
        .route("/saved", post(routes::saved_searches::create_saved_search))
        .route(
            "/saved/:id",
            put(routes::saved_searches::update_saved_search),
        )
        .route(
            "/saved/:id",
            delete(routes::saved_searches::delete_saved_search),
        )
        .route(
            "/saved/:id/notifications",
            put(routes::saved_searches::toggle_notifications),
        )
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            jwt_auth_layer,
        ))
        .merge(search_public_routes);

    let user_routes = Router::new()
        .route("/profile", get(routes::users::get_profile))
        .route("/profile", patch(routes::users::update_profile))
        .route("/preferences", get(routes::users::get_preferences))
        .route("/preferences", put(routes::users::update_preferences))
        .route(
            "/notification-preferences",
            get(routes::users::get_notification_preferences),
        )
        .route(
            "/notification-preferences",
            put(routes::users::update_notification_preferences),
        )
        .route("/agents", post(routes::users::create_agent))
        .route("/agents", get(routes::users::list_agents))
        .route("/admins", post(routes::users::create_admin))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            jwt_auth_layer,
        ));

    let agency_routes = Router::new()
        .route("/", post(routes::agencies::create_agency))
        .route("/:id/storage", get(routes::agencies::storage_usage))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            jwt_auth_layer,
        ))
        .route("/:id", get(routes::agencies::get_agency));

    let notification_routes = Router::new()
        .route("/", get(routes::notifications::list_notifications))
        .route(
            "/unread-count",
            get(routes::notifications::unread_count),
        )
        .route("/read-all", put(routes::notifications::mark_all_read))
        .route("/:id/read", put(routes::notifications::mark_read))
        .route("/:id", delete(routes::notifications::delete_notification))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            jwt_auth_layer,
        ));

    // Build complete v1 API
    let v1_routes = Router::new()
        .nest("/auth", auth_routes)
        .nest("/properties", property_routes)
        .nest("/search", search_routes)
        .nest("/users", user_routes)
        .nest("/agencies", agency_routes)
        .nest("/notifications", notification_routes);

    // Configure CORS based on environment
    let cors = if state.config.api.cors_origins.contains(&"*".to_string()) {
        // Development mode: permissive CORS
        CorsLayer::permissive()
    } else {
        // Production mode: configure allowed origins
        let origins: Vec<HeaderValue> = state
            .config
            .api
            .cors_origins
            .iter()
            .filter_map(|origin| origin.parse().ok())
            .collect();

        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods([
                Method::GET,
                Method::POST,
                Method::PUT,
                Method::PATCH,
                Method::DELETE,
                Method::OPTIONS,
            ])
            .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
            .allow_credentials(true)
            .max_age(std::time::Duration::from_secs(3600))
    };

    let production = state.config.api.production;

    // Combine all routes with middleware stack
    Router::new()
        .merge(health_routes)
        .nest("/v1", v1_routes)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(cors)
        .layer(axum::middleware::from_fn(move |req, next| {
            security::security_headers(production, req, next)
        }))
        .with_state(state)
}

/// JWT authentication middleware layer
///
/// Extracts and validates the JWT token from the Authorization header,
/// then injects [`AuthContext`] into request extensions.
async fn jwt_auth_layer(
    state: axum::extract::State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, crate::error::ApiError> {
    let auth_header = req
        .headers()
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| {
            crate::error::ApiError::Unauthorized("Missing authorization header".to_string())
        })?;

    let token = auth_header.strip_prefix("Bearer ").ok_or_else(|| {
        crate::error::ApiError::BadRequest("Expected Bearer token".to_string())
    })?;

    let claims = jwt::validate_access_token(token, state.jwt_secret())?;

    let auth_context = AuthContext::new(claims.sub, claims.role, claims.agency_id);
    req.extensions_mut().insert(auth_context);

    Ok(next.run(req).await)
}

/// Extractor demanding an authenticated caller
///
/// Reads the [`AuthContext`] attached by the auth middleware and rejects
/// the request with 401 when none is present. Used on routes that sit
/// behind the optional auth layer because they share paths with public
/// endpoints.
pub struct RequireAuth(pub AuthContext);

#[axum::async_trait]
impl<S> axum::extract::FromRequestParts<S> for RequireAuth
where
    S: Send + Sync,
{
    type Rejection = crate::error::ApiError;

    async fn from_request_parts(
        parts: &mut axum::http::request::Parts,
        _state: &S,
    ) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthContext>()
            .cloned()
            .map(RequireAuth)
            .ok_or_else(|| {
                crate::error::ApiError::Unauthorized("Missing credentials".to_string())
            })
    }
}

/// Optional JWT authentication middleware layer
///
/// Attaches an [`AuthContext`] when a valid token is present and passes the
/// request through anonymously otherwise. Used on the public listing and
/// search routes so view dedup and history see who is browsing.
async fn optional_jwt_auth_layer(
    state: axum::extract::State<AppState>,
    mut req: Request,
    next: Next,
) -> Response {
    let token = req
        .headers()
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));

    if let Some(token) = token {
        if let Ok(claims) = jwt::validate_access_token(token, state.jwt_secret()) {
            req.extensions_mut()
                .insert(AuthContext::new(claims.sub, claims.role, claims.agency_id));
        }
    }

    next.run(req).await
}
