/// Saved search endpoints
///
/// A saved search stores a filter snapshot for later replay together with
/// notification settings; it never executes the search itself. Every
/// lookup is scoped by `(id, user_id)`: acting on another user's saved
/// search answers 404, deliberately indistinguishable from a search that
/// does not exist.
///
/// # Endpoints
///
/// - `GET /v1/search/saved` - List the caller's saved searches (paged)
/// - `POST /v1/search/saved` - Save a filter snapshot
/// - `PUT /v1/search/saved/:id` - Update name, filters, or settings
/// - `DELETE /v1/search/saved/:id` - Delete
/// - `PUT /v1/search/saved/:id/notifications` - Toggle alert delivery

use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
};
use axum::{
    extract::{Path, Query, State},
    Extension, Json,
};
use nido_shared::auth::middleware::AuthContext;
use nido_shared::geo::{self, GeoPoint};
use nido_shared::models::property::{ListingType, PropertyType};
use nido_shared::models::saved_search::{
    CreateSavedSearch, NotificationFrequency, SavedSearch, UpdateSavedSearch,
};
use nido_shared::pagination::{Page, PageRequest};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

/// Create saved search request
#[derive(Debug, Deserialize, Validate)]
pub struct CreateSavedSearchRequest {
    /// User-chosen label
    #[validate(length(min = 1, max = 100, message = "Name must be 1-100 characters"))]
    pub name: String,

    pub city: Option<String>,
    pub property_type: Option<PropertyType>,
    pub listing_type: Option<ListingType>,
    pub min_price: Option<f64>,
    pub max_price: Option<f64>,
    pub min_area: Option<f64>,
    pub max_area: Option<f64>,
    pub min_rooms: Option<i32>,
    pub min_bedrooms: Option<i32>,

    #[serde(default)]
    pub features: Vec<String>,

    /// Center of a radius filter; requires `radius_km`
    pub radius_center: Option<GeoPoint>,
    pub radius_km: Option<f64>,

    pub is_notification_enabled: Option<bool>,
    pub notification_frequency: Option<NotificationFrequency>,
}

impl CreateSavedSearchRequest {
    /// Cross-field check: the radius filter is all-or-nothing
    fn validate_radius(&self) -> Result<(), ApiError> {
        match (&self.radius_center, self.radius_km) {
            (Some(center), Some(radius_km)) => {
                center.validate()?;
                geo::validate_radius_km(radius_km)?;
                Ok(())
            }
            (None, None) => Ok(()),
            _ => Err(ApiError::BadRequest(
                "radius_center and radius_km must be provided together".to_string(),
            )),
        }
    }
}

/// Update saved search request
///
/// Present fields replace the stored value; absent fields stay untouched.
#[derive(Debug, Default, Deserialize, Validate)]
pub struct UpdateSavedSearchRequest {
    #[validate(length(min = 1, max = 100, message = "Name must be 1-100 characters"))]
    pub name: Option<String>,

    pub city: Option<String>,
    pub property_type: Option<PropertyType>,
    pub listing_type: Option<ListingType>,
    pub min_price: Option<f64>,
    pub max_price: Option<f64>,
    pub min_area: Option<f64>,
    pub max_area: Option<f64>,
    pub min_rooms: Option<i32>,
    pub min_bedrooms: Option<i32>,
    pub features: Option<Vec<String>>,
    pub radius_center: Option<GeoPoint>,
    pub radius_km: Option<f64>,
    pub is_notification_enabled: Option<bool>,
    pub notification_frequency: Option<NotificationFrequency>,
}

/// Notification toggle request
#[derive(Debug, Deserialize)]
pub struct ToggleNotificationsRequest {
    pub enabled: bool,
    pub frequency: Option<NotificationFrequency>,
}

/// Delete response
#[derive(Debug, Serialize)]
pub struct DeleteSavedSearchResponse {
    pub deleted: bool,
}

/// List the caller's saved searches, newest first
pub async fn list_saved_searches(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Query(page_req): Query<PageRequest>,
) -> ApiResult<Json<Page<SavedSearch>>> {
    let searches = SavedSearch::list_for_user(
        &state.db,
        auth.user_id,
        page_req.limit(),
        page_req.offset(),
    )
    .await?;
    let total = SavedSearch::count_for_user(&state.db, auth.user_id).await?;

    Ok(Json(Page::new(
        searches,
        total,
        page_req.page(),
        page_req.limit(),
    )))
}

/// Save a filter snapshot
pub async fn create_saved_search(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Json(req): Json<CreateSavedSearchRequest>,
) -> ApiResult<Json<SavedSearch>> {
    req.validate()?;
    req.validate_radius()?;

    let search = SavedSearch::create(
        &state.db,
        auth.user_id,
        CreateSavedSearch {
            name: req.name,
            city: req.city,
            property_type: req.property_type,
            listing_type: req.listing_type,
            min_price: req.min_price,
            max_price: req.max_price,
            min_area: req.min_area,
            max_area: req.max_area,
            min_rooms: req.min_rooms,
            min_bedrooms: req.min_bedrooms,
            features: req.features,
            radius_center: req.radius_center,
            radius_km: req.radius_km,
            is_notification_enabled: req.is_notification_enabled,
            notification_frequency: req.notification_frequency,
        },
    )
    .await?;

    Ok(Json(search))
}

/// Update a saved search
///
/// # Errors
///
/// - `404 Not Found`: Search absent, or owned by another user
pub async fn update_saved_search(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateSavedSearchRequest>,
) -> ApiResult<Json<SavedSearch>> {
    req.validate()?;

    if let Some(center) = &req.radius_center {
        center.validate()?;
    }
    if let Some(radius_km) = req.radius_km {
        geo::validate_radius_km(radius_km)?;
    }

    let update = UpdateSavedSearch {
        name: req.name,
        city: req.city.map(Some),
        property_type: req.property_type.map(Some),
        listing_type: req.listing_type.map(Some),
        min_price: req.min_price.map(Some),
        max_price: req.max_price.map(Some),
        min_area: req.min_area.map(Some),
        max_area: req.max_area.map(Some),
        min_rooms: req.min_rooms.map(Some),
        min_bedrooms: req.min_bedrooms.map(Some),
        features: req.features,
        radius_center: req.radius_center.map(Some),
        radius_km: req.radius_km.map(Some),
        is_notification_enabled: req.is_notification_enabled,
        notification_frequency: req.notification_frequency,
    };

    let search = SavedSearch::update(&state.db, id, auth.user_id, update)
        .await?
        .ok_or_else(|| ApiError::NotFound("Saved search not found".to_string()))?;

    Ok(Json(search))
}

/// Delete a saved search
///
/// # Errors
///
/// - `404 Not Found`: Search absent, or owned by another user
pub async fn delete_saved_search(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<DeleteSavedSearchResponse>> {
    let deleted = SavedSearch::delete(&state.db, id, auth.user_id).await?;

    if !deleted {
        return Err(ApiError::NotFound("Saved search not found".to_string()));
    }

    Ok(Json(DeleteSavedSearchResponse { deleted }))
}

/// Toggle alert delivery for a saved search
pub async fn toggle_notifications(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<Uuid>,
    Json(req): Json<ToggleNotificationsRequest>,
) -> ApiResult<Json<SavedSearch>> {
    let update = UpdateSavedSearch {
        is_notification_enabled: Some(req.enabled),
        notification_frequency: req.frequency,
        ..Default::default()
    };

    let search = SavedSearch::update(&state.db, id, auth.user_id, update)
        .await?
        .ok_or_else(|| ApiError::NotFound("Saved search not found".to_string()))?;

    Ok(Json(search))
}
