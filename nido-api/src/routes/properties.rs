/// Property listing endpoints
///
/// Listings are created and managed by agents and browsed publicly through
/// the card search. Addresses arrive as nested objects and are flattened
/// into columns; locations are validated GeoJSON points.
///
/// # Endpoints
///
/// - `POST /v1/properties` - Create a listing (agent)
/// - `POST /v1/properties/cards` - Filtered, paginated card search (public)
/// - `GET /v1/properties/:id` - Listing detail; records a deduped view
/// - `PATCH /v1/properties/:id` - Partial update (owning agent)
/// - `DELETE /v1/properties/:id` - Delete listing and its stored images
/// - `PUT /v1/properties/:id/favorite` - Toggle a favorite (any account)

use crate::{
    app::{AppState, RequireAuth},
    error::{ApiError, ApiResult},
};
use axum::{
    extract::{Path, State},
    Extension, Json,
};
use chrono::{DateTime, Utc};
use nido_shared::geo::GeoPoint;
use nido_shared::models::favorite::Favorite;
use nido_shared::models::property::{
    CreateProperty, EnergyClass, ListingType, Property, PropertyHit, PropertyStatus, PropertyType,
    UpdateProperty,
};
use nido_shared::models::property_image::PropertyImage;
use nido_shared::models::user::User;
use nido_shared::models::view;
use nido_shared::pagination::{Page, PageRequest};
use nido_shared::storage::keys as storage_keys;
use nido_shared::{auth::middleware::AuthContext, images};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::{Validate, ValidationError};

use super::images::{image_response, ImageResponse};
use super::search::SearchFilters;

fn validate_zip(zip: &str) -> Result<(), ValidationError> {
    if zip.len() == 5 && zip.chars().all(|c| c.is_ascii_digit()) {
        return Ok(());
    }
    Err(ValidationError::new("zip_code").with_message("Zip code must be 5 digits".into()))
}

/// Nested address payload, flattened into columns on persist
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct AddressInput {
    #[validate(length(min = 1, max = 255, message = "Street is required"))]
    pub street: String,

    #[validate(length(min = 1, max = 100, message = "City is required"))]
    pub city: String,

    #[validate(length(max = 100, message = "Province must be at most 100 characters"))]
    pub province: Option<String>,

    #[validate(custom(function = validate_zip))]
    pub zip_code: String,

    #[validate(length(max = 100, message = "Country must be at most 100 characters"))]
    pub country: Option<String>,
}

/// Create listing request
#[derive(Debug, Deserialize, Validate)]
pub struct CreatePropertyRequest {
    #[validate(length(min = 5, max = 200, message = "Title must be 5-200 characters"))]
    pub title: String,

    #[validate(length(min = 20, max = 4000, message = "Description must be 20-4000 characters"))]
    pub description: String,

    #[validate(range(exclusive_min = 0.0, message = "Price must be greater than zero"))]
    pub price: f64,

    pub property_type: PropertyType,
    pub listing_type: ListingType,

    #[validate(range(min = 0, max = 50, message = "Rooms must be between 0 and 50"))]
    pub rooms: Option<i32>,

    #[validate(range(min = 0, max = 50, message = "Bedrooms must be between 0 and 50"))]
    pub bedrooms: Option<i32>,

    #[validate(range(min = 0, max = 50, message = "Bathrooms must be between 0 and 50"))]
    pub bathrooms: Option<i32>,

    #[validate(range(exclusive_min = 0.0, message = "Area must be greater than zero"))]
    pub area: Option<f64>,

    pub floor: Option<i32>,
    pub energy_class: Option<EnergyClass>,

    #[serde(default)]
    pub has_elevator: bool,
    #[serde(default)]
    pub has_balcony: bool,
    #[serde(default)]
    pub has_garden: bool,
    #[serde(default)]
    pub has_parking: bool,

    /// Free-form feature tags, normalized on persist
    #[serde(default)]
    pub features: Vec<String>,

    #[validate(nested)]
    pub address: AddressInput,

    /// GeoJSON point, `[longitude, latitude]`
    pub location: GeoPoint,
}

/// Partial update request
///
/// Only present fields are applied; nested `address` and `location`
/// objects are flattened and validated like on create.
#[derive(Debug, Default, Deserialize, Validate)]
pub struct UpdatePropertyRequest {
    #[validate(length(min = 5, max = 200, message = "Title must be 5-200 characters"))]
    pub title: Option<String>,

    #[validate(length(min = 20, max = 4000, message = "Description must be 20-4000 characters"))]
    pub description: Option<String>,

    #[validate(range(exclusive_min = 0.0, message = "Price must be greater than zero"))]
    pub price: Option<f64>,

    pub property_type: Option<PropertyType>,
    pub listing_type: Option<ListingType>,
    pub status: Option<PropertyStatus>,

    #[validate(range(min = 0, max = 50, message = "Rooms must be between 0 and 50"))]
    pub rooms: Option<i32>,

    #[validate(range(min = 0, max = 50, message = "Bedrooms must be between 0 and 50"))]
    pub bedrooms: Option<i32>,

    #[validate(range(min = 0, max = 50, message = "Bathrooms must be between 0 and 50"))]
    pub bathrooms: Option<i32>,

    #[validate(range(exclusive_min = 0.0, message = "Area must be greater than zero"))]
    pub area: Option<f64>,

    pub floor: Option<i32>,
    pub energy_class: Option<EnergyClass>,

    pub has_elevator: Option<bool>,
    pub has_balcony: Option<bool>,
    pub has_garden: Option<bool>,
    pub has_parking: Option<bool>,

    pub features: Option<Vec<String>>,

    #[validate(nested)]
    pub address: Option<AddressInput>,

    pub location: Option<GeoPoint>,
}

/// Card search request: shared filters plus scope and pagination
#[derive(Debug, Default, Deserialize)]
pub struct CardsRequest {
    #[serde(flatten)]
    pub filters: SearchFilters,

    /// Listing status scope; defaults to `active` for the public surface
    pub status: Option<PropertyStatus>,

    /// Restrict to listings whose agent belongs to this agency
    pub agency_id: Option<Uuid>,

    /// Restrict to one agent's listings
    pub agent_id: Option<Uuid>,

    pub page: Option<i64>,
    pub limit: Option<i64>,
}

/// Flattened address in responses
#[derive(Debug, Serialize)]
pub struct AddressResponse {
    pub street: String,
    pub city: String,
    pub province: Option<String>,
    pub zip_code: String,
    pub country: String,
}

/// Agent projection attached to listings and cards
#[derive(Debug, Serialize)]
pub struct AgentSummary {
    pub id: Uuid,
    pub name: String,
    pub phone: Option<String>,
    pub avatar_url: Option<String>,
    pub agency_id: Option<Uuid>,
}

/// Full listing DTO
#[derive(Debug, Serialize)]
pub struct PropertyResponse {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub price: f64,
    pub property_type: PropertyType,
    pub listing_type: ListingType,
    pub status: PropertyStatus,
    pub rooms: Option<i32>,
    pub bedrooms: Option<i32>,
    pub bathrooms: Option<i32>,
    pub area: Option<f64>,
    pub floor: Option<i32>,
    pub energy_class: Option<EnergyClass>,
    pub has_elevator: bool,
    pub has_balcony: bool,
    pub has_garden: bool,
    pub has_parking: bool,
    pub features: Vec<String>,
    pub address: AddressResponse,
    pub location: GeoPoint,
    pub agent: AgentSummary,
    pub views: i32,
    pub favorites: i32,

    /// Whether the authenticated viewer has favorited this listing
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_favorited: Option<bool>,

    pub images: Vec<ImageResponse>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Compact listing card for search results
#[derive(Debug, Serialize)]
pub struct PropertyCard {
    pub id: Uuid,
    pub title: String,
    pub price: f64,
    pub property_type: PropertyType,
    pub listing_type: ListingType,
    pub status: PropertyStatus,
    pub city: String,
    pub province: Option<String>,
    pub rooms: Option<i32>,
    pub bedrooms: Option<i32>,
    pub bathrooms: Option<i32>,
    pub area: Option<f64>,

    /// Primary image variants, when the listing has any image
    pub image: Option<nido_shared::images::ImageUrls>,

    pub agent: AgentSummary,

    /// Distance from the search center; only set for radius searches
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distance_km: Option<f64>,

    pub views: i32,
    pub favorites: i32,
    pub created_at: DateTime<Utc>,
}

/// Toggle favorite response
#[derive(Debug, Serialize)]
pub struct FavoriteResponse {
    pub favorited: bool,
}

/// Delete listing response
#[derive(Debug, Serialize)]
pub struct DeletePropertyResponse {
    pub deleted: bool,
}

/// Builds the agent projection for a listing
async fn agent_summary(state: &AppState, agent_id: Uuid) -> ApiResult<AgentSummary> {
    let agent = User::find_by_id(&state.db, agent_id)
        .await?
        .ok_or_else(|| ApiError::InternalError("Listing agent missing".to_string()))?;

    Ok(AgentSummary {
        name: agent.display_name(),
        id: agent.id,
        phone: agent.phone,
        avatar_url: agent.avatar_url,
        agency_id: agent.agency_id,
    })
}

/// Builds the full listing DTO, including signed image URLs
async fn property_response(
    state: &AppState,
    property: Property,
    viewer: Option<&AuthContext>,
) -> ApiResult<PropertyResponse> {
    let agent = agent_summary(state, property.agent_id).await?;

    let rows = PropertyImage::list_by_property(&state.db, property.id).await?;
    let mut image_dtos = Vec::with_capacity(rows.len());
    for row in rows {
        image_dtos.push(image_response(state, row).await?);
    }

    let is_favorited = match viewer {
        Some(auth) => Some(Favorite::exists(&state.db, auth.user_id, property.id).await?),
        None => None,
    };

    Ok(PropertyResponse {
        id: property.id,
        title: property.title,
        description: property.description,
        price: property.price,
        property_type: property.property_type,
        listing_type: property.listing_type,
        status: property.status,
        rooms: property.rooms,
        bedrooms: property.bedrooms,
        bathrooms: property.bathrooms,
        area: property.area,
        floor: property.floor,
        energy_class: property.energy_class,
        has_elevator: property.has_elevator,
        has_balcony: property.has_balcony,
        has_garden: property.has_garden,
        has_parking: property.has_parking,
        features: property.features.0,
        address: AddressResponse {
            street: property.street,
            city: property.city,
            province: property.province,
            zip_code: property.zip_code,
            country: property.country,
        },
        location: property.location.0,
        agent,
        views: property.views,
        favorites: property.favorites,
        is_favorited,
        images: image_dtos,
        created_at: property.created_at,
        updated_at: property.updated_at,
    })
}

/// Builds a search card from one hit
///
/// The card carries the primary image's variant URLs, falling back to the
/// first image in display order when no primary is flagged.
pub(crate) async fn build_card(state: &AppState, hit: PropertyHit) -> ApiResult<PropertyCard> {
    let property = hit.property;

    let image_row = match PropertyImage::find_primary(&state.db, property.id).await? {
        Some(image) => Some(image),
        None => PropertyImage::list_by_property(&state.db, property.id)
            .await?
            .into_iter()
            .next(),
    };

    let image = match image_row {
        Some(row) => Some(
            images::signed_variant_urls(state.store.as_ref(), &row, state.signed_url_expiry())
                .await?,
        ),
        None => None,
    };

    let agent = agent_summary(state, property.agent_id).await?;

    Ok(PropertyCard {
        id: property.id,
        title: property.title,
        price: property.price,
        property_type: property.property_type,
        listing_type: property.listing_type,
        status: property.status,
        city: property.city,
        province: property.province,
        rooms: property.rooms,
        bedrooms: property.bedrooms,
        bathrooms: property.bathrooms,
        area: property.area,
        image,
        agent,
        distance_km: hit.distance_km,
        views: property.views,
        favorites: property.favorites,
        created_at: property.created_at,
    })
}

/// Create a property listing
///
/// Agents only; the listing starts in status `active` and with no images.
///
/// # Errors
///
/// - `401 Unauthorized`: Missing or invalid token
/// - `403 Forbidden`: Caller role cannot manage listings
/// - `422 Unprocessable Entity`: Validation failed
pub async fn create_property(
    State(state): State<AppState>,
    RequireAuth(auth): RequireAuth,
    Json(req): Json<CreatePropertyRequest>,
) -> ApiResult<Json<PropertyResponse>> {
    if !auth.can_manage_listings() {
        return Err(ApiError::Forbidden(
            "Only agents can create listings".to_string(),
        ));
    }

    req.validate()?;
    req.location.validate()?;

    let property = Property::create(
        &state.db,
        CreateProperty {
            title: req.title,
            description: req.description,
            price: req.price,
            property_type: req.property_type,
            listing_type: req.listing_type,
            rooms: req.rooms,
            bedrooms: req.bedrooms,
            bathrooms: req.bathrooms,
            area: req.area,
            floor: req.floor,
            energy_class: req.energy_class,
            has_elevator: req.has_elevator,
            has_balcony: req.has_balcony,
            has_garden: req.has_garden,
            has_parking: req.has_parking,
            features: req.features,
            street: req.address.street,
            city: req.address.city,
            province: req.address.province,
            zip_code: req.address.zip_code,
            country: req.address.country,
            location: req.location,
            agent_id: auth.user_id,
        },
    )
    .await?;

    tracing::info!(property_id = %property.id, agent_id = %auth.user_id, "listing created");

    Ok(Json(property_response(&state, property, Some(&auth)).await?))
}

/// Listing detail
///
/// Public; records a view deduplicated per viewer within one hour.
pub async fn get_property(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    viewer: Option<Extension<AuthContext>>,
) -> ApiResult<Json<PropertyResponse>> {
    let property = Property::find_by_id(&state.db, id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Property not found".to_string()))?;

    let viewer = viewer.map(|Extension(auth)| auth);
    view::record_view(&state.db, property.id, viewer.as_ref().map(|a| a.user_id)).await?;

    Ok(Json(
        property_response(&state, property, viewer.as_ref()).await?,
    ))
}

/// Partially update a listing
///
/// Only the owning agent may update; only fields present in the patch are
/// applied. Last write wins under concurrent updates.
pub async fn update_property(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    RequireAuth(auth): RequireAuth,
    Json(req): Json<UpdatePropertyRequest>,
) -> ApiResult<Json<PropertyResponse>> {
    req.validate()?;
    if let Some(location) = &req.location {
        location.validate()?;
    }

    let property = Property::find_by_id(&state.db, id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Property not found".to_string()))?;

    if property.agent_id != auth.user_id {
        return Err(ApiError::Forbidden(
            "Only the listing agent can update this property".to_string(),
        ));
    }

    let mut update = UpdateProperty {
        title: req.title,
        description: req.description,
        price: req.price,
        property_type: req.property_type,
        listing_type: req.listing_type,
        status: req.status,
        rooms: req.rooms.map(Some),
        bedrooms: req.bedrooms.map(Some),
        bathrooms: req.bathrooms.map(Some),
        area: req.area.map(Some),
        floor: req.floor.map(Some),
        energy_class: req.energy_class.map(Some),
        has_elevator: req.has_elevator,
        has_balcony: req.has_balcony,
        has_garden: req.has_garden,
        has_parking: req.has_parking,
        features: req.features,
        location: req.location,
        ..Default::default()
    };

    if let Some(address) = req.address {
        update.street = Some(address.street);
        update.city = Some(address.city);
        update.province = Some(address.province);
        update.zip_code = Some(address.zip_code);
        update.country = address.country;
    }

    let property = Property::update(&state.db, id, update)
        .await?
        .ok_or_else(|| ApiError::NotFound("Property not found".to_string()))?;

    Ok(Json(property_response(&state, property, Some(&auth)).await?))
}

/// Delete a listing
///
/// Removes every stored image object first, then the rows; image,
/// favorite, and view rows cascade with the property.
pub async fn delete_property(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    RequireAuth(auth): RequireAuth,
) -> ApiResult<Json<DeletePropertyResponse>> {
    let property = Property::find_by_id(&state.db, id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Property not found".to_string()))?;

    if property.agent_id != auth.user_id {
        return Err(ApiError::Forbidden(
            "Only the listing agent can delete this property".to_string(),
        ));
    }

    let rows = PropertyImage::list_by_property(&state.db, id).await?;
    let keys: Vec<String> = rows
        .iter()
        .flat_map(|row| row.storage_keys())
        .map(str::to_string)
        .collect();

    if !keys.is_empty() {
        state.store.delete_many(&keys).await?;
    }

    // Keys keep the listing type they were uploaded under, which may
    // differ from the current one after an update; sweep both prefixes
    // to catch objects no row tracks anymore
    if let Some(agency_id) = auth.agency_id {
        for listing_type in [ListingType::Sale, ListingType::Rent] {
            let prefix = storage_keys::property_prefix(agency_id, listing_type, id);
            state.store.delete_prefix(&prefix).await?;
        }
    }

    let deleted = Property::delete(&state.db, id).await?;

    tracing::info!(property_id = %id, objects = keys.len(), "listing deleted");

    Ok(Json(DeletePropertyResponse { deleted }))
}

/// Filtered, paginated card search
///
/// Public. Filter groups are independently optional; radius and polygon
/// are mutually exclusive. Status defaults to `active`.
pub async fn cards(
    State(state): State<AppState>,
    Json(req): Json<CardsRequest>,
) -> ApiResult<Json<Page<PropertyCard>>> {
    let mut search = req.filters.to_property_search()?;
    search.status = Some(req.status.unwrap_or(PropertyStatus::Active));
    search.agency_id = req.agency_id;
    search.agent_id = req.agent_id;

    let page_req = PageRequest {
        page: req.page,
        limit: req.limit,
    };

    let result = Property::search(&state.db, &search, page_req.page(), page_req.limit()).await?;

    let mut data = Vec::with_capacity(result.hits.len());
    for hit in result.hits {
        data.push(build_card(&state, hit).await?);
    }

    Ok(Json(Page::new(
        data,
        result.total_count,
        page_req.page(),
        page_req.limit(),
    )))
}

/// Toggle a favorite for the authenticated user
pub async fn toggle_favorite(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    RequireAuth(auth): RequireAuth,
) -> ApiResult<Json<FavoriteResponse>> {
    // Toggling a missing listing must 404, not insert a dangling row
    Property::find_by_id(&state.db, id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Property not found".to_string()))?;

    let favorited = Favorite::toggle(&state.db, auth.user_id, id).await?;

    Ok(Json(FavoriteResponse { favorited }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_create_request() -> CreatePropertyRequest {
        serde_json::from_value(serde_json::json!({
            "title": "Bright two-bedroom near the park",
            "description": "South-facing apartment with a renovated kitchen and balcony.",
            "price": 245000.0,
            "property_type": "apartment",
            "listing_type": "sale",
            "rooms": 4,
            "bedrooms": 2,
            "bathrooms": 1,
            "area": 85.0,
            "has_balcony": true,
            "features": ["Balcony", "  renovated "],
            "address": {
                "street": "Via Roma 12",
                "city": "Milano",
                "zip_code": "20121"
            },
            "location": {"type": "Point", "coordinates": [9.19, 45.4642]}
        }))
        .unwrap()
    }

    #[test]
    fn test_create_request_valid() {
        let req = valid_create_request();
        assert!(req.validate().is_ok());
        assert!(req.location.validate().is_ok());
        assert!(!req.has_elevator, "unset amenities default to false");
    }

    #[test]
    fn test_create_request_rejects_short_title() {
        let mut req = valid_create_request();
        req.title = "Casa".to_string();
        assert!(req.validate().is_err());
    }

    #[test]
    fn test_create_request_rejects_zero_price() {
        let mut req = valid_create_request();
        req.price = 0.0;
        assert!(req.validate().is_err());
    }

    #[test]
    fn test_create_request_rejects_bad_zip() {
        let mut req = valid_create_request();
        req.address.zip_code = "2012".to_string();
        assert!(req.validate().is_err());

        req.address.zip_code = "2012a".to_string();
        assert!(req.validate().is_err());
    }

    #[test]
    fn test_create_request_rejects_out_of_range_rooms() {
        let mut req = valid_create_request();
        req.bedrooms = Some(51);
        assert!(req.validate().is_err());

        req.bedrooms = Some(-1);
        assert!(req.validate().is_err());
    }

    #[test]
    fn test_location_range_rejected_by_geo_validation() {
        let mut req = valid_create_request();
        req.location = GeoPoint {
            kind: "Point".to_string(),
            coordinates: [200.0, 45.0],
        };
        assert!(req.location.validate().is_err());
    }

    #[test]
    fn test_update_request_empty_patch_is_valid() {
        let req: UpdatePropertyRequest = serde_json::from_str("{}").unwrap();
        assert!(req.validate().is_ok());
        assert!(req.title.is_none());
        assert!(req.status.is_none());
    }

    #[test]
    fn test_cards_request_defaults() {
        let req: CardsRequest = serde_json::from_str("{}").unwrap();
        assert!(req.status.is_none());
        assert!(req.filters.radius_search.is_none());
        assert!(req.page.is_none());
    }
}
