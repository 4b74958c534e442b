/// Search endpoints
///
/// One request DTO carries the flat attribute filters and the geographic
/// filters. Radius and polygon search are mutually exclusive, checked
/// explicitly here because nothing downstream enforces it.
///
/// # Endpoints
///
/// - `POST /v1/search` - Filtered search over active listings (public)
/// - `GET /v1/search/suggestions` - City and feature prefix suggestions
/// - `GET /v1/search/history` - The caller's executed searches (paged)
///
/// Authenticated searches append a row to the caller's search history;
/// anonymous searches leave no trace.

use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
};
use axum::{
    extract::{Query, State},
    Extension, Json,
};
use nido_shared::auth::middleware::AuthContext;
use nido_shared::geo::{self, GeoPoint};
use nido_shared::models::property::{
    EnergyClass, ListingType, Property, PropertySearch, PropertyStatus, PropertyType,
};
use nido_shared::models::saved_search::SavedSearch;
use nido_shared::models::search_history::SearchHistoryEntry;
use nido_shared::pagination::{Page, PageRequest};
use serde::{Deserialize, Serialize};

use super::properties::{build_card, PropertyCard};

/// Radius filter: center point plus distance budget in kilometers
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RadiusSearch {
    pub center: GeoPoint,
    pub radius_km: f64,
}

/// Shared filter DTO for search and card listings
///
/// Every field is optional; present filters combine with AND.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct SearchFilters {
    /// Substring match on the city name
    pub city: Option<String>,

    pub property_type: Option<PropertyType>,
    pub listing_type: Option<ListingType>,

    pub min_price: Option<f64>,
    pub max_price: Option<f64>,
    pub min_area: Option<f64>,
    pub max_area: Option<f64>,
    pub min_rooms: Option<i32>,
    pub min_bedrooms: Option<i32>,
    pub min_bathrooms: Option<i32>,

    pub has_elevator: Option<bool>,
    pub has_balcony: Option<bool>,
    pub has_garden: Option<bool>,
    pub has_parking: Option<bool>,

    pub energy_class: Option<EnergyClass>,

    /// Listing must carry every requested feature tag
    #[serde(default)]
    pub features: Vec<String>,

    /// Radius search; mutually exclusive with `polygon`
    pub radius_search: Option<RadiusSearch>,

    /// Bounding polygon of `[longitude, latitude]` pairs, 3-100 points
    pub polygon: Option<Vec<[f64; 2]>>,
}

impl SearchFilters {
    /// Validates the geographic filters and builds the model-level search
    ///
    /// # Errors
    ///
    /// - `400 Bad Request`: Both radius and polygon supplied
    /// - `422 Unprocessable Entity`: Center, radius, or polygon out of range
    pub fn to_property_search(&self) -> Result<PropertySearch, ApiError> {
        if self.radius_search.is_some() && self.polygon.is_some() {
            return Err(ApiError::BadRequest(
                "radius_search and polygon are mutually exclusive".to_string(),
            ));
        }

        let radius = match &self.radius_search {
            Some(radius_search) => {
                radius_search.center.validate()?;
                geo::validate_radius_km(radius_search.radius_km)?;
                Some((radius_search.center.clone(), radius_search.radius_km))
            }
            None => None,
        };

        if let Some(ring) = &self.polygon {
            geo::validate_polygon(ring)?;
        }

        Ok(PropertySearch {
            city: self.city.clone(),
            property_type: self.property_type,
            listing_type: self.listing_type,
            status: None,
            min_price: self.min_price,
            max_price: self.max_price,
            min_area: self.min_area,
            max_area: self.max_area,
            min_rooms: self.min_rooms,
            min_bedrooms: self.min_bedrooms,
            min_bathrooms: self.min_bathrooms,
            has_elevator: self.has_elevator,
            has_balcony: self.has_balcony,
            has_garden: self.has_garden,
            has_parking: self.has_parking,
            energy_class: self.energy_class,
            features: self.features.clone(),
            agent_id: None,
            agency_id: None,
            radius,
            polygon: self.polygon.clone(),
        })
    }
}

/// Search request: filters plus pagination
#[derive(Debug, Default, Deserialize)]
pub struct SearchRequest {
    #[serde(flatten)]
    pub filters: SearchFilters,

    /// Set when replaying a saved search, to stamp its last-searched time
    pub saved_search_id: Option<uuid::Uuid>,

    pub page: Option<i64>,
    pub limit: Option<i64>,
}

/// Suggestion query parameters
#[derive(Debug, Deserialize)]
pub struct SuggestionParams {
    /// Prefix to complete
    pub q: String,

    /// `city` (default) or `feature`
    pub kind: Option<String>,
}

/// Suggestion response
#[derive(Debug, Serialize)]
pub struct SuggestionsResponse {
    pub suggestions: Vec<String>,
}

/// Filtered search over active listings
///
/// Only `active` listings are searchable here; withdrawn or sold stock is
/// reachable through the card endpoint's explicit status scope. When the
/// caller is authenticated the executed search lands in their history.
pub async fn search(
    State(state): State<AppState>,
    viewer: Option<Extension<AuthContext>>,
    Json(req): Json<SearchRequest>,
) -> ApiResult<Json<Page<PropertyCard>>> {
    let mut property_search = req.filters.to_property_search()?;
    property_search.status = Some(PropertyStatus::Active);

    let page_req = PageRequest {
        page: req.page,
        limit: req.limit,
    };

    let result =
        Property::search(&state.db, &property_search, page_req.page(), page_req.limit()).await?;

    if let Some(Extension(auth)) = &viewer {
        let snapshot = serde_json::to_value(&req.filters).unwrap_or_default();
        if let Err(e) = SearchHistoryEntry::record(
            &state.db,
            auth.user_id,
            snapshot,
            result.total_count.min(i32::MAX as i64) as i32,
        )
        .await
        {
            // History is best-effort; a failed insert never fails the search
            tracing::warn!(error = %e, "failed to record search history");
        }

        // Replays of a saved search stamp it as just executed; a foreign or
        // stale ID simply matches no row
        if let Some(saved_search_id) = req.saved_search_id {
            if let Err(e) =
                SavedSearch::touch_last_searched(&state.db, saved_search_id, auth.user_id).await
            {
                tracing::warn!(error = %e, "failed to stamp saved search");
            }
        }
    }

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

/// City and feature prefix suggestions
pub async fn suggestions(
    State(state): State<AppState>,
    Query(params): Query<SuggestionParams>,
) -> ApiResult<Json<SuggestionsResponse>> {
    let prefix = params.q.trim();
    if prefix.is_empty() {
        return Ok(Json(SuggestionsResponse {
            suggestions: Vec::new(),
        }));
    }

    let suggestions = match params.kind.as_deref().unwrap_or("city") {
        "city" => Property::suggest_cities(&state.db, prefix, 10).await?,
        "feature" => Property::suggest_features(&state.db, prefix, 10).await?,
        other => {
            return Err(ApiError::invalid_field(
                "kind",
                format!("Unknown suggestion kind: {}", other),
            ))
        }
    };

    Ok(Json(SuggestionsResponse { suggestions }))
}

/// The caller's search history, newest first
pub async fn history(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Query(page_req): Query<PageRequest>,
) -> ApiResult<Json<Page<SearchHistoryEntry>>> {
    let entries = SearchHistoryEntry::list_for_user(
        &state.db,
        auth.user_id,
        page_req.limit(),
        page_req.offset(),
    )
    .await?;
    let total = SearchHistoryEntry::count_for_user(&state.db, auth.user_id).await?;

    Ok(Json(Page::new(
        entries,
        total,
        page_req.page(),
        page_req.limit(),
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_radius_and_polygon_are_mutually_exclusive() {
        let filters = SearchFilters {
            radius_search: Some(RadiusSearch {
                center: GeoPoint::new(9.19, 45.4642).unwrap(),
                radius_km: 10.0,
            }),
            polygon: Some(vec![[0.0, 0.0], [1.0, 0.0], [0.0, 1.0]]),
            ..Default::default()
        };

        assert!(matches!(
            filters.to_property_search(),
            Err(ApiError::BadRequest(_))
        ));
    }

    #[test]
    fn test_radius_filter_translates() {
        let filters = SearchFilters {
            radius_search: Some(RadiusSearch {
                center: GeoPoint::new(9.19, 45.4642).unwrap(),
                radius_km: 25.0,
            }),
            min_price: Some(100_000.0),
            ..Default::default()
        };

        let search = filters.to_property_search().unwrap();
        let (center, radius_km) = search.radius.unwrap();
        assert_eq!(center.longitude(), 9.19);
        assert_eq!(radius_km, 25.0);
        assert_eq!(search.min_price, Some(100_000.0));
        assert!(search.polygon.is_none());
    }

    #[test]
    fn test_oversized_radius_rejected() {
        let filters = SearchFilters {
            radius_search: Some(RadiusSearch {
                center: GeoPoint::new(9.19, 45.4642).unwrap(),
                radius_km: 501.0,
            }),
            ..Default::default()
        };

        assert!(matches!(
            filters.to_property_search(),
            Err(ApiError::ValidationError(_))
        ));
    }

    #[test]
    fn test_undersized_polygon_rejected() {
        let filters = SearchFilters {
            polygon: Some(vec![[0.0, 0.0], [1.0, 0.0]]),
            ..Default::default()
        };

        assert!(matches!(
            filters.to_property_search(),
            Err(ApiError::ValidationError(_))
        ));
    }

    #[test]
    fn test_empty_filters_translate_to_unfiltered_search() {
        let search = SearchFilters::default().to_property_search().unwrap();
        assert!(search.city.is_none());
        assert!(search.radius.is_none());
        assert!(search.polygon.is_none());
        assert!(search.features.is_empty());
    }

    #[test]
    fn test_filters_deserialize_from_flat_json() {
        let filters: SearchFilters = serde_json::from_value(serde_json::json!({
            "city": "Milano",
            "listing_type": "rent",
            "min_bedrooms": 2,
            "has_balcony": true,
            "radius_search": {
                "center": {"type": "Point", "coordinates": [9.19, 45.4642]},
                "radius_km": 5.0
            }
        }))
        .unwrap();

        assert_eq!(filters.city.as_deref(), Some("Milano"));
        assert_eq!(filters.listing_type, Some(ListingType::Rent));
        assert!(filters.radius_search.is_some());
        assert!(filters.polygon.is_none());
    }
}
