/// Property model, enums, and filtered search
///
/// Properties are the core entity of the marketplace. This module holds the
/// listing enums, CRUD operations, and the composable filtered search that
/// backs both the card listing and the search endpoints.
///
/// # Search composition
///
/// Filters are independent optional groups composed with AND:
/// flat attribute filters run entirely in SQL; geographic filters use a
/// bounding-box prefilter in SQL followed by an exact Haversine or
/// point-in-polygon check in Rust. Radius and polygon are mutually
/// exclusive; callers validate that before reaching this module.
///
/// # Schema
///
/// ```sql
/// CREATE TABLE properties (
///     id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
///     title VARCHAR(200) NOT NULL,
///     description TEXT NOT NULL,
///     price DOUBLE PRECISION NOT NULL,
///     property_type property_type NOT NULL,
///     listing_type listing_type NOT NULL,
///     status property_status NOT NULL DEFAULT 'active',
///     rooms INT, bedrooms INT, bathrooms INT,
///     area DOUBLE PRECISION, floor INT,
///     energy_class energy_class,
///     has_elevator BOOLEAN NOT NULL DEFAULT FALSE,
///     has_balcony BOOLEAN NOT NULL DEFAULT FALSE,
///     has_garden BOOLEAN NOT NULL DEFAULT FALSE,
///     has_parking BOOLEAN NOT NULL DEFAULT FALSE,
///     features JSONB NOT NULL DEFAULT '[]',
///     street VARCHAR(255) NOT NULL,
///     city VARCHAR(100) NOT NULL,
///     province VARCHAR(100),
///     zip_code VARCHAR(10) NOT NULL,
///     country VARCHAR(100) NOT NULL DEFAULT 'Italy',
///     location JSONB NOT NULL,
///     agent_id UUID NOT NULL REFERENCES users(id),
///     views INT NOT NULL DEFAULT 0,
///     favorites INT NOT NULL DEFAULT 0,
///     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
/// );
/// ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::{PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use crate::geo::{point_in_polygon, GeoPoint};

/// Kind of property
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "property_type", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum PropertyType {
    Apartment,
    Villa,
    House,
    Loft,
    Office,
    Commercial,
    Land,
}

impl PropertyType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PropertyType::Apartment => "apartment",
            PropertyType::Villa => "villa",
            PropertyType::House => "house",
            PropertyType::Loft => "loft",
            PropertyType::Office => "office",
            PropertyType::Commercial => "commercial",
            PropertyType::Land => "land",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "apartment" => Some(PropertyType::Apartment),
            "villa" => Some(PropertyType::Villa),
            "house" => Some(PropertyType::House),
            "loft" => Some(PropertyType::Loft),
            "office" => Some(PropertyType::Office),
            "commercial" => Some(PropertyType::Commercial),
            "land" => Some(PropertyType::Land),
            _ => None,
        }
    }
}

/// Whether the listing is for sale or for rent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "listing_type", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ListingType {
    Sale,
    Rent,
}

impl ListingType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ListingType::Sale => "sale",
            ListingType::Rent => "rent",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "sale" => Some(ListingType::Sale),
            "rent" => Some(ListingType::Rent),
            _ => None,
        }
    }
}

/// Listing lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "property_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum PropertyStatus {
    /// Visible in public search (the default)
    Active,

    /// Under offer
    Pending,

    Sold,
    Rented,

    /// Taken off the market by the agent
    Withdrawn,
}

impl PropertyStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PropertyStatus::Active => "active",
            PropertyStatus::Pending => "pending",
            PropertyStatus::Sold => "sold",
            PropertyStatus::Rented => "rented",
            PropertyStatus::Withdrawn => "withdrawn",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(PropertyStatus::Active),
            "pending" => Some(PropertyStatus::Pending),
            "sold" => Some(PropertyStatus::Sold),
            "rented" => Some(PropertyStatus::Rented),
            "withdrawn" => Some(PropertyStatus::Withdrawn),
            _ => None,
        }
    }
}

/// Italian APE energy performance class
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "energy_class")]
pub enum EnergyClass {
    #[sqlx(rename = "A+")]
    #[serde(rename = "A+")]
    APlus,
    A,
    B,
    C,
    D,
    E,
    F,
    G,
}

impl EnergyClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            EnergyClass::APlus => "A+",
            EnergyClass::A => "A",
            EnergyClass::B => "B",
            EnergyClass::C => "C",
            EnergyClass::D => "D",
            EnergyClass::E => "E",
            EnergyClass::F => "F",
            EnergyClass::G => "G",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "A+" => Some(EnergyClass::APlus),
            "A" => Some(EnergyClass::A),
            "B" => Some(EnergyClass::B),
            "C" => Some(EnergyClass::C),
            "D" => Some(EnergyClass::D),
            "E" => Some(EnergyClass::E),
            "F" => Some(EnergyClass::F),
            "G" => Some(EnergyClass::G),
            _ => None,
        }
    }
}

/// Property listing
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Property {
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

    /// Surface in square meters
    pub area: Option<f64>,
    pub floor: Option<i32>,
    pub energy_class: Option<EnergyClass>,
    pub has_elevator: bool,
    pub has_balcony: bool,
    pub has_garden: bool,
    pub has_parking: bool,

    /// Normalized free-form feature tags (lowercase, trimmed)
    pub features: Json<Vec<String>>,

    pub street: String,
    pub city: String,
    pub province: Option<String>,
    pub zip_code: String,
    pub country: String,

    /// GeoJSON point, `[longitude, latitude]`
    pub location: Json<GeoPoint>,

    /// Owning agent
    pub agent_id: Uuid,

    /// Deduped view counter
    pub views: i32,

    /// Favorite counter
    pub favorites: i32,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for creating a new property
#[derive(Debug, Clone)]
pub struct CreateProperty {
    pub title: String,
    pub description: String,
    pub price: f64,
    pub property_type: PropertyType,
    pub listing_type: ListingType,
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
    pub street: String,
    pub city: String,
    pub province: Option<String>,
    pub zip_code: String,
    pub country: Option<String>,
    pub location: GeoPoint,
    pub agent_id: Uuid,
}

/// Input for partially updating a property
///
/// Double-Option fields use `Some(None)` to clear the column.
#[derive(Debug, Clone, Default)]
pub struct UpdateProperty {
    pub title: Option<String>,
    pub description: Option<String>,
    pub price: Option<f64>,
    pub property_type: Option<PropertyType>,
    pub listing_type: Option<ListingType>,
    pub status: Option<PropertyStatus>,
    pub rooms: Option<Option<i32>>,
    pub bedrooms: Option<Option<i32>>,
    pub bathrooms: Option<Option<i32>>,
    pub area: Option<Option<f64>>,
    pub floor: Option<Option<i32>>,
    pub energy_class: Option<Option<EnergyClass>>,
    pub has_elevator: Option<bool>,
    pub has_balcony: Option<bool>,
    pub has_garden: Option<bool>,
    pub has_parking: Option<bool>,
    pub features: Option<Vec<String>>,
    pub street: Option<String>,
    pub city: Option<String>,
    pub province: Option<Option<String>>,
    pub zip_code: Option<String>,
    pub country: Option<String>,
    pub location: Option<GeoPoint>,
}

/// Filter set for property search
///
/// Every field is optional; present fields are combined with AND.
/// `radius` and `polygon` must not both be set.
#[derive(Debug, Clone, Default)]
pub struct PropertySearch {
    pub city: Option<String>,
    pub property_type: Option<PropertyType>,
    pub listing_type: Option<ListingType>,
    pub status: Option<PropertyStatus>,
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
    pub features: Vec<String>,

    pub agent_id: Option<Uuid>,

    /// Restricts to listings whose agent belongs to this agency
    pub agency_id: Option<Uuid>,

    /// Radius search: center plus radius in km
    pub radius: Option<(GeoPoint, f64)>,

    /// Polygon search: ring of `[longitude, latitude]` pairs
    pub polygon: Option<Vec<[f64; 2]>>,
}

/// One search hit with its optional radius distance
#[derive(Debug, Clone)]
pub struct PropertyHit {
    pub property: Property,

    /// Distance from the radius center, only set for radius searches
    pub distance_km: Option<f64>,
}

/// A page of search hits plus the total match count
#[derive(Debug, Clone)]
pub struct PropertySearchPage {
    pub hits: Vec<PropertyHit>,
    pub total_count: i64,
}

const PROPERTY_COLUMNS: &str = "id, title, description, price, property_type, listing_type, \
     status, rooms, bedrooms, bathrooms, area, floor, energy_class, has_elevator, \
     has_balcony, has_garden, has_parking, features, street, city, province, zip_code, \
     country, location, agent_id, views, favorites, created_at, updated_at";

/// Normalizes free-form feature tags: trim, lowercase, drop empties, dedup
///
/// Order of first appearance is preserved.
pub fn normalize_features(features: &[String]) -> Vec<String> {
    let mut seen = Vec::new();
    for raw in features {
        let tag = raw.trim().to_lowercase();
        if !tag.is_empty() && !seen.contains(&tag) {
            seen.push(tag);
        }
    }
    seen
}

impl Property {
    /// Creates a new property listing with default status `active`
    ///
    /// Features are normalized before insert.
    pub async fn create(pool: &PgPool, data: CreateProperty) -> Result<Self, sqlx::Error> {
        let features = normalize_features(&data.features);

        let query = format!(
            r#"
            INSERT INTO properties (title, description, price, property_type, listing_type,
                                    rooms, bedrooms, bathrooms, area, floor, energy_class,
                                    has_elevator, has_balcony, has_garden, has_parking,
                                    features, street, city, province, zip_code, country,
                                    location, agent_id)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15,
                    $16, $17, $18, $19, $20, COALESCE($21, 'Italy'), $22, $23)
            RETURNING {PROPERTY_COLUMNS}
            "#
        );

        sqlx::query_as::<_, Property>(&query)
            .bind(data.title)
            .bind(data.description)
            .bind(data.price)
            .bind(data.property_type)
            .bind(data.listing_type)
            .bind(data.rooms)
            .bind(data.bedrooms)
            .bind(data.bathrooms)
            .bind(data.area)
            .bind(data.floor)
            .bind(data.energy_class)
            .bind(data.has_elevator)
            .bind(data.has_balcony)
            .bind(data.has_garden)
            .bind(data.has_parking)
            .bind(Json(features))
            .bind(data.street)
            .bind(data.city)
            .bind(data.province)
            .bind(data.zip_code)
            .bind(data.country)
            .bind(Json(data.location))
            .bind(data.agent_id)
            .fetch_one(pool)
            .await
    }

    /// Finds a property by ID
    pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        let query = format!("SELECT {PROPERTY_COLUMNS} FROM properties WHERE id = $1");

        sqlx::query_as::<_, Property>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Partially updates a property
    ///
    /// Only non-None fields are written; `updated_at` always refreshes.
    /// Features are normalized when present. Last write wins under
    /// concurrent updates.
    pub async fn update(
        pool: &PgPool,
        id: Uuid,
        data: UpdateProperty,
    ) -> Result<Option<Self>, sqlx::Error> {
        let mut query = String::from("UPDATE properties SET updated_at = NOW()");
        let mut bind_count = 1;

        macro_rules! push_clause {
            ($field:expr, $column:literal) => {
                if $field.is_some() {
                    bind_count += 1;
                    query.push_str(&format!(", {} = ${}", $column, bind_count));
                }
            };
        }

        push_clause!(data.title, "title");
        push_clause!(data.description, "description");
        push_clause!(data.price, "price");
        push_clause!(data.property_type, "property_type");
        push_clause!(data.listing_type, "listing_type");
        push_clause!(data.status, "status");
        push_clause!(data.rooms, "rooms");
        push_clause!(data.bedrooms, "bedrooms");
        push_clause!(data.bathrooms, "bathrooms");
        push_clause!(data.area, "area");
        push_clause!(data.floor, "floor");
        push_clause!(data.energy_class, "energy_class");
        push_clause!(data.has_elevator, "has_elevator");
        push_clause!(data.has_balcony, "has_balcony");
        push_clause!(data.has_garden, "has_garden");
        push_clause!(data.has_parking, "has_parking");
        push_clause!(data.features, "features");
        push_clause!(data.street, "street");
        push_clause!(data.city, "city");
        push_clause!(data.province, "province");
        push_clause!(data.zip_code, "zip_code");
        push_clause!(data.country, "country");
        push_clause!(data.location, "location");

        query.push_str(&format!(" WHERE id = $1 RETURNING {PROPERTY_COLUMNS}"));

        let mut q = sqlx::query_as::<_, Property>(&query).bind(id);

        if let Some(title) = data.title {
            q = q.bind(title);
        }
        if let Some(description) = data.description {
            q = q.bind(description);
        }
        if let Some(price) = data.price {
            q = q.bind(price);
        }
        if let Some(property_type) = data.property_type {
            q = q.bind(property_type);
        }
        if let Some(listing_type) = data.listing_type {
            q = q.bind(listing_type);
        }
        if let Some(status) = data.status {
            q = q.bind(status);
        }
        if let Some(rooms) = data.rooms {
            q = q.bind(rooms);
        }
        if let Some(bedrooms) = data.bedrooms {
            q = q.bind(bedrooms);
        }
        if let Some(bathrooms) = data.bathrooms {
            q = q.bind(bathrooms);
        }
        if let Some(area) = data.area {
            q = q.bind(area);
        }
        if let Some(floor) = data.floor {
            q = q.bind(floor);
        }
        if let Some(energy_class) = data.energy_class {
            q = q.bind(energy_class);
        }
        if let Some(has_elevator) = data.has_elevator {
            q = q.bind(has_elevator);
        }
        if let Some(has_balcony) = data.has_balcony {
            q = q.bind(has_balcony);
        }
        if let Some(has_garden) = data.has_garden {
            q = q.bind(has_garden);
        }
        if let Some(has_parking) = data.has_parking {
            q = q.bind(has_parking);
        }
        if let Some(features) = data.features {
            q = q.bind(Json(normalize_features(&features)));
        }
        if let Some(street) = data.street {
            q = q.bind(street);
        }
        if let Some(city) = data.city {
            q = q.bind(city);
        }
        if let Some(province) = data.province {
            q = q.bind(province);
        }
        if let Some(zip_code) = data.zip_code {
            q = q.bind(zip_code);
        }
        if let Some(country) = data.country {
            q = q.bind(country);
        }
        if let Some(location) = data.location {
            q = q.bind(Json(location));
        }

        q.fetch_optional(pool).await
    }

    /// Deletes a property by ID
    ///
    /// Associated images, favorites, and views cascade in SQL. Storage
    /// objects must be removed by the caller beforehand.
    pub async fn delete(pool: &PgPool, id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM properties WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Filtered, paginated search
    ///
    /// Flat filters run in SQL. Radius and polygon searches apply a SQL
    /// bounding-box prefilter, then the exact geometric check in Rust, then
    /// paginate the surviving rows. `page` is 1-based.
    pub async fn search(
        pool: &PgPool,
        search: &PropertySearch,
        page: i64,
        limit: i64,
    ) -> Result<PropertySearchPage, sqlx::Error> {
        let offset = (page.max(1) - 1) * limit;

        if search.radius.is_some() || search.polygon.is_some() {
            // Geo path: prefilter in SQL, exact check + pagination in Rust
            let mut qb = QueryBuilder::<Postgres>::new(format!(
                "SELECT {PROPERTY_COLUMNS} FROM properties WHERE 1=1"
            ));
            push_filters(&mut qb, search);
            qb.push(" ORDER BY created_at DESC");

            let candidates: Vec<Property> = qb.build_query_as().fetch_all(pool).await?;

            let hits: Vec<PropertyHit> = candidates
                .into_iter()
                .filter_map(|property| match &search.radius {
                    Some((center, radius_km)) => {
                        let distance = center.haversine_km(&property.location);
                        (distance <= *radius_km).then_some(PropertyHit {
                            property,
                            distance_km: Some(distance),
                        })
                    }
                    None => {
                        let ring = search.polygon.as_deref().unwrap_or(&[]);
                        point_in_polygon(&property.location, ring).then_some(PropertyHit {
                            property,
                            distance_km: None,
                        })
                    }
                })
                .collect();

            let total_count = hits.len() as i64;
            let page_hits = hits
                .into_iter()
                .skip(offset.max(0) as usize)
                .take(limit.max(0) as usize)
                .collect();

            Ok(PropertySearchPage {
                hits: page_hits,
                total_count,
            })
        } else {
            let mut count_qb =
                QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM properties WHERE 1=1");
            push_filters(&mut count_qb, search);
            let (total_count,): (i64,) = count_qb.build_query_as().fetch_one(pool).await?;

            let mut qb = QueryBuilder::<Postgres>::new(format!(
                "SELECT {PROPERTY_COLUMNS} FROM properties WHERE 1=1"
            ));
            push_filters(&mut qb, search);
            qb.push(" ORDER BY created_at DESC LIMIT ");
            qb.push_bind(limit);
            qb.push(" OFFSET ");
            qb.push_bind(offset);

            let properties: Vec<Property> = qb.build_query_as().fetch_all(pool).await?;

            Ok(PropertySearchPage {
                hits: properties
                    .into_iter()
                    .map(|property| PropertyHit {
                        property,
                        distance_km: None,
                    })
                    .collect(),
                total_count,
            })
        }
    }

    /// Distinct city prefixes for search suggestions
    pub async fn suggest_cities(
        pool: &PgPool,
        prefix: &str,
        limit: i64,
    ) -> Result<Vec<String>, sqlx::Error> {
        let rows: Vec<(String,)> = sqlx::query_as(
            r#"
            SELECT DISTINCT city FROM properties
            WHERE city ILIKE $1 || '%'
            ORDER BY city
            LIMIT $2
            "#,
        )
        .bind(prefix)
        .bind(limit)
        .fetch_all(pool)
        .await?;

        Ok(rows.into_iter().map(|(city,)| city).collect())
    }

    /// Distinct feature tags matching a prefix, for search suggestions
    pub async fn suggest_features(
        pool: &PgPool,
        prefix: &str,
        limit: i64,
    ) -> Result<Vec<String>, sqlx::Error> {
        let rows: Vec<(String,)> = sqlx::query_as(
            r#"
            SELECT DISTINCT feature FROM properties,
                   jsonb_array_elements_text(features) AS feature
            WHERE feature ILIKE $1 || '%'
            ORDER BY feature
            LIMIT $2
            "#,
        )
        .bind(prefix)
        .bind(limit)
        .fetch_all(pool)
        .await?;

        Ok(rows.into_iter().map(|(feature,)| feature).collect())
    }
}

/// Appends the WHERE clauses for a search to a query builder
///
/// Used identically for the data query and the count query so the two can
/// never drift apart.
fn push_filters(qb: &mut QueryBuilder<'_, Postgres>, search: &PropertySearch) {
    if let Some(city) = &search.city {
        qb.push(" AND city ILIKE ");
        qb.push_bind(format!("%{}%", city));
    }
    if let Some(property_type) = search.property_type {
        qb.push(" AND property_type = ");
        qb.push_bind(property_type);
    }
    if let Some(listing_type) = search.listing_type {
        qb.push(" AND listing_type = ");
        qb.push_bind(listing_type);
    }
    if let Some(status) = search.status {
        qb.push(" AND status = ");
        qb.push_bind(status);
    }
    if let Some(min_price) = search.min_price {
        qb.push(" AND price >= ");
        qb.push_bind(min_price);
    }
    if let Some(max_price) = search.max_price {
        qb.push(" AND price <= ");
        qb.push_bind(max_price);
    }
    if let Some(min_area) = search.min_area {
        qb.push(" AND area >= ");
        qb.push_bind(min_area);
    }
    if let Some(max_area) = search.max_area {
        qb.push(" AND area <= ");
        qb.push_bind(max_area);
    }
    if let Some(min_rooms) = search.min_rooms {
        qb.push(" AND rooms >= ");
        qb.push_bind(min_rooms);
    }
    if let Some(min_bedrooms) = search.min_bedrooms {
        qb.push(" AND bedrooms >= ");
        qb.push_bind(min_bedrooms);
    }
    if let Some(min_bathrooms) = search.min_bathrooms {
        qb.push(" AND bathrooms >= ");
        qb.push_bind(min_bathrooms);
    }
    if let Some(has_elevator) = search.has_elevator {
        qb.push(" AND has_elevator = ");
        qb.push_bind(has_elevator);
    }
    if let Some(has_balcony) = search.has_balcony {
        qb.push(" AND has_balcony = ");
        qb.push_bind(has_balcony);
    }
    if let Some(has_garden) = search.has_garden {
        qb.push(" AND has_garden = ");
        qb.push_bind(has_garden);
    }
    if let Some(has_parking) = search.has_parking {
        qb.push(" AND has_parking = ");
        qb.push_bind(has_parking);
    }
    if let Some(energy_class) = search.energy_class {
        qb.push(" AND energy_class = ");
        qb.push_bind(energy_class);
    }
    if !search.features.is_empty() {
        qb.push(" AND features @> ");
        qb.push_bind(Json(normalize_features(&search.features)));
    }
    if let Some(agent_id) = search.agent_id {
        qb.push(" AND agent_id = ");
        qb.push_bind(agent_id);
    }
    if let Some(agency_id) = search.agency_id {
        qb.push(" AND agent_id IN (SELECT id FROM users WHERE agency_id = ");
        qb.push_bind(agency_id);
        qb.push(")");
    }

    // Bounding-box prefilter for both geo modes; exact check happens in Rust
    let bbox = match (&search.radius, &search.polygon) {
        (Some((center, radius_km)), _) => Some(center.bounding_box(*radius_km)),
        (None, Some(ring)) if !ring.is_empty() => {
            let (mut min_lng, mut min_lat) = (f64::MAX, f64::MAX);
            let (mut max_lng, mut max_lat) = (f64::MIN, f64::MIN);
            for point in ring {
                min_lng = min_lng.min(point[0]);
                max_lng = max_lng.max(point[0]);
                min_lat = min_lat.min(point[1]);
                max_lat = max_lat.max(point[1]);
            }
            Some((min_lng, min_lat, max_lng, max_lat))
        }
        _ => None,
    };

    if let Some((min_lng, min_lat, max_lng, max_lat)) = bbox {
        qb.push(" AND (location->'coordinates'->>0)::float8 BETWEEN ");
        qb.push_bind(min_lng);
        qb.push(" AND ");
        qb.push_bind(max_lng);
        qb.push(" AND (location->'coordinates'->>1)::float8 BETWEEN ");
        qb.push_bind(min_lat);
        qb.push(" AND ");
        qb.push_bind(max_lat);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_property_type_roundtrip() {
        for kind in [
            PropertyType::Apartment,
            PropertyType::Villa,
            PropertyType::House,
            PropertyType::Loft,
            PropertyType::Office,
            PropertyType::Commercial,
            PropertyType::Land,
        ] {
            assert_eq!(PropertyType::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(PropertyType::parse("castle"), None);
    }

    #[test]
    fn test_listing_type_roundtrip() {
        assert_eq!(ListingType::parse("sale"), Some(ListingType::Sale));
        assert_eq!(ListingType::parse("rent"), Some(ListingType::Rent));
        assert_eq!(ListingType::parse("lease"), None);
    }

    #[test]
    fn test_status_roundtrip() {
        for status in [
            PropertyStatus::Active,
            PropertyStatus::Pending,
            PropertyStatus::Sold,
            PropertyStatus::Rented,
            PropertyStatus::Withdrawn,
        ] {
            assert_eq!(PropertyStatus::parse(status.as_str()), Some(status));
        }
    }

    #[test]
    fn test_energy_class_roundtrip() {
        assert_eq!(EnergyClass::parse("A+"), Some(EnergyClass::APlus));
        assert_eq!(EnergyClass::APlus.as_str(), "A+");
        for class in [
            EnergyClass::A,
            EnergyClass::B,
            EnergyClass::C,
            EnergyClass::D,
            EnergyClass::E,
            EnergyClass::F,
            EnergyClass::G,
        ] {
            assert_eq!(EnergyClass::parse(class.as_str()), Some(class));
        }
        assert_eq!(EnergyClass::parse("H"), None);
    }

    #[test]
    fn test_energy_class_serde_rename() {
        let json = serde_json::to_string(&EnergyClass::APlus).unwrap();
        assert_eq!(json, "\"A+\"");
        let back: EnergyClass = serde_json::from_str("\"A+\"").unwrap();
        assert_eq!(back, EnergyClass::APlus);
    }

    #[test]
    fn test_normalize_features() {
        let raw = vec![
            "  Fireplace ".to_string(),
            "fireplace".to_string(),
            "POOL".to_string(),
            "   ".to_string(),
            "garden view".to_string(),
        ];

        let normalized = normalize_features(&raw);
        assert_eq!(normalized, vec!["fireplace", "pool", "garden view"]);
    }

    #[test]
    fn test_normalize_features_empty() {
        assert!(normalize_features(&[]).is_empty());
    }

    #[test]
    fn test_update_property_default_is_empty() {
        let update = UpdateProperty::default();
        assert!(update.title.is_none());
        assert!(update.status.is_none());
        assert!(update.location.is_none());
        assert!(update.features.is_none());
    }

    #[test]
    fn test_search_default_has_no_filters() {
        let search = PropertySearch::default();
        assert!(search.city.is_none());
        assert!(search.radius.is_none());
        assert!(search.polygon.is_none());
        assert!(search.features.is_empty());
    }
}
