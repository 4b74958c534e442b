/// Integration tests for the Nido API
///
/// Routing, validation, authorization, and rate limiting are exercised
/// against a router whose database pool is lazy and unreachable: those
/// paths must reject before any query runs. Full persistence flows run
/// only when `TEST_DATABASE_URL` points at a migratable Postgres; without
/// it they skip.

mod common;

use axum::http::StatusCode;
use common::{bare_request, body_json, json_request, TestContext};
use nido_shared::auth::password::hash_password;
use nido_shared::geo::GeoPoint;
use nido_shared::models::agency::{Agency, CreateAgency};
use nido_shared::models::property::{
    CreateProperty, ListingType, Property, PropertyType,
};
use nido_shared::models::property_image::{CreatePropertyImage, PropertyImage};
use nido_shared::models::user::{CreateUser, User, UserRole};
use nido_shared::storage::ObjectStore;
use serde_json::json;
use tower::ServiceExt as _;
use uuid::Uuid;

fn valid_property_payload() -> serde_json::Value {
    json!({
        "title": "Bright two-bedroom near the park",
        "description": "South-facing apartment with a renovated kitchen and balcony.",
        "price": 245000.0,
        "property_type": "apartment",
        "listing_type": "sale",
        "bedrooms": 2,
        "bathrooms": 1,
        "area": 85.0,
        "address": {
            "street": "Via Roma 12",
            "city": "Milano",
            "zip_code": "20121"
        },
        "location": {"type": "Point", "coordinates": [9.19, 45.4642]}
    })
}

#[tokio::test]
async fn test_health_reports_database_state() {
    let ctx = TestContext::new();

    let response = ctx
        .app
        .clone()
        .oneshot(bare_request("GET", "/health", None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["database"], "disconnected");
    assert_eq!(body["status"], "degraded");
    assert!(body["version"].is_string());
}

#[tokio::test]
async fn test_register_rejects_invalid_email() {
    let ctx = TestContext::new();

    let response = ctx
        .app
        .clone()
        .oneshot(json_request(
            "POST",
            "/v1/auth/register",
            None,
            json!({
                "email": "not-an-email",
                "password": "Str0ngPassword",
                "accept_terms": true,
                "accept_privacy": true
            }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body = body_json(response).await;
    assert_eq!(body["error"], "validation_error");
    assert_eq!(body["details"][0]["field"], "email");
}

#[tokio::test]
async fn test_register_requires_consent() {
    let ctx = TestContext::new();

    let response = ctx
        .app
        .clone()
        .oneshot(json_request(
            "POST",
            "/v1/auth/register",
            None,
            json!({
                "email": "ada@example.com",
                "password": "Str0ngPassword",
                "accept_terms": false,
                "accept_privacy": true
            }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body = body_json(response).await;
    assert_eq!(body["details"][0]["field"], "accept_terms");
}

#[tokio::test]
async fn test_refresh_rejects_garbage_token() {
    let ctx = TestContext::new();

    let response = ctx
        .app
        .clone()
        .oneshot(json_request(
            "POST",
            "/v1/auth/refresh",
            None,
            json!({"refresh_token": "garbage"}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_protected_routes_require_token() {
    let ctx = TestContext::new();

    for (method, uri) in [
        ("GET", "/v1/users/profile"),
        ("GET", "/v1/notifications"),
        ("GET", "/v1/search/saved"),
        ("POST", "/v1/properties"),
    ] {
        let response = ctx
            .app
            .clone()
            .oneshot(bare_request(method, uri, None))
            .await
            .unwrap();

        assert_eq!(
            response.status(),
            StatusCode::UNAUTHORIZED,
            "{} {} should require auth",
            method,
            uri
        );
    }
}

#[tokio::test]
async fn test_invalid_token_rejected() {
    let ctx = TestContext::new();

    let response = ctx
        .app
        .clone()
        .oneshot(bare_request(
            "GET",
            "/v1/users/profile",
            Some("not-a-jwt"),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_client_cannot_create_listing() {
    let ctx = TestContext::new();
    let token = ctx.token(Uuid::new_v4(), UserRole::Client, None);

    let response = ctx
        .app
        .clone()
        .oneshot(json_request(
            "POST",
            "/v1/properties",
            Some(&token),
            valid_property_payload(),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_create_listing_validates_before_persisting() {
    let ctx = TestContext::new();
    let token = ctx.token(Uuid::new_v4(), UserRole::Agent, Some(Uuid::new_v4()));

    let mut payload = valid_property_payload();
    payload["title"] = json!("Casa");
    payload["price"] = json!(0.0);

    let response = ctx
        .app
        .clone()
        .oneshot(json_request(
            "POST",
            "/v1/properties",
            Some(&token),
            payload,
        ))
        .await
        .unwrap();

    // The unreachable pool proves rejection happened before any query
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body = body_json(response).await;
    let fields: Vec<&str> = body["details"]
        .as_array()
        .unwrap()
        .iter()
        .map(|d| d["field"].as_str().unwrap())
        .collect();
    assert!(fields.contains(&"title"));
    assert!(fields.contains(&"price"));
}

#[tokio::test]
async fn test_create_listing_rejects_out_of_range_location() {
    let ctx = TestContext::new();
    let token = ctx.token(Uuid::new_v4(), UserRole::Agent, Some(Uuid::new_v4()));

    let mut payload = valid_property_payload();
    payload["location"] = json!({"type": "Point", "coordinates": [200.0, 45.0]});

    let response = ctx
        .app
        .clone()
        .oneshot(json_request(
            "POST",
            "/v1/properties",
            Some(&token),
            payload,
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body = body_json(response).await;
    assert_eq!(body["details"][0]["field"], "location");
}

#[tokio::test]
async fn test_cards_rejects_radius_and_polygon_together() {
    let ctx = TestContext::new();

    let response = ctx
        .app
        .clone()
        .oneshot(json_request(
            "POST",
            "/v1/properties/cards",
            None,
            json!({
                "radius_search": {
                    "center": {"type": "Point", "coordinates": [9.19, 45.4642]},
                    "radius_km": 10.0
                },
                "polygon": [[0.0, 0.0], [1.0, 0.0], [0.0, 1.0]]
            }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_search_rejects_oversized_radius() {
    let ctx = TestContext::new();

    let response = ctx
        .app
        .clone()
        .oneshot(json_request(
            "POST",
            "/v1/search",
            None,
            json!({
                "radius_search": {
                    "center": {"type": "Point", "coordinates": [9.19, 45.4642]},
                    "radius_km": 501.0
                }
            }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn test_suggestions_rejects_unknown_kind() {
    let ctx = TestContext::new();

    let response = ctx
        .app
        .clone()
        .oneshot(bare_request(
            "GET",
            "/v1/search/suggestions?q=mi&kind=bogus",
            None,
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn test_saved_search_radius_fields_must_pair() {
    let ctx = TestContext::new();
    let token = ctx.token(Uuid::new_v4(), UserRole::Client, None);

    let response = ctx
        .app
        .clone()
        .oneshot(json_request(
            "POST",
            "/v1/search/saved",
            Some(&token),
            json!({"name": "Nearby rentals", "radius_km": 10.0}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_auth_routes_rate_limited() {
    let ctx = TestContext::with_rate_limit(3);

    let bad_login = || {
        json_request(
            "POST",
            "/v1/auth/login",
            None,
            json!({"email": "not-an-email", "password": "x"}),
        )
    };

    for _ in 0..3 {
        let response = ctx.app.clone().oneshot(bad_login()).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    let response = ctx.app.clone().oneshot(bad_login()).await.unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert!(response.headers().get("Retry-After").is_some());
}

#[tokio::test]
async fn test_security_headers_on_every_response() {
    let ctx = TestContext::new();

    let response = ctx
        .app
        .clone()
        .oneshot(bare_request("GET", "/health", None))
        .await
        .unwrap();

    let headers = response.headers();
    assert_eq!(headers.get("X-Content-Type-Options").unwrap(), "nosniff");
    assert_eq!(headers.get("X-Frame-Options").unwrap(), "DENY");
    // Development config: no HSTS
    assert!(headers.get("Strict-Transport-Security").is_none());
}

// Live-database flows below. Each skips cleanly when TEST_DATABASE_URL is
// not configured.

async fn create_agent_fixture(ctx: &TestContext) -> (User, Agency) {
    let suffix = Uuid::new_v4().simple().to_string();

    let owner = User::create(
        &ctx.db,
        CreateUser {
            email: format!("owner-{suffix}@example.com"),
            password_hash: hash_password("Own3rPassword").unwrap(),
            first_name: Some("Olga".to_string()),
            last_name: None,
            phone: None,
            role: UserRole::Owner,
            agency_id: None,
            is_verified: true,
            should_change_password: false,
            accepted_terms_at: None,
            accepted_privacy_at: None,
        },
    )
    .await
    .unwrap();

    let agency = Agency::create(
        &ctx.db,
        CreateAgency {
            name: format!("Agency {suffix}"),
            email: None,
            phone: None,
            website: None,
            street: None,
            city: Some("Milano".to_string()),
            province: None,
            zip_code: None,
            country: None,
            created_by: Some(owner.id),
        },
    )
    .await
    .unwrap();

    let agent = User::create(
        &ctx.db,
        CreateUser {
            email: format!("agent-{suffix}@example.com"),
            password_hash: hash_password("Ag3ntPassword").unwrap(),
            first_name: Some("Gina".to_string()),
            last_name: Some("Verdi".to_string()),
            phone: None,
            role: UserRole::Agent,
            agency_id: Some(agency.id),
            is_verified: true,
            should_change_password: false,
            accepted_terms_at: None,
            accepted_privacy_at: None,
        },
    )
    .await
    .unwrap();

    (agent, agency)
}

fn fixture_property(agent_id: Uuid, n: usize) -> CreateProperty {
    CreateProperty {
        title: format!("Fixture listing number {n:02}"),
        description: "A fixture listing with a description long enough to pass validation."
            .to_string(),
        price: 100_000.0 + n as f64,
        property_type: PropertyType::Apartment,
        listing_type: ListingType::Sale,
        rooms: Some(3),
        bedrooms: Some(2),
        bathrooms: Some(1),
        area: Some(80.0),
        floor: None,
        energy_class: None,
        has_elevator: false,
        has_balcony: true,
        has_garden: false,
        has_parking: false,
        features: vec!["Balcony".to_string()],
        street: "Via Roma 1".to_string(),
        city: "Milano".to_string(),
        province: None,
        zip_code: "20121".to_string(),
        country: None,
        location: GeoPoint::new(9.19, 45.4642).unwrap(),
        agent_id,
    }
}

#[tokio::test]
async fn test_full_registration_and_login_flow() {
    let Some(ctx) = TestContext::with_database().await.unwrap() else {
        return;
    };

    let email = format!("flow-{}@example.com", Uuid::new_v4().simple());

    // Register
    let response = ctx
        .app
        .clone()
        .oneshot(json_request(
            "POST",
            "/v1/auth/register",
            None,
            json!({
                "email": email,
                "password": "Str0ngPassword",
                "first_name": "Ada",
                "accept_terms": true,
                "accept_privacy": true
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["is_verified"], false);

    // Login before confirmation is refused with a 403-class error
    let response = ctx
        .app
        .clone()
        .oneshot(json_request(
            "POST",
            "/v1/auth/login",
            None,
            json!({"email": email, "password": "Str0ngPassword"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    // Fish the verification code out of the database (delivery is out of
    // band in production)
    let user = User::find_by_email(&ctx.db, &email).await.unwrap().unwrap();
    let (code,): (String,) = sqlx::query_as(
        "SELECT code FROM auth_codes WHERE user_id = $1 AND purpose = 'email_verify' \
         ORDER BY created_at DESC LIMIT 1",
    )
    .bind(user.id)
    .fetch_one(&ctx.db)
    .await
    .unwrap();

    let response = ctx
        .app
        .clone()
        .oneshot(json_request(
            "POST",
            "/v1/auth/verify-email",
            None,
            json!({"email": email, "code": code}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // Login now issues tokens
    let response = ctx
        .app
        .clone()
        .oneshot(json_request(
            "POST",
            "/v1/auth/login",
            None,
            json!({"email": email, "password": "Str0ngPassword"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert!(body["access_token"].is_string());
    assert!(body["refresh_token"].is_string());
    assert!(body.get("challenge").is_none());

    // The access token reaches the profile
    let token = body["access_token"].as_str().unwrap().to_string();
    let response = ctx
        .app
        .clone()
        .oneshot(bare_request("GET", "/v1/users/profile", Some(&token)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["email"], email);
    assert!(body.get("password_hash").is_none());
}

#[tokio::test]
async fn test_cards_pagination_envelope() {
    let Some(ctx) = TestContext::with_database().await.unwrap() else {
        return;
    };

    let (agent, _) = create_agent_fixture(&ctx).await;

    for n in 0..25 {
        Property::create(&ctx.db, fixture_property(agent.id, n))
            .await
            .unwrap();
    }

    let response = ctx
        .app
        .clone()
        .oneshot(json_request(
            "POST",
            "/v1/properties/cards",
            None,
            json!({"status": "active", "agent_id": agent.id, "page": 1, "limit": 20}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["total_count"], 25);
    assert_eq!(body["total_pages"], 2);
    assert_eq!(body["has_next_page"], true);
    assert_eq!(body["has_previous_page"], false);
    assert_eq!(body["data"].as_array().unwrap().len(), 20);
}

#[tokio::test]
async fn test_create_property_roundtrips_address_and_location() {
    let Some(ctx) = TestContext::with_database().await.unwrap() else {
        return;
    };

    let (agent, _) = create_agent_fixture(&ctx).await;
    let token = ctx.token(agent.id, UserRole::Agent, agent.agency_id);

    let response = ctx
        .app
        .clone()
        .oneshot(json_request(
            "POST",
            "/v1/properties",
            Some(&token),
            valid_property_payload(),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["address"]["street"], "Via Roma 12");
    assert_eq!(body["address"]["city"], "Milano");
    assert_eq!(body["address"]["country"], "Italy");
    assert_eq!(body["location"]["coordinates"][0], 9.19);
    assert_eq!(body["location"]["coordinates"][1], 45.4642);
    assert_eq!(body["status"], "active");
    assert_eq!(body["images"].as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn test_saved_search_foreign_owner_yields_not_found() {
    let Some(ctx) = TestContext::with_database().await.unwrap() else {
        return;
    };

    let (owner_user, _) = create_agent_fixture(&ctx).await;
    let (other_user, _) = create_agent_fixture(&ctx).await;

    let owner_token = ctx.token(owner_user.id, UserRole::Agent, owner_user.agency_id);
    let other_token = ctx.token(other_user.id, UserRole::Agent, other_user.agency_id);

    let response = ctx
        .app
        .clone()
        .oneshot(json_request(
            "POST",
            "/v1/search/saved",
            Some(&owner_token),
            json!({"name": "Milano rentals", "city": "Milano", "listing_type": "rent"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    let search_id = body["id"].as_str().unwrap().to_string();

    // A different user deleting it must see 404, never 403
    let response = ctx
        .app
        .clone()
        .oneshot(bare_request(
            "DELETE",
            &format!("/v1/search/saved/{search_id}"),
            Some(&other_token),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    // The owner can still delete it
    let response = ctx
        .app
        .clone()
        .oneshot(bare_request(
            "DELETE",
            &format!("/v1/search/saved/{search_id}"),
            Some(&owner_token),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_set_primary_image_is_idempotent_and_exclusive() {
    let Some(ctx) = TestContext::with_database().await.unwrap() else {
        return;
    };

    let (agent, _) = create_agent_fixture(&ctx).await;
    let token = ctx.token(agent.id, UserRole::Agent, agent.agency_id);

    let property = Property::create(&ctx.db, fixture_property(agent.id, 0))
        .await
        .unwrap();

    // Two image rows with dummy objects behind their keys
    let mut image_ids = Vec::new();
    for n in 0..2 {
        let key = format!("test/{}/{}/original.jpg", property.id, n);
        ctx.store.put(&key, vec![0u8; 16], "image/jpeg").await.unwrap();

        let image = PropertyImage::create(
            &ctx.db,
            CreatePropertyImage {
                property_id: property.id,
                original_key: key,
                small_key: None,
                medium_key: None,
                large_key: None,
                file_name: format!("photo-{n}.jpg"),
                content_type: "image/jpeg".to_string(),
                file_size: 16,
                width: 320,
                height: 240,
                caption: None,
                alt_text: None,
                is_primary: n == 0,
                display_order: n,
            },
        )
        .await
        .unwrap();
        image_ids.push(image.id);
    }

    // Flag the second image as primary, twice
    for _ in 0..2 {
        let response = ctx
            .app
            .clone()
            .oneshot(bare_request(
                "PUT",
                &format!("/v1/properties/{}/images/{}/primary", property.id, image_ids[1]),
                Some(&token),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    let images = PropertyImage::list_by_property(&ctx.db, property.id)
        .await
        .unwrap();
    let primaries: Vec<_> = images.iter().filter(|i| i.is_primary).collect();
    assert_eq!(primaries.len(), 1);
    assert_eq!(primaries[0].id, image_ids[1]);
}

#[tokio::test]
async fn test_image_mutation_by_foreign_agent_yields_not_found() {
    let Some(ctx) = TestContext::with_database().await.unwrap() else {
        return;
    };

    let (agent, _) = create_agent_fixture(&ctx).await;
    let (stranger, _) = create_agent_fixture(&ctx).await;

    let property = Property::create(&ctx.db, fixture_property(agent.id, 0))
        .await
        .unwrap();

    let key = format!("test/{}/original.jpg", property.id);
    ctx.store.put(&key, vec![0u8; 16], "image/jpeg").await.unwrap();
    let image = PropertyImage::create(
        &ctx.db,
        CreatePropertyImage {
            property_id: property.id,
            original_key: key,
            small_key: None,
            medium_key: None,
            large_key: None,
            file_name: "photo.jpg".to_string(),
            content_type: "image/jpeg".to_string(),
            file_size: 16,
            width: 320,
            height: 240,
            caption: None,
            alt_text: None,
            is_primary: true,
            display_order: 0,
        },
    )
    .await
    .unwrap();

    let stranger_token = ctx.token(stranger.id, UserRole::Agent, stranger.agency_id);
    let response = ctx
        .app
        .clone()
        .oneshot(bare_request(
            "DELETE",
            &format!("/v1/properties/{}/images/{}", property.id, image.id),
            Some(&stranger_token),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(ctx.store.len(), 1, "foreign delete must not touch storage");
}

#[tokio::test]
async fn test_notification_read_flow_is_monotonic() {
    let Some(ctx) = TestContext::with_database().await.unwrap() else {
        return;
    };

    use nido_shared::models::notification::{CreateNotification, Notification};

    let (user, _) = create_agent_fixture(&ctx).await;
    let token = ctx.token(user.id, UserRole::Agent, user.agency_id);

    let notification = Notification::create(
        &ctx.db,
        CreateNotification {
            user_id: user.id,
            notification_type: "saved_search_match".to_string(),
            title: "New matches".to_string(),
            message: "3 new properties match your search".to_string(),
            payload: json!({"count": 3}),
        },
    )
    .await
    .unwrap();

    let response = ctx
        .app
        .clone()
        .oneshot(bare_request(
            "GET",
            "/v1/notifications/unread-count",
            Some(&token),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["unread"], 1);

    // Mark as read twice; read_at must keep its first value
    let uri = format!("/v1/notifications/{}/read", notification.id);
    let response = ctx
        .app
        .clone()
        .oneshot(bare_request("PUT", &uri, Some(&token)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let first = body_json(response).await;
    assert_eq!(first["is_read"], true);

    let response = ctx
        .app
        .clone()
        .oneshot(bare_request("PUT", &uri, Some(&token)))
        .await
        .unwrap();
    let second = body_json(response).await;
    assert_eq!(second["read_at"], first["read_at"]);

    let response = ctx
        .app
        .clone()
        .oneshot(bare_request(
            "GET",
            "/v1/notifications/unread-count",
            Some(&token),
        ))
        .await
        .unwrap();
    assert_eq!(body_json(response).await["unread"], 0);

    // A different user cannot see or delete it
    let (stranger, _) = create_agent_fixture(&ctx).await;
    let stranger_token = ctx.token(stranger.id, UserRole::Agent, stranger.agency_id);
    let response = ctx
        .app
        .clone()
        .oneshot(bare_request(
            "DELETE",
            &format!("/v1/notifications/{}", notification.id),
            Some(&stranger_token),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_image_upload_pipeline_end_to_end() {
    let Some(ctx) = TestContext::with_database().await.unwrap() else {
        return;
    };

    let (agent, _) = create_agent_fixture(&ctx).await;
    let token = ctx.token(agent.id, UserRole::Agent, agent.agency_id);

    let property = Property::create(&ctx.db, fixture_property(agent.id, 0))
        .await
        .unwrap();

    // 1600x1200 source generates all three variants
    let png = {
        use image::{DynamicImage, ImageFormat, RgbImage};
        let img = RgbImage::from_fn(1600, 1200, |x, y| {
            image::Rgb([(x % 256) as u8, (y % 256) as u8, ((x + y) % 256) as u8])
        });
        let mut out = std::io::Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(img)
            .write_to(&mut out, ImageFormat::Png)
            .unwrap();
        out.into_inner()
    };

    let boundary = "nido-test-boundary";
    let mut body = Vec::new();
    body.extend_from_slice(
        format!(
            "--{boundary}\r\nContent-Disposition: form-data; name=\"images\"; \
             filename=\"kitchen.png\"\r\nContent-Type: image/png\r\n\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(&png);
    body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());

    let request = axum::http::Request::builder()
        .method("POST")
        .uri(format!("/v1/properties/{}/images", property.id))
        .header(
            axum::http::header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={boundary}"),
        )
        .header(
            axum::http::header::AUTHORIZATION,
            format!("Bearer {token}"),
        )
        .body(axum::body::Body::from(body))
        .unwrap();

    let response = ctx.app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    let images = body.as_array().unwrap();
    assert_eq!(images.len(), 1);
    assert_eq!(images[0]["is_primary"], true);
    assert_eq!(images[0]["width"], 1600);
    assert!(images[0]["urls"]["small"].is_string());
    assert!(images[0]["urls"]["large"].is_string());

    // Original + three variants landed in storage
    assert_eq!(ctx.store.len(), 4);
}

#[tokio::test]
async fn test_oversized_upload_rejected_before_storage() {
    let Some(ctx) = TestContext::with_database().await.unwrap() else {
        return;
    };

    let (agent, _) = create_agent_fixture(&ctx).await;
    let token = ctx.token(agent.id, UserRole::Agent, agent.agency_id);

    let property = Property::create(&ctx.db, fixture_property(agent.id, 0))
        .await
        .unwrap();

    // 10001 pixels wide: fails the dimension cap without needing a real
    // 50-megapixel payload
    let png = {
        use image::{DynamicImage, ImageFormat, RgbImage};
        let img = RgbImage::from_fn(10_001, 2, |x, _| image::Rgb([(x % 256) as u8, 0, 0]));
        let mut out = std::io::Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(img)
            .write_to(&mut out, ImageFormat::Png)
            .unwrap();
        out.into_inner()
    };

    let boundary = "nido-test-boundary";
    let mut body = Vec::new();
    body.extend_from_slice(
        format!(
            "--{boundary}\r\nContent-Disposition: form-data; name=\"images\"; \
             filename=\"huge.png\"\r\nContent-Type: image/png\r\n\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(&png);
    body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());

    let request = axum::http::Request::builder()
        .method("POST")
        .uri(format!("/v1/properties/{}/images", property.id))
        .header(
            axum::http::header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={boundary}"),
        )
        .header(
            axum::http::header::AUTHORIZATION,
            format!("Bearer {token}"),
        )
        .body(axum::body::Body::from(body))
        .unwrap();

    let response = ctx.app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

    // Nothing reached the object store
    assert!(ctx.store.is_empty());
}
