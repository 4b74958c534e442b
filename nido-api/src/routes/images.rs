/// Property image endpoints
///
/// Uploads run through the shared image pipeline (validation, variant
/// generation, storage writes with compensating cleanup) and persist one
/// `property_images` row per stored upload. Retrieval never exposes raw
/// storage keys: every response carries short-lived presigned URLs.
///
/// # Endpoints
///
/// - `POST /v1/properties/:id/images` - Upload up to 10 images (multipart)
/// - `PATCH /v1/properties/:id/images/:image_id` - Update presentation metadata
/// - `PUT /v1/properties/:id/images/:image_id/primary` - Flag as primary
/// - `DELETE /v1/properties/:id/images/:image_id` - Remove image and objects
///
/// Upload requires the caller to be the property's agent. Image-level
/// mutations answer 404 for images that exist but belong to another
/// agent's property, matching the ownership-as-not-found policy used for
/// saved searches.

use crate::{
    app::{AppState, RequireAuth},
    error::{ApiError, ApiResult},
};
use axum::{
    extract::{Multipart, Path, State},
    Json,
};
use chrono::{DateTime, Utc};
use nido_shared::images::{self, ImageUrls};
use nido_shared::models::property::Property;
use nido_shared::models::property_image::{
    CreatePropertyImage, PropertyImage, UpdatePropertyImage,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Maximum number of files accepted in one upload request
const MAX_UPLOAD_FILES: usize = 10;

/// Image DTO with presigned variant URLs
#[derive(Debug, Serialize)]
pub struct ImageResponse {
    pub id: Uuid,
    pub property_id: Uuid,
    pub file_name: String,
    pub content_type: String,
    pub file_size: i64,
    pub width: i32,
    pub height: i32,
    pub caption: Option<String>,
    pub alt_text: Option<String>,
    pub is_primary: bool,
    pub display_order: i32,

    /// Presigned GET URLs for the small/medium/large variants
    pub urls: ImageUrls,

    pub created_at: DateTime<Utc>,
}

/// Builds the public DTO for an image row, signing its variant URLs
pub(crate) async fn image_response(
    state: &AppState,
    image: PropertyImage,
) -> ApiResult<ImageResponse> {
    let urls =
        images::signed_variant_urls(state.store.as_ref(), &image, state.signed_url_expiry())
            .await?;

    Ok(ImageResponse {
        id: image.id,
        property_id: image.property_id,
        file_name: image.file_name,
        content_type: image.content_type,
        file_size: image.file_size,
        width: image.width,
        height: image.height,
        caption: image.caption,
        alt_text: image.alt_text,
        is_primary: image.is_primary,
        display_order: image.display_order,
        urls,
        created_at: image.created_at,
    })
}

/// Update image metadata request
///
/// `caption` and `alt_text` distinguish `null` (clear) from absent (keep).
#[derive(Debug, Default, Deserialize)]
pub struct UpdateImageRequest {
    #[serde(default, deserialize_with = "super::double_option")]
    pub caption: Option<Option<String>>,

    #[serde(default, deserialize_with = "super::double_option")]
    pub alt_text: Option<Option<String>>,

    pub display_order: Option<i32>,
}

/// Delete image response
#[derive(Debug, Serialize)]
pub struct DeleteImageResponse {
    pub deleted: bool,
}

/// Loads an image through its property and checks the caller owns it
///
/// A missing image, a property mismatch, and a foreign owner all read as
/// 404 so the endpoint does not reveal which of the three happened.
async fn load_owned_image(
    state: &AppState,
    property_id: Uuid,
    image_id: Uuid,
    user_id: Uuid,
) -> ApiResult<(Property, PropertyImage)> {
    let image = PropertyImage::find_by_id(&state.db, image_id)
        .await?
        .filter(|image| image.property_id == property_id)
        .ok_or_else(|| ApiError::NotFound("Image not found".to_string()))?;

    let property = Property::find_by_id(&state.db, image.property_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Image not found".to_string()))?;

    if property.agent_id != user_id {
        return Err(ApiError::NotFound("Image not found".to_string()));
    }

    Ok((property, image))
}

/// Upload images for a property
///
/// Accepts up to 10 files in one multipart request. Each file is validated
/// and re-encoded before anything touches storage; the first image ever
/// uploaded for a property becomes its primary.
///
/// # Errors
///
/// - `401 Unauthorized`: Missing or invalid token
/// - `403 Forbidden`: Caller is not the property's agent
/// - `404 Not Found`: Property does not exist
/// - `422 Unprocessable Entity`: No files, or a file failed validation
pub async fn upload_images(
    State(state): State<AppState>,
    Path(property_id): Path<Uuid>,
    RequireAuth(auth): RequireAuth,
    mut multipart: Multipart,
) -> ApiResult<Json<Vec<ImageResponse>>> {
    let property = Property::find_by_id(&state.db, property_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Property not found".to_string()))?;

    if property.agent_id != auth.user_id {
        return Err(ApiError::Forbidden(
            "Only the listing agent can upload images".to_string(),
        ));
    }

    let agency_id = auth.agency_id.ok_or_else(|| {
        ApiError::Forbidden("Agent does not belong to an agency".to_string())
    })?;

    let mut files: Vec<(String, String, Vec<u8>)> = Vec::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("Malformed multipart payload: {}", e)))?
    {
        if files.len() >= MAX_UPLOAD_FILES {
            return Err(ApiError::BadRequest(format!(
                "At most {} images per upload",
                MAX_UPLOAD_FILES
            )));
        }

        let file_name = field
            .file_name()
            .unwrap_or("upload.jpg")
            .to_string();
        let content_type = field
            .content_type()
            .unwrap_or("application/octet-stream")
            .to_string();

        let bytes = field
            .bytes()
            .await
            .map_err(|e| ApiError::BadRequest(format!("Failed to read upload: {}", e)))?;

        files.push((file_name, content_type, bytes.to_vec()));
    }

    if files.is_empty() {
        return Err(ApiError::invalid_field(
            "images",
            "At least one image file is required",
        ));
    }

    let existing = PropertyImage::count_by_property(&state.db, property_id).await?;
    let has_primary = PropertyImage::find_primary(&state.db, property_id)
        .await?
        .is_some();

    let mut responses = Vec::with_capacity(files.len());

    for (index, (file_name, content_type, bytes)) in files.into_iter().enumerate() {
        let upload = images::upload_image(
            state.store.as_ref(),
            bytes,
            property_id,
            agency_id,
            property.listing_type,
        )
        .await?;

        let create = CreatePropertyImage {
            property_id,
            original_key: upload.original_key.clone(),
            small_key: upload.small_key.clone(),
            medium_key: upload.medium_key.clone(),
            large_key: upload.large_key.clone(),
            file_name,
            content_type,
            file_size: upload.file_size,
            width: upload.width,
            height: upload.height,
            caption: None,
            alt_text: None,
            is_primary: !has_primary && existing == 0 && index == 0,
            display_order: (existing + index as i64) as i32,
        };

        let image = match PropertyImage::create(&state.db, create).await {
            Ok(image) => image,
            Err(e) => {
                // The objects are already stored; remove them so a failed
                // row insert leaves nothing orphaned in the bucket
                let mut keys = vec![upload.original_key];
                keys.extend(upload.small_key);
                keys.extend(upload.medium_key);
                keys.extend(upload.large_key);
                if let Err(cleanup) = state.store.delete_many(&keys).await {
                    tracing::warn!(error = %cleanup, "cleanup after failed image insert failed");
                }
                return Err(e.into());
            }
        };

        responses.push(image_response(&state, image).await?);
    }

    Ok(Json(responses))
}

/// Update an image's presentation metadata (caption, alt text, order)
pub async fn update_image(
    State(state): State<AppState>,
    Path((property_id, image_id)): Path<(Uuid, Uuid)>,
    RequireAuth(auth): RequireAuth,
    Json(req): Json<UpdateImageRequest>,
) -> ApiResult<Json<ImageResponse>> {
    load_owned_image(&state, property_id, image_id, auth.user_id).await?;

    let update = UpdatePropertyImage {
        caption: req.caption,
        alt_text: req.alt_text,
        display_order: req.display_order,
    };

    let image = PropertyImage::update(&state.db, image_id, property_id, update)
        .await?
        .ok_or_else(|| ApiError::NotFound("Image not found".to_string()))?;

    Ok(Json(image_response(&state, image).await?))
}

/// Flag an image as the property's primary
///
/// Idempotent; siblings are unset and the target set inside one database
/// transaction, so concurrent calls cannot leave two primaries.
pub async fn set_primary_image(
    State(state): State<AppState>,
    Path((property_id, image_id)): Path<(Uuid, Uuid)>,
    RequireAuth(auth): RequireAuth,
) -> ApiResult<Json<ImageResponse>> {
    load_owned_image(&state, property_id, image_id, auth.user_id).await?;

    let image = PropertyImage::set_primary(&state.db, property_id, image_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Image not found".to_string()))?;

    Ok(Json(image_response(&state, image).await?))
}

/// Delete an image
///
/// Storage objects are removed first, then the database row, so a
/// surviving row never points at deleted objects.
pub async fn delete_image(
    State(state): State<AppState>,
    Path((property_id, image_id)): Path<(Uuid, Uuid)>,
    RequireAuth(auth): RequireAuth,
) -> ApiResult<Json<DeleteImageResponse>> {
    let (_, image) = load_owned_image(&state, property_id, image_id, auth.user_id).await?;

    images::delete_image_objects(state.store.as_ref(), &image).await?;

    let deleted = PropertyImage::delete(&state.db, image_id, property_id).await?;
    if !deleted {
        return Err(ApiError::NotFound("Image not found".to_string()));
    }

    Ok(Json(DeleteImageResponse { deleted }))
}
