/// Image upload pipeline
///
/// Turns a raw upload into a stored original plus up to three resized
/// variants, all re-encoded as JPEG. Decode, resize, and encode are
/// CPU-bound and run on a blocking thread; storage writes happen on the
/// async side. If a write fails partway through, the keys uploaded so far
/// are deleted before the error surfaces.
///
/// Validation happens before anything touches storage: the payload must
/// decode as JPEG, PNG, or WebP, fit within the dimension and pixel caps,
/// and pass a decompression-ratio check against crafted payloads.

use std::io::Cursor;

use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, GenericImageView, ImageFormat, ImageReader};
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use crate::models::property::ListingType;
use crate::models::property_image::PropertyImage;
use crate::storage::{keys, ObjectStore, StorageError};

/// Hard cap on either dimension
pub const MAX_DIMENSION: u32 = 10_000;

/// Hard cap on total pixel count
pub const MAX_PIXELS: u64 = 25_000_000;

/// JPEG quality for the re-encoded original
pub const ORIGINAL_QUALITY: u8 = 95;

/// Default lifetime of presigned variant URLs
pub const SIGNED_URL_TTL_SECS: u64 = 900;

/// One resized rendition of an upload
#[derive(Debug, Clone, Copy)]
pub struct VariantSpec {
    pub name: &'static str,
    pub max_width: u32,
    pub max_height: u32,
    pub quality: u8,
}

/// Renditions generated for sources that exceed the target box
pub const VARIANTS: [VariantSpec; 3] = [
    VariantSpec {
        name: "small",
        max_width: 400,
        max_height: 300,
        quality: 80,
    },
    VariantSpec {
        name: "medium",
        max_width: 800,
        max_height: 600,
        quality: 85,
    },
    VariantSpec {
        name: "large",
        max_width: 1200,
        max_height: 900,
        quality: 90,
    },
];

/// Error type for the image pipeline
#[derive(Debug, thiserror::Error)]
pub enum ImageError {
    /// Payload is not JPEG, PNG, or WebP
    #[error("Unsupported image format: {0}")]
    UnsupportedFormat(String),

    /// Payload could not be decoded
    #[error("Invalid image data: {0}")]
    InvalidImage(String),

    /// A dimension exceeds [`MAX_DIMENSION`]
    #[error("Image dimensions {width}x{height} exceed the {MAX_DIMENSION} pixel limit")]
    DimensionsTooLarge { width: u32, height: u32 },

    /// Pixel count exceeds [`MAX_PIXELS`]
    #[error("Image has {pixels} pixels, limit is {MAX_PIXELS}")]
    TooManyPixels { pixels: u64 },

    /// Decompression ratio check failed
    #[error("Image payload failed the decompression ratio check")]
    SuspiciousCompression,

    /// JPEG encoding failed
    #[error("Image encoding failed: {0}")]
    Encode(String),

    /// Blocking task was cancelled or panicked
    #[error("Image processing task failed: {0}")]
    Task(String),

    /// Storage backend failure
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Result of a completed upload, ready to persist as a `property_images` row
#[derive(Debug, Clone)]
pub struct UploadResult {
    pub image_id: Uuid,
    pub original_key: String,
    pub small_key: Option<String>,
    pub medium_key: Option<String>,
    pub large_key: Option<String>,

    /// Pixel dimensions of the decoded source
    pub width: i32,
    pub height: i32,

    /// Size in bytes of the stored (re-encoded) original
    pub file_size: i64,
}

/// Presigned URLs for the public variant set
///
/// The original never appears here; each variant falls back to the original
/// object when it was not generated, but only as a signed URL.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ImageUrls {
    pub small: String,
    pub medium: String,
    pub large: String,
}

struct ProcessedUpload {
    width: u32,
    height: u32,
    original: Vec<u8>,
    variants: Vec<(&'static str, Vec<u8>, u8)>,
}

fn resize_to_fit(img: &DynamicImage, max_width: u32, max_height: u32) -> DynamicImage {
    let (width, height) = img.dimensions();

    let width_ratio = max_width as f32 / width as f32;
    let height_ratio = max_height as f32 / height as f32;
    let ratio = width_ratio.min(height_ratio);

    let new_width = (width as f32 * ratio) as u32;
    let new_height = (height as f32 * ratio) as u32;

    img.resize(new_width, new_height, image::imageops::FilterType::Lanczos3)
}

fn encode_jpeg(img: &DynamicImage, quality: u8) -> Result<Vec<u8>, ImageError> {
    let rgb = img.to_rgb8();
    let mut out = Cursor::new(Vec::new());

    rgb.write_with_encoder(JpegEncoder::new_with_quality(&mut out, quality))
        .map_err(|e| ImageError::Encode(e.to_string()))?;

    Ok(out.into_inner())
}

/// Decodes, validates, and encodes the original plus variants
///
/// Synchronous on purpose; callers run it under `spawn_blocking`.
fn process(bytes: Vec<u8>) -> Result<ProcessedUpload, ImageError> {
    let reader = ImageReader::new(Cursor::new(&bytes))
        .with_guessed_format()
        .map_err(|e| ImageError::InvalidImage(e.to_string()))?;

    let format = reader
        .format()
        .ok_or_else(|| ImageError::UnsupportedFormat("unrecognized payload".to_string()))?;

    if !matches!(
        format,
        ImageFormat::Jpeg | ImageFormat::Png | ImageFormat::WebP
    ) {
        return Err(ImageError::UnsupportedFormat(
            format.extensions_str().first().copied().unwrap_or("unknown").to_string(),
        ));
    }

    let img = reader
        .decode()
        .map_err(|e| ImageError::InvalidImage(e.to_string()))?;

    let (width, height) = img.dimensions();

    if width > MAX_DIMENSION || height > MAX_DIMENSION {
        return Err(ImageError::DimensionsTooLarge { width, height });
    }

    let pixels = width as u64 * height as u64;
    if pixels > MAX_PIXELS {
        return Err(ImageError::TooManyPixels { pixels });
    }

    // Crafted payloads carry far more bytes than their pixel data explains
    let ratio = (pixels as f64 * 4.0) / bytes.len() as f64;
    if ratio < 0.1 {
        return Err(ImageError::SuspiciousCompression);
    }

    let original = encode_jpeg(&img, ORIGINAL_QUALITY)?;

    let mut variants = Vec::new();
    for spec in VARIANTS {
        if width <= spec.max_width && height <= spec.max_height {
            continue;
        }

        let resized = resize_to_fit(&img, spec.max_width, spec.max_height);
        let encoded = encode_jpeg(&resized, spec.quality)?;
        variants.push((spec.name, encoded, spec.quality));
    }

    Ok(ProcessedUpload {
        width,
        height,
        original,
        variants,
    })
}

/// Processes an upload and stores the original plus generated variants
///
/// Keys land under the property's prefix so the whole set can later be
/// removed in one prefix delete. On a storage failure after the first
/// write, every key uploaded so far is deleted before the error returns.
#[instrument(skip(store, bytes), fields(property_id = %property_id, size = bytes.len()))]
pub async fn upload_image(
    store: &dyn ObjectStore,
    bytes: Vec<u8>,
    property_id: Uuid,
    agency_id: Uuid,
    listing_type: ListingType,
) -> Result<UploadResult, ImageError> {
    let processed = tokio::task::spawn_blocking(move || process(bytes))
        .await
        .map_err(|e| ImageError::Task(e.to_string()))??;

    let image_id = Uuid::new_v4();
    let original_key = keys::image_key(agency_id, listing_type, property_id, image_id, "original");
    let file_size = processed.original.len() as i64;

    let mut uploaded: Vec<String> = Vec::new();
    let mut variant_keys: Vec<(&'static str, String)> = Vec::new();

    let stored = async {
        store
            .put(&original_key, processed.original, "image/jpeg")
            .await?;
        uploaded.push(original_key.clone());

        for (name, encoded, _) in processed.variants {
            let key = keys::image_key(agency_id, listing_type, property_id, image_id, name);
            store.put(&key, encoded, "image/jpeg").await?;
            uploaded.push(key.clone());
            variant_keys.push((name, key));
        }

        Ok::<_, StorageError>(())
    }
    .await;

    if let Err(e) = stored {
        warn!(error = %e, uploaded = uploaded.len(), "upload failed, removing stored keys");
        if let Err(cleanup) = store.delete_many(&uploaded).await {
            warn!(error = %cleanup, "cleanup after failed upload also failed");
        }
        return Err(e.into());
    }

    let mut small_key = None;
    let mut medium_key = None;
    let mut large_key = None;
    for (name, key) in variant_keys {
        match name {
            "small" => small_key = Some(key),
            "medium" => medium_key = Some(key),
            "large" => large_key = Some(key),
            _ => {}
        }
    }

    debug!(%image_id, variants = uploaded.len() - 1, "image stored");

    Ok(UploadResult {
        image_id,
        original_key,
        small_key,
        medium_key,
        large_key,
        width: processed.width as i32,
        height: processed.height as i32,
        file_size,
    })
}

/// Issues presigned GET URLs for an image's variant set
///
/// Variants that were never generated resolve to a signed URL for the
/// original object, so every slot is always usable.
pub async fn signed_variant_urls(
    store: &dyn ObjectStore,
    image: &PropertyImage,
    expires_secs: u64,
) -> Result<ImageUrls, StorageError> {
    let small = image.small_key.as_deref().unwrap_or(&image.original_key);
    let medium = image.medium_key.as_deref().unwrap_or(&image.original_key);
    let large = image.large_key.as_deref().unwrap_or(&image.original_key);

    Ok(ImageUrls {
        small: store.presign_get(small, expires_secs).await?,
        medium: store.presign_get(medium, expires_secs).await?,
        large: store.presign_get(large, expires_secs).await?,
    })
}

/// Deletes every storage object attached to an image
///
/// Callers run this before removing the database row, so a surviving row
/// never points at deleted objects without the reverse being possible.
pub async fn delete_image_objects(
    store: &dyn ObjectStore,
    image: &PropertyImage,
) -> Result<(), StorageError> {
    let keys: Vec<String> = image
        .storage_keys()
        .into_iter()
        .map(str::to_string)
        .collect();

    store.delete_many(&keys).await
}
