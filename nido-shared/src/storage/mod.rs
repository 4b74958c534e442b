/// Object storage for property images
///
/// The [`ObjectStore`] trait abstracts the blob backend so handlers and the
/// image pipeline never talk to S3 directly. Implementations:
///
/// - [`s3::S3Store`]: production backend over `aws-sdk-s3`
/// - [`memory::MemoryStore`]: in-process map for tests
///
/// Key layout is deterministic so everything belonging to an agency,
/// listing type, or property can be found by prefix (see [`keys`]).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::property::ListingType;

pub mod keys;
pub mod memory;
pub mod s3;

/// Error type for storage operations
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Key does not exist
    #[error("Object not found: {0}")]
    NotFound(String),

    /// Backend failure
    #[error("Storage backend error: {0}")]
    Backend(String),
}

/// Metadata for one stored object
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectMeta {
    pub key: String,
    pub size: i64,
}

/// Blob storage operations the image pipeline depends on
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Stores bytes under a key, overwriting any existing object
    async fn put(&self, key: &str, bytes: Vec<u8>, content_type: &str)
        -> Result<(), StorageError>;

    /// Fetches the bytes stored under a key
    async fn get(&self, key: &str) -> Result<Vec<u8>, StorageError>;

    /// Deletes one object; deleting a missing key is not an error
    async fn delete(&self, key: &str) -> Result<(), StorageError>;

    /// Deletes a batch of objects
    async fn delete_many(&self, keys: &[String]) -> Result<(), StorageError>;

    /// Deletes every object under a prefix, returns how many were removed
    async fn delete_prefix(&self, prefix: &str) -> Result<u64, StorageError>;

    /// Lists objects under a prefix
    async fn list_prefix(&self, prefix: &str) -> Result<Vec<ObjectMeta>, StorageError>;

    /// Issues a short-lived presigned GET URL for a key
    async fn presign_get(&self, key: &str, expires_secs: u64) -> Result<String, StorageError>;
}

/// Storage consumption for one agency, split by listing type
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageUsage {
    pub total_bytes: i64,
    pub sale_bytes: i64,
    pub rent_bytes: i64,
    pub object_count: i64,
}

/// Sums storage usage for an agency by listing the agency prefix
///
/// Objects outside the sale/rent sub-prefixes still count toward the total.
pub async fn agency_storage_usage(
    store: &dyn ObjectStore,
    agency_id: Uuid,
) -> Result<StorageUsage, StorageError> {
    let objects = store.list_prefix(&keys::agency_prefix(agency_id)).await?;

    let sale_prefix = keys::listing_prefix(agency_id, ListingType::Sale);
    let rent_prefix = keys::listing_prefix(agency_id, ListingType::Rent);

    let mut usage = StorageUsage::default();

    for object in objects {
        usage.total_bytes += object.size;
        usage.object_count += 1;

        if object.key.starts_with(&sale_prefix) {
            usage.sale_bytes += object.size;
        } else if object.key.starts_with(&rent_prefix) {
            usage.rent_bytes += object.size;
        }
    }

    Ok(usage)
}

#[cfg(test)]
mod tests {
    use super::memory::MemoryStore;
    use super::*;
    use crate::models::property::ListingType;

    #[tokio::test]
    async fn test_agency_storage_usage_splits_by_listing_type() {
        let store = MemoryStore::new();
        let agency_id = Uuid::new_v4();
        let property_id = Uuid::new_v4();
        let image_id = Uuid::new_v4();

        let sale_key = keys::image_key(
            agency_id,
            ListingType::Sale,
            property_id,
            image_id,
            "original",
        );
        let rent_key = keys::image_key(
            agency_id,
            ListingType::Rent,
            property_id,
            image_id,
            "small",
        );

        store
            .put(&sale_key, vec![0u8; 100], "image/jpeg")
            .await
            .unwrap();
        store
            .put(&rent_key, vec![0u8; 40], "image/jpeg")
            .await
            .unwrap();

        let usage = agency_storage_usage(&store, agency_id).await.unwrap();

        assert_eq!(usage.total_bytes, 140);
        assert_eq!(usage.sale_bytes, 100);
        assert_eq!(usage.rent_bytes, 40);
        assert_eq!(usage.object_count, 2);

        let other = agency_storage_usage(&store, Uuid::new_v4()).await.unwrap();
        assert_eq!(other.total_bytes, 0);
        assert_eq!(other.object_count, 0);
    }
}
