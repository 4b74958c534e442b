/// API route handlers
///
/// This module contains all route handlers organized by resource:
///
/// - `health`: Health check endpoint
/// - `auth`: Credential endpoints (register, login, reset flows)
/// - `properties`: Listing CRUD, cards, favorites
/// - `images`: Property image upload and management
/// - `search`: Filtered search, suggestions, history
/// - `saved_searches`: Persisted filter snapshots
/// - `users`: Profile, preferences, privileged provisioning
/// - `agencies`: Agency provisioning and storage usage
/// - `notifications`: In-app inbox

use serde::{Deserialize, Deserializer};

/// Distinguishes an absent JSON field from an explicit `null`
///
/// Patch DTOs use `Option<Option<T>>` fields with this deserializer:
/// absent stays `None` (leave the column untouched), `null` becomes
/// `Some(None)` (clear the column), a value becomes `Some(Some(v))`.
pub(crate) fn double_option<'de, T, D>(de: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Deserialize::deserialize(de).map(Some)
}

pub mod agencies;
pub mod auth;
pub mod health;
pub mod images;
pub mod notifications;
pub mod properties;
pub mod saved_searches;
pub mod search;
pub mod users;
