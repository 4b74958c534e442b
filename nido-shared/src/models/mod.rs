/// Database models for Nido
///
/// This module contains all database models and their CRUD operations.
///
/// # Models
///
/// - `user`: User accounts, roles, and profile data
/// - `agency`: Real-estate agencies
/// - `property`: Property listings and filtered search
/// - `property_image`: Image metadata and storage keys
/// - `saved_search`: Persisted search filters with notification settings
/// - `search_history`: Immutable log of executed searches
/// - `notification`: In-app notifications
/// - `preferences`: User and notification preference rows
/// - `favorite`: User-property favorite join rows
/// - `view`: Property view log with dedup window

pub mod agency;
pub mod favorite;
pub mod notification;
pub mod preferences;
pub mod property;
pub mod property_image;
pub mod saved_search;
pub mod search_history;
pub mod user;
pub mod view;
