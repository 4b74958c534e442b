/// Notification inbox endpoints
///
/// Read-state transitions are monotonic: a notification goes from unread
/// to read once, and marking it again keeps the original `read_at`.
///
/// # Endpoints
///
/// - `GET /v1/notifications` - Paged inbox, optional unread filter
/// - `GET /v1/notifications/unread-count` - Badge counter
/// - `PUT /v1/notifications/:id/read` - Mark one as read (idempotent)
/// - `PUT /v1/notifications/read-all` - Mark everything as read
/// - `DELETE /v1/notifications/:id` - Remove a notification

use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
};
use axum::{
    extract::{Path, Query, State},
    Extension, Json,
};
use nido_shared::auth::middleware::AuthContext;
use nido_shared::models::notification::Notification;
use nido_shared::pagination::Page;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Inbox listing parameters
#[derive(Debug, Default, Deserialize)]
pub struct ListParams {
    pub page: Option<i64>,
    pub limit: Option<i64>,

    /// When true, read notifications are filtered out
    #[serde(default)]
    pub unread_only: bool,
}

/// Badge counter response
#[derive(Debug, Serialize)]
pub struct UnreadCountResponse {
    pub unread: i64,
}

/// Bulk mark-as-read response
#[derive(Debug, Serialize)]
pub struct MarkAllReadResponse {
    pub updated: u64,
}

/// Delete response
#[derive(Debug, Serialize)]
pub struct DeleteNotificationResponse {
    pub deleted: bool,
}

/// The caller's inbox, newest first
pub async fn list_notifications(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Query(params): Query<ListParams>,
) -> ApiResult<Json<Page<Notification>>> {
    let page_req = nido_shared::pagination::PageRequest {
        page: params.page,
        limit: params.limit,
    };

    let notifications = Notification::list_for_user(
        &state.db,
        auth.user_id,
        params.unread_only,
        page_req.limit(),
        page_req.offset(),
    )
    .await?;
    let total = Notification::count_for_user(&state.db, auth.user_id, params.unread_only).await?;

    Ok(Json(Page::new(
        notifications,
        total,
        page_req.page(),
        page_req.limit(),
    )))
}

/// Unread badge counter
pub async fn unread_count(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> ApiResult<Json<UnreadCountResponse>> {
    let unread = Notification::unread_count(&state.db, auth.user_id).await?;

    Ok(Json(UnreadCountResponse { unread }))
}

/// Mark one notification as read
///
/// Idempotent; repeated calls keep the first `read_at` timestamp.
///
/// # Errors
///
/// - `404 Not Found`: Notification absent, or owned by another user
pub async fn mark_read(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Notification>> {
    let notification = Notification::mark_as_read(&state.db, id, auth.user_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Notification not found".to_string()))?;

    Ok(Json(notification))
}

/// Mark the caller's whole inbox as read
pub async fn mark_all_read(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> ApiResult<Json<MarkAllReadResponse>> {
    let updated = Notification::mark_all_as_read(&state.db, auth.user_id).await?;

    Ok(Json(MarkAllReadResponse { updated }))
}

/// Delete a notification
///
/// # Errors
///
/// - `404 Not Found`: Notification absent, or owned by another user
pub async fn delete_notification(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<DeleteNotificationResponse>> {
    let deleted = Notification::delete(&state.db, id, auth.user_id).await?;

    if !deleted {
        return Err(ApiError::NotFound("Notification not found".to_string()));
    }

    Ok(Json(DeleteNotificationResponse { deleted }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_list_params_defaults() {
        let params: ListParams = serde_json::from_str("{}").unwrap();
        assert!(params.page.is_none());
        assert!(!params.unread_only);
    }
}
