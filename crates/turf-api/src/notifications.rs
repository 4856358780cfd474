use axum::{
    Extension, Json,
    extract::{Path, Query, State},
};
use uuid::Uuid;

use turf_types::api::{Claims, MarkAllReadResponse, NotificationQuery};
use turf_types::models::Notification;

use crate::auth::AppState;
use crate::error::{ApiError, ApiResult};

const DEFAULT_LIMIT: u32 = 50;
const MAX_LIMIT: u32 = 200;

/// The caller's notifications, newest first.
pub async fn list_notifications(
    State(state): State<AppState>,
    Query(query): Query<NotificationQuery>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<Json<Vec<Notification>>> {
    let limit = query.limit.unwrap_or(DEFAULT_LIMIT).min(MAX_LIMIT);
    let notes = state
        .store
        .list_notifications(claims.sub, query.unread_only, limit)
        .await?;
    Ok(Json(notes))
}

pub async fn mark_read(
    State(state): State<AppState>,
    Path(notification_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<Json<Notification>> {
    let note = state
        .store
        .mark_notification_read(claims.sub, notification_id)
        .await?
        .ok_or(ApiError::NotFound("Notification"))?;
    Ok(Json(note))
}

pub async fn mark_all_read(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<Json<MarkAllReadResponse>> {
    let updated = state.store.mark_all_notifications_read(claims.sub).await?;
    Ok(Json(MarkAllReadResponse { updated }))
}
