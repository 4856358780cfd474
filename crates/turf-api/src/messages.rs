use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use tracing::info;
use uuid::Uuid;

use turf_types::api::{Claims, SendMessageRequest};
use turf_types::models::{Message, MessageRecord};

use crate::auth::AppState;
use crate::error::{ApiError, ApiResult};
use crate::topics::find_topic;

pub async fn get_messages(
    State(state): State<AppState>,
    Path(topic_id): Path<Uuid>,
) -> ApiResult<Json<Vec<Message>>> {
    find_topic(&state, topic_id).await?;
    Ok(Json(state.store.load_messages(topic_id).await?))
}

/// Post a message or a reply. The new row reaches room subscribers through
/// the change feed; the response carries it as well.
pub async fn send_message(
    State(state): State<AppState>,
    Path(topic_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<SendMessageRequest>,
) -> ApiResult<impl IntoResponse> {
    if req.content.trim().is_empty() {
        return Err(ApiError::bad_request("message content is empty"));
    }
    find_topic(&state, topic_id).await?;

    let record = turf_rooms::send_message(
        &state.store,
        topic_id,
        Some(claims.sub),
        &req.content,
        req.parent_id,
    )
    .await?
    .ok_or_else(|| ApiError::bad_request("message content is empty"))?;

    Ok((StatusCode::CREATED, Json(record)))
}

pub async fn delete_message(
    State(state): State<AppState>,
    Path((topic_id, message_id)): Path<(Uuid, Uuid)>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<StatusCode> {
    let message = message_in_topic(&state, topic_id, message_id).await?;
    if message.author_id != claims.sub {
        return Err(ApiError::Forbidden);
    }

    let removed = state.store.delete_message(message_id).await?;
    info!(
        "{} deleted message {} ({} rows)",
        claims.username,
        message_id,
        removed.len()
    );
    Ok(StatusCode::NO_CONTENT)
}

pub(crate) async fn message_in_topic(
    state: &AppState,
    topic_id: Uuid,
    message_id: Uuid,
) -> ApiResult<MessageRecord> {
    state
        .store
        .get_message(message_id)
        .await?
        .filter(|m| m.topic_id == topic_id)
        .ok_or(ApiError::NotFound("Message"))
}
