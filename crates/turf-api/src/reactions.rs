use axum::{
    Extension, Json,
    extract::{Path, State},
};
use uuid::Uuid;

use turf_realtime::ReactionToggle;
use turf_types::api::{Claims, ToggleReactionRequest, ToggleReactionResponse};

use crate::auth::AppState;
use crate::error::{ApiError, ApiResult};
use crate::messages::message_in_topic;

const MAX_KIND_CHARS: usize = 32;

/// Add the reaction if the user has not made it yet, otherwise remove it.
pub async fn toggle_reaction(
    State(state): State<AppState>,
    Path((topic_id, message_id)): Path<(Uuid, Uuid)>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<ToggleReactionRequest>,
) -> ApiResult<Json<ToggleReactionResponse>> {
    let kind = req.kind.trim();
    if kind.is_empty() || kind.chars().count() > MAX_KIND_CHARS {
        return Err(ApiError::bad_request("invalid reaction kind"));
    }
    message_in_topic(&state, topic_id, message_id).await?;

    let toggled = state
        .store
        .toggle_reaction(message_id, claims.sub, kind.to_string())
        .await?
        .ok_or(ApiError::NotFound("Message"))?;

    Ok(Json(ToggleReactionResponse {
        added: matches!(toggled, ReactionToggle::Added(_)),
    }))
}
