use axum::{
    Json,
    extract::{Path, State},
};
use uuid::Uuid;

use turf_types::models::Topic;

use crate::auth::AppState;
use crate::error::{ApiError, ApiResult};

pub async fn list_topics(State(state): State<AppState>) -> ApiResult<Json<Vec<Topic>>> {
    Ok(Json(state.store.active_topics().await?))
}

pub async fn get_topic(
    State(state): State<AppState>,
    Path(topic_id): Path<Uuid>,
) -> ApiResult<Json<Topic>> {
    Ok(Json(find_topic(&state, topic_id).await?))
}

pub(crate) async fn find_topic(state: &AppState, topic_id: Uuid) -> ApiResult<Topic> {
    state
        .store
        .get_topic(topic_id)
        .await?
        .ok_or(ApiError::NotFound("Topic"))
}
