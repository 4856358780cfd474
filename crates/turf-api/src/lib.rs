//! REST and WebSocket surface of the Turf server.

pub mod auth;
pub mod error;
pub mod gateway;
pub mod messages;
pub mod middleware;
pub mod notifications;
pub mod reactions;
pub mod topics;

use axum::{
    Json, Router,
    middleware::from_fn_with_state,
    routing::{delete, get, post},
};
use serde_json::{Value, json};

pub use auth::{AppState, AppStateInner};
pub use error::ApiError;

/// All routes. `/health`, `/auth/*` and the gateway (which authenticates
/// in-band) are public; everything else requires a bearer token.
pub fn router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/health", get(health))
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .route("/gateway", get(gateway::ws_upgrade));

    let protected_routes = Router::new()
        .route("/topics", get(topics::list_topics))
        .route("/topics/{topic_id}", get(topics::get_topic))
        .route(
            "/topics/{topic_id}/messages",
            get(messages::get_messages).post(messages::send_message),
        )
        .route(
            "/topics/{topic_id}/messages/{message_id}",
            delete(messages::delete_message),
        )
        .route(
            "/topics/{topic_id}/messages/{message_id}/reactions",
            post(reactions::toggle_reaction),
        )
        .route("/notifications", get(notifications::list_notifications))
        .route("/notifications/read-all", post(notifications::mark_all_read))
        .route(
            "/notifications/{notification_id}/read",
            post(notifications::mark_read),
        )
        .route_layer(from_fn_with_state(state.clone(), middleware::require_auth));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .with_state(state)
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}
