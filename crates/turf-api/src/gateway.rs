use std::collections::{HashMap, HashSet};
use std::ops::ControlFlow;
use std::sync::{Arc, RwLock};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use turf_realtime::FeedFilter;
use turf_rooms::{RoomLease, RoomRegistry};
use turf_types::api::Claims;
use turf_types::events::{ChangeEvent, GatewayCommand, GatewayEvent};

use crate::auth::{AppState, verify_token};

/// Heartbeat interval: server sends a Ping every 15 seconds.
/// If 2 consecutive Pongs are missed (~30s), the connection is dropped.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);
const IDENTIFY_TIMEOUT: Duration = Duration::from_secs(10);

pub async fn ws_upgrade(State(state): State<AppState>, ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_connection(socket, state))
}

/// Identify handshake, then stream change events for the subscribed topics
/// and the user's own notifications.
pub async fn handle_connection(socket: WebSocket, state: AppState) {
    let (mut sender, mut receiver) = socket.split();

    let Some(claims) = wait_for_identify(&mut receiver, &state.jwt_secret).await else {
        warn!("WebSocket client failed to identify, closing");
        return;
    };

    info!("{} ({}) connected to gateway", claims.username, claims.sub);

    let ready = GatewayEvent::Ready {
        user_id: claims.sub,
        username: claims.username.clone(),
    };
    if !send_event(&mut sender, &ready).await {
        return;
    }

    run_connection_loop(sender, receiver, state, claims).await;
}

async fn run_connection_loop(
    mut sender: SplitSink<WebSocket, Message>,
    mut receiver: SplitStream<WebSocket>,
    state: AppState,
    claims: Claims,
) {
    let user_id = claims.sub;
    let username = claims.username;

    // Shared between the send and recv tasks
    let filter = Arc::new(RwLock::new(FeedFilter::notifications_for(user_id)));
    let send_filter = filter.clone();

    let mut feed_rx = state.store.feed().subscribe_all();
    let (direct_tx, mut direct_rx) = mpsc::unbounded_channel::<GatewayEvent>();

    let pong_received = Arc::new(AtomicBool::new(true));
    let pong_flag_send = pong_received.clone();
    let pong_flag_recv = pong_received.clone();

    // Forward feed events and direct replies to the client, with heartbeat
    let mut send_task = tokio::spawn(async move {
        let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
        heartbeat.tick().await;
        let mut missed_heartbeats: u8 = 0;

        loop {
            tokio::select! {
                result = feed_rx.recv() => {
                    let outgoing = {
                        let filter = send_filter
                            .read()
                            .unwrap_or_else(|poisoned| poisoned.into_inner());
                        feed_outgoing(result, &filter)
                    };
                    let event = match outgoing {
                        ControlFlow::Continue(Some(event)) => event,
                        ControlFlow::Continue(None) => continue,
                        ControlFlow::Break(()) => break,
                    };
                    if let GatewayEvent::Resync { missed } = &event {
                        warn!("Gateway receiver for {} lagged by {} events", user_id, missed);
                    }
                    if !send_event(&mut sender, &event).await {
                        break;
                    }
                }
                direct = direct_rx.recv() => {
                    let Some(event) = direct else { break };
                    if !send_event(&mut sender, &event).await {
                        break;
                    }
                }
                _ = heartbeat.tick() => {
                    if pong_flag_send.swap(false, Ordering::Acquire) {
                        missed_heartbeats = 0;
                    } else {
                        missed_heartbeats += 1;
                        if missed_heartbeats >= 2 {
                            warn!("Heartbeat timeout (missed {} pongs), dropping connection", missed_heartbeats);
                            break;
                        }
                    }
                    if sender.send(Message::Ping(Vec::new().into())).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    // Read commands from the client. Room leases live here and are released
    // when this task ends.
    let recv_state = state.clone();
    let recv_username = username.clone();
    let mut recv_task = tokio::spawn(async move {
        let mut subscriptions = Subscriptions::new(recv_state.registry.clone());

        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => match serde_json::from_str::<GatewayCommand>(text.as_str()) {
                    Ok(GatewayCommand::Identify { .. }) => {}
                    Ok(GatewayCommand::Subscribe { topic_ids }) => {
                        let topics = known_topics(&recv_state, topic_ids).await;
                        info!(
                            "{} ({}) subscribing to {} topics",
                            recv_username,
                            user_id,
                            topics.len()
                        );
                        subscriptions.set(&topics);
                        filter
                            .write()
                            .unwrap_or_else(|poisoned| poisoned.into_inner())
                            .topics = topics.iter().copied().collect();
                        let _ = direct_tx.send(GatewayEvent::Subscribed { topic_ids: topics });
                    }
                    Err(e) => {
                        warn!(
                            "{} ({}) bad command: {} -- raw: {}",
                            recv_username,
                            user_id,
                            e,
                            text.as_str().chars().take(200).collect::<String>()
                        );
                    }
                },
                Message::Pong(_) => {
                    pong_flag_recv.store(true, Ordering::Release);
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    // Wait for either task to finish
    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    info!("{} ({}) disconnected from gateway", username, user_id);
}

async fn wait_for_identify(
    receiver: &mut SplitStream<WebSocket>,
    jwt_secret: &str,
) -> Option<Claims> {
    let identify = tokio::time::timeout(IDENTIFY_TIMEOUT, async {
        while let Some(Ok(msg)) = receiver.next().await {
            if let Message::Text(text) = msg {
                if let Ok(GatewayCommand::Identify { token }) =
                    serde_json::from_str::<GatewayCommand>(text.as_str())
                {
                    return verify_token(jwt_secret, &token);
                }
            }
        }
        None
    });

    identify.await.ok().flatten()
}

/// Drop ids that are not existing topics, keeping request order.
async fn known_topics(state: &AppState, topic_ids: Vec<Uuid>) -> Vec<Uuid> {
    let mut known = Vec::with_capacity(topic_ids.len());
    for topic_id in topic_ids {
        if known.contains(&topic_id) {
            continue;
        }
        match state.store.get_topic(topic_id).await {
            Ok(Some(_)) => known.push(topic_id),
            Ok(None) => debug!("Ignoring subscription to unknown topic {}", topic_id),
            Err(e) => error!("Topic lookup for {} failed: {}", topic_id, e),
        }
    }
    known
}

/// Map one feed receive to what the client should see. A lag becomes
/// `Resync` so the client refetches what it missed.
fn feed_outgoing(
    result: Result<ChangeEvent, RecvError>,
    filter: &FeedFilter,
) -> ControlFlow<(), Option<GatewayEvent>> {
    match result {
        Ok(event) if filter.matches(&event) => ControlFlow::Continue(Some(GatewayEvent::Change(event))),
        Ok(_) => ControlFlow::Continue(None),
        Err(RecvError::Lagged(missed)) => ControlFlow::Continue(Some(GatewayEvent::Resync { missed })),
        Err(RecvError::Closed) => ControlFlow::Break(()),
    }
}

async fn send_event(sender: &mut SplitSink<WebSocket, Message>, event: &GatewayEvent) -> bool {
    let text = match serde_json::to_string(event) {
        Ok(text) => text,
        Err(e) => {
            error!("Failed to encode gateway event: {}", e);
            return true;
        }
    };
    sender.send(Message::Text(text.into())).await.is_ok()
}

/// Room leases held by one connection, one per subscribed topic.
pub struct Subscriptions {
    registry: RoomRegistry,
    leases: HashMap<Uuid, RoomLease>,
}

impl Subscriptions {
    pub fn new(registry: RoomRegistry) -> Self {
        Self {
            registry,
            leases: HashMap::new(),
        }
    }

    /// Replace the subscribed set. Leases for topics still wanted are kept.
    pub fn set(&mut self, topic_ids: &[Uuid]) {
        let wanted: HashSet<Uuid> = topic_ids.iter().copied().collect();
        self.leases.retain(|topic_id, _| wanted.contains(topic_id));
        for topic_id in wanted {
            if !self.leases.contains_key(&topic_id) {
                let lease = self.registry.acquire(topic_id);
                self.leases.insert(topic_id, lease);
            }
        }
    }

    pub fn topics(&self) -> HashSet<Uuid> {
        self.leases.keys().copied().collect()
    }
}
