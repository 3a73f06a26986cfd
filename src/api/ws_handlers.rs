//! WebSocket feed of board events

use super::handlers::BoardState;
use crate::events::BoardEvent;
use axum::{
    extract::{
        ws::{Message, WebSocket},
        Query, State, WebSocketUpgrade,
    },
    response::IntoResponse,
};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use std::collections::HashSet;
use tokio::sync::broadcast::error::RecvError;
use tokio::time::{interval, Duration};
use tracing::{debug, warn};
use uuid::Uuid;

/// Query parameters for filtering WebSocket events
#[derive(Debug, Deserialize, Default)]
pub struct WsQuery {
    /// Comma-separated entity types to subscribe to (e.g. "tab,task")
    pub entity_types: Option<String>,
    /// Only events whose owner is this plan or tab
    pub owner_id: Option<Uuid>,
}

/// Filters resolved from [`WsQuery`]
#[derive(Debug, Default)]
struct EventFilter {
    entity_types: Option<HashSet<String>>,
    owner_id: Option<Uuid>,
}

impl EventFilter {
    fn from_query(query: WsQuery) -> Self {
        let entity_types = query.entity_types.map(|types| {
            types
                .split(',')
                .map(|s| s.trim().to_lowercase())
                .filter(|s| !s.is_empty())
                .collect()
        });
        Self {
            entity_types,
            owner_id: query.owner_id,
        }
    }

    fn accepts(&self, event: &BoardEvent) -> bool {
        if let Some(ref types) = self.entity_types {
            let entity = serde_json::to_value(event.entity_type)
                .ok()
                .and_then(|v| v.as_str().map(str::to_string))
                .unwrap_or_default();
            if !types.contains(&entity) {
                return false;
            }
        }

        match (self.owner_id, event.owner_id) {
            (Some(wanted), Some(owner)) => wanted == owner,
            // Plan events have no owner and only pass an unfiltered feed
            (Some(_), None) => false,
            (None, _) => true,
        }
    }
}

/// WebSocket upgrade handler for `/ws/events`
///
/// Sits behind the auth middleware, so a bad bearer token is rejected with
/// 401 before the upgrade.
pub async fn ws_events(
    ws: WebSocketUpgrade,
    State(state): State<BoardState>,
    Query(query): Query<WsQuery>,
) -> impl IntoResponse {
    let filter = EventFilter::from_query(query);
    ws.on_upgrade(move |socket| handle_ws(socket, state, filter))
}

async fn handle_ws(socket: WebSocket, state: BoardState, filter: EventFilter) {
    let (mut ws_sender, mut ws_receiver) = socket.split();
    let mut event_rx = state.event_bus.subscribe();

    let mut ping_interval = interval(Duration::from_secs(30));
    ping_interval.tick().await;

    debug!(filter = ?filter, "WebSocket events client connected");

    loop {
        tokio::select! {
            result = event_rx.recv() => {
                match result {
                    Ok(event) => {
                        if !filter.accepts(&event) {
                            continue;
                        }
                        match serde_json::to_string(&event) {
                            Ok(json) => {
                                if ws_sender.send(Message::Text(json.into())).await.is_err() {
                                    debug!("WebSocket send failed, client disconnected");
                                    break;
                                }
                            }
                            Err(e) => warn!("Failed to serialize BoardEvent: {}", e),
                        }
                    }
                    Err(RecvError::Lagged(n)) => {
                        warn!(skipped = n, "WebSocket client lagged, skipping events");
                    }
                    Err(RecvError::Closed) => {
                        debug!("Event bus closed, shutting down WebSocket");
                        break;
                    }
                }
            }

            _ = ping_interval.tick() => {
                if ws_sender.send(Message::Ping(Vec::new().into())).await.is_err() {
                    debug!("Ping failed, client disconnected");
                    break;
                }
            }

            msg = ws_receiver.next() => {
                match msg {
                    Some(Ok(Message::Close(_))) | None => {
                        debug!("WebSocket client disconnected");
                        break;
                    }
                    Some(Err(e)) => {
                        debug!("WebSocket error: {}", e);
                        break;
                    }
                    // Pongs and client text are ignored
                    _ => {}
                }
            }
        }
    }

    debug!("WebSocket connection closed");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{BoardAction, EntityType};

    fn task_event(tab_id: Uuid) -> BoardEvent {
        BoardEvent::new(EntityType::Task, BoardAction::Moved, Uuid::new_v4()).with_owner(tab_id)
    }

    #[test]
    fn test_unfiltered_feed_accepts_everything() {
        let filter = EventFilter::default();
        assert!(filter.accepts(&task_event(Uuid::new_v4())));
        assert!(filter.accepts(&BoardEvent::new(
            EntityType::Plan,
            BoardAction::Created,
            Uuid::new_v4()
        )));
    }

    #[test]
    fn test_entity_type_filter() {
        let filter = EventFilter::from_query(WsQuery {
            entity_types: Some(" Tab, ,plan".into()),
            owner_id: None,
        });
        assert!(!filter.accepts(&task_event(Uuid::new_v4())));
        assert!(filter.accepts(&BoardEvent::new(
            EntityType::Tab,
            BoardAction::Deleted,
            Uuid::new_v4()
        )));
    }

    #[test]
    fn test_owner_filter() {
        let tab_id = Uuid::new_v4();
        let filter = EventFilter::from_query(WsQuery {
            entity_types: None,
            owner_id: Some(tab_id),
        });
        assert!(filter.accepts(&task_event(tab_id)));
        assert!(!filter.accepts(&task_event(Uuid::new_v4())));
        assert!(!filter.accepts(&BoardEvent::new(
            EntityType::Plan,
            BoardAction::Created,
            Uuid::new_v4()
        )));
    }

    #[test]
    fn test_query_parsing() {
        let owner = Uuid::new_v4();
        let query = parse_query(&format!("entity_types=task&owner_id={owner}"));
        assert_eq!(query.entity_types.as_deref(), Some("task"));
        assert_eq!(query.owner_id, Some(owner));
    }

    fn parse_query(raw: &str) -> WsQuery {
        let uri: axum::http::Uri = format!("/ws/events?{raw}").parse().unwrap();
        Query::<WsQuery>::try_from_uri(&uri).unwrap().0
    }
}
