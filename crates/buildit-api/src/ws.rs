//! WebSocket handling for real-time pipeline updates.
//!
//! Clients subscribe to pipelines by id. On subscribe they receive the
//! current snapshot, then every event of that pipeline. A client that falls
//! behind the event channel gets fresh snapshots instead of the missed
//! events.

use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::Response;
use buildit_core::{PipelineId, PipelineView};
use buildit_scheduler::{Dispatcher, PipelineEvent};
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

use crate::AppState;

/// WebSocket upgrade handler.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    info!("WebSocket connection established");

    let dispatcher = state.dispatcher;
    let mut events = dispatcher.events();
    let mut subscriptions: HashSet<PipelineId> = HashSet::new();
    let (mut sender, mut receiver) = socket.split();

    loop {
        let outgoing = tokio::select! {
            msg = receiver.next() => match msg {
                Some(Ok(Message::Text(text))) => match serde_json::from_str::<WsCommand>(&text) {
                    Ok(cmd) => handle_command(&dispatcher, &mut subscriptions, cmd),
                    Err(e) => vec![WsMessage::Error { message: e.to_string() }],
                },
                Some(Ok(Message::Close(_))) | None => {
                    info!("WebSocket connection closed");
                    break;
                }
                Some(Err(e)) => {
                    warn!(error = %e, "WebSocket error");
                    break;
                }
                Some(Ok(_)) => continue,
            },
            event = events.recv() => match event {
                Ok(event) if subscriptions.contains(&event.pipeline_id()) => {
                    vec![WsMessage::Event { event }]
                }
                Ok(_) => continue,
                Err(RecvError::Lagged(missed)) => {
                    warn!(missed, "WebSocket client lagged, resending snapshots");
                    subscriptions
                        .iter()
                        .filter_map(|id| dispatcher.get_pipeline(*id).ok())
                        .map(|view| WsMessage::Snapshot { pipeline: view.as_ref().clone() })
                        .collect()
                }
                Err(RecvError::Closed) => break,
            },
        };

        for message in outgoing {
            let Ok(json) = serde_json::to_string(&message) else {
                continue;
            };
            if sender.send(Message::Text(json.into())).await.is_err() {
                debug!("WebSocket client went away");
                return;
            }
        }
    }
}

fn handle_command(
    dispatcher: &Dispatcher,
    subscriptions: &mut HashSet<PipelineId>,
    cmd: WsCommand,
) -> Vec<WsMessage> {
    match cmd {
        WsCommand::Subscribe { pipeline_id } => match dispatcher.get_pipeline(pipeline_id) {
            Ok(view) => {
                info!(%pipeline_id, "Client subscribed");
                subscriptions.insert(pipeline_id);
                vec![
                    WsMessage::Subscribed { pipeline_id },
                    WsMessage::Snapshot {
                        pipeline: view.as_ref().clone(),
                    },
                ]
            }
            Err(e) => vec![WsMessage::Error {
                message: e.to_string(),
            }],
        },
        WsCommand::Unsubscribe { pipeline_id } => {
            info!(%pipeline_id, "Client unsubscribed");
            subscriptions.remove(&pipeline_id);
            vec![]
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum WsCommand {
    Subscribe { pipeline_id: PipelineId },
    Unsubscribe { pipeline_id: PipelineId },
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum WsMessage {
    Subscribed { pipeline_id: PipelineId },
    Snapshot { pipeline: PipelineView },
    Event { event: PipelineEvent },
    Error { message: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routes::test_support::observed_app;

    #[tokio::test]
    async fn test_subscribe_returns_snapshot() {
        let (_, dispatcher, view) = observed_app().await;
        let mut subscriptions = HashSet::new();

        let replies = handle_command(
            &dispatcher,
            &mut subscriptions,
            WsCommand::Subscribe {
                pipeline_id: view.id,
            },
        );
        assert!(subscriptions.contains(&view.id));
        assert!(matches!(replies[0], WsMessage::Subscribed { .. }));
        match &replies[1] {
            WsMessage::Snapshot { pipeline } => assert_eq!(*pipeline, view),
            other => panic!("unexpected message: {:?}", other),
        }

        handle_command(
            &dispatcher,
            &mut subscriptions,
            WsCommand::Unsubscribe {
                pipeline_id: view.id,
            },
        );
        assert!(subscriptions.is_empty());
    }

    #[tokio::test]
    async fn test_subscribe_unknown_pipeline() {
        let (_, dispatcher, _) = observed_app().await;
        let mut subscriptions = HashSet::new();
        let replies = handle_command(
            &dispatcher,
            &mut subscriptions,
            WsCommand::Subscribe {
                pipeline_id: PipelineId::new(),
            },
        );
        assert!(matches!(replies[0], WsMessage::Error { .. }));
        assert!(subscriptions.is_empty());
    }

    #[test]
    fn test_command_wire_format() {
        let id = PipelineId::new();
        let cmd: WsCommand =
            serde_json::from_str(&format!(r#"{{"type":"subscribe","pipeline_id":"{}"}}"#, id))
                .unwrap();
        assert!(matches!(cmd, WsCommand::Subscribe { pipeline_id } if pipeline_id == id));
    }
}
