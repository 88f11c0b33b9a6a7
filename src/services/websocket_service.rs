use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt, stream::select_all};
use tokio::{sync::mpsc, task::JoinHandle};
use tracing::{debug, info, warn};

use crate::{
    dto::ws::{ViewerInboundMessage, ViewerOutboundMessage},
    services::subscriptions::{SubscriptionManager, ViewerContext},
    state::{Feed, SharedState},
};

/// Handle the full lifecycle of a live viewer WebSocket connection.
///
/// Each connection is one viewing context: `watch` retargets every feed at a game,
/// `unwatch` releases them, and closing the socket cancels whatever is still open.
pub async fn handle_socket(state: SharedState, socket: WebSocket) {
    let (mut sender, mut receiver) = socket.split();
    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<Message>();

    let writer_task = tokio::spawn(async move {
        while let Some(message) = outbound_rx.recv().await {
            if sender.send(message).await.is_err() {
                break;
            }
        }
    });

    let mut context = SubscriptionManager::new(state).context();
    let mut forwarder: Option<JoinHandle<()>> = None;
    info!("live viewer connected");

    while let Some(message) = receiver.next().await {
        match message {
            Ok(Message::Text(text)) => match ViewerInboundMessage::from_json_str(&text) {
                Ok(ViewerInboundMessage::Watch { game_id }) if game_id.trim().is_empty() => {
                    send_error(&outbound_tx, "game_id must not be blank");
                }
                Ok(ViewerInboundMessage::Watch { game_id }) => {
                    debug!(game_id = %game_id, "viewer watching game");
                    stop(&mut forwarder);
                    forwarder = Some(watch(&mut context, &game_id, outbound_tx.clone()));
                }
                Ok(ViewerInboundMessage::Unwatch) => {
                    debug!("viewer released its game");
                    context.release();
                    stop(&mut forwarder);
                }
                Ok(ViewerInboundMessage::Unknown) => {
                    send_error(&outbound_tx, "unsupported message type");
                }
                Err(err) => {
                    warn!(error = %err, "failed to parse viewer message");
                    send_error(&outbound_tx, "malformed message");
                }
            },
            Ok(Message::Ping(payload)) => {
                let _ = outbound_tx.send(Message::Pong(payload));
            }
            Ok(Message::Close(frame)) => {
                let _ = outbound_tx.send(Message::Close(frame));
                break;
            }
            Ok(Message::Binary(_)) | Ok(Message::Pong(_)) => {}
            Err(err) => {
                warn!(error = %err, "websocket error");
                break;
            }
        }
    }

    context.release();
    stop(&mut forwarder);
    info!("live viewer disconnected");

    finalize(writer_task, outbound_tx).await;
}

/// Point every feed of `context` at `game_id` and forward updates to the socket writer.
fn watch(
    context: &mut ViewerContext,
    game_id: &str,
    outbound_tx: mpsc::UnboundedSender<Message>,
) -> JoinHandle<()> {
    let mut feeds = select_all(Feed::ALL.map(|feed| context.observe(feed, game_id)));
    tokio::spawn(async move {
        while let Some(update) = feeds.next().await {
            if send_message(&outbound_tx, &ViewerOutboundMessage::from(update)).is_err() {
                break;
            }
        }
    })
}

fn stop(forwarder: &mut Option<JoinHandle<()>>) {
    if let Some(task) = forwarder.take() {
        task.abort();
    }
}

fn send_error(tx: &mpsc::UnboundedSender<Message>, message: &str) {
    let _ = send_message(
        tx,
        &ViewerOutboundMessage::Error {
            message: message.to_owned(),
        },
    );
}

/// Serialize a payload and queue it on the writer channel.
///
/// Fails only once the writer is gone; serialization failures are logged and dropped.
fn send_message(
    tx: &mpsc::UnboundedSender<Message>,
    value: &ViewerOutboundMessage,
) -> Result<(), mpsc::error::SendError<Message>> {
    let payload = match serde_json::to_string(value) {
        Ok(payload) => payload,
        Err(err) => {
            warn!(error = %err, "failed to serialize viewer message");
            return Ok(());
        }
    };

    tx.send(Message::Text(payload.into()))
}

/// Ensure the writer task winds down before we return from the socket handler.
async fn finalize(writer_task: JoinHandle<()>, outbound_tx: mpsc::UnboundedSender<Message>) {
    drop(outbound_tx);
    let _ = writer_task.await;
}
