//! WebSocket upgrade handler

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::app::AppState;
use crate::util::rate_limit::ConnectionRateLimiter;
use crate::ws::dispatcher::EventDispatcher;
use crate::ws::protocol::ServerMsg;

/// WebSocket upgrade handler
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Handle the upgraded WebSocket connection
async fn handle_socket(socket: WebSocket, state: AppState) {
    // Session id for the lifetime of this connection
    let player_id = Uuid::new_v4();
    info!(player_id = %player_id, "New WebSocket connection");

    let (ws_sink, ws_stream) = socket.split();

    // Attach before registering so the greeting has somewhere to go
    let outbound_rx = state.hub.attach(player_id);
    let dispatcher = state.dispatcher(player_id);
    let rate_limiter = ConnectionRateLimiter::new(state.config.input_rate_limit);

    run_session(dispatcher, ws_sink, ws_stream, outbound_rx, rate_limiter).await;

    info!(player_id = %player_id, "WebSocket connection closed");
}

/// Run the WebSocket session with read/write split
async fn run_session(
    mut dispatcher: EventDispatcher,
    mut ws_sink: futures::stream::SplitSink<WebSocket, Message>,
    mut ws_stream: futures::stream::SplitStream<WebSocket>,
    mut outbound_rx: mpsc::Receiver<ServerMsg>,
    rate_limiter: ConnectionRateLimiter,
) {
    let player_id = dispatcher.player_id();

    // Writer task: outbound queue -> WebSocket. Ends when the hub detaches us.
    let mut writer_handle = tokio::spawn(async move {
        while let Some(msg) = outbound_rx.recv().await {
            if let Err(e) = send_msg(&mut ws_sink, &msg).await {
                debug!(player_id = %player_id, error = %e, "WebSocket send failed");
                return;
            }
        }
        debug!(player_id = %player_id, "Outbound queue closed");
        let _ = ws_sink.send(Message::Close(None)).await;
    });

    // Reader loop: WebSocket -> dispatcher
    loop {
        tokio::select! {
            frame = ws_stream.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    if !rate_limiter.check_input() {
                        warn!(player_id = %player_id, "Rate limited input message");
                        continue;
                    }
                    dispatcher.handle_text(&text);
                }
                Some(Ok(Message::Binary(_))) => {
                    warn!(player_id = %player_id, "Received binary message, ignoring");
                }
                Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => {
                    debug!(player_id = %player_id, "Received transport ping/pong");
                }
                Some(Ok(Message::Close(_))) | None => {
                    info!(player_id = %player_id, "Client initiated close");
                    break;
                }
                Some(Err(e)) => {
                    error!(player_id = %player_id, error = %e, "WebSocket error");
                    break;
                }
            },
            _ = &mut writer_handle => {
                // Evicted, or the socket stopped accepting writes
                break;
            }
        }
    }

    dispatcher.disconnect();
    writer_handle.abort();
}

/// Send a message over WebSocket
async fn send_msg(
    sink: &mut futures::stream::SplitSink<WebSocket, Message>,
    msg: &ServerMsg,
) -> Result<(), String> {
    let json = serde_json::to_string(msg).map_err(|e| e.to_string())?;
    sink.send(Message::Text(json))
        .await
        .map_err(|e| e.to_string())
}
