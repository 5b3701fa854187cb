use crate::Realtime;
use crate::hub::{Client, Hub};
use crate::protocol::{Dispatcher, Response};
use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::Response as HttpResponse;
use futures::{SinkExt, StreamExt};
use lithium::features::config::ConfigStore;
use lithium::features::devices::Devices;
use lithium_kernel::server::{ApiError, AppState};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// `GET /ws`: upgrades to a WebSocket speaking the command protocol of
/// [`protocol`](crate::protocol) and receiving forwarded bus events.
pub(crate) async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
) -> Result<HttpResponse, ApiError> {
    let hub = state.try_get_slice::<Realtime>()?.hub.clone();
    let dispatcher = Dispatcher::new(
        Arc::clone(&state.try_get_slice::<Devices>()?.manager),
        Arc::clone(&state.try_get_slice::<ConfigStore>()?.manager),
    );
    Ok(ws.on_upgrade(move |socket| serve(socket, hub, dispatcher)))
}

async fn serve(socket: WebSocket, hub: Hub, dispatcher: Dispatcher) {
    let Client { id, mut rx } = hub.register();
    info!(client = %id, "WebSocket client connected");

    let (mut sink, mut stream) = socket.split();

    // Replies and forwarded events share the client queue, so they leave in order.
    let writer = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            if sink.send(Message::Text(frame.into())).await.is_err() {
                break;
            }
        }
        let _ = sink.close().await;
    });

    while let Some(incoming) = stream.next().await {
        let reply = match incoming {
            Ok(Message::Text(text)) => dispatcher.handle_text(text.as_str()).await,
            Ok(Message::Binary(_)) => Response::rejected("binary frames are not supported"),
            Ok(Message::Close(_)) => break,
            Ok(Message::Ping(_) | Message::Pong(_)) => continue,
            Err(e) => {
                debug!(client = %id, error = %e, "WebSocket read failed");
                break;
            },
        };
        reply_to(&hub, &id, &reply);
    }

    hub.unregister(&id);
    if let Err(e) = writer.await {
        warn!(client = %id, error = %e, "WebSocket writer task failed");
    }
    info!(client = %id, "WebSocket client disconnected");
}

fn reply_to(hub: &Hub, id: &str, reply: &Response) {
    match serde_json::to_string(reply) {
        Ok(frame) => {
            if !hub.send_to(id, frame) {
                debug!(client = id, "Reply dropped");
            }
        },
        Err(e) => warn!(client = id, error = %e, "Reply not serializable"),
    }
}
