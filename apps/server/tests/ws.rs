use futures::{SinkExt, StreamExt};
use lithium::domain::config::AppConfig;
use lithium_server::Server;
use serde_json::{Value, json};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

async fn start() -> (Server, String) {
    let mut cfg = AppConfig::default();
    cfg.pool.threads = 1;
    let server = Server::builder().config(cfg).build().await.unwrap();

    let app = server.router();
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
    (server, format!("ws://{addr}/ws"))
}

async fn recv(socket: &mut Socket) -> Value {
    loop {
        let frame = tokio::time::timeout(Duration::from_secs(3), socket.next())
            .await
            .expect("no frame in time")
            .unwrap()
            .unwrap();
        if let Message::Text(text) = frame {
            return serde_json::from_str(text.as_str()).unwrap();
        }
    }
}

async fn send(socket: &mut Socket, frame: Value) {
    socket.send(Message::Text(frame.to_string().into())).await.unwrap();
}

/// Next reply to a command, skipping forwarded events.
async fn reply(socket: &mut Socket) -> Value {
    loop {
        let frame = recv(socket).await;
        if frame.get("type").is_none() {
            return frame;
        }
    }
}

#[tokio::test]
async fn commands_get_replies() {
    let (server, url) = start().await;
    let (mut socket, _) = connect_async(url.as_str()).await.unwrap();

    send(&mut socket, json!({ "id": 1, "command": "ping" })).await;
    let pong = reply(&mut socket).await;
    assert_eq!(pong["id"], 1);
    assert_eq!(pong["status"], "ok");
    assert_eq!(pong["result"]["pong"], true);
    assert_eq!(server.hub().client_count(), 1);

    socket.send(Message::Text("definitely not json".into())).await.unwrap();
    let rejected = reply(&mut socket).await;
    assert_eq!(rejected["status"], "error");

    send(&mut socket, json!({ "id": 2, "command": "nope" })).await;
    let unknown = reply(&mut socket).await;
    assert_eq!(unknown["id"], 2);
    assert_eq!(unknown["status"], "error");

    // Still connected after bad input.
    send(&mut socket, json!({ "id": 3, "command": "ping" })).await;
    assert_eq!(reply(&mut socket).await["id"], 3);

    socket.close(None).await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(server.hub().client_count(), 0);
}

#[tokio::test]
async fn events_reach_every_client() {
    let (_server, url) = start().await;
    let (mut actor, _) = connect_async(url.as_str()).await.unwrap();
    let (mut watcher, _) = connect_async(url.as_str()).await.unwrap();

    // Make sure both clients are registered before anything is published.
    for socket in [&mut actor, &mut watcher] {
        send(socket, json!({ "command": "ping" })).await;
        reply(socket).await;
    }

    send(
        &mut actor,
        json!({ "id": "add", "command": "device.add", "params": { "type": "camera", "name": "cam" } }),
    )
    .await;
    let added = reply(&mut actor).await;
    assert_eq!(added["status"], "ok", "{added}");
    assert_eq!(added["result"]["type"], "camera");

    let event = recv(&mut watcher).await;
    assert_eq!(event["type"], "event");
    assert_eq!(event["topic"], "device.added");
    assert_eq!(event["payload"]["name"], "cam");

    send(&mut actor, json!({ "command": "config.set", "params": { "path": "site/elevation", "value": 350 } }))
        .await;
    assert_eq!(reply(&mut actor).await["status"], "ok");

    let changed = recv(&mut watcher).await;
    assert_eq!(changed["topic"], "config.changed");
    assert_eq!(changed["payload"]["action"], "set");
}
