//! WebSocket hub behaviour over real sockets.

mod common;

use common::*;
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_tungstenite::{
    connect_async,
    tungstenite::{Error as WsError, Message},
    MaybeTlsStream, WebSocketStream,
};

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

async fn gateway(max_per_user: usize) -> TestGateway {
    let mut config = test_config(&[]);
    config.health.check_services = false;
    config.websocket.max_connections_per_user = max_per_user;
    spawn_gateway(config).await
}

async fn connect(gateway: &TestGateway, user_id: i64) -> Result<Client, WsError> {
    let url = gateway.ws_url(&format!("/ws?token={}", gateway.token(user_id)));
    connect_async(url).await.map(|(stream, _)| stream)
}

async fn send(client: &mut Client, message: Value) {
    client.send(Message::Text(message.to_string().into())).await.unwrap();
}

/// Next text frame as JSON, skipping control frames.
async fn next_json(client: &mut Client) -> Value {
    loop {
        let frame = tokio::time::timeout(Duration::from_secs(2), client.next())
            .await
            .expect("timed out waiting for a frame")
            .expect("stream ended")
            .expect("websocket error");
        if let Message::Text(text) = frame {
            return serde_json::from_str(text.as_str()).unwrap();
        }
    }
}

#[tokio::test]
async fn test_third_connection_for_user_rejected_before_upgrade() {
    let gateway = gateway(2).await;

    let _first = connect(&gateway, 9).await.unwrap();
    let _second = connect(&gateway, 9).await.unwrap();
    gateway.wait_for_connections(2).await;

    match connect(&gateway, 9).await {
        Err(WsError::Http(response)) => assert_eq!(response.status(), 429),
        Err(other) => panic!("expected HTTP 429, got {:?}", other),
        Ok(_) => panic!("third connection should be rejected"),
    }
    assert_eq!(gateway.state.hub.connection_count(), 2);

    // Another user is unaffected.
    let _other = connect(&gateway, 10).await.unwrap();
    gateway.wait_for_connections(3).await;
}

#[tokio::test]
async fn test_ping_pong() {
    let gateway = gateway(5).await;
    let mut client = connect(&gateway, 1).await.unwrap();

    send(&mut client, json!({"type": "ping"})).await;
    let reply = next_json(&mut client).await;
    assert_eq!(reply["type"], "pong");
}

#[tokio::test]
async fn test_news_update_broadcast_to_everyone() {
    let gateway = gateway(5).await;
    let mut alice = connect(&gateway, 1).await.unwrap();
    let mut bob = connect(&gateway, 2).await.unwrap();
    gateway.wait_for_connections(2).await;

    send(
        &mut alice,
        json!({"type": "news_update", "data": {"id": 99}, "user_id": 555}),
    )
    .await;

    for client in [&mut alice, &mut bob] {
        let message = next_json(client).await;
        assert_eq!(message["type"], "news_update");
        assert_eq!(message["data"]["id"], 99);
        assert_eq!(message["user_id"], 1);
    }
}

#[tokio::test]
async fn test_malformed_message_does_not_close_connection() {
    let gateway = gateway(5).await;
    let mut client = connect(&gateway, 1).await.unwrap();

    client.send(Message::Text("{not json".to_string().into())).await.unwrap();
    send(&mut client, json!({"type": "ping"})).await;
    assert_eq!(next_json(&mut client).await["type"], "pong");
}

#[tokio::test]
async fn test_hub_broadcast_reaches_clients() {
    let gateway = gateway(5).await;
    let mut client = connect(&gateway, 3).await.unwrap();
    gateway.wait_for_connections(1).await;

    gateway
        .state
        .hub
        .broadcast(api_gateway::websocket::WsMessage::new(
            "system_alert",
            json!({"level": "maintenance"}),
        ))
        .await;

    let message = next_json(&mut client).await;
    assert_eq!(message["type"], "system_alert");
    assert_eq!(message["data"]["level"], "maintenance");
}

#[tokio::test]
async fn test_closed_client_is_unregistered() {
    let gateway = gateway(5).await;
    let mut client = connect(&gateway, 4).await.unwrap();
    gateway.wait_for_connections(1).await;

    client.close(None).await.unwrap();
    gateway.wait_for_connections(0).await;
}
