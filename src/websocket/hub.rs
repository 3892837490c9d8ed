//! WebSocket hub: the single owner of connection state.
//!
//! # Responsibilities
//! - Register and unregister connections, enforcing connection caps
//! - Dispatch inbound client messages by type
//! - Drive liveness pings and drop silent connections
//! - Fan out messages published by other parts of the gateway
//!
//! # Design Decisions
//! - One event loop is the only writer of the registry
//! - The registry sits behind a read/write lock only so stats and admission
//!   checks can read it concurrently
//! - The loop never awaits a connection; a full queue means disconnect
//!
//! # Data Flow
//! ```text
//! session.rs ──register/unregister──┐
//! read pumps ──inbound messages─────┼──► Hub::run ──try_send──► per-connection queues
//! HubHandle::broadcast/send_to_user ┘        ▲
//!                                   ping tick┘
//! ```

use chrono::Utc;
use serde::Serialize;
use std::sync::{Arc, RwLock};
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::time::{self, MissedTickBehavior};

use crate::config::WebSocketConfig;
use crate::error::GatewayError;
use crate::observability::metrics;
use crate::websocket::connection::{ConnectionHandle, ConnectionId, Outbound};
use crate::websocket::message::{dispatch_for, Dispatch, WsMessage};
use crate::websocket::registry::{Delivery, Registry};

const EVENT_QUEUE_SIZE: usize = 1024;

/// Typed hub statistics.
#[derive(Debug, Clone, Serialize)]
pub struct HubStats {
    pub enabled: bool,
    pub total_connections: usize,
    pub unique_users: usize,
    pub max_connections: usize,
    pub max_connections_per_user: usize,
}

struct Registration {
    handle: ConnectionHandle,
    accepted: oneshot::Sender<Result<(), GatewayError>>,
}

/// Addressing for messages entering the hub.
#[derive(Debug, Clone)]
pub enum Inbound {
    /// Sent by a client over its socket.
    Client {
        from: ConnectionId,
        user_id: Option<i64>,
        message: WsMessage,
    },
    Broadcast(WsMessage),
    ToUser(i64, WsMessage),
}

/// The hub event loop. Created with [`Hub::new`], driven by [`Hub::run`].
pub struct Hub {
    config: Arc<WebSocketConfig>,
    registry: Arc<RwLock<Registry>>,
    register_rx: mpsc::Receiver<Registration>,
    unregister_rx: mpsc::UnboundedReceiver<ConnectionId>,
    inbound_rx: mpsc::Receiver<Inbound>,
}

/// Cloneable entry point into the hub.
#[derive(Clone)]
pub struct HubHandle {
    config: Arc<WebSocketConfig>,
    registry: Arc<RwLock<Registry>>,
    register_tx: mpsc::Sender<Registration>,
    unregister_tx: mpsc::UnboundedSender<ConnectionId>,
    inbound_tx: mpsc::Sender<Inbound>,
}

impl Hub {
    pub fn new(config: WebSocketConfig) -> (Hub, HubHandle) {
        let config = Arc::new(config);
        let registry = Arc::new(RwLock::new(Registry::new()));
        let (register_tx, register_rx) = mpsc::channel(EVENT_QUEUE_SIZE);
        let (unregister_tx, unregister_rx) = mpsc::unbounded_channel();
        let (inbound_tx, inbound_rx) = mpsc::channel(EVENT_QUEUE_SIZE);

        let hub = Hub {
            config: config.clone(),
            registry: registry.clone(),
            register_rx,
            unregister_rx,
            inbound_rx,
        };
        let handle = HubHandle {
            config,
            registry,
            register_tx,
            unregister_tx,
            inbound_tx,
        };
        (hub, handle)
    }

    pub async fn run(mut self, mut shutdown: broadcast::Receiver<()>) {
        if !self.config.enabled {
            tracing::info!("WebSocket hub disabled");
            return;
        }

        tracing::info!(
            max_connections = self.config.max_connections,
            max_connections_per_user = self.config.max_connections_per_user,
            "WebSocket hub started"
        );

        let mut ticker = time::interval(self.config.ping_period());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately.
        ticker.tick().await;

        loop {
            tokio::select! {
                Some(registration) = self.register_rx.recv() => self.register(registration),
                Some(id) = self.unregister_rx.recv() => self.disconnect(id, "connection closed"),
                Some(inbound) = self.inbound_rx.recv() => self.dispatch(inbound),
                _ = ticker.tick() => self.ping_all(),
                _ = shutdown.recv() => {
                    tracing::info!("WebSocket hub received shutdown signal, exiting loop");
                    break;
                }
            }
        }

        self.close_all();
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Registry> {
        self.registry.write().expect("registry lock poisoned")
    }

    fn register(&self, registration: Registration) {
        let Registration { handle, accepted } = registration;
        let id = handle.id;
        let user_id = handle.user_id;

        let mut registry = self.write();
        let verdict = admission(&self.config, &registry, user_id);
        if verdict.is_ok() {
            registry.insert(handle);
            metrics::set_ws_connections(registry.len());
            tracing::info!(
                connection_id = %id,
                user_id = user_id.unwrap_or(0),
                total_connections = registry.len(),
                "WebSocket client registered"
            );
        }
        drop(registry);

        let _ = accepted.send(verdict);
    }

    fn disconnect(&self, id: ConnectionId, reason: &str) {
        let mut registry = self.write();
        if let Some(handle) = registry.remove(id) {
            metrics::set_ws_connections(registry.len());
            tracing::info!(
                connection_id = %id,
                user_id = handle.user_id.unwrap_or(0),
                reason,
                total_connections = registry.len(),
                "WebSocket client unregistered"
            );
        }
    }

    fn settle(&self, delivery: Delivery) -> usize {
        for id in delivery.dropped {
            tracing::warn!(connection_id = %id, "Outbound queue full, disconnecting client");
            self.disconnect(id, "outbound queue full");
        }
        delivery.delivered
    }

    fn dispatch(&self, inbound: Inbound) {
        match inbound {
            Inbound::Client {
                from,
                user_id,
                mut message,
            } => {
                message.user_id = user_id;
                message.timestamp = Utc::now();

                match dispatch_for(&message.kind, user_id) {
                    Dispatch::Pong => self.send_to(from, &WsMessage::pong()),
                    Dispatch::Broadcast => {
                        let delivered = self.broadcast(&message);
                        tracing::debug!(connection_id = %from, kind = %message.kind, delivered, "Broadcast client message");
                    }
                    Dispatch::User(target) => {
                        self.send_to_user(target, &message);
                    }
                    Dispatch::Drop => {
                        tracing::warn!(connection_id = %from, kind = %message.kind, "Dropping unroutable WebSocket message");
                    }
                }
            }
            Inbound::Broadcast(message) => {
                self.broadcast(&message);
            }
            Inbound::ToUser(user_id, message) => {
                self.send_to_user(user_id, &message);
            }
        }
    }

    fn send_to(&self, id: ConnectionId, message: &WsMessage) {
        let Some(text) = encode(message) else { return };
        let delivery = self.write().send_to(id, Outbound::Text(text));
        self.settle(delivery);
    }

    fn broadcast(&self, message: &WsMessage) -> usize {
        let Some(text) = encode(message) else { return 0 };
        let delivery = self.write().broadcast(&text);
        self.settle(delivery)
    }

    fn send_to_user(&self, user_id: i64, message: &WsMessage) -> usize {
        let Some(text) = encode(message) else { return 0 };
        let delivery = self.write().send_to_user(user_id, &text);
        self.settle(delivery)
    }

    fn ping_all(&self) {
        let stale = self.write().ping_all(self.config.pong_wait());
        for id in stale {
            tracing::info!(connection_id = %id, "WebSocket client missed liveness window");
            self.disconnect(id, "liveness timeout");
        }
    }

    fn close_all(&self) {
        let mut registry = self.write();
        let ids = registry.ids();
        for id in &ids {
            registry.remove(*id);
        }
        metrics::set_ws_connections(0);
        tracing::info!(closed = ids.len(), "WebSocket hub closed all connections");
    }
}

fn encode(message: &WsMessage) -> Option<String> {
    match message.to_text() {
        Ok(text) => Some(text),
        Err(e) => {
            tracing::error!(error = %e, kind = %message.kind, "Failed to encode WebSocket message");
            None
        }
    }
}

/// 503 when the gateway is full, 429 when the user holds their maximum.
fn admission(config: &WebSocketConfig, registry: &Registry, user_id: Option<i64>) -> Result<(), GatewayError> {
    if registry.len() >= config.max_connections {
        return Err(GatewayError::ServiceUnavailable {
            service: "websocket".to_string(),
            detail: format!("connection limit {} reached", config.max_connections),
        });
    }
    if let Some(user_id) = user_id {
        if registry.user_connections(user_id) >= config.max_connections_per_user {
            return Err(GatewayError::TooManyConnections(format!(
                "user {} holds {} connections",
                user_id, config.max_connections_per_user
            )));
        }
    }
    Ok(())
}

impl HubHandle {
    pub fn config(&self) -> &WebSocketConfig {
        &self.config
    }

    /// Check caps ahead of the protocol upgrade.
    pub fn admit(&self, user_id: Option<i64>) -> Result<(), GatewayError> {
        let registry = self.registry.read().expect("registry lock poisoned");
        admission(&self.config, &registry, user_id)
    }

    /// Hand a connection to the hub and wait for its verdict. The hub
    /// re-checks the caps, so racing upgrades cannot exceed them.
    pub async fn register(&self, handle: ConnectionHandle) -> Result<(), GatewayError> {
        let (accepted, verdict) = oneshot::channel();
        self.register_tx
            .send(Registration { handle, accepted })
            .await
            .map_err(|_| GatewayError::Internal("websocket hub stopped".to_string()))?;
        verdict
            .await
            .map_err(|_| GatewayError::Internal("websocket hub stopped".to_string()))?
    }

    pub fn unregister(&self, id: ConnectionId) {
        let _ = self.unregister_tx.send(id);
    }

    /// Queue a client message for dispatch. `false` once the hub has stopped.
    pub async fn submit(&self, inbound: Inbound) -> bool {
        self.inbound_tx.send(inbound).await.is_ok()
    }

    pub async fn broadcast(&self, message: WsMessage) -> bool {
        self.submit(Inbound::Broadcast(message)).await
    }

    pub async fn send_to_user(&self, user_id: i64, message: WsMessage) -> bool {
        self.submit(Inbound::ToUser(user_id, message)).await
    }

    pub fn connection_count(&self) -> usize {
        self.registry.read().expect("registry lock poisoned").len()
    }

    pub fn stats(&self) -> HubStats {
        let registry = self.registry.read().expect("registry lock poisoned");
        HubStats {
            enabled: self.config.enabled,
            total_connections: registry.len(),
            unique_users: registry.unique_users(),
            max_connections: self.config.max_connections,
            max_connections_per_user: self.config.max_connections_per_user,
        }
    }
}
