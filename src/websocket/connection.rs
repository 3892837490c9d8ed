//! Connection identity, state and outbound handle.
//!
//! # Responsibilities
//! - Generate unique connection IDs for tracing
//! - Track connection state (Connecting → Active → Closing → Closed)
//! - Own the bounded outbound queue and the liveness timestamp
//!
//! # Design Decisions
//! - Enqueue never blocks; a full queue is reported to the caller, which disconnects
//! - The read pump and the hub share the liveness timestamp, nothing else

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

/// Relaxed ordering is enough; only uniqueness matters.
static CONNECTION_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    pub fn new() -> Self {
        Self(CONNECTION_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ws-{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Handshake in progress.
    Connecting,
    /// Registered; read and write pumps running.
    Active,
    /// Disconnect requested.
    Closing,
    /// Removed from the registry.
    Closed,
}

/// Frames queued for the write pump.
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    Text(String),
    Ping,
}

/// Last time anything was read from the peer.
#[derive(Debug)]
pub struct Liveness(Mutex<Instant>);

impl Liveness {
    pub fn new() -> Self {
        Self(Mutex::new(Instant::now()))
    }

    pub fn touch(&self) {
        *self.0.lock().expect("liveness lock poisoned") = Instant::now();
    }

    pub fn idle_for(&self) -> Duration {
        self.0.lock().expect("liveness lock poisoned").elapsed()
    }
}

impl Default for Liveness {
    fn default() -> Self {
        Self::new()
    }
}

/// The hub's view of one connection.
#[derive(Debug)]
pub struct ConnectionHandle {
    pub id: ConnectionId,
    pub user_id: Option<i64>,
    pub state: ConnectionState,
    sender: mpsc::Sender<Outbound>,
    liveness: Arc<Liveness>,
}

impl ConnectionHandle {
    pub fn new(
        id: ConnectionId,
        user_id: Option<i64>,
        sender: mpsc::Sender<Outbound>,
        liveness: Arc<Liveness>,
    ) -> Self {
        Self {
            id,
            user_id,
            state: ConnectionState::Connecting,
            sender,
            liveness,
        }
    }

    /// Queue a frame without waiting. `false` means the queue is full or the
    /// write pump is gone; either way the connection should be dropped.
    pub fn try_enqueue(&self, frame: Outbound) -> bool {
        self.sender.try_send(frame).is_ok()
    }

    pub fn idle_for(&self) -> Duration {
        self.liveness.idle_for()
    }
}
