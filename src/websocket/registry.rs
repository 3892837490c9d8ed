//! Connection registry with a per-user index.
//!
//! # Responsibilities
//! - Map connection IDs to handles, and user IDs to their connections
//! - Fan out frames without blocking, reporting connections whose queue is full
//!
//! # Design Decisions
//! - Only the hub loop mutates the registry; readers take the shared lock for stats
//! - Removal is idempotent so duplicate unregister events are harmless

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use crate::websocket::connection::{ConnectionHandle, ConnectionId, ConnectionState, Outbound};

/// Result of a fan-out.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Delivery {
    pub delivered: usize,
    /// Connections whose queue was full or closed.
    pub dropped: Vec<ConnectionId>,
}

#[derive(Debug, Default)]
pub struct Registry {
    by_id: HashMap<ConnectionId, ConnectionHandle>,
    by_user: HashMap<i64, HashSet<ConnectionId>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, mut handle: ConnectionHandle) {
        handle.state = ConnectionState::Active;
        if let Some(user_id) = handle.user_id {
            self.by_user.entry(user_id).or_default().insert(handle.id);
        }
        self.by_id.insert(handle.id, handle);
    }

    /// Remove a connection. Dropping the handle closes its outbound queue.
    pub fn remove(&mut self, id: ConnectionId) -> Option<ConnectionHandle> {
        let mut handle = self.by_id.remove(&id)?;
        if let Some(user_id) = handle.user_id {
            if let Some(ids) = self.by_user.get_mut(&user_id) {
                ids.remove(&id);
                if ids.is_empty() {
                    self.by_user.remove(&user_id);
                }
            }
        }
        handle.state = ConnectionState::Closed;
        Some(handle)
    }

    pub fn contains(&self, id: ConnectionId) -> bool {
        self.by_id.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    pub fn unique_users(&self) -> usize {
        self.by_user.len()
    }

    pub fn user_connections(&self, user_id: i64) -> usize {
        self.by_user.get(&user_id).map_or(0, HashSet::len)
    }

    pub fn ids(&self) -> Vec<ConnectionId> {
        self.by_id.keys().copied().collect()
    }

    pub fn send_to(&mut self, id: ConnectionId, frame: Outbound) -> Delivery {
        let mut delivery = Delivery::default();
        if let Some(handle) = self.by_id.get_mut(&id) {
            enqueue(handle, frame, &mut delivery);
        }
        delivery
    }

    pub fn broadcast(&mut self, text: &str) -> Delivery {
        let mut delivery = Delivery::default();
        for handle in self.by_id.values_mut() {
            enqueue(handle, Outbound::Text(text.to_string()), &mut delivery);
        }
        delivery
    }

    pub fn send_to_user(&mut self, user_id: i64, text: &str) -> Delivery {
        let mut delivery = Delivery::default();
        let Some(ids) = self.by_user.get(&user_id) else {
            return delivery;
        };
        for id in ids {
            if let Some(handle) = self.by_id.get_mut(id) {
                enqueue(handle, Outbound::Text(text.to_string()), &mut delivery);
            }
        }
        delivery
    }

    /// Liveness pass: connections idle longer than `pong_wait` are returned as
    /// stale, the rest get a ping. A full queue on ping also counts as stale.
    pub fn ping_all(&mut self, pong_wait: Duration) -> Vec<ConnectionId> {
        let mut stale = Vec::new();
        for handle in self.by_id.values_mut() {
            if handle.idle_for() > pong_wait || !handle.try_enqueue(Outbound::Ping) {
                handle.state = ConnectionState::Closing;
                stale.push(handle.id);
            }
        }
        stale
    }
}

fn enqueue(handle: &mut ConnectionHandle, frame: Outbound, delivery: &mut Delivery) {
    if handle.state != ConnectionState::Active {
        return;
    }
    if handle.try_enqueue(frame) {
        delivery.delivered += 1;
    } else {
        handle.state = ConnectionState::Closing;
        delivery.dropped.push(handle.id);
    }
}
