//! WebSocket message envelope and dispatch rules.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const PING: &str = "ping";
pub const PONG: &str = "pong";
pub const NEWS_UPDATE: &str = "news_update";
pub const PULSE_UPDATE: &str = "pulse_update";
pub const USER_NOTIFICATION: &str = "user_notification";
pub const SYSTEM_ALERT: &str = "system_alert";
pub const ERROR: &str = "error";

/// `{type, data, timestamp, user_id?}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WsMessage {
    #[serde(rename = "type")]
    pub kind: String,

    #[serde(default)]
    pub data: Value,

    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<i64>,
}

impl WsMessage {
    pub fn new(kind: impl Into<String>, data: Value) -> Self {
        Self {
            kind: kind.into(),
            data,
            timestamp: Utc::now(),
            user_id: None,
        }
    }

    pub fn pong() -> Self {
        Self::new(PONG, Value::Null)
    }

    pub fn to_text(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Where the hub sends a client message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// Answer the sender with a pong.
    Pong,
    Broadcast,
    /// Every connection held by this user.
    User(i64),
    /// Logged and dropped.
    Drop,
}

/// Decide the dispatch for a message sent by `sender`.
pub fn dispatch_for(kind: &str, sender: Option<i64>) -> Dispatch {
    match kind {
        PING => Dispatch::Pong,
        NEWS_UPDATE | SYSTEM_ALERT => Dispatch::Broadcast,
        PULSE_UPDATE | USER_NOTIFICATION => match sender {
            Some(user_id) => Dispatch::User(user_id),
            None => Dispatch::Drop,
        },
        _ => Dispatch::Drop,
    }
}
