use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::HashMap;

pub mod view;
pub mod wire;

pub use view::{reconcile, UserRow, ViewModel};

/// Operator credential, read once at session start and attached to every
/// outbound request plus the chat handshake. Immutable for the session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Credential {
    #[serde(rename = "uid")]
    pub identity: String,
    pub token: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UserRecord {
    #[serde(rename = "uid", deserialize_with = "deserialize_id")]
    pub id: String,
    #[serde(rename = "username", default)]
    pub display_name: String,
    #[serde(default)]
    pub email: String,
    #[serde(rename = "elo", default)]
    pub rating: f64,
    #[serde(rename = "race", default)]
    pub category: String,
    #[serde(rename = "guild", default)]
    pub group: Option<String>,
    #[serde(default)]
    pub online: Option<bool>,
    #[serde(default, flatten)]
    pub extra: HashMap<String, Value>,
}

/// Entry in the connected-users feed. Only the id matters; the rest of the
/// payload is server-controlled and carried along untouched.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConnectedUser {
    #[serde(rename = "uid", deserialize_with = "deserialize_id")]
    pub id: String,
    #[serde(default, flatten)]
    pub extra: HashMap<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CategoryCount {
    #[serde(rename = "race", alias = "category")]
    pub category: String,
    #[serde(default)]
    pub count: u64,
}

/// Result of one full fan-out poll cycle. `None` means that source's request
/// failed or timed out this cycle; a source is never partially decoded.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawSnapshot {
    pub users: Option<Vec<UserRecord>>,
    pub connected: Option<Vec<ConnectedUser>>,
    pub server_time: Option<i64>,
    pub categories: Option<Vec<CategoryCount>>,
}

/// Lifecycle of one long-lived streaming connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Connecting,
    Open,
    Closed,
    Failed,
}

impl ChannelState {
    pub fn as_str(self) -> &'static str {
        match self {
            ChannelState::Connecting => "connecting",
            ChannelState::Open => "open",
            ChannelState::Closed => "closed",
            ChannelState::Failed => "failed",
        }
    }

    /// Terminal states disable dependent input affordances.
    pub fn is_terminal(self) -> bool {
        matches!(self, ChannelState::Closed | ChannelState::Failed)
    }
}

fn deserialize_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let val: Value = Value::deserialize(deserializer)?;
    match val {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        _ => Err(serde::de::Error::custom("expected string or number for id")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_record_accepts_numeric_and_string_ids() {
        let numeric: UserRecord = serde_json::from_value(serde_json::json!({
            "uid": 17,
            "username": "ada",
            "email": "ada@example.net",
            "elo": 1210.5,
            "race": "orc"
        }))
        .unwrap();
        assert_eq!(numeric.id, "17");
        assert_eq!(numeric.category, "orc");
        assert_eq!(numeric.online, None);

        let string: UserRecord = serde_json::from_value(serde_json::json!({
            "uid": "u-17",
            "username": "ada",
            "online": false,
            "guild": "northwind"
        }))
        .unwrap();
        assert_eq!(string.id, "u-17");
        assert_eq!(string.online, Some(false));
        assert_eq!(string.group.as_deref(), Some("northwind"));
    }

    #[test]
    fn category_count_accepts_both_field_spellings() {
        let wire: CategoryCount =
            serde_json::from_value(serde_json::json!({"race": "elf", "count": 4})).unwrap();
        assert_eq!(wire.category, "elf");

        let canonical: CategoryCount =
            serde_json::from_value(serde_json::json!({"category": "elf", "count": 4})).unwrap();
        assert_eq!(canonical, wire);
    }

    #[test]
    fn channel_state_terminality() {
        assert!(!ChannelState::Connecting.is_terminal());
        assert!(!ChannelState::Open.is_terminal());
        assert!(ChannelState::Closed.is_terminal());
        assert!(ChannelState::Failed.is_terminal());
    }
}
