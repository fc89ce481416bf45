//! Wire shapes for the admin HTTP endpoints and the chat stream.
//!
//! Every type here is tolerant of server-controlled variation: ids arrive as
//! strings or numbers, the category feed arrives wrapped or bare, and chat
//! frames with unknown `type` tags decode to a catch-all instead of failing.

use crate::{CategoryCount, ConnectedUser, Credential, UserRecord};
use chrono::{TimeZone, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize)]
pub struct UsersBody {
    #[serde(default)]
    pub users: Vec<UserRecord>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConnectedBody {
    #[serde(default)]
    pub users: Vec<ConnectedUser>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerTimeBody {
    pub server_time: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LogBody {
    #[serde(default)]
    pub lines: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BroadcastBody {
    pub message: String,
}

/// The category endpoint ships either `{"data": [...]}` or a bare array
/// depending on deployment. Both collapse to one canonical sequence here,
/// before anything downstream sees the payload.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum CategoryStatsBody {
    Wrapped {
        #[serde(default)]
        data: Vec<CategoryCount>,
    },
    Bare(Vec<CategoryCount>),
}

impl CategoryStatsBody {
    pub fn into_counts(self) -> Vec<CategoryCount> {
        match self {
            CategoryStatsBody::Wrapped { data } => data,
            CategoryStatsBody::Bare(counts) => counts,
        }
    }
}

/// One chat-stream frame, tagged on `type`. Only `message` frames reach the
/// sink; `init` and anything unrecognized are dropped by the channel.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChatFrame {
    Init {
        uid: String,
        username: String,
    },
    Message {
        #[serde(default)]
        uid: String,
        #[serde(default)]
        username: String,
        #[serde(default)]
        message: String,
        #[serde(default)]
        timestamp: Option<i64>,
    },
    #[serde(other)]
    Other,
}

impl ChatFrame {
    pub fn init(credential: &Credential, display_name: &str) -> Self {
        ChatFrame::Init {
            uid: credential.identity.clone(),
            username: display_name.to_string(),
        }
    }

    pub fn message(credential: &Credential, display_name: &str, text: &str) -> Self {
        ChatFrame::Message {
            uid: credential.identity.clone(),
            username: display_name.to_string(),
            message: text.to_string(),
            timestamp: Some(Utc::now().timestamp_millis()),
        }
    }
}

/// Sink line for one chat message: `[HH:MM:SS] <sender>: body`. Frames
/// without a usable timestamp fall back to the arrival clock.
pub fn format_chat_line(username: &str, message: &str, timestamp: Option<i64>) -> String {
    let at = timestamp
        .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
        .unwrap_or_else(Utc::now);
    format!("[{}] <{}>: {}", at.format("%H:%M:%S"), username, message)
}
