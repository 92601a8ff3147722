//! Participant models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Default upper bound for a display nickname, in characters
pub const DEFAULT_MAX_NICKNAME_LEN: usize = 24;

/// The local user of this session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
    /// Opaque identity token
    pub id: String,
    pub nickname: String,
    pub is_anonymous: bool,
}

impl Participant {
    pub fn new(id: String, nickname: String) -> Self {
        Self {
            id,
            nickname,
            is_anonymous: false,
        }
    }

    /// Create an anonymous participant with a fresh identity token
    pub fn anonymous(nickname: String) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            nickname,
            is_anonymous: true,
        }
    }
}

/// A participant as listed in a room
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantRecord {
    pub id: String,
    pub nickname: String,
    pub is_host: bool,
    pub is_online: bool,
    pub joined_at: DateTime<Utc>,
}

impl ParticipantRecord {
    pub fn new(id: String, nickname: String, is_host: bool) -> Self {
        Self {
            id,
            nickname,
            is_host,
            is_online: true,
            joined_at: Utc::now(),
        }
    }
}
