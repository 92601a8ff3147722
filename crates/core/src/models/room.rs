//! Room model - the voting session container

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};

use super::ParticipantRecord;

/// Characters a room code is drawn from
const ROOM_CODE_CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Default number of characters in a room code
pub const DEFAULT_ROOM_CODE_LEN: usize = 6;

/// Lifecycle status of a room
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RoomStatus {
    /// Participants gather and propose items
    #[default]
    Lobby,
    /// Participants swipe on the proposed items
    Voting,
    /// Aggregated results are shown
    Results,
}

impl RoomStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RoomStatus::Lobby => "lobby",
            RoomStatus::Voting => "voting",
            RoomStatus::Results => "results",
        }
    }

    /// Status transitions run lobby -> voting -> results -> lobby
    pub fn can_transition_to(&self, next: RoomStatus) -> bool {
        matches!(
            (self, next),
            (RoomStatus::Lobby, RoomStatus::Voting)
                | (RoomStatus::Voting, RoomStatus::Results)
                | (RoomStatus::Results, RoomStatus::Lobby)
        )
    }
}

impl fmt::Display for RoomStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for RoomStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "lobby" => Ok(RoomStatus::Lobby),
            "voting" => Ok(RoomStatus::Voting),
            "results" => Ok(RoomStatus::Results),
            other => Err(format!("unknown room status '{}'", other)),
        }
    }
}

/// Host-chosen room settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RoomSettings {
    /// Cap on proposals per participant (unlimited when absent)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_items_per_participant: Option<u32>,
    pub allow_comments: bool,
}

impl Default for RoomSettings {
    fn default() -> Self {
        Self {
            max_items_per_participant: None,
            allow_comments: true,
        }
    }
}

/// A voting room
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Room {
    /// Room code, used both for display and lookup
    pub id: String,
    pub host_id: String,
    /// Whether the local participant hosts this room (derived locally)
    pub is_host: bool,
    pub participants: Vec<ParticipantRecord>,
    pub status: RoomStatus,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub settings: RoomSettings,
}

impl Room {
    pub fn new(code: String, host_id: String) -> Self {
        Self {
            id: code,
            host_id,
            is_host: false,
            participants: Vec::new(),
            status: RoomStatus::Lobby,
            created_at: Utc::now(),
            settings: RoomSettings::default(),
        }
    }

    pub fn with_settings(mut self, settings: RoomSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn code(&self) -> &str {
        &self.id
    }

    /// Recompute the local host flag for the given participant
    pub fn mark_local(mut self, participant_id: &str) -> Self {
        self.is_host = self.host_id == participant_id;
        self
    }

    pub fn participant(&self, participant_id: &str) -> Option<&ParticipantRecord> {
        self.participants.iter().find(|p| p.id == participant_id)
    }

    pub fn online_count(&self) -> usize {
        self.participants.iter().filter(|p| p.is_online).count()
    }
}

/// Generate a random room code of the given length
pub fn generate_room_code(len: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..len)
        .map(|_| ROOM_CODE_CHARSET[rng.gen_range(0..ROOM_CODE_CHARSET.len())] as char)
        .collect()
}

/// Normalize user-entered room codes (trimmed, uppercase)
pub fn normalize_room_code(code: &str) -> String {
    code.trim().to_ascii_uppercase()
}

pub fn is_valid_room_code(code: &str) -> bool {
    !code.is_empty()
        && code
            .bytes()
            .all(|b| b.is_ascii_uppercase() || b.is_ascii_digit())
}
