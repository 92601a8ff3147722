//! Ballot model - one participant's decision on one item

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A swipe decision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    Like,
    Dislike,
}

impl Decision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Decision::Like => "like",
            Decision::Dislike => "dislike",
        }
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Composite ballot identity: at most one ballot per participant per item
///
/// Rendered as `{participant_id}_{item_id}`. Item ids never contain `_`, so
/// the rendering is unambiguous when split at the last `_`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BallotKey {
    pub participant_id: String,
    pub item_id: String,
}

impl BallotKey {
    pub fn new(participant_id: impl Into<String>, item_id: impl Into<String>) -> Self {
        Self {
            participant_id: participant_id.into(),
            item_id: item_id.into(),
        }
    }
}

impl fmt::Display for BallotKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.participant_id, self.item_id)
    }
}

/// A cast vote
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ballot {
    /// Always `{participant_id}_{item_id}`
    pub id: String,
    pub room_id: String,
    pub item_id: String,
    pub participant_id: String,
    pub decision: Decision,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Ballot {
    pub fn new(
        room_id: String,
        item_id: String,
        participant_id: String,
        decision: Decision,
        comment: Option<String>,
    ) -> Self {
        let id = BallotKey::new(participant_id.as_str(), item_id.as_str()).to_string();
        Self {
            id,
            room_id,
            item_id,
            participant_id,
            decision,
            comment,
            created_at: Utc::now(),
        }
    }

    pub fn key(&self) -> BallotKey {
        BallotKey::new(self.participant_id.as_str(), self.item_id.as_str())
    }
}
