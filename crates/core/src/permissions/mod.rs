//! Permission system for room actions

use crate::models::RoomStatus;

/// Actions a participant can attempt in a room
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoomAction {
    // Lobby
    ProposeItem,
    StartVoting,

    // Voting
    CastBallot,
    ShowResults,

    // Results
    ViewResults,
    ReturnToLobby,
}

impl RoomAction {
    /// Status the room moves to when this action succeeds, if any
    pub fn target_status(&self) -> Option<RoomStatus> {
        match self {
            RoomAction::StartVoting => Some(RoomStatus::Voting),
            RoomAction::ShowResults => Some(RoomStatus::Results),
            RoomAction::ReturnToLobby => Some(RoomStatus::Lobby),
            _ => None,
        }
    }

    /// The host action that moves a room into `status`
    pub fn for_transition(status: RoomStatus) -> Self {
        match status {
            RoomStatus::Voting => RoomAction::StartVoting,
            RoomStatus::Results => RoomAction::ShowResults,
            RoomStatus::Lobby => RoomAction::ReturnToLobby,
        }
    }
}

/// Permission matrix for room actions
pub struct PermissionMatrix;

impl PermissionMatrix {
    /// Is this action allowed in the room's current status?
    pub fn allowed_in(status: RoomStatus, action: RoomAction) -> bool {
        match action {
            RoomAction::ProposeItem | RoomAction::StartVoting => status == RoomStatus::Lobby,
            RoomAction::CastBallot | RoomAction::ShowResults => status == RoomStatus::Voting,
            RoomAction::ViewResults | RoomAction::ReturnToLobby => status == RoomStatus::Results,
        }
    }

    /// Does this action require the host?
    pub fn host_only(action: RoomAction) -> bool {
        matches!(
            action,
            RoomAction::StartVoting | RoomAction::ShowResults | RoomAction::ReturnToLobby
        )
    }

    /// Check if a participant may perform an action
    pub fn can_perform(status: RoomStatus, is_host: bool, action: RoomAction) -> bool {
        if Self::host_only(action) && !is_host {
            return false;
        }
        Self::allowed_in(status, action)
    }
}
