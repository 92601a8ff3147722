//! Developer guardrails and invariants
//!
//! Debug assertions for detecting impossible states during development.
//! These checks are compiled out in release builds.

use std::collections::HashSet;

use crate::models::{Ballot, Item, Room};
use crate::results::Results;
use crate::state::VoteState;

/// Validate that a Room's state is internally consistent
pub fn assert_room_invariants(room: &Room) {
    debug_assert!(!room.id.trim().is_empty(), "Room has empty code");

    debug_assert!(
        !room.host_id.trim().is_empty(),
        "Room {} has empty host id",
        room.id
    );

    // At most one participant may be marked as host
    let host_count = room.participants.iter().filter(|p| p.is_host).count();
    debug_assert!(
        host_count <= 1,
        "Room {} has {} hosts, expected 0 or 1",
        room.id,
        host_count
    );
}

/// Validate that an item belongs to the given room
pub fn assert_item_in_room(item: &Item, room: &Room) {
    debug_assert!(
        item.room_id == room.id,
        "Item {} belongs to room {}, not {}",
        item.id,
        item.room_id,
        room.id
    );
}

/// Validate that a ballot targets a known item of its own room
pub fn assert_ballot_invariants(ballot: &Ballot, items: &[Item]) {
    debug_assert!(
        ballot.id == ballot.key().to_string(),
        "Ballot {} does not match its composite key",
        ballot.id
    );

    if let Some(item) = items.iter().find(|i| i.id == ballot.item_id) {
        debug_assert!(
            item.room_id == ballot.room_id,
            "Ballot {} is in room {} but its item is in room {}",
            ballot.id,
            ballot.room_id,
            item.room_id
        );
    }
}

/// Validate that a session snapshot is consistent
pub fn assert_state_invariants(state: &VoteState) {
    if let Some(room) = &state.room {
        assert_room_invariants(room);

        let expected_host = state
            .participant
            .as_ref()
            .is_some_and(|p| p.id == room.host_id);
        debug_assert!(
            room.is_host == expected_host,
            "Room {} local host flag is {} but should be {}",
            room.id,
            room.is_host,
            expected_host
        );

        for item in &state.items {
            assert_item_in_room(item, room);
        }
    }

    for (key, ballot) in &state.votes {
        debug_assert!(
            *key == ballot.key(),
            "Vote map key {} holds ballot {}",
            key,
            ballot.id
        );
    }
}

/// Validate that results partition the distinct items exactly once each
pub fn assert_results_partition(results: &Results, items: &[Item]) {
    let distinct: HashSet<&str> = items.iter().map(|i| i.id.as_str()).collect();
    debug_assert!(
        results.len() == distinct.len(),
        "Results hold {} entries for {} items",
        results.len(),
        distinct.len()
    );

    let mut seen = HashSet::new();
    for result in results.iter() {
        debug_assert!(
            seen.insert(result.item.id.as_str()),
            "Item {} appears in more than one bucket",
            result.item.id
        );
    }
}
