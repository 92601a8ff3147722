//! Client state container
//!
//! [`VoteState`] is an immutable snapshot of everything the client knows
//! about the current session. Its mutators are reducers: they take the
//! untrusted input, validate it, and return the next snapshot. Invalid input
//! never panics and never errors; the previous value is kept and a warning is
//! logged. [`Store`] holds the current snapshot for a session.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, Mutex, MutexGuard};

use serde_json::Value;
use tracing::{debug, warn};

use crate::invariants::{assert_results_partition, assert_state_invariants};
use crate::models::{Ballot, BallotKey, Item, Participant, Room, DEFAULT_MAX_NICKNAME_LEN};
use crate::results::{compute_results, Results};
use crate::validation::{
    dedupe_by_id, validate_ballot, validate_item, validate_participant_within,
    validate_participants, validate_room,
};

/// Loading indicators tracked by the client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LoadingFlag {
    Room,
    Participants,
    Items,
    Ballots,
    Results,
}

impl LoadingFlag {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoadingFlag::Room => "room",
            LoadingFlag::Participants => "participants",
            LoadingFlag::Items => "items",
            LoadingFlag::Ballots => "ballots",
            LoadingFlag::Results => "results",
        }
    }
}

impl fmt::Display for LoadingFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for LoadingFlag {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "room" => Ok(LoadingFlag::Room),
            "participants" => Ok(LoadingFlag::Participants),
            "items" => Ok(LoadingFlag::Items),
            "ballots" => Ok(LoadingFlag::Ballots),
            "results" => Ok(LoadingFlag::Results),
            _ => Err(()),
        }
    }
}

/// Snapshot of the client session
#[derive(Debug, Clone, PartialEq)]
pub struct VoteState {
    pub participant: Option<Participant>,
    pub room: Option<Room>,
    /// Proposed items in the current room
    pub items: Vec<Item>,
    /// Item currently shown for swiping
    pub current_item: Option<Item>,
    pub current_index: usize,
    /// Cast ballots, one per (participant, item)
    pub votes: HashMap<BallotKey, Ballot>,
    loading: HashMap<LoadingFlag, bool>,
    max_nickname_len: usize,
}

impl Default for VoteState {
    fn default() -> Self {
        Self::with_nickname_limit(DEFAULT_MAX_NICKNAME_LEN)
    }
}

impl VoteState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Empty state accepting session nicknames up to `max_nickname_len` characters
    pub fn with_nickname_limit(max_nickname_len: usize) -> Self {
        Self {
            participant: None,
            room: None,
            items: Vec::new(),
            current_item: None,
            current_index: 0,
            votes: HashMap::new(),
            loading: HashMap::new(),
            max_nickname_len,
        }
    }

    /// Replace the session participant; a malformed value is ignored
    pub fn set_participant(&self, raw: Option<&Value>) -> Self {
        let participant = match raw {
            None | Some(Value::Null) => None,
            Some(raw) => match validate_participant_within(raw, self.max_nickname_len) {
                Ok(p) => Some(p),
                Err(e) => {
                    warn!(field = %e.field, reason = %e.reason, "Rejected participant");
                    return self.clone();
                }
            },
        };

        let mut next = self.clone();
        next.room = next.room.take().map(|room| match &participant {
            Some(p) => room.mark_local(&p.id),
            None => Room {
                is_host: false,
                ..room
            },
        });
        next.participant = participant;
        next
    }

    /// Replace the current room; a malformed value is ignored
    pub fn set_room(&self, raw: Option<&Value>) -> Self {
        let room = match raw {
            None | Some(Value::Null) => None,
            Some(raw) => match validate_room(raw) {
                Ok(room) => Some(self.localize(room)),
                Err(e) => {
                    warn!(field = %e.field, reason = %e.reason, "Rejected room");
                    return self.clone();
                }
            },
        };

        let mut next = self.clone();
        if let Some(room) = &room {
            // Drop anything that arrived for a different room
            next.items.retain(|i| i.room_id == room.id);
            next.votes.retain(|_, b| b.room_id == room.id);
            if next
                .current_item
                .as_ref()
                .is_some_and(|i| i.room_id != room.id)
            {
                next.current_item = None;
                next.current_index = 0;
            }
        }
        next.room = room;
        next
    }

    /// Replace the room's participant list from a participant push
    pub fn set_participants(&self, raw: &Value) -> Self {
        let Some(room) = &self.room else {
            warn!("Participant list received without a room");
            return self.clone();
        };

        let mut room = room.clone();
        room.participants = validate_participants(raw);
        let mut next = self.clone();
        next.room = Some(self.localize(room));
        next
    }

    /// Replace the proposed items, keeping only well-formed entries
    pub fn set_items(&self, raw: &Value) -> Self {
        let Value::Array(list) = raw else {
            warn!("Item list is not an array, clearing items");
            let mut next = self.clone();
            next.items = Vec::new();
            return next;
        };

        let room_id = self.room.as_ref().map(|r| r.id.as_str());
        let items = list
            .iter()
            .enumerate()
            .filter_map(|(index, entry)| match validate_item(entry) {
                Ok(item) if room_id.is_some_and(|id| id != item.room_id) => {
                    warn!(index, item_id = %item.id, "Dropping item from another room");
                    None
                }
                Ok(item) => Some(item),
                Err(e) => {
                    warn!(index, field = %e.field, reason = %e.reason, "Dropping invalid item");
                    None
                }
            })
            .collect();

        let mut next = self.clone();
        next.items = dedupe_by_id(items, "item", |item| item.id.as_str());
        next
    }

    /// Select the item being swiped
    ///
    /// A malformed non-null item rejects the whole call. A non-numeric,
    /// negative or non-finite index becomes 0.
    pub fn set_current_item(&self, raw: Option<&Value>, index: &Value) -> Self {
        let item = match raw {
            None | Some(Value::Null) => None,
            Some(raw) => match validate_item(raw) {
                Ok(item) => Some(item),
                Err(e) => {
                    warn!(field = %e.field, reason = %e.reason, "Rejected current item");
                    return self.clone();
                }
            },
        };

        let mut next = self.clone();
        next.current_item = item;
        next.current_index = coerce_index(index);
        next
    }

    /// Store a ballot, replacing any earlier one for the same (participant, item)
    pub fn record_ballot(&self, raw: &Value) -> Self {
        let ballot = match validate_ballot(raw) {
            Ok(ballot) => ballot,
            Err(e) => {
                warn!(field = %e.field, reason = %e.reason, "Rejected ballot");
                return self.clone();
            }
        };

        if let Some(room) = &self.room {
            if room.id != ballot.room_id {
                warn!(ballot_id = %ballot.id, "Rejected ballot for another room");
                return self.clone();
            }
        }

        debug!(ballot_id = %ballot.id, decision = %ballot.decision, "Recording ballot");
        let mut next = self.clone();
        next.votes.insert(ballot.key(), ballot);
        next
    }

    /// Set a loading flag by name
    pub fn set_loading_flag(&self, key: &str, value: &Value) -> Self {
        let Ok(flag) = key.parse::<LoadingFlag>() else {
            warn!(key, "Unknown loading flag");
            return self.clone();
        };
        let Some(value) = value.as_bool() else {
            warn!(key, "Loading flag value is not a boolean");
            return self.clone();
        };

        let mut next = self.clone();
        next.loading.insert(flag, value);
        next
    }

    pub fn is_loading(&self, flag: LoadingFlag) -> bool {
        self.loading.get(&flag).copied().unwrap_or(false)
    }

    /// Back to the initial, empty state
    pub fn reset(&self) -> Self {
        Self::with_nickname_limit(self.max_nickname_len)
    }

    /// Ballot cast by the given participant on the given item
    pub fn ballot_for(&self, participant_id: &str, item_id: &str) -> Option<&Ballot> {
        self.votes.get(&BallotKey::new(participant_id, item_id))
    }

    /// Aggregate the stored ballots over the proposed items
    pub fn results(&self) -> Results {
        let results = compute_results(&self.items, self.votes.values());
        assert_results_partition(&results, &self.items);
        results
    }

    /// Derive host flags from the room's host id rather than trusting the payload
    fn localize(&self, mut room: Room) -> Room {
        for p in &mut room.participants {
            p.is_host = p.id == room.host_id;
        }
        match &self.participant {
            Some(p) => room.mark_local(&p.id),
            None => Room {
                is_host: false,
                ..room
            },
        }
    }
}

fn coerce_index(value: &Value) -> usize {
    value
        .as_f64()
        .filter(|n| n.is_finite() && *n >= 0.0)
        .map(|n| n as usize)
        .unwrap_or(0)
}

/// Shared holder of the current session snapshot
#[derive(Debug, Clone, Default)]
pub struct Store {
    state: Arc<Mutex<VoteState>>,
}

impl Store {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_state(state: VoteState) -> Self {
        Self {
            state: Arc::new(Mutex::new(state)),
        }
    }

    /// Run a reducer against the current snapshot and commit its result
    pub fn apply<F>(&self, reducer: F) -> VoteState
    where
        F: FnOnce(&VoteState) -> VoteState,
    {
        let mut state = self.lock();
        *state = reducer(&*state);
        assert_state_invariants(&state);
        state.clone()
    }

    pub fn snapshot(&self) -> VoteState {
        self.lock().clone()
    }

    fn lock(&self) -> MutexGuard<'_, VoteState> {
        // A panicked reducer leaves the previous snapshot intact
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Decision;
    use serde_json::json;

    fn participant() -> Value {
        json!({ "id": "u1", "nickname": "alice", "isAnonymous": true })
    }

    fn room() -> Value {
        json!({
            "id": "ROOM01",
            "hostId": "u1",
            "status": "lobby",
            "createdAt": "2024-05-01T12:00:00Z",
        })
    }

    fn item(id: &str) -> Value {
        json!({
            "id": id,
            "roomId": "ROOM01",
            "name": format!("Mod {}", id),
            "description": "desc",
            "proposedBy": "u1",
            "createdAt": "2024-05-01T12:00:00Z",
        })
    }

    fn ballot(participant: &str, item: &str, decision: &str) -> Value {
        json!({
            "id": format!("{}_{}", participant, item),
            "roomId": "ROOM01",
            "itemId": item,
            "participantId": participant,
            "decision": decision,
        })
    }

    #[test]
    fn test_set_participant_rejects_partial() {
        let state = VoteState::new().set_participant(Some(&participant()));
        let bad = json!({ "id": "u2", "nickname": "bob" });
        let next = state.set_participant(Some(&bad));
        assert_eq!(next.participant.as_ref().unwrap().id, "u1");

        let cleared = next.set_participant(None);
        assert!(cleared.participant.is_none());
    }

    #[test]
    fn test_set_room_derives_host_flag() {
        let state = VoteState::new()
            .set_participant(Some(&participant()))
            .set_room(Some(&room()));
        assert!(state.room.as_ref().unwrap().is_host);

        let mut spoofed = room();
        spoofed["hostId"] = json!("u9");
        spoofed["isHost"] = json!(true);
        let state = state.set_room(Some(&spoofed));
        assert!(!state.room.as_ref().unwrap().is_host);

        let unchanged = state.set_room(Some(&json!({ "id": "X" })));
        assert_eq!(unchanged.room, state.room);
    }

    #[test]
    fn test_set_items_non_array_is_empty() {
        let state = VoteState::new().set_items(&Value::Null);
        assert!(state.items.is_empty());

        let state = VoteState::new()
            .set_items(&json!([item("a")]))
            .set_items(&json!({ "a": item("a") }));
        assert!(state.items.is_empty());
    }

    #[test]
    fn test_set_items_filters_invalid() {
        let mut bad = item("b");
        bad["name"] = json!(7);
        let state = VoteState::new().set_items(&json!([item("a"), bad, "junk", item("c")]));
        let ids: Vec<_> = state.items.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "c"]);
    }

    #[test]
    fn test_set_items_drops_other_rooms() {
        let mut foreign = item("b");
        foreign["roomId"] = json!("OTHER1");
        let state = VoteState::new()
            .set_room(Some(&room()))
            .set_items(&json!([item("a"), foreign]));
        assert_eq!(state.items.len(), 1);
    }

    #[test]
    fn test_set_room_prunes_other_rooms() {
        let mut foreign = item("z");
        foreign["roomId"] = json!("OTHER1");
        let state = VoteState::new()
            .set_items(&json!([item("a"), foreign]))
            .set_room(Some(&room()));
        assert_eq!(state.items.len(), 1);
        assert_eq!(state.items[0].id, "a");
    }

    #[test]
    fn test_set_current_item() {
        let state = VoteState::new().set_current_item(Some(&item("a")), &json!(2));
        assert_eq!(state.current_item.as_ref().unwrap().id, "a");
        assert_eq!(state.current_index, 2);

        let rejected = state.set_current_item(Some(&json!({ "id": "b" })), &json!(5));
        assert_eq!(rejected.current_item.as_ref().unwrap().id, "a");
        assert_eq!(rejected.current_index, 2);

        for index in [json!("three"), json!(null), json!(-1), json!({})] {
            assert_eq!(state.set_current_item(None, &index).current_index, 0);
        }
    }

    #[test]
    fn test_record_ballot_last_write_wins() {
        let state = VoteState::new()
            .record_ballot(&ballot("u1", "m1", "like"))
            .record_ballot(&ballot("u1", "m1", "dislike"));
        assert_eq!(state.votes.len(), 1);
        let stored = state.ballot_for("u1", "m1").unwrap();
        assert_eq!(stored.id, "u1_m1");
        assert_eq!(stored.decision, Decision::Dislike);
    }

    #[test]
    fn test_record_ballot_rejects_invalid() {
        let state = VoteState::new().record_ballot(&ballot("u1", "m1", "like"));
        let next = state.record_ballot(&ballot("u2", "m1", "meh"));
        assert_eq!(next, state);
    }

    #[test]
    fn test_loading_flags() {
        let state = VoteState::new().set_loading_flag("items", &json!(true));
        assert!(state.is_loading(LoadingFlag::Items));

        let same = state
            .set_loading_flag("nonsense", &json!(true))
            .set_loading_flag("items", &json!("false"));
        assert_eq!(same, state);
    }

    #[test]
    fn test_reset() {
        let state = VoteState::new()
            .set_participant(Some(&participant()))
            .set_room(Some(&room()))
            .set_items(&json!([item("a")]))
            .record_ballot(&ballot("u1", "a", "like"))
            .set_loading_flag("room", &json!(true));
        assert_eq!(state.reset(), VoteState::new());
    }

    #[test]
    fn test_results_from_state() {
        let state = VoteState::new()
            .set_items(&json!([item("a"), item("b")]))
            .record_ballot(&ballot("u1", "a", "like"))
            .record_ballot(&ballot("u2", "b", "like"))
            .record_ballot(&ballot("u3", "b", "dislike"));
        let results = state.results();
        assert_eq!(results.approved.len(), 1);
        assert_eq!(results.controversial.len(), 1);
    }

    #[test]
    fn test_repeated_item_ids_partition_once() {
        let mut copy = item("a");
        copy["name"] = json!("Impostor");
        let state = VoteState::new()
            .set_room(Some(&room()))
            .set_items(&json!([item("a"), copy, item("b")]))
            .record_ballot(&ballot("u1", "a", "like"));
        assert_eq!(state.items.len(), 2);
        assert_eq!(state.items[0].name, "Mod a");

        let results = state.results();
        let ids: Vec<_> = results.iter().map(|r| r.item.id.as_str()).collect();
        assert_eq!(results.len(), 2);
        assert!(ids.contains(&"a") && ids.contains(&"b"));
    }

    #[test]
    fn test_room_with_repeated_host_entries() {
        let mut raw = room();
        raw["participants"] = json!([
            { "id": "u1", "nickname": "alice", "isHost": true, "isOnline": true, "joinedAt": 0 },
            { "id": "u1", "nickname": "alice", "isHost": true, "isOnline": true, "joinedAt": 0 },
        ]);
        let store = Store::new();
        let state = store.apply(|s| s.set_participant(Some(&participant())).set_room(Some(&raw)));
        let room = state.room.unwrap();
        assert_eq!(room.participants.len(), 1);
        assert!(room.is_host);
    }

    #[test]
    fn test_nickname_limit_is_configurable() {
        let long = json!({ "id": "u1", "nickname": "x".repeat(30), "isAnonymous": false });
        assert!(VoteState::new().set_participant(Some(&long)).participant.is_none());

        let state = VoteState::with_nickname_limit(40).set_participant(Some(&long));
        assert_eq!(state.participant.as_ref().unwrap().id, "u1");
        let state = state.reset().set_participant(Some(&long));
        assert!(state.participant.is_some());
    }

    #[test]
    fn test_store_apply() {
        let store = Store::new();
        store.apply(|s| s.set_items(&Value::Null));
        assert!(store.snapshot().items.is_empty());

        let other = store.clone();
        other.apply(|s| s.set_items(&json!([item("a")])));
        assert_eq!(store.snapshot().items.len(), 1);
    }
}
