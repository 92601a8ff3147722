//! Room session for the app
//!
//! Binds the room's realtime subscriptions into a [`Store`] and drives the
//! local participant through proposing, swiping and results.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use modvote_core::{
    Ballot, Decision, Item, ItemDraft, LoadingFlag, Participant, Result, Results, ResultsExport,
    RoomStatus, Store, VoteState,
};
use modvote_sync::{Backend, RoomService, Subscription};
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

/// A participant's live view of one room
pub struct RoomSession<B: Backend> {
    service: RoomService<B>,
    store: Store,
    participant: Participant,
    room_code: String,
    /// Cleared on dispose; callbacks check it before touching the store
    alive: Arc<AtomicBool>,
    subscriptions: Vec<Subscription>,
}

impl<B: Backend> RoomSession<B> {
    /// Create a room and open a session as its host
    pub async fn host(service: RoomService<B>, participant: Participant) -> Result<Self> {
        let room = service
            .create_room(&participant.id, &participant.nickname)
            .await?;
        Self::open(service, participant, room.id).await
    }

    /// Join a room by code and open a session in it
    pub async fn join(
        service: RoomService<B>,
        participant: Participant,
        room_code: &str,
    ) -> Result<Self> {
        let room = service
            .join_room(room_code, &participant.id, &participant.nickname)
            .await?;
        Self::open(service, participant, room.id).await
    }

    async fn open(service: RoomService<B>, participant: Participant, room_code: String) -> Result<Self> {
        let store = Store::with_state(VoteState::with_nickname_limit(service.max_nickname_len()));
        store.apply(|s| {
            [LoadingFlag::Room, LoadingFlag::Items]
                .iter()
                .fold(s.clone(), |acc, flag| acc.set_loading_flag(flag.as_str(), &json!(true)))
        });

        let room = service.fetch_room(&room_code, &participant.id).await?;
        let participant_raw = to_value(&participant)?;
        let room_raw = to_value(&room)?;
        store.apply(|s| {
            s.set_participant(Some(&participant_raw))
                .set_room(Some(&room_raw))
                .set_loading_flag(LoadingFlag::Room.as_str(), &json!(false))
        });

        let mut session = Self {
            service,
            store,
            participant,
            room_code,
            alive: Arc::new(AtomicBool::new(true)),
            subscriptions: Vec::new(),
        };
        session.subscribe().await;
        info!(room_code = %session.room_code, "Session opened");
        Ok(session)
    }

    async fn subscribe(&mut self) {
        let (store, alive) = (self.store.clone(), self.alive.clone());
        let participants = self
            .service
            .subscribe_participants(&self.room_code, move |list| {
                apply_live(&store, &alive, &list, |s, raw| s.set_participants(raw));
            })
            .await;

        let (store, alive) = (self.store.clone(), self.alive.clone());
        let items = self
            .service
            .subscribe_items(&self.room_code, move |items| {
                apply_live(&store, &alive, &items, |s, raw| {
                    s.set_items(raw)
                        .set_loading_flag(LoadingFlag::Items.as_str(), &json!(false))
                });
            })
            .await;

        let (store, alive) = (self.store.clone(), self.alive.clone());
        let ballots = self
            .service
            .subscribe_ballots(&self.room_code, move |ballots: Vec<Ballot>| {
                apply_live(&store, &alive, &ballots, |s, raw| {
                    let list = raw.as_array().map(Vec::as_slice).unwrap_or_default();
                    list.iter().fold(s.clone(), |acc, b| acc.record_ballot(b))
                });
            })
            .await;

        self.subscriptions = vec![participants, items, ballots];
    }

    pub fn room_code(&self) -> &str {
        &self.room_code
    }

    pub fn participant(&self) -> &Participant {
        &self.participant
    }

    pub fn snapshot(&self) -> VoteState {
        self.store.snapshot()
    }

    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    /// Re-read the room document, picking up status changes
    pub async fn refresh_room(&self) -> Result<()> {
        let room = self
            .service
            .fetch_room(&self.room_code, &self.participant.id)
            .await?;
        let raw = to_value(&room)?;
        self.store.apply(|s| s.set_room(Some(&raw)));
        Ok(())
    }

    pub async fn propose(&self, draft: ItemDraft) -> Result<Item> {
        self.service
            .propose_item(&self.room_code, &self.participant.id, draft)
            .await
    }

    /// Host only: move the room to `status`
    pub async fn advance(&self, status: RoomStatus) -> Result<()> {
        let room = self
            .service
            .change_room_status(&self.room_code, &self.participant.id, status)
            .await?;
        let raw = to_value(&room)?;
        self.store.apply(|s| s.set_room(Some(&raw)));
        Ok(())
    }

    /// Pick the first item this participant has not voted on yet
    ///
    /// Returns `None` once every item has a ballot.
    pub fn next_item(&self) -> Option<Item> {
        let state = self.store.snapshot();
        let next = state
            .items
            .iter()
            .enumerate()
            .find(|(_, item)| state.ballot_for(&self.participant.id, &item.id).is_none());

        let (index, raw) = match next {
            Some((index, item)) => (index, serde_json::to_value(item).ok()),
            None => (state.items.len(), None),
        };
        let state = self
            .store
            .apply(|s| s.set_current_item(raw.as_ref(), &json!(index)));
        state.current_item
    }

    /// Vote on an item and record the ballot locally
    pub async fn swipe(
        &self,
        item_id: &str,
        decision: Decision,
        comment: Option<String>,
    ) -> Result<Ballot> {
        let ballot = self
            .service
            .cast_ballot(&self.room_code, item_id, &self.participant.id, decision, comment)
            .await?;
        let raw = to_value(&ballot)?;
        self.store.apply(|s| s.record_ballot(&raw));
        Ok(ballot)
    }

    pub fn results(&self) -> Results {
        self.store.snapshot().results()
    }

    pub fn export(&self) -> ResultsExport {
        ResultsExport::from_results(&self.room_code, &self.results())
    }

    /// Tear the session down: stop callbacks and mark the participant offline
    pub async fn dispose(&mut self) {
        if !self.alive.swap(false, Ordering::SeqCst) {
            return;
        }
        for sub in self.subscriptions.drain(..) {
            sub.unsubscribe();
        }
        if let Err(e) = self
            .service
            .set_presence(&self.room_code, &self.participant.id, false)
            .await
        {
            warn!(room_code = %self.room_code, error = %e, "Failed to mark participant offline");
        }
        info!(room_code = %self.room_code, "Session disposed");
    }
}

/// Apply a pushed list to the store unless the session has been disposed
fn apply_live<T, F>(store: &Store, alive: &AtomicBool, list: &[T], reducer: F)
where
    T: Serialize,
    F: FnOnce(&VoteState, &Value) -> VoteState,
{
    if !alive.load(Ordering::SeqCst) {
        debug!("Ignoring push for a disposed session");
        return;
    }
    match serde_json::to_value(list) {
        Ok(raw) => {
            store.apply(|s| reducer(s, &raw));
        }
        Err(e) => warn!(error = %e, "Failed to encode pushed records"),
    }
}

fn to_value<T: Serialize>(value: &T) -> Result<Value> {
    Ok(serde_json::to_value(value)?)
}
