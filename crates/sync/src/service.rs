//! Room operations against the backend
//!
//! Every call that touches the backend goes through [`with_retry`]; every
//! document read back is validated before it is returned.

use std::sync::Arc;

use chrono::Utc;
use modvote_core::invariants::assert_ballot_invariants;
use modvote_core::validation::{
    validate_ballots, validate_draft, validate_item, validate_items, validate_nickname,
    validate_participants, validate_room,
};
use modvote_core::{
    generate_room_code, is_valid_room_code, normalize_room_code, Ballot, Decision, Error,
    ErrorKind, Item, ItemDraft, ParticipantRecord, PermissionMatrix, Result, Room, RoomAction,
    RoomSettings, RoomStatus, Settings, ValidationError,
};
use serde_json::{json, Map, Value};
use tracing::{info, instrument, warn};

use crate::backend::{paths, Backend};
use crate::retry::{with_retry, RetryOptions};
use crate::subscription::Subscription;

/// Attempts at finding an unused room code
const MAX_CODE_ATTEMPTS: usize = 5;

/// Client-side room operations
pub struct RoomService<B: Backend> {
    backend: Arc<B>,
    retry: RetryOptions,
    max_nickname_len: usize,
    room_code_len: usize,
}

impl<B: Backend> Clone for RoomService<B> {
    fn clone(&self) -> Self {
        Self {
            backend: self.backend.clone(),
            retry: self.retry.clone(),
            max_nickname_len: self.max_nickname_len,
            room_code_len: self.room_code_len,
        }
    }
}

impl<B: Backend> RoomService<B> {
    pub fn new(backend: Arc<B>) -> Self {
        Self::with_settings(backend, &Settings::default())
    }

    pub fn with_settings(backend: Arc<B>, settings: &Settings) -> Self {
        Self {
            backend,
            retry: RetryOptions::from(&settings.retry),
            max_nickname_len: settings.max_nickname_len,
            room_code_len: settings.room_code_len,
        }
    }

    pub fn with_retry_options(mut self, retry: RetryOptions) -> Self {
        self.retry = retry;
        self
    }

    pub fn backend(&self) -> &Arc<B> {
        &self.backend
    }

    /// Longest nickname, in characters, this service accepts
    pub fn max_nickname_len(&self) -> usize {
        self.max_nickname_len
    }

    /// Create a room hosted by `host_id` with default settings
    pub async fn create_room(&self, host_id: &str, nickname: &str) -> Result<Room> {
        self.create_room_with_settings(host_id, nickname, RoomSettings::default())
            .await
    }

    /// Create a room under a fresh random code and register its host
    #[instrument(skip(self, settings))]
    pub async fn create_room_with_settings(
        &self,
        host_id: &str,
        nickname: &str,
        settings: RoomSettings,
    ) -> Result<Room> {
        require_id("hostId", host_id)?;
        let nickname = validate_nickname(nickname, self.max_nickname_len)?;

        let mut code = None;
        for _ in 0..MAX_CODE_ATTEMPTS {
            let candidate = generate_room_code(self.room_code_len);
            let path = paths::room(&candidate);
            let doc = json!({
                "roomCode": candidate,
                "hostId": host_id,
                "createdAt": Utc::now().to_rfc3339(),
                "status": RoomStatus::Lobby.as_str(),
                "settings": settings,
            });

            match with_retry(|| self.backend.create(&path, doc.clone()), "create_room", &self.retry)
                .await
            {
                Ok(()) => {
                    code = Some(candidate);
                    break;
                }
                Err(e) if e.kind() == Some(ErrorKind::AlreadyExists) => {
                    warn!(room_code = %candidate, "Room code taken, trying another");
                }
                Err(e) => return Err(e),
            }
        }

        let code = code.ok_or_else(|| {
            Error::infra(ErrorKind::AlreadyExists, "could not find a free room code")
        })?;

        self.write_participant(&code, host_id, &nickname, true, None)
            .await?;
        info!(room_code = %code, "Room created");
        self.fetch_room(&code, host_id).await
    }

    /// Join an existing room by code
    #[instrument(skip(self))]
    pub async fn join_room(
        &self,
        room_code: &str,
        participant_id: &str,
        nickname: &str,
    ) -> Result<Room> {
        require_id("participantId", participant_id)?;
        let nickname = validate_nickname(nickname, self.max_nickname_len)?;
        let code = checked_code(room_code)?;

        let room = self.load_room(&code).await?;

        // Rejoining keeps the original join time
        let existing = self
            .get_doc(&paths::participant(&code, participant_id), "join_room")
            .await?
            .and_then(|raw| raw.get("joinedAt").cloned());

        self.write_participant(
            &code,
            participant_id,
            &nickname,
            room.host_id == participant_id,
            existing,
        )
        .await?;
        info!(room_code = %code, "Joined room");
        self.fetch_room(&code, participant_id).await
    }

    /// Load a room with its participant list, as seen by `viewer_id`
    #[instrument(skip(self))]
    pub async fn fetch_room(&self, room_code: &str, viewer_id: &str) -> Result<Room> {
        let room_code = &checked_code(room_code)?;
        let mut room = self.load_room(room_code).await?;
        let raw = self
            .list_docs(&paths::participants(room_code), "fetch_room")
            .await?;
        room.participants = validate_participants(&Value::Object(raw));
        for p in &mut room.participants {
            p.is_host = p.id == room.host_id;
        }
        Ok(room.mark_local(viewer_id))
    }

    /// Receive the participant list of a room on every change
    pub async fn subscribe_participants<F>(&self, room_code: &str, mut callback: F) -> Subscription
    where
        F: FnMut(Vec<ParticipantRecord>) + Send + 'static,
    {
        let Some(code) = subscribable_code(room_code) else {
            return Subscription::noop();
        };
        let collection = paths::participants(&code);
        match self.watch(&collection).await {
            Some(rx) => Subscription::spawn("participants", rx, move |snapshot| {
                callback(validate_participants(snapshot))
            }),
            None => Subscription::noop(),
        }
    }

    /// Receive the proposed items of a room on every change, oldest first
    pub async fn subscribe_items<F>(&self, room_code: &str, mut callback: F) -> Subscription
    where
        F: FnMut(Vec<Item>) + Send + 'static,
    {
        let Some(code) = subscribable_code(room_code) else {
            return Subscription::noop();
        };
        let collection = paths::items(&code);
        match self.watch(&collection).await {
            Some(rx) => Subscription::spawn("items", rx, move |snapshot| {
                callback(sorted_items(validate_items(snapshot)))
            }),
            None => Subscription::noop(),
        }
    }

    /// Receive the ballots of a room on every change
    pub async fn subscribe_ballots<F>(&self, room_code: &str, mut callback: F) -> Subscription
    where
        F: FnMut(Vec<Ballot>) + Send + 'static,
    {
        let Some(code) = subscribable_code(room_code) else {
            return Subscription::noop();
        };
        let collection = paths::ballots(&code);
        match self.watch(&collection).await {
            Some(rx) => Subscription::spawn("ballots", rx, move |snapshot| {
                callback(validate_ballots(snapshot))
            }),
            None => Subscription::noop(),
        }
    }

    /// Proposed items of a room, oldest first
    #[instrument(skip(self))]
    pub async fn fetch_items(&self, room_code: &str) -> Result<Vec<Item>> {
        let room_code = &checked_code(room_code)?;
        let raw = self.list_docs(&paths::items(room_code), "fetch_items").await?;
        Ok(sorted_items(validate_items(&Value::Object(raw))))
    }

    /// Ballots cast in a room
    #[instrument(skip(self))]
    pub async fn fetch_ballots(&self, room_code: &str) -> Result<Vec<Ballot>> {
        let room_code = &checked_code(room_code)?;
        let raw = self
            .list_docs(&paths::ballots(room_code), "fetch_ballots")
            .await?;
        Ok(validate_ballots(&Value::Object(raw)))
    }

    /// Propose a new item while the room is in its lobby
    #[instrument(skip(self, draft))]
    pub async fn propose_item(
        &self,
        room_code: &str,
        participant_id: &str,
        draft: ItemDraft,
    ) -> Result<Item> {
        let room_code = &checked_code(room_code)?;
        require_id("participantId", participant_id)?;
        let draft = validate_draft(&draft)?;
        let room = self.load_room(room_code).await?;
        self.require_member(room_code, participant_id).await?;
        require_action(&room, participant_id, RoomAction::ProposeItem)?;

        if let Some(cap) = room.settings.max_items_per_participant {
            let proposed = self
                .fetch_items(room_code)
                .await?
                .iter()
                .filter(|i| i.proposed_by == participant_id)
                .count();
            if proposed >= cap as usize {
                return Err(Error::infra(
                    ErrorKind::FailedPrecondition,
                    format!("proposal limit of {} reached", cap),
                ));
            }
        }

        let item = Item::from_draft(room.id.clone(), participant_id.to_string(), draft);
        let doc = serde_json::to_value(&item)?;
        let path = paths::item(room_code, &item.id);
        with_retry(|| self.backend.create(&path, doc.clone()), "propose_item", &self.retry).await?;

        info!(room_code = %room_code, item_id = %item.id, "Item proposed");
        Ok(item)
    }

    /// Cast or replace a ballot on an item while the room is voting
    #[instrument(skip(self, comment))]
    pub async fn cast_ballot(
        &self,
        room_code: &str,
        item_id: &str,
        participant_id: &str,
        decision: Decision,
        comment: Option<String>,
    ) -> Result<Ballot> {
        let room_code = &checked_code(room_code)?;
        require_item_id(item_id)?;
        require_id("participantId", participant_id)?;
        let room = self.load_room(room_code).await?;
        self.require_member(room_code, participant_id).await?;
        require_action(&room, participant_id, RoomAction::CastBallot)?;

        let item = match self
            .get_doc(&paths::item(room_code, item_id), "cast_ballot")
            .await?
        {
            Some(raw) => validate_item(&raw)?,
            None => return Err(item_not_found(item_id)),
        };
        // A document whose contents disagree with its path is not this item
        if item.id != item_id || item.room_id != room.id {
            warn!(item_id, "Item document does not match its path");
            return Err(item_not_found(item_id));
        }

        let comment = comment
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty() && room.settings.allow_comments);
        let ballot = Ballot::new(
            room.id.clone(),
            item.id.clone(),
            participant_id.to_string(),
            decision,
            comment,
        );
        assert_ballot_invariants(&ballot, std::slice::from_ref(&item));

        let doc = serde_json::to_value(&ballot)?;
        let path = paths::ballot(room_code, &ballot.id);
        with_retry(|| self.backend.set(&path, doc.clone()), "cast_ballot", &self.retry).await?;
        Ok(ballot)
    }

    /// Move a room to its next status; host only
    #[instrument(skip(self))]
    pub async fn change_room_status(
        &self,
        room_code: &str,
        actor_id: &str,
        status: RoomStatus,
    ) -> Result<Room> {
        let room_code = &checked_code(room_code)?;
        let room = self.load_room(room_code).await?;
        if room.host_id != actor_id {
            return Err(Error::infra(
                ErrorKind::PermissionDenied,
                "only the host can change the room status",
            ));
        }
        require_action(&room, actor_id, RoomAction::for_transition(status))?;

        let mut fields = Map::new();
        fields.insert("status".to_string(), json!(status.as_str()));
        let path = paths::room(room_code);
        with_retry(
            || self.backend.update(&path, fields.clone()),
            "change_room_status",
            &self.retry,
        )
        .await?;

        info!(room_code = %room_code, from = %room.status, to = %status, "Room status changed");
        self.fetch_room(room_code, actor_id).await
    }

    /// Mark a participant online or offline
    #[instrument(skip(self))]
    pub async fn set_presence(&self, room_code: &str, participant_id: &str, online: bool) -> Result<()> {
        let room_code = &checked_code(room_code)?;
        require_id("participantId", participant_id)?;
        let mut fields = Map::new();
        fields.insert("isOnline".to_string(), json!(online));
        let path = paths::participant(room_code, participant_id);
        with_retry(|| self.backend.update(&path, fields.clone()), "set_presence", &self.retry).await
    }

    async fn load_room(&self, room_code: &str) -> Result<Room> {
        match self.get_doc(&paths::room(room_code), "load_room").await? {
            Some(raw) => {
                let room = validate_room(&raw)?;
                if room.id != room_code {
                    warn!(room_code, stored = %room.id, "Room document does not match its path");
                    return Err(Error::infra(ErrorKind::NotFound, "room not found"));
                }
                Ok(room)
            }
            None => Err(Error::infra(ErrorKind::NotFound, "room not found")),
        }
    }

    async fn require_member(&self, room_code: &str, participant_id: &str) -> Result<()> {
        let path = paths::participant(room_code, participant_id);
        match self.get_doc(&path, "require_member").await? {
            Some(_) => Ok(()),
            None => Err(Error::infra(
                ErrorKind::PermissionDenied,
                "participant has not joined this room",
            )),
        }
    }

    async fn write_participant(
        &self,
        room_code: &str,
        participant_id: &str,
        nickname: &str,
        is_host: bool,
        joined_at: Option<Value>,
    ) -> Result<()> {
        let doc = json!({
            "nickname": nickname,
            "isHost": is_host,
            "isOnline": true,
            "joinedAt": joined_at.unwrap_or_else(|| json!(Utc::now().to_rfc3339())),
        });
        let path = paths::participant(room_code, participant_id);
        with_retry(|| self.backend.set(&path, doc.clone()), "write_participant", &self.retry).await
    }

    async fn get_doc(&self, path: &str, label: &str) -> Result<Option<Value>> {
        with_retry(|| self.backend.get(path), label, &self.retry).await
    }

    async fn list_docs(&self, collection: &str, label: &str) -> Result<Map<String, Value>> {
        with_retry(|| self.backend.list(collection), label, &self.retry).await
    }

    async fn watch(&self, collection: &str) -> Option<crate::backend::Watch> {
        match with_retry(|| self.backend.watch(collection), "watch", &self.retry).await {
            Ok(rx) => Some(rx),
            Err(e) => {
                warn!(collection, error = %e, "Subscription setup failed");
                None
            }
        }
    }
}

/// Normalize a user-entered room code and check its shape
fn checked_code(room_code: &str) -> Result<String> {
    let code = normalize_room_code(room_code);
    if !is_valid_room_code(&code) {
        return Err(ValidationError::new("roomCode", "must be letters and digits").into());
    }
    Ok(code)
}

fn subscribable_code(room_code: &str) -> Option<String> {
    match checked_code(room_code) {
        Ok(code) => Some(code),
        Err(e) => {
            warn!(room_code, error = %e, "Not subscribing to an invalid room code");
            None
        }
    }
}

/// Ids become path segments, so they must not contain `/`
fn require_id(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(ValidationError::new(field, "must not be empty").into());
    }
    if value.contains('/') {
        return Err(ValidationError::new(field, "must not contain '/'").into());
    }
    Ok(())
}

/// Item ids must also be free of `_` so a ballot key splits at its last `_`
fn require_item_id(item_id: &str) -> Result<()> {
    require_id("itemId", item_id)?;
    if item_id.contains('_') {
        return Err(ValidationError::new("itemId", "must not contain '_'").into());
    }
    Ok(())
}

fn item_not_found(item_id: &str) -> Error {
    Error::infra(ErrorKind::NotFound, format!("item {} not found", item_id))
}

fn require_action(room: &Room, participant_id: &str, action: RoomAction) -> Result<()> {
    let is_host = room.host_id == participant_id;
    if PermissionMatrix::can_perform(room.status, is_host, action) {
        return Ok(());
    }
    if PermissionMatrix::host_only(action) && !is_host {
        return Err(Error::infra(
            ErrorKind::PermissionDenied,
            format!("{:?} requires the host", action),
        ));
    }
    Err(Error::infra(
        ErrorKind::FailedPrecondition,
        format!("{:?} is not allowed while the room is in {}", action, room.status),
    ))
}

fn sorted_items(mut items: Vec<Item>) -> Vec<Item> {
    items.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
    items
}
