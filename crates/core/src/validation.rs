//! Validation of externally-sourced records
//!
//! The backend is a schemaless store shared by every client in a room, so
//! any record it hands back may be malformed. Each validator takes one
//! loosely-typed `serde_json::Value` and returns the typed entity or a
//! [`ValidationError`] naming the offending field. Collection helpers drop
//! invalid entries with a warning instead of failing the whole batch.

use std::borrow::Cow;
use std::collections::HashSet;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde_json::Value;
use tracing::warn;

use crate::error::ValidationError;
use crate::models::{
    is_valid_room_code, Ballot, BallotKey, Decision, Item, ItemDraft, Participant,
    ParticipantRecord, Room, RoomSettings, RoomStatus, DEFAULT_MAX_NICKNAME_LEN,
};

type Validated<T> = std::result::Result<T, ValidationError>;

/// Validate a proposed item record
pub fn validate_item(raw: &Value) -> Validated<Item> {
    expect_object(raw)?;
    Ok(Item {
        id: require_str(raw, "id")?,
        room_id: require_str(raw, "roomId")?,
        name: require_str(raw, "name")?,
        description: require_str(raw, "description")?,
        url: optional_str(raw, "url")?,
        image: optional_str(raw, "image")?,
        proposed_by: require_str(raw, "proposedBy")?,
        created_at: require_timestamp(raw, "createdAt")?,
    })
}

/// Validate a participant-list entry, tagging it with its external id
pub fn validate_participant_record(raw: &Value, external_id: &str) -> Validated<ParticipantRecord> {
    expect_object(raw)?;
    if external_id.trim().is_empty() {
        return Err(ValidationError::new("id", "must be a non-empty string"));
    }
    Ok(ParticipantRecord {
        id: external_id.to_string(),
        nickname: require_str(raw, "nickname")?,
        is_host: require_bool(raw, "isHost")?,
        is_online: require_bool(raw, "isOnline")?,
        joined_at: require_timestamp(raw, "joinedAt")?,
    })
}

/// Validate a room record
///
/// The room code is read from `id`, falling back to `roomCode` as returned
/// by room creation and lookup.
pub fn validate_room(raw: &Value) -> Validated<Room> {
    expect_object(raw)?;
    let id = match field(raw, "id") {
        Some(_) => require_str(raw, "id")?,
        None if field(raw, "roomCode").is_some() => require_str(raw, "roomCode")?,
        None => return Err(ValidationError::missing("id")),
    };
    if !is_valid_room_code(&id) {
        return Err(ValidationError::new(
            "id",
            "must be uppercase letters and digits",
        ));
    }

    let status = require_str(raw, "status")?
        .parse::<RoomStatus>()
        .map_err(|e| ValidationError::new("status", e))?;

    let settings = match field(raw, "settings") {
        Some(value @ Value::Object(_)) => serde_json::from_value::<RoomSettings>(value.clone())
            .map_err(|e| ValidationError::new("settings", e.to_string()))?,
        Some(_) => return Err(ValidationError::new("settings", "must be an object")),
        None => RoomSettings::default(),
    };

    let participants = match field(raw, "participants") {
        Some(value) => validate_participants(value),
        None => Vec::new(),
    };

    Ok(Room {
        id,
        host_id: require_str(raw, "hostId")?,
        is_host: optional_bool(raw, "isHost")?.unwrap_or(false),
        participants,
        status,
        created_at: require_timestamp(raw, "createdAt")?,
        settings,
    })
}

/// Validate a ballot record
pub fn validate_ballot(raw: &Value) -> Validated<Ballot> {
    expect_object(raw)?;
    let id = require_str(raw, "id")?;
    let room_id = require_str(raw, "roomId")?;
    let item_id = require_str(raw, "itemId")?;
    let participant_id = require_str(raw, "participantId")?;

    let decision = match require_str(raw, "decision")?.as_str() {
        "like" => Decision::Like,
        "dislike" => Decision::Dislike,
        other => {
            return Err(ValidationError::new(
                "decision",
                format!("expected 'like' or 'dislike', got '{}'", other),
            ))
        }
    };

    let key = BallotKey::new(participant_id.as_str(), item_id.as_str());
    if id != key.to_string() {
        return Err(ValidationError::new(
            "id",
            format!("expected composite key '{}'", key),
        ));
    }

    let created_at = match field(raw, "createdAt") {
        Some(_) => require_timestamp(raw, "createdAt")?,
        None => DateTime::<Utc>::UNIX_EPOCH,
    };

    Ok(Ballot {
        id,
        room_id,
        item_id,
        participant_id,
        decision,
        comment: optional_str(raw, "comment")?,
        created_at,
    })
}

/// Validate the session participant identity
pub fn validate_participant(raw: &Value) -> Validated<Participant> {
    validate_participant_within(raw, DEFAULT_MAX_NICKNAME_LEN)
}

/// Validate the session participant identity against a nickname limit
pub fn validate_participant_within(raw: &Value, max_nickname_len: usize) -> Validated<Participant> {
    expect_object(raw)?;
    let id = require_str(raw, "id")?;
    let nickname = validate_nickname(&require_str(raw, "nickname")?, max_nickname_len)?;
    Ok(Participant {
        id,
        nickname,
        is_anonymous: require_bool(raw, "isAnonymous")?,
    })
}

/// Check a user-supplied nickname, returning it trimmed
pub fn validate_nickname(nickname: &str, max_len: usize) -> Validated<String> {
    let trimmed = nickname.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::new("nickname", "must not be empty"));
    }
    if trimmed.chars().count() > max_len {
        return Err(ValidationError::new(
            "nickname",
            format!("must be at most {} characters", max_len),
        ));
    }
    Ok(trimmed.to_string())
}

/// Check a user-entered item draft before it is sent to the backend
pub fn validate_draft(draft: &ItemDraft) -> Validated<ItemDraft> {
    let name = draft.name.trim();
    if name.is_empty() {
        return Err(ValidationError::new("name", "must not be empty"));
    }
    let description = draft.description.trim();
    if description.is_empty() {
        return Err(ValidationError::new("description", "must not be empty"));
    }

    let non_blank = |s: &Option<String>| {
        s.as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    };

    Ok(ItemDraft {
        name: name.to_string(),
        description: description.to_string(),
        url: non_blank(&draft.url),
        image: non_blank(&draft.image),
    })
}

/// Validate every entry of a pushed mapping (`id -> record`) or list
///
/// Lists are keyed by each record's `id` field, or by position when it has
/// none. `null` yields an empty collection; invalid entries are dropped
/// with a warning.
pub fn validate_collection<T, F>(raw: &Value, label: &str, mut validate: F) -> Vec<T>
where
    F: FnMut(&Value, &str) -> Validated<T>,
{
    let mut valid = Vec::new();
    let mut check = |key: &str, record: &Value| match validate(record, key) {
        Ok(entity) => valid.push(entity),
        Err(e) => warn!(kind = label, key = %key, field = %e.field, reason = %e.reason, "Dropping invalid record"),
    };

    match raw {
        Value::Null => {}
        Value::Object(map) => {
            for (key, record) in map {
                check(key, record);
            }
        }
        Value::Array(list) => {
            for (index, record) in list.iter().enumerate() {
                let key = match record.get("id").and_then(Value::as_str) {
                    Some(id) => id.to_string(),
                    None => index.to_string(),
                };
                check(&key, record);
            }
        }
        _ => warn!(kind = label, "Expected a mapping or list of records"),
    }

    valid
}

/// Validate an item-list push, defaulting each record's `id` from its key
///
/// Records repeating an earlier id are dropped.
pub fn validate_items(raw: &Value) -> Vec<Item> {
    let items = validate_collection(raw, "item", |record, key| {
        validate_item(&with_default_id(record, key))
    });
    dedupe_by_id(items, "item", |item| item.id.as_str())
}

/// Validate a ballot-list push
///
/// A record without an `id` gets its composite key. Only the last ballot
/// per key is kept.
pub fn validate_ballots(raw: &Value) -> Vec<Ballot> {
    let ballots = validate_collection(raw, "ballot", |record, _| {
        validate_ballot(&with_ballot_key(record))
    });

    let mut latest: Vec<Ballot> = Vec::with_capacity(ballots.len());
    for ballot in ballots {
        match latest.iter_mut().find(|b| b.id == ballot.id) {
            Some(slot) => *slot = ballot,
            None => latest.push(ballot),
        }
    }
    latest
}

/// Validate a participant-list push, keeping the first record per id
pub fn validate_participants(raw: &Value) -> Vec<ParticipantRecord> {
    let records = validate_collection(raw, "participant", validate_participant_record);
    dedupe_by_id(records, "participant", |p| p.id.as_str())
}

/// Keep the first record for each id, dropping the rest with a warning
pub fn dedupe_by_id<T, F>(records: Vec<T>, label: &str, id: F) -> Vec<T>
where
    F: Fn(&T) -> &str,
{
    let mut seen = HashSet::new();
    records
        .into_iter()
        .filter(|record| {
            let key = id(record);
            let first = seen.insert(key.to_string());
            if !first {
                warn!(kind = label, id = %key, "Dropping duplicate record");
            }
            first
        })
        .collect()
}

/// Parse a timestamp in any of the accepted shapes
///
/// Accepted: an RFC 3339 / ISO-8601 string, a number of milliseconds since
/// the Unix epoch, or a `{ "seconds", "nanoseconds" }` backend timestamp.
pub fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => parse_iso8601(s),
        Value::Number(n) => {
            if let Some(ms) = n.as_i64() {
                DateTime::from_timestamp_millis(ms)
            } else {
                n.as_f64()
                    .filter(|ms| ms.is_finite())
                    .and_then(|ms| DateTime::from_timestamp_millis(ms as i64))
            }
        }
        Value::Object(map) => {
            let seconds = map.get("seconds")?.as_i64()?;
            let nanos = match map.get("nanoseconds") {
                Some(n) => u32::try_from(n.as_u64()?).ok()?,
                None => 0,
            };
            DateTime::from_timestamp(seconds, nanos)
        }
        _ => None,
    }
}

fn parse_iso8601(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(naive.and_utc());
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

fn with_default_id<'a>(record: &'a Value, key: &str) -> Cow<'a, Value> {
    match record {
        Value::Object(map) if !map.contains_key("id") => {
            let mut map = map.clone();
            map.insert("id".to_string(), Value::String(key.to_string()));
            Cow::Owned(Value::Object(map))
        }
        _ => Cow::Borrowed(record),
    }
}

/// Fill a missing ballot `id` with `{participantId}_{itemId}`
fn with_ballot_key(record: &Value) -> Cow<'_, Value> {
    let (Value::Object(map), None) = (record, field(record, "id")) else {
        return Cow::Borrowed(record);
    };
    let participant = map.get("participantId").and_then(Value::as_str);
    let item = map.get("itemId").and_then(Value::as_str);
    match (participant, item) {
        (Some(participant), Some(item)) => {
            let mut map = map.clone();
            let key = BallotKey::new(participant, item).to_string();
            map.insert("id".to_string(), Value::String(key));
            Cow::Owned(Value::Object(map))
        }
        _ => Cow::Borrowed(record),
    }
}

fn expect_object(raw: &Value) -> Validated<()> {
    if raw.is_object() {
        Ok(())
    } else {
        Err(ValidationError::new("record", "expected an object"))
    }
}

/// Look up a field, treating `null` as absent
fn field<'a>(raw: &'a Value, name: &str) -> Option<&'a Value> {
    raw.get(name).filter(|v| !v.is_null())
}

fn require_str(raw: &Value, name: &str) -> Validated<String> {
    match field(raw, name) {
        Some(Value::String(s)) if !s.trim().is_empty() => Ok(s.clone()),
        Some(Value::String(_)) => Err(ValidationError::new(name, "must not be empty")),
        Some(_) => Err(ValidationError::new(name, "must be a string")),
        None => Err(ValidationError::missing(name)),
    }
}

fn optional_str(raw: &Value, name: &str) -> Validated<Option<String>> {
    match field(raw, name) {
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(_) => Err(ValidationError::new(name, "must be a string")),
        None => Ok(None),
    }
}

fn require_bool(raw: &Value, name: &str) -> Validated<bool> {
    optional_bool(raw, name)?.ok_or_else(|| ValidationError::missing(name))
}

fn optional_bool(raw: &Value, name: &str) -> Validated<Option<bool>> {
    match field(raw, name) {
        Some(Value::Bool(b)) => Ok(Some(*b)),
        Some(_) => Err(ValidationError::new(name, "must be a boolean")),
        None => Ok(None),
    }
}

fn require_timestamp(raw: &Value, name: &str) -> Validated<DateTime<Utc>> {
    let value = field(raw, name).ok_or_else(|| ValidationError::missing(name))?;
    parse_timestamp(value).ok_or_else(|| ValidationError::new(name, "must be a valid date"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn item_json() -> Value {
        json!({
            "id": "m1",
            "roomId": "ABC123",
            "name": "Better Inventory",
            "description": "Sorts your stuff",
            "url": "https://example.com/mod",
            "proposedBy": "u1",
            "createdAt": "2024-05-01T12:00:00Z",
        })
    }

    #[test]
    fn test_validate_item() {
        let item = validate_item(&item_json()).unwrap();
        assert_eq!(item.id, "m1");
        assert_eq!(item.url.as_deref(), Some("https://example.com/mod"));
        assert_eq!(item.image, None);
    }

    #[test]
    fn test_item_empty_name_rejected() {
        let raw = json!({
            "id": "1",
            "roomId": "r",
            "name": "",
            "description": "d",
            "proposedBy": "u",
            "createdAt": 1_714_564_800_000_i64,
        });
        let err = validate_item(&raw).unwrap_err();
        assert_eq!(err.field, "name");
    }

    #[test]
    fn test_item_field_types() {
        let mut raw = item_json();
        raw["image"] = json!(42);
        assert_eq!(validate_item(&raw).unwrap_err().field, "image");

        let mut raw = item_json();
        raw["createdAt"] = json!("not a date");
        assert_eq!(validate_item(&raw).unwrap_err().field, "createdAt");

        let mut raw = item_json();
        raw["url"] = Value::Null;
        assert_eq!(validate_item(&raw).unwrap().url, None);

        assert_eq!(validate_item(&json!("m1")).unwrap_err().field, "record");
    }

    #[test]
    fn test_item_validation_idempotent() {
        let item = validate_item(&item_json()).unwrap();
        let again = validate_item(&serde_json::to_value(&item).unwrap()).unwrap();
        assert_eq!(item, again);
    }

    #[test]
    fn test_timestamp_shapes() {
        let expected = DateTime::parse_from_rfc3339("2024-05-01T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(parse_timestamp(&json!("2024-05-01T12:00:00Z")), Some(expected));
        assert_eq!(parse_timestamp(&json!("2024-05-01T12:00:00")), Some(expected));
        assert_eq!(parse_timestamp(&json!(1_714_564_800_000_i64)), Some(expected));
        assert_eq!(
            parse_timestamp(&json!({ "seconds": 1_714_564_800_i64, "nanoseconds": 0 })),
            Some(expected)
        );
        assert!(parse_timestamp(&json!("2024-05-01")).is_some());
        assert!(parse_timestamp(&json!("yesterday")).is_none());
        assert!(parse_timestamp(&json!(true)).is_none());
    }

    #[test]
    fn test_validate_participant_record() {
        let raw = json!({
            "nickname": "alice",
            "isHost": true,
            "isOnline": false,
            "joinedAt": "2024-05-01T12:00:00Z",
        });
        let record = validate_participant_record(&raw, "u1").unwrap();
        assert_eq!(record.id, "u1");
        assert!(record.is_host);
        assert!(!record.is_online);

        let bad = json!({ "nickname": "bob", "isHost": "yes", "isOnline": true, "joinedAt": 0 });
        assert_eq!(validate_participant_record(&bad, "u2").unwrap_err().field, "isHost");
    }

    #[test]
    fn test_validate_room() {
        let raw = json!({
            "roomCode": "ABC123",
            "hostId": "u1",
            "status": "voting",
            "createdAt": "2024-05-01T12:00:00Z",
            "settings": { "allowComments": false },
        });
        let room = validate_room(&raw).unwrap();
        assert_eq!(room.id, "ABC123");
        assert_eq!(room.status, RoomStatus::Voting);
        assert!(!room.settings.allow_comments);
        assert!(!room.is_host);

        let mut bad = raw.clone();
        bad["status"] = json!("closed");
        assert_eq!(validate_room(&bad).unwrap_err().field, "status");

        let again = validate_room(&serde_json::to_value(&room).unwrap()).unwrap();
        assert_eq!(room, again);
    }

    #[test]
    fn test_validate_ballot() {
        let raw = json!({
            "id": "u1_m1",
            "roomId": "ABC123",
            "itemId": "m1",
            "participantId": "u1",
            "decision": "dislike",
            "comment": "meh",
        });
        let ballot = validate_ballot(&raw).unwrap();
        assert_eq!(ballot.decision, Decision::Dislike);
        assert_eq!(ballot.comment.as_deref(), Some("meh"));

        let mut bad = raw.clone();
        bad["decision"] = json!("maybe");
        assert_eq!(validate_ballot(&bad).unwrap_err().field, "decision");

        let mut bad = raw;
        bad["id"] = json!("u2_m1");
        assert_eq!(validate_ballot(&bad).unwrap_err().field, "id");
    }

    #[test]
    fn test_validate_participant_nickname_bounds() {
        let ok = json!({ "id": "u1", "nickname": "  alice ", "isAnonymous": true });
        assert_eq!(validate_participant(&ok).unwrap().nickname, "alice");

        let long = "x".repeat(DEFAULT_MAX_NICKNAME_LEN + 1);
        let bad = json!({ "id": "u1", "nickname": long, "isAnonymous": true });
        assert_eq!(validate_participant(&bad).unwrap_err().field, "nickname");
    }

    #[test]
    fn test_collection_drops_invalid_entries() {
        let mut mapping = serde_json::Map::new();
        for i in 0..50 {
            let mut record = item_json();
            record.as_object_mut().unwrap().remove("id");
            if i == 7 {
                record["description"] = json!("");
            }
            mapping.insert(format!("m{}", i), record);
        }
        let items = validate_items(&Value::Object(mapping));
        assert_eq!(items.len(), 49);
        assert!(items.iter().all(|i| i.id != "m7"));
        assert!(items.iter().any(|i| i.id == "m8"));
    }

    #[test]
    fn test_collection_edge_inputs() {
        assert!(validate_items(&Value::Null).is_empty());
        assert!(validate_items(&json!("oops")).is_empty());
        assert_eq!(validate_items(&json!([item_json()])).len(), 1);
    }

    #[test]
    fn test_items_keep_first_of_repeated_id() {
        let mut copy = item_json();
        copy["name"] = json!("Impostor");
        let items = validate_items(&json!({ "a": item_json(), "b": copy }));
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].name, "Better Inventory");
    }

    #[test]
    fn test_ballot_list_without_ids() {
        let raw = json!([
            { "roomId": "ABC123", "itemId": "m1", "participantId": "u1", "decision": "like", "createdAt": 0 },
            { "roomId": "ABC123", "itemId": "m2", "participantId": "u1", "decision": "dislike", "createdAt": 0 },
            { "roomId": "ABC123", "itemId": "m1", "participantId": "u1", "decision": "dislike", "createdAt": 0 },
        ]);
        let ballots = validate_ballots(&raw);
        assert_eq!(ballots.len(), 2);
        assert_eq!(ballots[0].id, "u1_m1");
        assert_eq!(ballots[0].decision, Decision::Dislike);
        assert_eq!(ballots[1].id, "u1_m2");

        let mut mapping = serde_json::Map::new();
        mapping.insert("whatever".into(), raw[1].clone());
        assert_eq!(validate_ballots(&Value::Object(mapping))[0].id, "u1_m2");
    }

    #[test]
    fn test_room_participants_deduped() {
        let raw = json!({
            "id": "ABC123",
            "hostId": "u1",
            "status": "lobby",
            "createdAt": 0,
            "participants": [
                { "id": "u1", "nickname": "alice", "isHost": true, "isOnline": true, "joinedAt": 0 },
                { "id": "u1", "nickname": "again", "isHost": true, "isOnline": true, "joinedAt": 0 },
                { "id": "u2", "nickname": "bob", "isHost": false, "isOnline": true, "joinedAt": 0 },
            ],
        });
        let room = validate_room(&raw).unwrap();
        assert_eq!(room.participants.len(), 2);
        assert_eq!(room.participants[0].nickname, "alice");
    }

    #[test]
    fn test_room_code_shape() {
        let mut raw = json!({
            "id": "abc/12",
            "hostId": "u1",
            "status": "lobby",
            "createdAt": 0,
        });
        assert_eq!(validate_room(&raw).unwrap_err().field, "id");
        raw["id"] = json!("ABC123");
        assert!(validate_room(&raw).is_ok());
    }

    #[test]
    fn test_participant_nickname_limit() {
        let raw = json!({ "id": "u1", "nickname": "x".repeat(30), "isAnonymous": false });
        assert!(validate_participant(&raw).is_err());
        assert_eq!(validate_participant_within(&raw, 40).unwrap().nickname.len(), 30);
    }

    #[test]
    fn test_validate_draft() {
        let draft = ItemDraft::new("  Name ", "Desc").with_url("   ");
        let clean = validate_draft(&draft).unwrap();
        assert_eq!(clean.name, "Name");
        assert_eq!(clean.url, None);

        assert_eq!(
            validate_draft(&ItemDraft::new("Name", " ")).unwrap_err().field,
            "description"
        );
    }
}
