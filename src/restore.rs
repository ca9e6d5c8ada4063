// Bulk restore for disaster recovery
// Accepts the JSON export shape {"players": [...], "accounts": [...]} (camelCase rows).
// Every row is validated before anything is written.

use std::{collections::BTreeMap, fs, path::Path};

use chrono::{DateTime, TimeZone, Utc};
use serde_json::Value;

use crate::error::{ServiceError, StorageError};
use crate::merge::{merge_counts, refresh_derived};
use crate::progress::counts_from_value;
use crate::record::{
    is_reserved_name, normalize_name, parse_finite, AccountRecord, PlayerRecord, RecordKey,
    Snapshot, SnapshotField, DEFAULT_CATEGORY,
};
use crate::store::{AccountStore, LeaderboardStore};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RestoreSummary {
    pub players: usize,
    pub accounts: usize,
    pub skipped: usize,
}

/// Parse a timestamp from an RFC 3339 string or epoch milliseconds
fn parse_timestamp_json(val: &Value) -> Result<DateTime<Utc>, String> {
    match val {
        Value::String(s) => DateTime::parse_from_rfc3339(s.trim())
            .map(|t| t.with_timezone(&Utc))
            .map_err(|e| format!("Invalid timestamp {:?}: {}", s, e)),
        Value::Number(n) => n
            .as_i64()
            .and_then(|millis| Utc.timestamp_millis_opt(millis).single())
            .ok_or_else(|| format!("Invalid timestamp millis: {}", n)),
        _ => Err("Missing or invalid timestamp field".to_string()),
    }
}

fn optional_timestamp(row: &Value, field: &str, fallback: DateTime<Utc>) -> Result<DateTime<Utc>, String> {
    match row.get(field) {
        None | Some(Value::Null) => Ok(fallback),
        Some(val) => parse_timestamp_json(val),
    }
}

/// Parse one exported player row. `Ok(None)` for guest rows.
fn parse_player_row(i: usize, p: &Value, now: DateTime<Utc>) -> Result<Option<PlayerRecord>, String> {
    let name = p.get("name")
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or(format!("Player {}: missing name", i))?
        .to_string();
    if is_reserved_name(&name) {
        return Ok(None);
    }

    let score = p.get("score")
        .and_then(parse_finite)
        .filter(|s| *s >= 0.0)
        .ok_or(format!("Player {}: missing or negative score", i))?;

    let category = p.get("category")
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or(DEFAULT_CATEGORY)
        .to_string();

    let updated_at = optional_timestamp(p, "updatedAt", now).map_err(|e| format!("Player {}: {}", i, e))?;
    let created_at = optional_timestamp(p, "createdAt", updated_at).map_err(|e| format!("Player {}: {}", i, e))?;

    let mut snapshot = Snapshot::default();
    for field in SnapshotField::ALL {
        *field.slot(&mut snapshot) = p.get(field.json_name()).and_then(parse_finite);
    }

    Ok(Some(PlayerRecord {
        name_lower: normalize_name(&name),
        name,
        category,
        score,
        created_at,
        updated_at,
        completed_counts: p.get("completedCounts").map(counts_from_value).unwrap_or_default(),
        snapshot,
        derived: Default::default(),
    }))
}

fn parse_account_row(i: usize, a: &Value, now: DateTime<Utc>) -> Result<Option<AccountRecord>, String> {
    let name = a.get("name")
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or(format!("Account {}: missing name", i))?
        .to_string();
    if is_reserved_name(&name) {
        return Ok(None);
    }
    let password_hash = a.get("passwordHash")
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .ok_or(format!("Account {}: missing passwordHash", i))?
        .to_string();
    let created_at = optional_timestamp(a, "createdAt", now).map_err(|e| format!("Account {}: {}", i, e))?;
    let updated_at = optional_timestamp(a, "updatedAt", created_at).map_err(|e| format!("Account {}: {}", i, e))?;

    Ok(Some(AccountRecord {
        name_lower: normalize_name(&name),
        name,
        password_hash,
        created_at,
        updated_at,
    }))
}

fn rows<'a>(data: &'a Value, key: &str) -> Result<&'a [Value], String> {
    match data.get(key) {
        None | Some(Value::Null) => Ok(&[]),
        Some(Value::Array(rows)) => Ok(rows.as_slice()),
        Some(_) => Err(format!("Expected JSON array for {}", key)),
    }
}

/// Restore an export into the primary stores.
/// Restored player rows merge with existing records without lowering any
/// score or count; existing accounts are never replaced.
pub fn bulk_restore(
    players: &dyn LeaderboardStore,
    accounts: &dyn AccountStore,
    json_data: &str,
    catalog_size: usize,
) -> Result<RestoreSummary, ServiceError> {
    let data: Value = serde_json::from_str(json_data)
        .map_err(|e| ServiceError::invalid(format!("Invalid JSON: {}", e)))?;
    if !data.is_object() {
        return Err(ServiceError::invalid("Expected JSON object with players/accounts arrays"));
    }
    let now = Utc::now();
    let mut summary = RestoreSummary::default();

    let mut parsed_players = Vec::new();
    for (i, p) in rows(&data, "players").map_err(ServiceError::invalid)?.iter().enumerate() {
        match parse_player_row(i, p, now).map_err(ServiceError::invalid)? {
            Some(record) => parsed_players.push(record),
            None => summary.skipped += 1,
        }
    }
    let mut parsed_accounts = Vec::new();
    for (i, a) in rows(&data, "accounts").map_err(ServiceError::invalid)?.iter().enumerate() {
        match parse_account_row(i, a, now).map_err(ServiceError::invalid)? {
            Some(account) => parsed_accounts.push(account),
            None => summary.skipped += 1,
        }
    }

    // Rows sharing a key combine with each other as well as with storage
    let mut restored_players: BTreeMap<RecordKey, PlayerRecord> = BTreeMap::new();
    for record in parsed_players {
        let key = record.key();
        let existing = match restored_players.remove(&key) {
            Some(earlier) => Some(earlier),
            None => players.get(&key)?,
        };
        let mut record = match existing {
            Some(existing) => combine_restored(existing, record),
            None => record,
        };
        refresh_derived(&mut record, catalog_size);
        restored_players.insert(key, record);
    }

    let mut restored_accounts: BTreeMap<String, AccountRecord> = BTreeMap::new();
    for account in parsed_accounts {
        if restored_accounts.contains_key(&account.name_lower) || accounts.find(&account.name_lower)?.is_some() {
            log::warn!("[RESTORE] account exists name:{} - skipped", account.name);
            summary.skipped += 1;
            continue;
        }
        restored_accounts.insert(account.name_lower.clone(), account);
    }

    summary.players = restored_players.len();
    summary.accounts = restored_accounts.len();
    players.upsert_many(restored_players.into_values().collect())?;
    accounts.put_many(restored_accounts.into_values().collect())?;

    log::info!(
        "✅ Restored players:{} accounts:{} skipped:{}",
        summary.players,
        summary.accounts,
        summary.skipped
    );
    Ok(summary)
}

fn combine_restored(existing: PlayerRecord, restored: PlayerRecord) -> PlayerRecord {
    let mut snapshot = existing.snapshot;
    for field in SnapshotField::ALL {
        if let Some(value) = field.get(&restored.snapshot) {
            *field.slot(&mut snapshot) = Some(value);
        }
    }
    PlayerRecord {
        score: existing.score.max(restored.score),
        created_at: existing.created_at.min(restored.created_at),
        updated_at: existing.updated_at.max(restored.updated_at),
        completed_counts: merge_counts(existing.completed_counts, &restored.completed_counts),
        snapshot,
        ..restored
    }
}

pub fn restore_from_file(
    players: &dyn LeaderboardStore,
    accounts: &dyn AccountStore,
    path: &Path,
    catalog_size: usize,
) -> Result<RestoreSummary, ServiceError> {
    let contents = fs::read_to_string(path).map_err(|source| StorageError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    bulk_restore(players, accounts, &contents, catalog_size)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    use crate::store::FileStore;

    #[test]
    fn test_restore_players_and_accounts() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path()).unwrap();
        let export = json!({
            "players": [
                {"name": "Ada", "score": 40, "completedCounts": {"1": 2, "6": 1}, "timeSeconds": 12,
                 "createdAt": "2025-01-01T00:00:00Z", "updatedAt": 1735776000000i64},
                {"name": "Bo", "score": "15", "category": "hard"},
                {"name": "guest", "score": 1},
            ],
            "accounts": [
                {"name": "Ada", "passwordHash": "sha256$AAAA$AAAA"},
            ],
        });
        let summary = bulk_restore(&store, &store, &export.to_string(), 118).unwrap();
        assert_eq!(summary, RestoreSummary { players: 2, accounts: 1, skipped: 1 });

        let ada = store.get(&RecordKey::new("ada", "overall")).unwrap().unwrap();
        assert_eq!(ada.score, 40.0);
        assert_eq!(ada.derived.protons_gathered, 8);
        assert_eq!(ada.snapshot.time_seconds, Some(12.0));
        assert_eq!(ada.updated_at.to_rfc3339(), "2025-01-02T00:00:00+00:00");
        assert!(store.get(&RecordKey::new("bo", "hard")).unwrap().is_some());
        assert_eq!(store.find("ada").unwrap().unwrap().password_hash, "sha256$AAAA$AAAA");
    }

    #[test]
    fn test_restore_never_lowers_existing_progress() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path()).unwrap();
        let first = json!({"players": [{"name": "Ada", "score": 90, "completedCounts": {"1": 9}}]});
        bulk_restore(&store, &store, &first.to_string(), 118).unwrap();
        let second = json!({"players": [{"name": "ADA", "score": 10, "completedCounts": {"1": 1, "2": 3}}]});
        bulk_restore(&store, &store, &second.to_string(), 118).unwrap();

        let ada = store.get(&RecordKey::new("ada", "overall")).unwrap().unwrap();
        assert_eq!(ada.score, 90.0);
        assert_eq!(ada.completed_counts.get("1"), Some(&9));
        assert_eq!(ada.completed_counts.get("2"), Some(&3));
    }

    #[test]
    fn test_bad_row_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path()).unwrap();
        let export = json!({"players": [{"name": "Ada", "score": 1}, {"score": 5}]});
        let err = bulk_restore(&store, &store, &export.to_string(), 118).unwrap_err();
        assert!(err.to_string().contains("Player 1: missing name"));
        assert!(store.fetch_all().unwrap().is_empty());
    }

    #[test]
    fn test_rows_sharing_a_key_combine() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path()).unwrap();
        let export = json!({
            "players": [
                {"name": "Ada", "score": 70, "completedCounts": {"1": 4}},
                {"name": "ada", "score": 20, "completedCounts": {"1": 1, "8": 2}},
                {"name": "x/y", "score": 5},
                {"name": "y", "category": "overall/x", "score": 6},
            ],
            "accounts": [
                {"name": "Ada", "passwordHash": "first"},
                {"name": "ADA", "passwordHash": "second"},
            ],
        });
        let summary = bulk_restore(&store, &store, &export.to_string(), 118).unwrap();
        assert_eq!(summary, RestoreSummary { players: 3, accounts: 1, skipped: 1 });

        let ada = store.get(&RecordKey::new("ada", "overall")).unwrap().unwrap();
        assert_eq!(ada.score, 70.0);
        assert_eq!(ada.completed_counts.get("1"), Some(&4));
        assert_eq!(ada.completed_counts.get("8"), Some(&2));
        assert_eq!(store.get(&RecordKey::new("x/y", "overall")).unwrap().unwrap().score, 5.0);
        assert_eq!(store.get(&RecordKey::new("y", "overall/x")).unwrap().unwrap().score, 6.0);
        assert_eq!(store.find("ada").unwrap().unwrap().password_hash, "first");
    }

    #[test]
    fn test_failed_write_restores_no_players() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path()).unwrap();
        std::fs::create_dir(dir.path().join("players.json.tmp")).unwrap();
        let export = json!({"players": [{"name": "Ada", "score": 1}, {"name": "Bo", "score": 2}]});
        let err = bulk_restore(&store, &store, &export.to_string(), 118).unwrap_err();
        assert!(matches!(err, ServiceError::Storage(StorageError::Write { .. })));
        assert!(store.fetch_all().unwrap().is_empty());
    }

    #[test]
    fn test_malformed_exports_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path()).unwrap();
        for data in ["not json", "[1, 2]", r#"{"players": {"a": 1}}"#] {
            assert!(
                matches!(bulk_restore(&store, &store, data, 118), Err(ServiceError::InvalidInput(_))),
                "{}",
                data
            );
        }
    }

    #[test]
    fn test_existing_account_is_kept() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path()).unwrap();
        let export = json!({"accounts": [{"name": "Ada", "passwordHash": "first"}]});
        bulk_restore(&store, &store, &export.to_string(), 118).unwrap();
        let export = json!({"accounts": [{"name": "ada", "passwordHash": "second"}]});
        let summary = bulk_restore(&store, &store, &export.to_string(), 118).unwrap();
        assert_eq!(summary.skipped, 1);
        assert_eq!(store.find("ada").unwrap().unwrap().password_hash, "first");
    }
}
