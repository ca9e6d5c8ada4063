// ==================== LEADERBOARD SERVICE ====================
// Request-level operations: validate, merge, persist, mirror, query.

use std::{
    cmp::Ordering,
    sync::{Arc, Mutex},
};

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::accounts::{hash_password, verify_password};
use crate::catalog::ElementCatalog;
use crate::error::{ServiceError, StorageError};
use crate::merge::{merge, merge_counts, refresh_derived};
use crate::mirror::{account_path, score_path, set_in_background, RemoteMirror};
use crate::record::{
    is_reserved_name, normalize_name, AccountRecord, CompletedCounts, PlayerRecord, RecordKey,
    SubmitRequest, Submission, DEFAULT_CATEGORY,
};
use crate::store::{AccountStore, LeaderboardStore};

pub const DEFAULT_LIMIT: usize = 50;
pub const MAX_LIMIT: usize = 200;

/// Result of an accepted submission
#[derive(Debug, Clone, PartialEq)]
pub struct SubmitOutcome {
    /// The stored record; `None` for guests
    pub record: Option<PlayerRecord>,
    pub is_guest: bool,
}

pub struct LeaderboardService {
    players: Arc<dyn LeaderboardStore>,
    accounts: Arc<dyn AccountStore>,
    mirror: Option<Arc<dyn RemoteMirror>>,
    catalog: ElementCatalog,
    /// Serializes read-modify-write cycles so concurrent submissions never lose counts
    submit_lock: Mutex<()>,
    signup_lock: Mutex<()>,
}

impl LeaderboardService {
    pub fn new(
        players: Arc<dyn LeaderboardStore>,
        accounts: Arc<dyn AccountStore>,
        catalog: ElementCatalog,
    ) -> Self {
        Self {
            players,
            accounts,
            mirror: None,
            catalog,
            submit_lock: Mutex::new(()),
            signup_lock: Mutex::new(()),
        }
    }

    pub fn with_mirror(mut self, mirror: Arc<dyn RemoteMirror>) -> Self {
        self.mirror = Some(mirror);
        self
    }

    pub fn catalog(&self) -> &ElementCatalog {
        &self.catalog
    }

    pub fn submit(&self, request: SubmitRequest) -> Result<SubmitOutcome, ServiceError> {
        self.submit_at(request, Utc::now())
    }

    pub fn submit_at(
        &self,
        request: SubmitRequest,
        now: DateTime<Utc>,
    ) -> Result<SubmitOutcome, ServiceError> {
        let submission = Submission::validate(request)?;

        if submission.is_guest {
            log::info!(
                "[SUBMIT] guest score:{} category:{} persisted=false",
                submission.score,
                submission.category
            );
            return Ok(SubmitOutcome {
                record: None,
                is_guest: true,
            });
        }

        let record = {
            let _guard = self.submit_lock.lock().map_err(|_| StorageError::Poisoned)?;
            let existing = self.players.get(&submission.key())?;
            let record = merge(existing.as_ref(), &submission, now, self.catalog.size());
            self.players.upsert(record.clone())?;

            log::info!(
                "[SUBMIT] player:{} category:{} submitted:{} best:{} new_best:{} elements:{}",
                record.name,
                record.category,
                submission.score,
                record.score,
                existing.as_ref().map_or(true, |prior| submission.score > prior.score),
                record.derived.unique_elements
            );
            record
        };

        if let Some(mirror) = &self.mirror {
            match serde_json::to_value(&record) {
                Ok(value) => set_in_background(
                    mirror.clone(),
                    score_path(&record.category, &record.name_lower),
                    value,
                ),
                Err(err) => log::warn!("[MIRROR] encode failed player:{} error:{}", record.name, err),
            }
        }

        Ok(SubmitOutcome {
            record: Some(record),
            is_guest: false,
        })
    }

    /// Ranked records for one category: score descending, then oldest
    /// `updatedAt` first, then name.
    pub fn list_top(
        &self,
        category: Option<&str>,
        limit: Option<&str>,
    ) -> Result<Vec<PlayerRecord>, ServiceError> {
        let category = resolve_category(category);
        let limit = parse_limit(limit);

        let mut records = self.players.fetch_category(&category)?;
        for record in &mut records {
            refresh_derived(record, self.catalog.size());
        }
        records.sort_by(rank_order);
        records.truncate(limit);
        Ok(records)
    }

    /// Every category record for `name`, case-insensitively
    pub fn get_player(&self, name: &str) -> Result<Vec<PlayerRecord>, ServiceError> {
        let name_lower = normalize_name(name);
        if name_lower.is_empty() {
            return Err(ServiceError::invalid("name is required"));
        }

        let mut records = self.players.fetch_by_name(&name_lower)?;
        for record in &mut records {
            refresh_derived(record, self.catalog.size());
        }
        records.sort_by(|a, b| a.category.cmp(&b.category));
        Ok(records)
    }

    /// One category's counts, or the per-key high-water across all categories
    pub fn element_counts(
        &self,
        name: &str,
        category: Option<&str>,
    ) -> Result<CompletedCounts, ServiceError> {
        let name_lower = normalize_name(name);
        if name_lower.is_empty() {
            return Err(ServiceError::invalid("name is required"));
        }

        match category.map(str::trim).filter(|c| !c.is_empty()) {
            Some(category) => Ok(self
                .players
                .get(&RecordKey::new(&name_lower, category))?
                .map(|record| record.completed_counts)
                .unwrap_or_default()),
            None => Ok(self
                .players
                .fetch_by_name(&name_lower)?
                .iter()
                .fold(CompletedCounts::new(), |acc, record| {
                    merge_counts(acc, &record.completed_counts)
                })),
        }
    }

    /// Claim a name. Returns the canonical (trimmed) name.
    pub fn sign_up(&self, name: &str, password: &str) -> Result<String, ServiceError> {
        let name = name.trim();
        if name.is_empty() || password.is_empty() {
            return Err(ServiceError::invalid("name and password are required"));
        }
        if is_reserved_name(name) {
            return Err(ServiceError::invalid("that name is reserved"));
        }
        let name_lower = normalize_name(name);

        let _guard = self.signup_lock.lock().map_err(|_| StorageError::Poisoned)?;
        if self.lookup_account(&name_lower)?.is_some() {
            log::info!("[SIGNUP] rejected name:{} reason:taken", name);
            return Err(ServiceError::Conflict("name already taken".to_string()));
        }

        let now = Utc::now();
        let account = AccountRecord {
            name: name.to_string(),
            name_lower: name_lower.clone(),
            password_hash: hash_password(password),
            created_at: now,
            updated_at: now,
        };
        self.accounts.put(account.clone())?;
        log::info!("[SIGNUP] created name:{}", account.name);

        if let Some(mirror) = &self.mirror {
            match serde_json::to_value(&account) {
                Ok(value) => set_in_background(mirror.clone(), account_path(&name_lower), value),
                Err(err) => log::warn!("[MIRROR] encode failed account:{} error:{}", name, err),
            }
        }

        Ok(account.name)
    }

    /// Returns the stored canonical name. Never reveals which part was wrong.
    pub fn log_in(&self, name: &str, password: &str) -> Result<String, ServiceError> {
        if name.trim().is_empty() || password.is_empty() {
            return Err(ServiceError::invalid("name and password are required"));
        }
        let name_lower = normalize_name(name);

        let Some(account) = self.lookup_account(&name_lower)? else {
            log::info!("[LOGIN] failed name:{} reason:unknown", name.trim());
            return Err(ServiceError::Unauthorized);
        };
        if !verify_password(password, &account.password_hash) {
            log::info!("[LOGIN] failed name:{} reason:credentials", account.name);
            return Err(ServiceError::Unauthorized);
        }

        log::info!("[LOGIN] ok name:{}", account.name);
        Ok(account.name)
    }

    /// The mirror's answer wins when it responds; local is the fallback.
    fn lookup_account(&self, name_lower: &str) -> Result<Option<AccountRecord>, ServiceError> {
        if let Some(mirror) = &self.mirror {
            match mirror.get(&account_path(name_lower)) {
                Ok(None) => return Ok(None),
                Ok(Some(value)) => match decode_remote_account(value, name_lower) {
                    Some(account) => return Ok(Some(account)),
                    None => log::warn!("[MIRROR] unusable account:{} - using local", name_lower),
                },
                Err(err) => {
                    log::warn!("[MIRROR] lookup failed account:{} error:{} - using local", name_lower, err)
                }
            }
        }
        Ok(self.accounts.find(name_lower)?)
    }
}

/// `None` when the value is not an account or belongs to another name
fn decode_remote_account(value: Value, name_lower: &str) -> Option<AccountRecord> {
    let mut account: AccountRecord = serde_json::from_value(value).ok()?;
    if account.name_lower.trim().is_empty() {
        account.name_lower = normalize_name(&account.name);
    }
    (account.name_lower == name_lower).then_some(account)
}

fn resolve_category(category: Option<&str>) -> String {
    match category.map(str::trim) {
        Some(category) if !category.is_empty() => category.to_string(),
        _ => DEFAULT_CATEGORY.to_string(),
    }
}

/// Lenient `limit` parsing: bounded to [1, 200], default 50
pub fn parse_limit(limit: Option<&str>) -> usize {
    let Some(raw) = limit.map(str::trim).filter(|raw| !raw.is_empty()) else {
        return DEFAULT_LIMIT;
    };
    match raw.parse::<f64>() {
        Ok(n) if n.is_finite() => n.floor().clamp(1.0, MAX_LIMIT as f64) as usize,
        _ => DEFAULT_LIMIT,
    }
}

fn rank_order(a: &PlayerRecord, b: &PlayerRecord) -> Ordering {
    b.score
        .total_cmp(&a.score)
        .then_with(|| a.updated_at.cmp(&b.updated_at))
        .then_with(|| a.name_lower.cmp(&b.name_lower))
}
