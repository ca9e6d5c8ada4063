// ==================== PRIMARY STORAGE ====================
// Keyed collections persisted as JSON files. The local store is the source of
// truth; write failures are surfaced and leave the in-memory view unchanged.

use std::{
    collections::BTreeMap,
    fs, io,
    path::{Path, PathBuf},
    sync::RwLock,
};

use serde::{de::DeserializeOwned, Serialize};

use crate::error::StorageError;
use crate::record::{AccountRecord, PlayerRecord, RecordKey};

pub const PLAYERS_FILE: &str = "players.json";
pub const ACCOUNTS_FILE: &str = "accounts.json";

/// Persistence of player/category records keyed by (nameLower, category)
pub trait LeaderboardStore: Send + Sync {
    fn fetch_all(&self) -> Result<Vec<PlayerRecord>, StorageError>;

    fn get(&self, key: &RecordKey) -> Result<Option<PlayerRecord>, StorageError>;

    fn upsert(&self, record: PlayerRecord) -> Result<(), StorageError>;

    /// Write a batch of records. Implementations that can should write it
    /// in one step, so a failure leaves none of the batch behind.
    fn upsert_many(&self, records: Vec<PlayerRecord>) -> Result<(), StorageError> {
        for record in records {
            self.upsert(record)?;
        }
        Ok(())
    }

    fn fetch_category(&self, category: &str) -> Result<Vec<PlayerRecord>, StorageError> {
        Ok(self
            .fetch_all()?
            .into_iter()
            .filter(|record| record.category == category)
            .collect())
    }

    fn fetch_by_name(&self, name_lower: &str) -> Result<Vec<PlayerRecord>, StorageError> {
        Ok(self
            .fetch_all()?
            .into_iter()
            .filter(|record| record.name_lower == name_lower)
            .collect())
    }
}

/// Persistence of username → credential records, keyed by lowercased name
pub trait AccountStore: Send + Sync {
    fn find(&self, name_lower: &str) -> Result<Option<AccountRecord>, StorageError>;

    fn put(&self, account: AccountRecord) -> Result<(), StorageError>;

    fn put_many(&self, accounts: Vec<AccountRecord>) -> Result<(), StorageError> {
        for account in accounts {
            self.put(account)?;
        }
        Ok(())
    }
}

/// A string-keyed map mirrored to one JSON file
pub struct JsonCollection<T> {
    path: PathBuf,
    entries: RwLock<BTreeMap<String, T>>,
}

impl<T> JsonCollection<T>
where
    T: Serialize + DeserializeOwned + Clone,
{
    /// Load `path`, treating a missing file as an empty collection
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let path = path.into();
        let entries = load(&path)?;
        Ok(Self {
            path,
            entries: RwLock::new(entries),
        })
    }

    /// Load `path` and rebuild every key from its value, so keys written by
    /// an older key scheme are found again. On a clash the later entry wins.
    pub fn open_rekeyed(
        path: impl Into<PathBuf>,
        entry: impl Fn(T) -> (String, T),
    ) -> Result<Self, StorageError> {
        let path = path.into();
        let mut entries = BTreeMap::new();
        for (old_key, value) in load::<T>(&path)? {
            let (key, value) = entry(value);
            if key != old_key {
                log::debug!("[STORE] rekeyed file:{} from:{} to:{}", path.display(), old_key, key);
            }
            if entries.insert(key.clone(), value).is_some() {
                log::warn!("[STORE] duplicate key file:{} key:{} - keeping later entry", path.display(), key);
            }
        }
        Ok(Self {
            path,
            entries: RwLock::new(entries),
        })
    }

    pub fn get(&self, key: &str) -> Result<Option<T>, StorageError> {
        let entries = self.entries.read().map_err(|_| StorageError::Poisoned)?;
        Ok(entries.get(key).cloned())
    }

    pub fn values(&self) -> Result<Vec<T>, StorageError> {
        let entries = self.entries.read().map_err(|_| StorageError::Poisoned)?;
        Ok(entries.values().cloned().collect())
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|entries| entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Write-through insert: the file is replaced first, memory second
    pub fn insert(&self, key: String, value: T) -> Result<(), StorageError> {
        let mut entries = self.entries.write().map_err(|_| StorageError::Poisoned)?;
        let mut next = entries.clone();
        next.insert(key, value);
        persist(&self.path, &next)?;
        *entries = next;
        Ok(())
    }

    /// Batch insert with a single file write: all rows land or none do
    pub fn insert_many(&self, rows: Vec<(String, T)>) -> Result<(), StorageError> {
        let mut entries = self.entries.write().map_err(|_| StorageError::Poisoned)?;
        let mut next = entries.clone();
        next.extend(rows);
        persist(&self.path, &next)?;
        *entries = next;
        Ok(())
    }
}

fn load<T: DeserializeOwned>(path: &Path) -> Result<BTreeMap<String, T>, StorageError> {
    match fs::read_to_string(path) {
        Ok(contents) if contents.trim().is_empty() => Ok(BTreeMap::new()),
        Ok(contents) => serde_json::from_str(&contents).map_err(|source| StorageError::Parse {
            path: path.to_path_buf(),
            source,
        }),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(BTreeMap::new()),
        Err(source) => Err(StorageError::Read {
            path: path.to_path_buf(),
            source,
        }),
    }
}

fn persist<T: Serialize>(path: &Path, entries: &BTreeMap<String, T>) -> Result<(), StorageError> {
    let bytes = serde_json::to_vec_pretty(entries).map_err(StorageError::Encode)?;
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, bytes).map_err(|source| StorageError::Write {
        path: tmp.clone(),
        source,
    })?;
    fs::rename(&tmp, path).map_err(|source| StorageError::Write {
        path: path.to_path_buf(),
        source,
    })
}

/// Both collections under one data directory
pub struct FileStore {
    players: JsonCollection<PlayerRecord>,
    accounts: JsonCollection<AccountRecord>,
}

impl FileStore {
    pub fn open(data_dir: &Path) -> Result<Self, StorageError> {
        fs::create_dir_all(data_dir).map_err(|source| StorageError::Write {
            path: data_dir.to_path_buf(),
            source,
        })?;
        let players = JsonCollection::open_rekeyed(data_dir.join(PLAYERS_FILE), |mut record: PlayerRecord| {
            record.normalize();
            (record.key().storage_key(), record)
        })?;
        let accounts = JsonCollection::open(data_dir.join(ACCOUNTS_FILE))?;
        log::info!(
            "[STORE] opened dir:{} players:{} accounts:{}",
            data_dir.display(),
            players.len(),
            accounts.len()
        );
        Ok(Self { players, accounts })
    }

    pub fn players(&self) -> &JsonCollection<PlayerRecord> {
        &self.players
    }
}

impl LeaderboardStore for FileStore {
    fn fetch_all(&self) -> Result<Vec<PlayerRecord>, StorageError> {
        let mut records = self.players.values()?;
        for record in &mut records {
            record.normalize();
        }
        Ok(records)
    }

    fn get(&self, key: &RecordKey) -> Result<Option<PlayerRecord>, StorageError> {
        let Some(mut record) = self.players.get(&key.storage_key())? else {
            return Ok(None);
        };
        record.normalize();
        if !key.matches(&record) {
            log::warn!(
                "[STORE] key mismatch key:{} found:{} - ignored",
                key.storage_key(),
                record.key().storage_key()
            );
            return Ok(None);
        }
        Ok(Some(record))
    }

    fn upsert(&self, record: PlayerRecord) -> Result<(), StorageError> {
        self.players.insert(record.key().storage_key(), record)
    }

    fn upsert_many(&self, records: Vec<PlayerRecord>) -> Result<(), StorageError> {
        let rows = records
            .into_iter()
            .map(|record| (record.key().storage_key(), record))
            .collect();
        self.players.insert_many(rows)
    }
}

impl AccountStore for FileStore {
    fn find(&self, name_lower: &str) -> Result<Option<AccountRecord>, StorageError> {
        self.accounts.get(name_lower)
    }

    fn put(&self, account: AccountRecord) -> Result<(), StorageError> {
        self.accounts.insert(account.name_lower.clone(), account)
    }

    fn put_many(&self, accounts: Vec<AccountRecord>) -> Result<(), StorageError> {
        let rows = accounts
            .into_iter()
            .map(|account| (account.name_lower.clone(), account))
            .collect();
        self.accounts.insert_many(rows)
    }
}
