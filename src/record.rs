// ==================== DATA MODEL ====================

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::error::ServiceError;
use crate::progress::counts_from_value;

pub const DEFAULT_CATEGORY: &str = "overall";

/// Name that may submit scores but is never persisted or registered
pub const GUEST_NAME: &str = "guest";

/// Unit id (atomic number as a string) → high-water count
pub type CompletedCounts = BTreeMap<String, u64>;

/// How a stored field combines with an incoming submission
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergePolicy {
    /// Part of the record key; the display name takes the latest casing
    Identity,
    /// max(existing, incoming)
    KeepMax,
    /// Per-key max over a count map; keys are never dropped
    HighWaterPerKey,
    /// Written on creation only
    SetOnce,
    /// Set to the submission time on every accepted submission
    Refresh,
    /// Overwritten whenever the submission carries a finite number
    LatestSnapshot,
    /// Recomputed from completedCounts; client values are ignored
    ServerDerived,
}

/// Every persisted PlayerRecord field and its merge policy
pub const FIELD_POLICIES: &[(&str, MergePolicy)] = &[
    ("name", MergePolicy::Identity),
    ("nameLower", MergePolicy::Identity),
    ("category", MergePolicy::Identity),
    ("score", MergePolicy::KeepMax),
    ("createdAt", MergePolicy::SetOnce),
    ("updatedAt", MergePolicy::Refresh),
    ("completedCounts", MergePolicy::HighWaterPerKey),
    ("moleculesAvailable", MergePolicy::LatestSnapshot),
    ("molPercent", MergePolicy::LatestSnapshot),
    ("electronsGathered", MergePolicy::LatestSnapshot),
    ("deaths", MergePolicy::LatestSnapshot),
    ("longestStreak", MergePolicy::LatestSnapshot),
    ("timeSeconds", MergePolicy::LatestSnapshot),
    ("bankTotal", MergePolicy::LatestSnapshot),
    ("atomsCreated", MergePolicy::LatestSnapshot),
    ("ptPercent", MergePolicy::ServerDerived),
    ("uniqueElements", MergePolicy::ServerDerived),
    ("elementsCreated", MergePolicy::ServerDerived),
    ("totalCollected", MergePolicy::ServerDerived),
    ("protonsGathered", MergePolicy::ServerDerived),
];

pub fn policy_for(field: &str) -> Option<MergePolicy> {
    FIELD_POLICIES
        .iter()
        .find(|(name, _)| *name == field)
        .map(|(_, policy)| *policy)
}

/// Optional per-submission metrics. Absent fields are not serialized.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub molecules_available: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mol_percent: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub electrons_gathered: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deaths: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub longest_streak: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_seconds: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bank_total: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub atoms_created: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotField {
    MoleculesAvailable,
    MolPercent,
    ElectronsGathered,
    Deaths,
    LongestStreak,
    TimeSeconds,
    BankTotal,
    AtomsCreated,
}

impl SnapshotField {
    pub const ALL: [SnapshotField; 8] = [
        SnapshotField::MoleculesAvailable,
        SnapshotField::MolPercent,
        SnapshotField::ElectronsGathered,
        SnapshotField::Deaths,
        SnapshotField::LongestStreak,
        SnapshotField::TimeSeconds,
        SnapshotField::BankTotal,
        SnapshotField::AtomsCreated,
    ];

    pub fn json_name(self) -> &'static str {
        match self {
            SnapshotField::MoleculesAvailable => "moleculesAvailable",
            SnapshotField::MolPercent => "molPercent",
            SnapshotField::ElectronsGathered => "electronsGathered",
            SnapshotField::Deaths => "deaths",
            SnapshotField::LongestStreak => "longestStreak",
            SnapshotField::TimeSeconds => "timeSeconds",
            SnapshotField::BankTotal => "bankTotal",
            SnapshotField::AtomsCreated => "atomsCreated",
        }
    }

    pub fn policy(self) -> MergePolicy {
        policy_for(self.json_name()).unwrap_or(MergePolicy::LatestSnapshot)
    }

    pub fn get(self, snapshot: &Snapshot) -> Option<f64> {
        match self {
            SnapshotField::MoleculesAvailable => snapshot.molecules_available,
            SnapshotField::MolPercent => snapshot.mol_percent,
            SnapshotField::ElectronsGathered => snapshot.electrons_gathered,
            SnapshotField::Deaths => snapshot.deaths,
            SnapshotField::LongestStreak => snapshot.longest_streak,
            SnapshotField::TimeSeconds => snapshot.time_seconds,
            SnapshotField::BankTotal => snapshot.bank_total,
            SnapshotField::AtomsCreated => snapshot.atoms_created,
        }
    }

    pub fn slot(self, snapshot: &mut Snapshot) -> &mut Option<f64> {
        match self {
            SnapshotField::MoleculesAvailable => &mut snapshot.molecules_available,
            SnapshotField::MolPercent => &mut snapshot.mol_percent,
            SnapshotField::ElectronsGathered => &mut snapshot.electrons_gathered,
            SnapshotField::Deaths => &mut snapshot.deaths,
            SnapshotField::LongestStreak => &mut snapshot.longest_streak,
            SnapshotField::TimeSeconds => &mut snapshot.time_seconds,
            SnapshotField::BankTotal => &mut snapshot.bank_total,
            SnapshotField::AtomsCreated => &mut snapshot.atoms_created,
        }
    }
}

/// Server-computed leaderboard statistics. Stored values are discarded on
/// read; they are recomputed from the count map whenever a record is served.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DerivedStats {
    /// Percentage of the periodic table touched (0-100)
    #[serde(deserialize_with = "discard_stored")]
    pub pt_percent: u32,
    #[serde(deserialize_with = "discard_stored")]
    pub unique_elements: u64,
    #[serde(deserialize_with = "discard_stored")]
    pub elements_created: u64,
    #[serde(deserialize_with = "discard_stored")]
    pub total_collected: u64,
    /// Σ atomic number × count
    #[serde(deserialize_with = "discard_stored")]
    pub protons_gathered: u64,
}

/// Best score and latest progress snapshot for one (player, category)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerRecord {
    pub name: String,
    #[serde(default)]
    pub name_lower: String,
    #[serde(default = "default_category")]
    pub category: String,
    #[serde(default)]
    pub score: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, deserialize_with = "deserialize_counts")]
    pub completed_counts: CompletedCounts,
    #[serde(flatten)]
    pub snapshot: Snapshot,
    #[serde(flatten)]
    pub derived: DerivedStats,
}

impl PlayerRecord {
    pub fn key(&self) -> RecordKey {
        RecordKey::new(&self.name_lower, &self.category)
    }

    /// Fill key fields missing from older exports
    pub fn normalize(&mut self) {
        self.name = self.name.trim().to_string();
        if self.name_lower.trim().is_empty() {
            self.name_lower = self.name.to_lowercase();
        }
        let category = self.category.trim();
        self.category = if category.is_empty() {
            DEFAULT_CATEGORY.to_string()
        } else {
            category.to_string()
        };
        if !self.score.is_finite() || self.score < 0.0 {
            self.score = 0.0;
        }
    }
}

/// Unique key of a PlayerRecord: (lowercased name, category)
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RecordKey {
    pub name_lower: String,
    pub category: String,
}

impl RecordKey {
    pub fn new(name_lower: &str, category: &str) -> Self {
        Self {
            name_lower: name_lower.to_string(),
            category: category.to_string(),
        }
    }

    /// Flat string form used as the primary-store map key. Both parts are
    /// escaped, so distinct keys never share a storage key.
    pub fn storage_key(&self) -> String {
        format!("{}/{}", escape_key_part(&self.category), escape_key_part(&self.name_lower))
    }

    pub fn matches(&self, record: &PlayerRecord) -> bool {
        record.name_lower == self.name_lower && record.category == self.category
    }
}

/// `%` and `/` become `%25` and `%2F`
fn escape_key_part(part: &str) -> String {
    part.replace('%', "%25").replace('/', "%2F")
}

/// Registered name claim
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountRecord {
    pub name: String,
    pub name_lower: String,
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

fn default_category() -> String {
    DEFAULT_CATEGORY.to_string()
}

fn discard_stored<'de, D, N>(deserializer: D) -> Result<N, D::Error>
where
    D: Deserializer<'de>,
    N: Default,
{
    Value::deserialize(deserializer)?;
    Ok(N::default())
}

fn deserialize_counts<'de, D>(deserializer: D) -> Result<CompletedCounts, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(counts_from_value(&value))
}

/// Trimmed, lowercased form used for every case-insensitive lookup
pub fn normalize_name(name: &str) -> String {
    name.trim().to_lowercase()
}

pub fn is_reserved_name(name: &str) -> bool {
    let lower = normalize_name(name);
    lower.is_empty() || lower == GUEST_NAME
}

/// Finite number from a JSON number or numeric string
pub fn parse_finite(value: &Value) -> Option<f64> {
    let number = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                None
            } else {
                trimmed.parse::<f64>().ok()
            }
        }
        _ => None,
    };
    number.filter(|n| n.is_finite())
}

// ==================== SUBMISSIONS ====================

/// Raw /submit body. Fields stay untyped until validation.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitRequest {
    #[serde(default)]
    pub name: Option<Value>,
    #[serde(default)]
    pub score: Option<Value>,
    #[serde(default)]
    pub category: Option<Value>,
    #[serde(default)]
    pub completed_counts: Option<Value>,
    /// Snapshot metrics plus anything else the client sent
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A submission that passed validation
#[derive(Debug, Clone, PartialEq)]
pub struct Submission {
    pub name: String,
    pub name_lower: String,
    pub category: String,
    pub score: f64,
    pub completed_counts: Option<CompletedCounts>,
    pub snapshot: Snapshot,
    /// Acknowledge but never persist
    pub is_guest: bool,
}

impl Submission {
    pub fn key(&self) -> RecordKey {
        RecordKey::new(&self.name_lower, &self.category)
    }

    pub fn validate(request: SubmitRequest) -> Result<Submission, ServiceError> {
        let name = match request.name {
            Some(Value::String(name)) => name.trim().to_string(),
            _ => String::new(),
        };
        if name.is_empty() {
            return Err(ServiceError::invalid("name is required"));
        }

        let score = request
            .score
            .as_ref()
            .and_then(parse_finite)
            .filter(|score| *score >= 0.0)
            .ok_or_else(|| ServiceError::invalid("score must be a non-negative number"))?;

        let category = match request.category {
            Some(Value::String(category)) if !category.trim().is_empty() => {
                category.trim().to_string()
            }
            _ => DEFAULT_CATEGORY.to_string(),
        };

        let completed_counts = request
            .completed_counts
            .as_ref()
            .map(counts_from_value);

        let mut snapshot = Snapshot::default();
        for field in SnapshotField::ALL {
            if let Some(value) = request.extra.get(field.json_name()).and_then(parse_finite) {
                *field.slot(&mut snapshot) = Some(value);
            }
        }

        let name_lower = normalize_name(&name);
        let is_guest = is_reserved_name(&name_lower);

        Ok(Submission {
            name,
            name_lower,
            category,
            score,
            completed_counts,
            snapshot,
            is_guest,
        })
    }
}
