// ==================== MERGE ENGINE ====================
// Combines a validated submission with the stored record for its key.
// Invariant: score and every completedCounts entry never decrease.

use chrono::{DateTime, Utc};

use crate::progress::derive_stats;
use crate::record::{
    policy_for, CompletedCounts, MergePolicy, PlayerRecord, Snapshot, SnapshotField, Submission,
};

/// Produce the new stored record for `incoming`.
/// `existing` absent behaves as score 0, empty counts, created now.
pub fn merge(
    existing: Option<&PlayerRecord>,
    incoming: &Submission,
    now: DateTime<Utc>,
    catalog_size: usize,
) -> PlayerRecord {
    let (created_at, prior_score, prior_counts, prior_snapshot) = match existing {
        Some(record) => (
            record.created_at,
            record.score,
            record.completed_counts.clone(),
            record.snapshot.clone(),
        ),
        None => (now, 0.0, CompletedCounts::new(), Snapshot::default()),
    };

    let score_policy = policy_for("score").unwrap_or(MergePolicy::KeepMax);
    let score = apply_numeric_policy(score_policy, Some(prior_score), Some(incoming.score))
        .unwrap_or(prior_score);

    let completed_counts = match &incoming.completed_counts {
        Some(counts) => merge_counts(prior_counts, counts),
        None => prior_counts,
    };

    let mut snapshot = prior_snapshot;
    for field in SnapshotField::ALL {
        let merged = apply_numeric_policy(
            field.policy(),
            field.get(&snapshot),
            field.get(&incoming.snapshot),
        );
        *field.slot(&mut snapshot) = merged;
    }

    let derived = derive_stats(Some(&completed_counts), catalog_size);

    PlayerRecord {
        name: incoming.name.clone(),
        name_lower: incoming.name_lower.clone(),
        category: incoming.category.clone(),
        score,
        created_at,
        updated_at: now,
        completed_counts,
        snapshot,
        derived,
    }
}

/// Per-key high-water merge. Keys only in `existing` are kept as is.
pub fn merge_counts(mut existing: CompletedCounts, incoming: &CompletedCounts) -> CompletedCounts {
    for (key, count) in incoming {
        let slot = existing.entry(key.clone()).or_insert(0);
        *slot = (*slot).max(*count);
    }
    existing
}

fn apply_numeric_policy(
    policy: MergePolicy,
    existing: Option<f64>,
    incoming: Option<f64>,
) -> Option<f64> {
    match policy {
        MergePolicy::KeepMax => match (existing, incoming) {
            (Some(a), Some(b)) => Some(a.max(b)),
            (a, b) => a.or(b),
        },
        MergePolicy::LatestSnapshot => incoming.or(existing),
        MergePolicy::SetOnce => existing.or(incoming),
        // Numeric fields are never key, timestamp, count-map or derived slots
        MergePolicy::Identity
        | MergePolicy::Refresh
        | MergePolicy::HighWaterPerKey
        | MergePolicy::ServerDerived => existing,
    }
}

/// Recompute derived fields in place, discarding whatever was stored.
pub fn refresh_derived(record: &mut PlayerRecord, catalog_size: usize) {
    record.derived = derive_stats(Some(&record.completed_counts), catalog_size);
}
