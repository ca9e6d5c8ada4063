//! Leaderboard and name-claim service for the element collecting game.
//!
//! Submissions are merged into one record per (player, category): the best
//! score and every element count only ever go up, snapshot metrics are
//! replaced by the latest submission, and completion statistics are always
//! recomputed server-side from the count map.

pub mod accounts;
pub mod catalog;
pub mod config;
pub mod error;
pub mod http;
pub mod merge;
pub mod mirror;
pub mod progress;
pub mod record;
pub mod restore;
pub mod service;
pub mod store;

pub use catalog::ElementCatalog;
pub use config::ServerConfig;
pub use error::{MirrorError, ServiceError, StorageError};
pub use merge::merge;
pub use record::{
    AccountRecord, CompletedCounts, MergePolicy, PlayerRecord, SubmitRequest, Submission,
    FIELD_POLICIES,
};
pub use service::{LeaderboardService, SubmitOutcome};
pub use store::{AccountStore, FileStore, LeaderboardStore};
