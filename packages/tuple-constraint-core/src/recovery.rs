//! Recovery phase of the storage engine.

use serde::{Deserialize, Serialize};

/// Bootstrap stage of the engine, passed explicitly to every operation whose
/// behavior depends on it.
///
/// Phases are ordered: `Initialized < InitialRecovery < FinalRecovery < Done`.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryPhase {
    /// Engine created, nothing loaded
    #[default]
    Initialized,
    /// Loading the snapshot
    InitialRecovery,
    /// Replaying the write-ahead log
    FinalRecovery,
    /// Recovery finished, regular operation
    Done,
}

impl RecoveryPhase {
    /// Referential checks are skipped until recovery is over: foreign spaces
    /// may be loaded later and secondary indexes may not be built yet.
    pub fn skips_referential_checks(self) -> bool {
        self <= RecoveryPhase::FinalRecovery
    }

    /// A missing catalog object is tolerated only before the final phase.
    pub fn allows_missing_objects(self) -> bool {
        self < RecoveryPhase::FinalRecovery
    }
}
