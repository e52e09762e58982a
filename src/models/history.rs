use serde::{Deserialize, Serialize};

/// Most recent natural completion of a routine.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub routine_id: String,
    /// Local calendar date, `YYYY-MM-DD`.
    pub completed_on: String,
}
