use serde::{Deserialize, Serialize};

// Aggregate sync state shown to consumers; recomputed, never persisted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncStatus {
    pub is_syncing: bool,
    pub last_sync_time: Option<i64>,
    pub pending_records: usize,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Notification {
    Queued,
    Syncing,
}

impl Notification {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Syncing => "syncing",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::Notification;

    #[test]
    fn notification_strings_match_contract() {
        assert_eq!(Notification::Queued.as_str(), "queued");
        assert_eq!(Notification::Syncing.as_str(), "syncing");
    }
}
