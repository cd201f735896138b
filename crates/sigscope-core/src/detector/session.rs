use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

/// Session markers read from the target on one tick
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionMarkers {
    pub name: String,
    pub id: u64,
}

/// The session the target is in, valid only while `InGame`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionInfo {
    pub name: String,
    pub id: u64,
    pub joined_at: DateTime<Local>,
}

impl SessionInfo {
    pub fn join(markers: SessionMarkers, joined_at: DateTime<Local>) -> Self {
        Self {
            name: markers.name,
            id: markers.id,
            joined_at,
        }
    }
}
