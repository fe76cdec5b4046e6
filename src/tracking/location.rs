use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A GPS fix reported for a tracker. Coordinates are optional (a ping may
/// carry only a timestamp); the timestamp decides staleness at the receiver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackerLocation {
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub timestamp: DateTime<Utc>,
}
