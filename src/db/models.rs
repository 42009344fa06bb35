use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A registered subject: name plus the reference embedding produced by the
/// browser-side model. The descriptor crosses the wire as a JSON array of
/// floats and is stored verbatim; the server never interprets its contents.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisteredFace {
    pub name: String,
    pub descriptor: Vec<f32>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceRecord {
    pub id: String,
    pub name: String,
    pub marked_at: DateTime<Utc>,
    pub distance: f64,
}
