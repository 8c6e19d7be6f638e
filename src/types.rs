use crate::blobstore::GcsBlobStore;
use crate::store::FirestoreStore;

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub struct AppState {
    pub store: FirestoreStore,
    pub blobs: GcsBlobStore,
    pub admin_token: String,
}

/// The caller's identity for one request.  Passed explicitly into every
/// data-access call; there is no process-wide "current user".
#[derive(Debug, Clone)]
pub struct Session {
    pub phone: String,
}

/// Lifecycle of a help request.  Transitions away from Pending happen only
/// through the admin spreadsheet round trip, never in-app.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RequestStatus {
    Pending,
    Accepted,
    Completed,
}

impl RequestStatus {
    pub const ALL: [RequestStatus; 3] = [Self::Pending, Self::Accepted, Self::Completed];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "Pending",
            Self::Accepted => "Accepted",
            Self::Completed => "Completed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "Pending" => Some(Self::Pending),
            "Accepted" => Some(Self::Accepted),
            "Completed" => Some(Self::Completed),
            _ => None,
        }
    }
}

/// One user's document: profile fields plus four parallel maps keyed by the
/// ISO timestamp of the booked slot.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserDoc {
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub language: String,
    #[serde(default)]
    pub postal_code: String,
    #[serde(default)]
    pub unit_number: String,
    /// slot => request status
    #[serde(default)]
    pub requests: HashMap<String, RequestStatus>,
    /// slot => free-text remarks entered at booking time
    #[serde(default)]
    pub remarks: HashMap<String, String>,
    /// slot => admin comment left when the request was completed
    #[serde(default)]
    pub history: HashMap<String, String>,
    /// slot => recording object name in the blob store
    #[serde(default)]
    pub recordings: HashMap<String, String>,
}

impl UserDoc {
    /// Decode a stored document; `None` when the document has drifted from
    /// the expected shape.
    pub fn from_map(map: serde_json::Map<String, serde_json::Value>) -> Option<Self> {
        serde_json::from_value(serde_json::Value::Object(map)).ok()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Profile {
    pub language: String,
    pub postal_code: String,
    pub unit_number: String,
}

#[derive(Debug, Deserialize)]
pub struct BookPayload {
    pub slot: String,
    pub remarks: String,
    /// Base64-encoded WAV bytes recorded on the device.
    pub audio_b64: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RebookPayload {
    /// Timestamp of the completed request being used as a template.
    pub history_slot: String,
    pub new_slot: String,
    pub audio_b64: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct RequestListing {
    pub requests: HashMap<String, RequestStatus>,
    pub remarks: HashMap<String, String>,
    pub history: HashMap<String, String>,
}

#[derive(Debug, Serialize)]
pub struct RecordingLink {
    pub url: String,
}
