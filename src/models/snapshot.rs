//! Full snapshot and revision models used for initial loads and resyncs.

use serde::{Deserialize, Serialize};

use super::{Resource, ResourceEdit};

/// Every resource (newest first) and every pending edit at one revision.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectorySnapshot {
    pub schema_version: i32,
    pub generated_at: String,
    pub revision_id: i64,
    pub resources: Vec<Resource>,
    pub pending_edits: Vec<ResourceEdit>,
}

/// Revision information for change detection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RevisionInfo {
    pub revision_id: i64,
    pub generated_at: String,
}
