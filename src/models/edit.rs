//! Edit proposals against existing resources.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ResourceFields;

/// Lifecycle of an edit proposal. `Approved` and `Rejected` are terminal.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EditStatus {
    Pending,
    Approved,
    Rejected,
}

impl EditStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EditStatus::Pending => "pending",
            EditStatus::Approved => "approved",
            EditStatus::Rejected => "rejected",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(EditStatus::Pending),
            "approved" => Some(EditStatus::Approved),
            "rejected" => Some(EditStatus::Rejected),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, EditStatus::Pending)
    }
}

/// A proposed change to a resource.
///
/// `original_resource_id` is a lookup key only: deleting the resource leaves
/// the edit in place.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ResourceEdit {
    pub id: String,
    pub original_resource_id: String,
    #[serde(flatten)]
    pub fields: ResourceFields,
    pub verification_status: EditStatus,
    pub verification_votes: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ResourceEdit {
    pub fn is_pending(&self) -> bool {
        self.verification_status == EditStatus::Pending
    }
}

/// Query parameters for listing edits.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EditQuery {
    #[serde(default)]
    pub status: Option<EditStatus>,
}
