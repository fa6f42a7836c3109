//! Resource model: a place or service listed in the directory.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Opening status shown on a resource card.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum ResourceStatus {
    #[default]
    Open,
    Closed,
    #[serde(rename = "Open 24/7")]
    Open24x7,
}

impl ResourceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceStatus::Open => "Open",
            ResourceStatus::Closed => "Closed",
            ResourceStatus::Open24x7 => "Open 24/7",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "Open" => Some(ResourceStatus::Open),
            "Closed" => Some(ResourceStatus::Closed),
            "Open 24/7" => Some(ResourceStatus::Open24x7),
            _ => None,
        }
    }
}

/// Moderation state of a resource.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum VerificationStatus {
    Live,
    Pending,
    Rejected,
}

impl VerificationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            VerificationStatus::Live => "live",
            VerificationStatus::Pending => "pending",
            VerificationStatus::Rejected => "rejected",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "live" => Some(VerificationStatus::Live),
            "pending" => Some(VerificationStatus::Pending),
            "rejected" => Some(VerificationStatus::Rejected),
            _ => None,
        }
    }
}

/// The editable field set shared by resources and edit proposals.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct ResourceFields {
    pub name: String,
    #[serde(rename = "type")]
    pub resource_type: String,
    pub category: String,
    pub address: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contact: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub website: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hours: Option<String>,
    #[serde(default)]
    pub services: Vec<String>,
    #[serde(default)]
    pub status: ResourceStatus,
}

impl ResourceFields {
    /// Check required fields. Runs locally, before any store round trip.
    pub fn validate(&self) -> Result<(), String> {
        let required = [
            ("Name", &self.name),
            ("Type", &self.resource_type),
            ("Category", &self.category),
            ("Address", &self.address),
        ];
        for (label, value) in required {
            if value.trim().is_empty() {
                return Err(format!("{} is required", label));
            }
        }
        Ok(())
    }

    /// Trim text, blank optionals to `None`, drop empty and repeated service tags.
    pub fn normalized(mut self) -> Self {
        fn clean(value: Option<String>) -> Option<String> {
            value
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        }

        self.name = self.name.trim().to_string();
        self.resource_type = self.resource_type.trim().to_string();
        self.category = self.category.trim().to_string();
        self.address = self.address.trim().to_string();
        self.contact = clean(self.contact);
        self.email = clean(self.email);
        self.website = clean(self.website);
        self.description = clean(self.description);
        self.hours = clean(self.hours);

        let mut services: Vec<String> = Vec::with_capacity(self.services.len());
        for service in self.services {
            let service = service.trim().to_string();
            if !service.is_empty() && !services.contains(&service) {
                services.push(service);
            }
        }
        self.services = services;
        self
    }
}

/// A directory entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Resource {
    pub id: String,
    #[serde(flatten)]
    pub fields: ResourceFields,
    pub is_user_submitted: bool,
    pub is_admin_submitted: bool,
    pub approved: bool,
    pub verification_status: VerificationStatus,
    pub helpful_votes: i64,
    pub unhelpful_votes: i64,
    pub verification_votes: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Resource {
    /// A resource is publicly visible iff it is approved and live.
    pub fn is_live(&self) -> bool {
        self.approved && self.verification_status == VerificationStatus::Live
    }

    /// Awaiting community review. Admin submissions never enter the queue.
    pub fn needs_review(&self) -> bool {
        self.verification_status == VerificationStatus::Pending && !self.is_admin_submitted
    }

    pub fn counts(&self) -> VoteCounts {
        VoteCounts {
            helpful_votes: self.helpful_votes,
            unhelpful_votes: self.unhelpful_votes,
            verification_votes: self.verification_votes,
        }
    }
}

/// Who submitted a new resource; decides its starting lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Submission {
    Community,
    Admin,
}

impl Submission {
    /// `(approved, verification_status, is_user_submitted, is_admin_submitted)`.
    /// Caller-provided values for these never reach the store.
    pub fn initial_state(&self) -> (bool, VerificationStatus, bool, bool) {
        match self {
            Submission::Community => (false, VerificationStatus::Pending, true, false),
            Submission::Admin => (true, VerificationStatus::Live, false, true),
        }
    }
}

/// Privileged moderation decision on a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Moderation {
    Approve,
    Reject,
}

/// Aggregate vote counters, maintained by the store.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct VoteCounts {
    pub helpful_votes: i64,
    pub unhelpful_votes: i64,
    pub verification_votes: i64,
}

/// Query flags for listing resources.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceQuery {
    #[serde(default)]
    pub live: bool,
}
