//! Vote records: helpfulness votes on live resources and verification votes
//! on pending resources or edits.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Which ledger a vote belongs to.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum VoteKind {
    Helpfulness,
    Verification,
}

impl VoteKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            VoteKind::Helpfulness => "helpfulness",
            VoteKind::Verification => "verification",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "helpfulness" => Some(VoteKind::Helpfulness),
            "verification" => Some(VoteKind::Verification),
            _ => None,
        }
    }

    /// Helpfulness votes only apply to resources.
    pub fn accepts(&self, target: TargetKind) -> bool {
        match self {
            VoteKind::Helpfulness => target == TargetKind::Resource,
            VoteKind::Verification => true,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TargetKind {
    Resource,
    ResourceEdit,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum VoteType {
    Helpful,
    Unhelpful,
}

impl VoteType {
    pub fn as_str(&self) -> &'static str {
        match self {
            VoteType::Helpful => "helpful",
            VoteType::Unhelpful => "unhelpful",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "helpful" => Some(VoteType::Helpful),
            "unhelpful" => Some(VoteType::Unhelpful),
            _ => None,
        }
    }
}

/// A stored vote.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Vote {
    pub id: String,
    pub kind: VoteKind,
    pub target_id: String,
    pub target_kind: TargetKind,
    pub voter_identity: String,
    pub vote_type: VoteType,
    pub created_at: DateTime<Utc>,
}

/// Request body for inserting a vote. The ledger kind comes from the path.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewVote {
    pub target_id: String,
    pub target_kind: TargetKind,
    pub voter_identity: String,
    pub vote_type: VoteType,
}

/// Query for the pre-insert existence check.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoteLookup {
    pub target_id: String,
    pub target_kind: TargetKind,
    pub voter: String,
}
