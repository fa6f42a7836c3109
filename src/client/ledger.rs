//! Vote ledger: one vote per identity and target, per kind.

use std::sync::Arc;
use std::time::Duration;

use super::identity::IdentityProvider;
use super::remote::RemoteStore;
use super::ClientError;
use crate::models::{NewVote, TargetKind, Vote, VoteCounts, VoteKind, VoteLookup, VoteType};

/// A recorded vote and, for resources, the counters read back afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct VoteReceipt {
    pub vote: Vote,
    /// `None` when the target is an edit or the read-back failed
    pub counts: Option<VoteCounts>,
}

pub struct VoteLedger {
    remote: Arc<dyn RemoteStore>,
    identity: Arc<dyn IdentityProvider>,
    settle_delay: Duration,
}

impl VoteLedger {
    pub fn new(
        remote: Arc<dyn RemoteStore>,
        identity: Arc<dyn IdentityProvider>,
        settle_delay: Duration,
    ) -> Self {
        Self {
            remote,
            identity,
            settle_delay,
        }
    }

    /// Check-then-insert. A race between two votes from the same identity can
    /// let both through; the store tolerates the extra row.
    ///
    /// Counters are maintained by the store, so after inserting we wait for
    /// `settle_delay` and read them back. A failed read-back still succeeds.
    pub async fn cast_vote(
        &self,
        kind: VoteKind,
        target_id: &str,
        target_kind: TargetKind,
        vote_type: VoteType,
    ) -> Result<VoteReceipt, ClientError> {
        if !kind.accepts(target_kind) {
            return Err(ClientError::ValidationFailed(format!(
                "{} votes cannot target {:?}",
                kind.as_str(),
                target_kind
            )));
        }

        let voter = self.identity.resolve_identity().await;
        let lookup = VoteLookup {
            target_id: target_id.to_string(),
            target_kind,
            voter: voter.clone(),
        };

        match self.remote.find_vote(kind, &lookup).await {
            Ok(Some(_)) => {
                tracing::info!(kind = kind.as_str(), target_id, "Duplicate vote ignored");
                return Err(ClientError::AlreadyVoted);
            }
            Ok(None) => {}
            Err(e) => {
                tracing::error!(error = %e, target_id, "Failed to check existing votes");
                return Err(ClientError::VoteFailed(format!(
                    "Failed to check existing votes: {}",
                    e
                )));
            }
        }

        let request = NewVote {
            target_id: target_id.to_string(),
            target_kind,
            voter_identity: voter,
            vote_type,
        };
        let vote = self
            .remote
            .insert_vote(kind, &request)
            .await
            .map_err(|e| {
                tracing::error!(error = %e, target_id, "Failed to insert vote");
                ClientError::VoteFailed(format!("Failed to record vote: {}", e))
            })?;

        tracing::debug!(kind = kind.as_str(), target_id, vote_type = vote_type.as_str(), "Vote recorded");

        tokio::time::sleep(self.settle_delay).await;

        let counts = match target_kind {
            TargetKind::Resource => match self.remote.vote_counts(target_id).await {
                Ok(counts) => Some(counts),
                Err(e) => {
                    tracing::warn!(error = %e, target_id, "Vote recorded but counters unavailable");
                    None
                }
            },
            TargetKind::ResourceEdit => None,
        };

        Ok(VoteReceipt { vote, counts })
    }
}
