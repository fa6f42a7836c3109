//! Unique-visitor tracking.

use std::sync::Arc;

use super::completion::CompletionCache;
use super::identity::IdentityProvider;
use super::remote::RemoteStore;
use super::ClientError;
use crate::models::RecordVisitRequest;

pub struct VisitorTracker {
    remote: Arc<dyn RemoteStore>,
    identity: Arc<dyn IdentityProvider>,
    cache: Arc<CompletionCache>,
}

impl VisitorTracker {
    pub fn new(
        remote: Arc<dyn RemoteStore>,
        identity: Arc<dyn IdentityProvider>,
        cache: Arc<CompletionCache>,
    ) -> Self {
        Self {
            remote,
            identity,
            cache,
        }
    }

    /// Record this visit and return the distinct visitor total. Falls back to
    /// the last locally known count (or 1) when the store is unreachable.
    pub async fn track_visit(&self) -> i64 {
        match self.record_and_count().await {
            Ok(total) => {
                self.cache.remember_visitor_count(total);
                total
            }
            Err(e) => {
                tracing::warn!(error = %e, "Visitor tracking failed, using local count");
                self.cache.local_visitor_count().unwrap_or(1)
            }
        }
    }

    async fn record_and_count(&self) -> Result<i64, ClientError> {
        let request = RecordVisitRequest {
            voter_identity: self.identity.resolve_identity().await,
            user_agent: self.identity.user_agent(),
        };
        self.remote.record_visit(&request).await?;
        self.remote.visitor_count().await
    }
}
