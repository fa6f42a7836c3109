//! The seam between the client core and the shared store.

use async_trait::async_trait;
use futures::stream::BoxStream;

use super::ClientError;
use crate::models::{
    ChangeEvent, DirectorySnapshot, Moderation, NewVote, RecordVisitRequest, Resource,
    ResourceEdit, ResourceFields, VisitorRecord, Vote, VoteCounts, VoteKind, VoteLookup,
};

/// Stream of change notifications. An `Err` item means notifications may
/// have been missed and the read model should be refetched.
pub type ChangeStream = BoxStream<'static, Result<ChangeEvent, ClientError>>;

/// Operations the client core needs from the shared store.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    async fn fetch_snapshot(&self) -> Result<DirectorySnapshot, ClientError>;

    async fn insert_resource(&self, fields: &ResourceFields) -> Result<Resource, ClientError>;

    async fn admin_insert_resource(&self, fields: &ResourceFields)
        -> Result<Resource, ClientError>;

    async fn admin_update_resource(
        &self,
        id: &str,
        fields: &ResourceFields,
    ) -> Result<Resource, ClientError>;

    async fn moderate_resource(
        &self,
        id: &str,
        decision: Moderation,
    ) -> Result<Resource, ClientError>;

    async fn delete_resource(&self, id: &str) -> Result<(), ClientError>;

    async fn insert_edit(
        &self,
        resource_id: &str,
        fields: &ResourceFields,
    ) -> Result<ResourceEdit, ClientError>;

    /// Apply a pending edit. Returns the terminal edit and the updated resource.
    async fn approve_edit(&self, edit_id: &str) -> Result<(ResourceEdit, Resource), ClientError>;

    async fn reject_edit(&self, edit_id: &str) -> Result<ResourceEdit, ClientError>;

    /// Existing vote by `lookup.voter` on the target, if any.
    async fn find_vote(
        &self,
        kind: VoteKind,
        lookup: &VoteLookup,
    ) -> Result<Option<Vote>, ClientError>;

    async fn insert_vote(&self, kind: VoteKind, vote: &NewVote) -> Result<Vote, ClientError>;

    async fn vote_counts(&self, resource_id: &str) -> Result<VoteCounts, ClientError>;

    async fn record_visit(
        &self,
        request: &RecordVisitRequest,
    ) -> Result<VisitorRecord, ClientError>;

    async fn visitor_count(&self) -> Result<i64, ClientError>;

    async fn subscribe_changes(&self) -> Result<ChangeStream, ClientError>;
}
