//! In-process change feed.
//!
//! Handlers publish after a mutation commits; the SSE endpoint forwards to
//! every connected client. Publishing with no subscribers is a no-op.

use tokio::sync::broadcast;

use crate::models::{ChangeEvent, ChangeNotification, Resource, ResourceEdit, RowChange};

/// Broadcast hub for [`ChangeNotification`]s.
#[derive(Clone)]
pub struct ChangeFeed {
    sender: broadcast::Sender<ChangeNotification>,
}

impl ChangeFeed {
    /// Create a feed buffering `capacity` notifications per subscriber.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn publish(&self, revision_id: i64, event: ChangeEvent) {
        tracing::debug!(
            revision_id,
            collection = event.collection(),
            row_id = %event.row_id(),
            "Publishing change"
        );
        // No receivers is fine
        let _ = self.sender.send(ChangeNotification { revision_id, event });
    }

    pub fn resource_inserted(&self, revision_id: i64, record: Resource) {
        self.publish(revision_id, ChangeEvent::Resources(RowChange::Insert { record }));
    }

    pub fn resource_updated(&self, revision_id: i64, record: Resource) {
        self.publish(revision_id, ChangeEvent::Resources(RowChange::Update { record }));
    }

    pub fn resource_deleted(&self, revision_id: i64, id: String) {
        self.publish(revision_id, ChangeEvent::Resources(RowChange::Delete { id }));
    }

    pub fn edit_inserted(&self, revision_id: i64, record: ResourceEdit) {
        self.publish(revision_id, ChangeEvent::ResourceEdits(RowChange::Insert { record }));
    }

    pub fn edit_updated(&self, revision_id: i64, record: ResourceEdit) {
        self.publish(revision_id, ChangeEvent::ResourceEdits(RowChange::Update { record }));
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ChangeNotification> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for ChangeFeed {
    fn default() -> Self {
        Self::new(256)
    }
}
