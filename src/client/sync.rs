//! Live sync: keeps a [`SharedModel`] current from the store's change stream.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use super::read_model::SharedModel;
use super::remote::{ChangeStream, RemoteStore};
use super::ClientError;
use crate::models::{ChangeEvent, RowChange, VoteCounts};

/// Wait before reconnecting after the change stream ends.
pub const RECONNECT_DELAY: Duration = Duration::from_secs(2);

/// Owned handle to a background subscription. Dropping it unsubscribes.
#[derive(Debug)]
pub struct Subscription {
    task: JoinHandle<()>,
}

impl Subscription {
    fn spawn<F>(future: F) -> Self
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        Self {
            task: tokio::spawn(future),
        }
    }

    pub fn unsubscribe(self) {
        drop(self);
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Refetch the full snapshot into the model.
pub async fn resync(remote: &dyn RemoteStore, model: &SharedModel) -> Result<(), ClientError> {
    let snapshot = remote.fetch_snapshot().await?;
    let revision = snapshot.revision_id;
    if model.update(|m| m.reload(snapshot)).await.is_some() {
        tracing::info!(revision, "Read model resynced");
    }
    Ok(())
}

pub struct LiveSync {
    remote: Arc<dyn RemoteStore>,
    model: Arc<SharedModel>,
}

impl LiveSync {
    pub fn new(remote: Arc<dyn RemoteStore>, model: Arc<SharedModel>) -> Self {
        Self { remote, model }
    }

    /// Subscribe, catch up on anything written since the model was loaded,
    /// then apply changes in the background. The first subscription and
    /// catch-up must succeed; later reconnects are retried.
    pub async fn start(&self) -> Result<Subscription, ClientError> {
        let stream = self.remote.subscribe_changes().await?;
        // Notifications buffered during the resync replay onto the snapshot;
        // the reducer drops the stale ones.
        resync(self.remote.as_ref(), &self.model).await?;

        let remote = self.remote.clone();
        let model = self.model.clone();
        Ok(Subscription::spawn(run(remote, model, stream, RECONNECT_DELAY)))
    }

    /// Follow one resource's vote counters.
    pub async fn watch_vote_counts(&self, resource_id: &str) -> Result<VoteCountWatch, ClientError> {
        let initial = self
            .model
            .read()
            .await
            .resource(resource_id)
            .map(|r| r.counts())
            .unwrap_or_default();
        let mut stream = self.remote.subscribe_changes().await?;
        let (sender, receiver) = watch::channel(initial);
        let resource_id = resource_id.to_string();

        let subscription = Subscription::spawn(async move {
            while let Some(item) = stream.next().await {
                if let Ok(ChangeEvent::Resources(RowChange::Update { record })) = item {
                    if record.id == resource_id && sender.send(record.counts()).is_err() {
                        break;
                    }
                }
            }
        });

        Ok(VoteCountWatch {
            counts: receiver,
            _subscription: subscription,
        })
    }
}

async fn run(
    remote: Arc<dyn RemoteStore>,
    model: Arc<SharedModel>,
    mut stream: ChangeStream,
    reconnect_delay: Duration,
) {
    loop {
        while let Some(item) = stream.next().await {
            if model.is_closed() {
                return;
            }
            match item {
                Ok(event) => {
                    tracing::trace!(
                        collection = event.collection(),
                        op = event.op(),
                        row_id = event.row_id(),
                        "Applying change"
                    );
                    model.update(|m| m.apply(&event)).await;
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Change stream gap, resyncing");
                    if let Err(e) = resync(remote.as_ref(), &model).await {
                        tracing::error!(error = %e, "Resync failed");
                    }
                }
            }
        }

        // Stream ended: reconnect, then catch up on anything missed.
        loop {
            if model.is_closed() {
                return;
            }
            tracing::warn!(delay = ?reconnect_delay, "Change stream closed, reconnecting");
            tokio::time::sleep(reconnect_delay).await;
            match remote.subscribe_changes().await {
                Ok(next) => {
                    stream = next;
                    if let Err(e) = resync(remote.as_ref(), &model).await {
                        tracing::error!(error = %e, "Resync after reconnect failed");
                    }
                    break;
                }
                Err(e) => tracing::warn!(error = %e, "Reconnect failed"),
            }
        }
    }
}

/// Current vote counters for one resource, updated from the change stream.
#[derive(Debug)]
pub struct VoteCountWatch {
    counts: watch::Receiver<VoteCounts>,
    _subscription: Subscription,
}

impl VoteCountWatch {
    pub fn current(&self) -> VoteCounts {
        *self.counts.borrow()
    }

    /// Wait for the next update. `None` once the stream has ended.
    pub async fn changed(&mut self) -> Option<VoteCounts> {
        self.counts.changed().await.ok()?;
        Some(*self.counts.borrow_and_update())
    }
}
