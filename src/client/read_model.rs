//! Client read model.
//!
//! One collection of resources and one of pending edits, both newest first.
//! The live, featured and recently-added views are derived from them after
//! every change, so no view can drift from the others.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};
use tokio::sync::{RwLock, RwLockReadGuard};

use crate::models::{ChangeEvent, DirectorySnapshot, Resource, ResourceEdit, RowChange};

/// Live resources shown in the featured strip.
pub const FEATURED_LIMIT: usize = 6;
/// Community submissions shown as recently added.
pub const RECENTLY_ADDED_LIMIT: usize = 5;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReadModel {
    revision_id: i64,
    resources: Vec<Resource>,
    pending_edits: Vec<ResourceEdit>,
    // Deleted resources; deleted or settled edits
    retired_resources: HashSet<String>,
    retired_edits: HashSet<String>,
    // Derived
    live: Vec<Resource>,
    recently_added: Vec<Resource>,
}

impl ReadModel {
    pub fn from_snapshot(snapshot: DirectorySnapshot) -> Self {
        let mut resources = snapshot.resources;
        resources.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        let mut pending_edits: Vec<ResourceEdit> = snapshot
            .pending_edits
            .into_iter()
            .filter(|e| e.is_pending())
            .collect();
        pending_edits.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        let mut model = Self {
            revision_id: snapshot.revision_id,
            resources,
            pending_edits,
            ..Default::default()
        };
        model.refresh_views();
        model
    }

    pub fn revision_id(&self) -> i64 {
        self.revision_id
    }

    /// Every resource regardless of status (privileged view).
    pub fn all_resources(&self) -> &[Resource] {
        &self.resources
    }

    /// Resources satisfying the live invariant.
    pub fn live_resources(&self) -> &[Resource] {
        &self.live
    }

    pub fn live_count(&self) -> usize {
        self.live.len()
    }

    pub fn pending_edits(&self) -> &[ResourceEdit] {
        &self.pending_edits
    }

    pub fn featured(&self) -> &[Resource] {
        &self.live[..self.live.len().min(FEATURED_LIMIT)]
    }

    /// Newest community submissions in any state.
    pub fn recently_added(&self) -> &[Resource] {
        &self.recently_added
    }

    pub fn resource(&self, id: &str) -> Option<&Resource> {
        self.resources.iter().find(|r| r.id == id)
    }

    pub fn edit(&self, id: &str) -> Option<&ResourceEdit> {
        self.pending_edits.iter().find(|e| e.id == id)
    }

    /// Apply one change notification.
    ///
    /// Order-insensitive: a row only replaces a stored row with an equal or
    /// older `updated_at`, and ids that were deleted (or, for edits, settled)
    /// stay retired, so late or replayed notifications cannot revive them.
    pub fn apply(&mut self, event: &ChangeEvent) {
        match event {
            ChangeEvent::Resources(change) => match change {
                RowChange::Insert { record } | RowChange::Update { record } => {
                    self.merge_resource(record)
                }
                RowChange::Delete { id } => {
                    self.remove_resource(id);
                }
            },
            ChangeEvent::ResourceEdits(change) => match change {
                RowChange::Insert { record } | RowChange::Update { record } => {
                    self.merge_edit(record)
                }
                RowChange::Delete { id } => {
                    self.remove_edit(id);
                }
            },
        }
    }

    /// Load a fresh snapshot while keeping retired ids, so notifications
    /// older than the snapshot stay harmless.
    pub fn reload(&mut self, snapshot: DirectorySnapshot) {
        let mut fresh = Self::from_snapshot(snapshot);
        fresh.retired_resources = std::mem::take(&mut self.retired_resources);
        fresh.retired_edits = std::mem::take(&mut self.retired_edits);
        for resource in &fresh.resources {
            fresh.retired_resources.remove(&resource.id);
        }
        for edit in &fresh.pending_edits {
            fresh.retired_edits.remove(&edit.id);
        }
        *self = fresh;
    }

    fn merge_resource(&mut self, incoming: &Resource) {
        if self.retired_resources.contains(&incoming.id) {
            return;
        }
        if let Some(current) = self.resource(&incoming.id) {
            if incoming.updated_at < current.updated_at {
                return;
            }
        }
        self.upsert_resource(incoming.clone());
    }

    fn merge_edit(&mut self, incoming: &ResourceEdit) {
        if self.retired_edits.contains(&incoming.id) {
            return;
        }
        if !incoming.is_pending() {
            self.remove_edit(&incoming.id);
            return;
        }
        if let Some(current) = self.edit(&incoming.id) {
            if incoming.updated_at < current.updated_at {
                return;
            }
        }
        upsert_by_created_at(&mut self.pending_edits, incoming.clone(), |e| {
            (&e.id, e.created_at)
        });
    }

    /// Replace the resource with the same id, or insert it in creation order.
    /// Local writes go through here unconditionally.
    pub fn upsert_resource(&mut self, resource: Resource) {
        upsert_by_created_at(&mut self.resources, resource, |r| (&r.id, r.created_at));
        self.refresh_views();
    }

    /// Remove a resource from every view and retire its id. Returns whether
    /// it was present.
    pub fn remove_resource(&mut self, id: &str) -> bool {
        self.retired_resources.insert(id.to_string());
        let before = self.resources.len();
        self.resources.retain(|r| r.id != id);
        let removed = self.resources.len() != before;
        if removed {
            self.refresh_views();
        }
        removed
    }

    /// Remove a pending edit and retire its id. Returns whether it was present.
    pub fn remove_edit(&mut self, id: &str) -> bool {
        self.retired_edits.insert(id.to_string());
        let before = self.pending_edits.len();
        self.pending_edits.retain(|e| e.id != id);
        self.pending_edits.len() != before
    }

    fn refresh_views(&mut self) {
        self.live = self.resources.iter().filter(|r| r.is_live()).cloned().collect();
        self.recently_added = self
            .resources
            .iter()
            .filter(|r| r.is_user_submitted)
            .take(RECENTLY_ADDED_LIMIT)
            .cloned()
            .collect();
    }
}

/// The read model shared by the directory, the sync task and the verification
/// controller. Once closed, writes are dropped so late responses never land
/// on a torn-down view.
#[derive(Debug, Default)]
pub struct SharedModel {
    inner: RwLock<ReadModel>,
    closed: AtomicBool,
}

impl SharedModel {
    pub fn new(model: ReadModel) -> Self {
        Self {
            inner: RwLock::new(model),
            closed: AtomicBool::new(false),
        }
    }

    pub async fn read(&self) -> RwLockReadGuard<'_, ReadModel> {
        self.inner.read().await
    }

    /// Mutate the model. Returns `None` without running `f` once closed.
    pub async fn update<R>(&self, f: impl FnOnce(&mut ReadModel) -> R) -> Option<R> {
        if self.is_closed() {
            return None;
        }
        let mut model = self.inner.write().await;
        Some(f(&mut model))
    }

    /// Swap in a freshly loaded model.
    pub async fn replace(&self, model: ReadModel) -> bool {
        self.update(|current| *current = model).await.is_some()
    }

    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// Replace in place when the id exists; otherwise insert before the first
/// entry created at or before the new one, so ties go to the front.
fn upsert_by_created_at<T, F>(items: &mut Vec<T>, item: T, key: F)
where
    F: Fn(&T) -> (&String, DateTime<Utc>),
{
    let (id, created_at) = {
        let (id, created_at) = key(&item);
        (id.clone(), created_at)
    };

    if let Some(existing) = items.iter_mut().find(|current| key(current).0 == &id) {
        *existing = item;
        return;
    }

    let position = items
        .iter()
        .position(|current| key(current).1 <= created_at)
        .unwrap_or(items.len());
    items.insert(position, item);
}
