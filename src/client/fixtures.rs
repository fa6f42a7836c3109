//! Builders and an in-memory [`RemoteStore`] for client tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use futures::StreamExt;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;

use super::remote::{ChangeStream, RemoteStore};
use super::ClientError;
use crate::models::{
    ChangeEvent, DirectorySnapshot, EditStatus, Moderation, NewVote, RecordVisitRequest,
    Resource, ResourceEdit, ResourceFields, RowChange, Submission, TargetKind,
    VerificationStatus, VisitorRecord, Vote, VoteCounts, VoteKind, VoteLookup, VoteType,
};

fn at(minute: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap() + Duration::minutes(minute)
}

pub fn fields(name: &str) -> ResourceFields {
    ResourceFields {
        name: name.to_string(),
        resource_type: "Clinic".to_string(),
        category: "Hospitals & Clinics".to_string(),
        address: "SV Road, Borivali West".to_string(),
        services: vec!["OPD".to_string()],
        ..Default::default()
    }
}

/// Admin-created resource, live from the start.
pub fn live_resource(id: &str, minute: i64) -> Resource {
    Resource {
        id: id.to_string(),
        fields: fields(id),
        is_user_submitted: false,
        is_admin_submitted: true,
        approved: true,
        verification_status: VerificationStatus::Live,
        helpful_votes: 0,
        unhelpful_votes: 0,
        verification_votes: 0,
        created_at: at(minute),
        updated_at: at(minute),
    }
}

/// Community submission awaiting review.
pub fn pending_resource(id: &str, minute: i64) -> Resource {
    Resource {
        is_user_submitted: true,
        is_admin_submitted: false,
        approved: false,
        verification_status: VerificationStatus::Pending,
        ..live_resource(id, minute)
    }
}

pub fn edit(id: &str, resource_id: &str, minute: i64) -> ResourceEdit {
    ResourceEdit {
        id: id.to_string(),
        original_resource_id: resource_id.to_string(),
        fields: fields(&format!("{} (edited)", resource_id)),
        verification_status: EditStatus::Pending,
        verification_votes: 0,
        created_at: at(minute),
        updated_at: at(minute),
    }
}

pub fn snapshot(resources: Vec<Resource>, pending_edits: Vec<ResourceEdit>) -> DirectorySnapshot {
    DirectorySnapshot {
        schema_version: 1,
        generated_at: at(0).to_rfc3339(),
        revision_id: 1,
        resources,
        pending_edits,
    }
}

#[derive(Default)]
struct MemoryState {
    resources: Vec<Resource>,
    edits: Vec<ResourceEdit>,
    votes: Vec<Vote>,
    visitors: HashMap<String, VisitorRecord>,
    next_id: usize,
    clock: i64,
}

/// Store double with switchable failures. Mutations publish change events
/// like the real service does.
pub struct MemoryRemote {
    state: Mutex<MemoryState>,
    changes: broadcast::Sender<ChangeEvent>,
    pub fail_writes: AtomicBool,
    pub fail_reads: AtomicBool,
    pub snapshot_fetches: AtomicUsize,
}

impl MemoryRemote {
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(64);
        Self {
            state: Mutex::new(MemoryState {
                clock: 1000,
                ..Default::default()
            }),
            changes,
            fail_writes: AtomicBool::new(false),
            fail_reads: AtomicBool::new(false),
            snapshot_fetches: AtomicUsize::new(0),
        }
    }

    pub fn with_resources(resources: Vec<Resource>) -> Self {
        let remote = Self::new();
        remote.state.lock().unwrap().resources = resources;
        remote
    }

    pub fn seed_edit(&self, edit: ResourceEdit) {
        self.state.lock().unwrap().edits.push(edit);
    }

    pub fn resource_row(&self, id: &str) -> Option<Resource> {
        let state = self.state.lock().unwrap();
        state.resources.iter().find(|r| r.id == id).cloned()
    }

    pub fn vote_count(&self) -> usize {
        self.state.lock().unwrap().votes.len()
    }

    /// Push an arbitrary event to subscribers, e.g. another client's write.
    pub fn emit(&self, event: ChangeEvent) {
        let _ = self.changes.send(event);
    }

    fn check_write(&self) -> Result<(), ClientError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(ClientError::RemoteWriteFailed("store unavailable".into()));
        }
        Ok(())
    }

    fn check_read(&self) -> Result<(), ClientError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(ClientError::RemoteReadFailed("store unavailable".into()));
        }
        Ok(())
    }

    fn with_resource<F>(&self, id: &str, mutate: F) -> Result<Resource, ClientError>
    where
        F: FnOnce(&mut Resource),
    {
        let mut state = self.state.lock().unwrap();
        let resource = state
            .resources
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| ClientError::NotFound(format!("Resource {} not found", id)))?;
        mutate(resource);
        let updated = resource.clone();
        drop(state);
        self.emit(ChangeEvent::Resources(RowChange::Update {
            record: updated.clone(),
        }));
        Ok(updated)
    }

    fn create(&self, fields: &ResourceFields, submission: Submission) -> Resource {
        let (approved, verification_status, is_user_submitted, is_admin_submitted) =
            submission.initial_state();
        let mut state = self.state.lock().unwrap();
        state.next_id += 1;
        state.clock += 1;
        let resource = Resource {
            id: format!("res-{}", state.next_id),
            fields: fields.clone(),
            is_user_submitted,
            is_admin_submitted,
            approved,
            verification_status,
            helpful_votes: 0,
            unhelpful_votes: 0,
            verification_votes: 0,
            created_at: at(state.clock),
            updated_at: at(state.clock),
        };
        state.resources.push(resource.clone());
        drop(state);
        self.emit(ChangeEvent::Resources(RowChange::Insert {
            record: resource.clone(),
        }));
        resource
    }
}

#[async_trait]
impl RemoteStore for MemoryRemote {
    async fn fetch_snapshot(&self) -> Result<DirectorySnapshot, ClientError> {
        self.snapshot_fetches.fetch_add(1, Ordering::SeqCst);
        self.check_read()?;
        let state = self.state.lock().unwrap();
        let pending = state.edits.iter().filter(|e| e.is_pending()).cloned().collect();
        Ok(snapshot(state.resources.clone(), pending))
    }

    async fn insert_resource(&self, fields: &ResourceFields) -> Result<Resource, ClientError> {
        self.check_write()?;
        Ok(self.create(fields, Submission::Community))
    }

    async fn admin_insert_resource(
        &self,
        fields: &ResourceFields,
    ) -> Result<Resource, ClientError> {
        self.check_write()?;
        Ok(self.create(fields, Submission::Admin))
    }

    async fn admin_update_resource(
        &self,
        id: &str,
        fields: &ResourceFields,
    ) -> Result<Resource, ClientError> {
        self.check_write()?;
        self.with_resource(id, |r| {
            r.fields = fields.clone();
            r.approved = true;
            r.verification_status = VerificationStatus::Live;
            r.is_admin_submitted = true;
        })
    }

    async fn moderate_resource(
        &self,
        id: &str,
        decision: Moderation,
    ) -> Result<Resource, ClientError> {
        self.check_write()?;
        self.with_resource(id, |r| match decision {
            Moderation::Approve => {
                r.approved = true;
                r.verification_status = VerificationStatus::Live;
            }
            Moderation::Reject => r.verification_status = VerificationStatus::Rejected,
        })
    }

    async fn delete_resource(&self, id: &str) -> Result<(), ClientError> {
        self.check_write()?;
        self.state.lock().unwrap().resources.retain(|r| r.id != id);
        self.emit(ChangeEvent::Resources(RowChange::Delete { id: id.to_string() }));
        Ok(())
    }

    async fn insert_edit(
        &self,
        resource_id: &str,
        fields: &ResourceFields,
    ) -> Result<ResourceEdit, ClientError> {
        self.check_write()?;
        let mut state = self.state.lock().unwrap();
        if !state.resources.iter().any(|r| r.id == resource_id) {
            return Err(ClientError::NotFound(format!("Resource {} not found", resource_id)));
        }
        state.next_id += 1;
        state.clock += 1;
        let created = ResourceEdit {
            id: format!("edit-{}", state.next_id),
            original_resource_id: resource_id.to_string(),
            fields: fields.clone(),
            verification_status: EditStatus::Pending,
            verification_votes: 0,
            created_at: at(state.clock),
            updated_at: at(state.clock),
        };
        state.edits.push(created.clone());
        drop(state);
        self.emit(ChangeEvent::ResourceEdits(RowChange::Insert {
            record: created.clone(),
        }));
        Ok(created)
    }

    async fn approve_edit(&self, edit_id: &str) -> Result<(ResourceEdit, Resource), ClientError> {
        self.check_write()?;
        let approved = {
            let mut state = self.state.lock().unwrap();
            let found = state
                .edits
                .iter_mut()
                .find(|e| e.id == edit_id)
                .ok_or_else(|| ClientError::NotFound(format!("Edit {} not found", edit_id)))?;
            if !found.is_pending() {
                return Err(ClientError::NotPending(format!("Edit {} is not pending", edit_id)));
            }
            found.verification_status = EditStatus::Approved;
            found.clone()
        };
        self.emit(ChangeEvent::ResourceEdits(RowChange::Update {
            record: approved.clone(),
        }));
        let fields = approved.fields.clone();
        let resource = self.with_resource(&approved.original_resource_id, |r| r.fields = fields)?;
        Ok((approved, resource))
    }

    async fn reject_edit(&self, edit_id: &str) -> Result<ResourceEdit, ClientError> {
        self.check_write()?;
        let rejected = {
            let mut state = self.state.lock().unwrap();
            let found = state
                .edits
                .iter_mut()
                .find(|e| e.id == edit_id)
                .ok_or_else(|| ClientError::NotFound(format!("Edit {} not found", edit_id)))?;
            if !found.is_pending() {
                return Err(ClientError::NotPending(format!("Edit {} is not pending", edit_id)));
            }
            found.verification_status = EditStatus::Rejected;
            found.clone()
        };
        self.emit(ChangeEvent::ResourceEdits(RowChange::Update {
            record: rejected.clone(),
        }));
        Ok(rejected)
    }

    async fn find_vote(
        &self,
        kind: VoteKind,
        lookup: &VoteLookup,
    ) -> Result<Option<Vote>, ClientError> {
        self.check_read()?;
        let state = self.state.lock().unwrap();
        Ok(state
            .votes
            .iter()
            .find(|v| {
                v.kind == kind && v.target_id == lookup.target_id && v.voter_identity == lookup.voter
            })
            .cloned())
    }

    async fn insert_vote(&self, kind: VoteKind, vote: &NewVote) -> Result<Vote, ClientError> {
        self.check_write()?;
        let mut state = self.state.lock().unwrap();
        state.next_id += 1;
        state.clock += 1;
        let stored = Vote {
            id: format!("vote-{}", state.next_id),
            kind,
            target_id: vote.target_id.clone(),
            target_kind: vote.target_kind,
            voter_identity: vote.voter_identity.clone(),
            vote_type: vote.vote_type,
            created_at: at(state.clock),
        };
        state.votes.push(stored.clone());

        let tally = |state: &MemoryState, kind: VoteKind, vote_type: VoteType| {
            state
                .votes
                .iter()
                .filter(|v| v.kind == kind && v.target_id == stored.target_id && v.vote_type == vote_type)
                .count() as i64
        };
        let helpful = tally(&*state, VoteKind::Helpfulness, VoteType::Helpful);
        let unhelpful = tally(&*state, VoteKind::Helpfulness, VoteType::Unhelpful);
        let verified = tally(&*state, VoteKind::Verification, VoteType::Helpful);

        let mut event = None;
        match stored.target_kind {
            TargetKind::Resource => {
                if let Some(r) = state.resources.iter_mut().find(|r| r.id == stored.target_id) {
                    r.helpful_votes = helpful;
                    r.unhelpful_votes = unhelpful;
                    r.verification_votes = verified;
                    event = Some(ChangeEvent::Resources(RowChange::Update { record: r.clone() }));
                }
            }
            TargetKind::ResourceEdit => {
                if let Some(e) = state.edits.iter_mut().find(|e| e.id == stored.target_id) {
                    e.verification_votes = verified;
                    event = Some(ChangeEvent::ResourceEdits(RowChange::Update { record: e.clone() }));
                }
            }
        }
        drop(state);
        if let Some(event) = event {
            self.emit(event);
        }
        Ok(stored)
    }

    async fn vote_counts(&self, resource_id: &str) -> Result<VoteCounts, ClientError> {
        self.check_read()?;
        self.resource_row(resource_id)
            .map(|r| r.counts())
            .ok_or_else(|| ClientError::NotFound(format!("Resource {} not found", resource_id)))
    }

    async fn record_visit(
        &self,
        request: &RecordVisitRequest,
    ) -> Result<VisitorRecord, ClientError> {
        self.check_write()?;
        let mut state = self.state.lock().unwrap();
        let record = state
            .visitors
            .entry(request.voter_identity.clone())
            .and_modify(|v| v.visit_count += 1)
            .or_insert_with(|| VisitorRecord {
                voter_identity: request.voter_identity.clone(),
                user_agent: request.user_agent.clone(),
                visit_count: 1,
                last_visit: at(0),
            });
        Ok(record.clone())
    }

    async fn visitor_count(&self) -> Result<i64, ClientError> {
        self.check_read()?;
        Ok(self.state.lock().unwrap().visitors.len() as i64)
    }

    async fn subscribe_changes(&self) -> Result<ChangeStream, ClientError> {
        self.check_read()?;
        let stream = BroadcastStream::new(self.changes.subscribe()).map(|item| {
            item.map_err(|e| ClientError::RemoteReadFailed(format!("Change stream lagged: {}", e)))
        });
        Ok(stream.boxed())
    }
}
