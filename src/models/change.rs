//! Change notifications published by the store after every committed mutation.

use serde::{Deserialize, Serialize};

use super::{Resource, ResourceEdit};

/// A single row change. Inserts and updates carry the full row.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "op", rename_all = "UPPERCASE")]
pub enum RowChange<T> {
    Insert { record: T },
    Update { record: T },
    Delete { id: String },
}

impl<T> RowChange<T> {
    pub fn op(&self) -> &'static str {
        match self {
            RowChange::Insert { .. } => "INSERT",
            RowChange::Update { .. } => "UPDATE",
            RowChange::Delete { .. } => "DELETE",
        }
    }
}

/// A change on one of the two observed collections.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "collection", content = "change", rename_all = "snake_case")]
pub enum ChangeEvent {
    Resources(RowChange<Resource>),
    ResourceEdits(RowChange<ResourceEdit>),
}

impl ChangeEvent {
    pub fn collection(&self) -> &'static str {
        match self {
            ChangeEvent::Resources(_) => "resources",
            ChangeEvent::ResourceEdits(_) => "resource_edits",
        }
    }

    pub fn op(&self) -> &'static str {
        match self {
            ChangeEvent::Resources(change) => change.op(),
            ChangeEvent::ResourceEdits(change) => change.op(),
        }
    }

    /// Id of the affected row.
    pub fn row_id(&self) -> &str {
        match self {
            ChangeEvent::Resources(change) => match change {
                RowChange::Insert { record } | RowChange::Update { record } => &record.id,
                RowChange::Delete { id } => id,
            },
            ChangeEvent::ResourceEdits(change) => match change {
                RowChange::Insert { record } | RowChange::Update { record } => &record.id,
                RowChange::Delete { id } => id,
            },
        }
    }
}

/// A change tagged with the revision it produced.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChangeNotification {
    pub revision_id: i64,
    pub event: ChangeEvent,
}
