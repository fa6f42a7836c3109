//! Database repository for resources and edit proposals.
//!
//! Lifecycle rules live here: whatever a caller sends, submission flags and
//! moderation state are decided by the repository.

use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use sqlx::{Row, SqlitePool};

use crate::errors::AppError;
use crate::models::{
    DirectorySnapshot, EditStatus, Moderation, Resource, ResourceEdit, ResourceFields,
    ResourceStatus, RevisionInfo, Submission, VerificationStatus, VoteCounts,
};

const RESOURCE_COLUMNS: &str = "id, name, type, category, address, contact, email, website, \
     description, hours, services, status, is_user_submitted, is_admin_submitted, approved, \
     verification_status, helpful_votes, unhelpful_votes, verification_votes, created_at, updated_at";

const EDIT_COLUMNS: &str = "id, original_resource_id, name, type, category, address, contact, \
     email, website, description, hours, services, status, verification_status, \
     verification_votes, created_at, updated_at";

/// Database repository for all data operations.
#[derive(Clone)]
pub struct Repository {
    pub(super) pool: SqlitePool,
}

impl Repository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Get the current revision ID.
    pub async fn get_revision_id(&self) -> Result<i64, AppError> {
        let row = sqlx::query("SELECT revision_id FROM meta WHERE id = 1")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.get("revision_id"))
    }

    /// Get revision info.
    pub async fn get_revision_info(&self) -> Result<RevisionInfo, AppError> {
        let row = sqlx::query("SELECT revision_id, generated_at FROM meta WHERE id = 1")
            .fetch_one(&self.pool)
            .await?;
        Ok(RevisionInfo {
            revision_id: row.get("revision_id"),
            generated_at: row.get("generated_at"),
        })
    }

    /// Increment the revision ID and return the new value.
    pub async fn increment_revision(&self) -> Result<i64, AppError> {
        sqlx::query("UPDATE meta SET revision_id = revision_id + 1, generated_at = ? WHERE id = 1")
            .bind(stamp(&now()))
            .execute(&self.pool)
            .await?;
        self.get_revision_id().await
    }

    /// All resources plus pending edits, as one consistent load.
    pub async fn get_snapshot(&self) -> Result<DirectorySnapshot, AppError> {
        let mut tx = self.pool.begin().await?;

        let meta =
            sqlx::query("SELECT schema_version, revision_id, generated_at FROM meta WHERE id = 1")
                .fetch_one(&mut *tx)
                .await?;

        let resource_rows = sqlx::query(&format!(
            "SELECT {} FROM resources ORDER BY created_at DESC, rowid DESC",
            RESOURCE_COLUMNS
        ))
        .fetch_all(&mut *tx)
        .await?;

        let edit_rows = sqlx::query(&format!(
            "SELECT {} FROM resource_edits WHERE verification_status = 'pending' \
             ORDER BY created_at DESC, rowid DESC",
            EDIT_COLUMNS
        ))
        .fetch_all(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(DirectorySnapshot {
            schema_version: meta.get("schema_version"),
            revision_id: meta.get("revision_id"),
            generated_at: meta.get("generated_at"),
            resources: resource_rows
                .iter()
                .map(resource_from_row)
                .collect::<Result<_, _>>()?,
            pending_edits: edit_rows
                .iter()
                .map(edit_from_row)
                .collect::<Result<_, _>>()?,
        })
    }

    // ==================== RESOURCE OPERATIONS ====================

    /// List resources newest-first, optionally only live ones.
    pub async fn list_resources(&self, live_only: bool) -> Result<Vec<Resource>, AppError> {
        let filter = if live_only {
            "WHERE approved = 1 AND verification_status = 'live'"
        } else {
            ""
        };
        let rows = sqlx::query(&format!(
            "SELECT {} FROM resources {} ORDER BY created_at DESC, rowid DESC",
            RESOURCE_COLUMNS, filter
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(resource_from_row).collect()
    }

    /// Get a resource by ID.
    pub async fn get_resource(&self, id: &str) -> Result<Option<Resource>, AppError> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM resources WHERE id = ?",
            RESOURCE_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(resource_from_row).transpose()
    }

    /// Create a resource. The submission path alone decides its moderation state.
    pub async fn create_resource(
        &self,
        fields: &ResourceFields,
        submission: Submission,
    ) -> Result<Resource, AppError> {
        let id = uuid::Uuid::new_v4().to_string();
        let now = now();
        let (approved, verification_status, is_user_submitted, is_admin_submitted) =
            submission.initial_state();

        sqlx::query(
            r#"INSERT INTO resources (
                id, name, type, category, address, contact, email, website,
                description, hours, services, status, is_user_submitted, is_admin_submitted,
                approved, verification_status, helpful_votes, unhelpful_votes,
                verification_votes, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 0, 0, 0, ?, ?)"#,
        )
        .bind(&id)
        .bind(&fields.name)
        .bind(&fields.resource_type)
        .bind(&fields.category)
        .bind(&fields.address)
        .bind(&fields.contact)
        .bind(&fields.email)
        .bind(&fields.website)
        .bind(&fields.description)
        .bind(&fields.hours)
        .bind(services_json(&fields.services))
        .bind(fields.status.as_str())
        .bind(is_user_submitted as i32)
        .bind(is_admin_submitted as i32)
        .bind(approved as i32)
        .bind(verification_status.as_str())
        .bind(stamp(&now))
        .bind(stamp(&now))
        .execute(&self.pool)
        .await?;

        self.increment_revision().await?;

        tracing::info!(
            resource_id = %id,
            status = verification_status.as_str(),
            "Resource created"
        );

        Ok(Resource {
            id,
            fields: fields.clone(),
            is_user_submitted,
            is_admin_submitted,
            approved,
            verification_status,
            helpful_votes: 0,
            unhelpful_votes: 0,
            verification_votes: 0,
            created_at: now,
            updated_at: now,
        })
    }

    /// Privileged direct edit: overwrite fields and put the resource live.
    pub async fn admin_update_resource(
        &self,
        id: &str,
        fields: &ResourceFields,
    ) -> Result<Resource, AppError> {
        let now = now();
        let result = sqlx::query(
            r#"UPDATE resources SET
                name = ?, type = ?, category = ?, address = ?, contact = ?, email = ?,
                website = ?, description = ?, hours = ?, services = ?, status = ?,
                is_admin_submitted = 1, approved = 1, verification_status = 'live',
                updated_at = ?
            WHERE id = ?"#,
        )
        .bind(&fields.name)
        .bind(&fields.resource_type)
        .bind(&fields.category)
        .bind(&fields.address)
        .bind(&fields.contact)
        .bind(&fields.email)
        .bind(&fields.website)
        .bind(&fields.description)
        .bind(&fields.hours)
        .bind(services_json(&fields.services))
        .bind(fields.status.as_str())
        .bind(stamp(&now))
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Resource {} not found", id)));
        }

        self.increment_revision().await?;
        self.require_resource(id).await
    }

    /// Approve or reject a resource. Never returns it to pending.
    pub async fn moderate_resource(
        &self,
        id: &str,
        decision: Moderation,
    ) -> Result<Resource, AppError> {
        let sql = match decision {
            Moderation::Approve => {
                "UPDATE resources SET verification_status = 'live', approved = 1, updated_at = ? WHERE id = ?"
            }
            Moderation::Reject => {
                "UPDATE resources SET verification_status = 'rejected', updated_at = ? WHERE id = ?"
            }
        };

        let result = sqlx::query(sql)
            .bind(stamp(&now()))
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Resource {} not found", id)));
        }

        self.increment_revision().await?;
        tracing::info!(resource_id = %id, ?decision, "Resource moderated");
        self.require_resource(id).await
    }

    /// Delete a resource. Edits referencing it are left alone.
    pub async fn delete_resource(&self, id: &str) -> Result<(), AppError> {
        let result = sqlx::query("DELETE FROM resources WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Resource {} not found", id)));
        }

        self.increment_revision().await?;
        Ok(())
    }

    /// Read back the store-maintained counters of a resource.
    pub async fn get_vote_counts(&self, id: &str) -> Result<VoteCounts, AppError> {
        Ok(self.require_resource(id).await?.counts())
    }

    async fn require_resource(&self, id: &str) -> Result<Resource, AppError> {
        self.get_resource(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Resource {} not found", id)))
    }

    // ==================== EDIT OPERATIONS ====================

    /// List edits newest-first, optionally filtered by status.
    pub async fn list_edits(&self, status: Option<EditStatus>) -> Result<Vec<ResourceEdit>, AppError> {
        let rows = match status {
            Some(status) => {
                sqlx::query(&format!(
                    "SELECT {} FROM resource_edits WHERE verification_status = ? \
                     ORDER BY created_at DESC, rowid DESC",
                    EDIT_COLUMNS
                ))
                .bind(status.as_str())
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query(&format!(
                    "SELECT {} FROM resource_edits ORDER BY created_at DESC, rowid DESC",
                    EDIT_COLUMNS
                ))
                .fetch_all(&self.pool)
                .await?
            }
        };

        rows.iter().map(edit_from_row).collect()
    }

    /// Get an edit by ID.
    pub async fn get_edit(&self, id: &str) -> Result<Option<ResourceEdit>, AppError> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM resource_edits WHERE id = ?",
            EDIT_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(edit_from_row).transpose()
    }

    /// Record a proposed edit. The target resource is not touched.
    pub async fn create_edit(
        &self,
        resource_id: &str,
        fields: &ResourceFields,
    ) -> Result<ResourceEdit, AppError> {
        self.require_resource(resource_id).await?;

        let id = uuid::Uuid::new_v4().to_string();
        let now = now();

        sqlx::query(
            r#"INSERT INTO resource_edits (
                id, original_resource_id, name, type, category, address, contact, email,
                website, description, hours, services, status, verification_status,
                verification_votes, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 'pending', 0, ?, ?)"#,
        )
        .bind(&id)
        .bind(resource_id)
        .bind(&fields.name)
        .bind(&fields.resource_type)
        .bind(&fields.category)
        .bind(&fields.address)
        .bind(&fields.contact)
        .bind(&fields.email)
        .bind(&fields.website)
        .bind(&fields.description)
        .bind(&fields.hours)
        .bind(services_json(&fields.services))
        .bind(fields.status.as_str())
        .bind(stamp(&now))
        .bind(stamp(&now))
        .execute(&self.pool)
        .await?;

        self.increment_revision().await?;

        tracing::info!(edit_id = %id, resource_id = %resource_id, "Edit proposed");

        Ok(ResourceEdit {
            id,
            original_resource_id: resource_id.to_string(),
            fields: fields.clone(),
            verification_status: EditStatus::Pending,
            verification_votes: 0,
            created_at: now,
            updated_at: now,
        })
    }

    /// Apply a pending edit onto its resource and make the edit terminal.
    ///
    /// Moderation state and provenance of the resource are left as they are.
    pub async fn approve_edit(&self, edit_id: &str) -> Result<(ResourceEdit, Resource), AppError> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query(&format!(
            "SELECT {} FROM resource_edits WHERE id = ?",
            EDIT_COLUMNS
        ))
        .bind(edit_id)
        .fetch_optional(&mut *tx)
        .await?;

        let edit = row
            .as_ref()
            .map(edit_from_row)
            .transpose()?
            .ok_or_else(|| AppError::NotFound(format!("Edit {} not found", edit_id)))?;

        if edit.verification_status.is_terminal() {
            return Err(AppError::NotPending(format!(
                "Edit {} is already {}",
                edit_id,
                edit.verification_status.as_str()
            )));
        }

        let now = now();
        let fields = &edit.fields;
        let applied = sqlx::query(
            r#"UPDATE resources SET
                name = ?, type = ?, category = ?, address = ?, contact = ?, email = ?,
                website = ?, description = ?, hours = ?, services = ?, status = ?,
                updated_at = ?
            WHERE id = ?"#,
        )
        .bind(&fields.name)
        .bind(&fields.resource_type)
        .bind(&fields.category)
        .bind(&fields.address)
        .bind(&fields.contact)
        .bind(&fields.email)
        .bind(&fields.website)
        .bind(&fields.description)
        .bind(&fields.hours)
        .bind(services_json(&fields.services))
        .bind(fields.status.as_str())
        .bind(stamp(&now))
        .bind(&edit.original_resource_id)
        .execute(&mut *tx)
        .await?;

        if applied.rows_affected() == 0 {
            return Err(AppError::NotFound(format!(
                "Resource {} targeted by edit {} not found",
                edit.original_resource_id, edit_id
            )));
        }

        // Guarded on status so a concurrent approval cannot apply twice
        let marked = sqlx::query(
            "UPDATE resource_edits SET verification_status = 'approved', updated_at = ? \
             WHERE id = ? AND verification_status = 'pending'",
        )
        .bind(stamp(&now))
        .bind(edit_id)
        .execute(&mut *tx)
        .await?;

        if marked.rows_affected() == 0 {
            return Err(AppError::NotPending(format!(
                "Edit {} was resolved concurrently",
                edit_id
            )));
        }

        sqlx::query("UPDATE meta SET revision_id = revision_id + 1, generated_at = ? WHERE id = 1")
            .bind(stamp(&now))
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        tracing::info!(
            edit_id = %edit_id,
            resource_id = %edit.original_resource_id,
            "Edit approved and applied"
        );

        let resource = self.require_resource(&edit.original_resource_id).await?;
        let edit = ResourceEdit {
            verification_status: EditStatus::Approved,
            updated_at: now,
            ..edit
        };
        Ok((edit, resource))
    }

    /// Reject a pending edit. Terminal.
    pub async fn reject_edit(&self, edit_id: &str) -> Result<ResourceEdit, AppError> {
        let existing = self
            .get_edit(edit_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Edit {} not found", edit_id)))?;

        let now = now();
        let result = sqlx::query(
            "UPDATE resource_edits SET verification_status = 'rejected', updated_at = ? \
             WHERE id = ? AND verification_status = 'pending'",
        )
        .bind(stamp(&now))
        .bind(edit_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotPending(format!(
                "Edit {} is already {}",
                edit_id,
                existing.verification_status.as_str()
            )));
        }

        self.increment_revision().await?;

        Ok(ResourceEdit {
            verification_status: EditStatus::Rejected,
            updated_at: now,
            ..existing
        })
    }
}

// Helper functions for row conversion

/// Current time at the precision the store keeps.
pub(super) fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

/// Fixed-width RFC 3339, so text ordering matches time ordering.
pub(super) fn stamp(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(super) fn parse_stamp(raw: &str) -> Result<DateTime<Utc>, AppError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| AppError::Internal(format!("Invalid timestamp '{}': {}", raw, e)))
}

fn services_json(services: &[String]) -> String {
    serde_json::to_string(services).unwrap_or_else(|_| "[]".to_string())
}

fn parse_json_array(s: &str) -> Vec<String> {
    serde_json::from_str(s).unwrap_or_default()
}

fn fields_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<ResourceFields, AppError> {
    let services: Option<String> = row.try_get("services")?;
    let status: String = row.try_get("status")?;
    Ok(ResourceFields {
        name: row.try_get("name")?,
        resource_type: row.try_get("type")?,
        category: row.try_get("category")?,
        address: row.try_get("address")?,
        contact: row.try_get("contact")?,
        email: row.try_get("email")?,
        website: row.try_get("website")?,
        description: row.try_get("description")?,
        hours: row.try_get("hours")?,
        services: services.map(|s| parse_json_array(&s)).unwrap_or_default(),
        status: ResourceStatus::parse(&status).unwrap_or_default(),
    })
}

fn resource_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Resource, AppError> {
    let is_user_submitted: i32 = row.try_get("is_user_submitted")?;
    let is_admin_submitted: i32 = row.try_get("is_admin_submitted")?;
    let approved: i32 = row.try_get("approved")?;
    let verification_status: String = row.try_get("verification_status")?;
    let created_at: String = row.try_get("created_at")?;
    let updated_at: String = row.try_get("updated_at")?;

    Ok(Resource {
        id: row.try_get("id")?,
        fields: fields_from_row(row)?,
        is_user_submitted: is_user_submitted != 0,
        is_admin_submitted: is_admin_submitted != 0,
        approved: approved != 0,
        verification_status: VerificationStatus::parse(&verification_status).ok_or_else(|| {
            AppError::Internal(format!("Unknown verification status '{}'", verification_status))
        })?,
        helpful_votes: row.try_get("helpful_votes")?,
        unhelpful_votes: row.try_get("unhelpful_votes")?,
        verification_votes: row.try_get("verification_votes")?,
        created_at: parse_stamp(&created_at)?,
        updated_at: parse_stamp(&updated_at)?,
    })
}

fn edit_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<ResourceEdit, AppError> {
    let verification_status: String = row.try_get("verification_status")?;
    let created_at: String = row.try_get("created_at")?;
    let updated_at: String = row.try_get("updated_at")?;

    Ok(ResourceEdit {
        id: row.try_get("id")?,
        original_resource_id: row.try_get("original_resource_id")?,
        fields: fields_from_row(row)?,
        verification_status: EditStatus::parse(&verification_status).ok_or_else(|| {
            AppError::Internal(format!("Unknown edit status '{}'", verification_status))
        })?,
        verification_votes: row.try_get("verification_votes")?,
        created_at: parse_stamp(&created_at)?,
        updated_at: parse_stamp(&updated_at)?,
    })
}
