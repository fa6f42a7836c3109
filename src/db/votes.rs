//! Vote and visitor persistence.
//!
//! Counter maintenance happens here, in the same transaction as the vote
//! insert, so concurrent voters never race on a client-side increment.

use sqlx::{Row, Sqlite, Transaction};

use super::repository::{now, parse_stamp, stamp, Repository};
use crate::errors::AppError;
use crate::models::{
    NewVote, Resource, ResourceEdit, TargetKind, VisitorRecord, Vote, VoteKind, VoteType,
};

/// A stored vote plus whichever row had its counters recomputed.
#[derive(Debug, Clone)]
pub struct VoteInsert {
    pub vote: Vote,
    pub resource: Option<Resource>,
    pub edit: Option<ResourceEdit>,
}

impl Repository {
    // ==================== VOTE OPERATIONS ====================

    /// Votes already cast by `voter` on a target. The pre-insert check.
    pub async fn find_votes(
        &self,
        kind: VoteKind,
        target_id: &str,
        target_kind: TargetKind,
        voter: &str,
    ) -> Result<Vec<Vote>, AppError> {
        let rows = match (kind, target_kind) {
            (VoteKind::Helpfulness, _) => {
                sqlx::query(
                    "SELECT id, resource_id AS target_id, voter_ip, vote_type, created_at \
                     FROM resource_votes WHERE resource_id = ? AND voter_ip = ?",
                )
                .bind(target_id)
                .bind(voter)
                .fetch_all(&self.pool)
                .await?
            }
            (VoteKind::Verification, TargetKind::Resource) => {
                sqlx::query(
                    "SELECT id, resource_id AS target_id, voter_ip, vote_type, created_at \
                     FROM verification_votes WHERE resource_id = ? AND voter_ip = ?",
                )
                .bind(target_id)
                .bind(voter)
                .fetch_all(&self.pool)
                .await?
            }
            (VoteKind::Verification, TargetKind::ResourceEdit) => {
                sqlx::query(
                    "SELECT id, edit_id AS target_id, voter_ip, vote_type, created_at \
                     FROM verification_votes WHERE edit_id = ? AND voter_ip = ?",
                )
                .bind(target_id)
                .bind(voter)
                .fetch_all(&self.pool)
                .await?
            }
        };

        rows.iter()
            .map(|row| vote_from_row(row, kind, target_kind))
            .collect()
    }

    /// Insert a vote and recompute the target's counters.
    ///
    /// Deduplication is the caller's pre-insert check, not a constraint here.
    pub async fn insert_vote(&self, kind: VoteKind, request: &NewVote) -> Result<VoteInsert, AppError> {
        if !kind.accepts(request.target_kind) {
            return Err(AppError::Validation(format!(
                "{} votes can only target resources",
                kind.as_str()
            )));
        }

        let id = uuid::Uuid::new_v4().to_string();
        let now = now();
        let mut tx = self.pool.begin().await?;

        match (kind, request.target_kind) {
            (VoteKind::Helpfulness, _) => {
                ensure_exists(&mut tx, "resources", &request.target_id).await?;
                sqlx::query(
                    "INSERT INTO resource_votes (id, resource_id, voter_ip, vote_type, created_at) \
                     VALUES (?, ?, ?, ?, ?)",
                )
                .bind(&id)
                .bind(&request.target_id)
                .bind(&request.voter_identity)
                .bind(request.vote_type.as_str())
                .bind(stamp(&now))
                .execute(&mut *tx)
                .await?;

                sqlx::query(
                    r#"UPDATE resources SET
                        helpful_votes = (SELECT COUNT(*) FROM resource_votes
                            WHERE resource_id = resources.id AND vote_type = 'helpful'),
                        unhelpful_votes = (SELECT COUNT(*) FROM resource_votes
                            WHERE resource_id = resources.id AND vote_type = 'unhelpful'),
                        updated_at = ?
                    WHERE id = ?"#,
                )
                .bind(stamp(&now))
                .bind(&request.target_id)
                .execute(&mut *tx)
                .await?;
            }
            (VoteKind::Verification, TargetKind::Resource) => {
                ensure_exists(&mut tx, "resources", &request.target_id).await?;
                sqlx::query(
                    "INSERT INTO verification_votes (id, resource_id, edit_id, voter_ip, vote_type, created_at) \
                     VALUES (?, ?, NULL, ?, ?, ?)",
                )
                .bind(&id)
                .bind(&request.target_id)
                .bind(&request.voter_identity)
                .bind(request.vote_type.as_str())
                .bind(stamp(&now))
                .execute(&mut *tx)
                .await?;

                sqlx::query(
                    r#"UPDATE resources SET
                        verification_votes = (SELECT COUNT(*) FROM verification_votes
                            WHERE resource_id = resources.id AND vote_type = 'helpful'),
                        updated_at = ?
                    WHERE id = ?"#,
                )
                .bind(stamp(&now))
                .bind(&request.target_id)
                .execute(&mut *tx)
                .await?;
            }
            (VoteKind::Verification, TargetKind::ResourceEdit) => {
                ensure_exists(&mut tx, "resource_edits", &request.target_id).await?;
                sqlx::query(
                    "INSERT INTO verification_votes (id, resource_id, edit_id, voter_ip, vote_type, created_at) \
                     VALUES (?, NULL, ?, ?, ?, ?)",
                )
                .bind(&id)
                .bind(&request.target_id)
                .bind(&request.voter_identity)
                .bind(request.vote_type.as_str())
                .bind(stamp(&now))
                .execute(&mut *tx)
                .await?;

                sqlx::query(
                    r#"UPDATE resource_edits SET
                        verification_votes = (SELECT COUNT(*) FROM verification_votes
                            WHERE edit_id = resource_edits.id AND vote_type = 'helpful'),
                        updated_at = ?
                    WHERE id = ?"#,
                )
                .bind(stamp(&now))
                .bind(&request.target_id)
                .execute(&mut *tx)
                .await?;
            }
        }

        sqlx::query("UPDATE meta SET revision_id = revision_id + 1, generated_at = ? WHERE id = 1")
            .bind(stamp(&now))
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        tracing::debug!(
            vote_id = %id,
            kind = kind.as_str(),
            target_id = %request.target_id,
            vote_type = request.vote_type.as_str(),
            "Vote recorded"
        );

        let (resource, edit) = match request.target_kind {
            TargetKind::Resource => (self.get_resource(&request.target_id).await?, None),
            TargetKind::ResourceEdit => (None, self.get_edit(&request.target_id).await?),
        };

        Ok(VoteInsert {
            vote: Vote {
                id,
                kind,
                target_id: request.target_id.clone(),
                target_kind: request.target_kind,
                voter_identity: request.voter_identity.clone(),
                vote_type: request.vote_type,
                created_at: now,
            },
            resource,
            edit,
        })
    }

    // ==================== VISITOR OPERATIONS ====================

    /// Record a visit: insert on first sight, otherwise bump the counter.
    pub async fn record_visit(
        &self,
        voter_identity: &str,
        user_agent: Option<&str>,
    ) -> Result<VisitorRecord, AppError> {
        let now = now();
        sqlx::query(
            r#"INSERT INTO visitor_tracking (visitor_ip, user_agent, visit_count, last_visit)
               VALUES (?, ?, 1, ?)
               ON CONFLICT(visitor_ip) DO UPDATE SET
                   visit_count = visit_count + 1,
                   last_visit = excluded.last_visit"#,
        )
        .bind(voter_identity)
        .bind(user_agent)
        .bind(stamp(&now))
        .execute(&self.pool)
        .await?;

        let row = sqlx::query(
            "SELECT visitor_ip, user_agent, visit_count, last_visit FROM visitor_tracking WHERE visitor_ip = ?",
        )
        .bind(voter_identity)
        .fetch_one(&self.pool)
        .await?;

        let last_visit: String = row.try_get("last_visit")?;
        Ok(VisitorRecord {
            voter_identity: row.try_get("visitor_ip")?,
            user_agent: row.try_get("user_agent")?,
            visit_count: row.try_get("visit_count")?,
            last_visit: parse_stamp(&last_visit)?,
        })
    }

    /// Total distinct visitors.
    pub async fn visitor_count(&self) -> Result<i64, AppError> {
        let row = sqlx::query("SELECT COUNT(*) AS total FROM visitor_tracking")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.try_get("total")?)
    }
}

async fn ensure_exists(
    tx: &mut Transaction<'_, Sqlite>,
    table: &str,
    id: &str,
) -> Result<(), AppError> {
    let found = sqlx::query(&format!("SELECT 1 FROM {} WHERE id = ?", table))
        .bind(id)
        .fetch_optional(&mut **tx)
        .await?;

    match found {
        Some(_) => Ok(()),
        None => Err(AppError::NotFound(format!("Vote target {} not found", id))),
    }
}

fn vote_from_row(
    row: &sqlx::sqlite::SqliteRow,
    kind: VoteKind,
    target_kind: TargetKind,
) -> Result<Vote, AppError> {
    let vote_type: String = row.try_get("vote_type")?;
    let created_at: String = row.try_get("created_at")?;
    Ok(Vote {
        id: row.try_get("id")?,
        kind,
        target_id: row.try_get("target_id")?,
        target_kind,
        voter_identity: row.try_get("voter_ip")?,
        vote_type: VoteType::parse(&vote_type)
            .ok_or_else(|| AppError::Internal(format!("Unknown vote type '{}'", vote_type)))?,
        created_at: parse_stamp(&created_at)?,
    })
}
