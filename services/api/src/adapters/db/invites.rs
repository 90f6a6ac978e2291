//! services/api/src/adapters/db/invites.rs

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use roma_core::domain::{Invitation, InvitationStatus, NewInvitation};
use roma_core::ports::{InviteRepository, PortError, PortResult};
use sqlx::FromRow;
use uuid::Uuid;

use super::{db_error, DbAdapter};

const COLUMNS: &str = "id, code, coach_id, email, name, status, expires_at, accepted_by, \
                       accepted_at, created_at";

#[derive(FromRow)]
struct InvitationRecord {
    id: Uuid,
    code: String,
    coach_id: Uuid,
    email: String,
    name: Option<String>,
    status: String,
    expires_at: DateTime<Utc>,
    accepted_by: Option<Uuid>,
    accepted_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}
impl InvitationRecord {
    fn to_domain(self) -> Result<Invitation, PortError> {
        let status = InvitationStatus::parse(&self.status).ok_or_else(|| {
            PortError::Unexpected(format!("unknown invitation status '{}'", self.status))
        })?;
        Ok(Invitation {
            id: self.id,
            code: self.code,
            coach_id: self.coach_id,
            email: self.email,
            name: self.name,
            status,
            expires_at: self.expires_at,
            accepted_by: self.accepted_by,
            accepted_at: self.accepted_at,
            created_at: self.created_at,
        })
    }
}

#[async_trait]
impl InviteRepository for DbAdapter {
    async fn create_invitation(&self, input: &NewInvitation) -> PortResult<Invitation> {
        sqlx::query_as::<_, InvitationRecord>(&format!(
            "INSERT INTO invitations (code, coach_id, email, name, expires_at)
             VALUES ($1, $2, $3, $4, $5) RETURNING {COLUMNS}"
        ))
        .bind(&input.code)
        .bind(input.coach_id)
        .bind(&input.email)
        .bind(&input.name)
        .bind(input.expires_at)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| db_error(e, "invitation"))?
        .to_domain()
    }

    async fn find_invitation(&self, code: &str) -> PortResult<Invitation> {
        sqlx::query_as::<_, InvitationRecord>(&format!(
            "SELECT {COLUMNS} FROM invitations WHERE code = $1"
        ))
        .bind(code)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| db_error(e, "invitation"))?
        .to_domain()
    }

    async fn list_invitations(&self, coach_id: Uuid) -> PortResult<Vec<Invitation>> {
        sqlx::query_as::<_, InvitationRecord>(&format!(
            "SELECT {COLUMNS} FROM invitations WHERE coach_id = $1
             ORDER BY created_at DESC, id DESC"
        ))
        .bind(coach_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_error(e, "invitation"))?
        .into_iter()
        .map(InvitationRecord::to_domain)
        .collect()
    }

    async fn mark_accepted(
        &self,
        id: Uuid,
        accepted_by: Uuid,
        at: DateTime<Utc>,
    ) -> PortResult<Invitation> {
        sqlx::query_as::<_, InvitationRecord>(&format!(
            "UPDATE invitations SET status = 'accepted', accepted_by = $2, accepted_at = $3
             WHERE id = $1 RETURNING {COLUMNS}"
        ))
        .bind(id)
        .bind(accepted_by)
        .bind(at)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| db_error(e, "invitation"))?
        .to_domain()
    }

    async fn mark_revoked(&self, id: Uuid) -> PortResult<Invitation> {
        sqlx::query_as::<_, InvitationRecord>(&format!(
            "UPDATE invitations SET status = 'revoked' WHERE id = $1 RETURNING {COLUMNS}"
        ))
        .bind(id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| db_error(e, "invitation"))?
        .to_domain()
    }
}
