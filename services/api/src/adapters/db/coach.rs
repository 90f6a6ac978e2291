//! services/api/src/adapters/db/coach.rs

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use roma_core::domain::{CoachLink, Disciple, LinkLists, LinkStatus};
use roma_core::ports::{CoachRepository, PortError, PortResult};
use sqlx::FromRow;
use uuid::Uuid;

use super::{db_error, DbAdapter};

const LINK_COLUMNS: &str = "id, coach_id, disciple_id, status, created_at, updated_at";

#[derive(FromRow)]
struct LinkRecord {
    id: Uuid,
    coach_id: Uuid,
    disciple_id: Uuid,
    status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}
impl LinkRecord {
    fn to_domain(self) -> Result<CoachLink, PortError> {
        let status = LinkStatus::parse(&self.status).ok_or_else(|| {
            PortError::Unexpected(format!("unknown link status '{}'", self.status))
        })?;
        Ok(CoachLink {
            id: self.id,
            coach_id: self.coach_id,
            disciple_id: self.disciple_id,
            status,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(FromRow)]
struct DiscipleRecord {
    id: Uuid,
    email: String,
    name: String,
    linked_at: DateTime<Utc>,
}

#[async_trait]
impl CoachRepository for DbAdapter {
    async fn create_link(
        &self,
        coach_id: Uuid,
        disciple_id: Uuid,
        status: LinkStatus,
    ) -> PortResult<CoachLink> {
        sqlx::query_as::<_, LinkRecord>(&format!(
            "INSERT INTO coach_links (coach_id, disciple_id, status) VALUES ($1, $2, $3)
             RETURNING {LINK_COLUMNS}"
        ))
        .bind(coach_id)
        .bind(disciple_id)
        .bind(status.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| db_error(e, "link"))?
        .to_domain()
    }

    async fn update_link_status(&self, link_id: Uuid, status: LinkStatus) -> PortResult<CoachLink> {
        sqlx::query_as::<_, LinkRecord>(&format!(
            "UPDATE coach_links SET status = $2, updated_at = now() WHERE id = $1
             RETURNING {LINK_COLUMNS}"
        ))
        .bind(link_id)
        .bind(status.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| db_error(e, "link"))?
        .to_domain()
    }

    async fn list_links(&self, user_id: Uuid) -> PortResult<LinkLists> {
        let records = sqlx::query_as::<_, LinkRecord>(&format!(
            "SELECT {LINK_COLUMNS} FROM coach_links
             WHERE coach_id = $1 OR disciple_id = $1
             ORDER BY created_at DESC, id DESC"
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_error(e, "link"))?;

        let mut lists = LinkLists::default();
        for record in records {
            let link = record.to_domain()?;
            if link.disciple_id == user_id {
                lists.incoming.push(link.clone());
            }
            if link.coach_id == user_id {
                lists.outgoing.push(link);
            }
        }
        Ok(lists)
    }

    async fn has_accepted_link(&self, coach_id: Uuid, disciple_id: Uuid) -> PortResult<bool> {
        sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS (SELECT 1 FROM coach_links
             WHERE coach_id = $1 AND disciple_id = $2 AND status = 'accepted')",
        )
        .bind(coach_id)
        .bind(disciple_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| db_error(e, "link"))
    }

    async fn list_disciples(&self, coach_id: Uuid) -> PortResult<Vec<Disciple>> {
        // One row per disciple: the oldest accepted link wins.
        let records = sqlx::query_as::<_, DiscipleRecord>(
            "SELECT id, email, name, linked_at FROM (
                 SELECT DISTINCT ON (u.id) u.id, u.email, u.name, l.updated_at AS linked_at
                 FROM coach_links l JOIN users u ON u.id = l.disciple_id
                 WHERE l.coach_id = $1 AND l.disciple_id <> $1 AND l.status = 'accepted'
                 ORDER BY u.id, l.created_at ASC
             ) d ORDER BY name ASC, id ASC",
        )
        .bind(coach_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_error(e, "disciple"))?;
        Ok(records
            .into_iter()
            .map(|r| Disciple {
                id: r.id,
                email: r.email,
                name: r.name,
                linked_at: r.linked_at,
            })
            .collect())
    }
}
