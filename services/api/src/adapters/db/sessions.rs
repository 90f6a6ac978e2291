//! services/api/src/adapters/db/sessions.rs

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use roma_core::domain::{
    CardioSegment, CurrentSession, NewCardio, NewSession, NewSet, SessionLog, SessionPatch,
    SessionStatus, SetLog, SetPatch, SetView,
};
use roma_core::ports::{PortError, PortResult, SessionRepository};
use sqlx::{FromRow, Postgres, QueryBuilder};
use uuid::Uuid;

use super::{db_error, expect_row, DbAdapter};

const SESSION_COLUMNS: &str = "id, assignment_id, day_id, disciple_id, performed_at, status, \
                               ended_at, notes, created_at, updated_at";
const SET_COLUMNS: &str = "id, session_id, prescription_id, set_index, weight, reps, rpe, \
                           to_failure, created_at";
const CARDIO_COLUMNS: &str = "id, session_id, modality, minutes, target_hr_min, target_hr_max, notes";

//=========================================================================================
// Records
//=========================================================================================

#[derive(FromRow)]
pub(super) struct SessionRecord {
    id: Uuid,
    assignment_id: Uuid,
    day_id: Uuid,
    disciple_id: Uuid,
    performed_at: DateTime<Utc>,
    status: String,
    ended_at: Option<DateTime<Utc>>,
    notes: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}
impl SessionRecord {
    pub(super) fn to_domain(self) -> Result<SessionLog, PortError> {
        Ok(SessionLog {
            id: self.id,
            assignment_id: self.assignment_id,
            day_id: self.day_id,
            disciple_id: self.disciple_id,
            performed_at: self.performed_at,
            status: parse_status(&self.status)?,
            ended_at: self.ended_at,
            notes: self.notes,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

pub(super) fn parse_status(raw: &str) -> Result<SessionStatus, PortError> {
    SessionStatus::parse(raw)
        .ok_or_else(|| PortError::Unexpected(format!("unknown session status '{raw}'")))
}

#[derive(FromRow)]
struct SetRecord {
    id: Uuid,
    session_id: Uuid,
    prescription_id: Uuid,
    set_index: i32,
    weight: Option<f64>,
    reps: i32,
    rpe: Option<f32>,
    to_failure: bool,
    created_at: DateTime<Utc>,
}
impl SetRecord {
    fn to_domain(self) -> SetLog {
        SetLog {
            id: self.id,
            session_id: self.session_id,
            prescription_id: self.prescription_id,
            set_index: self.set_index,
            weight: self.weight,
            reps: self.reps,
            rpe: self.rpe,
            to_failure: self.to_failure,
            created_at: self.created_at,
        }
    }
}

#[derive(FromRow)]
struct SetViewRecord {
    #[sqlx(flatten)]
    set: SetRecord,
    exercise_id: Uuid,
    exercise_name: String,
}

#[derive(FromRow)]
struct CardioRecord {
    id: Uuid,
    session_id: Uuid,
    modality: String,
    minutes: i32,
    target_hr_min: Option<i32>,
    target_hr_max: Option<i32>,
    notes: Option<String>,
}
impl CardioRecord {
    fn to_domain(self) -> CardioSegment {
        CardioSegment {
            id: self.id,
            session_id: self.session_id,
            modality: self.modality,
            minutes: self.minutes,
            target_hr_min: self.target_hr_min,
            target_hr_max: self.target_hr_max,
            notes: self.notes,
        }
    }
}

#[derive(FromRow)]
struct CurrentSessionRecord {
    id: Uuid,
    performed_at: DateTime<Utc>,
    sets_count: i64,
}

//=========================================================================================
// `SessionRepository` Trait Implementation
//=========================================================================================

#[async_trait]
impl SessionRepository for DbAdapter {
    async fn create_session(&self, input: &NewSession) -> PortResult<SessionLog> {
        sqlx::query_as::<_, SessionRecord>(&format!(
            "INSERT INTO session_logs (assignment_id, day_id, disciple_id, performed_at, notes)
             VALUES ($1, $2, $3, $4, $5) RETURNING {SESSION_COLUMNS}"
        ))
        .bind(input.assignment_id)
        .bind(input.day_id)
        .bind(input.disciple_id)
        .bind(input.performed_at)
        .bind(&input.notes)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| db_error(e, "session"))?
        .to_domain()
    }

    async fn get_session(&self, id: Uuid) -> PortResult<SessionLog> {
        sqlx::query_as::<_, SessionRecord>(&format!(
            "SELECT {SESSION_COLUMNS} FROM session_logs WHERE id = $1"
        ))
        .bind(id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| db_error(e, "session"))?
        .to_domain()
    }

    async fn update_session(&self, id: Uuid, patch: &SessionPatch) -> PortResult<SessionLog> {
        let mut qb = QueryBuilder::<Postgres>::new("UPDATE session_logs SET updated_at = now()");
        if let Some(at) = patch.performed_at {
            qb.push(", performed_at = ").push_bind(at);
        }
        if let Some(notes) = &patch.notes {
            qb.push(", notes = ").push_bind(notes);
        }
        if let Some(status) = patch.status {
            qb.push(", status = ").push_bind(status.as_str());
        }
        if let Some(ended_at) = patch.ended_at {
            qb.push(", ended_at = ").push_bind(ended_at);
        }
        qb.push(" WHERE id = ")
            .push_bind(id)
            .push(format!(" RETURNING {SESSION_COLUMNS}"));
        qb.build_query_as::<SessionRecord>()
            .fetch_one(&self.pool)
            .await
            .map_err(|e| db_error(e, "session"))?
            .to_domain()
    }

    async fn latest_open_session(&self, disciple_id: Uuid) -> PortResult<Option<SessionLog>> {
        sqlx::query_as::<_, SessionRecord>(&format!(
            "SELECT {SESSION_COLUMNS} FROM session_logs
             WHERE disciple_id = $1 AND status = 'open'
             ORDER BY performed_at DESC, created_at DESC LIMIT 1"
        ))
        .bind(disciple_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error(e, "session"))?
        .map(SessionRecord::to_domain)
        .transpose()
    }

    async fn latest_session_for_day(
        &self,
        assignment_id: Uuid,
        day_id: Uuid,
    ) -> PortResult<Option<CurrentSession>> {
        let record = sqlx::query_as::<_, CurrentSessionRecord>(
            "SELECT s.id, s.performed_at,
             (SELECT COUNT(*) FROM set_logs l WHERE l.session_id = s.id) AS sets_count
             FROM session_logs s WHERE s.assignment_id = $1 AND s.day_id = $2
             ORDER BY s.performed_at DESC, s.created_at DESC LIMIT 1",
        )
        .bind(assignment_id)
        .bind(day_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error(e, "session"))?;
        Ok(record.map(|r| CurrentSession {
            id: r.id,
            started_at: r.performed_at,
            sets_count: r.sets_count,
        }))
    }

    async fn add_set(&self, input: &NewSet) -> PortResult<SetLog> {
        let record = sqlx::query_as::<_, SetRecord>(&format!(
            "INSERT INTO set_logs (session_id, prescription_id, set_index, weight, reps, rpe,
             to_failure) VALUES ($1, $2, $3, $4, $5, $6, $7) RETURNING {SET_COLUMNS}"
        ))
        .bind(input.session_id)
        .bind(input.prescription_id)
        .bind(input.set_index)
        .bind(input.weight)
        .bind(input.reps)
        .bind(input.rpe)
        .bind(input.to_failure)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| db_error(e, "set"))?;
        Ok(record.to_domain())
    }

    async fn get_set(&self, id: Uuid) -> PortResult<SetLog> {
        let record =
            sqlx::query_as::<_, SetRecord>(&format!("SELECT {SET_COLUMNS} FROM set_logs WHERE id = $1"))
                .bind(id)
                .fetch_one(&self.pool)
                .await
                .map_err(|e| db_error(e, "set"))?;
        Ok(record.to_domain())
    }

    async fn list_set_views(&self, session_id: Uuid) -> PortResult<Vec<SetView>> {
        let records = sqlx::query_as::<_, SetViewRecord>(
            "SELECT l.id, l.session_id, l.prescription_id, l.set_index, l.weight, l.reps, l.rpe,
             l.to_failure, l.created_at, e.id AS exercise_id, e.name AS exercise_name
             FROM set_logs l
             JOIN prescriptions p ON p.id = l.prescription_id
             JOIN exercises e ON e.id = p.exercise_id
             WHERE l.session_id = $1 ORDER BY l.set_index ASC, l.created_at ASC",
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_error(e, "set"))?;
        Ok(records
            .into_iter()
            .map(|r| SetView {
                set: r.set.to_domain(),
                exercise_id: r.exercise_id,
                exercise_name: r.exercise_name,
            })
            .collect())
    }

    async fn list_sets(
        &self,
        session_id: Uuid,
        prescription_id: Option<Uuid>,
        limit: i64,
        offset: i64,
    ) -> PortResult<(Vec<SetLog>, i64)> {
        let total: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM set_logs
             WHERE session_id = $1 AND ($2::uuid IS NULL OR prescription_id = $2)",
        )
        .bind(session_id)
        .bind(prescription_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| db_error(e, "set"))?;
        let records = sqlx::query_as::<_, SetRecord>(&format!(
            "SELECT {SET_COLUMNS} FROM set_logs
             WHERE session_id = $1 AND ($2::uuid IS NULL OR prescription_id = $2)
             ORDER BY set_index ASC, created_at ASC LIMIT $3 OFFSET $4"
        ))
        .bind(session_id)
        .bind(prescription_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_error(e, "set"))?;
        Ok((records.into_iter().map(|r| r.to_domain()).collect(), total))
    }

    async fn update_set(&self, id: Uuid, patch: &SetPatch) -> PortResult<SetLog> {
        let mut qb = QueryBuilder::<Postgres>::new("UPDATE set_logs SET id = id");
        if let Some(v) = patch.set_index {
            qb.push(", set_index = ").push_bind(v);
        }
        if let Some(v) = patch.weight {
            qb.push(", weight = ").push_bind(v);
        }
        if let Some(v) = patch.reps {
            qb.push(", reps = ").push_bind(v);
        }
        if let Some(v) = patch.rpe {
            qb.push(", rpe = ").push_bind(v);
        }
        if let Some(v) = patch.to_failure {
            qb.push(", to_failure = ").push_bind(v);
        }
        qb.push(" WHERE id = ")
            .push_bind(id)
            .push(format!(" RETURNING {SET_COLUMNS}"));
        let record = qb
            .build_query_as::<SetRecord>()
            .fetch_one(&self.pool)
            .await
            .map_err(|e| db_error(e, "set"))?;
        Ok(record.to_domain())
    }

    async fn delete_set(&self, id: Uuid) -> PortResult<()> {
        let result = sqlx::query("DELETE FROM set_logs WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| db_error(e, "set"))?;
        expect_row(result.rows_affected(), "set")
    }

    async fn add_cardio(&self, input: &NewCardio) -> PortResult<CardioSegment> {
        let record = sqlx::query_as::<_, CardioRecord>(&format!(
            "INSERT INTO cardio_segments (session_id, modality, minutes, target_hr_min,
             target_hr_max, notes) VALUES ($1, $2, $3, $4, $5, $6) RETURNING {CARDIO_COLUMNS}"
        ))
        .bind(input.session_id)
        .bind(&input.modality)
        .bind(input.minutes)
        .bind(input.target_hr_min)
        .bind(input.target_hr_max)
        .bind(&input.notes)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| db_error(e, "cardio"))?;
        Ok(record.to_domain())
    }

    async fn list_cardio(&self, session_id: Uuid) -> PortResult<Vec<CardioSegment>> {
        let records = sqlx::query_as::<_, CardioRecord>(&format!(
            "SELECT {CARDIO_COLUMNS} FROM cardio_segments WHERE session_id = $1
             ORDER BY created_at ASC, id ASC"
        ))
        .bind(session_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_error(e, "cardio"))?;
        Ok(records.into_iter().map(|r| r.to_domain()).collect())
    }
}
