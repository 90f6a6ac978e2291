//! services/api/src/adapters/db/assignments.rs

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use roma_core::domain::{
    Assignment, AssignmentDay, AssignmentPatch, AssignmentSummary, NewAssignment,
};
use roma_core::ports::{AssignmentRepository, PortResult};
use sqlx::{FromRow, Postgres, QueryBuilder};
use uuid::Uuid;

use super::{db_error, expect_row, DbAdapter};

const COLUMNS: &str = "id, program_id, program_version, disciple_id, assigned_by, start_date, \
                       end_date, is_active, created_at";

#[derive(FromRow)]
struct AssignmentRecord {
    id: Uuid,
    program_id: Uuid,
    program_version: i32,
    disciple_id: Uuid,
    assigned_by: Uuid,
    start_date: NaiveDate,
    end_date: Option<NaiveDate>,
    is_active: bool,
    created_at: DateTime<Utc>,
}
impl AssignmentRecord {
    fn to_domain(self) -> Assignment {
        Assignment {
            id: self.id,
            program_id: self.program_id,
            program_version: self.program_version,
            disciple_id: self.disciple_id,
            assigned_by: self.assigned_by,
            start_date: self.start_date,
            end_date: self.end_date,
            is_active: self.is_active,
            created_at: self.created_at,
        }
    }
}

#[derive(FromRow)]
struct SummaryRecord {
    #[sqlx(flatten)]
    assignment: AssignmentRecord,
    program_title: String,
    disciple_name: String,
    disciple_email: String,
}

#[derive(FromRow)]
struct DayRecord {
    week_index: i32,
    day_id: Uuid,
    day_index: i32,
    notes: Option<String>,
    prescriptions: i64,
    sessions: i64,
}

#[async_trait]
impl AssignmentRepository for DbAdapter {
    async fn create_assignment(&self, input: &NewAssignment) -> PortResult<Assignment> {
        let record = sqlx::query_as::<_, AssignmentRecord>(&format!(
            "INSERT INTO assignments (program_id, program_version, disciple_id, assigned_by,
             start_date, end_date) VALUES ($1, $2, $3, $4, $5, $6) RETURNING {COLUMNS}"
        ))
        .bind(input.program_id)
        .bind(input.program_version)
        .bind(input.disciple_id)
        .bind(input.assigned_by)
        .bind(input.start_date)
        .bind(input.end_date)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| db_error(e, "assignment"))?;
        Ok(record.to_domain())
    }

    async fn create_active_assignment(&self, input: &NewAssignment) -> PortResult<Assignment> {
        let err = |e| db_error(e, "assignment");
        let mut tx = self.pool.begin().await.map_err(err)?;

        sqlx::query("UPDATE assignments SET is_active = FALSE WHERE disciple_id = $1 AND is_active")
            .bind(input.disciple_id)
            .execute(&mut *tx)
            .await
            .map_err(err)?;

        let record = sqlx::query_as::<_, AssignmentRecord>(&format!(
            "INSERT INTO assignments (program_id, program_version, disciple_id, assigned_by,
             start_date, end_date, is_active) VALUES ($1, $2, $3, $4, $5, $6, TRUE)
             RETURNING {COLUMNS}"
        ))
        .bind(input.program_id)
        .bind(input.program_version)
        .bind(input.disciple_id)
        .bind(input.assigned_by)
        .bind(input.start_date)
        .bind(input.end_date)
        .fetch_one(&mut *tx)
        .await
        .map_err(err)?;

        tx.commit().await.map_err(err)?;
        Ok(record.to_domain())
    }

    async fn get_assignment(&self, id: Uuid) -> PortResult<Assignment> {
        let record =
            sqlx::query_as::<_, AssignmentRecord>(&format!("SELECT {COLUMNS} FROM assignments WHERE id = $1"))
                .bind(id)
                .fetch_one(&self.pool)
                .await
                .map_err(|e| db_error(e, "assignment"))?;
        Ok(record.to_domain())
    }

    async fn list_assignments(
        &self,
        disciple_ids: &[Uuid],
        limit: i64,
        offset: i64,
    ) -> PortResult<(Vec<AssignmentSummary>, i64)> {
        let total: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM assignments WHERE disciple_id = ANY($1)")
                .bind(disciple_ids)
                .fetch_one(&self.pool)
                .await
                .map_err(|e| db_error(e, "assignment"))?;
        let records = sqlx::query_as::<_, SummaryRecord>(
            "SELECT a.id, a.program_id, a.program_version, a.disciple_id, a.assigned_by,
             a.start_date, a.end_date, a.is_active, a.created_at,
             p.title AS program_title, u.name AS disciple_name, u.email AS disciple_email
             FROM assignments a
             JOIN programs p ON p.id = a.program_id
             JOIN users u ON u.id = a.disciple_id
             WHERE a.disciple_id = ANY($1)
             ORDER BY a.created_at DESC, a.id DESC LIMIT $2 OFFSET $3",
        )
        .bind(disciple_ids)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_error(e, "assignment"))?;
        let items = records
            .into_iter()
            .map(|r| AssignmentSummary {
                assignment: r.assignment.to_domain(),
                program_title: r.program_title,
                disciple_name: r.disciple_name,
                disciple_email: r.disciple_email,
            })
            .collect();
        Ok((items, total))
    }

    async fn update_assignment(&self, id: Uuid, patch: &AssignmentPatch) -> PortResult<Assignment> {
        let mut qb = QueryBuilder::<Postgres>::new("UPDATE assignments SET id = id");
        if let Some(end) = patch.end_date {
            qb.push(", end_date = ").push_bind(end);
        }
        if let Some(active) = patch.is_active {
            qb.push(", is_active = ").push_bind(active);
        }
        qb.push(" WHERE id = ")
            .push_bind(id)
            .push(format!(" RETURNING {COLUMNS}"));
        let record = qb
            .build_query_as::<AssignmentRecord>()
            .fetch_one(&self.pool)
            .await
            .map_err(|e| db_error(e, "assignment"))?;
        Ok(record.to_domain())
    }

    async fn activate_assignment(
        &self,
        disciple_id: Uuid,
        assignment_id: Uuid,
        today: NaiveDate,
    ) -> PortResult<Assignment> {
        let err = |e| db_error(e, "assignment");
        let mut tx = self.pool.begin().await.map_err(err)?;

        let owned: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM assignments WHERE id = $1 AND disciple_id = $2)",
        )
        .bind(assignment_id)
        .bind(disciple_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(err)?;
        expect_row(owned as u64, "assignment")?;

        // Clear the partial unique index before raising the new flag.
        sqlx::query("UPDATE assignments SET is_active = FALSE WHERE disciple_id = $1 AND is_active")
            .bind(disciple_id)
            .execute(&mut *tx)
            .await
            .map_err(err)?;

        let record = sqlx::query_as::<_, AssignmentRecord>(&format!(
            "UPDATE assignments SET is_active = TRUE, end_date = NULL,
             start_date = COALESCE(start_date, $2) WHERE id = $1 RETURNING {COLUMNS}"
        ))
        .bind(assignment_id)
        .bind(today)
        .fetch_one(&mut *tx)
        .await
        .map_err(err)?;

        tx.commit().await.map_err(err)?;
        Ok(record.to_domain())
    }

    async fn latest_active_assignment(&self, disciple_id: Uuid) -> PortResult<Option<Assignment>> {
        let record = sqlx::query_as::<_, AssignmentRecord>(&format!(
            "SELECT {COLUMNS} FROM assignments WHERE disciple_id = $1 AND is_active
             ORDER BY created_at DESC, id DESC LIMIT 1"
        ))
        .bind(disciple_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error(e, "assignment"))?;
        Ok(record.map(|r| r.to_domain()))
    }

    async fn active_assignment_on(
        &self,
        disciple_id: Uuid,
        date: NaiveDate,
    ) -> PortResult<Option<Assignment>> {
        let record = sqlx::query_as::<_, AssignmentRecord>(&format!(
            "SELECT {COLUMNS} FROM assignments
             WHERE disciple_id = $1 AND is_active AND start_date <= $2
               AND (end_date IS NULL OR end_date >= $2)
             ORDER BY created_at DESC, id DESC LIMIT 1"
        ))
        .bind(disciple_id)
        .bind(date)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error(e, "assignment"))?;
        Ok(record.map(|r| r.to_domain()))
    }

    async fn is_assigned(&self, disciple_id: Uuid, program_id: Uuid) -> PortResult<bool> {
        sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS (SELECT 1 FROM assignments WHERE disciple_id = $1 AND program_id = $2)",
        )
        .bind(disciple_id)
        .bind(program_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| db_error(e, "assignment"))
    }

    async fn list_assignment_days(&self, assignment: &Assignment) -> PortResult<Vec<AssignmentDay>> {
        let records = sqlx::query_as::<_, DayRecord>(
            "SELECT w.week_index, d.id AS day_id, d.day_index, d.notes,
             (SELECT COUNT(*) FROM prescriptions p WHERE p.day_id = d.id) AS prescriptions,
             (SELECT COUNT(*) FROM session_logs s
              WHERE s.day_id = d.id AND s.assignment_id = $2) AS sessions
             FROM program_weeks w JOIN program_days d ON d.week_id = w.id
             WHERE w.program_id = $1
             ORDER BY w.week_index ASC, d.day_index ASC, d.id ASC",
        )
        .bind(assignment.program_id)
        .bind(assignment.id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_error(e, "assignment"))?;
        Ok(records
            .into_iter()
            .map(|r| AssignmentDay {
                week_index: r.week_index,
                day_id: r.day_id,
                day_index: r.day_index,
                notes: r.notes,
                prescriptions: r.prescriptions,
                sessions: r.sessions,
            })
            .collect())
    }
}
