//! services/api/src/adapters/db/programs.rs

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use roma_core::domain::{
    DayPatch, NewDay, NewPrescription, NewProgram, Prescription, PrescriptionPatch,
    PrescriptionView, Program, ProgramDay, ProgramFilter, ProgramNode, ProgramPatch,
    ProgramVersion, ProgramWeek,
};
use roma_core::ports::{PortResult, ProgramRepository};
use sqlx::{FromRow, Postgres, QueryBuilder};
use uuid::Uuid;

use super::{db_error, expect_row, DbAdapter};

const PROGRAM_COLUMNS: &str = "id, owner_id, title, notes, visibility, version, created_at, updated_at";
const RX_COLUMNS: &str = "id, day_id, exercise_id, series, reps, rest_sec, to_failure, tempo, rir, \
                          rpe, method_id, notes, position";

//=========================================================================================
// Records
//=========================================================================================

#[derive(FromRow)]
struct ProgramRecord {
    id: Uuid,
    owner_id: Uuid,
    title: String,
    notes: Option<String>,
    visibility: String,
    version: i32,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}
impl ProgramRecord {
    fn to_domain(self) -> Program {
        Program {
            id: self.id,
            owner_id: self.owner_id,
            title: self.title,
            notes: self.notes,
            visibility: self.visibility,
            version: self.version,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

#[derive(FromRow)]
struct VersionRecord {
    id: Uuid,
    program_id: Uuid,
    version: i32,
    title: String,
    notes: Option<String>,
    created_at: DateTime<Utc>,
}
impl VersionRecord {
    fn to_domain(self) -> ProgramVersion {
        ProgramVersion {
            id: self.id,
            program_id: self.program_id,
            version: self.version,
            title: self.title,
            notes: self.notes,
            created_at: self.created_at,
        }
    }
}

#[derive(FromRow)]
struct WeekRecord {
    id: Uuid,
    program_id: Uuid,
    week_index: i32,
}
impl WeekRecord {
    fn to_domain(self) -> ProgramWeek {
        ProgramWeek {
            id: self.id,
            program_id: self.program_id,
            week_index: self.week_index,
        }
    }
}

#[derive(FromRow)]
struct DayRecord {
    id: Uuid,
    week_id: Uuid,
    day_index: i32,
    notes: Option<String>,
}
impl DayRecord {
    fn to_domain(self) -> ProgramDay {
        ProgramDay {
            id: self.id,
            week_id: self.week_id,
            day_index: self.day_index,
            notes: self.notes,
        }
    }
}

#[derive(FromRow)]
struct PrescriptionRecord {
    id: Uuid,
    day_id: Uuid,
    exercise_id: Uuid,
    series: i32,
    reps: String,
    rest_sec: Option<i32>,
    to_failure: bool,
    tempo: Option<String>,
    rir: Option<i32>,
    rpe: Option<f32>,
    method_id: Option<Uuid>,
    notes: Option<String>,
    position: i32,
}
impl PrescriptionRecord {
    fn to_domain(self) -> Prescription {
        Prescription {
            id: self.id,
            day_id: self.day_id,
            exercise_id: self.exercise_id,
            series: self.series,
            reps: self.reps,
            rest_sec: self.rest_sec,
            to_failure: self.to_failure,
            tempo: self.tempo,
            rir: self.rir,
            rpe: self.rpe,
            method_id: self.method_id,
            notes: self.notes,
            position: self.position,
        }
    }
}

#[derive(FromRow)]
struct PrescriptionViewRecord {
    #[sqlx(flatten)]
    prescription: PrescriptionRecord,
    exercise_name: String,
    primary_muscle: String,
    equipment: Option<String>,
}
impl PrescriptionViewRecord {
    fn to_domain(self) -> PrescriptionView {
        PrescriptionView {
            prescription: self.prescription.to_domain(),
            exercise_name: self.exercise_name,
            primary_muscle: self.primary_muscle,
            equipment: self.equipment,
        }
    }
}

//=========================================================================================
// `ProgramRepository` Trait Implementation
//=========================================================================================

#[async_trait]
impl ProgramRepository for DbAdapter {
    async fn create_program(&self, owner_id: Uuid, input: &NewProgram) -> PortResult<Program> {
        let record = sqlx::query_as::<_, ProgramRecord>(&format!(
            "INSERT INTO programs (owner_id, title, notes, visibility)
             VALUES ($1, $2, $3, COALESCE($4, 'private')) RETURNING {PROGRAM_COLUMNS}"
        ))
        .bind(owner_id)
        .bind(&input.title)
        .bind(&input.notes)
        .bind(&input.visibility)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| db_error(e, "program"))?;
        Ok(record.to_domain())
    }

    async fn list_programs(&self, filter: &ProgramFilter) -> PortResult<(Vec<Program>, i64)> {
        let pattern = filter.query.as_ref().map(|q| format!("%{}%", q.to_lowercase()));
        let total: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM programs
             WHERE owner_id = $1 AND ($2::text IS NULL OR lower(title) LIKE $2)",
        )
        .bind(filter.owner_id)
        .bind(&pattern)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| db_error(e, "program"))?;
        let records = sqlx::query_as::<_, ProgramRecord>(&format!(
            "SELECT {PROGRAM_COLUMNS} FROM programs
             WHERE owner_id = $1 AND ($2::text IS NULL OR lower(title) LIKE $2)
             ORDER BY created_at DESC, id DESC LIMIT $3 OFFSET $4"
        ))
        .bind(filter.owner_id)
        .bind(&pattern)
        .bind(filter.limit)
        .bind(filter.offset)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_error(e, "program"))?;
        Ok((records.into_iter().map(|r| r.to_domain()).collect(), total))
    }

    async fn get_program(&self, id: Uuid) -> PortResult<Program> {
        let record =
            sqlx::query_as::<_, ProgramRecord>(&format!("SELECT {PROGRAM_COLUMNS} FROM programs WHERE id = $1"))
                .bind(id)
                .fetch_one(&self.pool)
                .await
                .map_err(|e| db_error(e, "program"))?;
        Ok(record.to_domain())
    }

    async fn update_program(&self, id: Uuid, patch: &ProgramPatch) -> PortResult<Program> {
        let mut qb = QueryBuilder::<Postgres>::new("UPDATE programs SET updated_at = now()");
        if let Some(title) = &patch.title {
            qb.push(", title = ").push_bind(title);
        }
        if let Some(notes) = &patch.notes {
            qb.push(", notes = ").push_bind(notes);
        }
        if let Some(visibility) = &patch.visibility {
            qb.push(", visibility = ").push_bind(visibility);
        }
        qb.push(" WHERE id = ")
            .push_bind(id)
            .push(format!(" RETURNING {PROGRAM_COLUMNS}"));
        let record = qb
            .build_query_as::<ProgramRecord>()
            .fetch_one(&self.pool)
            .await
            .map_err(|e| db_error(e, "program"))?;
        Ok(record.to_domain())
    }

    async fn delete_program(&self, id: Uuid) -> PortResult<()> {
        let mut tx = self.pool.begin().await.map_err(|e| db_error(e, "program"))?;
        sqlx::query("DELETE FROM program_versions WHERE program_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(|e| db_error(e, "program"))?;
        let result = sqlx::query("DELETE FROM programs WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(|e| db_error(e, "program"))?;
        expect_row(result.rows_affected(), "program")?;
        tx.commit().await.map_err(|e| db_error(e, "program"))
    }

    async fn program_of(&self, node: ProgramNode) -> PortResult<Option<Program>> {
        let (join, id) = match node {
            ProgramNode::Program(id) => ("WHERE p.id = $1", id),
            ProgramNode::Week(id) => (
                "JOIN program_weeks w ON w.program_id = p.id WHERE w.id = $1",
                id,
            ),
            ProgramNode::Day(id) => (
                "JOIN program_weeks w ON w.program_id = p.id
                 JOIN program_days d ON d.week_id = w.id WHERE d.id = $1",
                id,
            ),
            ProgramNode::Prescription(id) => (
                "JOIN program_weeks w ON w.program_id = p.id
                 JOIN program_days d ON d.week_id = w.id
                 JOIN prescriptions x ON x.day_id = d.id WHERE x.id = $1",
                id,
            ),
        };
        let sql = format!(
            "SELECT p.id, p.owner_id, p.title, p.notes, p.visibility, p.version, p.created_at,
             p.updated_at FROM programs p {join}"
        );
        let record = sqlx::query_as::<_, ProgramRecord>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| db_error(e, "program"))?;
        Ok(record.map(|r| r.to_domain()))
    }

    async fn record_version(&self, program: &Program) -> PortResult<ProgramVersion> {
        let record = sqlx::query_as::<_, VersionRecord>(
            "INSERT INTO program_versions (program_id, version, title, notes)
             VALUES ($1, $2, $3, $4) RETURNING id, program_id, version, title, notes, created_at",
        )
        .bind(program.id)
        .bind(program.version)
        .bind(&program.title)
        .bind(&program.notes)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| db_error(e, "program"))?;
        Ok(record.to_domain())
    }

    async fn list_versions(&self, program_id: Uuid) -> PortResult<Vec<ProgramVersion>> {
        let records = sqlx::query_as::<_, VersionRecord>(
            "SELECT id, program_id, version, title, notes, created_at FROM program_versions
             WHERE program_id = $1 ORDER BY version DESC, created_at DESC",
        )
        .bind(program_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_error(e, "program"))?;
        Ok(records.into_iter().map(|r| r.to_domain()).collect())
    }

    async fn clone_next_version(&self, program_id: Uuid) -> PortResult<Program> {
        let err = |e| db_error(e, "program");
        let mut tx = self.pool.begin().await.map_err(err)?;

        let next = sqlx::query_as::<_, ProgramRecord>(&format!(
            "INSERT INTO programs (owner_id, title, notes, visibility, version)
             SELECT owner_id, title, notes, visibility, version + 1 FROM programs WHERE id = $1
             RETURNING {PROGRAM_COLUMNS}"
        ))
        .bind(program_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(err)?
        .to_domain();

        let weeks = sqlx::query_as::<_, WeekRecord>(
            "SELECT id, program_id, week_index FROM program_weeks WHERE program_id = $1",
        )
        .bind(program_id)
        .fetch_all(&mut *tx)
        .await
        .map_err(err)?;

        for week in weeks {
            let new_week: Uuid = sqlx::query_scalar(
                "INSERT INTO program_weeks (program_id, week_index) VALUES ($1, $2) RETURNING id",
            )
            .bind(next.id)
            .bind(week.week_index)
            .fetch_one(&mut *tx)
            .await
            .map_err(err)?;

            let days = sqlx::query_as::<_, DayRecord>(
                "SELECT id, week_id, day_index, notes FROM program_days WHERE week_id = $1",
            )
            .bind(week.id)
            .fetch_all(&mut *tx)
            .await
            .map_err(err)?;

            for day in days {
                let new_day: Uuid = sqlx::query_scalar(
                    "INSERT INTO program_days (week_id, day_index, notes) VALUES ($1, $2, $3)
                     RETURNING id",
                )
                .bind(new_week)
                .bind(day.day_index)
                .bind(&day.notes)
                .fetch_one(&mut *tx)
                .await
                .map_err(err)?;

                sqlx::query(
                    "INSERT INTO prescriptions (day_id, exercise_id, series, reps, rest_sec,
                     to_failure, tempo, rir, rpe, method_id, notes, position)
                     SELECT $2, exercise_id, series, reps, rest_sec, to_failure, tempo, rir, rpe,
                     method_id, notes, position FROM prescriptions WHERE day_id = $1",
                )
                .bind(day.id)
                .bind(new_day)
                .execute(&mut *tx)
                .await
                .map_err(err)?;
            }
        }

        sqlx::query(
            "INSERT INTO program_versions (program_id, version, title, notes) VALUES ($1, $2, $3, $4)",
        )
        .bind(next.id)
        .bind(next.version)
        .bind(&next.title)
        .bind(&next.notes)
        .execute(&mut *tx)
        .await
        .map_err(err)?;

        tx.commit().await.map_err(err)?;
        Ok(next)
    }

    async fn add_week(&self, program_id: Uuid, week_index: i32) -> PortResult<ProgramWeek> {
        let record = sqlx::query_as::<_, WeekRecord>(
            "INSERT INTO program_weeks (program_id, week_index) VALUES ($1, $2)
             RETURNING id, program_id, week_index",
        )
        .bind(program_id)
        .bind(week_index)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| db_error(e, "week"))?;
        Ok(record.to_domain())
    }

    async fn list_weeks(&self, program_id: Uuid) -> PortResult<Vec<ProgramWeek>> {
        let records = sqlx::query_as::<_, WeekRecord>(
            "SELECT id, program_id, week_index FROM program_weeks WHERE program_id = $1
             ORDER BY week_index ASC, id ASC",
        )
        .bind(program_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_error(e, "week"))?;
        Ok(records.into_iter().map(|r| r.to_domain()).collect())
    }

    async fn get_week(&self, week_id: Uuid) -> PortResult<ProgramWeek> {
        let record = sqlx::query_as::<_, WeekRecord>(
            "SELECT id, program_id, week_index FROM program_weeks WHERE id = $1",
        )
        .bind(week_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| db_error(e, "week"))?;
        Ok(record.to_domain())
    }

    async fn delete_week(&self, week_id: Uuid) -> PortResult<()> {
        let result = sqlx::query("DELETE FROM program_weeks WHERE id = $1")
            .bind(week_id)
            .execute(&self.pool)
            .await
            .map_err(|e| db_error(e, "week"))?;
        expect_row(result.rows_affected(), "week")
    }

    async fn add_day(&self, week_id: Uuid, input: &NewDay) -> PortResult<ProgramDay> {
        let record = sqlx::query_as::<_, DayRecord>(
            "INSERT INTO program_days (week_id, day_index, notes) VALUES ($1, $2, $3)
             RETURNING id, week_id, day_index, notes",
        )
        .bind(week_id)
        .bind(input.day_index)
        .bind(&input.notes)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| db_error(e, "day"))?;
        Ok(record.to_domain())
    }

    async fn list_days(&self, week_id: Uuid) -> PortResult<Vec<ProgramDay>> {
        let records = sqlx::query_as::<_, DayRecord>(
            "SELECT id, week_id, day_index, notes FROM program_days WHERE week_id = $1
             ORDER BY day_index ASC, id ASC",
        )
        .bind(week_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_error(e, "day"))?;
        Ok(records.into_iter().map(|r| r.to_domain()).collect())
    }

    async fn get_day(&self, day_id: Uuid) -> PortResult<ProgramDay> {
        let record = sqlx::query_as::<_, DayRecord>(
            "SELECT id, week_id, day_index, notes FROM program_days WHERE id = $1",
        )
        .bind(day_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| db_error(e, "day"))?;
        Ok(record.to_domain())
    }

    async fn find_day(
        &self,
        program_id: Uuid,
        week_index: i32,
        day_index: i32,
    ) -> PortResult<Option<ProgramDay>> {
        let record = sqlx::query_as::<_, DayRecord>(
            "SELECT d.id, d.week_id, d.day_index, d.notes FROM program_days d
             JOIN program_weeks w ON w.id = d.week_id
             WHERE w.program_id = $1 AND w.week_index = $2 AND d.day_index = $3
             ORDER BY d.id LIMIT 1",
        )
        .bind(program_id)
        .bind(week_index)
        .bind(day_index)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error(e, "day"))?;
        Ok(record.map(|r| r.to_domain()))
    }

    async fn update_day(&self, day_id: Uuid, patch: &DayPatch) -> PortResult<ProgramDay> {
        let mut qb = QueryBuilder::<Postgres>::new("UPDATE program_days SET id = id");
        if let Some(index) = patch.day_index {
            qb.push(", day_index = ").push_bind(index);
        }
        if let Some(notes) = &patch.notes {
            qb.push(", notes = ").push_bind(notes);
        }
        qb.push(" WHERE id = ")
            .push_bind(day_id)
            .push(" RETURNING id, week_id, day_index, notes");
        let record = qb
            .build_query_as::<DayRecord>()
            .fetch_one(&self.pool)
            .await
            .map_err(|e| db_error(e, "day"))?;
        Ok(record.to_domain())
    }

    async fn delete_day(&self, day_id: Uuid) -> PortResult<()> {
        let result = sqlx::query("DELETE FROM program_days WHERE id = $1")
            .bind(day_id)
            .execute(&self.pool)
            .await
            .map_err(|e| db_error(e, "day"))?;
        expect_row(result.rows_affected(), "day")
    }

    async fn add_prescription(
        &self,
        day_id: Uuid,
        input: &NewPrescription,
    ) -> PortResult<Prescription> {
        let record = sqlx::query_as::<_, PrescriptionRecord>(&format!(
            "INSERT INTO prescriptions (day_id, exercise_id, series, reps, rest_sec, to_failure,
             tempo, rir, rpe, method_id, notes, position)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, COALESCE($12, 1))
             RETURNING {RX_COLUMNS}"
        ))
        .bind(day_id)
        .bind(input.exercise_id)
        .bind(input.series)
        .bind(&input.reps)
        .bind(input.rest_sec)
        .bind(input.to_failure)
        .bind(&input.tempo)
        .bind(input.rir)
        .bind(input.rpe)
        .bind(input.method_id)
        .bind(&input.notes)
        .bind(input.position)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| db_error(e, "prescription"))?;
        Ok(record.to_domain())
    }

    async fn list_prescriptions(&self, day_id: Uuid) -> PortResult<Vec<PrescriptionView>> {
        let records = sqlx::query_as::<_, PrescriptionViewRecord>(
            "SELECT p.id, p.day_id, p.exercise_id, p.series, p.reps, p.rest_sec, p.to_failure,
             p.tempo, p.rir, p.rpe, p.method_id, p.notes, p.position,
             e.name AS exercise_name, e.primary_muscle, e.equipment
             FROM prescriptions p JOIN exercises e ON e.id = p.exercise_id
             WHERE p.day_id = $1 ORDER BY p.position ASC, p.id ASC",
        )
        .bind(day_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_error(e, "prescription"))?;
        Ok(records.into_iter().map(|r| r.to_domain()).collect())
    }

    async fn update_prescription(
        &self,
        id: Uuid,
        patch: &PrescriptionPatch,
    ) -> PortResult<Prescription> {
        let mut qb = QueryBuilder::<Postgres>::new("UPDATE prescriptions SET id = id");
        if let Some(v) = patch.exercise_id {
            qb.push(", exercise_id = ").push_bind(v);
        }
        if let Some(v) = patch.series {
            qb.push(", series = ").push_bind(v);
        }
        if let Some(v) = &patch.reps {
            qb.push(", reps = ").push_bind(v);
        }
        if let Some(v) = patch.rest_sec {
            qb.push(", rest_sec = ").push_bind(v);
        }
        if let Some(v) = patch.to_failure {
            qb.push(", to_failure = ").push_bind(v);
        }
        if let Some(v) = &patch.tempo {
            qb.push(", tempo = ").push_bind(v);
        }
        if let Some(v) = patch.rir {
            qb.push(", rir = ").push_bind(v);
        }
        if let Some(v) = patch.rpe {
            qb.push(", rpe = ").push_bind(v);
        }
        if let Some(v) = patch.method_id {
            qb.push(", method_id = ").push_bind(v);
        }
        if let Some(v) = &patch.notes {
            qb.push(", notes = ").push_bind(v);
        }
        if let Some(v) = patch.position {
            qb.push(", position = ").push_bind(v);
        }
        qb.push(" WHERE id = ")
            .push_bind(id)
            .push(format!(" RETURNING {RX_COLUMNS}"));
        let record = qb
            .build_query_as::<PrescriptionRecord>()
            .fetch_one(&self.pool)
            .await
            .map_err(|e| db_error(e, "prescription"))?;
        Ok(record.to_domain())
    }

    async fn delete_prescription(&self, id: Uuid) -> PortResult<()> {
        let result = sqlx::query("DELETE FROM prescriptions WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| db_error(e, "prescription"))?;
        expect_row(result.rows_affected(), "prescription")
    }

    async fn delete_prescriptions_of_day(&self, day_id: Uuid) -> PortResult<()> {
        sqlx::query("DELETE FROM prescriptions WHERE day_id = $1")
            .bind(day_id)
            .execute(&self.pool)
            .await
            .map_err(|e| db_error(e, "prescription"))?;
        Ok(())
    }

    async fn reorder_prescriptions(&self, day_id: Uuid, ordered_ids: &[Uuid]) -> PortResult<()> {
        let err = |e| db_error(e, "prescription");
        let mut tx = self.pool.begin().await.map_err(err)?;
        for (index, id) in ordered_ids.iter().enumerate() {
            sqlx::query("UPDATE prescriptions SET position = $1 WHERE id = $2 AND day_id = $3")
                .bind(index as i32 + 1)
                .bind(id)
                .bind(day_id)
                .execute(&mut *tx)
                .await
                .map_err(err)?;
        }
        tx.commit().await.map_err(err)
    }
}
