//! services/api/src/adapters/db/history.rs
//!
//! Read-side aggregations over sessions and sets. Local dates are computed in SQL with
//! `AT TIME ZONE`, binding the zone by its IANA name.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;
use roma_core::domain::SessionLog;
use roma_core::history::{
    DailyExerciseVolume, DailyMuscleVolume, DayHistoryRow, ExerciseRef, HistoryQuery, LiftSample,
    PlanVsDoneRow, SessionHistoryRow,
};
use roma_core::ports::{HistoryRepository, PortResult};
use sqlx::FromRow;
use uuid::Uuid;

use super::sessions::{parse_status, SessionRecord};
use super::{db_error, DbAdapter};

/// Session rows of `$1` whose local date (zone `$2`) lies in the optional `[$3, $4]` window.
const WINDOWED_SESSIONS: &str = "SELECT s.*, (s.performed_at AT TIME ZONE $2)::date AS local_date
     FROM session_logs s WHERE s.disciple_id = $1
       AND ($3::date IS NULL OR (s.performed_at AT TIME ZONE $2)::date >= $3)
       AND ($4::date IS NULL OR (s.performed_at AT TIME ZONE $2)::date <= $4)";

/// Per-set facts: local date, exercise and volume for every set of disciple `$1` in zone `$2`.
const LOGGED_SETS: &str = "SELECT (s.performed_at AT TIME ZONE $2)::date AS date,
            e.id AS exercise_id, e.name AS exercise_name, lower(e.primary_muscle) AS muscle,
            COALESCE(l.weight, 0) * l.reps AS volume, l.reps
     FROM set_logs l
     JOIN session_logs s ON s.id = l.session_id
     JOIN prescriptions p ON p.id = l.prescription_id
     JOIN exercises e ON e.id = p.exercise_id
     WHERE s.disciple_id = $1";

#[derive(FromRow)]
struct LiftRecord {
    exercise_id: Uuid,
    exercise_name: String,
    weight: Option<f64>,
    reps: i32,
}

#[derive(FromRow)]
struct ExerciseDayRecord {
    date: NaiveDate,
    exercise_id: Uuid,
    exercise_name: String,
    volume: f64,
    sets: i64,
    reps: i64,
}

#[derive(FromRow)]
struct MuscleDayRecord {
    date: NaiveDate,
    muscle: String,
    volume: f64,
    sets: i64,
    reps: i64,
}

#[derive(FromRow)]
struct ExerciseRefRecord {
    id: Uuid,
    name: String,
}

#[derive(FromRow)]
struct SessionHistoryRecord {
    id: Uuid,
    assignment_id: Uuid,
    day_id: Uuid,
    performed_at: DateTime<Utc>,
    status: String,
    sets_count: i64,
    volume: f64,
}

#[derive(FromRow)]
struct DayHistoryRecord {
    date: NaiveDate,
    sessions: i64,
    sets: i64,
    volume: f64,
}

#[derive(FromRow)]
struct PlanVsDoneRecord {
    date: NaiveDate,
    day_id: Uuid,
    planned_sets: i64,
    done_sets: i64,
}

#[async_trait]
impl HistoryRepository for DbAdapter {
    async fn recent_sessions(
        &self,
        disciple_id: Uuid,
        since: DateTime<Utc>,
    ) -> PortResult<Vec<SessionLog>> {
        sqlx::query_as::<_, SessionRecord>(
            "SELECT id, assignment_id, day_id, disciple_id, performed_at, status, ended_at, notes,
             created_at, updated_at FROM session_logs
             WHERE disciple_id = $1 AND performed_at >= $2 ORDER BY performed_at DESC",
        )
        .bind(disciple_id)
        .bind(since)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_error(e, "session"))?
        .into_iter()
        .map(SessionRecord::to_domain)
        .collect()
    }

    async fn lift_samples(&self, disciple_id: Uuid) -> PortResult<Vec<LiftSample>> {
        let records = sqlx::query_as::<_, LiftRecord>(
            "SELECT e.id AS exercise_id, e.name AS exercise_name, l.weight, l.reps
             FROM set_logs l
             JOIN session_logs s ON s.id = l.session_id
             JOIN prescriptions p ON p.id = l.prescription_id
             JOIN exercises e ON e.id = p.exercise_id
             WHERE s.disciple_id = $1",
        )
        .bind(disciple_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_error(e, "set"))?;
        Ok(records
            .into_iter()
            .map(|r| LiftSample {
                exercise_id: r.exercise_id,
                exercise_name: r.exercise_name,
                weight: r.weight,
                reps: r.reps,
            })
            .collect())
    }

    async fn daily_by_exercise(
        &self,
        disciple_id: Uuid,
        since: NaiveDate,
        tz: Tz,
    ) -> PortResult<Vec<DailyExerciseVolume>> {
        let sql = format!(
            "SELECT date, exercise_id, exercise_name, SUM(volume)::float8 AS volume,
             COUNT(*) AS sets, SUM(reps)::int8 AS reps
             FROM ({LOGGED_SETS}) x WHERE date >= $3
             GROUP BY date, exercise_id, exercise_name
             ORDER BY date ASC, exercise_name ASC, exercise_id ASC"
        );
        let records = sqlx::query_as::<_, ExerciseDayRecord>(&sql)
            .bind(disciple_id)
            .bind(tz.name())
            .bind(since)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| db_error(e, "history"))?;
        Ok(records
            .into_iter()
            .map(|r| DailyExerciseVolume {
                date: r.date,
                exercise_id: r.exercise_id,
                exercise_name: r.exercise_name,
                volume: r.volume,
                sets: r.sets,
                reps: r.reps,
            })
            .collect())
    }

    async fn daily_by_muscle(
        &self,
        disciple_id: Uuid,
        since: NaiveDate,
        tz: Tz,
    ) -> PortResult<Vec<DailyMuscleVolume>> {
        let sql = format!(
            "SELECT date, muscle, SUM(volume)::float8 AS volume, COUNT(*) AS sets,
             SUM(reps)::int8 AS reps
             FROM ({LOGGED_SETS}) x WHERE date >= $3
             GROUP BY date, muscle ORDER BY date ASC, muscle ASC"
        );
        let records = sqlx::query_as::<_, MuscleDayRecord>(&sql)
            .bind(disciple_id)
            .bind(tz.name())
            .bind(since)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| db_error(e, "history"))?;
        Ok(records
            .into_iter()
            .map(|r| DailyMuscleVolume {
                date: r.date,
                primary_muscle: r.muscle,
                volume: r.volume,
                sets: r.sets,
                reps: r.reps,
            })
            .collect())
    }

    async fn relevant_exercises(&self, disciple_id: Uuid) -> PortResult<Vec<ExerciseRef>> {
        let records = sqlx::query_as::<_, ExerciseRefRecord>(
            "SELECT DISTINCT e.id, e.name FROM assignments a
             JOIN program_weeks w ON w.program_id = a.program_id
             JOIN program_days d ON d.week_id = w.id
             JOIN prescriptions p ON p.day_id = d.id
             JOIN exercises e ON e.id = p.exercise_id
             WHERE a.disciple_id = $1 AND a.is_active
             ORDER BY e.name ASC, e.id ASC",
        )
        .bind(disciple_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_error(e, "history"))?;
        Ok(records
            .into_iter()
            .map(|r| ExerciseRef {
                id: r.id,
                name: r.name,
            })
            .collect())
    }

    async fn days_with_sets(&self, disciple_id: Uuid, since: NaiveDate, tz: Tz) -> PortResult<i64> {
        let sql = format!("SELECT COUNT(DISTINCT date) FROM ({LOGGED_SETS}) x WHERE date >= $3");
        sqlx::query_scalar::<_, i64>(&sql)
            .bind(disciple_id)
            .bind(tz.name())
            .bind(since)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| db_error(e, "history"))
    }

    async fn session_history(
        &self,
        query: &HistoryQuery,
    ) -> PortResult<(Vec<SessionHistoryRow>, i64)> {
        let total: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM ({WINDOWED_SESSIONS}) w"))
            .bind(query.disciple_id)
            .bind(query.tz.name())
            .bind(query.from)
            .bind(query.to)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| db_error(e, "history"))?;
        let sql = format!(
            "SELECT w.id, w.assignment_id, w.day_id, w.performed_at, w.status,
             COUNT(l.id) AS sets_count,
             COALESCE(SUM(COALESCE(l.weight, 0) * l.reps), 0)::float8 AS volume
             FROM ({WINDOWED_SESSIONS}) w LEFT JOIN set_logs l ON l.session_id = w.id
             GROUP BY w.id, w.assignment_id, w.day_id, w.performed_at, w.status
             ORDER BY w.performed_at DESC, w.id ASC LIMIT $5 OFFSET $6"
        );
        let records = sqlx::query_as::<_, SessionHistoryRecord>(&sql)
            .bind(query.disciple_id)
            .bind(query.tz.name())
            .bind(query.from)
            .bind(query.to)
            .bind(query.limit)
            .bind(query.offset)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| db_error(e, "history"))?;
        let rows = records
            .into_iter()
            .map(|r| {
                Ok(SessionHistoryRow {
                    id: r.id,
                    assignment_id: r.assignment_id,
                    day_id: r.day_id,
                    performed_at: r.performed_at,
                    status: parse_status(&r.status)?,
                    sets_count: r.sets_count,
                    volume: r.volume,
                })
            })
            .collect::<PortResult<Vec<_>>>()?;
        Ok((rows, total))
    }

    async fn day_history(&self, query: &HistoryQuery) -> PortResult<(Vec<DayHistoryRow>, i64)> {
        let total: i64 = sqlx::query_scalar(&format!(
            "SELECT COUNT(DISTINCT local_date) FROM ({WINDOWED_SESSIONS}) w"
        ))
        .bind(query.disciple_id)
        .bind(query.tz.name())
        .bind(query.from)
        .bind(query.to)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| db_error(e, "history"))?;
        let sql = format!(
            "SELECT w.local_date AS date, COUNT(DISTINCT w.id) AS sessions, COUNT(l.id) AS sets,
             COALESCE(SUM(COALESCE(l.weight, 0) * l.reps), 0)::float8 AS volume
             FROM ({WINDOWED_SESSIONS}) w LEFT JOIN set_logs l ON l.session_id = w.id
             GROUP BY w.local_date ORDER BY w.local_date DESC LIMIT $5 OFFSET $6"
        );
        let records = sqlx::query_as::<_, DayHistoryRecord>(&sql)
            .bind(query.disciple_id)
            .bind(query.tz.name())
            .bind(query.from)
            .bind(query.to)
            .bind(query.limit)
            .bind(query.offset)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| db_error(e, "history"))?;
        let rows = records
            .into_iter()
            .map(|r| DayHistoryRow {
                date: r.date,
                sessions: r.sessions,
                sets: r.sets,
                volume: r.volume,
            })
            .collect();
        Ok((rows, total))
    }

    async fn plan_vs_done(&self, query: &HistoryQuery) -> PortResult<(Vec<PlanVsDoneRow>, i64)> {
        let total: i64 = sqlx::query_scalar(&format!(
            "SELECT COUNT(*) FROM (SELECT DISTINCT local_date, day_id FROM ({WINDOWED_SESSIONS}) w) g"
        ))
        .bind(query.disciple_id)
        .bind(query.tz.name())
        .bind(query.from)
        .bind(query.to)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| db_error(e, "history"))?;
        let sql = format!(
            "SELECT g.date, g.day_id,
             (SELECT COALESCE(SUM(p.series), 0)::int8 FROM prescriptions p WHERE p.day_id = g.day_id)
                 AS planned_sets,
             g.done_sets
             FROM (SELECT w.local_date AS date, w.day_id, COUNT(l.id) AS done_sets
                   FROM ({WINDOWED_SESSIONS}) w LEFT JOIN set_logs l ON l.session_id = w.id
                   GROUP BY w.local_date, w.day_id) g
             ORDER BY g.date DESC, g.day_id ASC LIMIT $5 OFFSET $6"
        );
        let records = sqlx::query_as::<_, PlanVsDoneRecord>(&sql)
            .bind(query.disciple_id)
            .bind(query.tz.name())
            .bind(query.from)
            .bind(query.to)
            .bind(query.limit)
            .bind(query.offset)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| db_error(e, "history"))?;
        let rows = records
            .into_iter()
            .map(|r| PlanVsDoneRow {
                date: r.date,
                day_id: r.day_id,
                planned_sets: r.planned_sets,
                done_sets: r.done_sets,
            })
            .collect();
        Ok((rows, total))
    }
}
