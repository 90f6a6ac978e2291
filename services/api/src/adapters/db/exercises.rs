//! services/api/src/adapters/db/exercises.rs

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use roma_core::domain::{Exercise, ExerciseFilter, ExerciseInput, TagMatch};
use roma_core::ports::{ExerciseRepository, PortResult};
use sqlx::{FromRow, Postgres, QueryBuilder};
use uuid::Uuid;

use super::{db_error, expect_row, DbAdapter};

const COLUMNS: &str = "id, name, primary_muscle, equipment, tags, notes, created_at, updated_at";

#[derive(FromRow)]
struct ExerciseRecord {
    id: Uuid,
    name: String,
    primary_muscle: String,
    equipment: Option<String>,
    tags: Vec<String>,
    notes: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}
impl ExerciseRecord {
    fn to_domain(self) -> Exercise {
        Exercise {
            id: self.id,
            name: self.name,
            primary_muscle: self.primary_muscle,
            equipment: self.equipment,
            tags: self.tags,
            notes: self.notes,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

/// Appends the WHERE clause shared by the page query and the count query.
fn push_filter(qb: &mut QueryBuilder<'_, Postgres>, filter: &ExerciseFilter) {
    qb.push(" WHERE TRUE");
    if let Some(q) = &filter.query {
        let pattern = format!("%{}%", q.to_lowercase());
        qb.push(" AND (lower(name) LIKE ")
            .push_bind(pattern.clone())
            .push(" OR lower(primary_muscle) LIKE ")
            .push_bind(pattern)
            .push(")");
    }
    if let Some(m) = &filter.muscle {
        qb.push(" AND lower(primary_muscle) = ").push_bind(m.to_lowercase());
    }
    if let Some(eq) = &filter.equipment {
        qb.push(" AND lower(equipment) = ").push_bind(eq.to_lowercase());
    }
    if !filter.tags.is_empty() {
        let tags: Vec<String> = filter.tags.iter().map(|t| t.to_lowercase()).collect();
        let op = match filter.tag_match {
            TagMatch::Any => " && ",
            TagMatch::All => " @> ",
        };
        // Tags are stored lowercased, so the GIN index serves both operators.
        qb.push(" AND tags").push(op).push_bind(tags);
    }
}

#[async_trait]
impl ExerciseRepository for DbAdapter {
    async fn search_exercises(&self, filter: &ExerciseFilter) -> PortResult<(Vec<Exercise>, i64)> {
        let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM exercises");
        push_filter(&mut count, filter);
        let total: i64 = count
            .build_query_scalar()
            .fetch_one(&self.pool)
            .await
            .map_err(|e| db_error(e, "exercise"))?;

        let mut qb = QueryBuilder::<Postgres>::new(format!("SELECT {COLUMNS} FROM exercises"));
        push_filter(&mut qb, filter);
        qb.push(" ORDER BY name ASC, id ASC LIMIT ")
            .push_bind(filter.limit)
            .push(" OFFSET ")
            .push_bind(filter.offset);
        let records = qb
            .build_query_as::<ExerciseRecord>()
            .fetch_all(&self.pool)
            .await
            .map_err(|e| db_error(e, "exercise"))?;
        Ok((records.into_iter().map(|r| r.to_domain()).collect(), total))
    }

    async fn create_exercise(&self, input: &ExerciseInput) -> PortResult<Exercise> {
        let record = sqlx::query_as::<_, ExerciseRecord>(&format!(
            "INSERT INTO exercises (name, primary_muscle, equipment, tags, notes)
             VALUES ($1, $2, $3, $4, $5) RETURNING {COLUMNS}"
        ))
        .bind(&input.name)
        .bind(&input.primary_muscle)
        .bind(&input.equipment)
        .bind(&input.tags)
        .bind(&input.notes)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| db_error(e, "exercise"))?;
        Ok(record.to_domain())
    }

    async fn get_exercise(&self, id: Uuid) -> PortResult<Exercise> {
        let record =
            sqlx::query_as::<_, ExerciseRecord>(&format!("SELECT {COLUMNS} FROM exercises WHERE id = $1"))
                .bind(id)
                .fetch_one(&self.pool)
                .await
                .map_err(|e| db_error(e, "exercise"))?;
        Ok(record.to_domain())
    }

    async fn update_exercise(&self, id: Uuid, input: &ExerciseInput) -> PortResult<Exercise> {
        let record = sqlx::query_as::<_, ExerciseRecord>(&format!(
            "UPDATE exercises SET name = $2, primary_muscle = $3, equipment = $4, tags = $5,
             notes = $6, updated_at = now() WHERE id = $1 RETURNING {COLUMNS}"
        ))
        .bind(id)
        .bind(&input.name)
        .bind(&input.primary_muscle)
        .bind(&input.equipment)
        .bind(&input.tags)
        .bind(&input.notes)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| db_error(e, "exercise"))?;
        Ok(record.to_domain())
    }

    async fn delete_exercise(&self, id: Uuid) -> PortResult<()> {
        let result = sqlx::query("DELETE FROM exercises WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| db_error(e, "exercise"))?;
        expect_row(result.rows_affected(), "exercise")
    }
}
