//! crates/roma_core/src/services/exercises.rs

use std::collections::HashSet;
use std::sync::Arc;
use uuid::Uuid;

use super::normalize_opt;
use crate::domain::{Exercise, ExerciseFilter, ExerciseInput, Page};
use crate::ports::{ExerciseRepository, PortError, PortResult};

#[derive(Clone)]
pub struct ExerciseService {
    repo: Arc<dyn ExerciseRepository>,
}

/// Lowercases and trims tags, dropping blanks and repeats while keeping first-seen order.
pub fn normalize_tags(tags: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    tags.into_iter()
        .map(|t| t.trim().to_lowercase())
        .filter(|t| !t.is_empty() && seen.insert(t.clone()))
        .collect()
}

fn normalize_input(input: ExerciseInput) -> PortResult<ExerciseInput> {
    let name = input.name.trim().to_string();
    let primary_muscle = input.primary_muscle.trim().to_string();
    if name.is_empty() || primary_muscle.is_empty() {
        return Err(PortError::Validation(
            "name_and_primary_muscle_required".to_string(),
        ));
    }
    Ok(ExerciseInput {
        name,
        primary_muscle,
        equipment: normalize_opt(input.equipment),
        tags: normalize_tags(input.tags),
        notes: normalize_opt(input.notes),
    })
}

impl ExerciseService {
    pub fn new(repo: Arc<dyn ExerciseRepository>) -> Self {
        Self { repo }
    }

    pub async fn list(&self, mut filter: ExerciseFilter) -> PortResult<Page<Exercise>> {
        filter.query = normalize_opt(filter.query);
        filter.muscle = normalize_opt(filter.muscle);
        filter.equipment = normalize_opt(filter.equipment);
        filter.tags = normalize_tags(filter.tags);
        let (items, total) = self.repo.search_exercises(&filter).await?;
        Ok(Page {
            items,
            total,
            limit: filter.limit,
            offset: filter.offset,
        })
    }

    pub async fn create(&self, input: ExerciseInput) -> PortResult<Exercise> {
        let input = normalize_input(input)?;
        self.repo.create_exercise(&input).await
    }

    pub async fn get(&self, id: Uuid) -> PortResult<Exercise> {
        self.repo.get_exercise(id).await
    }

    pub async fn update(&self, id: Uuid, input: ExerciseInput) -> PortResult<Exercise> {
        let input = normalize_input(input)?;
        self.repo.update_exercise(id, &input).await
    }

    pub async fn delete(&self, id: Uuid) -> PortResult<()> {
        self.repo.delete_exercise(id).await
    }
}
