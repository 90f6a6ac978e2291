//! crates/roma_core/src/services/programs.rs
//!
//! The program builder: programs, weeks, days and prescriptions, plus versioning.
//! Writes are restricted to the owner. Reads are also allowed on public programs and to
//! disciples the program is assigned to. Everyone else gets a not-found.

use chrono::NaiveDate;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use super::{normalize_opt, page_limit, page_offset};
use crate::calendar::program_slot_for_date;
use crate::domain::{
    DayPatch, NewDay, NewPrescription, NewProgram, Page, Prescription, PrescriptionPatch,
    PrescriptionView, Program, ProgramDay, ProgramFilter, ProgramNode, ProgramPatch,
    ProgramVersion, ProgramWeek,
};
use crate::ports::{
    AssignmentRepository, ExerciseRepository, PortError, PortResult, ProgramRepository,
};

pub const VISIBILITY_PRIVATE: &str = "private";
pub const VISIBILITY_PUBLIC: &str = "public";

/// The program day a disciple lands on for a date under the seven-day-week projection.
#[derive(Debug, Clone, Serialize)]
pub struct ProgramDayPlan {
    pub assignment_id: Uuid,
    pub date: NaiveDate,
    pub week_index: i32,
    pub day: ProgramDay,
    pub prescriptions: Vec<PrescriptionView>,
}

#[derive(Clone)]
pub struct ProgramService {
    programs: Arc<dyn ProgramRepository>,
    exercises: Arc<dyn ExerciseRepository>,
    assignments: Arc<dyn AssignmentRepository>,
}

fn validate_title(title: &str) -> PortResult<String> {
    let title = title.trim();
    if title.chars().count() < 2 {
        return Err(PortError::Validation("title_too_short".to_string()));
    }
    Ok(title.to_string())
}

fn normalize_visibility(raw: Option<String>) -> PortResult<String> {
    match normalize_opt(raw).map(|v| v.to_lowercase()) {
        None => Ok(VISIBILITY_PRIVATE.to_string()),
        Some(v) if v == VISIBILITY_PRIVATE || v == VISIBILITY_PUBLIC => Ok(v),
        Some(_) => Err(PortError::Validation("invalid_visibility".to_string())),
    }
}

fn validate_prescription_numbers(
    series: Option<i32>,
    reps: Option<&str>,
    position: Option<i32>,
) -> PortResult<()> {
    if series.is_some_and(|s| s < 1) {
        return Err(PortError::Validation("invalid_series".to_string()));
    }
    if reps.is_some_and(|r| r.trim().is_empty()) {
        return Err(PortError::Validation("reps_required".to_string()));
    }
    if position.is_some_and(|p| p < 1) {
        return Err(PortError::Validation("invalid_position".to_string()));
    }
    Ok(())
}

impl ProgramService {
    pub fn new(
        programs: Arc<dyn ProgramRepository>,
        exercises: Arc<dyn ExerciseRepository>,
        assignments: Arc<dyn AssignmentRepository>,
    ) -> Self {
        Self {
            programs,
            exercises,
            assignments,
        }
    }

    async fn owned(&self, caller: Uuid, node: ProgramNode) -> PortResult<Program> {
        match self.programs.program_of(node).await? {
            Some(p) if p.owner_id == caller => Ok(p),
            _ => Err(PortError::NotFound("program".to_string())),
        }
    }

    async fn readable(&self, caller: Uuid, node: ProgramNode) -> PortResult<Program> {
        let program = self
            .programs
            .program_of(node)
            .await?
            .ok_or_else(|| PortError::NotFound("program".to_string()))?;
        if program.owner_id == caller
            || program.visibility == VISIBILITY_PUBLIC
            || self.assignments.is_assigned(caller, program.id).await?
        {
            Ok(program)
        } else {
            Err(PortError::NotFound("program".to_string()))
        }
    }

    async fn week_in_program(&self, program_id: Uuid, week_id: Uuid) -> PortResult<ProgramWeek> {
        let week = self.programs.get_week(week_id).await?;
        if week.program_id != program_id {
            return Err(PortError::NotFound("week".to_string()));
        }
        Ok(week)
    }

    // --- Programs ---

    pub async fn create(&self, owner_id: Uuid, input: NewProgram) -> PortResult<Program> {
        let input = NewProgram {
            title: validate_title(&input.title)?,
            notes: normalize_opt(input.notes),
            visibility: Some(normalize_visibility(input.visibility)?),
        };
        let program = self.programs.create_program(owner_id, &input).await?;
        self.programs.record_version(&program).await?;
        info!(program_id = %program.id, owner_id = %owner_id, "program created");
        Ok(program)
    }

    pub async fn list_mine(
        &self,
        owner_id: Uuid,
        query: Option<String>,
        limit: Option<i64>,
        offset: Option<i64>,
    ) -> PortResult<Page<Program>> {
        let filter = ProgramFilter {
            owner_id,
            query: normalize_opt(query),
            limit: page_limit(limit),
            offset: page_offset(offset),
        };
        let (items, total) = self.programs.list_programs(&filter).await?;
        Ok(Page {
            items,
            total,
            limit: filter.limit,
            offset: filter.offset,
        })
    }

    pub async fn get(&self, caller: Uuid, id: Uuid) -> PortResult<Program> {
        self.readable(caller, ProgramNode::Program(id)).await
    }

    pub async fn update(&self, caller: Uuid, id: Uuid, patch: ProgramPatch) -> PortResult<Program> {
        self.owned(caller, ProgramNode::Program(id)).await?;
        if patch.is_empty() {
            return Err(PortError::Validation("empty_patch".to_string()));
        }
        let patch = ProgramPatch {
            title: patch.title.as_deref().map(validate_title).transpose()?,
            notes: patch.notes.map(|n| n.trim().to_string()),
            visibility: match patch.visibility {
                Some(v) => Some(normalize_visibility(Some(v))?),
                None => None,
            },
        };
        self.programs.update_program(id, &patch).await
    }

    /// Removes prescriptions, days, weeks and snapshots before the program itself.
    pub async fn delete(&self, caller: Uuid, id: Uuid) -> PortResult<()> {
        self.owned(caller, ProgramNode::Program(id)).await?;
        for week in self.programs.list_weeks(id).await? {
            self.delete_week_tree(week.id).await?;
        }
        self.programs.delete_program(id).await?;
        info!(program_id = %id, "program deleted");
        Ok(())
    }

    async fn delete_week_tree(&self, week_id: Uuid) -> PortResult<()> {
        for day in self.programs.list_days(week_id).await? {
            self.programs.delete_prescriptions_of_day(day.id).await?;
            self.programs.delete_day(day.id).await?;
        }
        self.programs.delete_week(week_id).await
    }

    pub async fn new_version(&self, caller: Uuid, id: Uuid) -> PortResult<Program> {
        self.owned(caller, ProgramNode::Program(id)).await?;
        let next = self.programs.clone_next_version(id).await?;
        info!(program_id = %id, new_program_id = %next.id, version = next.version, "program versioned");
        Ok(next)
    }

    pub async fn list_versions(&self, caller: Uuid, id: Uuid) -> PortResult<Vec<ProgramVersion>> {
        self.readable(caller, ProgramNode::Program(id)).await?;
        self.programs.list_versions(id).await
    }

    // --- Weeks ---

    pub async fn add_week(
        &self,
        caller: Uuid,
        program_id: Uuid,
        week_index: i32,
    ) -> PortResult<ProgramWeek> {
        self.owned(caller, ProgramNode::Program(program_id)).await?;
        if week_index < 1 {
            return Err(PortError::Validation("invalid_week_index".to_string()));
        }
        self.programs.add_week(program_id, week_index).await
    }

    pub async fn list_weeks(&self, caller: Uuid, program_id: Uuid) -> PortResult<Vec<ProgramWeek>> {
        self.readable(caller, ProgramNode::Program(program_id)).await?;
        self.programs.list_weeks(program_id).await
    }

    pub async fn delete_week(&self, caller: Uuid, program_id: Uuid, week_id: Uuid) -> PortResult<()> {
        self.owned(caller, ProgramNode::Program(program_id)).await?;
        self.week_in_program(program_id, week_id).await?;
        self.delete_week_tree(week_id).await
    }

    // --- Days ---

    pub async fn add_day(
        &self,
        caller: Uuid,
        program_id: Uuid,
        week_id: Uuid,
        input: NewDay,
    ) -> PortResult<ProgramDay> {
        self.owned(caller, ProgramNode::Program(program_id)).await?;
        self.week_in_program(program_id, week_id).await?;
        if input.day_index < 1 {
            return Err(PortError::Validation("invalid_day_index".to_string()));
        }
        let input = NewDay {
            day_index: input.day_index,
            notes: normalize_opt(input.notes),
        };
        self.programs.add_day(week_id, &input).await
    }

    pub async fn list_days(
        &self,
        caller: Uuid,
        program_id: Uuid,
        week_id: Uuid,
    ) -> PortResult<Vec<ProgramDay>> {
        self.readable(caller, ProgramNode::Program(program_id)).await?;
        self.week_in_program(program_id, week_id).await?;
        self.programs.list_days(week_id).await
    }

    pub async fn update_day(&self, caller: Uuid, day_id: Uuid, patch: DayPatch) -> PortResult<ProgramDay> {
        self.owned(caller, ProgramNode::Day(day_id)).await?;
        if patch.is_empty() {
            return Err(PortError::Validation("empty_patch".to_string()));
        }
        if patch.day_index.is_some_and(|i| i < 1) {
            return Err(PortError::Validation("invalid_day_index".to_string()));
        }
        self.programs.update_day(day_id, &patch).await
    }

    pub async fn delete_day(&self, caller: Uuid, day_id: Uuid) -> PortResult<()> {
        self.owned(caller, ProgramNode::Day(day_id)).await?;
        self.programs.delete_prescriptions_of_day(day_id).await?;
        self.programs.delete_day(day_id).await
    }

    // --- Prescriptions ---

    pub async fn add_prescription(
        &self,
        caller: Uuid,
        day_id: Uuid,
        input: NewPrescription,
    ) -> PortResult<Prescription> {
        self.owned(caller, ProgramNode::Day(day_id)).await?;
        validate_prescription_numbers(Some(input.series), Some(&input.reps), input.position)?;
        self.exercises.get_exercise(input.exercise_id).await?;
        let input = NewPrescription {
            reps: input.reps.trim().to_string(),
            tempo: normalize_opt(input.tempo),
            notes: normalize_opt(input.notes),
            ..input
        };
        self.programs.add_prescription(day_id, &input).await
    }

    pub async fn list_prescriptions(
        &self,
        caller: Uuid,
        day_id: Uuid,
    ) -> PortResult<Vec<PrescriptionView>> {
        self.readable(caller, ProgramNode::Day(day_id)).await?;
        self.programs.list_prescriptions(day_id).await
    }

    pub async fn update_prescription(
        &self,
        caller: Uuid,
        id: Uuid,
        patch: PrescriptionPatch,
    ) -> PortResult<Prescription> {
        self.owned(caller, ProgramNode::Prescription(id)).await?;
        if patch.is_empty() {
            return Err(PortError::Validation("empty_patch".to_string()));
        }
        validate_prescription_numbers(patch.series, patch.reps.as_deref(), patch.position)?;
        if let Some(exercise_id) = patch.exercise_id {
            self.exercises.get_exercise(exercise_id).await?;
        }
        self.programs.update_prescription(id, &patch).await
    }

    pub async fn delete_prescription(&self, caller: Uuid, id: Uuid) -> PortResult<()> {
        self.owned(caller, ProgramNode::Prescription(id)).await?;
        self.programs.delete_prescription(id).await
    }

    /// `ordered_ids` must be prescriptions of `day_id`; their positions become 1..=n.
    pub async fn reorder_prescriptions(
        &self,
        caller: Uuid,
        day_id: Uuid,
        ordered_ids: Vec<Uuid>,
    ) -> PortResult<Vec<PrescriptionView>> {
        self.owned(caller, ProgramNode::Day(day_id)).await?;
        if ordered_ids.is_empty() {
            return Err(PortError::Validation("ids_required".to_string()));
        }
        let current: HashSet<Uuid> = self
            .programs
            .list_prescriptions(day_id)
            .await?
            .into_iter()
            .map(|p| p.prescription.id)
            .collect();
        let mut seen = HashSet::new();
        if !ordered_ids
            .iter()
            .all(|id| current.contains(id) && seen.insert(*id))
        {
            return Err(PortError::Validation("unknown_prescription".to_string()));
        }
        self.programs.reorder_prescriptions(day_id, &ordered_ids).await?;
        self.programs.list_prescriptions(day_id).await
    }

    /// Elapsed-days projection: the slot `(days / 7 + 1, days % 7 + 1)` of the assignment
    /// active on `date`. This intentionally differs from the "today" resolution used by the
    /// history and coach endpoints, which always lands on week 1 / day 1.
    pub async fn day_for_date(&self, disciple_id: Uuid, date: NaiveDate) -> PortResult<ProgramDayPlan> {
        let assignment = self
            .assignments
            .active_assignment_on(disciple_id, date)
            .await?
            .ok_or(PortError::NoDay)?;
        let (week_index, day_index) = program_slot_for_date(assignment.start_date, date);
        let day = self
            .programs
            .find_day(assignment.program_id, week_index, day_index)
            .await?
            .ok_or(PortError::NoDay)?;
        let prescriptions = self.programs.list_prescriptions(day.id).await?;
        Ok(ProgramDayPlan {
            assignment_id: assignment.id,
            date,
            week_index,
            day,
            prescriptions,
        })
    }
}
