//! crates/roma_core/src/memory.rs
//!
//! A process-local store implementing every repository port, plus trivial security adapters.
//! Used by the service tests and by the HTTP tests of the api crate.

use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use chrono_tz::Tz;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

use crate::domain::{
    Assignment, AssignmentDay, AssignmentPatch, AssignmentSummary, CardioSegment, CoachLink,
    CurrentSession, DayPatch, Disciple, Exercise, ExerciseFilter, ExerciseInput, Invitation,
    InvitationStatus, InviteClaims, LinkLists, LinkStatus, NewAssignment, NewCardio, NewDay,
    NewInvitation, NewPrescription, NewProgram, NewSession, NewSet, Prescription,
    PrescriptionPatch, PrescriptionView, Program, ProgramDay, ProgramFilter, ProgramNode,
    ProgramPatch, ProgramVersion, ProgramWeek, SessionLog, SessionPatch, SessionStatus, SetLog,
    SetPatch, SetView, TagMatch, User, UserCredentials,
};
use crate::history::{
    local_date, DailyExerciseVolume, DailyMuscleVolume, DayHistoryRow, ExerciseRef, HistoryQuery,
    LiftSample, PlanVsDoneRow, SessionHistoryRow,
};
use crate::ports::{
    AssignmentRepository, CoachRepository, ExerciseRepository, HistoryRepository, InviteCodec,
    InviteRepository, PasswordHasher, PortError, PortResult, ProgramRepository,
    SessionRepository, UserRepository,
};

fn not_found(what: &str) -> PortError {
    PortError::NotFound(what.to_string())
}

fn page<T>(items: Vec<T>, limit: i64, offset: i64) -> (Vec<T>, i64) {
    let total = items.len() as i64;
    let items = items
        .into_iter()
        .skip(offset.max(0) as usize)
        .take(limit.max(0) as usize)
        .collect();
    (items, total)
}

#[derive(Default)]
struct State {
    last_tick: Option<DateTime<Utc>>,
    users: Vec<(User, String)>,
    exercises: Vec<Exercise>,
    programs: Vec<Program>,
    versions: Vec<ProgramVersion>,
    weeks: Vec<ProgramWeek>,
    days: Vec<ProgramDay>,
    prescriptions: Vec<Prescription>,
    links: Vec<CoachLink>,
    assignments: Vec<Assignment>,
    sessions: Vec<SessionLog>,
    sets: Vec<SetLog>,
    cardio: Vec<CardioSegment>,
    invitations: Vec<Invitation>,
}

impl State {
    /// Strictly increasing timestamps, so "newest" is well defined within one test.
    fn tick(&mut self) -> DateTime<Utc> {
        let mut now = Utc::now();
        if let Some(last) = self.last_tick {
            if now <= last {
                now = last + Duration::microseconds(1);
            }
        }
        self.last_tick = Some(now);
        now
    }

    fn program(&self, id: Uuid) -> Option<&Program> {
        self.programs.iter().find(|p| p.id == id)
    }

    fn week(&self, id: Uuid) -> Option<&ProgramWeek> {
        self.weeks.iter().find(|w| w.id == id)
    }

    fn day(&self, id: Uuid) -> Option<&ProgramDay> {
        self.days.iter().find(|d| d.id == id)
    }

    fn prescription(&self, id: Uuid) -> Option<&Prescription> {
        self.prescriptions.iter().find(|p| p.id == id)
    }

    fn exercise(&self, id: Uuid) -> Option<&Exercise> {
        self.exercises.iter().find(|e| e.id == id)
    }

    fn user(&self, id: Uuid) -> Option<&User> {
        self.users.iter().map(|(u, _)| u).find(|u| u.id == id)
    }

    fn days_of_week(&self, week_id: Uuid) -> Vec<ProgramDay> {
        let mut days: Vec<ProgramDay> = self
            .days
            .iter()
            .filter(|d| d.week_id == week_id)
            .cloned()
            .collect();
        days.sort_by(|a, b| a.day_index.cmp(&b.day_index).then(a.id.cmp(&b.id)));
        days
    }

    fn weeks_of(&self, program_id: Uuid) -> Vec<ProgramWeek> {
        let mut weeks: Vec<ProgramWeek> = self
            .weeks
            .iter()
            .filter(|w| w.program_id == program_id)
            .cloned()
            .collect();
        weeks.sort_by(|a, b| a.week_index.cmp(&b.week_index).then(a.id.cmp(&b.id)));
        weeks
    }

    fn prescription_views(&self, day_id: Uuid) -> Vec<PrescriptionView> {
        let mut rows: Vec<PrescriptionView> = self
            .prescriptions
            .iter()
            .filter(|p| p.day_id == day_id)
            .filter_map(|p| {
                let e = self.exercise(p.exercise_id)?;
                Some(PrescriptionView {
                    prescription: p.clone(),
                    exercise_name: e.name.clone(),
                    primary_muscle: e.primary_muscle.clone(),
                    equipment: e.equipment.clone(),
                })
            })
            .collect();
        rows.sort_by(|a, b| {
            a.prescription
                .position
                .cmp(&b.prescription.position)
                .then(a.prescription.id.cmp(&b.prescription.id))
        });
        rows
    }

    /// The exercise behind a logged set.
    fn exercise_of_set(&self, set: &SetLog) -> Option<&Exercise> {
        let rx = self.prescription(set.prescription_id)?;
        self.exercise(rx.exercise_id)
    }

    fn sets_of(&self, session_id: Uuid) -> impl Iterator<Item = &SetLog> {
        self.sets.iter().filter(move |s| s.session_id == session_id)
    }

    fn session_volume(&self, session_id: Uuid) -> (i64, f64) {
        self.sets_of(session_id).fold((0, 0.0), |(n, v), s| {
            (n + 1, v + s.weight.unwrap_or(0.0) * s.reps as f64)
        })
    }

    fn sessions_of(&self, disciple_id: Uuid) -> impl Iterator<Item = &SessionLog> {
        self.sessions
            .iter()
            .filter(move |s| s.disciple_id == disciple_id)
    }
}

/// An in-memory implementation of all repository ports.
#[derive(Default)]
pub struct InMemoryStore {
    state: Mutex<State>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Inserts a user whose password is `password` under [`PlainHasher`].
    pub fn seed_user(&self, email: &str, name: &str) -> Uuid {
        let mut st = self.state();
        let user = User {
            id: Uuid::new_v4(),
            email: email.to_lowercase(),
            name: name.to_string(),
            created_at: st.tick(),
        };
        let id = user.id;
        st.users.push((user, PlainHasher::encode("password")));
        id
    }

    pub fn seed_exercise(&self, name: &str, primary_muscle: &str) -> Uuid {
        let mut st = self.state();
        let now = st.tick();
        let exercise = Exercise {
            id: Uuid::new_v4(),
            name: name.to_string(),
            primary_muscle: primary_muscle.to_string(),
            equipment: None,
            tags: Vec::new(),
            notes: None,
            created_at: now,
            updated_at: now,
        };
        let id = exercise.id;
        st.exercises.push(exercise);
        id
    }
}

//=========================================================================================
// Users
//=========================================================================================

#[async_trait]
impl UserRepository for InMemoryStore {
    async fn create_user(&self, email: &str, name: &str, password_hash: &str) -> PortResult<User> {
        let mut st = self.state();
        if st.users.iter().any(|(u, _)| u.email.eq_ignore_ascii_case(email)) {
            return Err(PortError::Conflict("email_in_use".to_string()));
        }
        let user = User {
            id: Uuid::new_v4(),
            email: email.to_string(),
            name: name.to_string(),
            created_at: st.tick(),
        };
        st.users.push((user.clone(), password_hash.to_string()));
        Ok(user)
    }

    async fn get_credentials_by_email(&self, email: &str) -> PortResult<UserCredentials> {
        self.state()
            .users
            .iter()
            .find(|(u, _)| u.email.eq_ignore_ascii_case(email))
            .map(|(u, h)| UserCredentials {
                user: u.clone(),
                password_hash: h.clone(),
            })
            .ok_or_else(|| not_found("user"))
    }

    async fn get_user(&self, user_id: Uuid) -> PortResult<User> {
        self.state().user(user_id).cloned().ok_or_else(|| not_found("user"))
    }

    async fn owns_any_program(&self, user_id: Uuid) -> PortResult<bool> {
        Ok(self.state().programs.iter().any(|p| p.owner_id == user_id))
    }

    async fn coaches_anyone(&self, user_id: Uuid) -> PortResult<bool> {
        Ok(self.state().links.iter().any(|l| {
            l.coach_id == user_id && l.disciple_id != user_id && l.status == LinkStatus::Accepted
        }))
    }
}

//=========================================================================================
// Exercises
//=========================================================================================

fn exercise_matches(e: &Exercise, f: &ExerciseFilter) -> bool {
    if let Some(q) = &f.query {
        let q = q.to_lowercase();
        if !e.name.to_lowercase().contains(&q) && !e.primary_muscle.to_lowercase().contains(&q) {
            return false;
        }
    }
    if let Some(m) = &f.muscle {
        if !e.primary_muscle.eq_ignore_ascii_case(m) {
            return false;
        }
    }
    if let Some(eq) = &f.equipment {
        if !e.equipment.as_deref().is_some_and(|x| x.eq_ignore_ascii_case(eq)) {
            return false;
        }
    }
    if !f.tags.is_empty() {
        let has = |t: &String| e.tags.iter().any(|x| x.eq_ignore_ascii_case(t));
        let ok = match f.tag_match {
            TagMatch::Any => f.tags.iter().any(has),
            TagMatch::All => f.tags.iter().all(has),
        };
        if !ok {
            return false;
        }
    }
    true
}

#[async_trait]
impl ExerciseRepository for InMemoryStore {
    async fn search_exercises(&self, filter: &ExerciseFilter) -> PortResult<(Vec<Exercise>, i64)> {
        let st = self.state();
        let mut rows: Vec<Exercise> = st
            .exercises
            .iter()
            .filter(|e| exercise_matches(e, filter))
            .cloned()
            .collect();
        rows.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        Ok(page(rows, filter.limit, filter.offset))
    }

    async fn create_exercise(&self, input: &ExerciseInput) -> PortResult<Exercise> {
        let mut st = self.state();
        if st.exercises.iter().any(|e| e.name.eq_ignore_ascii_case(&input.name)) {
            return Err(PortError::Conflict("name_already_exists".to_string()));
        }
        let now = st.tick();
        let exercise = Exercise {
            id: Uuid::new_v4(),
            name: input.name.clone(),
            primary_muscle: input.primary_muscle.clone(),
            equipment: input.equipment.clone(),
            tags: input.tags.clone(),
            notes: input.notes.clone(),
            created_at: now,
            updated_at: now,
        };
        st.exercises.push(exercise.clone());
        Ok(exercise)
    }

    async fn get_exercise(&self, id: Uuid) -> PortResult<Exercise> {
        self.state().exercise(id).cloned().ok_or_else(|| not_found("exercise"))
    }

    async fn update_exercise(&self, id: Uuid, input: &ExerciseInput) -> PortResult<Exercise> {
        let mut st = self.state();
        if st
            .exercises
            .iter()
            .any(|e| e.id != id && e.name.eq_ignore_ascii_case(&input.name))
        {
            return Err(PortError::Conflict("name_already_exists".to_string()));
        }
        let now = st.tick();
        let e = st
            .exercises
            .iter_mut()
            .find(|e| e.id == id)
            .ok_or_else(|| not_found("exercise"))?;
        e.name = input.name.clone();
        e.primary_muscle = input.primary_muscle.clone();
        e.equipment = input.equipment.clone();
        e.tags = input.tags.clone();
        e.notes = input.notes.clone();
        e.updated_at = now;
        Ok(e.clone())
    }

    async fn delete_exercise(&self, id: Uuid) -> PortResult<()> {
        let mut st = self.state();
        if st.exercise(id).is_none() {
            return Err(not_found("exercise"));
        }
        if st.prescriptions.iter().any(|p| p.exercise_id == id) {
            return Err(PortError::Conflict("in_use".to_string()));
        }
        st.exercises.retain(|e| e.id != id);
        Ok(())
    }
}

//=========================================================================================
// Programs
//=========================================================================================

#[async_trait]
impl ProgramRepository for InMemoryStore {
    async fn create_program(&self, owner_id: Uuid, input: &NewProgram) -> PortResult<Program> {
        let mut st = self.state();
        let now = st.tick();
        let program = Program {
            id: Uuid::new_v4(),
            owner_id,
            title: input.title.clone(),
            notes: input.notes.clone(),
            visibility: input
                .visibility
                .clone()
                .unwrap_or_else(|| "private".to_string()),
            version: 1,
            created_at: now,
            updated_at: now,
        };
        st.programs.push(program.clone());
        Ok(program)
    }

    async fn list_programs(&self, filter: &ProgramFilter) -> PortResult<(Vec<Program>, i64)> {
        let st = self.state();
        let q = filter.query.as_ref().map(|q| q.to_lowercase());
        let mut rows: Vec<Program> = st
            .programs
            .iter()
            .filter(|p| p.owner_id == filter.owner_id)
            .filter(|p| q.as_ref().map_or(true, |q| p.title.to_lowercase().contains(q)))
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(page(rows, filter.limit, filter.offset))
    }

    async fn get_program(&self, id: Uuid) -> PortResult<Program> {
        self.state().program(id).cloned().ok_or_else(|| not_found("program"))
    }

    async fn update_program(&self, id: Uuid, patch: &ProgramPatch) -> PortResult<Program> {
        let mut st = self.state();
        let now = st.tick();
        let p = st
            .programs
            .iter_mut()
            .find(|p| p.id == id)
            .ok_or_else(|| not_found("program"))?;
        if let Some(t) = &patch.title {
            p.title = t.clone();
        }
        if let Some(n) = &patch.notes {
            p.notes = Some(n.clone());
        }
        if let Some(v) = &patch.visibility {
            p.visibility = v.clone();
        }
        p.updated_at = now;
        Ok(p.clone())
    }

    async fn delete_program(&self, id: Uuid) -> PortResult<()> {
        let mut st = self.state();
        if st.program(id).is_none() {
            return Err(not_found("program"));
        }
        if st.assignments.iter().any(|a| a.program_id == id) {
            return Err(PortError::Conflict("in_use".to_string()));
        }
        st.versions.retain(|v| v.program_id != id);
        st.programs.retain(|p| p.id != id);
        Ok(())
    }

    async fn program_of(&self, node: ProgramNode) -> PortResult<Option<Program>> {
        let st = self.state();
        let program_id = match node {
            ProgramNode::Program(id) => Some(id),
            ProgramNode::Week(id) => st.week(id).map(|w| w.program_id),
            ProgramNode::Day(id) => st
                .day(id)
                .and_then(|d| st.week(d.week_id))
                .map(|w| w.program_id),
            ProgramNode::Prescription(id) => st
                .prescription(id)
                .and_then(|p| st.day(p.day_id))
                .and_then(|d| st.week(d.week_id))
                .map(|w| w.program_id),
        };
        Ok(program_id.and_then(|id| st.program(id)).cloned())
    }

    async fn record_version(&self, program: &Program) -> PortResult<ProgramVersion> {
        let mut st = self.state();
        let version = ProgramVersion {
            id: Uuid::new_v4(),
            program_id: program.id,
            version: program.version,
            title: program.title.clone(),
            notes: program.notes.clone(),
            created_at: st.tick(),
        };
        st.versions.push(version.clone());
        Ok(version)
    }

    async fn list_versions(&self, program_id: Uuid) -> PortResult<Vec<ProgramVersion>> {
        let st = self.state();
        let mut rows: Vec<ProgramVersion> = st
            .versions
            .iter()
            .filter(|v| v.program_id == program_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.version.cmp(&a.version).then(b.created_at.cmp(&a.created_at)));
        Ok(rows)
    }

    async fn clone_next_version(&self, program_id: Uuid) -> PortResult<Program> {
        let mut st = self.state();
        let source = st.program(program_id).cloned().ok_or_else(|| not_found("program"))?;
        let now = st.tick();
        let next = Program {
            id: Uuid::new_v4(),
            version: source.version + 1,
            created_at: now,
            updated_at: now,
            ..source
        };
        st.programs.push(next.clone());

        for week in st.weeks_of(program_id) {
            let new_week = ProgramWeek {
                id: Uuid::new_v4(),
                program_id: next.id,
                week_index: week.week_index,
            };
            st.weeks.push(new_week.clone());
            for day in st.days_of_week(week.id) {
                let new_day = ProgramDay {
                    id: Uuid::new_v4(),
                    week_id: new_week.id,
                    ..day.clone()
                };
                st.days.push(new_day.clone());
                let copies: Vec<Prescription> = st
                    .prescriptions
                    .iter()
                    .filter(|p| p.day_id == day.id)
                    .map(|p| Prescription {
                        id: Uuid::new_v4(),
                        day_id: new_day.id,
                        ..p.clone()
                    })
                    .collect();
                st.prescriptions.extend(copies);
            }
        }

        let snapshot = ProgramVersion {
            id: Uuid::new_v4(),
            program_id: next.id,
            version: next.version,
            title: next.title.clone(),
            notes: next.notes.clone(),
            created_at: now,
        };
        st.versions.push(snapshot);
        Ok(next)
    }

    async fn add_week(&self, program_id: Uuid, week_index: i32) -> PortResult<ProgramWeek> {
        let mut st = self.state();
        if st.program(program_id).is_none() {
            return Err(not_found("program"));
        }
        if st
            .weeks
            .iter()
            .any(|w| w.program_id == program_id && w.week_index == week_index)
        {
            return Err(PortError::Conflict("week_index_taken".to_string()));
        }
        let week = ProgramWeek {
            id: Uuid::new_v4(),
            program_id,
            week_index,
        };
        st.weeks.push(week.clone());
        Ok(week)
    }

    async fn list_weeks(&self, program_id: Uuid) -> PortResult<Vec<ProgramWeek>> {
        Ok(self.state().weeks_of(program_id))
    }

    async fn get_week(&self, week_id: Uuid) -> PortResult<ProgramWeek> {
        self.state().week(week_id).cloned().ok_or_else(|| not_found("week"))
    }

    async fn delete_week(&self, week_id: Uuid) -> PortResult<()> {
        let mut st = self.state();
        if st.days.iter().any(|d| d.week_id == week_id) {
            return Err(PortError::Conflict("in_use".to_string()));
        }
        let before = st.weeks.len();
        st.weeks.retain(|w| w.id != week_id);
        if st.weeks.len() == before {
            return Err(not_found("week"));
        }
        Ok(())
    }

    async fn add_day(&self, week_id: Uuid, input: &NewDay) -> PortResult<ProgramDay> {
        let mut st = self.state();
        if st.week(week_id).is_none() {
            return Err(not_found("week"));
        }
        if st
            .days
            .iter()
            .any(|d| d.week_id == week_id && d.day_index == input.day_index)
        {
            return Err(PortError::Conflict("day_index_taken".to_string()));
        }
        let day = ProgramDay {
            id: Uuid::new_v4(),
            week_id,
            day_index: input.day_index,
            notes: input.notes.clone(),
        };
        st.days.push(day.clone());
        Ok(day)
    }

    async fn list_days(&self, week_id: Uuid) -> PortResult<Vec<ProgramDay>> {
        Ok(self.state().days_of_week(week_id))
    }

    async fn get_day(&self, day_id: Uuid) -> PortResult<ProgramDay> {
        self.state().day(day_id).cloned().ok_or_else(|| not_found("day"))
    }

    async fn find_day(
        &self,
        program_id: Uuid,
        week_index: i32,
        day_index: i32,
    ) -> PortResult<Option<ProgramDay>> {
        let st = self.state();
        let Some(week) = st
            .weeks
            .iter()
            .find(|w| w.program_id == program_id && w.week_index == week_index)
        else {
            return Ok(None);
        };
        Ok(st
            .days_of_week(week.id)
            .into_iter()
            .find(|d| d.day_index == day_index))
    }

    async fn update_day(&self, day_id: Uuid, patch: &DayPatch) -> PortResult<ProgramDay> {
        let mut st = self.state();
        let day = st.day(day_id).cloned().ok_or_else(|| not_found("day"))?;
        if let Some(idx) = patch.day_index {
            if st
                .days
                .iter()
                .any(|d| d.week_id == day.week_id && d.id != day_id && d.day_index == idx)
            {
                return Err(PortError::Conflict("day_index_taken".to_string()));
            }
        }
        let d = st
            .days
            .iter_mut()
            .find(|d| d.id == day_id)
            .ok_or_else(|| not_found("day"))?;
        if let Some(idx) = patch.day_index {
            d.day_index = idx;
        }
        if let Some(n) = &patch.notes {
            d.notes = Some(n.clone());
        }
        Ok(d.clone())
    }

    async fn delete_day(&self, day_id: Uuid) -> PortResult<()> {
        let mut st = self.state();
        if st.prescriptions.iter().any(|p| p.day_id == day_id)
            || st.sessions.iter().any(|s| s.day_id == day_id)
        {
            return Err(PortError::Conflict("in_use".to_string()));
        }
        let before = st.days.len();
        st.days.retain(|d| d.id != day_id);
        if st.days.len() == before {
            return Err(not_found("day"));
        }
        Ok(())
    }

    async fn add_prescription(
        &self,
        day_id: Uuid,
        input: &NewPrescription,
    ) -> PortResult<Prescription> {
        let mut st = self.state();
        if st.day(day_id).is_none() {
            return Err(not_found("day"));
        }
        if st.exercise(input.exercise_id).is_none() {
            return Err(PortError::Conflict("in_use".to_string()));
        }
        let rx = Prescription {
            id: Uuid::new_v4(),
            day_id,
            exercise_id: input.exercise_id,
            series: input.series,
            reps: input.reps.clone(),
            rest_sec: input.rest_sec,
            to_failure: input.to_failure,
            tempo: input.tempo.clone(),
            rir: input.rir,
            rpe: input.rpe,
            method_id: input.method_id,
            notes: input.notes.clone(),
            position: input.position.unwrap_or(1),
        };
        st.prescriptions.push(rx.clone());
        Ok(rx)
    }

    async fn list_prescriptions(&self, day_id: Uuid) -> PortResult<Vec<PrescriptionView>> {
        Ok(self.state().prescription_views(day_id))
    }

    async fn update_prescription(
        &self,
        id: Uuid,
        patch: &PrescriptionPatch,
    ) -> PortResult<Prescription> {
        let mut st = self.state();
        let p = st
            .prescriptions
            .iter_mut()
            .find(|p| p.id == id)
            .ok_or_else(|| not_found("prescription"))?;
        if let Some(v) = patch.exercise_id {
            p.exercise_id = v;
        }
        if let Some(v) = patch.series {
            p.series = v;
        }
        if let Some(v) = &patch.reps {
            p.reps = v.clone();
        }
        if let Some(v) = patch.rest_sec {
            p.rest_sec = Some(v);
        }
        if let Some(v) = patch.to_failure {
            p.to_failure = v;
        }
        if let Some(v) = &patch.tempo {
            p.tempo = Some(v.clone());
        }
        if let Some(v) = patch.rir {
            p.rir = Some(v);
        }
        if let Some(v) = patch.rpe {
            p.rpe = Some(v);
        }
        if let Some(v) = patch.method_id {
            p.method_id = Some(v);
        }
        if let Some(v) = &patch.notes {
            p.notes = Some(v.clone());
        }
        if let Some(v) = patch.position {
            p.position = v;
        }
        Ok(p.clone())
    }

    async fn delete_prescription(&self, id: Uuid) -> PortResult<()> {
        let mut st = self.state();
        if st.sets.iter().any(|s| s.prescription_id == id) {
            return Err(PortError::Conflict("in_use".to_string()));
        }
        let before = st.prescriptions.len();
        st.prescriptions.retain(|p| p.id != id);
        if st.prescriptions.len() == before {
            return Err(not_found("prescription"));
        }
        Ok(())
    }

    async fn delete_prescriptions_of_day(&self, day_id: Uuid) -> PortResult<()> {
        let mut st = self.state();
        let ids: HashSet<Uuid> = st
            .prescriptions
            .iter()
            .filter(|p| p.day_id == day_id)
            .map(|p| p.id)
            .collect();
        if st.sets.iter().any(|s| ids.contains(&s.prescription_id)) {
            return Err(PortError::Conflict("in_use".to_string()));
        }
        st.prescriptions.retain(|p| p.day_id != day_id);
        Ok(())
    }

    async fn reorder_prescriptions(&self, day_id: Uuid, ordered_ids: &[Uuid]) -> PortResult<()> {
        let mut st = self.state();
        for (idx, id) in ordered_ids.iter().enumerate() {
            if let Some(p) = st
                .prescriptions
                .iter_mut()
                .find(|p| p.id == *id && p.day_id == day_id)
            {
                p.position = idx as i32 + 1;
            }
        }
        Ok(())
    }
}

//=========================================================================================
// Coach links
//=========================================================================================

#[async_trait]
impl CoachRepository for InMemoryStore {
    async fn create_link(
        &self,
        coach_id: Uuid,
        disciple_id: Uuid,
        status: LinkStatus,
    ) -> PortResult<CoachLink> {
        let mut st = self.state();
        let now = st.tick();
        let link = CoachLink {
            id: Uuid::new_v4(),
            coach_id,
            disciple_id,
            status,
            created_at: now,
            updated_at: now,
        };
        st.links.push(link.clone());
        Ok(link)
    }

    async fn update_link_status(&self, link_id: Uuid, status: LinkStatus) -> PortResult<CoachLink> {
        let mut st = self.state();
        let now = st.tick();
        let link = st
            .links
            .iter_mut()
            .find(|l| l.id == link_id)
            .ok_or_else(|| not_found("link"))?;
        link.status = status;
        link.updated_at = now;
        Ok(link.clone())
    }

    async fn list_links(&self, user_id: Uuid) -> PortResult<LinkLists> {
        let st = self.state();
        let mut lists = LinkLists::default();
        for link in st.links.iter().rev() {
            if link.disciple_id == user_id {
                lists.incoming.push(link.clone());
            }
            if link.coach_id == user_id {
                lists.outgoing.push(link.clone());
            }
        }
        Ok(lists)
    }

    async fn has_accepted_link(&self, coach_id: Uuid, disciple_id: Uuid) -> PortResult<bool> {
        Ok(self.state().links.iter().any(|l| {
            l.coach_id == coach_id && l.disciple_id == disciple_id && l.status == LinkStatus::Accepted
        }))
    }

    async fn list_disciples(&self, coach_id: Uuid) -> PortResult<Vec<Disciple>> {
        let st = self.state();
        let mut seen = HashSet::new();
        let mut rows: Vec<Disciple> = st
            .links
            .iter()
            .filter(|l| {
                l.coach_id == coach_id
                    && l.disciple_id != coach_id
                    && l.status == LinkStatus::Accepted
            })
            .filter(|l| seen.insert(l.disciple_id))
            .filter_map(|l| {
                let u = st.user(l.disciple_id)?;
                Some(Disciple {
                    id: u.id,
                    email: u.email.clone(),
                    name: u.name.clone(),
                    linked_at: l.updated_at,
                })
            })
            .collect();
        rows.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        Ok(rows)
    }
}

//=========================================================================================
// Assignments
//=========================================================================================

#[async_trait]
impl AssignmentRepository for InMemoryStore {
    async fn create_assignment(&self, input: &NewAssignment) -> PortResult<Assignment> {
        let mut st = self.state();
        if st.program(input.program_id).is_none() || st.user(input.disciple_id).is_none() {
            return Err(PortError::Conflict("in_use".to_string()));
        }
        let assignment = Assignment {
            id: Uuid::new_v4(),
            program_id: input.program_id,
            program_version: input.program_version,
            disciple_id: input.disciple_id,
            assigned_by: input.assigned_by,
            start_date: input.start_date,
            end_date: input.end_date,
            is_active: false,
            created_at: st.tick(),
        };
        st.assignments.push(assignment.clone());
        Ok(assignment)
    }

    async fn create_active_assignment(&self, input: &NewAssignment) -> PortResult<Assignment> {
        let mut st = self.state();
        if st.program(input.program_id).is_none() || st.user(input.disciple_id).is_none() {
            return Err(PortError::Conflict("in_use".to_string()));
        }
        for a in st.assignments.iter_mut().filter(|a| a.disciple_id == input.disciple_id) {
            a.is_active = false;
        }
        let assignment = Assignment {
            id: Uuid::new_v4(),
            program_id: input.program_id,
            program_version: input.program_version,
            disciple_id: input.disciple_id,
            assigned_by: input.assigned_by,
            start_date: input.start_date,
            end_date: input.end_date,
            is_active: true,
            created_at: st.tick(),
        };
        st.assignments.push(assignment.clone());
        Ok(assignment)
    }

    async fn get_assignment(&self, id: Uuid) -> PortResult<Assignment> {
        self.state()
            .assignments
            .iter()
            .find(|a| a.id == id)
            .cloned()
            .ok_or_else(|| not_found("assignment"))
    }

    async fn list_assignments(
        &self,
        disciple_ids: &[Uuid],
        limit: i64,
        offset: i64,
    ) -> PortResult<(Vec<AssignmentSummary>, i64)> {
        let st = self.state();
        let rows: Vec<AssignmentSummary> = st
            .assignments
            .iter()
            .rev()
            .filter(|a| disciple_ids.contains(&a.disciple_id))
            .map(|a| {
                let user = st.user(a.disciple_id);
                AssignmentSummary {
                    assignment: a.clone(),
                    program_title: st
                        .program(a.program_id)
                        .map(|p| p.title.clone())
                        .unwrap_or_default(),
                    disciple_name: user.map(|u| u.name.clone()).unwrap_or_default(),
                    disciple_email: user.map(|u| u.email.clone()).unwrap_or_default(),
                }
            })
            .collect();
        Ok(page(rows, limit, offset))
    }

    async fn update_assignment(&self, id: Uuid, patch: &AssignmentPatch) -> PortResult<Assignment> {
        let mut st = self.state();
        let a = st
            .assignments
            .iter_mut()
            .find(|a| a.id == id)
            .ok_or_else(|| not_found("assignment"))?;
        if let Some(end) = patch.end_date {
            a.end_date = Some(end);
        }
        if let Some(active) = patch.is_active {
            a.is_active = active;
        }
        Ok(a.clone())
    }

    async fn activate_assignment(
        &self,
        disciple_id: Uuid,
        assignment_id: Uuid,
        _today: NaiveDate,
    ) -> PortResult<Assignment> {
        let mut st = self.state();
        if !st
            .assignments
            .iter()
            .any(|a| a.id == assignment_id && a.disciple_id == disciple_id)
        {
            return Err(not_found("assignment"));
        }
        let mut activated = None;
        for a in st.assignments.iter_mut().filter(|a| a.disciple_id == disciple_id) {
            if a.id == assignment_id {
                a.is_active = true;
                a.end_date = None;
                activated = Some(a.clone());
            } else {
                a.is_active = false;
            }
        }
        activated.ok_or_else(|| not_found("assignment"))
    }

    async fn latest_active_assignment(&self, disciple_id: Uuid) -> PortResult<Option<Assignment>> {
        Ok(self
            .state()
            .assignments
            .iter()
            .rev()
            .find(|a| a.disciple_id == disciple_id && a.is_active)
            .cloned())
    }

    async fn active_assignment_on(
        &self,
        disciple_id: Uuid,
        date: NaiveDate,
    ) -> PortResult<Option<Assignment>> {
        Ok(self
            .state()
            .assignments
            .iter()
            .rev()
            .find(|a| a.disciple_id == disciple_id && a.is_active && a.covers(date))
            .cloned())
    }

    async fn is_assigned(&self, disciple_id: Uuid, program_id: Uuid) -> PortResult<bool> {
        Ok(self
            .state()
            .assignments
            .iter()
            .any(|a| a.disciple_id == disciple_id && a.program_id == program_id))
    }

    async fn list_assignment_days(&self, assignment: &Assignment) -> PortResult<Vec<AssignmentDay>> {
        let st = self.state();
        let mut rows = Vec::new();
        for week in st.weeks_of(assignment.program_id) {
            for day in st.days_of_week(week.id) {
                rows.push(AssignmentDay {
                    week_index: week.week_index,
                    day_id: day.id,
                    day_index: day.day_index,
                    notes: day.notes.clone(),
                    prescriptions: st.prescriptions.iter().filter(|p| p.day_id == day.id).count()
                        as i64,
                    sessions: st
                        .sessions
                        .iter()
                        .filter(|s| s.assignment_id == assignment.id && s.day_id == day.id)
                        .count() as i64,
                });
            }
        }
        Ok(rows)
    }
}

//=========================================================================================
// Sessions
//=========================================================================================

#[async_trait]
impl SessionRepository for InMemoryStore {
    async fn create_session(&self, input: &NewSession) -> PortResult<SessionLog> {
        let mut st = self.state();
        let now = st.tick();
        let session = SessionLog {
            id: Uuid::new_v4(),
            assignment_id: input.assignment_id,
            day_id: input.day_id,
            disciple_id: input.disciple_id,
            performed_at: input.performed_at,
            status: SessionStatus::Open,
            ended_at: None,
            notes: input.notes.clone(),
            created_at: now,
            updated_at: now,
        };
        st.sessions.push(session.clone());
        Ok(session)
    }

    async fn get_session(&self, id: Uuid) -> PortResult<SessionLog> {
        self.state()
            .sessions
            .iter()
            .find(|s| s.id == id)
            .cloned()
            .ok_or_else(|| not_found("session"))
    }

    async fn update_session(&self, id: Uuid, patch: &SessionPatch) -> PortResult<SessionLog> {
        let mut st = self.state();
        let now = st.tick();
        let s = st
            .sessions
            .iter_mut()
            .find(|s| s.id == id)
            .ok_or_else(|| not_found("session"))?;
        if let Some(v) = patch.performed_at {
            s.performed_at = v;
        }
        if let Some(v) = &patch.notes {
            s.notes = Some(v.clone());
        }
        if let Some(v) = patch.status {
            s.status = v;
        }
        if let Some(v) = patch.ended_at {
            s.ended_at = v;
        }
        s.updated_at = now;
        Ok(s.clone())
    }

    async fn latest_open_session(&self, disciple_id: Uuid) -> PortResult<Option<SessionLog>> {
        Ok(self
            .state()
            .sessions_of(disciple_id)
            .filter(|s| s.status == SessionStatus::Open)
            .max_by_key(|s| (s.performed_at, s.created_at))
            .cloned())
    }

    async fn latest_session_for_day(
        &self,
        assignment_id: Uuid,
        day_id: Uuid,
    ) -> PortResult<Option<CurrentSession>> {
        let st = self.state();
        Ok(st
            .sessions
            .iter()
            .filter(|s| s.assignment_id == assignment_id && s.day_id == day_id)
            .max_by_key(|s| (s.performed_at, s.created_at))
            .map(|s| CurrentSession {
                id: s.id,
                started_at: s.performed_at,
                sets_count: st.sets_of(s.id).count() as i64,
            }))
    }

    async fn add_set(&self, input: &NewSet) -> PortResult<SetLog> {
        let mut st = self.state();
        if st.prescription(input.prescription_id).is_none() {
            return Err(PortError::Conflict("in_use".to_string()));
        }
        let set = SetLog {
            id: Uuid::new_v4(),
            session_id: input.session_id,
            prescription_id: input.prescription_id,
            set_index: input.set_index,
            weight: input.weight,
            reps: input.reps,
            rpe: input.rpe,
            to_failure: input.to_failure,
            created_at: st.tick(),
        };
        st.sets.push(set.clone());
        Ok(set)
    }

    async fn get_set(&self, id: Uuid) -> PortResult<SetLog> {
        self.state()
            .sets
            .iter()
            .find(|s| s.id == id)
            .cloned()
            .ok_or_else(|| not_found("set"))
    }

    async fn list_set_views(&self, session_id: Uuid) -> PortResult<Vec<SetView>> {
        let st = self.state();
        let mut rows: Vec<SetView> = st
            .sets_of(session_id)
            .filter_map(|s| {
                let e = st.exercise_of_set(s)?;
                Some(SetView {
                    set: s.clone(),
                    exercise_id: e.id,
                    exercise_name: e.name.clone(),
                })
            })
            .collect();
        rows.sort_by_key(|v| (v.set.set_index, v.set.created_at));
        Ok(rows)
    }

    async fn list_sets(
        &self,
        session_id: Uuid,
        prescription_id: Option<Uuid>,
        limit: i64,
        offset: i64,
    ) -> PortResult<(Vec<SetLog>, i64)> {
        let st = self.state();
        let mut rows: Vec<SetLog> = st
            .sets_of(session_id)
            .filter(|s| prescription_id.map_or(true, |p| s.prescription_id == p))
            .cloned()
            .collect();
        rows.sort_by_key(|s| (s.set_index, s.created_at));
        Ok(page(rows, limit, offset))
    }

    async fn update_set(&self, id: Uuid, patch: &SetPatch) -> PortResult<SetLog> {
        let mut st = self.state();
        let s = st
            .sets
            .iter_mut()
            .find(|s| s.id == id)
            .ok_or_else(|| not_found("set"))?;
        if let Some(v) = patch.set_index {
            s.set_index = v;
        }
        if let Some(v) = patch.weight {
            s.weight = Some(v);
        }
        if let Some(v) = patch.reps {
            s.reps = v;
        }
        if let Some(v) = patch.rpe {
            s.rpe = Some(v);
        }
        if let Some(v) = patch.to_failure {
            s.to_failure = v;
        }
        Ok(s.clone())
    }

    async fn delete_set(&self, id: Uuid) -> PortResult<()> {
        let mut st = self.state();
        let before = st.sets.len();
        st.sets.retain(|s| s.id != id);
        if st.sets.len() == before {
            return Err(not_found("set"));
        }
        Ok(())
    }

    async fn add_cardio(&self, input: &NewCardio) -> PortResult<CardioSegment> {
        let mut st = self.state();
        let seg = CardioSegment {
            id: Uuid::new_v4(),
            session_id: input.session_id,
            modality: input.modality.clone(),
            minutes: input.minutes,
            target_hr_min: input.target_hr_min,
            target_hr_max: input.target_hr_max,
            notes: input.notes.clone(),
        };
        st.cardio.push(seg.clone());
        Ok(seg)
    }

    async fn list_cardio(&self, session_id: Uuid) -> PortResult<Vec<CardioSegment>> {
        Ok(self
            .state()
            .cardio
            .iter()
            .filter(|c| c.session_id == session_id)
            .cloned()
            .collect())
    }
}

//=========================================================================================
// History
//=========================================================================================

/// Per-set facts the aggregations work from.
struct LoggedSet<'a> {
    date: NaiveDate,
    exercise: &'a Exercise,
    volume: f64,
    reps: i64,
}

fn logged_sets<'a>(st: &'a State, disciple_id: Uuid, tz: Tz) -> Vec<LoggedSet<'a>> {
    st.sessions_of(disciple_id)
        .flat_map(move |session| {
            let date = local_date(session.performed_at, tz);
            st.sets_of(session.id).filter_map(move |set| {
                Some(LoggedSet {
                    date,
                    exercise: st.exercise_of_set(set)?,
                    volume: set.weight.unwrap_or(0.0) * set.reps as f64,
                    reps: set.reps as i64,
                })
            })
        })
        .collect()
}

#[async_trait]
impl HistoryRepository for InMemoryStore {
    async fn recent_sessions(
        &self,
        disciple_id: Uuid,
        since: DateTime<Utc>,
    ) -> PortResult<Vec<SessionLog>> {
        let st = self.state();
        let mut rows: Vec<SessionLog> = st
            .sessions_of(disciple_id)
            .filter(|s| s.performed_at >= since)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.performed_at.cmp(&a.performed_at));
        Ok(rows)
    }

    async fn lift_samples(&self, disciple_id: Uuid) -> PortResult<Vec<LiftSample>> {
        let st = self.state();
        Ok(st
            .sessions_of(disciple_id)
            .flat_map(|session| st.sets_of(session.id))
            .filter_map(|set| {
                let e = st.exercise_of_set(set)?;
                Some(LiftSample {
                    exercise_id: e.id,
                    exercise_name: e.name.clone(),
                    weight: set.weight,
                    reps: set.reps,
                })
            })
            .collect())
    }

    async fn daily_by_exercise(
        &self,
        disciple_id: Uuid,
        since: NaiveDate,
        tz: Tz,
    ) -> PortResult<Vec<DailyExerciseVolume>> {
        let st = self.state();
        let mut buckets: BTreeMap<(NaiveDate, String, Uuid), DailyExerciseVolume> = BTreeMap::new();
        for s in logged_sets(&st, disciple_id, tz).into_iter().filter(|s| s.date >= since) {
            let row = buckets
                .entry((s.date, s.exercise.name.clone(), s.exercise.id))
                .or_insert_with(|| DailyExerciseVolume {
                    date: s.date,
                    exercise_id: s.exercise.id,
                    exercise_name: s.exercise.name.clone(),
                    volume: 0.0,
                    sets: 0,
                    reps: 0,
                });
            row.volume += s.volume;
            row.sets += 1;
            row.reps += s.reps;
        }
        Ok(buckets.into_values().collect())
    }

    async fn daily_by_muscle(
        &self,
        disciple_id: Uuid,
        since: NaiveDate,
        tz: Tz,
    ) -> PortResult<Vec<DailyMuscleVolume>> {
        let st = self.state();
        let mut buckets: BTreeMap<(NaiveDate, String), DailyMuscleVolume> = BTreeMap::new();
        for s in logged_sets(&st, disciple_id, tz).into_iter().filter(|s| s.date >= since) {
            let muscle = s.exercise.primary_muscle.to_lowercase();
            let row = buckets
                .entry((s.date, muscle.clone()))
                .or_insert_with(|| DailyMuscleVolume {
                    date: s.date,
                    primary_muscle: muscle,
                    volume: 0.0,
                    sets: 0,
                    reps: 0,
                });
            row.volume += s.volume;
            row.sets += 1;
            row.reps += s.reps;
        }
        Ok(buckets.into_values().collect())
    }

    async fn relevant_exercises(&self, disciple_id: Uuid) -> PortResult<Vec<ExerciseRef>> {
        let st = self.state();
        let programs: HashSet<Uuid> = st
            .assignments
            .iter()
            .filter(|a| a.disciple_id == disciple_id && a.is_active)
            .map(|a| a.program_id)
            .collect();
        let mut seen = HashSet::new();
        let mut rows: Vec<ExerciseRef> = st
            .prescriptions
            .iter()
            .filter(|p| {
                st.day(p.day_id)
                    .and_then(|d| st.week(d.week_id))
                    .is_some_and(|w| programs.contains(&w.program_id))
            })
            .filter(|p| seen.insert(p.exercise_id))
            .filter_map(|p| st.exercise(p.exercise_id))
            .map(|e| ExerciseRef {
                id: e.id,
                name: e.name.clone(),
            })
            .collect();
        rows.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        Ok(rows)
    }

    async fn days_with_sets(&self, disciple_id: Uuid, since: NaiveDate, tz: Tz) -> PortResult<i64> {
        let st = self.state();
        let dates: HashSet<NaiveDate> = st
            .sessions_of(disciple_id)
            .filter(|s| st.sets_of(s.id).next().is_some())
            .map(|s| local_date(s.performed_at, tz))
            .filter(|d| *d >= since)
            .collect();
        Ok(dates.len() as i64)
    }

    async fn session_history(
        &self,
        query: &HistoryQuery,
    ) -> PortResult<(Vec<SessionHistoryRow>, i64)> {
        let st = self.state();
        let mut rows: Vec<SessionHistoryRow> = st
            .sessions_of(query.disciple_id)
            .filter(|s| query.contains(local_date(s.performed_at, query.tz)))
            .map(|s| {
                let (sets_count, volume) = st.session_volume(s.id);
                SessionHistoryRow {
                    id: s.id,
                    assignment_id: s.assignment_id,
                    day_id: s.day_id,
                    performed_at: s.performed_at,
                    status: s.status,
                    sets_count,
                    volume,
                }
            })
            .collect();
        rows.sort_by(|a, b| b.performed_at.cmp(&a.performed_at).then(a.id.cmp(&b.id)));
        Ok(page(rows, query.limit, query.offset))
    }

    async fn day_history(&self, query: &HistoryQuery) -> PortResult<(Vec<DayHistoryRow>, i64)> {
        let st = self.state();
        let mut by_date: BTreeMap<NaiveDate, DayHistoryRow> = BTreeMap::new();
        for s in st.sessions_of(query.disciple_id) {
            let date = local_date(s.performed_at, query.tz);
            if !query.contains(date) {
                continue;
            }
            let (sets, volume) = st.session_volume(s.id);
            let row = by_date.entry(date).or_insert_with(|| DayHistoryRow {
                date,
                sessions: 0,
                sets: 0,
                volume: 0.0,
            });
            row.sessions += 1;
            row.sets += sets;
            row.volume += volume;
        }
        let rows: Vec<DayHistoryRow> = by_date.into_values().rev().collect();
        Ok(page(rows, query.limit, query.offset))
    }

    async fn plan_vs_done(&self, query: &HistoryQuery) -> PortResult<(Vec<PlanVsDoneRow>, i64)> {
        let st = self.state();
        let mut done: HashMap<(NaiveDate, Uuid), i64> = HashMap::new();
        for s in st.sessions_of(query.disciple_id) {
            let date = local_date(s.performed_at, query.tz);
            if query.contains(date) {
                *done.entry((date, s.day_id)).or_insert(0) += st.sets_of(s.id).count() as i64;
            }
        }
        let mut rows: Vec<PlanVsDoneRow> = done
            .into_iter()
            .map(|((date, day_id), done_sets)| PlanVsDoneRow {
                date,
                day_id,
                planned_sets: st
                    .prescriptions
                    .iter()
                    .filter(|p| p.day_id == day_id)
                    .map(|p| p.series as i64)
                    .sum(),
                done_sets,
            })
            .collect();
        rows.sort_by(|a, b| b.date.cmp(&a.date).then(a.day_id.cmp(&b.day_id)));
        Ok(page(rows, query.limit, query.offset))
    }
}

//=========================================================================================
// Invitations
//=========================================================================================

#[async_trait]
impl InviteRepository for InMemoryStore {
    async fn create_invitation(&self, input: &NewInvitation) -> PortResult<Invitation> {
        let mut st = self.state();
        if st.invitations.iter().any(|i| i.code == input.code) {
            return Err(PortError::Conflict("code_in_use".to_string()));
        }
        let invitation = Invitation {
            id: Uuid::new_v4(),
            code: input.code.clone(),
            coach_id: input.coach_id,
            email: input.email.clone(),
            name: input.name.clone(),
            status: InvitationStatus::Pending,
            expires_at: input.expires_at,
            accepted_by: None,
            accepted_at: None,
            created_at: st.tick(),
        };
        st.invitations.push(invitation.clone());
        Ok(invitation)
    }

    async fn find_invitation(&self, code: &str) -> PortResult<Invitation> {
        self.state()
            .invitations
            .iter()
            .find(|i| i.code == code)
            .cloned()
            .ok_or_else(|| not_found("invitation"))
    }

    async fn list_invitations(&self, coach_id: Uuid) -> PortResult<Vec<Invitation>> {
        Ok(self
            .state()
            .invitations
            .iter()
            .rev()
            .filter(|i| i.coach_id == coach_id)
            .cloned()
            .collect())
    }

    async fn mark_accepted(
        &self,
        id: Uuid,
        accepted_by: Uuid,
        at: DateTime<Utc>,
    ) -> PortResult<Invitation> {
        let mut st = self.state();
        let inv = st
            .invitations
            .iter_mut()
            .find(|i| i.id == id)
            .ok_or_else(|| not_found("invitation"))?;
        inv.status = InvitationStatus::Accepted;
        inv.accepted_by = Some(accepted_by);
        inv.accepted_at = Some(at);
        Ok(inv.clone())
    }

    async fn mark_revoked(&self, id: Uuid) -> PortResult<Invitation> {
        let mut st = self.state();
        let inv = st
            .invitations
            .iter_mut()
            .find(|i| i.id == id)
            .ok_or_else(|| not_found("invitation"))?;
        inv.status = InvitationStatus::Revoked;
        Ok(inv.clone())
    }
}

//=========================================================================================
// Security stand-ins
//=========================================================================================

/// Stores passwords behind a fixed prefix. Only for tests.
pub struct PlainHasher;

impl PlainHasher {
    fn encode(password: &str) -> String {
        format!("plain${password}")
    }
}

impl PasswordHasher for PlainHasher {
    fn hash(&self, password: &str) -> PortResult<String> {
        Ok(Self::encode(password))
    }

    fn verify(&self, password: &str, hash: &str) -> PortResult<bool> {
        Ok(Self::encode(password) == hash)
    }
}

/// Unsigned `invite|coach|expiry|email` codes. Only for tests.
pub struct PlainInviteCodec;

impl InviteCodec for PlainInviteCodec {
    fn sign(&self, claims: &InviteClaims) -> PortResult<String> {
        Ok(format!(
            "invite|{}|{}|{}",
            claims.coach_id,
            claims.expires_at.timestamp(),
            claims.email
        ))
    }

    fn verify(&self, code: &str) -> PortResult<InviteClaims> {
        let invalid = || PortError::NotFound("invalid_code".to_string());
        let mut parts = code.splitn(4, '|');
        if parts.next() != Some("invite") {
            return Err(invalid());
        }
        let coach_id = parts
            .next()
            .and_then(|p| Uuid::parse_str(p).ok())
            .ok_or_else(invalid)?;
        let expires_at = parts
            .next()
            .and_then(|p| p.parse::<i64>().ok())
            .and_then(|ts| Utc.timestamp_opt(ts, 0).single())
            .ok_or_else(invalid)?;
        let email = parts.next().ok_or_else(invalid)?.to_string();
        if expires_at <= Utc::now() {
            return Err(PortError::Gone("invite_expired".to_string()));
        }
        Ok(InviteClaims {
            coach_id,
            email,
            expires_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_codec_round_trip_and_expiry() {
        let claims = InviteClaims {
            coach_id: Uuid::new_v4(),
            email: "a|b@example.com".into(),
            expires_at: Utc.timestamp_opt(Utc::now().timestamp() + 60, 0).unwrap(),
        };
        let code = PlainInviteCodec.sign(&claims).unwrap();
        assert_eq!(PlainInviteCodec.verify(&code).unwrap(), claims);

        let stale = InviteClaims {
            expires_at: Utc::now() - Duration::minutes(1),
            ..claims
        };
        let code = PlainInviteCodec.sign(&stale).unwrap();
        assert!(matches!(PlainInviteCodec.verify(&code), Err(PortError::Gone(_))));
        assert!(matches!(PlainInviteCodec.verify("garbage"), Err(PortError::NotFound(_))));
    }

    #[tokio::test]
    async fn activation_keeps_one_active_assignment() {
        let store = InMemoryStore::new();
        let coach = store.seed_user("c@example.com", "C");
        let disciple = store.seed_user("d@example.com", "D");
        let program = store
            .create_program(
                coach,
                &NewProgram {
                    title: "P1".into(),
                    notes: None,
                    visibility: None,
                },
            )
            .await
            .unwrap();
        let today = Utc::now().date_naive();
        let mut ids = Vec::new();
        for _ in 0..3 {
            let a = store
                .create_assignment(&NewAssignment {
                    program_id: program.id,
                    program_version: 1,
                    disciple_id: disciple,
                    assigned_by: coach,
                    start_date: today,
                    end_date: Some(today),
                })
                .await
                .unwrap();
            ids.push(a.id);
        }
        let a = store.activate_assignment(disciple, ids[1], today).await.unwrap();
        assert!(a.is_active);
        assert_eq!(a.end_date, None);
        let (rows, total) = store.list_assignments(&[disciple], 10, 0).await.unwrap();
        assert_eq!(total, 3);
        assert_eq!(rows.iter().filter(|r| r.assignment.is_active).count(), 1);
        assert_eq!(rows[0].assignment.id, ids[2]);
        assert!(matches!(
            store.activate_assignment(coach, ids[0], today).await,
            Err(PortError::NotFound(_))
        ));
    }
}
