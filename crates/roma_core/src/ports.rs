//! crates/roma_core/src/ports.rs
//!
//! Defines the contracts (traits) between the core services and the outside world.
//! These traits form the boundary of the hexagonal architecture: the Postgres adapter, the
//! in-memory store and the security adapters all plug in here.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;
use uuid::Uuid;

use crate::domain::{
    Assignment, AssignmentDay, AssignmentPatch, AssignmentSummary, CardioSegment, CoachLink,
    CurrentSession, DayPatch, Disciple, Exercise, ExerciseFilter, ExerciseInput, Invitation,
    InviteClaims, LinkLists, LinkStatus, NewAssignment, NewCardio, NewDay, NewInvitation,
    NewPrescription, NewProgram, NewSession, NewSet, Prescription, PrescriptionPatch,
    PrescriptionView, Program, ProgramDay, ProgramFilter, ProgramNode, ProgramPatch,
    ProgramVersion, ProgramWeek, SessionLog, SessionPatch, SetLog, SetPatch, SetView, User,
    UserCredentials,
};
use crate::history::{
    DailyExerciseVolume, DailyMuscleVolume, DayHistoryRow, ExerciseRef, HistoryQuery, LiftSample,
    PlanVsDoneRow, SessionHistoryRow,
};

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for all port and service operations.
/// Abstracts away the specific errors of external systems (database, crypto libraries).
#[derive(Debug, thiserror::Error)]
pub enum PortError {
    #[error("Item not found: {0}")]
    NotFound(String),
    #[error("Invalid input: {0}")]
    Validation(String),
    #[error("Unauthorized")]
    Unauthorized,
    #[error("Forbidden: {0}")]
    Forbidden(String),
    /// Carries a stable, client-facing code such as `email_in_use`.
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Gone: {0}")]
    Gone(String),
    /// No program day can be resolved for the disciple on the requested date.
    #[error("No day resolvable")]
    NoDay,
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

//=========================================================================================
// Repository Ports
//=========================================================================================

#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Fails with `Conflict("email_in_use")` when the email is taken.
    async fn create_user(&self, email: &str, name: &str, password_hash: &str) -> PortResult<User>;

    async fn get_credentials_by_email(&self, email: &str) -> PortResult<UserCredentials>;

    async fn get_user(&self, user_id: Uuid) -> PortResult<User>;

    async fn owns_any_program(&self, user_id: Uuid) -> PortResult<bool>;

    async fn coaches_anyone(&self, user_id: Uuid) -> PortResult<bool>;
}

#[async_trait]
pub trait ExerciseRepository: Send + Sync {
    async fn search_exercises(&self, filter: &ExerciseFilter) -> PortResult<(Vec<Exercise>, i64)>;

    /// Fails with `Conflict("name_already_exists")` on a case-insensitive name clash.
    async fn create_exercise(&self, input: &ExerciseInput) -> PortResult<Exercise>;

    async fn get_exercise(&self, id: Uuid) -> PortResult<Exercise>;

    async fn update_exercise(&self, id: Uuid, input: &ExerciseInput) -> PortResult<Exercise>;

    async fn delete_exercise(&self, id: Uuid) -> PortResult<()>;
}

#[async_trait]
pub trait ProgramRepository: Send + Sync {
    // --- Programs ---
    async fn create_program(&self, owner_id: Uuid, input: &NewProgram) -> PortResult<Program>;

    async fn list_programs(&self, filter: &ProgramFilter) -> PortResult<(Vec<Program>, i64)>;

    async fn get_program(&self, id: Uuid) -> PortResult<Program>;

    async fn update_program(&self, id: Uuid, patch: &ProgramPatch) -> PortResult<Program>;

    /// Deletes the program row and its version snapshots. Children must already be gone.
    async fn delete_program(&self, id: Uuid) -> PortResult<()>;

    /// The program a node belongs to, `None` when the node does not exist.
    async fn program_of(&self, node: ProgramNode) -> PortResult<Option<Program>>;

    // --- Versions ---
    async fn record_version(&self, program: &Program) -> PortResult<ProgramVersion>;

    async fn list_versions(&self, program_id: Uuid) -> PortResult<Vec<ProgramVersion>>;

    /// Copies the program tree into a new program with `version + 1` in one transaction,
    /// including its version snapshot.
    async fn clone_next_version(&self, program_id: Uuid) -> PortResult<Program>;

    // --- Weeks ---
    async fn add_week(&self, program_id: Uuid, week_index: i32) -> PortResult<ProgramWeek>;

    async fn list_weeks(&self, program_id: Uuid) -> PortResult<Vec<ProgramWeek>>;

    async fn get_week(&self, week_id: Uuid) -> PortResult<ProgramWeek>;

    async fn delete_week(&self, week_id: Uuid) -> PortResult<()>;

    // --- Days ---
    async fn add_day(&self, week_id: Uuid, input: &NewDay) -> PortResult<ProgramDay>;

    /// Ordered by `(day_index, id)`.
    async fn list_days(&self, week_id: Uuid) -> PortResult<Vec<ProgramDay>>;

    async fn get_day(&self, day_id: Uuid) -> PortResult<ProgramDay>;

    async fn find_day(
        &self,
        program_id: Uuid,
        week_index: i32,
        day_index: i32,
    ) -> PortResult<Option<ProgramDay>>;

    async fn update_day(&self, day_id: Uuid, patch: &DayPatch) -> PortResult<ProgramDay>;

    async fn delete_day(&self, day_id: Uuid) -> PortResult<()>;

    // --- Prescriptions ---
    async fn add_prescription(
        &self,
        day_id: Uuid,
        input: &NewPrescription,
    ) -> PortResult<Prescription>;

    /// Joined with exercise metadata, ordered by `(position, id)`.
    async fn list_prescriptions(&self, day_id: Uuid) -> PortResult<Vec<PrescriptionView>>;

    async fn update_prescription(
        &self,
        id: Uuid,
        patch: &PrescriptionPatch,
    ) -> PortResult<Prescription>;

    async fn delete_prescription(&self, id: Uuid) -> PortResult<()>;

    async fn delete_prescriptions_of_day(&self, day_id: Uuid) -> PortResult<()>;

    /// Sets `position = index + 1` for every id in one transaction.
    async fn reorder_prescriptions(&self, day_id: Uuid, ordered_ids: &[Uuid]) -> PortResult<()>;
}

#[async_trait]
pub trait CoachRepository: Send + Sync {
    async fn create_link(
        &self,
        coach_id: Uuid,
        disciple_id: Uuid,
        status: LinkStatus,
    ) -> PortResult<CoachLink>;

    async fn update_link_status(&self, link_id: Uuid, status: LinkStatus) -> PortResult<CoachLink>;

    async fn list_links(&self, user_id: Uuid) -> PortResult<LinkLists>;

    async fn has_accepted_link(&self, coach_id: Uuid, disciple_id: Uuid) -> PortResult<bool>;

    /// Accepted disciples of the coach, ordered by name.
    async fn list_disciples(&self, coach_id: Uuid) -> PortResult<Vec<Disciple>>;
}

#[async_trait]
pub trait AssignmentRepository: Send + Sync {
    async fn create_assignment(&self, input: &NewAssignment) -> PortResult<Assignment>;

    /// Inserts the assignment already active, keeping its `end_date`, and deactivates the
    /// disciple's other assignments in the same transaction.
    async fn create_active_assignment(&self, input: &NewAssignment) -> PortResult<Assignment>;

    async fn get_assignment(&self, id: Uuid) -> PortResult<Assignment>;

    /// Assignments of `disciple_ids`, newest first.
    async fn list_assignments(
        &self,
        disciple_ids: &[Uuid],
        limit: i64,
        offset: i64,
    ) -> PortResult<(Vec<AssignmentSummary>, i64)>;

    async fn update_assignment(&self, id: Uuid, patch: &AssignmentPatch) -> PortResult<Assignment>;

    /// Deactivates every other active assignment of the disciple and activates this one,
    /// clearing its `end_date`, in one transaction. `today` fills a missing `start_date`.
    async fn activate_assignment(
        &self,
        disciple_id: Uuid,
        assignment_id: Uuid,
        today: NaiveDate,
    ) -> PortResult<Assignment>;

    /// Most recently created active assignment.
    async fn latest_active_assignment(&self, disciple_id: Uuid) -> PortResult<Option<Assignment>>;

    /// Most recently created active assignment whose window contains `date`.
    async fn active_assignment_on(
        &self,
        disciple_id: Uuid,
        date: NaiveDate,
    ) -> PortResult<Option<Assignment>>;

    async fn is_assigned(&self, disciple_id: Uuid, program_id: Uuid) -> PortResult<bool>;

    async fn list_assignment_days(&self, assignment: &Assignment) -> PortResult<Vec<AssignmentDay>>;
}

#[async_trait]
pub trait SessionRepository: Send + Sync {
    async fn create_session(&self, input: &NewSession) -> PortResult<SessionLog>;

    async fn get_session(&self, id: Uuid) -> PortResult<SessionLog>;

    async fn update_session(&self, id: Uuid, patch: &SessionPatch) -> PortResult<SessionLog>;

    async fn latest_open_session(&self, disciple_id: Uuid) -> PortResult<Option<SessionLog>>;

    async fn latest_session_for_day(
        &self,
        assignment_id: Uuid,
        day_id: Uuid,
    ) -> PortResult<Option<CurrentSession>>;

    async fn add_set(&self, input: &NewSet) -> PortResult<SetLog>;

    async fn get_set(&self, id: Uuid) -> PortResult<SetLog>;

    /// Sets of the session joined with their exercise, ordered by `(set_index, created_at)`.
    async fn list_set_views(&self, session_id: Uuid) -> PortResult<Vec<SetView>>;

    async fn list_sets(
        &self,
        session_id: Uuid,
        prescription_id: Option<Uuid>,
        limit: i64,
        offset: i64,
    ) -> PortResult<(Vec<SetLog>, i64)>;

    async fn update_set(&self, id: Uuid, patch: &SetPatch) -> PortResult<SetLog>;

    async fn delete_set(&self, id: Uuid) -> PortResult<()>;

    async fn add_cardio(&self, input: &NewCardio) -> PortResult<CardioSegment>;

    async fn list_cardio(&self, session_id: Uuid) -> PortResult<Vec<CardioSegment>>;
}

#[async_trait]
pub trait HistoryRepository: Send + Sync {
    async fn recent_sessions(
        &self,
        disciple_id: Uuid,
        since: DateTime<Utc>,
    ) -> PortResult<Vec<SessionLog>>;

    /// Every logged set of the disciple with its exercise, for PR computation.
    async fn lift_samples(&self, disciple_id: Uuid) -> PortResult<Vec<LiftSample>>;

    /// Raw per-exercise aggregates for local dates `>= since`.
    async fn daily_by_exercise(
        &self,
        disciple_id: Uuid,
        since: NaiveDate,
        tz: Tz,
    ) -> PortResult<Vec<DailyExerciseVolume>>;

    /// Raw per-muscle aggregates (lowercased muscle) for local dates `>= since`.
    async fn daily_by_muscle(
        &self,
        disciple_id: Uuid,
        since: NaiveDate,
        tz: Tz,
    ) -> PortResult<Vec<DailyMuscleVolume>>;

    /// Distinct exercises prescribed in the programs of the disciple's active assignments.
    async fn relevant_exercises(&self, disciple_id: Uuid) -> PortResult<Vec<ExerciseRef>>;

    async fn days_with_sets(&self, disciple_id: Uuid, since: NaiveDate, tz: Tz) -> PortResult<i64>;

    async fn session_history(
        &self,
        query: &HistoryQuery,
    ) -> PortResult<(Vec<SessionHistoryRow>, i64)>;

    async fn day_history(&self, query: &HistoryQuery) -> PortResult<(Vec<DayHistoryRow>, i64)>;

    async fn plan_vs_done(&self, query: &HistoryQuery) -> PortResult<(Vec<PlanVsDoneRow>, i64)>;
}

#[async_trait]
pub trait InviteRepository: Send + Sync {
    async fn create_invitation(&self, input: &NewInvitation) -> PortResult<Invitation>;

    async fn find_invitation(&self, code: &str) -> PortResult<Invitation>;

    async fn list_invitations(&self, coach_id: Uuid) -> PortResult<Vec<Invitation>>;

    async fn mark_accepted(
        &self,
        id: Uuid,
        accepted_by: Uuid,
        at: DateTime<Utc>,
    ) -> PortResult<Invitation>;

    async fn mark_revoked(&self, id: Uuid) -> PortResult<Invitation>;
}

//=========================================================================================
// Security Ports
//=========================================================================================

/// One-way password hashing.
pub trait PasswordHasher: Send + Sync {
    fn hash(&self, password: &str) -> PortResult<String>;

    /// `Ok(false)` on mismatch; errors only for malformed hashes.
    fn verify(&self, password: &str, hash: &str) -> PortResult<bool>;
}

/// Signs and verifies invitation codes.
pub trait InviteCodec: Send + Sync {
    fn sign(&self, claims: &InviteClaims) -> PortResult<String>;

    /// `Gone("invite_expired")` when past expiry, `NotFound("invalid_code")` when tampered.
    fn verify(&self, code: &str) -> PortResult<InviteClaims>;
}
