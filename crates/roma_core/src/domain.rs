//! crates/roma_core/src/domain.rs
//!
//! Defines the pure, core data structures of the coaching backend.
//! Persistence adapters map their own records onto these types; handlers serialize them.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

//=========================================================================================
// Users & Roles
//=========================================================================================

/// A registered account. Coach and disciple are not separate account kinds.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

// Only used internally for login - contains sensitive data
#[derive(Debug, Clone)]
pub struct UserCredentials {
    pub user: User,
    pub password_hash: String,
}

/// The role a user currently plays. Computed on read, never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Coach,
    Disciple,
}

impl Role {
    /// A user is a coach when they own any program or coach someone through an accepted link.
    pub fn derive(owns_programs: bool, coaches_anyone: bool) -> Self {
        if owns_programs || coaches_anyone {
            Role::Coach
        } else {
            Role::Disciple
        }
    }
}

/// Payload of `GET /me`.
#[derive(Debug, Clone, Serialize)]
pub struct Me {
    #[serde(flatten)]
    pub user: User,
    pub role: Role,
}

//=========================================================================================
// Coach-Disciple Links
//=========================================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkStatus {
    Pending,
    Accepted,
    Rejected,
}

impl LinkStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LinkStatus::Pending => "pending",
            LinkStatus::Accepted => "accepted",
            LinkStatus::Rejected => "rejected",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "pending" => Some(LinkStatus::Pending),
            "accepted" => Some(LinkStatus::Accepted),
            "rejected" => Some(LinkStatus::Rejected),
            _ => None,
        }
    }
}

/// The transition a disciple applies to a pending link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkAction {
    Accept,
    Reject,
}

impl LinkAction {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "accept" => Some(LinkAction::Accept),
            "reject" => Some(LinkAction::Reject),
            _ => None,
        }
    }

    pub fn target_status(&self) -> LinkStatus {
        match self {
            LinkAction::Accept => LinkStatus::Accepted,
            LinkAction::Reject => LinkStatus::Rejected,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CoachLink {
    pub id: Uuid,
    pub coach_id: Uuid,
    pub disciple_id: Uuid,
    pub status: LinkStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Links seen from one user: `incoming` where they are the disciple, `outgoing` where they coach.
#[derive(Debug, Clone, Default, Serialize)]
pub struct LinkLists {
    pub incoming: Vec<CoachLink>,
    pub outgoing: Vec<CoachLink>,
}

/// A disciple with an accepted link to the requesting coach.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Disciple {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    pub linked_at: DateTime<Utc>,
}

//=========================================================================================
// Exercise Catalog
//=========================================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Exercise {
    pub id: Uuid,
    pub name: String,
    pub primary_muscle: String,
    pub equipment: Option<String>,
    pub tags: Vec<String>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Create/replace payload for an exercise.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ExerciseInput {
    pub name: String,
    pub primary_muscle: String,
    pub equipment: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TagMatch {
    #[default]
    Any,
    All,
}

#[derive(Debug, Clone, Default)]
pub struct ExerciseFilter {
    pub query: Option<String>,
    pub muscle: Option<String>,
    pub equipment: Option<String>,
    pub tags: Vec<String>,
    pub tag_match: TagMatch,
    pub limit: i64,
    pub offset: i64,
}

/// One page of a listing plus the unpaged total.
#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
}

//=========================================================================================
// Programs
//=========================================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Program {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub title: String,
    pub notes: Option<String>,
    pub visibility: String,
    pub version: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewProgram {
    pub title: String,
    pub notes: Option<String>,
    pub visibility: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProgramPatch {
    pub title: Option<String>,
    pub notes: Option<String>,
    pub visibility: Option<String>,
}

impl ProgramPatch {
    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.notes.is_none() && self.visibility.is_none()
    }
}

#[derive(Debug, Clone)]
pub struct ProgramFilter {
    pub owner_id: Uuid,
    pub query: Option<String>,
    pub limit: i64,
    pub offset: i64,
}

/// Immutable snapshot written every time a program version comes into existence.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgramVersion {
    pub id: Uuid,
    pub program_id: Uuid,
    pub version: i32,
    pub title: String,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgramWeek {
    pub id: Uuid,
    pub program_id: Uuid,
    pub week_index: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgramDay {
    pub id: Uuid,
    pub week_id: Uuid,
    pub day_index: i32,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewDay {
    pub day_index: i32,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DayPatch {
    pub day_index: Option<i32>,
    pub notes: Option<String>,
}

impl DayPatch {
    pub fn is_empty(&self) -> bool {
        self.day_index.is_none() && self.notes.is_none()
    }
}

/// A planned exercise slot inside a program day.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Prescription {
    pub id: Uuid,
    pub day_id: Uuid,
    pub exercise_id: Uuid,
    pub series: i32,
    pub reps: String,
    pub rest_sec: Option<i32>,
    pub to_failure: bool,
    pub tempo: Option<String>,
    pub rir: Option<i32>,
    pub rpe: Option<f32>,
    pub method_id: Option<Uuid>,
    pub notes: Option<String>,
    pub position: i32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewPrescription {
    pub exercise_id: Uuid,
    pub series: i32,
    pub reps: String,
    pub rest_sec: Option<i32>,
    #[serde(default)]
    pub to_failure: bool,
    pub tempo: Option<String>,
    pub rir: Option<i32>,
    pub rpe: Option<f32>,
    pub method_id: Option<Uuid>,
    pub notes: Option<String>,
    pub position: Option<i32>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PrescriptionPatch {
    pub exercise_id: Option<Uuid>,
    pub series: Option<i32>,
    pub reps: Option<String>,
    pub rest_sec: Option<i32>,
    pub to_failure: Option<bool>,
    pub tempo: Option<String>,
    pub rir: Option<i32>,
    pub rpe: Option<f32>,
    pub method_id: Option<Uuid>,
    pub notes: Option<String>,
    pub position: Option<i32>,
}

impl PrescriptionPatch {
    pub fn is_empty(&self) -> bool {
        self.exercise_id.is_none()
            && self.series.is_none()
            && self.reps.is_none()
            && self.rest_sec.is_none()
            && self.to_failure.is_none()
            && self.tempo.is_none()
            && self.rir.is_none()
            && self.rpe.is_none()
            && self.method_id.is_none()
            && self.notes.is_none()
            && self.position.is_none()
    }
}

/// A prescription joined with the catalog metadata of its exercise.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PrescriptionView {
    #[serde(flatten)]
    pub prescription: Prescription,
    pub exercise_name: String,
    pub primary_muscle: String,
    pub equipment: Option<String>,
}

/// Any node of the program tree, used to resolve who owns it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgramNode {
    Program(Uuid),
    Week(Uuid),
    Day(Uuid),
    Prescription(Uuid),
}

//=========================================================================================
// Assignments
//=========================================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Assignment {
    pub id: Uuid,
    pub program_id: Uuid,
    pub program_version: i32,
    pub disciple_id: Uuid,
    pub assigned_by: Uuid,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl Assignment {
    /// Whether `date` falls inside the inclusive `[start_date, end_date]` window.
    pub fn covers(&self, date: NaiveDate) -> bool {
        self.start_date <= date && self.end_date.map_or(true, |end| end >= date)
    }
}

#[derive(Debug, Clone)]
pub struct NewAssignment {
    pub program_id: Uuid,
    pub program_version: i32,
    pub disciple_id: Uuid,
    pub assigned_by: Uuid,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AssignmentPatch {
    pub end_date: Option<NaiveDate>,
    pub is_active: Option<bool>,
}

impl AssignmentPatch {
    pub fn is_empty(&self) -> bool {
        self.end_date.is_none() && self.is_active.is_none()
    }
}

/// Listing row for the coach's assignment board.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AssignmentSummary {
    #[serde(flatten)]
    pub assignment: Assignment,
    pub program_title: String,
    pub disciple_name: String,
    pub disciple_email: String,
}

/// One program day as seen through an assignment.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AssignmentDay {
    pub week_index: i32,
    pub day_id: Uuid,
    pub day_index: i32,
    pub notes: Option<String>,
    pub prescriptions: i64,
    pub sessions: i64,
}

//=========================================================================================
// Sessions
//=========================================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Open,
    Closed,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Open => "open",
            SessionStatus::Closed => "closed",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "open" => Some(SessionStatus::Open),
            "closed" => Some(SessionStatus::Closed),
            _ => None,
        }
    }
}

/// One workout instance of a disciple.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionLog {
    pub id: Uuid,
    pub assignment_id: Uuid,
    pub day_id: Uuid,
    pub disciple_id: Uuid,
    pub performed_at: DateTime<Utc>,
    pub status: SessionStatus,
    pub ended_at: Option<DateTime<Utc>>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewSession {
    pub assignment_id: Uuid,
    pub day_id: Uuid,
    pub disciple_id: Uuid,
    pub performed_at: DateTime<Utc>,
    pub notes: Option<String>,
}

/// Resolved partial update of a session. `ended_at: Some(None)` clears the column.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionPatch {
    pub performed_at: Option<DateTime<Utc>>,
    pub notes: Option<String>,
    pub status: Option<SessionStatus>,
    pub ended_at: Option<Option<DateTime<Utc>>>,
}

impl SessionPatch {
    pub fn is_empty(&self) -> bool {
        self.performed_at.is_none()
            && self.notes.is_none()
            && self.status.is_none()
            && self.ended_at.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SetLog {
    pub id: Uuid,
    pub session_id: Uuid,
    pub prescription_id: Uuid,
    pub set_index: i32,
    pub weight: Option<f64>,
    pub reps: i32,
    pub rpe: Option<f32>,
    pub to_failure: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewSet {
    pub session_id: Uuid,
    pub prescription_id: Uuid,
    pub set_index: i32,
    pub weight: Option<f64>,
    pub reps: i32,
    pub rpe: Option<f32>,
    pub to_failure: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SetPatch {
    pub set_index: Option<i32>,
    pub weight: Option<f64>,
    pub reps: Option<i32>,
    pub rpe: Option<f32>,
    pub to_failure: Option<bool>,
}

impl SetPatch {
    pub fn is_empty(&self) -> bool {
        self.set_index.is_none()
            && self.weight.is_none()
            && self.reps.is_none()
            && self.rpe.is_none()
            && self.to_failure.is_none()
    }
}

/// A logged set joined with the exercise it was prescribed for.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SetView {
    #[serde(flatten)]
    pub set: SetLog,
    pub exercise_id: Uuid,
    pub exercise_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CardioSegment {
    pub id: Uuid,
    pub session_id: Uuid,
    pub modality: String,
    pub minutes: i32,
    pub target_hr_min: Option<i32>,
    pub target_hr_max: Option<i32>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewCardio {
    pub session_id: Uuid,
    pub modality: String,
    pub minutes: i32,
    pub target_hr_min: Option<i32>,
    pub target_hr_max: Option<i32>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionDetail {
    pub session: SessionLog,
    pub sets: Vec<SetView>,
    pub cardio: Vec<CardioSegment>,
}

/// The latest session logged against an (assignment, day) pair.
#[derive(Debug, Clone, PartialEq)]
pub struct CurrentSession {
    pub id: Uuid,
    pub started_at: DateTime<Utc>,
    pub sets_count: i64,
}

/// What a disciple is supposed to train today, plus the session already in progress.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TodayPlan {
    pub assignment_id: Option<Uuid>,
    pub day: Option<ProgramDay>,
    pub prescriptions: Vec<PrescriptionView>,
    pub current_session_id: Option<Uuid>,
    pub current_session_started_at: Option<DateTime<Utc>>,
    pub current_session_sets_count: i64,
}

//=========================================================================================
// Invitations
//=========================================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvitationStatus {
    Pending,
    Accepted,
    Revoked,
}

impl InvitationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvitationStatus::Pending => "pending",
            InvitationStatus::Accepted => "accepted",
            InvitationStatus::Revoked => "revoked",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "pending" => Some(InvitationStatus::Pending),
            "accepted" => Some(InvitationStatus::Accepted),
            "revoked" => Some(InvitationStatus::Revoked),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Invitation {
    pub id: Uuid,
    pub code: String,
    pub coach_id: Uuid,
    pub email: String,
    pub name: Option<String>,
    pub status: InvitationStatus,
    pub expires_at: DateTime<Utc>,
    pub accepted_by: Option<Uuid>,
    pub accepted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewInvitation {
    pub code: String,
    pub coach_id: Uuid,
    pub email: String,
    pub name: Option<String>,
    pub expires_at: DateTime<Utc>,
}

/// Claims carried inside a signed invitation code.
#[derive(Debug, Clone, PartialEq)]
pub struct InviteClaims {
    pub coach_id: Uuid,
    pub email: String,
    pub expires_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_is_coach_when_owning_programs_or_coaching() {
        assert_eq!(Role::derive(true, false), Role::Coach);
        assert_eq!(Role::derive(false, true), Role::Coach);
        assert_eq!(Role::derive(true, true), Role::Coach);
        assert_eq!(Role::derive(false, false), Role::Disciple);
    }

    #[test]
    fn link_action_parsing_is_lenient_on_case() {
        assert_eq!(LinkAction::parse(" Accept "), Some(LinkAction::Accept));
        assert_eq!(LinkAction::parse("reject"), Some(LinkAction::Reject));
        assert_eq!(LinkAction::parse("approve"), None);
        assert_eq!(LinkAction::Accept.target_status(), LinkStatus::Accepted);
    }

    #[test]
    fn assignment_window_is_inclusive() {
        let start = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        let mut a = Assignment {
            id: Uuid::new_v4(),
            program_id: Uuid::new_v4(),
            program_version: 1,
            disciple_id: Uuid::new_v4(),
            assigned_by: Uuid::new_v4(),
            start_date: start,
            end_date: Some(NaiveDate::from_ymd_opt(2024, 3, 10).unwrap()),
            is_active: true,
            created_at: Utc::now(),
        };
        assert!(a.covers(start));
        assert!(a.covers(NaiveDate::from_ymd_opt(2024, 3, 10).unwrap()));
        assert!(!a.covers(NaiveDate::from_ymd_opt(2024, 3, 11).unwrap()));
        assert!(!a.covers(NaiveDate::from_ymd_opt(2024, 2, 29).unwrap()));
        a.end_date = None;
        assert!(a.covers(NaiveDate::from_ymd_opt(2030, 1, 1).unwrap()));
    }
}
