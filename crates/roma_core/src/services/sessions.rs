//! crates/roma_core/src/services/sessions.rs
//!
//! Workout sessions and the sets and cardio segments logged inside them.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use super::{normalize_opt, page_limit, page_offset, CoachGuard};
use crate::domain::{
    CardioSegment, NewCardio, NewSession, NewSet, Page, ProgramNode, SessionDetail, SessionLog,
    SessionPatch, SessionStatus, SetLog, SetPatch,
};
use crate::ports::{
    AssignmentRepository, PortError, PortResult, ProgramRepository, SessionRepository,
};

#[derive(Debug, Clone, Deserialize)]
pub struct StartSession {
    pub assignment_id: Uuid,
    pub day_id: Uuid,
    pub performed_at: Option<DateTime<Utc>>,
    pub notes: Option<String>,
}

/// Raw session update as the client sends it, before the lifecycle rules are applied.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SessionUpdate {
    pub performed_at: Option<DateTime<Utc>>,
    pub notes: Option<String>,
    pub status: Option<String>,
    pub ended_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SetInput {
    pub prescription_id: Uuid,
    pub set_index: i32,
    pub weight: Option<f64>,
    pub reps: i32,
    pub rpe: Option<f32>,
    #[serde(default)]
    pub to_failure: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CardioInput {
    pub modality: String,
    pub minutes: i32,
    pub target_hr_min: Option<i32>,
    pub target_hr_max: Option<i32>,
    pub notes: Option<String>,
}

/// Applies the session lifecycle to a raw update:
/// closing without `ended_at` stamps `now`, `ended_at` alone implies closed,
/// reopening clears `ended_at` (any supplied one is ignored).
pub fn resolve_session_patch(update: SessionUpdate, now: DateTime<Utc>) -> PortResult<SessionPatch> {
    let status = match update.status.as_deref().map(|s| s.trim().to_ascii_lowercase()) {
        None => None,
        Some(raw) => Some(
            SessionStatus::parse(&raw)
                .ok_or_else(|| PortError::Validation("invalid_status".to_string()))?,
        ),
    };

    let (status, ended_at) = match (status, update.ended_at) {
        (Some(SessionStatus::Open), _) => (Some(SessionStatus::Open), Some(None)),
        (Some(SessionStatus::Closed), ended) => {
            (Some(SessionStatus::Closed), Some(Some(ended.unwrap_or(now))))
        }
        (None, Some(ended)) => (Some(SessionStatus::Closed), Some(Some(ended))),
        (None, None) => (None, None),
    };

    Ok(SessionPatch {
        performed_at: update.performed_at,
        notes: update.notes,
        status,
        ended_at,
    })
}

#[derive(Clone)]
pub struct SessionService {
    sessions: Arc<dyn SessionRepository>,
    assignments: Arc<dyn AssignmentRepository>,
    programs: Arc<dyn ProgramRepository>,
    guard: CoachGuard,
}

impl SessionService {
    pub fn new(
        sessions: Arc<dyn SessionRepository>,
        assignments: Arc<dyn AssignmentRepository>,
        programs: Arc<dyn ProgramRepository>,
        guard: CoachGuard,
    ) -> Self {
        Self {
            sessions,
            assignments,
            programs,
            guard,
        }
    }

    /// The session if the caller logged it. Anyone else sees it as missing.
    async fn owned(&self, caller: Uuid, session_id: Uuid) -> PortResult<SessionLog> {
        let session = self.sessions.get_session(session_id).await?;
        if session.disciple_id != caller {
            return Err(PortError::NotFound("session".to_string()));
        }
        Ok(session)
    }

    /// The session if the caller logged it or coaches whoever did.
    async fn readable(&self, caller: Uuid, session_id: Uuid) -> PortResult<SessionLog> {
        let session = self.sessions.get_session(session_id).await?;
        self.guard
            .ensure_visible(caller, session.disciple_id, "session")
            .await?;
        Ok(session)
    }

    async fn set_of(&self, session_id: Uuid, set_id: Uuid) -> PortResult<SetLog> {
        let set = self.sessions.get_set(set_id).await?;
        if set.session_id != session_id {
            return Err(PortError::NotFound("set".to_string()));
        }
        Ok(set)
    }

    pub async fn start(&self, caller: Uuid, req: StartSession) -> PortResult<SessionLog> {
        let assignment = self.assignments.get_assignment(req.assignment_id).await?;
        if assignment.disciple_id != caller {
            return Err(PortError::NotFound("assignment".to_string()));
        }
        match self.programs.program_of(ProgramNode::Day(req.day_id)).await? {
            Some(p) if p.id == assignment.program_id => {}
            _ => return Err(PortError::NotFound("day".to_string())),
        }

        let session = self
            .sessions
            .create_session(&NewSession {
                assignment_id: assignment.id,
                day_id: req.day_id,
                disciple_id: caller,
                performed_at: req.performed_at.unwrap_or_else(Utc::now),
                notes: normalize_opt(req.notes),
            })
            .await?;
        info!(session_id = %session.id, disciple_id = %caller, "session started");
        Ok(session)
    }

    pub async fn get(&self, caller: Uuid, session_id: Uuid) -> PortResult<SessionDetail> {
        let session = self.readable(caller, session_id).await?;
        let sets = self.sessions.list_set_views(session_id).await?;
        let cardio = self.sessions.list_cardio(session_id).await?;
        Ok(SessionDetail {
            session,
            sets,
            cardio,
        })
    }

    /// An update with nothing in it returns the session unchanged.
    pub async fn patch(
        &self,
        caller: Uuid,
        session_id: Uuid,
        update: SessionUpdate,
    ) -> PortResult<SessionLog> {
        let session = self.owned(caller, session_id).await?;
        let patch = resolve_session_patch(update, Utc::now())?;
        if patch.is_empty() {
            return Ok(session);
        }
        self.sessions.update_session(session_id, &patch).await
    }

    pub async fn active_session(&self, caller: Uuid) -> PortResult<Option<SessionLog>> {
        self.sessions.latest_open_session(caller).await
    }

    // --- Sets ---

    pub async fn add_set(&self, caller: Uuid, session_id: Uuid, input: SetInput) -> PortResult<SetLog> {
        let session = self.owned(caller, session_id).await?;
        if input.set_index < 1 {
            return Err(PortError::Validation("invalid_set_index".to_string()));
        }
        if input.reps < 0 {
            return Err(PortError::Validation("invalid_reps".to_string()));
        }
        let in_day = self
            .programs
            .list_prescriptions(session.day_id)
            .await?
            .iter()
            .any(|p| p.prescription.id == input.prescription_id);
        if !in_day {
            return Err(PortError::Validation("prescription_not_in_day".to_string()));
        }

        self.sessions
            .add_set(&NewSet {
                session_id,
                prescription_id: input.prescription_id,
                set_index: input.set_index,
                weight: input.weight,
                reps: input.reps,
                rpe: input.rpe,
                to_failure: input.to_failure,
            })
            .await
    }

    pub async fn list_sets(
        &self,
        caller: Uuid,
        session_id: Uuid,
        prescription_id: Option<Uuid>,
        limit: Option<i64>,
        offset: Option<i64>,
    ) -> PortResult<Page<SetLog>> {
        self.readable(caller, session_id).await?;
        let (limit, offset) = (page_limit(limit), page_offset(offset));
        let (items, total) = self
            .sessions
            .list_sets(session_id, prescription_id, limit, offset)
            .await?;
        Ok(Page {
            items,
            total,
            limit,
            offset,
        })
    }

    pub async fn update_set(
        &self,
        caller: Uuid,
        session_id: Uuid,
        set_id: Uuid,
        patch: SetPatch,
    ) -> PortResult<SetLog> {
        self.owned(caller, session_id).await?;
        let set = self.set_of(session_id, set_id).await?;
        if patch.is_empty() {
            return Ok(set);
        }
        if patch.set_index.is_some_and(|i| i < 1) {
            return Err(PortError::Validation("invalid_set_index".to_string()));
        }
        if patch.reps.is_some_and(|r| r < 0) {
            return Err(PortError::Validation("invalid_reps".to_string()));
        }
        self.sessions.update_set(set_id, &patch).await
    }

    pub async fn delete_set(&self, caller: Uuid, session_id: Uuid, set_id: Uuid) -> PortResult<()> {
        self.owned(caller, session_id).await?;
        self.set_of(session_id, set_id).await?;
        self.sessions.delete_set(set_id).await
    }

    // --- Cardio ---

    pub async fn add_cardio(
        &self,
        caller: Uuid,
        session_id: Uuid,
        input: CardioInput,
    ) -> PortResult<CardioSegment> {
        self.owned(caller, session_id).await?;
        let modality = input.modality.trim();
        if modality.is_empty() {
            return Err(PortError::Validation("modality_required".to_string()));
        }
        if input.minutes <= 0 {
            return Err(PortError::Validation("invalid_minutes".to_string()));
        }
        if let (Some(lo), Some(hi)) = (input.target_hr_min, input.target_hr_max) {
            if lo > hi {
                return Err(PortError::Validation("invalid_hr_range".to_string()));
            }
        }
        self.sessions
            .add_cardio(&NewCardio {
                session_id,
                modality: modality.to_string(),
                minutes: input.minutes,
                target_hr_min: input.target_hr_min,
                target_hr_max: input.target_hr_max,
                notes: normalize_opt(input.notes),
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{LinkStatus, NewAssignment, NewDay, NewPrescription, NewProgram};
    use crate::memory::InMemoryStore;
    use crate::ports::CoachRepository;
    use chrono::{Duration, TimeZone};

    fn at(h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, h, 0, 0).unwrap()
    }

    fn update(status: Option<&str>, ended_at: Option<DateTime<Utc>>) -> SessionUpdate {
        SessionUpdate {
            status: status.map(str::to_string),
            ended_at,
            ..Default::default()
        }
    }

    #[test]
    fn closing_without_end_stamps_now() {
        let p = resolve_session_patch(update(Some("closed"), None), at(10)).unwrap();
        assert_eq!(p.status, Some(SessionStatus::Closed));
        assert_eq!(p.ended_at, Some(Some(at(10))));

        let p = resolve_session_patch(update(Some(" Closed "), Some(at(9))), at(10)).unwrap();
        assert_eq!(p.ended_at, Some(Some(at(9))));
    }

    #[test]
    fn end_alone_implies_closed() {
        let p = resolve_session_patch(update(None, Some(at(8))), at(10)).unwrap();
        assert_eq!(p.status, Some(SessionStatus::Closed));
        assert_eq!(p.ended_at, Some(Some(at(8))));
    }

    #[test]
    fn reopening_clears_end() {
        let p = resolve_session_patch(update(Some("open"), Some(at(8))), at(10)).unwrap();
        assert_eq!(p.status, Some(SessionStatus::Open));
        assert_eq!(p.ended_at, Some(None));
    }

    #[test]
    fn unknown_status_and_empty_update() {
        assert!(matches!(
            resolve_session_patch(update(Some("paused"), None), at(10)),
            Err(PortError::Validation(code)) if code == "invalid_status"
        ));
        let p = resolve_session_patch(SessionUpdate::default(), at(10)).unwrap();
        assert!(p.is_empty());
    }

    struct Fixture {
        store: Arc<InMemoryStore>,
        svc: SessionService,
        disciple: Uuid,
        assignment_id: Uuid,
        day_id: Uuid,
        rx: Uuid,
    }

    async fn fixture() -> Fixture {
        let store = Arc::new(InMemoryStore::new());
        let coach = store.seed_user("coach@example.com", "Coach");
        let disciple = store.seed_user("d@example.com", "Dana");
        let exercise = store.seed_exercise("Deadlift", "Back");
        let program = store
            .create_program(
                coach,
                &NewProgram {
                    title: "Pull".into(),
                    notes: None,
                    visibility: None,
                },
            )
            .await
            .unwrap();
        let week = store.add_week(program.id, 1).await.unwrap();
        let day = store
            .add_day(week.id, &NewDay { day_index: 1, notes: None })
            .await
            .unwrap();
        let rx = store
            .add_prescription(
                day.id,
                &NewPrescription {
                    exercise_id: exercise,
                    series: 3,
                    reps: "5".into(),
                    rest_sec: None,
                    to_failure: false,
                    tempo: None,
                    rir: None,
                    rpe: None,
                    method_id: None,
                    notes: None,
                    position: None,
                },
            )
            .await
            .unwrap();
        let today = Utc::now().date_naive();
        let assignment = store
            .create_assignment(&NewAssignment {
                program_id: program.id,
                program_version: 1,
                disciple_id: disciple,
                assigned_by: coach,
                start_date: today,
                end_date: None,
            })
            .await
            .unwrap();
        store
            .activate_assignment(disciple, assignment.id, today)
            .await
            .unwrap();
        let svc = SessionService::new(
            store.clone(),
            store.clone(),
            store.clone(),
            CoachGuard::new(store.clone()),
        );
        Fixture {
            store,
            svc,
            disciple,
            assignment_id: assignment.id,
            day_id: day.id,
            rx: rx.id,
        }
    }

    fn start(f: &Fixture) -> StartSession {
        StartSession {
            assignment_id: f.assignment_id,
            day_id: f.day_id,
            performed_at: None,
            notes: Some("  ".into()),
        }
    }

    fn set(rx: Uuid, index: i32) -> SetInput {
        SetInput {
            prescription_id: rx,
            set_index: index,
            weight: Some(140.0),
            reps: 5,
            rpe: Some(8.0),
            to_failure: false,
        }
    }

    #[tokio::test]
    async fn start_requires_own_assignment_and_matching_day() {
        let f = fixture().await;
        let s = f.svc.start(f.disciple, start(&f)).await.unwrap();
        assert_eq!(s.status, SessionStatus::Open);
        assert_eq!(s.notes, None);

        let stranger = f.store.seed_user("x@example.com", "X");
        assert!(matches!(
            f.svc.start(stranger, start(&f)).await,
            Err(PortError::NotFound(_))
        ));
        assert!(matches!(
            f.svc
                .start(
                    f.disciple,
                    StartSession {
                        day_id: Uuid::new_v4(),
                        ..start(&f)
                    }
                )
                .await,
            Err(PortError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn patch_closes_and_reopens() {
        let f = fixture().await;
        let s = f.svc.start(f.disciple, start(&f)).await.unwrap();
        assert_eq!(f.svc.active_session(f.disciple).await.unwrap().map(|a| a.id), Some(s.id));

        let before = Utc::now();
        let closed = f
            .svc
            .patch(f.disciple, s.id, update(Some("closed"), None))
            .await
            .unwrap();
        assert_eq!(closed.status, SessionStatus::Closed);
        let ended = closed.ended_at.unwrap();
        assert!(ended >= before - Duration::seconds(1) && ended <= Utc::now() + Duration::seconds(1));
        assert!(f.svc.active_session(f.disciple).await.unwrap().is_none());

        let reopened = f
            .svc
            .patch(f.disciple, s.id, update(Some("open"), None))
            .await
            .unwrap();
        assert_eq!(reopened.status, SessionStatus::Open);
        assert_eq!(reopened.ended_at, None);

        let untouched = f
            .svc
            .patch(f.disciple, s.id, SessionUpdate::default())
            .await
            .unwrap();
        assert_eq!(untouched, reopened);
    }

    #[tokio::test]
    async fn sets_are_written_by_the_owner_and_read_by_coaches() {
        let f = fixture().await;
        let s = f.svc.start(f.disciple, start(&f)).await.unwrap();
        f.svc.add_set(f.disciple, s.id, set(f.rx, 1)).await.unwrap();
        let second = f.svc.add_set(f.disciple, s.id, set(f.rx, 2)).await.unwrap();

        assert!(matches!(
            f.svc.add_set(f.disciple, s.id, set(Uuid::new_v4(), 3)).await,
            Err(PortError::Validation(code)) if code == "prescription_not_in_day"
        ));
        assert!(matches!(
            f.svc.add_set(f.disciple, s.id, set(f.rx, 0)).await,
            Err(PortError::Validation(_))
        ));

        let coach = f.store.seed_user("c2@example.com", "C2");
        assert!(matches!(f.svc.get(coach, s.id).await, Err(PortError::NotFound(_))));
        f.store
            .create_link(coach, f.disciple, LinkStatus::Accepted)
            .await
            .unwrap();
        let detail = f.svc.get(coach, s.id).await.unwrap();
        assert_eq!(detail.sets.len(), 2);
        assert_eq!(detail.sets[0].exercise_name, "Deadlift");
        assert!(matches!(
            f.svc.add_set(coach, s.id, set(f.rx, 3)).await,
            Err(PortError::NotFound(_))
        ));

        let page = f
            .svc
            .list_sets(coach, s.id, Some(f.rx), Some(1), Some(1))
            .await
            .unwrap();
        assert_eq!(page.total, 2);
        assert_eq!(page.items.len(), 1);
        assert_eq!(page.items[0].id, second.id);

        let updated = f
            .svc
            .update_set(
                f.disciple,
                s.id,
                second.id,
                SetPatch {
                    reps: Some(3),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.reps, 3);
        assert_eq!(updated.weight, Some(140.0));

        f.svc.delete_set(f.disciple, s.id, second.id).await.unwrap();
        assert_eq!(f.svc.get(f.disciple, s.id).await.unwrap().sets.len(), 1);
    }

    #[tokio::test]
    async fn cardio_needs_positive_minutes() {
        let f = fixture().await;
        let s = f.svc.start(f.disciple, start(&f)).await.unwrap();
        let input = |minutes| CardioInput {
            modality: " bike ".into(),
            minutes,
            target_hr_min: Some(120),
            target_hr_max: Some(140),
            notes: None,
        };
        assert!(matches!(
            f.svc.add_cardio(f.disciple, s.id, input(0)).await,
            Err(PortError::Validation(code)) if code == "invalid_minutes"
        ));
        let seg = f.svc.add_cardio(f.disciple, s.id, input(20)).await.unwrap();
        assert_eq!(seg.modality, "bike");
        assert_eq!(f.svc.get(f.disciple, s.id).await.unwrap().cardio, vec![seg]);
    }
}
