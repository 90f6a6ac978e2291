//! crates/roma_core/src/services/history.rs
//!
//! Today resolution, recent history, personal records and the daily volume summaries.

use chrono::{Duration, NaiveDate, Utc};
use chrono_tz::Tz;
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

use super::{page_limit, page_offset, CoachGuard};
use crate::domain::{Page, SessionLog, TodayPlan};
use crate::history::{
    clamp_days, fill_exercise_gaps, fill_muscle_gaps, local_date, personal_records, pivot,
    resolve_timezone, window_start, Adherence, DailyExerciseVolume, DailyMuscleVolume,
    DayHistoryRow, ExerciseRef, HistoryGroup, HistoryQuery, Metric, PersonalRecord, PivotMode,
    PivotResponse, PlanVsDoneRow, SessionHistoryRow,
};
use crate::ports::{
    AssignmentRepository, HistoryRepository, PortError, PortResult, ProgramRepository,
    SessionRepository,
};

/// Dense daily rows of one summary mode.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum SummaryRows {
    ByExercise(Vec<DailyExerciseVolume>),
    ByMuscle(Vec<DailyMuscleVolume>),
}

#[derive(Debug, Clone, Serialize)]
pub struct Summary {
    pub mode: PivotMode,
    pub days: i64,
    pub from: NaiveDate,
    pub to: NaiveDate,
    pub rows: SummaryRows,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub catalog: Option<Vec<ExerciseRef>>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum HistoryPage {
    Sessions(Page<SessionHistoryRow>),
    Days(Page<DayHistoryRow>),
}

/// Paging and date filters shared by the history listings.
#[derive(Debug, Clone, Default)]
pub struct HistoryWindow {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    pub tz: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Clone)]
pub struct HistoryService {
    history: Arc<dyn HistoryRepository>,
    assignments: Arc<dyn AssignmentRepository>,
    programs: Arc<dyn ProgramRepository>,
    sessions: Arc<dyn SessionRepository>,
    guard: CoachGuard,
    default_tz: Tz,
}

impl HistoryService {
    pub fn new(
        history: Arc<dyn HistoryRepository>,
        assignments: Arc<dyn AssignmentRepository>,
        programs: Arc<dyn ProgramRepository>,
        sessions: Arc<dyn SessionRepository>,
        guard: CoachGuard,
        default_tz: Tz,
    ) -> Self {
        Self {
            history,
            assignments,
            programs,
            sessions,
            guard,
            default_tz,
        }
    }

    pub fn default_tz(&self) -> Tz {
        self.default_tz
    }

    /// The zone named by the request, or the configured default.
    pub fn tz(&self, name: Option<&str>) -> Tz {
        resolve_timezone(name, self.default_tz)
    }

    fn today(tz: Tz) -> NaiveDate {
        local_date(Utc::now(), tz)
    }

    // --- Today ---

    /// Week 1 / day 1 of the newest active assignment covering today in `tz`, with its
    /// prescriptions and the latest session logged against it. `NoDay` when either is missing.
    pub async fn resolve_today(&self, disciple_id: Uuid, tz: Tz) -> PortResult<TodayPlan> {
        let today = Self::today(tz);
        let assignment = self
            .assignments
            .active_assignment_on(disciple_id, today)
            .await?
            .ok_or(PortError::NoDay)?;
        let day = self
            .programs
            .find_day(assignment.program_id, 1, 1)
            .await?
            .ok_or(PortError::NoDay)?;
        let prescriptions = self.programs.list_prescriptions(day.id).await?;
        let current = self
            .sessions
            .latest_session_for_day(assignment.id, day.id)
            .await?;

        Ok(TodayPlan {
            assignment_id: Some(assignment.id),
            day: Some(day),
            prescriptions,
            current_session_id: current.as_ref().map(|c| c.id),
            current_session_started_at: current.as_ref().map(|c| c.started_at),
            current_session_sets_count: current.map_or(0, |c| c.sets_count),
        })
    }

    /// [`Self::resolve_today`] with `NoDay` turned into an empty plan.
    pub async fn today_or_empty(&self, disciple_id: Uuid, tz: Tz) -> PortResult<TodayPlan> {
        match self.resolve_today(disciple_id, tz).await {
            Err(PortError::NoDay) => Ok(TodayPlan::default()),
            other => other,
        }
    }

    // --- Sessions and records ---

    async fn reader(&self, caller: Uuid, disciple_id: Option<Uuid>) -> PortResult<Uuid> {
        let disciple_id = disciple_id.unwrap_or(caller);
        self.guard.ensure_can_coach(caller, disciple_id).await?;
        Ok(disciple_id)
    }

    pub async fn recent_sessions(
        &self,
        caller: Uuid,
        disciple_id: Option<Uuid>,
        days: i64,
    ) -> PortResult<Vec<SessionLog>> {
        let disciple_id = self.reader(caller, disciple_id).await?;
        let since = Utc::now() - Duration::days(clamp_days(days));
        self.history.recent_sessions(disciple_id, since).await
    }

    pub async fn personal_records(
        &self,
        caller: Uuid,
        disciple_id: Option<Uuid>,
    ) -> PortResult<Vec<PersonalRecord>> {
        let disciple_id = self.reader(caller, disciple_id).await?;
        let samples = self.history.lift_samples(disciple_id).await?;
        Ok(personal_records(&samples))
    }

    // --- Summaries ---

    async fn exercise_series(
        &self,
        disciple_id: Uuid,
        days: i64,
        tz: Tz,
        with_catalog: bool,
    ) -> PortResult<(Vec<DailyExerciseVolume>, Option<Vec<ExerciseRef>>, NaiveDate, NaiveDate)> {
        let today = Self::today(tz);
        let start = window_start(today, days);
        let raw = self.history.daily_by_exercise(disciple_id, start, tz).await?;
        let catalog = if with_catalog {
            Some(self.history.relevant_exercises(disciple_id).await?)
        } else {
            None
        };
        let dense = fill_exercise_gaps(raw, catalog.as_deref().unwrap_or(&[]), start, today);
        Ok((dense, catalog, start, today))
    }

    async fn muscle_series(
        &self,
        disciple_id: Uuid,
        days: i64,
        tz: Tz,
    ) -> PortResult<(Vec<DailyMuscleVolume>, NaiveDate, NaiveDate)> {
        let today = Self::today(tz);
        let start = window_start(today, days);
        let raw = self.history.daily_by_muscle(disciple_id, start, tz).await?;
        Ok((fill_muscle_gaps(raw, start, today), start, today))
    }

    pub async fn summary(
        &self,
        caller: Uuid,
        disciple_id: Option<Uuid>,
        mode: PivotMode,
        days: i64,
        tz: Tz,
        with_catalog: bool,
    ) -> PortResult<Summary> {
        let disciple_id = self.reader(caller, disciple_id).await?;
        let days = clamp_days(days);
        match mode {
            PivotMode::ByExercise => {
                let (rows, catalog, from, to) =
                    self.exercise_series(disciple_id, days, tz, with_catalog).await?;
                Ok(Summary {
                    mode,
                    days,
                    from,
                    to,
                    rows: SummaryRows::ByExercise(rows),
                    catalog,
                })
            }
            PivotMode::ByMuscle => {
                let (rows, from, to) = self.muscle_series(disciple_id, days, tz).await?;
                Ok(Summary {
                    mode,
                    days,
                    from,
                    to,
                    rows: SummaryRows::ByMuscle(rows),
                    catalog: None,
                })
            }
        }
    }

    pub async fn pivot(
        &self,
        caller: Uuid,
        disciple_id: Option<Uuid>,
        mode: PivotMode,
        metric: Metric,
        days: i64,
        tz: Tz,
        with_catalog: bool,
    ) -> PortResult<PivotResponse> {
        let disciple_id = self.reader(caller, disciple_id).await?;
        self.pivot_for(disciple_id, mode, metric, days, tz, with_catalog)
            .await
    }

    /// Pivot without the access check, for callers that already performed it.
    pub(crate) async fn pivot_for(
        &self,
        disciple_id: Uuid,
        mode: PivotMode,
        metric: Metric,
        days: i64,
        tz: Tz,
        with_catalog: bool,
    ) -> PortResult<PivotResponse> {
        let days = clamp_days(days);
        let (table, catalog) = match mode {
            PivotMode::ByExercise => {
                let (dense, catalog, start, end) =
                    self.exercise_series(disciple_id, days, tz, with_catalog).await?;
                (pivot(&dense, metric, start, end), catalog)
            }
            PivotMode::ByMuscle => {
                let (dense, start, end) = self.muscle_series(disciple_id, days, tz).await?;
                (pivot(&dense, metric, start, end), None)
            }
        };
        Ok(PivotResponse {
            columns: table.columns,
            rows: table.rows,
            catalog,
            mode,
            days,
        })
    }

    pub(crate) async fn adherence(&self, disciple_id: Uuid, days: i64, tz: Tz) -> PortResult<Adherence> {
        let days = clamp_days(days);
        let since = window_start(Self::today(tz), days);
        let with_sets = self.history.days_with_sets(disciple_id, since, tz).await?;
        Ok(Adherence::new(days, with_sets))
    }

    // --- Paged listings ---

    fn query(&self, disciple_id: Uuid, window: &HistoryWindow) -> HistoryQuery {
        let (from, to) = match (window.from, window.to) {
            (Some(f), Some(t)) if f > t => (Some(t), Some(f)),
            other => other,
        };
        HistoryQuery {
            disciple_id,
            tz: self.tz(window.tz.as_deref()),
            from,
            to,
            limit: page_limit(window.limit),
            offset: page_offset(window.offset),
        }
    }

    pub async fn history(
        &self,
        caller: Uuid,
        disciple_id: Option<Uuid>,
        group: HistoryGroup,
        window: HistoryWindow,
    ) -> PortResult<HistoryPage> {
        let disciple_id = self.reader(caller, disciple_id).await?;
        let query = self.query(disciple_id, &window);
        match group {
            HistoryGroup::Session => {
                let (items, total) = self.history.session_history(&query).await?;
                Ok(HistoryPage::Sessions(Page {
                    items,
                    total,
                    limit: query.limit,
                    offset: query.offset,
                }))
            }
            HistoryGroup::Day => {
                let (items, total) = self.history.day_history(&query).await?;
                Ok(HistoryPage::Days(Page {
                    items,
                    total,
                    limit: query.limit,
                    offset: query.offset,
                }))
            }
        }
    }

    pub async fn plan_vs_done(
        &self,
        caller: Uuid,
        disciple_id: Uuid,
        window: HistoryWindow,
    ) -> PortResult<Page<PlanVsDoneRow>> {
        let disciple_id = self.reader(caller, Some(disciple_id)).await?;
        let query = self.query(disciple_id, &window);
        let (items, total) = self.history.plan_vs_done(&query).await?;
        Ok(Page {
            items,
            total,
            limit: query.limit,
            offset: query.offset,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{
        LinkStatus, NewAssignment, NewDay, NewPrescription, NewProgram, NewSession, NewSet,
    };
    use crate::memory::InMemoryStore;
    use crate::ports::CoachRepository;

    struct Fixture {
        store: Arc<InMemoryStore>,
        svc: HistoryService,
        disciple: Uuid,
        squat_rx: Uuid,
        bench_rx: Uuid,
        day_id: Uuid,
        assignment_id: Uuid,
    }

    async fn fixture() -> Fixture {
        let store = Arc::new(InMemoryStore::new());
        let coach = store.seed_user("coach@example.com", "Coach");
        let disciple = store.seed_user("d@example.com", "Dana");
        let squat = store.seed_exercise("Back Squat", "Legs");
        let bench = store.seed_exercise("Bench Press", "Chest");
        let program = store
            .create_program(
                coach,
                &NewProgram {
                    title: "Base".into(),
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
        let mut rx_ids = Vec::new();
        for exercise_id in [squat, bench] {
            let rx = store
                .add_prescription(
                    day.id,
                    &NewPrescription {
                        exercise_id,
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
            rx_ids.push(rx.id);
        }
        let today = Utc::now().date_naive();
        let assignment = store
            .create_assignment(&NewAssignment {
                program_id: program.id,
                program_version: 1,
                disciple_id: disciple,
                assigned_by: coach,
                start_date: today - Duration::days(30),
                end_date: None,
            })
            .await
            .unwrap();
        store
            .activate_assignment(disciple, assignment.id, today)
            .await
            .unwrap();

        let svc = HistoryService::new(
            store.clone(),
            store.clone(),
            store.clone(),
            store.clone(),
            CoachGuard::new(store.clone()),
            chrono_tz::UTC,
        );
        Fixture {
            store,
            svc,
            disciple,
            squat_rx: rx_ids[0],
            bench_rx: rx_ids[1],
            day_id: day.id,
            assignment_id: assignment.id,
        }
    }

    async fn log(f: &Fixture, days_ago: i64, sets: &[(Uuid, f64, i32)]) -> Uuid {
        let session = f
            .store
            .create_session(&NewSession {
                assignment_id: f.assignment_id,
                day_id: f.day_id,
                disciple_id: f.disciple,
                performed_at: Utc::now() - Duration::days(days_ago),
                notes: None,
            })
            .await
            .unwrap();
        for (i, (rx, weight, reps)) in sets.iter().enumerate() {
            f.store
                .add_set(&NewSet {
                    session_id: session.id,
                    prescription_id: *rx,
                    set_index: i as i32 + 1,
                    weight: Some(*weight),
                    reps: *reps,
                    rpe: None,
                    to_failure: false,
                })
                .await
                .unwrap();
        }
        session.id
    }

    #[tokio::test]
    async fn today_resolves_week_one_day_one() {
        let f = fixture().await;
        let plan = f.svc.resolve_today(f.disciple, chrono_tz::UTC).await.unwrap();
        assert_eq!(plan.assignment_id, Some(f.assignment_id));
        assert_eq!(plan.day.map(|d| d.id), Some(f.day_id));
        assert_eq!(plan.prescriptions.len(), 2);
        assert_eq!(plan.current_session_id, None);

        let session = log(&f, 0, &[(f.squat_rx, 100.0, 5)]).await;
        let plan = f.svc.resolve_today(f.disciple, chrono_tz::UTC).await.unwrap();
        assert_eq!(plan.current_session_id, Some(session));
        assert_eq!(plan.current_session_sets_count, 1);
    }

    #[tokio::test]
    async fn no_assignment_means_no_day() {
        let f = fixture().await;
        let loner = f.store.seed_user("l@example.com", "L");
        assert!(matches!(
            f.svc.resolve_today(loner, chrono_tz::UTC).await,
            Err(PortError::NoDay)
        ));
        let empty = f.svc.today_or_empty(loner, chrono_tz::UTC).await.unwrap();
        assert!(empty.assignment_id.is_none());
    }

    #[tokio::test]
    async fn pivot_is_dense_over_the_window() {
        let f = fixture().await;
        log(&f, 0, &[(f.squat_rx, 100.0, 5), (f.squat_rx, 100.0, 5)]).await;
        log(&f, 2, &[(f.bench_rx, 60.0, 10)]).await;
        log(&f, 40, &[(f.bench_rx, 999.0, 1)]).await;

        let p = f
            .svc
            .pivot(f.disciple, None, PivotMode::ByExercise, Metric::Volume, 7, chrono_tz::UTC, false)
            .await
            .unwrap();
        assert_eq!(p.days, 7);
        assert_eq!(p.rows.len(), 7);
        assert_eq!(p.columns.len(), 3);
        assert!(p.catalog.is_none());
        let last = p.rows.last().unwrap();
        assert_eq!(last["Back Squat"], serde_json::Value::from(1000.0));
        assert_eq!(last["Bench Press"], serde_json::Value::from(0.0));
        let two_days_ago = &p.rows[4];
        assert_eq!(two_days_ago["Bench Press"], serde_json::Value::from(600.0));

        let reps = f
            .svc
            .pivot(f.disciple, None, PivotMode::ByMuscle, Metric::Reps, 7, chrono_tz::UTC, false)
            .await
            .unwrap();
        assert_eq!(reps.columns, vec!["date", "chest", "legs"]);
        assert_eq!(reps.rows.last().unwrap()["legs"], serde_json::Value::from(10));
    }

    #[tokio::test]
    async fn pivot_without_sets_still_lists_every_day() {
        let f = fixture().await;
        for mode in [PivotMode::ByExercise, PivotMode::ByMuscle] {
            let p = f
                .svc
                .pivot(f.disciple, None, mode, Metric::Volume, 5, chrono_tz::UTC, false)
                .await
                .unwrap();
            assert_eq!(p.columns, vec!["date"]);
            assert_eq!(p.rows.len(), 5);
        }
    }

    #[tokio::test]
    async fn catalog_keeps_idle_exercises_visible() {
        let f = fixture().await;
        log(&f, 0, &[(f.squat_rx, 100.0, 5)]).await;

        let summary = f
            .svc
            .summary(f.disciple, None, PivotMode::ByExercise, 3, chrono_tz::UTC, true)
            .await
            .unwrap();
        let SummaryRows::ByExercise(rows) = summary.rows else {
            panic!("expected exercise rows");
        };
        assert_eq!(rows.len(), 3 * 2);
        assert_eq!(summary.catalog.map(|c| c.len()), Some(2));
    }

    #[tokio::test]
    async fn records_and_history_require_coaching_rights() {
        let f = fixture().await;
        log(&f, 1, &[(f.squat_rx, 100.0, 5), (f.squat_rx, 120.0, 1)]).await;
        let outsider = f.store.seed_user("o@example.com", "O");

        assert!(matches!(
            f.svc.personal_records(outsider, Some(f.disciple)).await,
            Err(PortError::Forbidden(_))
        ));
        let link = f
            .store
            .create_link(outsider, f.disciple, LinkStatus::Accepted)
            .await
            .unwrap();
        assert_eq!(link.status, LinkStatus::Accepted);

        let prs = f.svc.personal_records(outsider, Some(f.disciple)).await.unwrap();
        assert_eq!(prs.len(), 1);
        assert_eq!(prs[0].estimated_1rm, Some(120.0));

        let recent = f.svc.recent_sessions(f.disciple, None, 7).await.unwrap();
        assert_eq!(recent.len(), 1);
    }

    #[tokio::test]
    async fn paged_history_by_session_and_day() {
        let f = fixture().await;
        log(&f, 1, &[(f.squat_rx, 100.0, 5)]).await;
        log(&f, 1, &[(f.bench_rx, 50.0, 10)]).await;
        log(&f, 3, &[(f.bench_rx, 50.0, 10)]).await;

        let HistoryPage::Sessions(sessions) = f
            .svc
            .history(f.disciple, None, HistoryGroup::Session, HistoryWindow::default())
            .await
            .unwrap()
        else {
            panic!("expected sessions");
        };
        assert_eq!(sessions.total, 3);
        assert!(sessions.items[0].performed_at >= sessions.items[1].performed_at);

        let HistoryPage::Days(days) = f
            .svc
            .history(f.disciple, None, HistoryGroup::Day, HistoryWindow::default())
            .await
            .unwrap()
        else {
            panic!("expected days");
        };
        assert_eq!(days.total, 2);
        assert_eq!(days.items[0].sessions, 2);
        assert_eq!(days.items[0].volume, 1000.0);

        let plan = f
            .svc
            .plan_vs_done(f.disciple, f.disciple, HistoryWindow::default())
            .await
            .unwrap();
        assert_eq!(plan.total, 2);
        assert_eq!(plan.items[0].planned_sets, 6);
        assert_eq!(plan.items[0].done_sets, 2);
    }
}
