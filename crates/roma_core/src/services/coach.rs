//! crates/roma_core/src/services/coach.rs
//!
//! Coach-disciple links, assignments and the coach-facing views of a disciple.

use chrono::{Duration, NaiveDate, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use super::{page_limit, page_offset, CoachGuard, HistoryService};
use crate::calendar::{project_calendar, CalendarDay};
use crate::domain::{
    Assignment, AssignmentDay, AssignmentPatch, AssignmentSummary, CoachLink, Disciple,
    LinkAction, LinkLists, LinkStatus, NewAssignment, Page, TodayPlan,
};
use crate::history::{Adherence, PivotMode, PivotResponse, Metric};
use crate::ports::{
    AssignmentRepository, CoachRepository, PortError, PortResult, ProgramRepository,
};
use crate::services::programs::VISIBILITY_PUBLIC;

/// Days shown by the calendar when the caller gives no range.
pub const DEFAULT_CALENDAR_SPAN: i64 = 14;

#[derive(Debug, Clone, Deserialize)]
pub struct AssignProgram {
    pub program_id: Uuid,
    pub disciple_id: Uuid,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}

/// The coach dashboard for one disciple.
#[derive(Debug, Clone, Serialize)]
pub struct Overview {
    pub disciple_id: Uuid,
    pub me_today: TodayPlan,
    pub pivot: PivotResponse,
    pub adherence: Adherence,
}

#[derive(Clone)]
pub struct CoachService {
    links: Arc<dyn CoachRepository>,
    assignments: Arc<dyn AssignmentRepository>,
    programs: Arc<dyn ProgramRepository>,
    guard: CoachGuard,
    history: HistoryService,
}

impl CoachService {
    pub fn new(
        links: Arc<dyn CoachRepository>,
        assignments: Arc<dyn AssignmentRepository>,
        programs: Arc<dyn ProgramRepository>,
        guard: CoachGuard,
        history: HistoryService,
    ) -> Self {
        Self {
            links,
            assignments,
            programs,
            guard,
            history,
        }
    }

    pub async fn can_coach(&self, coach_id: Uuid, disciple_id: Uuid) -> PortResult<bool> {
        self.guard.can_coach(coach_id, disciple_id).await
    }

    fn today(&self) -> NaiveDate {
        Utc::now().with_timezone(&self.history.default_tz()).date_naive()
    }

    // --- Links ---

    /// Reuses an existing non-rejected link between the pair. Self-links and `auto_accept`
    /// links start accepted, everything else starts pending.
    pub async fn create_link(
        &self,
        coach_id: Uuid,
        disciple_id: Uuid,
        auto_accept: bool,
    ) -> PortResult<CoachLink> {
        let accept = auto_accept || coach_id == disciple_id;
        let incoming = self.links.list_links(disciple_id).await?.incoming;
        if let Some(existing) = incoming
            .into_iter()
            .find(|l| l.coach_id == coach_id && l.status != LinkStatus::Rejected)
        {
            if accept && existing.status == LinkStatus::Pending {
                return self
                    .links
                    .update_link_status(existing.id, LinkStatus::Accepted)
                    .await;
            }
            return Ok(existing);
        }

        let status = if accept {
            LinkStatus::Accepted
        } else {
            LinkStatus::Pending
        };
        let link = self.links.create_link(coach_id, disciple_id, status).await?;
        info!(link_id = %link.id, coach_id = %coach_id, disciple_id = %disciple_id, status = status.as_str(), "coach link created");
        Ok(link)
    }

    /// Only the disciple of a pending link may accept or reject it.
    pub async fn update_link_status(
        &self,
        caller: Uuid,
        link_id: Uuid,
        action: LinkAction,
    ) -> PortResult<CoachLink> {
        let incoming = self.links.list_links(caller).await?.incoming;
        let link = incoming
            .into_iter()
            .find(|l| l.id == link_id)
            .ok_or_else(|| PortError::Forbidden("not_link_disciple".to_string()))?;
        if link.status != LinkStatus::Pending {
            return Err(PortError::Conflict("link_not_pending".to_string()));
        }
        self.links
            .update_link_status(link_id, action.target_status())
            .await
    }

    pub async fn list_links(&self, caller: Uuid) -> PortResult<LinkLists> {
        self.links.list_links(caller).await
    }

    pub async fn list_disciples(&self, coach_id: Uuid) -> PortResult<Vec<Disciple>> {
        self.links.list_disciples(coach_id).await
    }

    // --- Assignments ---

    /// Creates the assignment pinned to the program's current version and makes it the
    /// disciple's only active one.
    pub async fn assign_program(&self, caller: Uuid, req: AssignProgram) -> PortResult<Assignment> {
        self.guard.ensure_can_coach(caller, req.disciple_id).await?;
        let program = self.programs.get_program(req.program_id).await?;
        if program.owner_id != caller && program.visibility != VISIBILITY_PUBLIC {
            return Err(PortError::NotFound("program".to_string()));
        }
        let today = self.today();
        let start_date = req.start_date.unwrap_or(today);
        if req.end_date.is_some_and(|end| end < start_date) {
            return Err(PortError::Validation("end_before_start".to_string()));
        }

        let assignment = self
            .assignments
            .create_active_assignment(&NewAssignment {
                program_id: program.id,
                program_version: program.version,
                disciple_id: req.disciple_id,
                assigned_by: caller,
                start_date,
                end_date: req.end_date,
            })
            .await?;
        info!(assignment_id = %assignment.id, disciple_id = %req.disciple_id, program_id = %program.id, "program assigned");
        Ok(assignment)
    }

    /// The caller's own assignments plus those of accepted disciples, or one disciple's.
    pub async fn list_assignments(
        &self,
        caller: Uuid,
        disciple_id: Option<Uuid>,
        limit: Option<i64>,
        offset: Option<i64>,
    ) -> PortResult<Page<AssignmentSummary>> {
        let ids = match disciple_id {
            Some(d) => {
                self.guard.ensure_can_coach(caller, d).await?;
                vec![d]
            }
            None => {
                let mut ids = vec![caller];
                ids.extend(
                    self.links
                        .list_disciples(caller)
                        .await?
                        .into_iter()
                        .map(|d| d.id)
                        .filter(|id| *id != caller),
                );
                ids
            }
        };
        let (limit, offset) = (page_limit(limit), page_offset(offset));
        let (items, total) = self.assignments.list_assignments(&ids, limit, offset).await?;
        Ok(Page {
            items,
            total,
            limit,
            offset,
        })
    }

    async fn visible_assignment(&self, caller: Uuid, id: Uuid) -> PortResult<Assignment> {
        let assignment = self.assignments.get_assignment(id).await?;
        self.guard
            .ensure_visible(caller, assignment.disciple_id, "assignment")
            .await?;
        Ok(assignment)
    }

    pub async fn update_assignment(
        &self,
        caller: Uuid,
        id: Uuid,
        patch: AssignmentPatch,
    ) -> PortResult<Assignment> {
        if patch.is_empty() {
            return Err(PortError::Validation("empty_patch".to_string()));
        }
        let assignment = self.visible_assignment(caller, id).await?;
        if let Some(end) = patch.end_date {
            if end < assignment.start_date {
                return Err(PortError::Validation("end_before_start".to_string()));
            }
        }

        if patch.is_active == Some(true) {
            let active = self
                .assignments
                .activate_assignment(assignment.disciple_id, id, self.today())
                .await?;
            return match patch.end_date {
                Some(end) => {
                    self.assignments
                        .update_assignment(
                            active.id,
                            &AssignmentPatch {
                                end_date: Some(end),
                                is_active: None,
                            },
                        )
                        .await
                }
                None => Ok(active),
            };
        }
        self.assignments.update_assignment(id, &patch).await
    }

    pub async fn activate_assignment(
        &self,
        caller: Uuid,
        disciple_id: Uuid,
        assignment_id: Uuid,
    ) -> PortResult<Assignment> {
        self.guard.ensure_can_coach(caller, disciple_id).await?;
        let assignment = self.assignments.get_assignment(assignment_id).await?;
        if assignment.disciple_id != disciple_id {
            return Err(PortError::NotFound("assignment".to_string()));
        }
        let active = self
            .assignments
            .activate_assignment(disciple_id, assignment_id, self.today())
            .await?;
        info!(assignment_id = %assignment_id, disciple_id = %disciple_id, "assignment activated");
        Ok(active)
    }

    pub async fn active_assignment(&self, disciple_id: Uuid) -> PortResult<Option<Assignment>> {
        self.assignments.latest_active_assignment(disciple_id).await
    }

    /// Cycles the week-1 days of the program across `[from, to]`, by default two weeks
    /// starting today.
    pub async fn assignment_calendar(
        &self,
        caller: Uuid,
        id: Uuid,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    ) -> PortResult<Vec<CalendarDay>> {
        let assignment = self.visible_assignment(caller, id).await?;
        let from = from.unwrap_or_else(|| self.today());
        let to = to.unwrap_or(from + Duration::days(DEFAULT_CALENDAR_SPAN - 1));

        let week = self
            .programs
            .list_weeks(assignment.program_id)
            .await?
            .into_iter()
            .find(|w| w.week_index == 1);
        let days = match week {
            Some(w) => self.programs.list_days(w.id).await?,
            None => Vec::new(),
        };
        Ok(project_calendar(
            assignment.start_date,
            assignment.end_date,
            &days,
            from,
            to,
        ))
    }

    pub async fn assignment_days(&self, caller: Uuid, id: Uuid) -> PortResult<Vec<AssignmentDay>> {
        let assignment = self.visible_assignment(caller, id).await?;
        self.assignments.list_assignment_days(&assignment).await
    }

    // --- Disciple views ---

    pub async fn today_for_disciple(
        &self,
        caller: Uuid,
        disciple_id: Uuid,
        tz: Tz,
    ) -> PortResult<TodayPlan> {
        self.guard.ensure_can_coach(caller, disciple_id).await?;
        self.history.today_or_empty(disciple_id, tz).await
    }

    pub async fn overview(
        &self,
        caller: Uuid,
        disciple_id: Uuid,
        days: i64,
        tz: Tz,
    ) -> PortResult<Overview> {
        self.guard.ensure_can_coach(caller, disciple_id).await?;
        let me_today = self.history.today_or_empty(disciple_id, tz).await?;
        let pivot = self
            .history
            .pivot_for(disciple_id, PivotMode::ByExercise, Metric::Volume, days, tz, true)
            .await?;
        let adherence = self.history.adherence(disciple_id, days, tz).await?;
        Ok(Overview {
            disciple_id,
            me_today,
            pivot,
            adherence,
        })
    }
}
