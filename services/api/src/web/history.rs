//! services/api/src/web/history.rs
//!
//! Read-only training history: paged sessions, personal records and volume summaries.

use axum::{extract::State, Json};
use chrono::NaiveDate;
use roma_core::domain::{Page, SessionLog};
use roma_core::history::{
    HistoryGroup, Metric, PersonalRecord, PivotMode, PivotResponse, PlanVsDoneRow,
    DEFAULT_WINDOW_DAYS,
};
use roma_core::services::history::{HistoryPage, HistoryWindow, Summary};
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::error::ApiResult;
use crate::web::extract::{ApiPath, ApiQuery, CurrentUser};
use crate::web::state::AppState;

/// Query string of `/api/history` and the per-disciple listings.
#[derive(Debug, Default, Deserialize)]
pub struct HistoryParams {
    pub disciple_id: Option<Uuid>,
    pub group: Option<String>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    pub tz: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl HistoryParams {
    fn window(self) -> HistoryWindow {
        HistoryWindow {
            from: self.from,
            to: self.to,
            tz: self.tz,
            limit: self.limit,
            offset: self.offset,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct RecentParams {
    pub disciple_id: Option<Uuid>,
    pub days: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct SummaryParams {
    pub disciple_id: Option<Uuid>,
    pub mode: Option<String>,
    pub metric: Option<String>,
    pub days: Option<i64>,
    pub tz: Option<String>,
    /// Comma separated; `catalog` adds the exercise catalog to the response.
    pub include: Option<String>,
}

impl SummaryParams {
    fn with_catalog(&self) -> bool {
        self.include
            .as_deref()
            .is_some_and(|raw| raw.split(',').any(|part| part.trim() == "catalog"))
    }

    fn days(&self) -> i64 {
        self.days.unwrap_or(DEFAULT_WINDOW_DAYS)
    }
}

/// GET /api/history
#[utoipa::path(
    get,
    path = "/api/history",
    params(
        ("disciple_id" = Option<Uuid>, Query),
        ("group" = Option<String>, Query, description = "session (default) or day"),
        ("from" = Option<NaiveDate>, Query),
        ("to" = Option<NaiveDate>, Query),
        ("tz" = Option<String>, Query),
        ("limit" = Option<i64>, Query),
        ("offset" = Option<i64>, Query)
    ),
    responses((status = 200, description = "Paged session rows or per-date aggregates")),
    security(("bearer" = [])),
    tag = "history"
)]
pub async fn history_handler(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    ApiQuery(q): ApiQuery<HistoryParams>,
) -> ApiResult<Json<HistoryPage>> {
    let group = HistoryGroup::parse(q.group.as_deref());
    let disciple_id = q.disciple_id;
    let page = state
        .services
        .history
        .history(user.0, disciple_id, group, q.window())
        .await?;
    Ok(Json(page))
}

/// GET /api/history/recent
#[utoipa::path(
    get,
    path = "/api/history/recent",
    params(("days" = Option<i64>, Query), ("disciple_id" = Option<Uuid>, Query)),
    responses((status = 200, description = "Sessions performed in the last `days` days")),
    security(("bearer" = [])),
    tag = "history"
)]
pub async fn recent_handler(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    ApiQuery(q): ApiQuery<RecentParams>,
) -> ApiResult<Json<Vec<SessionLog>>> {
    let sessions = state
        .services
        .history
        .recent_sessions(user.0, q.disciple_id, q.days.unwrap_or(DEFAULT_WINDOW_DAYS))
        .await?;
    Ok(Json(sessions))
}

/// GET /api/history/prs
#[utoipa::path(
    get,
    path = "/api/history/prs",
    params(("disciple_id" = Option<Uuid>, Query)),
    responses((status = 200, description = "Best estimated 1RM per exercise")),
    security(("bearer" = [])),
    tag = "history"
)]
pub async fn prs_handler(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    ApiQuery(q): ApiQuery<RecentParams>,
) -> ApiResult<Json<Vec<PersonalRecord>>> {
    Ok(Json(
        state
            .services
            .history
            .personal_records(user.0, q.disciple_id)
            .await?,
    ))
}

/// GET /api/history/summary
#[utoipa::path(
    get,
    path = "/api/history/summary",
    params(
        ("mode" = Option<String>, Query, description = "by_exercise (default) or by_muscle"),
        ("days" = Option<i64>, Query),
        ("tz" = Option<String>, Query),
        ("include" = Option<String>, Query, description = "catalog"),
        ("disciple_id" = Option<Uuid>, Query)
    ),
    responses((status = 200, description = "Dense daily volume series")),
    security(("bearer" = [])),
    tag = "history"
)]
pub async fn summary_handler(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    ApiQuery(q): ApiQuery<SummaryParams>,
) -> ApiResult<Json<Summary>> {
    let history = &state.services.history;
    let tz = history.tz(q.tz.as_deref());
    let summary = history
        .summary(
            user.0,
            q.disciple_id,
            PivotMode::parse(q.mode.as_deref()),
            q.days(),
            tz,
            q.with_catalog(),
        )
        .await?;
    Ok(Json(summary))
}

/// GET /api/history/summary/pivot
#[utoipa::path(
    get,
    path = "/api/history/summary/pivot",
    params(
        ("mode" = Option<String>, Query),
        ("metric" = Option<String>, Query, description = "volume (default), sets or reps"),
        ("days" = Option<i64>, Query),
        ("tz" = Option<String>, Query),
        ("include" = Option<String>, Query),
        ("disciple_id" = Option<Uuid>, Query)
    ),
    responses((status = 200, description = "Date by column table of the metric")),
    security(("bearer" = [])),
    tag = "history"
)]
pub async fn pivot_handler(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    ApiQuery(q): ApiQuery<SummaryParams>,
) -> ApiResult<Json<PivotResponse>> {
    let history = &state.services.history;
    let tz = history.tz(q.tz.as_deref());
    let pivot = history
        .pivot(
            user.0,
            q.disciple_id,
            PivotMode::parse(q.mode.as_deref()),
            Metric::parse(q.metric.as_deref()),
            q.days(),
            tz,
            q.with_catalog(),
        )
        .await?;
    Ok(Json(pivot))
}

/// GET /api/history/disciples/{id}/sessions
#[utoipa::path(
    get,
    path = "/api/history/disciples/{id}/sessions",
    params(("id" = Uuid, Path)),
    responses((status = 200, description = "The disciple's paged session history"), (status = 403, description = "Not a coach of the disciple")),
    security(("bearer" = [])),
    tag = "history"
)]
pub async fn disciple_sessions_handler(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    ApiPath(disciple_id): ApiPath<Uuid>,
    ApiQuery(q): ApiQuery<HistoryParams>,
) -> ApiResult<Json<HistoryPage>> {
    let group = HistoryGroup::parse(q.group.as_deref());
    let page = state
        .services
        .history
        .history(user.0, Some(disciple_id), group, q.window())
        .await?;
    Ok(Json(page))
}

/// GET /api/history/disciples/{id}/plan-vs-done
#[utoipa::path(
    get,
    path = "/api/history/disciples/{id}/plan-vs-done",
    params(("id" = Uuid, Path)),
    responses((status = 200, description = "Planned against logged sets per date and day")),
    security(("bearer" = [])),
    tag = "history"
)]
pub async fn plan_vs_done_handler(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    ApiPath(disciple_id): ApiPath<Uuid>,
    ApiQuery(q): ApiQuery<HistoryParams>,
) -> ApiResult<Json<Page<PlanVsDoneRow>>> {
    let page = state
        .services
        .history
        .plan_vs_done(user.0, disciple_id, q.window())
        .await?;
    Ok(Json(page))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn include_catalog_is_detected_in_a_list() {
        let params = SummaryParams {
            include: Some("rows, catalog".to_string()),
            ..Default::default()
        };
        assert!(params.with_catalog());
        assert!(!SummaryParams::default().with_catalog());
        assert_eq!(SummaryParams::default().days(), DEFAULT_WINDOW_DAYS);
    }
}
