//! crates/roma_core/src/services/mod.rs
//!
//! Business rules and authorization, written against the ports only.

pub mod access;
pub mod accounts;
pub mod coach;
pub mod exercises;
pub mod history;
pub mod invites;
pub mod programs;
pub mod sessions;

use chrono::Duration;
use chrono_tz::Tz;
use std::sync::Arc;

use crate::ports::{
    AssignmentRepository, CoachRepository, ExerciseRepository, HistoryRepository, InviteCodec,
    InviteRepository, PasswordHasher, ProgramRepository, SessionRepository, UserRepository,
};

pub use access::CoachGuard;
pub use accounts::AccountService;
pub use coach::CoachService;
pub use exercises::ExerciseService;
pub use history::HistoryService;
pub use invites::InviteService;
pub use programs::ProgramService;
pub use sessions::SessionService;

pub const DEFAULT_PAGE_LIMIT: i64 = 50;
pub const MAX_PAGE_LIMIT: i64 = 200;

/// Missing, non-positive or oversized limits fall back to the default page size.
pub fn page_limit(limit: Option<i64>) -> i64 {
    match limit {
        Some(l) if l > 0 && l <= MAX_PAGE_LIMIT => l,
        _ => DEFAULT_PAGE_LIMIT,
    }
}

pub fn page_offset(offset: Option<i64>) -> i64 {
    offset.unwrap_or(0).max(0)
}

/// Trims an optional string, turning blanks into `None`.
pub fn normalize_opt(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Settings the services need from the outer configuration.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub default_tz: Tz,
    pub invite_ttl: Duration,
}

/// Every service, wired over one store that implements all repository ports.
#[derive(Clone)]
pub struct Services {
    pub accounts: AccountService,
    pub exercises: ExerciseService,
    pub programs: ProgramService,
    pub coach: CoachService,
    pub sessions: SessionService,
    pub history: HistoryService,
    pub invites: InviteService,
}

impl Services {
    pub fn new<S>(
        store: Arc<S>,
        hasher: Arc<dyn PasswordHasher>,
        invite_codec: Arc<dyn InviteCodec>,
        config: ServiceConfig,
    ) -> Self
    where
        S: UserRepository
            + ExerciseRepository
            + ProgramRepository
            + CoachRepository
            + AssignmentRepository
            + SessionRepository
            + HistoryRepository
            + InviteRepository
            + 'static,
    {
        let users: Arc<dyn UserRepository> = store.clone();
        let exercise_repo: Arc<dyn ExerciseRepository> = store.clone();
        let program_repo: Arc<dyn ProgramRepository> = store.clone();
        let links: Arc<dyn CoachRepository> = store.clone();
        let assignments: Arc<dyn AssignmentRepository> = store.clone();
        let session_repo: Arc<dyn SessionRepository> = store.clone();
        let history_repo: Arc<dyn HistoryRepository> = store.clone();
        let invite_repo: Arc<dyn InviteRepository> = store;

        let guard = CoachGuard::new(links.clone());
        let history = HistoryService::new(
            history_repo,
            assignments.clone(),
            program_repo.clone(),
            session_repo.clone(),
            guard.clone(),
            config.default_tz,
        );
        let coach = CoachService::new(
            links,
            assignments.clone(),
            program_repo.clone(),
            guard.clone(),
            history.clone(),
        );

        Self {
            accounts: AccountService::new(users, hasher),
            exercises: ExerciseService::new(exercise_repo.clone()),
            programs: ProgramService::new(program_repo.clone(), exercise_repo, assignments.clone()),
            sessions: SessionService::new(session_repo, assignments, program_repo, guard),
            invites: InviteService::new(invite_repo, invite_codec, coach.clone(), config.invite_ttl),
            coach,
            history,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_limit_defaults_outside_bounds() {
        assert_eq!(page_limit(None), 50);
        assert_eq!(page_limit(Some(0)), 50);
        assert_eq!(page_limit(Some(-1)), 50);
        assert_eq!(page_limit(Some(201)), 50);
        assert_eq!(page_limit(Some(200)), 200);
        assert_eq!(page_offset(Some(-5)), 0);
    }

    #[test]
    fn blank_optionals_become_none() {
        assert_eq!(normalize_opt(Some("  ".into())), None);
        assert_eq!(normalize_opt(Some(" bar ".into())), Some("bar".into()));
        assert_eq!(normalize_opt(None), None);
    }
}
