//! services/api/src/adapters/db/mod.rs
//!
//! The Postgres adapter: one `DbAdapter` over a `PgPool` implementing every repository port of
//! the core crate. Each submodule holds the record structs and the trait implementation for one
//! port.

mod assignments;
mod coach;
mod exercises;
mod history;
mod invites;
mod programs;
mod sessions;
mod users;

use roma_core::ports::PortError;
use sqlx::PgPool;
use std::time::Duration;

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// A database adapter that implements the repository ports.
#[derive(Clone)]
pub struct DbAdapter {
    pool: PgPool,
}

impl DbAdapter {
    /// Creates a new `DbAdapter`.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// A helper function to run database migrations at startup.
    pub async fn run_migrations(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await
    }

    /// `SELECT 1` bounded by `timeout`; false on error or timeout.
    pub async fn ping(&self, timeout: Duration) -> bool {
        let probe = sqlx::query("SELECT 1").execute(&self.pool);
        matches!(tokio::time::timeout(timeout, probe).await, Ok(Ok(_)))
    }
}

//=========================================================================================
// Error Mapping
//=========================================================================================

/// Client-facing code for a unique index violation.
fn conflict_code(constraint: Option<&str>) -> &'static str {
    match constraint {
        Some("users_email_lower_idx") => "email_in_use",
        Some("exercises_name_lower_idx") => "name_already_exists",
        Some("program_weeks_program_id_week_index_key") => "week_index_taken",
        Some("program_days_week_id_day_index_key") => "day_index_taken",
        Some("invitations_code_key") => "code_in_use",
        Some("assignments_one_active_idx") => "active_assignment_exists",
        _ => "conflict",
    }
}

/// Maps a sqlx error onto the port vocabulary. `what` names the missing row.
pub(crate) fn db_error(e: sqlx::Error, what: &str) -> PortError {
    match &e {
        sqlx::Error::RowNotFound => PortError::NotFound(what.to_string()),
        sqlx::Error::Database(db) => match db.code().as_deref() {
            Some("23505") => PortError::Conflict(conflict_code(db.constraint()).to_string()),
            Some("23503") => PortError::Conflict("in_use".to_string()),
            _ => PortError::Unexpected(e.to_string()),
        },
        _ => PortError::Unexpected(e.to_string()),
    }
}

/// Errors a mutation that touched no row into `NotFound(what)`.
pub(crate) fn expect_row(affected: u64, what: &str) -> Result<(), PortError> {
    if affected == 0 {
        Err(PortError::NotFound(what.to_string()))
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unique_constraints_have_stable_codes() {
        assert_eq!(conflict_code(Some("users_email_lower_idx")), "email_in_use");
        assert_eq!(conflict_code(Some("exercises_name_lower_idx")), "name_already_exists");
        assert_eq!(conflict_code(None), "conflict");
        assert!(matches!(
            db_error(sqlx::Error::RowNotFound, "program"),
            PortError::NotFound(w) if w == "program"
        ));
        assert!(expect_row(0, "set").is_err());
        assert!(expect_row(1, "set").is_ok());
    }
}
