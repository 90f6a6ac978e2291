pub mod auth;
pub mod coach;
pub mod exercises;
pub mod extract;
pub mod health;
pub mod history;
pub mod invites;
pub mod me;
pub mod middleware;
pub mod programs;
pub mod rate_limit;
pub mod rest;
pub mod router;
pub mod server;
pub mod sessions;
pub mod state;

pub use middleware::require_auth;
pub use router::{build_router, cors_layer};
pub use server::serve;
pub use state::{AppState, HealthProbe};
