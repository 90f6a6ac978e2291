//! services/api/src/web/state.rs
//!
//! Defines the application's shared state.

use async_trait::async_trait;
use roma_core::Services;
use std::sync::Arc;
use std::time::Duration;

use crate::adapters::DbAdapter;
use crate::security::JwtKeys;
use crate::web::rate_limit::RateLimiter;

//=========================================================================================
// AppState (Shared Across All Requests)
//=========================================================================================

/// The shared application state, created once at startup and passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub services: Services,
    pub jwt: Arc<JwtKeys>,
    pub probe: Arc<dyn HealthProbe>,
    pub limiter: Arc<RateLimiter>,
}

/// Storage liveness as seen by the readiness endpoints.
#[async_trait]
pub trait HealthProbe: Send + Sync {
    /// True when the store answered within `timeout`.
    async fn check(&self, timeout: Duration) -> bool;
}

#[async_trait]
impl HealthProbe for DbAdapter {
    async fn check(&self, timeout: Duration) -> bool {
        self.ping(timeout).await
    }
}
