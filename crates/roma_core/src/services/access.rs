//! crates/roma_core/src/services/access.rs

use std::sync::Arc;
use uuid::Uuid;

use crate::ports::{CoachRepository, PortError, PortResult};

/// Answers "may this user act on that disciple's data".
#[derive(Clone)]
pub struct CoachGuard {
    links: Arc<dyn CoachRepository>,
}

impl CoachGuard {
    pub fn new(links: Arc<dyn CoachRepository>) -> Self {
        Self { links }
    }

    /// True for self-coaching or an accepted link from coach to disciple.
    /// Only a failing lookup produces an error.
    pub async fn can_coach(&self, coach_id: Uuid, disciple_id: Uuid) -> PortResult<bool> {
        if coach_id == disciple_id {
            return Ok(true);
        }
        self.links.has_accepted_link(coach_id, disciple_id).await
    }

    pub async fn ensure_can_coach(&self, coach_id: Uuid, disciple_id: Uuid) -> PortResult<()> {
        if self.can_coach(coach_id, disciple_id).await? {
            Ok(())
        } else {
            Err(PortError::Forbidden("not_coach_of_disciple".to_string()))
        }
    }

    /// Like [`Self::ensure_can_coach`] but reports a stranger's resource as missing.
    pub async fn ensure_visible(&self, caller: Uuid, owner: Uuid, what: &str) -> PortResult<()> {
        if self.can_coach(caller, owner).await? {
            Ok(())
        } else {
            Err(PortError::NotFound(what.to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::LinkStatus;
    use crate::memory::InMemoryStore;

    #[tokio::test]
    async fn self_coaching_is_always_allowed() {
        let store = Arc::new(InMemoryStore::new());
        let guard = CoachGuard::new(store);
        let me = Uuid::new_v4();
        assert!(guard.can_coach(me, me).await.unwrap());
    }

    #[tokio::test]
    async fn only_accepted_links_grant_access() {
        let store = Arc::new(InMemoryStore::new());
        let coach = store.seed_user("coach@example.com", "Coach");
        let disciple = store.seed_user("d@example.com", "Disciple");
        let guard = CoachGuard::new(store.clone());

        assert!(!guard.can_coach(coach, disciple).await.unwrap());

        let link = store
            .create_link(coach, disciple, LinkStatus::Pending)
            .await
            .unwrap();
        assert!(!guard.can_coach(coach, disciple).await.unwrap());
        assert!(matches!(
            guard.ensure_can_coach(coach, disciple).await,
            Err(PortError::Forbidden(_))
        ));

        store
            .update_link_status(link.id, LinkStatus::Accepted)
            .await
            .unwrap();
        assert!(guard.can_coach(coach, disciple).await.unwrap());
        // Links are directional.
        assert!(!guard.can_coach(disciple, coach).await.unwrap());
    }
}
