//! crates/roma_core/src/services/invites.rs
//!
//! Invitation codes a coach hands out; accepting one links the caller to that coach.

use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use super::accounts::{is_valid_email, normalize_email};
use super::{normalize_opt, CoachService};
use crate::domain::{CoachLink, Invitation, InvitationStatus, InviteClaims, NewInvitation};
use crate::ports::{InviteCodec, InviteRepository, PortError, PortResult};

#[derive(Debug, Clone, Deserialize)]
pub struct CreateInvite {
    pub email: String,
    pub name: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AcceptedInvite {
    pub link: CoachLink,
    pub invitation: Invitation,
}

#[derive(Clone)]
pub struct InviteService {
    invites: Arc<dyn InviteRepository>,
    codec: Arc<dyn InviteCodec>,
    coach: CoachService,
    ttl: Duration,
}

impl InviteService {
    pub fn new(
        invites: Arc<dyn InviteRepository>,
        codec: Arc<dyn InviteCodec>,
        coach: CoachService,
        ttl: Duration,
    ) -> Self {
        Self {
            invites,
            codec,
            coach,
            ttl,
        }
    }

    pub async fn create(&self, coach_id: Uuid, input: CreateInvite) -> PortResult<Invitation> {
        let email = normalize_email(&input.email);
        if !is_valid_email(&email) {
            return Err(PortError::Validation("invalid_email".to_string()));
        }
        let expires_at = Utc::now() + self.ttl;
        let code = self.codec.sign(&InviteClaims {
            coach_id,
            email: email.clone(),
            expires_at,
        })?;
        let invitation = self
            .invites
            .create_invitation(&NewInvitation {
                code,
                coach_id,
                email,
                name: normalize_opt(input.name),
                expires_at,
            })
            .await?;
        info!(invitation_id = %invitation.id, coach_id = %coach_id, "invitation issued");
        Ok(invitation)
    }

    async fn find(&self, code: &str) -> PortResult<Invitation> {
        match self.invites.find_invitation(code.trim()).await {
            Err(PortError::NotFound(_)) => Err(PortError::NotFound("invalid_code".to_string())),
            other => other,
        }
    }

    /// Links the caller to the issuing coach through an accepted link.
    pub async fn accept(&self, caller: Uuid, code: &str) -> PortResult<AcceptedInvite> {
        let invitation = self.find(code).await?;
        if invitation.status != InvitationStatus::Pending {
            return Err(PortError::Conflict("invite_not_pending".to_string()));
        }
        let claims = self.codec.verify(&invitation.code)?;
        if claims.coach_id != invitation.coach_id {
            return Err(PortError::NotFound("invalid_code".to_string()));
        }
        let now = Utc::now();
        if invitation.expires_at <= now {
            return Err(PortError::Gone("invite_expired".to_string()));
        }
        if invitation.coach_id == caller {
            return Err(PortError::Validation("own_invitation".to_string()));
        }

        let link = self
            .coach
            .create_link(invitation.coach_id, caller, true)
            .await?;
        let invitation = self.invites.mark_accepted(invitation.id, caller, now).await?;
        info!(invitation_id = %invitation.id, link_id = %link.id, "invitation accepted");
        Ok(AcceptedInvite { link, invitation })
    }

    pub async fn revoke(&self, caller: Uuid, code: &str) -> PortResult<Invitation> {
        let invitation = self.find(code).await?;
        if invitation.coach_id != caller {
            return Err(PortError::Forbidden("not_invitation_owner".to_string()));
        }
        if invitation.status != InvitationStatus::Pending {
            return Err(PortError::Conflict("invite_not_pending".to_string()));
        }
        self.invites.mark_revoked(invitation.id).await
    }

    pub async fn list(&self, coach_id: Uuid) -> PortResult<Vec<Invitation>> {
        self.invites.list_invitations(coach_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::LinkStatus;
    use crate::memory::{InMemoryStore, PlainInviteCodec};
    use crate::services::{CoachGuard, HistoryService};

    struct Fixture {
        svc: InviteService,
        coach: CoachService,
        coach_id: Uuid,
        disciple: Uuid,
    }

    fn fixture(ttl: Duration) -> Fixture {
        let store = Arc::new(InMemoryStore::new());
        let coach_id = store.seed_user("coach@example.com", "Coach");
        let disciple = store.seed_user("d@example.com", "Dana");
        let guard = CoachGuard::new(store.clone());
        let history = HistoryService::new(
            store.clone(),
            store.clone(),
            store.clone(),
            store.clone(),
            guard.clone(),
            chrono_tz::UTC,
        );
        let coach = CoachService::new(store.clone(), store.clone(), store.clone(), guard, history);
        let svc = InviteService::new(store.clone(), Arc::new(PlainInviteCodec), coach.clone(), ttl);
        Fixture {
            svc,
            coach,
            coach_id,
            disciple,
        }
    }

    fn invite(email: &str) -> CreateInvite {
        CreateInvite {
            email: email.to_string(),
            name: Some(" Dana ".to_string()),
        }
    }

    #[tokio::test]
    async fn accepting_links_the_disciple() {
        let f = fixture(Duration::hours(72));
        let inv = f.svc.create(f.coach_id, invite(" D@Example.com ")).await.unwrap();
        assert_eq!(inv.email, "d@example.com");
        assert_eq!(inv.name.as_deref(), Some("Dana"));
        assert_eq!(inv.status, InvitationStatus::Pending);

        let accepted = f.svc.accept(f.disciple, &inv.code).await.unwrap();
        assert_eq!(accepted.link.status, LinkStatus::Accepted);
        assert_eq!(accepted.invitation.status, InvitationStatus::Accepted);
        assert_eq!(accepted.invitation.accepted_by, Some(f.disciple));
        assert!(f.coach.can_coach(f.coach_id, f.disciple).await.unwrap());

        assert!(matches!(
            f.svc.accept(f.disciple, &inv.code).await,
            Err(PortError::Conflict(code)) if code == "invite_not_pending"
        ));
    }

    #[tokio::test]
    async fn accepting_upgrades_a_pending_link() {
        let f = fixture(Duration::hours(72));
        let pending = f.coach.create_link(f.coach_id, f.disciple, false).await.unwrap();
        let inv = f.svc.create(f.coach_id, invite("d@example.com")).await.unwrap();
        let accepted = f.svc.accept(f.disciple, &inv.code).await.unwrap();
        assert_eq!(accepted.link.id, pending.id);
        assert_eq!(accepted.link.status, LinkStatus::Accepted);
    }

    #[tokio::test]
    async fn unknown_expired_and_revoked_codes() {
        let f = fixture(Duration::hours(72));
        assert!(matches!(
            f.svc.accept(f.disciple, "nope").await,
            Err(PortError::NotFound(code)) if code == "invalid_code"
        ));

        let expired = fixture(Duration::seconds(-5));
        let inv = expired.svc.create(expired.coach_id, invite("d@example.com")).await.unwrap();
        assert!(matches!(
            expired.svc.accept(expired.disciple, &inv.code).await,
            Err(PortError::Gone(code)) if code == "invite_expired"
        ));

        let inv = f.svc.create(f.coach_id, invite("d@example.com")).await.unwrap();
        assert!(matches!(
            f.svc.revoke(f.disciple, &inv.code).await,
            Err(PortError::Forbidden(_))
        ));
        let revoked = f.svc.revoke(f.coach_id, &inv.code).await.unwrap();
        assert_eq!(revoked.status, InvitationStatus::Revoked);
        assert!(matches!(
            f.svc.accept(f.disciple, &inv.code).await,
            Err(PortError::Conflict(_))
        ));
        assert_eq!(f.svc.list(f.coach_id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn bad_email_is_rejected() {
        let f = fixture(Duration::hours(1));
        assert!(matches!(
            f.svc.create(f.coach_id, invite("not-an-email")).await,
            Err(PortError::Validation(code)) if code == "invalid_email"
        ));
    }
}
