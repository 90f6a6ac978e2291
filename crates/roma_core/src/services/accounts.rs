//! crates/roma_core/src/services/accounts.rs
//!
//! Signup, credential checks and the derived-role profile.

use regex::Regex;
use serde::Deserialize;
use std::sync::{Arc, OnceLock};
use tracing::info;
use uuid::Uuid;

use crate::domain::{Me, Role, User};
use crate::ports::{PasswordHasher, PortError, PortResult, UserRepository};

pub const MIN_PASSWORD_LEN: usize = 8;

#[derive(Debug, Clone, Deserialize)]
pub struct SignupInput {
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub name: String,
}

pub fn normalize_email(raw: &str) -> String {
    raw.trim().to_lowercase()
}

pub fn is_valid_email(email: &str) -> bool {
    static EMAIL: OnceLock<Regex> = OnceLock::new();
    EMAIL
        .get_or_init(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("valid email regex"))
        .is_match(email)
}

#[derive(Clone)]
pub struct AccountService {
    users: Arc<dyn UserRepository>,
    hasher: Arc<dyn PasswordHasher>,
}

impl AccountService {
    pub fn new(users: Arc<dyn UserRepository>, hasher: Arc<dyn PasswordHasher>) -> Self {
        Self { users, hasher }
    }

    pub async fn signup(&self, input: SignupInput) -> PortResult<User> {
        let email = normalize_email(&input.email);
        if !is_valid_email(&email) {
            return Err(PortError::Validation("invalid_email".to_string()));
        }
        if input.password.chars().count() < MIN_PASSWORD_LEN {
            return Err(PortError::Validation("password_too_short".to_string()));
        }
        let name = input.name.trim();
        if name.is_empty() {
            return Err(PortError::Validation("name_required".to_string()));
        }

        let hash = self.hasher.hash(&input.password)?;
        let user = self.users.create_user(&email, name, &hash).await?;
        info!(user_id = %user.id, "user registered");
        Ok(user)
    }

    /// Unknown emails and wrong passwords are indistinguishable to the caller.
    pub async fn authenticate(&self, email: &str, password: &str) -> PortResult<User> {
        let creds = match self
            .users
            .get_credentials_by_email(&normalize_email(email))
            .await
        {
            Ok(c) => c,
            Err(PortError::NotFound(_)) => return Err(PortError::Unauthorized),
            Err(e) => return Err(e),
        };
        if !self.hasher.verify(password, &creds.password_hash)? {
            return Err(PortError::Unauthorized);
        }
        Ok(creds.user)
    }

    pub async fn get_user(&self, user_id: Uuid) -> PortResult<User> {
        self.users.get_user(user_id).await
    }

    pub async fn me(&self, user_id: Uuid) -> PortResult<Me> {
        let user = self.users.get_user(user_id).await?;
        let owns = self.users.owns_any_program(user_id).await?;
        let coaches = self.users.coaches_anyone(user_id).await?;
        Ok(Me {
            user,
            role: Role::derive(owns, coaches),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{LinkStatus, NewProgram};
    use crate::memory::{InMemoryStore, PlainHasher};
    use crate::ports::{CoachRepository, ProgramRepository};

    fn service(store: Arc<InMemoryStore>) -> AccountService {
        AccountService::new(store, Arc::new(PlainHasher))
    }

    fn signup(email: &str) -> SignupInput {
        SignupInput {
            email: email.to_string(),
            password: "correct horse".to_string(),
            name: "Ana".to_string(),
        }
    }

    #[test]
    fn email_shape() {
        assert!(is_valid_email("ana@example.com"));
        assert!(!is_valid_email("ana@example"));
        assert!(!is_valid_email("ana example.com"));
        assert_eq!(normalize_email("  Ana@Example.COM "), "ana@example.com");
    }

    #[tokio::test]
    async fn signup_normalizes_email_and_rejects_duplicates() {
        let store = Arc::new(InMemoryStore::new());
        let svc = service(store);

        let user = svc.signup(signup(" Ana@Example.com ")).await.unwrap();
        assert_eq!(user.email, "ana@example.com");

        let err = svc.signup(signup("ana@example.com")).await.unwrap_err();
        assert!(matches!(err, PortError::Conflict(code) if code == "email_in_use"));
    }

    #[tokio::test]
    async fn signup_validates_input() {
        let svc = service(Arc::new(InMemoryStore::new()));
        let mut short = signup("a@b.co");
        short.password = "short".into();
        assert!(matches!(svc.signup(short).await, Err(PortError::Validation(_))));

        let mut nameless = signup("a@b.co");
        nameless.name = "  ".into();
        assert!(matches!(svc.signup(nameless).await, Err(PortError::Validation(_))));
    }

    #[tokio::test]
    async fn authenticate_hides_which_part_was_wrong() {
        let svc = service(Arc::new(InMemoryStore::new()));
        svc.signup(signup("ana@example.com")).await.unwrap();

        assert!(svc.authenticate("ANA@example.com", "correct horse").await.is_ok());
        assert!(matches!(
            svc.authenticate("ana@example.com", "wrong password").await,
            Err(PortError::Unauthorized)
        ));
        assert!(matches!(
            svc.authenticate("nobody@example.com", "correct horse").await,
            Err(PortError::Unauthorized)
        ));
    }

    #[tokio::test]
    async fn role_follows_programs_and_links() {
        let store = Arc::new(InMemoryStore::new());
        let svc = service(store.clone());
        let ana = svc.signup(signup("ana@example.com")).await.unwrap();
        let bob = svc.signup(signup("bob@example.com")).await.unwrap();

        assert_eq!(svc.me(ana.id).await.unwrap().role, Role::Disciple);

        let link = store
            .create_link(ana.id, bob.id, LinkStatus::Pending)
            .await
            .unwrap();
        assert_eq!(svc.me(ana.id).await.unwrap().role, Role::Disciple);
        store
            .update_link_status(link.id, LinkStatus::Accepted)
            .await
            .unwrap();
        assert_eq!(svc.me(ana.id).await.unwrap().role, Role::Coach);
        assert_eq!(svc.me(bob.id).await.unwrap().role, Role::Disciple);

        store
            .create_program(
                bob.id,
                &NewProgram {
                    title: "Base".into(),
                    notes: None,
                    visibility: None,
                },
            )
            .await
            .unwrap();
        assert_eq!(svc.me(bob.id).await.unwrap().role, Role::Coach);
    }
}
