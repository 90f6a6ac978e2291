//! services/api/src/adapters/db/users.rs

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use roma_core::domain::{User, UserCredentials};
use roma_core::ports::{PortResult, UserRepository};
use sqlx::FromRow;
use uuid::Uuid;

use super::{db_error, DbAdapter};

#[derive(FromRow)]
struct UserRecord {
    id: Uuid,
    email: String,
    name: String,
    created_at: DateTime<Utc>,
}
impl UserRecord {
    fn to_domain(self) -> User {
        User {
            id: self.id,
            email: self.email,
            name: self.name,
            created_at: self.created_at,
        }
    }
}

#[derive(FromRow)]
struct CredentialsRecord {
    #[sqlx(flatten)]
    user: UserRecord,
    password_hash: String,
}

#[async_trait]
impl UserRepository for DbAdapter {
    async fn create_user(&self, email: &str, name: &str, password_hash: &str) -> PortResult<User> {
        let record = sqlx::query_as::<_, UserRecord>(
            "INSERT INTO users (email, name, password_hash) VALUES ($1, $2, $3)
             RETURNING id, email, name, created_at",
        )
        .bind(email)
        .bind(name)
        .bind(password_hash)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| db_error(e, "user"))?;
        Ok(record.to_domain())
    }

    async fn get_credentials_by_email(&self, email: &str) -> PortResult<UserCredentials> {
        let record = sqlx::query_as::<_, CredentialsRecord>(
            "SELECT id, email, name, created_at, password_hash FROM users
             WHERE lower(email) = lower($1)",
        )
        .bind(email)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| db_error(e, "user"))?;
        Ok(UserCredentials {
            user: record.user.to_domain(),
            password_hash: record.password_hash,
        })
    }

    async fn get_user(&self, user_id: Uuid) -> PortResult<User> {
        let record = sqlx::query_as::<_, UserRecord>(
            "SELECT id, email, name, created_at FROM users WHERE id = $1",
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| db_error(e, "user"))?;
        Ok(record.to_domain())
    }

    async fn owns_any_program(&self, user_id: Uuid) -> PortResult<bool> {
        sqlx::query_scalar::<_, bool>("SELECT EXISTS (SELECT 1 FROM programs WHERE owner_id = $1)")
            .bind(user_id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| db_error(e, "user"))
    }

    async fn coaches_anyone(&self, user_id: Uuid) -> PortResult<bool> {
        sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS (SELECT 1 FROM coach_links
             WHERE coach_id = $1 AND disciple_id <> $1 AND status = 'accepted')",
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| db_error(e, "user"))
    }
}
