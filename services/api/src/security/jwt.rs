//! services/api/src/security/jwt.rs
//!
//! HS256 access, refresh and invitation tokens. Every token carries a `typ` claim so one kind
//! can never be replayed as another.

use chrono::{Duration, TimeZone, Utc};
use jsonwebtoken::{decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use roma_core::domain::InviteClaims;
use roma_core::ports::{InviteCodec, PortError, PortResult};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::ApiError;

/// Clock skew tolerated when checking `exp`.
pub const LEEWAY_SECS: u64 = 15;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenType {
    Access,
    Refresh,
    Invite,
}

impl TokenType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenType::Access => "access",
            TokenType::Refresh => "refresh",
            TokenType::Invite => "invite",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub exp: i64,
    pub iat: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub typ: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

impl Claims {
    pub fn user_id(&self) -> Option<Uuid> {
        Uuid::parse_str(&self.sub).ok()
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct TokenPair {
    pub access: String,
    pub refresh: String,
}

pub struct JwtKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl JwtKeys {
    pub fn new(secret: &str, access_ttl: Duration, refresh_ttl: Duration) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            access_ttl,
            refresh_ttl,
        }
    }

    fn encode_claims(&self, claims: &Claims) -> PortResult<String> {
        encode(&Header::new(Algorithm::HS256), claims, &self.encoding)
            .map_err(|e| PortError::Unexpected(format!("token signing failed: {e}")))
    }

    fn issue(&self, user_id: Uuid, typ: TokenType, ttl: Duration) -> PortResult<String> {
        let now = Utc::now();
        self.encode_claims(&Claims {
            sub: user_id.to_string(),
            iat: now.timestamp(),
            exp: (now + ttl).timestamp(),
            typ: Some(typ.as_str().to_string()),
            email: None,
        })
    }

    pub fn issue_pair(&self, user_id: Uuid) -> PortResult<TokenPair> {
        Ok(TokenPair {
            access: self.issue(user_id, TokenType::Access, self.access_ttl)?,
            refresh: self.issue(user_id, TokenType::Refresh, self.refresh_ttl)?,
        })
    }

    fn decode(&self, token: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = LEEWAY_SECS;
        decode::<Claims>(token, &self.decoding, &validation).map(|data| data.claims)
    }

    /// Access tokens may omit `typ`; refresh and invite tokens must carry theirs.
    pub fn verify(&self, token: &str, expected: TokenType) -> Result<Claims, ApiError> {
        let claims = self
            .decode(token)
            .map_err(|_| ApiError::Unauthorized("invalid_token"))?;
        let typ_ok = match (&claims.typ, expected) {
            (None, TokenType::Access) => true,
            (Some(typ), _) => typ == expected.as_str(),
            (None, _) => false,
        };
        if !typ_ok {
            return Err(ApiError::Unauthorized("invalid_token"));
        }
        Ok(claims)
    }

    /// Resolves a bearer token to its user.
    pub fn access_user(&self, token: &str) -> Result<Uuid, ApiError> {
        self.verify(token, TokenType::Access)?
            .user_id()
            .ok_or(ApiError::Unauthorized("invalid_token"))
    }
}

impl InviteCodec for JwtKeys {
    fn sign(&self, claims: &InviteClaims) -> PortResult<String> {
        self.encode_claims(
            &Claims {
                sub: claims.coach_id.to_string(),
                iat: Utc::now().timestamp(),
                exp: claims.expires_at.timestamp(),
                typ: Some(TokenType::Invite.as_str().to_string()),
                email: Some(claims.email.clone()),
            },
        )
    }

    fn verify(&self, code: &str) -> PortResult<InviteClaims> {
        let invalid = || PortError::NotFound("invalid_code".to_string());
        let claims = self.decode(code).map_err(|e| match e.kind() {
            ErrorKind::ExpiredSignature => PortError::Gone("invite_expired".to_string()),
            _ => invalid(),
        })?;
        if claims.typ.as_deref() != Some(TokenType::Invite.as_str()) {
            return Err(invalid());
        }
        Ok(InviteClaims {
            coach_id: claims.user_id().ok_or_else(invalid)?,
            email: claims.email.unwrap_or_default(),
            expires_at: Utc
                .timestamp_opt(claims.exp, 0)
                .single()
                .ok_or_else(invalid)?,
        })
    }
}
