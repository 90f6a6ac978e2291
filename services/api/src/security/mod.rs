//! services/api/src/security/mod.rs
//!
//! Concrete adapters for the core security ports: argon2 password hashing and HS256 tokens.

pub mod jwt;
pub mod password;

pub use jwt::{Claims, JwtKeys, TokenPair, TokenType};
pub use password::Argon2Hasher;
