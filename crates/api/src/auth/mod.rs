//! Authentication module for the KnightCall admin console

#[cfg(test)]
mod edge_case_tests;
pub mod jwt;
pub mod middleware;
pub mod password;
pub mod sessions;
pub mod tokens;

pub use jwt::{Claims, JwtManager, TokenPair, TokenSubject, TokenType};
pub use middleware::{
    platform_access_allowed, require_auth, AuthError, AuthState, AuthUser, AUTH_COOKIE_NAME,
};
pub use password::{
    dummy_password_hash, generate_impossible_hash, hash_password, validate_password_strength,
    verify_password,
};
pub use sessions::SessionContext;
pub use tokens::{hash_token, ResetToken, RESET_TOKEN_TTL};
