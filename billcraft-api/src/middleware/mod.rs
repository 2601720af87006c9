mod auth;

pub use auth::{AccessTokenClaims, AuthContext};
