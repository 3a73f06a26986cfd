//! Authentication: JWT validation, the `require_auth` middleware and the
//! `AuthUser` extractor.

pub mod extractor;
pub mod jwt;
pub mod middleware;
