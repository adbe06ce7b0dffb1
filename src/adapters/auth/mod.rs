//! Authentication adapters.
//!
//! Implementations of the `IdentityVerifier` port:
//!
//! - `jwt` - HS256 tokens signed by the upstream authentication service

mod jwt;

pub use jwt::{Claims, JwtIdentityVerifier};
