pub mod identity;
pub mod jwt;

pub use identity::{IdentityVerifier, JwtIdentityVerifier};
