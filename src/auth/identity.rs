use async_trait::async_trait;
use uuid::Uuid;

use crate::error::Result;

use super::jwt::user_id_from_token;

/// Resolves a bearer credential to the user identity it belongs to.
#[async_trait]
pub trait IdentityVerifier: Send + Sync {
    async fn verify(&self, token: &str) -> Result<Uuid>;
}

/// Verifies HS256 tokens signed with the shared account-service secret.
pub struct JwtIdentityVerifier {
    secret: String,
}

impl JwtIdentityVerifier {
    pub fn new(secret: String) -> Self {
        Self { secret }
    }
}

#[async_trait]
impl IdentityVerifier for JwtIdentityVerifier {
    async fn verify(&self, token: &str) -> Result<Uuid> {
        user_id_from_token(token, &self.secret)
    }
}
