use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::Utc;
use p256::ecdsa::{signature::Signer, Signature, SigningKey};
use thiserror::Error;
use url::Url;

use super::{encryption, push_models::PushSubscription};

/// VAPID JWTs are valid for 12 hours
const VAPID_TOKEN_LIFETIME_SECS: i64 = 12 * 60 * 60;

#[derive(Debug, Error)]
pub enum PushError {
    /// The push service no longer knows this subscription.
    #[error("subscription gone (HTTP {0})")]
    Gone(u16),

    #[error("delivery failed: {0}")]
    Delivery(String),

    #[error("encryption failed: {0}")]
    Encryption(String),

    #[error("VAPID error: {0}")]
    Vapid(String),
}

/// Application server identity presented to push services (RFC 8292)
#[derive(Debug, Clone)]
pub struct VapidConfig {
    pub public_key: String,
    pub private_key: String,
    /// `mailto:` or `https:` contact
    pub subject: String,
}

#[async_trait]
pub trait PushSender: Send + Sync {
    /// Deliver one already-serialized payload to one subscription.
    async fn send(&self, subscription: &PushSubscription, payload: &[u8]) -> Result<(), PushError>;
}

pub struct WebPushSender {
    client: reqwest::Client,
    signing_key: SigningKey,
    public_key: String,
    subject: String,
    ttl_seconds: u64,
}

impl WebPushSender {
    pub fn new(vapid: &VapidConfig, ttl_seconds: u64) -> Result<Self, PushError> {
        let key_bytes = URL_SAFE_NO_PAD
            .decode(vapid.private_key.trim())
            .map_err(|e| PushError::Vapid(format!("bad private key: {e}")))?;
        let signing_key =
            SigningKey::from_slice(&key_bytes).map_err(|e| PushError::Vapid(e.to_string()))?;

        let public_key = URL_SAFE_NO_PAD.encode(
            signing_key
                .verifying_key()
                .to_encoded_point(false)
                .as_bytes(),
        );
        if public_key != vapid.public_key.trim() {
            return Err(PushError::Vapid(
                "public key does not match private key".into(),
            ));
        }

        Ok(Self {
            client: reqwest::Client::new(),
            signing_key,
            public_key,
            subject: vapid.subject.clone(),
            ttl_seconds,
        })
    }

    fn vapid_jwt(&self, endpoint: &str) -> Result<String, PushError> {
        let audience = Url::parse(endpoint)
            .map_err(|e| PushError::Delivery(format!("bad endpoint URL: {e}")))?
            .origin()
            .ascii_serialization();

        let header = URL_SAFE_NO_PAD.encode(br#"{"typ":"JWT","alg":"ES256"}"#);
        let claims = serde_json::json!({
            "aud": audience,
            "exp": Utc::now().timestamp() + VAPID_TOKEN_LIFETIME_SECS,
            "sub": &self.subject,
        });
        let claims = URL_SAFE_NO_PAD.encode(claims.to_string().as_bytes());
        let signing_input = format!("{header}.{claims}");

        let signature: Signature = self.signing_key.sign(signing_input.as_bytes());
        Ok(format!(
            "{signing_input}.{}",
            URL_SAFE_NO_PAD.encode(signature.to_bytes())
        ))
    }
}

#[async_trait]
impl PushSender for WebPushSender {
    async fn send(&self, subscription: &PushSubscription, payload: &[u8]) -> Result<(), PushError> {
        let jwt = self.vapid_jwt(&subscription.endpoint)?;

        let p256dh = encryption::decode_key(&subscription.p256dh)
            .map_err(|e| PushError::Encryption(format!("bad p256dh: {e}")))?;
        let auth = encryption::decode_key(&subscription.auth)
            .map_err(|e| PushError::Encryption(format!("bad auth: {e}")))?;
        let body = encryption::encrypt(&p256dh, &auth, payload)?;

        let response = self
            .client
            .post(&subscription.endpoint)
            .header("Authorization", format!("vapid t={jwt},k={}", self.public_key))
            .header("TTL", self.ttl_seconds.to_string())
            .header("Content-Encoding", "aes128gcm")
            .header("Content-Type", "application/octet-stream")
            .body(body)
            .send()
            .await
            .map_err(|e| PushError::Delivery(e.to_string()))?;

        match response.status().as_u16() {
            200..=299 => Ok(()),
            status @ (404 | 410) => Err(PushError::Gone(status)),
            status => {
                let text = response.text().await.unwrap_or_default();
                Err(PushError::Delivery(format!(
                    "push service returned {status}: {text}"
                )))
            }
        }
    }
}
