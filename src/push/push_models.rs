use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::notification::notification_models::Notification;

/// Client-side encryption material for one push endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate, ToSchema)]
pub struct SubscriptionKeys {
    #[validate(length(min = 1))]
    pub p256dh: String,
    #[validate(length(min = 1))]
    pub auth: String,
}

/// A registered push endpoint. A user has one per device, unique by endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct PushSubscription {
    pub id: Uuid,
    pub user_id: Uuid,
    pub endpoint: String,
    pub p256dh: String,
    pub auth: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Queue payload for one notification's push fan-out.
///
/// `type` stays a plain string so jobs written by newer producers still render.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryJob {
    pub notification_id: Uuid,
    pub recipient_id: Uuid,
    #[serde(rename = "type")]
    pub kind: String,
    pub payload: Value,
}

impl From<&Notification> for DeliveryJob {
    fn from(notification: &Notification) -> Self {
        Self {
            notification_id: notification.id,
            recipient_id: notification.recipient_id,
            kind: notification.kind.type_name().to_string(),
            payload: notification.kind.payload(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PushContent {
    pub title: String,
    pub body: String,
}

/// JSON document delivered to the service worker
#[derive(Debug, Serialize)]
pub struct PushEnvelope<'a> {
    pub title: &'a str,
    pub body: &'a str,
    pub data: PushEnvelopeData<'a>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PushEnvelopeData<'a> {
    pub notification_id: Uuid,
    #[serde(rename = "type")]
    pub kind: &'a str,
    pub payload: &'a Value,
}

impl<'a> PushEnvelope<'a> {
    pub fn new(content: &'a PushContent, job: &'a DeliveryJob) -> Self {
        Self {
            title: &content.title,
            body: &content.body,
            data: PushEnvelopeData {
                notification_id: job.notification_id,
                kind: &job.kind,
                payload: &job.payload,
            },
        }
    }
}
