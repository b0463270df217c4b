use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::{types::Json, FromRow};
use utoipa::ToSchema;
use uuid::Uuid;

/// What happened, one payload shape per kind. Serialized as `{"type": .., "payload": {..}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(tag = "type", content = "payload")]
pub enum NotificationKind {
    #[serde(rename_all = "camelCase")]
    FriendRequest {
        request_id: Uuid,
        from: Uuid,
    },
    #[serde(rename_all = "camelCase")]
    FriendRequestAccepted {
        request_id: Uuid,
    },
    #[serde(rename_all = "camelCase")]
    MatchInvite {
        match_id: Uuid,
        scheduled_for: DateTime<Utc>,
    },
    #[serde(rename_all = "camelCase")]
    MatchInviteAccepted {
        match_id: Uuid,
    },
    #[serde(rename_all = "camelCase")]
    MatchRescheduled {
        match_id: Uuid,
        new_scheduled_for: DateTime<Utc>,
    },
    #[serde(rename_all = "camelCase")]
    MatchCompleted {
        match_id: Uuid,
    },
    #[serde(rename_all = "camelCase")]
    MatchCancelled {
        match_id: Uuid,
    },
    #[serde(rename_all = "camelCase")]
    Review {
        review_id: Uuid,
        match_id: Option<Uuid>,
    },
    #[serde(rename_all = "camelCase")]
    Message {
        message_id: Uuid,
        preview: String,
    },
}

impl NotificationKind {
    pub fn type_name(&self) -> &'static str {
        match self {
            NotificationKind::FriendRequest { .. } => "FriendRequest",
            NotificationKind::FriendRequestAccepted { .. } => "FriendRequestAccepted",
            NotificationKind::MatchInvite { .. } => "MatchInvite",
            NotificationKind::MatchInviteAccepted { .. } => "MatchInviteAccepted",
            NotificationKind::MatchRescheduled { .. } => "MatchRescheduled",
            NotificationKind::MatchCompleted { .. } => "MatchCompleted",
            NotificationKind::MatchCancelled { .. } => "MatchCancelled",
            NotificationKind::Review { .. } => "Review",
            NotificationKind::Message { .. } => "Message",
        }
    }

    /// Rebuild a kind from its stored type name and payload document.
    pub fn from_parts(type_name: &str, payload: Value) -> serde_json::Result<Self> {
        serde_json::from_value(serde_json::json!({
            "type": type_name,
            "payload": payload,
        }))
    }

    /// The payload document alone, without the type tag.
    pub fn payload(&self) -> Value {
        match serde_json::to_value(self) {
            Ok(Value::Object(mut map)) => map.remove("payload").unwrap_or(Value::Null),
            _ => Value::Null,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: Uuid,
    pub recipient_id: Uuid,
    pub actor_id: Option<Uuid>,
    #[serde(flatten)]
    pub kind: NotificationKind,
    pub read: bool,
    pub created_at: DateTime<Utc>,
}

/// Row layout of the `notifications` table.
#[derive(Debug, FromRow)]
pub struct NotificationRow {
    pub id: Uuid,
    pub recipient_id: Uuid,
    pub actor_id: Option<Uuid>,
    pub kind: String,
    pub payload: Json<Value>,
    pub read: bool,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<NotificationRow> for Notification {
    type Error = serde_json::Error;

    fn try_from(row: NotificationRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            recipient_id: row.recipient_id,
            actor_id: row.actor_id,
            kind: NotificationKind::from_parts(&row.kind, row.payload.0)?,
            read: row.read,
            created_at: row.created_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_kind_wire_shape() {
        let match_id = Uuid::new_v4();
        let kind = NotificationKind::MatchCompleted { match_id };

        assert_eq!(
            serde_json::to_value(&kind).unwrap(),
            json!({ "type": "MatchCompleted", "payload": { "matchId": match_id } })
        );
        assert_eq!(kind.payload(), json!({ "matchId": match_id }));
    }

    #[test]
    fn test_type_name_matches_serde_tag() {
        let kinds = [
            NotificationKind::FriendRequest { request_id: Uuid::new_v4(), from: Uuid::new_v4() },
            NotificationKind::FriendRequestAccepted { request_id: Uuid::new_v4() },
            NotificationKind::MatchInvite { match_id: Uuid::new_v4(), scheduled_for: Utc::now() },
            NotificationKind::MatchInviteAccepted { match_id: Uuid::new_v4() },
            NotificationKind::MatchRescheduled { match_id: Uuid::new_v4(), new_scheduled_for: Utc::now() },
            NotificationKind::MatchCompleted { match_id: Uuid::new_v4() },
            NotificationKind::MatchCancelled { match_id: Uuid::new_v4() },
            NotificationKind::Review { review_id: Uuid::new_v4(), match_id: None },
            NotificationKind::Message { message_id: Uuid::new_v4(), preview: "hi".into() },
        ];

        for kind in kinds {
            let value = serde_json::to_value(&kind).unwrap();
            assert_eq!(value["type"], kind.type_name());
            assert_eq!(NotificationKind::from_parts(kind.type_name(), kind.payload()).unwrap(), kind);
        }
    }

    #[test]
    fn test_unknown_type_does_not_parse() {
        assert!(NotificationKind::from_parts("TournamentStarted", json!({})).is_err());
    }

    #[test]
    fn test_notification_flattens_kind() {
        let notification = Notification {
            id: Uuid::new_v4(),
            recipient_id: Uuid::new_v4(),
            actor_id: None,
            kind: NotificationKind::FriendRequestAccepted { request_id: Uuid::new_v4() },
            read: false,
            created_at: Utc::now(),
        };

        let value = serde_json::to_value(&notification).unwrap();
        assert_eq!(value["type"], "FriendRequestAccepted");
        assert!(value["payload"]["requestId"].is_string());
        assert_eq!(value["read"], false);
    }
}
