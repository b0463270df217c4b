use chrono::{DateTime, Utc};

use crate::notification::notification_models::NotificationKind;

use super::push_models::{DeliveryJob, PushContent};

const DATE_FORMAT: &str = "%b %-d, %Y %H:%M UTC";

fn format_date(at: &DateTime<Utc>) -> String {
    at.format(DATE_FORMAT).to_string()
}

/// Title and body shown on the device for a delivery job.
///
/// Jobs whose type is unknown, or whose payload does not match its type,
/// get the generic text.
pub fn render(job: &DeliveryJob) -> PushContent {
    let kind = match NotificationKind::from_parts(&job.kind, job.payload.clone()) {
        Ok(kind) => kind,
        Err(e) => {
            tracing::debug!("Rendering {} generically: {}", job.kind, e);
            return generic(&job.kind);
        }
    };

    let (title, body) = match kind {
        NotificationKind::FriendRequest { .. } => {
            ("New Friend Request", "You have a friend request".to_string())
        }
        NotificationKind::MatchInvite { scheduled_for, .. } => (
            "Match Invitation",
            format!("Match scheduled for {}", format_date(&scheduled_for)),
        ),
        NotificationKind::MatchInviteAccepted { match_id } => (
            "Match Confirmed",
            format!("Your match ({}) was confirmed", match_id),
        ),
        NotificationKind::MatchRescheduled {
            new_scheduled_for, ..
        } => (
            "Match Rescheduled",
            format!("Match rescheduled for {}", format_date(&new_scheduled_for)),
        ),
        NotificationKind::MatchCompleted { match_id } => (
            "Match Completed",
            format!(
                "Your match ({}) is now complete. You can leave a review.",
                match_id
            ),
        ),
        NotificationKind::MatchCancelled { match_id } => (
            "Match Cancelled",
            format!("Your match ({}) was cancelled.", match_id),
        ),
        NotificationKind::Message { preview, .. } => ("New Message", preview),
        other => return generic(other.type_name()),
    };

    PushContent {
        title: title.to_string(),
        body,
    }
}

fn generic(type_name: &str) -> PushContent {
    PushContent {
        title: "New notification".to_string(),
        body: format!("You have a new {} notification", type_name),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::{json, Value};
    use uuid::Uuid;

    fn job(kind: &str, payload: Value) -> DeliveryJob {
        DeliveryJob {
            notification_id: Uuid::new_v4(),
            recipient_id: Uuid::new_v4(),
            kind: kind.to_string(),
            payload,
        }
    }

    #[test]
    fn test_friend_request() {
        let content = render(&job(
            "FriendRequest",
            json!({ "requestId": Uuid::new_v4(), "from": Uuid::new_v4() }),
        ));
        assert_eq!(content.title, "New Friend Request");
        assert_eq!(content.body, "You have a friend request");
    }

    #[test]
    fn test_match_invite_formats_date() {
        let at = Utc.with_ymd_and_hms(2025, 3, 7, 18, 30, 0).unwrap();
        let content = render(&job(
            "MatchInvite",
            json!({ "matchId": Uuid::new_v4(), "scheduledFor": at }),
        ));
        assert_eq!(content.title, "Match Invitation");
        assert_eq!(content.body, "Match scheduled for Mar 7, 2025 18:30 UTC");
    }

    #[test]
    fn test_match_lifecycle_bodies_mention_match() {
        let match_id = Uuid::new_v4();
        let payload = json!({ "matchId": match_id });

        let confirmed = render(&job("MatchInviteAccepted", payload.clone()));
        assert_eq!(confirmed.title, "Match Confirmed");
        assert_eq!(confirmed.body, format!("Your match ({}) was confirmed", match_id));

        let completed = render(&job("MatchCompleted", payload.clone()));
        assert_eq!(completed.title, "Match Completed");
        assert_eq!(
            completed.body,
            format!("Your match ({}) is now complete. You can leave a review.", match_id)
        );

        let cancelled = render(&job("MatchCancelled", payload));
        assert_eq!(cancelled.title, "Match Cancelled");
        assert_eq!(cancelled.body, format!("Your match ({}) was cancelled.", match_id));
    }

    #[test]
    fn test_rescheduled_uses_new_date() {
        let at = Utc.with_ymd_and_hms(2025, 12, 24, 9, 5, 0).unwrap();
        let content = render(&job(
            "MatchRescheduled",
            json!({ "matchId": Uuid::new_v4(), "newScheduledFor": at }),
        ));
        assert_eq!(content.title, "Match Rescheduled");
        assert_eq!(content.body, "Match rescheduled for Dec 24, 2025 09:05 UTC");
    }

    #[test]
    fn test_message_uses_preview() {
        let content = render(&job(
            "Message",
            json!({ "messageId": Uuid::new_v4(), "preview": "see you at 6?" }),
        ));
        assert_eq!(content.title, "New Message");
        assert_eq!(content.body, "see you at 6?");
    }

    #[test]
    fn test_types_without_template_are_generic() {
        let content = render(&job(
            "Review",
            json!({ "reviewId": Uuid::new_v4(), "matchId": null }),
        ));
        assert_eq!(content.title, "New notification");
        assert_eq!(content.body, "You have a new Review notification");

        let content = render(&job("TournamentStarting", json!({})));
        assert_eq!(content.title, "New notification");
        assert_eq!(content.body, "You have a new TournamentStarting notification");
    }

    #[test]
    fn test_malformed_payload_is_generic() {
        let content = render(&job("MatchInvite", json!({ "matchId": "not-a-uuid" })));
        assert_eq!(content.title, "New notification");
        assert_eq!(content.body, "You have a new MatchInvite notification");
    }
}
