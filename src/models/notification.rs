// src/models/notification.rs
// DOCUMENTATION: In-app notifications, persisted and streamed live

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use validator::Validate;

use super::PageParams;

/// Recipient that every connected client receives
pub const BROADCAST_RECIPIENT: &str = "all";

string_enum!(
    NotificationKind {
        Assignment => "assignment",
        Mandate => "mandate",
        Campaign => "campaign",
        Autofill => "autofill",
        Compliance => "compliance",
        System => "system",
    }
);

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Notification {
    pub id: Uuid,
    pub recipient: String,
    #[sqlx(try_from = "String")]
    pub kind: NotificationKind,
    pub title: String,
    pub message: Option<String>,
    pub link: Option<String>,
    pub resource_type: Option<String>,
    pub resource_id: Option<Uuid>,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
    pub read_at: Option<DateTime<Utc>>,
}

impl Notification {
    /// Whether a stream opened by `recipient` should receive this notification
    pub fn is_visible_to(&self, recipient: &str) -> bool {
        self.recipient == BROADCAST_RECIPIENT || self.recipient.eq_ignore_ascii_case(recipient)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CreateNotificationRequest {
    #[validate(length(min = 1, max = 255))]
    pub recipient: String,

    pub kind: NotificationKind,

    #[validate(length(min = 1, max = 255))]
    pub title: String,

    #[serde(default)]
    pub message: Option<String>,

    #[serde(default)]
    pub link: Option<String>,

    #[serde(default)]
    pub resource_type: Option<String>,

    #[serde(default)]
    pub resource_id: Option<Uuid>,
}

#[derive(Debug, Default, Deserialize)]
pub struct NotificationQuery {
    /// Defaults to the calling actor
    pub recipient: Option<String>,
    #[serde(default)]
    pub unread_only: bool,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

impl NotificationQuery {
    pub fn page_params(&self) -> PageParams {
        PageParams::new(self.page, self.limit)
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct StreamQuery {
    pub recipient: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct UnreadCount {
    pub recipient: String,
    pub unread: i64,
}
