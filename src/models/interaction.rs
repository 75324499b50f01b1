// src/models/interaction.rs
// DOCUMENTATION: Interactions (calls, emails, meetings, notes) with follow-ups

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use validator::Validate;

use super::PageParams;

string_enum!(
    InteractionKind {
        Call => "call",
        Email => "email",
        Meeting => "meeting",
        Note => "note",
        Other => "other",
    }
);

string_enum!(
    /// Follow-up status; anything but `done` is an open action
    InteractionStatus {
        Todo => "todo",
        InProgress => "in_progress",
        Done => "done",
    }
);

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Interaction {
    pub id: Uuid,
    pub organisation_id: Option<Uuid>,
    #[sqlx(try_from = "String")]
    pub kind: InteractionKind,
    pub title: String,
    pub body: Option<String>,
    pub occurred_at: DateTime<Utc>,
    #[sqlx(try_from = "String")]
    pub status: InteractionStatus,
    pub created_by: String,
    pub assignee: Option<String>,
    pub next_action: Option<String>,
    pub next_action_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,

    /// People who took part, aggregated from interaction_participants
    pub participant_ids: Vec<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CreateInteractionRequest {
    pub organisation_id: Option<Uuid>,

    pub kind: InteractionKind,

    #[validate(length(min = 1, max = 255))]
    pub title: String,

    #[serde(default)]
    pub body: Option<String>,

    /// Defaults to now
    #[serde(default)]
    pub occurred_at: Option<DateTime<Utc>>,

    /// Defaults to `done`, or `todo` when a next action is given
    #[serde(default)]
    pub status: Option<InteractionStatus>,

    #[validate(length(min = 1, max = 255))]
    #[serde(default)]
    pub assignee: Option<String>,

    #[serde(default)]
    pub next_action: Option<String>,

    #[serde(default)]
    pub next_action_at: Option<DateTime<Utc>>,

    #[serde(default)]
    pub participant_ids: Vec<Uuid>,
}

impl CreateInteractionRequest {
    /// Status applied when the caller did not send one
    pub fn effective_status(&self) -> InteractionStatus {
        match self.status {
            Some(status) => status,
            None if self.next_action_at.is_some() || self.next_action.is_some() => {
                InteractionStatus::Todo
            }
            None => InteractionStatus::Done,
        }
    }
}

#[derive(Debug, Default, Serialize, Deserialize, Validate)]
pub struct UpdateInteractionRequest {
    pub organisation_id: Option<Uuid>,
    pub kind: Option<InteractionKind>,
    #[validate(length(min = 1, max = 255))]
    pub title: Option<String>,
    pub body: Option<String>,
    pub occurred_at: Option<DateTime<Utc>>,
    pub status: Option<InteractionStatus>,
    #[validate(length(min = 1, max = 255))]
    pub assignee: Option<String>,
    pub next_action: Option<String>,
    pub next_action_at: Option<DateTime<Utc>>,
    /// Replaces the participant list when present
    pub participant_ids: Option<Vec<Uuid>>,
}

/// Query parameters for GET /interactions
#[derive(Debug, Default, Deserialize)]
pub struct InteractionQuery {
    pub organisation_id: Option<Uuid>,
    pub person_id: Option<Uuid>,
    pub kind: Option<InteractionKind>,
    pub status: Option<InteractionStatus>,
    pub assignee: Option<String>,
    /// Lower bound on occurred_at (inclusive)
    pub from: Option<DateTime<Utc>>,
    /// Upper bound on occurred_at (inclusive)
    pub to: Option<DateTime<Utc>>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

impl InteractionQuery {
    pub fn page_params(&self) -> PageParams {
        PageParams::new(self.page, self.limit)
    }
}

/// Query parameters for GET /interactions/follow-ups
#[derive(Debug, Default, Deserialize)]
pub struct FollowUpQuery {
    /// Horizon in days from now (default 7)
    pub days: Option<i64>,
    pub assignee: Option<String>,
}
