// Core domain types shared across all Redline crates.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A notebook: a line-oriented summary body under collaborative review.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Notebook {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub title: String,
    /// Canonical form is the single string; the line sequence is a view.
    pub body: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Lifecycle of a proposed change.
///
/// `pending` → (`accepted` | `rejected`); `accepted` → `completed` once a
/// final version is published.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ProposalStatus {
    Pending,
    Accepted,
    Rejected,
    Completed,
}

impl ProposalStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Accepted => "accepted",
            Self::Rejected => "rejected",
            Self::Completed => "completed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(Self::Pending),
            "accepted" => Some(Self::Accepted),
            "rejected" => Some(Self::Rejected),
            "completed" => Some(Self::Completed),
            _ => None,
        }
    }
}

/// A single proposed replacement of one line, awaiting owner review.
///
/// `line_number` indexes the notebook's line sequence as it existed when the
/// proposal was created; it is not re-anchored if the document changes shape
/// before review. Immutable after creation except for `status`/`reviewed_at`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChangeProposal {
    pub id: Uuid,
    pub notebook_id: Uuid,
    pub proposer_id: Uuid,
    /// Explicit agent attribution when the proposal came from an agent
    /// persona. Never derived from the free-text `reason`.
    pub proposer_agent: Option<String>,
    pub line_number: u32,
    pub original_text: String,
    pub proposed_text: String,
    pub reason: Option<String>,
    pub status: ProposalStatus,
    pub created_at: DateTime<Utc>,
    pub reviewed_at: Option<DateTime<Utc>>,
}

/// One edit in a `propose` batch.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProposedEdit {
    pub line_number: u32,
    pub original_text: String,
    pub proposed_text: String,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CollaboratorKind {
    Human,
    Agent,
}

impl CollaboratorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Human => "human",
            Self::Agent => "agent",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "human" => Some(Self::Human),
            "agent" => Some(Self::Agent),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CollaboratorRole {
    Owner,
    Editor,
    Reviewer,
    Analyst,
    Admin,
}

impl CollaboratorRole {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Owner => "owner",
            Self::Editor => "editor",
            Self::Reviewer => "reviewer",
            Self::Analyst => "analyst",
            Self::Admin => "admin",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "owner" => Some(Self::Owner),
            "editor" => Some(Self::Editor),
            "reviewer" => Some(Self::Reviewer),
            "analyst" => Some(Self::Analyst),
            "admin" => Some(Self::Admin),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CollaboratorStatus {
    Pending,
    Active,
    Removed,
}

impl CollaboratorStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Active => "active",
            Self::Removed => "removed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(Self::Pending),
            "active" => Some(Self::Active),
            "removed" => Some(Self::Removed),
            _ => None,
        }
    }
}

/// Any actor with a registered relationship to a notebook.
///
/// Human collaborators start `pending` (identified only by email) and are
/// bound to a `user_id` exactly once. Agent collaborators are synthetic and
/// identified by `(notebook_id, agent_name)` while active.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Collaborator {
    pub id: Uuid,
    pub notebook_id: Uuid,
    pub user_id: Option<Uuid>,
    pub email: Option<String>,
    pub kind: CollaboratorKind,
    pub role: CollaboratorRole,
    pub status: CollaboratorStatus,
    pub agent_name: Option<String>,
    pub agent_type: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AuthorKind {
    Human,
    Agent,
    System,
}

impl AuthorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Human => "human",
            Self::Agent => "agent",
            Self::System => "system",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "human" => Some(Self::Human),
            "agent" => Some(Self::Agent),
            "system" => Some(Self::System),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ChatRole {
    User,
    Assistant,
    System,
}

impl ChatRole {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::System => "system",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "user" => Some(Self::User),
            "assistant" => Some(Self::Assistant),
            "system" => Some(Self::System),
            _ => None,
        }
    }
}

/// An immutable log record rendered as chat history.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ActivityEntry {
    pub id: i64,
    pub notebook_id: Uuid,
    pub content: String,
    pub author_kind: AuthorKind,
    pub author_name: Option<String>,
    pub role: ChatRole,
    pub created_at: DateTime<Utc>,
}

/// A per-user notification. Mutated only to flip `read`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Notification {
    pub id: Uuid,
    pub recipient_id: Uuid,
    pub kind: String,
    pub title: String,
    pub message: String,
    pub link: Option<String>,
    pub read: bool,
    pub created_at: DateTime<Utc>,
}

/// The resolved caller identity, threaded explicitly into every core
/// operation. Never read from ambient request context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    pub user_id: Uuid,
    /// Verified email addresses, used only to bind pending invites.
    pub emails: Vec<String>,
}

impl Actor {
    pub fn new(user_id: Uuid) -> Self {
        Self { user_id, emails: Vec::new() }
    }

    pub fn with_email(user_id: Uuid, email: impl Into<String>) -> Self {
        Self { user_id, emails: vec![email.into()] }
    }
}

/// Capability returned by the registry's access check.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct AccessCapability {
    pub is_owner: bool,
    pub is_active_collaborator: bool,
}

impl AccessCapability {
    pub fn granted(self) -> bool {
        self.is_owner || self.is_active_collaborator
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips_through_strings() {
        for status in [
            ProposalStatus::Pending,
            ProposalStatus::Accepted,
            ProposalStatus::Rejected,
            ProposalStatus::Completed,
        ] {
            assert_eq!(ProposalStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(ProposalStatus::parse("archived"), None);
    }

    #[test]
    fn collaborator_enums_round_trip() {
        for kind in [CollaboratorKind::Human, CollaboratorKind::Agent] {
            assert_eq!(CollaboratorKind::parse(kind.as_str()), Some(kind));
        }
        for status in
            [CollaboratorStatus::Pending, CollaboratorStatus::Active, CollaboratorStatus::Removed]
        {
            assert_eq!(CollaboratorStatus::parse(status.as_str()), Some(status));
        }
        for role in [
            CollaboratorRole::Owner,
            CollaboratorRole::Editor,
            CollaboratorRole::Reviewer,
            CollaboratorRole::Analyst,
            CollaboratorRole::Admin,
        ] {
            assert_eq!(CollaboratorRole::parse(role.as_str()), Some(role));
        }
    }

    #[test]
    fn access_capability_grants_for_either_relationship() {
        assert!(AccessCapability { is_owner: true, is_active_collaborator: false }.granted());
        assert!(AccessCapability { is_owner: false, is_active_collaborator: true }.granted());
        assert!(!AccessCapability { is_owner: false, is_active_collaborator: false }.granted());
    }
}
