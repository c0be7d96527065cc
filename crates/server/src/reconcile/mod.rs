// Reconciliation: the owner's verdict on a proposal and the final-publish
// sweep.
//
// Review is at-most-once: the lifecycle transition is a status-guarded
// UPDATE inside the same transaction as the body write, so two racing
// reviews of one proposal cannot both apply.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use tracing::warn;
use uuid::Uuid;

use redline_common::lines::{line_count, replace_line};
use redline_common::types::{Actor, AuthorKind, ChangeProposal, ChatRole, Notebook};

use crate::activity::{ActivityLog, NewActivityEntry, NewNotification, Notifications};
use crate::error::{CoreError, CoreResult};
use crate::ledger::ProposalLedger;
use crate::registry::CollaboratorRegistry;
use crate::store::notebooks::NotebookStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReviewAction {
    Accept,
    Reject,
}

impl ReviewAction {
    pub fn as_str(self) -> &'static str {
        match self {
            ReviewAction::Accept => "accept",
            ReviewAction::Reject => "reject",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "accept" => Some(ReviewAction::Accept),
            "reject" => Some(ReviewAction::Reject),
            _ => None,
        }
    }

    fn past_tense(self) -> &'static str {
        match self {
            ReviewAction::Accept => "accepted",
            ReviewAction::Reject => "rejected",
        }
    }
}

pub struct Reconciler;

impl Reconciler {
    /// Accept or reject a pending proposal. Owner only.
    ///
    /// Accepting overwrites the targeted line with the proposed text. If
    /// the document has since shrunk below the target index the proposal
    /// is still marked accepted but the body is left untouched.
    pub fn review(
        conn: &mut Connection,
        proposal_id: Uuid,
        reviewer: &Actor,
        action: ReviewAction,
        now: DateTime<Utc>,
    ) -> CoreResult<ChangeProposal> {
        let proposal = ProposalLedger::get(conn, proposal_id)?;
        let capability =
            CollaboratorRegistry::access_check(conn, proposal.notebook_id, reviewer.user_id)?;
        if !capability.is_owner {
            return Err(CoreError::Forbidden("only the owner can review proposals"));
        }

        let next_status = match action {
            ReviewAction::Accept => "accepted",
            ReviewAction::Reject => "rejected",
        };

        let tx = conn.transaction()?;
        let transitioned = tx.execute(
            "UPDATE proposed_changes SET status = ?1, reviewed_at = ?2 \
             WHERE id = ?3 AND status = 'pending'",
            params![next_status, now.to_rfc3339(), proposal_id.to_string()],
        )?;
        if transitioned == 0 {
            return Err(CoreError::InvalidState("proposal has already been reviewed"));
        }

        if action == ReviewAction::Accept {
            let body: String = tx.query_row(
                "SELECT body FROM notebooks WHERE id = ?1",
                params![proposal.notebook_id.to_string()],
                |row| row.get(0),
            )?;
            match replace_line(&body, proposal.line_number as usize, &proposal.proposed_text) {
                Some(updated) => {
                    tx.execute(
                        "UPDATE notebooks SET body = ?1, updated_at = ?2 WHERE id = ?3",
                        params![updated, now.to_rfc3339(), proposal.notebook_id.to_string()],
                    )?;
                }
                None => {
                    warn!(
                        proposal_id = %proposal_id,
                        line_number = proposal.line_number,
                        lines = line_count(&body),
                        "accepted proposal targets a line past the end; body unchanged"
                    );
                }
            }
        }

        ActivityLog::append(
            &tx,
            &NewActivityEntry {
                notebook_id: proposal.notebook_id,
                content: format!(
                    "Owner {} suggestion for Line {}",
                    action.past_tense(),
                    proposal.line_number + 1
                ),
                author_kind: AuthorKind::System,
                author_name: Some("System".to_string()),
                role: ChatRole::System,
                created_at: now,
            },
        )?;

        if proposal.proposer_id != reviewer.user_id {
            Notifications::notify(
                &tx,
                &NewNotification {
                    recipient_id: proposal.proposer_id,
                    kind: "review".to_string(),
                    title: format!("Suggestion {}", action.past_tense()),
                    message: format!(
                        "Your suggestion for Line {} was {}",
                        proposal.line_number + 1,
                        action.past_tense()
                    ),
                    link: Some(format!("/notebooks/{}", proposal.notebook_id)),
                    created_at: now,
                },
            )?;
        }
        tx.commit()?;

        ProposalLedger::get(conn, proposal_id)
    }

    /// Replace the notebook body wholesale and retire every accepted
    /// proposal to `completed`. Pending and rejected proposals are left
    /// alone.
    pub fn publish_final(
        conn: &mut Connection,
        notebook_id: Uuid,
        owner: &Actor,
        final_text: &str,
        now: DateTime<Utc>,
    ) -> CoreResult<Notebook> {
        let capability = CollaboratorRegistry::access_check(conn, notebook_id, owner.user_id)?;
        if !capability.is_owner {
            return Err(CoreError::Forbidden("only the owner can publish the final version"));
        }

        let tx = conn.transaction()?;
        tx.execute(
            "UPDATE notebooks SET body = ?1, updated_at = ?2 WHERE id = ?3",
            params![final_text, now.to_rfc3339(), notebook_id.to_string()],
        )?;
        tx.execute(
            "UPDATE proposed_changes SET status = 'completed' \
             WHERE notebook_id = ?1 AND status = 'accepted'",
            params![notebook_id.to_string()],
        )?;
        ActivityLog::append(
            &tx,
            &NewActivityEntry {
                notebook_id,
                content: format!(
                    "Owner saved final edited version ({} lines)",
                    line_count(final_text)
                ),
                author_kind: AuthorKind::System,
                author_name: Some("System".to_string()),
                role: ChatRole::System,
                created_at: now,
            },
        )?;
        tx.commit()?;

        NotebookStore::get(conn, notebook_id)
    }
}
