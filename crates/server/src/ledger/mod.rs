// Proposal ledger: line-indexed edit suggestions awaiting owner review.
//
// A proposal captures the text the proposer saw (`original_text`) and the
// replacement they want (`proposed_text`) at a given zero-based line index.
// Submission is all-or-nothing per batch and validation runs before any
// row is written.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use redline_common::types::{
    Actor, AuthorKind, ChangeProposal, ChatRole, ProposalStatus, ProposedEdit,
};

use crate::activity::{ActivityLog, NewActivityEntry, NewNotification, Notifications};
use crate::error::{CoreError, CoreResult};
use crate::registry::CollaboratorRegistry;
use crate::store::{column_ts, column_uuid};

pub struct ProposalLedger;

impl ProposalLedger {
    /// Record a batch of proposed edits against a notebook.
    ///
    /// When `agent_name` is set the batch is attributed to that agent, which
    /// must be active on the notebook. Either way the calling user must hold
    /// access. The whole batch is validated up front and inserted in one
    /// transaction, so a bad edit leaves nothing behind.
    pub fn propose(
        conn: &mut Connection,
        notebook_id: Uuid,
        actor: &Actor,
        agent_name: Option<&str>,
        edits: &[ProposedEdit],
        now: DateTime<Utc>,
    ) -> CoreResult<Vec<ChangeProposal>> {
        if edits.is_empty() {
            return Err(CoreError::validation("at least one proposed edit is required"));
        }
        for edit in edits {
            if edit.proposed_text.trim().is_empty() {
                return Err(CoreError::validation("proposed text must not be empty"));
            }
        }

        let capability = CollaboratorRegistry::access_check(conn, notebook_id, actor.user_id)?;
        if !capability.granted() {
            return Err(CoreError::Forbidden("caller lacks access to this notebook"));
        }
        if let Some(name) = agent_name {
            CollaboratorRegistry::active_agent(conn, notebook_id, name)?;
        }

        let (owner_id, title): (String, String) = conn.query_row(
            "SELECT owner_id, title FROM notebooks WHERE id = ?1",
            params![notebook_id.to_string()],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        let owner_id = Uuid::parse_str(&owner_id)
            .map_err(|_| CoreError::InvalidState("corrupt notebook owner id"))?;

        let mut ids = Vec::with_capacity(edits.len());
        let tx = conn.transaction()?;
        for edit in edits {
            let id = Uuid::new_v4();
            tx.execute(
                "INSERT INTO proposed_changes \
                 (id, notebook_id, proposer_id, proposer_agent, line_number, \
                  original_text, proposed_text, reason, status, created_at, reviewed_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 'pending', ?9, NULL)",
                params![
                    id.to_string(),
                    notebook_id.to_string(),
                    actor.user_id.to_string(),
                    agent_name,
                    edit.line_number,
                    edit.original_text,
                    edit.proposed_text,
                    edit.reason,
                    now.to_rfc3339(),
                ],
            )?;
            ids.push(id);
        }

        let who = agent_name.unwrap_or("A collaborator");
        let noun = if edits.len() == 1 { "suggestion" } else { "suggestions" };
        ActivityLog::append(
            &tx,
            &NewActivityEntry {
                notebook_id,
                content: format!("{who} submitted {} {noun} for review", edits.len()),
                author_kind: if agent_name.is_some() {
                    AuthorKind::Agent
                } else {
                    AuthorKind::Human
                },
                author_name: Some(who.to_string()),
                role: ChatRole::Assistant,
                created_at: now,
            },
        )?;

        // The owner reviews proposals, so tell them, unless they proposed.
        if owner_id != actor.user_id {
            Notifications::notify(
                &tx,
                &NewNotification {
                    recipient_id: owner_id,
                    kind: "suggestion".to_string(),
                    title: "New suggestions".to_string(),
                    message: format!(
                        "{who} submitted {} {noun} for \"{title}\"",
                        edits.len()
                    ),
                    link: Some(format!("/notebooks/{notebook_id}")),
                    created_at: now,
                },
            )?;
        }
        tx.commit()?;

        ids.iter().map(|id| Self::get(conn, *id)).collect()
    }

    pub fn get(conn: &Connection, id: Uuid) -> CoreResult<ChangeProposal> {
        conn.query_row(
            "SELECT id, notebook_id, proposer_id, proposer_agent, line_number, \
                    original_text, proposed_text, reason, status, created_at, reviewed_at \
             FROM proposed_changes WHERE id = ?1",
            params![id.to_string()],
            row_to_proposal,
        )
        .optional()?
        .ok_or(CoreError::NotFound("proposal not found"))
    }

    /// Pending proposals for a notebook, ordered by target line.
    pub fn list_pending(conn: &Connection, notebook_id: Uuid) -> CoreResult<Vec<ChangeProposal>> {
        Self::list_filtered(conn, notebook_id, Some(ProposalStatus::Pending))
    }

    pub fn list_filtered(
        conn: &Connection,
        notebook_id: Uuid,
        status: Option<ProposalStatus>,
    ) -> CoreResult<Vec<ChangeProposal>> {
        let mut stmt = conn.prepare(
            "SELECT id, notebook_id, proposer_id, proposer_agent, line_number, \
                    original_text, proposed_text, reason, status, created_at, reviewed_at \
             FROM proposed_changes \
             WHERE notebook_id = ?1 AND (?2 IS NULL OR status = ?2) \
             ORDER BY line_number ASC, created_at ASC",
        )?;
        let rows = stmt.query_map(
            params![notebook_id.to_string(), status.map(|s| s.as_str())],
            row_to_proposal,
        )?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }
}

pub(crate) fn row_to_proposal(row: &rusqlite::Row<'_>) -> rusqlite::Result<ChangeProposal> {
    let status_raw: String = row.get(8)?;
    let status = ProposalStatus::parse(&status_raw).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            8,
            rusqlite::types::Type::Text,
            format!("invalid proposal status `{status_raw}`").into(),
        )
    })?;
    let reviewed_at = match row.get::<_, Option<String>>(10)? {
        Some(raw) => Some(column_ts(10, raw)?),
        None => None,
    };
    Ok(ChangeProposal {
        id: column_uuid(0, row.get(0)?)?,
        notebook_id: column_uuid(1, row.get(1)?)?,
        proposer_id: column_uuid(2, row.get(2)?)?,
        proposer_agent: row.get(3)?,
        line_number: row.get(4)?,
        original_text: row.get(5)?,
        proposed_text: row.get(6)?,
        reason: row.get(7)?,
        status,
        created_at: column_ts(9, row.get(9)?)?,
        reviewed_at,
    })
}
