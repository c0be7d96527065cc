// Collaborator registry: who may act on a notebook.
//
// Humans are invited by email, start `pending`, and are bound to a user id
// exactly once when a matching verified identity first accesses the
// notebook. Agents are synthetic: created and removed by owner action,
// uniquely named per notebook while active. The owner row is created with
// the notebook and is immutable.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use redline_common::types::{
    AccessCapability, Actor, AuthorKind, ChatRole, Collaborator, CollaboratorKind,
    CollaboratorRole, CollaboratorStatus,
};

use crate::activity::{ActivityLog, NewActivityEntry};
use crate::error::{CoreError, CoreResult};
use crate::store::{column_ts, column_uuid};

pub struct CollaboratorRegistry;

impl CollaboratorRegistry {
    /// Insert the owner row for a freshly created notebook. Runs inside the
    /// notebook-creation transaction.
    pub(crate) fn insert_owner(
        conn: &Connection,
        notebook_id: Uuid,
        owner_id: Uuid,
        now: DateTime<Utc>,
    ) -> CoreResult<()> {
        conn.execute(
            "INSERT INTO collaborators \
             (id, notebook_id, user_id, email, kind, role, status, agent_name, agent_type, created_at) \
             VALUES (?1, ?2, ?3, NULL, 'human', 'owner', 'active', NULL, NULL, ?4)",
            params![
                Uuid::new_v4().to_string(),
                notebook_id.to_string(),
                owner_id.to_string(),
                now.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// Invite a human collaborator by email.
    ///
    /// Emails are stored lowercased so the duplicate check and later invite
    /// binding are case-insensitive. Removed collaborators do not block
    /// re-inviting.
    pub fn invite_human(
        conn: &mut Connection,
        notebook_id: Uuid,
        inviter: &Actor,
        email: &str,
        now: DateTime<Utc>,
    ) -> CoreResult<Collaborator> {
        let email = email.trim().to_ascii_lowercase();
        if email.is_empty() || !email.contains('@') {
            return Err(CoreError::validation("a valid email address is required"));
        }

        let capability = Self::access_check(conn, notebook_id, inviter.user_id)?;
        if !capability.granted() {
            return Err(CoreError::Forbidden("caller lacks access to this notebook"));
        }

        let existing: Option<String> = conn
            .query_row(
                "SELECT id FROM collaborators \
                 WHERE notebook_id = ?1 AND kind = 'human' AND email = ?2 \
                   AND status IN ('pending', 'active')",
                params![notebook_id.to_string(), email],
                |row| row.get(0),
            )
            .optional()?;
        if existing.is_some() {
            return Err(CoreError::Conflict("already invited or collaborator exists"));
        }

        let id = Uuid::new_v4();
        conn.execute(
            "INSERT INTO collaborators \
             (id, notebook_id, user_id, email, kind, role, status, agent_name, agent_type, created_at) \
             VALUES (?1, ?2, NULL, ?3, 'human', 'editor', 'pending', NULL, NULL, ?4)",
            params![id.to_string(), notebook_id.to_string(), email, now.to_rfc3339()],
        )?;

        Self::get(conn, id)
    }

    /// Bind a pending invite to the accessing identity.
    ///
    /// Matches the actor's verified emails against pending human rows,
    /// case-insensitively. Idempotent: if the actor is already an active
    /// collaborator the existing row is returned unchanged, and an actor
    /// with no matching invite yields `None`.
    pub fn bind_invite(
        conn: &mut Connection,
        notebook_id: Uuid,
        actor: &Actor,
        now: DateTime<Utc>,
    ) -> CoreResult<Option<Collaborator>> {
        let already_active: Option<String> = conn
            .query_row(
                "SELECT id FROM collaborators \
                 WHERE notebook_id = ?1 AND kind = 'human' AND status = 'active' \
                   AND user_id = ?2",
                params![notebook_id.to_string(), actor.user_id.to_string()],
                |row| row.get(0),
            )
            .optional()?;
        if let Some(raw_id) = already_active {
            let id = Uuid::parse_str(&raw_id)
                .map_err(|_| CoreError::InvalidState("corrupt collaborator id"))?;
            return Self::get(conn, id).map(Some);
        }

        for email in &actor.emails {
            let email = email.trim().to_ascii_lowercase();
            let pending: Option<String> = conn
                .query_row(
                    "SELECT id FROM collaborators \
                     WHERE notebook_id = ?1 AND kind = 'human' AND status = 'pending' \
                       AND email = ?2",
                    params![notebook_id.to_string(), email],
                    |row| row.get(0),
                )
                .optional()?;

            let Some(raw_id) = pending else { continue };
            let id = Uuid::parse_str(&raw_id)
                .map_err(|_| CoreError::InvalidState("corrupt collaborator id"))?;

            let tx = conn.transaction()?;
            tx.execute(
                "UPDATE collaborators SET user_id = ?1, status = 'active' WHERE id = ?2",
                params![actor.user_id.to_string(), id.to_string()],
            )?;
            ActivityLog::append(
                &tx,
                &NewActivityEntry {
                    notebook_id,
                    content: "A collaborator has joined the notebook.".to_string(),
                    author_kind: AuthorKind::System,
                    author_name: Some("System".to_string()),
                    role: ChatRole::System,
                    created_at: now,
                },
            )?;
            tx.commit()?;

            return Self::get(conn, id).map(Some);
        }

        Ok(None)
    }

    /// Add an agent persona to a notebook. Owner only; duplicate active
    /// names are rejected.
    pub fn add_agent(
        conn: &mut Connection,
        notebook_id: Uuid,
        owner: &Actor,
        agent_name: &str,
        agent_type: &str,
        role: CollaboratorRole,
        now: DateTime<Utc>,
    ) -> CoreResult<Collaborator> {
        let capability = Self::access_check(conn, notebook_id, owner.user_id)?;
        if !capability.is_owner {
            return Err(CoreError::Forbidden("only the owner can add agents"));
        }
        if agent_name.trim().is_empty() {
            return Err(CoreError::validation("agent name must not be empty"));
        }

        let duplicate: Option<String> = conn
            .query_row(
                "SELECT id FROM collaborators \
                 WHERE notebook_id = ?1 AND kind = 'agent' AND status = 'active' \
                   AND agent_name = ?2",
                params![notebook_id.to_string(), agent_name],
                |row| row.get(0),
            )
            .optional()?;
        if duplicate.is_some() {
            return Err(CoreError::Conflict("an active agent with this name already exists"));
        }

        let id = Uuid::new_v4();
        let tx = conn.transaction()?;
        tx.execute(
            "INSERT INTO collaborators \
             (id, notebook_id, user_id, email, kind, role, status, agent_name, agent_type, created_at) \
             VALUES (?1, ?2, NULL, NULL, 'agent', ?3, 'active', ?4, ?5, ?6)",
            params![
                id.to_string(),
                notebook_id.to_string(),
                role.as_str(),
                agent_name,
                agent_type,
                now.to_rfc3339(),
            ],
        )?;
        ActivityLog::append(
            &tx,
            &NewActivityEntry {
                notebook_id,
                content: format!("{agent_name} has entered the chat."),
                author_kind: AuthorKind::Agent,
                author_name: Some(agent_name.to_string()),
                role: ChatRole::System,
                created_at: now,
            },
        )?;
        tx.commit()?;

        Self::get(conn, id)
    }

    /// Remove an active agent by name. The agent's previously submitted
    /// proposals remain reviewable.
    pub fn remove_agent(
        conn: &mut Connection,
        notebook_id: Uuid,
        owner: &Actor,
        agent_name: &str,
        now: DateTime<Utc>,
    ) -> CoreResult<()> {
        let capability = Self::access_check(conn, notebook_id, owner.user_id)?;
        if !capability.is_owner {
            return Err(CoreError::Forbidden("only the owner can remove agents"));
        }

        let tx = conn.transaction()?;
        let removed = tx.execute(
            "UPDATE collaborators SET status = 'removed' \
             WHERE notebook_id = ?1 AND kind = 'agent' AND status = 'active' \
               AND agent_name = ?2",
            params![notebook_id.to_string(), agent_name],
        )?;
        if removed == 0 {
            return Err(CoreError::NotFound("no active agent with this name"));
        }
        ActivityLog::append(
            &tx,
            &NewActivityEntry {
                notebook_id,
                content: format!("{agent_name} has left the chat"),
                author_kind: AuthorKind::System,
                author_name: Some("System".to_string()),
                role: ChatRole::System,
                created_at: now,
            },
        )?;
        tx.commit()?;
        Ok(())
    }

    /// Look up an active agent collaborator by name.
    pub fn active_agent(
        conn: &Connection,
        notebook_id: Uuid,
        agent_name: &str,
    ) -> CoreResult<Collaborator> {
        let raw_id: Option<String> = conn
            .query_row(
                "SELECT id FROM collaborators \
                 WHERE notebook_id = ?1 AND kind = 'agent' AND status = 'active' \
                   AND agent_name = ?2",
                params![notebook_id.to_string(), agent_name],
                |row| row.get(0),
            )
            .optional()?;
        let raw_id = raw_id.ok_or(CoreError::NotFound("no active agent with this name"))?;
        let id = Uuid::parse_str(&raw_id)
            .map_err(|_| CoreError::InvalidState("corrupt collaborator id"))?;
        Self::get(conn, id)
    }

    /// Capability check: owner OR active human collaborator. Proposal
    /// authorship grants nothing.
    pub fn access_check(
        conn: &Connection,
        notebook_id: Uuid,
        user_id: Uuid,
    ) -> CoreResult<AccessCapability> {
        let owner_id: Option<String> = conn
            .query_row(
                "SELECT owner_id FROM notebooks WHERE id = ?1",
                params![notebook_id.to_string()],
                |row| row.get(0),
            )
            .optional()?;
        let owner_id = owner_id.ok_or(CoreError::NotFound("notebook not found"))?;
        let is_owner = owner_id == user_id.to_string();

        let is_active_collaborator: bool = conn.query_row(
            "SELECT EXISTS( \
                SELECT 1 FROM collaborators \
                WHERE notebook_id = ?1 AND kind = 'human' AND status = 'active' \
                  AND user_id = ?2)",
            params![notebook_id.to_string(), user_id.to_string()],
            |row| row.get(0),
        )?;

        Ok(AccessCapability { is_owner, is_active_collaborator })
    }

    pub fn list(conn: &Connection, notebook_id: Uuid) -> CoreResult<Vec<Collaborator>> {
        let mut stmt = conn.prepare(
            "SELECT id, notebook_id, user_id, email, kind, role, status, \
                    agent_name, agent_type, created_at \
             FROM collaborators WHERE notebook_id = ?1 \
             ORDER BY created_at ASC, id ASC",
        )?;
        let rows = stmt.query_map(params![notebook_id.to_string()], row_to_collaborator)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    fn get(conn: &Connection, id: Uuid) -> CoreResult<Collaborator> {
        conn.query_row(
            "SELECT id, notebook_id, user_id, email, kind, role, status, \
                    agent_name, agent_type, created_at \
             FROM collaborators WHERE id = ?1",
            params![id.to_string()],
            row_to_collaborator,
        )
        .optional()?
        .ok_or(CoreError::NotFound("collaborator not found"))
    }
}

/// `{agent_type}-Agent-{nnn}` with a random three-digit suffix.
pub fn generate_agent_name(agent_type: &str) -> String {
    use rand::Rng;
    let suffix: u16 = rand::thread_rng().gen_range(0..1000);
    format!("{agent_type}-Agent-{suffix}")
}

fn row_to_collaborator(row: &rusqlite::Row<'_>) -> rusqlite::Result<Collaborator> {
    let kind_raw: String = row.get(4)?;
    let role_raw: String = row.get(5)?;
    let status_raw: String = row.get(6)?;

    let kind = CollaboratorKind::parse(&kind_raw).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            4,
            rusqlite::types::Type::Text,
            format!("invalid collaborator kind `{kind_raw}`").into(),
        )
    })?;
    let role = CollaboratorRole::parse(&role_raw).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            5,
            rusqlite::types::Type::Text,
            format!("invalid collaborator role `{role_raw}`").into(),
        )
    })?;
    let status = CollaboratorStatus::parse(&status_raw).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            6,
            rusqlite::types::Type::Text,
            format!("invalid collaborator status `{status_raw}`").into(),
        )
    })?;

    let user_id = match row.get::<_, Option<String>>(2)? {
        Some(raw) => Some(column_uuid(2, raw)?),
        None => None,
    };

    Ok(Collaborator {
        id: column_uuid(0, row.get(0)?)?,
        notebook_id: column_uuid(1, row.get(1)?)?,
        user_id,
        email: row.get(3)?,
        kind,
        role,
        status,
        agent_name: row.get(7)?,
        agent_type: row.get(8)?,
        created_at: column_ts(9, row.get(9)?)?,
    })
}
