// Notebook CRUD.
//
// A notebook's body is a single string; every save replaces the whole string
// atomically and bumps `updated_at`. Creation inserts the owner collaborator
// row in the same transaction, so a notebook can never exist without exactly
// one owner.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use redline_common::types::{Actor, Notebook};

use crate::error::{CoreError, CoreResult};
use crate::registry::CollaboratorRegistry;

use super::{column_ts, column_uuid};

pub struct NotebookStore;

impl NotebookStore {
    /// Create a notebook together with its immutable owner collaborator row.
    pub fn create(
        conn: &mut Connection,
        owner: &Actor,
        title: &str,
        body: &str,
        now: DateTime<Utc>,
    ) -> CoreResult<Notebook> {
        if title.trim().is_empty() {
            return Err(CoreError::validation("notebook title must not be empty"));
        }

        let id = Uuid::new_v4();
        let tx = conn.transaction()?;
        tx.execute(
            "INSERT INTO notebooks (id, owner_id, title, body, created_at, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                id.to_string(),
                owner.user_id.to_string(),
                title,
                body,
                now.to_rfc3339(),
                now.to_rfc3339(),
            ],
        )?;
        CollaboratorRegistry::insert_owner(&tx, id, owner.user_id, now)?;
        tx.commit()?;

        Ok(Notebook {
            id,
            owner_id: owner.user_id,
            title: title.to_string(),
            body: body.to_string(),
            created_at: now,
            updated_at: now,
        })
    }

    pub fn get(conn: &Connection, id: Uuid) -> CoreResult<Notebook> {
        conn.query_row(
            "SELECT id, owner_id, title, body, created_at, updated_at \
             FROM notebooks WHERE id = ?1",
            params![id.to_string()],
            row_to_notebook,
        )
        .optional()?
        .ok_or(CoreError::NotFound("notebook not found"))
    }

    /// Notebooks the user owns plus those they actively collaborate on,
    /// newest first.
    pub fn list_for(conn: &Connection, user_id: Uuid) -> CoreResult<Vec<Notebook>> {
        let mut stmt = conn.prepare(
            "SELECT DISTINCT n.id, n.owner_id, n.title, n.body, n.created_at, n.updated_at \
             FROM notebooks n \
             LEFT JOIN collaborators c ON c.notebook_id = n.id \
             WHERE n.owner_id = ?1 \
                OR (c.user_id = ?1 AND c.kind = 'human' AND c.status = 'active') \
             ORDER BY n.updated_at DESC",
        )?;
        let rows = stmt.query_map(params![user_id.to_string()], row_to_notebook)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Replace the whole body. Callable by the owner or an active
    /// collaborator.
    pub fn save_body(
        conn: &mut Connection,
        id: Uuid,
        actor: &Actor,
        body: &str,
        now: DateTime<Utc>,
    ) -> CoreResult<Notebook> {
        let capability = CollaboratorRegistry::access_check(conn, id, actor.user_id)?;
        if !capability.granted() {
            return Err(CoreError::Forbidden("caller lacks access to this notebook"));
        }

        let tx = conn.transaction()?;
        tx.execute(
            "UPDATE notebooks SET body = ?1, updated_at = ?2 WHERE id = ?3",
            params![body, now.to_rfc3339(), id.to_string()],
        )?;
        tx.commit()?;

        Self::get(conn, id)
    }

    /// Delete a notebook. Owner only; proposals, collaborators, and activity
    /// entries cascade.
    pub fn delete(conn: &mut Connection, id: Uuid, actor: &Actor) -> CoreResult<()> {
        let notebook = Self::get(conn, id)?;
        if notebook.owner_id != actor.user_id {
            return Err(CoreError::Forbidden("only the owner can delete a notebook"));
        }

        let tx = conn.transaction()?;
        tx.execute("DELETE FROM notebooks WHERE id = ?1", params![id.to_string()])?;
        tx.commit()?;
        Ok(())
    }
}

fn row_to_notebook(row: &rusqlite::Row<'_>) -> rusqlite::Result<Notebook> {
    Ok(Notebook {
        id: column_uuid(0, row.get(0)?)?,
        owner_id: column_uuid(1, row.get(1)?)?,
        title: row.get(2)?,
        body: row.get(3)?,
        created_at: column_ts(4, row.get(4)?)?,
        updated_at: column_ts(5, row.get(5)?)?,
    })
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use uuid::Uuid;

    use redline_common::types::{Actor, CollaboratorRole, CollaboratorStatus};

    use super::NotebookStore;
    use crate::error::CoreError;
    use crate::registry::CollaboratorRegistry;
    use crate::store::db::Db;

    fn ts(seconds: i64) -> chrono::DateTime<Utc> {
        Utc.timestamp_opt(seconds, 0).single().expect("timestamp should be valid")
    }

    #[test]
    fn create_yields_exactly_one_owner_collaborator() {
        let db = Db::open_in_memory().expect("db should open");
        let mut conn = db.lock();
        let owner = Actor::new(Uuid::new_v4());
        let now = ts(1_700_000_000);

        let notebook = NotebookStore::create(&mut conn, &owner, "Paper review", "a\nb", now)
            .expect("create should succeed");

        let collaborators =
            CollaboratorRegistry::list(&conn, notebook.id).expect("list should succeed");
        let owners: Vec<_> =
            collaborators.iter().filter(|c| c.role == CollaboratorRole::Owner).collect();
        assert_eq!(owners.len(), 1);
        assert_eq!(owners[0].user_id, Some(owner.user_id));
        assert_eq!(owners[0].status, CollaboratorStatus::Active);
    }

    #[test]
    fn create_rejects_blank_title() {
        let db = Db::open_in_memory().expect("db should open");
        let mut conn = db.lock();
        let owner = Actor::new(Uuid::new_v4());

        let result = NotebookStore::create(&mut conn, &owner, "   ", "", ts(1_700_000_000));
        assert!(matches!(result, Err(CoreError::Validation(_))));
    }

    #[test]
    fn get_unknown_notebook_is_not_found() {
        let db = Db::open_in_memory().expect("db should open");
        let conn = db.lock();

        let result = NotebookStore::get(&conn, Uuid::new_v4());
        assert!(matches!(result, Err(CoreError::NotFound(_))));
    }

    #[test]
    fn save_body_replaces_whole_string_atomically() {
        let db = Db::open_in_memory().expect("db should open");
        let mut conn = db.lock();
        let owner = Actor::new(Uuid::new_v4());
        let created = ts(1_700_000_000);
        let saved_at = ts(1_700_000_100);

        let notebook = NotebookStore::create(&mut conn, &owner, "Draft", "old\nbody", created)
            .expect("create should succeed");
        let updated =
            NotebookStore::save_body(&mut conn, notebook.id, &owner, "new\nbody\nhere", saved_at)
                .expect("save should succeed");

        assert_eq!(updated.body, "new\nbody\nhere");
        assert_eq!(updated.updated_at, saved_at);
    }

    #[test]
    fn save_body_requires_access() {
        let db = Db::open_in_memory().expect("db should open");
        let mut conn = db.lock();
        let owner = Actor::new(Uuid::new_v4());
        let stranger = Actor::new(Uuid::new_v4());

        let notebook = NotebookStore::create(&mut conn, &owner, "Draft", "x", ts(1_700_000_000))
            .expect("create should succeed");
        let result =
            NotebookStore::save_body(&mut conn, notebook.id, &stranger, "y", ts(1_700_000_100));

        assert!(matches!(result, Err(CoreError::Forbidden(_))));
        let unchanged = NotebookStore::get(&conn, notebook.id).expect("get should succeed");
        assert_eq!(unchanged.body, "x");
    }

    #[test]
    fn delete_is_owner_only_and_cascades() {
        let db = Db::open_in_memory().expect("db should open");
        let mut conn = db.lock();
        let owner = Actor::new(Uuid::new_v4());
        let stranger = Actor::new(Uuid::new_v4());
        let now = ts(1_700_000_000);

        let notebook = NotebookStore::create(&mut conn, &owner, "Draft", "x", now)
            .expect("create should succeed");

        let denied = NotebookStore::delete(&mut conn, notebook.id, &stranger);
        assert!(matches!(denied, Err(CoreError::Forbidden(_))));

        NotebookStore::delete(&mut conn, notebook.id, &owner).expect("delete should succeed");
        let orphans: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM collaborators WHERE notebook_id = ?1",
                [notebook.id.to_string()],
                |row| row.get(0),
            )
            .expect("count should succeed");
        assert_eq!(orphans, 0);
    }

    #[test]
    fn list_for_includes_owned_and_active_collaborations() {
        let db = Db::open_in_memory().expect("db should open");
        let mut conn = db.lock();
        let owner = Actor::new(Uuid::new_v4());
        let invitee = Actor::with_email(Uuid::new_v4(), "collab@example.com");
        let now = ts(1_700_000_000);

        let owned = NotebookStore::create(&mut conn, &owner, "Mine", "x", now)
            .expect("create should succeed");
        let shared = NotebookStore::create(&mut conn, &owner, "Shared", "y", ts(1_700_000_050))
            .expect("create should succeed");
        CollaboratorRegistry::invite_human(
            &mut conn,
            shared.id,
            &owner,
            "collab@example.com",
            ts(1_700_000_060),
        )
        .expect("invite should succeed");
        CollaboratorRegistry::bind_invite(&mut conn, shared.id, &invitee, ts(1_700_000_070))
            .expect("bind should succeed");

        let for_owner = NotebookStore::list_for(&conn, owner.user_id).expect("list should succeed");
        assert_eq!(for_owner.len(), 2);

        let for_invitee =
            NotebookStore::list_for(&conn, invitee.user_id).expect("list should succeed");
        assert_eq!(for_invitee.len(), 1);
        assert_eq!(for_invitee[0].id, shared.id);
        let _ = owned;
    }
}
