// Append-only activity feed plus per-user notifications.
//
// Activity entries record what happened in a notebook in arrival order and
// are never edited or deleted. Notifications are addressed to a single
// recipient and carry a read flag that only ever flips false -> true.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use uuid::Uuid;

use redline_common::types::{ActivityEntry, AuthorKind, ChatRole, Notification};

use crate::error::CoreResult;
use crate::store::{column_ts, column_uuid};

pub struct NewActivityEntry {
    pub notebook_id: Uuid,
    pub content: String,
    pub author_kind: AuthorKind,
    pub author_name: Option<String>,
    pub role: ChatRole,
    pub created_at: DateTime<Utc>,
}

pub struct ActivityLog;

impl ActivityLog {
    /// Append an entry. The rowid doubles as the feed ordering key.
    pub fn append(conn: &Connection, entry: &NewActivityEntry) -> CoreResult<i64> {
        conn.execute(
            "INSERT INTO activity_entries \
             (notebook_id, content, author_kind, author_name, role, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                entry.notebook_id.to_string(),
                entry.content,
                entry.author_kind.as_str(),
                entry.author_name,
                entry.role.as_str(),
                entry.created_at.to_rfc3339(),
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Entries for a notebook, oldest first.
    pub fn query(conn: &Connection, notebook_id: Uuid, limit: u32) -> CoreResult<Vec<ActivityEntry>> {
        let mut stmt = conn.prepare(
            "SELECT id, notebook_id, content, author_kind, author_name, role, created_at \
             FROM activity_entries WHERE notebook_id = ?1 \
             ORDER BY id ASC LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![notebook_id.to_string(), limit], row_to_entry)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }
}

fn row_to_entry(row: &rusqlite::Row<'_>) -> rusqlite::Result<ActivityEntry> {
    let author_kind_raw: String = row.get(3)?;
    let role_raw: String = row.get(5)?;
    let author_kind = AuthorKind::parse(&author_kind_raw).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            3,
            rusqlite::types::Type::Text,
            format!("invalid author kind `{author_kind_raw}`").into(),
        )
    })?;
    let role = ChatRole::parse(&role_raw).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            5,
            rusqlite::types::Type::Text,
            format!("invalid chat role `{role_raw}`").into(),
        )
    })?;
    Ok(ActivityEntry {
        id: row.get(0)?,
        notebook_id: column_uuid(1, row.get(1)?)?,
        content: row.get(2)?,
        author_kind,
        author_name: row.get(4)?,
        role,
        created_at: column_ts(6, row.get(6)?)?,
    })
}

pub struct NewNotification {
    pub recipient_id: Uuid,
    pub kind: String,
    pub title: String,
    pub message: String,
    pub link: Option<String>,
    pub created_at: DateTime<Utc>,
}

pub struct NotificationFeed {
    pub notifications: Vec<Notification>,
    pub unread: u32,
}

pub struct Notifications;

impl Notifications {
    pub fn notify(conn: &Connection, notification: &NewNotification) -> CoreResult<Uuid> {
        let id = Uuid::new_v4();
        conn.execute(
            "INSERT INTO notifications \
             (id, recipient_id, kind, title, message, link, read, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0, ?7)",
            params![
                id.to_string(),
                notification.recipient_id.to_string(),
                notification.kind,
                notification.title,
                notification.message,
                notification.link,
                notification.created_at.to_rfc3339(),
            ],
        )?;
        Ok(id)
    }

    /// Most recent 100 notifications for a recipient plus their total
    /// unread count.
    pub fn list(conn: &Connection, recipient_id: Uuid) -> CoreResult<NotificationFeed> {
        let mut stmt = conn.prepare(
            "SELECT id, recipient_id, kind, title, message, link, read, created_at \
             FROM notifications WHERE recipient_id = ?1 \
             ORDER BY created_at DESC, id DESC LIMIT 100",
        )?;
        let rows = stmt.query_map(params![recipient_id.to_string()], row_to_notification)?;
        let notifications = rows.collect::<rusqlite::Result<Vec<_>>>()?;

        let unread: u32 = conn.query_row(
            "SELECT COUNT(*) FROM notifications WHERE recipient_id = ?1 AND read = 0",
            params![recipient_id.to_string()],
            |row| row.get(0),
        )?;

        Ok(NotificationFeed { notifications, unread })
    }

    /// Mark one notification read. Scoped to the recipient so one user
    /// cannot touch another's feed; already-read and unknown ids are no-ops.
    pub fn mark_read(conn: &Connection, recipient_id: Uuid, id: Uuid) -> CoreResult<bool> {
        let changed = conn.execute(
            "UPDATE notifications SET read = 1 \
             WHERE id = ?1 AND recipient_id = ?2 AND read = 0",
            params![id.to_string(), recipient_id.to_string()],
        )?;
        Ok(changed > 0)
    }

    pub fn mark_all_read(conn: &Connection, recipient_id: Uuid) -> CoreResult<u32> {
        let changed = conn.execute(
            "UPDATE notifications SET read = 1 WHERE recipient_id = ?1 AND read = 0",
            params![recipient_id.to_string()],
        )?;
        Ok(changed as u32)
    }
}

fn row_to_notification(row: &rusqlite::Row<'_>) -> rusqlite::Result<Notification> {
    Ok(Notification {
        id: column_uuid(0, row.get(0)?)?,
        recipient_id: column_uuid(1, row.get(1)?)?,
        kind: row.get(2)?,
        title: row.get(3)?,
        message: row.get(4)?,
        link: row.get(5)?,
        read: row.get(6)?,
        created_at: column_ts(7, row.get(7)?)?,
    })
}
