use std::collections::HashSet;

use rusqlite::{params, Connection};
use serde::Serialize;
use time::OffsetDateTime;

use crate::error::Result;

/// Deliver a broadcast, collapsing it into an existing notification when the
/// wording is identical and some stored recipient set already covers every
/// requested recipient. Staff re-trigger the same message against overlapping
/// rosters often; the merge keeps the notification list from bloating while
/// still tracking distinct per-event recipient lists.
pub fn notify(conn: &Connection, content: &str, recipient_ids: &[i64]) -> Result<()> {
    let mut stmt = conn.prepare("SELECT id FROM notifications WHERE content = ?1 ORDER BY id")?;
    let candidates = stmt
        .query_map([content], |row| row.get::<_, i64>(0))?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    for notification_id in candidates {
        let stored = recipient_set(conn, notification_id)?;
        if recipient_ids.iter().all(|id| stored.contains(id)) {
            // covered already: refresh the timestamp, leave recipients alone
            let now = OffsetDateTime::now_utc().unix_timestamp();
            conn.execute(
                "UPDATE notifications SET updated_at = ?2 WHERE id = ?1",
                params![notification_id, now],
            )?;
            return Ok(());
        }
    }

    record(conn, content, recipient_ids)?;
    Ok(())
}

/// Insert a fresh notification with exactly the given recipients, bypassing
/// the merge logic. The message-send path always uses this.
pub fn record(conn: &Connection, content: &str, recipient_ids: &[i64]) -> Result<i64> {
    let now = OffsetDateTime::now_utc().unix_timestamp();
    conn.execute(
        "INSERT INTO notifications (content, created_at, updated_at) VALUES (?1, ?2, ?2)",
        params![content, now],
    )?;
    let notification_id = conn.last_insert_rowid();
    for user_id in recipient_ids {
        conn.execute(
            "INSERT OR IGNORE INTO notification_recipients (notification_id, user_id) VALUES (?1, ?2)",
            params![notification_id, user_id],
        )?;
    }
    Ok(notification_id)
}

fn recipient_set(conn: &Connection, notification_id: i64) -> Result<HashSet<i64>> {
    let mut stmt =
        conn.prepare("SELECT user_id FROM notification_recipients WHERE notification_id = ?1")?;
    let set = stmt
        .query_map([notification_id], |row| row.get::<_, i64>(0))?
        .collect::<std::result::Result<HashSet<_>, _>>()?;
    Ok(set)
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationView {
    pub notification_id: i64,
    pub content: String,
    pub updated_at: i64,
}

pub fn list_for_user(conn: &Connection, user_id: i64) -> Result<Vec<NotificationView>> {
    let mut stmt = conn.prepare(
        "SELECT n.id, n.content, n.updated_at FROM notifications n \
         JOIN notification_recipients r ON r.notification_id = n.id \
         WHERE r.user_id = ?1 ORDER BY n.updated_at DESC, n.id DESC",
    )?;
    let out = stmt
        .query_map([user_id], |row| {
            Ok(NotificationView {
                notification_id: row.get(0)?,
                content: row.get(1)?,
                updated_at: row.get(2)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(out)
}

/// Detach the user from everything addressed to them; notifications left with
/// no recipients are removed.
pub fn clear_for_user(conn: &mut Connection, user_id: i64) -> Result<()> {
    let tx = conn.transaction()?;
    tx.execute(
        "DELETE FROM notification_recipients WHERE user_id = ?1",
        [user_id],
    )?;
    tx.execute(
        "DELETE FROM notifications WHERE id NOT IN (SELECT notification_id FROM notification_recipients)",
        [],
    )?;
    tx.commit()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::users::test_support::seed_user;

    fn count(conn: &Connection) -> i64 {
        conn.query_row("SELECT COUNT(*) FROM notifications", [], |row| row.get(0))
            .unwrap()
    }

    #[test]
    fn subset_recipients_merge() {
        let conn = db::init_db(":memory:").unwrap();
        let a = seed_user(&conn, "a", "", 1);
        let b = seed_user(&conn, "b", "", 1);
        notify(&conn, "project allocated", &[a, b]).unwrap();
        assert_eq!(count(&conn), 1);
        // covered subset: merged, recipients untouched
        notify(&conn, "project allocated", &[a]).unwrap();
        assert_eq!(count(&conn), 1);
        let recipients = recipient_set(&conn, 1).unwrap();
        assert_eq!(recipients.len(), 2);
    }

    #[test]
    fn uncovered_recipient_creates_new_row() {
        let conn = db::init_db(":memory:").unwrap();
        let a = seed_user(&conn, "a", "", 1);
        let b = seed_user(&conn, "b", "", 1);
        let c = seed_user(&conn, "c", "", 1);
        notify(&conn, "project allocated", &[a, b]).unwrap();
        notify(&conn, "project allocated", &[a, c]).unwrap();
        assert_eq!(count(&conn), 2);
        // different wording never merges
        notify(&conn, "allocation cancelled", &[a]).unwrap();
        assert_eq!(count(&conn), 3);
    }

    #[test]
    fn record_always_inserts() {
        let conn = db::init_db(":memory:").unwrap();
        let a = seed_user(&conn, "a", "", 1);
        record(&conn, "new message", &[a]).unwrap();
        record(&conn, "new message", &[a]).unwrap();
        assert_eq!(count(&conn), 2);
        assert_eq!(list_for_user(&conn, a).unwrap().len(), 2);
    }

    #[test]
    fn clear_removes_orphans() {
        let mut conn = db::init_db(":memory:").unwrap();
        let a = seed_user(&conn, "a", "", 1);
        let b = seed_user(&conn, "b", "", 1);
        record(&conn, "for both", &[a, b]).unwrap();
        record(&conn, "only a", &[a]).unwrap();
        clear_for_user(&mut conn, a).unwrap();
        assert_eq!(list_for_user(&conn, a).unwrap().len(), 0);
        assert_eq!(list_for_user(&conn, b).unwrap().len(), 1);
        assert_eq!(count(&conn), 1);
    }
}
