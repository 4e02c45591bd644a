use rusqlite::{params, Connection};
use serde::Deserialize;

use crate::error::{Error, Result};
use crate::{notifications, teams};

/// Notification text plus explicit addressees, carried in allocation and
/// message-send requests. Allocation ignores `to` and notifies the roster.
#[derive(Debug, Clone, Deserialize)]
pub struct NotificationRequest {
    pub content: String,
    #[serde(default)]
    pub to: Vec<i64>,
}

/// Assign a project to a team and notify every member. The assignment
/// overwrites any prior allocation; there is no optimistic-concurrency check,
/// so concurrent allocate/reject on one team is last-write-wins.
///
/// The team update and the notification run in one transaction. The system
/// this replaces committed the team update even when the notification step
/// failed; that gap is closed here.
pub fn allocate(
    conn: &mut Connection,
    team_id: i64,
    project_id: i64,
    notification: &NotificationRequest,
) -> Result<()> {
    teams::require(conn, team_id)?;
    let members = teams::member_ids(conn, team_id)?;
    let tx = conn.transaction()?;
    tx.execute(
        "UPDATE teams SET allocated_project = ?2 WHERE id = ?1",
        params![team_id, project_id],
    )?;
    notifications::notify(&tx, &notification.content, &members)?;
    tx.commit()?;
    Ok(())
}

/// Cancel a team's allocation. Rejecting a project the team is not currently
/// allocated to is refused, which guards against cancelling an allocation
/// that was already changed.
pub fn reject(
    conn: &mut Connection,
    team_id: i64,
    project_id: i64,
    notification: &NotificationRequest,
) -> Result<()> {
    let team = teams::require(conn, team_id)?;
    if team.allocated_project != Some(project_id) {
        return Err(Error::NotFound("team not allocated to this project"));
    }
    let members = teams::member_ids(conn, team_id)?;
    let tx = conn.transaction()?;
    tx.execute(
        "UPDATE teams SET allocated_project = NULL WHERE id = ?1",
        [team_id],
    )?;
    notifications::notify(&tx, &notification.content, &members)?;
    tx.commit()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::users::test_support::seed_user;

    fn note(content: &str) -> NotificationRequest {
        NotificationRequest {
            content: content.into(),
            to: Vec::new(),
        }
    }

    fn seed_project(conn: &Connection, id: i64) {
        conn.execute(
            "INSERT INTO projects (id, name, created_at) VALUES (?1, 'p', 0)",
            [id],
        )
        .unwrap();
    }

    fn seed_team(conn: &Connection, user: i64) -> i64 {
        conn.execute(
            "INSERT INTO teams (show_id, name, course, created_at) VALUES (111111, 't', '', 0)",
            [],
        )
        .unwrap();
        let team_id = conn.last_insert_rowid();
        conn.execute(
            "UPDATE users SET team_id = ?2 WHERE id = ?1",
            params![user, team_id],
        )
        .unwrap();
        team_id
    }

    #[test]
    fn allocate_overwrites_previous_project() {
        let mut conn = db::init_db(":memory:").unwrap();
        let ann = seed_user(&conn, "ann", "", 1);
        let team = seed_team(&conn, ann);
        seed_project(&conn, 7);
        seed_project(&conn, 9);
        allocate(&mut conn, team, 7, &note("allocated to 7")).unwrap();
        allocate(&mut conn, team, 9, &note("allocated to 9")).unwrap();
        let allocated: Option<i64> = conn
            .query_row(
                "SELECT allocated_project FROM teams WHERE id = ?1",
                [team],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(allocated, Some(9));
        let notes: i64 = conn
            .query_row("SELECT COUNT(*) FROM notifications", [], |row| row.get(0))
            .unwrap();
        assert_eq!(notes, 2);
    }

    #[test]
    fn reject_requires_matching_allocation() {
        let mut conn = db::init_db(":memory:").unwrap();
        let ann = seed_user(&conn, "ann", "", 1);
        let team = seed_team(&conn, ann);
        seed_project(&conn, 7);
        seed_project(&conn, 9);

        // not allocated at all
        assert!(matches!(
            reject(&mut conn, team, 7, &note("x")),
            Err(Error::NotFound(_))
        ));

        allocate(&mut conn, team, 7, &note("allocated")).unwrap();
        // allocated to a different project
        assert!(matches!(
            reject(&mut conn, team, 9, &note("x")),
            Err(Error::NotFound(_))
        ));
        let allocated: Option<i64> = conn
            .query_row(
                "SELECT allocated_project FROM teams WHERE id = ?1",
                [team],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(allocated, Some(7));

        reject(&mut conn, team, 7, &note("cancelled")).unwrap();
        let allocated: Option<i64> = conn
            .query_row(
                "SELECT allocated_project FROM teams WHERE id = ?1",
                [team],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(allocated, None);
    }

    #[test]
    fn allocation_notifies_roster_with_dedup() {
        let mut conn = db::init_db(":memory:").unwrap();
        let ann = seed_user(&conn, "ann", "", 1);
        let bob = seed_user(&conn, "bob", "", 1);
        let team = seed_team(&conn, ann);
        conn.execute(
            "UPDATE users SET team_id = ?2 WHERE id = ?1",
            params![bob, team],
        )
        .unwrap();
        seed_project(&conn, 7);

        allocate(&mut conn, team, 7, &note("project allocated")).unwrap();
        allocate(&mut conn, team, 7, &note("project allocated")).unwrap();
        let notes: i64 = conn
            .query_row("SELECT COUNT(*) FROM notifications", [], |row| row.get(0))
            .unwrap();
        assert_eq!(notes, 1);
        let recipients: i64 = conn
            .query_row("SELECT COUNT(*) FROM notification_recipients", [], |row| {
                row.get(0)
            })
            .unwrap();
        assert_eq!(recipients, 2);
    }

    #[test]
    fn missing_team_is_not_found() {
        let mut conn = db::init_db(":memory:").unwrap();
        assert!(matches!(
            allocate(&mut conn, 99, 1, &note("x")),
            Err(Error::NotFound("team not found"))
        ));
    }
}
