use rusqlite::{Connection, OptionalExtension, Row};
use serde::Serialize;

use crate::error::{Error, Result};
use crate::model::User;
use crate::skills;

fn row_to_user(row: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        username: row.get(1)?,
        email: row.get(2)?,
        avatar_url: row.get(3)?,
        course: row.get(4)?,
        role: row.get(5)?,
        team_id: row.get(6)?,
    })
}

const USER_COLS: &str = "id, username, email, avatar_url, course, role, team_id";

pub fn get(conn: &Connection, id: i64) -> Result<Option<User>> {
    let mut stmt = conn.prepare(&format!("SELECT {USER_COLS} FROM users WHERE id = ?1"))?;
    Ok(stmt.query_row([id], row_to_user).optional()?)
}

pub fn require(conn: &Connection, id: i64) -> Result<User> {
    get(conn, id)?.ok_or(Error::NotFound("user not found"))
}

pub fn by_email(conn: &Connection, email: &str) -> Result<Option<User>> {
    let mut stmt = conn.prepare(&format!("SELECT {USER_COLS} FROM users WHERE email = ?1"))?;
    Ok(stmt.query_row([email], row_to_user).optional()?)
}

/// Per-user view returned by roster and channel member listings.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserDetail {
    pub user_id: i64,
    pub user_name: String,
    pub email: String,
    pub avatar_url: Option<String>,
    pub course: String,
    pub role: i64,
    pub user_skills: Vec<String>,
}

pub fn detail(conn: &Connection, user: &User) -> Result<UserDetail> {
    Ok(UserDetail {
        user_id: user.id,
        user_name: user.username.clone(),
        email: user.email.clone(),
        avatar_url: user.avatar_url.clone(),
        course: user.course.clone(),
        role: user.role,
        user_skills: skills::names_for_user(conn, user.id)?,
    })
}

#[cfg(test)]
pub mod test_support {
    use rusqlite::{params, Connection};

    /// Insert a bare user row and return its id.
    pub fn seed_user(conn: &Connection, name: &str, course: &str, role: i64) -> i64 {
        conn.execute(
            "INSERT INTO users (username, email, course, role) VALUES (?1, ?2, ?3, ?4)",
            params![name, format!("{name}@example.com"), course, role],
        )
        .unwrap();
        conn.last_insert_rowid()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;

    #[test]
    fn require_missing_is_not_found() {
        let conn = db::init_db(":memory:").unwrap();
        assert!(matches!(require(&conn, 42), Err(Error::NotFound(_))));
        let id = test_support::seed_user(&conn, "ann", "COMP9900", 1);
        let user = require(&conn, id).unwrap();
        assert_eq!(user.username, "ann");
        assert_eq!(user.team_id, None);
    }
}
