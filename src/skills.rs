use rusqlite::{params, Connection, OptionalExtension};

use crate::error::Result;

/// Look up a skill by name, creating it if absent. Names are deduplicated
/// exactly; the catalog never stores two rows with the same text.
pub fn find_or_create(conn: &Connection, name: &str) -> Result<i64> {
    let existing: Option<i64> = conn
        .query_row("SELECT id FROM skills WHERE name = ?1", [name], |row| {
            row.get(0)
        })
        .optional()?;
    if let Some(id) = existing {
        return Ok(id);
    }
    conn.execute("INSERT INTO skills (name) VALUES (?1)", [name])?;
    Ok(conn.last_insert_rowid())
}

fn replace(conn: &Connection, table: &str, owner_col: &str, owner_id: i64, names: &[String]) -> Result<()> {
    conn.execute(
        &format!("DELETE FROM {table} WHERE {owner_col} = ?1"),
        [owner_id],
    )?;
    for name in names {
        let skill_id = find_or_create(conn, name)?;
        conn.execute(
            &format!("INSERT OR IGNORE INTO {table} ({owner_col}, skill_id) VALUES (?1, ?2)"),
            params![owner_id, skill_id],
        )?;
    }
    Ok(())
}

pub fn replace_for_team(conn: &Connection, team_id: i64, names: &[String]) -> Result<()> {
    replace(conn, "team_skills", "team_id", team_id, names)
}

pub fn replace_for_project(conn: &Connection, project_id: i64, names: &[String]) -> Result<()> {
    replace(conn, "project_skills", "project_id", project_id, names)
}

fn names(conn: &Connection, table: &str, owner_col: &str, owner_id: i64) -> Result<Vec<String>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT s.name FROM skills s JOIN {table} j ON j.skill_id = s.id WHERE j.{owner_col} = ?1 ORDER BY s.name"
    ))?;
    let out = stmt
        .query_map([owner_id], |row| row.get(0))?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(out)
}

pub fn names_for_user(conn: &Connection, user_id: i64) -> Result<Vec<String>> {
    names(conn, "user_skills", "user_id", user_id)
}

pub fn names_for_team(conn: &Connection, team_id: i64) -> Result<Vec<String>> {
    names(conn, "team_skills", "team_id", team_id)
}

pub fn names_for_project(conn: &Connection, project_id: i64) -> Result<Vec<String>> {
    names(conn, "project_skills", "project_id", project_id)
}
