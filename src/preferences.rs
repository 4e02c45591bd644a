use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::users;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreferenceEntry {
    pub project_id: i64,
    #[serde(default)]
    pub reason: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PreferenceView {
    pub project_id: i64,
    pub project_title: String,
    pub reason: String,
    pub preference_num: i64,
}

/// Replace the whole preference set of the caller's team. Prior rows are
/// deleted and ranks reassigned 1..n in request order; a team that already
/// holds an allocation may not touch its preferences.
pub fn replace_for_user(
    conn: &mut Connection,
    user_id: i64,
    entries: &[PreferenceEntry],
) -> Result<()> {
    let user = users::require(conn, user_id)?;
    let team_id = user
        .team_id
        .ok_or(Error::NotFound("user does not belong to any team"))?;
    let allocated: Option<i64> = conn.query_row(
        "SELECT allocated_project FROM teams WHERE id = ?1",
        [team_id],
        |row| row.get(0),
    )?;
    if allocated.is_some() {
        return Err(Error::Conflict(
            "team already allocated a project, cannot update preferences",
        ));
    }

    let tx = conn.transaction()?;
    tx.execute("DELETE FROM team_preferences WHERE team_id = ?1", [team_id])?;
    for (idx, entry) in entries.iter().enumerate() {
        tx.execute(
            "INSERT OR REPLACE INTO team_preferences (team_id, project_id, rank, reason) VALUES (?1, ?2, ?3, ?4)",
            params![team_id, entry.project_id, idx as i64 + 1, entry.reason],
        )?;
    }
    tx.commit()?;
    Ok(())
}

pub fn list_for_user(conn: &Connection, user_id: i64) -> Result<Vec<PreferenceView>> {
    let user = users::require(conn, user_id)?;
    let team_id = user
        .team_id
        .ok_or(Error::NotFound("user does not belong to any team"))?;
    list_for_team(conn, team_id)
}

pub fn list_for_team(conn: &Connection, team_id: i64) -> Result<Vec<PreferenceView>> {
    let mut stmt = conn.prepare(
        "SELECT tp.project_id, p.name, tp.reason, tp.rank FROM team_preferences tp \
         JOIN projects p ON p.id = tp.project_id \
         WHERE tp.team_id = ?1 ORDER BY tp.rank",
    )?;
    let out = stmt
        .query_map([team_id], |row| {
            Ok(PreferenceView {
                project_id: row.get(0)?,
                project_title: row.get(1)?,
                reason: row.get(2)?,
                preference_num: row.get(3)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(out)
}

/// Rank and reason a team recorded for one project, if any.
pub fn for_team_and_project(
    conn: &Connection,
    team_id: i64,
    project_id: i64,
) -> Result<Option<(i64, String)>> {
    use rusqlite::OptionalExtension;
    let row = conn
        .query_row(
            "SELECT rank, reason FROM team_preferences WHERE team_id = ?1 AND project_id = ?2",
            params![team_id, project_id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?;
    Ok(row)
}
