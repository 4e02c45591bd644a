use rand::Rng;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::Serialize;
use time::OffsetDateTime;

use crate::error::{Error, Result};
use crate::model::{Team, User};
use crate::{skills, users};

fn row_to_team(row: &Row<'_>) -> rusqlite::Result<Team> {
    Ok(Team {
        id: row.get(0)?,
        show_id: row.get(1)?,
        name: row.get(2)?,
        course: row.get(3)?,
        allocated_project: row.get(4)?,
        created_at: row.get(5)?,
    })
}

const TEAM_COLS: &str = "id, show_id, name, course, allocated_project, created_at";

pub fn get(conn: &Connection, id: i64) -> Result<Option<Team>> {
    let mut stmt = conn.prepare(&format!("SELECT {TEAM_COLS} FROM teams WHERE id = ?1"))?;
    Ok(stmt.query_row([id], row_to_team).optional()?)
}

pub fn require(conn: &Connection, id: i64) -> Result<Team> {
    get(conn, id)?.ok_or(Error::NotFound("team not found"))
}

pub fn by_show_id(conn: &Connection, show_id: i64) -> Result<Option<Team>> {
    let mut stmt = conn.prepare(&format!("SELECT {TEAM_COLS} FROM teams WHERE show_id = ?1"))?;
    Ok(stmt.query_row([show_id], row_to_team).optional()?)
}

/// Ids of the current roster, used by the allocation notifications.
pub fn member_ids(conn: &Connection, team_id: i64) -> Result<Vec<i64>> {
    let mut stmt = conn.prepare("SELECT id FROM users WHERE team_id = ?1 ORDER BY id")?;
    let ids = stmt
        .query_map([team_id], |row| row.get(0))?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(ids)
}

fn members(conn: &Connection, team_id: i64) -> Result<Vec<User>> {
    let mut stmt = conn.prepare(
        "SELECT id, username, email, avatar_url, course, role, team_id FROM users WHERE team_id = ?1 ORDER BY id",
    )?;
    let rows = stmt
        .query_map([team_id], |row| {
            Ok(User {
                id: row.get(0)?,
                username: row.get(1)?,
                email: row.get(2)?,
                avatar_url: row.get(3)?,
                course: row.get(4)?,
                role: row.get(5)?,
                team_id: row.get(6)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TeamProfile {
    pub team_id: i64,
    pub team_id_show: i64,
    pub team_name: String,
    pub course: String,
    pub team_member: Vec<users::UserDetail>,
    pub team_skills: Vec<String>,
}

pub fn profile(conn: &Connection, team: &Team) -> Result<TeamProfile> {
    let mut roster = Vec::new();
    for member in members(conn, team.id)? {
        roster.push(users::detail(conn, &member)?);
    }
    Ok(TeamProfile {
        team_id: team.id,
        team_id_show: team.show_id,
        team_name: team.name.clone(),
        course: team.course.clone(),
        team_member: roster,
        team_skills: skills::names_for_team(conn, team.id)?,
    })
}

/// Create a team with a generated name and six-digit show id; the creator
/// becomes the first member.
pub fn create(conn: &Connection, user_id: i64) -> Result<TeamProfile> {
    let user = users::require(conn, user_id)?;
    if user.team_id.is_some() {
        return Err(Error::Invalid(
            "user already belongs to a team, cannot create team".into(),
        ));
    }
    let mut rng = rand::thread_rng();
    let name = format!("team_{}", rng.gen_range(1..=9999));
    let show_id: i64 = rng.gen_range(100_000..1_000_000);
    let now = OffsetDateTime::now_utc().unix_timestamp();
    conn.execute(
        "INSERT INTO teams (show_id, name, course, created_at) VALUES (?1, ?2, ?3, ?4)",
        params![show_id, name, user.course, now],
    )?;
    let team_id = conn.last_insert_rowid();
    conn.execute(
        "UPDATE users SET team_id = ?2 WHERE id = ?1",
        params![user_id, team_id],
    )?;
    profile(conn, &require(conn, team_id)?)
}

/// Join an existing team by its short show id.
pub fn join(conn: &Connection, user_id: i64, show_id: i64) -> Result<TeamProfile> {
    let user = users::require(conn, user_id)?;
    if user.team_id.is_some() {
        return Err(Error::Conflict("user already belongs to a team"));
    }
    let team = by_show_id(conn, show_id)?.ok_or(Error::NotFound("team not found"))?;
    if user.course != team.course {
        return Err(Error::Conflict("course mismatch"));
    }
    conn.execute(
        "UPDATE users SET team_id = ?2 WHERE id = ?1",
        params![user_id, team.id],
    )?;
    profile(conn, &team)
}

/// Staff-side membership update; same invariants as join but keyed by team id.
pub fn invite(conn: &Connection, user_id: i64, team_id: i64) -> Result<()> {
    let user = users::require(conn, user_id)?;
    let team = require(conn, team_id)?;
    if user.team_id.is_some() {
        return Err(Error::Invalid("user already belongs to a team".into()));
    }
    if user.course != team.course {
        return Err(Error::Conflict("course mismatch"));
    }
    conn.execute(
        "UPDATE users SET team_id = ?2 WHERE id = ?1",
        params![user_id, team_id],
    )?;
    Ok(())
}

/// Remove the user from their team. An emptied team is deleted together with
/// its skill and preference rows in one transaction.
pub fn leave(conn: &mut Connection, user_id: i64) -> Result<()> {
    let user = users::require(conn, user_id)?;
    let team_id = user
        .team_id
        .ok_or_else(|| Error::Invalid("user does not belong to any team".into()))?;
    conn.execute("UPDATE users SET team_id = NULL WHERE id = ?1", [user_id])?;
    let remaining: i64 = conn.query_row(
        "SELECT COUNT(*) FROM users WHERE team_id = ?1",
        [team_id],
        |row| row.get(0),
    )?;
    if remaining == 0 {
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM team_skills WHERE team_id = ?1", [team_id])?;
        tx.execute("DELETE FROM team_preferences WHERE team_id = ?1", [team_id])?;
        tx.execute("DELETE FROM teams WHERE id = ?1", [team_id])?;
        tx.commit()?;
    }
    Ok(())
}

pub fn profile_for_user(conn: &Connection, user_id: i64) -> Result<TeamProfile> {
    let user = users::require(conn, user_id)?;
    let team_id = user
        .team_id
        .ok_or(Error::NotFound("user does not belong to any team"))?;
    profile(conn, &require(conn, team_id)?)
}

/// Rename a team and replace its skill set.
pub fn update_profile(
    conn: &Connection,
    team_id: i64,
    name: &str,
    team_skills: &[String],
) -> Result<()> {
    let team = require(conn, team_id)?;
    conn.execute(
        "UPDATE teams SET name = ?2 WHERE id = ?1",
        params![team.id, name],
    )?;
    skills::replace_for_team(conn, team.id, team_skills)?;
    Ok(())
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TeamSummary {
    pub team_id: i64,
    pub team_id_show: i64,
    pub team_name: String,
    pub course: String,
    pub team_skills: Vec<String>,
}

fn summaries(conn: &Connection, sql: &str, args: &[&dyn rusqlite::ToSql]) -> Result<Vec<TeamSummary>> {
    let mut stmt = conn.prepare(sql)?;
    let teams = stmt
        .query_map(args, row_to_team)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    let mut out = Vec::with_capacity(teams.len());
    for team in teams {
        out.push(TeamSummary {
            team_id: team.id,
            team_id_show: team.show_id,
            team_name: team.name,
            course: team.course,
            team_skills: skills::names_for_team(conn, team.id)?,
        });
    }
    Ok(out)
}

pub fn list(conn: &Connection, course: Option<&str>) -> Result<Vec<TeamSummary>> {
    match course {
        Some(c) => summaries(
            conn,
            &format!("SELECT {TEAM_COLS} FROM teams WHERE course = ?1 ORDER BY id"),
            &[&c],
        ),
        None => summaries(conn, &format!("SELECT {TEAM_COLS} FROM teams ORDER BY id"), &[]),
    }
}

pub fn list_unallocated(conn: &Connection, course: Option<&str>) -> Result<Vec<TeamSummary>> {
    match course {
        Some(c) => summaries(
            conn,
            &format!(
                "SELECT {TEAM_COLS} FROM teams WHERE allocated_project IS NULL AND course = ?1 ORDER BY id"
            ),
            &[&c],
        ),
        None => summaries(
            conn,
            &format!("SELECT {TEAM_COLS} FROM teams WHERE allocated_project IS NULL ORDER BY id"),
            &[],
        ),
    }
}

/// Roster lookup by team name, used by staff views.
pub fn students_of_team(conn: &Connection, team_name: &str) -> Result<Vec<users::UserDetail>> {
    let mut stmt = conn.prepare(&format!("SELECT {TEAM_COLS} FROM teams WHERE name = ?1"))?;
    let team = stmt
        .query_row([team_name], row_to_team)
        .optional()?
        .ok_or(Error::NotFound("team not found"))?;
    let mut out = Vec::new();
    for member in members(conn, team.id)? {
        out.push(users::detail(conn, &member)?);
    }
    Ok(out)
}
