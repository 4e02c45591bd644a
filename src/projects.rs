use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::error::{Error, Result};
use crate::model::{Project, Role, VISIBILITY_ARCHIVED, VISIBILITY_PUBLIC};
use crate::{preferences, skills, teams, users};

fn row_to_project(row: &Row<'_>) -> rusqlite::Result<Project> {
    Ok(Project {
        id: row.get(0)?,
        name: row.get(1)?,
        field: row.get(2)?,
        description: row.get(3)?,
        max_teams: row.get(4)?,
        visibility: row.get(5)?,
        client_id: row.get(6)?,
        tutor_id: row.get(7)?,
        coordinator_id: row.get(8)?,
        spec_url: row.get(9)?,
        created_at: row.get(10)?,
    })
}

const PROJECT_COLS: &str = "id, name, field, description, max_teams, visibility, client_id, tutor_id, coordinator_id, spec_url, created_at";

pub fn get(conn: &Connection, id: i64) -> Result<Option<Project>> {
    let mut stmt = conn.prepare(&format!("SELECT {PROJECT_COLS} FROM projects WHERE id = ?1"))?;
    Ok(stmt.query_row([id], row_to_project).optional()?)
}

pub fn require(conn: &Connection, id: i64) -> Result<Project> {
    get(conn, id)?.ok_or(Error::NotFound("project not found"))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Owner {
    pub user_id: i64,
    pub name: String,
    pub email: String,
    pub avatar_url: Option<String>,
}

fn owner(conn: &Connection, id: Option<i64>) -> Result<Option<Owner>> {
    let Some(id) = id else { return Ok(None) };
    Ok(users::get(conn, id)?.map(|u| Owner {
        user_id: u.id,
        name: u.username,
        email: u.email,
        avatar_url: u.avatar_url,
    }))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AllocatedTeam {
    pub team_id: i64,
    pub team_name: String,
}

fn allocated_teams(conn: &Connection, project_id: i64) -> Result<Vec<AllocatedTeam>> {
    let mut stmt =
        conn.prepare("SELECT id, name FROM teams WHERE allocated_project = ?1 ORDER BY id")?;
    let out = stmt
        .query_map([project_id], |row| {
            Ok(AllocatedTeam {
                team_id: row.get(0)?,
                team_name: row.get(1)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(out)
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectDetail {
    pub project_id: i64,
    pub title: String,
    pub field: String,
    pub description: String,
    pub max_teams: i64,
    pub required_skills: Vec<String>,
    pub spec_link: Option<String>,
    pub client: Option<Owner>,
    pub tutor: Option<Owner>,
    pub coordinator: Option<Owner>,
    pub allocated_teams: Vec<AllocatedTeam>,
}

pub fn to_detail(conn: &Connection, project: &Project) -> Result<ProjectDetail> {
    Ok(ProjectDetail {
        project_id: project.id,
        title: project.name.clone(),
        field: project.field.clone(),
        description: project.description.clone(),
        max_teams: project.max_teams,
        required_skills: skills::names_for_project(conn, project.id)?,
        spec_link: project.spec_url.clone(),
        client: owner(conn, project.client_id)?,
        tutor: owner(conn, project.tutor_id)?,
        coordinator: owner(conn, project.coordinator_id)?,
        allocated_teams: allocated_teams(conn, project.id)?,
    })
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectForm {
    pub title: String,
    pub field: String,
    pub description: String,
    #[serde(rename = "email")]
    pub client_email: String,
    #[serde(default)]
    pub max_teams: Option<i64>,
    #[serde(default)]
    pub required_skills: Vec<String>,
    #[serde(default)]
    pub spec_url: Option<String>,
}

fn require_client(conn: &Connection, email: &str) -> Result<users::UserDetail> {
    let user = users::by_email(conn, email)?.ok_or(Error::NotFound("client not found"))?;
    if Role::from_i64(user.role) != Some(Role::Client) {
        return Err(Error::Forbidden("only a client can own a project"));
    }
    users::detail(conn, &user)
}

/// Create a project owned by the client resolved through the given email.
pub fn create(conn: &Connection, form: &ProjectForm) -> Result<(i64, i64)> {
    let client = require_client(conn, &form.client_email)?;
    let now = OffsetDateTime::now_utc().unix_timestamp();
    conn.execute(
        "INSERT INTO projects (name, field, description, max_teams, visibility, client_id, spec_url, created_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            form.title,
            form.field,
            form.description,
            form.max_teams.unwrap_or(0),
            VISIBILITY_PUBLIC,
            client.user_id,
            form.spec_url,
            now
        ],
    )?;
    let project_id = conn.last_insert_rowid();
    skills::replace_for_project(conn, project_id, &form.required_skills)?;
    Ok((project_id, client.user_id))
}

/// Update title, field, description, owner and skills of a project.
pub fn modify(conn: &Connection, project_id: i64, form: &ProjectForm) -> Result<users::UserDetail> {
    let project = require(conn, project_id)?;
    let client = require_client(conn, &form.client_email)?;
    conn.execute(
        "UPDATE projects SET name = ?2, field = ?3, description = ?4, client_id = ?5, \
         max_teams = CASE WHEN ?6 IS NULL THEN max_teams ELSE ?6 END, \
         spec_url = COALESCE(?7, spec_url) WHERE id = ?1",
        params![
            project.id,
            form.title,
            form.field,
            form.description,
            client.user_id,
            form.max_teams,
            form.spec_url
        ],
    )?;
    if !form.required_skills.is_empty() {
        skills::replace_for_project(conn, project.id, &form.required_skills)?;
    }
    Ok(client)
}

fn list_where(conn: &Connection, visibility: i64) -> Result<Vec<ProjectDetail>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {PROJECT_COLS} FROM projects WHERE visibility = ?1 ORDER BY id"
    ))?;
    let rows = stmt
        .query_map([visibility], row_to_project)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    let mut out = Vec::with_capacity(rows.len());
    for project in rows {
        out.push(to_detail(conn, &project)?);
    }
    Ok(out)
}

pub fn public_list(conn: &Connection) -> Result<Vec<ProjectDetail>> {
    list_where(conn, VISIBILITY_PUBLIC)
}

pub fn archived_list(conn: &Connection) -> Result<Vec<ProjectDetail>> {
    list_where(conn, VISIBILITY_ARCHIVED)
}

pub fn detail(conn: &Connection, project_id: i64) -> Result<ProjectDetail> {
    let project = require(conn, project_id)?;
    to_detail(conn, &project)
}

/// Move a project out of the public directory.
pub fn archive(conn: &Connection, project_id: i64) -> Result<()> {
    let project = require(conn, project_id)?;
    conn.execute(
        "UPDATE projects SET visibility = ?2 WHERE id = ?1",
        params![project.id, VISIBILITY_ARCHIVED],
    )?;
    Ok(())
}

/// Delete a project; teams allocated to it fall back to unallocated, and
/// preference rows naming it are dropped so the ledger never dangles.
pub fn delete(conn: &mut Connection, project_id: i64) -> Result<()> {
    let project = require(conn, project_id)?;
    let tx = conn.transaction()?;
    tx.execute(
        "UPDATE teams SET allocated_project = NULL WHERE allocated_project = ?1",
        [project.id],
    )?;
    tx.execute(
        "DELETE FROM team_preferences WHERE project_id = ?1",
        [project.id],
    )?;
    tx.execute(
        "DELETE FROM project_skills WHERE project_id = ?1",
        [project.id],
    )?;
    tx.execute("DELETE FROM projects WHERE id = ?1", [project.id])?;
    tx.commit()?;
    Ok(())
}

/// Role-scoped directory view: students see their team's allocated public
/// project, staff see the public projects they own.
pub fn list_by_role(conn: &Connection, user_id: i64) -> Result<Vec<ProjectDetail>> {
    let user = users::require(conn, user_id)?;
    let mut projects: Vec<Project> = Vec::new();
    match Role::from_i64(user.role) {
        Some(Role::Student) => {
            let team_id = user.team_id.ok_or(Error::NotFound("team not found"))?;
            let team = teams::require(conn, team_id)?;
            if let Some(project_id) = team.allocated_project {
                let project = get(conn, project_id)?
                    .filter(|p| p.visibility == VISIBILITY_PUBLIC)
                    .ok_or(Error::NotFound("project not found"))?;
                projects.push(project);
            }
        }
        Some(Role::Tutor) => projects = owned_public(conn, "tutor_id", user.id)?,
        Some(Role::Client) => projects = owned_public(conn, "client_id", user.id)?,
        Some(Role::Coordinator) => projects = owned_public(conn, "coordinator_id", user.id)?,
        _ => return Err(Error::Forbidden("user does not have the required role")),
    }
    let mut out = Vec::with_capacity(projects.len());
    for project in &projects {
        out.push(to_detail(conn, project)?);
    }
    Ok(out)
}

fn owned_public(conn: &Connection, owner_col: &str, user_id: i64) -> Result<Vec<Project>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {PROJECT_COLS} FROM projects WHERE {owner_col} = ?1 AND visibility = ?2 ORDER BY id"
    ))?;
    let rows = stmt
        .query_map(params![user_id, VISIBILITY_PUBLIC], row_to_project)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Team view used by the staff allocation screens: full roster plus the rank
/// and reason the team recorded for the project in question.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TeamAllocationView {
    #[serde(flatten)]
    pub profile: teams::TeamProfile,
    pub preference_num: Option<i64>,
    pub preference_reason: Option<String>,
}

fn team_view(conn: &Connection, team_id: i64, project_id: i64) -> Result<TeamAllocationView> {
    let team = teams::require(conn, team_id)?;
    let pref = preferences::for_team_and_project(conn, team.id, project_id)?;
    let (num, reason) = match pref {
        Some((num, reason)) => (Some(num), Some(reason)),
        None => (None, None),
    };
    Ok(TeamAllocationView {
        profile: teams::profile(conn, &team)?,
        preference_num: num,
        preference_reason: reason,
    })
}

pub fn allocated_teams_detail(conn: &Connection, project_id: i64) -> Result<Vec<TeamAllocationView>> {
    let project = require(conn, project_id)?;
    let mut stmt = conn.prepare("SELECT id FROM teams WHERE allocated_project = ?1 ORDER BY id")?;
    let team_ids = stmt
        .query_map([project.id], |row| row.get::<_, i64>(0))?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    let mut out = Vec::with_capacity(team_ids.len());
    for team_id in team_ids {
        out.push(team_view(conn, team_id, project.id)?);
    }
    Ok(out)
}

/// Unallocated teams that listed the project among their preferences.
pub fn preferring_teams_detail(conn: &Connection, project_id: i64) -> Result<Vec<TeamAllocationView>> {
    let project = require(conn, project_id)?;
    let mut stmt = conn.prepare(
        "SELECT tp.team_id FROM team_preferences tp \
         JOIN teams t ON t.id = tp.team_id \
         WHERE tp.project_id = ?1 AND t.allocated_project IS NULL ORDER BY tp.rank",
    )?;
    let team_ids = stmt
        .query_map([project.id], |row| row.get::<_, i64>(0))?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    if team_ids.is_empty() {
        return Err(Error::NotFound("no unallocated teams found"));
    }
    let mut out = Vec::with_capacity(team_ids.len());
    for team_id in team_ids {
        out.push(team_view(conn, team_id, project.id)?);
    }
    Ok(out)
}

pub fn preference_detail(
    conn: &Connection,
    project_id: i64,
    team_id: i64,
) -> Result<TeamAllocationView> {
    if preferences::for_team_and_project(conn, team_id, project_id)?.is_none() {
        return Err(Error::NotFound("preference not found"));
    }
    team_view(conn, team_id, project_id)
}
