use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::Serialize;
use time::OffsetDateTime;

use crate::error::{Error, Result};
use crate::model::{Channel, CHANNEL_PRIVATE};
use crate::users;

fn row_to_channel(row: &Row<'_>) -> rusqlite::Result<Channel> {
    Ok(Channel {
        id: row.get(0)?,
        name: row.get(1)?,
        kind: row.get(2)?,
        created_at: row.get(3)?,
    })
}

pub fn get(conn: &Connection, id: i64) -> Result<Option<Channel>> {
    let mut stmt = conn.prepare("SELECT id, name, kind, created_at FROM channels WHERE id = ?1")?;
    Ok(stmt.query_row([id], row_to_channel).optional()?)
}

pub fn require(conn: &Connection, id: i64) -> Result<Channel> {
    get(conn, id)?.ok_or(Error::NotFound("channel not found"))
}

/// Default channel name derived from member names in request order.
fn generate_name(kind: i64, names: &[String]) -> String {
    if kind == CHANNEL_PRIVATE {
        format!("Private Chat: {} and {}", names[0], names[1])
    } else {
        format!("Group Chat: {}", names.join(", "))
    }
}

/// Outcome of a create call; private pairs are idempotent, so the caller
/// needs to know whether the channel already existed.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedChannel {
    #[serde(rename = "channelID")]
    pub channel_id: i64,
    pub channel_name: String,
    pub channel_type: i64,
    #[serde(skip)]
    pub existed: bool,
}

/// Create a channel. A private channel between two users is unique: when one
/// already joins exactly that pair it is returned instead of duplicated.
pub fn create(conn: &Connection, kind: i64, user_ids: &[i64]) -> Result<CreatedChannel> {
    if kind == CHANNEL_PRIVATE {
        if user_ids.len() != 2 {
            return Err(Error::Invalid(
                "private channel requires exactly two users".into(),
            ));
        }
        let existing = conn
            .query_row(
                "SELECT c.id, c.name, c.kind, c.created_at FROM channels c \
                 JOIN channel_members a ON a.channel_id = c.id AND a.user_id = ?1 \
                 JOIN channel_members b ON b.channel_id = c.id AND b.user_id = ?2 \
                 WHERE c.kind = ?3 LIMIT 1",
                params![user_ids[0], user_ids[1], CHANNEL_PRIVATE],
                row_to_channel,
            )
            .optional()?;
        if let Some(channel) = existing {
            return Ok(CreatedChannel {
                channel_id: channel.id,
                channel_name: channel.name,
                channel_type: channel.kind,
                existed: true,
            });
        }
    } else if user_ids.is_empty() {
        return Err(Error::Invalid("channel requires at least one user".into()));
    }

    let mut names = Vec::with_capacity(user_ids.len());
    for id in user_ids {
        names.push(users::require(conn, *id)?.username);
    }
    let name = generate_name(kind, &names);
    let now = OffsetDateTime::now_utc().unix_timestamp();
    conn.execute(
        "INSERT INTO channels (name, kind, created_at) VALUES (?1, ?2, ?3)",
        params![name, kind, now],
    )?;
    let channel_id = conn.last_insert_rowid();
    for id in user_ids {
        conn.execute(
            "INSERT OR IGNORE INTO channel_members (channel_id, user_id) VALUES (?1, ?2)",
            params![channel_id, id],
        )?;
    }
    Ok(CreatedChannel {
        channel_id,
        channel_name: name,
        channel_type: kind,
        existed: false,
    })
}

pub fn rename(conn: &Connection, channel_id: i64, name: &str) -> Result<()> {
    let channel = require(conn, channel_id)?;
    conn.execute(
        "UPDATE channels SET name = ?2 WHERE id = ?1",
        params![channel.id, name],
    )?;
    Ok(())
}

/// Add members to an existing channel; repeated invites are no-ops.
pub fn invite(conn: &Connection, channel_id: i64, user_ids: &[i64]) -> Result<()> {
    let channel = require(conn, channel_id)?;
    for id in user_ids {
        conn.execute(
            "INSERT OR IGNORE INTO channel_members (channel_id, user_id) VALUES (?1, ?2)",
            params![channel.id, id],
        )?;
    }
    Ok(())
}

/// Remove a member. When the last member leaves, the channel and all its
/// messages are deleted as one atomic unit.
pub fn leave(conn: &mut Connection, channel_id: i64, user_id: i64) -> Result<()> {
    let channel = require(conn, channel_id)?;
    users::require(conn, user_id)?;
    conn.execute(
        "DELETE FROM channel_members WHERE channel_id = ?1 AND user_id = ?2",
        params![channel.id, user_id],
    )?;
    let remaining: i64 = conn.query_row(
        "SELECT COUNT(*) FROM channel_members WHERE channel_id = ?1",
        [channel.id],
        |row| row.get(0),
    )?;
    if remaining == 0 {
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM messages WHERE channel_id = ?1", [channel.id])?;
        tx.execute("DELETE FROM channels WHERE id = ?1", [channel.id])?;
        tx.commit()?;
    }
    Ok(())
}

pub fn members_detail(conn: &Connection, channel_id: i64) -> Result<Vec<users::UserDetail>> {
    let channel = require(conn, channel_id)?;
    let mut stmt = conn.prepare(
        "SELECT u.id, u.username, u.email, u.avatar_url, u.course, u.role, u.team_id \
         FROM users u JOIN channel_members m ON m.user_id = u.id \
         WHERE m.channel_id = ?1 ORDER BY u.id",
    )?;
    let members = stmt
        .query_map([channel.id], |row| {
            Ok(crate::model::User {
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
    let mut out = Vec::with_capacity(members.len());
    for member in &members {
        out.push(users::detail(conn, member)?);
    }
    Ok(out)
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelSummary {
    #[serde(rename = "channelID")]
    pub channel_id: i64,
    pub channel_name: String,
    pub channel_type: i64,
}

pub fn for_user(conn: &Connection, user_id: i64) -> Result<Vec<ChannelSummary>> {
    let mut stmt = conn.prepare(
        "SELECT c.id, c.name, c.kind FROM channels c \
         JOIN channel_members m ON m.channel_id = c.id \
         WHERE m.user_id = ?1 ORDER BY c.id",
    )?;
    let out = stmt
        .query_map([user_id], |row| {
            Ok(ChannelSummary {
                channel_id: row.get(0)?,
                channel_name: row.get(1)?,
                channel_type: row.get(2)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(out)
}
