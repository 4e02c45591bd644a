use rusqlite::{params, Connection};
use serde::Serialize;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use crate::error::{Error, Result};
use crate::model::MessageContent;
use crate::{channels, notifications};

/// Store a message in a channel and raise a fresh notification for the given
/// addressees. Message notifications are intentionally not deduplicated:
/// every send is its own event.
pub fn send(
    conn: &Connection,
    channel_id: i64,
    sender_id: i64,
    content: &MessageContent,
    notify_content: &str,
    notify_to: &[i64],
) -> Result<i64> {
    let channel = channels::require(conn, channel_id)?;
    let now = OffsetDateTime::now_utc().unix_timestamp();
    conn.execute(
        "INSERT INTO messages (channel_id, sender_id, kind, content, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
        params![channel.id, sender_id, content.kind(), content.to_stored()?, now],
    )?;
    let message_id = conn.last_insert_rowid();
    notifications::record(conn, notify_content, notify_to)?;
    Ok(message_id)
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageDetail {
    pub message_time: String,
    pub message_type: i64,
    pub message_content: MessageContent,
    pub sender_name: String,
    pub avatar_url: Option<String>,
}

/// History of a channel in creation order, sender resolved by join. An
/// existing channel with no messages yields an empty list; only a missing
/// channel is not-found.
pub fn for_channel(conn: &Connection, channel_id: i64) -> Result<Vec<MessageDetail>> {
    let channel = channels::require(conn, channel_id)?;
    let mut stmt = conn.prepare(
        "SELECT m.kind, m.content, m.created_at, u.username, u.avatar_url \
         FROM messages m JOIN users u ON u.id = m.sender_id \
         WHERE m.channel_id = ?1 ORDER BY m.created_at, m.id",
    )?;
    let rows = stmt
        .query_map([channel.id], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, i64>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, Option<String>>(4)?,
            ))
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    let mut out = Vec::with_capacity(rows.len());
    for (kind, raw, created_at, sender_name, avatar_url) in rows {
        let ts = OffsetDateTime::from_unix_timestamp(created_at)
            .map_err(|e| Error::Internal(e.into()))?;
        out.push(MessageDetail {
            message_time: ts.format(&Rfc3339).map_err(|e| Error::Internal(e.into()))?,
            message_type: kind,
            message_content: MessageContent::from_stored(kind, &raw)?,
            sender_name,
            avatar_url,
        });
    }
    Ok(out)
}
