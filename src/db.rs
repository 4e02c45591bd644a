use anyhow::Result;
use rusqlite::Connection;
use std::path::Path;

/// Initialize the SQLite database and run migrations.
pub fn init_db<P: AsRef<Path>>(path: P) -> Result<Connection> {
    let conn = Connection::open(path)?;
    conn.execute_batch(SCHEMA)?;
    Ok(conn)
}

pub const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS users (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  username TEXT NOT NULL,
  email TEXT UNIQUE NOT NULL,
  avatar_url TEXT,
  course TEXT NOT NULL DEFAULT '',
  role INTEGER NOT NULL DEFAULT 1,
  team_id INTEGER REFERENCES teams(id)
);

CREATE TABLE IF NOT EXISTS teams (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  show_id INTEGER NOT NULL,
  name TEXT NOT NULL,
  course TEXT NOT NULL DEFAULT '',
  allocated_project INTEGER REFERENCES projects(id),
  created_at INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS projects (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  name TEXT NOT NULL,
  field TEXT NOT NULL DEFAULT '',
  description TEXT NOT NULL DEFAULT '',
  max_teams INTEGER NOT NULL DEFAULT 0,
  visibility INTEGER NOT NULL DEFAULT 1,
  client_id INTEGER REFERENCES users(id),
  tutor_id INTEGER REFERENCES users(id),
  coordinator_id INTEGER REFERENCES users(id),
  spec_url TEXT,
  created_at INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS skills (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  name TEXT UNIQUE NOT NULL
);

CREATE TABLE IF NOT EXISTS user_skills (
  user_id INTEGER NOT NULL REFERENCES users(id),
  skill_id INTEGER NOT NULL REFERENCES skills(id),
  PRIMARY KEY (user_id, skill_id)
);

CREATE TABLE IF NOT EXISTS team_skills (
  team_id INTEGER NOT NULL REFERENCES teams(id),
  skill_id INTEGER NOT NULL REFERENCES skills(id),
  PRIMARY KEY (team_id, skill_id)
);

CREATE TABLE IF NOT EXISTS project_skills (
  project_id INTEGER NOT NULL REFERENCES projects(id),
  skill_id INTEGER NOT NULL REFERENCES skills(id),
  PRIMARY KEY (project_id, skill_id)
);

CREATE TABLE IF NOT EXISTS team_preferences (
  team_id INTEGER NOT NULL REFERENCES teams(id),
  project_id INTEGER NOT NULL REFERENCES projects(id),
  rank INTEGER NOT NULL,
  reason TEXT NOT NULL DEFAULT '',
  PRIMARY KEY (team_id, project_id)
);

CREATE TABLE IF NOT EXISTS notifications (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  content TEXT NOT NULL,
  created_at INTEGER NOT NULL,
  updated_at INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS notification_recipients (
  notification_id INTEGER NOT NULL REFERENCES notifications(id),
  user_id INTEGER NOT NULL REFERENCES users(id),
  PRIMARY KEY (notification_id, user_id)
);

CREATE TABLE IF NOT EXISTS channels (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  name TEXT NOT NULL,
  kind INTEGER NOT NULL DEFAULT 1,
  created_at INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS channel_members (
  channel_id INTEGER NOT NULL REFERENCES channels(id),
  user_id INTEGER NOT NULL REFERENCES users(id),
  PRIMARY KEY (channel_id, user_id)
);

CREATE TABLE IF NOT EXISTS messages (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  channel_id INTEGER NOT NULL REFERENCES channels(id),
  sender_id INTEGER NOT NULL REFERENCES users(id),
  kind INTEGER NOT NULL DEFAULT 1,
  content TEXT NOT NULL,
  created_at INTEGER NOT NULL
);
"#;
