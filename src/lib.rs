pub mod allocation;
pub mod api;
pub mod channels;
pub mod config;
pub mod db;
pub mod error;
pub mod messages;
pub mod model;
pub mod notifications;
pub mod preferences;
pub mod projects;
pub mod skills;
pub mod teams;
pub mod users;
