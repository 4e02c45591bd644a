use crate::config::Config;
use crate::error::{Error, Result};
use crate::{allocation, channels, db, messages, model, notifications, preferences, projects, teams};
use anyhow::Context;
use axum::{
    async_trait,
    extract::{rejection::JsonRejection, FromRequest, Path, State},
    http::Request,
    response::{IntoResponse, Response},
    routing::{delete, get, post, put},
    Router,
};
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::net::SocketAddr;

/// JSON body extractor that surfaces malformed bodies as 400 with the
/// standard `{"error": ...}` payload instead of axum's 422 rejection.
pub struct Json<T>(pub T);

#[async_trait]
impl<S, B, T> FromRequest<S, B> for Json<T>
where
    axum::Json<T>: FromRequest<S, B, Rejection = JsonRejection>,
    S: Send + Sync,
    B: Send + 'static,
{
    type Rejection = Error;

    async fn from_request(req: Request<B>, state: &S) -> std::result::Result<Self, Self::Rejection> {
        match axum::Json::<T>::from_request(req, state).await {
            Ok(axum::Json(value)) => Ok(Json(value)),
            Err(rejection) => Err(Error::Invalid(rejection.to_string())),
        }
    }
}

impl<T: Serialize> IntoResponse for Json<T> {
    fn into_response(self) -> Response {
        axum::Json(self.0).into_response()
    }
}

#[derive(Clone)]
pub struct AppState {
    pub pool: Pool<SqliteConnectionManager>,
    pub config: Config,
}

impl AppState {
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        tokio::fs::create_dir_all(&config.data_dir).await?;
        let db_path = config.data_dir.join("capstone_match.db");
        let manager =
            SqliteConnectionManager::file(db_path).with_init(|c| c.execute_batch(db::SCHEMA));
        let pool = Pool::new(manager)?;
        Ok(Self { pool, config })
    }
}

/// Build the HTTP application router.
pub fn build_router(state: AppState) -> Router {
    let team = Router::new()
        .route("/create", post(create_team))
        .route("/update/profile/:teamId", put(update_team_profile))
        .route("/join", put(join_team))
        .route("/profile/:userId", get(team_profile))
        .route("/leave/:userId", delete(leave_team))
        .route("/invite/:userId/:teamId", get(invite_to_team))
        .route("/get/student-info/:teamName", get(team_students))
        .route("/get/list", get(all_teams))
        .route("/get/list/:course", get(teams_by_course))
        .route("/get/unallocated/list", get(unallocated_teams))
        .route("/get/unallocated/list/:course", get(unallocated_teams_by_course))
        .route("/preference/project/:userId", put(update_preferences))
        .route("/get/preferences/:userId", get(team_preferences))
        .route("/project/allocation", put(allocate_project))
        .route("/project/reject", put(reject_allocation));

    let project = Router::new()
        .route("/create", post(create_project))
        .route("/get/public_project/list", get(public_projects))
        .route("/get/archived/list", get(archived_projects))
        .route("/detail/:projectId", get(project_detail))
        .route("/delete/:projectId", delete(delete_project))
        .route("/modify/:projectId", post(modify_project))
        .route("/archive/:projectId", get(archive_project))
        .route("/get/list/byRole/:userId", get(projects_by_role))
        .route("/team/allocated/:projectId", get(allocated_teams))
        .route("/preferencedBy/team/:projectId", get(preferring_teams))
        .route(
            "/:projectId/preferencedBy/:teamId/detail",
            get(preference_detail),
        );

    let message = Router::new()
        .route("/create/channel", post(create_channel))
        .route("/update/channelName", post(rename_channel))
        .route("/invite/to/channel", post(invite_to_channel))
        .route("/leave/channel/:channelId/:userId", delete(leave_channel))
        .route("/:channelId/users/detail", get(channel_members))
        .route("/send", post(send_message))
        .route("/channel/:channelId/messages", get(channel_messages))
        .route("/get/all/channels/:userId", get(user_channels));

    let notification = Router::new()
        .route("/get/all/:userId", get(user_notifications))
        .route("/clear/all/:userId", delete(clear_notifications));

    Router::new()
        .route("/health", get(health))
        .nest("/v1/team", team)
        .nest("/v1/project", project)
        .nest("/v1/message", message)
        .nest("/v1/notification", notification)
        .with_state(state)
}

async fn health() -> &'static str {
    "ok"
}

// team handlers

#[derive(Deserialize)]
struct CreateTeamForm {
    #[serde(rename = "userId")]
    user_id: i64,
}

async fn create_team(
    State(state): State<AppState>,
    Json(form): Json<CreateTeamForm>,
) -> Result<impl IntoResponse> {
    let conn = state.pool.get()?;
    let profile = teams::create(&conn, form.user_id)?;
    tracing::info!(team_id = profile.team_id, "team created");
    Ok(Json(profile))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpdateTeamProfileForm {
    team_name: String,
    #[serde(default)]
    team_skills: Vec<String>,
}

async fn update_team_profile(
    State(state): State<AppState>,
    Path(team_id): Path<i64>,
    Json(form): Json<UpdateTeamProfileForm>,
) -> Result<impl IntoResponse> {
    let conn = state.pool.get()?;
    teams::update_profile(&conn, team_id, &form.team_name, &form.team_skills)?;
    Ok(Json(json!({"msg": "Updated team profile successfully"})))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct JoinTeamForm {
    user_id: i64,
    team_id_show: i64,
}

async fn join_team(
    State(state): State<AppState>,
    Json(form): Json<JoinTeamForm>,
) -> Result<impl IntoResponse> {
    let conn = state.pool.get()?;
    let profile = teams::join(&conn, form.user_id, form.team_id_show)?;
    Ok(Json(profile))
}

async fn team_profile(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
) -> Result<impl IntoResponse> {
    let conn = state.pool.get()?;
    Ok(Json(teams::profile_for_user(&conn, user_id)?))
}

async fn leave_team(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
) -> Result<impl IntoResponse> {
    let mut conn = state.pool.get()?;
    teams::leave(&mut conn, user_id)?;
    Ok(Json(json!({"msg": "User has left the team successfully"})))
}

async fn invite_to_team(
    State(state): State<AppState>,
    Path((user_id, team_id)): Path<(i64, i64)>,
) -> Result<impl IntoResponse> {
    let conn = state.pool.get()?;
    teams::invite(&conn, user_id, team_id)?;
    Ok(Json(json!({"message": "User invited to team successfully"})))
}

async fn team_students(
    State(state): State<AppState>,
    Path(team_name): Path<String>,
) -> Result<impl IntoResponse> {
    let conn = state.pool.get()?;
    Ok(Json(teams::students_of_team(&conn, &team_name)?))
}

async fn all_teams(State(state): State<AppState>) -> Result<impl IntoResponse> {
    let conn = state.pool.get()?;
    Ok(Json(teams::list(&conn, None)?))
}

async fn teams_by_course(
    State(state): State<AppState>,
    Path(course): Path<String>,
) -> Result<impl IntoResponse> {
    let conn = state.pool.get()?;
    Ok(Json(teams::list(&conn, Some(&course))?))
}

async fn unallocated_teams(State(state): State<AppState>) -> Result<impl IntoResponse> {
    let conn = state.pool.get()?;
    Ok(Json(teams::list_unallocated(&conn, None)?))
}

async fn unallocated_teams_by_course(
    State(state): State<AppState>,
    Path(course): Path<String>,
) -> Result<impl IntoResponse> {
    let conn = state.pool.get()?;
    Ok(Json(teams::list_unallocated(&conn, Some(&course))?))
}

async fn update_preferences(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
    Json(entries): Json<Vec<preferences::PreferenceEntry>>,
) -> Result<impl IntoResponse> {
    let mut conn = state.pool.get()?;
    preferences::replace_for_user(&mut conn, user_id, &entries)?;
    Ok(Json(json!("Successfully updated team preferences")))
}

async fn team_preferences(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
) -> Result<impl IntoResponse> {
    let conn = state.pool.get()?;
    Ok(Json(preferences::list_for_user(&conn, user_id)?))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AllocationForm {
    team_id: i64,
    project_id: i64,
    notification: allocation::NotificationRequest,
}

async fn allocate_project(
    State(state): State<AppState>,
    Json(form): Json<AllocationForm>,
) -> Result<impl IntoResponse> {
    let mut conn = state.pool.get()?;
    allocation::allocate(&mut conn, form.team_id, form.project_id, &form.notification)?;
    tracing::info!(
        team_id = form.team_id,
        project_id = form.project_id,
        "project allocated"
    );
    Ok(Json(json!({
        "message": "Project allocated and notification sent successfully"
    })))
}

async fn reject_allocation(
    State(state): State<AppState>,
    Json(form): Json<AllocationForm>,
) -> Result<impl IntoResponse> {
    let mut conn = state.pool.get()?;
    allocation::reject(&mut conn, form.team_id, form.project_id, &form.notification)?;
    tracing::info!(
        team_id = form.team_id,
        project_id = form.project_id,
        "allocation rejected"
    );
    Ok(Json(json!({
        "message": "Allocation canceled and notification sent successfully"
    })))
}

// project handlers

async fn create_project(
    State(state): State<AppState>,
    Json(form): Json<projects::ProjectForm>,
) -> Result<impl IntoResponse> {
    let conn = state.pool.get()?;
    let (project_id, client_id) = projects::create(&conn, &form)?;
    tracing::info!(project_id, "project created");
    Ok(Json(json!({
        "msg": "Project created successfully",
        "projectId": project_id,
        "createdBy": client_id,
    })))
}

async fn public_projects(State(state): State<AppState>) -> Result<impl IntoResponse> {
    let conn = state.pool.get()?;
    Ok(Json(projects::public_list(&conn)?))
}

async fn archived_projects(State(state): State<AppState>) -> Result<impl IntoResponse> {
    let conn = state.pool.get()?;
    Ok(Json(projects::archived_list(&conn)?))
}

async fn project_detail(
    State(state): State<AppState>,
    Path(project_id): Path<i64>,
) -> Result<impl IntoResponse> {
    let conn = state.pool.get()?;
    Ok(Json(projects::detail(&conn, project_id)?))
}

async fn delete_project(
    State(state): State<AppState>,
    Path(project_id): Path<i64>,
) -> Result<impl IntoResponse> {
    let mut conn = state.pool.get()?;
    projects::delete(&mut conn, project_id)?;
    Ok(Json(json!({"success": true})))
}

async fn modify_project(
    State(state): State<AppState>,
    Path(project_id): Path<i64>,
    Json(form): Json<projects::ProjectForm>,
) -> Result<impl IntoResponse> {
    let conn = state.pool.get()?;
    let client = projects::modify(&conn, project_id, &form)?;
    Ok(Json(json!({
        "msg": "Project modified successfully",
        "projectId": project_id,
        "createdBy": client.user_id,
    })))
}

async fn archive_project(
    State(state): State<AppState>,
    Path(project_id): Path<i64>,
) -> Result<impl IntoResponse> {
    let conn = state.pool.get()?;
    projects::archive(&conn, project_id)?;
    Ok(Json(json!({"message": "Project archived"})))
}

async fn projects_by_role(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
) -> Result<impl IntoResponse> {
    let conn = state.pool.get()?;
    Ok(Json(projects::list_by_role(&conn, user_id)?))
}

async fn allocated_teams(
    State(state): State<AppState>,
    Path(project_id): Path<i64>,
) -> Result<impl IntoResponse> {
    let conn = state.pool.get()?;
    Ok(Json(projects::allocated_teams_detail(&conn, project_id)?))
}

async fn preferring_teams(
    State(state): State<AppState>,
    Path(project_id): Path<i64>,
) -> Result<impl IntoResponse> {
    let conn = state.pool.get()?;
    Ok(Json(projects::preferring_teams_detail(&conn, project_id)?))
}

async fn preference_detail(
    State(state): State<AppState>,
    Path((project_id, team_id)): Path<(i64, i64)>,
) -> Result<impl IntoResponse> {
    let conn = state.pool.get()?;
    Ok(Json(projects::preference_detail(&conn, project_id, team_id)?))
}

// message handlers

#[derive(Deserialize)]
struct CreateChannelForm {
    #[serde(rename = "channelType")]
    channel_type: i64,
    #[serde(rename = "userId")]
    user_ids: Vec<i64>,
}

async fn create_channel(
    State(state): State<AppState>,
    Json(form): Json<CreateChannelForm>,
) -> Result<impl IntoResponse> {
    let conn = state.pool.get()?;
    let created = channels::create(&conn, form.channel_type, &form.user_ids)?;
    let msg = if created.existed {
        "private chat channel already exists"
    } else {
        "Create channel successfully"
    };
    let mut body = serde_json::to_value(&created)?;
    body["msg"] = json!(msg);
    Ok(Json(body))
}

#[derive(Deserialize)]
struct RenameChannelForm {
    #[serde(rename = "channelId")]
    channel_id: i64,
    #[serde(rename = "ChannelName")]
    channel_name: String,
}

async fn rename_channel(
    State(state): State<AppState>,
    Json(form): Json<RenameChannelForm>,
) -> Result<impl IntoResponse> {
    let conn = state.pool.get()?;
    channels::rename(&conn, form.channel_id, &form.channel_name)?;
    Ok(Json(json!({"msg": "Update channel name successfully"})))
}

#[derive(Deserialize)]
struct ChannelInviteForm {
    #[serde(rename = "channelId")]
    channel_id: i64,
    #[serde(rename = "userId")]
    user_ids: Vec<i64>,
}

async fn invite_to_channel(
    State(state): State<AppState>,
    Json(form): Json<ChannelInviteForm>,
) -> Result<impl IntoResponse> {
    let conn = state.pool.get()?;
    channels::invite(&conn, form.channel_id, &form.user_ids)?;
    Ok(Json(json!({"msg": "invited to channel successfully"})))
}

async fn leave_channel(
    State(state): State<AppState>,
    Path((channel_id, user_id)): Path<(i64, i64)>,
) -> Result<impl IntoResponse> {
    let mut conn = state.pool.get()?;
    channels::leave(&mut conn, channel_id, user_id)?;
    Ok(Json(json!({"msg": "left channel successfully"})))
}

async fn channel_members(
    State(state): State<AppState>,
    Path(channel_id): Path<i64>,
) -> Result<impl IntoResponse> {
    let conn = state.pool.get()?;
    Ok(Json(channels::members_detail(&conn, channel_id)?))
}

#[derive(Deserialize)]
struct SendMessageForm {
    #[serde(rename = "channelId")]
    channel_id: i64,
    #[serde(rename = "SenderId")]
    sender_id: i64,
    #[serde(rename = "messageType")]
    message_type: i64,
    #[serde(rename = "messageContent")]
    message_content: serde_json::Value,
    notification: allocation::NotificationRequest,
}

async fn send_message(
    State(state): State<AppState>,
    Json(form): Json<SendMessageForm>,
) -> Result<impl IntoResponse> {
    let conn = state.pool.get()?;
    let content = model::MessageContent::from_request(form.message_type, &form.message_content)?;
    messages::send(
        &conn,
        form.channel_id,
        form.sender_id,
        &content,
        &form.notification.content,
        &form.notification.to,
    )?;
    Ok(Json(json!({"msg": "message sent successfully"})))
}

async fn channel_messages(
    State(state): State<AppState>,
    Path(channel_id): Path<i64>,
) -> Result<impl IntoResponse> {
    let conn = state.pool.get()?;
    let messages = messages::for_channel(&conn, channel_id)?;
    Ok(Json(json!({ "messages": messages })))
}

async fn user_channels(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
) -> Result<impl IntoResponse> {
    let conn = state.pool.get()?;
    Ok(Json(channels::for_user(&conn, user_id)?))
}

// notification handlers

async fn user_notifications(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
) -> Result<impl IntoResponse> {
    let conn = state.pool.get()?;
    Ok(Json(notifications::list_for_user(&conn, user_id)?))
}

async fn clear_notifications(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
) -> Result<impl IntoResponse> {
    let mut conn = state.pool.get()?;
    notifications::clear_for_user(&mut conn, user_id)?;
    Ok(Json(json!({"msg": "notifications cleared"})))
}

/// Run the HTTP server bound to the configured address.
pub async fn run_http_server(config: Config) -> anyhow::Result<()> {
    let addr: SocketAddr = config.bind.parse().context("invalid bind address")?;
    let state = AppState::new(config).await?;
    tracing::info!(%addr, "listening");
    axum::Server::bind(&addr)
        .serve(build_router(state).into_make_service())
        .await?;
    Ok(())
}

// Integration tests live in tests/ directory
