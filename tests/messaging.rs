use capstone_match::{
    api::{build_router, AppState},
    config::Config,
};
use std::net::{SocketAddr, TcpListener};
use tokio::task::JoinHandle;

async fn spawn_server() -> (SocketAddr, JoinHandle<()>, AppState, tempfile::TempDir) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    listener.set_nonblocking(true).unwrap();

    let tmp = tempfile::tempdir().unwrap();
    let config = Config {
        bind: addr.to_string(),
        data_dir: tmp.path().to_path_buf(),
        logging_enabled: false,
    };
    let state = AppState::new(config).await.unwrap();
    let app = build_router(state.clone());
    let server = tokio::spawn(async move {
        axum::Server::from_tcp(listener)
            .unwrap()
            .serve(app.into_make_service())
            .await
            .unwrap();
    });
    (addr, server, state, tmp)
}

fn seed_user(state: &AppState, name: &str) -> i64 {
    let conn = state.pool.get().unwrap();
    conn.execute(
        "INSERT INTO users (username, email, course, role) VALUES (?1, ?2, 'COMP9900', 1)",
        rusqlite::params![name, format!("{name}@example.com")],
    )
    .unwrap();
    conn.last_insert_rowid()
}

#[tokio::test]
async fn private_channel_is_idempotent() {
    let (addr, server, state, _tmp) = spawn_server().await;
    let client = reqwest::Client::new();

    let ann = seed_user(&state, "ann");
    let ben = seed_user(&state, "ben");

    let first: serde_json::Value = client
        .post(format!("http://{}/v1/message/create/channel", addr))
        .json(&serde_json::json!({"channelType": 1, "userId": [ann, ben]}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(first["msg"], "Create channel successfully");
    assert_eq!(first["channelName"], "Private Chat: ann and ben");

    // same pair in the other order comes back to the same channel
    let second: serde_json::Value = client
        .post(format!("http://{}/v1/message/create/channel", addr))
        .json(&serde_json::json!({"channelType": 1, "userId": [ben, ann]}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(second["msg"], "private chat channel already exists");
    assert_eq!(second["channelID"], first["channelID"]);

    // a pair needs exactly two users
    let resp = client
        .post(format!("http://{}/v1/message/create/channel", addr))
        .json(&serde_json::json!({"channelType": 1, "userId": [ann]}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), reqwest::StatusCode::BAD_REQUEST);

    server.abort();
}

#[tokio::test]
async fn message_flow_and_cascade_delete() {
    let (addr, server, state, _tmp) = spawn_server().await;
    let client = reqwest::Client::new();

    let ann = seed_user(&state, "ann");
    let ben = seed_user(&state, "ben");
    let cat = seed_user(&state, "cat");

    let created: serde_json::Value = client
        .post(format!("http://{}/v1/message/create/channel", addr))
        .json(&serde_json::json!({"channelType": 2, "userId": [ann, ben, cat]}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let channel_id = created["channelID"].as_i64().unwrap();
    assert_eq!(created["channelName"], "Group Chat: ann, ben, cat");

    // plain then card message
    let resp = client
        .post(format!("http://{}/v1/message/send", addr))
        .json(&serde_json::json!({
            "channelId": channel_id,
            "SenderId": ann,
            "messageType": 1,
            "messageContent": "hello all",
            "notification": {"content": "ann sent a message", "to": [ben, cat]}
        }))
        .send()
        .await
        .unwrap();
    assert!(resp.status().is_success());
    let resp = client
        .post(format!("http://{}/v1/message/send", addr))
        .json(&serde_json::json!({
            "channelId": channel_id,
            "SenderId": ben,
            "messageType": 2,
            "messageContent": {"name": "ben", "email": "ben@example.com"},
            "notification": {"content": "ben shared a card", "to": [ann, cat]}
        }))
        .send()
        .await
        .unwrap();
    assert!(resp.status().is_success());

    // a card body on a plain message is refused
    let resp = client
        .post(format!("http://{}/v1/message/send", addr))
        .json(&serde_json::json!({
            "channelId": channel_id,
            "SenderId": ann,
            "messageType": 1,
            "messageContent": {"name": "x", "email": "y"},
            "notification": {"content": "bad"}
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), reqwest::StatusCode::BAD_REQUEST);

    let body: serde_json::Value = client
        .get(format!("http://{}/v1/message/channel/{}/messages", addr, channel_id))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let msgs = body["messages"].as_array().unwrap();
    assert_eq!(msgs.len(), 2);
    assert_eq!(msgs[0]["messageContent"], "hello all");
    assert_eq!(msgs[0]["senderName"], "ann");
    assert_eq!(msgs[1]["messageContent"]["email"], "ben@example.com");

    // membership listing
    let channels: serde_json::Value = client
        .get(format!("http://{}/v1/message/get/all/channels/{}", addr, ann))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(channels.as_array().unwrap().len(), 1);

    // rename shows up in the member detail listing
    client
        .post(format!("http://{}/v1/message/update/channelName", addr))
        .json(&serde_json::json!({"channelId": channel_id, "ChannelName": "capstone crew"}))
        .send()
        .await
        .unwrap();
    let members: serde_json::Value = client
        .get(format!("http://{}/v1/message/{}/users/detail", addr, channel_id))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(members.as_array().unwrap().len(), 3);

    // everyone leaves, the channel and its messages go away
    for user in [ann, ben, cat] {
        let resp = client
            .delete(format!(
                "http://{}/v1/message/leave/channel/{}/{}",
                addr, channel_id, user
            ))
            .send()
            .await
            .unwrap();
        assert!(resp.status().is_success());
    }
    let resp = client
        .get(format!("http://{}/v1/message/channel/{}/messages", addr, channel_id))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), reqwest::StatusCode::NOT_FOUND);

    server.abort();
}
