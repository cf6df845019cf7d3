use std::net::SocketAddr;

use serde_json::{Value, json};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use matchday::config::Config;
use matchday::db::{self, Db};
use matchday::http::{self, AppState};

async fn spawn_server() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");
    let config = Config {
        password_rounds: 1_000,
        ..Config::default()
    };
    let state = AppState::new(Db::new(db::open_in_memory().expect("db")), config);
    tokio::spawn(async move {
        let _ = http::serve_on(listener, state).await;
    });
    addr
}

async fn send_raw(
    addr: SocketAddr,
    method: &str,
    path: &str,
    token: Option<&str>,
    body: Option<&str>,
) -> (u16, String, String) {
    let mut stream = tokio::net::TcpStream::connect(addr)
        .await
        .expect("connect server");
    let mut req = format!("{method} {path} HTTP/1.1\r\nHost: {addr}\r\nConnection: close\r\n");
    if let Some(token) = token {
        req.push_str(&format!("Authorization: Bearer {token}\r\n"));
    }
    let body = body.unwrap_or("");
    if !body.is_empty() {
        req.push_str("Content-Type: application/json\r\n");
    }
    req.push_str(&format!("Content-Length: {}\r\n\r\n{body}", body.len()));
    stream
        .write_all(req.as_bytes())
        .await
        .expect("write request");
    let mut response = String::new();
    stream
        .read_to_string(&mut response)
        .await
        .expect("read response");
    let (head, body) = response
        .split_once("\r\n\r\n")
        .expect("http response separator");
    let status = head
        .lines()
        .next()
        .and_then(|line| line.split_whitespace().nth(1))
        .and_then(|s| s.parse::<u16>().ok())
        .expect("status");
    (status, head.to_string(), body.to_string())
}

async fn send_json(
    addr: SocketAddr,
    method: &str,
    path: &str,
    token: Option<&str>,
    body: Value,
) -> (u16, Value) {
    let raw = body.to_string();
    let (status, _, body) = send_raw(addr, method, path, token, Some(&raw)).await;
    (status, serde_json::from_str(&body).unwrap_or(Value::Null))
}

async fn register(addr: SocketAddr, email: &str, name: &str) -> String {
    let (status, body) = send_json(
        addr,
        "POST",
        "/api/auth/register",
        None,
        json!({"email": email, "password": "long enough", "display_name": name}),
    )
    .await;
    assert_eq!(status, 201, "register failed: {body}");
    body["token"].as_str().expect("token").to_string()
}

#[tokio::test]
async fn health_reports_service() {
    let addr = spawn_server().await;
    let (status, head, body) = send_raw(addr, "GET", "/health", None, None).await;
    assert_eq!(status, 200);
    assert!(head.to_ascii_lowercase().contains("content-type: application/json"));
    let body: Value = serde_json::from_str(&body).expect("json");
    assert_eq!(body, json!({"ok": true, "service": "matchday"}));
}

#[tokio::test]
async fn sessions_gate_the_api() {
    let addr = spawn_server().await;

    let (status, _, body) = send_raw(addr, "GET", "/api/me", None, None).await;
    assert_eq!(status, 401);
    let body: Value = serde_json::from_str(&body).expect("json");
    assert_eq!(body["error"]["code"], "unauthorized");

    let token = register(addr, "ada@example.test", "Ada").await;
    let (status, _, body) = send_raw(addr, "GET", "/api/me", Some(&token), None).await;
    assert_eq!(status, 200);
    let me: Value = serde_json::from_str(&body).expect("json");
    assert_eq!(me["email"], "ada@example.test");
    assert!(me.get("password_hash").is_none());

    let (status, body) = send_json(
        addr,
        "POST",
        "/api/auth/register",
        None,
        json!({"email": "ADA@example.test", "password": "long enough", "display_name": "Again"}),
    )
    .await;
    assert_eq!(status, 409);
    assert_eq!(body["error"]["code"], "conflict");

    let (status, body) = send_json(
        addr,
        "POST",
        "/api/auth/login",
        None,
        json!({"email": "ada@example.test", "password": "wrong password"}),
    )
    .await;
    assert_eq!(status, 401);
    assert_eq!(body["error"]["code"], "unauthorized");

    let (status, _, _) = send_raw(addr, "POST", "/api/auth/logout", Some(&token), None).await;
    assert_eq!(status, 204);
    let (status, _, _) = send_raw(addr, "GET", "/api/me", Some(&token), None).await;
    assert_eq!(status, 401);
}

#[tokio::test]
async fn malformed_requests_get_the_error_envelope() {
    let addr = spawn_server().await;
    let token = register(addr, "ada@example.test", "Ada").await;

    let (status, _, body) = send_raw(addr, "POST", "/api/groups", Some(&token), Some("{\"name\": ")).await;
    assert_eq!(status, 422);
    let body: Value = serde_json::from_str(&body).expect("json");
    assert_eq!(body["error"]["code"], "validation_failed");
    assert!(body["error"]["message"].is_string());

    let (status, body) = send_json(addr, "POST", "/api/groups", Some(&token), json!({"name": "  "})).await;
    assert_eq!(status, 422);
    assert_eq!(body["error"]["code"], "validation_failed");

    let (status, _, body) = send_raw(addr, "GET", "/api/groups/not-a-number", Some(&token), None).await;
    assert_eq!(status, 404);
    let body: Value = serde_json::from_str(&body).expect("json");
    assert_eq!(body["error"]["code"], "not_found");
}

#[tokio::test]
async fn groups_are_private_to_members() {
    let addr = spawn_server().await;
    let admin = register(addr, "ada@example.test", "Ada").await;
    let outsider = register(addr, "eve@example.test", "Eve").await;

    let (status, group) = send_json(
        addr,
        "POST",
        "/api/groups",
        Some(&admin),
        json!({"name": "Sunday League"}),
    )
    .await;
    assert_eq!(status, 201);
    assert_eq!(group["role"], "admin");
    assert_eq!(group["member_count"], 1);
    let gid = group["id"].as_i64().expect("group id");
    let code = group["invite_code"].as_str().expect("invite code").to_string();

    let path = format!("/api/groups/{gid}/players");
    let (status, _, body) = send_raw(addr, "GET", &path, Some(&outsider), None).await;
    assert_eq!(status, 403);
    let body: Value = serde_json::from_str(&body).expect("json");
    assert_eq!(body["error"]["code"], "forbidden");

    let (status, body) = send_json(
        addr,
        "POST",
        "/api/groups/join",
        Some(&outsider),
        json!({"invite_code": "NOPE0000"}),
    )
    .await;
    assert_eq!(status, 404, "unexpected body {body}");

    let (status, joined) = send_json(
        addr,
        "POST",
        "/api/groups/join",
        Some(&outsider),
        json!({"invite_code": code}),
    )
    .await;
    assert_eq!(status, 200);
    assert_eq!(joined["role"], "member");

    let (status, _, body) = send_raw(addr, "GET", &path, Some(&outsider), None).await;
    assert_eq!(status, 200);
    assert_eq!(serde_json::from_str::<Value>(&body).expect("json"), json!([]));

    let (status, _) = send_json(addr, "POST", &path, Some(&outsider), json!({"name": "Zed"})).await;
    assert_eq!(status, 403);

    let (status, _, body) = send_raw(addr, "GET", "/api/groups", Some(&outsider), None).await;
    assert_eq!(status, 200);
    let listed: Value = serde_json::from_str(&body).expect("json");
    assert_eq!(listed.as_array().map(Vec::len), Some(1));

    for query in ["include_deleted=", "include_deleted=false", "include_deleted=true"] {
        let (status, _, body) =
            send_raw(addr, "GET", &format!("/api/groups?{query}"), Some(&admin), None).await;
        assert_eq!(status, 200, "{query}: {body}");
    }
    let (status, _, _) = send_raw(addr, "GET", &format!("{path}?include_deleted="), Some(&admin), None).await;
    assert_eq!(status, 200);
    let (status, _, _) = send_raw(addr, "GET", "/api/groups?include_deleted=perhaps", Some(&admin), None).await;
    assert_eq!(status, 422);
}

#[tokio::test]
async fn a_matchday_can_be_played_over_http() {
    let addr = spawn_server().await;
    let admin = register(addr, "ada@example.test", "Ada").await;
    let (_, group) = send_json(addr, "POST", "/api/groups", Some(&admin), json!({"name": "Weeknight"})).await;
    let gid = group["id"].as_i64().expect("group id");

    let mut player_ids = Vec::new();
    for (name, skill) in [("Ana", 7), ("Ben", 6), ("Cid", 5), ("Dot", 4)] {
        let (status, player) = send_json(
            addr,
            "POST",
            &format!("/api/groups/{gid}/players"),
            Some(&admin),
            json!({"name": name, "skill": skill, "position": "any"}),
        )
        .await;
        assert_eq!(status, 201);
        player_ids.push(player["id"].as_i64().expect("player id"));
    }

    let (status, matchday) = send_json(
        addr,
        "POST",
        &format!("/api/groups/{gid}/matchdays"),
        Some(&admin),
        json!({"title": "Week 1", "scheduled_at": "2026-03-01T18:00:00Z"}),
    )
    .await;
    assert_eq!(status, 201);
    assert_eq!(matchday["status"], "scheduled");
    let mid = matchday["id"].as_i64().expect("matchday id");

    let (status, generated) = send_json(
        addr,
        "POST",
        &format!("/api/groups/{gid}/matchdays/{mid}/teams/generate"),
        Some(&admin),
        json!({"player_ids": player_ids, "seed": 3}),
    )
    .await;
    assert_eq!(status, 201);
    assert_eq!(generated["strategy"], "balanced");
    let teams = generated["teams"].as_array().expect("teams");
    assert_eq!(teams.len(), 2);
    let home = teams[0]["id"].as_i64().expect("home id");
    let away = teams[1]["id"].as_i64().expect("away id");
    assert_eq!(teams[0]["total_skill"], teams[1]["total_skill"]);

    let (status, game) = send_json(
        addr,
        "POST",
        &format!("/api/groups/{gid}/matchdays/{mid}/games"),
        Some(&admin),
        json!({"home_team_id": home, "away_team_id": away, "home_score": 1, "away_score": 0, "status": "finished"}),
    )
    .await;
    assert_eq!(status, 201);
    let game_id = game["id"].as_i64().expect("game id");

    let scorer = teams[0]["players"][0]["id"].as_i64().expect("scorer");
    let (status, event) = send_json(
        addr,
        "POST",
        &format!("/api/groups/{gid}/games/{game_id}/events"),
        Some(&admin),
        json!({"kind": "goal", "player_id": scorer, "minute": 9}),
    )
    .await;
    assert_eq!(status, 201);
    assert_eq!(event["team_id"], home);

    let (status, body) = send_json(
        addr,
        "PUT",
        &format!("/api/groups/{gid}/games/{game_id}/shootout"),
        Some(&admin),
        json!({"kicks": [{"team_id": home, "player_id": scorer, "scored": true}]}),
    )
    .await;
    assert_eq!(status, 409, "unexpected body {body}");

    let (status, _, body) = send_raw(
        addr,
        "GET",
        &format!("/api/groups/{gid}/stats?from=2026-01-01"),
        Some(&admin),
        None,
    )
    .await;
    assert_eq!(status, 200);
    let stats: Value = serde_json::from_str(&body).expect("json");
    assert_eq!(stats["totals"], json!({"matchdays": 1, "games": 1, "goals": 1}));
    assert_eq!(stats["players"][0]["points"], 3);

    let (status, _, body) = send_raw(
        addr,
        "GET",
        &format!("/api/groups/{gid}/stats?from=yesterday"),
        Some(&admin),
        None,
    )
    .await;
    assert_eq!(status, 422, "unexpected body {body}");

    let (status, _, body) = send_raw(
        addr,
        "GET",
        &format!("/api/groups/{gid}/matchdays/{mid}/standings"),
        Some(&admin),
        None,
    )
    .await;
    assert_eq!(status, 200);
    let standings: Value = serde_json::from_str(&body).expect("json");
    assert_eq!(standings["table"][0]["team_id"], home);
    assert_eq!(standings["top_scorers"][0]["player_id"], scorer);

    let (status, _, body) = send_raw(
        addr,
        "GET",
        &format!("/api/groups/{gid}/activity?entity_type=game_event"),
        Some(&admin),
        None,
    )
    .await;
    assert_eq!(status, 200);
    let activity: Value = serde_json::from_str(&body).expect("json");
    assert_eq!(activity["entries"].as_array().map(Vec::len), Some(1));
    assert_eq!(activity["entries"][0]["action"], "create");
}
