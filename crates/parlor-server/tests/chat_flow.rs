//! End-to-end tests: the real router on a loopback port, driven over HTTP
//! and WebSocket the way a browser would.

use std::net::SocketAddr;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use reqwest::StatusCode;
use reqwest::header::{COOKIE, LOCATION, SET_COOKIE};
use serde_json::{Value, json};
use tempfile::TempDir;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use parlor_api::auth::AppState;
use parlor_server::app;
use parlor_server::config::Config;
use parlor_types::{ANONYMOUS_AVATAR_URL, ANONYMOUS_USERNAME, DEFAULT_AVATAR_URL};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

const WAIT: Duration = Duration::from_secs(5);

struct TestApp {
    addr: SocketAddr,
    state: AppState,
    http: reqwest::Client,
    _dir: TempDir,
}

impl TestApp {
    async fn spawn() -> Self {
        let dir = TempDir::new().unwrap();
        let config = Config {
            host: "127.0.0.1".into(),
            port: 0,
            db_path: dir.path().join("chat.db"),
            db_readers: 2,
            public_dir: dir.path().to_path_buf(),
            session_ttl: Duration::from_secs(3600),
            secure_cookies: false,
        };
        let state = app::build_state(&config).unwrap();
        let router = app::router(state.clone(), &config.public_dir);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });

        let http = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .unwrap();

        Self {
            addr,
            state,
            http,
            _dir: dir,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    async fn post_json(&self, path: &str, body: Value) -> (StatusCode, Value, Option<String>) {
        let res = self.http.post(self.url(path)).json(&body).send().await.unwrap();
        let status = res.status();
        let cookie = res
            .headers()
            .get(SET_COOKIE)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(';').next())
            .map(str::to_string);
        let body = res.json::<Value>().await.unwrap();
        (status, body, cookie)
    }

    async fn register(&self, username: &str, password: &str) -> (StatusCode, Value) {
        let (status, body, _) = self
            .post_json("/api/register", json!({ "username": username, "password": password }))
            .await;
        (status, body)
    }

    async fn login(&self, username: &str, password: &str) -> (StatusCode, Value, Option<String>) {
        self.post_json("/api/login", json!({ "username": username, "password": password }))
            .await
    }

    /// Register + login, returning the session cookie pair.
    async fn sign_in(&self, username: &str, password: &str) -> String {
        let (status, _) = self.register(username, password).await;
        assert_eq!(status, StatusCode::OK);
        let (status, _, cookie) = self.login(username, password).await;
        assert_eq!(status, StatusCode::OK);
        cookie.expect("login sets a session cookie")
    }

    async fn get(&self, path: &str, cookie: Option<&str>) -> reqwest::Response {
        let mut req = self.http.get(self.url(path));
        if let Some(cookie) = cookie {
            req = req.header(COOKIE, cookie);
        }
        req.send().await.unwrap()
    }

    async fn try_connect(&self, cookie: Option<&str>) -> Result<Socket, tungstenite::Error> {
        let mut request = format!("ws://{}/socket", self.addr)
            .into_client_request()
            .unwrap();
        if let Some(cookie) = cookie {
            request
                .headers_mut()
                .insert(COOKIE.as_str(), HeaderValue::from_str(cookie).unwrap());
        }
        tokio_tungstenite::connect_async(request)
            .await
            .map(|(socket, _)| socket)
    }

    /// Connect and wait until the server has bound the socket.
    async fn connect(&self, cookie: &str) -> Socket {
        let before = self.connections().await;
        let socket = self.try_connect(Some(cookie)).await.unwrap();
        tokio::time::timeout(WAIT, async {
            while self.connections().await <= before {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("socket was never bound");
        socket
    }

    async fn connections(&self) -> usize {
        self.state.relay.dispatcher().connection_count().await
    }
}

async fn send_chat(socket: &mut Socket, message: &str, is_anonymous: bool) {
    let frame = json!({
        "event": "send-chat-message",
        "data": { "message": message, "isAnonymous": is_anonymous },
    });
    socket.send(Message::text(frame.to_string())).await.unwrap();
}

/// Next `chat-message` payload, skipping control frames.
async fn next_chat_message(socket: &mut Socket) -> Value {
    tokio::time::timeout(WAIT, async {
        loop {
            let frame = socket.next().await.expect("socket closed").unwrap();
            if let Message::Text(text) = frame {
                let envelope: Value = serde_json::from_str(text.as_str()).unwrap();
                assert_eq!(envelope["event"], "chat-message");
                return envelope["data"].clone();
            }
        }
    })
    .await
    .expect("no chat-message received")
}

#[tokio::test]
async fn register_then_login_yields_same_user_id() {
    let app = TestApp::spawn().await;

    let (status, registered) = app.register("alice", "pw1").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(registered["success"], true);

    let (status, logged_in, cookie) = app.login("alice", "pw1").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(logged_in["success"], true);
    assert_eq!(logged_in["userId"], registered["userId"]);
    assert!(cookie.unwrap().starts_with("parlor_session="));
}

#[tokio::test]
async fn bad_credentials_do_not_reveal_which_part_was_wrong() {
    let app = TestApp::spawn().await;
    app.register("alice", "pw1").await;

    let (wrong_pw_status, wrong_pw, cookie) = app.login("alice", "nope").await;
    let (unknown_status, unknown, _) = app.login("mallory", "pw1").await;

    assert_eq!(wrong_pw_status, StatusCode::UNAUTHORIZED);
    assert_eq!(unknown_status, StatusCode::UNAUTHORIZED);
    assert_eq!(wrong_pw, unknown);
    assert_eq!(wrong_pw, json!({ "success": false, "message": "Invalid credentials" }));
    assert!(cookie.is_none());
}

#[tokio::test]
async fn duplicate_and_reserved_usernames_are_rejected() {
    let app = TestApp::spawn().await;
    app.register("alice", "pw1").await;

    let (status, body) = app.register("alice", "pw2").await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["success"], false);

    let (status, _) = app.register(ANONYMOUS_USERNAME, "pw").await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = app.register("   ", "pw").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (status, _) = app.register("bob", "").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn malformed_auth_bodies_get_json_failures() {
    let app = TestApp::spawn().await;

    let (status, body, cookie) = app.post_json("/api/login", json!({ "username": "alice" })).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body, json!({ "success": false, "message": "Invalid credentials" }));
    assert!(cookie.is_none());

    let (status, body, _) = app.post_json("/api/register", json!({ "username": "alice" })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, json!({ "success": false, "message": "Invalid registration" }));

    let res = app
        .http
        .post(app.url("/api/register"))
        .body("not json")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body = res.json::<Value>().await.unwrap();
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn extra_fields_in_auth_bodies_are_ignored() {
    let app = TestApp::spawn().await;

    let (status, registered, _) = app
        .post_json(
            "/api/register",
            json!({ "username": "alice", "password": "pw1", "confirm": "pw1" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, logged_in, cookie) = app
        .post_json(
            "/api/login",
            json!({ "username": "alice", "password": "pw1", "remember": true }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(logged_in["userId"], registered["userId"]);
    assert!(cookie.is_some());
}

#[tokio::test]
async fn anonymous_row_cannot_log_in() {
    let app = TestApp::spawn().await;
    let cookie = app.sign_in("alice", "pw1").await;
    let mut socket = app.connect(&cookie).await;
    send_chat(&mut socket, "creates the row", true).await;
    next_chat_message(&mut socket).await;

    let (status, _, _) = app.login(ANONYMOUS_USERNAME, "").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn pages_require_a_session() {
    let app = TestApp::spawn().await;

    let res = app.get("/chat", None).await;
    assert_eq!(res.status(), StatusCode::SEE_OTHER);
    assert_eq!(res.headers()[LOCATION], "/");

    let res = app.get("/chat", Some("parlor_session=forged")).await;
    assert_eq!(res.status(), StatusCode::SEE_OTHER);

    assert_eq!(app.get("/", None).await.status(), StatusCode::OK);
    assert_eq!(app.get("/register", None).await.status(), StatusCode::OK);
}

#[tokio::test]
async fn unauthenticated_socket_is_refused() {
    let app = TestApp::spawn().await;

    for cookie in [None, Some("parlor_session=forged")] {
        match app.try_connect(cookie).await {
            Err(tungstenite::Error::Http(res)) => {
                assert_eq!(res.status(), StatusCode::UNAUTHORIZED.as_u16());
            }
            Err(other) => panic!("unexpected error: {other}"),
            Ok(_) => panic!("socket without a session was accepted"),
        }
    }
    assert_eq!(app.connections().await, 0);
}

#[tokio::test]
async fn message_is_broadcast_to_everyone_including_sender() {
    let app = TestApp::spawn().await;
    let alice_cookie = app.sign_in("alice", "pw1").await;
    let bob_cookie = app.sign_in("bob", "pw2").await;

    let mut alice = app.connect(&alice_cookie).await;
    let mut bob = app.connect(&bob_cookie).await;

    send_chat(&mut alice, "hello", false).await;

    for socket in [&mut alice, &mut bob] {
        let msg = next_chat_message(socket).await;
        assert_eq!(msg["name"], "alice");
        assert_eq!(msg["message"], "hello");
        assert_eq!(msg["profile_pic_url"], DEFAULT_AVATAR_URL);
        assert!(msg["created_at"].as_str().unwrap().contains('T'));
    }
}

#[tokio::test]
async fn anonymous_message_is_attributed_to_shared_row() {
    let app = TestApp::spawn().await;
    let alice_cookie = app.sign_in("alice", "pw1").await;
    let bob_cookie = app.sign_in("bob", "pw2").await;
    let mut alice = app.connect(&alice_cookie).await;
    let mut bob = app.connect(&bob_cookie).await;

    send_chat(&mut alice, "secret", true).await;
    let msg = next_chat_message(&mut bob).await;
    assert_eq!(msg["name"], ANONYMOUS_USERNAME);
    assert_eq!(msg["message"], "secret");
    assert_eq!(msg["profile_pic_url"], ANONYMOUS_AVATAR_URL);
    next_chat_message(&mut alice).await;

    send_chat(&mut bob, "me too", true).await;
    next_chat_message(&mut alice).await;

    let history = app.state.db.get_history().unwrap();
    assert_eq!(history.len(), 2);
    assert!(history.iter().all(|row| row.username == ANONYMOUS_USERNAME));
    assert_eq!(history[0].user_id, history[1].user_id);

    let page = app.get("/chat", Some(&bob_cookie)).await;
    assert_eq!(page.status(), StatusCode::OK);
    let html = page.text().await.unwrap();
    assert!(html.contains("secret"));
    assert!(html.contains("anonymous-message"));
}

#[tokio::test]
async fn history_replays_oldest_first() {
    let app = TestApp::spawn().await;
    let cookie = app.sign_in("alice", "pw1").await;
    let mut socket = app.connect(&cookie).await;

    for body in ["first", "second", "third"] {
        send_chat(&mut socket, body, false).await;
        next_chat_message(&mut socket).await;
    }

    let html = app.get("/chat", Some(&cookie)).await.text().await.unwrap();
    let first = html.find("first").unwrap();
    let second = html.find("second").unwrap();
    let third = html.find("third").unwrap();
    assert!(first < second && second < third);
    assert!(html.contains("data-username=\"alice\""));
}

#[tokio::test]
async fn bad_frames_are_ignored() {
    let app = TestApp::spawn().await;
    let cookie = app.sign_in("alice", "pw1").await;
    let mut socket = app.connect(&cookie).await;

    socket.send(Message::text("not json")).await.unwrap();
    socket
        .send(Message::text(json!({ "event": "typing", "data": {} }).to_string()))
        .await
        .unwrap();
    send_chat(&mut socket, "still here", false).await;

    let msg = next_chat_message(&mut socket).await;
    assert_eq!(msg["message"], "still here");
}

#[tokio::test]
async fn logout_ends_session_but_not_bound_sockets() {
    let app = TestApp::spawn().await;
    let alice_cookie = app.sign_in("alice", "pw1").await;
    let bob_cookie = app.sign_in("bob", "pw2").await;
    let mut alice = app.connect(&alice_cookie).await;
    let mut bob = app.connect(&bob_cookie).await;

    let res = app.get("/logout", Some(&alice_cookie)).await;
    assert_eq!(res.status(), StatusCode::SEE_OTHER);
    assert_eq!(res.headers()[LOCATION], "/");

    assert_eq!(app.get("/chat", Some(&alice_cookie)).await.status(), StatusCode::SEE_OTHER);
    assert!(app.try_connect(Some(&alice_cookie)).await.is_err());

    // The socket bound before logout keeps receiving.
    send_chat(&mut bob, "are you there?", false).await;
    let msg = next_chat_message(&mut alice).await;
    assert_eq!(msg["message"], "are you there?");
    next_chat_message(&mut bob).await;
}

#[tokio::test]
async fn closed_socket_leaves_broadcast_group() {
    let app = TestApp::spawn().await;
    let cookie = app.sign_in("alice", "pw1").await;
    let mut socket = app.connect(&cookie).await;
    assert_eq!(app.connections().await, 1);

    socket.close(None).await.unwrap();
    tokio::time::timeout(WAIT, async {
        while app.connections().await > 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("connection was never unregistered");
}
