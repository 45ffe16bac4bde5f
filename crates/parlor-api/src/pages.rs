use axum::{
    Extension,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use chrono::{DateTime, Local, NaiveDateTime, Utc};
use serde::Serialize;
use tera::Context;
use tracing::{error, warn};

use parlor_db::models::HistoryRow;
use parlor_types::models::{HistoryEntry, SessionUser};
use parlor_types::{ANONYMOUS_USERNAME, DEFAULT_AVATAR_URL};

use crate::auth::AppState;

/// One history line as the chat template consumes it.
#[derive(Debug, Serialize)]
struct MessageView {
    username: String,
    message: String,
    profile_pic_url: String,
    time: String,
    is_own: bool,
    is_anonymous: bool,
}

pub async fn login_page(State(state): State<AppState>) -> Response {
    render_static(&state, "login.html")
}

pub async fn register_page(State(state): State<AppState>) -> Response {
    render_static(&state, "register.html")
}

/// GET /chat: the full message history, oldest first, then the live client.
pub async fn chat_page(
    State(state): State<AppState>,
    Extension(user): Extension<SessionUser>,
) -> Response {
    let db = state.db.clone();
    let rows = match tokio::task::spawn_blocking(move || db.get_history()).await {
        Ok(Ok(rows)) => rows,
        Ok(Err(e)) => {
            error!("Error fetching chat history: {:#}", e);
            return (StatusCode::INTERNAL_SERVER_ERROR, "Error loading chat.").into_response();
        }
        Err(e) => {
            error!("spawn_blocking join error: {}", e);
            return (StatusCode::INTERNAL_SERVER_ERROR, "Error loading chat.").into_response();
        }
    };

    let messages: Vec<MessageView> = rows
        .into_iter()
        .map(|row| message_view(history_entry(row), &user))
        .collect();

    let mut context = Context::new();
    context.insert("username", &user.username);
    context.insert("messages", &messages);

    match state.renderer.render("chat.html", &context) {
        Ok(html) => html.into_response(),
        Err(e) => {
            error!("Error rendering chat page: {:#}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Error loading chat.").into_response()
        }
    }
}

fn render_static(state: &AppState, template: &str) -> Response {
    match state.renderer.render(template, &Context::new()) {
        Ok(html) => html.into_response(),
        Err(e) => {
            error!("Error rendering {}: {:#}", template, e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// Ownership follows the attributed row, so anonymous posts are never "own".
fn message_view(entry: HistoryEntry, viewer: &SessionUser) -> MessageView {
    MessageView {
        is_own: entry.user_id == viewer.user_id,
        is_anonymous: entry.username == ANONYMOUS_USERNAME,
        time: display_time(entry.created_at),
        username: entry.username,
        message: entry.message,
        profile_pic_url: entry.profile_pic_url,
    }
}

fn history_entry(row: HistoryRow) -> HistoryEntry {
    let created_at = parse_timestamp(&row.created_at).unwrap_or_else(|| {
        warn!("Corrupt created_at '{}' on message '{}'", row.created_at, row.id);
        DateTime::default()
    });

    HistoryEntry {
        user_id: row.user_id,
        username: row.username,
        message: row.message,
        profile_pic_url: row
            .profile_pic_url
            .unwrap_or_else(|| DEFAULT_AVATAR_URL.to_string()),
        created_at,
    }
}

/// SQLite stores timestamps as "YYYY-MM-DD HH:MM:SS.SSS" without timezone.
/// Parse as naive UTC; RFC 3339 is accepted too.
fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    raw.parse::<DateTime<Utc>>().ok().or_else(|| {
        NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f")
            .ok()
            .map(|ndt| ndt.and_utc())
    })
}

/// "3:05 PM" in the server's local time zone.
fn display_time(at: DateTime<Utc>) -> String {
    at.with_timezone(&Local).format("%-I:%M %p").to_string()
}
