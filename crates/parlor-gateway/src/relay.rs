use std::sync::Arc;

use anyhow::Result;
use chrono::{SecondsFormat, Utc};
use tracing::{debug, error};

use parlor_db::Database;
use parlor_types::events::{ChatMessage, ServerEvent};
use parlor_types::models::SessionUser;
use parlor_types::{ANONYMOUS_AVATAR_URL, ANONYMOUS_USERNAME, DEFAULT_AVATAR_URL};

use crate::dispatcher::Dispatcher;

/// Who a stored message is attributed to and how it is shown.
#[derive(Debug)]
struct Attribution {
    user_id: i64,
    display_name: String,
    display_avatar: String,
}

/// Accepts chat submissions from bound connections, stores them and fans
/// them out through the dispatcher.
#[derive(Clone)]
pub struct Relay {
    db: Arc<Database>,
    dispatcher: Dispatcher,
}

impl Relay {
    pub fn new(db: Arc<Database>, dispatcher: Dispatcher) -> Self {
        Self { db, dispatcher }
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Store and broadcast one message.
    ///
    /// Store failures are logged and the message is dropped: nothing is
    /// broadcast and the sender is not told. Returns the broadcast payload
    /// when the message went out.
    pub async fn submit(&self, user: &SessionUser, body: String, is_anonymous: bool) -> Option<ChatMessage> {
        let db = self.db.clone();
        let submitter = user.clone();
        let stored = tokio::task::spawn_blocking(move || {
            store_message(&db, &submitter, &body, is_anonymous).map(|attribution| (attribution, body))
        })
        .await;

        let (attribution, body) = match stored {
            Ok(Ok(stored)) => stored,
            Ok(Err(e)) => {
                error!("Error saving message from {} ({}): {:#}", user.username, user.user_id, e);
                return None;
            }
            Err(e) => {
                error!("spawn_blocking join error: {}", e);
                return None;
            }
        };

        let message = ChatMessage {
            name: attribution.display_name,
            message: body,
            created_at: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            profile_pic_url: attribution.display_avatar,
        };

        let delivered = self
            .dispatcher
            .broadcast(ServerEvent::ChatMessage(message.clone()))
            .await;
        debug!("chat-message from {} delivered to {} connections", user.username, delivered);

        Some(message)
    }
}

/// Resolve attribution and persist the row. Runs on the blocking pool.
fn store_message(db: &Database, user: &SessionUser, body: &str, is_anonymous: bool) -> Result<Attribution> {
    let avatar = db
        .get_avatar_url(user.user_id)?
        .unwrap_or_else(|| DEFAULT_AVATAR_URL.to_string());

    let attribution = if is_anonymous {
        Attribution {
            user_id: db.get_or_create_anonymous_user()?,
            display_name: ANONYMOUS_USERNAME.to_string(),
            display_avatar: ANONYMOUS_AVATAR_URL.to_string(),
        }
    } else {
        Attribution {
            user_id: user.user_id,
            display_name: user.username.clone(),
            display_avatar: avatar,
        }
    };

    db.insert_message(attribution.user_id, body)?;
    Ok(attribution)
}
