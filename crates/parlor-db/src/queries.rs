use crate::Database;
use crate::models::{HistoryRow, UserRow};
use anyhow::Result;
use parlor_types::{ANONYMOUS_AVATAR_URL, ANONYMOUS_USERNAME};
use rusqlite::Connection;

impl Database {
    // -- Users --

    /// Insert a new user. Returns `None` when the username is already taken.
    pub fn create_user(&self, username: &str, password_hash: &str) -> Result<Option<i64>> {
        self.with_conn_mut(|conn| {
            let inserted = conn.execute(
                "INSERT INTO users (username, password) VALUES (?1, ?2)
                 ON CONFLICT(username) DO NOTHING",
                (username, password_hash),
            )?;
            if inserted == 0 {
                return Ok(None);
            }
            Ok(Some(conn.last_insert_rowid()))
        })
    }

    pub fn get_user_by_username(&self, username: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, username))
    }

    /// Stored avatar for a user; `None` when the user has none or does not exist.
    pub fn get_avatar_url(&self, user_id: i64) -> Result<Option<String>> {
        self.with_conn(|conn| {
            let url: Option<Option<String>> = conn
                .query_row(
                    "SELECT profile_pic_url FROM users WHERE id = ?1",
                    [user_id],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(url.flatten())
        })
    }

    /// Id of the shared anonymous author, creating the row on first use.
    ///
    /// The insert is a no-op when another writer got there first, so two
    /// first-time anonymous submissions always resolve to the same row.
    pub fn get_or_create_anonymous_user(&self) -> Result<i64> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO users (username, password, profile_pic_url) VALUES (?1, '', ?2)
                 ON CONFLICT(username) DO NOTHING",
                (ANONYMOUS_USERNAME, ANONYMOUS_AVATAR_URL),
            )?;
            let id = conn.query_row(
                "SELECT id FROM users WHERE username = ?1",
                [ANONYMOUS_USERNAME],
                |row| row.get(0),
            )?;
            Ok(id)
        })
    }

    // -- Messages --

    pub fn insert_message(&self, user_id: i64, body: &str) -> Result<i64> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO messages (user_id, message) VALUES (?1, ?2)",
                rusqlite::params![user_id, body],
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    /// Every stored message, oldest first.
    pub fn get_history(&self) -> Result<Vec<HistoryRow>> {
        self.with_conn(query_history)
    }
}

fn query_user(conn: &Connection, username: &str) -> Result<Option<UserRow>> {
    let mut stmt = conn.prepare(
        "SELECT id, username, password, profile_pic_url, created_at FROM users WHERE username = ?1",
    )?;

    let row = stmt
        .query_row([username], |row| {
            Ok(UserRow {
                id: row.get(0)?,
                username: row.get(1)?,
                password: row.get(2)?,
                profile_pic_url: row.get(3)?,
                created_at: row.get(4)?,
            })
        })
        .optional()?;

    Ok(row)
}

fn query_history(conn: &Connection) -> Result<Vec<HistoryRow>> {
    let mut stmt = conn.prepare(
        "SELECT m.id, m.user_id, u.username, u.profile_pic_url, m.message, m.created_at
         FROM messages m
         JOIN users u ON m.user_id = u.id
         ORDER BY m.created_at ASC, m.id ASC",
    )?;

    let rows = stmt
        .query_map([], |row| {
            Ok(HistoryRow {
                id: row.get(0)?,
                user_id: row.get(1)?,
                username: row.get(2)?,
                profile_pic_url: row.get(3)?,
                message: row.get(4)?,
                created_at: row.get(5)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(rows)
}

/// Extension trait for optional query results
trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
