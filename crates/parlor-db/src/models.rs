/// Database row types. These map directly to SQLite rows and stay
/// independent of the wire types in parlor-types.

pub struct UserRow {
    pub id: i64,
    pub username: String,
    pub password: String,
    pub profile_pic_url: Option<String>,
    pub created_at: String,
}

/// A message joined with its attributed author.
pub struct HistoryRow {
    pub id: i64,
    pub user_id: i64,
    pub username: String,
    pub profile_pic_url: Option<String>,
    pub message: String,
    pub created_at: String,
}
