pub mod api;
pub mod events;
pub mod models;

/// Display name and login name of the shared anonymous author row.
pub const ANONYMOUS_USERNAME: &str = "anonymous";

/// Avatar shown for anonymous messages.
pub const ANONYMOUS_AVATAR_URL: &str = "/img/anonymous.png";

/// Avatar shown for users without a stored profile picture.
pub const DEFAULT_AVATAR_URL: &str = "/img/default-profile.png";
