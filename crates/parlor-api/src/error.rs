use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use tracing::error;

use parlor_types::api::AuthResponse;

/// Failures surfaced by the JSON auth endpoints.
///
/// Messages are deliberately coarse: callers never learn whether it was
/// the username or the password that was wrong.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("invalid input: {0}")]
    Validation(&'static str),

    #[error("username already taken")]
    Conflict,

    #[error("invalid credentials")]
    Unauthorized,

    /// Store or runtime failure. The first field is the message shown to the caller.
    #[error("{0}: {1:#}")]
    Store(&'static str, anyhow::Error),
}

impl ApiError {
    /// Adapter for `map_err` that tags a store error with its public message.
    pub fn store<E: Into<anyhow::Error>>(public: &'static str) -> impl FnOnce(E) -> Self {
        move |e| Self::Store(public, e.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::Conflict => StatusCode::CONFLICT,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::Store(..) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn public_message(&self) -> &'static str {
        match self {
            Self::Validation(msg) => *msg,
            Self::Conflict => "Registration failed",
            Self::Unauthorized => "Invalid credentials",
            Self::Store(msg, _) => *msg,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if let Self::Store(..) = &self {
            error!("{}", self);
        }
        (self.status(), Json(AuthResponse::failed(self.public_message()))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statuses_follow_error_kind() {
        assert_eq!(ApiError::Validation("x").status(), StatusCode::BAD_REQUEST);
        assert_eq!(ApiError::Conflict.status(), StatusCode::CONFLICT);
        assert_eq!(ApiError::Unauthorized.status(), StatusCode::UNAUTHORIZED);
        let store = ApiError::store("Login failed")(anyhow::anyhow!("disk gone"));
        assert_eq!(store.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(store.public_message(), "Login failed");
    }

    #[test]
    fn store_detail_stays_out_of_public_message() {
        let err = ApiError::store("Registration failed")(anyhow::anyhow!("UNIQUE constraint failed"));
        assert!(err.to_string().contains("UNIQUE"));
        assert!(!err.public_message().contains("UNIQUE"));
    }
}
