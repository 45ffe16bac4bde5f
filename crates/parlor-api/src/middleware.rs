use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use axum_extra::extract::cookie::CookieJar;

use crate::auth::AppState;

/// Resolve the session cookie and expose the [`SessionUser`] as a request
/// extension. Requests without a live session are sent to the login page.
///
/// [`SessionUser`]: parlor_types::models::SessionUser
pub async fn require_session(
    State(state): State<AppState>,
    jar: CookieJar,
    mut req: Request,
    next: Next,
) -> Response {
    let Some(user) = state.sessions.current_user(&jar).await else {
        return Redirect::to("/").into_response();
    };

    req.extensions_mut().insert(user);
    next.run(req).await
}
