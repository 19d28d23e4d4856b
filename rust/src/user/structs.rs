use serde::Serialize;
use tower_cookies::Cookies;

use crate::{RootErrors, ServerState};

/// Name of the cookie carrying the opaque session id.
pub const USER_SESSION_COOKIE: &str = "USER_SESSION_ID";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct User {
    pub id: i64,
    pub email: String,
    /// Display name, not unique. If you need something tied to this user, use the ID.
    pub username: String,
    pub avatar: Option<String>,
}

/// The slice of a user that gets attached to every post they own.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct OwnerSummary {
    pub id: i64,
    pub username: String,
    pub avatar: Option<String>,
}

/// Who the session service says is on the other end of a request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionIdentity {
    pub email: String,
}

impl User {
    pub fn summary(&self) -> OwnerSummary {
        OwnerSummary {
            id: self.id,
            username: self.username.clone(),
            avatar: self.avatar.clone(),
        }
    }

    /// Given access to a request's cookie jar, attempts to get the session identity.
    /// Returns Ok(None) for anonymous requests and dead sessions.
    pub async fn session_from_cookie_jar(
        state: &ServerState,
        cookie_jar: &Cookies,
    ) -> Result<Option<SessionIdentity>, RootErrors> {
        let Some(session_cookie) = cookie_jar.get(USER_SESSION_COOKIE) else {
            return Ok(None);
        };

        state
            .sessions
            .resolve_session(session_cookie.value())
            .await
            .map_err(|err| {
                tracing::error!(error = %err, "[SESSION] Failed resolving session");
                RootErrors::InternalServerError
            })
    }

    /// Finds the user a session identity belongs to.
    pub async fn get_by_session(
        state: &ServerState,
        session: &SessionIdentity,
    ) -> Result<Option<Self>, RootErrors> {
        state
            .db
            .get_user_by_email(&session.email)
            .await
            .map_err(|err| {
                tracing::error!(error = %err, "[SESSION] Failed looking up session user");
                RootErrors::InternalServerError
            })
    }

    /// Given access to a request's cookie jar, attempts to get the logged in user.
    /// A valid session whose user row is gone counts as logged out.
    pub async fn get_from_cookie_jar(
        state: &ServerState,
        cookie_jar: &Cookies,
    ) -> Result<Option<Self>, RootErrors> {
        match Self::session_from_cookie_jar(state, cookie_jar).await? {
            None => Ok(None),
            Some(session) => Self::get_by_session(state, &session).await,
        }
    }
}
