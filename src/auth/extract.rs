use axum::{extract::FromRequestParts, http::request::Parts};
use tower_sessions::Session;
use uuid::Uuid;

use crate::{session::USER_ID, AppError};

use super::{Identity, RequestContext};

impl<S> FromRequestParts<S> for RequestContext
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        if let Some(identity) = parts.extensions.get::<Identity>() {
            return Ok(Self::authenticated(*identity));
        }

        let Some(session) = parts.extensions.get::<Session>().cloned() else {
            return Ok(Self::anonymous());
        };

        // a malformed id in the session is treated the same as no login at all
        let identity = session
            .get::<String>(USER_ID)
            .await?
            .and_then(|user_id| Uuid::parse_str(&user_id).ok())
            .map(Identity::new);

        Ok(Self { identity, ..Self::default() })
    }
}
