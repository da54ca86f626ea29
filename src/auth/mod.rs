mod extract;

use std::fmt;

use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::{AppError, AppResult};

/// The resolved subject of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Identity(Uuid);

impl Identity {
    pub fn new(user_id: Uuid) -> Self {
        Self(user_id)
    }

    pub fn user_id(&self) -> Uuid {
        self.0
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "u/{}", self.0)
    }
}

/// Request-scoped context handed to every core operation.
///
/// `identity` must be present for any operation to proceed; it is attached
/// upstream (bearer middleware or the login session) and only read here.
/// `cancel` bounds the lifetime of everything the request spawns, most
/// notably live subscriptions: cancelling it tears their bridges down.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    pub identity: Option<Identity>,
    pub cancel: CancellationToken,
}

impl RequestContext {
    pub fn authenticated(identity: Identity) -> Self {
        Self {
            identity: Some(identity),
            cancel: CancellationToken::new(),
        }
    }

    pub fn anonymous() -> Self {
        Self::default()
    }
}

/// Authorization gate: yields the acting identity or rejects the request.
///
/// Not membership-aware; any authenticated viewer may read any room.
pub fn resolve(ctx: &RequestContext) -> AppResult<Identity> {
    ctx.identity.ok_or(AppError::Unauthenticated)
}
