use serde::Deserialize;
use tracing::info;

use crate::{
    appresult::StoreResultExt,
    auth::{self, RequestContext},
    hydrate::{RoomRelation, RoomView, Selection},
    AppError, AppResult, AppState,
};

#[derive(Debug, Clone, Deserialize)]
pub struct NewRoom {
    pub name: String,
    pub description: Option<String>,
}

impl AppState {
    /// Creates a room and makes the caller its admin.
    #[tracing::instrument(skip_all, fields(name = %new_room.name))]
    pub async fn create_room(
        &self,
        ctx: &RequestContext,
        new_room: NewRoom,
        selection: &Selection<RoomRelation>,
    ) -> AppResult<RoomView> {
        let viewer = auth::resolve(ctx)?;

        let name = new_room.name.trim();
        if name.is_empty() {
            return Err(AppError::validation("name", "must not be empty"));
        }

        let room = self
            .store
            .create_room_with_admin(name, new_room.description.as_deref(), viewer.user_id())
            .await
            .found("user")?;

        info!(room = %room.id, %viewer, "room created");
        Ok(self.hydrator().room(room, selection).await)
    }
}
