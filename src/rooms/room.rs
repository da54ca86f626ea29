use tracing::{debug, info};
use uuid::Uuid;

use crate::{
    appresult::StoreResultExt,
    auth::{self, RequestContext},
    db::Role,
    hydrate::{RoomRelation, RoomView, Selection},
    store::StoreError,
    AppResult, AppState,
};

impl AppState {
    /// Adds the caller to the room as a member. Joining twice is a no-op.
    #[tracing::instrument(skip(self, ctx, selection))]
    pub async fn join_room(
        &self,
        ctx: &RequestContext,
        room_id: Uuid,
        selection: &Selection<RoomRelation>,
    ) -> AppResult<RoomView> {
        let viewer = auth::resolve(ctx)?;

        match self.store.create_membership(room_id, viewer.user_id(), Role::Member).await {
            Ok(_) => info!(%viewer, "joined room"),
            Err(StoreError::Conflict) => debug!(%viewer, "already in room"),
            Err(err) => return Err(err).found("room"),
        }

        let room = self.store.get_room_by_id(room_id).await.found("room")?;
        Ok(self.hydrator().room(room, selection).await)
    }

    #[tracing::instrument(skip(self, ctx, selection))]
    pub async fn get_room(
        &self,
        ctx: &RequestContext,
        room_id: Uuid,
        selection: &Selection<RoomRelation>,
    ) -> AppResult<RoomView> {
        auth::resolve(ctx)?;

        let room = self.store.get_room_by_id(room_id).await.found("room")?;
        Ok(self.hydrator().room(room, selection).await)
    }

    /// Newest rooms first, each hydrated independently.
    #[tracing::instrument(skip_all)]
    pub async fn list_rooms(
        &self,
        ctx: &RequestContext,
        selection: &Selection<RoomRelation>,
    ) -> AppResult<Vec<RoomView>> {
        auth::resolve(ctx)?;

        let rooms = self.store.list_rooms().await.found("rooms")?;
        Ok(self.hydrator().rooms(rooms, selection).await)
    }
}
