use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    appresult::StoreResultExt,
    auth::{self, RequestContext},
    codec::{self, DeliveryEnvelope},
    db::Message,
    hydrate::{MessageRelation, MessageView, Selection},
    AppError, AppResult, AppState,
};

use super::room_topic;

/// Result of a successful write. The message is stored either way;
/// `warning` is set when live subscribers could not be notified.
#[derive(Debug)]
pub struct Sent {
    pub message: MessageView,
    pub warning: Option<AppError>,
}

impl AppState {
    #[tracing::instrument(skip(self, ctx, content, selection))]
    pub async fn send_message(
        &self,
        ctx: &RequestContext,
        room_id: Uuid,
        content: &str,
        selection: &Selection<MessageRelation>,
    ) -> AppResult<Sent> {
        let viewer = auth::resolve(ctx)?;

        if content.trim().is_empty() {
            return Err(AppError::validation("content", "must not be empty"));
        }

        let message = self
            .store
            .create_message(room_id, viewer.user_id(), content)
            .await
            .found("room")?;
        info!(message_id = %message.id, %viewer, "message stored");

        let warning = self.publish(&message).await.err();
        let message = self.hydrator().message(message, selection).await;

        Ok(Sent { message, warning })
    }

    /// Newest first.
    #[tracing::instrument(skip(self, ctx, selection))]
    pub async fn list_messages(
        &self,
        ctx: &RequestContext,
        room_id: Uuid,
        selection: &Selection<MessageRelation>,
    ) -> AppResult<Vec<MessageView>> {
        auth::resolve(ctx)?;

        let messages = self.store.list_messages(room_id).await.found("messages")?;
        Ok(self.hydrator().messages(messages, selection).await)
    }

    /// Announces an already stored message on its room's topic.
    async fn publish(&self, message: &Message) -> AppResult<()> {
        let payload = codec::encode(&DeliveryEnvelope::from(message))
            .map_err(|err| AppError::PublishDegraded(err.into()))?;

        self.broker
            .publish(&room_topic(message.room_id), payload)
            .await
            .map_err(|err| {
                warn!(message_id = %message.id, error = %err, "live notification failed");
                AppError::PublishDegraded(err.into())
            })
    }
}
