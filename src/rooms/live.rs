use futures_util::{stream, Stream};
use tokio::{
    sync::mpsc::{self, error::TrySendError},
    task::JoinHandle,
};
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{debug, error, info_span, warn, Instrument};
use uuid::Uuid;

use crate::{
    auth::{self, RequestContext},
    broker::Subscription,
    codec::{self, DeliveryEnvelope},
    hydrate::{Hydrator, MessageRelation, MessageView, Selection},
    AppError, AppResult, AppState,
};

use super::room_topic;

/// At most one message waits for a slow subscriber; anything arriving
/// while the slot is taken is dropped.
const QUEUE_CAPACITY: usize = 1;

/// A viewer's live view of one room.
///
/// Fed by a background bridge task that lives until the request context is
/// cancelled, the broker closes the topic, or the feed is closed or dropped.
pub struct LiveFeed {
    queue: mpsc::Receiver<DeliveryEnvelope>,
    hydrator: Hydrator,
    selection: Selection<MessageRelation>,
    cancel: CancellationToken,
    task: JoinHandle<()>,
    _guard: DropGuard,
}

impl LiveFeed {
    /// Next message, shaped with the subscriber's selection. `None` once the
    /// feed has ended.
    pub async fn recv(&mut self) -> Option<MessageView> {
        let envelope = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return None,
            envelope = self.queue.recv() => envelope?,
        };

        Some(self.hydrator.message(envelope.into(), &self.selection).await)
    }

    /// Whether the bridge task has torn down.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Stops the bridge and waits until the subscription is released.
    pub async fn close(self) {
        let LiveFeed { task, _guard: guard, .. } = self;
        drop(guard);

        if let Err(err) = task.await {
            error!(error = %err, "live bridge task failed");
        }
    }

    pub fn into_stream(self) -> impl Stream<Item = MessageView> {
        stream::unfold(self, |mut feed| async move {
            let message = feed.recv().await?;
            Some((message, feed))
        })
    }
}

impl AppState {
    /// Opens a live feed of the room's messages for the caller.
    ///
    /// The broker handshake completes before this returns, so a failed
    /// subscription is reported here and never as a silent, empty feed.
    #[tracing::instrument(skip(self, ctx, selection))]
    pub async fn subscribe_to_room_messages(
        &self,
        ctx: &RequestContext,
        room_id: Uuid,
        selection: Selection<MessageRelation>,
    ) -> AppResult<LiveFeed> {
        let viewer = auth::resolve(ctx)?;

        let subscription = self
            .broker
            .subscribe(&room_topic(room_id))
            .await
            .map_err(|err| {
                error!(error = %err, "room subscription failed");
                AppError::SubscriptionFailed(err)
            })?;

        let (tx, queue) = mpsc::channel(QUEUE_CAPACITY);
        let cancel = ctx.cancel.child_token();
        let span = info_span!("live_bridge", room = %room_id, %viewer);
        let task = tokio::spawn(bridge(subscription, tx, cancel.clone()).instrument(span));

        debug!(%viewer, "live feed opened");
        Ok(LiveFeed {
            queue,
            hydrator: self.hydrator().clone(),
            selection,
            _guard: cancel.clone().drop_guard(),
            cancel,
            task,
        })
    }
}

/// Forwards decoded payloads into the subscriber's queue without ever
/// waiting on the subscriber. Releases the subscription and closes the
/// queue on every exit.
async fn bridge(
    mut subscription: Box<dyn Subscription>,
    tx: mpsc::Sender<DeliveryEnvelope>,
    cancel: CancellationToken,
) {
    loop {
        let payload = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!("cancelled");
                break;
            }
            payload = subscription.next_payload() => payload,
        };

        let Some(payload) = payload else {
            debug!("topic closed upstream");
            break;
        };

        let envelope = match codec::decode(&payload) {
            Ok(envelope) => envelope,
            Err(err) => {
                error!(error = %err, "skipping malformed payload");
                continue;
            }
        };

        match tx.try_send(envelope) {
            Ok(()) => {}
            Err(TrySendError::Full(dropped)) => {
                warn!(message_id = %dropped.id, "subscriber queue full, message dropped");
            }
            Err(TrySendError::Closed(_)) => {
                debug!("subscriber went away");
                break;
            }
        }
    }

    subscription.close().await;
    drop(tx);
    debug!("bridge stopped");
}
