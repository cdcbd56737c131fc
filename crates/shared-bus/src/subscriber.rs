//! # Subscribers
//!
//! The receiving side of the bus.
//!
//! Every subscription owns an unbounded ordered queue. The channel pushes into
//! that queue while holding its lock, so the queue order is the publish order,
//! backlog replay included. A dedicated delivery task drains the queue and
//! invokes the handler one message at a time; a slow or failing handler only
//! ever delays itself.

use crate::channel::Channel;
use crate::error::HandlerError;
use crate::stats::BusStats;
use async_trait::async_trait;
use futures::FutureExt;
use shared_types::Message;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::task::{Context, Poll};
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_stream::Stream;
use tracing::{debug, warn};

/// Identifier of a subscription, unique within its channel.
pub type SubscriptionId = u64;

/// Callback invoked for every message delivered to a subscription.
#[async_trait]
pub trait MessageHandler: Send + Sync + 'static {
    /// Process one message. Errors are reported by the bus, not propagated.
    async fn handle(&self, message: Arc<Message>) -> Result<(), HandlerError>;
}

/// Adapter turning an async closure into a [`MessageHandler`].
pub struct FnHandler<F>(F);

/// Wrap an async closure as a handler.
///
/// ```rust,ignore
/// bus.subscribe("insight-ui", handler_fn(|msg| async move {
///     tracing::info!(kind = %msg.message_type, "ui event");
///     Ok(())
/// }))?;
/// ```
pub fn handler_fn<F, Fut>(f: F) -> FnHandler<F>
where
    F: Fn(Arc<Message>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
{
    FnHandler(f)
}

#[async_trait]
impl<F, Fut> MessageHandler for FnHandler<F>
where
    F: Fn(Arc<Message>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
{
    async fn handle(&self, message: Arc<Message>) -> Result<(), HandlerError> {
        (self.0)(message).await
    }
}

/// Channel-side record of one subscriber.
pub(crate) struct SubscriberSlot {
    pub(crate) sender: mpsc::UnboundedSender<Arc<Message>>,
    pub(crate) active: Arc<AtomicBool>,
}

/// Handle for an active subscription.
///
/// Dropping the handle unsubscribes, so a detached context never leaves a dead
/// handler registered on the bus.
#[must_use = "dropping a Subscription unsubscribes it"]
pub struct Subscription {
    id: SubscriptionId,
    channel_name: String,
    active: Arc<AtomicBool>,
    channel: Weak<Channel>,
}

impl Subscription {
    pub(crate) fn new(
        id: SubscriptionId,
        channel_name: String,
        active: Arc<AtomicBool>,
        channel: Weak<Channel>,
    ) -> Self {
        Self {
            id,
            channel_name,
            active,
            channel,
        }
    }

    /// Subscription id within its channel.
    #[must_use]
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Name of the subscribed channel.
    #[must_use]
    pub fn channel(&self) -> &str {
        &self.channel_name
    }

    /// Whether the handler still receives messages.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Stop delivery to this subscription. Idempotent.
    ///
    /// Messages already queued but not yet handled are discarded.
    pub fn unsubscribe(&self) {
        if !self.active.swap(false, Ordering::AcqRel) {
            return;
        }
        if let Some(channel) = self.channel.upgrade() {
            channel.detach(self.id);
        }
        debug!(channel = %self.channel_name, subscription = self.id, "Unsubscribed");
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("channel", &self.channel_name)
            .field("active", &self.is_active())
            .finish()
    }
}

/// Spawn the task that feeds queued messages to `handler` in order.
pub(crate) fn spawn_delivery(
    channel: String,
    subscription: SubscriptionId,
    handler: Arc<dyn MessageHandler>,
    mut receiver: mpsc::UnboundedReceiver<Arc<Message>>,
    active: Arc<AtomicBool>,
    stats: Arc<BusStats>,
) {
    tokio::spawn(async move {
        while let Some(message) = receiver.recv().await {
            if !active.load(Ordering::Acquire) {
                BusStats::incr(&stats.discarded);
                continue;
            }

            let sequence = message.sequence;
            let outcome = AssertUnwindSafe(handler.handle(message)).catch_unwind().await;

            match outcome {
                Ok(Ok(())) => BusStats::incr(&stats.delivered),
                Ok(Err(err)) => {
                    BusStats::incr(&stats.handler_failures);
                    warn!(
                        channel = %channel,
                        subscription,
                        sequence,
                        error = %err,
                        "Subscriber handler failed"
                    );
                }
                Err(_) => {
                    BusStats::incr(&stats.handler_failures);
                    warn!(
                        channel = %channel,
                        subscription,
                        sequence,
                        "Subscriber handler panicked"
                    );
                }
            }
        }
        debug!(channel = %channel, subscription, "Delivery task finished");
    });
}

/// A subscription consumed as an async stream instead of a callback.
///
/// Same ordering and replay guarantees as a handler subscription. Dropping
/// the stream unsubscribes.
pub struct MessageStream {
    inner: UnboundedReceiverStream<Arc<Message>>,
    subscription: Subscription,
}

impl MessageStream {
    pub(crate) fn new(
        receiver: mpsc::UnboundedReceiver<Arc<Message>>,
        subscription: Subscription,
    ) -> Self {
        Self {
            inner: UnboundedReceiverStream::new(receiver),
            subscription,
        }
    }

    /// The underlying subscription handle.
    #[must_use]
    pub fn subscription(&self) -> &Subscription {
        &self.subscription
    }
}

impl Stream for MessageStream {
    type Item = Arc<Message>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if !self.subscription.is_active() {
            return Poll::Ready(None);
        }
        Pin::new(&mut self.inner).poll_next(cx)
    }
}
