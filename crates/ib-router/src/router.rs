//! The message router: request/response correlation over the bus.

use crate::dedup::RequestDedupCache;
use crate::error::RequestError;
use crate::handle::ResponseHandle;
use crate::pending::{PendingGuard, PendingRequestStore, Reply, RouterStats};
use crate::policy::RequestPolicy;
use crate::serve::{reply_from, send_reply, RequestHandler, ServeHandler};
use crate::RESPONSE_CHANNEL;
use serde_json::Value;
use shared_bus::{handler_fn, BusError, ChannelOptions, MessageBus, Subscription};
use shared_types::{ChannelMessage, Draft, Message, RequestId};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Request/response layer over a [`MessageBus`].
///
/// Requests are published on the target channel tagged with a `RequestId`.
/// Responses travel on [`RESPONSE_CHANNEL`], which the router creates and
/// listens to; a response with no waiting request is dropped.
///
/// Must be created inside a tokio runtime.
pub struct MessageRouter {
    bus: Arc<MessageBus>,
    pending: Arc<PendingRequestStore>,
    policy: RequestPolicy,
    _listener: Subscription,
}

impl MessageRouter {
    /// Attach a router with the default request policy.
    ///
    /// # Errors
    ///
    /// Propagates bus errors from creating or subscribing to the response
    /// channel.
    pub fn new(bus: Arc<MessageBus>) -> Result<Self, BusError> {
        Self::with_policy(bus, RequestPolicy::default())
    }

    /// Attach a router whose requests use `policy` unless overridden.
    ///
    /// # Errors
    ///
    /// Same as [`new`](Self::new).
    pub fn with_policy(bus: Arc<MessageBus>, policy: RequestPolicy) -> Result<Self, BusError> {
        bus.create_channel(RESPONSE_CHANNEL, ChannelOptions::transient())?;

        let pending = Arc::new(PendingRequestStore::new());
        let listener_pending = Arc::clone(&pending);
        let listener = bus.subscribe(
            RESPONSE_CHANNEL,
            handler_fn(move |message: Arc<Message>| {
                let pending = Arc::clone(&listener_pending);
                async move {
                    if let (true, Some(request_id)) = (message.is_response, message.request_id) {
                        pending.complete(request_id, reply_from(&message));
                    }
                    Ok(())
                }
            }),
        )?;

        debug!(
            timeout_ms = policy.timeout.as_millis() as u64,
            max_retries = policy.retry.max_retries,
            "Message router attached"
        );

        Ok(Self {
            bus,
            pending,
            policy,
            _listener: listener,
        })
    }

    pub fn bus(&self) -> &Arc<MessageBus> {
        &self.bus
    }

    pub fn policy(&self) -> RequestPolicy {
        self.policy
    }

    /// Send a request with the router's default policy.
    pub fn request(&self, channel: &str, request_type: &str, payload: Value) -> ResponseHandle {
        self.request_with(channel, request_type, payload, self.policy)
    }

    /// Send a request with an explicit policy.
    pub fn request_with(
        &self,
        channel: &str,
        request_type: &str,
        payload: Value,
        policy: RequestPolicy,
    ) -> ResponseHandle {
        self.request_as(RequestId::new(), channel, request_type, payload, policy)
    }

    /// Send a typed channel message as a request.
    pub fn request_typed<M: ChannelMessage>(&self, message: &M) -> ResponseHandle {
        self.request(M::CHANNEL, message.message_type(), message.payload())
    }

    /// Send a request under a caller-chosen id.
    ///
    /// The handle resolves with `RequestError::DuplicateRequest` if a request
    /// with the same id is still pending.
    pub fn request_as(
        &self,
        request_id: RequestId,
        channel: &str,
        request_type: &str,
        payload: Value,
        policy: RequestPolicy,
    ) -> ResponseHandle {
        let token = CancellationToken::new();

        let replies = match self.pending.register(request_id, request_type) {
            Ok(replies) => replies,
            Err(err) => {
                let task = tokio::spawn(async move { Err(err) });
                return ResponseHandle::new(request_id, task, token, None);
            }
        };

        let driver = RequestDriver {
            bus: Arc::clone(&self.bus),
            pending: Arc::clone(&self.pending),
            channel: channel.to_string(),
            request_type: request_type.to_string(),
            payload,
            request_id,
            policy,
            unanswered: AtomicU32::new(0),
        };
        let task = tokio::spawn(driver.run(replies, token.clone()));
        ResponseHandle::new(request_id, task, token, Some(Arc::clone(&self.pending)))
    }

    /// Answer a request. Dropped by the requester if nothing is waiting.
    ///
    /// # Errors
    ///
    /// Propagates bus errors from publishing the response.
    pub fn respond(&self, request_id: RequestId, payload: Value) -> Result<Arc<Message>, BusError> {
        send_reply(&self.bus, request_id, Ok(payload))
    }

    /// Answer a request with a failure; the requester retries per its policy.
    ///
    /// # Errors
    ///
    /// Propagates bus errors from publishing the response.
    pub fn respond_error(
        &self,
        request_id: RequestId,
        reason: impl Into<String>,
    ) -> Result<Arc<Message>, BusError> {
        send_reply(&self.bus, request_id, Err(reason.into()))
    }

    /// Serve requests arriving on `channel` with `handler`, deduplicating
    /// retried requests.
    ///
    /// # Errors
    ///
    /// `BusError::ChannelNotFound` if the channel does not exist.
    pub fn serve<H: RequestHandler>(&self, channel: &str, handler: H) -> Result<Subscription, BusError> {
        self.serve_with_cache(channel, handler, Arc::new(RequestDedupCache::new()))
    }

    /// [`serve`](Self::serve) with a caller-provided deduplication cache.
    ///
    /// # Errors
    ///
    /// `BusError::ChannelNotFound` if the channel does not exist.
    pub fn serve_with_cache<H: RequestHandler>(
        &self,
        channel: &str,
        handler: H,
        dedup: Arc<RequestDedupCache>,
    ) -> Result<Subscription, BusError> {
        let subscription = self.bus.subscribe(
            channel,
            ServeHandler {
                handler: Arc::new(handler),
                dedup,
                bus: Arc::clone(&self.bus),
            },
        )?;
        debug!(channel, "Serving requests");
        Ok(subscription)
    }

    pub fn is_pending(&self, request_id: &RequestId) -> bool {
        self.pending.is_pending(request_id)
    }

    pub fn pending_count(&self) -> usize {
        self.pending.pending_count()
    }

    pub fn stats(&self) -> RouterStats {
        self.pending.stats()
    }
}

/// Everything one request needs across its attempts.
struct RequestDriver {
    bus: Arc<MessageBus>,
    pending: Arc<PendingRequestStore>,
    channel: String,
    request_type: String,
    payload: Value,
    request_id: RequestId,
    policy: RequestPolicy,
    // Timed-out attempts whose reply has not shown up yet
    unanswered: AtomicU32,
}

impl RequestDriver {
    async fn run(
        self,
        replies: mpsc::UnboundedReceiver<Reply>,
        token: CancellationToken,
    ) -> Result<Value, RequestError> {
        let _guard = PendingGuard {
            store: Arc::clone(&self.pending),
            request_id: self.request_id,
        };
        let replies = Mutex::new(replies);
        let driver = &self;
        let replies = &replies;

        let attempts = ib_retry::retry_notify(
            &self.policy.retry,
            move |attempt| driver.attempt(attempt, replies),
            |attempt, error: &RequestError| {
                debug!(
                    request_id = %driver.request_id,
                    attempt,
                    error = %error,
                    "Request attempt failed"
                );
            },
        );

        tokio::select! {
            biased;
            () = token.cancelled() => {
                debug!(request_id = %self.request_id, "Request cancelled");
                Err(RequestError::Cancelled)
            }
            outcome = attempts => outcome.map_err(RequestError::from),
        }
    }

    async fn attempt(
        &self,
        attempt: u32,
        replies: &Mutex<mpsc::UnboundedReceiver<Reply>>,
    ) -> Result<Value, RequestError> {
        let mut replies = replies.lock().await;

        // Replies that arrived during the backoff wait
        while let Ok(reply) = replies.try_recv() {
            match reply {
                Ok(payload) => return Ok(payload),
                Err(reason) => {
                    self.take_unanswered();
                    debug!(
                        request_id = %self.request_id,
                        reason = %reason,
                        "Discarding stale failure response"
                    );
                }
            }
        }

        if !self
            .pending
            .begin_attempt(&self.request_id, attempt, self.policy.timeout)
        {
            return Err(RequestError::Cancelled);
        }

        let draft = Draft::request(self.request_type.clone(), self.payload.clone(), self.request_id);
        let message = self.bus.publish_draft(&self.channel, draft)?;
        debug!(
            request_id = %self.request_id,
            channel = %self.channel,
            sequence = message.sequence,
            attempt,
            "Published request"
        );

        let deadline = Instant::now() + self.policy.timeout;
        loop {
            match tokio::time::timeout_at(deadline, replies.recv()).await {
                Ok(Some(Ok(payload))) => return Ok(payload),
                Ok(Some(Err(reason))) => {
                    // A failure while an earlier attempt is still unanswered
                    // belongs to that attempt, not this one.
                    if self.take_unanswered() {
                        debug!(
                            request_id = %self.request_id,
                            attempt,
                            reason = %reason,
                            "Discarding failure response to an earlier attempt"
                        );
                        continue;
                    }
                    return Err(RequestError::Remote { reason });
                }
                Ok(None) => return Err(RequestError::Cancelled),
                Err(_) => {
                    self.unanswered.fetch_add(1, Ordering::Relaxed);
                    self.pending.record_timeout(&self.request_id);
                    return Err(RequestError::Timeout {
                        timeout_ms: self.policy.timeout.as_millis() as u64,
                    });
                }
            }
        }
    }

    fn take_unanswered(&self) -> bool {
        self.unanswered
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::serve::request_handler_fn;
    use ib_retry::RetryPolicy;
    use serde_json::json;
    use shared_bus::HandlerError;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    const CH: &str = "insight-content";

    fn setup() -> (Arc<MessageBus>, Arc<MessageRouter>) {
        let bus = Arc::new(MessageBus::new());
        bus.create_channel(CH, ChannelOptions::transient()).unwrap();
        let router = Arc::new(MessageRouter::new(Arc::clone(&bus)).unwrap());
        (bus, router)
    }

    fn fast_policy() -> RequestPolicy {
        RequestPolicy::default()
            .with_timeout(Duration::from_millis(100))
            .with_retry(RetryPolicy::default().with_delay(Duration::from_millis(10)))
    }

    async fn wait_until(mut check: impl FnMut() -> bool) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while !check() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("condition not reached");
    }

    #[tokio::test]
    async fn test_request_resolves_once_and_drops_duplicate() {
        let (bus, router) = setup();
        let responder = Arc::clone(&router);
        let _sub = bus
            .subscribe(
                CH,
                handler_fn(move |msg: Arc<Message>| {
                    let router = Arc::clone(&responder);
                    async move {
                        let Some(id) = msg.request_id else {
                            return Err(HandlerError::new("not a request"));
                        };
                        for n in 1..=2 {
                            if let Err(e) = router.respond(id, json!({ "n": n })) {
                                return Err(HandlerError::new(e.to_string()));
                            }
                        }
                        Ok(())
                    }
                }),
            )
            .unwrap();

        let value = router
            .request(CH, "quick-analysis", json!({"text": "hello"}))
            .await
            .unwrap();
        assert_eq!(value, json!({"n": 1}));

        wait_until(|| router.stats().responses_dropped == 1).await;
        let stats = router.stats();
        assert_eq!(stats.completed, 1);
        assert_eq!(stats.pending, 0);
    }

    #[tokio::test]
    async fn test_unknown_channel_not_retried() {
        let (_bus, router) = setup();
        let err = router
            .request_with("missing", "get-settings", json!({}), fast_policy())
            .await
            .unwrap_err();

        assert_eq!(
            err,
            RequestError::ChannelNotFound {
                channel: "missing".into()
            }
        );
        assert_eq!(router.pending_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_exhausts_retries_with_same_id() {
        let (bus, router) = setup();
        let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let _sub = bus
            .subscribe(
                CH,
                handler_fn(move |msg: Arc<Message>| {
                    sink.lock().push(msg.request_id);
                    async { Ok(()) }
                }),
            )
            .unwrap();

        let err = router
            .request_with(CH, "get-settings", json!({"tabId": 1}), fast_policy())
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            RequestError::MaxRetriesExceeded { attempts: 3, .. }
        ));
        assert!(err.is_timeout());
        assert_eq!(router.pending_count(), 0);
        assert_eq!(router.stats().timeouts, 3);

        wait_until(|| seen.lock().len() == 3).await;
        let ids = seen.lock().clone();
        assert!(ids[0].is_some());
        assert!(ids.iter().all(|id| *id == ids[0]));
    }

    #[tokio::test]
    async fn test_serve_answers_request() {
        let (_bus, router) = setup();
        let _serving = router
            .serve(
                CH,
                request_handler_fn(|msg: Arc<Message>| async move {
                    Ok(json!({ "echo": msg.payload["text"] }))
                }),
            )
            .unwrap();

        let value = router
            .request(CH, "quick-analysis", json!({"text": "hi"}))
            .await
            .unwrap();
        assert_eq!(value, json!({"echo": "hi"}));
    }

    #[tokio::test]
    async fn test_remote_failure_retried_then_succeeds() {
        let (_bus, router) = setup();
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);
        let _serving = router
            .serve(
                CH,
                request_handler_fn(move |_msg: Arc<Message>| {
                    let call = counter.fetch_add(1, Ordering::SeqCst);
                    async move {
                        if call == 0 {
                            Err(HandlerError::new("analyzer busy"))
                        } else {
                            Ok(json!("ready"))
                        }
                    }
                }),
            )
            .unwrap();

        let value = router
            .request_with(CH, "quick-analysis", json!({}), fast_policy())
            .await
            .unwrap();
        assert_eq!(value, json!("ready"));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(router.stats().remote_errors, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_late_failure_of_earlier_attempt_not_charged_to_retry() {
        let (bus, router) = setup();
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);
        let replier = Arc::clone(&bus);
        let _sub = bus
            .subscribe(
                CH,
                handler_fn(move |msg: Arc<Message>| {
                    let call = counter.fetch_add(1, Ordering::SeqCst);
                    let bus = Arc::clone(&replier);
                    async move {
                        let Some(request_id) = msg.request_id else {
                            return Ok(());
                        };
                        tokio::spawn(async move {
                            if call == 0 {
                                tokio::time::sleep(Duration::from_millis(150)).await;
                                send_reply(&bus, request_id, Err("analyzer busy".into())).unwrap();
                            } else {
                                tokio::time::sleep(Duration::from_millis(80)).await;
                                send_reply(&bus, request_id, Ok(json!("fresh"))).unwrap();
                            }
                        });
                        Ok(())
                    }
                }),
            )
            .unwrap();

        // Attempt 1 times out at 100ms; its failure lands at 150ms, inside
        // attempt 2, which is answered at ~190ms.
        let policy = fast_policy().with_retry(
            RetryPolicy::default()
                .with_max_retries(2)
                .with_delay(Duration::from_millis(10)),
        );
        let value = router
            .request_with(CH, "quick-analysis", json!({}), policy)
            .await
            .unwrap();

        assert_eq!(value, json!("fresh"));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_remote_failure_surfaces_after_exhaustion() {
        let (_bus, router) = setup();
        let _serving = router
            .serve(
                CH,
                request_handler_fn(|_msg: Arc<Message>| async {
                    Err::<Value, _>(HandlerError::new("no api key"))
                }),
            )
            .unwrap();

        let err = router
            .request_with(CH, "quick-analysis", json!({}), fast_policy())
            .await
            .unwrap_err();
        assert_eq!(
            err.root_cause(),
            &RequestError::Remote {
                reason: "no api key".into()
            }
        );
    }

    #[tokio::test]
    async fn test_cancel_clears_pending() {
        let (_bus, router) = setup();
        let handle = router.request(CH, "get-settings", json!({}));
        let id = handle.request_id();

        wait_until(|| router.is_pending(&id)).await;
        handle.cancel();
        assert!(!router.is_pending(&id));
        assert_eq!(handle.await.unwrap_err(), RequestError::Cancelled);

        // A late response is dropped, not an error.
        router.respond(id, json!("late")).unwrap();
        wait_until(|| router.stats().responses_dropped == 1).await;
    }

    #[tokio::test]
    async fn test_dropping_handle_cancels() {
        let (_bus, router) = setup();
        let handle = router.request(CH, "get-settings", json!({}));
        let id = handle.request_id();
        drop(handle);

        assert!(!router.is_pending(&id));
        assert_eq!(router.stats().cancelled, 1);
    }

    #[tokio::test]
    async fn test_duplicate_request_id_rejected() {
        let (_bus, router) = setup();
        let id = RequestId::new();
        let first = router.request_as(id, CH, "get-settings", json!({}), fast_policy());
        let second = router.request_as(id, CH, "get-settings", json!({}), fast_policy());

        assert_eq!(
            second.await.unwrap_err(),
            RequestError::DuplicateRequest { request_id: id }
        );
        // The rejected handle does not cancel the original.
        assert!(router.is_pending(&id));
        first.cancel();
    }

    #[tokio::test]
    async fn test_request_typed_uses_channel_vocabulary() {
        use shared_types::messages::{ContentMessage, GetSettings};

        let (_bus, router) = setup();
        let _serving = router
            .serve(
                CH,
                request_handler_fn(|msg: Arc<Message>| async move {
                    match ContentMessage::decode(&msg) {
                        Ok(ContentMessage::GetSettings(req)) => Ok(json!({ "tabId": req.tab_id })),
                        Ok(_) => Err(HandlerError::new("unexpected")),
                        Err(e) => Err(HandlerError::from(e)),
                    }
                }),
            )
            .unwrap();

        let value = router
            .request_typed(&ContentMessage::GetSettings(GetSettings { tab_id: 9 }))
            .await
            .unwrap();
        assert_eq!(value, json!({"tabId": 9}));
    }
}
