//! Receiving side of request/response.
//!
//! `MessageRouter::serve` subscribes a [`RequestHandler`] to a channel. Each
//! request runs on its own task so a slow request does not hold up the
//! channel; duplicates of a request are filtered through a
//! [`RequestDedupCache`] so the handler's side effects happen at most once
//! per request id. Failed requests are not cached, so a retry runs the
//! handler again.

use crate::dedup::{Admission, RequestDedupCache};
use crate::pending::Reply;
use crate::{RESPONSE_CHANNEL, RESPONSE_ERROR_TYPE, RESPONSE_TYPE};
use async_trait::async_trait;
use futures::FutureExt;
use serde_json::{json, Value};
use shared_bus::{BusError, HandlerError, MessageBus, MessageHandler};
use shared_types::{Draft, Message, RequestId};
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{debug, warn};

/// Produces the response payload for a request.
#[async_trait]
pub trait RequestHandler: Send + Sync + 'static {
    /// Handle one request. An error is sent back as a failure response.
    async fn handle(&self, request: Arc<Message>) -> Result<Value, HandlerError>;
}

/// Adapter turning an async closure into a [`RequestHandler`].
pub struct FnRequestHandler<F>(F);

pub fn request_handler_fn<F, Fut>(f: F) -> FnRequestHandler<F>
where
    F: Fn(Arc<Message>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, HandlerError>> + Send + 'static,
{
    FnRequestHandler(f)
}

#[async_trait]
impl<F, Fut> RequestHandler for FnRequestHandler<F>
where
    F: Fn(Arc<Message>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, HandlerError>> + Send + 'static,
{
    async fn handle(&self, request: Arc<Message>) -> Result<Value, HandlerError> {
        (self.0)(request).await
    }
}

/// Bus subscriber that feeds requests to a [`RequestHandler`].
pub(crate) struct ServeHandler<H> {
    pub(crate) handler: Arc<H>,
    pub(crate) dedup: Arc<RequestDedupCache>,
    pub(crate) bus: Arc<MessageBus>,
}

#[async_trait]
impl<H: RequestHandler> MessageHandler for ServeHandler<H> {
    async fn handle(&self, message: Arc<Message>) -> Result<(), HandlerError> {
        let Some(request_id) = message.request_id.filter(|_| message.is_request()) else {
            return Ok(());
        };

        match self.dedup.admit(request_id) {
            Admission::Fresh => {
                let handler = Arc::clone(&self.handler);
                let dedup = Arc::clone(&self.dedup);
                let bus = Arc::clone(&self.bus);
                tokio::spawn(async move {
                    let reply = run_handler(handler.as_ref(), message).await;
                    dedup.finish(request_id, reply.clone());
                    if let Err(err) = send_reply(&bus, request_id, reply) {
                        warn!(request_id = %request_id, error = %err, "Failed to send response");
                    }
                });
                Ok(())
            }
            Admission::InFlight => {
                debug!(request_id = %request_id, "Duplicate request while in flight, ignoring");
                Ok(())
            }
            Admission::Completed(reply) => {
                debug!(request_id = %request_id, "Duplicate request, re-sending cached response");
                send_reply(&self.bus, request_id, reply)
                    .map(|_| ())
                    .map_err(|e| HandlerError::new(e.to_string()))
            }
        }
    }
}

async fn run_handler<H: RequestHandler>(handler: &H, message: Arc<Message>) -> Reply {
    let request_type = message.message_type.clone();
    match AssertUnwindSafe(handler.handle(message)).catch_unwind().await {
        Ok(Ok(payload)) => Ok(payload),
        Ok(Err(err)) => {
            warn!(request_type = %request_type, error = %err, "Request handler failed");
            Err(err.0)
        }
        Err(_) => {
            warn!(request_type = %request_type, "Request handler panicked");
            Err("request handler panicked".to_string())
        }
    }
}

/// Publish the reply for `request_id` on the response channel.
pub(crate) fn send_reply(
    bus: &MessageBus,
    request_id: RequestId,
    reply: Reply,
) -> Result<Arc<Message>, BusError> {
    let draft = match reply {
        Ok(payload) => Draft::response(RESPONSE_TYPE, payload, request_id),
        Err(reason) => Draft::response(RESPONSE_ERROR_TYPE, json!({ "error": reason }), request_id),
    };
    bus.publish_draft(RESPONSE_CHANNEL, draft)
}

/// Turn a response message back into a reply.
pub(crate) fn reply_from(message: &Message) -> Reply {
    if message.message_type == RESPONSE_ERROR_TYPE {
        let reason = message
            .payload
            .get("error")
            .and_then(Value::as_str)
            .map_or_else(|| message.payload.to_string(), str::to_string);
        Err(reason)
    } else {
        Ok(message.payload.clone())
    }
}
