//! Caller-side handle for an in-flight request.

use crate::error::RequestError;
use crate::pending::PendingRequestStore;
use serde_json::Value;
use shared_types::RequestId;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::warn;

/// Resolves to the response payload of a request.
///
/// Await it for the outcome. [`cancel`](Self::cancel) clears the pending
/// request and any retry wait and resolves the handle with
/// `RequestError::Cancelled`. Dropping the handle cancels as well.
#[must_use = "dropping a ResponseHandle cancels the request"]
pub struct ResponseHandle {
    request_id: RequestId,
    task: JoinHandle<Result<Value, RequestError>>,
    token: CancellationToken,
    /// Only set when this handle owns the pending entry.
    pending: Option<Arc<PendingRequestStore>>,
}

impl ResponseHandle {
    pub(crate) fn new(
        request_id: RequestId,
        task: JoinHandle<Result<Value, RequestError>>,
        token: CancellationToken,
        pending: Option<Arc<PendingRequestStore>>,
    ) -> Self {
        Self {
            request_id,
            task,
            token,
            pending,
        }
    }

    pub fn request_id(&self) -> RequestId {
        self.request_id
    }

    /// Cancel the request. A response arriving later is dropped.
    pub fn cancel(&self) {
        if self.token.is_cancelled() {
            return;
        }
        self.token.cancel();
        if let Some(pending) = &self.pending {
            pending.cancel(&self.request_id);
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Future for ResponseHandle {
    type Output = Result<Value, RequestError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.task).poll(cx) {
            Poll::Ready(Ok(outcome)) => Poll::Ready(outcome),
            Poll::Ready(Err(join_error)) => {
                warn!(
                    request_id = %self.request_id,
                    error = %join_error,
                    "Request driver did not complete"
                );
                Poll::Ready(Err(RequestError::Cancelled))
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl Drop for ResponseHandle {
    fn drop(&mut self) {
        if !self.task.is_finished() {
            self.cancel();
        }
    }
}
