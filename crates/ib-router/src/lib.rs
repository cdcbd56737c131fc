//! # Router - Request/Response Over the Bus
//!
//! Correlates a request message with its single response.
//!
//! ```text
//! requester context                            responder context
//! ─────────────────                            ─────────────────
//! request(ch, type, payload)
//!   ├─ register RequestId in PendingRequestStore
//!   ├─ publish {requestId} on `ch` ──────────→ serve(ch, handler)
//!   │                                            ├─ dedup by RequestId
//!   │                                            └─ respond(requestId, result)
//!   └─ await reply ←──────────── `router.responses` {requestId, isResponse}
//!        timeout / failure → retry with the same RequestId
//! ```
//!
//! A response with no pending request (already answered, timed out or
//! cancelled) is dropped and counted, never an error.

#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod dedup;
pub mod error;
pub mod handle;
pub mod pending;
pub mod policy;
pub mod router;
pub mod serve;

pub use dedup::{Admission, RequestDedupCache};
pub use error::RequestError;
pub use handle::ResponseHandle;
pub use pending::{PendingRequestStore, RouterStats};
pub use policy::{RequestPolicy, DEFAULT_REQUEST_TIMEOUT};
pub use router::MessageRouter;
pub use serve::{request_handler_fn, FnRequestHandler, RequestHandler};

/// Channel carrying responses for every router on a bus.
pub const RESPONSE_CHANNEL: &str = "router.responses";

/// Message type of a successful response.
pub const RESPONSE_TYPE: &str = "response";

/// Message type of a failure response.
pub const RESPONSE_ERROR_TYPE: &str = "response-error";
