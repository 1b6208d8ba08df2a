//! Outbound request buffering.
//!
//! While the connection is not ready, requests accumulate here in FIFO
//! order; the client flushes the whole queue exactly once on the
//! transition to ready. Bodies are serialized at construction time, so a
//! caller mutating the original value after enqueueing cannot affect an
//! already-queued request.

use std::collections::VecDeque;

use restomp_api::{Headers, Method};

use crate::error::CoreError;

// ── PendingRequest ───────────────────────────────────────────────────

/// An outbound request, validated and serialized, owned by the queue
/// until sent.
#[derive(Debug, Clone)]
pub struct PendingRequest {
    pub destination: String,
    pub method: Method,
    pub headers: Headers,
    /// Body serialized to the wire format at construction.
    pub body: Option<String>,
}

impl PendingRequest {
    /// Validate and build a request.
    ///
    /// A destination is always required; mutating methods (create,
    /// update, replace) additionally require a body. Violations are
    /// configuration errors raised synchronously, never retried.
    pub fn new(
        destination: impl Into<String>,
        method: Method,
        body: Option<&serde_json::Value>,
        headers: Headers,
    ) -> Result<Self, CoreError> {
        let destination = destination.into();
        if destination.trim_matches('/').is_empty() {
            return Err(CoreError::MissingDestination);
        }
        if method.requires_body() && body.is_none() {
            return Err(CoreError::MissingBody { method });
        }

        Ok(Self {
            destination,
            method,
            headers,
            body: body.map(ToString::to_string),
        })
    }

    /// Headers for the wire, with the `method` header filled in.
    pub(crate) fn wire_headers(&self) -> Headers {
        let mut headers = self.headers.clone();
        headers.insert(
            restomp_api::METHOD_HEADER.to_owned(),
            self.method.to_string(),
        );
        headers
    }
}

// ── RequestQueue ─────────────────────────────────────────────────────

/// FIFO buffer for requests issued while the connection is not ready.
#[derive(Debug, Default)]
pub(crate) struct RequestQueue {
    pending: VecDeque<PendingRequest>,
}

impl RequestQueue {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Append a request to the tail.
    pub(crate) fn push(&mut self, request: PendingRequest) {
        self.pending.push_back(request);
    }

    /// Take the whole queue, leaving it empty.
    ///
    /// The caller sends the drained requests in order; because the client
    /// runs on a single event loop, nothing can be enqueued between the
    /// drain and the sends, so the flush is atomic with respect to new
    /// enqueues.
    pub(crate) fn drain(&mut self) -> Vec<PendingRequest> {
        self.pending.drain(..).collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.pending.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

// ── Tests ────────────────────────────────────────────────────────────
