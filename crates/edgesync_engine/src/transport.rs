//! Remote endpoint abstraction.

use crate::error::{SyncError, SyncResult};
use edgesync_protocol::{RemoteReply, SyncActionsRequest};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;

/// The remote side of a `syncActions` call.
///
/// Implementations report transport failures as [`SyncError::Transport`]
/// and explicit refusals as [`SyncError::RemoteRejection`]; a retry-after
/// hint is a successful [`RemoteReply`].
pub trait RemoteEndpoint: Send + Sync {
    /// Sends one batch.
    fn invoke(&self, request: &SyncActionsRequest) -> SyncResult<RemoteReply>;
}

impl<E: RemoteEndpoint + ?Sized> RemoteEndpoint for Arc<E> {
    fn invoke(&self, request: &SyncActionsRequest) -> SyncResult<RemoteReply> {
        (**self).invoke(request)
    }
}

/// A scripted answer for [`MockEndpoint`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockResponse {
    /// Return this reply.
    Reply(RemoteReply),
    /// Fail with a retryable transport error.
    TransportError(String),
    /// Fail with a rejection.
    Rejected(String),
}

impl From<RemoteReply> for MockResponse {
    fn from(reply: RemoteReply) -> Self {
        MockResponse::Reply(reply)
    }
}

/// A mock endpoint for testing.
///
/// Answers scripted responses in order, then the default (an ack unless
/// changed). Every request is recorded.
#[derive(Debug)]
pub struct MockEndpoint {
    script: Mutex<VecDeque<MockResponse>>,
    default: Mutex<MockResponse>,
    requests: Mutex<Vec<SyncActionsRequest>>,
}

impl MockEndpoint {
    /// Creates an endpoint that acknowledges everything.
    pub fn new() -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            default: Mutex::new(MockResponse::Reply(RemoteReply::Ack)),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Queues a response for the next unscripted call.
    pub fn push_response(&self, response: impl Into<MockResponse>) {
        self.script.lock().push_back(response.into());
    }

    /// Sets the response used once the script runs out.
    pub fn set_default(&self, response: impl Into<MockResponse>) {
        *self.default.lock() = response.into();
    }

    /// All requests received so far.
    pub fn requests(&self) -> Vec<SyncActionsRequest> {
        self.requests.lock().clone()
    }

    /// Number of calls received.
    pub fn calls(&self) -> usize {
        self.requests.lock().len()
    }
}

impl Default for MockEndpoint {
    fn default() -> Self {
        Self::new()
    }
}

impl RemoteEndpoint for MockEndpoint {
    fn invoke(&self, request: &SyncActionsRequest) -> SyncResult<RemoteReply> {
        self.requests.lock().push(request.clone());

        let response = self
            .script
            .lock()
            .pop_front()
            .unwrap_or_else(|| self.default.lock().clone());

        match response {
            MockResponse::Reply(reply) => Ok(reply),
            MockResponse::TransportError(message) => Err(SyncError::transport_retryable(message)),
            MockResponse::Rejected(reason) => Err(SyncError::RemoteRejection(reason)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> SyncActionsRequest {
        SyncActionsRequest::new(vec![1], "cbor-v1", 10, "regular")
    }

    #[test]
    fn acks_by_default() {
        let endpoint = MockEndpoint::new();
        assert_eq!(endpoint.invoke(&request()).unwrap(), RemoteReply::Ack);
        assert_eq!(endpoint.calls(), 1);
    }

    #[test]
    fn script_runs_in_order_then_default() {
        let endpoint = MockEndpoint::new();
        endpoint.push_response(RemoteReply::RetryAfter { at: 20 });
        endpoint.push_response(MockResponse::TransportError("connection refused".into()));
        endpoint.set_default(MockResponse::Rejected("schema".into()));

        assert_eq!(
            endpoint.invoke(&request()).unwrap(),
            RemoteReply::RetryAfter { at: 20 }
        );
        assert!(matches!(
            endpoint.invoke(&request()),
            Err(SyncError::Transport { retryable: true, .. })
        ));
        assert!(matches!(
            endpoint.invoke(&request()),
            Err(SyncError::RemoteRejection(_))
        ));
        assert_eq!(endpoint.requests().len(), 3);
    }

    #[test]
    fn shared_endpoint_records_through_arc() {
        let endpoint = Arc::new(MockEndpoint::new());
        let as_trait: Arc<dyn RemoteEndpoint> = endpoint.clone();
        as_trait.invoke(&request()).unwrap();
        assert_eq!(endpoint.requests()[0].queue_id, "regular");
    }
}
