//! RPC-backed remote endpoint.
//!
//! The transport itself is abstracted via [`RpcClient`] so hosts can plug in
//! whatever HTTP or RPC library they already use. [`RpcEndpoint`] only deals
//! with the envelopes: the request is CBOR-encoded, the reply is decoded as a
//! [`ReplyEnvelope`].

use crate::error::{SyncError, SyncResult};
use crate::transport::RemoteEndpoint;
use edgesync_protocol::{RemoteReply, ReplyEnvelope, SyncActionsRequest};
use parking_lot::RwLock;

/// Raw remote procedure call client.
pub trait RpcClient: Send + Sync {
    /// Invokes `method` with an encoded body and returns the encoded reply.
    fn call(&self, method: &str, body: Vec<u8>) -> Result<Vec<u8>, String>;

    /// Checks if the client is connected/healthy.
    fn is_healthy(&self) -> bool {
        true
    }
}

/// A [`RemoteEndpoint`] speaking CBOR envelopes over an [`RpcClient`].
pub struct RpcEndpoint<C: RpcClient> {
    client: C,
    last_error: RwLock<Option<String>>,
}

impl<C: RpcClient> RpcEndpoint<C> {
    /// Creates a new endpoint.
    pub fn new(client: C) -> Self {
        Self {
            client,
            last_error: RwLock::new(None),
        }
    }

    /// Returns the last transport error message.
    pub fn last_error(&self) -> Option<String> {
        self.last_error.read().clone()
    }

    /// Returns the underlying client.
    pub fn client(&self) -> &C {
        &self.client
    }
}

impl<C: RpcClient> RemoteEndpoint for RpcEndpoint<C> {
    fn invoke(&self, request: &SyncActionsRequest) -> SyncResult<RemoteReply> {
        if !self.client.is_healthy() {
            return Err(SyncError::transport_retryable("rpc client is not healthy"));
        }

        let body = request.encode()?;
        let reply = self.client.call(&request.method, body).map_err(|e| {
            *self.last_error.write() = Some(e.clone());
            SyncError::transport_retryable(e)
        })?;
        *self.last_error.write() = None;

        match ReplyEnvelope::decode(&reply)? {
            ReplyEnvelope::Reply(reply) => Ok(reply),
            ReplyEnvelope::Rejected { reason } => Err(SyncError::RemoteRejection(reason)),
        }
    }
}

/// Servers that can answer loopback calls in-process.
pub trait LoopbackServer {
    /// Handles one call and returns the encoded reply.
    fn handle_call(&self, method: &str, body: &[u8]) -> Result<Vec<u8>, String>;
}

/// An [`RpcClient`] that routes calls directly to a [`LoopbackServer`].
///
/// Useful for testing without actual network overhead.
pub struct LoopbackClient<S: LoopbackServer> {
    server: S,
}

impl<S: LoopbackServer + Send + Sync> LoopbackClient<S> {
    /// Creates a client connected to `server`.
    pub fn new(server: S) -> Self {
        Self { server }
    }

    /// Returns the server.
    pub fn server(&self) -> &S {
        &self.server
    }
}

impl<S: LoopbackServer + Send + Sync> RpcClient for LoopbackClient<S> {
    fn call(&self, method: &str, body: Vec<u8>) -> Result<Vec<u8>, String> {
        self.server.handle_call(method, &body)
    }
}
