//! MessagePack-RPC client: call correlation and notification routing.
//!
//! [`RpcClient`] owns one connection. [`RemoteCall`] is the seam the API
//! wrapper, the shared registry and the wait coordinator are written
//! against, so they can be exercised without a socket.

mod client;
mod dispatcher;
mod pending;

pub use client::RpcClient;
pub use dispatcher::{
    Notification, NotificationDispatcher, NotificationFilter, Predicate, Subscription,
};
pub use pending::PendingCalls;

use crate::codec::Value;
use crate::Result;
use async_trait::async_trait;
use std::sync::Arc;

/// Anything that can issue a remote call.
#[async_trait]
pub trait RemoteCall: Send + Sync {
    /// Invoke `method` with positional `args` and return its result.
    async fn call(&self, method: &str, args: Vec<Value>) -> Result<Value>;
}

#[async_trait]
impl RemoteCall for RpcClient {
    async fn call(&self, method: &str, args: Vec<Value>) -> Result<Value> {
        RpcClient::call(self, method, args).await
    }
}

#[async_trait]
impl<T: RemoteCall + ?Sized> RemoteCall for Arc<T> {
    async fn call(&self, method: &str, args: Vec<Value>) -> Result<Value> {
        (**self).call(method, args).await
    }
}
