//! MessagePack-RPC client over a Unix socket.
//!
//! One spawned task is the connection's only reader. It decodes each message
//! and demultiplexes it: responses go to the pending-call table by id,
//! notifications go to the dispatcher. Callers never read the socket.
//!
//! # Thread Safety
//!
//! `RpcClient` is `Send + Sync`; any number of tasks may `call` and
//! `subscribe` concurrently. Writes are serialized by [`MessageWriter`].

use super::dispatcher::{NotificationDispatcher, NotificationFilter, Subscription};
use super::pending::PendingCalls;
use crate::codec::{Message, Value};
use crate::config::RpcConfig;
use crate::transport::{MessageReader, MessageWriter};
use crate::{Result, RpcError};
use std::path::Path;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::UnixStream;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

struct Shared {
    writer: MessageWriter,
    pending: PendingCalls,
    notifications: NotificationDispatcher,
}

impl Shared {
    async fn route(&self, message: Message) -> Result<()> {
        match message {
            Message::Response { id, error, result } => {
                debug!("<- response #{}{}", id, if error.is_some() { " (error)" } else { "" });
                self.pending.resolve(id, error, result)
            }
            Message::Notification { method, args } => {
                let delivered = self.notifications.dispatch(&method, &args);
                debug!("<- notification {} ({} subscribers)", method, delivered);
                Ok(())
            }
            Message::Request { id, method, .. } => {
                // The peer would block forever on an unanswered request.
                warn!("Peer sent request '{}' #{}; this client serves no methods", method, id);
                let reply = Message::Response {
                    id,
                    error: Some(Value::from(vec![
                        Value::from(0),
                        Value::from("nvremote does not serve requests"),
                    ])),
                    result: Value::Nil,
                };
                self.writer.send(&reply).await
            }
        }
    }

    fn fail(&self, err: &RpcError) {
        self.pending.close(err);
        self.notifications.close(err);
    }
}

/// A connection to one editor instance.
pub struct RpcClient {
    shared: Arc<Shared>,
    reader_task: JoinHandle<()>,
}

impl RpcClient {
    /// Connect to the editor listening on `path`.
    ///
    /// Uses the configured connection timeout from `RpcConfig`.
    pub async fn connect(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let stream = tokio::time::timeout(RpcConfig::CONNECT_TIMEOUT, UnixStream::connect(path))
            .await
            .map_err(|_| {
                RpcError::transport(format!("timed out connecting to {}", path.display()))
            })?
            .map_err(|e| {
                RpcError::transport(format!("failed to connect to {}: {}", path.display(), e))
            })?;

        debug!("Connected to {}", path.display());
        let (reader, writer) = stream.into_split();
        Ok(Self::from_io(reader, writer))
    }

    /// Build a client over an arbitrary byte stream and start its reader task.
    ///
    /// Must be called inside a tokio runtime.
    pub fn from_io<R, W>(reader: R, writer: W) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let shared = Arc::new(Shared {
            writer: MessageWriter::new(writer),
            pending: PendingCalls::new(),
            notifications: NotificationDispatcher::new(),
        });
        let reader_task = tokio::spawn(receive_loop(shared.clone(), MessageReader::new(reader)));
        Self {
            shared,
            reader_task,
        }
    }

    /// Call a remote method and wait for its response.
    ///
    /// Fails with `Remote` if the peer reported an error, or with the
    /// connection's terminating error if it failed first.
    pub async fn call(&self, method: &str, args: Vec<Value>) -> Result<Value> {
        // Register before sending so a fast response always finds its slot.
        let (id, rx) = self.shared.pending.register()?;
        let request = Message::Request {
            id,
            method: method.to_string(),
            args,
        };

        debug!("-> {} #{}", method, id);
        if let Err(err) = self.shared.writer.send(&request).await {
            self.shared.pending.cancel(id);
            // Encoding failures leave the stream untouched; write failures do not.
            if matches!(err, RpcError::Transport { .. }) {
                error!("Write failed, closing connection: {}", err);
                self.shared.fail(&err);
            }
            return Err(err);
        }

        rx.await
            .unwrap_or_else(|_| Err(RpcError::transport("connection closed before response")))
    }

    /// Register interest in a notification.
    pub fn subscribe(&self, filter: NotificationFilter) -> Result<Subscription> {
        self.shared.notifications.subscribe(filter)
    }

    /// Number of calls awaiting a response.
    pub fn pending_calls(&self) -> usize {
        self.shared.pending.len()
    }

    /// Whether the reader task has stopped.
    pub fn is_closed(&self) -> bool {
        self.reader_task.is_finished()
    }

    /// Close the write half; the peer sees EOF and the reader winds down.
    pub async fn shutdown(&self) -> Result<()> {
        self.shared.writer.shutdown().await
    }
}

impl Drop for RpcClient {
    fn drop(&mut self) {
        self.reader_task.abort();
        self.shared.fail(&RpcError::transport("client dropped"));
    }
}

async fn receive_loop<R: AsyncRead + Unpin>(shared: Arc<Shared>, mut reader: MessageReader<R>) {
    let err = loop {
        let message = match reader.next_message().await {
            Ok(Some(message)) => message,
            Ok(None) => break RpcError::transport("connection closed by peer"),
            Err(e) => break e,
        };
        if let Err(e) = shared.route(message).await {
            break e;
        }
    };

    match &err {
        RpcError::Transport { message } => debug!("Receive loop ended: {}", message),
        other => error!("Connection no longer trustworthy: {}", other),
    }
    shared.fail(&err);
}
