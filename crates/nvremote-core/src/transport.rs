//! Stream transport for MessagePack-RPC.
//!
//! The stream carries unframed MessagePack: there is no outer length prefix,
//! so the reader accumulates bytes and lets the resumable decoder decide
//! where each message ends.
//!
//! # Thread Safety
//!
//! [`MessageWriter`] serializes access to the write half with a tokio `Mutex`;
//! each message is encoded up front and written in one `write_all`, so two
//! senders never interleave bytes. [`MessageReader`] is owned by exactly one
//! task.

use crate::codec::{Message, Progress};
use crate::config::RpcConfig;
use crate::{Result, RpcError};
use bytes::{Buf, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;
use tracing::trace;

/// Sole reader of a connection.
pub struct MessageReader<R> {
    reader: R,
    buf: BytesMut,
    /// No decode is attempted until the buffer holds this many bytes.
    need: usize,
}

impl<R: AsyncRead + Unpin> MessageReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            buf: BytesMut::with_capacity(RpcConfig::READ_CHUNK_SIZE),
            need: 0,
        }
    }

    /// Read the next complete message.
    ///
    /// Returns `None` on clean EOF (peer closed between messages). EOF in
    /// the middle of a message is a transport error.
    pub async fn next_message(&mut self) -> Result<Option<Message>> {
        loop {
            if self.buf.len() >= self.need {
                match Message::decode_progress(&self.buf)? {
                    Progress::Complete(message, used) => {
                        self.buf.advance(used);
                        self.need = 0;
                        trace!(
                            "Decoded {} ({} bytes, {} buffered)",
                            message.kind(),
                            used,
                            self.buf.len()
                        );
                        return Ok(Some(message));
                    }
                    Progress::NeedAtLeast(needed) => self.need = needed,
                }
            }

            self.buf.reserve(RpcConfig::READ_CHUNK_SIZE);
            let read = self.reader.read_buf(&mut self.buf).await?;
            if read == 0 {
                if self.buf.is_empty() {
                    return Ok(None);
                }
                return Err(RpcError::transport(format!(
                    "connection closed with {} bytes of an incomplete message buffered",
                    self.buf.len()
                )));
            }
        }
    }
}

/// Shared write half of a connection.
pub struct MessageWriter {
    writer: Mutex<Box<dyn AsyncWrite + Send + Unpin>>,
}

impl MessageWriter {
    pub fn new<W: AsyncWrite + Send + Unpin + 'static>(writer: W) -> Self {
        Self {
            writer: Mutex::new(Box::new(writer)),
        }
    }

    /// Encode and write one message atomically with respect to other senders.
    pub async fn send(&self, message: &Message) -> Result<()> {
        let bytes = message.to_bytes()?;
        let mut writer = self.writer.lock().await;
        writer.write_all(&bytes).await?;
        writer.flush().await?;
        trace!("Sent {} ({} bytes)", message.kind(), bytes.len());
        Ok(())
    }

    /// Shut down the write half so the peer sees EOF.
    pub async fn shutdown(&self) -> Result<()> {
        let mut writer = self.writer.lock().await;
        writer.shutdown().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::Value;
    use std::sync::Arc;

    fn notification(n: usize) -> Message {
        Message::Notification {
            method: format!("event{}", n),
            args: vec![Value::from("p".repeat(n * 100))],
        }
    }

    #[tokio::test]
    async fn test_write_read_roundtrip() {
        let (client, server) = tokio::io::duplex(64);
        let writer = MessageWriter::new(client);
        let mut reader = MessageReader::new(server);

        let sent = notification(3);
        let expected = sent.clone();
        let task = tokio::spawn(async move {
            writer.send(&sent).await.unwrap();
            writer
        });

        let received = reader.next_message().await.unwrap();
        assert_eq!(received, Some(expected));
        drop(task.await.unwrap());
        assert_eq!(reader.next_message().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_message_split_across_reads() {
        // Write one message a byte at a time.
        let (mut client, server) = tokio::io::duplex(1024);
        let mut reader = MessageReader::new(server);
        let message = notification(2);
        let bytes = message.to_bytes().unwrap();

        tokio::spawn(async move {
            for b in bytes.iter() {
                client.write_all(&[*b]).await.unwrap();
                tokio::task::yield_now().await;
            }
        });

        assert_eq!(reader.next_message().await.unwrap(), Some(message));
    }

    #[tokio::test]
    async fn test_large_message_in_small_chunks() {
        let (mut client, server) = tokio::io::duplex(512);
        let mut reader = MessageReader::new(server);
        let message = Message::Notification {
            method: "big".into(),
            args: vec![Value::from("z".repeat(200_000))],
        };
        let bytes = message.to_bytes().unwrap();

        tokio::spawn(async move {
            for chunk in bytes.chunks(100) {
                client.write_all(chunk).await.unwrap();
            }
        });

        assert_eq!(reader.next_message().await.unwrap(), Some(message));
        assert_eq!(reader.need, 0);
    }

    #[tokio::test]
    async fn test_eof_mid_message_is_transport_error() {
        let (mut client, server) = tokio::io::duplex(1024);
        let mut reader = MessageReader::new(server);
        let bytes = notification(1).to_bytes().unwrap();
        client.write_all(&bytes[..bytes.len() / 2]).await.unwrap();
        drop(client);

        let err = reader.next_message().await.unwrap_err();
        assert!(matches!(err, RpcError::Transport { .. }));
    }

    #[tokio::test]
    async fn test_concurrent_senders_do_not_interleave() {
        let (client, server) = tokio::io::duplex(256);
        let writer = Arc::new(MessageWriter::new(client));
        let mut reader = MessageReader::new(server);

        let mut tasks = Vec::new();
        for n in 1..=8 {
            let writer = writer.clone();
            tasks.push(tokio::spawn(async move {
                writer.send(&notification(n)).await.unwrap();
            }));
        }

        let mut seen = Vec::new();
        for _ in 1..=8 {
            match reader.next_message().await.unwrap() {
                Some(Message::Notification { method, args }) => {
                    let n: usize = method.trim_start_matches("event").parse().unwrap();
                    assert_eq!(args, vec![Value::from("p".repeat(n * 100))]);
                    seen.push(n);
                }
                other => panic!("Expected notification, got: {:?}", other),
            }
        }
        for task in tasks {
            task.await.unwrap();
        }
        seen.sort_unstable();
        assert_eq!(seen, (1..=8).collect::<Vec<_>>());
    }
}
