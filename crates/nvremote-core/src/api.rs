//! Typed wrappers over the handful of Neovim API calls nvremote needs.

use crate::codec::{read_exact_value, Value};
use crate::config::NvimProtocol;
use crate::rpc::RemoteCall;
use crate::{Result, RpcError};
use std::fmt;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::debug;

/// A buffer number.
///
/// Neovim sends buffers as ext type 0 wrapping an integer; it accepts a
/// plain integer back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BufferHandle(pub i64);

impl BufferHandle {
    pub fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::Integer(n) => n
                .as_i64()
                .map(BufferHandle)
                .ok_or_else(|| RpcError::protocol(format!("buffer number {} out of range", n))),
            Value::Ext(kind, payload) if *kind == NvimProtocol::EXT_BUFFER => {
                read_exact_value(payload)?
                    .as_i64()
                    .map(BufferHandle)
                    .ok_or_else(|| RpcError::protocol("buffer ext payload is not an integer"))
            }
            other => Err(RpcError::protocol(format!(
                "expected a buffer handle, got {}",
                other
            ))),
        }
    }

    pub fn to_value(self) -> Value {
        Value::from(self.0)
    }
}

impl fmt::Display for BufferHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Neovim API over any [`RemoteCall`] connection.
#[derive(Clone)]
pub struct NvimApi {
    rpc: Arc<dyn RemoteCall>,
    channel: Arc<OnceCell<i64>>,
}

impl NvimApi {
    pub fn new(rpc: Arc<dyn RemoteCall>) -> Self {
        Self {
            rpc,
            channel: Arc::new(OnceCell::new()),
        }
    }

    /// The underlying connection.
    pub fn rpc(&self) -> &Arc<dyn RemoteCall> {
        &self.rpc
    }

    /// Run an Ex command.
    pub async fn command(&self, command: &str) -> Result<()> {
        debug!("command: {}", command);
        self.rpc
            .call(NvimProtocol::COMMAND, vec![Value::from(command)])
            .await?;
        Ok(())
    }

    /// Evaluate a Vimscript expression.
    pub async fn eval(&self, expr: &str) -> Result<Value> {
        self.rpc.call(NvimProtocol::EVAL, vec![Value::from(expr)]).await
    }

    /// This connection's channel id, as the editor numbers it.
    ///
    /// Fetched once and cached; it is what notification triggers address.
    pub async fn channel_id(&self) -> Result<i64> {
        let id = self
            .channel
            .get_or_try_init(|| async {
                let info = self.rpc.call(NvimProtocol::GET_API_INFO, vec![]).await?;
                info.as_array()
                    .and_then(|items| items.first())
                    .and_then(Value::as_i64)
                    .ok_or_else(|| {
                        RpcError::protocol("nvim_get_api_info did not start with a channel id")
                    })
            })
            .await?;
        Ok(*id)
    }

    pub async fn call_function(&self, name: &str, args: Vec<Value>) -> Result<Value> {
        self.rpc
            .call(
                NvimProtocol::CALL_FUNCTION,
                vec![Value::from(name), Value::Array(args)],
            )
            .await
    }

    /// Read buffer variable `name`, or `default` if it is unset.
    pub async fn buf_var_or(&self, buffer: BufferHandle, name: &str, default: Value) -> Result<Value> {
        self.call_function(
            "getbufvar",
            vec![buffer.to_value(), Value::from(name), default],
        )
        .await
    }

    pub async fn current_buffer(&self) -> Result<BufferHandle> {
        let value = self.rpc.call(NvimProtocol::GET_CURRENT_BUF, vec![]).await?;
        BufferHandle::from_value(&value)
    }

    /// Replace lines `start..end` (end exclusive, -1 for the last line).
    pub async fn set_buffer_lines(
        &self,
        buffer: BufferHandle,
        start: i64,
        end: i64,
        lines: Vec<String>,
    ) -> Result<()> {
        self.rpc
            .call(
                NvimProtocol::BUF_SET_LINES,
                vec![
                    buffer.to_value(),
                    Value::from(start),
                    Value::from(end),
                    Value::from(true),
                    Value::from(lines),
                ],
            )
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        calls: Mutex<Vec<(String, Vec<Value>)>>,
        api_info_calls: AtomicUsize,
    }

    #[async_trait]
    impl RemoteCall for Recorder {
        async fn call(&self, method: &str, args: Vec<Value>) -> Result<Value> {
            self.calls.lock().unwrap().push((method.to_string(), args));
            match method {
                "nvim_get_api_info" => {
                    self.api_info_calls.fetch_add(1, Ordering::SeqCst);
                    Ok(Value::from(vec![Value::from(7), Value::Map(vec![])]))
                }
                "nvim_get_current_buf" => Ok(Value::Ext(0, vec![0x05])),
                _ => Ok(Value::Nil),
            }
        }
    }

    #[test]
    fn test_buffer_handle_from_ext_and_integer() {
        assert_eq!(
            BufferHandle::from_value(&Value::Ext(0, vec![0xcd, 0x01, 0x00])).unwrap(),
            BufferHandle(256)
        );
        assert_eq!(BufferHandle::from_value(&Value::from(3)).unwrap(), BufferHandle(3));
        assert!(matches!(
            BufferHandle::from_value(&Value::Ext(1, vec![0x01])),
            Err(RpcError::ProtocolViolation { .. })
        ));
        assert!(matches!(
            BufferHandle::from_value(&Value::from("3")),
            Err(RpcError::ProtocolViolation { .. })
        ));
    }

    #[tokio::test]
    async fn test_channel_id_is_cached() {
        let recorder = Arc::new(Recorder::default());
        let api = NvimApi::new(recorder.clone());

        assert_eq!(api.channel_id().await.unwrap(), 7);
        assert_eq!(api.clone().channel_id().await.unwrap(), 7);
        assert_eq!(recorder.api_info_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_call_shapes() {
        let recorder = Arc::new(Recorder::default());
        let api = NvimApi::new(recorder.clone());

        api.command("edit foo").await.unwrap();
        api.buf_var_or(BufferHandle(2), "nvr", Value::Array(vec![]))
            .await
            .unwrap();
        assert_eq!(api.current_buffer().await.unwrap(), BufferHandle(5));

        let calls = recorder.calls.lock().unwrap();
        assert_eq!(calls[0], ("nvim_command".to_string(), vec![Value::from("edit foo")]));
        assert_eq!(
            calls[1],
            (
                "nvim_call_function".to_string(),
                vec![
                    Value::from("getbufvar"),
                    Value::Array(vec![Value::from(2), Value::from("nvr"), Value::Array(vec![])]),
                ]
            )
        );
    }
}
