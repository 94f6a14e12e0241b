//! In-process stand-in for a Neovim instance.
//!
//! Speaks the real wire codec over duplex streams or a Unix listener and
//! implements just enough of the API for the client's wait protocol: channel
//! ids, Ex commands (recorded, with trigger installation tracked), buffer
//! variables via `getbufvar` and the registry's update command, and
//! `nvim_eval`.

#![allow(dead_code)]

use nvremote_core::transport::{MessageReader, MessageWriter};
use nvremote_core::{Message, RpcClient, Value};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::UnixListener;

#[derive(Default)]
struct Editor {
    next_channel: i64,
    channels: HashMap<i64, Arc<MessageWriter>>,
    buf_vars: HashMap<(i64, String), Value>,
    commands: Vec<(i64, String)>,
    buf_delete_triggers: HashSet<(i64, i64)>,
    exit_triggers: HashSet<i64>,
    current_buf: i64,
    lines: HashMap<i64, Vec<String>>,
}

/// A fake editor shared by any number of client connections.
#[derive(Clone)]
pub struct FakeNvim {
    editor: Arc<Mutex<Editor>>,
}

impl FakeNvim {
    pub fn new() -> Self {
        Self {
            editor: Arc::new(Mutex::new(Editor {
                current_buf: 1,
                ..Default::default()
            })),
        }
    }

    /// Open a new in-memory connection and return the client end.
    pub fn connect(&self) -> RpcClient {
        let (client_side, peer_side) = tokio::io::duplex(64 * 1024);
        let (pr, pw) = tokio::io::split(peer_side);
        self.serve(pr, pw);
        let (cr, cw) = tokio::io::split(client_side);
        RpcClient::from_io(cr, cw)
    }

    /// Accept connections on `listener` until the test ends.
    pub fn serve_listener(&self, listener: UnixListener) {
        let nvim = self.clone();
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let (r, w) = stream.into_split();
                nvim.serve(r, w);
            }
        });
    }

    fn serve<R, W>(&self, reader: R, writer: W) -> i64
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let writer = Arc::new(MessageWriter::new(writer));
        let channel = {
            let mut editor = self.editor.lock().unwrap();
            editor.next_channel += 1;
            let channel = editor.next_channel;
            editor.channels.insert(channel, writer.clone());
            channel
        };

        let nvim = self.clone();
        tokio::spawn(async move {
            let mut reader = MessageReader::new(reader);
            while let Ok(Some(message)) = reader.next_message().await {
                if let Message::Request { id, method, args } = message {
                    let (error, result) = match nvim.handle(channel, &method, args) {
                        Ok(result) => (None, result),
                        Err(message) => (
                            Some(Value::from(vec![Value::from(0), Value::from(message)])),
                            Value::Nil,
                        ),
                    };
                    if writer
                        .send(&Message::Response { id, error, result })
                        .await
                        .is_err()
                    {
                        break;
                    }
                }
            }
        });
        channel
    }

    fn handle(&self, channel: i64, method: &str, args: Vec<Value>) -> Result<Value, String> {
        let mut editor = self.editor.lock().unwrap();
        match method {
            "nvim_get_api_info" => Ok(Value::from(vec![Value::from(channel), Value::Map(vec![])])),
            "nvim_command" => {
                let command = args[0].as_str().unwrap_or_default().to_string();
                if let Some((buffer, identity)) = registration(&command) {
                    let key = (buffer, "nvr".to_string());
                    let mut current: Vec<Value> = editor
                        .buf_vars
                        .get(&key)
                        .and_then(Value::as_array)
                        .map(<[Value]>::to_vec)
                        .unwrap_or_default();
                    if !current.iter().any(|v| v.as_i64() == Some(identity)) {
                        current.insert(0, Value::from(identity));
                        editor.buf_vars.insert(key, Value::Array(current));
                    }
                } else if let Some(rest) = command.split("<buffer=").nth(1) {
                    let bufnr: i64 = rest.split('>').next().unwrap().parse().unwrap();
                    editor.buf_delete_triggers.insert((channel, bufnr));
                } else if command.contains("VimLeave") {
                    editor.exit_triggers.insert(channel);
                } else if command.starts_with("edit ") || command == "enew" {
                    editor.current_buf += 1;
                } else if command.starts_with("bogus") {
                    return Err(format!("E492: Not an editor command: {}", command));
                }
                editor.commands.push((channel, command));
                Ok(Value::Nil)
            }
            "nvim_eval" => match args[0].as_str() {
                Some("1+1") => Ok(Value::from(2)),
                Some(expr) => Err(format!("E121: Undefined variable: {}", expr)),
                None => Err("E474: Invalid argument".to_string()),
            },
            "nvim_call_function" => {
                let call = args[1].as_array().unwrap();
                match args[0].as_str() {
                    Some("getbufvar") => {
                        let key = (call[0].as_i64().unwrap(), call[1].as_str().unwrap().to_string());
                        Ok(editor.buf_vars.get(&key).cloned().unwrap_or_else(|| call[2].clone()))
                    }
                    other => Err(format!("E117: Unknown function: {:?}", other)),
                }
            }
            "nvim_get_current_buf" => Ok(Value::Ext(0, vec![editor.current_buf as u8])),
            "nvim_buf_set_lines" => {
                let lines = args[4]
                    .as_array()
                    .unwrap()
                    .iter()
                    .map(|l| l.as_str().unwrap().to_string())
                    .collect();
                editor.lines.insert(args[0].as_i64().unwrap(), lines);
                Ok(Value::Nil)
            }
            other => Err(format!("Invalid method: {}", other)),
        }
    }

    /// Set a buffer variable directly, as another plugin might.
    pub fn set_buf_var(&self, buffer: i64, name: &str, value: Value) {
        self.editor
            .lock()
            .unwrap()
            .buf_vars
            .insert((buffer, name.to_string()), value);
    }

    /// Current `b:nvr` of `buffer` as a list of channel ids.
    pub fn registry(&self, buffer: i64) -> Vec<i64> {
        self.editor
            .lock()
            .unwrap()
            .buf_vars
            .get(&(buffer, "nvr".to_string()))
            .and_then(Value::as_array)
            .map(|items| items.iter().filter_map(Value::as_i64).collect())
            .unwrap_or_default()
    }

    pub fn commands(&self) -> Vec<String> {
        self.editor
            .lock()
            .unwrap()
            .commands
            .iter()
            .map(|(_, c)| c.clone())
            .collect()
    }

    pub fn lines(&self, buffer: i64) -> Option<Vec<String>> {
        self.editor.lock().unwrap().lines.get(&buffer).cloned()
    }

    /// Wait until `channel` is registered on `buffer`.
    pub async fn until_registered(&self, buffer: i64, channel: i64) {
        for _ in 0..500 {
            if self.registry(buffer).contains(&channel) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
        panic!("channel {} never registered on buffer {}", channel, buffer);
    }

    /// Delete `buffer`, firing every installed BufDelete trigger for it.
    pub async fn delete_buffer(&self, buffer: i64) {
        let targets: Vec<Arc<MessageWriter>> = {
            let editor = self.editor.lock().unwrap();
            editor
                .buf_delete_triggers
                .iter()
                .filter(|(_, b)| *b == buffer)
                .filter_map(|(c, _)| editor.channels.get(c).cloned())
                .collect()
        };
        for writer in targets {
            let _ = writer
                .send(&Message::Notification {
                    method: "BufDelete".to_string(),
                    args: vec![Value::from(buffer)],
                })
                .await;
        }
    }

    /// Exit with `code`, firing every installed VimLeave trigger.
    pub async fn exit(&self, code: i64) {
        let targets: Vec<Arc<MessageWriter>> = {
            let editor = self.editor.lock().unwrap();
            editor
                .exit_triggers
                .iter()
                .filter_map(|c| editor.channels.get(c).cloned())
                .collect()
        };
        for writer in targets {
            let _ = writer
                .send(&Message::Notification {
                    method: "Exit".to_string(),
                    args: vec![Value::from(code)],
                })
                .await;
        }
    }

    /// Send an arbitrary notification to `channel`.
    pub async fn notify(&self, channel: i64, method: &str, args: Vec<Value>) {
        let writer = self.editor.lock().unwrap().channels.get(&channel).cloned();
        if let Some(writer) = writer {
            writer
                .send(&Message::Notification {
                    method: method.to_string(),
                    args,
                })
                .await
                .unwrap();
        }
    }

    /// Close the editor's side of `channel`.
    pub async fn hang_up(&self, channel: i64) {
        let writer = self.editor.lock().unwrap().channels.remove(&channel);
        if let Some(writer) = writer {
            writer.shutdown().await.unwrap();
        }
    }
}

/// `(buffer, identity)` of a registry update command.
fn registration(command: &str) -> Option<(i64, i64)> {
    let rest = command.strip_prefix("if index(getbufvar(")?;
    let (buffer, rest) = rest.split_once(", ")?;
    let (_, rest) = rest.split_once("[]), ")?;
    let (identity, _) = rest.split_once(')')?;
    Some((buffer.parse().ok()?, identity.parse().ok()?))
}
