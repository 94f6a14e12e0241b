//! Waiting for the editor to close a buffer.
//!
//! A session subscribes first, then installs editor-side triggers that
//! notify this channel, then registers in the buffer's shared registry.
//! It completes on the first qualifying notification:
//!
//! ```text
//! Idle -> TriggerInstalled -> Registered -> Satisfied
//!                                        -> TimedOut
//! (any) ----------------------------------> Failed
//! ```
//!
//! The deadline covers the whole session, setup included.

use crate::api::{BufferHandle, NvimApi};
use crate::codec::Value;
use crate::config::{NvimProtocol, RpcConfig};
use crate::registry::SharedResourceRegistry;
use crate::rpc::{NotificationFilter, RpcClient};
use crate::{Result, RpcError};
use futures::future::try_join_all;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OnceCell;
use tokio::time::Instant;
use tracing::info;

/// Where a wait session is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitState {
    Idle,
    TriggerInstalled,
    Registered,
    Satisfied,
    TimedOut,
    Failed,
}

impl WaitState {
    pub fn is_terminal(self) -> bool {
        matches!(self, WaitState::Satisfied | WaitState::TimedOut | WaitState::Failed)
    }
}

/// How a satisfied wait ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    /// The buffer was deleted.
    Closed,
    /// The editor is exiting with this status.
    HostExited(i64),
}

/// One wait on one buffer.
#[derive(Debug)]
pub struct WaitSession {
    buffer: BufferHandle,
    state: WaitState,
}

impl WaitSession {
    pub fn new(buffer: BufferHandle) -> Self {
        Self {
            buffer,
            state: WaitState::Idle,
        }
    }

    pub fn buffer(&self) -> BufferHandle {
        self.buffer
    }

    pub fn state(&self) -> WaitState {
        self.state
    }

    fn transition(&mut self, next: WaitState) {
        info!("Wait on buffer {}: {:?} -> {:?}", self.buffer, self.state, next);
        self.state = next;
    }

    /// Drive the session to a terminal state.
    ///
    /// Can only be run once.
    pub async fn run(
        &mut self,
        coordinator: &WaitCoordinator,
        deadline: Duration,
    ) -> Result<WaitOutcome> {
        if self.state != WaitState::Idle {
            return Err(RpcError::InvalidState {
                message: format!("wait session on buffer {} already ran", self.buffer),
            });
        }

        let until = Instant::now() + deadline;
        let outcome = match tokio::time::timeout_at(until, self.drive(coordinator)).await {
            Ok(outcome) => outcome,
            Err(_) => Err(RpcError::Timeout(deadline)),
        };

        self.transition(match &outcome {
            Ok(_) => WaitState::Satisfied,
            Err(RpcError::Timeout(_)) => WaitState::TimedOut,
            Err(_) => WaitState::Failed,
        });
        outcome
    }

    async fn drive(&mut self, coordinator: &WaitCoordinator) -> Result<WaitOutcome> {
        let bufnr = self.buffer.0;

        // Subscribe before anything can fire.
        let mut closed = coordinator.client.subscribe(
            NotificationFilter::method(NvimProtocol::BUF_DELETE_EVENT)
                .with_predicate(move |args| args.first().and_then(Value::as_i64) == Some(bufnr)),
        )?;
        let mut exited = coordinator
            .client
            .subscribe(NotificationFilter::method(NvimProtocol::EXIT_EVENT))?;

        let channel = coordinator.api.channel_id().await?;
        coordinator.install_exit_trigger(channel).await?;
        coordinator
            .api
            .command(&buf_delete_trigger(channel, self.buffer))
            .await?;
        self.transition(WaitState::TriggerInstalled);

        SharedResourceRegistry::register(&coordinator.api, self.buffer, channel).await?;
        self.transition(WaitState::Registered);

        tokio::select! {
            delivered = closed.recv() => {
                delivered?;
                Ok(WaitOutcome::Closed)
            }
            delivered = exited.recv() => {
                let code = delivered?.args.first().and_then(Value::as_i64).unwrap_or(0);
                Ok(WaitOutcome::HostExited(code))
            }
        }
    }
}

/// Runs wait sessions over one connection.
pub struct WaitCoordinator {
    client: Arc<RpcClient>,
    api: NvimApi,
    exit_trigger: OnceCell<()>,
}

impl WaitCoordinator {
    pub fn new(client: Arc<RpcClient>) -> Self {
        let api = NvimApi::new(client.clone());
        Self::with_api(client, api)
    }

    /// Share an existing API wrapper (and its cached channel id).
    pub fn with_api(client: Arc<RpcClient>, api: NvimApi) -> Self {
        Self {
            client,
            api,
            exit_trigger: OnceCell::new(),
        }
    }

    /// Block until `buffer` is deleted, the editor exits, or `deadline` passes.
    pub async fn wait_for(&self, buffer: BufferHandle, deadline: Duration) -> Result<WaitOutcome> {
        WaitSession::new(buffer).run(self, deadline).await
    }

    /// [`wait_for`](Self::wait_for) with the default deadline.
    pub async fn wait_for_default(&self, buffer: BufferHandle) -> Result<WaitOutcome> {
        self.wait_for(buffer, RpcConfig::DEFAULT_WAIT_DEADLINE).await
    }

    /// Wait on every buffer concurrently; completes when all sessions do.
    ///
    /// Editor exit satisfies every session at once.
    pub async fn wait_for_all(
        &self,
        buffers: &[BufferHandle],
        deadline: Duration,
    ) -> Result<Vec<WaitOutcome>> {
        try_join_all(buffers.iter().map(|b| self.wait_for(*b, deadline))).await
    }

    async fn install_exit_trigger(&self, channel: i64) -> Result<()> {
        self.exit_trigger
            .get_or_try_init(|| async {
                self.api.command(&group_definition()).await?;
                self.api.command(&exit_trigger(channel)).await
            })
            .await?;
        Ok(())
    }
}

fn group_definition() -> String {
    format!("augroup {} | augroup END", NvimProtocol::AUGROUP)
}

fn buf_delete_trigger(channel: i64, buffer: BufferHandle) -> String {
    format!(
        "autocmd {} BufDelete <buffer={}> silent! call rpcnotify({}, '{}', {})",
        NvimProtocol::AUGROUP,
        buffer,
        channel,
        NvimProtocol::BUF_DELETE_EVENT,
        buffer
    )
}

fn exit_trigger(channel: i64) -> String {
    format!(
        "autocmd {} VimLeave * silent! call rpcnotify({}, '{}', v:exiting)",
        NvimProtocol::AUGROUP,
        channel,
        NvimProtocol::EXIT_EVENT
    )
}
