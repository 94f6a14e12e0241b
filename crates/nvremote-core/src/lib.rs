//! nvremote core - MessagePack-RPC client for remote-controlling a running Neovim.
//!
//! This crate speaks the editor's MessagePack-RPC protocol over its Unix
//! socket: it correlates calls with responses, routes notifications to
//! subscribers, and waits for buffers to be closed using editor-side
//! triggers. It has no command-line surface; see the `nvremote` crate.
//!
//! # Example
//!
//! ```rust,ignore
//! use nvremote_core::{NvimApi, RpcClient, WaitCoordinator, WaitOutcome};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> nvremote_core::Result<()> {
//!     let client = Arc::new(RpcClient::connect("/tmp/nvim.sock").await?);
//!     let api = NvimApi::new(client.clone());
//!
//!     api.command("edit notes.md").await?;
//!     let buffer = api.current_buffer().await?;
//!
//!     let waits = WaitCoordinator::with_api(client, api);
//!     match waits.wait_for_default(buffer).await? {
//!         WaitOutcome::Closed => println!("done editing"),
//!         WaitOutcome::HostExited(code) => println!("editor exited with {}", code),
//!     }
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod codec;
pub mod config;
pub mod error;
pub mod registry;
pub mod rpc;
pub mod transport;
pub mod wait;

// Re-export commonly used types
pub use api::{BufferHandle, NvimApi};
pub use codec::{Message, Value};
pub use config::{DiscoveryConfig, NvimProtocol, RpcConfig};
pub use error::{Result, RpcError, WaitError};
pub use registry::{prepend_identity, SharedResourceRegistry};
pub use rpc::{
    Notification, NotificationDispatcher, NotificationFilter, RemoteCall, RpcClient, Subscription,
};
pub use wait::{WaitCoordinator, WaitOutcome, WaitSession, WaitState};
