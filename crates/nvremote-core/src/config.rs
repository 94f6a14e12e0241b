//! Centralized configuration for nvremote.
//!
//! Protocol constants, buffer sizes and timeouts live here so the codec,
//! transport and wait coordinator agree on them.

use std::time::Duration;

/// Transport and codec configuration.
pub struct RpcConfig;

impl RpcConfig {
    /// Bytes reserved in the read buffer before each socket read.
    pub const READ_CHUNK_SIZE: usize = 64 * 1024;
    /// Maximum nesting depth accepted by the decoder.
    pub const MAX_VALUE_DEPTH: usize = 32;
    pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
    /// Upper bound on a single wait session.
    pub const DEFAULT_WAIT_DEADLINE: Duration = Duration::from_secs(5 * 60);
}

/// Names from the Neovim API and from the notifications this client installs.
pub struct NvimProtocol;

impl NvimProtocol {
    pub const COMMAND: &'static str = "nvim_command";
    pub const EVAL: &'static str = "nvim_eval";
    pub const GET_API_INFO: &'static str = "nvim_get_api_info";
    pub const CALL_FUNCTION: &'static str = "nvim_call_function";
    pub const BUF_SET_LINES: &'static str = "nvim_buf_set_lines";
    pub const GET_CURRENT_BUF: &'static str = "nvim_get_current_buf";

    /// Emitted by the BufDelete trigger, args `[bufnr]`.
    pub const BUF_DELETE_EVENT: &'static str = "BufDelete";
    /// Emitted by the VimLeave trigger, args `[exit_code]`.
    pub const EXIT_EVENT: &'static str = "Exit";

    /// Augroup holding the wait triggers.
    pub const AUGROUP: &'static str = "nvr";
    /// Buffer-local variable listing waiting channel ids.
    pub const REGISTRY_VAR: &'static str = "nvr";

    /// Ext type id Neovim uses for buffer handles.
    pub const EXT_BUFFER: i8 = 0;
}

/// Socket discovery configuration.
pub struct DiscoveryConfig;

impl DiscoveryConfig {
    pub const LISTEN_ADDRESS_ENV: &'static str = "NVIM_LISTEN_ADDRESS";
    /// Set by Neovim inside its own terminal buffers.
    pub const NVIM_ENV: &'static str = "NVIM";
    pub const TMP_DIR: &'static str = "/tmp";
    pub const TMP_SOCKET_PREFIX: &'static str = "nvim";
    pub const TMP_SOCKET_NAME: &'static str = "0";
}
