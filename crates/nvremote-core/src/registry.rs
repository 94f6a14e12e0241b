//! Shared resource registry.
//!
//! The list of channels waiting on a buffer lives in the editor itself, as
//! the buffer-local variable `b:nvr`, so every client connected to the same
//! editor sees and extends one list. The most recent waiter comes first.
//!
//! Clients on different channels register concurrently, so the
//! read-modify-write runs inside the editor as one Ex command. The editor
//! executes a single request to completion before serving another, which
//! makes the check-and-prepend atomic across clients.

use crate::api::{BufferHandle, NvimApi};
use crate::codec::Value;
use crate::config::NvimProtocol;
use crate::{Result, RpcError};
use tracing::debug;

/// Read and update the per-buffer list of waiting channel ids.
pub struct SharedResourceRegistry;

impl SharedResourceRegistry {
    /// Add `identity` to the front of the buffer's list unless present.
    ///
    /// Returns the list as it stands after the call.
    pub async fn register(
        api: &NvimApi,
        buffer: BufferHandle,
        identity: i64,
    ) -> Result<Vec<i64>> {
        // A non-list value would make the editor-side update fail with an
        // opaque Vim error; reject it as a protocol violation first.
        Self::entries(api, buffer).await?;

        api.command(&prepend_command(buffer, identity)).await?;
        let entries = Self::entries(api, buffer).await?;
        debug!("Registered channel {} on buffer {}: {:?}", identity, buffer, entries);
        Ok(entries)
    }

    /// Current list for `buffer`; empty if the variable is unset.
    pub async fn entries(api: &NvimApi, buffer: BufferHandle) -> Result<Vec<i64>> {
        let value = api
            .buf_var_or(buffer, NvimProtocol::REGISTRY_VAR, Value::Array(vec![]))
            .await?;
        parse_entries(value, buffer)
    }
}

/// Ex command applying [`prepend_identity`] to `b:nvr` inside the editor.
pub fn prepend_command(buffer: BufferHandle, identity: i64) -> String {
    let current = format!(
        "getbufvar({}, '{}', [])",
        buffer,
        NvimProtocol::REGISTRY_VAR
    );
    format!(
        "if index({current}, {identity}) < 0 | call setbufvar({buffer}, '{var}', [{identity}] + {current}) | endif",
        current = current,
        identity = identity,
        buffer = buffer,
        var = NvimProtocol::REGISTRY_VAR,
    )
}

fn parse_entries(value: Value, buffer: BufferHandle) -> Result<Vec<i64>> {
    let items = value.into_array().ok_or_else(|| {
        RpcError::protocol(format!(
            "b:{} on buffer {} is not a list",
            NvimProtocol::REGISTRY_VAR,
            buffer
        ))
    })?;
    items
        .iter()
        .map(|item| {
            item.as_i64().ok_or_else(|| {
                RpcError::protocol(format!(
                    "b:{} on buffer {} holds non-integer {}",
                    NvimProtocol::REGISTRY_VAR,
                    buffer,
                    item
                ))
            })
        })
        .collect()
}

/// `[identity] + current`, or `None` if `identity` is already present.
pub fn prepend_identity(current: &[i64], identity: i64) -> Option<Vec<i64>> {
    if current.contains(&identity) {
        return None;
    }
    let mut updated = Vec::with_capacity(current.len() + 1);
    updated.push(identity);
    updated.extend_from_slice(current);
    Some(updated)
}

/// Parse a command built by [`prepend_command`] back into `(buffer, identity)`.
#[cfg(test)]
pub(crate) fn parse_prepend_command(command: &str) -> Option<(i64, i64)> {
    let rest = command.strip_prefix("if index(getbufvar(")?;
    let (buffer, rest) = rest.split_once(", ")?;
    let (_, rest) = rest.split_once("[]), ")?;
    let (identity, _) = rest.split_once(')')?;
    Some((buffer.parse().ok()?, identity.parse().ok()?))
}
