//! Finding the editor's listening socket.
//!
//! Candidates are tried in order and the first one that accepts a
//! connection wins:
//! 1. `--servername`
//! 2. `$NVIM_LISTEN_ADDRESS`
//! 3. `$NVIM` (set inside the editor's terminal buffers)
//! 4. `nvim.<pid>.0` sockets in the user runtime directory
//! 5. `/tmp/nvim*/0`

use anyhow::{bail, Result};
use nvremote_core::DiscoveryConfig;
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use tokio::net::UnixStream;
use tracing::debug;

static RUNTIME_SOCKET_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^nvim\.\d+\.0$").expect("runtime socket regex must compile")
});

/// Everything discovery looks at, gathered up front.
#[derive(Debug, Default, Clone)]
pub struct DiscoveryInputs {
    pub servername: Option<String>,
    pub listen_address: Option<String>,
    pub nvim: Option<String>,
    pub runtime_dir: Option<PathBuf>,
    pub tmp_dir: PathBuf,
}

impl DiscoveryInputs {
    pub fn from_env(servername: Option<String>) -> Self {
        let var = |name: &str| std::env::var(name).ok().filter(|v| !v.is_empty());
        Self {
            servername,
            listen_address: var(DiscoveryConfig::LISTEN_ADDRESS_ENV),
            nvim: var(DiscoveryConfig::NVIM_ENV),
            runtime_dir: dirs::runtime_dir(),
            tmp_dir: PathBuf::from(DiscoveryConfig::TMP_DIR),
        }
    }
}

/// Candidate socket paths in priority order.
pub fn candidates(inputs: &DiscoveryInputs) -> Vec<PathBuf> {
    let mut out: Vec<PathBuf> = [&inputs.servername, &inputs.listen_address, &inputs.nvim]
        .into_iter()
        .flatten()
        .map(PathBuf::from)
        .collect();

    if let Some(runtime_dir) = &inputs.runtime_dir {
        out.extend(runtime_sockets(runtime_dir));
    }
    out.extend(tmp_sockets(&inputs.tmp_dir));
    out
}

fn runtime_sockets(dir: &Path) -> Vec<PathBuf> {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return Vec::new();
    };
    let mut found: Vec<PathBuf> = entries
        .filter_map(|e| e.ok())
        .filter(|e| RUNTIME_SOCKET_RE.is_match(&e.file_name().to_string_lossy()))
        .map(|e| e.path())
        .collect();
    found.sort();
    found
}

fn tmp_sockets(dir: &Path) -> Vec<PathBuf> {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return Vec::new();
    };
    let mut found: Vec<PathBuf> = entries
        .filter_map(|e| e.ok())
        .filter(|e| {
            e.file_name()
                .to_string_lossy()
                .starts_with(DiscoveryConfig::TMP_SOCKET_PREFIX)
        })
        .map(|e| e.path().join(DiscoveryConfig::TMP_SOCKET_NAME))
        .filter(|p| p.exists())
        .collect();
    found.sort();
    found
}

/// First candidate that accepts a connection.
pub async fn discover(inputs: &DiscoveryInputs) -> Result<PathBuf> {
    for candidate in candidates(inputs) {
        match UnixStream::connect(&candidate).await {
            Ok(_) => {
                debug!("Using socket {}", candidate.display());
                return Ok(candidate);
            }
            Err(e) => debug!("Skipping {}: {}", candidate.display(), e),
        }
    }
    bail!("no running Neovim instance found; pass --servername or set NVIM_LISTEN_ADDRESS")
}
