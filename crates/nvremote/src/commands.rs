//! Turning command-line requests into editor commands.

use nvremote_core::{BufferHandle, NvimApi};
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::info;

/// Characters `fnameescape()` backslash-escapes.
const FNAME_SPECIAL: &str = " \t\n*?[{`$\\%#'\"|!<";

/// Escape a path for use as an Ex command argument.
pub fn fnameescape(path: &str) -> String {
    if path == "-" {
        return "\\-".to_string();
    }
    let mut out = String::with_capacity(path.len() + 4);
    if path.starts_with('+') || path.starts_with('>') {
        out.push('\\');
    }
    for c in path.chars() {
        if FNAME_SPECIAL.contains(c) {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// How a file is placed in the editor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    Edit,
    Tab,
    Split,
    VSplit,
}

impl OpenMode {
    fn command(self) -> &'static str {
        match self {
            OpenMode::Edit => "edit",
            OpenMode::Tab => "tabedit",
            OpenMode::Split => "split",
            OpenMode::VSplit => "vsplit",
        }
    }

    /// Command that opens an empty buffer the same way.
    fn scratch_command(self) -> &'static str {
        match self {
            OpenMode::Edit => "enew",
            OpenMode::Tab => "tabnew",
            OpenMode::Split => "new",
            OpenMode::VSplit => "vnew",
        }
    }

    fn is_split(self) -> bool {
        matches!(self, OpenMode::Split | OpenMode::VSplit)
    }
}

/// One file to open.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRequest {
    pub path: String,
    pub mode: OpenMode,
    pub wait: bool,
}

impl FileRequest {
    pub fn new(path: impl Into<String>, mode: OpenMode, wait: bool) -> Self {
        Self {
            path: path.into(),
            mode,
            wait,
        }
    }

    pub fn is_stdin(&self) -> bool {
        self.path == "-"
    }

    /// Ex command that opens this file.
    pub fn open_command(&self) -> String {
        if self.is_stdin() {
            self.mode.scratch_command().to_string()
        } else {
            format!("{} {}", self.mode.command(), fnameescape(&self.path))
        }
    }
}

/// Split text into buffer lines; a trailing newline adds no empty line.
pub fn buffer_lines(text: &str) -> Vec<String> {
    text.lines().map(str::to_string).collect()
}

/// Open every request in order and return the buffers to wait on.
pub async fn open_files<R: AsyncRead + Unpin>(
    api: &NvimApi,
    requests: &[FileRequest],
    stdin: &mut R,
) -> anyhow::Result<Vec<BufferHandle>> {
    let mut waits = Vec::new();
    for request in requests {
        api.command(&request.open_command()).await?;

        if request.is_stdin() {
            let mut text = String::new();
            stdin.read_to_string(&mut text).await?;
            let buffer = api.current_buffer().await?;
            api.set_buffer_lines(buffer, 0, -1, buffer_lines(&text))
                .await?;
        }

        if request.wait {
            let buffer = api.current_buffer().await?;
            info!("Will wait on buffer {} ({})", buffer, request.path);
            waits.push(buffer);
        }
    }

    if requests.iter().any(|r| r.mode.is_split()) {
        api.command("wincmd =").await?;
    }
    Ok(waits)
}
