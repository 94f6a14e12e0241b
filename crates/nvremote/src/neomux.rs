//! Shortcuts for terminal buffers inside the editor.
//!
//! These mirror the helper commands neomux installs in its terminals. Each
//! one expands to Ex commands and expressions run against the editor that
//! owns the terminal.

use crate::commands::fnameescape;
use clap::Subcommand;
use nvremote_core::NvimApi;

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Neomux {
    /// Print the full path of the file shown in window N
    #[command(name = "vim-window-print")]
    VimWindowPrint {
        #[arg(value_parser = clap::value_parser!(u32).range(1..))]
        window: u32,
    },
    /// Open FILE in window N
    Vimwindow {
        #[arg(value_parser = clap::value_parser!(u32).range(1..))]
        window: u32,
        file: String,
    },
    /// Open FILE in a split of window N
    Vimwindowsplit {
        #[arg(value_parser = clap::value_parser!(u32).range(1..))]
        window: u32,
        file: String,
    },
    /// Print the system clipboard
    Vbpaste,
    /// Copy TEXT to the system clipboard
    Vbcopy {
        #[arg(required = true)]
        text: Vec<String>,
    },
    /// Print the editor's global working directory
    Vpwd,
    /// Change the editor's working directory
    Vcd { dir: String },
}

/// One request sent to the editor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    Command(String),
    /// Evaluated and printed.
    Eval(String),
}

/// Ex command making window `window` of the current tab current.
pub fn window_switch(window: u32) -> String {
    format!("{}wincmd w", window)
}

/// Vim string literal for `text`.
///
/// Single-quoted unless `text` holds control characters, which only a
/// double-quoted literal can spell.
pub fn vim_string(text: &str) -> String {
    if !text.chars().any(char::is_control) {
        return format!("'{}'", text.replace('\'', "''"));
    }
    let mut out = String::with_capacity(text.len() + 2);
    out.push('"');
    for c in text.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c.is_control() => out.push_str(&format!("\\u{:04x}", u32::from(c))),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

impl Neomux {
    pub fn steps(&self) -> Vec<Step> {
        match self {
            Neomux::VimWindowPrint { window } => vec![Step::Eval(format!(
                "fnamemodify(bufname(winbufnr({})), ':p')",
                window
            ))],
            Neomux::Vimwindow { window, file } => vec![
                Step::Command(window_switch(*window)),
                Step::Command(format!("edit {}", fnameescape(file))),
            ],
            Neomux::Vimwindowsplit { window, file } => vec![
                Step::Command(window_switch(*window)),
                Step::Command(format!("split {}", fnameescape(file))),
            ],
            Neomux::Vbpaste => vec![Step::Eval("getreg('+')".to_string())],
            Neomux::Vbcopy { text } => vec![Step::Command(format!(
                "let @+ = {}",
                vim_string(&text.join(" "))
            ))],
            Neomux::Vpwd => vec![Step::Eval("getcwd(-1, -1)".to_string())],
            Neomux::Vcd { dir } => vec![Step::Command(format!("chdir {}", fnameescape(dir)))],
        }
    }
}

/// Run `steps` in order, printing each evaluated result on its own line.
pub async fn run_steps(api: &NvimApi, steps: &[Step]) -> anyhow::Result<()> {
    for step in steps {
        match step {
            Step::Command(command) => api.command(command).await?,
            Step::Eval(expr) => {
                let value = api.eval(expr).await?;
                println!("{}", value);
            }
        }
    }
    Ok(())
}
