use std::io;
use std::path::PathBuf;

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;

use crate::engine::RuntimeMode;

#[derive(Parser)]
#[command(name = "glasstokey")]
#[command(about = "Turn a multi-touch trackpad surface into a virtual keyboard")]
#[command(arg_required_else_help = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the input pipeline daemon
    Daemon {
        /// Config file (default: ~/.config/glasstokey/glasstokey.toml)
        #[arg(long)]
        config: Option<PathBuf>,
        /// Log dispatch events instead of creating a uinput device
        #[arg(long)]
        dry_run: bool,
    },
    /// Show daemon status
    Status {
        /// Machine-readable JSON output
        #[arg(long)]
        json: bool,
    },
    /// Switch the runtime mode
    Mode {
        #[arg(value_enum)]
        mode: ModeArg,
    },
    /// Reload config and keymap in the running daemon
    Reload,
    /// Validate a config file and its keymap
    Validate {
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Generate shell completions
    Completion {
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
pub enum ModeArg {
    Mouse,
    Mixed,
    Keyboard,
}

impl From<ModeArg> for RuntimeMode {
    fn from(arg: ModeArg) -> Self {
        match arg {
            ModeArg::Mouse => Self::MouseOnly,
            ModeArg::Mixed => Self::Mixed,
            ModeArg::Keyboard => Self::KeyboardOnly,
        }
    }
}

pub fn generate_completion(shell: Shell) {
    let mut cmd = Cli::command();
    let name = cmd.get_name().to_string();
    clap_complete::generate(shell, &mut cmd, name, &mut io::stdout());
}
