use crate::watch::WatchMode;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "api-console",
    version,
    about = "ASP.NET controller endpoint detection and request console",
    after_help = r#"Examples:
  api-console scan --workspace .
  api-console detect --file Api/Controllers/UsersController.cs --line 12
  api-console base-url --file Api/Controllers/UsersController.cs
  api-console serve --workspace . --watch auto
"#
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// List every endpoint in the workspace's controllers as JSON.
    Scan {
        #[arg(long, default_value = ".")]
        workspace: PathBuf,
        /// Include files ignored by .gitignore.
        #[arg(long)]
        no_ignore: bool,
    },
    /// Classify the method declared on one line.
    Detect {
        #[arg(long)]
        file: PathBuf,
        /// 1-based line of the method signature.
        #[arg(long)]
        line: usize,
        #[arg(long, default_value = ".")]
        workspace: PathBuf,
    },
    /// Print the launch profile base URL for a source file's project.
    BaseUrl {
        #[arg(long)]
        file: PathBuf,
    },
    /// Run the JSONL host protocol over stdin/stdout.
    Serve {
        #[arg(long, default_value = ".")]
        workspace: PathBuf,
        /// Launch settings watch mode: auto|on|off.
        #[arg(long, default_value = "auto")]
        watch: WatchMode,
        /// Keep request history in memory only.
        #[arg(long)]
        no_state: bool,
    },
}
