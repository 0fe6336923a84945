use clap::{Parser, ValueEnum};
use std::path::PathBuf;

/// bash-prompt-vars: print host and version-control status as shell variables
#[derive(Parser, Debug)]
#[command(
    name = "bash-prompt-vars",
    about,
    long_about = None,
    disable_version_flag = true
)]
pub struct Cli {
    /// inspect DIR instead of the current directory
    #[arg(short = 'C', long, value_name = "DIR")]
    pub directory: Option<PathBuf>,

    /// skip version-control detection (same as setting BASH_PROMPT_SKIP_VCS_CHECK)
    #[arg(long)]
    pub no_vcs: bool,

    /// output format
    #[arg(long, value_enum, default_value_t = Format::Shell)]
    pub format: Format,

    /// report version-control errors on stderr
    #[arg(short, long)]
    pub verbose: bool,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum Format {
    /// `name="value"` lines for eval
    Shell,
    /// a single JSON object
    Json,
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
