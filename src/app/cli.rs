use std::{fmt::Display, path::PathBuf, str::FromStr};

use clap::Parser;
use tracing_subscriber::filter::{self, Directive};

use crate::thread::ThreadMode;

#[derive(Parser)]
#[clap(author, version, about, long_about = None)]
pub struct Cli {
    #[clap(flatten)]
    pub args: Args,
}

#[derive(clap::Args, Clone)]
pub struct Args {
    /// Thread dump to read posts and the session from
    #[clap(required_unless_present = "print_log_dir")]
    pub snapshot: Option<PathBuf>,
    /// Post whose comment thread to open
    #[clap(required_unless_present = "print_log_dir")]
    pub post_id: Option<String>,
    #[clap(long, short, value_enum, default_value_t = Mode::Full)]
    pub mode: Mode,
    /// Overrides the nesting limit of the chosen mode
    #[clap(long)]
    pub max_nesting: Option<u32>,
    /// Config file to use instead of the default location
    #[clap(long, short)]
    pub config: Option<PathBuf>,
    #[clap(long, short, default_value_t = LogLevel::Info)]
    pub log_level: LogLevel,
    #[clap(long, short)]
    pub print_log_dir: bool,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum Mode {
    Preview,
    Full,
}

impl From<Mode> for ThreadMode {
    fn from(value: Mode) -> Self {
        match value {
            Mode::Preview => ThreadMode::Preview,
            Mode::Full => ThreadMode::Full,
        }
    }
}

#[derive(clap::ValueEnum, Clone, Debug)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
    None,
}

impl Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
            LogLevel::None => "off",
        };
        write!(f, "{s}")
    }
}

impl TryFrom<LogLevel> for Directive {
    type Error = filter::ParseError;
    fn try_from(value: LogLevel) -> Result<Self, Self::Error> {
        Directive::from_str(&value.to_string())
    }
}
