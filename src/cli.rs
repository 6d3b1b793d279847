//! CLI argument parsing with clap

use crate::config::Config;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// dialect-lift - Batch source dialect conversion
///
/// Converts every source file under a directory with a primary converter,
/// optionally followed by an enhancement converter, keeping a backup of
/// each file so the whole run can be undone.
#[derive(Parser, Debug)]
#[command(name = "dialect-lift")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to configuration file (TOML format)
    ///
    /// When specified, settings from the config file are used as defaults.
    /// CLI arguments will override config file settings.
    #[arg(short = 'C', long, global = true)]
    pub config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output log format as JSON
    #[arg(long, global = true)]
    pub json_log: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Convert every source file under ROOT in place
    Convert(ConvertArgs),

    /// Move every backup under ROOT back over its original
    Restore {
        /// Directory tree to restore
        root: PathBuf,
    },

    /// Write a sample configuration file
    InitConfig {
        /// Where to write the file
        path: PathBuf,

        /// Overwrite an existing file
        #[arg(short, long)]
        force: bool,
    },
}

#[derive(Args, Debug, Default)]
pub struct ConvertArgs {
    /// Directory tree to convert
    pub root: PathBuf,

    /// Do not write backup sidecars
    #[arg(long)]
    pub no_backup: bool,

    /// Skip the enhancement stage
    #[arg(long)]
    pub no_enhancement: bool,

    /// Interpreter for module fallbacks and script tools
    #[arg(long)]
    pub interpreter: Option<PathBuf>,

    /// Kill a converter that runs longer than this many seconds (0 = no limit)
    #[arg(short = 't', long)]
    pub timeout: Option<u64>,

    /// Directory for log files and run reports
    #[arg(long)]
    pub log_dir: Option<PathBuf>,

    /// Do not save a JSON run report
    #[arg(long)]
    pub no_report: bool,
}

impl Cli {
    fn convert_args(&self) -> Option<&ConvertArgs> {
        match &self.command {
            Command::Convert(args) => Some(args),
            _ => None,
        }
    }

    /// Merge CLI arguments with config from file
    /// CLI arguments take precedence over config file settings
    pub fn merge_with_config(&self, mut config: Config) -> Config {
        let Some(args) = self.convert_args() else {
            return config;
        };

        if args.no_backup {
            config.backup = false;
        }
        if args.no_enhancement {
            config.enhancement = false;
        }
        if let Some(ref interpreter) = args.interpreter {
            config.interpreter = Some(interpreter.clone());
        }
        if let Some(timeout) = args.timeout {
            config.tool_timeout_secs = Some(timeout);
        }
        if let Some(ref log_dir) = args.log_dir {
            config.log_dir = log_dir.clone();
        }
        if args.no_report {
            config.write_report = false;
        }

        config
    }

    /// Convert CLI arguments to Config (when no config file is used)
    pub fn to_config(&self) -> Config {
        self.merge_with_config(Config::default())
    }
}
