//! ipactl - declarative directory object management
//!
//! Describe one object (group, user, service, CA ACL, DNS zone or record)
//! in a task file and `ipactl ensure` brings the directory server in line
//! with it, reporting whether anything had to change.

#![forbid(unsafe_code)]

mod commands;
mod task;

use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::Context;
use ipa_common::{LogConfig, LogFormat, init_logging};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::debug;

#[derive(Parser)]
#[command(name = "ipactl")]
#[command(author, version, about = "ipactl - declarative directory object management")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file (default: $XDG_CONFIG_HOME/ipactl/config.toml)
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log format: pretty or json
    #[arg(long, global = true, value_name = "FORMAT")]
    log_format: Option<LogFormat>,
}

#[derive(Subcommand)]
enum Commands {
    /// Bring one object to the state described in a task file
    Ensure {
        /// Task file (TOML, or JSON with a .json extension)
        #[arg(short, long)]
        task: PathBuf,

        /// Report what would change without changing it
        #[arg(long)]
        check: bool,
    },

    /// Show the current state of one object
    Find {
        /// Object type, e.g. group
        object_type: String,

        /// Identity values as key=value
        #[arg(value_name = "KEY=VALUE")]
        identity: Vec<String>,
    },

    /// List object types, or describe one
    Schema {
        /// Object type to describe
        object_type: Option<String>,
    },

    /// Print the JSON Schema of task files
    TaskSchema,

    /// Apply a text filter
    Filter {
        /// List the available filters
        #[arg(long)]
        list: bool,

        /// Filter name
        #[arg(required_unless_present = "list")]
        name: Option<String>,

        /// Input text
        #[arg(required_unless_present = "list")]
        input: Option<String>,

        /// Extra filter arguments
        #[arg(allow_hyphen_values = true)]
        args: Vec<String>,
    },

    /// Inspect configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Show the effective configuration and value sources
    Show {
        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprint!("{}", commands::error_entry(&err).format_full());
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let mut log_config = LogConfig::from_env("info").with_stderr();
    if cli.verbose {
        log_config = log_config.with_level("debug");
    }
    if let Some(format) = cli.log_format {
        log_config = log_config.with_format(format);
    }
    let _logging_guards = init_logging(&log_config)?;
    debug!(config = ?cli.config, "starting ipactl");

    let ctx = Context {
        config_path: cli.config,
        verbose: cli.verbose,
    };

    match cli.command {
        Commands::Ensure { task, check } => commands::ensure::run(&ctx, &task, check),
        Commands::Find {
            object_type,
            identity,
        } => commands::find::run(&ctx, &object_type, &identity),
        Commands::Schema { object_type } => commands::schema::run(object_type.as_deref()),
        Commands::TaskSchema => commands::schema::run_task_schema(),
        Commands::Filter {
            list,
            name,
            input,
            args,
        } => commands::filter::run(list, name.as_deref(), input.as_deref(), &args),
        Commands::Config {
            action: ConfigAction::Show { json },
        } => commands::config::show(&ctx, json),
    }
}
