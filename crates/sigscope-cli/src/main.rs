use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;
mod config;
mod input;

use config::CliConfig;

#[derive(Parser)]
#[command(name = "sigscope")]
#[command(about = "Signature-based memory introspection and state detection")]
#[command(version)]
struct Args {
    /// TOML configuration file
    #[arg(short, long, global = true, env = "SIGSCOPE_CONFIG")]
    config: Option<PathBuf>,

    /// Target executable name
    #[arg(short, long, global = true, env = "SIGSCOPE_PROCESS")]
    process: Option<String>,

    /// Signature table (JSON); the builtin table is used otherwise
    #[arg(short, long, global = true, env = "SIGSCOPE_SIGNATURES")]
    signatures: Option<PathBuf>,

    /// Show debug output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Track the target's state until Ctrl+C, Esc or q
    Watch {
        /// Offset cache file
        #[arg(long)]
        cache: Option<PathBuf>,
    },
    /// Attach once and resolve every field of the signature table
    Resolve {
        /// Attach to this pid instead of searching by name
        #[arg(long)]
        pid: Option<u32>,

        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Scan the target for a byte pattern ("48 8B 05 ?? ?? ?? ??")
    Scan {
        pattern: String,

        #[arg(long)]
        pid: Option<u32>,

        /// Search every readable region, not just the main module
        #[arg(long)]
        all_regions: bool,

        /// Stop after this many matches
        #[arg(long, default_value = "32")]
        limit: usize,
    },
    /// Dump target memory
    Hexdump {
        /// Address in hex, with or without 0x
        address: String,

        #[arg(long, default_value = "256")]
        size: usize,

        #[arg(long)]
        pid: Option<u32>,

        /// Hide the ASCII column
        #[arg(long)]
        no_ascii: bool,
    },
    /// Print or export the signature table
    Signatures {
        /// Write the table to this file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let args = Args::parse();

    let directive = if args.verbose {
        "sigscope=debug"
    } else {
        "sigscope=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(directive.parse()?))
        .init();

    let mut config = match &args.config {
        Some(path) => CliConfig::load(path)?,
        None => CliConfig::default(),
    };
    if let Some(process) = args.process {
        config.process_name = Some(process);
    }
    if let Some(signatures) = args.signatures {
        config.signatures = Some(signatures);
    }

    match args.command {
        Command::Watch { cache } => {
            if cache.is_some() {
                config.cache_path = cache;
            }
            commands::watch::run(&config)
        }
        Command::Resolve { pid, json } => commands::resolve::run(&config, pid, json),
        Command::Scan {
            pattern,
            pid,
            all_regions,
            limit,
        } => commands::scan::run(&config, &pattern, pid, all_regions, limit),
        Command::Hexdump {
            address,
            size,
            pid,
            no_ascii,
        } => commands::hexdump::run(&config, &address, size, !no_ascii, pid),
        Command::Signatures { output } => commands::signatures::run(&config, output.as_deref()),
    }
}
