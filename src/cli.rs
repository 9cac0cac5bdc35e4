// src/cli.rs

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Generate, validate and run LLM-written code locally.
///
/// `config.yaml` holds the defaults. CLI flags only override config values.
#[derive(Parser, Debug)]
#[command(name = "devagent", version, disable_help_subcommand = true)]
pub struct Cli {
    /// Path to config file (missing file = built-in defaults)
    #[arg(short, long, global = true, default_value = "config.yaml")]
    pub config: PathBuf,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Command,
}

/// All supported CLI commands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Validate a Python file and run it with a timeout.
    Run {
        /// Python source file
        file: PathBuf,

        /// Override execution.timeout_secs
        #[arg(long)]
        timeout: Option<u64>,

        /// Re-run whenever the file changes
        #[arg(long)]
        watch: bool,

        /// Override output.mode
        ///
        /// Allowed values: simple | pretty | stdout
        #[arg(long, value_parser = ["simple", "pretty", "stdout"])]
        output: Option<String>,
    },

    /// Check a Python file against the deny-list without running it.
    Validate {
        file: PathBuf,
    },

    /// Validate every `.py` file under a directory.
    Scan {
        #[arg(default_value = ".")]
        dir: PathBuf,
    },

    /// Print the fenced code block from a saved model reply.
    Extract {
        /// File containing the model's reply
        file: PathBuf,

        /// Preferred fence language
        #[arg(long, default_value = "python")]
        lang: String,
    },

    /// DSA mode: generate a solution and run it.
    Solve {
        /// Problem statement
        description: String,

        /// Use this file as the model reply instead of calling the API
        #[arg(long)]
        reply: Option<PathBuf>,
    },

    /// Frontend mode: generate a static page and save it.
    Frontend {
        /// Website type, e.g. Portfolio, Blog
        description: String,

        #[arg(long)]
        reply: Option<PathBuf>,

        /// Open the saved page in the default browser
        #[arg(long)]
        open: bool,
    },

    /// Backend mode: generate an API service and launch it until Ctrl-C.
    Backend {
        /// API requirements
        description: String,

        #[arg(long)]
        reply: Option<PathBuf>,
    },

    /// Serve the HTTP control panel.
    Serve {
        /// Override server.addr
        #[arg(long)]
        addr: Option<String>,
    },

    /// Initialise a project scaffold.
    ///
    /// Creates:
    /// - config.yaml
    /// - .env.example
    Init,
}
