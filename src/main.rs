// src/main.rs

//! devagent
//!
//! Entry point for the devagent CLI.
//!
//! Turns a task description into code through an LLM backend, checks the
//! code against a deny-list and then saves, launches or runs it. All real
//! work lives in `runner`; this file only sets up the process.

mod auth;
mod cli;
mod config;
mod engine;
mod execution_id;
mod generator;
mod metrics;
mod runner;
mod runtime;
mod sinks;
mod tasks;
mod util;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

/// Program entry point.
///
/// Uses Tokio because snippets and generated services run as child
/// processes awaited asynchronously, and `serve` hosts an axum server.
#[tokio::main]
async fn main() -> Result<()> {
    // Secrets (GOOGLE_API_KEY, DEVAGENT_API_KEY) may live in .env
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("devagent=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = cli::Cli::parse();

    runner::run(cli).await
}
