//! zkmail CLI
//!
//! Usage:
//!   zkmail inspect <EMAIL> [--domain <DOMAIN>]
//!   zkmail prove <EMAIL> [--header OFFSET:TEXT]... [--body OFFSET:TEXT]... [--out <FILE>]
//!   zkmail verify <PROOF>
//!
//! Tool paths and the DoH endpoint are read from `ZKMAIL_*` environment
//! variables.

mod commands;

use std::env;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use commands::Cli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            env::var("RUST_LOG")
                .unwrap_or_else(|_| "info,zkmail_prover=debug,zkmail_core=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    commands::run(Cli::parse()).await
}
