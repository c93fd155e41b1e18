//! hrlex CLI: retrieval backend for UK employment-guidance Q&A.
//!
//! Seeds and refreshes the passage store from authoritative sources and
//! runs retrieval queries, printing ranked passages for the
//! answer-generation layer.

mod commands;

use clap::Parser;
use color_eyre::eyre::Result;

use commands::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    commands::init_tracing(&cli);
    commands::run(cli).await
}
