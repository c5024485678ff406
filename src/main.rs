//! Command-line entry point: generates an OpenAPI document from a Rust web
//! service's handler code.
//!
//! # Usage
//!
//! ```bash
//! openapi-from-source [OPTIONS] <PROJECT_PATH>
//! ```
//!
//! Only files carrying the `@openapi` marker comment in their first bytes are
//! analyzed for handlers; routes come from the router code or from `--routes`.
//!
//! ```bash
//! openapi-from-source ./my-service -o openapi.yaml
//! openapi-from-source ./my-service -f json --routes routes.yaml -v
//! ```

use anyhow::Result;
use clap::Parser;
use log::info;
use openapi_from_source::cli;

fn main() -> Result<()> {
    let args = cli::CliArgs::parse();

    let log_level = if args.verbose {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };

    env_logger::Builder::from_default_env()
        .filter_level(log_level)
        .init();

    info!("openapi-from-source starting...");

    let args = cli::parse_args_from_parsed(args)?;
    cli::run(args)?;

    info!("OpenAPI document generation completed successfully");

    Ok(())
}
