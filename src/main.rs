#[macro_use]
extern crate log;

use std::io::Write;
use std::process::ExitCode;
use std::{env, thread};

use anyhow::{Context, Result};
use chrono::Local;
use env_logger::Env;
use structopt::StructOpt;

use crate::args::Args;
use crate::common::helpers::print_error_chain;
use crate::config::Config;
use crate::connection::PostgresConnectionFactory;
use crate::migrate::migrator::DatabaseMigrator;

mod args;
mod common;
mod config;
mod connection;
mod extract;
mod insert;
mod migrate;
mod plan;
mod schema;
#[cfg(test)]
mod testing;

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    match init().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            print_error_chain(&err);
            ExitCode::FAILURE
        }
    }
}

async fn init() -> Result<()> {
    let options = Args::from_args();

    initialize_logger(options.verbose, options.quiet);

    let config = Config::load(options.config.as_deref()).context("Failed to load config")?;

    debug!("Total tables planned: {}", config.plan().len());

    let mut migrator = DatabaseMigrator::new(PostgresConnectionFactory, config);
    let report = migrator.run().await?;

    report.print_summary();

    Ok(())
}

fn initialize_logger(verbose: bool, quiet: bool) {
    // Set the `RUST_LOG` environment variable to control the logging level

    if quiet {
        env::set_var("RUST_LOG", "warn");
    } else {
        env::set_var("RUST_LOG", if verbose { "debug" } else { "info" });
    }

    env_logger::Builder::from_env(Env::default().default_filter_or("info"))
        .filter_module("sqlx", log::LevelFilter::Error)
        .format(|buf, record| {
            let timestamp = Local::now().format("%H:%M:%S");

            writeln!(
                buf,
                "{} {:<5} [{}] - {}",
                timestamp,
                record.level(),
                thread::current().name().unwrap_or("<unnamed>"),
                record.args()
            )
        })
        .init();
}
