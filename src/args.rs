use std::path::PathBuf;

use structopt::clap::AppSettings;
use structopt::StructOpt;

#[derive(Debug, StructOpt)]
#[structopt(
name = "pg-table-migrator",
version = env ! ("CARGO_PKG_VERSION"),
about = "Copies the community site tables from a source PostgreSQL database into a destination one: applies the schema scripts, loads rows in batches and verifies row counts.\n\nConnection strings are read from SOURCE_DATABASE_URL and DESTINATION_DATABASE_URL.",
setting = AppSettings::ColoredHelp,
)]
pub struct Args {
    /// Activate verbose mode
    #[structopt(short = "v", long = "verbose")]
    pub verbose: bool,

    /// Activate quiet mode
    #[structopt(short = "q", long = "quiet")]
    pub quiet: bool,

    /// Settings file, defaults to config.toml when present
    #[structopt(short = "c", long = "config", parse(from_os_str))]
    pub config: Option<PathBuf>,
}
