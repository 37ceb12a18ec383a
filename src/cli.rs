use chrono::NaiveDate;
use clap::builder::{styling::AnsiColor, Styles};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

const ABOUT: &str = "Export AEMET climate data";

const LONG_ABOUT: &str = "
Export AEMET OpenData climatological values and station metadata into a local
archive, one JSON file per station or per station and day.

Data already in the archive is never downloaded or written again, so commands
can be re-run or interrupted safely. The API key is read from AEMET_API_TOKEN.

Examples:
  aemet estaciones -o data
  aemet valores-climatologicos --start 2025-01-01 --end 2025-01-31 -o data
";

const STYLES: Styles = Styles::styled()
    .header(AnsiColor::Yellow.on_default())
    .usage(AnsiColor::Green.on_default())
    .literal(AnsiColor::Green.on_default())
    .placeholder(AnsiColor::Green.on_default());

#[derive(Parser, Debug)]
#[command(name = "aemet", version, styles = STYLES, about = ABOUT, long_about = LONG_ABOUT)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Fetch station information
    Estaciones {
        #[arg(short, long, default_value = ".", help = "Output directory")]
        output: PathBuf,
        #[arg(long, help = "Download the inventory even if stations are archived, adding missing ones")]
        fill_missing: bool,
    },
    /// Fetch climate data
    #[command(name = "valores-climatologicos")]
    ValoresClimatologicos {
        #[arg(long, help = "Start date (YYYY-MM-DD), defaults to 30 days before the end")]
        start: Option<NaiveDate>,
        #[arg(long, help = "End date (YYYY-MM-DD), defaults to yesterday")]
        end: Option<NaiveDate>,
        #[arg(short, long, default_value = ".", help = "Output directory")]
        output: PathBuf,
    },
}
