use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "sightings")]
#[command(about = "A CLI tool for recording and searching wildlife sightings")]
#[command(version = "1.0")]
pub(crate) struct Args {
    /// SQLite database file
    #[arg(long, env = "SIGHTINGS_DB", default_value = "sightings.db")]
    pub db: String,

    /// Keep records in memory only (lost on exit)
    #[arg(long, conflicts_with = "remote")]
    pub memory: bool,

    /// Base URL of a remote sighting API to use instead of a local store
    #[arg(short, long, env = "SIGHTINGS_API_URL")]
    pub remote: Option<String>,

    /// Base delay between remote retries in milliseconds
    #[arg(short, long, default_value = "500")]
    pub delay: u64,

    /// Maximum number of remote retry attempts
    #[arg(long, default_value = "3")]
    pub retries: u32,

    /// Print API response bodies as JSON (local store only)
    #[arg(long)]
    pub json: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub(crate) enum Command {
    /// Record a new sighting
    Add {
        species: String,
        location: String,
        /// Date as YYYY-MM-DD
        date: String,
        /// Time as HH:MM (24-hour)
        time: String,
    },
    /// List every sighting
    List {
        /// Print one summary line per sighting
        #[arg(long)]
        legacy: bool,
    },
    /// Search by species and/or location substring
    Search {
        #[arg(short, long)]
        species: Option<String>,
        #[arg(short, long)]
        location: Option<String>,
    },
    /// Show a single sighting
    Show { id: u64 },
    /// Change some fields of a sighting
    Update {
        id: u64,
        #[arg(long)]
        species: Option<String>,
        #[arg(long)]
        location: Option<String>,
        #[arg(long)]
        date: Option<String>,
        #[arg(long)]
        time: Option<String>,
    },
    /// Delete a sighting
    Delete { id: u64 },
    /// Write all sightings to a CSV file
    Export {
        #[arg(default_value = "sightings.csv")]
        output: String,
    },
    /// Create sightings from a CSV file
    Import {
        input: String,
        /// Maximum number of concurrent remote requests
        #[arg(short, long, default_value = "5")]
        concurrent: usize,
    },
}
