mod parse;
mod util;

use crate::parse::{Args, Command};
use crate::util::print_hms;
use clap::Parser;
use log::debug;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use wildlife_sightings::api::{ApiResponse, ListFormat, SightingApi};
use wildlife_sightings::client::SightingClient;
use wildlife_sightings::export::{ImportReport, import_into, load_from_csv, save_to_csv};
use wildlife_sightings::memory::MemoryStore;
use wildlife_sightings::sqlite::SqliteStore;
use wildlife_sightings::{NewSighting, SearchFilter, SightingRecord, SightingStore, SightingUpdate};

enum Backend {
    Local(Arc<dyn SightingStore>),
    Remote(SightingClient),
}

impl Backend {
    fn from_args(args: &Args) -> wildlife_sightings::Result<Self> {
        if let Some(url) = &args.remote {
            debug!("Using remote API at {}", url);
            let client = SightingClient::new(url)?
                .with_delay(args.delay)
                .with_max_retries(args.retries);
            return Ok(Backend::Remote(client));
        }
        if args.memory {
            debug!("Using in-memory store");
            return Ok(Backend::Local(Arc::new(MemoryStore::new())));
        }
        debug!("Using SQLite store at {}", args.db);
        Ok(Backend::Local(Arc::new(SqliteStore::open(&args.db)?)))
    }
}

fn print_records<'a>(records: impl IntoIterator<Item = &'a SightingRecord>, legacy: bool) {
    for record in records {
        if legacy {
            println!("{}: {}", record.id, record);
        } else {
            println!(
                "{:>5}  {:<24} {:<24} {} {}",
                record.id,
                record.species,
                record.location,
                record.date,
                record.time.format("%H:%M")
            );
        }
    }
}

fn print_report(report: &ImportReport) {
    println!("\nImport summary:");
    println!("Created: {}", report.created);
    println!("Duplicates skipped: {}", report.duplicates);
    println!("Invalid rows: {}", report.invalid);
    if report.failed > 0 {
        println!("Failed: {}", report.failed);
    }
}

/// Run a command through the API contract and print the JSON body.
fn run_json(store: Arc<dyn SightingStore>, command: Command) -> Result<(), Box<dyn std::error::Error>> {
    let api = SightingApi::new(store);
    let response: ApiResponse = match command {
        Command::Add { species, location, date, time } => {
            let body = serde_json::to_string(&NewSighting { species, location, date, time })?;
            api.create(&body)
        }
        Command::List { legacy } => api.list(if legacy { ListFormat::Legacy } else { ListFormat::Records }),
        Command::Search { species, location } => api.search(
            &SearchFilter { species, location },
            ListFormat::Records,
        ),
        Command::Update { id, species, location, date, time } => {
            let body = serde_json::to_string(&SightingUpdate { species, location, date, time })?;
            api.update(id, &body)
        }
        Command::Delete { id } => api.delete(id),
        Command::Show { .. } | Command::Export { .. } | Command::Import { .. } => {
            return Err("--json supports add, list, search, update and delete".into());
        }
    };

    println!("{}", serde_json::to_string_pretty(&response.body)?);
    if !response.is_success() {
        return Err(format!("request failed with status {}", response.status).into());
    }
    Ok(())
}

async fn run(args: Args) -> Result<(), Box<dyn std::error::Error>> {
    let backend = Backend::from_args(&args)?;

    if args.json {
        return match backend {
            Backend::Local(store) => run_json(store, args.command),
            Backend::Remote(_) => Err("--json is only available with a local store".into()),
        };
    }

    match (args.command, &backend) {
        (Command::Add { species, location, date, time }, _) => {
            let sighting = NewSighting { species, location, date, time };
            let record = match &backend {
                Backend::Local(store) => store.create(&sighting)?,
                Backend::Remote(client) => client.create(&sighting).await?,
            };
            println!("Added sighting {}: {}", record.id, record);
        }
        (Command::List { legacy }, Backend::Local(store)) => print_records(&store.list()?, legacy),
        (Command::List { legacy }, Backend::Remote(client)) => print_records(&client.list().await?, legacy),
        (Command::Search { species, location }, _) => {
            let filter = SearchFilter { species, location };
            let found: BTreeMap<u64, SightingRecord> = match &backend {
                Backend::Local(store) => store.search(&filter)?,
                Backend::Remote(client) => client.search(&filter).await?,
            };
            print_records(found.values(), false);
        }
        (Command::Show { id }, _) => {
            let record = match &backend {
                Backend::Local(store) => store.get(id)?,
                Backend::Remote(client) => client.get(id).await?,
            };
            println!("{}", serde_json::to_string_pretty(&record)?);
        }
        (Command::Update { id, species, location, date, time }, _) => {
            let update = SightingUpdate { species, location, date, time };
            if update.is_empty() {
                return Err("nothing to update: pass at least one of --species, --location, --date, --time".into());
            }
            let record = match &backend {
                Backend::Local(store) => store.update(id, &update)?,
                Backend::Remote(client) => client.update(id, &update).await?,
            };
            println!("Updated sighting {}: {}", record.id, record);
        }
        (Command::Delete { id }, _) => {
            match &backend {
                Backend::Local(store) => store.delete(id)?,
                Backend::Remote(client) => client.delete(id).await?,
            }
            println!("Sighting deleted successfully");
        }
        (Command::Export { output }, _) => {
            let records = match &backend {
                Backend::Local(store) => store.list()?,
                Backend::Remote(client) => client.list().await?,
            };
            save_to_csv(&records, &output)?;
            println!("Exported {} sightings to {}", records.len(), output);
        }
        (Command::Import { input, concurrent }, _) => {
            let rows = load_from_csv(&input)?;
            let start = Instant::now();
            let report = match &backend {
                Backend::Local(store) => import_into(store.as_ref(), rows),
                Backend::Remote(client) => {
                    let mut report = rows.report;
                    let (lines, sightings): (Vec<usize>, Vec<NewSighting>) =
                        rows.sightings.into_iter().unzip();
                    let results = client.submit_many(&sightings, concurrent).await;
                    for (line, result) in lines.into_iter().zip(&results) {
                        report.record(line, result);
                    }
                    report
                }
            };
            print_hms(&start);
            print_report(&report);
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() {
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(e) => e.exit(),
    };

    // Initialize logger
    let default_filter = if args.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter)).init();

    if let Err(e) = run(args).await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
