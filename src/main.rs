use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use flyermap::exchange;
use flyermap::geo::{HttpTransport, OverpassGateway};
use flyermap::lifecycle::ZoneLifecycle;
use flyermap::report;
use flyermap::store::{FileBackend, Store};

#[derive(Parser)]
#[command(name = "flyermap")]
#[command(about = "Manage canvassing team members and distribution zones")]
struct Cli {
    /// Directory holding the persisted data
    #[arg(long, value_name = "DIR", default_value = "./flyermap-data")]
    data_dir: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print team members and zones
    List,
    /// Import a team roster CSV, geocoding each address
    ImportCsv {
        /// Path to the CSV file
        #[arg(value_name = "FILE")]
        file: PathBuf,
        /// Replace the current roster instead of appending
        #[arg(long)]
        replace: bool,
    },
    /// Write a JSON backup of all data
    Export {
        /// Output file path
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },
    /// Restore a JSON backup, replacing all data
    Import {
        /// Path to the backup file
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },
    /// Re-estimate mailbox counts from OpenStreetMap building data
    Estimate {
        /// Zone id; all zones when omitted
        #[arg(value_name = "ZONE_ID")]
        zone_id: Option<String>,
    },
    /// Write a zone's street report CSV
    Report {
        /// Zone id
        #[arg(value_name = "ZONE_ID")]
        zone_id: String,
        /// Output file path
        #[arg(value_name = "FILE")]
        out: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let args = Cli::parse();
    let store = Store::open(FileBackend::new(&args.data_dir)).await?;

    match args.command {
        Command::List => {
            let members = store.team_members();
            println!("Team members: {}", members.len());
            for member in &members {
                println!(
                    "  {} - {} ({:.4}, {:.4})",
                    member.name, member.address, member.lat, member.lng
                );
            }
            let zones = store.zones();
            println!("Zones: {}", zones.len());
            for zone in &zones {
                let count = zone
                    .mailbox_count
                    .map(|c| c.to_string())
                    .unwrap_or_else(|| "?".to_string());
                println!(
                    "  {} [{}] - {} boîtes, {} colistier(s)",
                    zone.name,
                    zone.id,
                    count,
                    zone.assigned_members.len()
                );
            }
        }
        Command::ImportCsv { file, replace } => {
            let input = tokio::fs::read_to_string(&file).await?;
            let geocoder = flyermap::geo::Geocoder::new(HttpTransport::new()?);
            let summary = exchange::import_roster(&store, &geocoder, &input, replace).await?;
            println!(
                "Import finished: {} added, {} address(es) not found",
                summary.added, summary.failed
            );
        }
        Command::Export { file } => {
            let json = exchange::export_json(&store)?;
            tokio::fs::write(&file, json).await?;
            println!("Exported to {:?}", file);
        }
        Command::Import { file } => {
            let raw = tokio::fs::read_to_string(&file).await?;
            let summary = exchange::import_json(&store, &raw)?;
            println!(
                "Imported {} member(s) and {} zone(s)",
                summary.members, summary.zones
            );
        }
        Command::Estimate { zone_id } => {
            let gateway = OverpassGateway::new(HttpTransport::new()?);
            let lifecycle = ZoneLifecycle::new(store.clone(), gateway);
            let targets: Vec<String> = match zone_id {
                Some(id) => vec![id],
                None => store.zones().into_iter().map(|z| z.id).collect(),
            };
            for id in &targets {
                if !lifecycle.estimate(id) {
                    anyhow::bail!("no zone with id {id}");
                }
            }
            lifecycle.settle().await;
            for id in &targets {
                if let Some(zone) = store.zone(id) {
                    let count = zone
                        .mailbox_count
                        .map(|c| c.to_string())
                        .unwrap_or_else(|| "?".to_string());
                    println!("{}: {} boîtes", zone.name, count);
                }
            }
        }
        Command::Report { zone_id, out } => {
            let zone = store
                .zone(&zone_id)
                .ok_or_else(|| anyhow::anyhow!("no zone with id {zone_id}"))?;
            let gateway = OverpassGateway::new(HttpTransport::new()?);
            let streets = gateway.street_names(&zone.geojson).await?;
            let csv = report::zone_report_csv(&store, &zone, &streets)?;
            tokio::fs::write(&out, csv).await?;
            println!("Report for {} written to {:?}", zone.name, out);
        }
    }

    store.flush().await?;
    Ok(())
}
