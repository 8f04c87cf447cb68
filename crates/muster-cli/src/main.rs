use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

// D-Bus proxy for the daemon. Method names map to the daemon's
// ProcessFrame / Attendance / Query / ReloadGallery / Status members.
#[zbus::proxy(
    interface = "org.freedesktop.Muster1",
    default_service = "org.freedesktop.Muster1",
    default_path = "/org/freedesktop/Muster1"
)]
trait Muster {
    async fn process_frame(&self, frame: Vec<u8>) -> zbus::Result<String>;
    async fn attendance(&self, day: &str) -> zbus::Result<String>;
    async fn query(&self, identity: &str, day: &str) -> zbus::Result<String>;
    async fn reload_gallery(&self) -> zbus::Result<u32>;
    async fn status(&self) -> zbus::Result<String>;
}

#[derive(Parser)]
#[command(name = "muster", about = "Muster attendance CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Send an image file through the daemon and print the detections
    Scan {
        /// Path to an encoded image (jpg/png)
        image: PathBuf,
    },
    /// List attendance records for a day
    List {
        /// Day as YYYY-MM-DD (defaults to today)
        #[arg(short, long, default_value = "")]
        day: String,
    },
    /// Show one person's attendance record for a day
    Query {
        /// Identity name, as derived from the reference filename
        identity: String,
        /// Day as YYYY-MM-DD (defaults to today)
        #[arg(short, long, default_value = "")]
        day: String,
    },
    /// Rebuild the gallery from the reference directory
    Reload,
    /// Show daemon status
    Status,
}

fn print_json(payload: &str) -> Result<()> {
    let value: serde_json::Value = serde_json::from_str(payload)?;
    println!("{}", serde_json::to_string_pretty(&value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    let conn = zbus::Connection::session()
        .await
        .context("connecting to the session bus (is musterd running?)")?;
    let proxy = MusterProxy::new(&conn).await?;

    match cli.command {
        Commands::Scan { image } => {
            let frame = std::fs::read(&image)
                .with_context(|| format!("reading {}", image.display()))?;
            let result = proxy.process_frame(frame).await?;
            print_json(&result)?;
        }
        Commands::List { day } => {
            let result = proxy.attendance(&day).await?;
            print_json(&result)?;
        }
        Commands::Query { identity, day } => {
            let result = proxy.query(&identity, &day).await?;
            print_json(&result)?;
        }
        Commands::Reload => {
            let entries = proxy.reload_gallery().await?;
            println!("gallery reloaded: {entries} entries");
        }
        Commands::Status => {
            let result = proxy.status().await?;
            print_json(&result)?;
        }
    }

    Ok(())
}
