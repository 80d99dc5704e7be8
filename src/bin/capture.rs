use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use incident_reporter::capture::{CaptureSession, FixedLocation, LocationProvider, LocationStatus, Position};
use incident_reporter::client::{content_type_for, IngestClient, ReportDetails};

const RECORDER_CHUNK_BYTES: usize = 64 * 1024;

#[derive(Parser, Debug)]
#[command(author, version, about = "Capture and submit incident reports", long_about = None)]
struct Args {
    /// Base URL of the ingest service
    #[arg(long, env = "INGEST_URL", default_value = "http://localhost:3000")]
    server: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Submit an incident report with photos and an optional video clip
    Report {
        #[arg(long = "crime-type")]
        crime_type: String,

        #[arg(long, default_value = "")]
        description: String,

        #[arg(long, allow_hyphen_values = true)]
        lat: Option<f64>,

        #[arg(long, allow_hyphen_values = true)]
        lng: Option<f64>,

        /// Still image to attach (repeatable, up to 10)
        #[arg(long = "photo")]
        photos: Vec<PathBuf>,

        /// Recorded clip to attach
        #[arg(long)]
        video: Option<PathBuf>,
    },
    /// Send an SOS alert with the current location
    Sos {
        #[arg(long, allow_hyphen_values = true)]
        lat: f64,

        #[arg(long, allow_hyphen_values = true)]
        lng: f64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "incident_reporter=info,incident_capture=info".into()),
        )
        .with_target(false)
        .compact()
        .init();

    let args = Args::parse();
    let client = IngestClient::new(&args.server)?;

    match args.command {
        Command::Report {
            crime_type,
            description,
            lat,
            lng,
            photos,
            video,
        } => {
            let mut session = CaptureSession::new();

            let provider = lat.zip(lng).map(|(latitude, longitude)| {
                FixedLocation(Position {
                    latitude,
                    longitude,
                })
            });
            let status = LocationStatus::resolve(provider.as_ref().map(|p| p as &dyn LocationProvider));
            println!("Location: {}", status);
            session.set_location(status);

            for path in &photos {
                let bytes = read_media(path).await?;
                let ext = extension(path, "jpeg");
                session.add_photo(bytes, &ext, content_type_for(&ext))?;
            }

            if let Some(path) = &video {
                let bytes = read_media(path).await?;
                session.record_clip(&bytes, RECORDER_CHUNK_BYTES, Instant::now())?;
            }

            let details = ReportDetails {
                crime_type,
                description,
            };
            match client.submit_report(&mut session, &details).await {
                Ok(uploaded) => {
                    println!("Successfully report was completed");
                    for url in &uploaded.photo_urls {
                        println!("  photo: {}", url);
                    }
                    if let Some(url) = &uploaded.video_url {
                        println!("  video: {}", url);
                    }
                }
                Err(e) => {
                    eprintln!("Error submitting report: {}", e);
                    std::process::exit(1);
                }
            }
        }
        Command::Sos { lat, lng } => {
            let provider = FixedLocation(Position {
                latitude: lat,
                longitude: lng,
            });
            match client.send_sos(&provider).await {
                Ok(_) => println!("SOS sent with location (saved to backend)"),
                Err(e) => {
                    eprintln!("Error sending SOS: {}", e);
                    std::process::exit(1);
                }
            }
        }
    }

    Ok(())
}

async fn read_media(path: &Path) -> Result<Vec<u8>> {
    tokio::fs::read(path)
        .await
        .with_context(|| format!("Unable to read media file {}", path.display()))
}

fn extension(path: &Path, fallback: &str) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .filter(|e| !e.is_empty())
        .unwrap_or(fallback)
        .to_string()
}
