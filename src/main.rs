//! CLI entry point: parses a metainfo file, runs the downloader to
//! completion, and verifies the result on disk.
use anyhow::{Context, Result};
use clap::Parser;
use rs_torrent_client::torrent::Torrent;
use rs_torrent_client::{verify, Downloader};
use std::path::PathBuf;
use tracing::info;

/// A minimal BitTorrent leech client: downloads a single torrent to a
/// directory and exits once every piece is verified on disk.
#[derive(Debug, Parser)]
#[command(name = "rstc", version, about)]
struct Cli {
    /// Path to the .torrent metainfo file.
    metainfo: PathBuf,

    /// Directory the torrent's files are written into. Defaults to the
    /// torrent's own name, created in the current directory.
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Enables debug-level logging.
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let bytes = std::fs::read(&cli.metainfo)
        .with_context(|| format!("failed to read metainfo file {}", cli.metainfo.display()))?;
    let torrent = Torrent::from_bytes(&bytes)
        .with_context(|| format!("failed to parse metainfo file {}", cli.metainfo.display()))?;

    info!(
        name = %torrent.name,
        info_hash = %hex::encode(torrent.info_hash),
        pieces = torrent.piece_count(),
        total_bytes = torrent.total_length,
        "parsed torrent"
    );

    let output_dir = cli.output.unwrap_or_else(|| PathBuf::from(&torrent.name));
    let name = torrent.name.clone();
    let downloader = Downloader::new(torrent, &output_dir)
        .with_context(|| format!("failed to allocate output files under {}", output_dir.display()))?;

    downloader.run().await;
    downloader.wait_for_completion().await;

    info!(elapsed_secs = downloader.stats().elapsed_secs(), "all pieces downloaded, verifying");
    verify::verify(&downloader.torrent, &downloader.writer)
        .with_context(|| format!("post-download verification of {name} failed"))?;

    info!("verification succeeded");
    Ok(())
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
