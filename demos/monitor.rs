//! Monitor - connect to a controller and print live stream counters.
//!
//! This example demonstrates:
//! - Building a client from CLI flags or a JSON config file
//! - Running the start routine (clear outputs, enable channels, run)
//! - Polling `StreamStats` while the read tasks decode in the background
//!
//! # Running against the bundled simulator
//!
//! ```text
//! cargo run --example simulator
//! cargo run --example monitor -- --routine --strict
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use rhx_tcp_client::protocol::timestamp_seconds;
use rhx_tcp_client::{Client, ClientBuilder, ClientConfig, SpikeRecord, StreamObserver};

#[derive(Parser)]
#[command(
    name = "monitor",
    version,
    about = "Print waveform and spike counters from an RHX controller"
)]
struct Cli {
    /// JSON config file (flags below override it)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Controller host
    #[arg(long)]
    host: Option<String>,

    /// Enable output on the first N channels and start acquisition
    #[arg(long)]
    routine: bool,

    /// Amplifier channels in the waveform stream (and enabled by --routine)
    #[arg(long)]
    channels: Option<usize>,

    /// Drain every complete unit per read and keep spike remainders
    #[arg(long)]
    strict: bool,

    /// Print every spike record
    #[arg(long)]
    spikes: bool,

    /// Seconds between counter reports
    #[arg(long, default_value_t = 1)]
    interval: u64,
}

/// Logs each spike record at info level.
struct SpikePrinter;

impl StreamObserver for SpikePrinter {
    fn spike_records(&self, records: &[SpikeRecord]) {
        for record in records {
            tracing::info!(
                channel = %record.name(),
                timestamp = record.timestamp,
                id = record.id,
                "Spike"
            );
        }
    }
}

fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => ClientConfig::from_json_file(path)?,
        None => ClientConfig::default(),
    };
    let mut builder = ClientBuilder::from_config(config);
    if let Some(host) = &cli.host {
        builder = builder.host(host);
    }
    if let Some(channels) = cli.channels {
        let blocks_per_read = builder.config().blocks_per_read;
        builder = builder.layout(channels, blocks_per_read);
    }
    if cli.strict {
        builder = builder.strict_framing();
    }
    if cli.spikes {
        builder = builder.observer(Arc::new(SpikePrinter));
    }

    let client: Client = builder.connect().await?;
    let sample_rate = client.sample_rate().await?;
    let controller = client.controller_type().await?;
    tracing::info!(
        "{} (.{} files), sample rate {} Hz, run mode {}",
        controller.as_str(),
        controller.file_suffix(),
        sample_rate,
        client.run_mode().await?
    );

    if cli.routine {
        client.start_routine(client.config().channel_count).await?;
    }

    let stats = client.stats();
    let mut ticker = tokio::time::interval(Duration::from_secs(cli.interval.max(1)));
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let waveform = stats.waveform();
                let seconds = waveform
                    .latest_timestamp
                    .map(|ts| timestamp_seconds(ts, sample_rate))
                    .unwrap_or_default();
                println!(
                    "Waveform data blocks received: {} | Latest timestamp: {:.3} s | Total spikes received: {}",
                    waveform.total_blocks_processed,
                    seconds,
                    stats.total_spikes_processed()
                );
                if client.is_finished() {
                    break;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Interrupted, shutting down");
                client.shutdown();
                break;
            }
        }
    }

    client.wait_for_shutdown().await?;
    let spike = stats.spike();
    println!(
        "Done: {} blocks, {} spikes, {} waveform / {} spike magic mismatches",
        stats.total_blocks_processed(),
        spike.total_spikes_processed,
        stats.waveform().magic_mismatches,
        spike.magic_mismatches
    );
    Ok(())
}
