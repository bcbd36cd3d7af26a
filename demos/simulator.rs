//! Simulator - a stand-in RHX controller for local testing.
//!
//! Listens on the command, waveform and spike ports. `get runmode`,
//! `get sampleratehertz` and `get type` are answered; `set runmode run;` starts streaming
//! synthetic sine waves and periodic spikes, `set runmode stop;` pauses.
//!
//! ```text
//! cargo run --example simulator -- --port-base 5000
//! ```

use std::f64::consts::TAU;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use rhx_tcp_client::control::{native_channel_name, RunMode};
use rhx_tcp_client::protocol::{build_super_frame, AMPLIFIER_ZERO_OFFSET, NATIVE_NAME_SIZE};
use rhx_tcp_client::{SpikeRecord, WaveformLayout};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

#[derive(Parser)]
#[command(name = "simulator", version, about = "Serve synthetic RHX TCP streams")]
struct Cli {
    /// Address to bind
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Command port; waveform and spike use the next two
    #[arg(long, default_value_t = 5000)]
    port_base: u16,

    /// Reported amplifier sample rate
    #[arg(long, default_value_t = 30000.0)]
    sample_rate: f64,

    /// Stream without waiting for `set runmode run;`
    #[arg(long)]
    autostart: bool,
}

/// Shared controller state.
struct Controller {
    running: AtomicBool,
    sample_rate: f64,
}

impl Controller {
    fn run_mode(&self) -> RunMode {
        if self.running.load(Ordering::Acquire) {
            RunMode::Run
        } else {
            RunMode::Stop
        }
    }

    /// Apply every command in `text`, returning any `get` replies.
    fn handle(&self, text: &str) -> Option<String> {
        let mut replies = Vec::new();
        for command in text.split(';').map(str::trim).filter(|c| !c.is_empty()) {
            let lower = command.to_ascii_lowercase();
            match lower.as_str() {
                "get runmode" => {
                    let mode = capitalize(self.run_mode().as_str());
                    replies.push(format!("Return: RunMode {}", mode))
                }
                "get sampleratehertz" => {
                    replies.push(format!("Return: SampleRateHertz {}", self.sample_rate))
                }
                "get type" => replies.push("Return: Type ControllerRecordUSB3".to_string()),
                "set runmode run" => self.running.store(true, Ordering::Release),
                "set runmode stop" => self.running.store(false, Ordering::Release),
                _ => tracing::debug!("Ignoring command: {}", command),
            }
        }
        (!replies.is_empty()).then(|| replies.join("\n"))
    }
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
        None => String::new(),
    }
}

async fn serve_commands(mut socket: TcpStream, controller: Arc<Controller>) -> std::io::Result<()> {
    let mut buf = vec![0u8; 1024];
    loop {
        let n = socket.read(&mut buf).await?;
        if n == 0 {
            return Ok(());
        }
        let text = String::from_utf8_lossy(&buf[..n]);
        tracing::info!("Command: {}", text.trim());
        if let Some(reply) = controller.handle(&text) {
            socket.write_all(reply.as_bytes()).await?;
        }
    }
}

async fn serve_waveform(mut socket: TcpStream, controller: Arc<Controller>) -> std::io::Result<()> {
    let layout = WaveformLayout::default();
    let frames_per_super_frame = (layout.frames_per_block() * layout.blocks_per_read()) as i32;
    let period = Duration::from_secs_f64(f64::from(frames_per_super_frame) / controller.sample_rate);
    let mut ticker = tokio::time::interval(period);
    let mut timestamp = 0i32;

    loop {
        ticker.tick().await;
        if !controller.running.load(Ordering::Acquire) {
            continue;
        }
        let rate = controller.sample_rate;
        let bytes = build_super_frame(&layout, timestamp, |ts, channel| {
            let hz = 10.0 * (channel + 1) as f64;
            let phase = TAU * hz * f64::from(ts) / rate;
            (f64::from(AMPLIFIER_ZERO_OFFSET) + 2000.0 * phase.sin()) as u16
        });
        socket.write_all(&bytes).await?;
        timestamp = timestamp.wrapping_add(frames_per_super_frame);
    }
}

async fn serve_spikes(mut socket: TcpStream, controller: Arc<Controller>) -> std::io::Result<()> {
    let mut ticker = tokio::time::interval(Duration::from_millis(50));
    let mut ticks = 0u32;

    loop {
        ticker.tick().await;
        if !controller.running.load(Ordering::Acquire) {
            continue;
        }
        ticks = ticks.wrapping_add(1);
        let name = native_channel_name('A', (ticks % 16) as usize).to_ascii_uppercase();
        let mut native_name = [0u8; NATIVE_NAME_SIZE];
        native_name.copy_from_slice(&name.as_bytes()[..NATIVE_NAME_SIZE]);

        let timestamp = (f64::from(ticks) * 0.05 * controller.sample_rate) as u32;
        let record = SpikeRecord::new(native_name, timestamp, 1);
        socket.write_all(&record.encode()).await?;
    }
}

async fn accept_loop<F, Fut>(listener: TcpListener, controller: Arc<Controller>, serve: F)
where
    F: Fn(TcpStream, Arc<Controller>) -> Fut,
    Fut: std::future::Future<Output = std::io::Result<()>> + Send + 'static,
{
    loop {
        match listener.accept().await {
            Ok((socket, peer)) => {
                tracing::info!("Client connected from {}", peer);
                let _ = socket.set_nodelay(true);
                let task = serve(socket, controller.clone());
                tokio::spawn(async move {
                    if let Err(e) = task.await {
                        tracing::info!("Client disconnected: {}", e);
                    }
                });
            }
            Err(e) => tracing::error!("Accept error: {}", e),
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();

    let cli = Cli::parse();
    let controller = Arc::new(Controller {
        running: AtomicBool::new(cli.autostart),
        sample_rate: cli.sample_rate,
    });

    let command = TcpListener::bind((cli.host.as_str(), cli.port_base)).await?;
    let waveform = TcpListener::bind((cli.host.as_str(), cli.port_base + 1)).await?;
    let spike = TcpListener::bind((cli.host.as_str(), cli.port_base + 2)).await?;
    tracing::info!(
        "Simulator listening on {}:{}-{}",
        cli.host,
        cli.port_base,
        cli.port_base + 2
    );

    tokio::select! {
        _ = accept_loop(command, controller.clone(), serve_commands) => {}
        _ = accept_loop(waveform, controller.clone(), serve_waveform) => {}
        _ = accept_loop(spike, controller.clone(), serve_spikes) => {}
        _ = tokio::signal::ctrl_c() => tracing::info!("Shutting down"),
    }
    Ok(())
}
