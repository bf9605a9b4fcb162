use anyhow::{Context, Result};
use br124ac_lib::DecodeEngine;
use br124ac_lib::constants::{DEFAULT_BAUD, DEFAULT_REPLAY_INTERVAL_MS};
use br124ac_lib::engine::DecodeOutcome;
use br124ac_lib::source::{ByteSource, ReplaySource, SerialSource, SourceRead};
use clap::Parser;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::signal;
use tracing::{debug, info, trace};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

/// Live monitor for the Mercedes-Benz BR 124 basic A/C diagnostic stream.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Replay a capture file instead of reading from a serial line.
    #[arg(short, long)]
    file: Option<PathBuf>,
    /// Time interval in milliseconds between bytes when replaying a file.
    #[arg(short, long, default_value_t = DEFAULT_REPLAY_INTERVAL_MS)]
    interval: u64,
    /// Serial port to read data from.
    #[arg(short, long, default_value = "/dev/ttyUSB0")]
    port: String,
    /// Serial data rate in bits per second.
    #[arg(short, long, default_value_t = DEFAULT_BAUD)]
    baudrate: u32,
    /// Serial read timeout in milliseconds.
    #[arg(short, long, default_value_t = 100)]
    timeout: u64,
    /// Also append the log to this file.
    #[arg(long)]
    log_file: Option<PathBuf>,
    /// Log a frame summary every N frames (0 disables).
    #[arg(long, default_value_t = 50)]
    summary_every: u64,
    /// Compute cross-field delta analytics.
    #[arg(long)]
    deltas: bool,
    #[command(flatten)]
    verbosity: clap_verbosity_flag::Verbosity<clap_verbosity_flag::InfoLevel>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let _guard = init_tracing(&cli)?;

    tokio::select! {
        res = run(&cli) => res,
        _ = signal::ctrl_c() => {
            info!("ctrl-c received, shutting down");
            Ok(())
        }
    }
}

async fn run(cli: &Cli) -> Result<()> {
    let mut source: Box<dyn ByteSource> = match &cli.file {
        Some(path) => Box::new(
            ReplaySource::from_file(path, Duration::from_millis(cli.interval))
                .with_context(|| format!("failed to load capture {}", path.display()))?,
        ),
        None => Box::new(
            SerialSource::open(&cli.port, cli.baudrate, Duration::from_millis(cli.timeout))
                .with_context(|| format!("failed to open serial port {}", cli.port))?,
        ),
    };

    let mut engine = DecodeEngine::new();
    engine.set_deltas(cli.deltas);
    let mut synced = false;

    loop {
        let byte = match source.next_byte().await? {
            SourceRead::Byte(byte) => byte,
            SourceRead::Idle => {
                trace!("waiting for data");
                continue;
            }
            SourceRead::Eof => {
                info!(
                    frames = engine.frames(),
                    resyncs = engine.resyncs(),
                    "end of stream"
                );
                return Ok(());
            }
        };

        match engine.feed(byte) {
            DecodeOutcome::Resyncing => {
                if synced {
                    synced = false;
                    info!("resyncing...");
                }
            }
            DecodeOutcome::FrameByte {
                field,
                changes,
                delta,
            } => {
                if !synced {
                    synced = true;
                    info!("synchronized");
                }
                trace!("{field}");
                for change in &changes {
                    info!("{change}");
                }
                if let Some(delta) = delta {
                    debug!(?delta, "cross-field delta");
                }
            }
            DecodeOutcome::TrailerByte { position, matched } => {
                if !matched {
                    debug!(position, "trailer mismatch");
                }
            }
            DecodeOutcome::FrameComplete { quality } => {
                debug!(quality, "frame complete");
                if cli.summary_every != 0 && engine.frames() % cli.summary_every == 0 {
                    info!("{}", summary(&engine));
                }
            }
        }
    }
}

fn summary(engine: &DecodeEngine) -> String {
    let temp = |offset: u8| {
        engine
            .field(offset)
            .scalar_value()
            .map(|v| format!("{v:.1}"))
            .unwrap_or_else(|| "?".into())
    };
    format!(
        "int {} °C | ext {} °C | coolant {} °C | evap {} °C | mix {}/{} °C | quality {}/7",
        temp(0x07),
        temp(0x08),
        temp(0x16),
        temp(0x17),
        temp(0x05),
        temp(0x06),
        engine.last_quality(),
    )
}

fn init_tracing(cli: &Cli) -> Result<Option<tracing_appender::non_blocking::WorkerGuard>> {
    let filter = EnvFilter::builder()
        .with_default_directive(cli.verbosity.tracing_level_filter().into())
        .from_env_lossy();
    let stdout = fmt::layer().with_target(false);

    match &cli.log_file {
        Some(path) => {
            let dir = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| Path::new("."));
            let name = path.file_name().context("log file path has no file name")?;
            let (writer, guard) =
                tracing_appender::non_blocking(tracing_appender::rolling::never(dir, name));
            tracing_subscriber::registry()
                .with(filter)
                .with(stdout)
                .with(
                    fmt::layer()
                        .with_writer(writer)
                        .with_ansi(false)
                        .with_target(false),
                )
                .init();
            Ok(Some(guard))
        }
        None => {
            tracing_subscriber::registry()
                .with(filter)
                .with(stdout)
                .init();
            Ok(None)
        }
    }
}
