use anyhow::{Context, Result};
use br124ac_lib::constants::{DEFAULT_BAUD, FRAME_LEN};
use clap::Parser;
use std::fs::File;
use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::time::timeout;
use tokio_serial::SerialPortBuilderExt;

/// Dump the raw diagnostic stream to stdout and optionally to a file.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Also write the raw bytes to this file.
    #[arg(short, long)]
    file: Option<PathBuf>,
    /// Number of bytes per printed record.
    #[arg(short = 'l', long, default_value_t = FRAME_LEN)]
    recordlen: usize,
    /// Stop after this many seconds without data.
    #[arg(short, long, default_value_t = 30.0)]
    timeout: f64,
    /// Serial port to read data from.
    #[arg(short, long, default_value = "/dev/ttyUSB0")]
    port: String,
    /// Serial data rate in bits per second.
    #[arg(short, long, default_value_t = DEFAULT_BAUD)]
    baudrate: u32,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut port = tokio_serial::new(&cli.port, cli.baudrate)
        .open_native_async()
        .with_context(|| format!("failed to open serial port {}", cli.port))?;
    let mut out = match &cli.file {
        Some(path) => Some(
            File::create(path)
                .with_context(|| format!("failed to create {}", path.display()))?,
        ),
        None => None,
    };

    let idle = Duration::from_secs_f64(cli.timeout);
    let mut buf = vec![0u8; cli.recordlen];
    let mut total: u64 = 0;
    let mut records: u64 = 0;

    eprintln!("logging {} at {} baud, ctrl-c to stop", cli.port, cli.baudrate);
    loop {
        let n = match timeout(idle, port.read(&mut buf)).await {
            Ok(Ok(0)) => break,
            Ok(Ok(n)) => n,
            Ok(Err(e)) => return Err(e).context("serial read failed"),
            Err(_) => {
                eprintln!("no data for {:.1} s, stopping", cli.timeout);
                break;
            }
        };
        println!("{total:8x}: {}", hex_line(&buf[..n]));
        if let Some(out) = out.as_mut() {
            out.write_all(&buf[..n]).context("log file write failed")?;
        }
        total += n as u64;
        records += 1;
    }

    eprintln!("{total} bytes in {records} records");
    Ok(())
}

fn hex_line(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect::<Vec<_>>()
        .join(" ")
}
