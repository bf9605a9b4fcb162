use anyhow::{Context, Result};
use br124ac_lib::constants::FRAME_LEN;
use br124ac_lib::sync::align_capture;
use clap::Parser;
use std::path::PathBuf;

/// Scan a capture file for the observed value ranges of the bytes that
/// are still unidentified.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Capture file to scan.
    filename: PathBuf,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let data = std::fs::read(&cli.filename)
        .with_context(|| format!("failed to read {}", cli.filename.display()))?;
    let aligned = align_capture(&data)
        .with_context(|| format!("no frame boundary found in {}", cli.filename.display()))?;

    let mut bias_min = i8::MAX;
    let mut bias_max = i8::MIN;
    let mut u1f = (u8::MAX, u8::MIN);
    let mut u21 = (u8::MAX, u8::MIN);

    for frame in aligned.chunks_exact(FRAME_LEN) {
        let bias = frame[0x0b] as i8;
        bias_min = bias_min.min(bias);
        bias_max = bias_max.max(bias);
        // Zero shows up while these channels are inactive; skip it so
        // the ranges reflect live readings only.
        if frame[0x1f] != 0 {
            u1f = (u1f.0.min(frame[0x1f]), u1f.1.max(frame[0x1f]));
        }
        if frame[0x21] != 0 {
            u21 = (u21.0.min(frame[0x21]), u21.1.max(frame[0x21]));
        }
    }

    println!("{} frames", aligned.len() / FRAME_LEN);
    println!("0x0b (control bias, signed): {bias_min} .. {bias_max}");
    print_range("0x1f", u1f);
    print_range("0x21", u21);
    Ok(())
}

fn print_range(label: &str, (min, max): (u8, u8)) {
    if min > max {
        println!("{label}: never nonzero");
    } else {
        println!("{label}: 0x{min:02x} .. 0x{max:02x} ({min} .. {max})");
    }
}
