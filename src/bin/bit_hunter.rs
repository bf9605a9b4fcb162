use anyhow::{Context, Result, bail};
use br124ac_lib::constants::{DATA_LEN, FRAME_LEN};
use br124ac_lib::sync::align_capture;
use clap::Parser;
use std::path::PathBuf;

/// Find the frames in a capture where a single bit changes state and dump
/// the surrounding frames, for correlating unknown bits with panel actions.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Capture file to scan.
    filename: PathBuf,
    /// Data byte offset to watch, e.g. 0x1d.
    #[arg(short, long, default_value = "0x1d", value_parser = parse_offset)]
    offset: usize,
    /// Bit position to watch (0..=7).
    #[arg(short, long, default_value_t = 6, value_parser = clap::value_parser!(u8).range(0..=7))]
    bit: u8,
}

fn parse_offset(s: &str) -> Result<usize> {
    let value = match s.strip_prefix("0x") {
        Some(hex) => usize::from_str_radix(hex, 16)?,
        None => s.parse()?,
    };
    if value >= DATA_LEN {
        bail!("offset 0x{value:02x} is past the data segment (0x00..=0x21)");
    }
    Ok(value)
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let data = std::fs::read(&cli.filename)
        .with_context(|| format!("failed to read {}", cli.filename.display()))?;
    let aligned = align_capture(&data)
        .with_context(|| format!("no frame boundary found in {}", cli.filename.display()))?;
    let frames: Vec<&[u8]> = aligned.chunks_exact(FRAME_LEN).collect();
    if frames.is_empty() {
        bail!("capture holds no complete frames");
    }

    let mask = 1u8 << cli.bit;
    let mut previous = frames[0][cli.offset] & mask;
    let mut transitions = 0u32;

    for (index, frame) in frames.iter().enumerate().skip(1) {
        let current = frame[cli.offset] & mask;
        if current != previous {
            transitions += 1;
            println!(
                "frame {index}: 0x{:02x} bit {} went {} -> {}",
                cli.offset,
                cli.bit,
                u8::from(previous != 0),
                u8::from(current != 0),
            );
            dump_window(&frames, index);
            previous = current;
        }
    }

    println!("{} frames, {transitions} transitions", frames.len());
    Ok(())
}

/// Print all 34 data bytes for a window of frames around `center`, one
/// row per offset so a changing byte stands out as a column break.
fn dump_window(frames: &[&[u8]], center: usize) {
    let start = center.saturating_sub(10);
    let end = (start + 22).min(frames.len());
    for offset in 0..DATA_LEN {
        let mut row = format!("{offset:02x}:");
        for frame in &frames[start..end] {
            row.push_str(&format!(" {:02x}", frame[offset]));
        }
        println!("{row}");
    }
    println!();
}
