// Wire constants for the BR 124 A/C diagnostic stream

/// Total size of one repeating frame (data segment plus trailer)
pub const FRAME_LEN: usize = 41;

/// Size of the data segment, offsets 0x00..=0x21
pub const DATA_LEN: usize = 34;

/// Size of the trailer segment used for synchronization
pub const TRAILER_LEN: usize = 7;

/// Accepted byte values per trailer position. The final position carries
/// both known hardware variants: 0x3b on the original research platform,
/// 0x3c on a facelift 124.191 unit.
pub const SYNC_ACCEPTED: [&[u8]; TRAILER_LEN] = [
    &[0x00],
    &[0x03],
    &[0x04],
    &[0x01],
    &[0x23],
    &[0x02],
    &[0x3b, 0x3c],
];

/// Minimum trailer quality (matched positions out of 7) that retains
/// frame lock. Below this the synchronizer falls back to acquisition.
pub const QUALITY_FLOOR: u8 = 3;

/// Serial data rate of the diagnostic line
pub const DEFAULT_BAUD: u32 = 4800;

/// Default pacing between bytes when replaying a capture file, matching
/// the byte period at 4800 bps closely enough for live-like playback
pub const DEFAULT_REPLAY_INTERVAL_MS: u64 = 32;
