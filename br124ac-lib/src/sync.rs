use crate::constants::{DATA_LEN, FRAME_LEN, QUALITY_FLOOR, SYNC_ACCEPTED, TRAILER_LEN};
use crate::error::AcError;
use tracing::debug;

/// Ordered per-position byte constraints describing the 7-byte trailer
/// that terminates each frame.
///
/// Each position accepts a set of byte values rather than a single byte,
/// because the two known hardware variants differ in the final trailer
/// byte (0x3b vs 0x3c). Frame length itself is fixed at 41 bytes; variants
/// with a different frame length are not supported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncPattern {
    accepted: [&'static [u8]; TRAILER_LEN],
}

impl SyncPattern {
    /// The standard BR 124 trailer pattern, tolerant of both variants.
    pub const fn standard() -> Self {
        Self {
            accepted: SYNC_ACCEPTED,
        }
    }

    /// Whether `byte` is accepted at trailer position `position` (0..7).
    pub fn matches(&self, position: usize, byte: u8) -> bool {
        self.accepted[position].contains(&byte)
    }

    pub const fn len(&self) -> usize {
        TRAILER_LEN
    }

    pub const fn is_empty(&self) -> bool {
        false
    }

    /// Block search: index of the first complete trailer match in
    /// `haystack`, or `None`. Used by the offline tools; the live
    /// synchronizer scans byte-by-byte instead.
    pub fn find(&self, haystack: &[u8]) -> Option<usize> {
        haystack
            .windows(TRAILER_LEN)
            .position(|w| w.iter().enumerate().all(|(i, &b)| self.matches(i, b)))
    }
}

impl Default for SyncPattern {
    fn default() -> Self {
        Self::standard()
    }
}

/// Align a raw capture for offline analysis: skip to the first byte after
/// the first complete trailer match and trim the tail to whole frames.
pub fn align_capture(data: &[u8]) -> Result<&[u8], AcError> {
    let pattern = SyncPattern::standard();
    let first = pattern.find(data).ok_or(AcError::NoSync)?;
    let body = &data[first + TRAILER_LEN..];
    Ok(&body[..body.len() - body.len() % FRAME_LEN])
}

/// Synchronizer state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    /// Hunting for a full trailer sequence; `matched` counts consecutive
    /// positions satisfied so far (0..7).
    Acquiring { matched: u8 },
    /// Locked, consuming the 34-byte data segment.
    ReadingData { offset: u8 },
    /// Locked, checking the 7-byte trailer; `quality` counts matches so far.
    ReadingTrailer { position: u8, quality: u8 },
}

/// What a single byte did to the synchronizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStep {
    /// Still hunting; `matched` is the candidate prefix length after this byte.
    Hunting { matched: u8 },
    /// This byte completed the trailer sequence; the next byte is data offset 0.
    Acquired,
    /// A data byte at the given offset (0x00..=0x21).
    Data { offset: u8 },
    /// A trailer byte at positions 0..=5 and whether it matched the pattern.
    Trailer { position: u8, matched: bool },
    /// The 7th trailer byte closed the frame. `retained` is false when
    /// quality fell below the floor and the synchronizer dropped back to
    /// acquisition.
    FrameEnd { quality: u8, retained: bool },
}

/// Byte-by-byte frame synchronization state machine.
///
/// Acquisition is strict (all 7 trailer positions must match in sequence)
/// but retention is lenient: once locked, a trailer with at least
/// [`QUALITY_FLOOR`] matches keeps the lock. Losing lock costs up to a
/// frame's worth of garbage data, while tolerating a noisy trailer costs
/// nothing as long as the data segment stays offset-aligned.
#[derive(Debug, Clone)]
pub struct FrameSynchronizer {
    pattern: SyncPattern,
    state: SyncState,
    mismatches: [u32; TRAILER_LEN],
    last_quality: u8,
    frames: u64,
    resyncs: u64,
}

impl FrameSynchronizer {
    pub fn new(pattern: SyncPattern) -> Self {
        Self {
            pattern,
            state: SyncState::Acquiring { matched: 0 },
            mismatches: [0; TRAILER_LEN],
            last_quality: 0,
            frames: 0,
            resyncs: 0,
        }
    }

    pub fn state(&self) -> SyncState {
        self.state
    }

    /// Quality (0..=7) of the most recently completed trailer.
    pub fn last_quality(&self) -> u8 {
        self.last_quality
    }

    /// Per-position trailer mismatch counts since the last acquisition.
    /// Diagnostics only; retention is decided by per-frame quality.
    pub fn mismatch_tally(&self) -> [u32; TRAILER_LEN] {
        self.mismatches
    }

    /// Completed frames, whether or not lock was retained afterwards.
    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// Times lock was dropped after a bad trailer.
    pub fn resyncs(&self) -> u64 {
        self.resyncs
    }

    pub fn advance(&mut self, byte: u8) -> SyncStep {
        match self.state {
            SyncState::Acquiring { matched } => {
                if self.pattern.matches(matched as usize, byte) {
                    let matched = matched + 1;
                    if matched as usize == TRAILER_LEN {
                        debug!("frame lock acquired");
                        self.state = SyncState::ReadingData { offset: 0 };
                        self.mismatches = [0; TRAILER_LEN];
                        SyncStep::Acquired
                    } else {
                        self.state = SyncState::Acquiring { matched };
                        SyncStep::Hunting { matched }
                    }
                } else if self.pattern.matches(0, byte) {
                    // The byte may itself start a new candidate sequence.
                    self.state = SyncState::Acquiring { matched: 1 };
                    SyncStep::Hunting { matched: 1 }
                } else {
                    self.state = SyncState::Acquiring { matched: 0 };
                    SyncStep::Hunting { matched: 0 }
                }
            }
            SyncState::ReadingData { offset } => {
                let next = offset + 1;
                self.state = if next as usize == DATA_LEN {
                    SyncState::ReadingTrailer {
                        position: 0,
                        quality: 0,
                    }
                } else {
                    SyncState::ReadingData { offset: next }
                };
                SyncStep::Data { offset }
            }
            SyncState::ReadingTrailer { position, quality } => {
                let matched = self.pattern.matches(position as usize, byte);
                if !matched {
                    self.mismatches[position as usize] += 1;
                }
                let quality = quality + u8::from(matched);
                if position as usize + 1 == TRAILER_LEN {
                    self.last_quality = quality;
                    self.frames += 1;
                    let retained = quality >= QUALITY_FLOOR;
                    if retained {
                        self.state = SyncState::ReadingData { offset: 0 };
                    } else {
                        debug!(quality, "frame lock lost");
                        self.resyncs += 1;
                        self.state = SyncState::Acquiring { matched: 0 };
                    }
                    SyncStep::FrameEnd { quality, retained }
                } else {
                    self.state = SyncState::ReadingTrailer {
                        position: position + 1,
                        quality,
                    };
                    SyncStep::Trailer { position, matched }
                }
            }
        }
    }
}

impl Default for FrameSynchronizer {
    fn default() -> Self {
        Self::new(SyncPattern::standard())
    }
}
