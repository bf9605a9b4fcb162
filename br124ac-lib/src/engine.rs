//! Decode engine: consumes one byte at a time and yields decoded fields,
//! trailer telemetry, and edge-triggered status events.

use crate::constants::{DATA_LEN, TRAILER_LEN};
use crate::field::{self, DecodedField};
use crate::status::{RecircMode, StatusChange, StatusKey, StatusRegistry};
use crate::sync::{FrameSynchronizer, SyncPattern, SyncState, SyncStep};
use chrono::Local;
use serde::Serialize;
use tracing::trace;

/// Most recently observed raw byte per data offset.
///
/// Persists across frame boundaries and resyncs; overwritten exactly once
/// per frame per offset, in offset order. Supports the cross-field delta
/// analytics and lets a renderer re-decode any field between frames.
#[derive(Debug, Clone, Copy)]
pub struct ByteCache {
    bytes: [u8; DATA_LEN],
}

impl Default for ByteCache {
    fn default() -> Self {
        Self {
            bytes: [0; DATA_LEN],
        }
    }
}

impl ByteCache {
    pub fn get(&self, offset: u8) -> u8 {
        self.bytes[offset as usize]
    }

    pub fn get_signed(&self, offset: u8) -> i16 {
        i16::from(self.bytes[offset as usize] as i8)
    }

    fn store(&mut self, offset: u8, byte: u8) {
        self.bytes[offset as usize] = byte;
    }

    pub fn as_bytes(&self) -> &[u8; DATA_LEN] {
        &self.bytes
    }
}

/// Auxiliary cross-field analytics, computed from cached bytes when the
/// relevant offset completes. Independent of primary decode and disabled
/// by default.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub enum Delta {
    /// Adjustment target minus dial position, per side (raw units).
    AdjustmentTarget { left: i16, right: i16 },
    /// Exterior temperature minus exterior temperature bias, with the
    /// complementary `50 - delta` readout.
    ExtTempBias { delta: i16, complement: i16 },
    /// Mixing chamber reference minus reading, per side (raw units).
    MixChamber { left: i16, right: i16 },
}

/// Result of feeding one byte to the engine.
#[derive(Debug, Clone, PartialEq)]
pub enum DecodeOutcome {
    /// Hunting for frame alignment; the byte carried no field data.
    Resyncing,
    /// A decoded data byte, plus any status transitions it triggered and
    /// an optional cross-field delta.
    FrameByte {
        field: DecodedField,
        changes: Vec<StatusChange>,
        delta: Option<Delta>,
    },
    /// A trailer byte at positions 0..=5 and whether it matched the
    /// sync pattern.
    TrailerByte { position: u8, matched: bool },
    /// The final trailer byte closed the frame; `quality` counts matched
    /// trailer positions (0..=7). Quality below the retention floor means
    /// the next byte starts a fresh hunt.
    FrameComplete { quality: u8 },
}

/// Streaming decoder for the BR 124 A/C diagnostic frame.
///
/// `feed` never blocks and never fails; a malformed stream only ever
/// causes repeated acquisition cycles, observable through the quality and
/// mismatch telemetry. All mutable state is owned here, so independent
/// decoder instances can coexist.
#[derive(Debug, Clone, Default)]
pub struct DecodeEngine {
    sync: FrameSynchronizer,
    cache: ByteCache,
    registry: StatusRegistry,
    deltas: bool,
}

impl DecodeEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_pattern(pattern: SyncPattern) -> Self {
        Self {
            sync: FrameSynchronizer::new(pattern),
            ..Self::default()
        }
    }

    /// Enable or disable the cross-field delta analytics.
    pub fn set_deltas(&mut self, enabled: bool) {
        self.deltas = enabled;
    }

    pub fn cache(&self) -> &ByteCache {
        &self.cache
    }

    pub fn registry(&self) -> &StatusRegistry {
        &self.registry
    }

    pub fn state(&self) -> SyncState {
        self.sync.state()
    }

    /// Trailer quality of the most recently completed frame.
    pub fn last_quality(&self) -> u8 {
        self.sync.last_quality()
    }

    /// Per-position trailer mismatch counts since the last acquisition.
    pub fn mismatch_tally(&self) -> [u32; TRAILER_LEN] {
        self.sync.mismatch_tally()
    }

    pub fn frames(&self) -> u64 {
        self.sync.frames()
    }

    pub fn resyncs(&self) -> u64 {
        self.sync.resyncs()
    }

    /// Re-decode the cached byte at `offset` (0x00..=0x21).
    pub fn field(&self, offset: u8) -> DecodedField {
        field::lookup(offset).decode(self.cache.get(offset))
    }

    /// Process one input byte.
    pub fn feed(&mut self, byte: u8) -> DecodeOutcome {
        match self.sync.advance(byte) {
            SyncStep::Hunting { .. } | SyncStep::Acquired => DecodeOutcome::Resyncing,
            SyncStep::Data { offset } => {
                self.cache.store(offset, byte);
                let field = field::lookup(offset).decode(byte);
                trace!(offset, byte, "data byte");
                let changes = self.apply_status_bits(offset, byte);
                let delta = if self.deltas {
                    self.delta_for(offset)
                } else {
                    None
                };
                DecodeOutcome::FrameByte {
                    field,
                    changes,
                    delta,
                }
            }
            SyncStep::Trailer { position, matched } => {
                DecodeOutcome::TrailerByte { position, matched }
            }
            SyncStep::FrameEnd { quality, .. } => DecodeOutcome::FrameComplete { quality },
        }
    }

    /// Update the status registry from a flags byte. Only offsets 0x1a,
    /// 0x1c, and 0x1d touch statuses; read-compare-write per key is a
    /// single step, never interleaved with another key's update.
    fn apply_status_bits(&mut self, offset: u8, bits: u8) -> Vec<StatusChange> {
        let now = Local::now();
        let mut changes = Vec::new();
        match offset {
            0x1a => {
                // Bit 6 is active-low: clear means intense cooling engaged.
                changes.extend(self.registry.set_switch(
                    StatusKey::FastCool,
                    bits & 0x40 == 0,
                    now,
                ));
            }
            0x1c => {
                // Bit 0 is active-low: clear means center vent heating bypassed.
                changes.extend(self.registry.set_switch(
                    StatusKey::VentBypass,
                    bits & 0x01 == 0,
                    now,
                ));
                let recirc = if bits & 0x04 != 0 {
                    RecircMode::Full
                } else if bits & 0x08 != 0 {
                    RecircMode::Partial
                } else {
                    RecircMode::Off
                };
                changes.extend(self.registry.set_recirc(recirc, now));
                changes.extend(self.registry.set_switch(
                    StatusKey::WaterPump,
                    bits & 0x80 != 0,
                    now,
                ));
            }
            0x1d => {
                changes.extend(self.registry.set_switch(
                    StatusKey::TempMode,
                    bits & 0x20 != 0,
                    now,
                ));
                changes.extend(self.registry.set_switch(
                    StatusKey::SelfCal,
                    bits & 0x40 != 0,
                    now,
                ));
            }
            _ => {}
        }
        changes
    }

    /// Cross-field delta at offsets where both operands of a comparison
    /// have been cached for the current frame.
    fn delta_for(&self, offset: u8) -> Option<Delta> {
        match offset {
            0x03 => Some(Delta::AdjustmentTarget {
                left: self.cache.get_signed(0x01) - self.cache.get_signed(0x00),
                right: self.cache.get_signed(0x03) - self.cache.get_signed(0x02),
            }),
            0x0b => {
                let delta = self.cache.get_signed(0x08) - self.cache.get_signed(0x0b);
                Some(Delta::ExtTempBias {
                    delta,
                    complement: 50 - delta,
                })
            }
            0x0f => Some(Delta::MixChamber {
                left: i16::from(self.cache.get(0x0e)) - i16::from(self.cache.get(0x05)),
                right: i16::from(self.cache.get(0x0f)) - i16::from(self.cache.get(0x06)),
            }),
            _ => None,
        }
    }
}
