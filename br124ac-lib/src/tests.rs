use crate::constants::{DATA_LEN, TRAILER_LEN};
use crate::engine::{DecodeEngine, DecodeOutcome, Delta};
use crate::field::{Band, FIELD_TABLE, FieldValue, OverheatStage};
use crate::error::AcError;
use crate::source::{ByteSource, ReplaySource, SourceRead};
use crate::status::{RecircMode, StatusChange, StatusKey, StatusValue};
use crate::sync::{FrameSynchronizer, SyncPattern, SyncState, SyncStep, align_capture};

const TRAILER: [u8; TRAILER_LEN] = [0x00, 0x03, 0x04, 0x01, 0x23, 0x02, 0x3b];

fn lock(engine: &mut DecodeEngine) {
    for byte in TRAILER {
        assert_eq!(engine.feed(byte), DecodeOutcome::Resyncing);
    }
    assert_eq!(engine.state(), SyncState::ReadingData { offset: 0 });
}

fn feed_frame(
    engine: &mut DecodeEngine,
    data: &[u8; DATA_LEN],
    trailer: &[u8; TRAILER_LEN],
) -> Vec<DecodeOutcome> {
    let mut out = Vec::with_capacity(DATA_LEN + TRAILER_LEN);
    for &byte in data.iter().chain(trailer.iter()) {
        out.push(engine.feed(byte));
    }
    out
}

fn all_changes(outcomes: &[DecodeOutcome]) -> Vec<StatusChange> {
    outcomes
        .iter()
        .filter_map(|o| match o {
            DecodeOutcome::FrameByte { changes, .. } => Some(changes.clone()),
            _ => None,
        })
        .flatten()
        .collect()
}

fn changes_for(outcomes: &[DecodeOutcome], key: StatusKey) -> Vec<StatusChange> {
    all_changes(outcomes)
        .into_iter()
        .filter(|c| c.key == key)
        .collect()
}

#[test]
fn sync_acquisition_reaches_data_at_eighth_byte() {
    let trailer = hex::decode("000304012302 3b".replace(' ', "")).unwrap();
    let mut engine = DecodeEngine::new();
    for &byte in &trailer {
        assert_eq!(engine.feed(byte), DecodeOutcome::Resyncing);
    }
    match engine.feed(0x42) {
        DecodeOutcome::FrameByte { field, .. } => assert_eq!(field.offset, 0x00),
        other => panic!("expected a data byte at offset 0, got {other:?}"),
    }
}

#[test]
fn acquisition_accepts_variant_trailer() {
    let mut engine = DecodeEngine::new();
    for byte in [0x00, 0x03, 0x04, 0x01, 0x23, 0x02, 0x3c] {
        assert_eq!(engine.feed(byte), DecodeOutcome::Resyncing);
    }
    assert_eq!(engine.state(), SyncState::ReadingData { offset: 0 });
}

#[test]
fn acquisition_restarts_on_position_zero_prefix() {
    let mut sync = FrameSynchronizer::default();
    assert_eq!(sync.advance(0x00), SyncStep::Hunting { matched: 1 });
    assert_eq!(sync.advance(0x03), SyncStep::Hunting { matched: 2 });
    // 0x00 does not match position 2, but it independently satisfies
    // position 0 and starts a new candidate sequence.
    assert_eq!(sync.advance(0x00), SyncStep::Hunting { matched: 1 });
    // A byte matching nothing resets the hunt completely.
    assert_eq!(sync.advance(0xaa), SyncStep::Hunting { matched: 0 });
}

#[test]
fn quality_three_retains_lock() {
    let mut engine = DecodeEngine::new();
    lock(&mut engine);
    let trailer = [0x00, 0x03, 0x04, 0xaa, 0xaa, 0xaa, 0xaa];
    let outcomes = feed_frame(&mut engine, &[0; DATA_LEN], &trailer);
    assert_eq!(
        outcomes.last(),
        Some(&DecodeOutcome::FrameComplete { quality: 3 })
    );
    // Lock was retained: the next byte is data offset 0, no re-scan.
    match engine.feed(0x00) {
        DecodeOutcome::FrameByte { field, .. } => assert_eq!(field.offset, 0x00),
        other => panic!("expected data byte after retained lock, got {other:?}"),
    }
}

#[test]
fn quality_two_forces_reacquisition() {
    let mut engine = DecodeEngine::new();
    lock(&mut engine);
    let trailer = [0x00, 0x03, 0xaa, 0xaa, 0xaa, 0xaa, 0xaa];
    let outcomes = feed_frame(&mut engine, &[0; DATA_LEN], &trailer);
    assert_eq!(
        outcomes.last(),
        Some(&DecodeOutcome::FrameComplete { quality: 2 })
    );
    assert_eq!(engine.feed(0xaa), DecodeOutcome::Resyncing);
    assert_eq!(engine.resyncs(), 1);
}

#[test]
fn clean_trailer_scores_full_quality() {
    let mut engine = DecodeEngine::new();
    lock(&mut engine);
    let outcomes = feed_frame(&mut engine, &[0; DATA_LEN], &TRAILER);
    for (position, outcome) in outcomes[DATA_LEN..DATA_LEN + 6].iter().enumerate() {
        assert_eq!(
            outcome,
            &DecodeOutcome::TrailerByte {
                position: position as u8,
                matched: true
            }
        );
    }
    assert_eq!(
        outcomes.last(),
        Some(&DecodeOutcome::FrameComplete { quality: 7 })
    );
    assert_eq!(engine.mismatch_tally(), [0; TRAILER_LEN]);
}

#[test]
fn mismatch_tally_tracks_positions() {
    let mut engine = DecodeEngine::new();
    lock(&mut engine);
    let trailer = [0x00, 0x03, 0x04, 0xaa, 0x23, 0x02, 0x3b];
    let outcomes = feed_frame(&mut engine, &[0; DATA_LEN], &trailer);
    assert_eq!(
        outcomes.last(),
        Some(&DecodeOutcome::FrameComplete { quality: 6 })
    );
    let tally = engine.mismatch_tally();
    assert_eq!(tally[3], 1);
    assert_eq!(tally.iter().sum::<u32>(), 1);
}

#[test]
fn dial_scalar_decode() {
    match FIELD_TABLE[0x00].decode(0x00).value {
        FieldValue::Scalar { raw, value, .. } => {
            assert_eq!(raw, 0);
            assert!((value - 25.2).abs() < 1e-9, "got {value}");
        }
        other => panic!("expected scalar, got {other:?}"),
    }
    let cold = FIELD_TABLE[0x00].decode(0x9e);
    match cold.value {
        FieldValue::Scalar { raw, value, .. } => {
            assert_eq!(raw, -98);
            assert!((value - 5.6).abs() < 1e-9, "got {value}");
        }
        other => panic!("expected scalar, got {other:?}"),
    }
    assert_eq!(cold.band, Band::Low);
}

#[test]
fn self_cal_countdown_formula() {
    match FIELD_TABLE[0x04].decode(0x7d).value {
        FieldValue::Countdown {
            minutes, seconds, ..
        } => {
            assert_eq!(minutes, 10);
            assert_eq!(seconds, 25);
        }
        other => panic!("expected countdown, got {other:?}"),
    }
    assert_eq!(FIELD_TABLE[0x04].decode(0x7d).band, Band::Active);
    assert_eq!(FIELD_TABLE[0x04].decode(0x00).band, Band::Normal);
}

#[test]
fn ext_temp_bias_dual_readout() {
    match FIELD_TABLE[0x0b].decode(0x00).value {
        FieldValue::ExtTempBias {
            implied_c,
            direct_c,
            ..
        } => {
            assert!((implied_c - (-1.4)).abs() < 1e-9, "got {implied_c}");
            assert!(direct_c.abs() < 1e-9);
        }
        other => panic!("expected dual readout, got {other:?}"),
    }
    // Floor division must round towards negative infinity for raw -14.
    match FIELD_TABLE[0x0b].decode(0xf2).value {
        FieldValue::ExtTempBias { implied_c, .. } => {
            assert!(implied_c.abs() < 1e-9, "got {implied_c}");
        }
        other => panic!("expected dual readout, got {other:?}"),
    }
    assert_eq!(FIELD_TABLE[0x0b].decode(0xf0).band, Band::High);
    assert_eq!(FIELD_TABLE[0x0b].decode(0xf1).band, Band::Normal);
    assert_eq!(FIELD_TABLE[0x0b].decode(0x00).band, Band::Low);
}

#[test]
fn overheat_stage_priority() {
    match FIELD_TABLE[0x18].decode(0x80 | 25).value {
        FieldValue::Overheat { count, stage } => {
            assert_eq!(count, 25);
            assert_eq!(stage, OverheatStage::Stage2);
        }
        other => panic!("expected overheat, got {other:?}"),
    }
    assert_eq!(FIELD_TABLE[0x18].decode(0x80 | 25).band, Band::High);
    match FIELD_TABLE[0x18].decode(0x40 | 5).value {
        FieldValue::Overheat { count, stage } => {
            assert_eq!(count, 5);
            assert_eq!(stage, OverheatStage::Stage1);
        }
        other => panic!("expected overheat, got {other:?}"),
    }
    // Both stage bits set: stage 2 wins.
    match FIELD_TABLE[0x18].decode(0xc0).value {
        FieldValue::Overheat { stage, .. } => assert_eq!(stage, OverheatStage::Stage2),
        other => panic!("expected overheat, got {other:?}"),
    }
}

#[test]
fn water_pump_edge_triggered_once() {
    let mut engine = DecodeEngine::new();
    lock(&mut engine);

    let mut data = [0u8; DATA_LEN];
    data[0x1c] = 0x80;
    let first = feed_frame(&mut engine, &data, &TRAILER);
    let on = changes_for(&first, StatusKey::WaterPump);
    assert_eq!(on.len(), 1);
    assert_eq!(on[0].old, StatusValue::Switch(false));
    assert_eq!(on[0].new, StatusValue::Switch(true));

    let second = feed_frame(&mut engine, &data, &TRAILER);
    assert!(changes_for(&second, StatusKey::WaterPump).is_empty());

    data[0x1c] = 0x00;
    let third = feed_frame(&mut engine, &data, &TRAILER);
    let off = changes_for(&third, StatusKey::WaterPump);
    assert_eq!(off.len(), 1);
    assert_eq!(off[0].old, StatusValue::Switch(true));
    assert_eq!(off[0].new, StatusValue::Switch(false));
}

#[test]
fn recirc_tri_state_priority_and_edges() {
    let mut engine = DecodeEngine::new();
    lock(&mut engine);

    let mut data = [0u8; DATA_LEN];
    // Both recirculation bits set: full wins.
    data[0x1c] = 0x0c;
    let outcomes = feed_frame(&mut engine, &data, &TRAILER);
    let changes = changes_for(&outcomes, StatusKey::RecircMode);
    assert_eq!(changes.len(), 1);
    assert_eq!(changes[0].new, StatusValue::Recirc(RecircMode::Full));
    assert_eq!(engine.registry().recirc(), RecircMode::Full);

    // Same derived mode, no event.
    data[0x1c] = 0x04;
    let outcomes = feed_frame(&mut engine, &data, &TRAILER);
    assert!(changes_for(&outcomes, StatusKey::RecircMode).is_empty());

    data[0x1c] = 0x08;
    let outcomes = feed_frame(&mut engine, &data, &TRAILER);
    let changes = changes_for(&outcomes, StatusKey::RecircMode);
    assert_eq!(changes.len(), 1);
    assert_eq!(changes[0].new, StatusValue::Recirc(RecircMode::Partial));

    data[0x1c] = 0x00;
    let outcomes = feed_frame(&mut engine, &data, &TRAILER);
    let changes = changes_for(&outcomes, StatusKey::RecircMode);
    assert_eq!(changes.len(), 1);
    assert_eq!(changes[0].new, StatusValue::Recirc(RecircMode::Off));
}

#[test]
fn max_cold_and_defrost_together_is_invalid() {
    let field = FIELD_TABLE[0x1d].decode(0x03);
    assert_eq!(field.band, Band::Invalid);
    assert_eq!(FIELD_TABLE[0x1d].decode(0x0c).band, Band::Invalid);
    assert_eq!(FIELD_TABLE[0x1d].decode(0x01).band, Band::Normal);
    assert_eq!(FIELD_TABLE[0x1d].decode(0x02).band, Band::Normal);
}

#[test]
fn decode_is_total_over_all_offsets_and_bytes() {
    for (index, descriptor) in FIELD_TABLE.iter().enumerate() {
        assert_eq!(usize::from(descriptor.offset), index);
        for byte in 0..=255u8 {
            let field = descriptor.decode(byte);
            if let FieldValue::Scalar { value, .. } = field.value {
                assert!(value.is_finite());
            }
        }
    }
}

#[test]
fn cache_and_registry_survive_resync() {
    let mut engine = DecodeEngine::new();
    lock(&mut engine);

    let mut data = [0u8; DATA_LEN];
    data[0x00] = 0x42;
    data[0x1c] = 0x80;
    let bad_trailer = [0xaa; TRAILER_LEN];
    let outcomes = feed_frame(&mut engine, &data, &bad_trailer);
    assert_eq!(
        outcomes.last(),
        Some(&DecodeOutcome::FrameComplete { quality: 0 })
    );
    assert_eq!(engine.state(), SyncState::Acquiring { matched: 0 });

    // A resync only concerns trailer alignment; accumulated field state
    // stays, so transition detection remains correct across the gap.
    assert_eq!(engine.cache().get(0x00), 0x42);
    assert_eq!(
        engine.registry().get(StatusKey::WaterPump),
        StatusValue::Switch(true)
    );

    lock(&mut engine);
    let outcomes = feed_frame(&mut engine, &data, &TRAILER);
    assert!(changes_for(&outcomes, StatusKey::WaterPump).is_empty());
}

#[test]
fn deltas_computed_only_when_enabled() {
    let mut data = [0u8; DATA_LEN];
    data[0x00] = 10;
    data[0x01] = 20;
    data[0x02] = 5;
    data[0x03] = 15;
    data[0x05] = 100;
    data[0x06] = 90;
    data[0x08] = 40;
    data[0x0b] = 10;
    data[0x0e] = 150;
    data[0x0f] = 120;

    let mut engine = DecodeEngine::new();
    lock(&mut engine);
    let outcomes = feed_frame(&mut engine, &data, &TRAILER);
    for outcome in &outcomes {
        if let DecodeOutcome::FrameByte { delta, .. } = outcome {
            assert_eq!(*delta, None);
        }
    }

    let mut engine = DecodeEngine::new();
    engine.set_deltas(true);
    lock(&mut engine);
    let outcomes = feed_frame(&mut engine, &data, &TRAILER);
    let delta_at = |offset: usize| match &outcomes[offset] {
        DecodeOutcome::FrameByte { delta, .. } => *delta,
        other => panic!("expected data byte, got {other:?}"),
    };
    assert_eq!(
        delta_at(0x03),
        Some(Delta::AdjustmentTarget {
            left: 10,
            right: 10
        })
    );
    assert_eq!(
        delta_at(0x0b),
        Some(Delta::ExtTempBias {
            delta: 30,
            complement: 20
        })
    );
    assert_eq!(
        delta_at(0x0f),
        Some(Delta::MixChamber {
            left: 50,
            right: 30
        })
    );
    assert_eq!(delta_at(0x00), None);
}

#[test]
fn noise_without_sync_prefix_never_locks() {
    let mut engine = DecodeEngine::new();
    let mut state: u32 = 0x1234_5678;
    for _ in 0..50_000 {
        state = state.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
        let mut byte = (state >> 24) as u8;
        // Position 0 only accepts 0x00; without it a candidate sequence
        // can never even start.
        if byte == 0x00 {
            byte = 0xff;
        }
        assert_eq!(engine.feed(byte), DecodeOutcome::Resyncing);
    }
    assert_eq!(engine.state(), SyncState::Acquiring { matched: 0 });
    assert_eq!(engine.frames(), 0);
}

#[test]
fn relocks_after_garbage() {
    let mut engine = DecodeEngine::new();
    lock(&mut engine);
    // Force a desync with a fully corrupt trailer.
    feed_frame(&mut engine, &[0; DATA_LEN], &[0xaa; TRAILER_LEN]);
    assert_eq!(engine.state(), SyncState::Acquiring { matched: 0 });

    for byte in [0x55, 0x00, 0x99, 0xab] {
        assert_eq!(engine.feed(byte), DecodeOutcome::Resyncing);
    }
    lock(&mut engine);
    let outcomes = feed_frame(&mut engine, &[0; DATA_LEN], &TRAILER);
    assert_eq!(
        outcomes.last(),
        Some(&DecodeOutcome::FrameComplete { quality: 7 })
    );
}

#[test]
fn pattern_block_find() {
    let pattern = SyncPattern::standard();
    let mut buffer = vec![0x11u8, 0x00, 0x03, 0x99];
    buffer.extend_from_slice(&TRAILER);
    buffer.extend_from_slice(&[0u8; DATA_LEN]);
    assert_eq!(pattern.find(&buffer), Some(4));
    assert_eq!(pattern.find(&[0u8; 6]), None);

    // Variant trailer is found too.
    let mut variant = TRAILER;
    variant[6] = 0x3c;
    assert_eq!(pattern.find(&variant), Some(0));
}

#[test]
fn align_capture_trims_to_whole_frames() {
    let mut buffer = vec![0xaau8, 0xbb];
    buffer.extend_from_slice(&TRAILER);
    // Two whole frames plus a truncated third.
    buffer.extend_from_slice(&[0u8; 2 * (DATA_LEN + TRAILER_LEN) + 8]);

    let aligned = align_capture(&buffer).unwrap();
    assert_eq!(aligned.len(), 2 * (DATA_LEN + TRAILER_LEN));
    assert!(matches!(
        align_capture(&[0u8; 6]),
        Err(AcError::NoSync)
    ));
}

#[test]
fn replay_source_paces_seeks_and_exhausts() {
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .unwrap();
    let mut source = ReplaySource::new(
        bytes::Bytes::from_static(&[1, 2, 3, 4]),
        std::time::Duration::ZERO,
    );
    rt.block_on(async {
        assert_eq!(source.next_byte().await.unwrap(), SourceRead::Byte(1));
        source.seek(2).unwrap();
        assert_eq!(source.next_byte().await.unwrap(), SourceRead::Byte(4));
        assert_eq!(source.next_byte().await.unwrap(), SourceRead::Eof);
        // Relative seek clamps at both ends.
        source.seek(-100).unwrap();
        assert_eq!(source.position(), 0);
        assert_eq!(source.next_byte().await.unwrap(), SourceRead::Byte(1));
    });
}

#[test]
fn fast_cool_bit_is_inverted() {
    let mut engine = DecodeEngine::new();
    lock(&mut engine);

    // Bit 6 set means intense cooling is off; all-zero data therefore
    // reads as fast cooling engaged.
    let outcomes = feed_frame(&mut engine, &[0; DATA_LEN], &TRAILER);
    let on = changes_for(&outcomes, StatusKey::FastCool);
    assert_eq!(on.len(), 1);
    assert_eq!(on[0].new, StatusValue::Switch(true));

    let mut data = [0u8; DATA_LEN];
    data[0x1a] = 0x40;
    let outcomes = feed_frame(&mut engine, &data, &TRAILER);
    let off = changes_for(&outcomes, StatusKey::FastCool);
    assert_eq!(off.len(), 1);
    assert_eq!(off[0].new, StatusValue::Switch(false));
}
