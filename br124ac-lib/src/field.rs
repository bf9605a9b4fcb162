//! Per-offset decode rules for the 34-byte data segment.
//!
//! The table is total: every byte value 0x00..=0xff at every offset decodes
//! to a value and a severity band. Physically implausible readings are
//! flagged through bands, never rejected.

use crate::constants::DATA_LEN;
use crate::status::StatusKey;
use num_enum::FromPrimitive;
use serde::Serialize;
use std::fmt;
use strum_macros::Display;

/// Qualitative severity classification attached to a decoded value,
/// used for alerting and display colouring, not for decoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display, Serialize)]
pub enum Band {
    #[default]
    #[strum(to_string = "normal")]
    Normal,
    #[strum(to_string = "low")]
    Low,
    #[strum(to_string = "high")]
    High,
    #[strum(to_string = "warn")]
    Warn,
    #[strum(to_string = "active")]
    Active,
    #[strum(to_string = "invalid")]
    Invalid,
}

/// Which side of the dual-zone system a field belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize)]
pub enum Side {
    #[strum(to_string = "left")]
    Left,
    #[strum(to_string = "right")]
    Right,
}

/// Measurement unit of a scalar field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize)]
pub enum Unit {
    #[strum(to_string = "°C")]
    Celsius,
    #[strum(to_string = "%")]
    Percent,
    #[strum(to_string = "min")]
    Minutes,
    #[strum(to_string = "s")]
    Seconds,
    #[strum(to_string = "")]
    Raw,
}

/// Overheat protection stage, taken from the top two bits of offset 0x18.
/// Bit 7 (stage 2) wins over bit 6, so the two-bit value 3 reads as stage 2.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize, FromPrimitive)]
#[repr(u8)]
pub enum OverheatStage {
    #[strum(to_string = "off")]
    Off = 0,
    #[strum(to_string = "stage1")]
    Stage1 = 1,
    #[num_enum(default)]
    #[strum(to_string = "stage2")]
    Stage2 = 2,
}

/// A single ordered classification threshold. The first matching check in
/// a descriptor's band list wins; no match means [`Band::Normal`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Check {
    Lt(i16),
    Gt(i16),
    Eq(i16),
}

impl Check {
    fn matches(self, value: i16) -> bool {
        match self {
            Check::Lt(limit) => value < limit,
            Check::Gt(limit) => value > limit,
            Check::Eq(expected) => value == expected,
        }
    }
}

fn classify(bands: &[(Check, Band)], value: i16) -> Band {
    bands
        .iter()
        .find(|(check, _)| check.matches(value))
        .map(|&(_, band)| band)
        .unwrap_or(Band::Normal)
}

/// Raw-to-physical conversion of a scalar field.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Conversion {
    /// `value = mul * (raw + add) / div`
    Linear { mul: f64, add: i16, div: f64 },
    /// Self-calibration countdown: minutes = raw / 12, seconds = (raw % 12) * 5.
    Countdown,
    /// Exterior temperature bias, two parallel readouts:
    /// `-(((raw + 1) div 2) + 7) / 5` (floor division) and `raw / 5`.
    ExtBias,
    /// Overheat protection: count in the low six bits, stage in the top two.
    Overheat,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScalarRule {
    pub signed: bool,
    pub unit: Unit,
    pub convert: Conversion,
    pub bands: &'static [(Check, Band)],
}

/// Decode rule for one bit of a flags field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BitRule {
    pub label: &'static str,
    /// Status key whose transitions are logged, if this bit carries one.
    pub status: Option<StatusKey>,
    /// Inverted sense: the status is active when the bit is clear.
    pub inverted: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlagsRule {
    pub bits: [BitRule; 8],
    /// Bit pairs that must never be set together; both set flags the
    /// whole field as an invalid combination.
    pub exclusive: &'static [(u8, u8)],
}

impl FlagsRule {
    /// Logical state of bit `index` in `raw`, with the inverted sense applied.
    pub fn active(&self, raw: u8, index: u8) -> bool {
        let set = raw & (1 << index) != 0;
        set != self.bits[index as usize].inverted
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FieldKind {
    Scalar(ScalarRule),
    Flags(FlagsRule),
}

/// Immutable decode rule for one data-byte offset.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FieldDescriptor {
    pub offset: u8,
    pub label: &'static str,
    pub side: Option<Side>,
    pub kind: FieldKind,
}

/// Decoded value of one data byte.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub enum FieldValue {
    Scalar { raw: i16, value: f64, unit: Unit },
    Countdown { raw: u8, minutes: u8, seconds: u8 },
    ExtTempBias { raw: i16, implied_c: f64, direct_c: f64 },
    Overheat { count: u8, stage: OverheatStage },
    Flags { bits: u8 },
}

/// One decoded field: raw byte, typed value, and severity band.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DecodedField {
    pub offset: u8,
    pub label: &'static str,
    pub raw: u8,
    pub value: FieldValue,
    pub band: Band,
}

impl DecodedField {
    /// The physical scalar value, when the field has one.
    pub fn scalar_value(&self) -> Option<f64> {
        match self.value {
            FieldValue::Scalar { value, .. } => Some(value),
            FieldValue::ExtTempBias { implied_c, .. } => Some(implied_c),
            _ => None,
        }
    }
}

impl fmt::Display for DecodedField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label)?;
        if let Some(side) = lookup(self.offset).side {
            write!(f, " ({side})")?;
        }
        match self.value {
            FieldValue::Scalar { raw, value, unit } => {
                write!(f, ": {raw} = {value:.1} {unit}")?;
            }
            FieldValue::Countdown {
                raw,
                minutes,
                seconds,
            } => {
                write!(f, ": {raw} = {minutes} min {seconds} s")?;
            }
            FieldValue::ExtTempBias {
                raw,
                implied_c,
                direct_c,
            } => {
                write!(f, ": {raw} = {implied_c:+.1} °C / {direct_c:+.1} °C")?;
            }
            FieldValue::Overheat { count, stage } => {
                write!(f, ": count {count}, {stage}")?;
            }
            FieldValue::Flags { bits } => {
                write!(f, ": 0b{bits:08b}")?;
            }
        }
        if self.band != Band::Normal {
            write!(f, " [{}]", self.band)?;
        }
        Ok(())
    }
}

impl ScalarRule {
    fn decode(&self, raw: u8) -> (FieldValue, Band) {
        let raw_i = if self.signed {
            i16::from(raw as i8)
        } else {
            i16::from(raw)
        };
        match self.convert {
            Conversion::Linear { mul, add, div } => {
                let value = mul * f64::from(raw_i + add) / div;
                (
                    FieldValue::Scalar {
                        raw: raw_i,
                        value,
                        unit: self.unit,
                    },
                    classify(self.bands, raw_i),
                )
            }
            Conversion::Countdown => (
                FieldValue::Countdown {
                    raw,
                    minutes: raw / 12,
                    seconds: (raw % 12) * 5,
                },
                classify(self.bands, raw_i),
            ),
            Conversion::ExtBias => {
                let implied_c = -f64::from((raw_i + 1).div_euclid(2) + 7) / 5.0;
                let direct_c = f64::from(raw_i) / 5.0;
                (
                    FieldValue::ExtTempBias {
                        raw: raw_i,
                        implied_c,
                        direct_c,
                    },
                    classify(self.bands, raw_i),
                )
            }
            Conversion::Overheat => {
                let count = raw & 0x3f;
                let stage = OverheatStage::from_primitive(raw >> 6);
                (
                    FieldValue::Overheat { count, stage },
                    classify(self.bands, i16::from(count)),
                )
            }
        }
    }
}

impl FlagsRule {
    fn decode(&self, raw: u8) -> (FieldValue, Band) {
        let invalid = self
            .exclusive
            .iter()
            .any(|&(a, b)| raw & (1 << a) != 0 && raw & (1 << b) != 0);
        let band = if invalid { Band::Invalid } else { Band::Normal };
        (FieldValue::Flags { bits: raw }, band)
    }
}

impl FieldDescriptor {
    /// Decode one raw byte. Total over 0x00..=0xff; never fails.
    pub fn decode(&self, raw: u8) -> DecodedField {
        let (value, band) = match &self.kind {
            FieldKind::Scalar(rule) => rule.decode(raw),
            FieldKind::Flags(rule) => rule.decode(raw),
        };
        DecodedField {
            offset: self.offset,
            label: self.label,
            raw,
            value,
            band,
        }
    }
}

/// Descriptor for a data-segment offset. Panics on out-of-range offsets;
/// callers inside the engine only ever pass 0x00..=0x21.
pub fn lookup(offset: u8) -> &'static FieldDescriptor {
    &FIELD_TABLE[offset as usize]
}

const fn scalar(
    offset: u8,
    label: &'static str,
    side: Option<Side>,
    signed: bool,
    unit: Unit,
    convert: Conversion,
    bands: &'static [(Check, Band)],
) -> FieldDescriptor {
    FieldDescriptor {
        offset,
        label,
        side,
        kind: FieldKind::Scalar(ScalarRule {
            signed,
            unit,
            convert,
            bands,
        }),
    }
}

const fn flags(
    offset: u8,
    label: &'static str,
    bits: [BitRule; 8],
    exclusive: &'static [(u8, u8)],
) -> FieldDescriptor {
    FieldDescriptor {
        offset,
        label,
        side: None,
        kind: FieldKind::Flags(FlagsRule { bits, exclusive }),
    }
}

const fn bit(label: &'static str) -> BitRule {
    BitRule {
        label,
        status: None,
        inverted: false,
    }
}

const fn status_bit(label: &'static str, status: StatusKey, inverted: bool) -> BitRule {
    BitRule {
        label,
        status: Some(status),
        inverted,
    }
}

const fn linear(mul: f64, add: i16, div: f64) -> Conversion {
    Conversion::Linear { mul, add, div }
}

/// `(raw + 126) / 5` °C, shared by the dial and interior temperature fields.
const DIAL_TEMP: Conversion = linear(1.0, 126, 5.0);

const DIAL_BANDS: &[(Check, Band)] = &[(Check::Lt(-33), Band::Low), (Check::Gt(-1), Band::High)];

const INTERIOR_BANDS: &[(Check, Band)] = &[
    (Check::Lt(-127), Band::Invalid),
    (Check::Gt(125), Band::Invalid),
    (Check::Lt(-56), Band::Low),
    (Check::Gt(24), Band::High),
];

const CONTROL_BIAS_BANDS: &[(Check, Band)] = &[
    (Check::Lt(-50), Band::Low),
    (Check::Gt(23), Band::High),
    (Check::Lt(-7), Band::Warn),
    (Check::Gt(3), Band::Warn),
];

const MIX_CHAMBER_BANDS: &[(Check, Band)] =
    &[(Check::Eq(0), Band::Low), (Check::Gt(242), Band::High)];

const HEATER_DRIVE_BANDS: &[(Check, Band)] =
    &[(Check::Lt(80), Band::Low), (Check::Gt(80), Band::High)];

const SIGN_BANDS: &[(Check, Band)] = &[(Check::Lt(0), Band::Low), (Check::Gt(0), Band::High)];

const DUTY_BANDS: &[(Check, Band)] = &[(Check::Eq(0), Band::Low), (Check::Eq(255), Band::High)];

const NONZERO_ACTIVE: &[(Check, Band)] = &[(Check::Gt(0), Band::Active)];

/// One decode rule per data offset 0x00..=0x21; index equals offset.
pub static FIELD_TABLE: [FieldDescriptor; DATA_LEN] = [
    scalar(
        0x00,
        "Temperature dial",
        Some(Side::Left),
        true,
        Unit::Celsius,
        DIAL_TEMP,
        DIAL_BANDS,
    ),
    scalar(
        0x01,
        "Adjustment target",
        Some(Side::Left),
        true,
        Unit::Celsius,
        DIAL_TEMP,
        &[],
    ),
    scalar(
        0x02,
        "Temperature dial",
        Some(Side::Right),
        true,
        Unit::Celsius,
        DIAL_TEMP,
        DIAL_BANDS,
    ),
    scalar(
        0x03,
        "Adjustment target",
        Some(Side::Right),
        true,
        Unit::Celsius,
        DIAL_TEMP,
        &[],
    ),
    scalar(
        0x04,
        "Self-calibration timer",
        None,
        false,
        Unit::Minutes,
        Conversion::Countdown,
        NONZERO_ACTIVE,
    ),
    scalar(
        0x05,
        "Mixing chamber temperature",
        Some(Side::Left),
        false,
        Unit::Celsius,
        linear(1.0, 40, 4.0),
        MIX_CHAMBER_BANDS,
    ),
    scalar(
        0x06,
        "Mixing chamber temperature",
        Some(Side::Right),
        false,
        Unit::Celsius,
        linear(1.0, 40, 4.0),
        MIX_CHAMBER_BANDS,
    ),
    scalar(
        0x07,
        "Interior air temperature",
        None,
        true,
        Unit::Celsius,
        DIAL_TEMP,
        INTERIOR_BANDS,
    ),
    scalar(
        0x08,
        "Exterior air temperature",
        None,
        true,
        Unit::Celsius,
        linear(1.0, 0, 2.0),
        &[],
    ),
    scalar(
        0x09,
        "Temperature control bias",
        Some(Side::Left),
        true,
        Unit::Celsius,
        linear(1.0, 0, 5.0),
        CONTROL_BIAS_BANDS,
    ),
    scalar(
        0x0a,
        "Temperature control bias",
        Some(Side::Right),
        true,
        Unit::Celsius,
        linear(1.0, 0, 5.0),
        CONTROL_BIAS_BANDS,
    ),
    scalar(
        0x0b,
        "Exterior temperature bias",
        None,
        true,
        Unit::Celsius,
        Conversion::ExtBias,
        &[(Check::Lt(-15), Band::High), (Check::Gt(-14), Band::Low)],
    ),
    scalar(
        0x0c,
        "Heater drive",
        Some(Side::Left),
        false,
        Unit::Raw,
        linear(1.0, -80, 1.0),
        HEATER_DRIVE_BANDS,
    ),
    scalar(
        0x0d,
        "Heater drive",
        Some(Side::Right),
        false,
        Unit::Raw,
        linear(1.0, -80, 1.0),
        HEATER_DRIVE_BANDS,
    ),
    scalar(
        0x0e,
        "Mixing chamber reference",
        Some(Side::Left),
        false,
        Unit::Celsius,
        linear(1.0, 40, 4.0),
        &[],
    ),
    scalar(
        0x0f,
        "Mixing chamber reference",
        Some(Side::Right),
        false,
        Unit::Celsius,
        linear(1.0, 40, 4.0),
        &[],
    ),
    scalar(
        0x10,
        "Valve drive reference",
        Some(Side::Left),
        false,
        Unit::Raw,
        linear(1.0, -80, 1.0),
        &[],
    ),
    scalar(
        0x11,
        "Valve drive reference",
        Some(Side::Right),
        false,
        Unit::Raw,
        linear(1.0, -80, 1.0),
        &[],
    ),
    scalar(
        0x12,
        "Valve feedback bias",
        Some(Side::Left),
        true,
        Unit::Raw,
        linear(1.0, 0, 1.0),
        SIGN_BANDS,
    ),
    scalar(
        0x13,
        "Valve feedback bias",
        Some(Side::Right),
        true,
        Unit::Raw,
        linear(1.0, 0, 1.0),
        SIGN_BANDS,
    ),
    scalar(
        0x14,
        "Valve duty cycle",
        Some(Side::Left),
        false,
        Unit::Percent,
        linear(100.0, 0, 255.0),
        DUTY_BANDS,
    ),
    scalar(
        0x15,
        "Valve duty cycle",
        Some(Side::Right),
        false,
        Unit::Percent,
        linear(100.0, 0, 255.0),
        DUTY_BANDS,
    ),
    scalar(
        0x16,
        "Engine coolant temperature",
        None,
        false,
        Unit::Celsius,
        linear(1.0, 0, 1.0),
        &[(Check::Lt(6), Band::Low), (Check::Gt(107), Band::High)],
    ),
    scalar(
        0x17,
        "Evaporator temperature",
        None,
        true,
        Unit::Celsius,
        linear(1.0, 0, 2.0),
        &[(Check::Eq(0), Band::Low), (Check::Gt(125), Band::High)],
    ),
    scalar(
        0x18,
        "Overheat protection",
        None,
        false,
        Unit::Raw,
        Conversion::Overheat,
        &[(Check::Gt(19), Band::High)],
    ),
    scalar(
        0x19,
        "Interior air temperature, damped",
        None,
        true,
        Unit::Celsius,
        DIAL_TEMP,
        INTERIOR_BANDS,
    ),
    flags(
        0x1a,
        "User input flags",
        [
            bit("Recirculation (user)"),
            bit("Economy mode"),
            bit("Reheat mode"),
            bit("Adjusting, left"),
            bit("Mode change"),
            bit("Adjusting, right"),
            // Active-low: 0 means intense cooling engaged.
            status_bit("Intense cooling", StatusKey::FastCool, true),
            bit("Unknown (0x1a/7)"),
        ],
        &[],
    ),
    scalar(
        0x1b,
        "Recirculation timer",
        None,
        false,
        Unit::Minutes,
        linear(1.0, 0, 1.0),
        NONZERO_ACTIVE,
    ),
    flags(
        0x1c,
        "Actuator flags",
        [
            // Active-low: 0 means the center vent heating is bypassed.
            status_bit("Center vents heated", StatusKey::VentBypass, true),
            bit("Radiator blower stage II"),
            bit("Recirculation, full"),
            bit("Recirculation, partial"),
            bit("A/C compressor"),
            bit("Unknown (0x1c/5)"),
            bit("Unknown (0x1c/6)"),
            status_bit("Water pump", StatusKey::WaterPump, false),
        ],
        &[],
    ),
    flags(
        0x1d,
        "Control flags",
        [
            bit("Max cold, left"),
            bit("Defrost, left"),
            bit("Max cold, right"),
            bit("Defrost, right"),
            bit("Exterior air freeze protection"),
            status_bit("Cooling mode", StatusKey::TempMode, false),
            status_bit("Self-calibration", StatusKey::SelfCal, false),
            bit("Intense cooling recirculation"),
        ],
        &[(0, 1), (2, 3)],
    ),
    scalar(
        0x1e,
        "Temperature dial, damped",
        Some(Side::Left),
        true,
        Unit::Celsius,
        DIAL_TEMP,
        &[],
    ),
    scalar(
        0x1f,
        "Adjustment timer",
        Some(Side::Left),
        false,
        Unit::Seconds,
        linear(1.0, 0, 1.0),
        NONZERO_ACTIVE,
    ),
    scalar(
        0x20,
        "Temperature dial, damped",
        Some(Side::Right),
        true,
        Unit::Celsius,
        DIAL_TEMP,
        &[],
    ),
    scalar(
        0x21,
        "Adjustment timer",
        Some(Side::Right),
        false,
        Unit::Seconds,
        linear(1.0, 0, 1.0),
        NONZERO_ACTIVE,
    ),
];
