use chrono::{DateTime, Local};
use serde::Serialize;
use std::fmt;
use strum_macros::Display;

/// Named logical states whose transitions are worth logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize)]
pub enum StatusKey {
    #[strum(to_string = "recirc_mode")]
    RecircMode,
    #[strum(to_string = "fast_cool")]
    FastCool,
    #[strum(to_string = "vent_bypass")]
    VentBypass,
    #[strum(to_string = "self_cal")]
    SelfCal,
    #[strum(to_string = "temp_mode")]
    TempMode,
    #[strum(to_string = "water_pump")]
    WaterPump,
}

/// Air recirculation mode, derived from two mutually-informative bits of
/// offset 0x1c with priority full > partial > off.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display, Serialize)]
pub enum RecircMode {
    #[default]
    #[strum(to_string = "off")]
    Off,
    #[strum(to_string = "80%")]
    Partial,
    #[strum(to_string = "100%")]
    Full,
}

/// Current value of a status: a plain switch or the recirculation tri-state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum StatusValue {
    Switch(bool),
    Recirc(RecircMode),
}

impl fmt::Display for StatusValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StatusValue::Switch(true) => write!(f, "on"),
            StatusValue::Switch(false) => write!(f, "off"),
            StatusValue::Recirc(mode) => write!(f, "{mode}"),
        }
    }
}

/// One observed status transition, stamped with wall-clock time.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusChange {
    pub key: StatusKey,
    pub old: StatusValue,
    pub new: StatusValue,
    pub at: DateTime<Local>,
}

impl fmt::Display for StatusChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {} -> {}", self.key, self.old, self.new)
    }
}

/// Last-known value per status key, used to emit exactly one event per
/// observed transition.
///
/// Created once with neutral defaults (everything off) and never reset:
/// a resync only concerns trailer alignment, so transition detection stays
/// correct across brief loss of frame lock.
#[derive(Debug, Clone, Default)]
pub struct StatusRegistry {
    recirc: RecircMode,
    fast_cool: bool,
    vent_bypass: bool,
    self_cal: bool,
    temp_mode: bool,
    water_pump: bool,
}

impl StatusRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn recirc(&self) -> RecircMode {
        self.recirc
    }

    pub fn get(&self, key: StatusKey) -> StatusValue {
        match key {
            StatusKey::RecircMode => StatusValue::Recirc(self.recirc),
            StatusKey::FastCool => StatusValue::Switch(self.fast_cool),
            StatusKey::VentBypass => StatusValue::Switch(self.vent_bypass),
            StatusKey::SelfCal => StatusValue::Switch(self.self_cal),
            StatusKey::TempMode => StatusValue::Switch(self.temp_mode),
            StatusKey::WaterPump => StatusValue::Switch(self.water_pump),
        }
    }

    /// Update a boolean status, returning a change event when the value
    /// actually flipped. `StatusKey::RecircMode` is not a switch and is
    /// rejected with `None`; use [`StatusRegistry::set_recirc`].
    pub fn set_switch(
        &mut self,
        key: StatusKey,
        value: bool,
        at: DateTime<Local>,
    ) -> Option<StatusChange> {
        let slot = match key {
            StatusKey::FastCool => &mut self.fast_cool,
            StatusKey::VentBypass => &mut self.vent_bypass,
            StatusKey::SelfCal => &mut self.self_cal,
            StatusKey::TempMode => &mut self.temp_mode,
            StatusKey::WaterPump => &mut self.water_pump,
            StatusKey::RecircMode => return None,
        };
        if *slot == value {
            return None;
        }
        let old = StatusValue::Switch(*slot);
        *slot = value;
        Some(StatusChange {
            key,
            old,
            new: StatusValue::Switch(value),
            at,
        })
    }

    /// Update the recirculation tri-state; a change is emitted only when
    /// the derived mode itself changes, not on every bit toggle.
    pub fn set_recirc(&mut self, mode: RecircMode, at: DateTime<Local>) -> Option<StatusChange> {
        if self.recirc == mode {
            return None;
        }
        let old = StatusValue::Recirc(self.recirc);
        self.recirc = mode;
        Some(StatusChange {
            key: StatusKey::RecircMode,
            old,
            new: StatusValue::Recirc(mode),
            at,
        })
    }
}
