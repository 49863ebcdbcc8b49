//! Shared domain types: dive fields, gas mixes, samples, and wall-clock time.
//!
//! These are the device-independent shapes every backend normalizes into.
//! Backends map their vendor-specific codes onto the closed sets here; the
//! closed sets never grow per backend.

use chrono::NaiveDateTime;

/// Maximum number of gas mixes a dive record can carry.
pub const MAX_GASES: usize = 16;

/// Maximum number of free-form string fields per dive.
pub const MAX_STRINGS: usize = 32;

/// A dive's wall-clock start time.
///
/// `utc_offset` is the timezone offset in seconds east of UTC when the log
/// format encodes one, otherwise `None` and `datetime` is device-local time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DiveDateTime {
    pub datetime: NaiveDateTime,
    pub utc_offset: Option<i32>,
}

impl DiveDateTime {
    /// A local time with no timezone information.
    pub fn local(datetime: NaiveDateTime) -> Self {
        Self { datetime, utc_offset: None }
    }
}

/// Breathing gas mixture. Fractions sum to 1.0.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct GasMix {
    pub helium: f64,
    pub oxygen: f64,
    pub nitrogen: f64,
}

impl GasMix {
    /// Build a mix from helium and oxygen fractions; nitrogen is the rest.
    pub fn new(helium: f64, oxygen: f64) -> Self {
        Self { helium, oxygen, nitrogen: 1.0 - oxygen - helium }
    }
}

/// Water type for depth-from-pressure conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaterKind {
    Fresh,
    Salt,
    Custom,
}

/// Water salinity: kind plus density in kg/l.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Salinity {
    pub kind: WaterKind,
    pub density: f64,
}

/// Normalized dive mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DiveMode {
    #[default]
    OpenCircuit,
    ClosedCircuit,
    Gauge,
    Freedive,
}

/// Cylinder metadata reported by air-integration sensors.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Tank {
    /// Water volume in liters; 0.0 when unknown.
    pub volume: f64,
    /// Rated working pressure in bar; 0.0 when unknown.
    pub work_pressure: f64,
}

/// Field selector for [`crate::parser::Parser::field`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    DiveTime,
    MaxDepth,
    AvgDepth,
    Atmospheric,
    Salinity,
    DiveMode,
    GasMixCount,
    GasMix(usize),
    TankCount,
    Tank(usize),
    String(usize),
}

/// A free-form `(description, value)` string pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StringField {
    pub desc: &'static str,
    pub value: String,
}

/// Value returned by a field lookup.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    /// Dive duration in seconds.
    DiveTime(u32),
    /// Depth in meters.
    Depth(f64),
    /// Atmospheric pressure in bar.
    Pressure(f64),
    Salinity(Salinity),
    Mode(DiveMode),
    Count(usize),
    Mix(GasMix),
    Tank(Tank),
    Text(StringField),
}

/// Deco state attached to a [`Sample::Deco`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecoKind {
    /// No-decompression limit; time is the remaining NDL.
    Ndl,
    /// Mandatory stop; time and depth describe the next stop.
    DecoStop,
    SafetyStop,
}

/// Severity of a named dive event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventSeverity {
    /// State transition, no action required.
    State,
    Info,
    Warning,
    Alarm,
}

/// One per-sample measurement delivered to the sample callback.
///
/// Within one `samples_foreach` a `Time` sample precedes every sample
/// belonging to that instant, and time values never decrease.
#[derive(Debug, Clone, PartialEq)]
pub enum Sample {
    /// Seconds since dive start.
    Time(u32),
    /// Depth in meters.
    Depth(f64),
    /// Water temperature in degrees Celsius.
    Temperature(f64),
    /// Cylinder pressure in bar for the given tank index.
    Pressure { tank: usize, bar: f64 },
    /// Switch to the gas mix at this index in the field cache.
    GasMix(usize),
    Deco { kind: DecoKind, time: u32, depth: f64 },
    /// Oxygen partial pressure in bar.
    Ppo2(f64),
    /// CCR setpoint in bar.
    Setpoint(f64),
    /// CNS loading as a fraction of the limit (0..1).
    Cns(f64),
    /// Heart rate in beats per minute.
    Heartbeat(u32),
    /// Time to surface in seconds, deco stops included.
    Tts(u32),
    /// Remaining bottom time in minutes.
    Rbt(u32),
    /// Named dive event. `kind` is the normalized event code the name was
    /// derived from, for callers that dispatch on it.
    Event { kind: u8, name: &'static str, severity: EventSeverity },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gasmix_nitrogen_balance() {
        let mix = GasMix::new(0.20, 0.18);
        assert!((mix.nitrogen - 0.62).abs() < 1e-9);
        let air = GasMix::new(0.0, 0.21);
        assert!((air.nitrogen - 0.79).abs() < 1e-9);
    }
}
