//! Per-dive field cache with an initialized-bit per field kind.
//!
//! Parsers prime this once during `set_data` and answer every later field
//! lookup from it. A field that was never set reports `Unsupported`, which
//! is how "this format doesn't record average depth" is distinguished from
//! "average depth is zero".

use crate::error::{Error, Result};
use crate::types::{
    DiveMode, Field, FieldValue, GasMix, Salinity, StringField, Tank, MAX_GASES, MAX_STRINGS,
};

// One bit per scalar field kind in `initialized`.
const BIT_DIVETIME: u32 = 1 << 0;
const BIT_MAXDEPTH: u32 = 1 << 1;
const BIT_AVGDEPTH: u32 = 1 << 2;
const BIT_ATMOSPHERIC: u32 = 1 << 3;
const BIT_SALINITY: u32 = 1 << 4;
const BIT_DIVEMODE: u32 = 1 << 5;
const BIT_GASMIX: u32 = 1 << 6;
const BIT_TANK: u32 = 1 << 7;
const BIT_STRING: u32 = 1 << 8;

/// Keyed store of parsed dive-summary values.
#[derive(Default)]
pub struct FieldCache {
    initialized: u32,
    divetime: u32,
    maxdepth: f64,
    avgdepth: f64,
    atmospheric: f64,
    salinity: Option<Salinity>,
    divemode: DiveMode,
    ngasmixes: usize,
    gasmixes: [GasMix; MAX_GASES],
    ntanks: usize,
    tanks: [Tank; MAX_GASES],
    strings: Vec<StringField>,
}

impl FieldCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reset to the defined empty state: nothing initialized.
    pub fn clear(&mut self) {
        *self = Self::default();
    }

    pub fn set_divetime(&mut self, seconds: u32) {
        self.initialized |= BIT_DIVETIME;
        self.divetime = seconds;
    }

    pub fn set_maxdepth(&mut self, meters: f64) {
        self.initialized |= BIT_MAXDEPTH;
        self.maxdepth = meters;
    }

    pub fn set_avgdepth(&mut self, meters: f64) {
        self.initialized |= BIT_AVGDEPTH;
        self.avgdepth = meters;
    }

    pub fn set_atmospheric(&mut self, bar: f64) {
        self.initialized |= BIT_ATMOSPHERIC;
        self.atmospheric = bar;
    }

    pub fn set_salinity(&mut self, salinity: Salinity) {
        self.initialized |= BIT_SALINITY;
        self.salinity = Some(salinity);
    }

    pub fn set_divemode(&mut self, mode: DiveMode) {
        self.initialized |= BIT_DIVEMODE;
        self.divemode = mode;
    }

    /// Store a gas mix at `index`, growing the mix count to cover it.
    pub fn set_gasmix(&mut self, index: usize, mix: GasMix) -> Result<()> {
        if index >= MAX_GASES {
            return Err(Error::InvalidArgs("gas mix index out of range"));
        }
        self.initialized |= BIT_GASMIX;
        self.gasmixes[index] = mix;
        if index + 1 > self.ngasmixes {
            self.ngasmixes = index + 1;
        }
        Ok(())
    }

    pub fn gasmix_count(&self) -> usize {
        self.ngasmixes
    }

    /// Mark the gas mix table as known even when it stays empty. Formats
    /// that enumerate their gas slots report zero mixes rather than
    /// "unsupported".
    pub fn mark_gasmixes_known(&mut self) {
        self.initialized |= BIT_GASMIX;
    }

    /// Store tank metadata at `index`, growing the tank count to cover it.
    pub fn set_tank(&mut self, index: usize, tank: Tank) -> Result<()> {
        if index >= MAX_GASES {
            return Err(Error::InvalidArgs("tank index out of range"));
        }
        self.initialized |= BIT_TANK;
        self.tanks[index] = tank;
        if index + 1 > self.ntanks {
            self.ntanks = index + 1;
        }
        Ok(())
    }

    /// Append a `(description, value)` string pair. The value is owned by
    /// the cache; descriptions are compile-time constants.
    pub fn add_string(&mut self, desc: &'static str, value: impl Into<String>) -> Result<()> {
        if self.strings.len() >= MAX_STRINGS {
            return Err(Error::NoMemory);
        }
        self.initialized |= BIT_STRING;
        self.strings.push(StringField { desc, value: value.into() });
        Ok(())
    }

    /// Retrieve a field, or `Unsupported` if its bit was never set.
    pub fn get(&self, field: Field) -> Result<FieldValue> {
        match field {
            Field::DiveTime => {
                self.require(BIT_DIVETIME)?;
                Ok(FieldValue::DiveTime(self.divetime))
            }
            Field::MaxDepth => {
                self.require(BIT_MAXDEPTH)?;
                Ok(FieldValue::Depth(self.maxdepth))
            }
            Field::AvgDepth => {
                self.require(BIT_AVGDEPTH)?;
                Ok(FieldValue::Depth(self.avgdepth))
            }
            Field::Atmospheric => {
                self.require(BIT_ATMOSPHERIC)?;
                Ok(FieldValue::Pressure(self.atmospheric))
            }
            Field::Salinity => self
                .salinity
                .map(FieldValue::Salinity)
                .ok_or(Error::Unsupported("field not present in this dive")),
            Field::DiveMode => {
                self.require(BIT_DIVEMODE)?;
                Ok(FieldValue::Mode(self.divemode))
            }
            Field::GasMixCount => {
                self.require(BIT_GASMIX)?;
                Ok(FieldValue::Count(self.ngasmixes))
            }
            Field::GasMix(index) => {
                self.require(BIT_GASMIX)?;
                if index >= self.ngasmixes {
                    return Err(Error::Unsupported("gas mix index"));
                }
                Ok(FieldValue::Mix(self.gasmixes[index]))
            }
            Field::TankCount => {
                self.require(BIT_TANK)?;
                Ok(FieldValue::Count(self.ntanks))
            }
            Field::Tank(index) => {
                self.require(BIT_TANK)?;
                if index >= self.ntanks {
                    return Err(Error::Unsupported("tank index"));
                }
                Ok(FieldValue::Tank(self.tanks[index]))
            }
            Field::String(index) => {
                self.require(BIT_STRING)?;
                self.strings
                    .get(index)
                    .cloned()
                    .map(FieldValue::Text)
                    .ok_or(Error::Unsupported("string index"))
            }
        }
    }

    fn require(&self, bit: u32) -> Result<()> {
        if self.initialized & bit == 0 {
            return Err(Error::Unsupported("field not present in this dive"));
        }
        Ok(())
    }
}
