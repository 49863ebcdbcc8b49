//! McLean Extreme dive parser.
//!
//! A dive blob is the 0x5E-byte dive state dump followed by 4-byte samples.
//! The state dump shares its first 0x2D bytes with the computer state
//! (gases, setpoints, water density, operating mode); dive statistics
//! follow. Sample layout:
//!
//! ```text
//! u16 depth (centibar absolute) | u8 temperature C | u8 flags
//! flags: bit 7 CCR, bits 6..5 setpoint index, bits 4..2 gas index
//! ```
//!
//! Depths are pressure readings: depth = (P - Psurf) / density, with the
//! density chosen by the dive's water index.

use crate::bytes::u16_le;
use crate::error::{Error, Result};
use crate::field_cache::FieldCache;
use crate::parser::{Parser, SampleCallback};
use crate::types::{
    DiveDateTime, DiveMode, Field, FieldValue, GasMix, Salinity, Sample, WaterKind,
};
use chrono::DateTime;

const SZ_CFG: usize = 0x2D;
const SZ_DIVE: usize = 0x5E;
const SZ_SAMPLE: usize = 4;
const NGASES: usize = 8;

/// Raw times are offsets from 2000-01-01 00:00:00 UTC.
const EPOCH_2000: i64 = 946_684_800;

/// Sample interval in seconds.
const SAMPLE_INTERVAL: u32 = 20;

/// Water densities in kg/l by the dive's density index.
const DENSITIES: [f64; 3] = [1.000, 1.020, 1.030];

const DIVE_MODES: [DiveMode; 4] =
    [DiveMode::OpenCircuit, DiveMode::OpenCircuit, DiveMode::ClosedCircuit, DiveMode::Gauge];

// Field accessors over the state dump.
fn gas_o2(dive: &[u8], index: usize) -> u8 {
    dive[0x01 + index * 2]
}
fn gas_he(dive: &[u8], index: usize) -> u8 {
    dive[0x02 + index * 2]
}
fn setpoint_cbar(dive: &[u8], index: usize) -> u8 {
    dive[0x13 + index]
}
fn surface_pressure_cbar(dive: &[u8]) -> u16 {
    u16_le(&dive[0x1E..])
}
fn density_index(dive: &[u8]) -> usize {
    usize::from(dive[0x23])
}
fn operating_mode(dive: &[u8]) -> usize {
    usize::from(dive[0x2C])
}
fn log_start(dive: &[u8]) -> u32 {
    crate::bytes::u32_le(&dive[SZ_CFG..])
}
fn log_end(dive: &[u8]) -> u32 {
    crate::bytes::u32_le(&dive[SZ_CFG + 0x0C..])
}
fn pressure_max_cbar(dive: &[u8]) -> u16 {
    u16_le(&dive[SZ_CFG + 0x16..])
}
fn pressure_avg_cbar(dive: &[u8]) -> u16 {
    u16_le(&dive[SZ_CFG + 0x18..])
}
fn sample_count(dive: &[u8]) -> usize {
    usize::from(u16_le(&dive[0x5C..]))
}

/// Parser for McLean Extreme dive blobs.
pub struct McleanParser<'a> {
    data: Option<&'a [u8]>,
    cache: FieldCache,
}

impl<'a> McleanParser<'a> {
    pub fn new() -> Self {
        Self { data: None, cache: FieldCache::new() }
    }

    fn density(dive: &[u8]) -> f64 {
        DENSITIES.get(density_index(dive)).copied().unwrap_or(DENSITIES[0])
    }

    /// Convert an absolute pressure reading to depth in meters.
    fn pressure_to_depth(dive: &[u8], pressure_cbar: u16) -> f64 {
        let surface = surface_pressure_cbar(dive);
        if pressure_cbar <= surface {
            return 0.0;
        }
        0.01 * f64::from(pressure_cbar - surface) / Self::density(dive)
    }
}

impl<'a> Default for McleanParser<'a> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a> Parser<'a> for McleanParser<'a> {
    fn set_data(&mut self, data: &'a [u8]) -> Result<()> {
        self.cache.clear();
        self.data = None;

        if data.len() < SZ_DIVE {
            return Err(Error::DataFormat("dive shorter than its state dump".into()));
        }
        if data[0] != 0 {
            return Err(Error::DataFormat(format!("unsupported dive format {}", data[0])));
        }
        if data.len() != SZ_DIVE + sample_count(data) * SZ_SAMPLE {
            return Err(Error::DataFormat("dive size does not match its sample count".into()));
        }

        self.cache.set_divetime(log_end(data).saturating_sub(log_start(data)));
        self.cache.set_maxdepth(Self::pressure_to_depth(data, pressure_max_cbar(data)));
        self.cache.set_avgdepth(Self::pressure_to_depth(data, pressure_avg_cbar(data)));
        self.cache.set_atmospheric(f64::from(surface_pressure_cbar(data)) / 1000.0);
        let kind = match density_index(data) {
            0 => WaterKind::Fresh,
            _ => WaterKind::Salt,
        };
        self.cache.set_salinity(Salinity { kind, density: Self::density(data) });
        self.cache
            .set_divemode(DIVE_MODES.get(operating_mode(data)).copied().unwrap_or_default());
        for index in 0..NGASES {
            let mix = GasMix::new(
                f64::from(gas_he(data, index)) / 100.0,
                f64::from(gas_o2(data, index)) / 100.0,
            );
            self.cache.set_gasmix(index, mix)?;
        }

        self.data = Some(data);
        Ok(())
    }

    fn datetime(&self) -> Result<DiveDateTime> {
        let data = self.data.ok_or(Error::InvalidArgs("no data bound"))?;
        let epoch = EPOCH_2000 + i64::from(log_start(data));
        DateTime::from_timestamp(epoch, 0)
            .map(|dt| DiveDateTime::local(dt.naive_utc()))
            .ok_or_else(|| Error::DataFormat("log start out of range".into()))
    }

    fn field(&self, field: Field) -> Result<FieldValue> {
        self.cache.get(field)
    }

    fn samples_foreach(&mut self, callback: &mut SampleCallback<'_>) -> Result<()> {
        let data = self.data.ok_or(Error::InvalidArgs("no data bound"))?;
        let samples = &data[SZ_DIVE..];
        let mut time = 0u32;

        for sample in samples.chunks_exact(SZ_SAMPLE) {
            let pressure = u16_le(&sample[0..]);
            let temperature = sample[2];
            let flags = sample[3];

            callback(Sample::Time(time));
            callback(Sample::Depth(Self::pressure_to_depth(data, pressure)));
            callback(Sample::Temperature(f64::from(temperature)));
            callback(Sample::GasMix(usize::from((flags & 0b0001_1100) >> 2)));
            if flags & 0b1000_0000 != 0 {
                let sp_index = usize::from((flags & 0b0110_0000) >> 5);
                callback(Sample::Setpoint(f64::from(setpoint_cbar(data, sp_index)) / 100.0));
            }
            time += SAMPLE_INTERVAL;
        }
        Ok(())
    }
}
