//! Deepblu Cosmiq+ dive parser.
//!
//! A dive blob is a 256-byte header followed by 4-byte samples at a fixed
//! 20-second interval. Header layout (all little-endian):
//!
//! ```text
//!  0: u16 dive number        12: u16 dive time (minutes)
//!  2: u8  dive type          16: u16 surface pressure (mbar)
//!  3: u8  O2 percentage      22: u16 max depth pressure (mbar)
//!  6: u16 year               24: u16 water temperature (0.1 C)
//!  8: u8  day    9: u8 month
//! 10: u8  minute 11: u8 hour
//! ```
//!
//! Each sample is `u16 temperature (0.1 C)` then `u16 pressure (mbar)`.

use crate::bytes::u16_le;
use crate::error::{Error, Result};
use crate::field_cache::FieldCache;
use crate::parser::{Parser, SampleCallback};
use crate::types::{DiveDateTime, DiveMode, Field, FieldValue, GasMix, Sample};
use chrono::NaiveDate;

const HEADER_SIZE: usize = 256;
const SAMPLE_SIZE: usize = 4;
const SAMPLE_INTERVAL: u32 = 20;

/// Millibar of water column per centimeter of seawater.
const SPECIFIC_WEIGHT: f64 = 1.024 * 0.980665;

/// Standard surface pressure assumed when converting to depth.
const SURFACE_MBAR: u32 = 1013;

fn pressure_to_depth(mbar: u32) -> f64 {
    if mbar < SURFACE_MBAR {
        return 0.0;
    }
    f64::from(mbar - SURFACE_MBAR) / SPECIFIC_WEIGHT / 100.0
}

/// Parser for Deepblu Cosmiq+ dive blobs.
pub struct DeepbluParser<'a> {
    data: Option<&'a [u8]>,
    cache: FieldCache,
}

impl<'a> DeepbluParser<'a> {
    pub fn new() -> Self {
        Self { data: None, cache: FieldCache::new() }
    }
}

impl<'a> Default for DeepbluParser<'a> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a> Parser<'a> for DeepbluParser<'a> {
    fn set_data(&mut self, data: &'a [u8]) -> Result<()> {
        self.cache.clear();
        self.data = None;
        if data.len() < HEADER_SIZE {
            return Err(Error::Io("dive shorter than its header".into()));
        }

        let divetime_min = u16_le(&data[12..]);
        let max_mbar = u16_le(&data[22..]);
        self.cache.set_divetime(60 * u32::from(divetime_min));
        self.cache.set_maxdepth(pressure_to_depth(u32::from(max_mbar)));
        // The Cosmiq+ records a single breathing gas.
        let o2 = f64::from(data[3]) / 100.0;
        if o2 > 0.0 {
            self.cache.set_gasmix(0, GasMix::new(0.0, o2))?;
        }
        self.cache.set_divemode(if data[2] == 3 {
            DiveMode::Freedive
        } else {
            DiveMode::OpenCircuit
        });

        self.data = Some(data);
        Ok(())
    }

    fn datetime(&self) -> Result<DiveDateTime> {
        let data = self.data.ok_or(Error::InvalidArgs("no data bound"))?;
        let year = i32::from(u16_le(&data[6..]));
        let (day, month) = (u32::from(data[8]), u32::from(data[9]));
        let (minute, hour) = (u32::from(data[10]), u32::from(data[11]));
        NaiveDate::from_ymd_opt(year, month, day)
            .and_then(|date| date.and_hms_opt(hour, minute, 0))
            .map(DiveDateTime::local)
            .ok_or_else(|| Error::DataFormat("invalid header datetime".into()))
    }

    fn field(&self, field: Field) -> Result<FieldValue> {
        self.cache.get(field)
    }

    fn samples_foreach(&mut self, callback: &mut SampleCallback<'_>) -> Result<()> {
        let data = self.data.ok_or(Error::InvalidArgs("no data bound"))?;
        let profile = &data[HEADER_SIZE..];

        for (i, sample) in profile.chunks_exact(SAMPLE_SIZE).enumerate() {
            let temperature = u16_le(&sample[0..]);
            let pressure = u16_le(&sample[2..]);

            callback(Sample::Time(i as u32 * SAMPLE_INTERVAL));
            callback(Sample::Depth(pressure_to_depth(u32::from(pressure))));
            callback(Sample::Temperature(f64::from(temperature) / 10.0));
        }
        Ok(())
    }
}
