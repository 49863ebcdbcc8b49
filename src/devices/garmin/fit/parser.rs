//! Garmin FIT parser: the [`Parser`] implementation over one dive blob.
//!
//! `set_data` runs the decoder once without a sample sink to prime the
//! field cache; `samples_foreach` replays the same decode with a sink
//! attached. Both passes share the traversal in [`super::decode`].

use super::{decode, semicircles_to_degrees, DiveState, EPOCH_OFFSET, NAME_SIZE};
use crate::error::{Error, Result};
use crate::field_cache::FieldCache;
use crate::parser::{Parser, SampleCallback};
use crate::types::{DiveDateTime, Field, FieldValue};
use chrono::{DateTime, NaiveDate, NaiveDateTime};

/// Sub-sport codes the Descent uses for actual dives.
fn is_dive_sub_sport(sub_sport: u8) -> bool {
    matches!(sub_sport, 53..=57 | 63)
}

/// Parser for Garmin Descent FIT activity files.
///
/// The bound data is the file contents prefixed with the 24-byte filename
/// fingerprint the device enumeration produced; the decoder skips the
/// prefix, and `datetime` falls back to parsing it when the log itself
/// carries no usable clock.
pub struct GarminParser<'a> {
    data: Option<&'a [u8]>,
    cache: FieldCache,
    state: DiveState,
}

impl<'a> GarminParser<'a> {
    pub fn new() -> Self {
        Self { data: None, cache: FieldCache::new(), state: DiveState::default() }
    }

    /// Whether the bound activity is a dive at all. The watch logs runs and
    /// rides into the same directory; those carry non-dive sub-sports.
    pub fn is_dive(&self) -> bool {
        is_dive_sub_sport(self.state.sub_sport)
    }

    /// `(product, firmware, serial)` of the recording device, for device
    /// info events. Zero until `set_data` has seen DEVICE_INFO or FILE.
    pub fn device_info(&self) -> (u32, u32, u32) {
        (self.state.product, self.state.firmware, self.state.serial)
    }

    /// Parse "YYYY-MM-DD-HH-MM-SS" out of the fingerprint prefix.
    fn datetime_from_name(name: &[u8]) -> Option<NaiveDateTime> {
        let text = std::str::from_utf8(name.get(..19)?).ok()?;
        let mut parts = text.split('-').map(|p| p.parse::<u32>().ok());
        let mut next = || parts.next().flatten();
        let (year, month, day) = (next()?, next()?, next()?);
        let (hour, minute, second) = (next()?, next()?, next()?);
        NaiveDate::from_ymd_opt(year as i32, month, day)?.and_hms_opt(hour, minute, second)
    }

    fn finish(&mut self) -> Result<()> {
        // A FIT log enumerates its gas slots; none seen means zero mixes,
        // not an unsupported field.
        self.cache.mark_gasmixes_known();
        // Surface the most representative GPS fix as a string field:
        // the entry point if the session recorded one, else the first
        // positioned sample.
        let gps = self.state.gps;
        let fix = gps.session_entry.or(gps.lap_entry).or(gps.record);
        if let Some((lat, lon)) = fix {
            self.cache.add_string(
                "GPS",
                format!(
                    "{:.7}, {:.7}",
                    semicircles_to_degrees(lat),
                    semicircles_to_degrees(lon)
                ),
            )?;
        }
        if self.state.serial != 0 {
            self.cache.add_string("Serial", format!("{}", self.state.serial))?;
        }
        if self.state.firmware != 0 {
            self.cache.add_string(
                "FW Version",
                format!("{:.2}", f64::from(self.state.firmware) / 100.0),
            )?;
        }
        if self.state.dive_number != 0 {
            self.cache.add_string("Dive number", format!("{}", self.state.dive_number))?;
        }
        Ok(())
    }
}

impl<'a> Default for GarminParser<'a> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a> Parser<'a> for GarminParser<'a> {
    fn set_data(&mut self, data: &'a [u8]) -> Result<()> {
        self.cache.clear();
        self.state = DiveState::default();
        self.data = None;
        match decode(data, &mut self.cache, None) {
            Ok(state) => {
                self.state = state;
                self.data = Some(data);
                self.finish()
            }
            Err(err) => {
                // Leave the parser in the defined empty state.
                self.cache.clear();
                self.state = DiveState::default();
                Err(err)
            }
        }
    }

    fn datetime(&self) -> Result<DiveDateTime> {
        let data = self.data.ok_or(Error::InvalidArgs("no data bound"))?;

        let timestamp = if self.state.dive_start != 0 {
            self.state.dive_start
        } else {
            self.state.creation_time
        };
        if timestamp != 0 {
            let utc_offset =
                if self.state.utc_offset_seen { Some(self.state.utc_offset) } else { None };
            let unix = EPOCH_OFFSET + i64::from(timestamp) + i64::from(utc_offset.unwrap_or(0));
            let datetime = DateTime::from_timestamp(unix, 0)
                .ok_or_else(|| Error::DataFormat("timestamp out of range".into()))?
                .naive_utc();
            return Ok(DiveDateTime { datetime, utc_offset });
        }

        // An empty log still has the timestamped filename.
        Self::datetime_from_name(&data[..NAME_SIZE.min(data.len())])
            .map(DiveDateTime::local)
            .ok_or(Error::Unsupported("no datetime in dive"))
    }

    fn field(&self, field: Field) -> Result<FieldValue> {
        self.cache.get(field)
    }

    fn samples_foreach(&mut self, callback: &mut SampleCallback<'_>) -> Result<()> {
        let data = self.data.ok_or(Error::InvalidArgs("no data bound"))?;
        // Replay into a scratch cache so the primed field cache stays
        // untouched by the second pass.
        let mut scratch = FieldCache::new();
        decode(data, &mut scratch, Some(callback))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_datetime_from_fingerprint_name() {
        let parsed = GarminParser::datetime_from_name(b"2020-01-02-03-04-05.fit\0").unwrap();
        assert_eq!(
            parsed,
            NaiveDate::from_ymd_opt(2020, 1, 2).unwrap().and_hms_opt(3, 4, 5).unwrap()
        );
        assert!(GarminParser::datetime_from_name(b"not-a-timestamp-name\0\0\0\0").is_none());
        assert!(GarminParser::datetime_from_name(b"2020-13-02-03-04-05.fit\0").is_none());
    }

    #[test]
    fn test_dive_sub_sports() {
        for code in [53, 54, 55, 56, 57, 63] {
            assert!(is_dive_sub_sport(code));
        }
        for code in [0, 1, 52, 58, 62, 64] {
            assert!(!is_dive_sub_sport(code));
        }
    }
}
