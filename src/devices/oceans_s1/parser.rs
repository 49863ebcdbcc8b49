//! Oceans S1 dive parser.
//!
//! A dive log is ASCII lines:
//!
//! ```text
//! dive 1,0,21,1591372057          number, mode, O2%, unix start time
//! 312,22,0                        depth cm, temperature C, flags hex
//! continue 450,120                depth before pause, surface seconds
//! enddive 3131,496                max depth cm, duration seconds
//! ```
//!
//! Samples run on a fixed 10-second grid. A `continue` line marks a surface
//! pause: one surface sample is emitted where the log stopped and another
//! after the surface interval, so the profile shows the gap instead of
//! splicing the halves together.

use crate::error::{Error, Result};
use crate::field_cache::FieldCache;
use crate::parser::{Parser, SampleCallback};
use crate::types::{DiveDateTime, DiveMode, Field, FieldValue, GasMix, Sample};
use chrono::DateTime;

const SAMPLE_INTERVAL: u32 = 10;

/// Parsed `dive` header line.
struct DiveHeader {
    mode: u32,
    o2_percent: u32,
    start_epoch: i64,
}

fn numbers_of(rest: &str) -> impl Iterator<Item = Option<i64>> + '_ {
    rest.split(',').map(|field| field.trim().parse::<i64>().ok())
}

fn parse_dive_header(rest: &str) -> Result<DiveHeader> {
    let mut fields = numbers_of(rest);
    let mut next =
        || fields.next().flatten().ok_or_else(|| Error::DataFormat(format!("bad dive line: {rest}")));
    let _number = next()?;
    let mode = next()? as u32;
    let o2_percent = next()? as u32;
    let start_epoch = next()?;
    Ok(DiveHeader { mode, o2_percent, start_epoch })
}

/// Parser for Oceans S1 dive logs.
pub struct OceansS1Parser<'a> {
    text: Option<&'a [u8]>,
    cache: FieldCache,
    start_epoch: Option<i64>,
}

impl<'a> OceansS1Parser<'a> {
    pub fn new() -> Self {
        Self { text: None, cache: FieldCache::new(), start_epoch: None }
    }

    /// Walk every line once, priming the cache and optionally emitting
    /// samples.
    fn walk(&mut self, data: &'a [u8], mut sink: Option<&mut SampleCallback<'_>>) -> Result<()> {
        let text = std::str::from_utf8(data)
            .map_err(|_| Error::DataFormat("dive log is not ASCII".into()))?;
        let mut time = 0u32;
        let mut emit = |sample: Sample, sink: &mut Option<&mut SampleCallback<'_>>| {
            if let Some(callback) = sink.as_mut() {
                callback(sample);
            }
        };

        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() || line == "endlog" || line.starts_with("divelog") {
                continue;
            }
            if let Some(rest) = line.strip_prefix("dive ") {
                let header = parse_dive_header(rest)?;
                self.start_epoch = Some(header.start_epoch);
                if header.o2_percent > 0 {
                    self.cache
                        .set_gasmix(0, GasMix::new(0.0, f64::from(header.o2_percent) / 100.0))?;
                }
                self.cache.set_divemode(match header.mode {
                    1 => DiveMode::Gauge,
                    2 => DiveMode::Freedive,
                    _ => DiveMode::OpenCircuit,
                });
                continue;
            }
            if let Some(rest) = line.strip_prefix("continue ") {
                let mut fields = numbers_of(rest);
                let _bottom_depth_cm = fields.next().flatten();
                let surface_seconds = fields.next().flatten().unwrap_or(0).max(0) as u32;
                // Bracket the surface interval with surface samples.
                emit(Sample::Time(time), &mut sink);
                emit(Sample::Depth(0.0), &mut sink);
                time += surface_seconds;
                emit(Sample::Time(time), &mut sink);
                emit(Sample::Depth(0.0), &mut sink);
                continue;
            }
            if let Some(rest) = line.strip_prefix("enddive ") {
                let mut fields = numbers_of(rest);
                let max_depth_cm = fields.next().flatten().unwrap_or(0).max(0);
                let duration = fields.next().flatten().unwrap_or(0).max(0);
                self.cache.set_maxdepth(max_depth_cm as f64 / 100.0);
                self.cache.set_divetime(duration as u32);
                continue;
            }

            // Anything else is a sample line.
            let mut fields = numbers_of(line);
            let depth_cm = fields.next().flatten();
            let temperature = fields.next().flatten();
            let Some(depth_cm) = depth_cm else {
                log::debug!("skipping unrecognized line: {line}");
                continue;
            };
            emit(Sample::Time(time), &mut sink);
            emit(Sample::Depth(depth_cm.max(0) as f64 / 100.0), &mut sink);
            if let Some(temperature) = temperature {
                emit(Sample::Temperature(temperature as f64), &mut sink);
            }
            time += SAMPLE_INTERVAL;
        }
        Ok(())
    }
}

impl<'a> Default for OceansS1Parser<'a> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a> Parser<'a> for OceansS1Parser<'a> {
    fn set_data(&mut self, data: &'a [u8]) -> Result<()> {
        self.cache.clear();
        self.start_epoch = None;
        self.text = None;
        match self.walk(data, None) {
            Ok(()) => {
                self.text = Some(data);
                Ok(())
            }
            Err(err) => {
                self.cache.clear();
                self.start_epoch = None;
                Err(err)
            }
        }
    }

    fn datetime(&self) -> Result<DiveDateTime> {
        let epoch = self.start_epoch.ok_or(Error::Unsupported("no datetime in dive"))?;
        DateTime::from_timestamp(epoch, 0)
            .map(|dt| DiveDateTime::local(dt.naive_utc()))
            .ok_or_else(|| Error::DataFormat("start time out of range".into()))
    }

    fn field(&self, field: Field) -> Result<FieldValue> {
        self.cache.get(field)
    }

    fn samples_foreach(&mut self, callback: &mut SampleCallback<'_>) -> Result<()> {
        let data = self.text.ok_or(Error::InvalidArgs("no data bound"))?;
        let mut scratch = OceansS1Parser::new();
        scratch.walk(data, Some(callback))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LOG: &str = "dive 1,0,21,1591372057\n100,22,0\n450,21,0\ncontinue 450,120\n200,21,0\nenddive 3131,496\nendlog\n";

    #[test]
    fn test_summary_fields() {
        let mut parser = OceansS1Parser::new();
        parser.set_data(LOG.as_bytes()).unwrap();
        assert_eq!(parser.field(Field::DiveTime).unwrap(), FieldValue::DiveTime(496));
        assert_eq!(parser.field(Field::MaxDepth).unwrap(), FieldValue::Depth(31.31));
        assert_eq!(
            parser.field(Field::GasMix(0)).unwrap(),
            FieldValue::Mix(GasMix::new(0.0, 0.21))
        );
        assert_eq!(
            parser.field(Field::DiveMode).unwrap(),
            FieldValue::Mode(DiveMode::OpenCircuit)
        );
        let datetime = parser.datetime().unwrap();
        assert_eq!(datetime.datetime.and_utc().timestamp(), 1591372057);
    }

    #[test]
    fn test_surface_interval_injection() {
        let mut parser = OceansS1Parser::new();
        parser.set_data(LOG.as_bytes()).unwrap();
        let mut samples = Vec::new();
        parser.samples_foreach(&mut |sample| samples.push(sample)).unwrap();

        let times: Vec<u32> = samples
            .iter()
            .filter_map(|s| match s {
                Sample::Time(t) => Some(*t),
                _ => None,
            })
            .collect();
        // Two 10 s samples, the surface pair bracketing 120 s, one more
        // sample after the pause.
        assert_eq!(times, vec![0, 10, 20, 140, 140]);
        // The pause is flat at the surface.
        assert_eq!(samples[7], Sample::Depth(0.0));
        assert_eq!(samples[9], Sample::Depth(0.0));
    }

    #[test]
    fn test_times_never_decrease() {
        let mut parser = OceansS1Parser::new();
        parser.set_data(LOG.as_bytes()).unwrap();
        let mut last = 0;
        parser
            .samples_foreach(&mut |sample| {
                if let Sample::Time(t) = sample {
                    assert!(t >= last);
                    last = t;
                }
            })
            .unwrap();
    }

    #[test]
    fn test_non_ascii_input_is_rejected() {
        let mut parser = OceansS1Parser::new();
        assert!(parser.set_data(&[0xFF, 0xFE, 0x01]).is_err());
        assert!(parser.field(Field::DiveTime).is_err());
    }
}
