//! FIT log decoder.
//!
//! FIT is a self-describing record stream: *definition* records install a
//! layout into one of 16 local type slots, and later *data* records tagged
//! with the same slot are decoded against it. Byte order is declared per
//! definition, invalid-value sentinels per base type, and a handful of
//! field numbers (253 timestamp, 254 message index, 250 part index) have a
//! fixed meaning in every message.
//!
//! Fields that belong together on the wire (a gas mix, a deco stop, an
//! event tuple) arrive as separate handler calls; they are aggregated in a
//! pending-record buffer and flushed as one normalized output at each data
//! record boundary.

pub mod messages;
pub mod parser;
pub mod types;

use crate::bytes;
use crate::error::{Error, Result};
use crate::field_cache::FieldCache;
use crate::types::{DecoKind, EventSeverity, GasMix, Sample};
use types::{is_invalid, BaseType, FieldView};

/// Seconds between the FIT epoch (1989-12-31 00:00:00 UTC) and the Unix
/// epoch.
pub const EPOCH_OFFSET: i64 = 631_065_600;

/// Size of the filename fingerprint prepended to every dive blob,
/// terminating NUL included ("2018-08-20-10-23-30.fit").
pub const NAME_SIZE: usize = 24;

const LOCAL_TYPES: usize = 16;
const MAX_FIELDS: usize = 128;
const MAX_SENSORS: usize = 6;

/// Tank pod value of the sensor-profile `sensor_type` field.
const SENSOR_TYPE_TANK_POD: u64 = 28;

// Pending-record flags: which multi-field aggregates have unflushed data.
const PENDING_GASMIX: u32 = 1 << 0;
const PENDING_DECO: u32 = 1 << 1;
const PENDING_EVENT: u32 = 1 << 2;
const PENDING_DEVICE_INFO: u32 = 1 << 3;
const PENDING_DECO_MODEL: u32 = 1 << 4;
const PENDING_SENSOR_PROFILE: u32 = 1 << 5;
const PENDING_TANK_UPDATE: u32 = 1 << 6;
const PENDING_SETPOINT_CHANGE: u32 = 1 << 7;

/// One field of an installed local type.
struct RawField {
    number: u8,
    size: u8,
    base: BaseType,
}

enum MsgRef {
    Known(&'static messages::MessageDesc),
    /// Placeholder for a global message number outside the known set.
    Unknown(u16),
}

/// A local type slot, installed by a definition record.
struct LocalType {
    desc: MsgRef,
    fields: Vec<RawField>,
}

/// GPS fixes collected across SESSION, LAP and RECORD messages, in raw
/// semicircle units.
#[derive(Debug, Default, Clone, Copy)]
pub struct GpsPoints {
    pub session_entry: Option<(i32, i32)>,
    pub session_exit: Option<(i32, i32)>,
    pub session_ne: Option<(i32, i32)>,
    pub session_sw: Option<(i32, i32)>,
    pub lap_entry: Option<(i32, i32)>,
    pub lap_exit: Option<(i32, i32)>,
    pub record: Option<(i32, i32)>,
}

/// Convert a raw semicircle coordinate to degrees.
pub fn semicircles_to_degrees(raw: i32) -> f64 {
    f64::from(raw) * (180.0 / 2_147_483_648.0)
}

#[derive(Debug, Default, Clone, Copy)]
pub struct PendingGasMix {
    pub helium: u8,
    pub oxygen: u8,
    pub status: u8,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct PendingDeco {
    pub depth_mm: u32,
    pub time_s: u32,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct PendingEvent {
    pub event: u8,
    pub event_type: u8,
    pub group: u8,
    pub data: u32,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct PendingDeviceInfo {
    pub index: u8,
    pub firmware: u32,
    pub serial: u32,
    pub product: u32,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct PendingDecoModel {
    pub model: u8,
    pub gf_low: u8,
    pub gf_high: u8,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct PendingSensorProfile {
    pub id: u32,
    pub sensor_type: u8,
    pub rated_pressure: u16,
    pub volume_dl: u16,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct PendingTankUpdate {
    pub sensor: u32,
    pub pressure_cbar: u32,
}

/// Decoder state for one dive, created fresh on every traversal.
#[derive(Default)]
pub struct DiveState {
    /// SESSION start time in FIT epoch seconds; 0 until seen.
    pub dive_start: u32,
    /// File creation time, the datetime fallback.
    pub creation_time: u32,
    /// Timezone offset in seconds, from DEVICE_SETTINGS.
    pub utc_offset: i32,
    pub utc_offset_seen: bool,
    /// Local time offset in seconds, from DEVICE_SETTINGS.
    pub time_offset: i32,
    /// Last emitted sample time, relative seconds.
    pub last_time: u32,
    /// Last absolute timestamp, the compressed-timestamp base.
    pub prev_time: u32,
    /// Byte order of the most recent definition record.
    pub big_endian: bool,
    pub file_type: u8,
    pub product: u32,
    pub firmware: u32,
    pub serial: u32,
    pub sport: u8,
    pub sub_sport: u8,
    pub dive_number: u32,
    /// Message index of the current data record (field 254).
    pub msg_index: u16,
    /// Part index of the current data record (field 250).
    pub part_index: u32,
    /// ANT channel ids of committed tank pods, in tank-index order.
    pub sensors: [u32; MAX_SENSORS],
    pub nsensors: usize,
    pub setpoint_low_cbar: u8,
    pub setpoint_low_depth_mm: u32,
    pub setpoint_high_cbar: u8,
    pub setpoint_high_depth_mm: u32,
    pub water_kind: Option<crate::types::WaterKind>,
    pub gps: GpsPoints,

    pending: u32,
    pub gasmix: PendingGasMix,
    pub deco: PendingDeco,
    pub event: PendingEvent,
    pub device_info: PendingDeviceInfo,
    pub deco_model: PendingDecoModel,
    pub sensor_profile: PendingSensorProfile,
    pub tank_update: PendingTankUpdate,
    pub setpoint_actual_cbar: u8,
}

impl DiveState {
    /// Tank index for a committed sensor id.
    fn tank_index(&self, sensor: u32) -> Option<usize> {
        self.sensors[..self.nsensors].iter().position(|&id| id == sensor)
    }
}

/// Everything a field handler may touch: the field cache, the per-dive
/// state, and the optional sample sink.
pub struct DecodeContext<'c> {
    pub cache: &'c mut FieldCache,
    pub state: DiveState,
    sink: Option<&'c mut dyn FnMut(Sample)>,
}

impl<'c> DecodeContext<'c> {
    fn new(cache: &'c mut FieldCache, sink: Option<&'c mut dyn FnMut(Sample)>) -> Self {
        Self { cache, state: DiveState::default(), sink }
    }

    /// Deliver one sample if a sink is attached.
    pub fn emit(&mut self, sample: Sample) {
        if let Some(sink) = self.sink.as_mut() {
            sink(sample);
        }
    }

    /// Register a full timestamp and emit the corresponding `Time` sample.
    ///
    /// The first timestamp anchors relative time when no SESSION start was
    /// seen yet. A timestamp that would move time backwards is dropped;
    /// `last_time` only advances on successful emission.
    pub fn set_time(&mut self, timestamp: u32) {
        self.state.prev_time = timestamp;
        if self.state.dive_start == 0 {
            self.state.dive_start = timestamp;
        }
        let relative = timestamp.saturating_sub(self.state.dive_start);
        if relative < self.state.last_time {
            log::debug!(
                "dropping out-of-order timestamp {} (at {})",
                relative,
                self.state.last_time
            );
            return;
        }
        self.emit(Sample::Time(relative));
        self.state.last_time = relative;
    }

    pub fn pending_gasmix(&mut self) -> &mut PendingGasMix {
        self.state.pending |= PENDING_GASMIX;
        &mut self.state.gasmix
    }

    pub fn pending_deco(&mut self) -> &mut PendingDeco {
        self.state.pending |= PENDING_DECO;
        &mut self.state.deco
    }

    pub fn pending_event(&mut self) -> &mut PendingEvent {
        self.state.pending |= PENDING_EVENT;
        &mut self.state.event
    }

    pub fn pending_device_info(&mut self) -> &mut PendingDeviceInfo {
        self.state.pending |= PENDING_DEVICE_INFO;
        &mut self.state.device_info
    }

    pub fn pending_deco_model(&mut self) -> &mut PendingDecoModel {
        self.state.pending |= PENDING_DECO_MODEL;
        &mut self.state.deco_model
    }

    pub fn pending_sensor_profile(&mut self) -> &mut PendingSensorProfile {
        self.state.pending |= PENDING_SENSOR_PROFILE;
        &mut self.state.sensor_profile
    }

    pub fn pending_tank_update(&mut self) -> &mut PendingTankUpdate {
        self.state.pending |= PENDING_TANK_UPDATE;
        &mut self.state.tank_update
    }

    pub fn pending_setpoint_change(&mut self, actual_cbar: u8) {
        self.state.pending |= PENDING_SETPOINT_CHANGE;
        self.state.setpoint_actual_cbar = actual_cbar;
    }

    /// Drain every pending aggregate collected from the record that just
    /// ended. Fields within one physical record come out as one normalized
    /// output; nothing leaks into the next record.
    fn flush_pending(&mut self) -> Result<()> {
        let pending = self.state.pending;
        self.state.pending = 0;
        if pending == 0 {
            return Ok(());
        }

        if pending & PENDING_GASMIX != 0 {
            let gas = self.state.gasmix;
            // Status 0 marks a disabled slot; 1 = enabled, 2 = backup. The
            // slot is addressed by the record's message index (field 254).
            if gas.status > 0 {
                let mix =
                    GasMix::new(f64::from(gas.helium) / 100.0, f64::from(gas.oxygen) / 100.0);
                self.cache.set_gasmix(usize::from(self.state.msg_index), mix)?;
            }
            self.state.gasmix = PendingGasMix::default();
        }

        if pending & PENDING_DECO != 0 {
            let deco = self.state.deco;
            self.emit(Sample::Deco {
                kind: DecoKind::DecoStop,
                time: deco.time_s,
                depth: f64::from(deco.depth_mm) / 1000.0,
            });
            self.state.deco = PendingDeco::default();
        }

        if pending & PENDING_EVENT != 0 {
            let event = self.state.event;
            self.flush_event(event);
            self.state.event = PendingEvent::default();
        }

        if pending & PENDING_DEVICE_INFO != 0 {
            let info = self.state.device_info;
            // Index 0 is the dive computer itself; everything else is a
            // connected sensor.
            if info.index == 0 {
                self.state.firmware = info.firmware;
                self.state.serial = info.serial;
                self.state.product = info.product;
            }
            self.state.device_info = PendingDeviceInfo::default();
        }

        if pending & PENDING_DECO_MODEL != 0 {
            let model = self.state.deco_model;
            self.cache.add_string(
                "Deco model",
                format!("Buhlmann ZHL-16C {}/{}", model.gf_low, model.gf_high),
            )?;
            self.state.deco_model = PendingDecoModel::default();
        }

        if pending & PENDING_SENSOR_PROFILE != 0 {
            let profile = self.state.sensor_profile;
            if u64::from(profile.sensor_type) == SENSOR_TYPE_TANK_POD
                && self.state.nsensors < MAX_SENSORS
            {
                let index = self.state.nsensors;
                self.state.sensors[index] = profile.id;
                self.state.nsensors += 1;
                self.cache.set_tank(
                    index,
                    crate::types::Tank {
                        volume: f64::from(profile.volume_dl) / 10.0,
                        work_pressure: f64::from(profile.rated_pressure),
                    },
                )?;
            }
            self.state.sensor_profile = PendingSensorProfile::default();
        }

        if pending & PENDING_TANK_UPDATE != 0 {
            let update = self.state.tank_update;
            match self.state.tank_index(update.sensor) {
                Some(tank) => self.emit(Sample::Pressure {
                    tank,
                    bar: f64::from(update.pressure_cbar) / 100.0,
                }),
                None => log::debug!("tank update for unknown sensor {:#010x}", update.sensor),
            }
            self.state.tank_update = PendingTankUpdate::default();
        }

        if pending & PENDING_SETPOINT_CHANGE != 0 {
            let actual = self.state.setpoint_actual_cbar;
            self.emit(Sample::Setpoint(f64::from(actual) / 100.0));
            self.state.setpoint_actual_cbar = 0;
        }

        Ok(())
    }

    fn flush_event(&mut self, event: PendingEvent) {
        match event.event {
            // Gas switch events carry the new mix index directly.
            57 => self.emit(Sample::GasMix(event.data as usize)),
            kind @ 71 => self.emit(Sample::Event {
                kind,
                name: "Tank pressure reserve",
                severity: EventSeverity::Warning,
            }),
            kind @ 72 => self.emit(Sample::Event {
                kind,
                name: "Tank pressure critical",
                severity: EventSeverity::Alarm,
            }),
            kind @ 73 => self.emit(Sample::Event {
                kind,
                name: "Tank lost",
                severity: EventSeverity::Warning,
            }),
            kind @ 0..=32 => {
                let (name, severity) = messages::EVENT_TABLE[usize::from(kind)];
                self.emit(Sample::Event { kind, name, severity });
                // Setpoint switches also report the new setpoint.
                if kind == 24 {
                    self.emit(Sample::Setpoint(f64::from(self.state.setpoint_low_cbar) / 100.0));
                } else if kind == 25 {
                    self.emit(Sample::Setpoint(
                        f64::from(self.state.setpoint_high_cbar) / 100.0,
                    ));
                }
            }
            other => log::debug!(
                "unhandled event {} (type {}, group {}, data {})",
                other,
                event.event_type,
                event.group,
                event.data
            ),
        }
    }
}

/// Decode one dive blob: 24-byte filename fingerprint, FIT header, record
/// stream, trailing CRC.
///
/// With `sink` absent this primes `cache` only; with a sink it streams
/// samples as well. Returns the final per-dive state.
pub fn decode<'a>(
    data: &[u8],
    cache: &'a mut FieldCache,
    sink: Option<&'a mut dyn FnMut(Sample)>,
) -> Result<DiveState> {
    if data.len() < NAME_SIZE {
        return Err(Error::Io("dive blob shorter than its fingerprint".into()));
    }
    let fit = &data[NAME_SIZE..];

    if fit.len() < 12 {
        return Err(Error::Io("short FIT header".into()));
    }
    let header_size = usize::from(fit[0]);
    if header_size < 12 || fit.len() < header_size {
        return Err(Error::Io(format!("bad FIT header size {header_size}")));
    }
    if &fit[8..12] != b".FIT" {
        return Err(Error::Io("missing .FIT magic".into()));
    }
    let protocol = fit[1];
    let profile = bytes::u16_le(&fit[2..]);
    let data_size = bytes::u32_le(&fit[4..]) as usize;
    log::debug!(
        "FIT protocol {:#04x}, profile {}, {} data bytes",
        protocol,
        profile,
        data_size
    );
    // The two bytes after the data region are the file CRC. It is read as
    // part of the length check and deliberately not verified: devices have
    // been seen to write stale CRCs, and upstream tooling skips it too.
    let Some(total) = header_size.checked_add(data_size).and_then(|n| n.checked_add(2)) else {
        return Err(Error::Io("FIT data size overflow".into()));
    };
    if total > fit.len() {
        return Err(Error::Io(format!(
            "truncated FIT data ({} declared, {} present)",
            total,
            fit.len()
        )));
    }

    let mut ctx = DecodeContext::new(cache, sink);
    let mut local_types: [Option<LocalType>; LOCAL_TYPES] = Default::default();

    let end = header_size + data_size;
    let mut offset = header_size;
    while offset < end {
        let header = fit[offset];
        offset += 1;

        if header & 0x80 != 0 {
            // Compressed timestamp data record: 5-bit delta over the
            // previous full timestamp, 2-bit local type.
            let local = usize::from((header >> 5) & 0x03);
            let delta = u32::from(header & 0x1F);
            let base = ctx.state.prev_time;
            let mut timestamp = (base & !0x1F) | delta;
            if timestamp < base {
                timestamp += 0x20;
            }
            ctx.set_time(timestamp);
            offset = decode_data_record(fit, offset, end, &local_types, local, &mut ctx)?;
            ctx.flush_pending()?;
        } else if header & 0x40 != 0 {
            if header & 0x20 != 0 {
                return Err(Error::Io("developer field definitions not supported".into()));
            }
            let local = usize::from(header & 0x0F);
            offset = decode_definition_record(fit, offset, end, &mut local_types, local, &mut ctx)?;
        } else {
            let local = usize::from(header & 0x0F);
            offset = decode_data_record(fit, offset, end, &local_types, local, &mut ctx)?;
            ctx.flush_pending()?;
        }
    }

    Ok(ctx.state)
}

fn decode_definition_record(
    fit: &[u8],
    mut offset: usize,
    end: usize,
    local_types: &mut [Option<LocalType>; LOCAL_TYPES],
    local: usize,
    ctx: &mut DecodeContext<'_>,
) -> Result<usize> {
    if offset + 5 > end {
        return Err(Error::Io("truncated definition record".into()));
    }
    let _reserved = fit[offset];
    let big_endian = fit[offset + 1] != 0;
    ctx.state.big_endian = big_endian;
    let global = if big_endian {
        bytes::u16_be(&fit[offset + 2..])
    } else {
        bytes::u16_le(&fit[offset + 2..])
    };
    let field_count = usize::from(fit[offset + 4]);
    offset += 5;
    if field_count > MAX_FIELDS {
        return Err(Error::Io(format!("absurd field count {field_count}")));
    }
    if offset + field_count * 3 > end {
        return Err(Error::Io("truncated definition field list".into()));
    }

    let mut fields = Vec::with_capacity(field_count);
    for _ in 0..field_count {
        let number = fit[offset];
        let size = fit[offset + 1];
        let code = fit[offset + 2];
        offset += 3;
        let base = BaseType::from_code(code)
            .ok_or_else(|| Error::Io(format!("unknown base type {code:#04x}")))?;
        fields.push(RawField { number, size, base });
    }

    let desc = match messages::descriptor(global) {
        Some(desc) => {
            log::debug!("definition: local {} = {} ({} fields)", local, desc.name, field_count);
            MsgRef::Known(desc)
        }
        None => {
            log::debug!("definition: local {} = msg-{} ({} fields)", local, global, field_count);
            MsgRef::Unknown(global)
        }
    };
    local_types[local] = Some(LocalType { desc, fields });
    Ok(offset)
}

fn decode_data_record(
    fit: &[u8],
    mut offset: usize,
    end: usize,
    local_types: &[Option<LocalType>; LOCAL_TYPES],
    local: usize,
    ctx: &mut DecodeContext<'_>,
) -> Result<usize> {
    let local_type = local_types[local]
        .as_ref()
        .ok_or_else(|| Error::Io(format!("data record for undefined local type {local}")))?;

    let big_endian = ctx.state.big_endian;

    // First pass: validate the field layout and register the record's
    // timestamp (field 253), wherever the definition placed it. The Time
    // sample must precede every value sample of the record, and handlers
    // emit as they decode.
    let mut scan = offset;
    for field in &local_type.fields {
        let size = usize::from(field.size);
        if scan + size > end {
            return Err(Error::Io("truncated data record".into()));
        }
        if size == 0 || size % field.base.size() != 0 {
            return Err(Error::Io(format!(
                "field size {} not a multiple of {} ({})",
                size,
                field.base.size(),
                field.base.name()
            )));
        }
        let raw = &fit[scan..scan + size];
        scan += size;
        if field.number == 253 && !is_invalid(raw, field.base, big_endian) {
            let view = FieldView { raw, base: field.base, big_endian };
            ctx.set_time(view.uint() as u32);
        }
    }

    // Second pass: dispatch the remaining fields in definition order.
    for field in &local_type.fields {
        let size = usize::from(field.size);
        let raw = &fit[offset..offset + size];
        offset += size;

        if field.number == 253 || is_invalid(raw, field.base, big_endian) {
            continue;
        }
        let view = FieldView { raw, base: field.base, big_endian };

        // Field numbers with a fixed cross-message meaning.
        match field.number {
            254 => {
                ctx.state.msg_index = view.uint() as u16;
                continue;
            }
            250 => {
                ctx.state.part_index = view.uint() as u32;
                continue;
            }
            _ => {}
        }

        match &local_type.desc {
            MsgRef::Known(desc) => match desc.field(field.number) {
                Some(spec) => (spec.handler)(ctx, &view)?,
                None => log::debug!(
                    "{}: unknown field {} ({}, {} bytes)",
                    desc.name,
                    field.number,
                    field.base.name(),
                    size
                ),
            },
            MsgRef::Unknown(global) => {
                log::debug!(
                    "msg-{}: field {} ({}, {} bytes) skipped",
                    global,
                    field.number,
                    field.base.name(),
                    size
                );
            }
        }
    }

    Ok(offset)
}
