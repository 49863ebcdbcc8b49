//! Known-message table: global message numbers, field numbers, handlers.
//!
//! The table is data-driven: one static [`MessageDesc`] per known global
//! message, each with a sparse list of [`FieldSpec`] entries mapping field
//! numbers to small handler functions over `(context, field)`. Handlers
//! receive raw bytes already checked against the base type's invalid
//! sentinel and never touch byte order themselves.
//!
//! Fields listed with the [`ignore`] handler are recognized on the wire but
//! carry nothing this library normalizes; keeping them in the table
//! distinguishes "known, uninteresting" from "unknown field" diagnostics.

use super::types::{BaseType, FieldView};
use super::DecodeContext;
use crate::error::Result;
use crate::types::{DecoKind, DiveMode, EventSeverity, Salinity, Sample, WaterKind};

pub type Handler = fn(&mut DecodeContext<'_>, &FieldView<'_>) -> Result<()>;

pub struct FieldSpec {
    pub number: u8,
    pub name: &'static str,
    /// Base type the profile declares; mismatches are tolerated but logged.
    pub base: BaseType,
    pub handler: Handler,
}

pub struct MessageDesc {
    pub name: &'static str,
    pub fields: &'static [FieldSpec],
}

impl MessageDesc {
    pub fn field(&self, number: u8) -> Option<&'static FieldSpec> {
        self.fields.iter().find(|field| field.number == number)
    }
}

/// Look up the static descriptor for a global message number.
pub fn descriptor(global: u16) -> Option<&'static MessageDesc> {
    match global {
        0 => Some(&FILE),
        2 => Some(&DEVICE_SETTINGS),
        12 => Some(&SPORT),
        18 => Some(&SESSION),
        19 => Some(&LAP),
        20 => Some(&RECORD),
        21 => Some(&EVENT),
        23 => Some(&DEVICE_INFO),
        147 => Some(&SENSOR_PROFILE),
        258 => Some(&DIVE_SETTINGS),
        259 => Some(&DIVE_GAS),
        268 => Some(&DIVE_SUMMARY),
        319 => Some(&TANK_UPDATE),
        323 => Some(&TANK_SUMMARY),
        _ => None,
    }
}

/// Dive alert names and severities, indexed by event code 0..=32.
/// Codes 24 and 25 additionally surface the switched-to setpoint.
pub const EVENT_TABLE: [(&str, EventSeverity); 33] = [
    ("Deco required", EventSeverity::Warning),
    ("Gas switch prompted", EventSeverity::Info),
    ("Near surface", EventSeverity::State),
    ("Approaching NDL", EventSeverity::Warning),
    ("ppO2 warning", EventSeverity::Warning),
    ("ppO2 critical high", EventSeverity::Alarm),
    ("ppO2 critical low", EventSeverity::Alarm),
    ("Time alert", EventSeverity::Info),
    ("Depth alert", EventSeverity::Info),
    ("Deco ceiling broken", EventSeverity::Alarm),
    ("Deco stop completed", EventSeverity::State),
    ("Safety stop ceiling broken", EventSeverity::Warning),
    ("Safety stop completed", EventSeverity::State),
    ("CNS warning", EventSeverity::Warning),
    ("CNS critical", EventSeverity::Alarm),
    ("OTU warning", EventSeverity::Warning),
    ("OTU critical", EventSeverity::Alarm),
    ("Max depth exceeded", EventSeverity::Warning),
    ("Dive time alert", EventSeverity::Info),
    ("Dive time active", EventSeverity::State),
    ("Gas switched", EventSeverity::Info),
    ("Gas start", EventSeverity::State),
    ("Gas end", EventSeverity::State),
    ("Mission complete", EventSeverity::State),
    ("Setpoint switched (low)", EventSeverity::Info),
    ("Setpoint switched (high)", EventSeverity::Info),
    ("Setpoint switched manually (low)", EventSeverity::Info),
    ("Setpoint switched manually (high)", EventSeverity::Info),
    ("Auto setpoint switch disabled", EventSeverity::State),
    ("Switched to open circuit", EventSeverity::State),
    ("Switched to closed circuit", EventSeverity::State),
    ("Tank battery low", EventSeverity::Warning),
    ("Tank pod connected", EventSeverity::Info),
];

/// Recognized field with nothing to normalize.
fn ignore(_ctx: &mut DecodeContext<'_>, _view: &FieldView<'_>) -> Result<()> {
    Ok(())
}

// ============================================================================
// FILE (0)
// ============================================================================

fn file_type(ctx: &mut DecodeContext<'_>, view: &FieldView<'_>) -> Result<()> {
    ctx.state.file_type = view.uint() as u8;
    Ok(())
}

fn file_product(ctx: &mut DecodeContext<'_>, view: &FieldView<'_>) -> Result<()> {
    if ctx.state.product == 0 {
        ctx.state.product = view.uint() as u32;
    }
    Ok(())
}

fn file_serial(ctx: &mut DecodeContext<'_>, view: &FieldView<'_>) -> Result<()> {
    if ctx.state.serial == 0 {
        ctx.state.serial = view.uint() as u32;
    }
    Ok(())
}

fn file_creation_time(ctx: &mut DecodeContext<'_>, view: &FieldView<'_>) -> Result<()> {
    ctx.state.creation_time = view.uint() as u32;
    Ok(())
}

static FILE: MessageDesc = MessageDesc {
    name: "FILE",
    fields: &[
        FieldSpec { number: 0, name: "file_type", base: BaseType::Enum, handler: file_type },
        FieldSpec { number: 1, name: "manufacturer", base: BaseType::Uint16, handler: ignore },
        FieldSpec { number: 2, name: "product", base: BaseType::Uint16, handler: file_product },
        FieldSpec { number: 3, name: "serial", base: BaseType::Uint32z, handler: file_serial },
        FieldSpec {
            number: 4,
            name: "creation_time",
            base: BaseType::Uint32,
            handler: file_creation_time,
        },
        FieldSpec { number: 5, name: "number", base: BaseType::Uint16, handler: ignore },
        FieldSpec { number: 7, name: "other_time", base: BaseType::Uint32, handler: ignore },
    ],
};

// ============================================================================
// DEVICE_SETTINGS (2)
// ============================================================================

fn utc_offset(ctx: &mut DecodeContext<'_>, view: &FieldView<'_>) -> Result<()> {
    ctx.state.utc_offset = view.uint() as i32;
    ctx.state.utc_offset_seen = true;
    Ok(())
}

fn time_offset(ctx: &mut DecodeContext<'_>, view: &FieldView<'_>) -> Result<()> {
    ctx.state.time_offset = view.uint() as i32;
    Ok(())
}

static DEVICE_SETTINGS: MessageDesc = MessageDesc {
    name: "DEVICE_SETTINGS",
    fields: &[
        FieldSpec { number: 1, name: "utc_offset", base: BaseType::Uint32, handler: utc_offset },
        FieldSpec { number: 2, name: "time_offset", base: BaseType::Uint32, handler: time_offset },
    ],
};

// ============================================================================
// SPORT (12)
// ============================================================================

fn sport(ctx: &mut DecodeContext<'_>, view: &FieldView<'_>) -> Result<()> {
    ctx.state.sport = view.uint() as u8;
    Ok(())
}

fn sub_sport(ctx: &mut DecodeContext<'_>, view: &FieldView<'_>) -> Result<()> {
    let value = view.uint() as u8;
    ctx.state.sub_sport = value;
    let mode = match value {
        53 | 54 => DiveMode::OpenCircuit,
        55 => DiveMode::Gauge,
        56 | 57 => DiveMode::Freedive,
        63 => DiveMode::ClosedCircuit,
        _ => DiveMode::OpenCircuit,
    };
    ctx.cache.set_divemode(mode);
    Ok(())
}

static SPORT: MessageDesc = MessageDesc {
    name: "SPORT",
    fields: &[
        FieldSpec { number: 0, name: "sport", base: BaseType::Enum, handler: sport },
        FieldSpec { number: 1, name: "sub_sport", base: BaseType::Enum, handler: sub_sport },
    ],
};

// ============================================================================
// SESSION (18)
// ============================================================================

fn session_start_time(ctx: &mut DecodeContext<'_>, view: &FieldView<'_>) -> Result<()> {
    // The first session start anchors all relative sample times.
    if ctx.state.dive_start == 0 {
        ctx.state.dive_start = view.uint() as u32;
    }
    Ok(())
}

macro_rules! gps_handler {
    ($name:ident, $point:ident, $slot:tt) => {
        fn $name(ctx: &mut DecodeContext<'_>, view: &FieldView<'_>) -> Result<()> {
            let value = view.int() as i32;
            let point = ctx.state.gps.$point.get_or_insert((0, 0));
            point.$slot = value;
            Ok(())
        }
    };
}

gps_handler!(session_entry_lat, session_entry, 0);
gps_handler!(session_entry_lon, session_entry, 1);
gps_handler!(session_ne_lat, session_ne, 0);
gps_handler!(session_ne_lon, session_ne, 1);
gps_handler!(session_sw_lat, session_sw, 0);
gps_handler!(session_sw_lon, session_sw, 1);
gps_handler!(session_exit_lat, session_exit, 0);
gps_handler!(session_exit_lon, session_exit, 1);
gps_handler!(lap_entry_lat, lap_entry, 0);
gps_handler!(lap_entry_lon, lap_entry, 1);
gps_handler!(lap_exit_lat, lap_exit, 0);
gps_handler!(lap_exit_lon, lap_exit, 1);
gps_handler!(record_lat, record, 0);
gps_handler!(record_lon, record, 1);

static SESSION: MessageDesc = MessageDesc {
    name: "SESSION",
    fields: &[
        FieldSpec {
            number: 2,
            name: "start_time",
            base: BaseType::Uint32,
            handler: session_start_time,
        },
        FieldSpec {
            number: 3,
            name: "start_position_lat",
            base: BaseType::Sint32,
            handler: session_entry_lat,
        },
        FieldSpec {
            number: 4,
            name: "start_position_long",
            base: BaseType::Sint32,
            handler: session_entry_lon,
        },
        FieldSpec { number: 29, name: "nec_lat", base: BaseType::Sint32, handler: session_ne_lat },
        FieldSpec { number: 30, name: "nec_long", base: BaseType::Sint32, handler: session_ne_lon },
        FieldSpec { number: 31, name: "swc_lat", base: BaseType::Sint32, handler: session_sw_lat },
        FieldSpec { number: 32, name: "swc_long", base: BaseType::Sint32, handler: session_sw_lon },
        FieldSpec {
            number: 38,
            name: "exit_position_lat",
            base: BaseType::Sint32,
            handler: session_exit_lat,
        },
        FieldSpec {
            number: 39,
            name: "exit_position_long",
            base: BaseType::Sint32,
            handler: session_exit_lon,
        },
    ],
};

static LAP: MessageDesc = MessageDesc {
    name: "LAP",
    fields: &[
        FieldSpec {
            number: 3,
            name: "start_position_lat",
            base: BaseType::Sint32,
            handler: lap_entry_lat,
        },
        FieldSpec {
            number: 4,
            name: "start_position_long",
            base: BaseType::Sint32,
            handler: lap_entry_lon,
        },
        FieldSpec {
            number: 5,
            name: "end_position_lat",
            base: BaseType::Sint32,
            handler: lap_exit_lat,
        },
        FieldSpec {
            number: 6,
            name: "end_position_long",
            base: BaseType::Sint32,
            handler: lap_exit_lon,
        },
    ],
};

// ============================================================================
// RECORD (20)
// ============================================================================

fn record_heart_rate(ctx: &mut DecodeContext<'_>, view: &FieldView<'_>) -> Result<()> {
    ctx.emit(Sample::Heartbeat(view.uint() as u32));
    Ok(())
}

fn record_temperature(ctx: &mut DecodeContext<'_>, view: &FieldView<'_>) -> Result<()> {
    ctx.emit(Sample::Temperature(view.int() as f64));
    Ok(())
}

fn record_depth(ctx: &mut DecodeContext<'_>, view: &FieldView<'_>) -> Result<()> {
    ctx.emit(Sample::Depth(view.uint() as f64 / 1000.0));
    Ok(())
}

fn record_next_stop_depth(ctx: &mut DecodeContext<'_>, view: &FieldView<'_>) -> Result<()> {
    let value = view.uint() as u32;
    ctx.pending_deco().depth_mm = value;
    Ok(())
}

fn record_next_stop_time(ctx: &mut DecodeContext<'_>, view: &FieldView<'_>) -> Result<()> {
    let value = view.uint() as u32;
    ctx.pending_deco().time_s = value;
    Ok(())
}

fn record_tts(ctx: &mut DecodeContext<'_>, view: &FieldView<'_>) -> Result<()> {
    ctx.emit(Sample::Tts(view.uint() as u32));
    Ok(())
}

fn record_ndl(ctx: &mut DecodeContext<'_>, view: &FieldView<'_>) -> Result<()> {
    ctx.emit(Sample::Deco { kind: DecoKind::Ndl, time: view.uint() as u32, depth: 0.0 });
    Ok(())
}

fn record_cns_load(ctx: &mut DecodeContext<'_>, view: &FieldView<'_>) -> Result<()> {
    ctx.emit(Sample::Cns(view.uint() as f64 / 100.0));
    Ok(())
}

fn record_air_time(ctx: &mut DecodeContext<'_>, view: &FieldView<'_>) -> Result<()> {
    // Remaining air time arrives in seconds; RBT is reported in minutes.
    ctx.emit(Sample::Rbt(view.uint() as u32 / 60));
    Ok(())
}

static RECORD: MessageDesc = MessageDesc {
    name: "RECORD",
    fields: &[
        FieldSpec { number: 0, name: "position_lat", base: BaseType::Sint32, handler: record_lat },
        FieldSpec { number: 1, name: "position_long", base: BaseType::Sint32, handler: record_lon },
        FieldSpec { number: 2, name: "altitude", base: BaseType::Uint16, handler: ignore },
        FieldSpec {
            number: 3,
            name: "heart_rate",
            base: BaseType::Uint8,
            handler: record_heart_rate,
        },
        FieldSpec { number: 5, name: "distance", base: BaseType::Uint32, handler: ignore },
        FieldSpec {
            number: 13,
            name: "temperature",
            base: BaseType::Sint8,
            handler: record_temperature,
        },
        FieldSpec { number: 91, name: "abs_pressure", base: BaseType::Uint32, handler: ignore },
        FieldSpec { number: 92, name: "depth", base: BaseType::Uint32, handler: record_depth },
        FieldSpec {
            number: 93,
            name: "next_stop_depth",
            base: BaseType::Uint32,
            handler: record_next_stop_depth,
        },
        FieldSpec {
            number: 94,
            name: "next_stop_time",
            base: BaseType::Uint32,
            handler: record_next_stop_time,
        },
        FieldSpec { number: 95, name: "time_to_surface", base: BaseType::Uint32, handler: record_tts },
        FieldSpec { number: 96, name: "ndl_time", base: BaseType::Uint32, handler: record_ndl },
        FieldSpec { number: 97, name: "cns_load", base: BaseType::Uint8, handler: record_cns_load },
        FieldSpec { number: 98, name: "n2_load", base: BaseType::Uint16, handler: ignore },
        FieldSpec {
            number: 123,
            name: "air_time_remaining",
            base: BaseType::Uint32,
            handler: record_air_time,
        },
        FieldSpec { number: 124, name: "pressure_sac", base: BaseType::Uint16, handler: ignore },
        FieldSpec { number: 125, name: "volume_sac", base: BaseType::Uint16, handler: ignore },
        FieldSpec { number: 126, name: "rmv", base: BaseType::Uint16, handler: ignore },
        FieldSpec { number: 127, name: "ascent_rate", base: BaseType::Sint32, handler: ignore },
    ],
};

// ============================================================================
// EVENT (21)
// ============================================================================

fn event_code(ctx: &mut DecodeContext<'_>, view: &FieldView<'_>) -> Result<()> {
    let value = view.uint() as u8;
    ctx.pending_event().event = value;
    Ok(())
}

fn event_type(ctx: &mut DecodeContext<'_>, view: &FieldView<'_>) -> Result<()> {
    let value = view.uint() as u8;
    ctx.pending_event().event_type = value;
    Ok(())
}

fn event_data(ctx: &mut DecodeContext<'_>, view: &FieldView<'_>) -> Result<()> {
    let value = view.uint() as u32;
    ctx.pending_event().data = value;
    Ok(())
}

fn event_group(ctx: &mut DecodeContext<'_>, view: &FieldView<'_>) -> Result<()> {
    let value = view.uint() as u8;
    ctx.pending_event().group = value;
    Ok(())
}

static EVENT: MessageDesc = MessageDesc {
    name: "EVENT",
    fields: &[
        FieldSpec { number: 0, name: "event", base: BaseType::Enum, handler: event_code },
        FieldSpec { number: 1, name: "event_type", base: BaseType::Enum, handler: event_type },
        FieldSpec { number: 2, name: "unknown", base: BaseType::Uint16, handler: ignore },
        FieldSpec { number: 3, name: "data", base: BaseType::Uint32, handler: event_data },
        FieldSpec { number: 4, name: "event_group", base: BaseType::Uint8, handler: event_group },
    ],
};

// ============================================================================
// DEVICE_INFO (23)
// ============================================================================

fn device_index(ctx: &mut DecodeContext<'_>, view: &FieldView<'_>) -> Result<()> {
    let value = view.uint() as u8;
    ctx.pending_device_info().index = value;
    Ok(())
}

fn device_serial(ctx: &mut DecodeContext<'_>, view: &FieldView<'_>) -> Result<()> {
    let value = view.uint() as u32;
    ctx.pending_device_info().serial = value;
    Ok(())
}

fn device_product(ctx: &mut DecodeContext<'_>, view: &FieldView<'_>) -> Result<()> {
    let value = view.uint() as u32;
    ctx.pending_device_info().product = value;
    Ok(())
}

fn device_firmware(ctx: &mut DecodeContext<'_>, view: &FieldView<'_>) -> Result<()> {
    let value = view.uint() as u32;
    ctx.pending_device_info().firmware = value;
    Ok(())
}

static DEVICE_INFO: MessageDesc = MessageDesc {
    name: "DEVICE_INFO",
    fields: &[
        FieldSpec { number: 0, name: "device_index", base: BaseType::Uint8, handler: device_index },
        FieldSpec { number: 3, name: "serial_nr", base: BaseType::Uint32z, handler: device_serial },
        FieldSpec { number: 4, name: "product", base: BaseType::Uint16, handler: device_product },
        FieldSpec {
            number: 5,
            name: "software_version",
            base: BaseType::Uint16,
            handler: device_firmware,
        },
    ],
};

// ============================================================================
// SENSOR_PROFILE (147)
// ============================================================================

fn sensor_channel_id(ctx: &mut DecodeContext<'_>, view: &FieldView<'_>) -> Result<()> {
    let value = view.uint() as u32;
    ctx.pending_sensor_profile().id = value;
    Ok(())
}

fn sensor_type(ctx: &mut DecodeContext<'_>, view: &FieldView<'_>) -> Result<()> {
    let value = view.uint() as u8;
    ctx.pending_sensor_profile().sensor_type = value;
    Ok(())
}

fn sensor_rated_pressure(ctx: &mut DecodeContext<'_>, view: &FieldView<'_>) -> Result<()> {
    let value = view.uint() as u16;
    ctx.pending_sensor_profile().rated_pressure = value;
    Ok(())
}

fn sensor_volume(ctx: &mut DecodeContext<'_>, view: &FieldView<'_>) -> Result<()> {
    let value = view.uint() as u16;
    ctx.pending_sensor_profile().volume_dl = value;
    Ok(())
}

static SENSOR_PROFILE: MessageDesc = MessageDesc {
    name: "SENSOR_PROFILE",
    fields: &[
        FieldSpec {
            number: 0,
            name: "ant_channel_id",
            base: BaseType::Uint32z,
            handler: sensor_channel_id,
        },
        FieldSpec { number: 1, name: "name", base: BaseType::String, handler: ignore },
        FieldSpec { number: 2, name: "enabled", base: BaseType::Enum, handler: ignore },
        FieldSpec { number: 3, name: "sensor_type", base: BaseType::Uint8, handler: sensor_type },
        FieldSpec { number: 4, name: "pressure_units", base: BaseType::Enum, handler: ignore },
        FieldSpec {
            number: 5,
            name: "rated_pressure",
            base: BaseType::Uint16,
            handler: sensor_rated_pressure,
        },
        FieldSpec { number: 6, name: "reserve_pressure", base: BaseType::Uint16, handler: ignore },
        FieldSpec { number: 7, name: "volume", base: BaseType::Uint16, handler: sensor_volume },
        FieldSpec { number: 8, name: "used_for_gas_rate", base: BaseType::Enum, handler: ignore },
    ],
};

// ============================================================================
// DIVE_SETTINGS (258)
// ============================================================================

fn settings_name(ctx: &mut DecodeContext<'_>, view: &FieldView<'_>) -> Result<()> {
    ctx.cache.add_string("Name", view.text())
}

fn deco_model(ctx: &mut DecodeContext<'_>, view: &FieldView<'_>) -> Result<()> {
    let value = view.uint() as u8;
    ctx.pending_deco_model().model = value;
    Ok(())
}

fn gf_low(ctx: &mut DecodeContext<'_>, view: &FieldView<'_>) -> Result<()> {
    let value = view.uint() as u8;
    ctx.pending_deco_model().gf_low = value;
    Ok(())
}

fn gf_high(ctx: &mut DecodeContext<'_>, view: &FieldView<'_>) -> Result<()> {
    let value = view.uint() as u8;
    ctx.pending_deco_model().gf_high = value;
    Ok(())
}

fn water_type(ctx: &mut DecodeContext<'_>, view: &FieldView<'_>) -> Result<()> {
    let (kind, density) = match view.uint() {
        0 => (WaterKind::Fresh, 1.000),
        1 | 2 => (WaterKind::Salt, 1.025),
        _ => (WaterKind::Custom, 1.025),
    };
    ctx.state.water_kind = Some(kind);
    ctx.cache.set_salinity(Salinity { kind, density });
    Ok(())
}

fn water_density(ctx: &mut DecodeContext<'_>, view: &FieldView<'_>) -> Result<()> {
    // The profile reports kg/m3; the cache keeps kg/l. The kind comes from
    // the water_type field of the same record when present.
    let density = f64::from(view.float32()) / 1000.0;
    let kind = ctx.state.water_kind.unwrap_or(WaterKind::Custom);
    ctx.cache.set_salinity(Salinity { kind, density });
    Ok(())
}

fn setpoint_low(ctx: &mut DecodeContext<'_>, view: &FieldView<'_>) -> Result<()> {
    ctx.state.setpoint_low_cbar = view.uint() as u8;
    Ok(())
}

fn setpoint_low_depth(ctx: &mut DecodeContext<'_>, view: &FieldView<'_>) -> Result<()> {
    ctx.state.setpoint_low_depth_mm = view.uint() as u32;
    Ok(())
}

fn setpoint_high(ctx: &mut DecodeContext<'_>, view: &FieldView<'_>) -> Result<()> {
    ctx.state.setpoint_high_cbar = view.uint() as u8;
    Ok(())
}

fn setpoint_high_depth(ctx: &mut DecodeContext<'_>, view: &FieldView<'_>) -> Result<()> {
    ctx.state.setpoint_high_depth_mm = view.uint() as u32;
    Ok(())
}

static DIVE_SETTINGS: MessageDesc = MessageDesc {
    name: "DIVE_SETTINGS",
    fields: &[
        FieldSpec { number: 0, name: "name", base: BaseType::String, handler: settings_name },
        FieldSpec { number: 1, name: "model", base: BaseType::Enum, handler: deco_model },
        FieldSpec { number: 2, name: "gf_low", base: BaseType::Uint8, handler: gf_low },
        FieldSpec { number: 3, name: "gf_high", base: BaseType::Uint8, handler: gf_high },
        FieldSpec { number: 4, name: "water_type", base: BaseType::Enum, handler: water_type },
        FieldSpec {
            number: 5,
            name: "water_density",
            base: BaseType::Float32,
            handler: water_density,
        },
        FieldSpec { number: 6, name: "po2_warn", base: BaseType::Uint8, handler: ignore },
        FieldSpec { number: 7, name: "po2_critical", base: BaseType::Uint8, handler: ignore },
        FieldSpec { number: 8, name: "po2_deco", base: BaseType::Uint8, handler: ignore },
        FieldSpec { number: 9, name: "safety_stop_enabled", base: BaseType::Enum, handler: ignore },
        FieldSpec { number: 10, name: "bottom_depth", base: BaseType::Float32, handler: ignore },
        FieldSpec { number: 11, name: "bottom_time", base: BaseType::Uint32, handler: ignore },
        FieldSpec {
            number: 12,
            name: "apnea_countdown_enabled",
            base: BaseType::Enum,
            handler: ignore,
        },
        FieldSpec { number: 17, name: "repeat_dive_interval", base: BaseType::Uint16, handler: ignore },
        FieldSpec { number: 18, name: "safety_stop_time", base: BaseType::Uint16, handler: ignore },
        FieldSpec {
            number: 22,
            name: "ccr_low_setpoint_switch_mode",
            base: BaseType::Enum,
            handler: ignore,
        },
        FieldSpec {
            number: 23,
            name: "ccr_low_setpoint",
            base: BaseType::Uint8,
            handler: setpoint_low,
        },
        FieldSpec {
            number: 24,
            name: "ccr_low_setpoint_depth",
            base: BaseType::Uint32,
            handler: setpoint_low_depth,
        },
        FieldSpec {
            number: 25,
            name: "ccr_high_setpoint_switch_mode",
            base: BaseType::Enum,
            handler: ignore,
        },
        FieldSpec {
            number: 26,
            name: "ccr_high_setpoint",
            base: BaseType::Uint8,
            handler: setpoint_high,
        },
        FieldSpec {
            number: 27,
            name: "ccr_high_setpoint_depth",
            base: BaseType::Uint32,
            handler: setpoint_high_depth,
        },
        FieldSpec {
            number: 29,
            name: "gas_consumption_display",
            base: BaseType::Enum,
            handler: ignore,
        },
        FieldSpec { number: 35, name: "dive_sounds", base: BaseType::Enum, handler: ignore },
        FieldSpec { number: 36, name: "last_stop_multiple", base: BaseType::Uint8, handler: ignore },
        FieldSpec { number: 37, name: "no_fly_time_mode", base: BaseType::Enum, handler: ignore },
    ],
};

// ============================================================================
// DIVE_GAS (259)
// ============================================================================

fn gas_helium(ctx: &mut DecodeContext<'_>, view: &FieldView<'_>) -> Result<()> {
    let value = view.uint() as u8;
    ctx.pending_gasmix().helium = value;
    Ok(())
}

fn gas_oxygen(ctx: &mut DecodeContext<'_>, view: &FieldView<'_>) -> Result<()> {
    let value = view.uint() as u8;
    ctx.pending_gasmix().oxygen = value;
    Ok(())
}

fn gas_status(ctx: &mut DecodeContext<'_>, view: &FieldView<'_>) -> Result<()> {
    let value = view.uint() as u8;
    ctx.pending_gasmix().status = value;
    Ok(())
}

static DIVE_GAS: MessageDesc = MessageDesc {
    name: "DIVE_GAS",
    fields: &[
        FieldSpec { number: 0, name: "helium", base: BaseType::Uint8, handler: gas_helium },
        FieldSpec { number: 1, name: "oxygen", base: BaseType::Uint8, handler: gas_oxygen },
        FieldSpec { number: 2, name: "status", base: BaseType::Enum, handler: gas_status },
    ],
};

// ============================================================================
// DIVE_SUMMARY (268)
// ============================================================================

fn summary_avg_depth(ctx: &mut DecodeContext<'_>, view: &FieldView<'_>) -> Result<()> {
    let meters = view.uint() as f64 / 1000.0;
    ctx.cache.set_avgdepth(meters);
    Ok(())
}

fn summary_max_depth(ctx: &mut DecodeContext<'_>, view: &FieldView<'_>) -> Result<()> {
    let meters = view.uint() as f64 / 1000.0;
    ctx.cache.set_maxdepth(meters);
    Ok(())
}

fn summary_dive_number(ctx: &mut DecodeContext<'_>, view: &FieldView<'_>) -> Result<()> {
    ctx.state.dive_number = view.uint() as u32;
    Ok(())
}

fn summary_bottom_time(ctx: &mut DecodeContext<'_>, view: &FieldView<'_>) -> Result<()> {
    // Milliseconds on the wire.
    ctx.cache.set_divetime((view.uint() / 1000) as u32);
    Ok(())
}

static DIVE_SUMMARY: MessageDesc = MessageDesc {
    name: "DIVE_SUMMARY",
    fields: &[
        FieldSpec { number: 2, name: "avg_depth", base: BaseType::Uint32, handler: summary_avg_depth },
        FieldSpec { number: 3, name: "max_depth", base: BaseType::Uint32, handler: summary_max_depth },
        FieldSpec { number: 4, name: "surface_interval", base: BaseType::Uint32, handler: ignore },
        FieldSpec { number: 5, name: "start_cns", base: BaseType::Uint8, handler: ignore },
        FieldSpec { number: 6, name: "end_cns", base: BaseType::Uint8, handler: ignore },
        FieldSpec { number: 7, name: "start_n2", base: BaseType::Uint16, handler: ignore },
        FieldSpec { number: 8, name: "end_n2", base: BaseType::Uint16, handler: ignore },
        FieldSpec { number: 9, name: "o2_toxicity", base: BaseType::Uint16, handler: ignore },
        FieldSpec {
            number: 10,
            name: "dive_number",
            base: BaseType::Uint32,
            handler: summary_dive_number,
        },
        FieldSpec {
            number: 11,
            name: "bottom_time",
            base: BaseType::Uint32,
            handler: summary_bottom_time,
        },
        FieldSpec { number: 12, name: "avg_pressure_sac", base: BaseType::Uint16, handler: ignore },
        FieldSpec { number: 13, name: "avg_volume_sac", base: BaseType::Uint16, handler: ignore },
        FieldSpec { number: 14, name: "avg_rmv", base: BaseType::Uint16, handler: ignore },
    ],
};

// ============================================================================
// TANK_UPDATE (319) / TANK_SUMMARY (323)
// ============================================================================

fn tank_sensor(ctx: &mut DecodeContext<'_>, view: &FieldView<'_>) -> Result<()> {
    let value = view.uint() as u32;
    ctx.pending_tank_update().sensor = value;
    Ok(())
}

fn tank_pressure(ctx: &mut DecodeContext<'_>, view: &FieldView<'_>) -> Result<()> {
    let value = view.uint() as u32;
    ctx.pending_tank_update().pressure_cbar = value;
    Ok(())
}

static TANK_UPDATE: MessageDesc = MessageDesc {
    name: "TANK_UPDATE",
    fields: &[
        FieldSpec { number: 0, name: "sensor", base: BaseType::Uint32z, handler: tank_sensor },
        FieldSpec { number: 1, name: "pressure", base: BaseType::Uint16, handler: tank_pressure },
    ],
};

static TANK_SUMMARY: MessageDesc = MessageDesc {
    name: "TANK_SUMMARY",
    fields: &[
        FieldSpec { number: 0, name: "sensor", base: BaseType::Uint32z, handler: ignore },
        FieldSpec { number: 1, name: "start_pressure", base: BaseType::Uint16, handler: ignore },
        FieldSpec { number: 2, name: "end_pressure", base: BaseType::Uint16, handler: ignore },
        FieldSpec { number: 3, name: "volume_used", base: BaseType::Uint32, handler: ignore },
    ],
};
