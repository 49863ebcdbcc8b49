//! End-to-end FIT decoding scenarios against constructed log files.

use sagara_io::devices::garmin::fit::NAME_SIZE;
use sagara_io::devices::garmin::fit::parser::GarminParser;
use sagara_io::types::{DecoKind, DiveMode, Salinity, WaterKind};
use sagara_io::{Error, Field, FieldValue, GasMix, Parser, Sample};

/// Seconds from the FIT epoch to 2020-06-05 16:27:37 UTC, an arbitrary
/// dive start used throughout.
const T0: u32 = 960_306_457;

/// Builds a fingerprint-prefixed FIT file record by record.
struct FitBuilder {
    records: Vec<u8>,
}

impl FitBuilder {
    fn new() -> Self {
        Self { records: Vec::new() }
    }

    /// Append a little-endian definition record.
    fn definition(mut self, local: u8, global: u16, fields: &[(u8, u8, u8)]) -> Self {
        self.records.push(0x40 | local);
        self.records.push(0); // reserved
        self.records.push(0); // little-endian
        self.records.extend_from_slice(&global.to_le_bytes());
        self.records.push(fields.len() as u8);
        for &(number, size, base) in fields {
            self.records.extend_from_slice(&[number, size, base]);
        }
        self
    }

    /// Append a big-endian definition record.
    fn definition_be(mut self, local: u8, global: u16, fields: &[(u8, u8, u8)]) -> Self {
        self.records.push(0x40 | local);
        self.records.push(0);
        self.records.push(1); // big-endian
        self.records.extend_from_slice(&global.to_be_bytes());
        self.records.push(fields.len() as u8);
        for &(number, size, base) in fields {
            self.records.extend_from_slice(&[number, size, base]);
        }
        self
    }

    /// Append a data record with pre-encoded field bytes.
    fn data(mut self, local: u8, bytes: &[u8]) -> Self {
        self.records.push(local);
        self.records.extend_from_slice(bytes);
        self
    }

    /// Append a compressed-timestamp data record.
    fn compressed(mut self, local: u8, delta: u8, bytes: &[u8]) -> Self {
        self.records.push(0x80 | (local << 5) | (delta & 0x1F));
        self.records.extend_from_slice(bytes);
        self
    }

    /// Wrap the records in a fingerprint, header and trailing CRC.
    fn build(self) -> Vec<u8> {
        self.build_named("2020-06-05-16-27-37.fit")
    }

    fn build_named(self, name: &str) -> Vec<u8> {
        let mut data = vec![0u8; NAME_SIZE];
        data[..name.len()].copy_from_slice(name.as_bytes());
        data.extend_from_slice(&self.build_file());
        data
    }

    /// The bare file contents, as they would sit on the watch's storage.
    fn build_file(self) -> Vec<u8> {
        let mut data = Vec::new();
        data.push(12); // header size
        data.push(0x10); // protocol
        data.extend_from_slice(&96u16.to_le_bytes()); // profile
        data.extend_from_slice(&(self.records.len() as u32).to_le_bytes());
        data.extend_from_slice(b".FIT");
        data.extend_from_slice(&self.records);
        data.extend_from_slice(&[0x00, 0x00]); // file CRC, unverified
        data
    }
}

/// Definition of a SESSION carrying only the start time.
fn session_definition(builder: FitBuilder, local: u8) -> FitBuilder {
    builder.definition(local, 18, &[(2, 4, 0x86)])
}

fn collect_samples(data: &[u8]) -> Vec<Sample> {
    let mut parser = GarminParser::new();
    parser.set_data(data).unwrap();
    let mut samples = Vec::new();
    parser.samples_foreach(&mut |sample| samples.push(sample)).unwrap();
    samples
}

// ---------------------------------------------------------------------------
// Scenario: minimal file
// ---------------------------------------------------------------------------

#[test]
fn minimal_file_parses_with_datetime_from_name() {
    let data = FitBuilder::new().build_named("2020-01-02-03-04-05.fit");
    let mut parser = GarminParser::new();
    parser.set_data(&data).unwrap();

    assert_eq!(parser.field(Field::GasMixCount).unwrap(), FieldValue::Count(0));

    let mut samples = 0;
    parser.samples_foreach(&mut |_| samples += 1).unwrap();
    assert_eq!(samples, 0);

    let datetime = parser.datetime().unwrap();
    assert_eq!(datetime.utc_offset, None);
    assert_eq!(datetime.datetime.to_string(), "2020-01-02 03:04:05");
}

// ---------------------------------------------------------------------------
// Scenario: one RECORD stream
// ---------------------------------------------------------------------------

#[test]
fn record_stream_yields_time_then_depth() {
    let data = session_definition(FitBuilder::new(), 1)
        .data(1, &T0.to_le_bytes())
        // RECORD with timestamp and depth (mm).
        .definition(0, 20, &[(253, 4, 0x86), (92, 4, 0x86)])
        .data(0, &[T0.to_le_bytes(), 0u32.to_le_bytes()].concat())
        .data(0, &[(T0 + 10).to_le_bytes(), 5000u32.to_le_bytes()].concat())
        .build();

    let samples = collect_samples(&data);
    assert_eq!(
        samples,
        vec![Sample::Time(0), Sample::Depth(0.0), Sample::Time(10), Sample::Depth(5.0)]
    );
}

#[test]
fn time_precedes_values_whatever_the_field_order() {
    // The definition puts depth before the timestamp; the Time sample must
    // still lead the record's samples.
    let data = session_definition(FitBuilder::new(), 1)
        .data(1, &T0.to_le_bytes())
        .definition(0, 20, &[(92, 4, 0x86), (253, 4, 0x86)])
        .data(0, &[5000u32.to_le_bytes(), (T0 + 10).to_le_bytes()].concat())
        .build();

    let samples = collect_samples(&data);
    assert_eq!(samples, vec![Sample::Time(10), Sample::Depth(5.0)]);
}

#[test]
fn big_endian_definitions_decode_the_same() {
    let data = FitBuilder::new()
        .definition_be(1, 18, &[(2, 4, 0x86)])
        .data(1, &T0.to_be_bytes())
        .definition_be(0, 20, &[(253, 4, 0x86), (92, 4, 0x86)])
        .data(0, &[T0.to_be_bytes(), 7500u32.to_be_bytes()].concat())
        .build();

    let samples = collect_samples(&data);
    assert_eq!(samples, vec![Sample::Time(0), Sample::Depth(7.5)]);
}

#[test]
fn compressed_timestamps_extend_the_previous_time() {
    let t0 = T0 & !0x1F; // align so the deltas are easy to read
    let data = session_definition(FitBuilder::new(), 1)
        .data(1, &t0.to_le_bytes())
        .definition(0, 20, &[(253, 4, 0x86), (92, 4, 0x86)])
        .data(0, &[t0.to_le_bytes(), 1000u32.to_le_bytes()].concat())
        .compressed(0, 10, &[t0.to_le_bytes(), 2000u32.to_le_bytes()].concat())
        .build();

    // The compressed record still carries its declared fields; its header
    // delta advances time before they decode.
    let samples = collect_samples(&data);
    assert_eq!(samples[0], Sample::Time(0));
    assert_eq!(samples[1], Sample::Depth(1.0));
    assert_eq!(samples[2], Sample::Time(10));
}

#[test]
fn out_of_order_timestamps_are_dropped() {
    let data = session_definition(FitBuilder::new(), 1)
        .data(1, &T0.to_le_bytes())
        .definition(0, 20, &[(253, 4, 0x86), (92, 4, 0x86)])
        .data(0, &[(T0 + 20).to_le_bytes(), 1000u32.to_le_bytes()].concat())
        .data(0, &[T0.to_le_bytes(), 2000u32.to_le_bytes()].concat())
        .build();

    let times: Vec<u32> = collect_samples(&data)
        .into_iter()
        .filter_map(|s| match s {
            Sample::Time(t) => Some(t),
            _ => None,
        })
        .collect();
    assert_eq!(times, vec![20]);
}

// ---------------------------------------------------------------------------
// Scenario: gas mix flush
// ---------------------------------------------------------------------------

#[test]
fn dive_gas_records_populate_the_mix_table() {
    // DIVE_GAS: message index, helium, oxygen, status.
    let fields = [(254, 2, 0x84), (0, 1, 0x02), (1, 1, 0x02), (2, 1, 0x00)];
    let data = FitBuilder::new()
        .definition(0, 259, &fields)
        .data(0, &[0x00, 0x00, 0, 32, 1])
        .data(0, &[0x01, 0x00, 20, 18, 1])
        .build();

    let mut parser = GarminParser::new();
    parser.set_data(&data).unwrap();

    assert_eq!(parser.field(Field::GasMixCount).unwrap(), FieldValue::Count(2));
    assert_eq!(
        parser.field(Field::GasMix(0)).unwrap(),
        FieldValue::Mix(GasMix::new(0.0, 0.32))
    );
    assert_eq!(
        parser.field(Field::GasMix(1)).unwrap(),
        FieldValue::Mix(GasMix::new(0.20, 0.18))
    );
    assert!(parser.field(Field::GasMix(2)).is_err());
}

#[test]
fn disabled_gas_slots_are_not_counted() {
    let fields = [(254, 2, 0x84), (0, 1, 0x02), (1, 1, 0x02), (2, 1, 0x00)];
    let data = FitBuilder::new()
        .definition(0, 259, &fields)
        .data(0, &[0x00, 0x00, 0, 21, 1])
        .data(0, &[0x01, 0x00, 0, 50, 0]) // status 0: disabled
        .build();

    let mut parser = GarminParser::new();
    parser.set_data(&data).unwrap();
    assert_eq!(parser.field(Field::GasMixCount).unwrap(), FieldValue::Count(1));
}

// ---------------------------------------------------------------------------
// Scenario: settings, summary, events
// ---------------------------------------------------------------------------

#[test]
fn dive_settings_normalize_model_and_water() {
    let data = FitBuilder::new()
        .definition(
            0,
            258,
            &[(1, 1, 0x00), (2, 1, 0x02), (3, 1, 0x02), (4, 1, 0x00)],
        )
        .data(0, &[0, 35, 75, 1])
        .build();

    let mut parser = GarminParser::new();
    parser.set_data(&data).unwrap();

    assert_eq!(
        parser.field(Field::Salinity).unwrap(),
        FieldValue::Salinity(Salinity { kind: WaterKind::Salt, density: 1.025 })
    );
    let deco_model = (0..)
        .map_while(|i| parser.field(Field::String(i)).ok())
        .find_map(|value| match value {
            FieldValue::Text(s) if s.desc == "Deco model" => Some(s.value),
            _ => None,
        })
        .expect("deco model string");
    assert_eq!(deco_model, "Buhlmann ZHL-16C 35/75");
}

#[test]
fn dive_summary_sets_depths_and_divetime() {
    let data = FitBuilder::new()
        .definition(0, 268, &[(2, 4, 0x86), (3, 4, 0x86), (11, 4, 0x86)])
        .data(
            0,
            &[12_340u32.to_le_bytes(), 31_310u32.to_le_bytes(), 496_000u32.to_le_bytes()]
                .concat(),
        )
        .build();

    let mut parser = GarminParser::new();
    parser.set_data(&data).unwrap();
    assert_eq!(parser.field(Field::AvgDepth).unwrap(), FieldValue::Depth(12.34));
    assert_eq!(parser.field(Field::MaxDepth).unwrap(), FieldValue::Depth(31.31));
    assert_eq!(parser.field(Field::DiveTime).unwrap(), FieldValue::DiveTime(496));
}

#[test]
fn sport_maps_sub_sport_to_dive_mode() {
    for (sub_sport, mode) in [
        (53u8, DiveMode::OpenCircuit),
        (55, DiveMode::Gauge),
        (56, DiveMode::Freedive),
        (63, DiveMode::ClosedCircuit),
    ] {
        let data = FitBuilder::new()
            .definition(0, 12, &[(0, 1, 0x00), (1, 1, 0x00)])
            .data(0, &[2, sub_sport])
            .build();
        let mut parser = GarminParser::new();
        parser.set_data(&data).unwrap();
        assert_eq!(parser.field(Field::DiveMode).unwrap(), FieldValue::Mode(mode));
    }
}

#[test]
fn event_samples_carry_their_kind() {
    use sagara_io::types::EventSeverity;
    let data = session_definition(FitBuilder::new(), 1)
        .data(1, &T0.to_le_bytes())
        .definition(0, 21, &[(0, 1, 0x00), (1, 1, 0x00), (3, 4, 0x86), (4, 1, 0x02)])
        .data(0, &[4, 3, 0, 0, 0, 0, 0]) // ppO2 warning
        .data(0, &[71, 3, 0, 0, 0, 0, 0]) // tank pressure reserve
        .build();

    let events: Vec<(u8, &str, EventSeverity)> = collect_samples(&data)
        .into_iter()
        .filter_map(|sample| match sample {
            Sample::Event { kind, name, severity } => Some((kind, name, severity)),
            _ => None,
        })
        .collect();
    assert_eq!(
        events,
        vec![
            (4, "ppO2 warning", EventSeverity::Warning),
            (71, "Tank pressure reserve", EventSeverity::Warning),
        ]
    );
}

#[test]
fn gas_switch_event_becomes_a_gasmix_sample() {
    let data = session_definition(FitBuilder::new(), 1)
        .data(1, &T0.to_le_bytes())
        // EVENT: event, type, data, group.
        .definition(0, 21, &[(0, 1, 0x00), (1, 1, 0x00), (3, 4, 0x86), (4, 1, 0x02)])
        .data(0, &[57, 3, 1, 0, 0, 0, 0])
        .build();

    let samples = collect_samples(&data);
    assert!(samples.contains(&Sample::GasMix(1)));
}

#[test]
fn deco_fields_aggregate_into_one_sample() {
    let data = session_definition(FitBuilder::new(), 1)
        .data(1, &T0.to_le_bytes())
        .definition(0, 20, &[(253, 4, 0x86), (93, 4, 0x86), (94, 4, 0x86)])
        .data(0, &[T0.to_le_bytes(), 6000u32.to_le_bytes(), 180u32.to_le_bytes()].concat())
        .build();

    let samples = collect_samples(&data);
    assert!(samples
        .contains(&Sample::Deco { kind: DecoKind::DecoStop, time: 180, depth: 6.0 }));
}

#[test]
fn tank_pod_profile_and_update_produce_pressure() {
    let data = session_definition(FitBuilder::new(), 2)
        .data(2, &T0.to_le_bytes())
        // SENSOR_PROFILE: channel id, sensor type, rated pressure, volume.
        .definition(0, 147, &[(0, 4, 0x8C), (3, 1, 0x02), (5, 2, 0x84), (7, 2, 0x84)])
        .data(
            0,
            &[
                &0xD1D2_D3D4u32.to_le_bytes()[..],
                &[28][..],
                &232u16.to_le_bytes()[..],
                &120u16.to_le_bytes()[..],
            ]
            .concat(),
        )
        // TANK_UPDATE: sensor, pressure (cbar).
        .definition(1, 319, &[(0, 4, 0x8C), (1, 2, 0x84)])
        .data(
            1,
            &[&0xD1D2_D3D4u32.to_le_bytes()[..], &18_500u16.to_le_bytes()[..]].concat(),
        )
        .build();

    let mut parser = GarminParser::new();
    parser.set_data(&data).unwrap();
    assert_eq!(
        parser.field(Field::Tank(0)).unwrap(),
        FieldValue::Tank(sagara_io::types::Tank { volume: 12.0, work_pressure: 232.0 })
    );

    let samples = collect_samples(&data);
    assert!(samples.contains(&Sample::Pressure { tank: 0, bar: 185.0 }));
}

// ---------------------------------------------------------------------------
// Boundary behaviors
// ---------------------------------------------------------------------------

#[test]
fn short_header_is_an_io_error() {
    let mut data = vec![0u8; NAME_SIZE];
    data.extend_from_slice(&[12, 0x10, 0x00]);
    let mut parser = GarminParser::new();
    assert!(matches!(parser.set_data(&data), Err(Error::Io(_))));
    // The parser stays in the defined empty state.
    assert!(parser.field(Field::GasMixCount).is_err());
}

#[test]
fn bad_magic_is_an_io_error() {
    let mut data = FitBuilder::new().build();
    data[NAME_SIZE + 8] = b'X';
    let mut parser = GarminParser::new();
    assert!(matches!(parser.set_data(&data), Err(Error::Io(_))));
}

#[test]
fn undefined_local_type_is_an_io_error() {
    let data = FitBuilder::new().data(3, &[0x00]).build();
    let mut parser = GarminParser::new();
    assert!(matches!(parser.set_data(&data), Err(Error::Io(_))));
}

#[test]
fn invalid_sentinel_fields_are_skipped() {
    let data = session_definition(FitBuilder::new(), 1)
        .data(1, &T0.to_le_bytes())
        .definition(0, 20, &[(253, 4, 0x86), (92, 4, 0x86)])
        .data(0, &[T0.to_le_bytes(), 0xFFFF_FFFFu32.to_le_bytes()].concat())
        .build();

    let samples = collect_samples(&data);
    // The depth field carried its invalid sentinel: time only.
    assert_eq!(samples, vec![Sample::Time(0)]);
}

#[test]
fn developer_fields_are_fatal() {
    let mut data = vec![0u8; NAME_SIZE];
    data.extend_from_slice(&[12, 0x10, 0x00, 0x00, 1, 0, 0, 0]);
    data.extend_from_slice(b".FIT");
    data.push(0x60); // definition with the developer-data bit
    data.extend_from_slice(&[0x00, 0x00]);
    let mut parser = GarminParser::new();
    assert!(matches!(parser.set_data(&data), Err(Error::Io(_))));
}

#[test]
fn unknown_messages_are_skipped_quietly() {
    let data = FitBuilder::new()
        .definition(0, 999, &[(0, 2, 0x84)])
        .data(0, &[0x12, 0x34])
        .build();
    let mut parser = GarminParser::new();
    parser.set_data(&data).unwrap();
}

#[test]
fn truncated_data_record_is_an_io_error() {
    // Declares a 4-byte field but the data region ends after 2 bytes.
    let mut builder = FitBuilder::new().definition(0, 20, &[(92, 4, 0x86)]);
    builder = builder.data(0, &[0x00, 0x00]);
    let data = builder.build();
    let mut parser = GarminParser::new();
    assert!(matches!(parser.set_data(&data), Err(Error::Io(_))));
}

// ---------------------------------------------------------------------------
// Properties
// ---------------------------------------------------------------------------

#[test]
fn times_never_decrease_across_a_long_stream() {
    let mut builder = session_definition(FitBuilder::new(), 1)
        .data(1, &T0.to_le_bytes())
        .definition(0, 20, &[(253, 4, 0x86), (92, 4, 0x86)]);
    // A jittery stream: mostly forward, occasionally stalled or backwards.
    let offsets =
        [0u32, 5, 10, 10, 7, 15, 20, 25, 23, 30, 40, 40, 41, 39, 50, 60, 61, 62, 90, 88, 100];
    for (i, offset) in offsets.iter().enumerate() {
        let depth = (i as u32 * 250).to_le_bytes();
        builder = builder.data(0, &[(T0 + offset).to_le_bytes(), depth].concat());
    }
    let samples = collect_samples(&builder.build());

    let mut last = 0;
    let mut times = 0;
    for sample in samples {
        if let Sample::Time(t) = sample {
            assert!(t >= last, "time went backwards: {t} after {last}");
            last = t;
            times += 1;
        }
    }
    assert!(times > 10);
}

#[test]
fn gasmix_count_bounds_every_index() {
    let fields = [(254, 2, 0x84), (0, 1, 0x02), (1, 1, 0x02), (2, 1, 0x00)];
    let mut builder = FitBuilder::new().definition(0, 259, &fields);
    for index in 0..5u16 {
        let mut record = index.to_le_bytes().to_vec();
        record.extend_from_slice(&[0, 21 + index as u8, 1]);
        builder = builder.data(0, &record);
    }
    let mut parser = GarminParser::new();
    let built = builder.build();
    parser.set_data(&built).unwrap();

    let FieldValue::Count(count) = parser.field(Field::GasMixCount).unwrap() else {
        panic!("count expected");
    };
    assert_eq!(count, 5);
    for index in 0..count {
        assert!(parser.field(Field::GasMix(index)).is_ok());
    }
    assert!(parser.field(Field::GasMix(count)).is_err());
}

#[test]
fn repeated_reads_are_stable() {
    let data = FitBuilder::new()
        .definition(0, 268, &[(3, 4, 0x86), (11, 4, 0x86)])
        .data(0, &[31_310u32.to_le_bytes(), 496_000u32.to_le_bytes()].concat())
        .build();
    let mut parser = GarminParser::new();
    parser.set_data(&data).unwrap();

    let first = parser.field(Field::MaxDepth).unwrap();
    for _ in 0..10 {
        assert_eq!(parser.field(Field::MaxDepth).unwrap(), first);
        assert_eq!(parser.field(Field::DiveTime).unwrap(), FieldValue::DiveTime(496));
    }
}

#[test]
fn local_type_slots_can_be_redefined() {
    // Slot 0 starts as SESSION, then is redefined as RECORD in place.
    let data = FitBuilder::new()
        .definition(0, 18, &[(2, 4, 0x86)])
        .data(0, &T0.to_le_bytes())
        .definition(0, 20, &[(253, 4, 0x86), (92, 4, 0x86)])
        .data(0, &[(T0 + 5).to_le_bytes(), 2500u32.to_le_bytes()].concat())
        .build();

    let samples = collect_samples(&data);
    assert_eq!(samples, vec![Sample::Time(5), Sample::Depth(2.5)]);
}

#[test]
fn utc_offset_shifts_the_reported_datetime() {
    let data = FitBuilder::new()
        // DEVICE_SETTINGS: utc_offset, time_offset.
        .definition(0, 2, &[(1, 4, 0x86), (2, 4, 0x86)])
        .data(0, &[7200u32.to_le_bytes(), 7200u32.to_le_bytes()].concat())
        .definition(1, 18, &[(2, 4, 0x86)])
        .data(1, &T0.to_le_bytes())
        .build();

    let mut parser = GarminParser::new();
    parser.set_data(&data).unwrap();
    let datetime = parser.datetime().unwrap();
    assert_eq!(datetime.utc_offset, Some(7200));
    // T0 is 16:27:37 UTC; the local wall clock reads two hours later.
    assert_eq!(datetime.datetime.to_string(), "2020-06-05 18:27:37");
}

#[test]
fn last_time_stays_within_the_dive_duration() {
    let mut builder = session_definition(FitBuilder::new(), 1)
        .data(1, &T0.to_le_bytes())
        .definition(0, 20, &[(253, 4, 0x86), (92, 4, 0x86)])
        .definition(2, 268, &[(11, 4, 0x86)]);
    for offset in (0..=490).step_by(10) {
        builder = builder.data(0, &[(T0 + offset).to_le_bytes(), 3000u32.to_le_bytes()].concat());
    }
    builder = builder.data(2, &496_000u32.to_le_bytes());
    let data = builder.build();

    let mut parser = GarminParser::new();
    parser.set_data(&data).unwrap();
    let FieldValue::DiveTime(divetime) = parser.field(Field::DiveTime).unwrap() else {
        panic!("divetime expected");
    };

    let mut last = 0;
    parser
        .samples_foreach(&mut |sample| {
            if let Sample::Time(t) = sample {
                last = t;
            }
        })
        .unwrap();
    // The sample grid ends within one interval of the recorded duration.
    assert!(last <= divetime + 10, "last sample at {last} for a {divetime} s dive");
}

// ---------------------------------------------------------------------------
// Device enumeration over real files
// ---------------------------------------------------------------------------

/// A complete little dive: sport, session, summary and a few records.
fn dive_file(start: u32, depth_mm: u32) -> Vec<u8> {
    session_definition(FitBuilder::new(), 1)
        .definition(2, 12, &[(0, 1, 0x00), (1, 1, 0x00)])
        .data(2, &[2, 53])
        .data(1, &start.to_le_bytes())
        .definition(3, 23, &[(0, 1, 0x02), (3, 4, 0x8C), (4, 2, 0x84), (5, 2, 0x84)])
        .data(
            3,
            &[&[0][..], &0xCAFE_F00Du32.to_le_bytes()[..], &3089u16.to_le_bytes()[..], &2150u16.to_le_bytes()[..]]
                .concat(),
        )
        .definition(0, 20, &[(253, 4, 0x86), (92, 4, 0x86)])
        .data(0, &[start.to_le_bytes(), depth_mm.to_le_bytes()].concat())
        .data(0, &[(start + 10).to_le_bytes(), (depth_mm / 2).to_le_bytes()].concat())
        .build_file()
}

#[test]
fn garmin_device_enumerates_newest_first_and_skips_non_dives() {
    use sagara_io::devices::garmin::GarminDevice;
    use sagara_io::{Device, DeviceEvent};
    use std::sync::{Arc, Mutex};

    let root = std::env::temp_dir().join(format!("sagara-fit-e2e-{}", std::process::id()));
    let _ = std::fs::remove_dir_all(&root);
    let activity = root.join("Garmin").join("Activity");
    std::fs::create_dir_all(&activity).unwrap();

    std::fs::write(activity.join("2020-06-05-16-27-37.fit"), dive_file(T0, 20_000)).unwrap();
    std::fs::write(
        activity.join("2020-06-07-09-00-00.fit"),
        dive_file(T0 + 150_000, 31_310),
    )
    .unwrap();
    // A run logged between the dives: sub-sport 1 is not a dive.
    let run = FitBuilder::new()
        .definition(0, 12, &[(0, 1, 0x00), (1, 1, 0x00)])
        .data(0, &[1, 1])
        .build_file();
    std::fs::write(activity.join("2020-06-06-08-00-00.fit"), run).unwrap();

    let devinfo: Arc<Mutex<Vec<(u32, u32, u32)>>> = Arc::new(Mutex::new(Vec::new()));
    let sink_devinfo = devinfo.clone();
    let mut device = GarminDevice::open(
        &root,
        Some(Box::new(move |event| {
            if let DeviceEvent::DevInfo { model, firmware, serial } = *event {
                sink_devinfo.lock().unwrap().push((model, firmware, serial));
            }
        })),
    )
    .unwrap();

    let mut dives: Vec<Vec<u8>> = Vec::new();
    device
        .foreach(&mut |dive| {
            assert_eq!(dive.fingerprint.len(), NAME_SIZE);
            dives.push(dive.data.to_vec());
            true
        })
        .unwrap();

    // Two dives, newest first; the run is filtered out.
    assert_eq!(dives.len(), 2);
    let mut newest = GarminParser::new();
    newest.set_data(&dives[0]).unwrap();
    assert!(newest.field(Field::MaxDepth).is_err()); // no summary message
    let mut first_depths = Vec::new();
    newest.samples_foreach(&mut |s| {
        if let Sample::Depth(d) = s {
            first_depths.push(d);
        }
    })
    .unwrap();
    assert_eq!(first_depths, vec![31.31, 15.655]);

    // Device info came from the dive's DEVICE_INFO message, once.
    assert_eq!(*devinfo.lock().unwrap(), vec![(3089, 2150, 0xCAFE_F00D)]);

    std::fs::remove_dir_all(&root).unwrap();
}

#[test]
fn set_data_is_idempotent() {
    let gas_fields = [(254, 2, 0x84), (0, 1, 0x02), (1, 1, 0x02), (2, 1, 0x00)];
    let with_gas = FitBuilder::new()
        .definition(0, 259, &gas_fields)
        .data(0, &[0x00, 0x00, 0, 32, 1])
        .build();
    let empty = FitBuilder::new().build();

    let mut parser = GarminParser::new();
    parser.set_data(&with_gas).unwrap();
    assert_eq!(parser.field(Field::GasMixCount).unwrap(), FieldValue::Count(1));

    // Rebinding resets every cached field.
    parser.set_data(&empty).unwrap();
    assert_eq!(parser.field(Field::GasMixCount).unwrap(), FieldValue::Count(0));
}
