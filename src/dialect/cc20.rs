//! CINRAD/CC 2.0: 2060 byte volume header, 3011 or 4011 byte radials

use super::{calendar_at, non_empty, require_base_volume, require_len, station_at, DialectLayout};
use crate::error::{RadarError, Result};
use crate::record::{locate_in_sweeps, GateGeometry, Record, SweepInfo, VolumeHeader};
use crate::types::{DataTime, Dialect, DOPPLER_RESOLUTION_HIGH};
use crate::utils::{ascii_field, i16_le, u16_le, u32_le, u8_at};

pub const VOLUME_HEADER_LEN: usize = 2060;

/// Z, V and W blocks
pub const DATA_FORM_ZVW: u8 = 22;

/// T, Z, V and W blocks
pub const DATA_FORM_TZVW: u8 = 24;

/// Gates per moment block
pub const GATES_PER_BLOCK: u16 = 1000;

const RADIAL_HEADER_LEN: usize = 11;
const SWEEP_TABLE: usize = 116;
const SWEEP_ENTRY_LEN: usize = 16;
const MAX_SWEEPS: usize = 32;

pub struct Cc20Layout;

/// Record size and `[Z, V, W]` offsets for a data form
fn block_layout(data_form: u8) -> Option<(u64, [i32; 3])> {
    let block = GATES_PER_BLOCK as i32;
    let header = RADIAL_HEADER_LEN as i32;
    match data_form {
        DATA_FORM_ZVW => Some((3011, [header, header + block, header + 2 * block])),
        DATA_FORM_TZVW => Some((4011, [header + block, header + 2 * block, header + 3 * block])),
        _ => None,
    }
}

impl DialectLayout for Cc20Layout {
    fn dialect(&self) -> Dialect {
        Dialect::Cc20
    }

    fn probe_len(&self) -> usize {
        VOLUME_HEADER_LEN
    }

    fn radial_header_len(&self) -> usize {
        RADIAL_HEADER_LEN
    }

    fn parse_volume_header(&self, probe: &[u8]) -> Result<VolumeHeader> {
        require_len(Dialect::Cc20, probe, VOLUME_HEADER_LEN)?;

        let scan_mode = u8_at(probe, 100);
        require_base_volume(
            Dialect::Cc20,
            scan_mode as u32,
            u8_at(probe, 101) as u32,
            u16_le(probe, 102) as u32,
        )?;
        let data_form = u8_at(probe, 104);
        let (record_size, _) = block_layout(data_form).ok_or(RadarError::UnsupportedFormat {
            dialect: Dialect::Cc20,
            field: "data_form",
            value: data_form as u32,
        })?;

        let name = ascii_field(probe, 0, 16);
        let id = ascii_field(probe, 16, 8);
        let sweep_count = (u8_at(probe, 114) as usize).min(MAX_SWEEPS);
        let sweeps: Vec<SweepInfo> = (0..sweep_count)
            .map(|i| {
                let at = SWEEP_TABLE + i * SWEEP_ENTRY_LEN;
                SweepInfo {
                    elevation_deg: i16_le(probe, at) as f32 / 100.0,
                    record_count: u16_le(probe, at + 2),
                    bin_count: u16_le(probe, at + 4).min(GATES_PER_BLOCK),
                    bin_width: u16_le(probe, at + 6),
                    first_gate: u16_le(probe, at + 10) as i32,
                    max_velocity: u16_le(probe, at + 8) as f32 / 100.0,
                    reflectivity_only: false,
                }
            })
            .collect();
        let mut header = VolumeHeader {
            header_len: VOLUME_HEADER_LEN as u64,
            record_size,
            title_time: calendar_at(probe, 106),
            station: station_at(probe, &id, &name, 40),
            station_id: non_empty(id),
            scan_mode: scan_mode as u16,
            data_form,
            sweeps,
            ..VolumeHeader::default()
        };
        header.record_bound = Some(header.total_sweep_records());
        Ok(header)
    }

    fn parse_header(&self, volume: &VolumeHeader, recno: u32, message_offset: u64, buf: &[u8]) -> Record {
        let mut record = Record::empty(Dialect::Cc20, recno, message_offset, volume.record_size);
        record.azimuth_deg = u16_le(buf, 0) as f32 / 100.0;
        record.elevation_deg = i16_le(buf, 2) as f32 / 100.0;
        let day = volume.title_time.map(|t| t.julian_day).unwrap_or_default();
        record.data_time = DataTime::new(day, u32_le(buf, 4) as i64);
        record.radial_status = u8_at(buf, 10) as u16;
        record.vcp = volume.scan_mode;
        record.resolution = DOPPLER_RESOLUTION_HIGH;

        let beyond_bound = volume.record_bound.map_or(false, |bound| recno >= bound);
        let position = match locate_in_sweeps(&volume.sweeps, recno) {
            Some(position) if !beyond_bound => position,
            // left with elevation 0 / radial 0 for the assembler to discard
            _ => return record,
        };
        let offsets = match block_layout(volume.data_form) {
            Some((_, offsets)) => offsets,
            None => return record,
        };
        let sweep = &volume.sweeps[position.sweep];
        let radial_index = u16_le(buf, 8);
        record.elevation_num = position.elevation_num;
        record.radial_num = if radial_index > 0 { radial_index } else { position.radial_num };
        record.nyquist_velocity = sweep.max_velocity;

        let gate_size = sweep.bin_width as i32;
        let count = sweep.bin_count;
        record.reflectivity = GateGeometry::new(sweep.first_gate, gate_size, count, offsets[0]);
        record.velocity = GateGeometry::new(sweep.first_gate, gate_size, count, offsets[1]);
        record.spectrum_width = GateGeometry::new(sweep.first_gate, gate_size, count, offsets[2]);
        record.has_reflect = count > 0;
        record.has_doppler = count > 0;
        record
    }
}
