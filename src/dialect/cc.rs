//! CINRAD/CC: 1024 byte volume header, 3000 byte radials

use super::{calendar_at, non_empty, require_base_volume, require_len, station_at, DialectLayout};
use crate::error::Result;
use crate::record::{locate_in_sweeps, GateGeometry, Record, SweepInfo, VolumeHeader};
use crate::types::{DataTime, Dialect, DOPPLER_RESOLUTION_HIGH};
use crate::utils::{ascii_field, i16_le, u16_le, u32_le, u8_at};

pub const VOLUME_HEADER_LEN: usize = 1024;
pub const RECORD_SIZE: u64 = 3000;

/// Gates per moment block
pub const GATES_PER_BLOCK: u16 = 996;

const SWEEP_TABLE: usize = 114;
const SWEEP_ENTRY_LEN: usize = 8;
const MAX_SWEEPS: usize = 30;

const REFLECTIVITY_OFFSET: i32 = 12;
const VELOCITY_OFFSET: i32 = 1008;
const WIDTH_OFFSET: i32 = 2004;

pub struct CcLayout;

impl DialectLayout for CcLayout {
    fn dialect(&self) -> Dialect {
        Dialect::Cc
    }

    fn probe_len(&self) -> usize {
        VOLUME_HEADER_LEN
    }

    fn radial_header_len(&self) -> usize {
        REFLECTIVITY_OFFSET as usize
    }

    fn parse_volume_header(&self, probe: &[u8]) -> Result<VolumeHeader> {
        require_len(Dialect::Cc, probe, VOLUME_HEADER_LEN)?;

        let scan_mode = u8_at(probe, 100);
        require_base_volume(
            Dialect::Cc,
            scan_mode as u32,
            u8_at(probe, 101) as u32,
            u16_le(probe, 102) as u32,
        )?;

        let name = ascii_field(probe, 0, 20);
        let id = ascii_field(probe, 20, 10);
        let sweep_count = (u8_at(probe, 112) as usize).min(MAX_SWEEPS);
        let sweeps = (0..sweep_count)
            .map(|i| {
                let at = SWEEP_TABLE + i * SWEEP_ENTRY_LEN;
                SweepInfo {
                    elevation_deg: i16_le(probe, at) as f32 / 100.0,
                    record_count: u16_le(probe, at + 2),
                    bin_count: GATES_PER_BLOCK,
                    bin_width: u16_le(probe, at + 4),
                    first_gate: 0,
                    max_velocity: u16_le(probe, at + 6) as f32 / 100.0,
                    reflectivity_only: false,
                }
            })
            .collect();

        Ok(VolumeHeader {
            header_len: VOLUME_HEADER_LEN as u64,
            record_size: RECORD_SIZE,
            title_time: calendar_at(probe, 104),
            station: station_at(probe, &id, &name, 50),
            station_id: non_empty(id),
            scan_mode: scan_mode as u16,
            sweeps,
            ..VolumeHeader::default()
        })
    }

    fn parse_header(&self, volume: &VolumeHeader, recno: u32, message_offset: u64, buf: &[u8]) -> Record {
        let mut record = Record::empty(Dialect::Cc, recno, message_offset, volume.record_size);
        record.azimuth_deg = u16_le(buf, 0) as f32 / 100.0;
        record.elevation_deg = i16_le(buf, 2) as f32 / 100.0;
        let day = volume.title_time.map(|t| t.julian_day).unwrap_or_default();
        record.data_time = DataTime::new(day, u32_le(buf, 4) as i64);
        record.vcp = volume.scan_mode;
        record.resolution = DOPPLER_RESOLUTION_HIGH;

        let position = match locate_in_sweeps(&volume.sweeps, recno) {
            Some(position) => position,
            None => {
                record.message_type = 0;
                return record;
            }
        };
        let sweep = &volume.sweeps[position.sweep];
        record.elevation_num = position.elevation_num;
        record.radial_num = position.radial_num;
        record.nyquist_velocity = sweep.max_velocity;

        let gate_size = sweep.bin_width as i32;
        let count = sweep.bin_count;
        record.reflectivity = GateGeometry::new(0, gate_size, count, REFLECTIVITY_OFFSET);
        record.velocity = GateGeometry::new(0, gate_size, count, VELOCITY_OFFSET);
        record.spectrum_width = GateGeometry::new(0, gate_size, count, WIDTH_OFFSET);
        record.has_reflect = count > 0;
        record.has_doppler = count > 0;
        record
    }
}
