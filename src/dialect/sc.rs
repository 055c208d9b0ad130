//! CINRAD/SC: 1024 byte volume header, 4000 byte radials with interleaved bins

use super::{calendar_at, non_empty, require_len, station_at, DialectLayout};
use crate::error::Result;
use crate::record::{locate_in_sweeps, GateGeometry, Record, SweepInfo, VolumeHeader};
use crate::types::{Dialect, DOPPLER_RESOLUTION_HIGH};
use crate::utils::{ascii_field, i16_le, u16_le, u8_at};

pub const VOLUME_HEADER_LEN: usize = 1024;
pub const RECORD_SIZE: u64 = 4000;

/// Bins per radial, each `[Z, V, unfiltered Z, W]`
pub const BINS_PER_RADIAL: u16 = 998;

const SWEEP_TABLE: usize = 170;
const SWEEP_ENTRY_LEN: usize = 24;
const MAX_SWEEPS: usize = 30;

const REFLECTIVITY_OFFSET: i32 = 8;
const VELOCITY_OFFSET: i32 = 9;
const WIDTH_OFFSET: i32 = 11;

pub struct ScLayout;

impl DialectLayout for ScLayout {
    fn dialect(&self) -> Dialect {
        Dialect::Sc
    }

    fn probe_len(&self) -> usize {
        VOLUME_HEADER_LEN
    }

    fn radial_header_len(&self) -> usize {
        8
    }

    fn parse_volume_header(&self, probe: &[u8]) -> Result<VolumeHeader> {
        require_len(Dialect::Sc, probe, VOLUME_HEADER_LEN)?;

        let name = ascii_field(probe, 50, 20);
        let id = ascii_field(probe, 70, 10);
        let sweep_count = (u8_at(probe, 161) as usize).min(MAX_SWEEPS);

        let sweeps = (0..sweep_count)
            .map(|i| {
                let at = SWEEP_TABLE + i * SWEEP_ENTRY_LEN;
                SweepInfo {
                    elevation_deg: i16_le(probe, at + 20) as f32 / 100.0,
                    record_count: u16_le(probe, at + 18),
                    bin_count: u16_le(probe, at + 16).min(BINS_PER_RADIAL),
                    bin_width: u16_le(probe, at + 14),
                    first_gate: 0,
                    max_velocity: u16_le(probe, at + 10) as f32 / 100.0,
                    reflectivity_only: u8_at(probe, at) == 1,
                }
            })
            .collect();

        Ok(VolumeHeader {
            header_len: VOLUME_HEADER_LEN as u64,
            record_size: RECORD_SIZE,
            title_time: calendar_at(probe, 162),
            station: station_at(probe, &id, &name, 132),
            station_id: non_empty(id),
            scan_mode: u8_at(probe, 160) as u16,
            sweeps,
            ..VolumeHeader::default()
        })
    }

    fn parse_header(&self, volume: &VolumeHeader, recno: u32, message_offset: u64, buf: &[u8]) -> Record {
        let mut record = Record::empty(Dialect::Sc, recno, message_offset, volume.record_size);
        record.azimuth_deg = angle(u16_le(buf, 0));
        record.elevation_deg = angle(u16_le(buf, 2));
        record.data_time = volume.title_time.unwrap_or_default();
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
        if !sweep.reflectivity_only {
            record.velocity = GateGeometry::new(0, gate_size, count, VELOCITY_OFFSET);
            record.spectrum_width = GateGeometry::new(0, gate_size, count, WIDTH_OFFSET);
        }
        record.has_reflect = count > 0;
        record.has_doppler = count > 0 && !sweep.reflectivity_only;
        record
    }
}

fn angle(code: u16) -> f32 {
    code as f32 * 360.0 / 65536.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RadarError;

    fn probe() -> Vec<u8> {
        let mut buf = vec![0u8; VOLUME_HEADER_LEN];
        buf[50..59].copy_from_slice(b"Chengdu  ");
        buf[70..75].copy_from_slice(b"Z9280");
        buf[132..136].copy_from_slice(&104_000i32.to_le_bytes());
        buf[136..140].copy_from_slice(&30_650i32.to_le_bytes());
        buf[160] = 21;
        buf[161] = 2;
        buf[162..164].copy_from_slice(&2010u16.to_le_bytes());
        buf[164..169].copy_from_slice(&[7, 1, 0, 6, 0]);
        for (i, (only_z, count)) in [(1u8, 2u16), (0, 3)].iter().enumerate() {
            let at = SWEEP_TABLE + i * SWEEP_ENTRY_LEN;
            buf[at] = *only_z;
            buf[at + 10..at + 12].copy_from_slice(&2700u16.to_le_bytes());
            buf[at + 14..at + 16].copy_from_slice(&300u16.to_le_bytes());
            buf[at + 16..at + 18].copy_from_slice(&2000u16.to_le_bytes());
            buf[at + 18..at + 20].copy_from_slice(&count.to_le_bytes());
            buf[at + 20..at + 22].copy_from_slice(&(50i16 * (i as i16 + 1)).to_le_bytes());
        }
        buf
    }

    #[test]
    fn test_short_header_is_invalid() {
        assert!(matches!(
            ScLayout.parse_volume_header(&[0u8; 100]),
            Err(RadarError::InvalidFormat(_))
        ));
    }

    #[test]
    fn test_volume_header() {
        let header = ScLayout.parse_volume_header(&probe()).unwrap();
        assert_eq!(header.record_size, 4000);
        assert_eq!(header.scan_mode, 21);
        assert_eq!(header.sweeps.len(), 2);
        assert_eq!(header.sweeps[0].bin_count, BINS_PER_RADIAL);
        assert!(header.sweeps[0].reflectivity_only);
        assert_eq!(header.station_id.as_deref(), Some("Z9280"));
        let station = header.station.unwrap();
        assert_eq!(station.name, "Chengdu");
        assert!((station.longitude - 104.0).abs() < 1e-9);
        assert_eq!(header.title_time.unwrap().to_string(), "2010-07-01T00:06:00.000Z");
    }

    #[test]
    fn test_records_follow_sweep_table() {
        let header = ScLayout.parse_volume_header(&probe()).unwrap();
        let mut buf = vec![0u8; RECORD_SIZE as usize];
        buf[0..2].copy_from_slice(&16384u16.to_le_bytes());

        let first = ScLayout.parse_header(&header, 1, 5024, &buf);
        assert_eq!((first.elevation_num, first.radial_num), (1, 2));
        assert_eq!(first.azimuth_deg, 90.0);
        assert!(first.has_reflect && !first.has_doppler);
        assert_eq!(first.velocity.data_offset, 0);

        let second = ScLayout.parse_header(&header, 2, 9024, &buf);
        assert_eq!((second.elevation_num, second.radial_num), (2, 1));
        assert!(second.has_doppler);
        assert_eq!(second.spectrum_width.data_offset, 11);
        assert_eq!(second.vcp, 21);

        let past = ScLayout.parse_header(&header, 5, 21024, &buf);
        assert!(!past.is_data());
    }
}
