//! CINRAD/SA and SB: NEXRAD-style digital radar data messages

use super::{non_empty, DialectLayout};
use crate::compression::{ARCHIVE_CONTAINER_TAG, ARCHIVE_HEADER_SIZE};
use crate::error::Result;
use crate::record::{GateGeometry, Record, VolumeHeader};
use crate::types::{DataTime, Dialect};
use crate::utils::{ascii_field, i16_le, i32_le, u16_le, u32_le};

/// Magic of an uncompressed archive file
pub const ARCHIVE2_TAG: &[u8; 8] = b"ARCHIVE2";

/// Record sizes in ascending order; the first that fits record 0 is used
pub const RECORD_SIZES: [u64; 3] = [2432, 3132, 4132];

/// Fixed bytes in a record besides the gate data
const RECORD_OVERHEAD: u64 = 128 + 4;

/// Bytes up to and including the nyquist velocity field
const RADIAL_HEADER_LEN: usize = 90;

/// Smallest standard record size holding the given gate counts
pub fn record_size_for(reflect_gates: u16, doppler_gates: u16) -> u64 {
    let needed = RECORD_OVERHEAD + reflect_gates as u64 + 2 * doppler_gates as u64;
    RECORD_SIZES
        .iter()
        .copied()
        .find(|&size| size >= needed)
        .unwrap_or(RECORD_SIZES[RECORD_SIZES.len() - 1])
}

pub struct SaLayout;

impl DialectLayout for SaLayout {
    fn dialect(&self) -> Dialect {
        Dialect::SaSb
    }

    fn probe_len(&self) -> usize {
        ARCHIVE_HEADER_SIZE + RADIAL_HEADER_LEN
    }

    fn radial_header_len(&self) -> usize {
        RADIAL_HEADER_LEN
    }

    fn parse_volume_header(&self, probe: &[u8]) -> Result<VolumeHeader> {
        let archived = probe.starts_with(ARCHIVE2_TAG) || probe.starts_with(ARCHIVE_CONTAINER_TAG);
        let mut header = VolumeHeader::default();

        if archived {
            header.header_len = ARCHIVE_HEADER_SIZE as u64;
            header.container_tag = non_empty(ascii_field(probe, 0, 8));
            header.volume_no = non_empty(ascii_field(probe, 9, 3));
            header.title_time = Some(DataTime::new(i32_le(probe, 12), i32_le(probe, 16) as i64));
            header.station_id = non_empty(ascii_field(probe, 20, 4));
        }

        // record size comes from record 0's gate counts
        let base = header.header_len as usize;
        header.record_size = if probe.len() >= base + 58 {
            record_size_for(u16_le(probe, base + 54), u16_le(probe, base + 56))
        } else {
            RECORD_SIZES[0]
        };
        Ok(header)
    }

    fn parse_header(&self, volume: &VolumeHeader, recno: u32, message_offset: u64, buf: &[u8]) -> Record {
        let mut record = Record::empty(Dialect::SaSb, recno, message_offset, volume.record_size);
        record.message_type = u16_le(buf, 14);
        record.data_time = DataTime::new(u16_le(buf, 32) as i32, u32_le(buf, 28) as i64);
        record.unambiguous_range_km = u16_le(buf, 34) as f32 / 10.0;
        record.azimuth_deg = angle(u16_le(buf, 36));
        record.radial_num = u16_le(buf, 38);
        record.radial_status = u16_le(buf, 40);
        record.elevation_deg = angle(u16_le(buf, 42));
        record.elevation_num = u16_le(buf, 44);

        let reflect_first = i16_le(buf, 46) as i32;
        let doppler_first = i16_le(buf, 48) as i32;
        let reflect_size = u16_le(buf, 50) as i32;
        let doppler_size = u16_le(buf, 52) as i32;
        let reflect_count = u16_le(buf, 54);
        let doppler_count = u16_le(buf, 56);
        let reflect_offset = i16_le(buf, 64) as i32;
        let velocity_offset = i16_le(buf, 66) as i32;
        let width_offset = i16_le(buf, 68) as i32;

        record.reflectivity = GateGeometry::new(reflect_first, reflect_size, reflect_count, reflect_offset);
        record.velocity = GateGeometry::new(doppler_first, doppler_size, doppler_count, velocity_offset);
        record.spectrum_width = GateGeometry::new(doppler_first, doppler_size, doppler_count, width_offset);
        record.resolution = u16_le(buf, 70);
        record.vcp = u16_le(buf, 72);
        record.nyquist_velocity = u16_le(buf, 88) as f32 / 100.0;

        record.has_reflect = reflect_count > 0 && reflect_offset > 0;
        record.has_doppler = doppler_count > 0 && (velocity_offset > 0 || width_offset > 0);
        record
    }
}

/// Binary angle code to degrees
fn angle(code: u16) -> f32 {
    code as f32 * 180.0 / 32768.0
}
