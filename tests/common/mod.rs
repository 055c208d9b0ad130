//! Synthetic radar files for integration tests
//!
//! Every builder writes the exact byte layout the decoder reads, with gate
//! bytes filled from the `*_FILL` constants so tests can tell real data from
//! the missing-data sentinel.

#![allow(dead_code)]

use bzip2::write::BzEncoder;
use cinrad2::dialect::record_size_for;
use std::io::Write;

pub const REFLECT_FILL: u8 = 100;
pub const VELOCITY_FILL: u8 = 128;
pub const WIDTH_FILL: u8 = 10;

fn put_u16(buf: &mut [u8], offset: usize, value: u16) {
    buf[offset..offset + 2].copy_from_slice(&value.to_le_bytes());
}

fn put_i16(buf: &mut [u8], offset: usize, value: i16) {
    buf[offset..offset + 2].copy_from_slice(&value.to_le_bytes());
}

fn put_u32(buf: &mut [u8], offset: usize, value: u32) {
    buf[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
}

fn put_i32(buf: &mut [u8], offset: usize, value: i32) {
    buf[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
}

fn fill(buf: &mut [u8], start: usize, count: usize, stride: usize, value: u8) {
    for i in 0..count {
        if let Some(b) = buf.get_mut(start + i * stride) {
            *b = value;
        }
    }
}

/// One SA/SB digital radar data message
#[derive(Debug, Clone)]
pub struct SaRecord {
    pub message_type: u16,
    pub msecs: u32,
    pub julian_day: u16,
    pub azimuth_code: u16,
    pub elevation_code: u16,
    pub radial_num: u16,
    pub elevation_num: u16,
    pub reflect_gates: u16,
    pub doppler_gates: u16,
    pub reflect_gate_size: u16,
    pub doppler_gate_size: u16,
    pub reflect_offset: i16,
    pub velocity_offset: i16,
    pub width_offset: i16,
    pub resolution: u16,
    pub vcp: u16,
}

impl Default for SaRecord {
    fn default() -> Self {
        Self {
            message_type: 1,
            msecs: 61_260_000,
            julian_day: 14_423,
            azimuth_code: 0,
            elevation_code: 91,
            radial_num: 1,
            elevation_num: 1,
            reflect_gates: 460,
            doppler_gates: 0,
            reflect_gate_size: 1000,
            doppler_gate_size: 250,
            reflect_offset: 100,
            velocity_offset: 0,
            width_offset: 0,
            resolution: 2,
            vcp: 21,
        }
    }
}

impl SaRecord {
    /// Reflectivity only radial
    pub fn reflectivity(elevation_num: u16, radial_num: u16) -> Self {
        Self {
            elevation_num,
            radial_num,
            azimuth_code: radial_num.wrapping_mul(182),
            msecs: 61_260_000 + radial_num as u32 * 100,
            ..Self::default()
        }
    }

    /// Radial carrying all three moments
    pub fn full(elevation_num: u16, radial_num: u16) -> Self {
        Self {
            doppler_gates: 920,
            velocity_offset: 560,
            width_offset: 1480,
            ..Self::reflectivity(elevation_num, radial_num)
        }
    }

    pub fn encode(&self, size: usize) -> Vec<u8> {
        let mut buf = vec![0u8; size];
        put_u16(&mut buf, 14, self.message_type);
        put_u32(&mut buf, 28, self.msecs);
        put_u16(&mut buf, 32, self.julian_day);
        put_u16(&mut buf, 34, 4600);
        put_u16(&mut buf, 36, self.azimuth_code);
        put_u16(&mut buf, 38, self.radial_num);
        put_u16(&mut buf, 42, self.elevation_code);
        put_u16(&mut buf, 44, self.elevation_num);
        put_u16(&mut buf, 50, self.reflect_gate_size);
        put_u16(&mut buf, 52, self.doppler_gate_size);
        put_u16(&mut buf, 54, self.reflect_gates);
        put_u16(&mut buf, 56, self.doppler_gates);
        put_i16(&mut buf, 64, self.reflect_offset);
        put_i16(&mut buf, 66, self.velocity_offset);
        put_i16(&mut buf, 68, self.width_offset);
        put_u16(&mut buf, 70, self.resolution);
        put_u16(&mut buf, 72, self.vcp);
        put_u16(&mut buf, 88, 2650);

        if self.reflect_offset > 0 {
            fill(&mut buf, 28 + self.reflect_offset as usize, self.reflect_gates as usize, 1, REFLECT_FILL);
        }
        if self.velocity_offset > 0 {
            fill(&mut buf, 28 + self.velocity_offset as usize, self.doppler_gates as usize, 1, VELOCITY_FILL);
        }
        if self.width_offset > 0 {
            fill(&mut buf, 28 + self.width_offset as usize, self.doppler_gates as usize, 1, WIDTH_FILL);
        }
        buf
    }
}

/// 24 byte archive header
pub fn archive_header(tag: &[u8; 8], station: &[u8; 4]) -> Vec<u8> {
    let mut header = tag.to_vec();
    header.extend_from_slice(b".001");
    header.extend_from_slice(&14_423i32.to_le_bytes());
    header.extend_from_slice(&61_260_000i32.to_le_bytes());
    header.extend_from_slice(station);
    header
}

/// Record size the decoder will pick for these records
pub fn sa_record_size(records: &[SaRecord]) -> usize {
    records
        .first()
        .map_or(2432, |r| record_size_for(r.reflect_gates, r.doppler_gates) as usize)
}

/// Plain SA file, optionally behind an archive header
pub fn sa_file(records: &[SaRecord], header: Option<Vec<u8>>) -> Vec<u8> {
    let size = sa_record_size(records);
    let mut out = header.unwrap_or_default();
    for record in records {
        out.extend_from_slice(&record.encode(size));
    }
    out
}

pub fn bzip2(data: &[u8]) -> Vec<u8> {
    let mut encoder = BzEncoder::new(Vec::new(), bzip2::Compression::default());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

pub fn gzip(data: &[u8]) -> Vec<u8> {
    let mut encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

/// AR2V0001 container holding one bzip2 chunk per record
///
/// The chunk at `corrupt` keeps its `BZh9` prefix but is otherwise garbage.
pub fn ar2v_file(records: &[SaRecord], corrupt: Option<usize>) -> Vec<u8> {
    let size = sa_record_size(records);
    let mut out = archive_header(b"AR2V0001", b"CHGZ");
    for (i, record) in records.iter().enumerate() {
        let chunk = if corrupt == Some(i) {
            let mut broken = b"BZh9".to_vec();
            broken.extend_from_slice(&[0xAA; 64]);
            broken
        } else {
            bzip2(&record.encode(size))
        };
        let len = chunk.len() as i32;
        let len = if i + 1 == records.len() { -len } else { len };
        out.extend_from_slice(&len.to_be_bytes());
        out.extend_from_slice(&chunk);
    }
    out
}

/// SC file: `sweeps` lists `(reflectivity_only, record_count)`
pub fn sc_file(sweeps: &[(bool, u16)], bin_count: u16) -> Vec<u8> {
    let mut out = vec![0u8; 1024];
    out[0..5].copy_from_slice(b"China");
    out[50..57].copy_from_slice(b"Chengdu");
    out[70..75].copy_from_slice(b"Z9280");
    put_i32(&mut out, 132, 104_000);
    put_i32(&mut out, 136, 30_650);
    put_i32(&mut out, 140, 580_000);
    out[160] = 21;
    out[161] = sweeps.len() as u8;
    put_u16(&mut out, 162, 2010);
    out[164..169].copy_from_slice(&[7, 1, 0, 6, 0]);
    for (i, (only_z, count)) in sweeps.iter().enumerate() {
        let at = 170 + i * 24;
        out[at] = if *only_z { 1 } else { 0 };
        put_u16(&mut out, at + 10, 2700);
        put_u16(&mut out, at + 14, 300);
        put_u16(&mut out, at + 16, bin_count);
        put_u16(&mut out, at + 18, *count);
        put_i16(&mut out, at + 20, 50 * (i as i16 + 1));
    }

    for (i, (_, count)) in sweeps.iter().enumerate() {
        for radial in 0..*count {
            let mut record = vec![0u8; 4000];
            put_u16(&mut record, 0, radial.wrapping_mul(182));
            put_u16(&mut record, 2, (50 * (i as u32 + 1) * 65536 / 36000) as u16);
            fill(&mut record, 8, bin_count as usize, 4, REFLECT_FILL);
            fill(&mut record, 9, bin_count as usize, 4, VELOCITY_FILL);
            fill(&mut record, 10, bin_count as usize, 4, REFLECT_FILL - 1);
            fill(&mut record, 11, bin_count as usize, 4, WIDTH_FILL);
            out.extend_from_slice(&record);
        }
    }
    out
}

/// CC file with the given header codes and per-sweep radial counts
pub fn cc_file(scan_mode: u8, echo_type: u8, product_code: u16, counts: &[u16]) -> Vec<u8> {
    let mut out = vec![0u8; 1024];
    out[0..5].copy_from_slice(b"Hefei");
    out[20..25].copy_from_slice(b"Z9551");
    put_i32(&mut out, 50, 117_250);
    put_i32(&mut out, 54, 31_870);
    put_i32(&mut out, 58, 165_500);
    out[100] = scan_mode;
    out[101] = echo_type;
    put_u16(&mut out, 102, product_code);
    put_u16(&mut out, 104, 2012);
    out[106..111].copy_from_slice(&[3, 4, 5, 6, 7]);
    out[112] = counts.len() as u8;
    for (i, count) in counts.iter().enumerate() {
        let at = 114 + i * 8;
        put_i16(&mut out, at, 50 + 100 * i as i16);
        put_u16(&mut out, at + 2, *count);
        put_u16(&mut out, at + 4, 300);
        put_u16(&mut out, at + 6, 1600);
    }

    for (i, count) in counts.iter().enumerate() {
        for radial in 0..*count {
            let mut record = vec![0u8; 3000];
            put_u16(&mut record, 0, radial * 100);
            put_i16(&mut record, 2, 50 + 100 * i as i16);
            put_u32(&mut record, 4, 22_000_000 + radial as u32 * 50);
            fill(&mut record, 12, 996, 1, REFLECT_FILL);
            fill(&mut record, 1008, 996, 1, VELOCITY_FILL);
            fill(&mut record, 2004, 996, 1, WIDTH_FILL);
            out.extend_from_slice(&record);
        }
    }
    out
}

/// CC 2.0 file; `extra` records past the header's record count are appended
pub fn cc20_file(data_form: u8, counts: &[u16], extra: usize) -> Vec<u8> {
    let mut out = vec![0u8; 2060];
    out[0..4].copy_from_slice(b"Xian");
    out[16..21].copy_from_slice(b"Z9290");
    put_i32(&mut out, 40, 108_940);
    put_i32(&mut out, 44, 34_340);
    put_i32(&mut out, 48, 470_000);
    out[100] = 10;
    out[101] = 3;
    put_u16(&mut out, 102, 1);
    out[104] = data_form;
    put_u16(&mut out, 106, 2015);
    out[108..113].copy_from_slice(&[8, 9, 10, 11, 12]);
    out[114] = counts.len() as u8;
    for (i, count) in counts.iter().enumerate() {
        let at = 116 + i * 16;
        put_i16(&mut out, at, 50 + 100 * i as i16);
        put_u16(&mut out, at + 2, *count);
        put_u16(&mut out, at + 4, 800);
        put_u16(&mut out, at + 6, 150);
        put_u16(&mut out, at + 8, 2000);
        put_u16(&mut out, at + 10, 75);
    }

    let (size, z, v, w) = if data_form == 24 {
        (4011, 1011, 2011, 3011)
    } else {
        (3011, 11, 1011, 2011)
    };
    let radials = counts
        .iter()
        .enumerate()
        .flat_map(|(i, count)| (1..=*count).map(move |r| (i, r)))
        .chain((0..extra).map(|r| (0, r as u16 + 1)));
    for (sweep, radial) in radials {
        let mut record = vec![0u8; size];
        put_u16(&mut record, 0, radial * 100);
        put_i16(&mut record, 2, 50 + 100 * sweep as i16);
        put_u32(&mut record, 4, 40_000_000 + radial as u32 * 60);
        put_u16(&mut record, 8, radial);
        if data_form == 24 {
            fill(&mut record, 11, 800, 1, REFLECT_FILL - 1);
        }
        fill(&mut record, z, 800, 1, REFLECT_FILL);
        fill(&mut record, v, 800, 1, VELOCITY_FILL);
        fill(&mut record, w, 800, 1, WIDTH_FILL);
        out.extend_from_slice(&record);
    }
    out
}
