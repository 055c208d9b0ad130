//! Canonical radial records and the sequential record reader

use crate::dialect::{layout_for, DialectLayout};
use crate::error::Result;
use crate::io::{read_at, stream_len};
use crate::metadata::Station;
use crate::types::{DataTime, Dialect, Moment};
use chrono::{DateTime, Utc};
use std::fmt;
use std::io::{Read, Seek};
use tracing::debug;

/// Message type of radial data records
pub const DIGITAL_RADAR_DATA: u16 = 1;

/// Where one moment's gates sit inside a record
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GateGeometry {
    /// Distance to the first gate, in meters
    pub first_gate: i32,
    /// Gate spacing, in meters
    pub gate_size: i32,
    pub gate_count: u16,
    /// Byte offset of the first gate from the dialect's data base; zero or
    /// negative when the moment is absent
    pub data_offset: i32,
}

impl GateGeometry {
    pub fn new(first_gate: i32, gate_size: i32, gate_count: u16, data_offset: i32) -> Self {
        Self {
            first_gate,
            gate_size,
            gate_count,
            data_offset,
        }
    }

    pub fn is_present(&self) -> bool {
        self.data_offset > 0 && self.gate_count > 0
    }

    /// Distance to the far edge of the last gate, in meters
    pub fn range_end(&self) -> i64 {
        self.first_gate as i64 + self.gate_count as i64 * self.gate_size as i64
    }
}

/// One radial: its header values plus where its moment data lives
///
/// Built once per on-disk record and never modified afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub dialect: Dialect,
    /// Sequence index of the record in the file
    pub recno: u32,
    /// Absolute byte offset of the record
    pub message_offset: u64,
    /// Size of the record slot in bytes
    pub record_size: u64,
    pub message_type: u16,
    pub data_time: DataTime,
    pub azimuth_deg: f32,
    pub elevation_deg: f32,
    /// Sweep index, 1-based
    pub elevation_num: u16,
    /// Position within the sweep, 1-based
    pub radial_num: u16,
    pub radial_status: u16,
    pub reflectivity: GateGeometry,
    pub velocity: GateGeometry,
    pub spectrum_width: GateGeometry,
    /// Doppler resolution code
    pub resolution: u16,
    pub vcp: u16,
    pub unambiguous_range_km: f32,
    pub nyquist_velocity: f32,
    pub has_reflect: bool,
    pub has_doppler: bool,
}

impl Record {
    /// A data record with no moments, for dialect parsers to fill in
    pub fn empty(dialect: Dialect, recno: u32, message_offset: u64, record_size: u64) -> Self {
        Self {
            dialect,
            recno,
            message_offset,
            record_size,
            message_type: DIGITAL_RADAR_DATA,
            data_time: DataTime::default(),
            azimuth_deg: f32::NAN,
            elevation_deg: f32::NAN,
            elevation_num: 0,
            radial_num: 0,
            radial_status: 0,
            reflectivity: GateGeometry::default(),
            velocity: GateGeometry::default(),
            spectrum_width: GateGeometry::default(),
            resolution: 0,
            vcp: 0,
            unambiguous_range_km: f32::NAN,
            nyquist_velocity: f32::NAN,
            has_reflect: false,
            has_doppler: false,
        }
    }

    pub fn is_data(&self) -> bool {
        self.message_type == DIGITAL_RADAR_DATA
    }

    pub fn geometry(&self, moment: Moment) -> &GateGeometry {
        match moment {
            Moment::Reflectivity => &self.reflectivity,
            Moment::Velocity => &self.velocity,
            Moment::SpectrumWidth => &self.spectrum_width,
        }
    }

    pub fn gate_count(&self, moment: Moment) -> u16 {
        self.geometry(moment).gate_count
    }

    pub fn gate_size(&self, moment: Moment) -> i32 {
        self.geometry(moment).gate_size
    }

    pub fn gate_start(&self, moment: Moment) -> i32 {
        self.geometry(moment).first_gate
    }

    pub fn data_offset(&self, moment: Moment) -> i32 {
        self.geometry(moment).data_offset
    }

    /// Absolute position of a moment's first gate
    pub fn data_position(&self, moment: Moment) -> u64 {
        let offset = self.data_offset(moment).max(0) as u64;
        self.message_offset + self.dialect.data_base() + offset
    }

    pub fn date(&self) -> DateTime<Utc> {
        self.data_time.to_datetime()
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "record {} elev_num={} radial={} az={:.2} el={:.2} {}",
            self.recno, self.elevation_num, self.radial_num, self.azimuth_deg, self.elevation_deg, self.data_time
        )
    }
}

/// One sweep's entry in a dialect's volume header table
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SweepInfo {
    pub elevation_deg: f32,
    /// Radials recorded for this sweep
    pub record_count: u16,
    pub bin_count: u16,
    /// Gate spacing in meters
    pub bin_width: u16,
    /// Distance to the first gate in meters
    pub first_gate: i32,
    /// Nyquist velocity in m/s
    pub max_velocity: f32,
    /// Only reflectivity was collected
    pub reflectivity_only: bool,
}

/// Where a record index falls in a sweep table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SweepPosition {
    pub sweep: usize,
    /// 1-based
    pub elevation_num: u16,
    /// 1-based
    pub radial_num: u16,
}

/// Map a record index onto the sweep table's cumulative record counts
pub fn locate_in_sweeps(sweeps: &[SweepInfo], recno: u32) -> Option<SweepPosition> {
    let mut start = 0u32;
    for (i, sweep) in sweeps.iter().enumerate() {
        let end = start + sweep.record_count as u32;
        if recno < end {
            return Some(SweepPosition {
                sweep: i,
                elevation_num: (i + 1) as u16,
                radial_num: (recno - start + 1) as u16,
            });
        }
        start = end;
    }
    None
}

/// File-level layout and metadata resolved before the first record
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VolumeHeader {
    /// Bytes before record 0
    pub header_len: u64,
    /// Bytes per record slot
    pub record_size: u64,
    /// Archive magic (`ARCHIVE2`, `AR2V0001`) when present
    pub container_tag: Option<String>,
    pub volume_no: Option<String>,
    pub title_time: Option<DataTime>,
    pub station_id: Option<String>,
    /// Site coordinates carried by the header itself
    pub station: Option<Station>,
    pub scan_mode: u16,
    /// CC20 record form selector
    pub data_form: u8,
    pub sweeps: Vec<SweepInfo>,
    /// Records past this index are not part of the volume
    pub record_bound: Option<u32>,
}

impl VolumeHeader {
    pub fn total_sweep_records(&self) -> u32 {
        self.sweeps.iter().map(|s| s.record_count as u32).sum()
    }
}

/// Result of reading one record slot
#[derive(Debug, Clone, PartialEq)]
pub enum ReadOutcome {
    Record(Box<Record>),
    /// No more records; normal termination
    EndOfScan,
}

/// Reads fixed-size records of one dialect from a stream
///
/// The volume header is parsed on the first read and the record size is then
/// held fixed for the rest of the file.
pub struct RecordReader {
    dialect: Dialect,
    layout: Box<dyn DialectLayout>,
    header: Option<VolumeHeader>,
    stream_len: u64,
    buf: Vec<u8>,
}

impl RecordReader {
    pub fn new(dialect: Dialect) -> Self {
        Self {
            dialect,
            layout: layout_for(dialect),
            header: None,
            stream_len: 0,
            buf: Vec::new(),
        }
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    /// The resolved volume header, once the first read has happened
    pub fn volume_header(&self) -> Option<&VolumeHeader> {
        self.header.as_ref()
    }

    /// Resolve the volume header; later calls return the cached result
    pub fn prepare<S: Read + Seek + ?Sized>(&mut self, stream: &mut S) -> Result<&VolumeHeader> {
        let header = match self.header.take() {
            Some(header) => header,
            None => {
                self.stream_len = stream_len(stream)?;
                let mut probe = vec![0u8; self.layout.probe_len()];
                let n = read_at(stream, 0, &mut probe)?;
                probe.truncate(n);
                let header = self.layout.parse_volume_header(&probe)?;
                debug!(
                    dialect = %self.dialect,
                    header_len = header.header_len,
                    record_size = header.record_size,
                    sweeps = header.sweeps.len(),
                    "resolved volume layout"
                );
                header
            }
        };
        let header: &VolumeHeader = self.header.insert(header);
        Ok(header)
    }

    /// Read record `index`, or report the end of the scan
    pub fn read_record<S: Read + Seek + ?Sized>(&mut self, stream: &mut S, index: u32) -> Result<ReadOutcome> {
        let (header_len, record_size) = {
            let header = self.prepare(stream)?;
            (header.header_len, header.record_size)
        };

        let offset = header_len + index as u64 * record_size;
        if offset >= self.stream_len {
            return Ok(ReadOutcome::EndOfScan);
        }

        let want = record_size.min(self.stream_len - offset) as usize;
        self.buf.resize(want, 0);
        let got = read_at(stream, offset, &mut self.buf)?;
        if got < self.layout.radial_header_len() {
            debug!(index, got, "short final record");
            return Ok(ReadOutcome::EndOfScan);
        }

        match &self.header {
            Some(header) => {
                let record = self.layout.parse_header(header, index, offset, &self.buf[..got]);
                Ok(ReadOutcome::Record(Box::new(record)))
            }
            None => Ok(ReadOutcome::EndOfScan),
        }
    }
}

/// Read one record of `dialect` at `index`
///
/// Convenience for one-off reads; resolves the volume header on every call,
/// so sequential scans should keep a [`RecordReader`].
pub fn read_record<S: Read + Seek + ?Sized>(dialect: Dialect, stream: &mut S, index: u32) -> Result<ReadOutcome> {
    RecordReader::new(dialect).read_record(stream, index)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sweep(count: u16) -> SweepInfo {
        SweepInfo {
            record_count: count,
            ..SweepInfo::default()
        }
    }

    #[test]
    fn test_locate_in_sweeps() {
        let sweeps = vec![sweep(3), sweep(0), sweep(2)];
        assert_eq!(
            locate_in_sweeps(&sweeps, 0),
            Some(SweepPosition { sweep: 0, elevation_num: 1, radial_num: 1 })
        );
        assert_eq!(locate_in_sweeps(&sweeps, 2).unwrap().radial_num, 3);
        let pos = locate_in_sweeps(&sweeps, 3).unwrap();
        assert_eq!((pos.sweep, pos.elevation_num, pos.radial_num), (2, 3, 1));
        assert_eq!(locate_in_sweeps(&sweeps, 5), None);
    }

    #[test]
    fn test_gate_geometry() {
        let g = GateGeometry::new(1000, 250, 4, 100);
        assert!(g.is_present());
        assert_eq!(g.range_end(), 2000);
        assert!(!GateGeometry::new(0, 250, 4, 0).is_present());
        assert!(!GateGeometry::new(0, 250, 0, 100).is_present());
    }

    #[test]
    fn test_data_position() {
        let mut r = Record::empty(Dialect::SaSb, 2, 4864, 2432);
        r.reflectivity = GateGeometry::new(0, 1000, 460, 100);
        assert_eq!(r.data_position(Moment::Reflectivity), 4864 + 28 + 100);
        assert!(r.is_data());
    }
}
