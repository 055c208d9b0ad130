//! Volume scan assembly
//!
//! Records are read sequentially, checked, and grouped per sweep into two
//! families: records carrying reflectivity and records carrying velocity and
//! spectrum width. Inconsistencies that do not make the file unreadable are
//! collected as [`ScanWarning`]s.

use crate::compression::{ArchiveReport, CompressionMethod};
use crate::config::DecoderConfig;
use crate::error::{RadarError, Result};
use crate::metadata::{Station, StationTable};
use crate::record::{ReadOutcome, Record, RecordReader, VolumeHeader};
use crate::types::{vcp_name, DataTime, Dialect, Family, Moment};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::{Read, Seek};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Lifecycle of a [`VolumeScanAssembler`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AssemblyState {
    #[default]
    Unopened,
    DialectDetermined,
    Decompressing,
    Scanning,
    Grouped,
    Ready,
    Failed,
}

/// Shared flag for stopping an assembly in progress
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// A recoverable inconsistency found while assembling a scan
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ScanWarning {
    #[error("record {recno}: {moment} data offset {offset} outside {record_size} byte record")]
    BadDataOffset {
        recno: u32,
        moment: Moment,
        offset: i32,
        record_size: u64,
    },

    #[error("record {recno}: velocity data without spectrum width")]
    VelocityWithoutSpectrumWidth { recno: u32 },

    #[error("record {recno}: spectrum width data without velocity")]
    SpectrumWidthWithoutVelocity { recno: u32 },

    #[error("record {recno}: no reflectivity or doppler data")]
    NoMomentData { recno: u32 },

    #[error("record {recno}: past the {bound} records listed in the volume header")]
    BeyondRecordBound { recno: u32, bound: u32 },

    #[error("{family} scan {elevation_num}: record {recno} has radial {radial_num} out of range")]
    RadialOutOfRange {
        family: Family,
        elevation_num: u16,
        recno: u32,
        radial_num: u16,
    },

    #[error("{family} scan {elevation_num}: duplicate radial {radial_num}")]
    DuplicateRadial {
        family: Family,
        elevation_num: u16,
        radial_num: u16,
    },

    #[error("{family} scan {elevation_num}: {records} records but first missing radial is {first_missing}")]
    MissingRadials {
        family: Family,
        elevation_num: u16,
        records: usize,
        first_missing: usize,
    },

    #[error("{family} scan {elevation_num}: record {recno} gate size {found} != {expected}")]
    GateSizeDrift {
        family: Family,
        elevation_num: u16,
        recno: u32,
        expected: i32,
        found: i32,
    },

    #[error("{family} scan {elevation_num}: record {recno} gate start {found} != {expected}")]
    GateStartDrift {
        family: Family,
        elevation_num: u16,
        recno: u32,
        expected: i32,
        found: i32,
    },

    #[error("{family} scan {elevation_num}: record {recno} resolution {found} != {expected}")]
    ResolutionDrift {
        family: Family,
        elevation_num: u16,
        recno: u32,
        expected: u16,
        found: u16,
    },

    #[error("{family} scan {elevation_num}: gate size {found} differs from first scan's {expected}")]
    ScanGateSizeDrift {
        family: Family,
        elevation_num: u16,
        expected: i32,
        found: i32,
    },

    #[error("{family} scan {elevation_num}: gate start {found} differs from first scan's {expected}")]
    ScanGateStartDrift {
        family: Family,
        elevation_num: u16,
        expected: i32,
        found: i32,
    },

    #[error("doppler scan {elevation_num}: resolution {found} differs from first scan's {expected}")]
    MixedDopplerResolution {
        elevation_num: u16,
        expected: u16,
        found: u16,
    },

    #[error("archive chunk {chunk} failed to decompress; its radials are missing")]
    ChunkDropped { chunk: usize },
}

impl ScanWarning {
    /// Stable short name of the warning kind
    pub fn kind(&self) -> &'static str {
        match self {
            ScanWarning::BadDataOffset { .. } => "bad_data_offset",
            ScanWarning::VelocityWithoutSpectrumWidth { .. } => "velocity_without_spectrum_width",
            ScanWarning::SpectrumWidthWithoutVelocity { .. } => "spectrum_width_without_velocity",
            ScanWarning::NoMomentData { .. } => "no_moment_data",
            ScanWarning::BeyondRecordBound { .. } => "beyond_record_bound",
            ScanWarning::RadialOutOfRange { .. } => "radial_out_of_range",
            ScanWarning::DuplicateRadial { .. } => "duplicate_radial",
            ScanWarning::MissingRadials { .. } => "missing_radials",
            ScanWarning::GateSizeDrift { .. } => "gate_size_drift",
            ScanWarning::GateStartDrift { .. } => "gate_start_drift",
            ScanWarning::ResolutionDrift { .. } => "resolution_drift",
            ScanWarning::ScanGateSizeDrift { .. } => "scan_gate_size_drift",
            ScanWarning::ScanGateStartDrift { .. } => "scan_gate_start_drift",
            ScanWarning::MixedDopplerResolution { .. } => "mixed_doppler_resolution",
            ScanWarning::ChunkDropped { .. } => "chunk_dropped",
        }
    }
}

/// Records of one sweep within one family, in file order
#[derive(Debug, Clone)]
pub struct ScanGroup {
    pub elevation_num: u16,
    pub records: Vec<Arc<Record>>,
}

impl ScanGroup {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn first(&self) -> Option<&Arc<Record>> {
        self.records.first()
    }

    /// Mean elevation angle of the sweep's radials
    pub fn mean_elevation(&self) -> Option<f32> {
        let angles: Vec<f32> = self
            .records
            .iter()
            .map(|r| r.elevation_deg)
            .filter(|e| e.is_finite())
            .collect();
        if angles.is_empty() {
            return None;
        }
        Some(angles.iter().sum::<f32>() / angles.len() as f32)
    }
}

/// A fully assembled volume scan
#[derive(Debug, Clone)]
pub struct VolumeScan {
    dialect: Dialect,
    compression: CompressionMethod,
    container: Option<String>,
    volume_no: Option<String>,
    title_time: Option<DataTime>,
    station_id: Option<String>,
    station: Option<Station>,
    vcp: u16,
    max_radials: usize,
    min_radials: usize,
    doppler_resolution: u16,
    has_mixed_doppler_resolution: bool,
    records_read: u32,
    first_record: Option<Arc<Record>>,
    last_record: Option<Arc<Record>>,
    reflectivity_groups: Vec<ScanGroup>,
    velocity_groups: Vec<ScanGroup>,
    warnings: Vec<ScanWarning>,
}

impl VolumeScan {
    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    /// Format tag, e.g. `CINRAD-SA`
    pub fn data_format(&self) -> &'static str {
        self.dialect.data_format()
    }

    pub fn compression(&self) -> CompressionMethod {
        self.compression
    }

    /// Archive magic such as `ARCHIVE2` or `AR2V0001`
    pub fn container(&self) -> Option<&str> {
        self.container.as_deref()
    }

    pub fn volume_no(&self) -> Option<&str> {
        self.volume_no.as_deref()
    }

    pub fn title_time(&self) -> Option<DataTime> {
        self.title_time
    }

    pub fn station_id(&self) -> Option<&str> {
        self.station
            .as_ref()
            .map(|s| s.id.as_str())
            .or(self.station_id.as_deref())
    }

    pub fn station(&self) -> Option<&Station> {
        self.station.as_ref()
    }

    pub fn station_name(&self) -> Option<&str> {
        self.station.as_ref().map(|s| s.name.as_str())
    }

    pub fn station_latitude(&self) -> Option<f64> {
        self.station.as_ref().map(|s| s.latitude)
    }

    pub fn station_longitude(&self) -> Option<f64> {
        self.station.as_ref().map(|s| s.longitude)
    }

    pub fn station_elevation(&self) -> Option<f64> {
        self.station.as_ref().map(|s| s.elevation)
    }

    /// Time of the first data record
    pub fn start_date(&self) -> Option<DateTime<Utc>> {
        self.first_record.as_ref().map(|r| r.date())
    }

    /// Time of the last data record
    pub fn end_date(&self) -> Option<DateTime<Utc>> {
        self.last_record.as_ref().map(|r| r.date())
    }

    pub fn vcp(&self) -> u16 {
        self.vcp
    }

    pub fn vcp_name(&self) -> &'static str {
        vcp_name(self.vcp)
    }

    /// Largest group size over both families
    pub fn max_radials(&self) -> usize {
        self.max_radials
    }

    /// Smallest group size over both families
    pub fn min_radials(&self) -> usize {
        self.min_radials
    }

    pub fn doppler_resolution(&self) -> u16 {
        self.doppler_resolution
    }

    pub fn has_mixed_doppler_resolution(&self) -> bool {
        self.has_mixed_doppler_resolution
    }

    /// Record slots read from the file, data or not
    pub fn records_read(&self) -> u32 {
        self.records_read
    }

    pub fn first_record(&self) -> Option<&Arc<Record>> {
        self.first_record.as_ref()
    }

    pub fn last_record(&self) -> Option<&Arc<Record>> {
        self.last_record.as_ref()
    }

    pub fn reflectivity_groups(&self) -> &[ScanGroup] {
        &self.reflectivity_groups
    }

    pub fn velocity_groups(&self) -> &[ScanGroup] {
        &self.velocity_groups
    }

    pub fn groups(&self, family: Family) -> &[ScanGroup] {
        match family {
            Family::Reflectivity => &self.reflectivity_groups,
            Family::Velocity => &self.velocity_groups,
        }
    }

    pub fn warnings(&self) -> &[ScanWarning] {
        &self.warnings
    }

    pub fn summary(&self) -> ScanSummary {
        ScanSummary {
            dialect: self.dialect,
            data_format: self.data_format().to_string(),
            compression: self.compression,
            station_id: self.station_id().map(str::to_string),
            station_name: self.station_name().map(str::to_string),
            start: self.start_date(),
            end: self.end_date(),
            vcp: self.vcp,
            reflectivity_scans: self.reflectivity_groups.len(),
            velocity_scans: self.velocity_groups.len(),
            reflectivity_elevations: self.reflectivity_groups.iter().map(ScanGroup::mean_elevation).collect(),
            velocity_elevations: self.velocity_groups.iter().map(ScanGroup::mean_elevation).collect(),
            max_radials: self.max_radials,
            min_radials: self.min_radials,
            doppler_resolution: self.doppler_resolution,
            has_mixed_doppler_resolution: self.has_mixed_doppler_resolution,
            warnings: self.warnings.iter().map(|w| w.to_string()).collect(),
        }
    }
}

/// Serializable overview of a volume scan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanSummary {
    pub dialect: Dialect,
    pub data_format: String,
    pub compression: CompressionMethod,
    pub station_id: Option<String>,
    pub station_name: Option<String>,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub vcp: u16,
    pub reflectivity_scans: usize,
    pub velocity_scans: usize,
    /// Mean elevation of each reflectivity scan, in degrees
    pub reflectivity_elevations: Vec<Option<f32>>,
    pub velocity_elevations: Vec<Option<f32>>,
    pub max_radials: usize,
    pub min_radials: usize,
    pub doppler_resolution: u16,
    pub has_mixed_doppler_resolution: bool,
    pub warnings: Vec<String>,
}

/// Builds a [`VolumeScan`] from an uncompressed stream
pub struct VolumeScanAssembler {
    dialect: Dialect,
    config: DecoderConfig,
    state: AssemblyState,
    cancel: CancelToken,
    source_name: Option<String>,
    compression: CompressionMethod,
    archive_report: Option<ArchiveReport>,
}

impl VolumeScanAssembler {
    pub fn new(dialect: Dialect, config: DecoderConfig) -> Self {
        Self {
            dialect,
            config,
            state: AssemblyState::Unopened,
            cancel: CancelToken::new(),
            source_name: None,
            compression: CompressionMethod::None,
            archive_report: None,
        }
    }

    /// Stop assembly when `token` is cancelled
    pub fn with_cancel_token(mut self, token: CancelToken) -> Self {
        self.cancel = token;
        self
    }

    /// File name used to find the station when the header has none
    pub fn with_source_name(mut self, name: impl Into<String>) -> Self {
        self.source_name = Some(name.into());
        self
    }

    /// Record how the stream was decompressed
    pub fn with_compression(mut self, method: CompressionMethod, report: Option<ArchiveReport>) -> Self {
        self.compression = method;
        self.archive_report = report;
        self
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    pub fn config(&self) -> &DecoderConfig {
        &self.config
    }

    pub fn state(&self) -> AssemblyState {
        self.state
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Fix the dialect for this source; records are decoded with its layout
    pub fn determine_dialect(&mut self) {
        if self.state == AssemblyState::Unopened {
            debug!(dialect = %self.dialect, "dialect determined");
            self.state = AssemblyState::DialectDetermined;
        }
    }

    /// Mark the source as being decompressed
    pub fn begin_decompression(&mut self) {
        self.determine_dialect();
        self.state = AssemblyState::Decompressing;
    }

    /// Mark the assembly as failed
    pub fn fail(&mut self) {
        self.state = AssemblyState::Failed;
    }

    /// Read every record of `stream` and assemble the volume scan
    pub fn assemble<S: Read + Seek + ?Sized>(&mut self, stream: &mut S) -> Result<VolumeScan> {
        match self.assemble_inner(stream) {
            Ok(scan) => {
                self.state = AssemblyState::Ready;
                Ok(scan)
            }
            Err(e) => {
                self.state = AssemblyState::Failed;
                Err(e)
            }
        }
    }

    fn assemble_inner<S: Read + Seek + ?Sized>(&mut self, stream: &mut S) -> Result<VolumeScan> {
        self.determine_dialect();
        self.state = AssemblyState::Scanning;
        let mut warnings = Vec::new();
        if let Some(report) = &self.archive_report {
            for &chunk in &report.dropped_chunks {
                push_warning(&mut warnings, ScanWarning::ChunkDropped { chunk });
            }
        }

        let mut reader = RecordReader::new(self.dialect);
        let mut reflect: BTreeMap<u16, Vec<Arc<Record>>> = BTreeMap::new();
        let mut doppler: BTreeMap<u16, Vec<Arc<Record>>> = BTreeMap::new();
        let mut first_record: Option<Arc<Record>> = None;
        let mut last_record: Option<Arc<Record>> = None;
        let mut vcp = 0u16;
        let mut index = 0u32;

        loop {
            if self.cancel.is_cancelled() {
                info!(dialect = %self.dialect, recno = index, "volume scan assembly cancelled");
                return Err(RadarError::Cancelled);
            }

            let record = match reader.read_record(stream, index)? {
                ReadOutcome::Record(record) => record,
                ReadOutcome::EndOfScan => break,
            };
            index += 1;
            if !record.is_data() {
                continue;
            }

            let record: Arc<Record> = Arc::from(record);
            if first_record.is_none() {
                first_record = Some(Arc::clone(&record));
            }
            last_record = Some(Arc::clone(&record));
            if vcp == 0 {
                vcp = record.vcp;
            }

            let bound = reader.volume_header().and_then(|h| h.record_bound);
            if let Some(bound) = bound {
                if record.recno >= bound {
                    push_warning(
                        &mut warnings,
                        ScanWarning::BeyondRecordBound {
                            recno: record.recno,
                            bound,
                        },
                    );
                    continue;
                }
            }

            let problems = check_record(&record);
            if !problems.is_empty() {
                for problem in problems {
                    push_warning(&mut warnings, problem);
                }
                continue;
            }

            if record.has_reflect {
                reflect
                    .entry(record.elevation_num)
                    .or_default()
                    .push(Arc::clone(&record));
            }
            if record.has_doppler {
                doppler.entry(record.elevation_num).or_default().push(record);
            }
        }

        self.state = AssemblyState::Grouped;
        let reflectivity_groups = into_groups(reflect);
        let velocity_groups = into_groups(doppler);

        let sizes = || reflectivity_groups.iter().chain(&velocity_groups).map(ScanGroup::len);
        let max_radials = sizes().max().unwrap_or(0);
        let min_radials = sizes().min().unwrap_or(0);

        let slots = self.config.max_radial_slots;
        for group in &reflectivity_groups {
            test_scan(Family::Reflectivity, group, slots, &mut warnings);
        }
        for group in &velocity_groups {
            test_scan(Family::Velocity, group, slots, &mut warnings);
        }

        let mut doppler_resolution = 0;
        let mut mixed = false;
        test_family(
            Family::Reflectivity,
            &reflectivity_groups,
            &mut doppler_resolution,
            &mut mixed,
            &mut warnings,
        );
        test_family(
            Family::Velocity,
            &velocity_groups,
            &mut doppler_resolution,
            &mut mixed,
            &mut warnings,
        );
        if mixed && self.config.reject_mixed_doppler_resolution {
            return Err(RadarError::MixedDopplerResolution);
        }

        let header = reader.volume_header().cloned().unwrap_or_default();
        let table = self.config.station_table();
        let (station_id, station) = resolve_station(self.dialect, &header, self.source_name.as_deref(), &table);

        info!(
            dialect = %self.dialect,
            records = index,
            reflectivity_scans = reflectivity_groups.len(),
            velocity_scans = velocity_groups.len(),
            warnings = warnings.len(),
            "assembled volume scan"
        );

        Ok(VolumeScan {
            dialect: self.dialect,
            compression: self.compression,
            container: header.container_tag,
            volume_no: header.volume_no,
            title_time: header.title_time,
            station_id,
            station,
            vcp,
            max_radials,
            min_radials,
            doppler_resolution,
            has_mixed_doppler_resolution: mixed,
            records_read: index,
            first_record,
            last_record,
            reflectivity_groups,
            velocity_groups,
            warnings,
        })
    }
}

fn push_warning(warnings: &mut Vec<ScanWarning>, warning: ScanWarning) {
    warn!(kind = warning.kind(), "{}", warning);
    warnings.push(warning);
}

fn into_groups(map: BTreeMap<u16, Vec<Arc<Record>>>) -> Vec<ScanGroup> {
    map.into_iter()
        .map(|(elevation_num, records)| ScanGroup { elevation_num, records })
        .collect()
}

/// Structural problems that keep a record out of every group
pub fn check_record(record: &Record) -> Vec<ScanWarning> {
    let mut problems = Vec::new();
    let data_base = record.dialect.data_base();

    for moment in Moment::ALL {
        let offset = record.data_offset(moment);
        if offset < 0 || data_base + offset as u64 >= record.record_size {
            problems.push(ScanWarning::BadDataOffset {
                recno: record.recno,
                moment,
                offset,
                record_size: record.record_size,
            });
        }
    }

    let velocity = record.velocity.data_offset > 0;
    let width = record.spectrum_width.data_offset > 0;
    if velocity && !width {
        problems.push(ScanWarning::VelocityWithoutSpectrumWidth { recno: record.recno });
    }
    if width && !velocity {
        problems.push(ScanWarning::SpectrumWidthWithoutVelocity { recno: record.recno });
    }

    if !record.has_reflect && !record.has_doppler {
        problems.push(ScanWarning::NoMomentData { recno: record.recno });
    }
    problems
}

/// Consistency of one sweep: geometry, resolution and radial coverage
fn test_scan(family: Family, group: &ScanGroup, slots: usize, warnings: &mut Vec<ScanWarning>) {
    let first = match group.first() {
        Some(first) => first,
        None => return,
    };
    let moment = family.moment();
    let elevation_num = group.elevation_num;
    let mut seen = vec![false; slots];

    for record in &group.records {
        if record.gate_size(moment) != first.gate_size(moment) {
            push_warning(
                warnings,
                ScanWarning::GateSizeDrift {
                    family,
                    elevation_num,
                    recno: record.recno,
                    expected: first.gate_size(moment),
                    found: record.gate_size(moment),
                },
            );
        }
        if record.gate_start(moment) != first.gate_start(moment) {
            push_warning(
                warnings,
                ScanWarning::GateStartDrift {
                    family,
                    elevation_num,
                    recno: record.recno,
                    expected: first.gate_start(moment),
                    found: record.gate_start(moment),
                },
            );
        }
        if record.resolution != first.resolution {
            push_warning(
                warnings,
                ScanWarning::ResolutionDrift {
                    family,
                    elevation_num,
                    recno: record.recno,
                    expected: first.resolution,
                    found: record.resolution,
                },
            );
        }

        let radial = record.radial_num as usize;
        if radial == 0 || radial >= slots {
            push_warning(
                warnings,
                ScanWarning::RadialOutOfRange {
                    family,
                    elevation_num,
                    recno: record.recno,
                    radial_num: record.radial_num,
                },
            );
            continue;
        }
        if seen[radial] {
            push_warning(
                warnings,
                ScanWarning::DuplicateRadial {
                    family,
                    elevation_num,
                    radial_num: record.radial_num,
                },
            );
        }
        seen[radial] = true;
    }

    if let Some(first_missing) = (1..slots).find(|&i| !seen[i]) {
        if first_missing != group.len() + 1 {
            push_warning(
                warnings,
                ScanWarning::MissingRadials {
                    family,
                    elevation_num,
                    records: group.len(),
                    first_missing,
                },
            );
        }
    }
}

/// Consistency across the sweeps of one family
///
/// Sets `doppler_resolution` from the family's first record. Only velocity
/// sweeps can flag mixed resolutions.
fn test_family(
    family: Family,
    groups: &[ScanGroup],
    doppler_resolution: &mut u16,
    mixed: &mut bool,
    warnings: &mut Vec<ScanWarning>,
) {
    let first = match groups.first().and_then(ScanGroup::first) {
        Some(first) => first,
        None => {
            debug!(%family, "no records");
            return;
        }
    };
    let moment = family.moment();
    *doppler_resolution = first.resolution;

    for group in groups {
        let record = match group.first() {
            Some(record) => record,
            None => continue,
        };
        if family == Family::Velocity && record.resolution != first.resolution {
            *mixed = true;
            push_warning(
                warnings,
                ScanWarning::MixedDopplerResolution {
                    elevation_num: group.elevation_num,
                    expected: first.resolution,
                    found: record.resolution,
                },
            );
        }
        if record.gate_size(moment) != first.gate_size(moment) {
            push_warning(
                warnings,
                ScanWarning::ScanGateSizeDrift {
                    family,
                    elevation_num: group.elevation_num,
                    expected: first.gate_size(moment),
                    found: record.gate_size(moment),
                },
            );
        }
        if record.gate_start(moment) != first.gate_start(moment) {
            push_warning(
                warnings,
                ScanWarning::ScanGateStartDrift {
                    family,
                    elevation_num: group.elevation_num,
                    expected: first.gate_start(moment),
                    found: record.gate_start(moment),
                },
            );
        }
    }
}

/// Station id and site from the header, the file name, or the station table
fn resolve_station(
    dialect: Dialect,
    header: &VolumeHeader,
    source_name: Option<&str>,
    table: &StationTable,
) -> (Option<String>, Option<Station>) {
    if let Some(station) = &header.station {
        return (Some(station.id.clone()), Some(station.clone()));
    }

    let id = header.station_id.clone().or_else(|| {
        if dialect != Dialect::SaSb {
            return None;
        }
        let name = Path::new(source_name?).file_name()?.to_string_lossy().into_owned();
        let prefix: String = name.chars().take(4).collect();
        if prefix.chars().count() == 4 {
            Some(prefix)
        } else {
            None
        }
    });

    let station = id.as_deref().and_then(|id| table.get(id)).cloned();
    if station.is_none() {
        debug!(station_id = ?id, "station not in table");
    }
    (id, station)
}
