//! Radar volume access - main API for opening files and reading gate data

use crate::compression::{decompress_with_report, open_source, CompressionMethod};
use crate::config::DecoderConfig;
use crate::error::{RadarError, Result};
use crate::io::{read_at, ByteSource};
use crate::record::Record;
use crate::types::{Dialect, Family, Moment, MISSING_DATA};
use crate::utils::format_bytes;
use crate::volume::{ScanSummary, VolumeScan, VolumeScanAssembler};
use bytes::Bytes;
use futures::future::try_join_all;
use ndarray::{Array2, Array3};
use parking_lot::Mutex;
use std::borrow::Cow;
use std::io::{Cursor, Read, Seek};
use std::ops::Range;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, debug_span, warn};

/// Time value of an empty radial slot
pub const MISSING_TIME: i64 = -9999;

/// Highest gate index a record can describe; gate counts are 16 bit
pub const MAX_GATE_INDEX: usize = u16::MAX as usize;

/// Gates to read along a radial: `first..=last` every `stride`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GateRange {
    first: usize,
    last: usize,
    stride: usize,
}

impl GateRange {
    pub fn new(first: usize, last: usize, stride: usize) -> Result<Self> {
        if last > MAX_GATE_INDEX {
            return Err(RadarError::OutOfBounds(format!(
                "gate {} past the last addressable gate {}",
                last, MAX_GATE_INDEX
            )));
        }
        if stride == 0 {
            return Err(RadarError::OutOfBounds("gate stride must be positive".to_string()));
        }
        if first > last {
            return Err(RadarError::OutOfBounds(format!(
                "gate range {}..={} is empty",
                first, last
            )));
        }
        Ok(Self { first, last, stride })
    }

    /// Every gate from 0 to `count - 1`; a single gate when `count` is 0
    pub fn all(count: usize) -> Self {
        Self {
            first: 0,
            last: count.saturating_sub(1).min(MAX_GATE_INDEX),
            stride: 1,
        }
    }

    pub fn first(&self) -> usize {
        self.first
    }

    pub fn last(&self) -> usize {
        self.last
    }

    pub fn stride(&self) -> usize {
        self.stride
    }

    pub fn len(&self) -> usize {
        (self.last - self.first) / self.stride + 1
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn iter(&self) -> impl Iterator<Item = usize> {
        (self.first..=self.last).step_by(self.stride)
    }
}

/// Read one moment of one record over `range`
///
/// Gates at or past the record's gate count, or past the end of the stream,
/// come back as [`MISSING_DATA`].
pub fn read_moment<S: Read + Seek + ?Sized>(
    stream: &mut S,
    record: &Record,
    moment: Moment,
    range: &GateRange,
) -> Result<Bytes> {
    let geometry = record.geometry(moment);
    if !geometry.is_present() {
        return Ok(Bytes::from(vec![MISSING_DATA; range.len()]));
    }

    let count = geometry.gate_count as usize;
    let stride = record.dialect.gate_stride();
    let mut raw = vec![MISSING_DATA; count * stride];
    let got = read_at(stream, record.data_position(moment), &mut raw)?;

    let gates: Vec<u8> = range
        .iter()
        .map(|i| {
            let at = i * stride;
            if i < count && at < got {
                raw[at]
            } else {
                MISSING_DATA
            }
        })
        .collect();
    Ok(Bytes::from(gates))
}

/// Like [`read_moment`], but a hole in the sweep reads as all missing
pub fn read_radial<S: Read + Seek + ?Sized>(
    stream: &mut S,
    record: Option<&Record>,
    moment: Moment,
    range: &GateRange,
) -> Result<Bytes> {
    match record {
        Some(record) => read_moment(stream, record, moment, range),
        None => Ok(Bytes::from(vec![MISSING_DATA; range.len()])),
    }
}

/// Records of one family laid out as `[scan][radial_num - 1]`
#[derive(Debug, Clone)]
pub struct RadialMap {
    family: Family,
    max_radials: usize,
    slots: Vec<Vec<Option<Arc<Record>>>>,
}

impl RadialMap {
    pub fn new(scan: &VolumeScan, family: Family) -> Self {
        let max_radials = scan.max_radials();
        let slots = scan
            .groups(family)
            .iter()
            .map(|group| {
                let mut row = vec![None; max_radials];
                for record in &group.records {
                    let radial = record.radial_num as usize;
                    if radial == 0 || radial > max_radials {
                        warn!(
                            %family,
                            elevation_num = group.elevation_num,
                            recno = record.recno,
                            radial,
                            "radial outside the volume's radial range, left out"
                        );
                        continue;
                    }
                    row[radial - 1] = Some(Arc::clone(record));
                }
                row
            })
            .collect();

        Self {
            family,
            max_radials,
            slots,
        }
    }

    pub fn family(&self) -> Family {
        self.family
    }

    pub fn scan_count(&self) -> usize {
        self.slots.len()
    }

    pub fn max_radials(&self) -> usize {
        self.max_radials
    }

    pub fn get(&self, scan: usize, radial: usize) -> Option<&Arc<Record>> {
        self.slots.get(scan)?.get(radial)?.as_ref()
    }

    /// Occupied slots of a scan
    pub fn radial_count(&self, scan: usize) -> usize {
        self.slots
            .get(scan)
            .map_or(0, |row| row.iter().filter(|slot| slot.is_some()).count())
    }
}

/// Per-slot coordinates of one family, shaped `[scan][radial]`
#[derive(Debug, Clone)]
pub struct SweepCoordinates {
    /// Milliseconds since the scan's start date, [`MISSING_TIME`] for holes
    pub time: Array2<i64>,
    /// Degrees, NaN for holes
    pub elevation: Array2<f32>,
    /// Degrees, NaN for holes
    pub azimuth: Array2<f32>,
    pub radial_count: Vec<usize>,
    pub gate_count: Vec<u16>,
}

/// An opened radar file: its assembled scan plus the stream to read gates from
pub struct RadarVolume {
    scan: Arc<VolumeScan>,
    source: Mutex<Box<dyn ByteSource>>,
    reflectivity: RadialMap,
    velocity: RadialMap,
}

impl RadarVolume {
    /// Open a file, decompressing it through the disk cache when needed
    pub fn open(path: impl AsRef<Path>, dialect: Dialect, config: &DecoderConfig) -> Result<Self> {
        config.validate()?;
        let path = path.as_ref();
        let mut assembler = VolumeScanAssembler::new(dialect, config.clone());
        if let Some(name) = path.file_name() {
            assembler = assembler.with_source_name(name.to_string_lossy());
        }
        Self::open_with(path, assembler)
    }

    /// Open a file with a prepared assembler, e.g. one holding a cancel token
    pub fn open_with(path: impl AsRef<Path>, mut assembler: VolumeScanAssembler) -> Result<Self> {
        let path = path.as_ref();
        let span = debug_span!("open", path = %path.display(), dialect = %assembler.dialect());
        let _enter = span.enter();

        assembler.begin_decompression();
        let prepared = match open_source(path, assembler.config()) {
            Ok(prepared) => prepared,
            Err(e) => {
                assembler.fail();
                return Err(e);
            }
        };
        debug!(
            method = ?prepared.method,
            from_cache = prepared.from_cache,
            "prepared source"
        );

        let assembler = assembler.with_compression(prepared.method, prepared.report);
        Self::from_stream(prepared.stream, assembler)
    }

    /// Decode an in-memory file
    pub fn from_bytes(data: Vec<u8>, dialect: Dialect, config: &DecoderConfig) -> Result<Self> {
        config.validate()?;
        let method = CompressionMethod::detect(&data);
        let mut assembler = VolumeScanAssembler::new(dialect, config.clone());
        assembler.determine_dialect();
        if method != CompressionMethod::None {
            assembler.begin_decompression();
        }

        let (inflated, report) = match decompress_with_report(&data) {
            Ok((Cow::Borrowed(_), report)) => (None, report),
            Ok((Cow::Owned(inflated), report)) => (Some(inflated), report),
            Err(e) => {
                assembler.fail();
                return Err(e);
            }
        };
        let plain = inflated.unwrap_or(data);
        debug!(method = ?method, size = %format_bytes(plain.len()), "decoding in-memory file");
        let assembler = assembler.with_compression(method, report);
        Self::from_stream(Box::new(Cursor::new(plain)), assembler)
    }

    /// Assemble from an already uncompressed stream
    pub fn from_stream(mut stream: Box<dyn ByteSource>, mut assembler: VolumeScanAssembler) -> Result<Self> {
        let scan = assembler.assemble(&mut stream)?;
        Ok(Self::new(scan, stream))
    }

    fn new(scan: VolumeScan, stream: Box<dyn ByteSource>) -> Self {
        let reflectivity = RadialMap::new(&scan, Family::Reflectivity);
        let velocity = RadialMap::new(&scan, Family::Velocity);
        Self {
            scan: Arc::new(scan),
            source: Mutex::new(stream),
            reflectivity,
            velocity,
        }
    }

    /// Open on the blocking thread pool
    pub async fn open_async(path: impl Into<PathBuf>, dialect: Dialect, config: DecoderConfig) -> Result<Self> {
        let path = path.into();
        tokio::task::spawn_blocking(move || Self::open(&path, dialect, &config)).await?
    }

    /// Open independent files concurrently
    pub async fn open_many<I, P>(paths: I, dialect: Dialect, config: &DecoderConfig) -> Result<Vec<Self>>
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        let futures: Vec<_> = paths
            .into_iter()
            .map(|path| Self::open_async(path, dialect, config.clone()))
            .collect();
        try_join_all(futures).await
    }

    pub fn scan(&self) -> &Arc<VolumeScan> {
        &self.scan
    }

    pub fn summary(&self) -> ScanSummary {
        self.scan.summary()
    }

    pub fn radial_map(&self, family: Family) -> &RadialMap {
        match family {
            Family::Reflectivity => &self.reflectivity,
            Family::Velocity => &self.velocity,
        }
    }

    /// Read one moment of one record
    pub fn read_moment(&self, record: &Record, moment: Moment, range: &GateRange) -> Result<Bytes> {
        let mut source = self.source.lock();
        read_moment(&mut **source, record, moment, range)
    }

    /// Read the radial at `[scan][radial]` of the moment's family
    pub fn read_radial(&self, scan: usize, radial: usize, moment: Moment, range: &GateRange) -> Result<Bytes> {
        let record = self.radial_map(moment.family()).get(scan, radial);
        let mut source = self.source.lock();
        read_radial(&mut **source, record.map(Arc::as_ref), moment, range)
    }

    /// Raw gate bytes shaped `[scan][radial][gate]`
    pub fn read_cube(
        &self,
        moment: Moment,
        scans: Range<usize>,
        radials: Range<usize>,
        gates: GateRange,
    ) -> Result<Array3<u8>> {
        let map = self.radial_map(moment.family());
        if scans.start > scans.end || scans.end > map.scan_count() {
            return Err(RadarError::OutOfBounds(format!(
                "scans {:?} outside 0..{}",
                scans,
                map.scan_count()
            )));
        }
        if radials.start > radials.end || radials.end > map.max_radials() {
            return Err(RadarError::OutOfBounds(format!(
                "radials {:?} outside 0..{}",
                radials,
                map.max_radials()
            )));
        }

        let mut cube = Array3::from_elem((scans.len(), radials.len(), gates.len()), MISSING_DATA);
        let mut source = self.source.lock();
        for (si, scan) in scans.enumerate() {
            for (ri, radial) in radials.clone().enumerate() {
                let record = map.get(scan, radial).map(Arc::as_ref);
                let data = read_radial(&mut **source, record, moment, &gates)?;
                for (gi, value) in data.iter().enumerate() {
                    cube[[si, ri, gi]] = *value;
                }
            }
        }
        Ok(cube)
    }

    /// Time, elevation and azimuth of every slot of a family
    pub fn coordinates(&self, family: Family) -> SweepCoordinates {
        let map = self.radial_map(family);
        let shape = (map.scan_count(), map.max_radials());
        let base = self.scan.first_record().map_or(0, |r| r.data_time.epoch_millis());

        let mut time = Array2::from_elem(shape, MISSING_TIME);
        let mut elevation = Array2::from_elem(shape, f32::NAN);
        let mut azimuth = Array2::from_elem(shape, f32::NAN);
        for scan in 0..shape.0 {
            for radial in 0..shape.1 {
                if let Some(record) = map.get(scan, radial) {
                    time[[scan, radial]] = record.data_time.epoch_millis() - base;
                    elevation[[scan, radial]] = record.elevation_deg;
                    azimuth[[scan, radial]] = record.azimuth_deg;
                }
            }
        }

        let radial_count = (0..shape.0).map(|scan| map.radial_count(scan)).collect();
        let gate_count = self
            .scan
            .groups(family)
            .iter()
            .map(|group| group.first().map_or(0, |r| r.gate_count(family.moment())))
            .collect();

        SweepCoordinates {
            time,
            elevation,
            azimuth,
            radial_count,
            gate_count,
        }
    }
}
