//! cinrad2 - CINRAD/NEXRAD Level II volume scan decoder
//!
//! A pure Rust reader for Chinese CINRAD weather radar base data in its four
//! on-disk dialects (SA/SB, SC, CC, CC 2.0), including NEXRAD-style Archive II
//! files.
//!
//! # Features
//!
//! - Tolerant fixed-size record parsing with one layout per dialect
//! - Archive II bzip2 chunk inflation with an on-disk decompression cache
//! - gzip, bzip2 and zstd wrapped files
//! - Per-elevation grouping of reflectivity and doppler radials, with
//!   consistency checks reported as warnings instead of failures
//! - Random access to raw gate data, one radial at a time or as a cube
//!
//! # Example
//!
//! ```rust,ignore
//! use cinrad2::{DecoderConfig, Dialect, GateRange, Moment, RadarVolume};
//!
//! # fn example() -> cinrad2::Result<()> {
//! let volume = RadarVolume::open("Z_RADR_I_Z9200_20090627170100.bin", Dialect::SaSb, &DecoderConfig::default())?;
//! let scan = volume.scan();
//! for group in scan.reflectivity_groups() {
//!     let record = &group.records[0];
//!     let gates = volume.read_moment(record, Moment::Reflectivity, &GateRange::all(460))?;
//!     println!("sweep {} has {} radials, first gate {}", group.elevation_num, group.len(), gates[0]);
//! }
//! # Ok(())
//! # }
//! ```

pub mod access;
pub mod compression;
pub mod config;
pub mod dialect;
pub mod error;
pub mod io;
pub mod metadata;
pub mod record;
pub mod types;
pub mod utils;
pub mod volume;

// Re-exports
pub use access::{read_moment, read_radial, GateRange, RadarVolume, RadialMap, SweepCoordinates, MAX_GATE_INDEX};
pub use compression::{decompress, decompress_with_report, ArchiveReport, CompressionMethod, Decompressor};
pub use config::DecoderConfig;
pub use dialect::DialectLayout;
pub use error::{RadarError, Result};
pub use io::{ByteSource, DiskCache};
pub use metadata::{Station, StationTable};
pub use record::{read_record, GateGeometry, ReadOutcome, Record, RecordReader, VolumeHeader};
pub use types::{DataTime, Dialect, Family, Moment, MomentScale};
pub use volume::{AssemblyState, CancelToken, ScanGroup, ScanWarning, VolumeScan, VolumeScanAssembler};

/// Version of the decoder
pub const CINRAD2_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Magic of an uncompressed Archive II file
pub const ARCHIVE2_MAGIC: &[u8; 8] = dialect::ARCHIVE2_TAG;

/// Magic of a bzip2 chunked Archive II container
pub const AR2V_MAGIC: &[u8; 8] = b"AR2V0001";
