//! Per-dialect header layouts
//!
//! Each dialect has its own volume header and radial header. They all decode
//! into the same [`VolumeHeader`] and [`Record`] so the rest of the crate never
//! branches on byte offsets.

mod cc;
mod cc20;
mod sa;
mod sc;

pub use cc::CcLayout;
pub use cc20::Cc20Layout;
pub use sa::{record_size_for, SaLayout, ARCHIVE2_TAG};
pub use sc::ScLayout;

use crate::error::{RadarError, Result};
use crate::metadata::Station;
use crate::record::{Record, VolumeHeader};
use crate::types::{DataTime, Dialect};
use crate::utils::{i32_le, u16_le, u8_at};

/// Scan mode of a full volume scan (CC, CC20)
pub const SCAN_MODE_VOLUME: u32 = 10;

/// Echo type carrying reflectivity, velocity and spectrum width (CC, CC20)
pub const ECHO_TYPE_FULL: u32 = 3;

/// Product code of base data (CC, CC20)
pub const PRODUCT_CODE_BASE: u32 = 1;

/// Header decoding for one dialect
pub trait DialectLayout: Send + Sync {
    fn dialect(&self) -> Dialect;

    /// Bytes read from the start of the file to resolve the volume header
    fn probe_len(&self) -> usize;

    /// Minimum bytes a record needs before its header can be decoded
    fn radial_header_len(&self) -> usize;

    /// Resolve header length, record size and sweep table from the probe
    fn parse_volume_header(&self, probe: &[u8]) -> Result<VolumeHeader>;

    /// Decode one record's header; `buf` may be shorter than the record size
    fn parse_header(&self, volume: &VolumeHeader, recno: u32, message_offset: u64, buf: &[u8]) -> Record;
}

/// Layout implementation for a dialect
pub fn layout_for(dialect: Dialect) -> Box<dyn DialectLayout> {
    match dialect {
        Dialect::SaSb => Box::new(SaLayout),
        Dialect::Sc => Box::new(ScLayout),
        Dialect::Cc => Box::new(CcLayout),
        Dialect::Cc20 => Box::new(Cc20Layout),
    }
}

fn require_len(dialect: Dialect, probe: &[u8], len: usize) -> Result<()> {
    if probe.len() < len {
        return Err(RadarError::InvalidFormat(format!(
            "{} volume header needs {} bytes, file has {}",
            dialect,
            len,
            probe.len()
        )));
    }
    Ok(())
}

fn require_value(dialect: Dialect, field: &'static str, value: u32, expected: u32) -> Result<()> {
    if value != expected {
        return Err(RadarError::UnsupportedFormat { dialect, field, value });
    }
    Ok(())
}

/// Scan mode, echo type and product code must describe a base data volume
fn require_base_volume(dialect: Dialect, scan_mode: u32, echo_type: u32, product_code: u32) -> Result<()> {
    require_value(dialect, "scan_mode", scan_mode, SCAN_MODE_VOLUME)?;
    require_value(dialect, "echo_type", echo_type, ECHO_TYPE_FULL)?;
    require_value(dialect, "product_code", product_code, PRODUCT_CODE_BASE)
}

/// u16 year followed by five u8 fields (month, day, hour, minute, second)
fn calendar_at(buf: &[u8], offset: usize) -> Option<DataTime> {
    DataTime::from_calendar(
        u16_le(buf, offset) as i32,
        u8_at(buf, offset + 2) as u32,
        u8_at(buf, offset + 3) as u32,
        u8_at(buf, offset + 4) as u32,
        u8_at(buf, offset + 5) as u32,
        u8_at(buf, offset + 6) as u32,
    )
}

/// Site from header fields: coordinates in 0.001 degrees, height in mm
fn station_at(buf: &[u8], id: &str, name: &str, lon_offset: usize) -> Option<Station> {
    let lon = i32_le(buf, lon_offset);
    let lat = i32_le(buf, lon_offset + 4);
    let height = i32_le(buf, lon_offset + 8);
    if lon == 0 && lat == 0 {
        return None;
    }
    let id = if id.is_empty() { name } else { id };
    Some(Station::new(
        id,
        name,
        lat as f64 / 1000.0,
        lon as f64 / 1000.0,
        height as f64 / 1000.0,
    ))
}

fn non_empty(s: String) -> Option<String> {
    if s.is_empty() {
        None
    } else {
        Some(s)
    }
}
