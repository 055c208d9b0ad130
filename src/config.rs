//! Decoder configuration

use crate::error::{RadarError, Result};
use crate::metadata::{Station, StationTable};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variable overriding the default decompression cache directory
pub const CACHE_DIR_ENV: &str = "CINRAD2_CACHE_DIR";

/// Default number of radial slots checked per sweep
pub const DEFAULT_MAX_RADIAL_SLOTS: usize = 401;

/// Options for opening radar files
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DecoderConfig {
    /// Directory holding uncompressed copies of compressed inputs
    pub cache_dir: Option<PathBuf>,

    /// Persist uncompressed copies and reuse them on later opens
    pub use_disk_cache: bool,

    /// Radial numbers at or above this are reported out of range
    pub max_radial_slots: usize,

    /// Fail the open when velocity sweeps use different doppler resolutions
    pub reject_mixed_doppler_resolution: bool,

    /// Extra stations added to the built-in table
    pub stations: Vec<Station>,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            cache_dir: None,
            use_disk_cache: true,
            max_radial_slots: DEFAULT_MAX_RADIAL_SLOTS,
            reject_mixed_doppler_resolution: false,
            stations: Vec::new(),
        }
    }
}

impl DecoderConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a JSON configuration document
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Read a JSON configuration file
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    /// Set the cache directory
    pub fn with_cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = Some(dir.into());
        self
    }

    /// Enable or disable the on-disk decompression cache
    pub fn with_disk_cache(mut self, enabled: bool) -> Self {
        self.use_disk_cache = enabled;
        self
    }

    /// Set the radial slot limit
    pub fn with_max_radial_slots(mut self, slots: usize) -> Self {
        self.max_radial_slots = slots;
        self
    }

    /// Treat mixed doppler resolutions as fatal
    pub fn with_reject_mixed_doppler_resolution(mut self, reject: bool) -> Self {
        self.reject_mixed_doppler_resolution = reject;
        self
    }

    /// Add a station to the lookup table
    pub fn with_station(mut self, station: Station) -> Self {
        self.stations.push(station);
        self
    }

    /// Cache directory in effect: configured, then environment, then temp dir
    pub fn resolved_cache_dir(&self) -> PathBuf {
        if let Some(dir) = &self.cache_dir {
            return dir.clone();
        }
        match std::env::var_os(CACHE_DIR_ENV) {
            Some(dir) if !dir.is_empty() => PathBuf::from(dir),
            _ => std::env::temp_dir().join("cinrad2-cache"),
        }
    }

    /// Built-in stations plus configured ones
    pub fn station_table(&self) -> StationTable {
        let mut table = StationTable::builtin();
        table.extend(self.stations.iter().cloned());
        table
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_radial_slots < 2 {
            return Err(RadarError::Configuration(format!(
                "max_radial_slots must be at least 2, got {}",
                self.max_radial_slots
            )));
        }
        Ok(())
    }
}
