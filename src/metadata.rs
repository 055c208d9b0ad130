//! Radar site metadata

use crate::error::Result;
use crate::utils::parse_degree;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A radar site
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Station {
    /// Station identifier (ICAO style or CINRAD station number)
    pub id: String,

    /// Descriptive name
    pub name: String,

    /// Latitude in degrees north
    pub latitude: f64,

    /// Longitude in degrees east
    pub longitude: f64,

    /// Antenna elevation above sea level, in meters
    pub elevation: f64,
}

impl Station {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        latitude: f64,
        longitude: f64,
        elevation: f64,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            latitude,
            longitude,
            elevation,
        }
    }

    /// Build from `"deg:min:sec"` coordinate strings
    pub fn from_dms(
        id: impl Into<String>,
        name: impl Into<String>,
        latitude: &str,
        longitude: &str,
        elevation: f64,
    ) -> Option<Self> {
        Some(Self::new(
            id,
            name,
            parse_degree(latitude)?,
            parse_degree(longitude)?,
            elevation,
        ))
    }

    /// Approximate latitude/longitude bounding box covering `radius_m` around the site
    pub fn bounding_box(&self, radius_m: f64) -> (f64, f64, f64, f64) {
        const EARTH_RADIUS_M: f64 = 6_371_229.0;
        let lat_radius = (radius_m / EARTH_RADIUS_M).to_degrees();
        let cos_lat = self.latitude.to_radians().cos();
        let lon_radius = if cos_lat.abs() < f64::EPSILON {
            180.0
        } else {
            (radius_m / cos_lat / EARTH_RADIUS_M).to_degrees()
        };
        (
            self.latitude - lat_radius,
            self.latitude + lat_radius,
            self.longitude - lon_radius,
            self.longitude + lon_radius,
        )
    }
}

/// Lookup table of known radar sites
///
/// SA/SB files carry no site coordinates, so the station is found by the id
/// in the archive header or the first four characters of the file name.
#[derive(Debug, Clone, Default)]
pub struct StationTable {
    stations: HashMap<String, Station>,
}

impl StationTable {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Table preloaded with the sites this crate knows about
    pub fn builtin() -> Self {
        let mut table = Self::new();
        if let Some(gz) = Station::from_dms("CHGZ", "CHINA, GuanZhou", "23:0:14", "113:21:18", 180.3) {
            table.insert(gz);
        }
        table
    }

    /// Load extra entries from a JSON array of stations
    pub fn from_json_str(json: &str) -> Result<Self> {
        let stations: Vec<Station> = serde_json::from_str(json)?;
        let mut table = Self::new();
        table.extend(stations);
        Ok(table)
    }

    pub fn insert(&mut self, station: Station) {
        self.stations.insert(station.id.to_ascii_uppercase(), station);
    }

    pub fn extend(&mut self, stations: impl IntoIterator<Item = Station>) {
        for station in stations {
            self.insert(station);
        }
    }

    /// Find a station by id, also trying the `K` prefixed NEXRAD form
    pub fn get(&self, id: &str) -> Option<&Station> {
        let id = id.trim().to_ascii_uppercase();
        if id.is_empty() {
            return None;
        }
        self.stations
            .get(&id)
            .or_else(|| self.stations.get(&format!("K{}", id)))
    }

    pub fn len(&self) -> usize {
        self.stations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stations.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_lookup() {
        let table = StationTable::builtin();
        let gz = table.get("chgz").unwrap();
        assert_eq!(gz.name, "CHINA, GuanZhou");
        assert!((gz.latitude - 23.0039).abs() < 1e-3);
        assert!((gz.longitude - 113.355).abs() < 1e-3);
        assert!(table.get("").is_none());
    }

    #[test]
    fn test_k_prefix_lookup() {
        let mut table = StationTable::new();
        table.insert(Station::new("KCCX", "State College", 40.92, -78.0, 733.0));
        assert!(table.get("CCX").is_some());
        assert!(table.get("KCCX").is_some());
        assert!(table.get("XYZ").is_none());
    }

    #[test]
    fn test_from_json() {
        let json = r#"[{"id":"Z9200","name":"Guangzhou","latitude":23.0,"longitude":113.3,"elevation":180.3}]"#;
        let table = StationTable::from_json_str(json).unwrap();
        assert_eq!(table.len(), 1);
        assert_eq!(table.get("z9200").unwrap().elevation, 180.3);
    }

    #[test]
    fn test_bounding_box() {
        let station = Station::new("X", "x", 30.0, 110.0, 0.0);
        let (lat_min, lat_max, lon_min, lon_max) = station.bounding_box(230_000.0);
        assert!(lat_min < 30.0 && lat_max > 30.0);
        assert!(lon_max - lon_min > lat_max - lat_min);
    }
}
