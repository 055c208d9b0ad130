//! Core data types for CINRAD Level II decoding

use chrono::{DateTime, NaiveDate, Utc};
use num_traits::{Float, FromPrimitive};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Raw gate value meaning "no data was recorded"
pub const MISSING_DATA: u8 = 1;

/// Raw gate value meaning "signal below threshold"
pub const BELOW_THRESHOLD: u8 = 0;

/// Doppler resolution code for 0.5 m/s velocity steps
pub const DOPPLER_RESOLUTION_HIGH: u16 = 2;

/// Doppler resolution code for 1.0 m/s velocity steps
pub const DOPPLER_RESOLUTION_LOW: u16 = 4;

/// On-disk record layout family
///
/// Fixed for an entire file and always passed explicitly to the decoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Dialect {
    /// CINRAD/SA and SB, NEXRAD-like 2432/3132/4132 byte messages
    SaSb,
    /// CINRAD/SC, 4000 byte radials with interleaved moments
    Sc,
    /// CINRAD/CC, 3000 byte radials
    Cc,
    /// CINRAD/CC 2.0, 3011 or 4011 byte radials
    Cc20,
}

impl Dialect {
    /// All dialects, in detection order
    pub const ALL: [Dialect; 4] = [Dialect::SaSb, Dialect::Sc, Dialect::Cc, Dialect::Cc20];

    /// Short name used in messages
    pub fn name(&self) -> &'static str {
        match self {
            Dialect::SaSb => "SA/SB",
            Dialect::Sc => "SC",
            Dialect::Cc => "CC",
            Dialect::Cc20 => "CC20",
        }
    }

    /// Data format tag reported by an assembled volume scan
    pub fn data_format(&self) -> &'static str {
        match self {
            Dialect::SaSb => "CINRAD-SA",
            Dialect::Sc => "CINRAD-SC",
            Dialect::Cc => "CINRAD-CC",
            Dialect::Cc20 => "CINRAD-CC20",
        }
    }

    /// Bytes between the start of a record and the origin of its data offsets
    pub fn data_base(&self) -> u64 {
        match self {
            Dialect::SaSb => 28,
            Dialect::Sc | Dialect::Cc | Dialect::Cc20 => 0,
        }
    }

    /// Distance in bytes between two consecutive gates of one moment
    pub fn gate_stride(&self) -> usize {
        match self {
            Dialect::Sc => 4,
            Dialect::SaSb | Dialect::Cc | Dialect::Cc20 => 1,
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A physical quantity sampled along a radial
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Moment {
    Reflectivity,
    Velocity,
    SpectrumWidth,
}

impl Moment {
    pub const ALL: [Moment; 3] = [Moment::Reflectivity, Moment::Velocity, Moment::SpectrumWidth];

    pub fn name(&self) -> &'static str {
        match self {
            Moment::Reflectivity => "Reflectivity",
            Moment::Velocity => "RadialVelocity",
            Moment::SpectrumWidth => "SpectrumWidth",
        }
    }

    /// Which scan family holds the records for this moment
    pub fn family(&self) -> Family {
        match self {
            Moment::Reflectivity => Family::Reflectivity,
            Moment::Velocity | Moment::SpectrumWidth => Family::Velocity,
        }
    }

    /// Scale, offset and units for this moment in a dialect
    ///
    /// `resolution` only matters for velocity (see [`DOPPLER_RESOLUTION_LOW`]).
    pub fn scale(&self, dialect: Dialect, resolution: u16) -> MomentScale {
        let low_res = resolution == DOPPLER_RESOLUTION_LOW;
        match (dialect, self) {
            (Dialect::SaSb, Moment::Reflectivity) => MomentScale::new(0.5, -33.0, "dBz"),
            (Dialect::SaSb, Moment::Velocity) if low_res => MomentScale::new(1.0, -129.0, "m/s"),
            (Dialect::SaSb, Moment::Velocity) => MomentScale::new(0.5, -64.5, "m/s"),
            (Dialect::SaSb, Moment::SpectrumWidth) => MomentScale::new(0.5, -64.5, "m/s"),
            (_, Moment::Reflectivity) => MomentScale::new(0.5, -32.0, "dBz"),
            (_, Moment::Velocity) if low_res => MomentScale::new(1.0, -128.0, "m/s"),
            (_, Moment::Velocity) => MomentScale::new(0.5, -64.0, "m/s"),
            (_, Moment::SpectrumWidth) => MomentScale::new(0.25, 0.0, "m/s"),
        }
    }
}

impl fmt::Display for Moment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The two independently grouped record families of a volume scan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Family {
    /// Records carrying reflectivity
    Reflectivity,
    /// Records carrying velocity and spectrum width
    Velocity,
}

impl Family {
    pub const ALL: [Family; 2] = [Family::Reflectivity, Family::Velocity];

    /// Moment whose gate geometry describes the family
    pub fn moment(&self) -> Moment {
        match self {
            Family::Reflectivity => Moment::Reflectivity,
            Family::Velocity => Moment::Velocity,
        }
    }
}

impl fmt::Display for Family {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Family::Reflectivity => f.write_str("reflect"),
            Family::Velocity => f.write_str("doppler"),
        }
    }
}

/// Linear conversion from raw gate bytes to physical units
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MomentScale {
    pub scale: f32,
    pub offset: f32,
    pub units: &'static str,
}

impl MomentScale {
    pub const fn new(scale: f32, offset: f32, units: &'static str) -> Self {
        Self {
            scale,
            offset,
            units,
        }
    }

    /// Convert one raw gate value, `None` for missing or below-threshold gates
    pub fn unpack<T: Float + FromPrimitive>(&self, raw: u8) -> Option<T> {
        if raw == MISSING_DATA || raw == BELOW_THRESHOLD {
            return None;
        }
        let value = self.scale * raw as f32 + self.offset;
        T::from_f32(value)
    }

    /// Convert a run of raw gates, with `fill` for missing ones
    pub fn unpack_all<T: Float + FromPrimitive>(&self, raw: &[u8], fill: T) -> Vec<T> {
        raw.iter().map(|&b| self.unpack(b).unwrap_or(fill)).collect()
    }
}

/// Julian day plus milliseconds past midnight (UTC)
///
/// Day 1 is 1970-01-01.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct DataTime {
    pub julian_day: i32,
    pub msecs: i64,
}

impl DataTime {
    pub fn new(julian_day: i32, msecs: i64) -> Self {
        Self { julian_day, msecs }
    }

    /// Build from broken-down calendar fields, `None` if they are not a real date
    pub fn from_calendar(year: i32, month: u32, day: u32, hour: u32, minute: u32, second: u32) -> Option<Self> {
        let epoch = NaiveDate::from_ymd_opt(1970, 1, 1)?;
        let date = NaiveDate::from_ymd_opt(year, month, day)?;
        if hour > 23 || minute > 59 || second > 60 {
            return None;
        }
        let days = date.signed_duration_since(epoch).num_days() as i32;
        let msecs = ((hour * 3600 + minute * 60 + second) as i64) * 1000;
        Some(Self::new(days + 1, msecs))
    }

    /// Milliseconds since the Unix epoch
    pub fn epoch_millis(&self) -> i64 {
        (self.julian_day as i64 - 1) * 86_400_000 + self.msecs
    }

    pub fn to_datetime(&self) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(self.epoch_millis()).unwrap_or(DateTime::UNIX_EPOCH)
    }
}

impl fmt::Display for DataTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_datetime().format("%Y-%m-%dT%H:%M:%S%.3fZ"))
    }
}

/// Human readable name for a volume coverage pattern
pub fn vcp_name(vcp: u16) -> &'static str {
    match vcp {
        11 => "16 elevation scans every 5 mins",
        12 => "14 elevation scan every 4.1 mins",
        21 => "11 elevation scans every 6 mins",
        31 => "8 elevation scan every 10 mins",
        32 => "7 elevation scan every 10 mins",
        121 => "9 elevations, 20 scans every 5 minutes",
        _ => "No name",
    }
}
