// Time series vocabulary - metric resolutions and standard units
use serde::{Deserialize, Serialize};

pub const FIVE_SECONDS: i64 = 5;
pub const MINUTE: i64 = 60;
pub const HOUR: i64 = 60 * MINUTE;
pub const DAY: i64 = 24 * HOUR;
pub const MONTH: i64 = 30 * DAY;

/// Used as a point duration when nothing more specific is known.
pub const SMALLEST_RESOLUTION: i64 = FIVE_SECONDS;

/// Prefix of unit names which are not standard, e.g. `custom:apples`.
pub const CUSTOM_UNIT_PREFIX: &str = "custom:";

/// Rounds `timestamp` down to the beginning of its window.
pub fn align_to_resolution(timestamp: i64, resolution: i64) -> i64 {
    if resolution <= 0 {
        return timestamp;
    }
    timestamp - timestamp.rem_euclid(resolution)
}

pub fn is_aligned(timestamp: i64, resolution: i64) -> bool {
    resolution > 0 && timestamp.rem_euclid(resolution) == 0
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum StandardUnit {
    None,
    Milliseconds,
    Seconds,
    Bits,
    Bytes,
    Hertz,
    CountsPerSec,
    BitsPerSec,
    BytesPerSec,
    OperationsPerSec,
    RequestsPerSec,
    ReadsPerSec,
    WritesPerSec,
    IoOperationsPerSec,
    Percent,
    PercentNormalized,
    Boolean,
    Custom,
}

impl StandardUnit {
    pub fn from_name(name: &str) -> Option<Self> {
        let unit = match name {
            "none" => Self::None,
            "milliseconds" => Self::Milliseconds,
            "seconds" => Self::Seconds,
            "bits" => Self::Bits,
            "bytes" => Self::Bytes,
            "hertz" => Self::Hertz,
            "countsPerSec" => Self::CountsPerSec,
            "bitsPerSec" => Self::BitsPerSec,
            "bytesPerSec" => Self::BytesPerSec,
            "operationsPerSec" => Self::OperationsPerSec,
            "requestsPerSec" => Self::RequestsPerSec,
            "readsPerSec" => Self::ReadsPerSec,
            "writesPerSec" => Self::WritesPerSec,
            "ioOperationsPerSec" => Self::IoOperationsPerSec,
            "percent" => Self::Percent,
            "percentNormalized" => Self::PercentNormalized,
            "boolean" => Self::Boolean,
            "custom" => Self::Custom,
            other if other.starts_with(CUSTOM_UNIT_PREFIX) => Self::Custom,
            _ => return None,
        };
        Some(unit)
    }

    /// Short suffix rendered after values of frequency-like units.
    pub fn suffix(&self) -> Option<&'static str> {
        match self {
            Self::Hertz => Some("Hz"),
            Self::CountsPerSec => Some("c/s"),
            Self::OperationsPerSec => Some("ops/s"),
            Self::RequestsPerSec => Some("req/s"),
            Self::ReadsPerSec => Some("rd/s"),
            Self::WritesPerSec => Some("wr/s"),
            Self::IoOperationsPerSec => Some("io/s"),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_align_to_resolution() {
        assert_eq!(align_to_resolution(125, MINUTE), 120);
        assert_eq!(align_to_resolution(120, MINUTE), 120);
        assert_eq!(align_to_resolution(-1, MINUTE), -60);
        assert_eq!(align_to_resolution(17, 0), 17);
        assert!(is_aligned(3600, HOUR));
        assert!(!is_aligned(3601, HOUR));
    }

    #[test]
    fn test_unit_from_name() {
        assert_eq!(StandardUnit::from_name("bytesPerSec"), Some(StandardUnit::BytesPerSec));
        assert_eq!(StandardUnit::from_name("custom:apples"), Some(StandardUnit::Custom));
        assert_eq!(StandardUnit::from_name("furlongs"), None);
        assert_eq!(StandardUnit::Hertz.suffix(), Some("Hz"));
        assert_eq!(StandardUnit::Bytes.suffix(), None);
    }
}
