//! Firmware version parsing for the connect-time compatibility gate.

use crate::error::{LinkError, LinkResult};
use regex_lite::Regex;
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

/// Three-part firmware version, ordered lexicographically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FirmwareVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl FirmwareVersion {
    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }
}

// Three digit groups, each pair split by any single character, e.g. "3.1.2"
// or "3_1_2". Trailing text such as "-rc1" is ignored.
static VERSION_PATTERN: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^(\d+).(\d+).(\d+)").ok());

impl FromStr for FirmwareVersion {
    type Err = LinkError;

    fn from_str(s: &str) -> LinkResult<Self> {
        let invalid = || LinkError::InvalidVersion(s.to_string());
        let pattern = VERSION_PATTERN.as_ref().ok_or_else(invalid)?;
        let caps = pattern.captures(s.trim()).ok_or_else(invalid)?;
        let part = |i: usize| -> LinkResult<u32> {
            caps.get(i)
                .ok_or_else(invalid)?
                .as_str()
                .parse()
                .map_err(|_| invalid())
        };
        Ok(Self::new(part(1)?, part(2)?, part(3)?))
    }
}

impl fmt::Display for FirmwareVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plain_and_suffixed() {
        assert_eq!(
            "3.1.2".parse::<FirmwareVersion>().unwrap(),
            FirmwareVersion::new(3, 1, 2)
        );
        assert_eq!(
            "10.0.7-beta".parse::<FirmwareVersion>().unwrap(),
            FirmwareVersion::new(10, 0, 7)
        );
    }

    #[test]
    fn test_parse_accepts_any_separator() {
        assert_eq!(
            "3_1_2".parse::<FirmwareVersion>().unwrap(),
            FirmwareVersion::new(3, 1, 2)
        );
        assert_eq!(
            "3-4 5".parse::<FirmwareVersion>().unwrap(),
            FirmwareVersion::new(3, 4, 5)
        );
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!("v3.1.2".parse::<FirmwareVersion>().is_err());
        assert!("3.1".parse::<FirmwareVersion>().is_err());
        assert!("".parse::<FirmwareVersion>().is_err());
    }

    #[test]
    fn test_ordering_is_numeric() {
        let old = FirmwareVersion::new(2, 9, 10);
        let min = FirmwareVersion::new(3, 0, 0);
        let new = FirmwareVersion::new(3, 0, 1);
        assert!(old < min);
        assert!(new > min);
        assert!(FirmwareVersion::new(3, 10, 0) > FirmwareVersion::new(3, 9, 9));
    }
}
