//! Platform version parsing and comparison.

use std::fmt;
use std::str::FromStr;

use crate::error::UpgradeError;

/// A platform release version.
///
/// Versions compare by `(major, minor, patch)`; the derived ordering is the
/// one the upgrade decision is built on. Note that two equal versions can
/// still differ in their supported provisioner variant set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Version {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
}

impl FromStr for Version {
    type Err = UpgradeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim().strip_prefix('v').unwrap_or_else(|| s.trim());

        let parts: Vec<&str> = trimmed.split('.').collect();
        if parts.len() != 3 {
            return Err(UpgradeError::InvalidVersion(s.to_string()));
        }

        let parse = |p: &str| {
            p.parse::<u64>()
                .map_err(|_| UpgradeError::InvalidVersion(s.to_string()))
        };

        Ok(Self {
            major: parse(parts[0])?,
            minor: parse(parts[1])?,
            patch: parse(parts[2])?,
        })
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(major: u64, minor: u64, patch: u64) -> Version {
        Version {
            major,
            minor,
            patch,
        }
    }

    #[test]
    fn test_parse_version() {
        assert_eq!("2.1.0".parse::<Version>().unwrap(), v(2, 1, 0));
        assert_eq!("v1.9.3".parse::<Version>().unwrap(), v(1, 9, 3));
        assert_eq!(" 1.0.0 ".parse::<Version>().unwrap(), v(1, 0, 0));
    }

    #[test]
    fn test_parse_version_invalid() {
        assert!("1.0".parse::<Version>().is_err());
        assert!("1.0.0.0".parse::<Version>().is_err());
        assert!("one.two.three".parse::<Version>().is_err());
        assert!("".parse::<Version>().is_err());
    }

    #[test]
    fn test_version_ordering() {
        let v100: Version = "1.0.0".parse().unwrap();
        let v110: Version = "1.1.0".parse().unwrap();
        let v200: Version = "2.0.0".parse().unwrap();

        assert!(v100 < v110);
        assert!(v110 < v200);
        assert!(v200 > v100);
        assert_eq!(v200, v(2, 0, 0));
    }

    #[test]
    fn test_version_display_roundtrip() {
        let v: Version = "2.1.7".parse().unwrap();
        assert_eq!(v.to_string(), "2.1.7");
    }
}
