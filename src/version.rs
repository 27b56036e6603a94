//! `v<major>.<minor>.<patch>` version strings used throughout the save/load
//! framework. Every saveable type and the global root document carry one
//! of these, and compatibility is decided by ordered comparison.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use crate::error::Error;

/// The current global serialization version written to every
/// `svs_config.toml` root document's top-level `__version__` key.
pub const CURRENT_GLOBAL_VERSION: Version = Version::new(0, 0, 2);

/// The oldest global version this loader still accepts. Anything older is
/// rejected with a "please upgrade" message.
pub const MINIMUM_GLOBAL_VERSION: Version = Version::new(0, 0, 2);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Version {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
}

impl Version {
    pub const fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self { major, minor, patch }
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}.{}.{}", self.major, self.minor, self.patch)
    }
}

impl FromStr for Version {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let stripped = s.strip_prefix('v').ok_or_else(|| {
            Error::serialization(None, format!("version string {s:?} must start with 'v'"))
        })?;
        let mut parts = stripped.split('.');
        let mut next = |which: &str| -> Result<u64, Error> {
            parts
                .next()
                .ok_or_else(|| Error::serialization(None, format!("version string {s:?} is missing the {which} component")))?
                .parse::<u64>()
                .map_err(|e| Error::serialization(None, format!("version string {s:?} has a malformed {which} component: {e}")))
        };
        let major = next("major")?;
        let minor = next("minor")?;
        let patch = next("patch")?;
        if parts.next().is_some() {
            return Err(Error::serialization(None, format!("version string {s:?} has trailing components")));
        }
        Ok(Version::new(major, minor, patch))
    }
}

/// Compare `candidate` against the accepted range for this loader.
///
/// Versions older than [`MINIMUM_GLOBAL_VERSION`] are rejected with an
/// "upgrade" message; versions newer than [`CURRENT_GLOBAL_VERSION`] are
/// rejected as "from the future".
pub fn check_global_version(candidate: Version) -> Result<(), Error> {
    match candidate.cmp(&MINIMUM_GLOBAL_VERSION) {
        Ordering::Less => Err(Error::serialization(
            None,
            format!(
                "serialized artifact version {candidate} predates the minimum supported \
                 version {MINIMUM_GLOBAL_VERSION}; please upgrade the artifact before loading it"
            ),
        )),
        _ => {
            if candidate > CURRENT_GLOBAL_VERSION {
                Err(Error::serialization(
                    None,
                    format!(
                        "serialized artifact version {candidate} is newer than this library's \
                         version {CURRENT_GLOBAL_VERSION}; upgrade the library to load it"
                    ),
                ))
            } else {
                Ok(())
            }
        }
    }
}
