//! Game version parsing and compatibility targets
//!
//! Module metadata declares the game versions it works with as either a
//! short version (`1.12`, any patch release of 1.12), a long version
//! (`1.12.5`, exactly that release) or `any`.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum GameVersion {
    #[default]
    Any,
    Short {
        major: u32,
        minor: u32,
    },
    Long {
        major: u32,
        minor: u32,
        patch: u32,
    },
}

impl GameVersion {
    pub fn new(major: u32, minor: u32, patch: u32) -> Self {
        GameVersion::Long {
            major,
            minor,
            patch,
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("any") {
            return Ok(GameVersion::Any);
        }

        // ".25" is an old shorthand for "0.25"
        let normalized = if trimmed.starts_with('.') {
            format!("0{}", trimmed)
        } else {
            trimmed.to_string()
        };

        let parts: Vec<u32> = normalized
            .split('.')
            .map(|p| p.parse::<u32>())
            .collect::<std::result::Result<_, _>>()
            .map_err(|_| Error::BadGameVersion(s.to_string()))?;

        match parts.as_slice() {
            [major, minor] => Ok(GameVersion::Short {
                major: *major,
                minor: *minor,
            }),
            [major, minor, patch] => Ok(GameVersion::Long {
                major: *major,
                minor: *minor,
                patch: *patch,
            }),
            _ => Err(Error::BadGameVersion(s.to_string())),
        }
    }

    pub fn is_any(&self) -> bool {
        matches!(self, GameVersion::Any)
    }

    pub fn is_short(&self) -> bool {
        matches!(self, GameVersion::Short { .. })
    }

    /// Lowest release this version covers (`1.12` → `1.12.0`).
    pub fn lower_bound(&self) -> Option<(u32, u32, u32)> {
        match *self {
            GameVersion::Any => None,
            GameVersion::Short { major, minor } => Some((major, minor, 0)),
            GameVersion::Long {
                major,
                minor,
                patch,
            } => Some((major, minor, patch)),
        }
    }

    /// Highest release this version covers (`1.12` → every 1.12.x).
    pub fn upper_bound(&self) -> Option<(u32, u32, u32)> {
        match *self {
            GameVersion::Any => None,
            GameVersion::Short { major, minor } => Some((major, minor, u32::MAX)),
            GameVersion::Long {
                major,
                minor,
                patch,
            } => Some((major, minor, patch)),
        }
    }

    /// True if a module declaring `self` runs on the `actual` game release.
    pub fn targets(&self, actual: &GameVersion) -> bool {
        let (Some(lo), Some(hi)) = (self.lower_bound(), self.upper_bound()) else {
            return true;
        };
        let (Some(actual_lo), Some(actual_hi)) = (actual.lower_bound(), actual.upper_bound())
        else {
            return true;
        };
        actual_lo >= lo && actual_hi <= hi
    }

    /// Order the release a short or long version stands for against `other`.
    /// `Any` has no position, so comparisons involving it return `None`.
    pub fn compare_release(&self, other: &GameVersion) -> Option<Ordering> {
        Some(self.lower_bound()?.cmp(&other.lower_bound()?))
    }
}

impl FromStr for GameVersion {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        GameVersion::parse(s)
    }
}

impl TryFrom<String> for GameVersion {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        GameVersion::parse(&s)
    }
}

impl From<GameVersion> for String {
    fn from(v: GameVersion) -> Self {
        v.to_string()
    }
}

impl fmt::Display for GameVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GameVersion::Any => f.write_str("any"),
            GameVersion::Short { major, minor } => write!(f, "{}.{}", major, minor),
            GameVersion::Long {
                major,
                minor,
                patch,
            } => write!(f, "{}.{}.{}", major, minor, patch),
        }
    }
}
