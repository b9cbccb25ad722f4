//! Module version ordering
//!
//! Module versions are free-form strings. They are ordered the way common
//! package managers order them: an optional `N:` epoch prefix wins first,
//! then the remainder is split into alternating non-digit and digit runs.
//! Non-digit runs compare lexically except that a `.` separator sorts above
//! any other text; digit runs compare numerically, so `1.01` equals `1.1`.
//!
//! # Examples
//!
//! ```
//! use ckan::ModuleVersion;
//!
//! let old = ModuleVersion::new("1.2.9");
//! let new = ModuleVersion::new("1.2.10");
//! assert!(old < new);
//!
//! // An epoch beats anything without one
//! assert!(ModuleVersion::new("1:0.1") > ModuleVersion::new("99.0"));
//!
//! // Extra data after a dot still sorts below the next patch release
//! assert!(ModuleVersion::new("1.0.repackaged") < ModuleVersion::new("1.0.1"));
//! ```

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

/// A concrete release version of a module.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct ModuleVersion {
    epoch: u64,
    version: String,
    original: String,
}

impl ModuleVersion {
    pub fn new(version: &str) -> Self {
        let (epoch, rest) = split_epoch(version);
        Self {
            epoch,
            version: rest.to_string(),
            original: version.to_string(),
        }
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// The version string with any epoch prefix removed.
    pub fn without_epoch(&self) -> &str {
        &self.version
    }

    pub fn as_str(&self) -> &str {
        &self.original
    }

    pub fn is_empty(&self) -> bool {
        self.original.is_empty()
    }

    pub fn is_greater_than(&self, other: &ModuleVersion) -> bool {
        self > other
    }

    pub fn is_less_than(&self, other: &ModuleVersion) -> bool {
        self < other
    }

    pub fn is_equal_to(&self, other: &ModuleVersion) -> bool {
        self == other
    }
}

/// Split `"2:1.0"` into `(2, "1.0")`. Strings without a well-formed epoch keep epoch 0.
fn split_epoch(version: &str) -> (u64, &str) {
    if let Some((prefix, rest)) = version.split_once(':') {
        if !prefix.is_empty() && prefix.bytes().all(|b| b.is_ascii_digit()) {
            if let Ok(epoch) = prefix.parse::<u64>() {
                return (epoch, rest);
            }
        }
    }
    (0, version)
}

/// Take the leading run of bytes matching `pred`, returning (run, remainder).
fn take_run(s: &str, pred: impl Fn(u8) -> bool) -> (&str, &str) {
    let end = s.bytes().position(|b| !pred(b)).unwrap_or(s.len());
    s.split_at(end)
}

/// Split a version into (text, number) pairs: `"1.0_beta"` gives
/// `("", "1"), (".", ""), ("_beta", "")`. Leading zeros are dropped from
/// numbers so `01` and `1` yield the same run.
fn runs(mut s: &str) -> impl Iterator<Item = (&str, &str)> {
    std::iter::from_fn(move || {
        if s.is_empty() {
            return None;
        }
        let (text, rest) = take_run(s, |c| !c.is_ascii_digit());
        let (number, rest) = take_run(rest, |c| c.is_ascii_digit());
        s = rest;
        Some((text, number.trim_start_matches('0')))
    })
}

/// Compare two text runs. A `.` separator sorts above any other text, and a
/// bare `.` above a longer run starting with one, so `1.0_beta < 1.0.1_beta`
/// and `1.0.repackaged < 1.0.1`.
fn compare_text(a: &str, b: &str) -> Ordering {
    if a.is_empty() || b.is_empty() {
        return a.cmp(b);
    }
    match (a.starts_with('.'), b.starts_with('.')) {
        (false, true) => Ordering::Less,
        (true, false) => Ordering::Greater,
        (true, true) => match (a.len() == 1, b.len() == 1) {
            (true, false) => Ordering::Greater,
            (false, true) => Ordering::Less,
            _ => a.cmp(b),
        },
        (false, false) => a.cmp(b),
    }
}

/// Compare two digit runs numerically without overflowing. Both are already
/// stripped of leading zeros.
fn compare_numeric(a: &str, b: &str) -> Ordering {
    a.len().cmp(&b.len()).then_with(|| a.cmp(b))
}

fn compare_remainders(a: &str, b: &str) -> Ordering {
    let mut a_runs = runs(a);
    let mut b_runs = runs(b);
    loop {
        match (a_runs.next(), b_runs.next()) {
            (Some((a_text, a_num)), Some((b_text, b_num))) => {
                let ord = compare_text(a_text, b_text).then_with(|| compare_numeric(a_num, b_num));
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            // Whichever runs out first is the smaller (1.2 < 1.2.3)
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (None, None) => return Ordering::Equal,
        }
    }
}

impl Ord for ModuleVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        if self.epoch == other.epoch && self.version == other.version {
            return Ordering::Equal;
        }

        self.epoch
            .cmp(&other.epoch)
            .then_with(|| compare_remainders(&self.version, &other.version))
    }
}

impl PartialOrd for ModuleVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// `1.01` and `1.1` are the same version.
impl PartialEq for ModuleVersion {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for ModuleVersion {}

impl Hash for ModuleVersion {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.epoch.hash(state);
        for run in runs(&self.version) {
            run.hash(state);
        }
    }
}

impl fmt::Display for ModuleVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.original)
    }
}

impl From<String> for ModuleVersion {
    fn from(s: String) -> Self {
        Self::new(&s)
    }
}

impl From<&str> for ModuleVersion {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<ModuleVersion> for String {
    fn from(v: ModuleVersion) -> Self {
        v.original
    }
}

/// The version of something the registry considers installed.
///
/// Autodetected DLLs and virtual packages have no real version number;
/// they only ever equal themselves and never take part in upgrade math.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Version {
    Module(ModuleVersion),
    Autodetected,
    Provides { provided_by: String },
}

impl Version {
    /// The concrete release version, if this is one.
    pub fn module_version(&self) -> Option<&ModuleVersion> {
        match self {
            Version::Module(v) => Some(v),
            _ => None,
        }
    }

    pub fn is_autodetected(&self) -> bool {
        matches!(self, Version::Autodetected)
    }

    pub fn is_provided(&self) -> bool {
        matches!(self, Version::Provides { .. })
    }

    pub fn is_greater_than(&self, other: &Version) -> bool {
        self.partial_cmp(other) == Some(Ordering::Greater)
    }

    pub fn is_less_than(&self, other: &Version) -> bool {
        self.partial_cmp(other) == Some(Ordering::Less)
    }

    pub fn is_equal_to(&self, other: &Version) -> bool {
        self.partial_cmp(other) == Some(Ordering::Equal)
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Version::Module(a), Version::Module(b)) => Some(a.cmp(b)),
            _ if self == other => Some(Ordering::Equal),
            _ => None,
        }
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Version::Module(v) => write!(f, "{}", v),
            Version::Autodetected => f.write_str("autodetected dll"),
            Version::Provides { provided_by } => write!(f, "provided by {}", provided_by),
        }
    }
}

impl From<ModuleVersion> for Version {
    fn from(v: ModuleVersion) -> Self {
        Version::Module(v)
    }
}
