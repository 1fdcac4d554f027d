//! Module versions and version ranges
//!
//! Module versions are dotted `major.minor.micro[.qualifier]` strings. Missing
//! numeric segments default to zero. Lookups by version only compare the
//! numeric triple; the qualifier is kept for display and ordering ties.

use semver::Version;
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use crate::error::CoreError;

/// A module version with an optional qualifier
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ModuleVersion {
    triple: Version,
    qualifier: Option<String>,
}

impl ModuleVersion {
    pub fn new(major: u64, minor: u64, micro: u64) -> Self {
        Self {
            triple: Version::new(major, minor, micro),
            qualifier: None,
        }
    }

    pub fn with_qualifier(mut self, qualifier: impl Into<String>) -> Self {
        let qualifier = qualifier.into();
        self.qualifier = if qualifier.is_empty() {
            None
        } else {
            Some(qualifier)
        };
        self
    }

    /// The version `0.0.0`
    pub fn empty() -> Self {
        Self::new(0, 0, 0)
    }

    pub fn parse(input: &str) -> Result<Self, CoreError> {
        let input = input.trim();
        if input.is_empty() {
            return Ok(Self::empty());
        }

        let mut parts = input.splitn(4, '.');
        let mut numbers = [0u64; 3];
        for slot in numbers.iter_mut() {
            match parts.next() {
                Some(part) => {
                    *slot = part
                        .parse()
                        .map_err(|_| CoreError::InvalidVersion(input.to_string()))?;
                }
                None => break,
            }
        }
        let version = Self::new(numbers[0], numbers[1], numbers[2]);
        Ok(match parts.next() {
            Some(qualifier) => version.with_qualifier(qualifier),
            None => version,
        })
    }

    pub fn major(&self) -> u64 {
        self.triple.major
    }

    pub fn minor(&self) -> u64 {
        self.triple.minor
    }

    pub fn micro(&self) -> u64 {
        self.triple.patch
    }

    pub fn qualifier(&self) -> Option<&str> {
        self.qualifier.as_deref()
    }

    pub fn triple(&self) -> &Version {
        &self.triple
    }

    /// Whether both versions share `major.minor.micro`, ignoring qualifiers
    pub fn same_triple(&self, other: &ModuleVersion) -> bool {
        self.triple == other.triple
    }

    /// `major.minor.micro` without the qualifier
    pub fn without_qualifier(&self) -> String {
        self.triple.to_string()
    }
}

impl Default for ModuleVersion {
    fn default() -> Self {
        Self::empty()
    }
}

impl Ord for ModuleVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        self.triple.cmp(&other.triple).then_with(|| {
            self.qualifier
                .as_deref()
                .unwrap_or("")
                .cmp(other.qualifier.as_deref().unwrap_or(""))
        })
    }
}

impl PartialOrd for ModuleVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for ModuleVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.triple)?;
        if let Some(qualifier) = &self.qualifier {
            write!(f, ".{}", qualifier)?;
        }
        Ok(())
    }
}

impl FromStr for ModuleVersion {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// An interval of module versions such as `[1.0,2.0)`
///
/// A bare version means "at least this version".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionRange {
    pub minimum: ModuleVersion,
    pub include_minimum: bool,
    pub maximum: Option<ModuleVersion>,
    pub include_maximum: bool,
}

impl VersionRange {
    /// Matches every version
    pub fn any() -> Self {
        Self::at_least(ModuleVersion::empty())
    }

    pub fn at_least(minimum: ModuleVersion) -> Self {
        Self {
            minimum,
            include_minimum: true,
            maximum: None,
            include_maximum: false,
        }
    }

    pub fn parse(input: &str) -> Result<Self, CoreError> {
        let input = input.trim().trim_matches('"');
        let invalid = || CoreError::InvalidVersion(input.to_string());

        let Some(first) = input.chars().next() else {
            return Ok(Self::any());
        };
        if first != '[' && first != '(' {
            return Ok(Self::at_least(ModuleVersion::parse(input)?));
        }

        let last = input.chars().last().ok_or_else(invalid)?;
        if last != ']' && last != ')' {
            return Err(invalid());
        }
        let body = &input[1..input.len() - 1];
        let (low, high) = body.split_once(',').ok_or_else(invalid)?;

        Ok(Self {
            minimum: ModuleVersion::parse(low)?,
            include_minimum: first == '[',
            maximum: Some(ModuleVersion::parse(high)?),
            include_maximum: last == ']',
        })
    }

    pub fn includes(&self, version: &ModuleVersion) -> bool {
        let above = match version.cmp(&self.minimum) {
            Ordering::Greater => true,
            Ordering::Equal => self.include_minimum,
            Ordering::Less => false,
        };
        if !above {
            return false;
        }
        match &self.maximum {
            None => true,
            Some(maximum) => match version.cmp(maximum) {
                Ordering::Less => true,
                Ordering::Equal => self.include_maximum,
                Ordering::Greater => false,
            },
        }
    }
}

impl Default for VersionRange {
    fn default() -> Self {
        Self::any()
    }
}

impl fmt::Display for VersionRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.maximum {
            None => write!(f, "{}", self.minimum),
            Some(maximum) => write!(
                f,
                "{}{},{}{}",
                if self.include_minimum { '[' } else { '(' },
                self.minimum,
                maximum,
                if self.include_maximum { ']' } else { ')' }
            ),
        }
    }
}
