//! Semantic versioning (SemVer 2.0.0) with pessimistic ranges.
//!
//! DXT manifests pin runtime and host-app compatibility with ranges in the
//! `~>` / `||` style, which the standard Cargo range grammar does not speak,
//! so parsing and matching live here. Versions may omit MINOR/PATCH on input
//! (`~> 1.2` and even `>= 2`); omitted parts normalize to zero, and the
//! number of written parts drives the pessimistic operator's upper bound.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// Errors from version or range parsing.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum SemVerError {
    /// The version string was not parseable.
    #[error("Invalid version '{0}': {1}")]
    InvalidVersion(String, String),

    /// The range string was not parseable.
    #[error("Invalid version requirement '{0}': {1}")]
    InvalidRequirement(String, String),
}

/// One dot-separated pre-release identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Identifier {
    /// All-digit identifier; compares numerically, sorts below alphanumerics
    Numeric(u64),
    /// Alphanumeric identifier; compares lexically in ASCII order
    Alpha(String),
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Numeric(n) => write!(f, "{n}"),
            Self::Alpha(s) => f.write_str(s),
        }
    }
}

impl Ord for Identifier {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::Numeric(a), Self::Numeric(b)) => a.cmp(b),
            (Self::Numeric(_), Self::Alpha(_)) => Ordering::Less,
            (Self::Alpha(_), Self::Numeric(_)) => Ordering::Greater,
            (Self::Alpha(a), Self::Alpha(b)) => a.cmp(b),
        }
    }
}

impl PartialOrd for Identifier {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// A parsed semantic version.
///
/// Build metadata is carried for display but ignored by equality and
/// ordering, per SemVer 2.0.0.
#[derive(Debug, Clone)]
pub struct SemVer {
    /// Major version
    pub major: u64,
    /// Minor version
    pub minor: u64,
    /// Patch version
    pub patch: u64,
    /// Pre-release identifiers, empty for a release version
    pub pre: Vec<Identifier>,
    /// Build metadata identifiers
    pub build: Vec<String>,
}

impl SemVer {
    /// A release version with no pre-release or build parts.
    #[must_use]
    pub fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self {
            major,
            minor,
            patch,
            pre: Vec::new(),
            build: Vec::new(),
        }
    }

    /// Whether this version satisfies a requirement string.
    ///
    /// The grammar: `||`-separated alternatives of whitespace-separated
    /// comparators, each `>=`, `>`, `<=`, `<`, `==`, or `~>` followed by a
    /// (possibly partial) version. A bare version means `==`.
    ///
    /// # Errors
    ///
    /// [`SemVerError::InvalidRequirement`] for malformed requirements.
    pub fn satisfies(&self, requirement: &str) -> Result<bool, SemVerError> {
        let req = Requirement::from_str(requirement)?;
        Ok(req.matches(self))
    }
}

impl PartialEq for SemVer {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for SemVer {}

impl Ord for SemVer {
    fn cmp(&self, other: &Self) -> Ordering {
        self.major
            .cmp(&other.major)
            .then_with(|| self.minor.cmp(&other.minor))
            .then_with(|| self.patch.cmp(&other.patch))
            .then_with(|| match (self.pre.is_empty(), other.pre.is_empty()) {
                (true, true) => Ordering::Equal,
                // A release sorts above any of its pre-releases.
                (true, false) => Ordering::Greater,
                (false, true) => Ordering::Less,
                (false, false) => self.pre.cmp(&other.pre),
            })
    }
}

impl PartialOrd for SemVer {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for SemVer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)?;
        if !self.pre.is_empty() {
            let joined = self
                .pre
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(".");
            write!(f, "-{joined}")?;
        }
        if !self.build.is_empty() {
            write!(f, "+{}", self.build.join("."))?;
        }
        Ok(())
    }
}

impl FromStr for SemVer {
    type Err = SemVerError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let (version, _precision) = parse_partial(input)?;
        Ok(version)
    }
}

/// Parse a version, allowing MINOR and PATCH to be omitted. Returns the
/// version and how many core components were actually written (1–3).
fn parse_partial(input: &str) -> Result<(SemVer, usize), SemVerError> {
    let err = |msg: &str| SemVerError::InvalidVersion(input.to_string(), msg.to_string());

    let input = input.trim();
    if input.is_empty() {
        return Err(err("empty string"));
    }

    // Build metadata first: everything after the first '+'.
    let (rest, build) = match input.split_once('+') {
        Some((rest, build)) => (rest, Some(build)),
        None => (input, None),
    };

    // Pre-release: everything after the first '-' (hyphens inside
    // pre-release identifiers stay put).
    let (core, pre) = match rest.split_once('-') {
        Some((core, pre)) => (core, Some(pre)),
        None => (rest, None),
    };

    let parts: Vec<&str> = core.split('.').collect();
    if parts.is_empty() || parts.len() > 3 {
        return Err(err("expected 1 to 3 numeric components"));
    }
    let mut numbers = [0u64; 3];
    for (i, part) in parts.iter().enumerate() {
        numbers[i] = parse_numeric(part).ok_or_else(|| err("bad numeric component"))?;
    }

    let pre = match pre {
        None => Vec::new(),
        Some(pre) => pre
            .split('.')
            .map(parse_pre_identifier)
            .collect::<Option<Vec<_>>>()
            .ok_or_else(|| err("bad pre-release identifier"))?,
    };

    let build = match build {
        None => Vec::new(),
        Some(build) => build
            .split('.')
            .map(|id| {
                if !id.is_empty() && id.bytes().all(is_identifier_byte) {
                    Some(id.to_string())
                } else {
                    None
                }
            })
            .collect::<Option<Vec<_>>>()
            .ok_or_else(|| err("bad build identifier"))?,
    };

    Ok((
        SemVer {
            major: numbers[0],
            minor: numbers[1],
            patch: numbers[2],
            pre,
            build,
        },
        parts.len(),
    ))
}

fn is_identifier_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'-'
}

/// Numeric component: digits only, no leading zero (except "0" itself).
fn parse_numeric(s: &str) -> Option<u64> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    if s.len() > 1 && s.starts_with('0') {
        return None;
    }
    s.parse().ok()
}

fn parse_pre_identifier(s: &str) -> Option<Identifier> {
    if s.is_empty() || !s.bytes().all(is_identifier_byte) {
        return None;
    }
    if s.bytes().all(|b| b.is_ascii_digit()) {
        // Numeric identifiers reject leading zeros.
        parse_numeric(s).map(Identifier::Numeric)
    } else {
        Some(Identifier::Alpha(s.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Op {
    Ge,
    Gt,
    Le,
    Lt,
    Eq,
    Pessimistic,
}

#[derive(Debug, Clone)]
struct Comparator {
    op: Op,
    version: SemVer,
    precision: usize,
}

impl Comparator {
    fn matches(&self, candidate: &SemVer) -> bool {
        match self.op {
            Op::Ge => candidate >= &self.version,
            Op::Gt => candidate > &self.version,
            Op::Le => candidate <= &self.version,
            Op::Lt => candidate < &self.version,
            Op::Eq => candidate == &self.version,
            Op::Pessimistic => {
                if candidate < &self.version {
                    return false;
                }
                match self.precision {
                    // `~> X`: no upper bound.
                    1 => true,
                    // `~> X.Y`: < (X+1).0.0
                    2 => candidate < &SemVer::new(self.version.major + 1, 0, 0),
                    // `~> X.Y.Z`: < X.(Y+1).0
                    _ => {
                        candidate
                            < &SemVer::new(self.version.major, self.version.minor + 1, 0)
                    }
                }
            }
        }
    }
}

/// A parsed requirement: alternatives of conjunctions.
#[derive(Debug, Clone)]
struct Requirement {
    alternatives: Vec<Vec<Comparator>>,
}

impl Requirement {
    fn matches(&self, candidate: &SemVer) -> bool {
        self.alternatives
            .iter()
            .any(|all| all.iter().all(|c| c.matches(candidate)))
    }
}

impl FromStr for Requirement {
    type Err = SemVerError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let err =
            |msg: &str| SemVerError::InvalidRequirement(input.to_string(), msg.to_string());

        let mut alternatives = Vec::new();
        for alternative in input.split("||") {
            let mut comparators = Vec::new();
            let mut tokens = alternative.split_whitespace().peekable();
            while let Some(token) = tokens.next() {
                let (op, version_text) = split_operator(token);
                let version_text = if version_text.is_empty() {
                    // Operator and version separated by whitespace.
                    tokens.next().ok_or_else(|| err("dangling operator"))?
                } else {
                    version_text
                };
                let (version, precision) = parse_partial(version_text)
                    .map_err(|e| err(&e.to_string()))?;
                comparators.push(Comparator {
                    op,
                    version,
                    precision,
                });
            }
            if comparators.is_empty() {
                return Err(err("empty alternative"));
            }
            alternatives.push(comparators);
        }
        Ok(Self { alternatives })
    }
}

fn split_operator(token: &str) -> (Op, &str) {
    for (text, op) in [
        ("~>", Op::Pessimistic),
        (">=", Op::Ge),
        ("<=", Op::Le),
        ("==", Op::Eq),
        (">", Op::Gt),
        ("<", Op::Lt),
    ] {
        if let Some(rest) = token.strip_prefix(text) {
            return (op, rest);
        }
    }
    // A bare version means exact equality.
    (Op::Eq, token)
}
