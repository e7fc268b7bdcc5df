//! Lenient semantic versions and version ranges.
//!
//! Capability declarations are authored by humans in blueprint catalogs, so
//! parsing accepts the shorthand people actually write (`1`, `1.2`, `v1.2.3`,
//! `^2.0`) and normalizes it to a full `major.minor.patch` triple.
//!
//! ## Range grammar
//!
//! ```text
//! range       := alternative ( "||" alternative )*
//! alternative := comparator ( " " comparator )*      (all must match)
//! comparator  := op? partial
//! op          := "^" | "~" | ">=" | ">" | "<=" | "<" | "="
//! partial     := part ( "." part ( "." part )? )?  ( "-" pre )?
//! part        := digits | "x" | "X" | "*"
//! ```
//!
//! `*`, `latest` and the empty string match every version.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::DomainError;

// ============================================================================
// Version
// ============================================================================

/// A `major.minor.patch[-pre]` version.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Version {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
    pub pre: Option<String>,
}

impl Version {
    pub const fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self {
            major,
            minor,
            patch,
            pre: None,
        }
    }

    /// Parse a version, tolerating a leading `v`/`=` and missing components.
    pub fn parse(input: &str) -> Result<Self, DomainError> {
        let partial = Partial::parse(input.trim().trim_start_matches(['v', 'V', '=']), input)?;
        if partial.wildcard {
            return Err(DomainError::InvalidVersion {
                input: input.to_string(),
                reason: "wildcards are only allowed in ranges".into(),
            });
        }
        Ok(partial.floor())
    }

    /// Whether two versions sit in the same caret-compatible line.
    ///
    /// `1.4.0` and `1.9.2` are compatible, `1.x` and `2.x` are not. For
    /// `0.x` releases the minor component is significant, for `0.0.x` the
    /// patch component.
    pub fn is_compatible_with(&self, other: &Version) -> bool {
        if self.major != other.major {
            return false;
        }
        if self.major > 0 {
            return true;
        }
        if self.minor != other.minor {
            return false;
        }
        self.minor > 0 || self.patch == other.patch
    }

    fn bump_major(&self) -> Version {
        Version::new(self.major + 1, 0, 0)
    }

    fn bump_minor(&self) -> Version {
        Version::new(self.major, self.minor + 1, 0)
    }

    fn bump_patch(&self) -> Version {
        Version::new(self.major, self.minor, self.patch + 1)
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.major, self.minor, self.patch)
            .cmp(&(other.major, other.minor, other.patch))
            .then_with(|| match (&self.pre, &other.pre) {
                (None, None) => Ordering::Equal,
                // A pre-release sorts below its release.
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (Some(a), Some(b)) => a.cmp(b),
            })
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)?;
        if let Some(pre) = &self.pre {
            write!(f, "-{pre}")?;
        }
        Ok(())
    }
}

impl FromStr for Version {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Version {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Version> for String {
    fn from(value: Version) -> Self {
        value.to_string()
    }
}

// ============================================================================
// Partial versions (range operands)
// ============================================================================

#[derive(Debug, Clone, Default)]
struct Partial {
    major: Option<u64>,
    minor: Option<u64>,
    patch: Option<u64>,
    pre: Option<String>,
    wildcard: bool,
}

impl Partial {
    fn parse(text: &str, original: &str) -> Result<Self, DomainError> {
        let invalid = |reason: &str| DomainError::InvalidVersion {
            input: original.to_string(),
            reason: reason.to_string(),
        };

        let text = text.split('+').next().unwrap_or_default();
        let (core, pre) = match text.split_once('-') {
            Some((core, pre)) if !pre.is_empty() => (core, Some(pre.to_string())),
            Some(_) => return Err(invalid("empty pre-release tag")),
            None => (text, None),
        };

        if core.is_empty() {
            return Err(invalid("empty version"));
        }

        let mut parts = [None; 3];
        let mut count = 0;
        let mut partial_wildcard = false;
        for (index, part) in core.split('.').enumerate() {
            if index >= 3 {
                return Err(invalid("more than three components"));
            }
            parts[index] = match part {
                "x" | "X" | "*" => {
                    partial_wildcard = true;
                    None
                }
                digits => Some(
                    digits
                        .parse::<u64>()
                        .map_err(|_| invalid("components must be numeric"))?,
                ),
            };
            count = index + 1;
        }

        // Anything after a wildcard is a wildcard too (`1.x.3` == `1.x`).
        let mut partial = Partial {
            pre,
            wildcard: partial_wildcard,
            ..Partial::default()
        };
        for (index, value) in parts.iter().take(count).enumerate() {
            match (index, value) {
                (_, None) => break,
                (0, Some(v)) => partial.major = Some(*v),
                (1, Some(v)) => partial.minor = Some(*v),
                (_, Some(v)) => partial.patch = Some(*v),
            }
        }
        Ok(partial)
    }

    fn floor(&self) -> Version {
        Version {
            major: self.major.unwrap_or(0),
            minor: self.minor.unwrap_or(0),
            patch: self.patch.unwrap_or(0),
            pre: self.pre.clone(),
        }
    }

    fn is_exact(&self) -> bool {
        self.patch.is_some()
    }

    /// Exclusive upper bound for "anything matching this prefix".
    fn prefix_ceiling(&self) -> Option<Version> {
        let floor = self.floor();
        match (self.major, self.minor, self.patch) {
            (None, _, _) => None,
            (Some(_), None, _) => Some(floor.bump_major()),
            (Some(_), Some(_), None) => Some(floor.bump_minor()),
            (Some(_), Some(_), Some(_)) => Some(floor.bump_patch()),
        }
    }
}

// ============================================================================
// Comparators & ranges
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Op {
    Eq,
    Gt,
    Gte,
    Lt,
    Lte,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Comparator {
    op: Op,
    version: Version,
}

impl Comparator {
    fn matches(&self, version: &Version) -> bool {
        match self.op {
            Op::Eq => version == &self.version,
            Op::Gt => version > &self.version,
            Op::Gte => version >= &self.version,
            Op::Lt => version < &self.version,
            Op::Lte => version <= &self.version,
        }
    }

    fn gte(version: Version) -> Self {
        Self {
            op: Op::Gte,
            version,
        }
    }

    fn lt(version: Version) -> Self {
        Self {
            op: Op::Lt,
            version,
        }
    }
}

/// A set of acceptable versions, written in npm-style range syntax.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct VersionRange {
    raw: String,
    alternatives: Vec<Vec<Comparator>>,
}

impl VersionRange {
    /// The range matching every version.
    pub fn any() -> Self {
        Self {
            raw: "*".into(),
            alternatives: vec![Vec::new()],
        }
    }

    pub fn parse(input: &str) -> Result<Self, DomainError> {
        let raw = input.trim();
        if raw.is_empty() || raw == "*" || raw.eq_ignore_ascii_case("latest") {
            return Ok(Self::any());
        }

        let mut alternatives = Vec::new();
        for alternative in raw.split("||") {
            alternatives.push(parse_alternative(alternative, input)?);
        }

        Ok(Self {
            raw: raw.to_string(),
            alternatives,
        })
    }

    pub fn matches(&self, version: &Version) -> bool {
        self.alternatives
            .iter()
            .any(|set| set.iter().all(|c| c.matches(version)))
    }

    pub fn is_any(&self) -> bool {
        self.alternatives.iter().any(Vec::is_empty)
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

impl Default for VersionRange {
    fn default() -> Self {
        Self::any()
    }
}

impl fmt::Display for VersionRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl FromStr for VersionRange {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for VersionRange {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<VersionRange> for String {
    fn from(value: VersionRange) -> Self {
        value.raw
    }
}

fn parse_alternative(text: &str, original: &str) -> Result<Vec<Comparator>, DomainError> {
    // Re-attach operators written with a space (`>= 1.0`).
    let mut tokens: Vec<String> = Vec::new();
    let mut pending_op: Option<&str> = None;
    for token in text.split_whitespace() {
        if matches!(token, ">=" | "<=" | ">" | "<" | "=" | "^" | "~") {
            pending_op = Some(token);
            continue;
        }
        match pending_op.take() {
            Some(op) => tokens.push(format!("{op}{token}")),
            None => tokens.push(token.to_string()),
        }
    }
    if pending_op.is_some() || tokens.is_empty() {
        return Err(DomainError::InvalidVersionRange {
            input: original.to_string(),
            reason: "dangling operator or empty alternative".into(),
        });
    }

    let mut comparators = Vec::new();
    for token in &tokens {
        expand_token(token, original, &mut comparators)?;
    }
    Ok(comparators)
}

fn expand_token(token: &str, original: &str, out: &mut Vec<Comparator>) -> Result<(), DomainError> {
    let (op, rest) = split_operator(token);
    let rest = rest.trim_start_matches(['v', 'V']);
    if rest == "*" || rest.eq_ignore_ascii_case("x") {
        return Ok(());
    }
    let partial = Partial::parse(rest, original)?;
    let floor = partial.floor();

    match op {
        "^" => {
            let ceiling = match (partial.major, partial.minor, partial.patch) {
                (None, _, _) => return Ok(()),
                (Some(0), Some(0), Some(_)) => floor.bump_patch(),
                (Some(0), Some(0), None) => Version::new(0, 1, 0),
                (Some(0), Some(_), _) => floor.bump_minor(),
                (Some(0), None, _) => Version::new(1, 0, 0),
                _ => floor.bump_major(),
            };
            out.push(Comparator::gte(floor));
            out.push(Comparator::lt(ceiling));
        }
        "~" | "~>" => {
            let ceiling = match (partial.major, partial.minor) {
                (None, _) => return Ok(()),
                (Some(_), None) => floor.bump_major(),
                (Some(_), Some(_)) => floor.bump_minor(),
            };
            out.push(Comparator::gte(floor));
            out.push(Comparator::lt(ceiling));
        }
        ">" => match partial.prefix_ceiling() {
            Some(_) if partial.is_exact() => out.push(Comparator {
                op: Op::Gt,
                version: floor,
            }),
            Some(ceiling) => out.push(Comparator::gte(ceiling)),
            // `>*` matches nothing; model it as an impossible bound.
            None => out.push(Comparator::lt(Version::new(0, 0, 0))),
        },
        ">=" => out.push(Comparator::gte(floor)),
        "<" => out.push(Comparator::lt(floor)),
        "<=" => match partial.prefix_ceiling() {
            Some(_) if partial.is_exact() => out.push(Comparator {
                op: Op::Lte,
                version: floor,
            }),
            Some(ceiling) => out.push(Comparator::lt(ceiling)),
            None => {}
        },
        _ => {
            // Bare or `=`: exact when fully specified, prefix match otherwise.
            if partial.is_exact() {
                out.push(Comparator {
                    op: Op::Eq,
                    version: floor,
                });
            } else if let Some(ceiling) = partial.prefix_ceiling() {
                out.push(Comparator::gte(floor));
                out.push(Comparator::lt(ceiling));
            }
        }
    }
    Ok(())
}

fn split_operator(token: &str) -> (&str, &str) {
    for op in [">=", "<=", "~>", ">", "<", "=", "^", "~"] {
        if let Some(rest) = token.strip_prefix(op) {
            return (op, rest.trim());
        }
    }
    ("", token)
}

/// Strip a leading range operator and return the base version it names.
///
/// Used for provider declarations such as `database@^2.0`, where the
/// provider asserts the version it implements, not a set.
pub fn base_version(input: &str) -> Result<Version, DomainError> {
    let (_, rest) = split_operator(input.trim());
    Version::parse(rest)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(s: &str) -> Version {
        Version::parse(s).unwrap()
    }

    fn r(s: &str) -> VersionRange {
        VersionRange::parse(s).unwrap()
    }

    #[test]
    fn parses_shorthand_versions() {
        assert_eq!(v("1"), Version::new(1, 0, 0));
        assert_eq!(v("1.2"), Version::new(1, 2, 0));
        assert_eq!(v("v1.2.3"), Version::new(1, 2, 3));
        assert_eq!(v("2.0.0-beta.1").pre.as_deref(), Some("beta.1"));
        assert!(Version::parse("one").is_err());
        assert!(Version::parse("1.2.3.4").is_err());
        assert!(Version::parse("1.x").is_err());
    }

    #[test]
    fn pre_release_sorts_below_release() {
        assert!(v("1.0.0-rc.1") < v("1.0.0"));
        assert!(v("1.0.0") < v("1.0.1"));
    }

    #[test]
    fn caret_ranges() {
        assert!(r("^1.2").matches(&v("1.9.0")));
        assert!(!r("^1.2").matches(&v("2.0.0")));
        assert!(!r("^1.2").matches(&v("1.1.9")));
        assert!(r("^0.2.3").matches(&v("0.2.9")));
        assert!(!r("^0.2.3").matches(&v("0.3.0")));
        assert!(r("^0.0.3").matches(&v("0.0.3")));
        assert!(!r("^0.0.3").matches(&v("0.0.4")));
    }

    #[test]
    fn tilde_and_comparison_ranges() {
        assert!(r("~1.2.3").matches(&v("1.2.9")));
        assert!(!r("~1.2.3").matches(&v("1.3.0")));
        assert!(r(">=1.0 <2").matches(&v("1.5.0")));
        assert!(!r(">=1.0 <2").matches(&v("2.0.0")));
        assert!(r(">= 1.0").matches(&v("3.0.0")));
        assert!(r(">1").matches(&v("2.0.0")));
        assert!(!r(">1").matches(&v("1.9.0")));
        assert!(r("<=1.2").matches(&v("1.2.7")));
    }

    #[test]
    fn wildcards_and_alternatives() {
        assert!(r("*").matches(&v("0.0.1")));
        assert!(r("latest").is_any());
        assert!(r("1.x").matches(&v("1.4.2")));
        assert!(!r("1.x").matches(&v("2.0.0")));
        assert!(r("^1.0 || ^3.0").matches(&v("3.1.0")));
        assert!(!r("^1.0 || ^3.0").matches(&v("2.1.0")));
        assert!(r("1.2.3").matches(&v("1.2.3")));
        assert!(!r("1.2.3").matches(&v("1.2.4")));
    }

    #[test]
    fn rejects_malformed_ranges() {
        assert!(VersionRange::parse(">=").is_err());
        assert!(VersionRange::parse("^abc").is_err());
    }

    #[test]
    fn caret_compatibility_between_versions() {
        assert!(v("1.0.0").is_compatible_with(&v("1.8.0")));
        assert!(!v("1.0.0").is_compatible_with(&v("2.0.0")));
        assert!(!v("0.1.0").is_compatible_with(&v("0.2.0")));
        assert!(v("0.1.0").is_compatible_with(&v("0.1.5")));
    }

    #[test]
    fn base_version_strips_range_operator() {
        assert_eq!(base_version("^2.0").unwrap(), Version::new(2, 0, 0));
        assert_eq!(base_version(">=1.4").unwrap(), Version::new(1, 4, 0));
    }

    #[test]
    fn serde_uses_string_form() {
        let json = serde_json::to_string(&v("1.2")).unwrap();
        assert_eq!(json, "\"1.2.0\"");
        let range: VersionRange = serde_json::from_str("\"^1.0\"").unwrap();
        assert_eq!(range.as_str(), "^1.0");
    }
}
