//! Semantic version constraints as written in manifests.
//!
//! # Constraint Syntax Reference
//!
//! | Syntax | Description | Example |
//! |--------|-------------|---------|
//! | `1.2.3`, `=1.2.3` | Exact version | `v1.2.3` matches |
//! | `!=1.2.3` | Anything else | |
//! | `>1.2`, `>=1.2`, `<2`, `<=2` | Comparisons (`=>` and `=<` also accepted) | |
//! | `~1.2.3`, `~>1.2.3` | Same major and minor, at least `1.2.3` | `1.2.9` matches |
//! | `^1.2.3` | Same major, at least `1.2.3` | `1.9.0` matches |
//! | `1.2.x`, `1.*`, `*` | Wildcards | |
//! | `1.2 - 1.4.5` | Inclusive range, `>= 1.2, <= 1.4.5` | |
//! | `a, b` or `a b` | Both | `>=1.2, <2` |
//! | `a \|\| b` | Either | `^1.0 \|\| ^3.0` |
//!
//! Missing minor and patch numbers are zero. A leading `v` is ignored.
//!
//! # Prerelease Handling
//!
//! A prerelease version only satisfies an AND-group that mentions a
//! prerelease in one of its comparisons. `^1.0.0` never selects
//! `1.1.0-beta`; `>=1.1.0-alpha, <2` does.

use regex::Regex;
use semver::{BuildMetadata, Prerelease, Version};
use std::cmp::Ordering;
use std::fmt;
use std::sync::LazyLock;

use crate::core::GroveError;

static LENIENT_VERSION: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(
        r"^v?([0-9]+)(?:\.([0-9]+))?(?:\.([0-9]+))?(?:-([0-9A-Za-z\-]+(?:\.[0-9A-Za-z\-]+)*))?(?:\+([0-9A-Za-z\-]+(?:\.[0-9A-Za-z\-]+)*))?$",
    )
    .ok()
});

static COMPARISON: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(
        r"^(!=|>=|=>|<=|=<|~>|>|<|=|~|\^)?\s*v?([0-9xX*]+)(?:\.([0-9xX*]+))?(?:\.([0-9xX*]+))?(?:-([0-9A-Za-z\-]+(?:\.[0-9A-Za-z\-]+)*))?(?:\+([0-9A-Za-z\-]+(?:\.[0-9A-Za-z\-]+)*))?$",
    )
    .ok()
});

static HYPHEN_RANGE: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"(v?[0-9xX*][0-9A-Za-z.+\-*]*)\s+-\s+(v?[0-9xX*][0-9A-Za-z.+\-*]*)").ok()
});

const OPERATORS: [&str; 12] = ["!=", ">=", "=>", "<=", "=<", "~>", ">", "<", "=", "~", "^", ""];

/// Parse a tag or branch name as a version.
///
/// Accepts a leading `v` and fills missing minor and patch numbers with zero.
/// Returns `None` for anything that is not a version.
pub fn parse_version(input: &str) -> Option<Version> {
    let caps = LENIENT_VERSION.as_ref()?.captures(input.trim())?;
    let number = |i: usize| caps.get(i).map_or(Some(0), |m| m.as_str().parse::<u64>().ok());
    let mut version = Version::new(number(1)?, number(2)?, number(3)?);
    if let Some(pre) = caps.get(4) {
        version.pre = Prerelease::new(pre.as_str()).ok()?;
    }
    if let Some(build) = caps.get(5) {
        version.build = BuildMetadata::new(build.as_str()).ok()?;
    }
    Some(version)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Op {
    Equal,
    NotEqual,
    Greater,
    GreaterEqual,
    Less,
    LessEqual,
    Tilde,
    Caret,
}

/// The first version component given as a wildcard.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Wildcard {
    None,
    Major,
    Minor,
    Patch,
}

#[derive(Debug, Clone)]
struct Comparison {
    op: Op,
    version: Version,
    wildcard: Wildcard,
}

fn is_wild(part: &str) -> bool {
    matches!(part, "x" | "X" | "*")
}

impl Comparison {
    fn parse(input: &str) -> Option<Self> {
        let caps = COMPARISON.as_ref()?.captures(input)?;
        let op = match caps.get(1).map_or("", |m| m.as_str()) {
            "" | "=" => Op::Equal,
            "!=" => Op::NotEqual,
            ">" => Op::Greater,
            ">=" | "=>" => Op::GreaterEqual,
            "<" => Op::Less,
            "<=" | "=<" => Op::LessEqual,
            "~" | "~>" => Op::Tilde,
            "^" => Op::Caret,
            _ => return None,
        };

        let parts = [caps.get(2), caps.get(3), caps.get(4)].map(|m| m.map(|m| m.as_str()));
        let mut numbers = [0u64; 3];
        let mut wildcard = Wildcard::None;
        for (i, part) in parts.iter().enumerate() {
            match part {
                Some(p) if is_wild(p) => {
                    wildcard = [Wildcard::Major, Wildcard::Minor, Wildcard::Patch][i];
                    break;
                }
                Some(p) => numbers[i] = p.parse().ok()?,
                None => break,
            }
        }

        let mut version = Version::new(numbers[0], numbers[1], numbers[2]);
        if let Some(pre) = caps.get(5) {
            version.pre = Prerelease::new(pre.as_str()).ok()?;
        }
        Some(Self {
            op,
            version,
            wildcard,
        })
    }

    fn has_prerelease(&self) -> bool {
        !self.version.pre.is_empty()
    }

    /// The components of `v` the wildcard leaves significant, compared with ours.
    fn cmp_significant(&self, v: &Version) -> Ordering {
        match self.wildcard {
            Wildcard::Major => Ordering::Equal,
            Wildcard::Minor => v.major.cmp(&self.version.major),
            Wildcard::Patch => (v.major, v.minor).cmp(&(self.version.major, self.version.minor)),
            Wildcard::None => v.cmp_precedence(&self.version),
        }
    }

    fn matches(&self, v: &Version) -> bool {
        let c = &self.version;
        match self.op {
            Op::Equal => self.cmp_significant(v) == Ordering::Equal,
            Op::NotEqual => self.cmp_significant(v) != Ordering::Equal,
            Op::Greater => self.cmp_significant(v) == Ordering::Greater,
            Op::LessEqual => self.cmp_significant(v) != Ordering::Greater,
            Op::GreaterEqual => self.wildcard == Wildcard::Major || v.cmp_precedence(c) != Ordering::Less,
            Op::Less => self.wildcard != Wildcard::Major && v.cmp_precedence(c) == Ordering::Less,
            Op::Tilde => {
                if self.wildcard == Wildcard::Major {
                    return true;
                }
                v.cmp_precedence(c) != Ordering::Less
                    && v.major == c.major
                    && (self.wildcard == Wildcard::Minor || v.minor == c.minor)
            }
            Op::Caret => {
                if self.wildcard == Wildcard::Major {
                    return true;
                }
                v.cmp_precedence(c) != Ordering::Less && v.major == c.major
            }
        }
    }
}

/// A parsed constraint: OR of AND-groups of comparisons.
#[derive(Debug, Clone)]
pub struct Constraints {
    original: String,
    groups: Vec<Vec<Comparison>>,
}

impl Constraints {
    /// Parse a constraint string.
    pub fn parse(input: &str) -> Result<Self, GroveError> {
        let invalid = |reason: String| GroveError::InvalidVersionConstraint {
            constraint: input.to_string(),
            reason,
        };

        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(invalid("empty constraint".to_string()));
        }
        let rewritten = match HYPHEN_RANGE.as_ref() {
            Some(re) => re.replace_all(trimmed, ">= $1, <= $2").into_owned(),
            None => trimmed.to_string(),
        };

        let mut groups = Vec::new();
        for alternative in rewritten.split("||") {
            let mut group = Vec::new();
            for token in tokens(alternative) {
                let comparison =
                    Comparison::parse(&token).ok_or_else(|| invalid(format!("improper constraint: {token}")))?;
                group.push(comparison);
            }
            if group.is_empty() {
                return Err(invalid("empty alternative".to_string()));
            }
            groups.push(group);
        }

        Ok(Self {
            original: trimmed.to_string(),
            groups,
        })
    }

    /// Whether `version` satisfies the constraint.
    pub fn matches(&self, version: &Version) -> bool {
        self.groups.iter().any(|group| {
            // Checked per `||` alternative rather than once for the whole
            // constraint, so `^2.0.0-alpha || ^1.0` still rejects 1.5.0-beta
            if !version.pre.is_empty() && !group.iter().any(Comparison::has_prerelease) {
                return false;
            }
            group.iter().all(|c| c.matches(version))
        })
    }

    /// Whether `reference` parses as a version satisfying the constraint.
    pub fn matches_ref(&self, reference: &str) -> bool {
        parse_version(reference).is_some_and(|v| self.matches(&v))
    }

    pub fn as_str(&self) -> &str {
        &self.original
    }
}

impl fmt::Display for Constraints {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.original)
    }
}

/// Split one AND-group on commas and whitespace, keeping operators attached
/// to the version that follows them.
fn tokens(group: &str) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    let mut pending_op: Option<String> = None;
    for word in group.split([',', ' ', '\t']).filter(|w| !w.is_empty()) {
        if OPERATORS.contains(&word) {
            pending_op = Some(word.to_string());
            continue;
        }
        match pending_op.take() {
            Some(op) => out.push(format!("{op}{word}")),
            None => out.push(word.to_string()),
        }
    }
    if let Some(op) = pending_op {
        // Dangling operator, reported by the comparison parser
        out.push(op);
    }
    out
}

/// The highest ref satisfying `constraints`.
///
/// Refs that are not versions are skipped. Candidates are ordered by
/// descending version and the original spelling of the first match is
/// returned.
pub fn select_version(constraints: &Constraints, refs: &[String]) -> Option<String> {
    let mut candidates: Vec<(Version, &String)> =
        refs.iter().filter_map(|r| parse_version(r).map(|v| (v, r))).collect();
    candidates.sort_by(|a, b| b.0.cmp_precedence(&a.0));
    candidates
        .into_iter()
        .find(|(v, _)| constraints.matches(v))
        .map(|(_, r)| r.clone())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn check(constraint: &str, version: &str) -> bool {
        let c = Constraints::parse(constraint).unwrap();
        c.matches(&parse_version(version).unwrap())
    }

    #[test]
    fn test_parse_version_is_lenient() {
        assert_eq!(parse_version("v1.2.3").unwrap(), Version::new(1, 2, 3));
        assert_eq!(parse_version("1.2").unwrap(), Version::new(1, 2, 0));
        assert_eq!(parse_version("2").unwrap(), Version::new(2, 0, 0));
        assert_eq!(parse_version("1.0.0-beta.1").unwrap().pre.as_str(), "beta.1");
        assert!(parse_version("master").is_none());
        assert!(parse_version("1.2.3.4").is_none());
        assert!(parse_version("").is_none());
    }

    #[test]
    fn test_basic_operators() {
        assert!(check("1.2.3", "v1.2.3"));
        assert!(!check("=1.2.3", "1.2.4"));
        assert!(check("!=1.2.3", "1.2.4"));
        assert!(check(">1.2", "1.2.1"));
        assert!(!check(">1.2", "1.2.0"));
        assert!(check(">= 1.2", "1.2.0"));
        assert!(check("=>1.2", "1.3.0"));
        assert!(check("<2", "1.99.0"));
        assert!(!check("<2", "2.0.0"));
        assert!(check("<=2", "2.0.0"));
        assert!(check("=<2", "1.0.0"));
    }

    #[test]
    fn test_tilde_and_caret() {
        assert!(check("~1.2.3", "1.2.9"));
        assert!(!check("~1.2.3", "1.3.0"));
        assert!(!check("~1.2.3", "1.2.2"));
        assert!(check("~>1.2.3", "1.2.4"));
        assert!(check("~1.x", "1.9.0"));
        assert!(check("^1.2.3", "1.9.0"));
        assert!(!check("^1.2.3", "2.0.0"));
        assert!(!check("^1.2.3", "1.2.2"));
    }

    #[test]
    fn test_wildcards() {
        assert!(check("*", "5.6.7"));
        assert!(check("1.x", "1.9.9"));
        assert!(!check("1.x", "2.0.0"));
        assert!(check("1.2.X", "1.2.7"));
        assert!(!check("1.2.*", "1.3.0"));
        assert!(check("!=1.x", "2.0.0"));
        assert!(check(">1.x", "2.0.0"));
        assert!(!check(">1.x", "1.5.0"));
        assert!(check("<=1.2.x", "1.2.9"));
    }

    #[test]
    fn test_and_or_and_ranges() {
        assert!(check(">=1.2, <2", "1.5.0"));
        assert!(!check(">=1.2, <2", "2.0.0"));
        assert!(check(">=1.2 <2", "1.5.0"));
        assert!(check("^1.0 || ^3.0", "3.1.0"));
        assert!(!check("^1.0 || ^3.0", "2.1.0"));
        assert!(check("1.2 - 1.4.5", "1.4.5"));
        assert!(!check("1.2 - 1.4.5", "1.4.6"));
        assert!(!check("1.2 - 1.4.5", "1.1.9"));
    }

    #[test]
    fn test_prereleases_need_prerelease_constraint() {
        assert!(!check("^1.0.0", "1.1.0-beta"));
        assert!(!check("*", "1.0.0-rc1"));
        assert!(check(">=1.1.0-alpha, <2", "1.1.0-beta"));
        assert!(check("1.0.0-rc.1", "1.0.0-rc.1"));
        // The prerelease rule applies per alternative
        assert!(!check("^2.0.0-alpha || ^1.0", "1.5.0-beta"));
        assert!(check("^2.0.0-alpha || ^1.0", "2.0.0-beta"));
    }

    #[test]
    fn test_invalid_constraints() {
        for bad in ["", "master", ">= ", "1.2.3.4", "^foo", "1.0 ||", "abc123def"] {
            assert!(
                matches!(Constraints::parse(bad), Err(GroveError::InvalidVersionConstraint { .. })),
                "accepted {bad:?}"
            );
        }
    }

    #[test]
    fn test_select_version_highest_match() {
        let tags: Vec<String> = ["v1.0.0", "v1.2.0", "v2.0.0", "master"].iter().map(|s| s.to_string()).collect();
        let c = Constraints::parse("^1.0.0").unwrap();
        assert_eq!(select_version(&c, &tags).as_deref(), Some("v1.2.0"));

        let none = Constraints::parse("^3").unwrap();
        assert_eq!(select_version(&none, &tags), None);
    }

    #[test]
    fn test_select_version_keeps_original_spelling() {
        let tags: Vec<String> = ["1.3", "v1.2.9"].iter().map(|s| s.to_string()).collect();
        let c = Constraints::parse("~1.2 || ~1.3").unwrap();
        assert_eq!(select_version(&c, &tags).as_deref(), Some("1.3"));
    }

    #[test]
    fn test_display_keeps_input() {
        let c = Constraints::parse(" >=1.0, <2 ").unwrap();
        assert_eq!(c.to_string(), ">=1.0, <2");
        assert!(c.matches_ref("v1.4.0"));
        assert!(!c.matches_ref("develop"));
    }
}
