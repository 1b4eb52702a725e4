use std::cmp::Ordering;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Format of the build token appended to pseudo-versions.
pub const BUILD_FORMAT: &str = "%Y%m%d%H%M%S";

/// Strip surrounding whitespace and any leading run of `v`/`V` characters,
/// including whitespace mixed into that run.
#[must_use]
pub fn clean(raw: &str) -> String {
    raw.trim_start_matches(|c: char| c.is_whitespace() || matches!(c, 'v' | 'V'))
        .trim_end()
        .to_string()
}

/// Multi-part version comparison.
///
/// Numeric parts compare as integers, textual parts compare case-insensitively
/// and sort below numeric parts, and the shorter side is padded with zeros.
#[must_use]
pub fn compare(a: &str, b: &str) -> Ordering {
    let left = components(a);
    let right = components(b);
    let len = left.len().max(right.len());
    let zero = Component::ZERO;

    for idx in 0..len {
        let l = left.get(idx).unwrap_or(&zero);
        let r = right.get(idx).unwrap_or(&zero);
        match l.cmp(r) {
            Ordering::Equal => {}
            other => return other,
        }
    }
    Ordering::Equal
}

/// Whether `remote` (cleaned) is strictly newer than `current`.
#[must_use]
pub fn is_newer(current: &str, remote: &str) -> bool {
    compare(current, &clean(remote)) == Ordering::Less
}

/// Build token for a commit timestamp, e.g. `20240305101530`.
#[must_use]
pub fn build_token(at: DateTime<Utc>) -> String {
    at.format(BUILD_FORMAT).to_string()
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Component {
    Text(String),
    /// Digit run with leading zeros removed; empty means zero.
    Number(String),
}

impl Component {
    const ZERO: Self = Self::Number(String::new());
}

impl Ord for Component {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::Number(a), Self::Number(b)) => a.len().cmp(&b.len()).then_with(|| a.cmp(b)),
            (Self::Text(a), Self::Text(b)) => a.cmp(b),
            (Self::Text(_), Self::Number(_)) => Ordering::Less,
            (Self::Number(_), Self::Text(_)) => Ordering::Greater,
        }
    }
}

impl PartialOrd for Component {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

fn components(version: &str) -> Vec<Component> {
    let mut parts = Vec::new();
    for segment in version
        .trim()
        .split(['.', '-', '_', '+'])
        .filter(|s| !s.is_empty())
    {
        let mut rest = segment;
        while let Some(first) = rest.chars().next() {
            let numeric = first.is_ascii_digit();
            let end = rest
                .find(|c: char| c.is_ascii_digit() != numeric)
                .unwrap_or(rest.len());
            let (head, tail) = rest.split_at(end);
            parts.push(component(head, numeric));
            rest = tail;
        }
    }
    parts
}

fn component(raw: &str, numeric: bool) -> Component {
    if numeric {
        Component::Number(raw.trim_start_matches('0').to_string())
    } else {
        Component::Text(raw.to_ascii_lowercase())
    }
}

/// A cleaned version string, optionally carrying a `.<build>` suffix.
///
/// Ordering follows [`compare`], so `1.0.0 < 1.0.0.20240101120000 < 1.0.1`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VersionIdentity(String);

impl VersionIdentity {
    #[must_use]
    pub fn new(raw: &str) -> Self {
        Self(clean(raw))
    }

    #[must_use]
    pub fn with_build(base: &str, build: &str) -> Self {
        let base = clean(base);
        if build.is_empty() {
            Self(base)
        } else {
            Self(format!("{base}.{build}"))
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn is_older_than(&self, remote: &str) -> bool {
        is_newer(&self.0, remote)
    }
}

impl fmt::Display for VersionIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl PartialEq for VersionIdentity {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for VersionIdentity {}

impl Ord for VersionIdentity {
    fn cmp(&self, other: &Self) -> Ordering {
        compare(&self.0, &other.0)
    }
}

impl PartialOrd for VersionIdentity {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl From<&str> for VersionIdentity {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

#[cfg(test)]
mod tests {
    use std::cmp::Ordering;

    use chrono::{TimeZone, Utc};

    use super::{VersionIdentity, build_token, clean, compare, is_newer};

    #[test]
    fn clean_strips_prefix_and_whitespace() {
        assert_eq!(clean("v1.2.3"), "1.2.3");
        assert_eq!(clean("V1.2.3"), "1.2.3");
        assert_eq!(clean("  v2.0 \n"), "2.0");
        assert_eq!(clean("1.2.3"), "1.2.3");
        assert_eq!(clean(""), "");
        assert_eq!(clean("vv1.0"), "1.0");
        assert_eq!(clean("v 1.0"), "1.0");
        assert_eq!(VersionIdentity::new("v 1.2").as_str(), "1.2");
    }

    #[test]
    fn clean_is_idempotent() {
        for raw in [
            "v1.2.3",
            " V0.9 ",
            "",
            "vvv",
            "1.0.0.20240101120000",
            "release-7",
            "v 1.0",
            "V\t2.0",
            "v v1",
        ] {
            let once = clean(raw);
            assert_eq!(clean(&once), once, "clean should be idempotent for {raw:?}");
        }
    }

    #[test]
    fn build_suffix_sorts_between_base_and_next_patch() {
        assert_eq!(compare("1.0.0", "1.0.0.20240101120000"), Ordering::Less);
        assert_eq!(
            compare("1.0.0.20240101120000", "1.0.0.20240101120001"),
            Ordering::Less
        );
        assert_eq!(compare("1.0.0.20240101120000", "1.0.1"), Ordering::Less);
    }

    #[test]
    fn compare_is_numeric_not_lexical() {
        assert_eq!(compare("1.10.0", "1.9.0"), Ordering::Greater);
        assert_eq!(compare("2", "10"), Ordering::Less);
        assert_eq!(compare("1.2", "1.2.0"), Ordering::Equal);
        assert_eq!(compare("1.0.0-beta", "1.0.0"), Ordering::Less);
        assert_eq!(compare("1.0.0rc1", "1.0.0rc2"), Ordering::Less);
    }

    #[test]
    fn digit_runs_beyond_u64_still_compare_as_numbers() {
        assert_eq!(compare("1.18446744073709551616", "1.1"), Ordering::Greater);
        assert_eq!(
            compare("1.18446744073709551616", "1.18446744073709551617"),
            Ordering::Less
        );
        assert_eq!(compare("1.007", "1.7"), Ordering::Equal);
        assert_eq!(compare("1.99999999999999999999", "1.a"), Ordering::Greater);
    }

    #[test]
    fn compare_is_a_strict_weak_ordering() {
        let samples = [
            "", "0", "1", "1.0", "1.0.0", "1.0.0.1", "1.0.0.20240101120000", "1.0.1", "1.2",
            "1.10", "9", "10", "1a", "1.0.0-alpha", "1.0.0-beta", "1.0.0rc1", "2.0.0", "abc",
        ];

        for a in samples {
            assert_eq!(compare(a, a), Ordering::Equal);
            for b in samples {
                assert_eq!(compare(a, b), compare(b, a).reverse(), "{a} vs {b}");
                for c in samples {
                    if compare(a, b) != Ordering::Greater && compare(b, c) != Ordering::Greater {
                        assert_ne!(compare(a, c), Ordering::Greater, "{a} <= {b} <= {c}");
                    }
                }
            }
        }
    }

    #[test]
    fn is_newer_requires_strictly_greater_remote() {
        assert!(is_newer("1.0.0", "v1.0.1"));
        assert!(!is_newer("1.0.1", "v1.0.0"));
        assert!(!is_newer("1.0.0", "v1.0.0"));
        assert!(is_newer("1.0.0", "1.0.0.20240305101530"));
    }

    #[test]
    fn build_token_uses_utc_seconds() {
        let at = Utc
            .with_ymd_and_hms(2024, 3, 5, 10, 15, 30)
            .single()
            .expect("valid timestamp");
        assert_eq!(build_token(at), "20240305101530");
    }

    #[test]
    fn identity_orders_and_displays_cleaned_value() {
        let base = VersionIdentity::new("v1.0.0");
        let built = VersionIdentity::with_build("1.0.0", "20240101120000");

        assert_eq!(base.to_string(), "1.0.0");
        assert_eq!(built.as_str(), "1.0.0.20240101120000");
        assert!(base < built);
        assert_eq!(VersionIdentity::with_build("1.0.0", ""), base);
        assert!(base.is_older_than("v1.0.1"));
    }
}
