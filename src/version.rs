//! Dotted version string comparison
//!
//! Release tags are not guaranteed to be valid SemVer, so this comparator
//! coerces rather than rejects: a leading `v` is stripped, components are
//! compared numerically left to right, missing components count as 0 and
//! non-numeric components coerce to 0. Pre-release suffixes are not ordered.

/// Returns true if `remote` is strictly newer than `current`.
///
/// Equal sequences (including `"1.2"` vs `"1.2.0"`) are not newer.
/// Never panics on malformed input.
pub fn is_newer(current: &str, remote: &str) -> bool {
    let cur = parse_components(current);
    let rem = parse_components(remote);

    let len = cur.len().max(rem.len());
    for i in 0..len {
        let c = cur.get(i).copied().unwrap_or(0);
        let r = rem.get(i).copied().unwrap_or(0);
        if r != c {
            return r > c;
        }
    }
    false
}

fn parse_components(version: &str) -> Vec<u64> {
    version
        .trim()
        .trim_start_matches('v')
        .split('.')
        .map(|part| part.parse::<u64>().unwrap_or(0))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_newer_versions() {
        assert!(is_newer("1.0.0", "1.0.1"));
        assert!(is_newer("1.0.0", "1.1.0"));
        assert!(is_newer("1.9.9", "2.0.0"));
        assert!(is_newer("0.2.0", "0.10.0"));
        assert!(is_newer("1.0", "1.0.1"));
    }

    #[test]
    fn test_not_newer() {
        assert!(!is_newer("1.0.0", "1.0.0"));
        assert!(!is_newer("1.1.0", "1.0.9"));
        assert!(!is_newer("2.0.0", "1.9.9"));
    }

    #[test]
    fn test_missing_components_are_zero() {
        assert!(!is_newer("1.2", "1.2.0"));
        assert!(!is_newer("1.2.0", "1.2"));
        assert!(is_newer("1.2", "1.2.1"));
    }

    #[test]
    fn test_v_prefix_stripped() {
        assert!(is_newer("v1.0.0", "v1.1.0"));
        assert!(is_newer("1.0.0", "v1.0.1"));
        assert!(!is_newer("v1.0.0", "1.0.0"));
    }

    #[test]
    fn test_malformed_coerces_to_zero() {
        assert!(!is_newer("1.0.0", "abc"));
        assert!(is_newer("abc", "0.0.1"));
        assert!(!is_newer("1.0.0-beta", "1.0.0"));
        assert!(!is_newer("", ""));
    }
}
