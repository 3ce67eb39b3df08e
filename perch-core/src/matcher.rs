//! Route path patterns.
//!
//! Grammar, compared segment by segment on `/`:
//!
//! - literal segments must be equal (`/status` only matches `/status`);
//! - `:name` or `{name}` matches exactly one non-empty segment;
//! - `*` ends the pattern and matches the rest of the path, including
//!   nothing at all (`/files/*` matches `/files`, `/files/` and `/files/a/b`);
//! - a segment ending in `*` (`/logs/app*`) matches any segment with that
//!   prefix plus the rest of the path.
//!
//! Trailing slashes are significant for literal patterns.

/// Returns `true` when `path` is accepted by `pattern`.
pub fn match_path(pattern: &str, path: &str) -> bool {
    let mut pattern_segments = pattern.split('/');
    let mut path_segments = path.split('/');

    loop {
        match (pattern_segments.next(), path_segments.next()) {
            (Some("*"), _) => return true,
            (Some(p), Some(s)) if p.ends_with('*') => {
                return s.starts_with(&p[..p.len() - 1]);
            }
            (Some(p), Some(s)) if is_param(p) => {
                if s.is_empty() {
                    return false;
                }
            }
            (Some(p), Some(s)) => {
                if p != s {
                    return false;
                }
            }
            (None, None) => return true,
            _ => return false,
        }
    }
}

fn is_param(segment: &str) -> bool {
    (segment.len() > 1 && segment.starts_with(':'))
        || (segment.len() > 2 && segment.starts_with('{') && segment.ends_with('}'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_match() {
        assert!(match_path("/status", "/status"));
        assert!(match_path("/", "/"));
        assert!(!match_path("/status", "/status/"));
        assert!(!match_path("/status/", "/status"));
        assert!(!match_path("/status", "/stat"));
        assert!(!match_path("/status", "/status/extra"));
    }

    #[test]
    fn trailing_wildcard_matches_prefix() {
        assert!(match_path("/files/*", "/files"));
        assert!(match_path("/files/*", "/files/"));
        assert!(match_path("/files/*", "/files/a"));
        assert!(match_path("/files/*", "/files/a/b/c"));
        assert!(!match_path("/files/*", "/filesystem"));
        assert!(!match_path("/files/*", "/other/a"));
    }

    #[test]
    fn bare_wildcard_matches_everything() {
        assert!(match_path("*", "/"));
        assert!(match_path("*", "/anything/at/all"));
        assert!(match_path("/*", "/x"));
    }

    #[test]
    fn segment_prefix_wildcard() {
        assert!(match_path("/logs/app*", "/logs/app"));
        assert!(match_path("/logs/app*", "/logs/app-1/tail"));
        assert!(!match_path("/logs/app*", "/logs/web"));
    }

    #[test]
    fn named_params_match_one_segment() {
        assert!(match_path("/servers/:id", "/servers/42"));
        assert!(match_path("/servers/{id}/power", "/servers/abc/power"));
        assert!(!match_path("/servers/:id", "/servers/"));
        assert!(!match_path("/servers/:id", "/servers/42/power"));
        assert!(match_path("/servers/:id/*", "/servers/42/files/a.txt"));
    }

    #[test]
    fn lone_colon_and_braces_are_literals() {
        assert!(match_path("/a/:", "/a/:"));
        assert!(!match_path("/a/:", "/a/b"));
        assert!(match_path("/a/{}", "/a/{}"));
    }
}
