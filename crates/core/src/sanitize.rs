//! Defense-in-depth screening of arguments bound for subprocesses.
//!
//! Commands are spawned with argument vectors, never through a shell, so
//! metacharacters cannot be interpreted. Arguments that carry them are
//! still rejected outright: no legitimate hostname or search pattern in
//! this protocol needs `$(`, backticks or redirections.

use crate::GrassError;

/// The classic shell metacharacter set.
pub const SHELL_METACHARACTERS: &[char] = &[
    '\\', '"', '`', '$', '(', ')', '{', '}', '[', ']', ';', '&', '|', '~', '?', '!', '<', '>',
];

pub fn contains_shell_metacharacter(s: &str) -> bool {
    s.chars().any(|c| SHELL_METACHARACTERS.contains(&c))
}

/// Reject arguments containing shell metacharacters or control bytes.
pub fn ensure_plain_argument(s: &str) -> Result<(), GrassError> {
    if contains_shell_metacharacter(s) || s.chars().any(|c| c.is_control()) {
        return Err(GrassError::Protocol("argument contains forbidden characters"));
    }
    Ok(())
}

/// Reject only control bytes. For arguments where `[ ] ? !` are legitimate
/// content, such as search patterns.
pub fn ensure_printable(s: &str) -> Result<(), GrassError> {
    if s.chars().any(|c| c.is_control()) {
        return Err(GrassError::Protocol("argument contains control characters"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_arguments_pass() {
        assert!(ensure_plain_argument("example.com").is_ok());
        assert!(ensure_plain_argument("needle-1.2").is_ok());
    }

    #[test]
    fn metacharacters_are_rejected() {
        for bad in ["a;b", "$(id)", "`id`", "a|b", "a>b", "host!"] {
            assert!(ensure_plain_argument(bad).is_err(), "{bad}");
        }
    }

    #[test]
    fn control_bytes_are_rejected() {
        assert!(ensure_plain_argument("a\nb").is_err());
    }

    #[test]
    fn printable_check_permits_regex_metacharacters() {
        for pattern in ["foo[0-9]", "a?b", "end!", "hello world"] {
            assert!(ensure_printable(pattern).is_ok(), "{pattern}");
        }
    }

    #[test]
    fn printable_check_rejects_control_bytes() {
        assert!(ensure_printable("a\nb").is_err());
        assert!(ensure_printable("a\x07b").is_err());
    }
}
