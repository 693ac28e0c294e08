//! Environment variable utilities
//!
//! Typed `env_get<T>` with a default; the cmd tools and `kprint` read
//! their knobs through these.
//!
//! ```ignore
//! use ukern_core::env::{env_get, env_get_bool};
//!
//! let threads: usize = env_get("UKN_STRESS_THREADS", 16);
//! let verbose = env_get_bool("UKN_VERBOSE", false);
//! ```

use std::str::FromStr;

/// Get an environment variable parsed as `T`, or the default
///
/// Unset or unparseable values both fall back to `default`.
#[inline]
pub fn env_get<T>(key: &str, default: T) -> T
where
    T: FromStr,
{
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Get an environment variable as a boolean
///
/// "1", "true", "yes", "on" (case-insensitive) are true; any other set
/// value is false; unset returns the default.
#[inline]
pub fn env_get_bool(key: &str, default: bool) -> bool {
    match std::env::var(key) {
        Ok(v) => matches!(v.to_lowercase().as_str(), "1" | "true" | "yes" | "on"),
        Err(_) => default,
    }
}

/// Get an environment variable as `Some(T)` if set and parseable
#[inline]
pub fn env_get_opt<T>(key: &str) -> Option<T>
where
    T: FromStr,
{
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_get_default() {
        assert_eq!(env_get("UKN_TEST_UNSET_VAR", 7usize), 7);
        assert_eq!(env_get_opt::<usize>("UKN_TEST_UNSET_VAR"), None);
    }

    #[test]
    fn test_env_get_set() {
        std::env::set_var("UKN_TEST_SET_VAR", "42");
        assert_eq!(env_get("UKN_TEST_SET_VAR", 0usize), 42);
        assert_eq!(env_get_opt::<usize>("UKN_TEST_SET_VAR"), Some(42));
        std::env::remove_var("UKN_TEST_SET_VAR");
    }

    #[test]
    fn test_env_get_bool() {
        std::env::set_var("UKN_TEST_BOOL_VAR", "yes");
        assert!(env_get_bool("UKN_TEST_BOOL_VAR", false));
        std::env::set_var("UKN_TEST_BOOL_VAR", "nope");
        assert!(!env_get_bool("UKN_TEST_BOOL_VAR", true));
        std::env::remove_var("UKN_TEST_BOOL_VAR");
        assert!(env_get_bool("UKN_TEST_BOOL_VAR", true));
    }
}
