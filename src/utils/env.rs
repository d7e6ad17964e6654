//! Environment variable management
//!
//! Handles loading of `.env` files and typed parsing of `POSTURE_*` variables.

use anyhow::{anyhow, Result};
use std::env;
use std::str::FromStr;

/// Load environment variables from .env file
///
/// Uses dotenv crate to load variables from .env file in the working directory.
/// Does not fail if .env file doesn't exist (optional configuration).
pub fn load_env() -> Result<()> {
    dotenv::dotenv().ok();
    Ok(())
}

/// Get a variable, treating unset and blank the same
pub fn get_var(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Parse a variable into `T`
///
/// # Errors
/// Returns error if the variable is set but does not parse. A malformed value
/// is never silently replaced by a default.
pub fn parse_var<T>(name: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match get_var(name) {
        None => Ok(None),
        Some(raw) => raw
            .parse::<T>()
            .map(Some)
            .map_err(|e| anyhow!("{} has invalid value '{}': {}", name, raw, e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_get_var_ignores_blank() {
        env::set_var("POSTURE_TEST_BLANK", "   ");
        assert_eq!(get_var("POSTURE_TEST_BLANK"), None);
        env::remove_var("POSTURE_TEST_BLANK");
    }

    #[test]
    #[serial]
    fn test_parse_var_valid() {
        env::set_var("POSTURE_TEST_NUM", " 12 ");
        assert_eq!(parse_var::<u32>("POSTURE_TEST_NUM").unwrap(), Some(12));
        env::remove_var("POSTURE_TEST_NUM");
    }

    #[test]
    #[serial]
    fn test_parse_var_unset() {
        env::remove_var("POSTURE_TEST_UNSET");
        assert_eq!(parse_var::<u32>("POSTURE_TEST_UNSET").unwrap(), None);
    }

    #[test]
    #[serial]
    fn test_parse_var_malformed() {
        env::set_var("POSTURE_TEST_BAD", "eight");
        let result = parse_var::<u32>("POSTURE_TEST_BAD");
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("POSTURE_TEST_BAD"));
        env::remove_var("POSTURE_TEST_BAD");
    }

    #[test]
    fn test_load_env_doesnt_fail_on_missing_file() {
        // Should not panic or error even if .env doesn't exist
        let result = load_env();
        assert!(result.is_ok());
    }
}
