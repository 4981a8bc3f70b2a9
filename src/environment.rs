use std::env;
use std::str::FromStr;

/// Retrieves an environment variable and splits it into a vector of strings based on a delimiter.
///
/// Empty segments are dropped, so an unset variable yields an empty vector.
pub fn get_env_var_as_vec(var: &str, delimiter: char) -> Vec<String> {
    env::var(var)
        .unwrap_or_default()
        .split(delimiter)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Reads an environment variable, treating blank values as unset.
pub fn get_env_var(var: &str) -> Option<String> {
    env::var(var)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Reads and parses an environment variable. Unset or blank yields `Ok(None)`.
pub fn get_env_var_parsed<T: FromStr>(var: &str) -> Result<Option<T>, String> {
    match get_env_var(var) {
        Some(raw) => raw
            .parse::<T>()
            .map(Some)
            .map_err(|_| format!("{} has an invalid value: {}", var, raw)),
        None => Ok(None),
    }
}

/// Reads a boolean flag, accepting `1/0`, `true/false`, `yes/no` and `on/off`.
pub fn get_env_var_bool(var: &str) -> Result<Option<bool>, String> {
    match get_env_var(var) {
        Some(raw) => match raw.to_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(Some(true)),
            "0" | "false" | "no" | "off" => Ok(Some(false)),
            _ => Err(format!("{} has an invalid value: {}", var, raw)),
        },
        None => Ok(None),
    }
}
