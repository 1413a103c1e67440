use std::env;

use tracing::warn;

pub const DEFAULT_UNIFIED_LOG_MAX_ENTRIES: usize = 5000;
pub const DEFAULT_HISTORY_MAX_ENTRIES: usize = 5000;
pub const DEFAULT_HISTORY_MAX_BYTES: usize = 8 * 1024 * 1024;

pub const UNIFIED_LOG_MAX_ENTRIES_ENV: &str = "VK_UNIFIED_LOG_MAX_ENTRIES";
pub const HISTORY_MAX_ENTRIES_ENV: &str = "VK_LOG_HISTORY_MAX_ENTRIES";
pub const HISTORY_MAX_BYTES_ENV: &str = "VK_LOG_HISTORY_MAX_BYTES";

/// Memory bounds for the client-side log pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogPipelineConfig {
    /// Cap on the merged cross-process log.
    pub unified_max_entries: usize,
    /// Per-process cap on buffered raw lines.
    pub raw_max_entries: usize,
    /// Per-process byte budget for buffered raw lines.
    pub raw_max_bytes: usize,
}

impl Default for LogPipelineConfig {
    fn default() -> Self {
        Self {
            unified_max_entries: DEFAULT_UNIFIED_LOG_MAX_ENTRIES,
            raw_max_entries: DEFAULT_HISTORY_MAX_ENTRIES,
            raw_max_bytes: DEFAULT_HISTORY_MAX_BYTES,
        }
    }
}

impl LogPipelineConfig {
    pub fn from_env() -> Self {
        Self::from_env_with(|name| env::var(name).ok())
    }

    pub fn from_env_with<F>(get_env: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        Self {
            unified_max_entries: normalize_limit(
                read_env_usize(
                    UNIFIED_LOG_MAX_ENTRIES_ENV,
                    defaults.unified_max_entries,
                    &get_env,
                ),
                UNIFIED_LOG_MAX_ENTRIES_ENV,
            ),
            raw_max_entries: normalize_limit(
                read_env_usize(HISTORY_MAX_ENTRIES_ENV, defaults.raw_max_entries, &get_env),
                HISTORY_MAX_ENTRIES_ENV,
            ),
            raw_max_bytes: normalize_limit(
                read_env_usize(HISTORY_MAX_BYTES_ENV, defaults.raw_max_bytes, &get_env),
                HISTORY_MAX_BYTES_ENV,
            ),
        }
    }
}

fn read_env_usize<F>(name: &str, default: usize, get_env: &F) -> usize
where
    F: Fn(&str) -> Option<String>,
{
    match get_env(name) {
        Some(value) => match value.parse::<usize>() {
            Ok(parsed) => parsed,
            Err(err) => {
                warn!("Invalid {name}='{value}': {err}. Using default {default}.");
                default
            }
        },
        None => default,
    }
}

fn normalize_limit(value: usize, name: &str) -> usize {
    if value == 0 {
        warn!("{name} set to 0. Using minimum value 1 instead.");
        1
    } else {
        value
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use test_support::TestEnvGuard;

    use super::*;

    #[test]
    fn defaults_are_used_without_env() {
        let cfg = LogPipelineConfig::from_env_with(|_| None);

        assert_eq!(cfg.unified_max_entries, DEFAULT_UNIFIED_LOG_MAX_ENTRIES);
        assert_eq!(cfg.raw_max_entries, DEFAULT_HISTORY_MAX_ENTRIES);
        assert_eq!(cfg.raw_max_bytes, DEFAULT_HISTORY_MAX_BYTES);
    }

    #[test]
    fn overrides_apply_and_normalize() {
        let mut envs = HashMap::new();
        envs.insert(UNIFIED_LOG_MAX_ENTRIES_ENV, "250".to_string());
        envs.insert(HISTORY_MAX_ENTRIES_ENV, "0".to_string());
        envs.insert(HISTORY_MAX_BYTES_ENV, "lots".to_string());

        let cfg = LogPipelineConfig::from_env_with(|key| envs.get(key).cloned());

        assert_eq!(cfg.unified_max_entries, 250);
        assert_eq!(cfg.raw_max_entries, 1);
        assert_eq!(cfg.raw_max_bytes, DEFAULT_HISTORY_MAX_BYTES);
    }

    #[test]
    fn from_env_reads_process_environment() {
        let _guard = TestEnvGuard::new(&[(UNIFIED_LOG_MAX_ENTRIES_ENV, "42")]);

        let cfg = LogPipelineConfig::from_env();
        assert_eq!(cfg.unified_max_entries, 42);
    }
}
