//! Config for the drivers
//!
//! This module provides the options controlling how games are driven: step ceiling,
//! parallelism, where transcripts and logs go.
//!
//! Configuration can be created programmatically using [`Configuration::new()`] or by reading
//! environment variables using [`Configuration::from_env()`].
//!
//! # Environment Variables
//!
//! All values are optional. Flags are case-insensitive, set them to `"true"` to enable them.
//!
//! - `ARENA_VERBOSE`: Print per-run progress (default: `true`)
//! - `ARENA_LOG`: Enable logging to a file (default: `false`)
//! - `ARENA_MAX_STEPS`: Step ceiling of every session (default: `1000`)
//! - `ARENA_PARALLELISM`: Number of sessions run at once (default: number of logical CPUs)
//! - `ARENA_OUTPUT_DIR`: Directory receiving transcripts and logs (default: none)

use std::path::{Path, PathBuf};

/// Step ceiling used when nothing else is configured.
pub const DEFAULT_MAX_STEPS: usize = 1000;

/// Configuration for driver behaviors.
#[derive(Debug, Clone)]
pub struct Configuration {
    pub(crate) verbose: bool,
    pub(crate) log: bool,
    pub(crate) max_steps: usize,
    pub(crate) parallelism: usize,
    pub(crate) output_dir: Option<PathBuf>,
}

impl Configuration {
    /// Create a new configuration with default parameters.
    ///
    /// By default:
    /// - Run progress is printed to stdout.
    /// - Logging to file is disabled.
    /// - Sessions stop after 1000 steps.
    /// - One session runs per logical CPU.
    /// - Nothing is written to disk.
    pub fn new() -> Self {
        Self {
            verbose: true,
            log: false,
            max_steps: DEFAULT_MAX_STEPS,
            parallelism: num_cpus::get(),
            output_dir: None,
        }
    }

    /// Create configuration from environment variables.
    ///
    /// Unset or unparsable variables keep their default value.
    pub fn from_env() -> Self {
        fn get_env_flag(var: &str, default: bool) -> bool {
            match std::env::var(var) {
                Ok(val) => val.eq_ignore_ascii_case("true"),
                Err(_) => default,
            }
        }

        fn get_env_usize(var: &str) -> Option<usize> {
            std::env::var(var).ok()?.parse().ok()
        }

        let default = Self::new();
        Self {
            verbose: get_env_flag("ARENA_VERBOSE", default.verbose),
            log: get_env_flag("ARENA_LOG", default.log),
            max_steps: get_env_usize("ARENA_MAX_STEPS").unwrap_or(default.max_steps),
            parallelism: get_env_usize("ARENA_PARALLELISM")
                .filter(|&n| n > 0)
                .unwrap_or(default.parallelism),
            output_dir: std::env::var_os("ARENA_OUTPUT_DIR").map(PathBuf::from),
        }
    }

    /// Enable or disable progress output.
    pub fn with_verbose(mut self, value: bool) -> Self {
        self.verbose = value;
        self
    }

    /// Enable or disable logging to file.
    pub fn with_log(mut self, value: bool) -> Self {
        self.log = value;
        self
    }

    /// Step ceiling handed to [`GameManager::run`](crate::game_manager::GameManager::run).
    pub fn with_max_steps(mut self, value: usize) -> Self {
        self.max_steps = value;
        self
    }

    /// Number of sessions a [`BatchRunner`](crate::batch::BatchRunner) runs at once.
    /// Zero is treated as one.
    pub fn with_parallelism(mut self, value: usize) -> Self {
        self.parallelism = value.max(1);
        self
    }

    /// Directory receiving transcripts and log files.
    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = Some(dir.into());
        self
    }

    /// Whether per-run progress is printed.
    pub fn verbose(&self) -> bool {
        self.verbose
    }

    /// Whether logs go to a file in the output directory.
    pub fn log(&self) -> bool {
        self.log
    }

    /// Step ceiling of every session.
    pub fn max_steps(&self) -> usize {
        self.max_steps
    }

    /// Number of sessions run at once.
    pub fn parallelism(&self) -> usize {
        self.parallelism
    }

    /// Directory receiving transcripts and logs, if any.
    pub fn output_dir(&self) -> Option<&Path> {
        self.output_dir.as_deref()
    }
}

impl Default for Configuration {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builders() {
        let config = Configuration::new()
            .with_verbose(false)
            .with_max_steps(12)
            .with_parallelism(0)
            .with_output_dir("out");
        assert!(!config.verbose());
        assert!(!config.log());
        assert_eq!(config.max_steps(), 12);
        assert_eq!(config.parallelism(), 1);
        assert_eq!(config.output_dir(), Some(Path::new("out")));
    }

    #[test]
    fn defaults() {
        let config = Configuration::default();
        assert_eq!(config.max_steps(), DEFAULT_MAX_STEPS);
        assert!(config.parallelism() >= 1);
        assert!(config.output_dir().is_none());
    }
}
