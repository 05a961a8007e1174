use std::{env, path::PathBuf};

use anyhow::{bail, Context, Result};

pub const HISTORY_FILE: &str = ".jobsh_history";
pub const DEFAULT_PROMPT: &str = "jobsh";
pub const DEFAULT_MAX_JOBS: usize = 10;
pub const DEFAULT_COMMAND_WIDTH: usize = 29;

/// Runtime settings for a shell session.
#[derive(Debug, Clone)]
pub struct Config {
    pub history_file: PathBuf,
    pub prompt: String,
    /// Capacity of the job table.
    pub max_jobs: usize,
    /// Longest command line kept for `jobs` display, in characters.
    pub command_width: usize,
}

impl Default for Config {
    fn default() -> Self {
        let history_file = match dirs::home_dir() {
            Some(home) => home.join(HISTORY_FILE),
            None => PathBuf::from(HISTORY_FILE),
        };
        Config {
            history_file,
            prompt: DEFAULT_PROMPT.to_string(),
            max_jobs: DEFAULT_MAX_JOBS,
            command_width: DEFAULT_COMMAND_WIDTH,
        }
    }
}

impl Config {
    /// Defaults overridden by `JOBSH_HISTORY`, `JOBSH_PROMPT` and `JOBSH_MAX_JOBS`.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Config::default();
        if let Some(path) = lookup("JOBSH_HISTORY") {
            config.history_file = PathBuf::from(path);
        }
        if let Some(prompt) = lookup("JOBSH_PROMPT") {
            config.prompt = prompt;
        }
        if let Some(max) = lookup("JOBSH_MAX_JOBS") {
            config.max_jobs = max
                .trim()
                .parse()
                .with_context(|| format!("invalid JOBSH_MAX_JOBS: {:?}", max))?;
            if config.max_jobs == 0 {
                bail!("JOBSH_MAX_JOBS must be at least 1");
            }
        }
        Ok(config)
    }
}
