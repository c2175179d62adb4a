use std::path::Path;

use serde::{Deserialize, Serialize};

pub const DEFAULT_SAMPLE_LEN: usize = 32;
pub const DEFAULT_TOKEN_DELAY_MS: u64 = 25;

const fn default_sample_len() -> usize {
    DEFAULT_SAMPLE_LEN
}

const fn default_token_delay_ms() -> u64 {
    DEFAULT_TOKEN_DELAY_MS
}

/// Parameters of a simulated generation run.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct GenParams {
    /// Cap on the number of generated tokens.
    #[serde(default = "default_sample_len")]
    pub sample_len: usize,
    /// Delay between steps, imitating forward-pass latency.
    #[serde(default = "default_token_delay_ms")]
    pub token_delay_ms: u64,
}

impl Default for GenParams {
    fn default() -> Self {
        GenParams {
            sample_len: DEFAULT_SAMPLE_LEN,
            token_delay_ms: DEFAULT_TOKEN_DELAY_MS,
        }
    }
}

pub fn load_params(path: impl AsRef<Path>) -> anyhow::Result<GenParams> {
    let contents = std::fs::read_to_string(path)?;
    Ok(toml::from_str(&contents)?)
}
