use crate::{
    error::{AggError, AggResult},
    types::Step,
};
use serde::{Deserialize, Serialize};

/// Trailing window lengths, in steps, applied to every base column.
pub const DEFAULT_WINDOW_SIZES: [Step; 5] = [7, 14, 28, 90, 180];

/// Worker threads used when nothing else is configured.
pub const DEFAULT_PARALLELISM: usize = 10;

/// Which account of a transaction the history is grouped by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKey {
    /// `nameDest` — the receiving account.
    Dest,
    /// `nameOrig` — the sending account.
    Orig,
}

impl std::str::FromStr for EntityKey {
    type Err = AggError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "dest" => Ok(Self::Dest),
            "orig" => Ok(Self::Orig),
            other => Err(AggError::InvalidConfig(format!(
                "unknown entity key '{other}' (expected dest|orig)"
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AggConfig {
    pub window_sizes:       Vec<Step>,
    pub parallelism:        usize,
    pub entity_key:         EntityKey,
    /// When false, single-event entities are dropped at load time
    /// instead of receiving the synthetic degenerate row.
    pub include_degenerate: bool,
}

impl Default for AggConfig {
    fn default() -> Self {
        Self {
            window_sizes:       DEFAULT_WINDOW_SIZES.to_vec(),
            parallelism:        DEFAULT_PARALLELISM,
            entity_key:         EntityKey::Dest,
            include_degenerate: true,
        }
    }
}

impl AggConfig {
    /// Load from a JSON file. Missing fields take their defaults.
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Cannot read {path}: {e}"))?;
        let config: AggConfig = serde_json::from_str(&content)
            .map_err(|e| anyhow::anyhow!("Cannot parse {path}: {e}"))?;
        config.validate()?;
        Ok(config)
    }

    /// Small pool, default windows. Used by tests.
    pub fn default_test() -> Self {
        Self {
            parallelism: 2,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> AggResult<()> {
        if self.window_sizes.is_empty() {
            return Err(AggError::InvalidConfig("window_sizes is empty".into()));
        }
        if let Some(w) = self.window_sizes.iter().find(|w| **w <= 0) {
            return Err(AggError::InvalidConfig(format!(
                "window size must be positive, got {w}"
            )));
        }
        if self.window_sizes.windows(2).any(|pair| pair[0] >= pair[1]) {
            return Err(AggError::InvalidConfig(
                "window_sizes must be strictly increasing".into(),
            ));
        }
        if self.parallelism == 0 {
            return Err(AggError::InvalidConfig("parallelism must be at least 1".into()));
        }
        Ok(())
    }
}
