use crate::error::Result;
use config::{Config, Environment, File, FileFormat};
use dotenv::dotenv;
use serde::Deserialize;
use std::sync::Once;

pub const ENV_PREFIX: &str = "TREEBIT";

static DOTENV_ONCE: Once = Once::new();

fn ensure_dotenv_loaded() {
    DOTENV_ONCE.call_once(|| {
        match dotenv() {
            Ok(_) => crate::debug!("Settings loaded including .env file."),
            Err(_) => crate::debug!("Settings loaded without .env file."),
        }
    });
}

/// What builders do when relation maps loop back on themselves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CyclePolicy {
    /// Abort with [`crate::TreeError::CycleDetected`].
    #[default]
    Error,
    /// Drop the edge closing the cycle, log a warning and keep going.
    Truncate,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TreeSettings {
    /// Depth used by the materializer when a call does not ask for one, `None` is unlimited.
    pub default_depth: Option<usize>,
    /// Hard bound on levels walked in either direction.
    pub max_depth: usize,
    pub cycle_policy: CyclePolicy,
}

impl Default for TreeSettings {
    fn default() -> Self {
        TreeSettings { default_depth: None, max_depth: 1024, cycle_policy: CyclePolicy::Error }
    }
}

impl TreeSettings {
    /// Reads settings from an optional TOML file overlaid with `TREEBIT__*` environment variables.
    pub fn load(path: Option<&str>) -> Result<Self> {
        ensure_dotenv_loaded();
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::new(path, FileFormat::Toml).required(true));
        }
        let settings = builder
            .add_source(Environment::with_prefix(ENV_PREFIX).try_parsing(true).separator("__"))
            .build()?
            .try_deserialize::<TreeSettings>()?;
        crate::debug!("{:?}", settings);
        Ok(settings)
    }
}
