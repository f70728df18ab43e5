//! Typed configuration for a run.
//!
//! Recognized controls: `enabled` (run the driver, or make every callback a
//! no-op), `total_methods` (pre-sizes the diagnostic emitter's per-method
//! columns), `skip_prefixes` (declaring-type name prefixes the JIT should
//! skip), and `graph_output_path` (where the diagnostic emitter writes).
//! There are no environment variables beyond the standard `RUST_LOG` used
//! by `tracing-subscriber` for log-level control.

use std::path::{Path, PathBuf};

use crate::error::{HijackError, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct Config {
    pub enabled: bool,
    pub total_methods: usize,
    pub skip_prefixes: Vec<String>,
    pub graph_output_path: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            enabled: true,
            total_methods: 0,
            skip_prefixes: vec!["System".to_string(), "Mono".to_string(), "Heisen".to_string()],
            graph_output_path: PathBuf::from("heisen-interleaving.dot"),
        }
    }
}

impl Config {
    /// Layers defaults, then an optional TOML file at `path` if it exists.
    ///
    /// A missing file is not an error — defaults apply. A present but
    /// malformed file is reported as [`HijackError::Config`], never a panic.
    pub fn load(path: impl AsRef<Path>) -> Result<Config> {
        let defaults = Config::default();
        let builder = config::Config::builder()
            .set_default("enabled", defaults.enabled)?
            .set_default("total_methods", defaults.total_methods as i64)?
            .set_default("skip_prefixes", defaults.skip_prefixes.clone())?
            .set_default(
                "graph_output_path",
                defaults.graph_output_path.to_string_lossy().into_owned(),
            )?
            .add_source(config::File::from(path.as_ref()).required(false));

        let built = builder.build()?;

        Ok(Config {
            enabled: built.get_bool("enabled")?,
            total_methods: built.get_int("total_methods")? as usize,
            skip_prefixes: built.get_array("skip_prefixes")?.into_iter().filter_map(|v| v.into_string().ok()).collect(),
            graph_output_path: PathBuf::from(built.get_string("graph_output_path")?),
        })
    }

    pub fn should_skip(&self, declaring_type: &str) -> bool {
        self.skip_prefixes.iter().any(|prefix| declaring_type.starts_with(prefix.as_str()))
    }
}
