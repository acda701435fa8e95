use std::path::Path;

use serde::Deserialize;

/// File looked up in the working directory when `--config` is not given.
pub const CONFIG_FILE: &str = "mdx.toml";

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Block assembled when none is named on the command line.
    pub default_block: String,

    /// First line of every emitted script. Empty disables it.
    pub shebang: String,

    /// Hide `(name)` blocks from listings unless the fence says otherwise.
    pub hide_literal_blocks: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            default_block: "main".to_string(),
            shebang: "#!/usr/bin/env bash".to_string(),
            hide_literal_blocks: true,
        }
    }
}

impl Config {
    pub fn from_toml(text: &str) -> Result<Self, String> {
        toml::from_str(text).map_err(|e| format!("TOML parse error: {}", e))
    }

    /// Load an explicit config file, or `mdx.toml` from `dir` if present,
    /// or fall back to defaults.
    pub fn load(explicit: Option<&Path>, dir: &Path) -> Result<Self, String> {
        let path = match explicit {
            Some(path) => path.to_path_buf(),
            None => {
                let candidate = dir.join(CONFIG_FILE);
                if !candidate.is_file() {
                    return Ok(Config::default());
                }
                candidate
            }
        };

        let text = std::fs::read_to_string(&path)
            .map_err(|e| format!("cannot read '{}': {}", path.display(), e))?;
        Self::from_toml(&text).map_err(|e| format!("{}: {}", path.display(), e))
    }
}
