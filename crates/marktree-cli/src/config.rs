use std::fs;
use std::path::{Path, PathBuf};

use marktree_core::TokenizeOptions;
use marktree_renderer::Theme;
use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to read stdin: {0}")]
    Stdin(std::io::Error),

    #[error("invalid config {path}: {source}")]
    Config {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error(transparent)]
    Tokens(#[from] marktree_core::TokenError),

    #[error("failed to serialize render tree: {0}")]
    Json(#[from] serde_json::Error),

    #[error("failed to write output: {0}")]
    Write(std::io::Error),
}

/// Settings read from `--config`. Every key is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub breaks: bool,
    pub lang_prefix: Option<String>,
    pub safe_mode: bool,
    pub sanitized: bool,
    pub highlight: bool,
    pub theme: Option<Theme>,
    pub tokenize: TokenizeOptions,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self, CliError> {
        let text = fs::read_to_string(path).map_err(|source| CliError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&text).map_err(|source| CliError::Config {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn parse(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }
}
