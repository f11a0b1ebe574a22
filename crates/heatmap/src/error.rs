use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum LayoutError {
    #[error("failed to read zone layout {path:?}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid zone layout: {0}")]
    Parse(#[source] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("failed to decode background image: {0}")]
    Decode(String),
    #[error("failed to encode heatmap: {0}")]
    Encode(String),
    #[error("renderer surface is detached")]
    Detached,
}
