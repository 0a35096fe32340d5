use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config file not found: {0}")]
    ConfigNotFound(PathBuf),

    #[error("config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("config validation error: {0}")]
    ConfigValidation(String),

    #[error("path {} escapes approved root {}", path.display(), root.display())]
    PathViolation { path: PathBuf, root: PathBuf },

    #[error("no python files found under {}", .0.display())]
    NoFilesFound(PathBuf),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("lint error: {0}")]
    Lint(String),

    #[error("model error: {0}")]
    Model(String),

    #[error("judge error: {0}")]
    Judge(String),

    #[error("process error: {0}")]
    Process(String),

    #[error("prompt error: {0}")]
    Prompt(String),

    #[error("segmentation failed: {0}")]
    Segmentation(String),

    #[error("experiment log error: {0}")]
    Log(String),
}

pub type Result<T> = std::result::Result<T, Error>;
