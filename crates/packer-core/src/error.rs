use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PackerError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("IO error on {}: {source}", path.display())]
    FileIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Unresolved specifier. `line` and `column` are 1-based; `start..end` is the byte span
    /// of the literal inside the importing file.
    #[error("Cannot find module \"{specifier}\"\n{}:{line}:{column}", file.display())]
    Resolution {
        specifier: String,
        file: PathBuf,
        line: u32,
        column: u32,
        start: usize,
        end: usize,
    },

    #[error("Invalid package manifest {}: {message}", path.display())]
    Manifest { path: PathBuf, message: String },

    #[error("Invalid source map for {}: {message}", file.display())]
    SourceMap { file: PathBuf, message: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid glob pattern: {0}")]
    Glob(#[from] globset::Error),

    #[error("Watcher error: {0}")]
    Watch(String),

    #[error("Entry file doesn't exist: {}", .0.display())]
    EntryNotFound(PathBuf),

    #[error("Plugin {name} failed: {message}")]
    Plugin { name: String, message: String },
}

impl PackerError {
    pub fn file_io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::FileIo {
            path: path.into(),
            source,
        }
    }

    /// True for errors that describe the input project rather than the environment.
    pub fn is_source_error(&self) -> bool {
        matches!(
            self,
            PackerError::Resolution { .. }
                | PackerError::Manifest { .. }
                | PackerError::SourceMap { .. }
                | PackerError::EntryNotFound(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, PackerError>;
