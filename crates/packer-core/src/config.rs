use crate::error::{PackerError, Result};
use crate::paths::{absolutize, normalize_path, relative_url};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, info};

/// Which runtime the bundles are built for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Target {
    /// Honour the manifest `browser` field.
    #[default]
    Browser,
    Node,
}

/// Build configuration shared by the orchestrator and every plugin.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackerConfig {
    /// Project root; relative paths in patterns and plugin options are taken from here.
    #[serde(default = "default_context")]
    pub context: PathBuf,

    /// Output root, relative to `context` unless absolute.
    #[serde(default = "default_dest")]
    pub dest: PathBuf,

    /// Emit `.map` files next to bundles.
    #[serde(default = "default_true")]
    pub source_map: bool,

    /// Specifier substitutions applied before resolution.
    #[serde(default)]
    pub alias: HashMap<String, String>,

    /// Stylesheet assets up to this many bytes are inlined as data URIs.
    #[serde(default = "default_inline_size_limit")]
    pub inline_size_limit: u64,

    /// Prefix for asset URLs rewritten into the output tree.
    #[serde(default)]
    pub public_path: String,

    #[serde(default)]
    pub target: Target,

    #[serde(default)]
    pub watch: WatchConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchConfig {
    /// Quiet period after the last change notification before a pass starts.
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,

    #[serde(default = "default_true")]
    pub skip_dependency_dirs: bool,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            debounce_ms: default_debounce_ms(),
            skip_dependency_dirs: true,
        }
    }
}

impl Default for PackerConfig {
    fn default() -> Self {
        Self {
            context: default_context(),
            dest: default_dest(),
            source_map: true,
            alias: HashMap::new(),
            inline_size_limit: default_inline_size_limit(),
            public_path: String::new(),
            target: Target::default(),
            watch: WatchConfig::default(),
        }
    }
}

fn default_context() -> PathBuf {
    PathBuf::from(".")
}

fn default_dest() -> PathBuf {
    PathBuf::from("dist")
}

fn default_true() -> bool {
    true
}

fn default_inline_size_limit() -> u64 {
    4096
}

fn default_debounce_ms() -> u64 {
    50
}

impl PackerConfig {
    /// Config rooted at `context` with every other field defaulted, already normalized.
    pub fn for_context(context: impl Into<PathBuf>) -> Result<Self> {
        Self {
            context: context.into(),
            ..Self::default()
        }
        .normalize()
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| PackerError::Config(e.to_string()))
    }

    /// Read a TOML file. A relative `context` inside it is taken from the file's directory.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content =
            std::fs::read_to_string(path).map_err(|e| PackerError::file_io(path, e))?;
        let mut config = Self::from_toml_str(&content)?;
        if config.context.is_relative() {
            if let Some(dir) = path.parent() {
                config.context = dir.join(&config.context);
            }
        }
        info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Apply `PACKER_*` environment variables on top of the loaded values.
    pub fn apply_env_overrides(self) -> Self {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Same as [`PackerConfig::apply_env_overrides`] with an explicit variable lookup.
    pub fn apply_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(context) = lookup("PACKER_CONTEXT") {
            self.context = PathBuf::from(context);
        }
        if let Some(dest) = lookup("PACKER_DEST") {
            self.dest = PathBuf::from(dest);
        }
        if let Some(flag) = lookup("PACKER_SOURCE_MAP") {
            self.source_map = flag.to_lowercase() == "true" || flag == "1";
        }
        if let Some(public_path) = lookup("PACKER_PUBLIC_PATH") {
            self.public_path = public_path;
        }
        if let Some(ms) = lookup("PACKER_DEBOUNCE_MS") {
            if let Ok(ms) = ms.parse() {
                self.watch.debounce_ms = ms;
            }
        }
        self
    }

    /// Make `context` absolute, resolve `dest` against it and validate both.
    pub fn normalize(mut self) -> Result<Self> {
        if self.context.is_relative() {
            let cwd = std::env::current_dir()?;
            self.context = absolutize(&cwd, &self.context);
        } else {
            self.context = normalize_path(&self.context);
        }
        self.dest = absolutize(&self.context, &self.dest);
        self.validate()?;
        debug!(
            "Context {} -> dest {}",
            self.context.display(),
            self.dest.display()
        );
        Ok(self)
    }

    fn validate(&self) -> Result<()> {
        if !self.context.is_dir() {
            return Err(PackerError::Config(format!(
                "context {} is not a directory",
                self.context.display()
            )));
        }
        if self.dest == self.context {
            return Err(PackerError::Config(
                "dest must differ from context".to_string(),
            ));
        }
        if self.watch.debounce_ms == 0 {
            return Err(PackerError::Config(
                "watch.debounce_ms must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Map a name into the output tree. Absolute paths keep their position relative to
    /// `dest`, with any climb above it dropped.
    pub fn normalize_dest_name(&self, name: impl AsRef<Path>) -> PathBuf {
        let name = normalize_path(name.as_ref());
        let relative: PathBuf = if name.is_absolute() {
            PathBuf::from(relative_url(&self.dest, &name))
        } else {
            name
        };
        let kept: PathBuf = relative
            .components()
            .filter(|c| matches!(c, Component::Normal(_)))
            .collect();
        normalize_path(&self.dest.join(kept))
    }

    /// `/`-separated path of `path` below `dest`.
    pub fn relative_to_dest(&self, path: &Path) -> String {
        relative_url(&self.dest, path)
    }

    pub fn in_dest_folder(&self, path: &Path) -> bool {
        path.starts_with(&self.dest)
    }
}
