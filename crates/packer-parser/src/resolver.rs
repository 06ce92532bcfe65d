use packer_core::paths::{absolutize, DEPENDENCY_DIR};
use packer_core::{FileCache, PackerConfig, PackerError, Result, Target};
use rustc_hash::FxHashMap;
use serde_json::Value;
use std::collections::HashMap;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

pub const MANIFEST_NAME: &str = "package.json";

/// Module names the host runtime provides itself.
pub const RUNTIME_MODULES: &[&str] = &[
    "assert",
    "buffer_ieee754",
    "buffer",
    "child_process",
    "cluster",
    "console",
    "constants",
    "crypto",
    "_debugger",
    "dgram",
    "dns",
    "domain",
    "events",
    "freelist",
    "fs",
    "http",
    "https",
    "_linklist",
    "module",
    "net",
    "os",
    "path",
    "punycode",
    "querystring",
    "readline",
    "repl",
    "stream",
    "string_decoder",
    "sys",
    "timers",
    "tls",
    "tty",
    "url",
    "util",
    "vm",
    "zlib",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Found(PathBuf),
    /// Disabled by a browser-field mapping; the importer gets an empty module.
    Skip,
    /// Provided by the host runtime.
    Runtime,
    NotFound,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Redirect {
    To(String),
    Disabled,
}

#[derive(Debug, Clone)]
struct PackageInfo {
    main: String,
    redirects: FxHashMap<String, Redirect>,
}

/// True for `./x`, `../x`, `.`, `..`, `/x` and drive or backslash rooted paths.
pub fn is_local_specifier(spec: &str) -> bool {
    let b = spec.as_bytes();
    if spec == "." || spec == ".." || spec.starts_with("./") || spec.starts_with("../") {
        return true;
    }
    if spec.starts_with('/') || spec.starts_with('\\') {
        return true;
    }
    b.len() >= 3 && b[0].is_ascii_alphabetic() && b[1] == b':' && (b[2] == b'/' || b[2] == b'\\')
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut s: OsString = path.as_os_str().to_owned();
    s.push(suffix);
    PathBuf::from(s)
}

/// Node-style module resolution with per-lookup caches that live across passes.
#[derive(Debug)]
pub struct Resolver {
    alias: HashMap<String, String>,
    browser_field: bool,
    resolved: FxHashMap<(PathBuf, String), Resolution>,
    parent_dirs: FxHashMap<PathBuf, Arc<[PathBuf]>>,
    dependency_paths: FxHashMap<PathBuf, Arc<[PathBuf]>>,
    manifests: FxHashMap<PathBuf, Option<Arc<PackageInfo>>>,
    owners: FxHashMap<PathBuf, Option<PathBuf>>,
}

impl Resolver {
    pub fn new(alias: HashMap<String, String>, target: Target) -> Self {
        Self {
            alias,
            browser_field: target == Target::Browser,
            resolved: FxHashMap::default(),
            parent_dirs: FxHashMap::default(),
            dependency_paths: FxHashMap::default(),
            manifests: FxHashMap::default(),
            owners: FxHashMap::default(),
        }
    }

    pub fn from_config(config: &PackerConfig) -> Self {
        Self::new(config.alias.clone(), config.target)
    }

    /// Drop every cached answer.
    pub fn clear(&mut self) {
        self.resolved.clear();
        self.parent_dirs.clear();
        self.dependency_paths.clear();
        self.manifests.clear();
        self.owners.clear();
    }

    pub fn resolve(
        &mut self,
        cache: &mut FileCache,
        specifier: &str,
        from_dir: &Path,
    ) -> Result<Resolution> {
        let key = (from_dir.to_path_buf(), specifier.to_string());
        match self.resolved.get(&key).cloned() {
            Some(Resolution::Found(path)) if cache.stat(&path)?.is_none() => {
                debug!("{} is gone, resolving {} again", path.display(), specifier);
                self.resolved.remove(&key);
            }
            Some(hit) => return Ok(hit),
            None => {}
        }

        let resolution = self.resolve_uncached(cache, specifier, from_dir)?;
        debug!(
            "Resolved {} from {} -> {:?}",
            specifier,
            from_dir.display(),
            resolution
        );
        if resolution != Resolution::NotFound {
            self.resolved.insert(key, resolution.clone());
        }
        Ok(resolution)
    }

    fn resolve_uncached(
        &mut self,
        cache: &mut FileCache,
        specifier: &str,
        from_dir: &Path,
    ) -> Result<Resolution> {
        let mut spec = self
            .alias
            .get(specifier)
            .cloned()
            .unwrap_or_else(|| specifier.to_string());

        if !is_local_specifier(&spec) && RUNTIME_MODULES.contains(&spec.as_str()) {
            return Ok(Resolution::Runtime);
        }

        let mut local = is_local_specifier(&spec);
        if local {
            spec = absolutize(from_dir, Path::new(&spec))
                .to_string_lossy()
                .into_owned();
        }

        if let Some(owner) = self.owning_package(cache, from_dir)? {
            match self.redirect_in(&owner, &spec) {
                Some(Redirect::Disabled) => return Ok(Resolution::Skip),
                Some(Redirect::To(target)) => {
                    local = is_local_specifier(&target);
                    spec = target;
                }
                None => {}
            }
        }

        let found = if local {
            let path = PathBuf::from(&spec);
            match self.load_as_file(cache, &path)? {
                Some(p) => Some(p),
                None => self.load_as_directory(cache, &path)?,
            }
        } else {
            self.load_dependency(cache, &spec, from_dir)?
        };

        let Some(found) = found else {
            return Ok(Resolution::NotFound);
        };

        // The package that owns the resolved file may remap or disable it.
        let found_dir = found.parent().unwrap_or(Path::new("/")).to_path_buf();
        if let Some(owner) = self.owning_package(cache, &found_dir)? {
            match self.redirect_in(&owner, &found.to_string_lossy()) {
                Some(Redirect::Disabled) => return Ok(Resolution::Skip),
                Some(Redirect::To(target)) if is_local_specifier(&target) => {
                    let path = PathBuf::from(target);
                    if let Some(p) = self.load_as_file(cache, &path)? {
                        return Ok(Resolution::Found(p));
                    }
                }
                _ => {}
            }
        }
        Ok(Resolution::Found(found))
    }

    fn redirect_in(&self, package_dir: &Path, spec: &str) -> Option<Redirect> {
        let info = self.manifests.get(package_dir)?.as_ref()?;
        info.redirects.get(spec).cloned()
    }

    fn load_as_file(&mut self, cache: &mut FileCache, path: &Path) -> Result<Option<PathBuf>> {
        for candidate in [path.to_path_buf(), with_suffix(path, ".js")] {
            if let Some(id) = cache.stat(&candidate)? {
                if cache.node(id).is_file() {
                    return Ok(Some(candidate));
                }
            }
        }
        Ok(None)
    }

    fn load_as_directory(
        &mut self,
        cache: &mut FileCache,
        path: &Path,
    ) -> Result<Option<PathBuf>> {
        if let Some(info) = self.manifest(cache, path)? {
            let main = absolutize(path, Path::new(&info.main));
            if main != path {
                if let Some(p) = self.load_as_file(cache, &main)? {
                    return Ok(Some(p));
                }
                if let Some(p) = self.load_as_directory(cache, &main)? {
                    return Ok(Some(p));
                }
            }
        }
        self.load_as_file(cache, &path.join("index"))
    }

    fn load_dependency(
        &mut self,
        cache: &mut FileCache,
        spec: &str,
        from_dir: &Path,
    ) -> Result<Option<PathBuf>> {
        let dirs = self.dependency_paths(from_dir);
        for dir in dirs.iter() {
            let candidate = dir.join(spec);
            if let Some(p) = self.load_as_file(cache, &candidate)? {
                return Ok(Some(p));
            }
            if let Some(p) = self.load_as_directory(cache, &candidate)? {
                return Ok(Some(p));
            }
        }
        Ok(None)
    }

    /// `from_dir` and its ancestors, nearest first, without dependency directories.
    pub fn parent_dirs(&mut self, from_dir: &Path) -> Arc<[PathBuf]> {
        if let Some(dirs) = self.parent_dirs.get(from_dir) {
            return dirs.clone();
        }
        let dirs: Arc<[PathBuf]> = from_dir
            .ancestors()
            .filter(|d| d.file_name().map_or(true, |n| n != DEPENDENCY_DIR))
            .map(Path::to_path_buf)
            .collect();
        self.parent_dirs.insert(from_dir.to_path_buf(), dirs.clone());
        dirs
    }

    /// Dependency directories searched for a bare specifier imported from `from_dir`.
    pub fn dependency_paths(&mut self, from_dir: &Path) -> Arc<[PathBuf]> {
        if let Some(dirs) = self.dependency_paths.get(from_dir) {
            return dirs.clone();
        }
        let dirs: Arc<[PathBuf]> = self
            .parent_dirs(from_dir)
            .iter()
            .map(|d| d.join(DEPENDENCY_DIR))
            .collect();
        self.dependency_paths
            .insert(from_dir.to_path_buf(), dirs.clone());
        dirs
    }

    /// Nearest ancestor of `dir` holding a manifest.
    fn owning_package(&mut self, cache: &mut FileCache, dir: &Path) -> Result<Option<PathBuf>> {
        if let Some(owner) = self.owners.get(dir) {
            return Ok(owner.clone());
        }
        let mut owner = None;
        for candidate in self.parent_dirs(dir).iter() {
            if self.manifest(cache, candidate)?.is_some() {
                owner = Some(candidate.clone());
                break;
            }
        }
        self.owners.insert(dir.to_path_buf(), owner.clone());
        Ok(owner)
    }

    fn manifest(&mut self, cache: &mut FileCache, dir: &Path) -> Result<Option<Arc<PackageInfo>>> {
        if let Some(info) = self.manifests.get(dir) {
            return Ok(info.clone());
        }

        let manifest_path = dir.join(MANIFEST_NAME);
        let info = match cache.stat(&manifest_path)? {
            Some(id) if cache.node(id).is_file() => {
                let text = cache.read_text(id, false)?;
                Some(Arc::new(self.parse_manifest(dir, &manifest_path, &text)?))
            }
            _ => None,
        };
        self.manifests.insert(dir.to_path_buf(), info.clone());
        Ok(info)
    }

    fn parse_manifest(&self, dir: &Path, manifest_path: &Path, text: &str) -> Result<PackageInfo> {
        let pkg: Value = serde_json::from_str(text).map_err(|e| PackerError::Manifest {
            path: manifest_path.to_path_buf(),
            message: e.to_string(),
        })?;

        let mut main = pkg
            .get("main")
            .and_then(Value::as_str)
            .filter(|m| !m.is_empty())
            .unwrap_or("index")
            .to_string();
        let mut redirects = FxHashMap::default();

        if self.browser_field {
            match pkg.get("browser") {
                Some(Value::String(browser_main)) => main = browser_main.clone(),
                Some(Value::Object(map)) => {
                    for (key, value) in map {
                        let key = absolutize_local(dir, key);
                        match value {
                            Value::Bool(false) => {
                                redirects.insert(key, Redirect::Disabled);
                            }
                            Value::String(to) => {
                                redirects.insert(key, Redirect::To(absolutize_local(dir, to)));
                            }
                            _ => {}
                        }
                    }
                }
                _ => {}
            }
        }
        Ok(PackageInfo { main, redirects })
    }
}

fn absolutize_local(dir: &Path, spec: &str) -> String {
    if is_local_specifier(spec) {
        absolutize(dir, Path::new(spec)).to_string_lossy().into_owned()
    } else {
        spec.to_string()
    }
}
