use std::path::{Component, Path, PathBuf};

/// Conventional directory holding externally installed packages.
pub const DEPENDENCY_DIR: &str = "node_modules";

/// Lexical normalization: folds `.` and `..` without touching the filesystem
/// (symlinks are intentionally not resolved).
pub fn normalize_path(p: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for comp in p.components() {
        match comp {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() && !out.has_root() {
                    out.push(comp.as_os_str());
                }
            }
            _ => out.push(comp.as_os_str()),
        }
    }
    out
}

/// Make `p` absolute against `base` and normalize it.
pub fn absolutize(base: &Path, p: &Path) -> PathBuf {
    if p.is_absolute() {
        normalize_path(p)
    } else {
        normalize_path(&base.join(p))
    }
}

/// Relative path from directory `from_dir` to `to`, always `/`-separated.
/// Used for source map `sources` entries and public URLs.
pub fn relative_url(from_dir: &Path, to: &Path) -> String {
    let from: Vec<Component> = from_dir.components().collect();
    let target: Vec<Component> = to.components().collect();
    let common = from
        .iter()
        .zip(target.iter())
        .take_while(|(a, b)| a == b)
        .count();

    let mut parts: Vec<String> = Vec::new();
    for _ in common..from.len() {
        parts.push("..".to_string());
    }
    for comp in &target[common..] {
        parts.push(comp.as_os_str().to_string_lossy().into_owned());
    }
    parts.join("/")
}

/// True when any component of `p` is the dependency directory.
pub fn in_dependency_dir(p: &Path) -> bool {
    p.components()
        .any(|c| c.as_os_str() == std::ffi::OsStr::new(DEPENDENCY_DIR))
}

/// Lower-cased extension without the dot, or empty.
pub fn extension_of(p: &Path) -> String {
    p.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_folds_dots() {
        let p = normalize_path(Path::new("/a/b/./c/../d"));
        assert_eq!(p, PathBuf::from("/a/b/d"));
    }

    #[test]
    fn test_relative_url_sibling_and_parent() {
        assert_eq!(
            relative_url(Path::new("/p/dist"), Path::new("/p/src/a.js")),
            "../src/a.js"
        );
        assert_eq!(
            relative_url(Path::new("/p/dist"), Path::new("/p/dist/js/app.js")),
            "js/app.js"
        );
    }

    #[test]
    fn test_dependency_dir_detection() {
        assert!(in_dependency_dir(Path::new("/p/node_modules/react/index.js")));
        assert!(!in_dependency_dir(Path::new("/p/src/node_modules_like.js")));
    }
}
