//! Asset resolution: map an authored asset reference to a readable resource
//! identifier by probing the current working path and a search-path list.

use std::path::{Path as FsPath, PathBuf};

use crate::strutil;

#[derive(Debug, Clone, Default)]
pub struct AssetResolver {
    current_working_path: String,
    search_paths: Vec<String>,
}

impl AssetResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_current_working_path(&mut self, path: impl Into<String>) {
        self.current_working_path = path.into();
    }

    pub fn current_working_path(&self) -> &str {
        &self.current_working_path
    }

    pub fn set_search_paths(&mut self, paths: Vec<String>) {
        self.search_paths = paths;
    }

    pub fn add_search_path(&mut self, path: impl Into<String>) {
        self.search_paths.push(path.into());
    }

    pub fn search_paths(&self) -> &[String] {
        &self.search_paths
    }

    /// Resolve an asset reference to a concrete resource id.
    ///
    /// Probe order: the path itself when absolute, then joined with the
    /// current working path, then each search path in order. UDIM paths are
    /// returned verbatim for downstream tile expansion. Returns `None` when
    /// nothing readable was found.
    pub fn resolve(&self, asset_path: &str) -> Option<String> {
        if asset_path.is_empty() {
            return None;
        }

        if strutil::is_udim_path(asset_path) {
            return Some(asset_path.to_string());
        }

        let candidate = FsPath::new(asset_path);
        if candidate.is_absolute() {
            return exists(candidate).then(|| asset_path.to_string());
        }

        if !self.current_working_path.is_empty() {
            let joined = PathBuf::from(&self.current_working_path).join(candidate);
            if exists(&joined) {
                return Some(joined.to_string_lossy().into_owned());
            }
        }

        for base in &self.search_paths {
            let joined = PathBuf::from(base).join(candidate);
            if exists(&joined) {
                return Some(joined.to_string_lossy().into_owned());
            }
        }

        None
    }
}

fn exists(path: &FsPath) -> bool {
    std::fs::metadata(path).map(|m| m.is_file()).unwrap_or(false)
}

/// Directory portion of a file path, for deriving a layer's base dir.
pub fn base_dir(filepath: &str) -> String {
    FsPath::new(filepath)
        .parent()
        .map(|p| p.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Lower-cased extension without the dot (`Scene.USDA` → `usda`).
pub fn file_extension(filepath: &str) -> String {
    FsPath::new(filepath)
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default()
}
