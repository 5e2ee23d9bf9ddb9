//! Asset directory scanning and lookup.
//!
//! Grounded on `original_source/src/base/asset_scanner.cpp`: indexes a
//! game directory one level deep, recursing only into directories whose
//! lowercased name is listed under `#FOLDNAME` in the Gameexe, and
//! keeping only files whose lowercased extension is in a fixed
//! whitelist.

use std::collections::HashMap;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

use rlvm_types::{Error, Result};

use crate::gameexe::Gameexe;

/// The fixed extension whitelist from spec.md §4.4.
pub const INDEXED_EXTENSIONS: &[&str] = &[
    "g00", "pdt", "anm", "gan", "hik", "wav", "ogg", "nwa", "mp3", "ovk", "koe", "nwk",
];

/// A case-insensitive multimap from file stem to `(extension, path)`,
/// built by walking a game's asset directories.
#[derive(Debug, Default)]
pub struct AssetIndex {
    /// lowercase stem -> entries found for that stem, insertion order.
    files: HashMap<String, Vec<(String, PathBuf)>>,
}

impl AssetIndex {
    /// An empty index, useful for tests or programmatic assembly.
    pub fn new() -> Self {
        AssetIndex::default()
    }

    /// Build an index by reading `#FOLDNAME` entries from `gexe` and
    /// walking `game_root` one directory deep, recursing only into
    /// directories whose lowercased name matches a `#FOLDNAME` entry.
    pub fn build_from_gameexe(gexe: &Gameexe, game_root: &Path) -> Result<Self> {
        let mut valid_dirs: HashSet<String> = HashSet::new();
        for view in gexe.filter("FOLDNAME") {
            let dir = view.as_str().unwrap_or_default();
            if !dir.is_empty() {
                valid_dirs.insert(dir.to_lowercase());
            }
        }

        let mut index = AssetIndex::new();
        let read_dir = std::fs::read_dir(game_root).map_err(|e| {
            Error::NotFound(format!("game directory {}: {e}", game_root.display()))
        })?;

        for entry in read_dir {
            let entry = entry.map_err(|e| Error::NotFound(e.to_string()))?;
            let path = entry.path();
            if !path.is_dir() {
                continue;
            }
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if valid_dirs.contains(&name.to_lowercase()) {
                index.index_directory(&path)?;
            }
        }

        Ok(index)
    }

    fn index_directory(&mut self, dir: &Path) -> Result<()> {
        let whitelist: HashSet<&str> = INDEXED_EXTENSIONS.iter().copied().collect();
        self.walk(dir, &whitelist)
    }

    fn walk(&mut self, dir: &Path, whitelist: &HashSet<&str>) -> Result<()> {
        let entries = std::fs::read_dir(dir)
            .map_err(|e| Error::NotFound(format!("{}: {e}", dir.display())))?;
        for entry in entries {
            let entry = entry.map_err(|e| Error::NotFound(e.to_string()))?;
            let path = entry.path();
            if path.is_dir() {
                self.walk(&path, whitelist)?;
                continue;
            }
            if !path.is_file() {
                continue;
            }
            let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
                continue;
            };
            let ext = ext.to_lowercase();
            if !whitelist.contains(ext.as_str()) {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            self.files
                .entry(stem.to_lowercase())
                .or_default()
                .push((ext, path));
        }
        Ok(())
    }

    /// Manually register a file, bypassing directory scanning. Used by
    /// tests and by opcode bodies that materialise synthetic assets.
    pub fn insert(&mut self, stem: &str, extension: &str, path: PathBuf) {
        self.files
            .entry(stem.to_lowercase())
            .or_default()
            .push((extension.to_lowercase(), path));
    }

    /// Resolve `name` (stripping anything from `?` onward) to a path,
    /// preferring the first entry whose extension is in
    /// `extension_filter` when given, or any entry otherwise.
    pub fn find_file(&self, name: &str, extension_filter: Option<&[&str]>) -> Result<&Path> {
        let stem = name.split('?').next().unwrap_or(name).to_lowercase();
        let candidates = self
            .files
            .get(&stem)
            .ok_or_else(|| Error::NotFound(stem.clone()))?;

        if let Some(filter) = extension_filter {
            for (ext, path) in candidates {
                if filter.iter().any(|f| f.eq_ignore_ascii_case(ext)) {
                    return Ok(path);
                }
            }
            return Err(Error::NotFound(stem));
        }

        candidates
            .first()
            .map(|(_, path)| path.as_path())
            .ok_or_else(|| Error::NotFound(stem))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn find_file_strips_query_suffix_and_lowercases() {
        let mut idx = AssetIndex::new();
        idx.insert("realname", "g00", PathBuf::from("/g/realname.g00"));
        let found = idx.find_file("REALNAME?010", None).unwrap();
        assert_eq!(found, Path::new("/g/realname.g00"));
    }

    #[test]
    fn filter_prefers_matching_extension() {
        let mut idx = AssetIndex::new();
        idx.insert("bgm01", "ogg", PathBuf::from("/a/bgm01.ogg"));
        idx.insert("bgm01", "wav", PathBuf::from("/a/bgm01.wav"));
        let found = idx.find_file("bgm01", Some(&["wav"])).unwrap();
        assert_eq!(found, Path::new("/a/bgm01.wav"));
    }

    #[test]
    fn missing_name_is_not_found() {
        let idx = AssetIndex::new();
        assert!(matches!(idx.find_file("nope", None), Err(Error::NotFound(_))));
    }
}
