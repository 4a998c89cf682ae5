//! The cross-build dependency cache (`spec.md` §3, §4.4, §6).
//!
//! One line per output path: `<output> <dep1> <dep2> ...`, all
//! whitespace-delimited. Rewritten atomically (write-to-temp + rename) so a
//! reader never observes a half-written file.
//!
//! **Chosen policy for the crash-safety Open Question (`spec.md` §9):** the
//! source reads the cache once at startup and unlinks it, rewriting only at
//! clean exit, so a crash mid-build loses all cache progress and the next
//! run treats every built file as maximally dirty. This implementation
//! instead keeps the file intact at startup and re-persists the *entire*
//! cache atomically after every successful `File::updated` transition (see
//! `Planner::apply_success` in `planner.rs`), in addition to the final
//! shutdown flush. A crash between two action completions therefore loses
//! at most the in-flight action's entry, not the whole run's progress, at
//! the cost of one extra atomic rename per completed action.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default)]
pub struct DependencyCache {
    entries: HashMap<PathBuf, Vec<PathBuf>>,
}

impl DependencyCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load the cache file if present; a missing file is an empty cache,
    /// not an error (`spec.md` §8 scenario 7, "stale cache recovery").
    pub fn load(path: &Path) -> io::Result<Self> {
        let text = match fs::read_to_string(path) {
            Ok(t) => t,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Self::new()),
            Err(e) => return Err(e),
        };
        Ok(Self::parse(&text))
    }

    fn parse(text: &str) -> Self {
        let mut entries = HashMap::new();
        for line in text.lines() {
            let mut tokens = line.split_whitespace();
            let Some(output) = tokens.next() else {
                continue;
            };
            let deps: Vec<PathBuf> = tokens.map(PathBuf::from).collect();
            entries.insert(PathBuf::from(output), deps);
        }
        Self { entries }
    }

    pub fn get(&self, output: &Path) -> Option<&Vec<PathBuf>> {
        self.entries.get(output)
    }

    pub fn set(&mut self, output: PathBuf, deps: Vec<PathBuf>) {
        self.entries.insert(output, deps);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Atomically rewrite the cache file: write to a sibling temp path, then
    /// rename over the destination.
    pub fn persist(&self, path: &Path) -> io::Result<()> {
        bub_common::dirs::ensure_parent(path)?;
        let tmp_path = path.with_extension("tmp-write");
        let mut text = String::new();
        for (output, deps) in &self.entries {
            text.push_str(&output.display().to_string());
            for dep in deps {
                text.push(' ');
                text.push_str(&dep.display().to_string());
            }
            text.push('\n');
        }
        fs::write(&tmp_path, text)?;
        fs::rename(&tmp_path, path)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_persist_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dependency-cache");

        let mut cache = DependencyCache::new();
        cache.set(
            PathBuf::from("obj/p/foo.o"),
            vec![PathBuf::from("src/p/foo.h"), PathBuf::from("/usr/include/stdio.h")],
        );
        cache.persist(&path).unwrap();

        let loaded = DependencyCache::load(&path).unwrap();
        assert_eq!(
            loaded.get(Path::new("obj/p/foo.o")).unwrap(),
            &vec![PathBuf::from("src/p/foo.h"), PathBuf::from("/usr/include/stdio.h")]
        );
    }

    #[test]
    fn missing_file_is_empty_cache() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dependency-cache");
        let cache = DependencyCache::load(&path).unwrap();
        assert!(cache.is_empty());
    }

    #[test]
    fn cache_round_trip_line_set_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dependency-cache");
        let mut cache = DependencyCache::new();
        cache.set(PathBuf::from("a.o"), vec![PathBuf::from("a.h")]);
        cache.set(PathBuf::from("b.o"), vec![PathBuf::from("b.h")]);
        cache.persist(&path).unwrap();
        let before = fs::read_to_string(&path).unwrap();
        let loaded = DependencyCache::load(&path).unwrap();
        loaded.persist(&path).unwrap();
        let after = fs::read_to_string(&path).unwrap();
        let mut before_lines: Vec<&str> = before.lines().collect();
        let mut after_lines: Vec<&str> = after.lines().collect();
        before_lines.sort();
        after_lines.sort();
        assert_eq!(before_lines, after_lines);
    }
}
