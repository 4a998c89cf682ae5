//! The File entity and its state machine (`spec.md` §3, §4.5).
//!
//! Per the Design Notes (`spec.md` §9), `File` is modelled as a sealed
//! variant (`FileKind`) with behavior -- augmentation, reverse-edge
//! propagation -- dispatched at the call sites in [`crate::planner`] rather
//! than through open-ended inheritance. This module owns only the data: the
//! arena, the by-path index, and the state enum.

use std::collections::HashSet;
use std::path::PathBuf;
use std::time::SystemTime;

use slotmap::SlotMap;

use crate::action::ActionId;
use crate::node::NodeId;

slotmap::new_key_type! {
    /// A stable handle to a [`File`].
    pub struct FileId;
}

/// The extension point a File's owning Binary dispatches on for
/// augmentation and update propagation (`spec.md` §9).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Source,
    Generated,
    StaticLibFile,
    DynamicLibFile,
    ExeFile,
    TestResultFile,
}

impl FileKind {
    /// Only DynamicLib and Exe files perform the library-inference
    /// augmentation pass (`spec.md` §4.5, §4.6).
    pub fn augments(self) -> bool {
        matches!(self, FileKind::DynamicLibFile | FileKind::ExeFile)
    }
}

/// Where a File sits in the dirty-rebuild lifecycle (`spec.md` §4.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileState {
    DependsPending,
    AugmentCheck,
    MaybeIssue,
    UpToDate,
}

#[derive(Debug, Clone)]
pub struct File {
    /// Absolute, build-dir-local path.
    pub path: PathBuf,
    /// Monotonic creation order; defines declaration order (`spec.md` §3).
    pub number: u64,
    /// True if this File is produced by an Action.
    pub built: bool,
    pub mod_time: Option<SystemTime>,
    pub action: Option<ActionId>,
    /// Reverse edges: Files that depend on this one.
    pub depended_by: HashSet<FileId>,
    /// True once consumed by some Binary's sources/objs.
    pub used: bool,
    /// True once `augmentAction` has run for this File (at most once).
    pub augmented: bool,
    pub state: FileState,
    pub kind: FileKind,
    /// The package/Node that owns this File, for the package-descendant and
    /// visibility checks in `may_depend_on` (`spec.md` §4.3).
    pub owner: NodeId,
    /// The set of Files this one depends on (explicit + cache-augmented).
    pub depends: HashSet<FileId>,
}

impl File {
    /// §3 invariant: "zero-byte built target is nonexistent for modTime
    /// purposes" (`spec.md` §9 Open Question -- this implementation keeps
    /// that policy; see `DESIGN.md`).
    pub fn is_present(&self, len: Option<u64>) -> bool {
        match len {
            None => false,
            Some(0) => false,
            Some(_) => true,
        }
    }
}

/// The File arena plus its by-path index (`spec.md` §9 "Global-like state").
#[derive(Debug, Clone, Default)]
pub struct FileTable {
    files: SlotMap<FileId, File>,
    by_path: std::collections::HashMap<PathBuf, FileId>,
    next_number: u64,
    /// Built Files whose Action has not yet completed successfully this run
    /// (`spec.md` §3, Glossary "Outstanding").
    pub outstanding: HashSet<FileId>,
}

impl FileTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_number(&mut self) -> u64 {
        let n = self.next_number;
        self.next_number += 1;
        n
    }

    pub fn insert(&mut self, file: File) -> FileId {
        let path = file.path.clone();
        let built = file.built;
        let id = self.files.insert(file);
        self.by_path.insert(path, id);
        if built {
            self.outstanding.insert(id);
        }
        id
    }

    pub fn get(&self, id: FileId) -> &File {
        &self.files[id]
    }

    pub fn get_mut(&mut self, id: FileId) -> &mut File {
        &mut self.files[id]
    }

    pub fn by_path(&self, path: &std::path::Path) -> Option<FileId> {
        self.by_path.get(path).copied()
    }

    pub fn ids(&self) -> impl Iterator<Item = FileId> + '_ {
        self.files.keys()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_byte_target_treated_as_absent() {
        let f = File {
            path: PathBuf::from("/b/obj/a.o"),
            number: 0,
            built: true,
            mod_time: None,
            action: None,
            depended_by: HashSet::new(),
            used: false,
            augmented: false,
            state: FileState::UpToDate,
            kind: FileKind::Generated,
            owner: NodeId::default(),
            depends: HashSet::new(),
        };
        assert!(!f.is_present(Some(0)));
        assert!(f.is_present(Some(42)));
        assert!(!f.is_present(None));
    }
}
