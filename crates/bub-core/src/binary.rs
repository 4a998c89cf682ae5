//! Binaries (`spec.md` §3) and the library-inference closure (`spec.md`
//! §4.6) run at a DynamicLib's or Exe's augmentation point.

use std::cmp::Reverse;
use std::collections::{BTreeSet, HashMap, HashSet};

use arcstr::ArcStr;
use slotmap::SlotMap;

use bub_common::Origin;

use crate::cache::DependencyCache;
use crate::error::RuleViolation;
use crate::file::{FileId, FileTable};
use crate::node::NodeId;
use crate::sys_lib::SysLibTable;

slotmap::new_key_type! {
    /// A stable handle to a [`Binary`].
    pub struct BinaryId;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExeFlavor {
    Dist,
    Priv,
    Test,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BinaryKind {
    StaticLib { public: bool },
    DynamicLib,
    Exe(ExeFlavor),
}

#[derive(Debug, Clone)]
pub struct Binary {
    pub kind: BinaryKind,
    pub name: ArcStr,
    /// Declaration order, used both for dispatch priority and as the
    /// "producing Node's declaration number" tiebreaker on link lines
    /// (`spec.md` §4.6); a Binary belongs to exactly one owning Node and is
    /// declared in that Node's Bubfile in source order, so this number
    /// stands in for it.
    pub number: u64,
    pub owner: NodeId,
    /// The File this Binary's link/archive action produces.
    pub built_file: FileId,
    pub sources: Vec<FileId>,
    pub objs: Vec<FileId>,
    pub required_sys_libs: Vec<u64>,
    /// The language-family signature used for source-extension compatibility
    /// checks (`spec.md` §3) -- `None` until the first non-`.c` source sets
    /// it.
    pub source_ext: Option<String>,
    pub public_sources: HashSet<FileId>,
    /// For a DynamicLib: the StaticLibs it packages, as declared in the
    /// Bubfile (not inferred).
    pub static_lib_contents: Vec<BinaryId>,
}

/// The Binary arena plus the `Binary.byContent` / `DynamicLib.byContent`
/// indices from `spec.md` §9.
#[derive(Debug, Clone, Default)]
pub struct BinaryTable {
    binaries: SlotMap<BinaryId, Binary>,
    /// Maps a File (source or obj) to the Binary that claims it.
    by_content: HashMap<FileId, BinaryId>,
    /// Maps a StaticLib's BinaryId to the DynamicLib packaging it, if any.
    dynamic_lib_by_content: HashMap<BinaryId, BinaryId>,
    next_number: u64,
}

impl BinaryTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_number(&mut self) -> u64 {
        let n = self.next_number;
        self.next_number += 1;
        n
    }

    pub fn insert(&mut self, binary: Binary) -> BinaryId {
        self.binaries.insert(binary)
    }

    pub fn get(&self, id: BinaryId) -> &Binary {
        &self.binaries[id]
    }

    pub fn get_mut(&mut self, id: BinaryId) -> &mut Binary {
        &mut self.binaries[id]
    }

    /// Claim `file` as content of `owner`. Fails if another Binary already
    /// claims it (`spec.md` §8 "object files used at most once").
    pub fn claim_content(
        &mut self,
        origin: &Origin,
        owner: BinaryId,
        file: FileId,
    ) -> Result<(), RuleViolation> {
        if let Some(existing) = self.by_content.get(&file) {
            if *existing != owner {
                return Err(RuleViolation::SourceReused(
                    origin.clone(),
                    format!("{file:?}"),
                    self.binaries[*existing].name.to_string(),
                    self.binaries[owner].name.to_string(),
                ));
            }
            return Ok(());
        }
        self.by_content.insert(file, owner);
        Ok(())
    }

    pub fn by_content(&self, file: FileId) -> Option<BinaryId> {
        self.by_content.get(&file).copied()
    }

    /// Register that `dlib` packages the StaticLib `static_lib`. Fails if
    /// another DynamicLib already packages it (`spec.md` §3, §8
    /// "DynamicLibs' contents are disjoint").
    pub fn register_dynamic_lib_content(
        &mut self,
        origin: &Origin,
        dlib: BinaryId,
        static_lib: BinaryId,
    ) -> Result<(), RuleViolation> {
        if let Some(existing) = self.dynamic_lib_by_content.get(&static_lib) {
            if *existing != dlib {
                return Err(RuleViolation::DynamicLibContentOverlap(
                    origin.clone(),
                    self.binaries[*existing].name.to_string(),
                    self.binaries[dlib].name.to_string(),
                    self.binaries[static_lib].name.to_string(),
                ));
            }
            return Ok(());
        }
        self.dynamic_lib_by_content.insert(static_lib, dlib);
        self.binaries[dlib].static_lib_contents.push(static_lib);
        Ok(())
    }

    pub fn dynamic_lib_containing(&self, static_lib: BinaryId) -> Option<BinaryId> {
        self.dynamic_lib_by_content.get(&static_lib).copied()
    }

    pub fn ids(&self) -> impl Iterator<Item = BinaryId> + '_ {
        self.binaries.keys()
    }
}

/// The outcome of running [`infer_libs`]: the final `${LIBS}` ordering plus
/// the new dependency edges the target now has on the libraries it links.
#[derive(Debug, Clone, Default)]
pub struct LinkPlan {
    pub static_libs: Vec<BinaryId>,
    pub dynamic_libs: Vec<BinaryId>,
    pub sys_libs: Vec<ArcStr>,
    /// Every Binary (by its `built_file`) the target now has a dependency
    /// edge on, for the Planner to feed into `Action::add_dependency`.
    pub new_depends: Vec<FileId>,
}

/// Walk the dependency-cache closure of `target`'s objects to resolve which
/// static libs, dynamic libs, and system libs to link, in the order
/// required by `spec.md` §4.6.
pub fn infer_libs(
    origin: &Origin,
    target: BinaryId,
    cache: &DependencyCache,
    files: &FileTable,
    binaries: &BinaryTable,
    sys_libs: &SysLibTable,
) -> Result<LinkPlan, RuleViolation> {
    let target_bin = binaries.get(target);
    let mut sys_lib_numbers: BTreeSet<u64> = target_bin.required_sys_libs.iter().copied().collect();
    let mut static_libs: Vec<BinaryId> = Vec::new();
    let mut dynamic_libs: Vec<BinaryId> = Vec::new();
    let mut new_depends: Vec<FileId> = Vec::new();
    let mut seen_static: HashSet<BinaryId> = HashSet::new();
    let mut seen_dynamic: HashSet<BinaryId> = HashSet::new();

    let mut stack: Vec<FileId> = target_bin.objs.clone();
    let mut visited_obj: HashSet<FileId> = HashSet::new();

    while let Some(obj) = stack.pop() {
        if !visited_obj.insert(obj) {
            continue;
        }
        let Some(deps) = cache.get(&files.get(obj).path) else {
            continue;
        };
        for path in deps {
            let Some(file) = files.by_path(path) else {
                // Unresolved cached paths are a planner-level downgrade
                // (`spec.md` §4.4/§7), not an inference-time error; they are
                // handled when the dependency cache entry is consulted at
                // Action construction, not here.
                continue;
            };
            let Some(container) = binaries.by_content(file) else {
                continue;
            };
            for lib in &binaries.get(container).required_sys_libs {
                sys_lib_numbers.insert(*lib);
            }
            if container == target {
                continue;
            }

            if let Some(dlib) = binaries.dynamic_lib_containing(container) {
                if binaries.get(dlib).number < target_bin.number {
                    if seen_dynamic.insert(dlib) {
                        dynamic_libs.push(dlib);
                        new_depends.push(binaries.get(dlib).built_file);
                        for sl in &binaries.get(dlib).static_lib_contents {
                            stack.extend(binaries.get(*sl).objs.iter().copied());
                        }
                    }
                    continue;
                }
            }

            if matches!(target_bin.kind, BinaryKind::DynamicLib) {
                return Err(RuleViolation::DynamicLibRequiresUnpackagedStaticLib(
                    origin.clone(),
                    target_bin.name.to_string(),
                    binaries.get(container).name.to_string(),
                ));
            }

            if seen_static.insert(container) {
                static_libs.push(container);
                new_depends.push(binaries.get(container).built_file);
                stack.extend(binaries.get(container).objs.iter().copied());
            }
        }
    }

    static_libs.sort_by_key(|id| Reverse(binaries.get(*id).number));
    dynamic_libs.sort_by_key(|id| Reverse(binaries.get(*id).number));

    Ok(LinkPlan {
        static_libs,
        dynamic_libs,
        sys_libs: sys_lib_numbers
            .into_iter()
            .rev()
            .filter_map(|n| sys_libs.name_of(n).cloned())
            .collect(),
        new_depends,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file::{File, FileKind, FileState, FileTable};
    use crate::node::Tree;

    fn origin() -> Origin {
        Origin::unknown()
    }

    /// Register a plain (non-built) File and return its id.
    fn plain_file(files: &mut FileTable, owner: NodeId, path: &str) -> FileId {
        let number = files.next_number();
        files.insert(File {
            path: path.into(),
            number,
            built: false,
            mod_time: None,
            action: None,
            depended_by: HashSet::new(),
            used: true,
            augmented: false,
            state: FileState::UpToDate,
            kind: FileKind::Source,
            owner,
            depends: HashSet::new(),
        })
    }

    fn built_file(files: &mut FileTable, owner: NodeId, path: &str, kind: FileKind) -> FileId {
        let number = files.next_number();
        files.insert(File {
            path: path.into(),
            number,
            built: true,
            mod_time: None,
            action: None,
            depended_by: HashSet::new(),
            used: true,
            augmented: false,
            state: FileState::DependsPending,
            kind,
            owner,
            depends: HashSet::new(),
        })
    }

    fn static_lib(
        binaries: &mut BinaryTable,
        files: &mut FileTable,
        owner: NodeId,
        name: &str,
        objs: &[FileId],
    ) -> BinaryId {
        let number = binaries.next_number();
        let built_file = built_file(files, owner, &format!("dist/lib/lib{name}.a"), FileKind::StaticLibFile);
        binaries.insert(Binary {
            kind: BinaryKind::StaticLib { public: true },
            name: ArcStr::from(name),
            number,
            owner,
            built_file,
            sources: Vec::new(),
            objs: objs.to_vec(),
            required_sys_libs: Vec::new(),
            source_ext: None,
            public_sources: HashSet::new(),
            static_lib_contents: Vec::new(),
        })
    }

    /// Wires up a minimal closure: `target` (an Exe or DynamicLib) has one
    /// object that the dependency cache says includes a header owned by
    /// `lib`'s one object.
    fn wire_include(cache: &mut DependencyCache, files: &FileTable, consumer_obj: FileId, lib_obj: FileId) {
        cache.set(files.get(consumer_obj).path.clone(), vec![files.get(lib_obj).path.clone()]);
    }

    #[test]
    fn exe_inherits_static_lib_from_included_header() {
        let tree = Tree::new();
        let root = tree.root();
        let mut files = FileTable::new();
        let mut binaries = BinaryTable::new();
        let sys_libs = SysLibTable::new();
        let mut cache = DependencyCache::new();

        let lib_obj = plain_file(&mut files, root, "obj/widget.o");
        let lib = static_lib(&mut binaries, &mut files, root, "widget", &[lib_obj]);

        let exe_obj = plain_file(&mut files, root, "obj/main.o");
        wire_include(&mut cache, &files, exe_obj, lib_obj);

        let exe_built = built_file(&mut files, root, "dist/bin/app", FileKind::ExeFile);
        let exe_number = binaries.next_number();
        let exe = binaries.insert(Binary {
            kind: BinaryKind::Exe(ExeFlavor::Dist),
            name: ArcStr::from("app"),
            number: exe_number,
            owner: root,
            built_file: exe_built,
            sources: Vec::new(),
            objs: vec![exe_obj],
            required_sys_libs: Vec::new(),
            source_ext: None,
            public_sources: HashSet::new(),
            static_lib_contents: Vec::new(),
        });

        let plan = infer_libs(&origin(), exe, &cache, &files, &binaries, &sys_libs).unwrap();
        assert_eq!(plan.static_libs, vec![lib]);
        assert!(plan.dynamic_libs.is_empty());
        assert_eq!(plan.new_depends, vec![binaries.get(lib).built_file]);
    }

    #[test]
    fn dynamic_lib_preempts_its_packaged_static_lib() {
        let tree = Tree::new();
        let root = tree.root();
        let mut files = FileTable::new();
        let mut binaries = BinaryTable::new();
        let sys_libs = SysLibTable::new();
        let mut cache = DependencyCache::new();

        let lib_obj = plain_file(&mut files, root, "obj/widget.o");
        let lib = static_lib(&mut binaries, &mut files, root, "widget", &[lib_obj]);

        let dlib_built = built_file(&mut files, root, "dist/lib/libwidget.so", FileKind::DynamicLibFile);
        let dlib_number = binaries.next_number();
        let dlib = binaries.insert(Binary {
            kind: BinaryKind::DynamicLib,
            name: ArcStr::from("widget-shared"),
            number: dlib_number,
            owner: root,
            built_file: dlib_built,
            sources: Vec::new(),
            objs: Vec::new(),
            required_sys_libs: Vec::new(),
            source_ext: None,
            public_sources: HashSet::new(),
            static_lib_contents: Vec::new(),
        });
        binaries.register_dynamic_lib_content(&origin(), dlib, lib).unwrap();

        let exe_obj = plain_file(&mut files, root, "obj/main.o");
        wire_include(&mut cache, &files, exe_obj, lib_obj);

        let exe_built = built_file(&mut files, root, "dist/bin/app", FileKind::ExeFile);
        let exe_number = binaries.next_number();
        let exe = binaries.insert(Binary {
            kind: BinaryKind::Exe(ExeFlavor::Dist),
            name: ArcStr::from("app"),
            number: exe_number,
            owner: root,
            built_file: exe_built,
            sources: Vec::new(),
            objs: vec![exe_obj],
            required_sys_libs: Vec::new(),
            source_ext: None,
            public_sources: HashSet::new(),
            static_lib_contents: Vec::new(),
        });

        let plan = infer_libs(&origin(), exe, &cache, &files, &binaries, &sys_libs).unwrap();
        assert_eq!(plan.dynamic_libs, vec![dlib]);
        assert!(plan.static_libs.is_empty(), "the packaged static lib must not also be linked directly");
    }

    #[test]
    fn dynamic_lib_target_rejects_unpackaged_static_lib_dependency() {
        let tree = Tree::new();
        let root = tree.root();
        let mut files = FileTable::new();
        let mut binaries = BinaryTable::new();
        let sys_libs = SysLibTable::new();
        let mut cache = DependencyCache::new();

        let lib_obj = plain_file(&mut files, root, "obj/widget.o");
        static_lib(&mut binaries, &mut files, root, "widget", &[lib_obj]);

        let dlib_obj = plain_file(&mut files, root, "obj/shared.o");
        wire_include(&mut cache, &files, dlib_obj, lib_obj);

        let dlib_built = built_file(&mut files, root, "dist/lib/libshared.so", FileKind::DynamicLibFile);
        let dlib_number = binaries.next_number();
        let dlib = binaries.insert(Binary {
            kind: BinaryKind::DynamicLib,
            name: ArcStr::from("shared"),
            number: dlib_number,
            owner: root,
            built_file: dlib_built,
            sources: Vec::new(),
            objs: vec![dlib_obj],
            required_sys_libs: Vec::new(),
            source_ext: None,
            public_sources: HashSet::new(),
            static_lib_contents: Vec::new(),
        });

        let err = infer_libs(&origin(), dlib, &cache, &files, &binaries, &sys_libs);
        assert!(matches!(err, Err(RuleViolation::DynamicLibRequiresUnpackagedStaticLib(..))));
    }
}
