//! The Planner: startup, the main scheduling loop, and shutdown
//! (`spec.md` §4.7, §5).
//!
//! Per the Design Notes (`spec.md` §9 "Global-like state"), every table
//! that the original design kept as a set of global maps
//! (`Node.byTrail`, `File.byPath`, `Binary.byContent`, `Action.byName`, …)
//! is instead a field of this single context struct, passed explicitly.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use tracing::{debug, info, warn};

use bub_common::{BuildDirs, Origin, OptionsFile};
use bub_worker::{FromWorker, WorkItem, WorkerPool};

use crate::action::{ActionId, ActionTable};
use crate::binary::{infer_libs, BinaryTable};
use crate::cache::DependencyCache;
use crate::error::{BubError, ConfigError, SchedulerInvariant, UnknownEntity};
use crate::file::{File, FileId, FileKind, FileState, FileTable};
use crate::node::{NodeId, Tree};
use crate::sys_lib::SysLibTable;

#[derive(Debug, Clone, Default)]
pub struct Counts {
    pub seen: u64,
    pub built: u64,
    pub updated: u64,
}

/// The Planner context: single-threaded owner of every table, the sole
/// source of truth for which files are outstanding (`spec.md` §5).
pub struct Planner {
    pub dirs: BuildDirs,
    pub options: OptionsFile,
    pub tree: Tree,
    pub files: FileTable,
    pub actions: ActionTable,
    pub binaries: BinaryTable,
    pub sys_libs: SysLibTable,
    pub cache: DependencyCache,
    pub conditionals: HashSet<String>,
    pub external_modules: Vec<String>,
    /// Every File this run is responsible for producing, used by the
    /// cleanup pass (`spec.md` §4.7).
    pub all_built: HashSet<PathBuf>,
    /// Each package Node's own Bubfile File, included in every Action's
    /// `depends` for that package (`spec.md` §3 "Package").
    pub package_bubfile: HashMap<NodeId, FileId>,
    pub counts: Counts,
    cancelled: bool,
}

impl Planner {
    /// Startup (`spec.md` §4.7): load options, load the dependency cache,
    /// create the root Node, recursively process the root Bubfile, then run
    /// the cleanup pass.
    pub fn load(build_dir: impl Into<PathBuf>, conditionals: HashSet<String>) -> Result<Self, BubError> {
        let dirs = BuildDirs::new(build_dir.into());
        let options_path = dirs.options_path();
        let options_text = fs::read_to_string(&options_path)?;
        let options = OptionsFile::parse(&options_path, &options_text)
            .map_err(|e| ConfigError::Options(Origin::new(&options_path, 0), e))?;
        let cache = DependencyCache::load(&dirs.dependency_cache_path())?;

        let mut planner = Planner {
            dirs,
            options,
            tree: Tree::new(),
            files: FileTable::new(),
            actions: ActionTable::new(),
            binaries: BinaryTable::new(),
            sys_libs: SysLibTable::new(),
            cache,
            conditionals,
            external_modules: Vec::new(),
            all_built: HashSet::new(),
            package_bubfile: HashMap::new(),
            counts: Counts::default(),
            cancelled: false,
        };

        let root = planner.tree.root();
        let src_root = planner.dirs.src();
        planner.process_package(root, &src_root)?;
        planner.cleanup_pass()?;

        let ready: Vec<FileId> = planner.files.outstanding.iter().copied().collect();
        for id in ready {
            planner.issue_if_ready(id)?;
        }

        Ok(planner)
    }

    /// Cleanup pass (`spec.md` §4.7): walk `obj`, `priv`, `dist`; delete any
    /// file not in `all_built`, and any directory left empty afterward.
    fn cleanup_pass(&mut self) -> Result<(), BubError> {
        for root in self.dirs.cleanup_roots() {
            if !root.exists() {
                continue;
            }
            sweep_dir(&root, &self.all_built)?;
        }
        Ok(())
    }

    /// `issueIfReady` (`spec.md` §4.5): advance one File through as much of
    /// the state machine as is currently possible.
    pub fn issue_if_ready(&mut self, id: FileId) -> Result<(), BubError> {
        loop {
            let state = self.files.get(id).state;
            match state {
                FileState::DependsPending => {
                    if !self.all_depends_clean(id) {
                        return Ok(());
                    }
                    let Some(action_id) = self.files.get(id).action else {
                        self.files.get_mut(id).state = FileState::UpToDate;
                        continue;
                    };
                    if !self.actions.may_issue(self.actions.get(action_id).number) {
                        return Ok(());
                    }
                    self.files.get_mut(id).state = FileState::AugmentCheck;
                }
                FileState::AugmentCheck => {
                    if self.files.get(id).augmented || !self.files.get(id).kind.augments() {
                        self.files.get_mut(id).state = FileState::MaybeIssue;
                        continue;
                    }
                    self.files.get_mut(id).augmented = true;
                    let added = self.augment_action(id)?;
                    if added {
                        self.files.get_mut(id).state = FileState::DependsPending;
                        continue;
                    }
                    self.files.get_mut(id).state = FileState::MaybeIssue;
                }
                FileState::MaybeIssue => {
                    if self.is_dirty(id) {
                        if let Some(action_id) = self.files.get(id).action {
                            self.enqueue_action(action_id);
                        }
                    } else {
                        self.mark_up_to_date(id);
                    }
                    return Ok(());
                }
                FileState::UpToDate => return Ok(()),
            }
        }
    }

    fn all_depends_clean(&self, id: FileId) -> bool {
        self.files
            .get(id)
            .depends
            .iter()
            .all(|d| self.files.get(*d).state == FileState::UpToDate)
    }

    fn is_dirty(&self, id: FileId) -> bool {
        let file = self.files.get(id);
        let Some(action_id) = file.action else {
            return false;
        };
        let action = self.actions.get(action_id);
        if action.maximally_dirty {
            return true;
        }
        let this_mtime = file.mod_time;
        let depend_newer = file.depends.iter().any(|d| {
            let dep = self.files.get(*d);
            match (dep.mod_time, this_mtime) {
                (Some(dm), Some(tm)) => dm > tm,
                _ => true,
            }
        });
        let action_newer = match (action.newest, this_mtime) {
            (Some(an), Some(tm)) => an > tm,
            (Some(_), None) => true,
            (None, _) => false,
        };
        depend_newer || action_newer || this_mtime.is_none()
    }

    fn mark_up_to_date(&mut self, id: FileId) {
        self.files.get_mut(id).state = FileState::UpToDate;
        self.files.outstanding.remove(&id);
        let reverse: Vec<FileId> = self.files.get(id).depended_by.iter().copied().collect();
        for r in reverse {
            let _ = self.issue_if_ready(r);
        }
    }

    fn enqueue_action(&mut self, action_id: ActionId) {
        if self.actions.get(action_id).issued {
            return;
        }
        self.actions.get_mut(action_id).issued = true;
        self.actions.enqueue(action_id);
    }

    /// `augmentAction()` (`spec.md` §4.5): runs the library-inference pass
    /// (`spec.md` §4.6) for a DynamicLib or Exe File. Returns whether it
    /// added any new depends.
    fn augment_action(&mut self, id: FileId) -> Result<bool, BubError> {
        let Some(&binary_id) = self.binaries_by_output(id).first() else {
            return Ok(false);
        };
        let origin = self.files.get(id).action.map(|a| self.actions.get(a).origin.clone()).unwrap_or_else(Origin::unknown);
        let plan = infer_libs(&origin, binary_id, &self.cache, &self.files, &self.binaries, &self.sys_libs)?;

        let mut added = false;
        if let Some(action_id) = self.files.get(id).action {
            for dep_file in &plan.new_depends {
                if self.actions.get_mut(action_id).add_dependency(*dep_file) {
                    self.files.get_mut(id).depends.insert(*dep_file);
                    self.files.get_mut(*dep_file).depended_by.insert(id);
                    added = true;
                }
            }
            self.actions.get_mut(action_id).resolved_libs = plan
                .static_libs
                .iter()
                .map(|b| self.binaries.get(*b).name.to_string())
                .chain(plan.dynamic_libs.iter().map(|b| self.binaries.get(*b).name.to_string()))
                .chain(plan.sys_libs.iter().map(|s| s.to_string()))
                .collect();
        }
        Ok(added)
    }

    fn binaries_by_output(&self, file: FileId) -> Vec<crate::binary::BinaryId> {
        self.binaries
            .ids()
            .filter(|b| self.binaries.get(*b).built_file == file)
            .collect()
    }

    /// Main loop (`spec.md` §4.7, §5): dispatch ready actions to idle
    /// workers, receive worker results, apply them, and abort on scheduler
    /// deadlock.
    pub fn run(&mut self, pool: &WorkerPool) -> Result<(), BubError> {
        let worker_count = pool.worker_count();
        let mut idle: Vec<usize> = (0..worker_count).collect();
        let mut in_flight: std::collections::HashMap<String, ActionId> = std::collections::HashMap::new();

        while !self.files.outstanding.is_empty() {
            let mut dispatched_this_round = false;
            while let Some(worker_id) = idle.pop() {
                let Some(action_id) = self.actions.dequeue_ready() else {
                    idle.push(worker_id);
                    break;
                };
                dispatched_this_round = true;
                let action = self.actions.get(action_id);
                let command = self.resolve_command_line(action_id);
                let target_paths: Vec<PathBuf> =
                    action.builds.iter().map(|f| self.files.get(*f).path.clone()).collect();
                in_flight.insert(action.name.to_string(), action_id);
                pool.dispatch(
                    worker_id,
                    WorkItem {
                        action_name: action.name.to_string(),
                        command,
                        target_paths,
                    },
                );
            }

            if idle.len() == worker_count && !dispatched_this_round && !self.actions.has_ready() {
                return Err(SchedulerInvariant::Deadlock {
                    idle_workers: idle.len(),
                    outstanding: self.files.outstanding.len(),
                }
                .into());
            }

            let Some(msg) = pool.recv() else {
                break;
            };
            match msg {
                FromWorker::Completed { worker_id, action_name } => {
                    idle.push(worker_id);
                    if let Some(action_id) = in_flight.remove(&action_name) {
                        self.apply_success(action_id)?;
                    }
                }
                FromWorker::Failed {
                    worker_id,
                    action_name,
                    exit_code,
                    stderr,
                    target_paths,
                } => {
                    idle.push(worker_id);
                    in_flight.remove(&action_name);
                    warn!(action = %action_name, ?exit_code, "action failed, cancelling build");
                    for path in &target_paths {
                        let _ = fs::remove_file(path);
                    }
                    self.cancelled = true;
                    return Err(crate::error::ActionFailure::NonZeroExit {
                        action_name,
                        exit_code,
                        stderr,
                    }
                    .into());
                }
                FromWorker::Terminated { worker_id } => {
                    idle.push(worker_id);
                }
            }
        }

        Ok(())
    }

    fn resolve_command_line(&self, action_id: ActionId) -> String {
        let action = self.actions.get(action_id);
        let mut vars: std::collections::HashMap<String, Vec<String>> = self.options.variables.clone();
        vars.insert(
            "OUTPUT".to_string(),
            action.builds.iter().map(|f| self.files.get(*f).path.display().to_string()).collect(),
        );
        vars.insert(
            "INPUT".to_string(),
            action.inputs.iter().map(|f| self.files.get(*f).path.display().to_string()).collect(),
        );
        vars.insert("DEPS".to_string(), vec![action.deps_path.display().to_string()]);
        vars.insert("LIBS".to_string(), action.resolved_libs.clone());
        let lookup = |name: &str| vars.get(name).cloned();
        bub_common::options::expand_command(&action.command_template, &lookup).join(" ")
    }

    /// Apply a successful worker completion: run `updated()` on every File
    /// this action builds (`spec.md` §4.5).
    fn apply_success(&mut self, action_id: ActionId) -> Result<(), BubError> {
        let builds = self.actions.get(action_id).builds.clone();
        let deps_path = self.actions.get(action_id).deps_path.clone();
        let declared_inputs: HashSet<PathBuf> = self
            .actions
            .get(action_id)
            .inputs
            .iter()
            .map(|f| self.files.get(*f).path.clone())
            .collect();

        let deps_text = fs::read_to_string(&deps_path).unwrap_or_default();
        let raw_deps = crate::deps_file::parse_deps_file(&deps_text);

        for file_id in builds {
            self.updated(file_id, action_id, &declared_inputs, &raw_deps)?;
        }
        self.counts.updated += 1;
        Ok(())
    }

    /// `updated(action, declared_inputs)` (`spec.md` §4.5).
    fn updated(
        &mut self,
        file_id: FileId,
        action_id: ActionId,
        declared_inputs: &HashSet<PathBuf>,
        raw_deps: &[String],
    ) -> Result<(), BubError> {
        let mut cache_entry = Vec::new();
        let mut new_depends = Vec::new();
        let mut unresolved = false;
        for token in raw_deps {
            let path = PathBuf::from(token);
            if declared_inputs.contains(&path) {
                continue;
            }
            cache_entry.push(path.clone());
            let Some(dep_file) = self.files.by_path(&path) else {
                // An absolute, untracked path (e.g. a system header) is an
                // external dependency with no File identity and so nothing to
                // check visibility against; a relative path that resolves to
                // no known File is a genuinely unresolved dependency.
                if !path.is_absolute() {
                    warn!(
                        "{}",
                        UnknownEntity::UnknownCachedDependency(token.clone(), self.files.get(file_id).path.clone())
                    );
                    unresolved = true;
                }
                continue;
            };
            let origin = self.actions.get(action_id).origin.clone();
            crate::construct::check_may_depend(&origin, &self.tree, &self.files, file_id, dep_file)?;
            new_depends.push(dep_file);
        }

        for d in &new_depends {
            self.files.get_mut(file_id).depends.insert(*d);
            self.files.get_mut(*d).depended_by.insert(file_id);
        }

        let out_path = self.files.get(file_id).path.clone();
        self.cache.set(out_path, cache_entry);
        self.cache.persist(&self.dirs.dependency_cache_path())?;

        let mod_time = fs::metadata(&self.files.get(file_id).path).ok().and_then(|m| m.modified().ok());
        self.files.get_mut(file_id).mod_time = mod_time.or(Some(SystemTime::now()));
        self.files.get_mut(file_id).action = None;
        self.files.outstanding.remove(&file_id);
        self.counts.built += 1;

        let action = self.actions.get_mut(action_id);
        action.done = true;
        if unresolved {
            action.maximally_dirty = true;
        }
        if action.is_generator {
            self.actions.complete_generator(action.number);
        }

        self.mark_up_to_date(file_id);
        Ok(())
    }

    /// Shutdown (`spec.md` §4.7): flush the dependency cache atomically and
    /// log the final summary.
    pub fn shutdown(&self) -> Result<(), BubError> {
        self.cache.persist(&self.dirs.dependency_cache_path())?;
        info!(
            seen = self.counts.seen,
            built = self.counts.built,
            updated = self.counts.updated,
            outstanding = self.files.outstanding.len(),
            "build finished"
        );
        Ok(())
    }

    pub fn register_file(&mut self, mut file: File) -> FileId {
        self.counts.seen += 1;
        file.number = self.files.next_number();
        if file.built {
            self.all_built.insert(file.path.clone());
        }
        let id = self.files.insert(file);
        id
    }
}

fn sweep_dir(dir: &Path, keep: &HashSet<PathBuf>) -> std::io::Result<bool> {
    let mut is_empty = true;
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if path.is_dir() {
            if sweep_dir(&path, keep)? {
                let _ = fs::remove_dir(&path);
            } else {
                is_empty = false;
            }
        } else if !keep.contains(&path) {
            debug!(?path, "cleanup: removing stale build output");
            let _ = fs::remove_file(&path);
        } else {
            is_empty = false;
        }
    }
    Ok(is_empty)
}
