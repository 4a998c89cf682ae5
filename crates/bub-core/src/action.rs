//! The Action graph: typed build steps, the declaration-order priority
//! queue, and the generator fence (`spec.md` §3, §4.4).

use std::cmp::Reverse;
use std::collections::{BTreeSet, BinaryHeap, HashMap, HashSet};
use std::path::PathBuf;
use std::time::SystemTime;

use arcstr::ArcStr;
use slotmap::SlotMap;

use bub_common::Origin;

use crate::file::FileId;

slotmap::new_key_type! {
    /// A stable handle to an [`Action`].
    pub struct ActionId;
}

#[derive(Debug, Clone)]
pub struct Action {
    pub origin: Origin,
    pub name: ArcStr,
    pub command_template: String,
    pub number: u64,
    pub inputs: HashSet<FileId>,
    /// Non-empty; `builds.len() > 1` freezes the action against further
    /// `add_dependency` calls (`spec.md` §3).
    pub builds: Vec<FileId>,
    pub depends: HashSet<FileId>,
    /// Max system-file modTime learnt from the dependency cache.
    pub newest: Option<SystemTime>,
    /// Set when a cached dependency path didn't resolve to a known File;
    /// models the spec's `newest = +infinity` maximal-dirtiness sentinel
    /// (`spec.md` §4.4, §7).
    pub maximally_dirty: bool,
    /// The resolved `${LIBS}` substitution, filled in by the library
    /// inference pass just before issue (`spec.md` §4.6).
    pub resolved_libs: Vec<String>,
    pub issued: bool,
    pub done: bool,
    /// Whether this action produces source-kind outputs rather than a
    /// single `.obj` (`spec.md` §4.4 "generator fence").
    pub is_generator: bool,
    /// Unique per-action path the command writes discovered dependencies to.
    pub deps_path: PathBuf,
}

impl Action {
    /// `addDependency(file)` (`spec.md` §4.4): permitted only when
    /// `builds.len() == 1` and the action has not yet been issued.
    /// Adding an existing dependency is a no-op. Returns `false` if the
    /// call is not permitted.
    pub fn add_dependency(&mut self, file: FileId) -> bool {
        if self.builds.len() != 1 || self.issued {
            return false;
        }
        self.depends.insert(file);
        true
    }
}

/// The Action arena, its name index, declaration-order priority queue, and
/// generator fence tracking (`spec.md` §3, §4.4, §9).
#[derive(Debug, Clone, Default)]
pub struct ActionTable {
    actions: SlotMap<ActionId, Action>,
    by_name: HashMap<ArcStr, ActionId>,
    next_number: u64,
    ready: BinaryHeap<Reverse<(u64, ActionId)>>,
    /// Action numbers of not-yet-completed generator actions, in order; the
    /// fence is the smallest element (`spec.md` §4.4).
    pending_generators: BTreeSet<u64>,
}

impl ActionTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_number(&mut self) -> u64 {
        let n = self.next_number;
        self.next_number += 1;
        n
    }

    pub fn insert(&mut self, action: Action) -> ActionId {
        let name = action.name.clone();
        let number = action.number;
        let is_generator = action.is_generator;
        let id = self.actions.insert(action);
        self.by_name.insert(name, id);
        if is_generator {
            self.pending_generators.insert(number);
        }
        id
    }

    pub fn get(&self, id: ActionId) -> &Action {
        &self.actions[id]
    }

    pub fn get_mut(&mut self, id: ActionId) -> &mut Action {
        &mut self.actions[id]
    }

    pub fn by_name(&self, name: &str) -> Option<ActionId> {
        self.by_name.get(name).copied()
    }

    /// The lower bound on action numbers eligible for issue: the number of
    /// the earliest not-yet-completed generator, or `u64::MAX` if none are
    /// pending (`spec.md` §4.4).
    pub fn fence(&self) -> u64 {
        self.pending_generators.iter().next().copied().unwrap_or(u64::MAX)
    }

    pub fn may_issue(&self, number: u64) -> bool {
        number <= self.fence()
    }

    /// Enqueue an action as ready to dispatch. Respects the generator
    /// fence only at dequeue time so the queue always reflects true
    /// readiness order.
    pub fn enqueue(&mut self, id: ActionId) {
        let number = self.actions[id].number;
        self.ready.push(Reverse((number, id)));
    }

    /// Pop the lowest-numbered ready action that is within the generator
    /// fence, if any. Actions beyond the fence are requeued so they surface
    /// again once the fence advances.
    pub fn dequeue_ready(&mut self) -> Option<ActionId> {
        let mut deferred = Vec::new();
        let mut result = None;
        while let Some(Reverse((number, id))) = self.ready.pop() {
            if number <= self.fence() {
                result = Some(id);
                break;
            } else {
                deferred.push(Reverse((number, id)));
            }
        }
        for item in deferred {
            self.ready.push(item);
        }
        result
    }

    pub fn has_ready(&self) -> bool {
        !self.ready.is_empty()
    }

    /// Mark a generator action's File as complete, advancing the fence.
    pub fn complete_generator(&mut self, number: u64) {
        self.pending_generators.remove(&number);
    }

    pub fn ids(&self) -> impl Iterator<Item = ActionId> + '_ {
        self.actions.keys()
    }
}
