//! Turns parsed Bubfile [`Statement`]s into Nodes, Files, Binaries, and
//! Actions (`spec.md` §4.2-§4.6).
//!
//! One `impl Planner` block per concern: [`Planner::process_package`] reads
//! and dispatches a package's statements; the `rule_*` methods build the
//! Node/Binary/Action graph for one recognized rule each; [`check_may_depend`]
//! is the free function behind visibility question 3 (`spec.md` §4.3).

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use arcstr::ArcStr;

use bub_common::{options::LinkKind, Origin};

use crate::action::Action;
use crate::binary::{Binary, BinaryId, BinaryKind, ExeFlavor};
use crate::bubfile::{parse_statements, Statement};
use crate::error::{BubError, ConfigError, RuleViolation, UnknownEntity};
use crate::file::{File, FileId, FileKind, FileState, FileTable};
use crate::node::{NodeId, Privacy, Tree};
use crate::planner::Planner;

const BUBFILE_NAME: &str = "Bubfile";

impl Planner {
    /// Read and dispatch `dir`'s Bubfile, recursing into any `contain`ed
    /// sub-packages (`spec.md` §4.2, §4.7).
    pub fn process_package(&mut self, node: NodeId, dir: &Path) -> Result<(), BubError> {
        let bubfile_path = dir.join(BUBFILE_NAME);
        let text = fs::read_to_string(&bubfile_path)?;

        let bubfile_id = self.register_file(File {
            path: bubfile_path.clone(),
            number: 0,
            built: false,
            mod_time: fs::metadata(&bubfile_path).ok().and_then(|m| m.modified().ok()),
            action: None,
            depended_by: HashSet::new(),
            used: true,
            augmented: false,
            state: FileState::UpToDate,
            kind: FileKind::Source,
            owner: node,
            depends: HashSet::new(),
        });
        self.package_bubfile.insert(node, bubfile_id);

        let vars = self.options.variables.clone();
        let lookup = |name: &str| vars.get(name).cloned();
        let statements = parse_statements(&bubfile_path, &text, &self.conditionals, &lookup)?;

        for stmt in statements {
            self.dispatch_statement(node, dir, &stmt)?;
        }
        Ok(())
    }

    fn dispatch_statement(&mut self, node: NodeId, dir: &Path, stmt: &Statement) -> Result<(), BubError> {
        match stmt.rule.as_str() {
            "contain" => self.rule_contain(node, dir, stmt),
            "static-lib" | "public-lib" => self.rule_lib(node, dir, stmt, stmt.rule == "public-lib"),
            "dynamic-lib" => self.rule_dynamic_lib(node, stmt),
            "dist-exe" => self.rule_exe(node, dir, stmt, ExeFlavor::Dist),
            "priv-exe" => self.rule_exe(node, dir, stmt, ExeFlavor::Priv),
            "test-exe" => self.rule_exe(node, dir, stmt, ExeFlavor::Test),
            "misc" => self.rule_misc(node, dir, stmt),
            "generate" => self.rule_generate(node, dir, stmt),
            other => Err(ConfigError::UnknownRule(stmt.origin.clone(), other.to_string()).into()),
        }
    }

    fn rule_contain(&mut self, node: NodeId, dir: &Path, stmt: &Statement) -> Result<(), BubError> {
        let privacy = match stmt.args.first().and_then(|a| a.first()) {
            Some(p) => parse_privacy(&stmt.origin, p)?,
            None => Privacy::Public,
        };
        for target in &stmt.targets {
            let child = self.tree.create_child(&stmt.origin, node, target, privacy)?;
            self.process_package(child, &dir.join(target))?;
        }
        Ok(())
    }

    fn rule_lib(&mut self, node: NodeId, dir: &Path, stmt: &Statement, public: bool) -> Result<(), BubError> {
        let name = first_target(stmt)?;
        let public_src = stmt.args.first().cloned().unwrap_or_default();
        let protected_src = stmt.args.get(1).cloned().unwrap_or_default();
        let sys_libs = stmt.args.get(2).cloned().unwrap_or_default();

        let trail = self.tree.get(node).trail.clone();
        let file_name = format!("lib{}-s.a", slug(&trail, name));
        let built_path = if public {
            self.dirs.dist_lib().join(&file_name)
        } else {
            self.dirs.obj().join(trail.as_str()).join(&file_name)
        };
        let binary = self.create_binary(node, BinaryKind::StaticLib { public }, name, built_path);

        for lib in &sys_libs {
            let n = self.sys_libs.intern(lib);
            self.binaries.get_mut(binary).required_sys_libs.push(n);
        }
        for src in &public_src {
            self.compile_source(node, dir, binary, &stmt.origin, src, true)?;
        }
        for src in &protected_src {
            self.compile_source(node, dir, binary, &stmt.origin, src, false)?;
        }
        if self.binaries.get(binary).objs.is_empty() {
            tracing::warn!(%name, "static-lib has no compiled objects");
        }

        self.link_binary(node, binary, &stmt.origin, LinkKind::StaticLib)
    }

    fn rule_dynamic_lib(&mut self, node: NodeId, stmt: &Statement) -> Result<(), BubError> {
        let name = first_target(stmt)?;
        let trails = stmt.args.first().cloned().unwrap_or_default();

        let trail = self.tree.get(node).trail.clone();
        let built_path = self.dirs.dist_lib().join(format!("lib{}.so", slug(&trail, name)));
        let dlib = self.create_binary(node, BinaryKind::DynamicLib, name, built_path);

        let mut objs = Vec::new();
        for static_name in &trails {
            let Some(static_bin) = self.binaries.ids().find(|b| {
                let bin = self.binaries.get(*b);
                matches!(bin.kind, BinaryKind::StaticLib { .. }) && bin.name.as_str() == static_name.as_str()
            }) else {
                return Err(UnknownEntity::UnknownStaticLibTrail(stmt.origin.clone(), static_name.clone()).into());
            };
            self.binaries.register_dynamic_lib_content(&stmt.origin, dlib, static_bin)?;
            objs.extend(self.binaries.get(static_bin).objs.iter().copied());
            for lib in self.binaries.get(static_bin).required_sys_libs.clone() {
                self.binaries.get_mut(dlib).required_sys_libs.push(lib);
            }
        }
        self.binaries.get_mut(dlib).objs = objs;

        self.link_binary(node, dlib, &stmt.origin, LinkKind::DynamicLib)
    }

    fn rule_exe(&mut self, node: NodeId, dir: &Path, stmt: &Statement, flavor: ExeFlavor) -> Result<(), BubError> {
        let name = first_target(stmt)?;
        let sources = stmt.args.first().cloned().unwrap_or_default();
        let sys_libs = stmt.args.get(1).cloned().unwrap_or_default();

        let trail = self.tree.get(node).trail.clone();
        let built_path = match flavor {
            ExeFlavor::Dist => self.dirs.dist_bin().join(name),
            ExeFlavor::Priv | ExeFlavor::Test => self.dirs.private().join(trail.as_str()).join(name),
        };
        let binary = self.create_binary(node, BinaryKind::Exe(flavor), name, built_path);

        for lib in &sys_libs {
            let n = self.sys_libs.intern(lib);
            self.binaries.get_mut(binary).required_sys_libs.push(n);
        }
        for src in &sources {
            self.compile_source(node, dir, binary, &stmt.origin, src, false)?;
        }

        self.link_binary(node, binary, &stmt.origin, LinkKind::Exe)?;

        // `test-exe name : sources : sys-libs : timeout : runtime-deps` -- only
        // the fourth field (runtime-deps) changes the dependency graph; the
        // timeout is scheduling metadata outside the Planner's data model.
        if matches!(flavor, ExeFlavor::Test) {
            if let Some(runtime_deps) = stmt.args.get(3) {
                let built = self.binaries.get(binary).built_file;
                for dep in runtime_deps {
                    let dep_path = dir.join(dep);
                    let Some(dep_id) = self.files.by_path(&dep_path) else {
                        continue;
                    };
                    self.files.get_mut(built).depends.insert(dep_id);
                    self.files.get_mut(dep_id).depended_by.insert(built);
                    if let Some(action_id) = self.files.get(built).action {
                        self.actions.get_mut(action_id).add_dependency(dep_id);
                    }
                }
            }
        }
        Ok(())
    }

    /// `misc targets [: dest-dir]` (`spec.md` §4.2): a source-extension-
    /// agnostic copy of each named target into the build tree. The spec
    /// leaves the transfer mechanism unspecified; a plain `cp` template is
    /// the simplest faithful rendition (see `DESIGN.md`).
    fn rule_misc(&mut self, node: NodeId, dir: &Path, stmt: &Statement) -> Result<(), BubError> {
        let dest_dir_arg = stmt.args.first().and_then(|a| a.first()).cloned();
        let bubfile = self.package_bubfile.get(&node).copied();
        let trail = self.tree.get(node).trail.clone();

        for target in &stmt.targets {
            let src_path = dir.join(target);
            let src_id = self.intern_plain_file(node, &src_path);

            let dest_base = dest_dir_arg
                .as_deref()
                .map(|d| self.dirs.root().join(d))
                .unwrap_or_else(|| self.dirs.private().join(trail.as_str()));
            let dest_path = dest_base.join(target);

            let mut depends = HashSet::new();
            depends.insert(src_id);
            if let Some(bf) = bubfile {
                depends.insert(bf);
            }

            let dest_id = self.register_file(File {
                path: dest_path.clone(),
                number: 0,
                built: true,
                mod_time: fs::metadata(&dest_path).ok().and_then(|m| m.modified().ok()),
                action: None,
                depended_by: HashSet::new(),
                used: false,
                augmented: false,
                state: FileState::DependsPending,
                kind: FileKind::Generated,
                owner: node,
                depends: depends.clone(),
            });
            for d in &depends {
                self.files.get_mut(*d).depended_by.insert(dest_id);
            }

            let number = self.actions.next_number();
            let deps_path = self.dirs.tmp().join(format!("DEPENDENCIES-{number}"));
            let mut inputs = HashSet::new();
            inputs.insert(src_id);
            let action_id = self.actions.insert(Action {
                origin: stmt.origin.clone(),
                name: ArcStr::from(format!("misc:{}", dest_path.display())),
                command_template: "cp ${INPUT} ${OUTPUT}".to_string(),
                number,
                inputs,
                builds: vec![dest_id],
                depends,
                newest: None,
                maximally_dirty: false,
                resolved_libs: Vec::new(),
                issued: false,
                done: false,
                is_generator: false,
                deps_path,
            });
            self.files.get_mut(dest_id).action = Some(action_id);
            self.seed_action_from_cache(action_id, dest_id);
        }
        Ok(())
    }

    /// `generate target : command : inputs [: dest-dir]` (`spec.md` §4.2):
    /// `command` names an `options.generate` entry; its `outputs` suffixes
    /// are combined with `target` to produce every built File, all from one
    /// command invocation, which makes this action a generator for fence
    /// purposes (`spec.md` §4.4).
    fn rule_generate(&mut self, node: NodeId, dir: &Path, stmt: &Statement) -> Result<(), BubError> {
        let target = first_target(stmt)?;
        let Some(command_key) = stmt.args.first().and_then(|a| a.first()) else {
            return Err(
                ConfigError::MalformedStatement(stmt.origin.clone(), "generate requires a command field".into())
                    .into(),
            );
        };
        let inputs_rel = stmt.args.get(1).cloned().unwrap_or_default();
        let dest_dir_arg = stmt.args.get(2).and_then(|a| a.first()).cloned();

        let Some(gen) = self.options.generate.get(command_key).cloned() else {
            return Err(ConfigError::UnknownRule(stmt.origin.clone(), format!(".{command_key}.*")).into());
        };

        let bubfile = self.package_bubfile.get(&node).copied();
        let mut inputs = HashSet::new();
        let mut depends = HashSet::new();
        if let Some(bf) = bubfile {
            depends.insert(bf);
        }
        for rel in &inputs_rel {
            let id = self.intern_plain_file(node, &dir.join(rel));
            inputs.insert(id);
            depends.insert(id);
        }

        let trail = self.tree.get(node).trail.clone();
        let dest_base = dest_dir_arg
            .as_deref()
            .map(|d| self.dirs.root().join(d))
            .unwrap_or_else(|| self.dirs.obj().join(trail.as_str()));

        let number = self.actions.next_number();
        let deps_path = self.dirs.tmp().join(format!("DEPENDENCIES-{number}"));
        let mut builds = Vec::new();
        for suffix in &gen.outputs {
            let out_path = dest_base.join(format!("{target}.{suffix}"));
            let mod_time = fs::metadata(&out_path).ok().and_then(|m| m.modified().ok());
            builds.push(self.register_file(File {
                path: out_path,
                number: 0,
                built: true,
                mod_time,
                action: None,
                depended_by: HashSet::new(),
                used: false,
                augmented: false,
                state: FileState::DependsPending,
                kind: FileKind::Generated,
                owner: node,
                depends: depends.clone(),
            }));
        }
        for d in &depends {
            for b in &builds {
                self.files.get_mut(*d).depended_by.insert(*b);
            }
        }

        let action_id = self.actions.insert(Action {
            origin: stmt.origin.clone(),
            name: ArcStr::from(format!("generate:{target}")),
            command_template: gen.template,
            number,
            inputs,
            builds: builds.clone(),
            depends,
            newest: None,
            maximally_dirty: false,
            resolved_libs: Vec::new(),
            issued: false,
            done: false,
            is_generator: true,
            deps_path,
        });
        for b in &builds {
            self.files.get_mut(*b).action = Some(action_id);
        }
        if let Some(&first_build) = builds.first() {
            self.seed_action_from_cache(action_id, first_build);
        }
        Ok(())
    }

    fn create_binary(&mut self, node: NodeId, kind: BinaryKind, name: &str, built_path: PathBuf) -> BinaryId {
        let number = self.binaries.next_number();
        let file_kind = match kind {
            BinaryKind::StaticLib { .. } => FileKind::StaticLibFile,
            BinaryKind::DynamicLib => FileKind::DynamicLibFile,
            BinaryKind::Exe(_) => FileKind::ExeFile,
        };
        let mod_time = fs::metadata(&built_path).ok().and_then(|m| m.modified().ok());
        let built_file = self.register_file(File {
            path: built_path,
            number: 0,
            built: true,
            mod_time,
            action: None,
            depended_by: HashSet::new(),
            used: false,
            augmented: false,
            state: FileState::DependsPending,
            kind: file_kind,
            owner: node,
            depends: HashSet::new(),
        });
        self.binaries.insert(Binary {
            kind,
            name: ArcStr::from(name),
            number,
            owner: node,
            built_file,
            sources: Vec::new(),
            objs: Vec::new(),
            required_sys_libs: Vec::new(),
            source_ext: None,
            public_sources: HashSet::new(),
            static_lib_contents: Vec::new(),
        })
    }

    /// Register `name` as a source of `binary`: claim it, compile it if its
    /// extension owns a compile command, and wire the resulting object's
    /// scanned-include depends (`spec.md` §3 "Binary", §4.4).
    fn compile_source(
        &mut self,
        node: NodeId,
        dir: &Path,
        binary: BinaryId,
        origin: &Origin,
        rel_name: &str,
        public: bool,
    ) -> Result<FileId, BubError> {
        let src_path = dir.join(rel_name);
        let ext = ext_of(&src_path);
        check_and_set_source_ext(self.binaries.get_mut(binary), origin, &ext)?;

        let src_id = self.intern_plain_file(node, &src_path);
        self.binaries.claim_content(origin, binary, src_id)?;
        self.binaries.get_mut(binary).sources.push(src_id);
        if public {
            self.binaries.get_mut(binary).public_sources.insert(src_id);
        }

        let Some(compile_template) = self.options.compile.get(&ext).cloned() else {
            // A header contributes to the visibility graph but produces no object.
            return Ok(src_id);
        };

        let bubfile = self.package_bubfile.get(&node).copied();
        let text = fs::read_to_string(&src_path).unwrap_or_default();
        let mut depends = HashSet::new();
        depends.insert(src_id);
        if let Some(bf) = bubfile {
            depends.insert(bf);
        }
        for inc in crate::scan::scan_file(&src_path, &text, &self.external_modules) {
            let inc_path = self.dirs.src().join(&inc);
            let Some(inc_id) = self.files.by_path(&inc_path) else {
                return Err(UnknownEntity::UnknownInclude(origin.clone(), rel_name.to_string(), inc).into());
            };
            check_may_depend(origin, &self.tree, &self.files, src_id, inc_id)?;
            depends.insert(inc_id);
        }

        let trail = self.tree.get(node).trail.clone();
        let obj_path = self.dirs.obj().join(trail.as_str()).join(stem_with_ext(&src_path, "o"));
        let mod_time = fs::metadata(&obj_path).ok().and_then(|m| m.modified().ok());
        let obj_id = self.register_file(File {
            path: obj_path,
            number: 0,
            built: true,
            mod_time,
            action: None,
            depended_by: HashSet::new(),
            used: true,
            augmented: false,
            state: FileState::DependsPending,
            kind: FileKind::Generated,
            owner: node,
            depends: depends.clone(),
        });
        for d in &depends {
            self.files.get_mut(*d).depended_by.insert(obj_id);
        }
        self.binaries.claim_content(origin, binary, obj_id)?;
        self.binaries.get_mut(binary).objs.push(obj_id);

        let number = self.actions.next_number();
        let action_name = format!("compile:{}", self.files.get(obj_id).path.display());
        let deps_path = self.dirs.tmp().join(format!("DEPENDENCIES-{number}"));
        let mut inputs = HashSet::new();
        inputs.insert(src_id);
        let action_id = self.actions.insert(Action {
            origin: origin.clone(),
            name: ArcStr::from(action_name),
            command_template: compile_template,
            number,
            inputs,
            builds: vec![obj_id],
            depends,
            newest: None,
            maximally_dirty: false,
            resolved_libs: Vec::new(),
            issued: false,
            done: false,
            is_generator: false,
            deps_path,
        });
        self.files.get_mut(obj_id).action = Some(action_id);
        self.seed_action_from_cache(action_id, obj_id);
        Ok(src_id)
    }

    /// Construct the single link/archive Action that produces a Binary's
    /// `built_file` from its accumulated `objs` (`spec.md` §4.4).
    fn link_binary(&mut self, node: NodeId, binary: BinaryId, origin: &Origin, kind: LinkKind) -> Result<(), BubError> {
        let Some(template) = self.options.link.get(&(kind, "o".to_string())).cloned() else {
            return Err(ConfigError::MalformedStatement(
                origin.clone(),
                format!("no link command configured for .o.{kind}"),
            )
            .into());
        };
        let b = self.binaries.get(binary);
        let built_file = b.built_file;
        let objs = b.objs.clone();
        let bubfile = self.package_bubfile.get(&node).copied();

        let inputs: HashSet<FileId> = objs.iter().copied().collect();
        let mut depends = inputs.clone();
        if let Some(bf) = bubfile {
            depends.insert(bf);
        }

        self.files.get_mut(built_file).depends = depends.clone();
        for d in &depends {
            self.files.get_mut(*d).depended_by.insert(built_file);
        }

        let number = self.actions.next_number();
        let action_name = format!("link:{}", self.files.get(built_file).path.display());
        let deps_path = self.dirs.tmp().join(format!("DEPENDENCIES-{number}"));
        let action_id = self.actions.insert(Action {
            origin: origin.clone(),
            name: ArcStr::from(action_name),
            command_template: template,
            number,
            inputs,
            builds: vec![built_file],
            depends,
            newest: None,
            maximally_dirty: false,
            resolved_libs: Vec::new(),
            issued: false,
            done: false,
            is_generator: false,
            deps_path,
        });
        self.files.get_mut(built_file).action = Some(action_id);
        self.seed_action_from_cache(action_id, built_file);
        Ok(())
    }

    /// Look up an already-registered File at `path`, or register a new
    /// not-built one owned by `node`.
    fn intern_plain_file(&mut self, node: NodeId, path: &Path) -> FileId {
        if let Some(id) = self.files.by_path(path) {
            return id;
        }
        self.register_file(File {
            path: path.to_path_buf(),
            number: 0,
            built: false,
            mod_time: fs::metadata(path).ok().and_then(|m| m.modified().ok()),
            action: None,
            depended_by: HashSet::new(),
            used: true,
            augmented: false,
            state: FileState::UpToDate,
            kind: FileKind::Source,
            owner: node,
            depends: HashSet::new(),
        })
    }

    /// Seed an Action's `newest`/`maximally_dirty`/depends from the
    /// persisted dependency cache entry for `builds[0]` (`spec.md` §4.4).
    fn seed_action_from_cache(&mut self, action_id: crate::action::ActionId, built: FileId) {
        let path = self.files.get(built).path.clone();
        let Some(cached) = self.cache.get(&path).cloned() else {
            return;
        };
        let mut newest = None;
        let mut dirty = false;
        let mut new_depends = Vec::new();
        for dep_path in &cached {
            if let Some(id) = self.files.by_path(dep_path) {
                new_depends.push(id);
                continue;
            }
            if dep_path.is_absolute() {
                // Untracked external dependency (e.g. a system header): no
                // File identity to attach to, but its mtime still counts.
                if let Ok(mtime) = fs::metadata(dep_path).and_then(|m| m.modified()) {
                    newest = Some(newest.map_or(mtime, |n: std::time::SystemTime| n.max(mtime)));
                }
                continue;
            }
            dirty = true;
        }
        for d in new_depends {
            if self.actions.get_mut(action_id).add_dependency(d) {
                self.files.get_mut(built).depends.insert(d);
                self.files.get_mut(d).depended_by.insert(built);
            }
        }
        let action = self.actions.get_mut(action_id);
        action.newest = newest;
        if dirty {
            action.maximally_dirty = true;
        }
    }
}

fn first_target(stmt: &Statement) -> Result<&str, BubError> {
    stmt.targets
        .first()
        .map(String::as_str)
        .ok_or_else(|| ConfigError::WrongFieldCount(stmt.origin.clone(), stmt.rule.clone(), 1, stmt.targets.len()).into())
}

fn parse_privacy(origin: &Origin, s: &str) -> Result<Privacy, BubError> {
    match s {
        "public" => Ok(Privacy::Public),
        "protected" => Ok(Privacy::Protected),
        "private" => Ok(Privacy::Private),
        other => Err(ConfigError::MalformedStatement(origin.clone(), format!("unknown privacy {other:?}")).into()),
    }
}

fn ext_of(path: &Path) -> String {
    path.extension().and_then(|e| e.to_str()).unwrap_or("").to_string()
}

/// The "language family" used for source-extension compatibility
/// (`spec.md` §3): `.c`/`.h` mix freely with anything; every other
/// extension must agree with the binary's established family.
fn family_of(ext: &str) -> &'static str {
    match ext {
        "cpp" | "cc" | "cxx" | "hpp" | "hh" | "hxx" => "cpp",
        "d" => "d",
        _ => "other",
    }
}

fn check_and_set_source_ext(binary: &mut crate::binary::Binary, origin: &Origin, ext: &str) -> Result<(), BubError> {
    if ext == "c" || ext == "h" {
        return Ok(());
    }
    let family = family_of(ext);
    match &binary.source_ext {
        None => {
            binary.source_ext = Some(family.to_string());
            Ok(())
        }
        Some(sig) if sig == family => Ok(()),
        Some(sig) => Err(RuleViolation::MismatchedSourceExtension(
            origin.clone(),
            binary.name.to_string(),
            ext.to_string(),
            sig.clone(),
        )
        .into()),
    }
}

fn stem_with_ext(path: &Path, ext: &str) -> String {
    format!("{}.{ext}", path.file_stem().and_then(|s| s.to_str()).unwrap_or("out"))
}

fn slug(trail: &str, name: &str) -> String {
    if trail.is_empty() {
        name.to_string()
    } else {
        format!("{}-{name}", trail.replace('/', "-"))
    }
}

/// "May file A depend on file B?" (`spec.md` §4.3 question 3): forward
/// declaration order unless B's package is nested under A's; A's package may
/// not itself be a descendant of B's package; B must be visible from their
/// common ancestor.
pub fn check_may_depend(
    origin: &Origin,
    tree: &Tree,
    files: &FileTable,
    a: FileId,
    b: FileId,
) -> Result<(), RuleViolation> {
    let file_a = files.get(a);
    let file_b = files.get(b);
    let a_pkg = file_a.owner;
    let b_pkg = file_b.owner;

    if !(file_a.number > file_b.number || tree.is_descendant(b_pkg, a_pkg)) {
        return Err(RuleViolation::ForwardReference(
            origin.clone(),
            file_a.path.display().to_string(),
            file_a.number,
            file_b.path.display().to_string(),
            file_b.number,
        ));
    }

    if a_pkg != b_pkg && tree.is_descendant(a_pkg, b_pkg) {
        return Err(RuleViolation::PackageDescendantDependency(
            origin.clone(),
            file_a.path.display().to_string(),
            file_b.path.display().to_string(),
        ));
    }

    let common = tree.common_ancestor(a_pkg, b_pkg);
    if !tree.is_visible_from(b_pkg, common) {
        return Err(RuleViolation::VisibilityBreach {
            origin: origin.clone(),
            dependent: file_a.path.display().to_string(),
            dependency: file_b.path.display().to_string(),
            common_ancestor: tree.get(common).trail.to_string(),
        });
    }
    Ok(())
}
