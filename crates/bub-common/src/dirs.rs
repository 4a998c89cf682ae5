//! The directory layout of a build tree (`spec.md` §6).
//!
//! ```text
//! <build>/obj/<pkg-trail>/…      intermediate objects and private artifacts
//! <build>/priv/<pkg-trail>/…     private executables, test results
//! <build>/dist/lib/…             public libs (static and dynamic)
//! <build>/dist/bin/…             dist-exes
//! <build>/dist/include/…         exported public source headers
//! <build>/tmp/<worker-id>/…      per-worker scratch
//! <build>/src/                   symlinks to source roots
//! ```
//!
//! `bub` itself never creates `<build>/src/` -- that's the bootstrap tool's
//! contract -- but it owns every other subtree exclusively and is free to
//! delete and recreate anything under them.

use std::io;
use std::path::{Path, PathBuf};

pub const DEPENDENCY_CACHE_FILE: &str = "dependency-cache";

/// The subtrees the build exclusively owns and may freely delete/recreate.
pub const OWNED_SUBTREES: &[&str] = &["obj", "priv", "dist", "tmp"];

/// Resolved paths within one build directory.
#[derive(Debug, Clone)]
pub struct BuildDirs {
    root: PathBuf,
}

impl BuildDirs {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn src(&self) -> PathBuf {
        self.root.join("src")
    }

    pub fn obj(&self) -> PathBuf {
        self.root.join("obj")
    }

    pub fn private(&self) -> PathBuf {
        self.root.join("priv")
    }

    pub fn dist(&self) -> PathBuf {
        self.root.join("dist")
    }

    pub fn dist_lib(&self) -> PathBuf {
        self.dist().join("lib")
    }

    pub fn dist_bin(&self) -> PathBuf {
        self.dist().join("bin")
    }

    pub fn dist_include(&self) -> PathBuf {
        self.dist().join("include")
    }

    pub fn tmp(&self) -> PathBuf {
        self.root.join("tmp")
    }

    pub fn worker_scratch(&self, worker_id: usize) -> PathBuf {
        self.tmp().join(format!("worker-{worker_id}"))
    }

    pub fn dependency_cache_path(&self) -> PathBuf {
        self.root.join(DEPENDENCY_CACHE_FILE)
    }

    /// The options file written by the bootstrap tool (`spec.md` §6).
    pub fn options_path(&self) -> PathBuf {
        self.root.join("options")
    }

    /// The three subtrees swept by the cleanup pass (`spec.md` §4.7). `tmp`
    /// is excluded: it's per-worker scratch, not build output.
    pub fn cleanup_roots(&self) -> [PathBuf; 3] {
        [self.obj(), self.private(), self.dist()]
    }
}

/// Create every ancestor directory of `path` if it does not already exist.
///
/// Named after the source's `ensureParent` (`spec.md` §5): every write to a
/// build-tree path goes through this first so path creation is idempotent.
pub fn ensure_parent(path: &Path) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    Ok(())
}
