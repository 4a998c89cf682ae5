//! End-to-end smoke tests that run the real `bub` binary against a throwaway
//! build directory with trivial (`cat`-based) compile/link commands, so the
//! test exercises the full CLI -> Planner -> worker pool path without
//! needing a real C toolchain (`spec.md` §8 scenario 1 "cold build",
//! `SPEC_FULL.md` §3.4).

use std::fs;
use std::path::Path;
use std::process::Command;

fn write_tree(root: &Path) {
    fs::create_dir_all(root.join("src")).unwrap();
    fs::write(
        root.join("options"),
        ".c.obj = cat ${INPUT} > ${OUTPUT}\n.o.exe = cat ${INPUT} > ${OUTPUT}\n",
    )
    .unwrap();
    fs::write(root.join("src").join("Bubfile"), "dist-exe hello : hello.c;\n").unwrap();
    fs::write(root.join("src").join("hello.c"), "int main(void) { return 0; }\n").unwrap();
}

#[test]
fn cold_build_produces_dist_exe() {
    let dir = tempfile::tempdir().unwrap();
    write_tree(dir.path());

    let status = Command::new(env!("CARGO_BIN_EXE_bub"))
        .arg(dir.path())
        .status()
        .expect("failed to run bub");
    assert!(status.success(), "bub should exit 0 on a clean cold build");

    let built = dir.path().join("dist").join("bin").join("hello");
    assert!(built.exists(), "expected dist-exe output at {built:?}");
}

#[test]
fn second_run_is_a_no_op_rebuild() {
    let dir = tempfile::tempdir().unwrap();
    write_tree(dir.path());

    for _ in 0..2 {
        let status = Command::new(env!("CARGO_BIN_EXE_bub"))
            .arg(dir.path())
            .status()
            .expect("failed to run bub");
        assert!(status.success());
    }

    assert!(dir.path().join("dist").join("bin").join("hello").exists());
}

#[test]
fn clean_subcommand_sweeps_stale_outputs_without_scheduling() {
    let dir = tempfile::tempdir().unwrap();
    write_tree(dir.path());
    fs::create_dir_all(dir.path().join("obj")).unwrap();
    fs::write(dir.path().join("obj").join("stale.o"), b"leftover from a prior run").unwrap();

    let status = Command::new(env!("CARGO_BIN_EXE_bub"))
        .arg(dir.path())
        .arg("clean")
        .status()
        .expect("failed to run bub clean");
    assert!(status.success());

    assert!(
        !dir.path().join("obj").join("stale.o").exists(),
        "clean should sweep files not in this run's allBuilt set"
    );
    assert!(
        !dir.path().join("dist").join("bin").join("hello").exists(),
        "clean must not run the scheduler"
    );
}

#[test]
fn invalid_build_dir_fails_without_panicking() {
    let dir = tempfile::tempdir().unwrap();
    // No `options` file written: the Planner should fail with a clean error,
    // not a panic.
    let status = Command::new(env!("CARGO_BIN_EXE_bub"))
        .arg(dir.path())
        .status()
        .expect("failed to run bub");
    assert!(!status.success());
}
