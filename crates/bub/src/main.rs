//! `bub`: argument parsing, logging initialization, signal handling, and
//! wiring `bub-common` + `bub-core` + `bub-worker` together (`spec.md` §4.7,
//! §5, §6; `SPEC_FULL.md` §2). Mirrors the teacher's `crates/moon/src/main.rs`
//! shape: a thin `main` that initializes logging then delegates to a
//! `main1` returning a process exit code.

use std::collections::HashSet;

use clap::Parser;

mod cli;
mod signal_handler;

use cli::{BubCli, BubCommand};

fn main() {
    let cli = BubCli::parse();
    bub_common::logging::init(cli.verbose);
    std::process::exit(match main1(cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {e:?}");
            1
        }
    });
}

/// Exit codes per `spec.md` §6: 0 success, 1 build failure (outstanding
/// files remain or an action/scheduler error occurred), 2 invalid usage
/// (handled by `clap` itself before `main1` is ever reached).
fn main1(cli: BubCli) -> anyhow::Result<i32> {
    let conditionals: HashSet<String> = cli.conditionals.into_iter().collect();
    let mut planner = bub_core::Planner::load(cli.build_dir, conditionals)?;

    if matches!(cli.command, Some(BubCommand::Clean)) {
        planner.shutdown()?;
        return Ok(0);
    }

    let jobs = cli
        .jobs
        .unwrap_or_else(|| std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1));

    let registry = bub_worker::ChildRegistry::new();
    signal_handler::install(registry.clone())?;
    let pool = bub_worker::WorkerPool::spawn(jobs, planner.dirs.tmp(), registry);

    let run_result = planner.run(&pool);
    pool.shutdown_all();
    planner.shutdown()?;

    match run_result {
        Ok(()) => Ok(0),
        Err(e) => {
            eprintln!("error: {e}");
            Ok(1)
        }
    }
}
