//! Argument parsing (`spec.md` §6, `SPEC_FULL.md` §3.3), mirroring the
//! shape of the teacher's `crates/moon/src/cli.rs`: one `clap` derive tree,
//! flags on the top-level struct, subcommands kept to the bare minimum this
//! binary actually needs.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "bub", version, about = "A bottom-up native-code build planner")]
pub struct BubCli {
    /// Root of the build directory (expects `options` and `src/` beneath it).
    #[arg(default_value = ".")]
    pub build_dir: PathBuf,

    /// Number of worker threads. Defaults to the number of logical CPUs.
    #[arg(short = 'j', long = "jobs", value_name = "N")]
    pub jobs: Option<usize>,

    /// Enable debug-level logging (equivalent to `RUST_LOG=debug`).
    #[arg(short, long)]
    pub verbose: bool,

    /// Activate a Bubfile conditional tag; may be repeated.
    #[arg(long = "define", value_name = "TAG")]
    pub conditionals: Vec<String>,

    #[command(subcommand)]
    pub command: Option<BubCommand>,
}

#[derive(Subcommand, Debug)]
pub enum BubCommand {
    /// Run only the cleanup pass (`spec.md` §4.7): remove stale build
    /// outputs under `obj/`, `priv/`, and `dist/`, then exit without
    /// scheduling any actions.
    Clean,
}
