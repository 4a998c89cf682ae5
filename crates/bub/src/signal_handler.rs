//! Process-level signal handling (`spec.md` §5 "A process-level signal
//! handler (SIGINT/SIGTERM/SIGHUP equivalent) triggers the same cancellation
//! path and kills launched child processes"). Grounded on the teacher's
//! `crates/moon/src/signal_handler.rs`, simplified: `bub-worker`'s
//! [`ChildRegistry`] already tracks every in-flight command, so this module
//! only has to wire OS signals to `ChildRegistry::terminate_all` plus a
//! process exit.

use std::sync::atomic::{AtomicBool, Ordering};

use bub_worker::ChildRegistry;
use tracing::info;

static SHUTTING_DOWN: AtomicBool = AtomicBool::new(false);

/// Install Ctrl-C and (on Unix) `SIGTERM`/`SIGHUP` handlers that terminate
/// every registered worker child before exiting with the signal's
/// conventional exit code.
pub fn install(registry: ChildRegistry) -> anyhow::Result<()> {
    let ctrlc_registry = registry.clone();
    ctrlc::set_handler(move || {
        terminate_once(&ctrlc_registry, "SIGINT");
        std::process::exit(130);
    })?;

    #[cfg(unix)]
    {
        use signal_hook::consts::signal::{SIGHUP, SIGTERM};
        use signal_hook::iterator::Signals;

        let mut signals = Signals::new([SIGTERM, SIGHUP])?;
        std::thread::spawn(move || {
            for signal in signals.forever() {
                match signal {
                    SIGTERM => {
                        terminate_once(&registry, "SIGTERM");
                        std::process::exit(143);
                    }
                    SIGHUP => {
                        terminate_once(&registry, "SIGHUP");
                        std::process::exit(129);
                    }
                    _ => {}
                }
            }
        });
    }

    Ok(())
}

fn terminate_once(registry: &ChildRegistry, signal_name: &str) {
    if SHUTTING_DOWN.swap(true, Ordering::SeqCst) {
        return;
    }
    info!("received {signal_name}, terminating in-flight worker commands");
    registry.terminate_all();
}
