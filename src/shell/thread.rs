pub(crate) mod job;
mod process;
mod router;
mod worker;

use anyhow::Result;
use nix::{libc::c_int, sys::signal::Signal};
use signal_hook::iterator::Signals;
use std::sync::mpsc;

pub use process::UnixHost;
pub use worker::{Worker, WorkerMsg};

#[derive(Debug, PartialEq, Eq)]
pub enum ShellMsg {
    Continue(i32), // Continue shell interaction. (i32) is the exit code
    Quit(i32),     // Quit shell. (i32) is the exit code
}

/// Turns SIGINT, SIGTSTP and SIGCHLD into worker messages.
pub fn spawn_sig_handler(tx: mpsc::SyncSender<WorkerMsg>) -> Result<()> {
    let mut signals = Signals::new([
        Signal::SIGINT as c_int,
        Signal::SIGTSTP as c_int,
        Signal::SIGCHLD as c_int,
    ])?;
    std::thread::Builder::new()
        .name("jobsh-signals".to_string())
        .spawn(move || {
            for sig in signals.forever() {
                if tx.send(WorkerMsg::Signal(sig)).is_err() {
                    break;
                }
            }
        })?;
    Ok(())
}
