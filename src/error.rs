use std::ffi::NulError;

use nix::{errno::Errno, unistd::Pid};
use thiserror::Error;

use crate::shell::thread::job::JobRef;

/// Failures reported by job-control commands. None of them ends the shell.
#[derive(Debug, Error)]
pub enum JobError {
    #[error("job not found: {0}")]
    NotFound(JobRef),
    #[error("job {0} is not stopped")]
    InvalidState(JobRef),
    #[error(transparent)]
    Launch(#[from] LaunchError),
    #[error("job table is full ({0} jobs)")]
    CapacityExceeded(usize),
    #[error("process {0} is already tracked")]
    AlreadyTracked(Pid),
    #[error("{0}")]
    Usage(String),
    #[error("syntax error: {0}")]
    Syntax(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Why a child could not be started.
#[derive(Debug, Error)]
pub enum LaunchError {
    #[error("{path}: {}", .errno.desc())]
    Redirect { path: String, errno: Errno },
    #[error("{}", exec_message(.0))]
    Exec(Errno),
    #[error("fork failed: {}", .0.desc())]
    Fork(Errno),
    #[error("argument contains a NUL byte")]
    Nul(#[from] NulError),
}

fn exec_message(errno: &Errno) -> &'static str {
    match errno {
        Errno::ENOENT => "command not found",
        other => other.desc(),
    }
}
