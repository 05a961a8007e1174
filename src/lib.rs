//! A small job-control shell: foreground, background and stopped jobs,
//! driven from a prompt and from terminal signals.

pub mod config;
pub mod error;
mod helper;
mod shell;

pub use config::Config;
pub use error::{JobError, LaunchError};
pub use shell::Shell;
