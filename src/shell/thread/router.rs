//! Job state shared by the command and signal paths.
//!
//! Signals reach the worker as messages, so everything here runs on the
//! worker thread with the whole table in a consistent state. Each entry
//! point is a single step: none of them blocks.

use log::{debug, info};
use nix::{sys::signal::Signal, unistd::Pid};

use super::{
    job::{JobState, JobTable},
    process::{ChildEvent, Outcome, ProcessHost},
};

#[derive(Debug)]
pub struct Session {
    jobs: JobTable,
    fg: Option<Pid>, // Target of terminal-generated signals; None means the shell itself
}

impl Session {
    pub fn new(jobs: JobTable) -> Self {
        Session { jobs, fg: None }
    }

    pub fn jobs(&self) -> &JobTable {
        &self.jobs
    }

    pub fn jobs_mut(&mut self) -> &mut JobTable {
        &mut self.jobs
    }

    #[cfg(test)]
    pub fn foreground(&self) -> Option<Pid> {
        self.fg
    }

    /// Hands the terminal's signals to `pid`, marking its job `Foreground`.
    pub fn set_foreground(&mut self, pid: Pid) {
        self.jobs.set_state(pid, JobState::Foreground);
        self.fg = Some(pid);
    }

    pub fn clear_foreground(&mut self) {
        self.fg = None;
    }

    /// Drains every pending child state change and applies it.
    pub fn reap<H: ProcessHost>(&mut self, host: &mut H) -> Vec<ChildEvent> {
        let mut events = Vec::new();
        while let Some(event) = host.try_wait() {
            self.observe(event.pid, event.outcome);
            events.push(event);
        }
        events
    }

    pub fn observe(&mut self, pid: Pid, outcome: Outcome) {
        match outcome {
            Outcome::Stopped(_) => self.observe_stop(pid),
            Outcome::Continued => self.observe_continue(pid),
            Outcome::Exited(_) | Outcome::Signaled(_) => {
                if self.fg == Some(pid) {
                    self.fg = None;
                }
                match self.jobs.remove_by_pid(pid) {
                    Some(job) => info!("[{}] ({}) {}: {}", job.id, pid, outcome, job.command),
                    None => debug!("untracked child {} {}", pid, outcome),
                }
            }
        }
    }

    /// A stopped job stays in the table but no longer owns the terminal.
    pub fn observe_stop(&mut self, pid: Pid) {
        if !self.jobs.set_state(pid, JobState::Stopped) {
            debug!("untracked child {} stopped", pid);
        }
        if self.fg == Some(pid) {
            self.fg = None;
        }
    }

    /// A stopped job resumed from outside the shell (`kill -CONT`) runs on
    /// in the background. The foreground job keeps its state.
    pub fn observe_continue(&mut self, pid: Pid) {
        if self.fg == Some(pid) {
            return;
        }
        match self.jobs.find_by_pid_mut(pid) {
            Some(job) if job.state == JobState::Stopped => {
                debug!("[{}] ({}) continued", job.id, pid);
                job.state = JobState::Background;
            }
            Some(_) => {}
            None => debug!("untracked child {} continued", pid),
        }
    }

    /// Forwards an interrupt to the foreground job, if any.
    pub fn interrupt<H: ProcessHost>(&mut self, host: &mut H) -> Option<Pid> {
        let pid = self.fg.take()?;
        if let Err(e) = host.send(pid, Signal::SIGINT) {
            debug!("SIGINT to {}: {}", pid, e);
        }
        Some(pid)
    }

    /// Forwards a stop request to the foreground job and shows it as
    /// `Stopped` right away. The marker is left for `observe_stop`.
    pub fn suspend<H: ProcessHost>(&mut self, host: &mut H) -> Option<Pid> {
        let pid = self.fg?;
        if let Err(e) = host.send(pid, Signal::SIGTSTP) {
            debug!("SIGTSTP to {}: {}", pid, e);
        }
        self.jobs.set_state(pid, JobState::Stopped);
        Some(pid)
    }
}
