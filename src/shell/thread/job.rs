use std::{
    fmt::{self, Display, Formatter},
    io::{self, Write},
    str::FromStr,
};

use nix::unistd::Pid;

use crate::error::JobError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct JobId(usize);

impl Display for JobId {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for JobId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let id = s.parse()?;
        Ok(JobId(id))
    }
}

impl From<JobId> for usize {
    fn from(id: JobId) -> usize {
        id.0
    }
}

impl From<usize> for JobId {
    fn from(id: usize) -> Self {
        JobId(id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Foreground,
    Background,
    Stopped,
}

impl JobState {
    /// Label used by `jobs`.
    pub fn label(self) -> &'static str {
        match self {
            JobState::Foreground => "Foreground",
            JobState::Background => "Background",
            JobState::Stopped => "Stopped",
        }
    }
}

impl Display for JobState {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
    pub id: JobId,
    pub pid: Pid,
    pub command: String, // Truncated command line, display only
    pub state: JobState,
}

impl Display for Job {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "[{}] ({}) {} {}", self.id, self.pid, self.state, self.command)
    }
}

/// Target of `fg`, `bg` and `kill`: `%N` names a job, a bare number a process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobRef {
    Job(JobId),
    Process(Pid),
}

impl Display for JobRef {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match self {
            JobRef::Job(id) => write!(f, "%{}", id),
            JobRef::Process(pid) => write!(f, "{}", pid),
        }
    }
}

impl FromStr for JobRef {
    type Err = JobError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || JobError::Usage(format!("invalid job reference: {}", s));
        if let Some(id) = s.strip_prefix('%') {
            return id.parse().map(JobRef::Job).map_err(|_| invalid());
        }
        match s.parse::<i32>() {
            Ok(pid) if pid > 0 => Ok(JobRef::Process(Pid::from_raw(pid))),
            _ => Err(invalid()),
        }
    }
}

/// Bounded, insertion-ordered set of tracked jobs.
///
/// Job ids come from a counter that only moves forward, so removing a job
/// never causes a later job to inherit its id.
#[derive(Debug)]
pub struct JobTable {
    jobs: Vec<Job>,
    capacity: usize,
    command_width: usize,
    next_id: usize,
}

impl JobTable {
    pub fn new(capacity: usize, command_width: usize) -> Self {
        JobTable {
            jobs: Vec::with_capacity(capacity),
            capacity,
            command_width,
            next_id: 1,
        }
    }

    pub fn insert(&mut self, pid: Pid, command: &str, state: JobState) -> Result<JobId, JobError> {
        if self.len() >= self.capacity {
            return Err(JobError::CapacityExceeded(self.capacity));
        }
        if self.find_by_pid(pid).is_some() {
            return Err(JobError::AlreadyTracked(pid));
        }
        let id = JobId(self.next_id);
        self.next_id += 1;
        self.jobs.push(Job {
            id,
            pid,
            command: command.chars().take(self.command_width).collect(),
            state,
        });
        Ok(id)
    }

    /// Removes the job for `pid`; later entries shift down keeping their ids.
    pub fn remove_by_pid(&mut self, pid: Pid) -> Option<Job> {
        let pos = self.jobs.iter().position(|job| job.pid == pid)?;
        Some(self.jobs.remove(pos))
    }

    pub fn find_by_pid(&self, pid: Pid) -> Option<&Job> {
        self.jobs.iter().find(|job| job.pid == pid)
    }

    pub fn find_by_pid_mut(&mut self, pid: Pid) -> Option<&mut Job> {
        self.jobs.iter_mut().find(|job| job.pid == pid)
    }

    pub fn find_by_job_id(&self, id: JobId) -> Option<&Job> {
        self.jobs.iter().find(|job| job.id == id)
    }

    pub fn find_by_job_id_mut(&mut self, id: JobId) -> Option<&mut Job> {
        self.jobs.iter_mut().find(|job| job.id == id)
    }

    pub fn resolve(&self, target: JobRef) -> Option<&Job> {
        match target {
            JobRef::Job(id) => self.find_by_job_id(id),
            JobRef::Process(pid) => self.find_by_pid(pid),
        }
    }

    pub fn resolve_mut(&mut self, target: JobRef) -> Option<&mut Job> {
        match target {
            JobRef::Job(id) => self.find_by_job_id_mut(id),
            JobRef::Process(pid) => self.find_by_pid_mut(pid),
        }
    }

    /// Returns false if `pid` is not tracked.
    pub fn set_state(&mut self, pid: Pid, state: JobState) -> bool {
        match self.find_by_pid_mut(pid) {
            Some(job) => {
                job.state = state;
                true
            }
            None => false,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Job> {
        self.jobs.iter()
    }

    /// Writes one `jobs` line per entry, in table order.
    pub fn write_listing<W: Write>(&self, out: &mut W) -> io::Result<()> {
        for job in self.iter() {
            writeln!(out, "{}", job)?;
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }
}
