use std::{
    env,
    fs::File,
    io::{self, Write},
    path::PathBuf,
    sync::mpsc,
};

use anyhow::Result;
use log::{debug, info, warn};
use nix::{sys::signal::Signal, unistd::Pid};

use crate::{
    config::Config,
    error::JobError,
    shell::{
        parser::{parse_cmd, Cmd},
        thread::{
            job::{JobRef, JobState, JobTable},
            process::{LaunchRequest, Outcome, ProcessHost},
            router::Session,
            ShellMsg,
        },
    },
};

pub enum WorkerMsg {
    Signal(i32), // Signal input
    Cmd(String), // Command input
}

/// What the prompt thread does after a command.
enum Flow {
    Continue,
    Wait(Pid), // Hold the prompt until this child exits, dies or stops
    Quit,
}

/// Owns all job state. Commands and signals arrive on one channel and are
/// applied in order.
#[derive(Debug)]
pub struct Worker<H> {
    host: H,
    session: Session,
    exit_code: i32,       // Status of the last command
    waiting: Option<Pid>, // Child the prompt is blocked on
}

impl<H> Worker<H>
where
    H: ProcessHost,
{
    pub fn new(host: H, config: &Config) -> Self {
        Worker {
            host,
            session: Session::new(JobTable::new(config.max_jobs, config.command_width)),
            exit_code: 0,
            waiting: None,
        }
    }

    pub fn spawn(
        mut self,
        worker_rx: mpsc::Receiver<WorkerMsg>,
        shell_tx: mpsc::SyncSender<ShellMsg>,
    ) -> Result<()>
    where
        H: Send + 'static,
    {
        std::thread::Builder::new()
            .name("jobsh-worker".to_string())
            .spawn(move || {
                for msg in worker_rx.iter() {
                    if let Some(reply) = self.handle(msg) {
                        if shell_tx.send(reply).is_err() {
                            break;
                        }
                    }
                }
            })?;
        Ok(())
    }

    /// Applies one message. `Some` releases the prompt thread.
    pub fn handle(&mut self, msg: WorkerMsg) -> Option<ShellMsg> {
        match msg {
            WorkerMsg::Cmd(line) => self.run_line(&line),
            WorkerMsg::Signal(sig) => self.on_signal(sig),
        }
    }

    fn run_line(&mut self, line: &str) -> Option<ShellMsg> {
        let cmd = match parse_cmd(line) {
            Ok(Some(cmd)) => cmd,
            Ok(None) => return Some(ShellMsg::Continue(self.exit_code)),
            Err(e) => {
                eprintln!("jobsh: {}", e);
                self.exit_code = 2;
                return Some(ShellMsg::Continue(self.exit_code));
            }
        };
        match self.dispatch(&cmd) {
            Ok(Flow::Continue) => {
                self.exit_code = 0;
                Some(ShellMsg::Continue(self.exit_code))
            }
            Ok(Flow::Wait(pid)) => {
                self.waiting = Some(pid);
                None
            }
            Ok(Flow::Quit) => Some(ShellMsg::Quit(0)),
            Err(e) => {
                eprintln!("jobsh: {}: {}", cmd.name, e);
                self.exit_code = 1;
                Some(ShellMsg::Continue(self.exit_code))
            }
        }
    }

    fn dispatch(&mut self, cmd: &Cmd) -> Result<Flow, JobError> {
        match cmd.name {
            "jobs" => self.run_jobs(cmd),
            "fg" => self.run_fg(cmd),
            "bg" => self.run_bg(cmd),
            "kill" => self.run_kill(cmd),
            "quit" => Ok(self.run_quit()),
            "cd" => run_cd(cmd),
            "pwd" => run_pwd(cmd),
            _ => self.spawn_child(cmd),
        }
    }

    fn on_signal(&mut self, sig: i32) -> Option<ShellMsg> {
        match Signal::try_from(sig) {
            Ok(Signal::SIGCHLD) => self.wait_child(),
            Ok(Signal::SIGINT) => {
                self.session.interrupt(&mut self.host);
                None
            }
            Ok(Signal::SIGTSTP) => {
                self.session.suspend(&mut self.host);
                None
            }
            _ => {
                debug!("ignoring signal {}", sig);
                None
            }
        }
    }

    /// Reaps children; releases the prompt if the waited-on child is done.
    fn wait_child(&mut self) -> Option<ShellMsg> {
        let mut reply = None;
        for event in self.session.reap(&mut self.host) {
            if self.waiting != Some(event.pid) || !event.outcome.ends_wait() {
                continue;
            }
            self.waiting = None;
            self.session.clear_foreground();
            if let Outcome::Stopped(_) = event.outcome {
                if let Some(job) = self.session.jobs().find_by_pid(event.pid) {
                    eprintln!("jobsh: {}", job);
                }
            }
            self.exit_code = event.outcome.exit_code();
            reply = Some(ShellMsg::Continue(self.exit_code));
        }
        reply
    }

    fn run_jobs(&mut self, cmd: &Cmd) -> Result<Flow, JobError> {
        let jobs = self.session.jobs();
        match cmd.stdout {
            // Only this listing goes to the file; stdout is never touched.
            Some(path) => {
                let mut file = File::create(path)?;
                jobs.write_listing(&mut file)?;
            }
            None => {
                let stdout = io::stdout();
                let mut out = stdout.lock();
                jobs.write_listing(&mut out)?;
                out.flush()?;
            }
        }
        Ok(Flow::Continue)
    }

    fn run_fg(&mut self, cmd: &Cmd) -> Result<Flow, JobError> {
        let target = job_ref(cmd)?;
        let pid = match self.session.jobs().resolve(target) {
            Some(job) => job.pid,
            None => return Err(JobError::NotFound(target)),
        };
        info!("resuming {} in the foreground", target);
        self.session.set_foreground(pid);
        self.signal(pid, Signal::SIGCONT);
        Ok(Flow::Wait(pid))
    }

    fn run_bg(&mut self, cmd: &Cmd) -> Result<Flow, JobError> {
        let target = job_ref(cmd)?;
        let job = self
            .session
            .jobs_mut()
            .resolve_mut(target)
            .ok_or(JobError::NotFound(target))?;
        if job.state != JobState::Stopped {
            return Err(JobError::InvalidState(target));
        }
        job.state = JobState::Background;
        let pid = job.pid;
        self.signal(pid, Signal::SIGCONT);
        Ok(Flow::Continue)
    }

    fn run_kill(&mut self, cmd: &Cmd) -> Result<Flow, JobError> {
        let target = job_ref(cmd)?;
        let job = self
            .session
            .jobs_mut()
            .resolve_mut(target)
            .ok_or(JobError::NotFound(target))?;
        let pid = job.pid;
        // A stopped process has to run again to act on the interrupt.
        if job.state == JobState::Stopped {
            job.state = JobState::Background;
            self.signal(pid, Signal::SIGCONT);
        }
        self.signal(pid, Signal::SIGINT);
        Ok(Flow::Continue)
    }

    fn run_quit(&mut self) -> Flow {
        let jobs = self.session.jobs();
        if !jobs.is_empty() {
            info!("terminating {} jobs", jobs.len());
        }
        let targets: Vec<(Pid, JobState)> = jobs.iter().map(|job| (job.pid, job.state)).collect();
        for (pid, state) in targets {
            self.signal(pid, Signal::SIGTERM);
            if state == JobState::Stopped {
                self.signal(pid, Signal::SIGCONT);
            }
        }
        Flow::Quit
    }

    fn spawn_child(&mut self, cmd: &Cmd) -> Result<Flow, JobError> {
        let req = LaunchRequest {
            program: cmd.name,
            args: &cmd.args,
            background: cmd.background,
            stdout: cmd.stdout,
            stdin: cmd.stdin,
        };
        let pid = self.host.launch(&req)?;

        let state = if cmd.background {
            JobState::Background
        } else {
            JobState::Foreground
        };
        match self.session.jobs_mut().insert(pid, &cmd.display(), state) {
            Ok(id) if cmd.background => println!("[{}] {}", id, pid),
            Ok(id) => debug!("[{}] {} started in the foreground", id, pid),
            // The child keeps running, just without a job entry.
            Err(e) => warn!("not tracking {}: {}", pid, e),
        }

        if cmd.background {
            return Ok(Flow::Continue);
        }
        self.session.set_foreground(pid);
        Ok(Flow::Wait(pid))
    }

    fn signal(&mut self, pid: Pid, sig: Signal) {
        if let Err(e) = self.host.send(pid, sig) {
            warn!("failed to send {} to {}: {}", sig, pid, e);
        }
    }
}

fn job_ref(cmd: &Cmd) -> Result<JobRef, JobError> {
    match cmd.args.as_slice() {
        [target] => target.parse(),
        _ => Err(JobError::Usage(format!("usage: {} <%job | pid>", cmd.name))),
    }
}

fn run_cd(cmd: &Cmd) -> Result<Flow, JobError> {
    let dir = match cmd.args.as_slice() {
        [] => dirs::home_dir().ok_or_else(|| JobError::Usage("HOME is not set".to_string()))?,
        [dir] => PathBuf::from(*dir),
        _ => return Err(JobError::Usage("wrong number of arguments".to_string())),
    };
    env::set_current_dir(dir)?;
    Ok(Flow::Continue)
}

fn run_pwd(cmd: &Cmd) -> Result<Flow, JobError> {
    if !cmd.args.is_empty() {
        return Err(JobError::Usage("too many arguments".to_string()));
    }
    println!("{}", env::current_dir()?.display());
    Ok(Flow::Continue)
}
