use std::{
    ffi::CString,
    fmt::{self, Display, Formatter},
    os::unix::io::RawFd,
    ptr,
};

use log::{debug, warn};
use nix::{
    errno::Errno,
    fcntl::{self, OFlag},
    libc,
    sys::{
        signal::{self, Signal},
        stat::Mode,
        wait::{self, WaitPidFlag, WaitStatus},
    },
    unistd::{self, ForkResult, Pid},
};

use crate::{error::LaunchError, helper::{syscall, Defer}};

/// How a child changed state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Exited(i32),
    Signaled(Signal),
    Stopped(Signal),
    Continued,
}

impl Outcome {
    /// Whether a controlling wait on this child returns.
    pub fn ends_wait(self) -> bool {
        !matches!(self, Outcome::Continued)
    }

    pub fn exit_code(self) -> i32 {
        match self {
            Outcome::Exited(code) => code,
            Outcome::Signaled(sig) | Outcome::Stopped(sig) => 128 + sig as i32,
            Outcome::Continued => 0,
        }
    }
}

impl Display for Outcome {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match self {
            Outcome::Exited(code) => write!(f, "exited with status {}", code),
            Outcome::Signaled(sig) => write!(f, "killed by {}", sig),
            Outcome::Stopped(sig) => write!(f, "stopped by {}", sig),
            Outcome::Continued => f.write_str("continued"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChildEvent {
    pub pid: Pid,
    pub outcome: Outcome,
}

/// What the dispatcher asks the launcher to start.
#[derive(Debug, Clone, Copy)]
pub struct LaunchRequest<'a> {
    pub program: &'a str,
    pub args: &'a [&'a str],
    pub background: bool,
    pub stdout: Option<&'a str>,
    pub stdin: Option<&'a str>,
}

/// Process-level operations the shell needs from the operating system.
pub trait ProcessHost {
    /// Starts a child. Background children get their own process group.
    fn launch(&mut self, req: &LaunchRequest) -> Result<Pid, LaunchError>;

    fn send(&mut self, pid: Pid, sig: Signal) -> nix::Result<()>;

    /// Next pending child state change, without blocking.
    fn try_wait(&mut self) -> Option<ChildEvent>;
}

#[derive(Debug, Default)]
pub struct UnixHost;

impl UnixHost {
    pub fn new() -> Self {
        UnixHost
    }
}

impl ProcessHost for UnixHost {
    fn launch(&mut self, req: &LaunchRequest) -> Result<Pid, LaunchError> {
        fork_exec(req)
    }

    fn send(&mut self, pid: Pid, sig: Signal) -> nix::Result<()> {
        signal::kill(pid, sig)
    }

    fn try_wait(&mut self) -> Option<ChildEvent> {
        // WUNTRACED: Report children that have stopped
        // WNOHANG: Return immediately if no child has changed state
        // WCONTINUED: Report stopped children that have been continued
        let flag = Some(WaitPidFlag::WUNTRACED | WaitPidFlag::WNOHANG | WaitPidFlag::WCONTINUED);

        loop {
            let (pid, outcome) = match syscall(|| wait::waitpid(Pid::from_raw(-1), flag)) {
                Ok(WaitStatus::Exited(pid, status)) => (pid, Outcome::Exited(status)),
                Ok(WaitStatus::Signaled(pid, sig, _core)) => (pid, Outcome::Signaled(sig)),
                Ok(WaitStatus::Stopped(pid, sig)) => (pid, Outcome::Stopped(sig)),
                Ok(WaitStatus::Continued(pid)) => (pid, Outcome::Continued),
                Ok(WaitStatus::StillAlive) | Err(Errno::ECHILD) => return None,
                Ok(other) => {
                    debug!("ignoring wait status {:?}", other);
                    continue;
                }
                Err(e) => {
                    warn!("waitpid: {}", e);
                    return None;
                }
            };
            return Some(ChildEvent { pid, outcome });
        }
    }
}

fn open_redirect(path: &str, flags: OFlag) -> Result<RawFd, LaunchError> {
    let mode = Mode::from_bits_truncate(0o666);
    syscall(|| fcntl::open(path, flags | OFlag::O_CLOEXEC, mode)).map_err(|errno| {
        LaunchError::Redirect {
            path: path.to_string(),
            errno,
        }
    })
}

fn close_fd(fd: Option<RawFd>) {
    if let Some(fd) = fd {
        let _ = unistd::close(fd);
    }
}

fn fork_exec(req: &LaunchRequest) -> Result<Pid, LaunchError> {
    let filename = CString::new(req.program)?;
    let mut args = vec![filename.clone()];
    for arg in req.args {
        args.push(CString::new(*arg)?);
    }
    // Built before fork: the child must not allocate.
    let mut argv: Vec<*const libc::c_char> = args.iter().map(|arg| arg.as_ptr()).collect();
    argv.push(ptr::null());

    let input = req
        .stdin
        .map(|path| open_redirect(path, OFlag::O_RDONLY))
        .transpose()?;
    let _close_input = Defer::new(|| close_fd(input));
    let output = req
        .stdout
        .map(|path| open_redirect(path, OFlag::O_WRONLY | OFlag::O_CREAT | OFlag::O_TRUNC))
        .transpose()?;
    let _close_output = Defer::new(|| close_fd(output));

    // The child reports a failed exec through this pipe; a successful exec
    // closes it, so the parent reads EOF.
    let (status_rd, status_wr) = unistd::pipe2(OFlag::O_CLOEXEC).map_err(LaunchError::Fork)?;
    let _close_status = Defer::new(|| close_fd(Some(status_rd)));

    match syscall(|| unsafe { unistd::fork() }) {
        Err(errno) => {
            close_fd(Some(status_wr));
            Err(LaunchError::Fork(errno))
        }
        Ok(ForkResult::Child) => {
            let errno = exec_child(req.background, input, output, &filename, &argv);
            let _ = unistd::write(status_wr, &(errno as i32).to_ne_bytes());
            unsafe { libc::_exit(127) }
        }
        Ok(ForkResult::Parent { child }) => {
            close_fd(Some(status_wr));
            if req.background {
                // Also done in the child; whichever runs first wins.
                let _ = unistd::setpgid(child, child);
            }
            let mut buf = [0u8; 4];
            match syscall(|| unistd::read(status_rd, &mut buf)) {
                Ok(n) if n == buf.len() => {
                    let _ = syscall(|| wait::waitpid(child, None));
                    Err(LaunchError::Exec(Errno::from_i32(i32::from_ne_bytes(buf))))
                }
                _ => {
                    debug!("launched {} as {}", req.program, child);
                    Ok(child)
                }
            }
        }
    }
}

fn exec_child(
    background: bool,
    input: Option<RawFd>,
    output: Option<RawFd>,
    filename: &CString,
    argv: &[*const libc::c_char],
) -> Errno {
    if background {
        if let Err(e) = unistd::setpgid(Pid::from_raw(0), Pid::from_raw(0)) {
            return e;
        }
    }
    if let Some(fd) = input {
        if let Err(e) = syscall(|| unistd::dup2(fd, libc::STDIN_FILENO)) {
            return e;
        }
    }
    if let Some(fd) = output {
        if let Err(e) = syscall(|| unistd::dup2(fd, libc::STDOUT_FILENO)) {
            return e;
        }
    }
    unsafe { libc::execvp(filename.as_ptr(), argv.as_ptr()) };
    Errno::last()
}


#[cfg(test)]
mod tests {
    use super::{
        testing::{lock_launcher, next_event},
        *,
    };
    use std::fs;

    fn request<'a>(program: &'a str, args: &'a [&'a str]) -> LaunchRequest<'a> {
        LaunchRequest {
            program,
            args,
            background: false,
            stdout: None,
            stdin: None,
        }
    }

    #[test]
    fn launches_and_exits() {
        let _guard = lock_launcher();
        let pid = UnixHost::new().launch(&request("true", &[])).unwrap();
        assert_eq!(wait::waitpid(pid, None).unwrap(), WaitStatus::Exited(pid, 0));
    }

    #[test]
    fn missing_program_is_a_launch_failure() {
        let _guard = lock_launcher();
        let err = UnixHost::new()
            .launch(&request("jobsh-no-such-program", &[]))
            .unwrap_err();
        assert!(matches!(err, LaunchError::Exec(Errno::ENOENT)));
    }

    #[test]
    fn missing_input_file_fails_before_fork() {
        let _guard = lock_launcher();
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("absent");
        let mut req = request("cat", &[]);
        let path = missing.to_str().unwrap();
        req.stdin = Some(path);
        let err = UnixHost::new().launch(&req).unwrap_err();
        assert!(matches!(err, LaunchError::Redirect { errno: Errno::ENOENT, .. }));
    }

    #[test]
    fn redirects_both_streams() {
        let _guard = lock_launcher();
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("in.txt");
        let dst = dir.path().join("out.txt");
        fs::write(&src, "hello jobs\n").unwrap();

        let (src, dst_str) = (src.to_str().unwrap(), dst.to_str().unwrap());
        let mut req = request("cat", &[]);
        req.stdin = Some(src);
        req.stdout = Some(dst_str);
        let pid = UnixHost::new().launch(&req).unwrap();
        assert_eq!(wait::waitpid(pid, None).unwrap(), WaitStatus::Exited(pid, 0));
        assert_eq!(fs::read_to_string(&dst).unwrap(), "hello jobs\n");
    }

    #[test]
    fn background_child_gets_own_group() {
        let _guard = lock_launcher();
        let mut req = request("sleep", &["5"]);
        req.background = true;
        let mut host = UnixHost::new();
        let pid = host.launch(&req).unwrap();
        assert_eq!(unistd::getpgid(Some(pid)).unwrap(), pid);

        host.send(pid, Signal::SIGKILL).unwrap();
        assert_eq!(
            wait::waitpid(pid, None).unwrap(),
            WaitStatus::Signaled(pid, Signal::SIGKILL, false)
        );
    }

    #[test]
    fn try_wait_reports_stop_continue_and_death() {
        let _guard = lock_launcher();
        let mut req = request("sleep", &["30"]);
        req.background = true;
        let mut host = UnixHost::new();
        let pid = host.launch(&req).unwrap();
        assert!(host.try_wait().is_none());

        host.send(pid, Signal::SIGTSTP).unwrap();
        assert_eq!(
            next_event(&mut host),
            Some(ChildEvent { pid, outcome: Outcome::Stopped(Signal::SIGTSTP) })
        );

        host.send(pid, Signal::SIGCONT).unwrap();
        assert_eq!(
            next_event(&mut host),
            Some(ChildEvent { pid, outcome: Outcome::Continued })
        );

        host.send(pid, Signal::SIGINT).unwrap();
        assert_eq!(
            next_event(&mut host),
            Some(ChildEvent { pid, outcome: Outcome::Signaled(Signal::SIGINT) })
        );
        // Reaped: nothing left to report.
        assert!(host.try_wait().is_none());
    }

    #[test]
    fn exit_codes_follow_shell_convention() {
        assert_eq!(Outcome::Exited(3).exit_code(), 3);
        assert_eq!(Outcome::Signaled(Signal::SIGINT).exit_code(), 130);
        assert_eq!(Outcome::Stopped(Signal::SIGTSTP).exit_code(), 148);
        assert!(!Outcome::Continued.ends_wait());
        assert!(Outcome::Stopped(Signal::SIGTSTP).ends_wait());
    }
}
