/// Runs `f` when dropped.
pub struct Defer<F>
where
    F: FnMut(),
{
    f: F,
}

impl<F> Defer<F>
where
    F: FnMut(),
{
    pub fn new(f: F) -> Self {
        Defer { f }
    }
}

impl<F> Drop for Defer<F>
where
    F: FnMut(),
{
    fn drop(&mut self) {
        (self.f)();
    }
}

/// Retries `f` for as long as it is interrupted by a signal.
pub fn syscall<F, T>(mut f: F) -> Result<T, nix::Error>
where
    F: FnMut() -> Result<T, nix::Error>,
{
    loop {
        match f() {
            Err(nix::errno::Errno::EINTR) => continue,
            other => return other,
        }
    }
}
