use anyhow::Result;
use log::debug;
use rustyline::error::ReadlineError;
use std::sync::mpsc;
use thread::{spawn_sig_handler, ShellMsg, UnixHost, Worker, WorkerMsg};

use crate::config::Config;

mod parser;
pub(crate) mod thread;

#[derive(Debug)]
pub struct Shell {
    config: Config,
}

impl Shell {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    /// Main thread: reads lines and hands them to the worker.
    pub fn run(&self) -> Result<()> {
        let mut rl = rustyline::Editor::<()>::new()?;
        if let Err(e) = rl.load_history(&self.config.history_file) {
            debug!("no history at {}: {}", self.config.history_file.display(), e);
        }

        let (worker_tx, worker_rx) = mpsc::sync_channel(64);
        let (shell_tx, shell_rx) = mpsc::sync_channel(0);
        spawn_sig_handler(worker_tx.clone())?;
        Worker::new(UnixHost::new(), &self.config).spawn(worker_rx, shell_tx)?;

        // Blocks until the worker replies, which for a foreground job is
        // when that job exits, dies or stops.
        let exchange = |line: String| -> Result<ShellMsg> {
            worker_tx.send(WorkerMsg::Cmd(line))?;
            Ok(shell_rx.recv()?)
        };

        let mut status = 0;
        let exit_val = loop {
            let symbol = if status == 0 { '$' } else { '!' };
            let line = match rl.readline(&format!("{} {} ", self.config.prompt, symbol)) {
                Ok(line) if line.trim().is_empty() => continue,
                Ok(line) => {
                    rl.add_history_entry(line.trim());
                    line
                }
                Err(ReadlineError::Interrupted) => {
                    eprintln!("jobsh: Interrupted");
                    continue;
                }
                // End of input quits like `quit` does.
                Err(ReadlineError::Eof) => "quit".to_string(),
                Err(e) => {
                    eprintln!("jobsh: Error: {}", e);
                    break 1;
                }
            };
            match exchange(line)? {
                ShellMsg::Continue(n) => status = n,
                ShellMsg::Quit(n) => break n,
            }
        };

        if let Err(e) = rl.save_history(&self.config.history_file) {
            eprintln!("jobsh: Unable to save history: {}", e);
        }
        std::process::exit(exit_val);
    }
}
