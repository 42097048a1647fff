use anyhow::{bail, Result};
use std::io::{self, BufRead, BufReader, PipeReader, Read};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};

/// Runs one shell command in the background and relays its output.
///
/// stdout and stderr share a single pipe, so lines arrive in the order the
/// process wrote them. The caller pulls them with [`ProcessRunner::lines`];
/// the stream ends once every process holding the pipe has exited.
pub struct ProcessRunner {
    child: Arc<Mutex<Option<Child>>>,
    status: Arc<Mutex<Option<ExitStatus>>>,
    active: Arc<AtomicBool>,
    relay: Option<JoinHandle<()>>,
    lines: Receiver<String>,
}

impl ProcessRunner {
    /// Spawns `command` before returning, so a following `kill()` always
    /// has a process to hit. A launch failure shows up as one output line.
    pub fn start(command: &str) -> Self {
        let (tx, rx) = mpsc::channel();
        let child = Arc::new(Mutex::new(None));
        let status = Arc::new(Mutex::new(None));
        let active = Arc::new(AtomicBool::new(false));

        let relay = match launch(command) {
            Ok((spawned, output)) => {
                log::debug!("Started process {} for {:?}", spawned.id(), command);
                *lock(&child) = Some(spawned);
                active.store(true, Ordering::SeqCst);

                let child = Arc::clone(&child);
                let status = Arc::clone(&status);
                let active = Arc::clone(&active);
                Some(thread::spawn(move || {
                    relay(output, &child, &status, &tx);
                    active.store(false, Ordering::SeqCst);
                }))
            }
            Err(err) => {
                log::debug!("Failed to launch {:?}: {}", command, err);
                let _ = tx.send(format!("An error occurred: {}", err));
                None
            }
        };

        Self {
            child,
            status,
            active,
            relay,
            lines: rx,
        }
    }

    /// Blocking iterator over output lines, finished when the process is.
    pub fn lines(&self) -> impl Iterator<Item = String> + '_ {
        self.lines.iter()
    }

    pub fn is_running(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Kills the process together with everything it started, then reaps
    /// it. Calling it again is a no-op.
    pub fn kill(&self) {
        let Some(mut child) = lock(&self.child).take() else {
            return;
        };
        log::debug!("Killing process tree of {}", child.id());
        terminate(&mut child);
        if let Err(err) = child.wait() {
            log::warn!("Failed to reap killed process: {}", err);
        }
    }

    /// Waits for the relay to finish and returns the exit status, if the
    /// process ran to completion on its own.
    pub fn wait(mut self) -> Option<ExitStatus> {
        if let Some(handle) = self.relay.take() {
            if handle.join().is_err() {
                log::error!("Output relay thread panicked");
            }
        }
        *lock(&self.status)
    }
}

impl Drop for ProcessRunner {
    fn drop(&mut self) {
        if self.is_running() {
            self.kill();
        }
    }
}

fn launch(command: &str) -> io::Result<(Child, PipeReader)> {
    let (reader, writer) = io::pipe()?;
    let mut cmd = shell(command);
    cmd.stdin(Stdio::null())
        .stdout(writer.try_clone()?)
        .stderr(writer);
    let child = cmd.spawn()?;
    // The Command still owns our copies of the write end; EOF needs them gone.
    drop(cmd);
    Ok((child, reader))
}

fn relay(
    output: PipeReader,
    child_slot: &Mutex<Option<Child>>,
    status: &Mutex<Option<ExitStatus>>,
    tx: &Sender<String>,
) {
    pump(output, tx);

    // Taken out before waiting so that kill() never blocks on the lock.
    let child = lock(child_slot).take();
    if let Some(mut child) = child {
        match child.wait() {
            Ok(exit) => {
                log::debug!("Process exited with {}", exit);
                *lock(status) = Some(exit);
            }
            Err(err) => log::warn!("Failed to wait for process: {}", err),
        }
    }
}

fn pump(pipe: impl Read, tx: &Sender<String>) {
    let mut reader = BufReader::new(pipe);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf) {
            Ok(0) => break,
            Ok(_) => {
                let line = String::from_utf8_lossy(&buf);
                let line = line.trim_end_matches(['\r', '\n']).to_string();
                if tx.send(line).is_err() {
                    break;
                }
            }
            Err(err) => {
                log::warn!("Error reading process output: {}", err);
                break;
            }
        }
    }
}

#[cfg(windows)]
fn shell(command: &str) -> Command {
    let mut cmd = Command::new("cmd");
    cmd.arg("/C").arg(command);
    cmd
}

// The shell leads its own process group so kill() can reach its children.
#[cfg(not(windows))]
fn shell(command: &str) -> Command {
    use std::os::unix::process::CommandExt;

    let mut cmd = Command::new("sh");
    cmd.arg("-c").arg(command).process_group(0);
    cmd
}

#[cfg(unix)]
fn terminate(child: &mut Child) {
    use nix::sys::signal::{killpg, Signal};
    use nix::unistd::Pid;

    let group = Pid::from_raw(child.id() as i32);
    if let Err(err) = killpg(group, Signal::SIGKILL) {
        log::debug!("killpg failed ({}), killing the shell only", err);
        let _ = child.kill();
    }
}

#[cfg(windows)]
fn terminate(child: &mut Child) {
    let tree_killed = Command::new("taskkill")
        .args(["/F", "/T", "/PID", &child.id().to_string()])
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .is_ok_and(|s| s.success());
    if !tree_killed {
        let _ = child.kill();
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Holds at most one active build or install.
#[derive(Default)]
pub struct BuildSlot {
    current: Option<ProcessRunner>,
}

impl BuildSlot {
    pub fn is_busy(&self) -> bool {
        self.current.as_ref().is_some_and(ProcessRunner::is_running)
    }

    pub fn start(&mut self, command: &str) -> Result<&ProcessRunner> {
        if self.is_busy() {
            bail!("Another build is running.");
        }
        Ok(&*self.current.insert(ProcessRunner::start(command)))
    }

    /// Hands the finished (or running) runner back to the caller.
    pub fn take(&mut self) -> Option<ProcessRunner> {
        self.current.take()
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::time::{Duration, Instant};

    #[test]
    fn merges_stdout_and_stderr_in_write_order() {
        for _ in 0..20 {
            let runner =
                ProcessRunner::start("echo 1; echo 2 1>&2; echo 3; echo 4 1>&2; echo 5");
            let lines: Vec<String> = runner.lines().collect();
            assert_eq!(lines, vec!["1", "2", "3", "4", "5"]);
            assert!(runner.wait().unwrap().success());
        }
    }

    #[test]
    fn strips_line_endings() {
        let runner = ProcessRunner::start("printf 'one\\r\\ntwo\\n'");
        let lines: Vec<String> = runner.lines().collect();
        assert_eq!(lines, vec!["one", "two"]);
    }

    #[test]
    fn reports_failing_exit_status() {
        let runner = ProcessRunner::start("exit 3");
        assert_eq!(runner.lines().count(), 0);
        assert_eq!(runner.wait().and_then(|s| s.code()), Some(3));
    }

    #[test]
    fn invalid_utf8_is_replaced() {
        let runner = ProcessRunner::start("printf 'caf\\351\\n'");
        let lines: Vec<String> = runner.lines().collect();
        assert_eq!(lines, vec!["caf\u{FFFD}"]);
    }

    #[test]
    fn kill_right_after_start_stops_the_command() {
        let started = Instant::now();
        let runner = ProcessRunner::start("sleep 1; echo survived");
        runner.kill();

        let lines: Vec<String> = runner.lines().collect();
        assert!(lines.is_empty(), "got {:?}", lines);
        assert!(started.elapsed() < Duration::from_millis(900));
        assert!(runner.wait().is_none());
    }

    #[test]
    fn kill_reaches_children_of_the_shell() {
        let runner = ProcessRunner::start("echo started; sleep 3; echo after");
        let mut lines = runner.lines();
        assert_eq!(lines.next().as_deref(), Some("started"));

        let killed_at = Instant::now();
        runner.kill();
        runner.kill();

        assert_eq!(lines.next(), None);
        assert!(killed_at.elapsed() < Duration::from_secs(2));
        drop(lines);
        assert!(runner.wait().is_none());
    }

    #[test]
    fn slot_rejects_second_build() {
        let mut slot = BuildSlot::default();
        slot.start("sleep 30").unwrap();
        assert!(slot.is_busy());
        assert!(slot.start("echo again").is_err());

        let runner = slot.take().unwrap();
        runner.kill();
        assert!(runner.wait().is_none());
        assert!(!slot.is_busy());

        let runner = slot.start("echo again").unwrap();
        assert_eq!(runner.lines().collect::<Vec<_>>(), vec!["again"]);
    }
}
