use super::EvaluationError;
use std::collections::VecDeque;
use std::io::{self, BufRead, BufReader, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Output, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

const POLL_INTERVAL: Duration = Duration::from_millis(20);
const STDERR_TAIL: usize = 400;
const STDERR_LINES: usize = 20;
/// How long a child that closed its stdout gets to report an exit status.
const EXIT_GRACE: Duration = Duration::from_millis(500);

/// Resolves `program` the way a shell would: paths with a separator are taken as is,
/// bare names are searched on `PATH`.
pub(super) fn find_executable(program: &str) -> Option<PathBuf> {
    let candidate = Path::new(program);
    if candidate.components().count() > 1 {
        return candidate.is_file().then(|| candidate.to_path_buf());
    }
    let path_var = std::env::var_os("PATH")?;
    std::env::split_paths(&path_var)
        .map(|dir| dir.join(program))
        .find(|p| p.is_file())
}

/// Starts the child as the leader of a new process group, so that everything it
/// launches (MPI ranks, wrapped interpreters) can be stopped together.
fn isolate(command: &mut Command) {
    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        command.process_group(0);
    }
    #[cfg(not(unix))]
    let _ = command;
}

/// Sends `SIGKILL` to the process group led by `child`. An already empty group is fine.
#[cfg(unix)]
fn kill_group(child: &mut Child) -> io::Result<()> {
    let Ok(group) = libc::pid_t::try_from(child.id()) else {
        return child.kill();
    };
    // SAFETY: killpg only delivers a signal; `group` is the id of a group created by
    // `isolate` for a child we spawned.
    if unsafe { libc::killpg(group, libc::SIGKILL) } == 0 {
        return Ok(());
    }
    let err = io::Error::last_os_error();
    if err.raw_os_error() == Some(libc::ESRCH) {
        Ok(())
    } else {
        Err(err)
    }
}

#[cfg(not(unix))]
fn kill_group(child: &mut Child) -> io::Result<()> {
    match child.kill() {
        Err(e) if e.kind() != io::ErrorKind::InvalidInput => Err(e),
        _ => Ok(()),
    }
}

/// Runs `command` to completion, feeding `input` on stdin and collecting its output.
///
/// With a `timeout`, the child's whole process group is killed once the deadline passes
/// and [`EvaluationError::Timeout`] is returned.
pub(super) fn run(
    mut command: Command,
    input: Option<Vec<u8>>,
    timeout: Option<Duration>,
) -> Result<Output, EvaluationError> {
    let program = command.get_program().to_string_lossy().to_string();
    isolate(&mut command);
    command
        .stdin(if input.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    let mut child = command
        .spawn()
        .map_err(|source| EvaluationError::Spawn { program, source })?;

    let writer = match (input, child.stdin.take()) {
        (Some(bytes), Some(mut stdin)) => Some(thread::spawn(move || stdin.write_all(&bytes))),
        _ => None,
    };
    let stdout = child.stdout.take().map(drain);
    let stderr = child.stderr.take().map(drain);

    let started = Instant::now();
    let status = loop {
        if let Some(status) = child.try_wait()? {
            break status;
        }
        if let Some(limit) = timeout {
            if started.elapsed() >= limit {
                kill_group(&mut child)?;
                child.wait()?;
                return Err(EvaluationError::Timeout(limit));
            }
        }
        thread::sleep(POLL_INTERVAL);
    };

    // Stragglers left in the group would otherwise keep the output pipes open.
    if let Err(e) = kill_group(&mut child) {
        debug!("Could not clear process group: {e}");
    }

    // A child that exits without reading its input closes the pipe; that is not an error.
    if let Some(handle) = writer {
        let _ = handle.join();
    }
    let collect = |handle: Option<JoinHandle<io::Result<Vec<u8>>>>| {
        handle
            .map(|h| h.join().unwrap_or_else(|_| Ok(Vec::new())))
            .transpose()
            .map(Option::unwrap_or_default)
    };

    Ok(Output {
        status,
        stdout: collect(stdout)?,
        stderr: collect(stderr)?,
    })
}

/// Maps a non-zero exit into [`EvaluationError::ProcessFailed`] carrying the stderr tail.
pub(super) fn check_status(output: &Output) -> Result<(), EvaluationError> {
    if output.status.success() {
        return Ok(());
    }
    Err(EvaluationError::ProcessFailed {
        status: output.status.to_string(),
        stderr: tail(&String::from_utf8_lossy(&output.stderr)),
    })
}

fn tail(text: &str) -> String {
    let trimmed = text.trim();
    let start = trimmed
        .char_indices()
        .rev()
        .nth(STDERR_TAIL)
        .map_or(0, |(i, _)| i);
    trimmed[start..].to_string()
}

fn drain<R: Read + Send + 'static>(mut source: R) -> JoinHandle<io::Result<Vec<u8>>> {
    thread::spawn(move || {
        let mut buffer = Vec::new();
        source.read_to_end(&mut buffer)?;
        Ok(buffer)
    })
}

/// A long-running child that exchanges newline-terminated messages over its pipes.
///
/// Writes go through a dedicated thread so a child that stops reading can never block
/// the caller past its deadline. Dropping the session closes stdin and kills the
/// child's process group.
#[derive(Debug)]
pub(super) struct Session {
    program: String,
    child: Child,
    input: Option<Sender<Vec<u8>>>,
    lines: Receiver<String>,
    stderr: Arc<Mutex<VecDeque<String>>>,
    stderr_reader: Option<JoinHandle<()>>,
}

impl Session {
    pub(super) fn spawn(mut command: Command) -> Result<Self, EvaluationError> {
        let program = command.get_program().to_string_lossy().to_string();
        isolate(&mut command);
        command
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = command.spawn().map_err(|source| EvaluationError::Spawn {
            program: program.clone(),
            source,
        })?;
        let (Some(stdin), Some(stdout), Some(stderr)) =
            (child.stdin.take(), child.stdout.take(), child.stderr.take())
        else {
            let _ = kill_group(&mut child);
            let _ = child.wait();
            return Err(EvaluationError::Io(io::Error::other(
                "child pipes were not captured",
            )));
        };

        let (input, requests) = mpsc::channel::<Vec<u8>>();
        thread::spawn(move || {
            let mut stdin = stdin;
            for message in requests {
                if stdin.write_all(&message).and_then(|()| stdin.flush()).is_err() {
                    break;
                }
            }
        });

        let (sender, lines) = mpsc::channel();
        thread::spawn(move || {
            for line in BufReader::new(stdout).lines().map_while(Result::ok) {
                if sender.send(line).is_err() {
                    break;
                }
            }
        });

        let stderr_lines = Arc::new(Mutex::new(VecDeque::with_capacity(STDERR_LINES)));
        let stderr_reader = {
            let stderr_lines = Arc::clone(&stderr_lines);
            let program = program.clone();
            thread::spawn(move || {
                for line in BufReader::new(stderr).lines().map_while(Result::ok) {
                    debug!(%program, "stderr: {line}");
                    let mut tail = stderr_lines.lock().unwrap_or_else(PoisonError::into_inner);
                    if tail.len() == STDERR_LINES {
                        tail.pop_front();
                    }
                    tail.push_back(line);
                }
            })
        };

        Ok(Self {
            program,
            child,
            input: Some(input),
            lines,
            stderr: stderr_lines,
            stderr_reader: Some(stderr_reader),
        })
    }

    pub(super) fn send_line(&mut self, line: &str) -> Result<(), EvaluationError> {
        let mut message = Vec::with_capacity(line.len() + 1);
        message.extend_from_slice(line.as_bytes());
        message.push(b'\n');
        let delivered = self
            .input
            .as_ref()
            .is_some_and(|input| input.send(message).is_ok());
        if delivered { Ok(()) } else { Err(self.closed()) }
    }

    /// Next stdout line, or `None` if nothing arrived within `wait`.
    ///
    /// A closed stdout is reported as [`EvaluationError::ProcessFailed`] with the exit
    /// status and the last stderr lines.
    pub(super) fn recv_line(
        &mut self,
        wait: Option<Duration>,
    ) -> Result<Option<String>, EvaluationError> {
        let received = match wait {
            Some(wait) => match self.lines.recv_timeout(wait) {
                Ok(line) => Some(line),
                Err(RecvTimeoutError::Timeout) => return Ok(None),
                Err(RecvTimeoutError::Disconnected) => None,
            },
            None => self.lines.recv().ok(),
        };
        match received {
            Some(line) => Ok(Some(line)),
            None => Err(self.closed()),
        }
    }

    fn closed(&mut self) -> EvaluationError {
        let started = Instant::now();
        let status = loop {
            match self.child.try_wait() {
                Ok(Some(status)) => break status.to_string(),
                Ok(None) if started.elapsed() < EXIT_GRACE => thread::sleep(POLL_INTERVAL),
                Ok(None) => break "closed its output without exiting".to_string(),
                Err(e) => break format!("unknown status ({e})"),
            }
        };
        self.terminate();
        let stderr = {
            let lines = self.stderr.lock().unwrap_or_else(PoisonError::into_inner);
            tail(&lines.iter().map(String::as_str).collect::<Vec<_>>().join("\n"))
        };
        EvaluationError::ProcessFailed { status, stderr }
    }

    fn terminate(&mut self) {
        self.input = None;
        if let Err(e) = kill_group(&mut self.child) {
            warn!(program = %self.program, "Could not stop process group: {e}");
        }
        let _ = self.child.wait();
        if let Some(reader) = self.stderr_reader.take() {
            let _ = reader.join();
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.terminate();
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn shell(script: &str) -> Command {
        let mut command = Command::new("sh");
        command.arg("-c").arg(script);
        command
    }

    #[test]
    fn finds_shell_on_path() {
        assert!(find_executable("sh").is_some());
        assert!(find_executable("definitely-not-a-real-program-xyz").is_none());
        assert!(find_executable("/no/such/dir/tool").is_none());
    }

    #[test]
    fn captures_stdout_and_feeds_stdin() {
        let output = run(shell("cat"), Some(b"hello".to_vec()), None).unwrap();
        assert!(output.status.success());
        assert_eq!(output.stdout, b"hello");
    }

    #[test]
    fn non_zero_exit_keeps_stderr() {
        let output = run(shell("echo boom >&2; exit 3"), None, None).unwrap();
        let err = check_status(&output).unwrap_err();
        match err {
            EvaluationError::ProcessFailed { stderr, .. } => assert_eq!(stderr, "boom"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn slow_child_is_killed_on_timeout() {
        let started = Instant::now();
        let err = run(shell("sleep 5"), None, Some(Duration::from_millis(100))).unwrap_err();
        assert!(matches!(err, EvaluationError::Timeout(_)));
        assert!(started.elapsed() < Duration::from_secs(4));
    }

    #[test]
    fn timeout_stops_grandchildren_too() {
        let dir = tempdir().unwrap();
        let marker = dir.path().join("late");
        let script = format!("(sleep 1; echo late > '{}') & wait", marker.display());

        let err = run(shell(&script), None, Some(Duration::from_millis(200))).unwrap_err();
        assert!(matches!(err, EvaluationError::Timeout(_)));

        thread::sleep(Duration::from_millis(1500));
        assert!(!marker.exists());
    }

    #[test]
    fn session_answers_line_by_line() {
        let mut session =
            Session::spawn(shell("while IFS= read -r l; do echo \"got $l\"; done")).unwrap();
        let wait = Some(Duration::from_secs(5));

        session.send_line("a").unwrap();
        assert_eq!(session.recv_line(wait).unwrap().as_deref(), Some("got a"));
        session.send_line("b").unwrap();
        assert_eq!(session.recv_line(wait).unwrap().as_deref(), Some("got b"));
    }

    #[test]
    fn silent_session_times_out() {
        let mut session = Session::spawn(shell("sleep 5")).unwrap();
        let started = Instant::now();
        assert!(
            session
                .recv_line(Some(Duration::from_millis(100)))
                .unwrap()
                .is_none()
        );
        drop(session);
        assert!(started.elapsed() < Duration::from_secs(4));
    }

    #[test]
    fn exited_session_reports_status_and_stderr() {
        let mut session = Session::spawn(shell("echo oops >&2; exit 4")).unwrap();
        let err = session.recv_line(Some(Duration::from_secs(5))).unwrap_err();
        match err {
            EvaluationError::ProcessFailed { status, stderr } => {
                assert!(status.contains('4'), "status: {status}");
                assert_eq!(stderr, "oops");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn dropping_a_session_stops_its_children() {
        let dir = tempdir().unwrap();
        let marker = dir.path().join("late");
        let script = format!(
            "(sleep 1; echo late > '{}') & echo ready; wait",
            marker.display()
        );
        let mut session = Session::spawn(shell(&script)).unwrap();
        assert_eq!(
            session
                .recv_line(Some(Duration::from_secs(5)))
                .unwrap()
                .as_deref(),
            Some("ready")
        );

        drop(session);
        thread::sleep(Duration::from_millis(1500));
        assert!(!marker.exists());
    }
}
