//! Process lifecycle probe
//!
//! fork -> child: execve(path, [path], []) -> parent: wait. If execve fails
//! the child writes its errno to a close-on-exec pipe and `_exit`s with
//! [`EXEC_FAILURE_STATUS`]; it never returns into harness code. The parent
//! reads the pipe (EOF means the image was replaced) and then reaps.

use std::ffi::{CStr, CString};
use std::fs::{File, OpenOptions};
use std::io::{self, Read};
use std::os::fd::{AsRawFd, OwnedFd, RawFd};
use std::os::unix::ffi::OsStrExt;
use std::ptr;

use nix::errno::Errno;
use nix::fcntl::OFlag;
use nix::sys::signal::{kill, Signal};
use nix::sys::wait::{waitpid, WaitStatus};
use nix::unistd::{fork, pipe2, ForkResult, Pid};
use tracing::{debug, warn};

use crate::error::HarnessError;
use crate::scenario::ProcessScenario;

/// Exit status of a child whose execve failed
pub const EXEC_FAILURE_STATUS: i32 = 127;

/// Kills and reaps the child on drop unless it was already waited for
struct ChildGuard {
    pid: Pid,
    reaped: bool,
}

impl ChildGuard {
    fn new(pid: Pid) -> Self {
        Self { pid, reaped: false }
    }

    /// Block until the child terminates
    fn wait(&mut self) -> Result<WaitStatus, HarnessError> {
        loop {
            match waitpid(self.pid, None) {
                Ok(status @ (WaitStatus::Exited(..) | WaitStatus::Signaled(..))) => {
                    self.reaped = true;
                    return Ok(status);
                }
                Ok(other) => debug!(?other, "ignoring non-terminal wait status"),
                Err(Errno::EINTR) => continue,
                Err(e) => {
                    return Err(HarnessError::resource(
                        format!("waitpid {}", self.pid),
                        io::Error::from(e),
                    ))
                }
            }
        }
    }
}

impl Drop for ChildGuard {
    fn drop(&mut self) {
        if self.reaped {
            return;
        }
        warn!(pid = %self.pid, "killing unreaped child");
        let _ = kill(self.pid, Signal::SIGKILL);
        let _ = waitpid(self.pid, None);
    }
}

/// Child side after fork. Only async-signal-safe calls from here on.
fn exec_child(
    path: &CStr,
    argv: &[*const libc::c_char],
    envp: &[*const libc::c_char],
    devnull: Option<RawFd>,
    report: RawFd,
) -> ! {
    // SAFETY: every pointer was prepared before fork and stays valid; the
    // calls below are async-signal-safe and the child leaves via _exit.
    unsafe {
        if let Some(fd) = devnull {
            libc::dup2(fd, libc::STDOUT_FILENO);
            libc::dup2(fd, libc::STDERR_FILENO);
        }
        libc::execve(path.as_ptr(), argv.as_ptr(), envp.as_ptr());

        let errno = io::Error::last_os_error().raw_os_error().unwrap_or(0);
        let bytes = errno.to_ne_bytes();
        libc::write(report, bytes.as_ptr().cast(), bytes.len());
        libc::_exit(EXEC_FAILURE_STATUS)
    }
}

/// Read the child's exec report; `None` means the pipe hit EOF on exec
fn read_exec_report(read_end: OwnedFd) -> Result<Option<i32>, HarnessError> {
    let mut pipe = File::from(read_end);
    let mut buf = [0u8; 4];
    let mut filled = 0;
    while filled < buf.len() {
        match pipe.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(HarnessError::resource("read exec report", e)),
        }
    }
    Ok((filled == buf.len()).then(|| i32::from_ne_bytes(buf)))
}

/// Run a process scenario
pub fn run(scenario: &ProcessScenario) -> Result<Option<String>, HarnessError> {
    let executable = &scenario.executable;
    let child_error = |source: io::Error| HarnessError::ChildProcess {
        executable: executable.clone(),
        source,
    };

    // Everything the child touches is allocated before fork
    let path = CString::new(executable.as_os_str().as_bytes())
        .map_err(|_| child_error(io::Error::from(io::ErrorKind::InvalidInput)))?;
    let argv = [path.as_ptr(), ptr::null()];
    let envp = [ptr::null()];
    let devnull = if scenario.silence_output {
        Some(
            OpenOptions::new()
                .write(true)
                .open("/dev/null")
                .map_err(|e| HarnessError::resource("open /dev/null", e))?,
        )
    } else {
        None
    };
    let (read_end, write_end) = pipe2(OFlag::O_CLOEXEC)
        .map_err(|e| HarnessError::resource("pipe2", io::Error::from(e)))?;

    // SAFETY: the child only runs exec_child, which is async-signal-safe.
    let fork_result =
        unsafe { fork() }.map_err(|e| HarnessError::resource("fork", io::Error::from(e)))?;

    match fork_result {
        ForkResult::Child => exec_child(
            &path,
            &argv,
            &envp,
            devnull.as_ref().map(|f| f.as_raw_fd()),
            write_end.as_raw_fd(),
        ),
        ForkResult::Parent { child } => {
            let mut guard = ChildGuard::new(child);
            debug!(pid = %child, executable = %executable.display(), "forked child");
            drop(write_end);
            drop(devnull);

            let exec_errno = read_exec_report(read_end)?;
            let status = guard.wait()?;

            if let Some(errno) = exec_errno {
                return Err(child_error(io::Error::from_raw_os_error(errno)));
            }
            evaluate(status, scenario.expected_exit_code)
        }
    }
}

fn evaluate(status: WaitStatus, expected: i32) -> Result<Option<String>, HarnessError> {
    match status {
        WaitStatus::Exited(_, code) if code == expected => {
            Ok(Some(format!("child exited with status {}", code)))
        }
        WaitStatus::Exited(_, code) => Err(HarnessError::AssertionMismatch(format!(
            "child exited with status {}, expected {}",
            code, expected
        ))),
        WaitStatus::Signaled(_, signal, _) => Err(HarnessError::AssertionMismatch(format!(
            "child terminated by signal {:?}, expected exit status {}",
            signal, expected
        ))),
        other => Err(HarnessError::AssertionMismatch(format!(
            "unexpected wait status {:?}",
            other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::os::unix::fs::PermissionsExt;
    use std::time::{Duration, Instant};

    #[test]
    #[serial]
    fn test_true_exits_zero() {
        let msg = run(&ProcessScenario::new("/bin/true")).unwrap().unwrap();
        assert_eq!(msg, "child exited with status 0");
    }

    #[test]
    #[serial]
    fn test_ls_silenced() {
        let mut scenario = ProcessScenario::new("/bin/ls");
        scenario.silence_output = true;
        assert!(run(&scenario).is_ok());
    }

    #[test]
    #[serial]
    fn test_unexpected_exit_code_is_mismatch() {
        let err = run(&ProcessScenario::new("/bin/false")).unwrap_err();
        assert!(matches!(err, HarnessError::AssertionMismatch(_)));
        assert!(err.to_string().contains("status 1, expected 0"));
    }

    #[test]
    #[serial]
    fn test_expected_nonzero_exit_code() {
        let mut scenario = ProcessScenario::new("/bin/false");
        scenario.expected_exit_code = 1;
        assert!(run(&scenario).is_ok());
    }

    #[test]
    #[serial]
    fn test_program_exiting_127_is_not_exec_failure() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("exit-127.sh");
        std::fs::write(&path, b"#!/bin/sh\nexit 127\n").unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();

        let mut scenario = ProcessScenario::new(&path);
        scenario.expected_exit_code = 127;

        let msg = run(&scenario).unwrap().unwrap();
        assert_eq!(msg, "child exited with status 127");
    }

    #[test]
    #[serial]
    fn test_missing_executable_is_child_process_error() {
        let started = Instant::now();
        let err = run(&ProcessScenario::new("/nonexistent/vigia-missing")).unwrap_err();

        match err {
            HarnessError::ChildProcess { source, .. } => {
                assert_eq!(source.raw_os_error(), Some(libc::ENOENT));
            }
            other => panic!("Expected ChildProcess error, got {other}"),
        }
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    #[serial]
    fn test_non_executable_file_is_child_process_error() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("not-a-program");
        std::fs::write(&path, b"data").unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o644)).unwrap();

        let err = run(&ProcessScenario::new(&path)).unwrap_err();
        assert!(matches!(err, HarnessError::ChildProcess { .. }));
    }

    #[test]
    fn test_evaluate_signal() {
        let status = WaitStatus::Signaled(Pid::from_raw(1), Signal::SIGKILL, false);
        let err = evaluate(status, 0).unwrap_err();
        assert!(err.to_string().contains("SIGKILL"));
    }
}
