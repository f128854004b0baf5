//! Spawned emulator process with console capture
//!
//! stdout and stderr are drained by background threads. Complete lines are
//! forwarded to the log under the `QEMU` tag, and raw output is kept so
//! callers can wait for text that doesn't end in a newline (the monitor
//! prompt, for instance). Only the most recent [`CONSOLE_CAPACITY`] bytes
//! are kept; older output is dropped.

use std::io::{self, Read, Write};
use std::process::{Child, ChildStdin, Command, ExitStatus, Stdio};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use crate::error::{QemuError, Result};

/// Tag prefixed to forwarded console lines
const SOURCE: &str = "QEMU";

/// Console bytes kept for [`QemuProcess::expect_exact`]
pub const CONSOLE_CAPACITY: usize = 1 << 20;

/// Captured console output not yet consumed by a match
#[derive(Debug)]
struct Console {
    buffer: String,
    capacity: usize,
    open_pipes: usize,
}

impl Console {
    fn new(capacity: usize) -> Self {
        Self {
            buffer: String::new(),
            capacity,
            open_pipes: 0,
        }
    }

    /// Append `chunk`, dropping the oldest output beyond the capacity
    fn push(&mut self, chunk: &str) {
        self.buffer.push_str(chunk);
        if self.buffer.len() > self.capacity {
            let mut cut = self.buffer.len() - self.capacity;
            while !self.buffer.is_char_boundary(cut) {
                cut += 1;
            }
            self.buffer.drain(..cut);
        }
    }
}

type SharedConsole = Arc<(Mutex<Console>, Condvar)>;

fn lock(console: &Mutex<Console>) -> MutexGuard<'_, Console> {
    console.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Running emulator process
pub struct QemuProcess {
    child: Child,
    stdin: Option<ChildStdin>,
    console: SharedConsole,
}

impl QemuProcess {
    /// Start `program` with `args`
    pub fn spawn(program: &str, args: &[String]) -> Result<Self> {
        log::info!("Starting {} {}", program, args.join(" "));

        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| QemuError::Spawn {
                program: program.to_string(),
                source,
            })?;

        let console: SharedConsole =
            Arc::new((Mutex::new(Console::new(CONSOLE_CAPACITY)), Condvar::new()));
        if let Some(stdout) = child.stdout.take() {
            forward(stdout, Arc::clone(&console));
        }
        if let Some(stderr) = child.stderr.take() {
            forward(stderr, Arc::clone(&console));
        }

        Ok(Self {
            stdin: child.stdin.take(),
            child,
            console,
        })
    }

    /// OS process id
    pub fn id(&self) -> u32 {
        self.child.id()
    }

    /// Wait until `pattern` appears on the console
    ///
    /// Returns everything printed before the match; the match itself is
    /// consumed.
    pub fn expect_exact(&mut self, pattern: &str, timeout: Duration) -> Result<String> {
        let deadline = Instant::now() + timeout;
        let (mutex, ready) = &*self.console;
        let mut console = lock(mutex);

        loop {
            if let Some(pos) = console.buffer.find(pattern) {
                let before = console.buffer[..pos].to_string();
                console.buffer.drain(..pos + pattern.len());
                return Ok(before);
            }
            if console.open_pipes == 0 {
                return Err(QemuError::ConsoleClosed(pattern.to_string()));
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(QemuError::Timeout(timeout, format!("'{}'", pattern)));
            }
            console = ready
                .wait_timeout(console, remaining)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
    }

    /// Send bytes to the emulator's stdin
    pub fn write(&mut self, data: &[u8]) -> Result<()> {
        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::BrokenPipe, "stdin closed"))?;
        stdin.write_all(data)?;
        stdin.flush()?;
        Ok(())
    }

    /// Exit status if the process has already exited
    pub fn try_wait(&mut self) -> Result<Option<ExitStatus>> {
        Ok(self.child.try_wait()?)
    }

    /// Block until the process exits
    pub fn wait(&mut self) -> Result<ExitStatus> {
        self.stdin.take();
        Ok(self.child.wait()?)
    }

    /// Kill the process and reap it
    pub fn terminate(&mut self) -> Result<()> {
        if self.child.try_wait()?.is_some() {
            return Ok(());
        }
        log::debug!("Terminating {} process {}", SOURCE, self.child.id());
        self.stdin.take();
        match self.child.kill() {
            Ok(()) => {}
            // already exited between try_wait and kill
            Err(e) if e.kind() == io::ErrorKind::InvalidInput => {}
            Err(e) => return Err(e.into()),
        }
        self.child.wait()?;
        Ok(())
    }
}

impl Drop for QemuProcess {
    fn drop(&mut self) {
        if let Err(e) = self.terminate() {
            log::warn!("Failed to terminate {} process: {}", SOURCE, e);
        }
    }
}

/// Drain `pipe` on a background thread into `console` and the log
fn forward<R: Read + Send + 'static>(mut pipe: R, console: SharedConsole) {
    lock(&console.0).open_pipes += 1;

    thread::spawn(move || {
        let (mutex, ready) = &*console;
        let mut buf = [0u8; 8192];
        let mut line = String::new();
        loop {
            let n = match pipe.read(&mut buf) {
                Ok(0) | Err(_) => break,
                Ok(n) => n,
            };
            let chunk = String::from_utf8_lossy(&buf[..n]);

            line.push_str(&chunk);
            while let Some(pos) = line.find('\n') {
                log::info!("[{}] {}", SOURCE, line[..pos].trim_end_matches('\r'));
                line.drain(..=pos);
            }

            lock(mutex).push(&chunk);
            ready.notify_all();
        }
        if !line.is_empty() {
            log::info!("[{}] {}", SOURCE, line);
        }

        lock(mutex).open_pipes -= 1;
        ready.notify_all();
    });
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn sh(script: &str) -> QemuProcess {
        QemuProcess::spawn("sh", &["-c".to_string(), script.to_string()]).unwrap()
    }

    #[test]
    fn test_expect_prompt_without_newline() {
        let mut proc = sh("printf 'QEMU 8.2.0 monitor\\n(qemu) '; sleep 5");
        let before = proc
            .expect_exact("(qemu)", Duration::from_secs(5))
            .unwrap();
        assert!(before.contains("monitor"));
        proc.terminate().unwrap();
        assert!(proc.try_wait().unwrap().is_some());
    }

    #[test]
    fn test_expect_consumes_match() {
        let mut proc = sh("echo one; echo two; sleep 5");
        proc.expect_exact("one", Duration::from_secs(5)).unwrap();
        let before = proc.expect_exact("two", Duration::from_secs(5)).unwrap();
        assert_eq!(before.trim(), "");
    }

    #[test]
    fn test_console_closed() {
        let mut proc = sh("echo bye");
        let err = proc
            .expect_exact("never printed", Duration::from_secs(5))
            .unwrap_err();
        assert!(matches!(err, QemuError::ConsoleClosed(_)));
    }

    #[test]
    fn test_timeout() {
        let mut proc = sh("sleep 5");
        let err = proc
            .expect_exact("boot", Duration::from_millis(100))
            .unwrap_err();
        assert!(matches!(err, QemuError::Timeout(..)));
    }

    #[test]
    fn test_stdin_echo() {
        let mut proc = sh("read line; echo \"got $line\"; sleep 5");
        proc.write(b"ping\n").unwrap();
        proc.expect_exact("got ping", Duration::from_secs(5)).unwrap();
    }

    #[test]
    fn test_console_keeps_newest_output() {
        let mut console = Console::new(8);
        console.push("0123456789");
        assert_eq!(console.buffer, "23456789");
        console.push("ab");
        assert_eq!(console.buffer, "456789ab");
    }

    #[test]
    fn test_console_trim_on_char_boundary() {
        let mut console = Console::new(4);
        console.push("aé€b");
        assert!(console.buffer.len() <= 4);
        assert!(console.buffer.ends_with('b'));
    }

    #[test]
    fn test_unread_output_is_bounded() {
        let mut proc = sh("head -c 3000000 /dev/zero | tr '\\0' x; echo; echo done; sleep 5");
        proc.expect_exact("done", Duration::from_secs(20)).unwrap();
        assert!(lock(&proc.console.0).buffer.len() <= CONSOLE_CAPACITY);
    }

    #[test]
    fn test_spawn_missing_program() {
        let err = QemuProcess::spawn("/nonexistent/qemu-system-xtensa", &[]).err().unwrap();
        assert!(matches!(err, QemuError::Spawn { .. }));
    }
}
