//! Snapshot store backed by the `zfs` command.

use crate::error::{StoreError, StoreResult};
use crate::store::{
    DestroyTarget, ListingEntry, SendRequest, SnapshotSink, SnapshotStore, SnapshotStream,
};
use std::ffi::OsString;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command, Stdio};
use std::thread::{self, JoinHandle};
use tracing::debug;

/// A snapshot store that drives the `zfs` command-line tool.
///
/// Every operation runs one `zfs` process. Sends and receives keep their
/// process running for the lifetime of the returned stream or sink; dropping
/// either before it finished kills the process. A receive is killed before its
/// input is closed, so an abandoned transfer never reaches the receiver as a
/// complete stream.
///
/// # Example
///
/// ```no_run
/// use zbackup_store::{SnapshotStore, ZfsStore};
///
/// let store = ZfsStore::new();
/// for entry in store.list("tank").unwrap() {
///     println!("{} {}", entry.identifier, entry.creation);
/// }
/// ```
#[derive(Debug, Clone)]
pub struct ZfsStore {
    binary: PathBuf,
}

impl Default for ZfsStore {
    fn default() -> Self {
        Self {
            binary: PathBuf::from("zfs"),
        }
    }
}

impl ZfsStore {
    /// Creates a store that runs `zfs` from `PATH`.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store that runs the given binary instead of `zfs`.
    pub fn with_binary(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    /// Returns the binary this store runs.
    #[must_use]
    pub fn binary(&self) -> &Path {
        &self.binary
    }

    fn command(&self, args: &[String]) -> Command {
        let mut command = Command::new(&self.binary);
        command.args(args);
        command
    }

    fn describe(&self, args: &[String]) -> String {
        let mut line = OsString::from(self.binary.as_os_str());
        for arg in args {
            line.push(" ");
            line.push(arg);
        }
        line.to_string_lossy().into_owned()
    }

    /// Runs a one-shot command and returns its stdout.
    fn run(&self, args: &[String]) -> StoreResult<String> {
        let description = self.describe(args);
        debug!(command = %description, "running zfs command");

        let output = self.command(args).stdin(Stdio::null()).output()?;
        if !output.status.success() {
            return Err(StoreError::CommandFailed {
                command: description,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// Arguments for listing the snapshots of a volume with parseable creation times.
pub(crate) fn list_args(volume: &str) -> Vec<String> {
    [
        "list", "-t", "snapshot", volume, "-H", "-o", "name,creation", "-p",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

/// Arguments for a full or incremental (`-I`) send.
pub(crate) fn send_args(request: &SendRequest) -> Vec<String> {
    let mut args = vec!["send".to_string()];
    if let Some(from) = &request.from {
        args.push("-I".to_string());
        args.push(format!("{}@{}", request.volume, from));
    }
    args.push(format!("{}@{}", request.volume, request.to));
    args
}

/// Arguments for a forced receive into `target`.
pub(crate) fn receive_args(target: &str) -> Vec<String> {
    vec!["receive".to_string(), "-F".to_string(), target.to_string()]
}

/// Arguments for a rollback.
pub(crate) fn rollback_args(volume: &str, snapshot: &str, recursive: bool) -> Vec<String> {
    let mut args = vec!["rollback".to_string()];
    if recursive {
        args.push("-r".to_string());
    }
    args.push(format!("{volume}@{snapshot}"));
    args
}

/// Splits `zfs list -H -o name,creation -p` output into entries.
pub(crate) fn parse_listing(volume: &str, output: &str) -> StoreResult<Vec<ListingEntry>> {
    output
        .lines()
        .filter(|line| !line.is_empty())
        .map(|line| {
            line.split_once('\t')
                .map(|(identifier, creation)| ListingEntry::new(identifier, creation.trim()))
                .ok_or_else(|| StoreError::MalformedListing {
                    volume: volume.to_string(),
                    line: line.to_string(),
                })
        })
        .collect()
}

impl SnapshotStore for ZfsStore {
    fn list(&self, volume: &str) -> StoreResult<Vec<ListingEntry>> {
        let output = self.run(&list_args(volume))?;
        parse_listing(volume, &output)
    }

    fn create(&self, volume: &str, name: &str) -> StoreResult<()> {
        let reference = format!("{volume}@{name}");
        match self.run(&["snapshot".to_string(), reference.clone()]) {
            Err(StoreError::CommandFailed { stderr, .. }) if stderr.contains("exists") => {
                Err(StoreError::AlreadyExists(reference))
            }
            result => result.map(|_| ()),
        }
    }

    fn destroy(&self, target: &DestroyTarget) -> StoreResult<()> {
        self.run(&["destroy".to_string(), target.to_string()])
            .map(|_| ())
    }

    fn send(&self, request: &SendRequest) -> StoreResult<SnapshotStream> {
        let args = send_args(request);
        let description = self.describe(&args);
        debug!(command = %description, "starting producer");

        let mut child = self
            .command(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| io::Error::new(io::ErrorKind::BrokenPipe, "producer has no stdout"))?;
        let stderr = StderrDrain::spawn(child.stderr.take());

        Ok(Box::new(ZfsSendStream {
            description,
            child: Some(child),
            stdout,
            stderr,
        }))
    }

    fn receive(&self, target_volume: &str) -> StoreResult<Box<dyn SnapshotSink>> {
        let args = receive_args(target_volume);
        let description = self.describe(&args);
        debug!(command = %description, "starting consumer");

        let mut child = self
            .command(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()?;
        let stdin = child.stdin.take();
        let stderr = StderrDrain::spawn(child.stderr.take());

        Ok(Box::new(ZfsReceiveSink {
            description,
            child: Some(child),
            stdin,
            stderr,
        }))
    }

    fn rollback(&self, volume: &str, snapshot: &str, recursive: bool) -> StoreResult<()> {
        self.run(&rollback_args(volume, snapshot, recursive))
            .map(|_| ())
    }
}

/// Kills and reaps a process that is being abandoned.
fn abandon(child: &mut Child) {
    let _ = child.kill();
    let _ = child.wait();
}

/// Collects a streaming child's stderr on a helper thread so diagnostics
/// never fill the pipe while the relay is running.
struct StderrDrain(Option<JoinHandle<String>>);

impl StderrDrain {
    fn spawn(stderr: Option<ChildStderr>) -> Self {
        Self(stderr.map(|mut pipe| {
            thread::spawn(move || {
                let mut bytes = Vec::new();
                let _ = pipe.read_to_end(&mut bytes);
                String::from_utf8_lossy(&bytes).trim().to_string()
            })
        }))
    }

    /// Returns everything the child wrote. Call only after the child exited.
    fn collect(&mut self) -> String {
        self.0
            .take()
            .and_then(|handle| handle.join().ok())
            .unwrap_or_default()
    }
}

struct ZfsSendStream {
    description: String,
    child: Option<Child>,
    stdout: ChildStdout,
    stderr: StderrDrain,
}

impl ZfsSendStream {
    /// Waits for the producer once its output is exhausted.
    fn reap(&mut self) -> io::Result<()> {
        let Some(mut child) = self.child.take() else {
            return Ok(());
        };
        let status = child.wait()?;
        if status.success() {
            Ok(())
        } else {
            Err(io::Error::other(format!(
                "`{}` exited with {}: {}",
                self.description,
                status,
                self.stderr.collect()
            )))
        }
    }
}

impl Read for ZfsSendStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let read = self.stdout.read(buf)?;
        if read == 0 && !buf.is_empty() {
            self.reap()?;
        }
        Ok(read)
    }
}

impl Drop for ZfsSendStream {
    fn drop(&mut self) {
        if let Some(child) = self.child.as_mut() {
            abandon(child);
        }
    }
}

struct ZfsReceiveSink {
    description: String,
    child: Option<Child>,
    stdin: Option<ChildStdin>,
    stderr: StderrDrain,
}

impl Write for ZfsReceiveSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::BrokenPipe, "consumer input closed"))?;
        stdin.write_all(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        match self.stdin.as_mut() {
            Some(stdin) => stdin.flush(),
            None => Ok(()),
        }
    }
}

impl SnapshotSink for ZfsReceiveSink {
    fn finish(mut self: Box<Self>) -> StoreResult<()> {
        drop(self.stdin.take());
        let Some(mut child) = self.child.take() else {
            return Ok(());
        };

        let status = child.wait()?;
        if status.success() {
            Ok(())
        } else {
            Err(StoreError::CommandFailed {
                command: self.description.clone(),
                stderr: self.stderr.collect(),
            })
        }
    }
}

impl Drop for ZfsReceiveSink {
    fn drop(&mut self) {
        // Closing stdin first would hand the receiver a clean end of stream.
        if let Some(child) = self.child.as_mut() {
            let _ = child.kill();
        }
        drop(self.stdin.take());
        if let Some(child) = self.child.as_mut() {
            let _ = child.wait();
        }
    }
}
