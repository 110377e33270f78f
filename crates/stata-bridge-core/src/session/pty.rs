//! Pseudo-terminal transport for the interactive engine.
//!
//! The console only behaves like a console when its standard streams are a
//! terminal, so the engine runs on the slave side of a PTY. The master side is
//! read by a dedicated thread and surfaced to async code as an [`AsyncRead`].

use std::ffi::OsStr;
use std::io::{self, Read, Write};
use std::path::Path;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

use portable_pty::{native_pty_system, Child, CommandBuilder, MasterPty, PtySize};
use tokio::io::{AsyncRead, ReadBuf};
use tokio::sync::mpsc;
use tracing::{debug, trace};

const READ_CHUNK: usize = 4096;

/// Wide enough that echoed `do "<path>"` lines are not wrapped by the console.
const PTY_SIZE: PtySize = PtySize {
    rows: 50,
    cols: 255,
    pixel_width: 0,
    pixel_height: 0,
};

/// A child running on a fresh pseudo-terminal.
pub(crate) struct PtyProcess {
    pub(crate) child: Box<dyn Child + Send + Sync>,
    pub(crate) writer: PtyWriter,
    pub(crate) output: PtyOutput,
    /// Closing the master hangs up the terminal, so it lives as long as the child.
    pub(crate) master: Box<dyn MasterPty + Send>,
}

/// Spawn `program` with `args` on a new PTY, in `cwd`, with `TERM=dumb`.
pub(crate) fn spawn<S: AsRef<OsStr>>(
    program: &Path,
    args: &[S],
    cwd: &Path,
    label: &str,
) -> io::Result<PtyProcess> {
    let pair = native_pty_system()
        .openpty(PTY_SIZE)
        .map_err(|err| io::Error::other(format!("failed to open pty: {err}")))?;

    let mut cmd = CommandBuilder::new(program);
    cmd.args(args);
    cmd.cwd(cwd);
    for (key, value) in std::env::vars_os() {
        cmd.env(key, value);
    }
    cmd.env("TERM", "dumb");
    cmd.env_remove("PWD");

    let child = pair
        .slave
        .spawn_command(cmd)
        .map_err(|err| io::Error::other(err.to_string()))?;
    // Only the child may hold the slave, or the master never sees a hangup.
    drop(pair.slave);

    let reader = pair
        .master
        .try_clone_reader()
        .map_err(|err| io::Error::other(err.to_string()))?;
    let writer = pair
        .master
        .take_writer()
        .map_err(|err| io::Error::other(err.to_string()))?;

    Ok(PtyProcess {
        child,
        writer: PtyWriter {
            inner: Arc::new(Mutex::new(writer)),
        },
        output: PtyOutput::pump(reader, label)?,
        master: pair.master,
    })
}

/// Line writer for the master side. Writes run on the blocking pool.
pub(crate) struct PtyWriter {
    inner: Arc<Mutex<Box<dyn Write + Send>>>,
}

impl PtyWriter {
    pub(crate) async fn write_line(&self, line: &str) -> io::Result<()> {
        let inner = Arc::clone(&self.inner);
        let mut bytes = Vec::with_capacity(line.len() + 1);
        bytes.extend_from_slice(line.as_bytes());
        bytes.push(b'\n');
        tokio::task::spawn_blocking(move || {
            let mut writer = inner
                .lock()
                .map_err(|_| io::Error::other("pty writer lock poisoned"))?;
            writer.write_all(&bytes)?;
            writer.flush()
        })
        .await
        .map_err(io::Error::from)?
    }
}

/// Terminal output as an async byte stream.
///
/// Chunks arrive from the reader thread over a channel. A chunk that does not
/// fit the caller's buffer is kept and served first on the next read, so
/// dropping a pending read loses nothing.
pub(crate) struct PtyOutput {
    rx: mpsc::UnboundedReceiver<Vec<u8>>,
    pending: Vec<u8>,
    offset: usize,
}

impl PtyOutput {
    fn pump(mut reader: Box<dyn Read + Send>, label: &str) -> io::Result<Self> {
        let (tx, rx) = mpsc::unbounded_channel();
        let name = format!("pty-{label}");
        std::thread::Builder::new().name(name).spawn(move || {
            let mut buf = [0u8; READ_CHUNK];
            loop {
                match reader.read(&mut buf) {
                    Ok(0) => break,
                    Ok(n) => {
                        if tx.send(buf[..n].to_vec()).is_err() {
                            break;
                        }
                    }
                    Err(err) if err.kind() == io::ErrorKind::Interrupted => {}
                    // Linux reports EIO once the child side has hung up.
                    Err(err) => {
                        trace!(error = %err, "pty read ended");
                        break;
                    }
                }
            }
            debug!("pty reader finished");
        })?;
        Ok(Self::from_channel(rx))
    }

    pub(crate) fn from_channel(rx: mpsc::UnboundedReceiver<Vec<u8>>) -> Self {
        Self {
            rx,
            pending: Vec::new(),
            offset: 0,
        }
    }
}

impl AsyncRead for PtyOutput {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = &mut *self;
        if this.offset >= this.pending.len() {
            match this.rx.poll_recv(cx) {
                Poll::Ready(Some(chunk)) => {
                    this.pending = chunk;
                    this.offset = 0;
                }
                // Sender gone: end of stream.
                Poll::Ready(None) => return Poll::Ready(Ok(())),
                Poll::Pending => return Poll::Pending,
            }
        }
        let available = &this.pending[this.offset..];
        let n = available.len().min(buf.remaining());
        buf.put_slice(&available[..n]);
        this.offset += n;
        Poll::Ready(Ok(()))
    }
}
