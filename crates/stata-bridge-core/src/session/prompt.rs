//! Prompt synchronisation over the engine's terminal output.
//!
//! The console signals readiness with `. ` at the start of a line and
//! "statement continues" with `> `. Everything else is accumulated output,
//! with the terminal's `\r\n` line endings folded to `\n`.

use std::io;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::trace;

/// Quiet period after a candidate prompt before it is accepted.
///
/// A `. ` at the end of the buffer may just be the start of an echoed command
/// whose remainder has not been flushed yet.
pub(crate) const PROMPT_SETTLE: Duration = Duration::from_millis(50);

const READ_CHUNK: usize = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PromptKind {
    /// `. `: idle and waiting for a command.
    Primary,
    /// `> `: inside a multi-line statement.
    Continuation,
}

/// What ended a read.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum ReadOutcome {
    /// The primary prompt arrived; `output` is everything printed before it.
    Ready { output: String },
    /// The stream closed before a primary prompt.
    Eof { output: String },
}

/// Locate a prompt at the very end of `buffer`.
///
/// Returns the kind and the index where the prompt (including its leading
/// line break) starts.
pub(crate) fn match_prompt(buffer: &[u8]) -> Option<(PromptKind, usize)> {
    if buffer == b". " {
        return Some((PromptKind::Primary, 0));
    }
    let kind = if buffer.ends_with(b"\n. ") {
        PromptKind::Primary
    } else if buffer.ends_with(b"\n> ") {
        PromptKind::Continuation
    } else {
        return None;
    };
    let mut start = buffer.len() - 3;
    if start > 0 && buffer[start - 1] == b'\r' {
        start -= 1;
    }
    Some((kind, start))
}

fn decode(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).replace("\r\n", "\n")
}

/// Buffered reader that yields output in prompt-delimited pieces.
///
/// Unconsumed bytes stay in the internal buffer, so a caller may wrap any
/// read in a timeout, give up, and later resume where it left off.
#[derive(Debug)]
pub(crate) struct PromptReader<R> {
    inner: R,
    buffer: Vec<u8>,
    eof: bool,
}

impl<R: AsyncRead + Unpin> PromptReader<R> {
    pub(crate) fn new(inner: R) -> Self {
        Self {
            inner,
            buffer: Vec::new(),
            eof: false,
        }
    }

    /// Read until the next prompt of either kind.
    ///
    /// Returns `None` at end of stream; whatever was buffered is left for
    /// [`take_buffered`](Self::take_buffered).
    pub(crate) async fn next_prompt(&mut self) -> io::Result<Option<(PromptKind, String)>> {
        let mut chunk = [0u8; READ_CHUNK];
        loop {
            if let Some((kind, start)) = match_prompt(&self.buffer) {
                if self.eof || !self.settle(&mut chunk).await? {
                    let before = decode(&self.buffer[..start]);
                    self.buffer.clear();
                    trace!(?kind, bytes = before.len(), "prompt matched");
                    return Ok(Some((kind, before)));
                }
                continue;
            }
            if self.eof {
                return Ok(None);
            }
            let n = self.inner.read(&mut chunk).await?;
            if n == 0 {
                self.eof = true;
                continue;
            }
            self.buffer.extend_from_slice(&chunk[..n]);
        }
    }

    /// Accumulate output across continuation prompts until the primary prompt
    /// or end of stream.
    pub(crate) async fn read_until_ready(&mut self) -> io::Result<ReadOutcome> {
        let mut output = String::new();
        loop {
            match self.next_prompt().await? {
                Some((PromptKind::Primary, before)) => {
                    output.push_str(&before);
                    return Ok(ReadOutcome::Ready { output });
                }
                Some((PromptKind::Continuation, before)) => output.push_str(&before),
                None => {
                    output.push_str(&self.take_buffered());
                    return Ok(ReadOutcome::Eof { output });
                }
            }
        }
    }

    /// Drain and return whatever is buffered without a prompt.
    pub(crate) fn take_buffered(&mut self) -> String {
        let text = decode(&self.buffer);
        self.buffer.clear();
        text
    }

    /// Wait briefly for more output. Returns `true` if anything arrived.
    async fn settle(&mut self, chunk: &mut [u8]) -> io::Result<bool> {
        match tokio::time::timeout(PROMPT_SETTLE, self.inner.read(chunk)).await {
            Err(_elapsed) => Ok(false),
            Ok(Ok(0)) => {
                self.eof = true;
                Ok(false)
            }
            Ok(Ok(n)) => {
                self.buffer.extend_from_slice(&chunk[..n]);
                Ok(true)
            }
            Ok(Err(err)) => Err(err),
        }
    }
}
