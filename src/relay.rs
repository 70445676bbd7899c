//! Output multiplexing between external processes and the client
//!
//! Producers ([`relay`]) read raw process output, cut it at line boundaries
//! and push [`OutputRecord`]s into a channel. A single consumer
//! ([`ConnectionWriter`]) owns the socket's write half; it prefixes each line
//! with its stream tag, redacts the image reference and writes it out. The
//! pipeline's own diagnostics and the final result travel through the same
//! channel, so the result line is always the last thing written.

use crate::protocol::{encode_line, ResultLine, Stream};
use crate::tag::ImageTag;
use bytes::{Buf, BytesMut};
use std::borrow::Cow;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Replacement for the image reference in relayed output
pub const REDACTED_PLACEHOLDER: &str = "image";

const CHANNEL_CAPACITY: usize = 256;
const READ_CHUNK: usize = 8 * 1024;

/// A unit of output headed for the client
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputRecord {
    Line { stream: Stream, text: String },
    Result(ResultLine),
}

/// Cloneable producer handle onto the connection's output channel
#[derive(Debug, Clone)]
pub struct OutputSink {
    tx: mpsc::Sender<OutputRecord>,
}

impl OutputSink {
    /// Send a single line; `text` must not contain a newline
    pub async fn line(&self, stream: Stream, text: impl Into<String>) {
        self.send(OutputRecord::Line {
            stream,
            text: text.into(),
        })
        .await;
    }

    /// Send multi-line text, one record per line
    pub async fn text(&self, stream: Stream, text: &str) {
        for line in text.split('\n') {
            self.line(stream, line.trim_end_matches('\r')).await;
        }
    }

    pub async fn result(&self, result: ResultLine) {
        self.send(OutputRecord::Result(result)).await;
    }

    async fn send(&self, record: OutputRecord) {
        if self.tx.send(record).await.is_err() {
            debug!("Output channel closed, dropping record");
        }
    }
}

/// Create the output channel for one connection
pub fn channel() -> (OutputSink, mpsc::Receiver<OutputRecord>) {
    let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
    (OutputSink { tx }, rx)
}

/// Literal substring redaction of one image reference
#[derive(Debug, Clone, Default)]
pub struct Redactor {
    needles: Option<(String, String)>,
}

impl Redactor {
    pub fn for_tag(tag: &ImageTag) -> Self {
        Self {
            needles: Some((tag.latest(), tag.as_str().to_string())),
        }
    }

    /// A redactor that leaves every line untouched
    pub fn disabled() -> Self {
        Self::default()
    }

    /// Replace every occurrence of the reference, with or without `:latest`.
    ///
    /// Repeats until no occurrence is left, so a replacement can never splice
    /// a new occurrence together; the result is therefore a fixed point.
    pub fn redact<'a>(&self, line: &'a str) -> Cow<'a, str> {
        let Some((latest, reference)) = &self.needles else {
            return Cow::Borrowed(line);
        };
        if !line.contains(reference.as_str()) {
            return Cow::Borrowed(line);
        }

        let mut out = line.to_string();
        while out.contains(reference.as_str()) {
            out = out
                .replace(latest.as_str(), REDACTED_PLACEHOLDER)
                .replace(reference.as_str(), REDACTED_PLACEHOLDER);
        }
        Cow::Owned(out)
    }
}

/// Relay one process stream into the output channel, line by line.
///
/// A trailing partial line is flushed at end of input; empty input sends
/// nothing. Returns the number of lines relayed.
pub async fn relay<R>(stream: Stream, mut reader: R, sink: OutputSink) -> std::io::Result<usize>
where
    R: AsyncRead + Unpin,
{
    let mut buf = BytesMut::with_capacity(READ_CHUNK);
    let mut lines = 0;

    loop {
        let n = reader.read_buf(&mut buf).await?;

        while let Some(pos) = buf.iter().position(|b| *b == b'\n') {
            let line = buf.split_to(pos + 1);
            sink.line(stream, decode_line(&line[..pos])).await;
            lines += 1;
        }

        if n == 0 {
            if buf.has_remaining() {
                sink.line(stream, decode_line(&buf)).await;
                buf.clear();
                lines += 1;
            }
            break;
        }
    }

    Ok(lines)
}

/// Spawn [`relay`] as its own task
pub fn spawn_relay<R>(stream: Stream, reader: R, sink: OutputSink) -> JoinHandle<usize>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        match relay(stream, reader, sink).await {
            Ok(lines) => lines,
            Err(e) => {
                warn!(stream = %stream, "Failed to read process output: {}", e);
                0
            }
        }
    })
}

fn decode_line(bytes: &[u8]) -> String {
    let bytes = bytes.strip_suffix(b"\r").unwrap_or(bytes);
    String::from_utf8_lossy(bytes).into_owned()
}

/// Sole owner of the connection's write half
pub struct ConnectionWriter<W> {
    writer: W,
    redactor: Redactor,
    broken: bool,
}

impl<W> ConnectionWriter<W>
where
    W: AsyncWrite + Unpin,
{
    pub fn new(writer: W, redactor: Redactor) -> Self {
        Self {
            writer,
            redactor,
            broken: false,
        }
    }

    /// Drain `rx` until every sender is gone, then shut the writer down.
    ///
    /// Write failures (client went away) are logged once; the channel is still
    /// drained so that producers never stall on a dead connection.
    pub async fn run(mut self, mut rx: mpsc::Receiver<OutputRecord>) -> W {
        while let Some(record) = rx.recv().await {
            let encoded = match &record {
                OutputRecord::Line { stream, text } => {
                    encode_line(*stream, &self.redactor.redact(text))
                }
                OutputRecord::Result(result) => result.encode(),
            };
            self.write(encoded.as_bytes()).await;
        }

        if !self.broken {
            if let Err(e) = self.writer.shutdown().await {
                debug!("Failed to shut down connection: {}", e);
            }
        }
        self.writer
    }

    async fn write(&mut self, bytes: &[u8]) {
        if self.broken {
            return;
        }
        if let Err(e) = self.writer.write_all(bytes).await {
            warn!("Client connection lost: {}", e);
            self.broken = true;
        }
    }
}
