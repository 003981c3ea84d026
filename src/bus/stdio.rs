//! Line-oriented transport for local runs.
//!
//! Commands arrive as one JSON document per line (stdin by default); events
//! leave as `key<TAB>payload` lines (stdout by default). Blank lines are
//! skipped.

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use futures::future::BoxFuture;
use tokio::io::{
    AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader, Lines, Stdout,
};
use tokio::sync::Mutex;
use tracing::debug;

use super::{
    Acknowledge, BusError, CommandSource, EventSink, InboundDelivery, OutboundRecord, Result,
};

type BoxedLines = Lines<Box<dyn AsyncBufRead + Send + Unpin>>;

struct LineAck {
    line: u64,
}

impl Acknowledge for LineAck {
    fn ack(self: Box<Self>) -> BoxFuture<'static, Result<()>> {
        Box::pin(async move {
            debug!(line = self.line, "Acknowledged command line");
            Ok(())
        })
    }
}

/// Command source reading one payload per line.
pub struct LineCommandSource {
    lines: Mutex<BoxedLines>,
    line: AtomicU64,
}

impl LineCommandSource {
    pub fn new<R>(reader: R) -> Self
    where
        R: AsyncBufRead + Send + Unpin + 'static,
    {
        let reader: Box<dyn AsyncBufRead + Send + Unpin> = Box::new(reader);
        Self {
            lines: Mutex::new(reader.lines()),
            line: AtomicU64::new(0),
        }
    }

    /// Read commands from standard input.
    pub fn stdin() -> Self {
        Self::new(BufReader::new(tokio::io::stdin()))
    }
}

#[async_trait]
impl CommandSource for LineCommandSource {
    async fn recv(&self) -> Result<Option<InboundDelivery>> {
        let mut lines = self.lines.lock().await;
        loop {
            let next = lines
                .next_line()
                .await
                .map_err(|e| BusError::Receive(e.to_string()))?;
            let line_number = self.line.fetch_add(1, Ordering::SeqCst) + 1;

            match next {
                Some(line) if line.trim().is_empty() => continue,
                Some(line) => {
                    let ack = LineAck { line: line_number };
                    return Ok(Some(InboundDelivery::new(
                        line.into_bytes(),
                        None,
                        Box::new(ack),
                    )));
                }
                None => return Ok(None),
            }
        }
    }
}

/// Event sink writing `key<TAB>payload` lines.
pub struct LineEventSink<W> {
    writer: Mutex<W>,
}

impl<W> LineEventSink<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }

    pub fn into_inner(self) -> W {
        self.writer.into_inner()
    }
}

impl LineEventSink<Stdout> {
    /// Write events to standard output.
    pub fn stdout() -> Self {
        Self::new(tokio::io::stdout())
    }
}

#[async_trait]
impl<W> EventSink for LineEventSink<W>
where
    W: AsyncWrite + Send + Unpin + 'static,
{
    async fn publish(&self, record: OutboundRecord) -> Result<()> {
        let mut line = Vec::with_capacity(record.key.len() + record.payload.len() + 2);
        line.extend_from_slice(record.key.as_bytes());
        line.push(b'\t');
        line.extend_from_slice(&record.payload);
        line.push(b'\n');

        let mut writer = self.writer.lock().await;
        writer
            .write_all(&line)
            .await
            .map_err(|e| BusError::Publish(e.to_string()))?;
        writer
            .flush()
            .await
            .map_err(|e| BusError::Publish(e.to_string()))
    }
}
