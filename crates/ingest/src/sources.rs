//! Line source implementations.

use std::collections::VecDeque;
use std::path::Path;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Lines};

use shotscope_common::error::{ShotscopeError, ShotscopeResult};

use crate::LineSource;

/// A fixed list of lines, delivered immediately.
pub struct StubSource {
    lines: VecDeque<String>,
}

impl StubSource {
    pub fn new(lines: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            lines: lines.into_iter().map(Into::into).collect(),
        }
    }

    pub fn empty() -> Self {
        Self {
            lines: VecDeque::new(),
        }
    }

    /// Lines not yet delivered.
    pub fn remaining(&self) -> usize {
        self.lines.len()
    }
}

#[async_trait::async_trait]
impl LineSource for StubSource {
    async fn next_line(&mut self) -> ShotscopeResult<Option<String>> {
        Ok(self.lines.pop_front())
    }

    fn name(&self) -> &str {
        "stub"
    }
}

/// Lines from any async buffered reader (stdin, a file, a serial stream).
pub struct ReaderSource<R> {
    lines: Lines<R>,
    name: String,
}

impl<R> ReaderSource<R>
where
    R: AsyncBufRead + Unpin + Send,
{
    pub fn new(reader: R, name: impl Into<String>) -> Self {
        Self {
            lines: reader.lines(),
            name: name.into(),
        }
    }
}

impl ReaderSource<BufReader<tokio::io::Stdin>> {
    /// Lines piped into this process.
    pub fn stdin() -> Self {
        Self::new(BufReader::new(tokio::io::stdin()), "stdin")
    }
}

impl ReaderSource<BufReader<tokio::fs::File>> {
    /// Lines from a capture file.
    pub async fn open_file(path: impl AsRef<Path>) -> ShotscopeResult<Self> {
        let path = path.as_ref();
        let file = tokio::fs::File::open(path).await.map_err(|e| {
            ShotscopeError::ingest(format!("Cannot open {}: {e}", path.display()))
        })?;
        Ok(Self::new(BufReader::new(file), path.display().to_string()))
    }
}

#[async_trait::async_trait]
impl<R> LineSource for ReaderSource<R>
where
    R: AsyncBufRead + Unpin + Send,
{
    async fn next_line(&mut self) -> ShotscopeResult<Option<String>> {
        match self.lines.next_line().await {
            Ok(line) => Ok(line),
            // Garbled bytes on the link: report and keep reading.
            Err(e) if e.kind() == std::io::ErrorKind::InvalidData => {
                Err(ShotscopeError::ingest(format!("Undecodable line: {e}")))
            }
            Err(e) => Err(e.into()),
        }
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Open the device serial port as a line source.
#[cfg(feature = "serial")]
pub fn open_serial(
    port: &str,
    baud_rate: u32,
) -> ShotscopeResult<ReaderSource<BufReader<tokio_serial::SerialStream>>> {
    use tokio_serial::SerialPortBuilderExt;

    let stream = tokio_serial::new(port, baud_rate)
        .open_native_async()
        .map_err(|e| ShotscopeError::ingest(format!("Cannot open serial port {port}: {e}")))?;
    tracing::info!(port, baud_rate, "Serial port opened");
    Ok(ReaderSource::new(BufReader::new(stream), port))
}
