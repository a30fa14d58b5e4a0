//! Rendering workers and the pool that hands them to source stages.
//!
//! A worker turns a document path into a stream of paragraph records. The
//! pool owns a fixed number of workers; a source stage leases one for the
//! length of a document and the lease returns it on drop.

use crate::config::WorkerConfig;
use crate::core::record::{ParagraphRecord, ParagraphSource, RecordSource, SourceEvent};
use crate::docx_parser::DocxRenderer;
use crate::error::SourceError;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::io::{BufRead, BufReader, ErrorKind, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::ops::{Deref, DerefMut};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

/// Socket read timeout on worker connections; a blocked read wakes at this
/// rate to check for cancellation.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Request line sent to a remote worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderRequest {
    pub path: PathBuf,
}

/// Response lines sent back by a remote worker, one JSON object per line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum WorkerMessage {
    Paragraph(ParagraphRecord),
    End,
    Error { message: String },
}

/// A rendering worker that can be connected and asked for one document at
/// a time.
pub trait RenderWorker: Send {
    fn name(&self) -> &str;

    fn is_connected(&self) -> bool;

    fn connect(&mut self) -> Result<(), SourceError>;

    /// Starts rendering `path`; the returned source borrows the worker
    /// until the document ends. Once `token` is cancelled, both this call
    /// and the source's pulls return [`SourceError::Cancelled`] promptly.
    fn open<'w>(
        &'w mut self,
        path: &Path,
        token: &CancellationToken,
    ) -> Result<Box<dyn ParagraphSource + 'w>, SourceError>;
}

/// Renders documents in-process.
#[derive(Debug)]
pub struct DocxWorker {
    name: String,
    renderer: DocxRenderer,
}

impl DocxWorker {
    pub fn new(index: usize) -> Self {
        Self {
            name: format!("docx-{}", index),
            renderer: DocxRenderer::new(),
        }
    }
}

impl RenderWorker for DocxWorker {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_connected(&self) -> bool {
        true
    }

    fn connect(&mut self) -> Result<(), SourceError> {
        Ok(())
    }

    fn open<'w>(
        &'w mut self,
        path: &Path,
        token: &CancellationToken,
    ) -> Result<Box<dyn ParagraphSource + 'w>, SourceError> {
        let records = self.renderer.render_cancellable(path, token)?;
        Ok(Box::new(RecordSource::new(records)))
    }
}

struct Connection {
    reader: BufReader<TcpStream>,
    writer: TcpStream,
}

/// Client for a rendering worker listening on a TCP address.
pub struct TcpWorker {
    address: String,
    read_timeout: Duration,
    connection: Option<Connection>,
}

impl TcpWorker {
    /// `read_timeout` bounds how long a document may go without a response
    /// line, and also bounds connection setup.
    pub fn new(address: impl Into<String>, read_timeout: Duration) -> Self {
        Self {
            address: address.into(),
            read_timeout,
            connection: None,
        }
    }
}

impl RenderWorker for TcpWorker {
    fn name(&self) -> &str {
        &self.address
    }

    fn is_connected(&self) -> bool {
        self.connection.is_some()
    }

    fn connect(&mut self) -> Result<(), SourceError> {
        let unavailable = |reason: String| SourceError::Unavailable {
            worker: self.address.clone(),
            reason,
        };
        let addr = self
            .address
            .to_socket_addrs()
            .map_err(|e| unavailable(e.to_string()))?
            .next()
            .ok_or_else(|| unavailable("address resolved to nothing".to_string()))?;
        let stream = TcpStream::connect_timeout(&addr, self.read_timeout)
            .map_err(|e| unavailable(e.to_string()))?;
        stream.set_read_timeout(Some(POLL_INTERVAL.min(self.read_timeout)))?;
        stream.set_nodelay(true)?;
        let writer = stream.try_clone()?;
        self.connection = Some(Connection {
            reader: BufReader::new(stream),
            writer,
        });
        info!("connected to rendering worker {}", self.address);
        Ok(())
    }

    fn open<'w>(
        &'w mut self,
        path: &Path,
        token: &CancellationToken,
    ) -> Result<Box<dyn ParagraphSource + 'w>, SourceError> {
        if token.is_cancelled() {
            return Err(SourceError::Cancelled);
        }
        let Some(connection) = self.connection.as_mut() else {
            return Err(SourceError::Unavailable {
                worker: self.address.clone(),
                reason: "not connected".to_string(),
            });
        };

        let mut line = serde_json::to_vec(&RenderRequest {
            path: path.to_path_buf(),
        })
        .map_err(|e| SourceError::Protocol(e.to_string()))?;
        line.push(b'\n');
        if let Err(e) = connection.writer.write_all(&line).and_then(|_| connection.writer.flush()) {
            self.connection = None;
            return Err(e.into());
        }

        Ok(Box::new(TcpSource {
            connection: &mut self.connection,
            worker: &self.address,
            path: path.to_path_buf(),
            read_timeout: self.read_timeout,
            token: token.clone(),
            pending: Vec::new(),
            finished: false,
        }))
    }
}

/// Stream of one document's responses over a worker connection.
///
/// The connection is dropped if the stream is abandoned, broken or
/// cancelled, so the next lease reconnects instead of reading stale lines.
/// Dropping it also closes the socket, which tells the worker to stop.
struct TcpSource<'w> {
    connection: &'w mut Option<Connection>,
    worker: &'w str,
    path: PathBuf,
    read_timeout: Duration,
    token: CancellationToken,
    /// Bytes of a response line received so far.
    pending: Vec<u8>,
    finished: bool,
}

impl TcpSource<'_> {
    fn fail(&mut self, error: SourceError) -> SourceEvent {
        *self.connection = None;
        self.finished = true;
        SourceEvent::Error(error)
    }

    /// Reads one complete response line, waking every poll interval to
    /// check the token and the read deadline.
    fn next_line(&mut self) -> Result<Vec<u8>, SourceError> {
        let Some(connection) = self.connection.as_mut() else {
            return Err(SourceError::Protocol("connection lost".to_string()));
        };
        let deadline = Instant::now() + self.read_timeout;
        loop {
            if self.token.is_cancelled() {
                return Err(SourceError::Cancelled);
            }
            match connection.reader.read_until(b'\n', &mut self.pending) {
                Ok(0) => {
                    return Err(SourceError::Protocol(
                        "connection closed before end of document".to_string(),
                    ))
                }
                Ok(_) if self.pending.ends_with(b"\n") => return Ok(std::mem::take(&mut self.pending)),
                // partial line at end of stream; the next read reports the close
                Ok(_) => {}
                Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut | ErrorKind::Interrupted) => {
                    if Instant::now() >= deadline {
                        return Err(SourceError::Timeout {
                            worker: self.worker.to_string(),
                            seconds: self.read_timeout.as_secs(),
                        });
                    }
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}

impl ParagraphSource for TcpSource<'_> {
    fn pull(&mut self) -> SourceEvent {
        if self.finished {
            return SourceEvent::Error(SourceError::Protocol(
                "pull after end of document".to_string(),
            ));
        }
        match self.next_line() {
            Ok(line) => match serde_json::from_slice::<WorkerMessage>(&line) {
                Ok(WorkerMessage::Paragraph(record)) => SourceEvent::Record(record),
                Ok(WorkerMessage::End) => {
                    self.finished = true;
                    SourceEvent::End
                }
                Ok(WorkerMessage::Error { message }) => {
                    // the worker finished this request cleanly, keep the connection
                    self.finished = true;
                    SourceEvent::Error(SourceError::Render {
                        path: self.path.clone(),
                        reason: message,
                    })
                }
                Err(e) => self.fail(SourceError::Protocol(format!("bad response line: {}", e))),
            },
            Err(e) => self.fail(e),
        }
    }
}

impl Drop for TcpSource<'_> {
    fn drop(&mut self) {
        if !self.finished {
            debug!("abandoning stream for {}, dropping connection", self.path.display());
            *self.connection = None;
        }
    }
}

/// Fixed-size pool of rendering workers addressed by index.
pub struct WorkerPool {
    slots: Vec<Mutex<Box<dyn RenderWorker>>>,
    connect_attempts: u32,
    connect_backoff: Duration,
}

impl WorkerPool {
    pub fn new(workers: Vec<Box<dyn RenderWorker>>, connect_attempts: u32, connect_backoff: Duration) -> Self {
        Self {
            slots: workers.into_iter().map(Mutex::new).collect(),
            connect_attempts: connect_attempts.max(1),
            connect_backoff,
        }
    }

    /// One TCP worker per configured address, or `pool_size` in-process
    /// workers when no address is configured.
    pub fn from_config(config: &WorkerConfig) -> Self {
        let workers: Vec<Box<dyn RenderWorker>> = if config.addresses.is_empty() {
            (0..config.pool_size)
                .map(|i| Box::new(DocxWorker::new(i)) as Box<dyn RenderWorker>)
                .collect()
        } else {
            config
                .addresses
                .iter()
                .map(|addr| Box::new(TcpWorker::new(addr.clone(), config.read_timeout())) as Box<dyn RenderWorker>)
                .collect()
        };
        Self::new(workers, config.connect_attempts, config.connect_backoff())
    }

    pub fn size(&self) -> usize {
        self.slots.len()
    }

    /// Slot serving the document at `index`.
    pub fn slot_for(&self, index: usize) -> usize {
        index % self.slots.len().max(1)
    }

    /// Blocks until the worker for document `index` is free, connecting it
    /// first if needed.
    pub fn acquire(&self, index: usize) -> Result<WorkerLease<'_>, SourceError> {
        let slot = self.slot_for(index);
        let Some(mutex) = self.slots.get(slot) else {
            return Err(SourceError::Unavailable {
                worker: format!("#{}", slot),
                reason: "worker pool is empty".to_string(),
            });
        };
        let mut guard = mutex.lock().unwrap_or_else(PoisonError::into_inner);
        if !guard.is_connected() {
            self.connect_with_retry(guard.as_mut())?;
        }
        debug!("document #{} leased worker {}", index, guard.name());
        Ok(WorkerLease { guard })
    }

    /// Returns a leased worker to the pool.
    pub fn release(&self, lease: WorkerLease<'_>) {
        drop(lease);
    }

    fn connect_with_retry(&self, worker: &mut dyn RenderWorker) -> Result<(), SourceError> {
        let mut last_error = None;
        for attempt in 1..=self.connect_attempts {
            match worker.connect() {
                Ok(()) => return Ok(()),
                Err(e) => {
                    warn!(
                        "connect to {} failed (attempt {}/{}): {}",
                        worker.name(),
                        attempt,
                        self.connect_attempts,
                        e
                    );
                    last_error = Some(e);
                    if attempt < self.connect_attempts {
                        std::thread::sleep(self.connect_backoff);
                    }
                }
            }
        }
        Err(SourceError::Unavailable {
            worker: worker.name().to_string(),
            reason: last_error
                .map(|e| e.to_string())
                .unwrap_or_else(|| "no connection attempt made".to_string()),
        })
    }
}

/// Exclusive use of one pooled worker; released on drop.
pub struct WorkerLease<'p> {
    guard: MutexGuard<'p, Box<dyn RenderWorker>>,
}

impl Deref for WorkerLease<'_> {
    type Target = dyn RenderWorker;

    fn deref(&self) -> &Self::Target {
        self.guard.as_ref()
    }
}

impl DerefMut for WorkerLease<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.guard.as_mut()
    }
}
