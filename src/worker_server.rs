//! Rendering worker service: accepts `{"path": ...}` request lines and
//! answers each with paragraph lines followed by `end`, or one `error` line.

use crate::docx_parser::DocxRenderer;
use crate::worker::{RenderRequest, WorkerMessage};
use log::{debug, info, warn};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Default)]
pub struct RenderService {
    renderer: DocxRenderer,
}

impl RenderService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Renders one request into the response lines for it, stopping early
    /// once `abort` is cancelled.
    pub fn handle(&self, request: &RenderRequest, abort: &CancellationToken) -> Vec<WorkerMessage> {
        match self.renderer.render_cancellable(&request.path, abort) {
            Ok(records) => records
                .into_iter()
                .map(WorkerMessage::Paragraph)
                .chain(std::iter::once(WorkerMessage::End))
                .collect(),
            Err(e) => {
                warn!("render {} failed: {}", request.path.display(), e);
                vec![WorkerMessage::Error {
                    message: e.to_string(),
                }]
            }
        }
    }
}

/// Serves connections until `shutdown` is cancelled. Each connection gets
/// its own task; rendering runs on the blocking pool.
pub async fn serve(listener: TcpListener, shutdown: CancellationToken) -> std::io::Result<()> {
    let service = Arc::new(RenderService::new());
    info!("render worker listening on {}", listener.local_addr()?);

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                info!("render worker shutting down");
                return Ok(());
            }
            accepted = listener.accept() => {
                let (stream, peer) = accepted?;
                let service = Arc::clone(&service);
                let shutdown = shutdown.clone();
                tokio::spawn(async move {
                    if let Err(e) = handle_connection(stream, peer, service, shutdown).await {
                        warn!("connection {} ended with error: {:#}", peer, e);
                    }
                });
            }
        }
    }
}

async fn handle_connection(
    stream: TcpStream,
    peer: SocketAddr,
    service: Arc<RenderService>,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    debug!("accepted connection from {}", peer);
    stream.set_nodelay(true)?;
    let (read_half, mut write_half) = stream.into_split();
    let mut lines = BufReader::new(read_half).lines();
    // request line that arrived while the previous one was rendering
    let mut queued: Option<String> = None;

    loop {
        let line = match queued.take() {
            Some(line) => Some(line),
            None => tokio::select! {
                _ = shutdown.cancelled() => break,
                line = lines.next_line() => line?,
            },
        };
        let Some(line) = line else {
            break;
        };
        if line.trim().is_empty() {
            continue;
        }

        let messages = match serde_json::from_str::<RenderRequest>(&line) {
            Ok(request) => {
                debug!("{} requested {}", peer, request.path.display());
                let abort = shutdown.child_token();
                let mut render = {
                    let service = Arc::clone(&service);
                    let abort = abort.clone();
                    tokio::task::spawn_blocking(move || service.handle(&request, &abort))
                };
                let mut client_gone = false;
                let messages = loop {
                    tokio::select! {
                        messages = &mut render => break messages?,
                        line = lines.next_line(), if !client_gone && queued.is_none() => match line {
                            Ok(Some(line)) => queued = Some(line),
                            Ok(None) | Err(_) => {
                                debug!("{} hung up mid-render, aborting", peer);
                                client_gone = true;
                                abort.cancel();
                            }
                        },
                    }
                };
                if client_gone {
                    break;
                }
                messages
            }
            Err(e) => vec![WorkerMessage::Error {
                message: format!("bad request: {}", e),
            }],
        };

        let mut buf = Vec::new();
        for message in &messages {
            serde_json::to_writer(&mut buf, message)?;
            buf.push(b'\n');
        }
        write_half.write_all(&buf).await?;
        write_half.flush().await?;
    }

    debug!("connection from {} closed", peer);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::record::{ParagraphSource, SourceEvent};
    use crate::error::SourceError;
    use crate::worker::{RenderWorker, TcpWorker};
    use std::path::Path;
    use std::time::Duration;

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn missing_document_yields_error_line() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap().to_string();
        let shutdown = CancellationToken::new();
        let server = tokio::spawn(serve(listener, shutdown.clone()));

        let outcome = tokio::task::spawn_blocking(move || {
            let mut worker = TcpWorker::new(address, Duration::from_secs(5));
            worker.connect().unwrap();
            let mut source = worker
                .open(Path::new("/no/such/file.docx"), &CancellationToken::new())
                .unwrap();
            match source.pull() {
                SourceEvent::Error(SourceError::Render { reason, .. }) => reason,
                other => panic!("unexpected event {:?}", other),
            }
        })
        .await
        .unwrap();
        assert!(!outcome.is_empty());

        shutdown.cancel();
        server.await.unwrap().unwrap();
    }

    #[test]
    fn unrenderable_path_yields_single_error() {
        let messages = RenderService::new().handle(
            &RenderRequest {
                path: "/missing.docx".into(),
            },
            &CancellationToken::new(),
        );
        assert_eq!(messages.len(), 1);
        assert!(matches!(messages[0], WorkerMessage::Error { .. }));
    }

    #[test]
    fn aborted_request_answers_cancelled() {
        let abort = CancellationToken::new();
        abort.cancel();
        let messages = RenderService::new().handle(
            &RenderRequest {
                path: "/missing.docx".into(),
            },
            &abort,
        );
        assert_eq!(
            messages,
            vec![WorkerMessage::Error {
                message: "rendering cancelled".to_string()
            }]
        );
    }
}
