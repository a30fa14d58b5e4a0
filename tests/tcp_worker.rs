mod common;

use common::{title_document, write_docx};
use statute_parser::config::AppConfig;
use statute_parser::error::{PipelineError, SourceError};
use statute_parser::pipeline::Orchestrator;
use statute_parser::worker::WorkerPool;
use statute_parser::worker_server;
use std::io::{BufRead, BufReader};
use std::net::TcpListener as StdListener;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

/// Starts a render worker on an ephemeral port in a background runtime.
fn spawn_render_worker(shutdown: CancellationToken) -> (String, std::thread::JoinHandle<()>) {
    let listener = StdListener::bind("127.0.0.1:0").unwrap();
    listener.set_nonblocking(true).unwrap();
    let address = listener.local_addr().unwrap().to_string();
    let handle = std::thread::spawn(move || {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .enable_all()
            .build()
            .unwrap();
        runtime.block_on(async move {
            let listener = tokio::net::TcpListener::from_std(listener).unwrap();
            worker_server::serve(listener, shutdown).await.unwrap();
        });
    });
    (address, handle)
}

/// A worker that accepts the request and never answers, until the client
/// hangs up.
fn spawn_silent_worker() -> (String, std::thread::JoinHandle<()>) {
    let listener = StdListener::bind("127.0.0.1:0").unwrap();
    let address = listener.local_addr().unwrap().to_string();
    let handle = std::thread::spawn(move || {
        let (stream, _) = listener.accept().unwrap();
        let mut reader = BufReader::new(stream);
        let mut line = String::new();
        while reader.read_line(&mut line).map(|n| n > 0).unwrap_or(false) {
            line.clear();
        }
    });
    (address, handle)
}

fn config_for(addresses: Vec<String>) -> AppConfig {
    let mut config = AppConfig::default();
    config.workers.addresses = addresses;
    config.workers.connect_attempts = 3;
    config.workers.connect_backoff_ms = 10;
    config.workers.read_timeout_secs = 10;
    config.pipeline.max_concurrent_documents = 3;
    config
}

#[test]
fn documents_render_through_remote_workers() {
    let shutdown = CancellationToken::new();
    let (first, first_handle) = spawn_render_worker(shutdown.clone());
    let (second, second_handle) = spawn_render_worker(shutdown.clone());

    let dir = tempfile::tempdir().unwrap();
    let inputs: Vec<_> = (1..=5)
        .map(|t| write_docx(dir.path(), &format!("t{}.docx", t), &title_document(t, &["Short title", "Definitions"])))
        .collect();

    let config = config_for(vec![first, second]);
    let pool = WorkerPool::from_config(&config.workers);
    assert_eq!(pool.size(), 2);
    let orchestrator = Orchestrator::new(config, pool).unwrap();
    let tree = orchestrator.run(&inputs, &CancellationToken::new()).unwrap();

    let ids: Vec<_> = tree.documents.iter().map(|d| d.id()).collect();
    assert_eq!(ids, vec!["/title-1", "/title-2", "/title-3", "/title-4", "/title-5"]);
    assert!(tree.find("/title-4/section-4-1-102").is_some());

    // a render failure on the worker side is reported for that document
    let missing = dir.path().join("missing.docx");
    let err = orchestrator
        .run(&[inputs[0].clone(), missing.clone()], &CancellationToken::new())
        .unwrap_err();
    match err {
        PipelineError::DocumentFailed { path, source } => {
            assert_eq!(path, missing);
            assert!(matches!(*source, PipelineError::Source(SourceError::Render { .. })));
        }
        other => panic!("unexpected error {:?}", other),
    }

    shutdown.cancel();
    first_handle.join().unwrap();
    second_handle.join().unwrap();
}

#[test]
fn unreachable_worker_fails_after_bounded_retries() {
    // bind then drop to get a port with nothing listening
    let address = {
        let listener = StdListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().to_string()
    };
    let dir = tempfile::tempdir().unwrap();
    let input = write_docx(dir.path(), "t1.docx", &title_document(1, &["Short title"]));

    let config = config_for(vec![address]);
    let pool = WorkerPool::from_config(&config.workers);
    let orchestrator = Orchestrator::new(config, pool).unwrap();

    let started = std::time::Instant::now();
    let err = orchestrator.run(&[input], &CancellationToken::new()).unwrap_err();
    assert!(started.elapsed() < Duration::from_secs(10));
    match err {
        PipelineError::DocumentFailed { source, .. } => {
            assert!(matches!(*source, PipelineError::Source(SourceError::Unavailable { .. })));
        }
        other => panic!("unexpected error {:?}", other),
    }
}

#[test]
fn failure_elsewhere_aborts_a_document_stuck_on_its_worker() {
    let shutdown = CancellationToken::new();
    let (silent, silent_handle) = spawn_silent_worker();
    let (live, live_handle) = spawn_render_worker(shutdown.clone());

    let dir = tempfile::tempdir().unwrap();
    let stuck = write_docx(dir.path(), "a.docx", &title_document(1, &["Short title"]));
    let missing = dir.path().join("b.docx");

    let mut config = config_for(vec![silent, live]);
    config.workers.read_timeout_secs = 30;
    let pool = WorkerPool::from_config(&config.workers);
    let orchestrator = Orchestrator::new(config, pool).unwrap();

    let started = Instant::now();
    let err = orchestrator
        .run(&[stuck, missing.clone()], &CancellationToken::new())
        .unwrap_err();
    assert!(started.elapsed() < Duration::from_secs(10));
    match err {
        PipelineError::DocumentFailed { path, source } => {
            assert_eq!(path, missing);
            assert!(matches!(*source, PipelineError::Source(SourceError::Render { .. })));
        }
        other => panic!("unexpected error {:?}", other),
    }

    // the aborted read closed its connection, which lets the silent worker exit
    silent_handle.join().unwrap();
    shutdown.cancel();
    live_handle.join().unwrap();
}
