//! Development server.
//!
//! Serves the distribution tree over HTTP and keeps a Server-Sent Events
//! channel open to every page, forwarding [`DevEvent`]s from the event bus so
//! browsers reload after each stage run.

pub mod http;

use crate::events::{DevEvent, EventBus};
use http::Resolved;
use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast::error::RecvError;

/// Path of the reload event stream.
pub const EVENTS_PATH: &str = "/__frontkit/events";

/// Largest request head accepted.
const MAX_HEAD_BYTES: usize = 16 * 1024;

/// Interval between SSE keep-alive comments.
const KEEP_ALIVE: Duration = Duration::from_secs(15);

/// Error from the dev server
#[derive(Debug, Error)]
pub enum ServerError {
    /// The listener could not be bound
    #[error("cannot listen on {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },
    /// Accepting a connection failed
    #[error("server IO error: {0}")]
    Io(#[from] io::Error),
}

/// HTTP server over the distribution tree with a reload channel.
pub struct DevServer {
    root: PathBuf,
    listener: TcpListener,
    events: EventBus,
}

impl DevServer {
    /// Bind to `host:port`. Port 0 picks a free port.
    pub async fn bind(root: PathBuf, host: &str, port: u16, events: EventBus) -> Result<Self, ServerError> {
        let addr = format!("{}:{}", host, port);
        let listener = TcpListener::bind(&addr).await.map_err(|source| ServerError::Bind { addr, source })?;
        Ok(Self { root, listener, events })
    }

    /// Address the server is listening on.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Push an event to every connected client.
    pub fn notify(&self, event: DevEvent) -> usize {
        self.events.publish(event)
    }

    /// Accept connections until `shutdown` resolves.
    pub async fn run<F>(self, shutdown: F) -> Result<(), ServerError>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        if let Ok(addr) = self.local_addr() {
            tracing::info!(url = %format!("http://{}", addr), root = %self.root.display(), "dev server listening");
        }

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    tracing::debug!("dev server stopped");
                    return Ok(());
                }
                accepted = self.listener.accept() => {
                    let (stream, peer) = accepted?;
                    let root = self.root.clone();
                    let events = self.events.clone();
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(stream, root, events).await {
                            tracing::debug!(peer = %peer, error = %e, "connection closed with error");
                        }
                    });
                }
            }
        }
    }
}

async fn read_head(reader: &mut BufReader<TcpStream>) -> io::Result<String> {
    let mut head = String::new();
    loop {
        let mut line = String::new();
        let n = reader.read_line(&mut line).await?;
        if n == 0 || line == "\r\n" || line == "\n" {
            break;
        }
        head.push_str(&line);
        if head.len() > MAX_HEAD_BYTES {
            return Err(io::Error::new(io::ErrorKind::InvalidData, "request head too large"));
        }
    }
    Ok(head)
}

async fn handle_connection(stream: TcpStream, root: PathBuf, events: EventBus) -> io::Result<()> {
    let mut reader = BufReader::new(stream);
    let head = read_head(&mut reader).await?;
    let mut stream = reader.into_inner();

    let Some(request) = http::parse_request(&head) else {
        stream.write_all(http::error_response(400, "Bad Request").as_bytes()).await?;
        return Ok(());
    };

    if request.method != "GET" && request.method != "HEAD" {
        stream.write_all(http::error_response(405, "Method Not Allowed").as_bytes()).await?;
        return Ok(());
    }

    if request.path == EVENTS_PATH {
        return stream_events(stream, events).await;
    }

    tracing::trace!(method = %request.method, path = %request.path, "request");
    match http::resolve(&root, &request.path) {
        Resolved::File(path) => {
            let mut body = tokio::fs::read(&path).await?;
            if http::is_html(&path) {
                body = http::inject_reload_script(&String::from_utf8_lossy(&body)).into_bytes();
            }
            let head = http::response_head(200, "OK", http::content_type(&path), body.len());
            stream.write_all(head.as_bytes()).await?;
            if request.method == "GET" {
                stream.write_all(&body).await?;
            }
        }
        Resolved::Forbidden => {
            stream.write_all(http::error_response(403, "Forbidden").as_bytes()).await?;
        }
        Resolved::NotFound => {
            stream.write_all(http::error_response(404, "Not Found").as_bytes()).await?;
        }
    }
    stream.flush().await?;
    stream.shutdown().await
}

async fn stream_events(mut stream: TcpStream, events: EventBus) -> io::Result<()> {
    let mut rx = events.subscribe();
    stream.write_all(http::event_stream_head().as_bytes()).await?;
    stream.write_all(b"retry: 1000\n\n").await?;
    stream.flush().await?;

    let mut keep_alive = tokio::time::interval(KEEP_ALIVE);
    keep_alive.tick().await;

    loop {
        tokio::select! {
            received = rx.recv() => match received {
                Ok(event) => {
                    stream.write_all(event.to_sse().as_bytes()).await?;
                    stream.flush().await?;
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::debug!(skipped, "reload client lagged");
                }
                Err(RecvError::Closed) => return Ok(()),
            },
            _ = keep_alive.tick() => {
                stream.write_all(b": keep-alive\n\n").await?;
                stream.flush().await?;
            }
        }
    }
}
