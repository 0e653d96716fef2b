//! Ephemeral loopback listener.
//!
//! An [`EphemeralListener`] serves a [`Handler`] over real HTTP/1.1 for the
//! lifetime of a single request. It is a guard: dropping it aborts the accept
//! loop, and with it every connection task it spawned. [`EphemeralListener::shutdown`]
//! does the same but waits until the socket is actually closed.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use http::{Request, StatusCode};
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::{JoinHandle, JoinSet};

use crate::error::{CheckError, CheckResult};
use crate::handler::{HttpResponse, SharedHandler};

/// A short-lived HTTP server bound to a loopback port.
#[derive(Debug)]
pub struct EphemeralListener {
    addr: SocketAddr,
    accept_task: Option<JoinHandle<()>>,
}

impl EphemeralListener {
    /// Binds `addr` and starts serving `handler` in the background.
    ///
    /// Must be called from within a Tokio runtime.
    pub async fn bind(addr: &str, handler: SharedHandler) -> CheckResult<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| CheckError::Bind {
                addr: addr.to_string(),
                source,
            })?;
        let local_addr = listener.local_addr().map_err(|source| CheckError::Bind {
            addr: addr.to_string(),
            source,
        })?;

        tracing::debug!(addr = %local_addr, "ephemeral listener bound");

        let accept_task = tokio::spawn(accept_loop(listener, handler));

        Ok(Self {
            addr: local_addr,
            accept_task: Some(accept_task),
        })
    }

    /// Returns the bound socket address.
    #[must_use]
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Returns `http://{addr}` with no trailing slash.
    #[must_use]
    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Stops serving and waits for the socket to close.
    pub async fn shutdown(mut self) {
        if let Some(task) = self.accept_task.take() {
            task.abort();
            // A cancelled task resolves to a JoinError; that is the expected outcome.
            let _ = task.await;
            tracing::debug!(addr = %self.addr, "ephemeral listener closed");
        }
    }
}

impl Drop for EphemeralListener {
    fn drop(&mut self) {
        if let Some(task) = self.accept_task.take() {
            task.abort();
            tracing::debug!(addr = %self.addr, "ephemeral listener dropped");
        }
    }
}

/// Accepts connections until aborted. Dropping the `JoinSet` aborts every
/// connection still in flight.
async fn accept_loop(listener: TcpListener, handler: SharedHandler) {
    let mut connections = JoinSet::new();

    loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((stream, remote_addr)) => {
                    connections.spawn(serve_connection(stream, remote_addr, Arc::clone(&handler)));
                }
                Err(e) => {
                    tracing::error!("failed to accept connection: {}", e);
                    return;
                }
            },
            Some(_) = connections.join_next(), if !connections.is_empty() => {}
        }
    }
}

async fn serve_connection(stream: TcpStream, remote_addr: SocketAddr, handler: SharedHandler) {
    let io = TokioIo::new(stream);

    let service = service_fn(move |req: Request<Incoming>| {
        let handler = Arc::clone(&handler);
        async move { Ok::<_, Infallible>(dispatch(handler, req).await) }
    });

    if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
        tracing::debug!(remote = %remote_addr, "connection error: {}", e);
    }
}

/// Collects the request body and hands the buffered request to the handler.
async fn dispatch(handler: SharedHandler, req: Request<Incoming>) -> HttpResponse {
    let (parts, body) = req.into_parts();

    let body = match body.collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) => {
            tracing::warn!("failed to collect request body: {}", e);
            let mut response = http::Response::new(Full::new(Bytes::from(format!(
                "failed to read request body: {e}"
            ))));
            *response.status_mut() = StatusCode::BAD_REQUEST;
            return response;
        }
    };

    tracing::debug!(method = %parts.method, uri = %parts.uri, "serving request");
    handler.call(Request::from_parts(parts, body)).await
}
