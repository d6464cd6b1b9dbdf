//! HTTP client bound to a local unix socket.
//!
//! The Docker control API speaks plain HTTP/1.1 over a filesystem socket
//! rather than a network address. This module provides the one primitive the
//! rest of the daemon needs: a single GET exchange against an endpoint path,
//! returning the raw response body.

use std::path::{Path, PathBuf};
use std::time::Duration;

use http_body_util::{BodyExt, Empty};
use hyper::body::Bytes;
use hyper::{Method, Request, Response};
use hyper_util::rt::TokioIo;
use log::debug;
use tokio::net::UnixStream;
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};

/// Standard location of the Docker control socket.
pub const DEFAULT_SOCKET_PATH: &str = "/var/run/docker.sock";

/// Overall deadline for one request/response exchange.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Client for the control API on a unix socket.
///
/// Each call opens a fresh connection and closes it when the body has been
/// read; there is no pooling. The URI authority is a placeholder, the daemon
/// on the other end ignores it.
#[derive(Debug, Clone)]
pub struct SocketClient {
    socket_path: PathBuf,
    timeout: Duration,
}

impl SocketClient {
    /// Creates a client for the given socket path, falling back to
    /// [`DEFAULT_SOCKET_PATH`] when none is configured.
    pub fn new(socket_path: Option<PathBuf>) -> Self {
        Self {
            socket_path: socket_path.unwrap_or_else(|| PathBuf::from(DEFAULT_SOCKET_PATH)),
            timeout: REQUEST_TIMEOUT,
        }
    }

    /// Overrides the per-request deadline.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Returns the socket path this client dials.
    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// Performs one GET against `path_and_query` (e.g. `/containers/json?all=1`).
    ///
    /// Returns the raw body on 2xx/3xx. A status of 400 or above becomes
    /// [`Error::Api`] carrying the status and body text. The whole exchange is
    /// bounded by the request timeout, and firing `cancel` before completion
    /// yields [`Error::Cancelled`].
    pub async fn get(&self, path_and_query: &str, cancel: &CancellationToken) -> Result<Bytes> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(Error::Cancelled),
            res = tokio::time::timeout(self.timeout, self.exchange(path_and_query)) => {
                match res {
                    Ok(inner) => inner,
                    Err(_) => Err(Error::Timeout {
                        path: path_and_query.to_string(),
                        timeout: self.timeout,
                    }),
                }
            }
        }
    }

    async fn exchange(&self, path_and_query: &str) -> Result<Bytes> {
        let stream = UnixStream::connect(&self.socket_path)
            .await
            .map_err(|source| Error::Connect {
                path: self.socket_path.clone(),
                source,
            })?;

        let io = TokioIo::new(stream);
        let (mut sender, conn) = hyper::client::conn::http1::handshake(io).await?;

        // Drive the connection until the response body has been consumed.
        tokio::spawn(async move {
            if let Err(e) = conn.await {
                debug!("control socket connection closed: {}", e);
            }
        });

        let request = Request::builder()
            .method(Method::GET)
            .uri(format!("http://localhost{}", path_and_query))
            .header("Host", "localhost")
            .body(Empty::<Bytes>::new())?;

        debug!("control api GET {}", path_and_query);
        let response = sender.send_request(request).await?;
        let status = response.status();
        let body = collect_body(response).await?;

        if status.as_u16() >= 400 {
            return Err(Error::Api {
                status,
                body: String::from_utf8_lossy(&body).into_owned(),
            });
        }
        Ok(body)
    }
}

async fn collect_body(response: Response<hyper::body::Incoming>) -> Result<Bytes> {
    Ok(response.into_body().collect().await?.to_bytes())
}
