//! The agent: serves working-copy queries for the workspaces it owns.

use std::future::Future;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream, ToSocketAddrs};
use tracing::{debug, warn};

use crate::path::ensure_within;
use crate::proto::conn::WireConnection;
use crate::proto::{self, FailureCode, Request};
use crate::{AgentOptions, Inspector, Result, WorkingCopyInfo};

/// Answers `svninfo` requests from controllers over TCP.
///
/// Every connection starts with a greeting, then serves requests one at a time
/// until the peer closes it.
#[derive(Clone, Debug)]
pub struct Agent {
    inner: Arc<AgentInner>,
}

#[derive(Debug)]
struct AgentInner {
    inspector: Inspector,
    options: AgentOptions,
}

impl Agent {
    /// Creates an agent that runs queries with `inspector`.
    pub fn new(inspector: Inspector, options: AgentOptions) -> Self {
        Self {
            inner: Arc::new(AgentInner { inspector, options }),
        }
    }

    /// Returns the configured options.
    pub fn options(&self) -> &AgentOptions {
        &self.inner.options
    }

    /// Binds a listener on `addr`.
    pub async fn bind(addr: impl ToSocketAddrs) -> Result<TcpListener> {
        Ok(TcpListener::bind(addr).await?)
    }

    /// Accepts connections forever, one task per connection.
    ///
    /// Accept errors are logged and the loop keeps going.
    pub async fn serve(&self, listener: TcpListener) -> Result<()> {
        debug!(addr = ?listener.local_addr().ok(), "agent listening");
        self.serve_with(listener).await
    }

    async fn serve_with<L: Accept>(&self, listener: L) -> Result<()> {
        loop {
            self.accept_one(&listener).await;
        }
    }

    async fn accept_one<L: Accept>(&self, listener: &L) {
        match listener.accept_stream().await {
            Ok((stream, peer)) => {
                let agent = self.clone();
                tokio::spawn(async move {
                    let (read, write) = stream.into_split();
                    if let Err(err) = agent.serve_connection(read, write).await {
                        debug!(peer = %peer, error = %err, "agent connection ended with error");
                    }
                });
            }
            Err(err) => {
                warn!(error = %err, "agent accept failed");
                // Back off so a persistent error (EMFILE) does not spin.
                tokio::time::sleep(ACCEPT_BACKOFF).await;
            }
        }
    }

    /// Serves a single connection given its two halves.
    pub async fn serve_connection<R, W>(&self, read: R, write: W) -> Result<()>
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let transport = self.inner.options.transport;
        let mut conn = WireConnection::new(
            Box::new(read),
            Box::new(write),
            transport.read_timeout,
            transport.write_timeout,
        );
        conn.write_success(proto::greeting_params()).await?;

        while let Some(item) = conn.next_item().await? {
            let request = match proto::parse_request(&item) {
                Ok(request) => request,
                Err(err) => {
                    debug!(error = %err, "rejecting malformed request");
                    conn.write_failure(FailureCode::InvalidRequest.as_u64(), &err.to_string(), "")
                        .await?;
                    continue;
                }
            };
            match request {
                Request::SvnInfo { path } => match self.handle_svninfo(&path).await {
                    Ok(info) => conn.write_success(proto::info_params(&info)).await?,
                    Err(err) => {
                        let (code, message, failed_path) = proto::failure_for(&err);
                        conn.write_failure(code.as_u64(), &message, &failed_path)
                            .await?;
                    }
                },
            }
        }
        debug!("agent connection closed by peer");
        Ok(())
    }

    async fn handle_svninfo(&self, path: &Path) -> Result<WorkingCopyInfo> {
        debug!(path = %path.display(), "svninfo request");
        if let Some(boundary) = self.inner.options.boundary.as_deref() {
            ensure_within(boundary, path)?;
        }
        self.inner.inspector.inspect(path).await
    }
}

const ACCEPT_BACKOFF: Duration = Duration::from_millis(50);

/// Source of incoming agent connections.
trait Accept: Send + Sync {
    fn accept_stream(
        &self,
    ) -> impl Future<Output = std::io::Result<(TcpStream, SocketAddr)>> + Send;
}

impl Accept for TcpListener {
    fn accept_stream(
        &self,
    ) -> impl Future<Output = std::io::Result<(TcpStream, SocketAddr)>> + Send {
        self.accept()
    }
}

/// A running agent bound to a local port, for tests and embedding.
#[derive(Debug)]
pub struct AgentHandle {
    addr: SocketAddr,
    task: tokio::task::JoinHandle<()>,
}

impl AgentHandle {
    /// Binds `addr` and serves `agent` on a background task.
    pub async fn spawn(agent: Agent, addr: impl ToSocketAddrs) -> Result<Self> {
        let listener = Agent::bind(addr).await?;
        let addr = listener.local_addr()?;
        let task = tokio::spawn(async move {
            if let Err(err) = agent.serve(listener).await {
                debug!(error = %err, "agent stopped");
            }
        });
        Ok(Self { addr, task })
    }

    /// The bound address.
    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }
}

impl Drop for AgentHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}
