//! Routing a query to the process that owns a path.

use std::path::{Path, PathBuf};

use tokio::net::TcpStream;
use tracing::debug;

use crate::path::resolve_child;
use crate::proto;
use crate::proto::conn::{Response, WireConnection};
use crate::{Inspector, Result, SvnInfoError, TransportOptions, WorkingCopyInfo};

/// Where the files behind a [`FilePath`] live.
#[derive(Clone, Debug)]
pub enum Channel {
    /// This process owns the files.
    Local(Inspector),
    /// An agent reachable over TCP owns the files.
    Remote(RemoteChannel),
}

impl Channel {
    /// Returns working-copy info for `path` from the owning process.
    ///
    /// Failures from the owning side are returned as they were raised there.
    pub async fn svn_info(&self, path: &Path) -> Result<WorkingCopyInfo> {
        match self {
            Channel::Local(inspector) => inspector.inspect(path).await,
            Channel::Remote(remote) => remote.svn_info(path).await,
        }
    }

    /// Returns `true` for agent channels.
    pub fn is_remote(&self) -> bool {
        matches!(self, Channel::Remote(_))
    }
}

/// Address and timeouts of an agent.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RemoteChannel {
    addr: String,
    transport: TransportOptions,
}

impl RemoteChannel {
    /// Creates a channel to the agent listening on `addr` (`host:port`).
    pub fn new(addr: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            transport: TransportOptions::default(),
        }
    }

    /// Sets the transport timeouts.
    #[must_use]
    pub fn with_transport(mut self, transport: TransportOptions) -> Self {
        self.transport = transport;
        self
    }

    /// Returns the agent address.
    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// Connects to the agent and checks its greeting.
    pub async fn open_session(&self) -> Result<RemoteSession> {
        let stream = tokio::time::timeout(
            self.transport.connect_timeout,
            TcpStream::connect(&self.addr),
        )
        .await
        .map_err(|_| {
            SvnInfoError::Io(std::io::Error::new(
                std::io::ErrorKind::TimedOut,
                format!("connect to agent {} timed out", self.addr),
            ))
        })??;
        let (read, write) = stream.into_split();
        let mut conn = WireConnection::new(
            Box::new(read),
            Box::new(write),
            self.transport.read_timeout,
            self.transport.write_timeout,
        );
        match conn.read_response().await? {
            Response::Success(params) => proto::check_greeting(&params)?,
            Response::Failure(errors) => return Err(proto::parse_failure(&errors)),
        }
        debug!(agent = %self.addr, "agent session opened");
        Ok(RemoteSession { conn })
    }

    /// Opens a session, runs one query and closes the session.
    pub async fn svn_info(&self, path: &Path) -> Result<WorkingCopyInfo> {
        let mut session = self.open_session().await?;
        session.svn_info(path).await
    }
}

/// A connected agent session; queries run serially on one connection.
pub struct RemoteSession {
    conn: WireConnection,
}

impl std::fmt::Debug for RemoteSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteSession").finish_non_exhaustive()
    }
}

impl RemoteSession {
    /// Asks the agent for working-copy info of `path` (a path on the agent).
    pub async fn svn_info(&mut self, path: &Path) -> Result<WorkingCopyInfo> {
        let wire_path = path.to_str().ok_or_else(|| {
            SvnInfoError::InvalidPath(format!("path is not valid UTF-8: {}", path.display()))
        })?;
        self.conn
            .write_item(&proto::svninfo_request(wire_path))
            .await?;
        match self.conn.read_response().await? {
            Response::Success(params) => proto::parse_info(&params),
            Response::Failure(errors) => Err(proto::parse_failure(&errors)),
        }
    }
}

/// A path together with the channel of the process that owns it.
///
/// This is the filesystem handle a step receives from its context.
#[derive(Clone, Debug)]
pub struct FilePath {
    channel: Channel,
    path: PathBuf,
}

impl FilePath {
    /// A path owned by this process.
    pub fn local(path: impl Into<PathBuf>, inspector: Inspector) -> Self {
        Self {
            channel: Channel::Local(inspector),
            path: path.into(),
        }
    }

    /// A path owned by the agent behind `channel`.
    pub fn remote(path: impl Into<PathBuf>, channel: RemoteChannel) -> Self {
        Self {
            channel: Channel::Remote(channel),
            path: path.into(),
        }
    }

    /// The path as seen by the owning process.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The owning channel.
    pub fn channel(&self) -> &Channel {
        &self.channel
    }

    /// Resolves a relative path below this one on the same channel.
    ///
    /// `..` segments are rejected, so the child never leaves this directory.
    pub fn child(&self, rel: &str) -> Result<FilePath> {
        Ok(Self {
            channel: self.channel.clone(),
            path: resolve_child(&self.path, rel)?,
        })
    }

    /// Runs the working-copy query on the owning process.
    pub async fn svn_info(&self) -> Result<WorkingCopyInfo> {
        debug!(
            path = %self.path.display(),
            remote = self.channel.is_remote(),
            "dispatching svn info"
        );
        self.channel.svn_info(&self.path).await
    }
}
